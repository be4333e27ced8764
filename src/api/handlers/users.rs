//! Role-based user management endpoints.
//!
//! Flow Overview:
//! 1) The resource guard resolves the caller's identity.
//! 2) Listing, creation, deletion and role links are admin-only; reading and
//!    updating a single user is also allowed for that user.
//! 3) Passwords are hashed here and never returned.

use axum::{
    Json,
    extract::{Extension, Path, Query},
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{info, instrument};
use utoipa::{IntoParams, ToSchema};

use super::{
    auth::sign_up::register, normalize_optional, require_admin, require_self_or_admin,
    valid_password, valid_role_tag, valid_username,
};
use crate::{
    api::error::{bad_request, internal_error, json_error, not_found},
    auth::{
        AuthState, Identity,
        identity::ROLE_USER,
        password::{hash_password, is_reserved_username},
    },
    store::{
        CredentialStore, DEFAULT_PAGE_SIZE, LinkOutcome, NewUser, SortField, SortOrder, UserQuery,
        UserSummary, UserUpdate,
    },
};

const MAX_PAGE_SIZE: u32 = 100;

#[derive(Debug, Deserialize, IntoParams)]
#[serde(rename_all = "camelCase")]
#[into_params(parameter_in = Query)]
pub struct UserListParams {
    /// Case-insensitive match on username or name.
    pub search: Option<String>,
    /// Only users holding this role tag.
    pub role: Option<String>,
    /// Zero-based page index.
    pub page: Option<u32>,
    pub page_size: Option<u32>,
    /// Requires `order`.
    pub sort: Option<SortField>,
    /// Requires `sort`.
    pub order: Option<SortOrder>,
}

impl UserListParams {
    fn into_query(self) -> Result<UserQuery, &'static str> {
        let sort = match (self.sort, self.order) {
            (Some(field), Some(order)) => Some((field, order)),
            (None, None) => None,
            _ => return Err("sort and order must be given together"),
        };
        let page_size = self.page_size.unwrap_or(DEFAULT_PAGE_SIZE);
        if page_size == 0 || page_size > MAX_PAGE_SIZE {
            return Err("pageSize must be between 1 and 100");
        }
        Ok(UserQuery {
            search: normalize_optional(self.search),
            role: normalize_optional(self.role),
            page: self.page.unwrap_or(0),
            page_size,
            sort,
        })
    }
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct UserListResponse {
    pub users: Vec<UserSummary>,
    pub total: u64,
    pub page: u32,
    pub page_size: u32,
}

#[derive(Debug, Deserialize, ToSchema)]
#[serde(deny_unknown_fields)]
pub struct CreateUserRequest {
    pub username: String,
    pub password: String,
    pub name: Option<String>,
    pub avatar: Option<String>,
    /// Role tags to link. Defaults to `user`.
    pub roles: Option<Vec<String>>,
}

#[derive(Debug, Deserialize, ToSchema)]
#[serde(deny_unknown_fields)]
pub struct UserUpdateRequest {
    pub name: Option<String>,
    pub avatar: Option<String>,
    pub password: Option<String>,
}

#[derive(Debug, Deserialize, ToSchema)]
#[serde(deny_unknown_fields)]
pub struct UserRoleRequest {
    pub tag: String,
}

#[utoipa::path(
    get,
    path = "/api/user/list",
    params(UserListParams),
    responses(
        (status = 200, description = "Page of users (admin-only).", body = UserListResponse),
        (status = 400, description = "Invalid paging or sorting."),
        (status = 401, description = "Unauthorized access"),
        (status = 403, description = "Forbidden."),
    ),
    tag = "user"
)]
pub async fn list_users(
    Extension(principal): Extension<Identity>,
    auth_state: Extension<Arc<AuthState>>,
    Query(params): Query<UserListParams>,
) -> impl IntoResponse {
    if let Err(response) = require_admin(&principal) {
        return response;
    }
    let query = match params.into_query() {
        Ok(query) => query,
        Err(message) => return bad_request(message),
    };

    match auth_state.credentials().list_users(&query).await {
        Ok((users, total)) => (
            StatusCode::OK,
            Json(UserListResponse {
                users,
                total,
                page: query.page,
                page_size: query.page_size,
            }),
        )
            .into_response(),
        Err(err) => internal_error("Failed to list users", &err),
    }
}

#[utoipa::path(
    get,
    path = "/api/user/{username}",
    params(
        ("username" = String, Path, description = "Username")
    ),
    responses(
        (status = 200, description = "User detail (self or admin).", body = UserSummary),
        (status = 401, description = "Unauthorized access"),
        (status = 403, description = "Forbidden."),
        (status = 404, description = "User not found."),
    ),
    tag = "user"
)]
pub async fn get_user(
    Path(username): Path<String>,
    Extension(principal): Extension<Identity>,
    auth_state: Extension<Arc<AuthState>>,
) -> impl IntoResponse {
    if let Err(response) = require_self_or_admin(&principal, &username) {
        return response;
    }
    match auth_state.credentials().find_user(&username).await {
        Ok(Some(record)) => (StatusCode::OK, Json(record.summary())).into_response(),
        Ok(None) => not_found("User not found"),
        Err(err) => internal_error("Failed to fetch user", &err),
    }
}

#[utoipa::path(
    put,
    path = "/api/user/{username}",
    params(
        ("username" = String, Path, description = "Username")
    ),
    request_body = UserUpdateRequest,
    responses(
        (status = 200, description = "User updated (self or admin).", body = UserSummary),
        (status = 400, description = "Invalid input."),
        (status = 401, description = "Unauthorized access"),
        (status = 403, description = "Forbidden."),
        (status = 404, description = "User not found."),
    ),
    tag = "user"
)]
#[instrument(skip_all, fields(username = %username))]
pub async fn update_user(
    Path(username): Path<String>,
    Extension(principal): Extension<Identity>,
    auth_state: Extension<Arc<AuthState>>,
    Json(payload): Json<UserUpdateRequest>,
) -> impl IntoResponse {
    if let Err(response) = require_self_or_admin(&principal, &username) {
        return response;
    }

    let name = normalize_optional(payload.name);
    let avatar = normalize_optional(payload.avatar);
    if name.is_none() && avatar.is_none() && payload.password.is_none() {
        return bad_request("No updates provided.");
    }

    let password_hash = match payload.password {
        Some(password) => {
            if !valid_password(&password) {
                return bad_request("Password must be between 8 and 1024 characters");
            }
            match hash_password(&password) {
                Ok(hash) => Some(hash),
                Err(err) => return internal_error("Failed to hash password", &err),
            }
        }
        None => None,
    };

    let update = UserUpdate {
        name,
        avatar,
        password_hash,
    };
    match auth_state.credentials().update_user(&username, update).await {
        Ok(Some(summary)) => {
            info!("user updated");
            (StatusCode::OK, Json(summary)).into_response()
        }
        Ok(None) => not_found("User not found"),
        Err(err) => internal_error("Failed to update user", &err),
    }
}

#[utoipa::path(
    delete,
    path = "/api/user/{username}",
    params(
        ("username" = String, Path, description = "Username")
    ),
    responses(
        (status = 204, description = "User deleted (admin-only)."),
        (status = 401, description = "Unauthorized access"),
        (status = 403, description = "Forbidden."),
        (status = 404, description = "User not found."),
    ),
    tag = "user"
)]
#[instrument(skip_all, fields(username = %username))]
pub async fn delete_user(
    Path(username): Path<String>,
    Extension(principal): Extension<Identity>,
    auth_state: Extension<Arc<AuthState>>,
) -> impl IntoResponse {
    if let Err(response) = require_admin(&principal) {
        return response;
    }
    match auth_state.credentials().delete_user(&username).await {
        Ok(true) => {
            info!("user deleted");
            StatusCode::NO_CONTENT.into_response()
        }
        Ok(false) => not_found("User not found"),
        Err(err) => internal_error("Failed to delete user", &err),
    }
}

#[utoipa::path(
    post,
    path = "/api/user",
    request_body = CreateUserRequest,
    responses(
        (status = 201, description = "User created (admin-only).", body = UserSummary),
        (status = 400, description = "Invalid input."),
        (status = 401, description = "Unauthorized access"),
        (status = 403, description = "Forbidden."),
        (status = 409, description = "Username already taken."),
    ),
    tag = "user"
)]
#[instrument(skip_all, fields(username = %payload.username))]
pub async fn create_user(
    Extension(principal): Extension<Identity>,
    auth_state: Extension<Arc<AuthState>>,
    Json(payload): Json<CreateUserRequest>,
) -> impl IntoResponse {
    if let Err(response) = require_admin(&principal) {
        return response;
    }

    let username = payload.username.trim().to_string();
    if !valid_username(&username) {
        return bad_request("Invalid username");
    }
    if is_reserved_username(auth_state.config(), &username) {
        return json_error(StatusCode::CONFLICT, "conflict", "Username already taken");
    }
    if !valid_password(&payload.password) {
        return bad_request("Password must be between 8 and 1024 characters");
    }
    let roles = payload
        .roles
        .unwrap_or_else(|| vec![ROLE_USER.to_string()]);
    if let Some(tag) = roles.iter().find(|tag| !valid_role_tag(tag)) {
        return bad_request(format!("Invalid role tag: {tag}"));
    }

    let password_hash = match hash_password(&payload.password) {
        Ok(hash) => hash,
        Err(err) => return internal_error("Failed to hash password", &err),
    };
    let new_user = NewUser {
        username,
        name: normalize_optional(payload.name),
        avatar: normalize_optional(payload.avatar),
        password_hash,
    };
    let tags: Vec<&str> = roles.iter().map(String::as_str).collect();

    match register(auth_state.credentials(), new_user, &tags).await {
        Ok(Some(summary)) => {
            info!("user created");
            (StatusCode::CREATED, Json(summary)).into_response()
        }
        Ok(None) => json_error(StatusCode::CONFLICT, "conflict", "Username already taken"),
        Err(err) => internal_error("Failed to create user", &err),
    }
}

#[utoipa::path(
    post,
    path = "/api/user/{username}/roles",
    params(
        ("username" = String, Path, description = "Username")
    ),
    request_body = UserRoleRequest,
    responses(
        (status = 200, description = "Role linked (admin-only).", body = UserSummary),
        (status = 401, description = "Unauthorized access"),
        (status = 403, description = "Forbidden."),
        (status = 404, description = "User or role not found."),
    ),
    tag = "user"
)]
#[instrument(skip_all, fields(username = %username, role = %payload.tag))]
pub async fn assign_role(
    Path(username): Path<String>,
    Extension(principal): Extension<Identity>,
    auth_state: Extension<Arc<AuthState>>,
    Json(payload): Json<UserRoleRequest>,
) -> impl IntoResponse {
    if let Err(response) = require_admin(&principal) {
        return response;
    }
    let store = auth_state.credentials();
    match store.assign_role(&username, payload.tag.trim()).await {
        Ok(LinkOutcome::Linked) => {}
        Ok(LinkOutcome::Missing) => return not_found("User or role not found"),
        Err(err) => return internal_error("Failed to assign role", &err),
    }
    info!("role assigned");
    summary_response(auth_state.credentials(), &username).await
}

#[utoipa::path(
    delete,
    path = "/api/user/{username}/roles/{tag}",
    params(
        ("username" = String, Path, description = "Username"),
        ("tag" = String, Path, description = "Role tag")
    ),
    responses(
        (status = 204, description = "Role unlinked (admin-only)."),
        (status = 401, description = "Unauthorized access"),
        (status = 403, description = "Forbidden."),
        (status = 404, description = "Link not found."),
    ),
    tag = "user"
)]
#[instrument(skip_all, fields(username = %username, role = %tag))]
pub async fn revoke_role(
    Path((username, tag)): Path<(String, String)>,
    Extension(principal): Extension<Identity>,
    auth_state: Extension<Arc<AuthState>>,
) -> impl IntoResponse {
    if let Err(response) = require_admin(&principal) {
        return response;
    }
    match auth_state.credentials().revoke_role(&username, &tag).await {
        Ok(true) => {
            info!("role revoked");
            StatusCode::NO_CONTENT.into_response()
        }
        Ok(false) => not_found("Role link not found"),
        Err(err) => internal_error("Failed to revoke role", &err),
    }
}

async fn summary_response(store: &dyn CredentialStore, username: &str) -> Response {
    match store.find_user(username).await {
        Ok(Some(record)) => (StatusCode::OK, Json(record.summary())).into_response(),
        Ok(None) => not_found("User not found"),
        Err(err) => internal_error("Failed to fetch user", &err),
    }
}
