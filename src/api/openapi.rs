use super::{
    guard,
    handlers::{
        auth::{password, session, sign_in, sign_out, sign_up},
        health, roles, users,
    },
};
use axum::middleware;
use utoipa::openapi::{Contact, InfoBuilder, License, OpenApiBuilder, Tag};
use utoipa_axum::{router::OpenApiRouter, routes};

#[must_use]
pub fn openapi() -> utoipa::openapi::OpenApi {
    // Reuse the same router wiring and only return the generated OpenAPI spec.
    let (_router, openapi) = api_router().split_for_parts();
    openapi
}

/// Build the router that also drives the `OpenAPI` document.
///
/// Public routes are registered on the outer router; routes that need an
/// identity go on `protected`, which carries the resource guard.
/// Routes added outside (like `/home` or `OPTIONS /health`) are not documented.
pub(crate) fn api_router() -> OpenApiRouter {
    let protected = OpenApiRouter::new()
        .routes(routes!(session::session))
        .routes(routes!(session::unlock_session))
        .routes(routes!(users::list_users))
        .routes(routes!(users::create_user))
        .routes(routes!(
            users::get_user,
            users::update_user,
            users::delete_user
        ))
        .routes(routes!(users::assign_role))
        .routes(routes!(users::revoke_role))
        .routes(routes!(roles::list_roles, roles::create_role))
        .routes(routes!(roles::delete_role))
        .route_layer(middleware::from_fn(guard::require_identity));

    let mut router = OpenApiRouter::with_openapi(cargo_openapi())
        .routes(routes!(health::health))
        .routes(routes!(sign_in::sign_in))
        .routes(routes!(sign_in::sign_in_with_token))
        .routes(routes!(sign_out::sign_out))
        .routes(routes!(sign_up::sign_up))
        .routes(routes!(password::forgot_password))
        .routes(routes!(password::reset_password))
        .merge(protected);

    let mut auth_tag = Tag::new("auth");
    auth_tag.description = Some("Sign-in, sign-out, registration and password reset".to_string());

    let mut user_tag = Tag::new("user");
    user_tag.description = Some("User management and role links".to_string());

    let mut role_tag = Tag::new("role");
    role_tag.description = Some("Role management".to_string());

    let mut health_tag = Tag::new("health");
    health_tag.description = Some("Service and credential store status".to_string());

    router.get_openapi_mut().tags = Some(vec![auth_tag, user_tag, role_tag, health_tag]);

    router
}

fn cargo_openapi() -> utoipa::openapi::OpenApi {
    // Use Cargo.toml metadata instead of the utoipa-axum crate info defaults.
    let mut info = InfoBuilder::new()
        .title(env!("CARGO_PKG_NAME"))
        .version(env!("CARGO_PKG_VERSION"))
        .description(optional_str(env!("CARGO_PKG_DESCRIPTION")))
        .build();

    info.contact = cargo_contact();
    info.license = cargo_license();

    OpenApiBuilder::new().info(info).build()
}

fn cargo_contact() -> Option<Contact> {
    // Cargo authors are `;` separated and may include "Name <email>".
    let authors = env!("CARGO_PKG_AUTHORS");
    let primary = authors.split(';').next().map(str::trim)?;
    if primary.is_empty() {
        return None;
    }

    let (name, email) = parse_author(primary);
    if name.is_none() && email.is_none() {
        return None;
    }

    let mut contact = Contact::new();
    contact.name = name.map(str::to_string);
    contact.email = email.map(str::to_string);
    Some(contact)
}

fn cargo_license() -> Option<License> {
    let identifier = optional_str(env!("CARGO_PKG_LICENSE"))?;
    let mut license = License::new(identifier);
    license.identifier = Some(identifier.to_string());
    Some(license)
}

fn optional_str(value: &'static str) -> Option<&'static str> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed)
    }
}

fn parse_author(author: &str) -> (Option<&str>, Option<&str>) {
    fn non_empty(value: &str) -> Option<&str> {
        let value = value.trim();
        (!value.is_empty()).then_some(value)
    }

    match author.split_once('<') {
        Some((name, email)) => (non_empty(name), non_empty(email.trim_end_matches('>'))),
        None => (non_empty(author), None),
    }
}
