//! Resource guard middleware.
//!
//! Picks the guard variant from the configured flags, runs it and either
//! forwards the request with the resolved [`Identity`] in its extensions or
//! short-circuits with a 401 JSON body (API paths) or a 303 redirect to the
//! login page (everything else).

use axum::{
    extract::{Extension, Request},
    middleware::Next,
    response::{IntoResponse, Redirect, Response},
};
use std::sync::Arc;
use tracing::{debug, error};

use super::error::auth_error_response;
use crate::auth::{
    AuthError, AuthResult, AuthState, Identity, RequestContext, RouteKind, evaluate, select,
};

pub async fn require_identity(
    Extension(auth_state): Extension<Arc<AuthState>>,
    mut request: Request,
    next: Next,
) -> Response {
    let variant = match select(auth_state.config().flags(), RouteKind::Resource) {
        Ok(variant) => variant,
        Err(err) => {
            error!("Invalid authentication configuration: {err}");
            return auth_error_response(&AuthError::from(err));
        }
    };

    let path = request.uri().path().to_string();
    let result = evaluate(
        variant,
        RequestContext::new(&path, request.headers()),
        &auth_state,
    )
    .await;

    match result {
        AuthResult::Authenticated(identity) => {
            request.extensions_mut().insert::<Identity>(identity);
            next.run(request).await
        }
        AuthResult::RejectWithRedirect(target) => {
            debug!(path = %path, "redirecting unauthenticated request");
            Redirect::to(&target).into_response()
        }
        AuthResult::RejectWithError(err) => auth_error_response(&err),
        // Resource guards never sign in.
        AuthResult::SignedIn(_) => auth_error_response(&AuthError::Unauthorized),
    }
}
