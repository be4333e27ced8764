use axum::{
    extract::Extension,
    response::{Html, IntoResponse},
};

use crate::auth::Identity;

/// Landing page for signed-in browsers. Guarded outside the API prefix, so an
/// anonymous visitor is redirected to the login page instead of getting a 401.
pub async fn home(Extension(identity): Extension<Identity>) -> impl IntoResponse {
    let name = escape_html(&identity.username);
    Html(format!(
        "<!doctype html><html><head><title>{}</title></head><body><p>Signed in as {name}</p></body></html>",
        env!("CARGO_PKG_NAME")
    ))
}

fn escape_html(value: &str) -> String {
    let mut escaped = String::with_capacity(value.len());
    for ch in value.chars() {
        match ch {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '"' => escaped.push_str("&quot;"),
            '\'' => escaped.push_str("&#39;"),
            _ => escaped.push(ch),
        }
    }
    escaped
}
