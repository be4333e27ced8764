mod common;

use anyhow::{Context, Result, ensure};
use axum::http::{StatusCode, header};
use common::{
    SUPERADMIN, SUPERADMIN_PASSWORD, TestApp, body_json, cookie_header, cookie_value, get,
    json_request, request, reset_token, set_cookies,
};
use gatehouse::auth::{AuthFlags, Identity, RoleRef};
use jsonwebtoken::get_current_timestamp;
use serde_json::json;

const SESSION: &str = "gatehouse_session";
const ACCESS_TOKEN: &str = "accessToken";

fn bearer(uri: &str, token: &str) -> Result<axum::http::Request<axum::body::Body>> {
    let mut req = get(uri, None)?;
    req.headers_mut()
        .insert(header::AUTHORIZATION, format!("Bearer {token}").parse()?);
    Ok(req)
}

#[tokio::test]
async fn strict_superadmin_sign_in_sets_both_cookies() -> Result<()> {
    let app = TestApp::new(AuthFlags::new(true, true, true)).await?;

    let response = app.sign_in(SUPERADMIN, SUPERADMIN_PASSWORD).await?;
    assert_eq!(response.status(), StatusCode::OK);
    let headers = response.headers().clone();
    let session = cookie_value(&headers, SESSION).context("session cookie")?;
    let token = cookie_value(&headers, ACCESS_TOKEN).context("token cookie")?;
    ensure!(!session.is_empty() && !token.is_empty());

    let body = body_json(response).await?;
    assert_eq!(body["username"], SUPERADMIN);
    assert_eq!(body["accessToken"], token.as_str());
    let roles = body["roles"].as_array().context("roles array")?;
    assert!(roles.iter().any(|role| role["tag"] == "superadmin"));

    // Both artifacts together authenticate.
    let cookies = cookie_header(&headers)?;
    let response = app.send(get("/api/auth/session", Some(&cookies))?).await?;
    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await?;
    assert_eq!(body["username"], SUPERADMIN);
    assert!(body.get("accessToken").is_none());

    // The token alone is not enough in strict mode.
    let response = app.send(bearer("/api/auth/session", &token)?).await?;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

    // Nor is the session alone.
    let only_session = format!("{SESSION}={session}");
    let response = app
        .send(get("/api/auth/session", Some(&only_session))?)
        .await?;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    Ok(())
}

#[tokio::test]
async fn session_only_sign_in() -> Result<()> {
    let app = TestApp::new(AuthFlags::new(true, false, false)).await?;
    app.add_user("alice", "wonderland", &["user"]).await?;

    let response = app.sign_in("alice", "wonderland").await?;
    assert_eq!(response.status(), StatusCode::OK);
    let headers = response.headers().clone();
    assert!(cookie_value(&headers, SESSION).is_some());
    assert!(cookie_value(&headers, ACCESS_TOKEN).is_none());
    let body = body_json(response).await?;
    assert!(body.get("accessToken").is_none());

    let cookies = cookie_header(&headers)?;
    let response = app.send(get("/api/auth/session", Some(&cookies))?).await?;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(body_json(response).await?["username"], "alice");
    Ok(())
}

#[tokio::test]
async fn failed_sign_in_sets_no_cookies() -> Result<()> {
    let app = TestApp::new(AuthFlags::new(true, true, false)).await?;
    app.add_user("alice", "wonderland", &["user"]).await?;

    for (username, password) in [("mallory", "wonderland"), ("alice", "not-the-password")] {
        let response = app.sign_in(username, password).await?;
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        assert!(set_cookies(response.headers()).is_empty());
        let body = body_json(response).await?;
        assert_eq!(body["error"], "unauthorized");
    }
    Ok(())
}

#[tokio::test]
async fn pages_redirect_and_api_rejects() -> Result<()> {
    let app = TestApp::new(AuthFlags::new(true, false, false)).await?;
    app.add_user("alice", "wonderland", &["user"]).await?;

    let response = app.send(get("/home", None)?).await?;
    assert_eq!(response.status(), StatusCode::SEE_OTHER);
    assert_eq!(
        response
            .headers()
            .get(header::LOCATION)
            .and_then(|value| value.to_str().ok()),
        Some("/login?status=failed")
    );

    let response = app.send(get("/api/user/list", None)?).await?;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

    let signed_in = app.sign_in("alice", "wonderland").await?;
    let cookies = cookie_header(signed_in.headers())?;
    let response = app.send(get("/home", Some(&cookies))?).await?;
    assert_eq!(response.status(), StatusCode::OK);
    Ok(())
}

#[tokio::test]
async fn sign_out_clears_cookies_and_revokes_token() -> Result<()> {
    let app = TestApp::new(AuthFlags::new(true, true, false)).await?;
    app.add_user("alice", "wonderland", &["user"]).await?;

    let response = app.sign_in("alice", "wonderland").await?;
    let headers = response.headers().clone();
    let token = cookie_value(&headers, ACCESS_TOKEN).context("token cookie")?;
    let cookies = cookie_header(&headers)?;

    let response = app.send(bearer("/api/auth/session", &token)?).await?;
    assert_eq!(response.status(), StatusCode::OK);

    let response = app
        .send(request("POST", "/api/auth/sign-out", Some(&cookies))?)
        .await?;
    assert_eq!(response.status(), StatusCode::NO_CONTENT);
    let cleared = set_cookies(response.headers());
    assert!(cleared.contains(&(SESSION.to_string(), String::new())));
    assert!(cleared.contains(&(ACCESS_TOKEN.to_string(), String::new())));

    let response = app.send(bearer("/api/auth/session", &token)?).await?;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    let response = app.send(get("/api/auth/session", Some(&cookies))?).await?;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

    // Signing out again is harmless.
    let response = app
        .send(request("POST", "/api/auth/sign-out", None)?)
        .await?;
    assert_eq!(response.status(), StatusCode::NO_CONTENT);
    Ok(())
}

#[tokio::test]
async fn expired_token_is_renewed_once() -> Result<()> {
    let app = TestApp::new(AuthFlags::new(false, true, false)).await?;
    app.add_user("alice", "wonderland", &["user"]).await?;

    let alice = app.state.password_verifier().resolve("alice").await?;
    let expired = app
        .state
        .codec()
        .sign_at(&alice, get_current_timestamp() - 7200)?;

    let response = app.send(bearer("/api/auth/session", &expired)?).await?;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

    let renew = json!({ "accessToken": &expired });
    let response = app
        .send(json_request(
            "POST",
            "/api/auth/sign-in-with-token",
            None,
            &renew,
        )?)
        .await?;
    assert_eq!(response.status(), StatusCode::OK);
    let renewed = cookie_value(response.headers(), ACCESS_TOKEN).context("renewed token")?;
    assert_ne!(renewed, expired);

    let response = app.send(bearer("/api/auth/session", &renewed)?).await?;
    assert_eq!(response.status(), StatusCode::OK);

    let response = app
        .send(json_request(
            "POST",
            "/api/auth/sign-in-with-token",
            None,
            &renew,
        )?)
        .await?;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    Ok(())
}

#[tokio::test]
async fn superadmin_name_cannot_be_claimed() -> Result<()> {
    let app = TestApp::new(AuthFlags::new(false, true, false)).await?;

    for username in [SUPERADMIN, "ROOT"] {
        let body = json!({ "username": username, "password": "attacker-pass" });
        let response = app
            .send(json_request("POST", "/api/auth/sign-up", None, &body)?)
            .await?;
        assert_eq!(response.status(), StatusCode::CONFLICT);
    }
    let response = app.sign_in(SUPERADMIN, "attacker-pass").await?;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

    // A validly signed plain-user token for that name does not renew into super-admin.
    let plain = Identity::new(SUPERADMIN, vec![RoleRef::new("user", "User")]);
    let forged = app.state.codec().sign(&plain)?;
    let response = app
        .send(json_request(
            "POST",
            "/api/auth/sign-in-with-token",
            None,
            &json!({ "accessToken": &forged }),
        )?)
        .await?;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

    // The real super-admin still renews.
    let response = app.sign_in(SUPERADMIN, SUPERADMIN_PASSWORD).await?;
    let token = cookie_value(response.headers(), ACCESS_TOKEN).context("token cookie")?;
    let response = app
        .send(json_request(
            "POST",
            "/api/auth/sign-in-with-token",
            None,
            &json!({ "accessToken": &token }),
        )?)
        .await?;
    assert_eq!(response.status(), StatusCode::OK);
    let roles = body_json(response).await?["roles"].clone();
    let roles = roles.as_array().context("roles array")?;
    assert!(roles.iter().any(|role| role["tag"] == "superadmin"));
    Ok(())
}

#[tokio::test]
async fn sign_up_then_conflict() -> Result<()> {
    let app = TestApp::new(AuthFlags::new(true, false, false)).await?;
    let body = json!({ "username": "bob", "password": "builder-123", "name": "Bob" });

    let response = app
        .send(json_request("POST", "/api/auth/sign-up", None, &body)?)
        .await?;
    assert_eq!(response.status(), StatusCode::CREATED);
    let created = body_json(response).await?;
    assert_eq!(created["username"], "bob");
    assert_eq!(created["name"], "Bob");
    let roles = created["roles"].as_array().context("roles array")?;
    assert!(roles.iter().any(|role| role["tag"] == "user"));
    assert!(created.get("password").is_none());
    assert!(created.get("passwordHash").is_none());

    let response = app
        .send(json_request("POST", "/api/auth/sign-up", None, &body)?)
        .await?;
    assert_eq!(response.status(), StatusCode::CONFLICT);

    let response = app.sign_in("bob", "builder-123").await?;
    assert_eq!(response.status(), StatusCode::OK);

    let short = json!({ "username": "carol", "password": "short" });
    let response = app
        .send(json_request("POST", "/api/auth/sign-up", None, &short)?)
        .await?;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    Ok(())
}

#[tokio::test]
async fn password_reset_round() -> Result<()> {
    let app = TestApp::new(AuthFlags::new(true, false, false)).await?;
    app.add_user("alice", "wonderland", &["user"]).await?;

    // Unknown users get the same answer and no mail.
    let response = app
        .send(json_request(
            "POST",
            "/api/auth/forgot-password",
            None,
            &json!({ "username": "mallory" }),
        )?)
        .await?;
    assert_eq!(response.status(), StatusCode::OK);
    let unknown = body_json(response).await?;
    ensure!(app.mailer.messages().is_empty());

    let response = app
        .send(json_request(
            "POST",
            "/api/auth/forgot-password",
            None,
            &json!({ "username": "alice" }),
        )?)
        .await?;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(body_json(response).await?, unknown);

    let messages = app.mailer.messages();
    assert_eq!(messages.len(), 1);
    assert_eq!(messages[0].to, "alice");
    let token = reset_token(&messages[0])?;

    let reset = json!({ "token": token, "password": "through-the-glass" });
    let response = app
        .send(json_request("POST", "/api/auth/reset-password", None, &reset)?)
        .await?;
    assert_eq!(response.status(), StatusCode::OK);

    // Single use.
    let response = app
        .send(json_request("POST", "/api/auth/reset-password", None, &reset)?)
        .await?;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(body_json(response).await?["error"], "invalid_token");

    let response = app.sign_in("alice", "wonderland").await?;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    let response = app.sign_in("alice", "through-the-glass").await?;
    assert_eq!(response.status(), StatusCode::OK);
    Ok(())
}

#[tokio::test]
async fn unlock_session_checks_password() -> Result<()> {
    let app = TestApp::new(AuthFlags::new(true, false, false)).await?;
    app.add_user("alice", "wonderland", &["user"]).await?;
    let response = app.sign_in("alice", "wonderland").await?;
    let cookies = cookie_header(response.headers())?;

    let response = app
        .send(json_request(
            "POST",
            "/api/auth/unlock-session",
            Some(&cookies),
            &json!({ "password": "wonderland" }),
        )?)
        .await?;
    assert_eq!(response.status(), StatusCode::OK);

    let response = app
        .send(json_request(
            "POST",
            "/api/auth/unlock-session",
            Some(&cookies),
            &json!({ "password": "nope-nope" }),
        )?)
        .await?;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    Ok(())
}

#[tokio::test]
async fn health_reports_backend() -> Result<()> {
    let app = TestApp::new(AuthFlags::new(true, false, false)).await?;
    let response = app.send(get("/health", None)?).await?;
    assert_eq!(response.status(), StatusCode::OK);
    assert!(response.headers().contains_key("x-app"));
    assert!(response.headers().contains_key("x-request-id"));
    let body = body_json(response).await?;
    assert_eq!(body["backend"], "memory");
    assert_eq!(body["database"], "ok");
    Ok(())
}
