#![allow(dead_code)]

use anyhow::{Context, Result};
use axum::{
    Router,
    body::{Body, to_bytes},
    http::{HeaderMap, Request, Response, header},
};
use gatehouse::{
    auth::{AuthConfig, AuthFlags, AuthState, MemorySessionStore, password::hash_password},
    mail::{MailMessage, MailSender},
    store::{self, CredentialStore, MemoryCredentialStore, NewUser},
};
use secrecy::SecretString;
use serde_json::Value;
use std::sync::{Arc, Mutex};
use tower::ServiceExt;

pub const SUPERADMIN: &str = "root";
pub const SUPERADMIN_PASSWORD: &str = "root-password";

/// Keeps every message so tests can read reset links.
#[derive(Default)]
pub struct RecordingMailer {
    messages: Mutex<Vec<MailMessage>>,
}

impl RecordingMailer {
    pub fn messages(&self) -> Vec<MailMessage> {
        self.messages
            .lock()
            .map(|messages| messages.clone())
            .unwrap_or_default()
    }
}

impl MailSender for RecordingMailer {
    fn send(&self, message: &MailMessage) -> Result<()> {
        self.messages
            .lock()
            .map_err(|_| anyhow::anyhow!("mailer lock poisoned"))?
            .push(message.clone());
        Ok(())
    }
}

pub struct TestApp {
    pub router: Router,
    pub state: Arc<AuthState>,
    pub mailer: Arc<RecordingMailer>,
}

impl TestApp {
    pub async fn new(flags: AuthFlags) -> Result<Self> {
        let config = AuthConfig::new(flags, SecretString::from("integration-secret".to_string()))
            .with_superadmin(
                Some(SUPERADMIN.to_string()),
                Some(SecretString::from(SUPERADMIN_PASSWORD.to_string())),
            );
        config.validate()?;

        let credentials = MemoryCredentialStore::new();
        store::seed(&credentials).await?;

        let mailer = Arc::new(RecordingMailer::default());
        let state = Arc::new(AuthState::new(
            config,
            Arc::new(credentials),
            Arc::new(MemorySessionStore::new()),
            mailer.clone(),
        ));

        Ok(Self {
            router: gatehouse::api::app(state.clone()),
            state,
            mailer,
        })
    }

    /// Insert a user directly and link `roles`.
    pub async fn add_user(&self, username: &str, password: &str, roles: &[&str]) -> Result<()> {
        let store = self.state.credentials();
        store
            .create_user(NewUser {
                username: username.to_string(),
                name: None,
                avatar: None,
                password_hash: hash_password(password)?,
            })
            .await?;
        for role in roles {
            store.assign_role(username, role).await?;
        }
        Ok(())
    }

    pub async fn send(&self, request: Request<Body>) -> Result<Response<Body>> {
        Ok(self.router.clone().oneshot(request).await?)
    }

    pub async fn sign_in(&self, username: &str, password: &str) -> Result<Response<Body>> {
        self.send(json_request(
            "POST",
            "/api/auth/sign-in",
            None,
            &serde_json::json!({ "username": username, "password": password }),
        )?)
        .await
    }
}

pub fn json_request(
    method: &str,
    uri: &str,
    cookie: Option<&str>,
    body: &Value,
) -> Result<Request<Body>> {
    let mut builder = Request::builder()
        .method(method)
        .uri(uri)
        .header(header::CONTENT_TYPE, "application/json");
    if let Some(cookie) = cookie {
        builder = builder.header(header::COOKIE, cookie);
    }
    Ok(builder.body(Body::from(serde_json::to_vec(body)?))?)
}

pub fn get(uri: &str, cookie: Option<&str>) -> Result<Request<Body>> {
    request("GET", uri, cookie)
}

pub fn request(method: &str, uri: &str, cookie: Option<&str>) -> Result<Request<Body>> {
    let mut builder = Request::builder().method(method).uri(uri);
    if let Some(cookie) = cookie {
        builder = builder.header(header::COOKIE, cookie);
    }
    Ok(builder.body(Body::empty())?)
}

pub async fn body_json(response: Response<Body>) -> Result<Value> {
    let bytes = to_bytes(response.into_body(), 1024 * 1024).await?;
    Ok(serde_json::from_slice(&bytes)?)
}

/// `name=value` pairs from every `Set-Cookie` header.
pub fn set_cookies(headers: &HeaderMap) -> Vec<(String, String)> {
    headers
        .get_all(header::SET_COOKIE)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .filter_map(|value| {
            let pair = value.split(';').next()?;
            let (name, val) = pair.split_once('=')?;
            Some((name.to_string(), val.to_string()))
        })
        .collect()
}

pub fn cookie_value(headers: &HeaderMap, name: &str) -> Option<String> {
    set_cookies(headers)
        .into_iter()
        .find(|(key, _)| key == name)
        .map(|(_, value)| value)
}

/// `Cookie` header value replaying the cookies set on a response.
pub fn cookie_header(headers: &HeaderMap) -> Result<String> {
    let pairs: Vec<String> = set_cookies(headers)
        .into_iter()
        .filter(|(_, value)| !value.is_empty())
        .map(|(name, value)| format!("{name}={value}"))
        .collect();
    if pairs.is_empty() {
        anyhow::bail!("response carried no cookies");
    }
    Ok(pairs.join("; "))
}

/// Pull the raw token out of a reset link in a mail body.
pub fn reset_token(message: &MailMessage) -> Result<String> {
    let (_, rest) = message
        .body
        .split_once("#token=")
        .context("reset link missing from mail body")?;
    Ok(rest.split_whitespace().next().unwrap_or_default().to_string())
}
