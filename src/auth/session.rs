//! Server-side sessions keyed by an opaque cookie value.

use anyhow::{Context, Result};
use async_trait::async_trait;
use base64::Engine;
use rand::{RngCore, rngs::OsRng};
use sha2::{Digest, Sha256};
use sqlx::{PgPool, Row};
use std::collections::HashMap;
use std::time::{Duration, Instant};
use tokio::sync::Mutex;
use tracing::Instrument;

use super::identity::Identity;

pub const SESSION_COOKIE_NAME: &str = "gatehouse_session";

/// Create a new session token for the session cookie.
/// The raw value is only returned to set the cookie; stores keep a hash.
pub fn generate_session_token() -> Result<String> {
    let mut bytes = [0u8; 32];
    OsRng
        .try_fill_bytes(&mut bytes)
        .context("failed to generate session token")?;
    Ok(base64::engine::general_purpose::URL_SAFE_NO_PAD.encode(bytes))
}

#[must_use]
pub fn hash_session_token(token: &str) -> Vec<u8> {
    let mut hasher = Sha256::new();
    hasher.update(token.as_bytes());
    hasher.finalize().to_vec()
}

#[async_trait]
pub trait SessionStore: Send + Sync {
    /// Persist `identity` and return the raw cookie value.
    async fn create(&self, identity: &Identity, ttl: Duration) -> Result<String>;

    /// Resolve a cookie value. Expired or unknown sessions yield `None`.
    async fn lookup(&self, token: &str) -> Result<Option<Identity>>;

    async fn destroy(&self, token: &str) -> Result<()>;

    /// Delete every expired session and return how many were removed.
    async fn prune_expired(&self) -> Result<u64>;
}

const PRUNE_EXPIRED_SESSIONS: &str = "DELETE FROM sessions WHERE expires_at <= NOW()";

#[derive(Clone, Debug)]
pub struct PgSessionStore {
    pool: PgPool,
}

impl PgSessionStore {
    #[must_use]
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl SessionStore for PgSessionStore {
    async fn create(&self, identity: &Identity, ttl: Duration) -> Result<String> {
        // Sign-ins keep the table bounded; lookups already ignore expired rows.
        self.prune_expired().await?;

        let token = generate_session_token()?;
        let token_hash = hash_session_token(&token);
        let payload = serde_json::to_string(identity).context("failed to encode session")?;
        let ttl_seconds = i64::try_from(ttl.as_secs()).unwrap_or(i64::MAX);

        let query = r"
            INSERT INTO sessions (token_hash, identity, expires_at)
            VALUES ($1, $2::jsonb, NOW() + ($3 * INTERVAL '1 second'))
        ";
        let span = tracing::info_span!(
            "db.query",
            db.system = "postgresql",
            db.operation = "INSERT",
            db.statement = query
        );
        sqlx::query(query)
            .bind(token_hash)
            .bind(payload)
            .bind(ttl_seconds)
            .execute(&self.pool)
            .instrument(span)
            .await
            .context("failed to insert session")?;

        Ok(token)
    }

    async fn lookup(&self, token: &str) -> Result<Option<Identity>> {
        let token_hash = hash_session_token(token);
        let query = r"
            SELECT identity::text AS identity
            FROM sessions
            WHERE token_hash = $1 AND expires_at > NOW()
        ";
        let span = tracing::info_span!(
            "db.query",
            db.system = "postgresql",
            db.operation = "SELECT",
            db.statement = query
        );
        let row = sqlx::query(query)
            .bind(token_hash)
            .fetch_optional(&self.pool)
            .instrument(span)
            .await
            .context("failed to lookup session")?;

        row.map(|row| {
            let payload: String = row.get("identity");
            serde_json::from_str(&payload).context("failed to decode session")
        })
        .transpose()
    }

    async fn destroy(&self, token: &str) -> Result<()> {
        let token_hash = hash_session_token(token);
        let query = "DELETE FROM sessions WHERE token_hash = $1";
        let span = tracing::info_span!(
            "db.query",
            db.system = "postgresql",
            db.operation = "DELETE",
            db.statement = query
        );
        sqlx::query(query)
            .bind(token_hash)
            .execute(&self.pool)
            .instrument(span)
            .await
            .context("failed to delete session")?;
        Ok(())
    }

    async fn prune_expired(&self) -> Result<u64> {
        let span = tracing::info_span!(
            "db.query",
            db.system = "postgresql",
            db.operation = "DELETE",
            db.statement = PRUNE_EXPIRED_SESSIONS
        );
        let result = sqlx::query(PRUNE_EXPIRED_SESSIONS)
            .execute(&self.pool)
            .instrument(span)
            .await
            .context("failed to prune expired sessions")?;
        Ok(result.rows_affected())
    }
}

#[derive(Debug, Default)]
pub struct MemorySessionStore {
    sessions: Mutex<HashMap<Vec<u8>, (Identity, Instant)>>,
}

impl MemorySessionStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl SessionStore for MemorySessionStore {
    async fn create(&self, identity: &Identity, ttl: Duration) -> Result<String> {
        let now = Instant::now();
        let expires_at = now
            .checked_add(ttl)
            .context("session ttl is out of range")?;
        let token = generate_session_token()?;
        let mut sessions = self.sessions.lock().await;
        sessions.retain(|_, (_, expires_at)| *expires_at > now);
        sessions.insert(hash_session_token(&token), (identity.clone(), expires_at));
        Ok(token)
    }

    async fn lookup(&self, token: &str) -> Result<Option<Identity>> {
        let sessions = self.sessions.lock().await;
        Ok(sessions
            .get(&hash_session_token(token))
            .filter(|(_, expires_at)| *expires_at > Instant::now())
            .map(|(identity, _)| identity.clone()))
    }

    async fn destroy(&self, token: &str) -> Result<()> {
        self.sessions.lock().await.remove(&hash_session_token(token));
        Ok(())
    }

    async fn prune_expired(&self) -> Result<u64> {
        let now = Instant::now();
        let mut sessions = self.sessions.lock().await;
        let before = sessions.len();
        sessions.retain(|_, (_, expires_at)| *expires_at > now);
        Ok((before - sessions.len()) as u64)
    }
}
