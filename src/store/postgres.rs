use anyhow::{Context, Result};
use async_trait::async_trait;
use sqlx::{Connection, PgPool, Row};
use std::collections::HashMap;
use tracing::Instrument;
use uuid::Uuid;

use super::{
    CreateOutcome, CredentialStore, LinkOutcome, NewUser, UserQuery, UserRecord, UserSummary,
    UserUpdate,
};
use crate::auth::identity::RoleRef;

const SCHEMA_SQL: &str = include_str!(concat!(env!("CARGO_MANIFEST_DIR"), "/sql/schema.sql"));

/// Apply `sql/schema.sql` statement by statement.
///
/// # Errors
/// Returns an error naming the first statement that failed.
pub async fn apply_schema(pool: &PgPool) -> Result<()> {
    for (index, statement) in split_sql_statements(SCHEMA_SQL).iter().enumerate() {
        let span = tracing::info_span!(
            "db.query",
            db.system = "postgresql",
            db.operation = "DDL",
            db.statement = statement.as_str()
        );
        sqlx::query(statement)
            .execute(pool)
            .instrument(span)
            .await
            .with_context(|| format!("failed to execute schema statement {}", index + 1))?;
    }
    Ok(())
}

fn split_sql_statements(sql: &str) -> Vec<String> {
    let mut statements = Vec::new();
    let mut current = String::new();

    for line in sql.lines() {
        let trimmed = line.trim();
        if trimmed.starts_with("--") {
            continue;
        }
        current.push_str(line);
        current.push('\n');

        if trimmed.ends_with(';') {
            let statement = current.trim();
            if !statement.is_empty() {
                statements.push(statement.to_string());
            }
            current.clear();
        }
    }

    let leftover = current.trim();
    if !leftover.is_empty() {
        statements.push(leftover.to_string());
    }

    statements
}

fn is_unique_violation(err: &sqlx::Error) -> bool {
    match err {
        sqlx::Error::Database(db_err) => db_err.code().is_some_and(|code| code.as_ref() == "23505"),
        _ => false,
    }
}

#[derive(Clone, Debug)]
pub struct PgCredentialStore {
    pool: PgPool,
}

impl PgCredentialStore {
    #[must_use]
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    #[must_use]
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    async fn roles_for(&self, user_ids: &[Uuid]) -> Result<HashMap<Uuid, Vec<RoleRef>>> {
        let query = r"
            SELECT ur.user_id, r.tag, r.title
            FROM user_roles ur
            JOIN roles r ON r.id = ur.role_id
            WHERE ur.user_id = ANY($1)
            ORDER BY r.tag
        ";
        let span = tracing::info_span!(
            "db.query",
            db.system = "postgresql",
            db.operation = "SELECT",
            db.statement = query
        );
        let rows = sqlx::query(query)
            .bind(user_ids)
            .fetch_all(&self.pool)
            .instrument(span)
            .await
            .context("failed to load user roles")?;

        let mut roles: HashMap<Uuid, Vec<RoleRef>> = HashMap::new();
        for row in rows {
            roles
                .entry(row.get("user_id"))
                .or_default()
                .push(RoleRef::new(row.get::<String, _>("tag"), row.get::<String, _>("title")));
        }
        Ok(roles)
    }

    async fn summary(&self, username: &str) -> Result<Option<UserSummary>> {
        Ok(self
            .find_user(username)
            .await?
            .map(|record| record.summary()))
    }
}

#[async_trait]
impl CredentialStore for PgCredentialStore {
    fn backend(&self) -> &'static str {
        "postgresql"
    }

    async fn ping(&self) -> Result<()> {
        let acquire_span = tracing::info_span!(
            "db.acquire",
            db.system = "postgresql",
            db.operation = "ACQUIRE"
        );
        let mut conn = self
            .pool
            .acquire()
            .instrument(acquire_span)
            .await
            .context("failed to acquire database connection")?;
        let ping_span =
            tracing::info_span!("db.ping", db.system = "postgresql", db.operation = "PING");
        conn.ping()
            .instrument(ping_span)
            .await
            .context("failed to ping database")
    }

    async fn find_user(&self, username: &str) -> Result<Option<UserRecord>> {
        let query = "SELECT id, username, name, avatar, password_hash FROM users WHERE username = $1";
        let span = tracing::info_span!(
            "db.query",
            db.system = "postgresql",
            db.operation = "SELECT",
            db.statement = query
        );
        let row = sqlx::query(query)
            .bind(username)
            .fetch_optional(&self.pool)
            .instrument(span)
            .await
            .context("failed to lookup user")?;

        let Some(row) = row else {
            return Ok(None);
        };
        let id: Uuid = row.get("id");
        let mut roles = self.roles_for(&[id]).await?;
        Ok(Some(UserRecord {
            id,
            username: row.get("username"),
            name: row.get("name"),
            avatar: row.get("avatar"),
            password_hash: row.get("password_hash"),
            roles: roles.remove(&id).unwrap_or_default(),
        }))
    }

    async fn list_users(&self, query: &UserQuery) -> Result<(Vec<UserSummary>, u64)> {
        let filter = r"
            WHERE ($1::text IS NULL
                   OR strpos(lower(u.username), lower($1)) > 0
                   OR strpos(lower(coalesce(u.name, '')), lower($1)) > 0)
              AND ($2::text IS NULL OR EXISTS (
                   SELECT 1 FROM user_roles ur
                   JOIN roles r ON r.id = ur.role_id
                   WHERE ur.user_id = u.id AND r.tag = $2))
        ";
        let search = query.search.as_deref().filter(|s| !s.is_empty());
        let role = query.role.as_deref().filter(|s| !s.is_empty());

        let count_query = format!("SELECT COUNT(*) AS total FROM users u {filter}");
        let span = tracing::info_span!(
            "db.query",
            db.system = "postgresql",
            db.operation = "SELECT",
            db.statement = count_query.as_str()
        );
        let total: i64 = sqlx::query(&count_query)
            .bind(search)
            .bind(role)
            .fetch_one(&self.pool)
            .instrument(span)
            .await
            .context("failed to count users")?
            .get("total");

        // Sort column and direction come from closed enums, never from input text.
        let order = query.sort.map_or_else(
            || "u.username ASC".to_string(),
            |(field, order)| format!("u.{} {}", field.column(), order.keyword()),
        );
        let page_query = format!(
            "SELECT u.id, u.username, u.name, u.avatar FROM users u {filter} ORDER BY {order} LIMIT $3 OFFSET $4"
        );
        let span = tracing::info_span!(
            "db.query",
            db.system = "postgresql",
            db.operation = "SELECT",
            db.statement = page_query.as_str()
        );
        let rows = sqlx::query(&page_query)
            .bind(search)
            .bind(role)
            .bind(i64::from(query.page_size))
            .bind(i64::try_from(query.offset()).unwrap_or(i64::MAX))
            .fetch_all(&self.pool)
            .instrument(span)
            .await
            .context("failed to list users")?;

        let ids: Vec<Uuid> = rows.iter().map(|row| row.get("id")).collect();
        let mut roles = self.roles_for(&ids).await?;
        let users = rows
            .into_iter()
            .map(|row| {
                let id: Uuid = row.get("id");
                UserSummary {
                    id: id.to_string(),
                    username: row.get("username"),
                    name: row.get("name"),
                    avatar: row.get("avatar"),
                    roles: roles.remove(&id).unwrap_or_default(),
                }
            })
            .collect();

        Ok((users, u64::try_from(total).unwrap_or(0)))
    }

    async fn create_user(&self, user: NewUser) -> Result<CreateOutcome<UserSummary>> {
        let query = r"
            INSERT INTO users (id, username, name, avatar, password_hash)
            VALUES ($1, $2, $3, $4, $5)
        ";
        let span = tracing::info_span!(
            "db.query",
            db.system = "postgresql",
            db.operation = "INSERT",
            db.statement = query
        );
        let id = Uuid::new_v4();
        let result = sqlx::query(query)
            .bind(id)
            .bind(&user.username)
            .bind(&user.name)
            .bind(&user.avatar)
            .bind(&user.password_hash)
            .execute(&self.pool)
            .instrument(span)
            .await;

        match result {
            Ok(_) => Ok(CreateOutcome::Created(UserSummary {
                id: id.to_string(),
                username: user.username,
                name: user.name,
                avatar: user.avatar,
                roles: Vec::new(),
            })),
            Err(err) if is_unique_violation(&err) => Ok(CreateOutcome::Conflict),
            Err(err) => Err(err).context("failed to insert user"),
        }
    }

    async fn update_user(
        &self,
        username: &str,
        update: UserUpdate,
    ) -> Result<Option<UserSummary>> {
        let query = r"
            UPDATE users
            SET name = COALESCE($2, name),
                avatar = COALESCE($3, avatar),
                password_hash = COALESCE($4, password_hash),
                updated_at = NOW()
            WHERE username = $1
        ";
        let span = tracing::info_span!(
            "db.query",
            db.system = "postgresql",
            db.operation = "UPDATE",
            db.statement = query
        );
        let result = sqlx::query(query)
            .bind(username)
            .bind(update.name)
            .bind(update.avatar)
            .bind(update.password_hash)
            .execute(&self.pool)
            .instrument(span)
            .await
            .context("failed to update user")?;

        if result.rows_affected() == 0 {
            return Ok(None);
        }
        self.summary(username).await
    }

    async fn delete_user(&self, username: &str) -> Result<bool> {
        let query = "DELETE FROM users WHERE username = $1";
        let span = tracing::info_span!(
            "db.query",
            db.system = "postgresql",
            db.operation = "DELETE",
            db.statement = query
        );
        let result = sqlx::query(query)
            .bind(username)
            .execute(&self.pool)
            .instrument(span)
            .await
            .context("failed to delete user")?;
        Ok(result.rows_affected() > 0)
    }

    async fn list_roles(&self) -> Result<Vec<RoleRef>> {
        let query = "SELECT tag, title FROM roles ORDER BY tag";
        let span = tracing::info_span!(
            "db.query",
            db.system = "postgresql",
            db.operation = "SELECT",
            db.statement = query
        );
        let rows = sqlx::query(query)
            .fetch_all(&self.pool)
            .instrument(span)
            .await
            .context("failed to list roles")?;
        Ok(rows
            .into_iter()
            .map(|row| RoleRef::new(row.get::<String, _>("tag"), row.get::<String, _>("title")))
            .collect())
    }

    async fn create_role(&self, role: RoleRef) -> Result<CreateOutcome<RoleRef>> {
        let query = "INSERT INTO roles (id, tag, title) VALUES ($1, $2, $3)";
        let span = tracing::info_span!(
            "db.query",
            db.system = "postgresql",
            db.operation = "INSERT",
            db.statement = query
        );
        let result = sqlx::query(query)
            .bind(Uuid::new_v4())
            .bind(&role.tag)
            .bind(&role.title)
            .execute(&self.pool)
            .instrument(span)
            .await;

        match result {
            Ok(_) => Ok(CreateOutcome::Created(role)),
            Err(err) if is_unique_violation(&err) => Ok(CreateOutcome::Conflict),
            Err(err) => Err(err).context("failed to insert role"),
        }
    }

    async fn delete_role(&self, tag: &str) -> Result<bool> {
        let query = "DELETE FROM roles WHERE tag = $1";
        let span = tracing::info_span!(
            "db.query",
            db.system = "postgresql",
            db.operation = "DELETE",
            db.statement = query
        );
        let result = sqlx::query(query)
            .bind(tag)
            .execute(&self.pool)
            .instrument(span)
            .await
            .context("failed to delete role")?;
        Ok(result.rows_affected() > 0)
    }

    async fn assign_role(&self, username: &str, tag: &str) -> Result<LinkOutcome> {
        let query = r"
            SELECT u.id AS user_id, r.id AS role_id
            FROM users u, roles r
            WHERE u.username = $1 AND r.tag = $2
        ";
        let span = tracing::info_span!(
            "db.query",
            db.system = "postgresql",
            db.operation = "SELECT",
            db.statement = query
        );
        let row = sqlx::query(query)
            .bind(username)
            .bind(tag)
            .fetch_optional(&self.pool)
            .instrument(span)
            .await
            .context("failed to resolve role link")?;

        let Some(row) = row else {
            return Ok(LinkOutcome::Missing);
        };
        let user_id: Uuid = row.get("user_id");
        let role_id: Uuid = row.get("role_id");

        let query = r"
            INSERT INTO user_roles (user_id, role_id)
            VALUES ($1, $2)
            ON CONFLICT DO NOTHING
        ";
        let span = tracing::info_span!(
            "db.query",
            db.system = "postgresql",
            db.operation = "INSERT",
            db.statement = query
        );
        sqlx::query(query)
            .bind(user_id)
            .bind(role_id)
            .execute(&self.pool)
            .instrument(span)
            .await
            .context("failed to insert role link")?;
        Ok(LinkOutcome::Linked)
    }

    async fn revoke_role(&self, username: &str, tag: &str) -> Result<bool> {
        let query = r"
            DELETE FROM user_roles ur
            USING users u, roles r
            WHERE ur.user_id = u.id
              AND ur.role_id = r.id
              AND u.username = $1
              AND r.tag = $2
        ";
        let span = tracing::info_span!(
            "db.query",
            db.system = "postgresql",
            db.operation = "DELETE",
            db.statement = query
        );
        let result = sqlx::query(query)
            .bind(username)
            .bind(tag)
            .execute(&self.pool)
            .instrument(span)
            .await
            .context("failed to delete role link")?;
        Ok(result.rows_affected() > 0)
    }

    async fn has_role(&self, username: &str, tag: &str) -> Result<bool> {
        let query = r"
            SELECT EXISTS (
                SELECT 1
                FROM user_roles ur
                JOIN users u ON u.id = ur.user_id
                JOIN roles r ON r.id = ur.role_id
                WHERE u.username = $1 AND r.tag = $2
            ) AS linked
        ";
        let span = tracing::info_span!(
            "db.query",
            db.system = "postgresql",
            db.operation = "SELECT",
            db.statement = query
        );
        let row = sqlx::query(query)
            .bind(username)
            .bind(tag)
            .fetch_one(&self.pool)
            .instrument(span)
            .await
            .context("failed to check role link")?;
        Ok(row.get("linked"))
    }

    async fn store_reset_token(
        &self,
        username: &str,
        token_hash: Vec<u8>,
        ttl_seconds: i64,
    ) -> Result<bool> {
        let mut tx = self
            .pool
            .begin()
            .await
            .context("begin reset token transaction")?;

        let query = r"
            DELETE FROM password_reset_tokens t
            USING users u
            WHERE t.user_id = u.id AND u.username = $1
        ";
        let span = tracing::info_span!(
            "db.query",
            db.system = "postgresql",
            db.operation = "DELETE",
            db.statement = query
        );
        sqlx::query(query)
            .bind(username)
            .execute(&mut *tx)
            .instrument(span)
            .await
            .context("failed to clear previous reset tokens")?;

        let query = r"
            INSERT INTO password_reset_tokens (token_hash, user_id, expires_at)
            SELECT $2, id, NOW() + ($3 * INTERVAL '1 second')
            FROM users
            WHERE username = $1
        ";
        let span = tracing::info_span!(
            "db.query",
            db.system = "postgresql",
            db.operation = "INSERT",
            db.statement = query
        );
        let result = sqlx::query(query)
            .bind(username)
            .bind(token_hash)
            .bind(ttl_seconds)
            .execute(&mut *tx)
            .instrument(span)
            .await
            .context("failed to insert reset token")?;

        tx.commit().await.context("commit reset token transaction")?;
        Ok(result.rows_affected() > 0)
    }

    async fn consume_reset_token(&self, token_hash: &[u8]) -> Result<Option<String>> {
        let query = r"
            DELETE FROM password_reset_tokens t
            USING users u
            WHERE t.user_id = u.id AND t.token_hash = $1
            RETURNING u.username, t.expires_at > NOW() AS valid
        ";
        let span = tracing::info_span!(
            "db.query",
            db.system = "postgresql",
            db.operation = "DELETE",
            db.statement = query
        );
        let row = sqlx::query(query)
            .bind(token_hash)
            .fetch_optional(&self.pool)
            .instrument(span)
            .await
            .context("failed to consume reset token")?;

        Ok(row.and_then(|row| {
            let valid: bool = row.get("valid");
            valid.then(|| row.get("username"))
        }))
    }
}
