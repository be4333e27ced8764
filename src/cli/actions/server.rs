use crate::{
    api,
    auth::{AuthConfig, AuthFlags, session::generate_session_token},
    cli::telemetry,
};
use anyhow::{Context, Result};
use secrecy::SecretString;
use tracing::{info, warn};
use url::Url;

#[derive(Debug)]
pub struct Args {
    pub port: u16,
    pub dsn: Option<String>,
    pub enable_session: bool,
    pub enable_jwt: bool,
    pub strict: bool,
    pub jwt_secret: Option<SecretString>,
    pub jwt_expires_in_seconds: u64,
    pub jwt_not_before_seconds: u64,
    pub session_ttl_seconds: u64,
    pub cookie_secure: bool,
    pub superadmin_username: Option<String>,
    pub superadmin_password: Option<SecretString>,
    pub frontend_base_url: String,
    pub mail_from: String,
    pub reset_token_ttl_seconds: i64,
    pub login_redirect: String,
}

/// Execute the server action.
/// # Errors
/// Returns an error if the authentication flags are invalid or the server fails to start.
pub async fn execute(args: Args) -> Result<()> {
    log_startup_args(&args);

    let auth_config = auth_config(args.jwt_secret.clone(), &args)?;
    auth_config
        .validate()
        .context("Invalid authentication configuration")?;

    let result = api::new(args.port, args.dsn, auth_config).await;

    telemetry::shutdown_tracer();

    result
}

fn auth_config(jwt_secret: Option<SecretString>, args: &Args) -> Result<AuthConfig> {
    let flags = AuthFlags::new(args.enable_session, args.enable_jwt, args.strict);

    // Token sign-in still decodes tokens when minting is off, so never use an empty key.
    let jwt_secret = match jwt_secret {
        Some(secret) => secret,
        None => {
            if args.enable_jwt {
                anyhow::bail!("missing required argument: --jwt-secret");
            }
            warn!("No JWT secret configured, using a random per-process key");
            SecretString::from(generate_session_token()?)
        }
    };

    Ok(AuthConfig::new(flags, jwt_secret)
        .with_token_expires_in_seconds(args.jwt_expires_in_seconds)
        .with_token_not_before_seconds(args.jwt_not_before_seconds)
        .with_session_ttl_seconds(args.session_ttl_seconds)
        .with_cookie_secure(args.cookie_secure)
        .with_superadmin(
            args.superadmin_username.clone(),
            args.superadmin_password.clone(),
        )
        .with_frontend_base_url(args.frontend_base_url.clone())
        .with_mail_from(args.mail_from.clone())
        .with_reset_token_ttl_seconds(args.reset_token_ttl_seconds)
        .with_login_redirect(args.login_redirect.clone()))
}

fn log_startup_args(args: &Args) {
    let entries = [
        ("listen", format!("tcp:{}", args.port)),
        (
            "dsn",
            args.dsn
                .as_deref()
                .map_or_else(|| "in-memory".to_string(), redact_dsn),
        ),
        ("session", args.enable_session.to_string()),
        ("jwt", args.enable_jwt.to_string()),
        ("strict", args.strict.to_string()),
        ("jwt_secret_set", args.jwt_secret.is_some().to_string()),
        ("jwt_expires_in_seconds", args.jwt_expires_in_seconds.to_string()),
        ("session_ttl_seconds", args.session_ttl_seconds.to_string()),
        ("cookie_secure", args.cookie_secure.to_string()),
        (
            "superadmin",
            args.superadmin_username
                .clone()
                .unwrap_or_else(|| "none".to_string()),
        ),
        ("frontend_base_url", args.frontend_base_url.clone()),
        ("login_redirect", args.login_redirect.clone()),
    ];
    log_entries("Startup configuration", &entries);
}

fn redact_dsn(dsn: &str) -> String {
    match Url::parse(dsn) {
        Ok(mut parsed) => {
            if parsed.password().is_some() {
                let _ = parsed.set_password(Some("REDACTED"));
            }
            parsed.to_string()
        }
        Err(_) => "invalid-dsn".to_string(),
    }
}

fn log_entries(title: &str, entries: &[(&str, String)]) {
    let max_key_len = entries.iter().map(|(key, _)| key.len()).max().unwrap_or(0);
    let mut message = format!(
        "{} {} - {}\n\n{title}:",
        env!("CARGO_PKG_NAME"),
        env!("CARGO_PKG_VERSION"),
        short_commit(crate::GIT_COMMIT_HASH)
    );
    for (key, value) in entries {
        let padding = " ".repeat(max_key_len.saturating_sub(key.len()));
        let _ =
            std::fmt::Write::write_fmt(&mut message, format_args!("\n  {key}:{padding} {value}"));
    }
    info!("{message}");
}

fn short_commit(hash: &str) -> String {
    let trimmed = hash.trim();
    if trimmed.len() > 7 {
        trimmed[..7].to_string()
    } else {
        trimmed.to_string()
    }
}
