use clap::{Arg, ArgAction, ArgMatches, Command, builder::BoolishValueParser};
use secrecy::SecretString;

pub const ARG_ENABLE_SESSION: &str = "enable-session";
pub const ARG_ENABLE_JWT: &str = "enable-jwt";
pub const ARG_STRICT_AUTHENTICATION: &str = "strict-authentication";
pub const ARG_JWT_SECRET: &str = "jwt-secret";
pub const ARG_JWT_EXPIRES_IN_SECONDS: &str = "jwt-expires-in-seconds";
pub const ARG_JWT_NOT_BEFORE_SECONDS: &str = "jwt-not-before-seconds";
pub const ARG_SESSION_TTL_SECONDS: &str = "session-ttl-seconds";
pub const ARG_COOKIE_SECURE: &str = "cookie-secure";
pub const ARG_SUPERADMIN_USERNAME: &str = "superadmin-username";
pub const ARG_SUPERADMIN_PASSWORD: &str = "superadmin-password";
pub const ARG_FRONTEND_BASE_URL: &str = "frontend-base-url";
pub const ARG_MAIL_FROM: &str = "mail-from";
pub const ARG_RESET_TOKEN_TTL_SECONDS: &str = "reset-token-ttl-seconds";
pub const ARG_LOGIN_REDIRECT: &str = "login-redirect";

/// Upper bound for `--session-ttl-seconds` (one year).
pub const MAX_SESSION_TTL_SECONDS: u64 = 365 * 24 * 60 * 60;

/// Authentication settings as read from the command line or environment.
#[derive(Debug)]
pub struct Options {
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

impl Options {
    /// Parse authentication arguments from matches.
    ///
    /// # Errors
    /// Returns an error if a required argument is missing, including
    /// `--jwt-secret` when tokens are enabled.
    pub fn parse(matches: &ArgMatches) -> anyhow::Result<Self> {
        let read_required = |id: &str| {
            matches
                .get_one::<String>(id)
                .cloned()
                .ok_or_else(|| anyhow::anyhow!("missing required argument: --{id}"))
        };
        let read_u64 = |id: &str| {
            matches
                .get_one::<u64>(id)
                .copied()
                .ok_or_else(|| anyhow::anyhow!("missing required argument: --{id}"))
        };
        // Env vars set to "" reach us as empty strings.
        let get_non_empty = |id: &str| {
            matches
                .get_one::<String>(id)
                .cloned()
                .filter(|v| !v.trim().is_empty())
        };

        let enable_jwt = matches.get_flag(ARG_ENABLE_JWT);
        let jwt_secret = get_non_empty(ARG_JWT_SECRET).map(SecretString::from);
        if enable_jwt && jwt_secret.is_none() {
            anyhow::bail!("missing required argument: --{ARG_JWT_SECRET}");
        }

        Ok(Self {
            enable_session: matches.get_flag(ARG_ENABLE_SESSION),
            enable_jwt,
            strict: matches.get_flag(ARG_STRICT_AUTHENTICATION),
            jwt_secret,
            jwt_expires_in_seconds: read_u64(ARG_JWT_EXPIRES_IN_SECONDS)?,
            jwt_not_before_seconds: read_u64(ARG_JWT_NOT_BEFORE_SECONDS)?,
            session_ttl_seconds: read_u64(ARG_SESSION_TTL_SECONDS)?,
            cookie_secure: matches.get_flag(ARG_COOKIE_SECURE),
            superadmin_username: get_non_empty(ARG_SUPERADMIN_USERNAME),
            superadmin_password: get_non_empty(ARG_SUPERADMIN_PASSWORD).map(SecretString::from),
            frontend_base_url: read_required(ARG_FRONTEND_BASE_URL)?,
            mail_from: read_required(ARG_MAIL_FROM)?,
            reset_token_ttl_seconds: matches
                .get_one::<i64>(ARG_RESET_TOKEN_TTL_SECONDS)
                .copied()
                .ok_or_else(|| {
                    anyhow::anyhow!("missing required argument: --{ARG_RESET_TOKEN_TTL_SECONDS}")
                })?,
            login_redirect: read_required(ARG_LOGIN_REDIRECT)?,
        })
    }
}

#[must_use]
pub fn with_args(command: Command) -> Command {
    let command = with_method_args(command);
    let command = with_token_args(command);
    let command = with_superadmin_args(command);
    with_frontend_args(command)
}

fn flag(id: &'static str, help: &'static str, env: &'static str) -> Arg {
    Arg::new(id)
        .long(id)
        .help(help)
        .env(env)
        .action(ArgAction::SetTrue)
        .value_parser(BoolishValueParser::new())
}

fn with_method_args(command: Command) -> Command {
    command
        .arg(flag(
            ARG_ENABLE_SESSION,
            "Authenticate requests with server-side sessions",
            "GATEHOUSE_ENABLE_SESSION",
        ))
        .arg(flag(
            ARG_ENABLE_JWT,
            "Authenticate requests with signed access tokens",
            "GATEHOUSE_ENABLE_JWT",
        ))
        .arg(
            flag(
                ARG_STRICT_AUTHENTICATION,
                "Require both a session and an access token on every request",
                "GATEHOUSE_STRICT_AUTHENTICATION",
            )
            .long_help(
                "Require both a session and an access token on every request.\n\nNeeds --enable-session and --enable-jwt; the server refuses to start otherwise.",
            ),
        )
        .arg(
            Arg::new(ARG_SESSION_TTL_SECONDS)
                .long(ARG_SESSION_TTL_SECONDS)
                .help("Session TTL in seconds")
                .env("GATEHOUSE_SESSION_TTL_SECONDS")
                .default_value("43200")
                .value_parser(clap::value_parser!(u64).range(1..=MAX_SESSION_TTL_SECONDS)),
        )
        .arg(flag(
            ARG_COOKIE_SECURE,
            "Mark auth cookies as Secure",
            "GATEHOUSE_COOKIE_SECURE",
        ))
}

fn with_token_args(command: Command) -> Command {
    command
        .arg(
            Arg::new(ARG_JWT_SECRET)
                .long(ARG_JWT_SECRET)
                .help("HMAC secret used to sign access tokens")
                .env("GATEHOUSE_JWT_SECRET")
                .hide_env_values(true),
        )
        .arg(
            Arg::new(ARG_JWT_EXPIRES_IN_SECONDS)
                .long(ARG_JWT_EXPIRES_IN_SECONDS)
                .help("Access token lifetime in seconds")
                .env("GATEHOUSE_JWT_EXPIRES_IN_SECONDS")
                .default_value("3600")
                .value_parser(clap::value_parser!(u64)),
        )
        .arg(
            Arg::new(ARG_JWT_NOT_BEFORE_SECONDS)
                .long(ARG_JWT_NOT_BEFORE_SECONDS)
                .help("Delay before a new access token becomes valid")
                .env("GATEHOUSE_JWT_NOT_BEFORE_SECONDS")
                .default_value("0")
                .value_parser(clap::value_parser!(u64)),
        )
}

fn with_superadmin_args(command: Command) -> Command {
    command
        .arg(
            Arg::new(ARG_SUPERADMIN_USERNAME)
                .long(ARG_SUPERADMIN_USERNAME)
                .help("Username that signs in against the configured password")
                .env("GATEHOUSE_SUPERADMIN_USERNAME")
                .requires(ARG_SUPERADMIN_PASSWORD),
        )
        .arg(
            Arg::new(ARG_SUPERADMIN_PASSWORD)
                .long(ARG_SUPERADMIN_PASSWORD)
                .help("Super-admin password")
                .env("GATEHOUSE_SUPERADMIN_PASSWORD")
                .hide_env_values(true)
                .requires(ARG_SUPERADMIN_USERNAME),
        )
}

fn with_frontend_args(command: Command) -> Command {
    command
        .arg(
            Arg::new(ARG_FRONTEND_BASE_URL)
                .long(ARG_FRONTEND_BASE_URL)
                .help("Frontend base URL used for CORS and password reset links")
                .env("GATEHOUSE_FRONTEND_BASE_URL")
                .default_value("http://localhost:8080"),
        )
        .arg(
            Arg::new(ARG_LOGIN_REDIRECT)
                .long(ARG_LOGIN_REDIRECT)
                .help("Where unauthenticated page requests are redirected")
                .env("GATEHOUSE_LOGIN_REDIRECT")
                .default_value("/login?status=failed"),
        )
        .arg(
            Arg::new(ARG_MAIL_FROM)
                .long(ARG_MAIL_FROM)
                .help("Sender address for password reset mail")
                .env("GATEHOUSE_MAIL_FROM")
                .default_value("no-reply@gatehouse.dev"),
        )
        .arg(
            Arg::new(ARG_RESET_TOKEN_TTL_SECONDS)
                .long(ARG_RESET_TOKEN_TTL_SECONDS)
                .help("Password reset token TTL in seconds")
                .env("GATEHOUSE_RESET_TOKEN_TTL_SECONDS")
                .default_value("1800")
                .value_parser(clap::value_parser!(i64)),
        )
}
