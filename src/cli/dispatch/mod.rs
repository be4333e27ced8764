//! Map validated CLI matches to the action to run.

use crate::cli::actions::{Action, server::Args};
use crate::cli::commands::{ARG_DSN, ARG_IN_MEMORY, ARG_PORT, auth};
use anyhow::Result;

/// Map validated CLI matches to a server action.
///
/// # Errors
/// Returns an error if required arguments are missing or inconsistent.
pub fn handler(matches: &clap::ArgMatches) -> Result<Action> {
    let port = matches.get_one::<u16>(ARG_PORT).copied().unwrap_or(8080);

    let dsn = if matches.get_flag(ARG_IN_MEMORY) {
        None
    } else {
        let dsn = matches
            .get_one::<String>(ARG_DSN)
            .cloned()
            .filter(|dsn| !dsn.trim().is_empty());
        if dsn.is_none() {
            anyhow::bail!("missing required argument: --{ARG_DSN}");
        }
        dsn
    };

    let auth_opts = auth::Options::parse(matches)?;

    Ok(Action::Server(Args {
        port,
        dsn,
        enable_session: auth_opts.enable_session,
        enable_jwt: auth_opts.enable_jwt,
        strict: auth_opts.strict,
        jwt_secret: auth_opts.jwt_secret,
        jwt_expires_in_seconds: auth_opts.jwt_expires_in_seconds,
        jwt_not_before_seconds: auth_opts.jwt_not_before_seconds,
        session_ttl_seconds: auth_opts.session_ttl_seconds,
        cookie_secure: auth_opts.cookie_secure,
        superadmin_username: auth_opts.superadmin_username,
        superadmin_password: auth_opts.superadmin_password,
        frontend_base_url: auth_opts.frontend_base_url,
        mail_from: auth_opts.mail_from,
        reset_token_ttl_seconds: auth_opts.reset_token_ttl_seconds,
        login_redirect: auth_opts.login_redirect,
    }))
}
