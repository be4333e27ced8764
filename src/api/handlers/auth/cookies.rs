//! `Set-Cookie` values for the session and access-token cookies.

use axum::http::{HeaderValue, header::InvalidHeaderValue};

use crate::auth::{AuthConfig, session::SESSION_COOKIE_NAME, token::ACCESS_TOKEN_COOKIE};

fn cookie(
    name: &str,
    value: &str,
    max_age: u64,
    secure: bool,
) -> Result<HeaderValue, InvalidHeaderValue> {
    // Only mark cookies secure when the frontend is served over HTTPS.
    let mut cookie = format!("{name}={value}; Path=/; HttpOnly; SameSite=Lax; Max-Age={max_age}");
    if secure {
        cookie.push_str("; Secure");
    }
    HeaderValue::from_str(&cookie)
}

pub fn session_cookie(config: &AuthConfig, token: &str) -> Result<HeaderValue, InvalidHeaderValue> {
    cookie(
        SESSION_COOKIE_NAME,
        token,
        config.session_ttl().as_secs(),
        config.cookie_secure(),
    )
}

pub fn access_token_cookie(
    config: &AuthConfig,
    token: &str,
) -> Result<HeaderValue, InvalidHeaderValue> {
    cookie(
        ACCESS_TOKEN_COOKIE,
        token,
        config.token_expires_in().as_secs(),
        config.cookie_secure(),
    )
}

pub fn clear_session_cookie(config: &AuthConfig) -> Result<HeaderValue, InvalidHeaderValue> {
    cookie(SESSION_COOKIE_NAME, "", 0, config.cookie_secure())
}

pub fn clear_access_token_cookie(config: &AuthConfig) -> Result<HeaderValue, InvalidHeaderValue> {
    cookie(ACCESS_TOKEN_COOKIE, "", 0, config.cookie_secure())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::AuthFlags;
    use anyhow::Result;
    use secrecy::SecretString;

    fn config(secure: bool) -> AuthConfig {
        AuthConfig::new(
            AuthFlags::new(true, true, false),
            SecretString::from("cookie-secret".to_string()),
        )
        .with_session_ttl_seconds(600)
        .with_token_expires_in_seconds(60)
        .with_cookie_secure(secure)
    }

    #[test]
    fn session_cookie_attributes() -> Result<()> {
        let value = session_cookie(&config(false), "abc")?;
        assert_eq!(
            value.to_str()?,
            "gatehouse_session=abc; Path=/; HttpOnly; SameSite=Lax; Max-Age=600"
        );
        Ok(())
    }

    #[test]
    fn access_token_cookie_is_secure_when_configured() -> Result<()> {
        let value = access_token_cookie(&config(true), "jwt")?;
        assert_eq!(
            value.to_str()?,
            "accessToken=jwt; Path=/; HttpOnly; SameSite=Lax; Max-Age=60; Secure"
        );
        Ok(())
    }

    #[test]
    fn clearing_cookies_expires_them() -> Result<()> {
        let config = config(false);
        assert!(clear_session_cookie(&config)?.to_str()?.contains("Max-Age=0"));
        assert!(
            clear_access_token_cookie(&config)?
                .to_str()?
                .starts_with("accessToken=;")
        );
        Ok(())
    }
}
