//! Outbound mail abstraction.
//!
//! Delivery is delegated to a `MailSender`. The default `LogMailSender`
//! writes the message to the log instead of sending it, which is enough for
//! local development and tests.

use anyhow::Result;
use tracing::info;

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MailMessage {
    pub from: String,
    pub to: String,
    pub subject: String,
    pub body: String,
}

/// Mail delivery abstraction.
pub trait MailSender: Send + Sync {
    /// Deliver a message or return an error.
    fn send(&self, message: &MailMessage) -> Result<()>;
}

/// Logs the envelope instead of sending real mail. The body is not logged
/// because it carries the reset link.
#[derive(Clone, Debug)]
pub struct LogMailSender;

impl MailSender for LogMailSender {
    fn send(&self, message: &MailMessage) -> Result<()> {
        info!(
            from = %message.from,
            to = %message.to,
            subject = %message.subject,
            "mail send stub"
        );
        Ok(())
    }
}

/// Build the frontend reset link included in password reset mail.
#[must_use]
pub fn build_reset_url(frontend_base_url: &str, token: &str) -> String {
    let base = frontend_base_url.trim_end_matches('/');
    format!("{base}/reset-password#token={token}")
}

#[must_use]
pub fn password_reset_message(from: &str, to: &str, reset_url: &str) -> MailMessage {
    MailMessage {
        from: from.to_string(),
        to: to.to_string(),
        subject: "Reset your password".to_string(),
        body: format!(
            "A password reset was requested for {to}.\n\n\
             Open the link below to choose a new password:\n\n\
             {reset_url}\n\n\
             If you did not request this, you can ignore this message."
        ),
    }
}
