//! Outbound email, fire-and-forget.
//!
//! Delivery failures are logged and never propagated to the request that
//! triggered them; nothing is retried.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum MailError {
    #[error("Mail transport failed: {0}")]
    Transport(String),
}

/// Transport seam. The production binary wires in [`LogMailer`]; deployments
/// with a real relay implement this trait.
pub trait Mailer: Send + Sync {
    fn send(&self, to: &str, subject: &str, body: &str) -> Result<(), MailError>;
}

/// Default transport: records the message in the log stream.
pub struct LogMailer;

impl Mailer for LogMailer {
    fn send(&self, to: &str, subject: &str, _body: &str) -> Result<(), MailError> {
        tracing::info!(to, subject, "outbound email");
        Ok(())
    }
}

/// Send without surfacing errors to the caller.
pub fn send_fire_and_forget(mailer: &dyn Mailer, to: &str, subject: &str, body: &str) {
    if let Err(err) = mailer.send(to, subject, body) {
        tracing::error!(to, subject, %err, "failed to send email");
    }
}

pub fn welcome_message(name: &str) -> (String, String) {
    (
        "Welcome to rxportal".to_string(),
        format!(
            "Hello {name},\n\n\
             Welcome to rxportal! Your account has been created successfully.\n\
             You can now log in and start using our services.\n\n\
             Best regards,\nThe rxportal team"
        ),
    )
}

pub fn password_reset_message(name: &str, token: &str) -> (String, String) {
    (
        "Password Reset Request".to_string(),
        format!(
            "Hello {name},\n\n\
             We received a request to reset your password. Use the token below\n\
             with the reset endpoint to choose a new password:\n\n\
             {token}\n\n\
             This token expires in 1 hour. If you did not request a password\n\
             reset, please ignore this email.\n\n\
             Best regards,\nThe rxportal team"
        ),
    )
}

pub fn password_reset_confirmation(name: &str) -> (String, String) {
    (
        "Password Reset Successful".to_string(),
        format!(
            "Hello {name},\n\n\
             Your password has been successfully reset.\n\
             If you did not make this change, please contact us immediately.\n\n\
             Best regards,\nThe rxportal team"
        ),
    )
}
