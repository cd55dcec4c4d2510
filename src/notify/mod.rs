pub mod mailgun;

use std::path::Path;

use crate::error::AppError;

pub use mailgun::MailgunNotifier;

pub const ADMIN_SUBJECT: &str = "Message from SWOT Analyzer Application";

/// Outbound email. One message per call, optionally with a single attachment.
#[async_trait::async_trait]
pub trait Notifier: Send + Sync {
    async fn notify(
        &self,
        recipient: &str,
        subject: &str,
        body: &str,
        attachment: Option<&Path>,
    ) -> Result<(), AppError>;
}

/// Sends a message to the administrator. Delivery problems are logged and
/// never surface to the caller.
pub async fn notify_admin(notifier: &dyn Notifier, admin_email: &str, body: &str) {
    if let Err(e) = notifier.notify(admin_email, ADMIN_SUBJECT, body, None).await {
        tracing::error!(error = %e, "Failed to notify administrator");
    }
}

/// Sends a message to the requesting user, logging instead of failing.
/// Returns whether the message was accepted.
pub async fn notify_user(
    notifier: &dyn Notifier,
    recipient: &str,
    subject: &str,
    body: &str,
    attachment: Option<&Path>,
) -> bool {
    match notifier.notify(recipient, subject, body, attachment).await {
        Ok(()) => true,
        Err(e) => {
            tracing::error!(error = %e, recipient, "Failed to notify user");
            false
        }
    }
}
