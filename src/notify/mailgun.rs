use std::path::Path;
use std::time::Duration;

use reqwest::multipart::{Form, Part};
use serde::Deserialize;

use super::Notifier;
use crate::error::AppError;

/// Mail delivery through the Mailgun messages API.
pub struct MailgunNotifier {
    client: reqwest::Client,
    endpoint: String,
    api_key: String,
    from: String,
}

#[derive(Deserialize)]
struct MailgunResponse {
    message: Option<String>,
}

impl MailgunNotifier {
    pub fn new(
        base_url: &str,
        domain: &str,
        api_key: &str,
        from: &str,
        timeout: Duration,
    ) -> Result<Self, AppError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| AppError::Config(format!("failed to build mail client: {e}")))?;

        Ok(Self {
            client,
            endpoint: messages_endpoint(base_url, domain),
            api_key: api_key.to_string(),
            from: from.to_string(),
        })
    }
}

fn messages_endpoint(base_url: &str, domain: &str) -> String {
    format!("{}/{domain}/messages", base_url.trim_end_matches('/'))
}

#[async_trait::async_trait]
impl Notifier for MailgunNotifier {
    #[tracing::instrument(name = "notify.send", skip(self, body, attachment), fields(has_attachment = attachment.is_some()))]
    async fn notify(
        &self,
        recipient: &str,
        subject: &str,
        body: &str,
        attachment: Option<&Path>,
    ) -> Result<(), AppError> {
        let mut form = Form::new()
            .text("from", self.from.clone())
            .text("to", recipient.to_string())
            .text("subject", subject.to_string())
            .text("html", body.to_string());

        if let Some(path) = attachment {
            let bytes = tokio::fs::read(path).await.map_err(|e| {
                AppError::Notification(format!("read attachment {}: {e}", path.display()))
            })?;
            let name = path
                .file_name()
                .and_then(|n| n.to_str())
                .unwrap_or("report")
                .to_string();
            form = form.part("attachment", Part::bytes(bytes).file_name(name));
        }

        let response = self
            .client
            .post(&self.endpoint)
            .basic_auth("api", Some(&self.api_key))
            .multipart(form)
            .send()
            .await
            .map_err(|e| AppError::Notification(format!("mail request failed: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            let detail = response
                .json::<MailgunResponse>()
                .await
                .ok()
                .and_then(|r| r.message)
                .unwrap_or_default();
            return Err(AppError::Notification(format!(
                "mail rejected with status {status}: {detail}"
            )));
        }

        tracing::info!(recipient, subject, "Email sent");
        Ok(())
    }
}
