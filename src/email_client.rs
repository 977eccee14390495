use async_trait::async_trait;
use serde::Serialize;

use crate::error::{ConfigError, EmailError};
use crate::validators::is_valid_email;

/// Outbound notification channel.
///
/// Delivery is best-effort: callers log failures and carry on.
#[async_trait]
pub trait NotificationSender: Send + Sync {
    async fn send(&self, recipient: &str, subject: &str, html_body: &str)
        -> Result<(), EmailError>;
}

#[derive(Clone, Debug)]
pub struct SenderEmail(String);

impl SenderEmail {
    pub fn parse(s: String) -> Result<Self, String> {
        let email = is_valid_email(&s).map_err(|e| e.to_string())?;
        Ok(Self(email))
    }

    pub fn inner(&self) -> &str {
        &self.0
    }
}

#[derive(Serialize)]
struct SendEmailRequest<'a> {
    from: &'a str,
    to: &'a str,
    subject: &'a str,
    html: &'a str,
}

/// Posts messages to an HTTP email API (`{base_url}/email`)
#[derive(Clone)]
pub struct EmailClient {
    http_client: reqwest::Client,
    base_url: String,
    sender: SenderEmail,
}

impl EmailClient {
    /// # Errors
    /// `ConfigError::InvalidValue` if the HTTP client cannot be built with
    /// the requested timeout
    pub fn new(
        base_url: String,
        sender: SenderEmail,
        timeout: std::time::Duration,
    ) -> Result<Self, ConfigError> {
        let http_client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| ConfigError::InvalidValue(format!("email_client: {}", e)))?;
        Ok(Self {
            http_client,
            base_url,
            sender,
        })
    }
}

#[async_trait]
impl NotificationSender for EmailClient {
    async fn send(
        &self,
        recipient: &str,
        subject: &str,
        html_body: &str,
    ) -> Result<(), EmailError> {
        let recipient = is_valid_email(recipient)
            .map_err(|e| EmailError::InvalidRecipient(e.to_string()))?;
        let url = format!("{}/email", self.base_url.trim_end_matches('/'));
        let request = SendEmailRequest {
            from: self.sender.inner(),
            to: &recipient,
            subject,
            html: html_body,
        };

        self.http_client
            .post(&url)
            .json(&request)
            .send()
            .await
            .map_err(|e| EmailError::SendFailed(e.to_string()))?
            .error_for_status()
            .map_err(|e| EmailError::SendFailed(format!("email service returned {}", e)))?;

        Ok(())
    }
}

/// HTML body for the account verification email
pub fn verification_email_body(code: &str, ttl_minutes: i64) -> String {
    format!(
        r#"<html>
<body style="font-family: Arial, sans-serif;">
  <div style="background-color: #f5f5f5; padding: 20px;">
    <h2 style="color: #333;">Welcome!</h2>
    <p style="font-size: 16px;">Please enter the verification code below to continue:</p>
    <div style="background-color: #fff; padding: 20px; border-radius: 5px;">
      <h3 style="color: #333;">Verification Code:</h3>
      <p style="font-size: 18px; font-weight: bold; color: #007bff;">{}</p>
    </div>
    <p>This code expires in {} minutes.</p>
  </div>
</body>
</html>"#,
        code, ttl_minutes
    )
}
