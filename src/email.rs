//! Outbound email.
//!
//! Handlers build an [`EmailMessage`] and hand it to an [`EmailSender`]. Without a
//! configured transport the [`LogEmailSender`] records the message in the logs so
//! local flows (password reset) still work end to end.

use anyhow::Context;
use async_trait::async_trait;
use serde::Serialize;
use tracing::info;

use crate::config::EmailConfig;

#[derive(Clone, Debug, Serialize)]
pub struct EmailMessage {
    pub to: String,
    pub subject: String,
    pub html: String,
    pub text: String,
}

#[async_trait]
pub trait EmailSender: Send + Sync {
    async fn send(&self, message: &EmailMessage) -> anyhow::Result<()>;
}

/// Dev sender: logs instead of delivering.
#[derive(Clone, Debug)]
pub struct LogEmailSender;

#[async_trait]
impl EmailSender for LogEmailSender {
    async fn send(&self, message: &EmailMessage) -> anyhow::Result<()> {
        info!(
            to = %message.to,
            subject = %message.subject,
            body = %message.text,
            "email transport not configured; message logged"
        );
        Ok(())
    }
}

/// Posts messages as JSON to an HTTP mail API.
pub struct HttpEmailSender {
    client: reqwest::Client,
    config: EmailConfig,
}

#[derive(Serialize)]
struct OutgoingEmail<'a> {
    from: &'a str,
    to: &'a str,
    subject: &'a str,
    html: &'a str,
    text: &'a str,
}

impl HttpEmailSender {
    pub fn new(config: EmailConfig) -> Self {
        Self {
            client: reqwest::Client::new(),
            config,
        }
    }
}

#[async_trait]
impl EmailSender for HttpEmailSender {
    async fn send(&self, message: &EmailMessage) -> anyhow::Result<()> {
        let mut request = self.client.post(&self.config.api_url).json(&OutgoingEmail {
            from: &self.config.from,
            to: &message.to,
            subject: &message.subject,
            html: &message.html,
            text: &message.text,
        });
        if let Some(key) = &self.config.api_key {
            request = request.bearer_auth(key);
        }
        request
            .send()
            .await
            .context("send email request")?
            .error_for_status()
            .context("email api rejected message")?;
        info!(to = %message.to, subject = %message.subject, "email sent");
        Ok(())
    }
}

pub fn reset_link(public_base_url: &str, token: &str) -> String {
    format!(
        "{}/reset-password?token={}",
        public_base_url.trim_end_matches('/'),
        token
    )
}

pub fn password_reset_email(to: &str, link: &str) -> EmailMessage {
    let html = format!(
        r#"<!DOCTYPE html>
<html>
  <body style="font-family: Arial, sans-serif; color: #333; max-width: 600px; margin: 0 auto;">
    <h2>Password reset request</h2>
    <p>We received a request to reset the password for your CampusShelf account.</p>
    <p><a href="{link}">Reset your password</a></p>
    <p>Or open this link in your browser:<br>{link}</p>
    <p style="color: #999; font-size: 12px;">The link expires in 30 minutes. If you did not ask for a reset, ignore this email.</p>
  </body>
</html>"#
    );
    let text = format!(
        "Reset your CampusShelf password with this link: {link}\n\nThe link expires in 30 minutes.\n\nIf you did not ask for a reset, ignore this email."
    );
    EmailMessage {
        to: to.to_string(),
        subject: "Reset your CampusShelf password".into(),
        html,
        text,
    }
}
