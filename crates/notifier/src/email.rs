//! Email delivery through the Resend HTTP API.

use std::time::Duration;

use serde::Serialize;

use careerak_common::config::AppConfig;

use crate::dispatcher::DeliveryError;

/// A rendered email ready to send.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EmailMessage {
    pub to: String,
    pub subject: String,
    pub html: String,
}

/// Request body for `POST /emails`.
#[derive(Debug, Serialize)]
struct ResendPayload<'a> {
    from: &'a str,
    to: [&'a str; 1],
    subject: &'a str,
    html: &'a str,
}

#[derive(Clone)]
struct ResendCredentials {
    api_key: String,
    from: String,
}

/// Resend client. Disabled when no API key or sender address is configured.
#[derive(Clone)]
pub struct EmailSender {
    client: reqwest::Client,
    credentials: Option<ResendCredentials>,
    base_url: String,
}

impl EmailSender {
    pub fn new(api_key: Option<String>, from: Option<String>, base_url: impl Into<String>) -> Self {
        let credentials = match (api_key, from) {
            (Some(api_key), Some(from)) => Some(ResendCredentials { api_key, from }),
            _ => None,
        };

        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(10))
            .build()
            .unwrap_or_default();

        Self {
            client,
            credentials,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        }
    }

    pub fn from_config(config: &AppConfig) -> Self {
        Self::new(
            config.resend_api_key.clone(),
            config.email_from.clone(),
            config.resend_base_url.clone(),
        )
    }

    pub fn disabled() -> Self {
        Self::new(None, None, "")
    }

    pub fn is_enabled(&self) -> bool {
        self.credentials.is_some()
    }

    /// Send an email. Returns `false` without a request when disabled.
    pub async fn send(&self, message: &EmailMessage) -> Result<bool, DeliveryError> {
        let Some(credentials) = &self.credentials else {
            tracing::debug!(to = %message.to, "Email disabled, skipping send");
            return Ok(false);
        };

        let payload = ResendPayload {
            from: &credentials.from,
            to: [message.to.as_str()],
            subject: &message.subject,
            html: &message.html,
        };

        let response = self
            .client
            .post(format!("{}/emails", self.base_url))
            .bearer_auth(&credentials.api_key)
            .json(&payload)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(DeliveryError::Rejected {
                status: status.as_u16(),
                body,
            });
        }

        tracing::info!(to = %message.to, subject = %message.subject, "Email sent");
        Ok(true)
    }
}

/// Render a notification into a minimal HTML email.
pub fn render_notification_email(
    to: &str,
    title: &str,
    body: &str,
    action_url: Option<&str>,
) -> EmailMessage {
    let mut html = format!(
        "<h2>{}</h2><p>{}</p>",
        escape_html(title),
        escape_html(body).replace('\n', "<br>")
    );
    if let Some(url) = action_url {
        html.push_str(&format!(
            "<p><a href=\"{}\">Open in Careerak</a></p>",
            escape_html(url)
        ));
    }

    EmailMessage {
        to: to.to_string(),
        subject: title.to_string(),
        html,
    }
}

fn escape_html(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    for c in raw.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            _ => out.push(c),
        }
    }
    out
}
