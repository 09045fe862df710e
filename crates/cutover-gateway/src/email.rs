//! Email notifications
//!
//! [`NotificationGateway`] is the seam; [`SendGridNotifier`] is the production
//! implementation. [`compose_rollback_email`] renders the operator summary
//! through an HTML template, so every interpolated value is escaped.

use crate::error::GatewayError;
use askama::Template;
use chrono::{DateTime, Utc};
use cutover_core::{RunResult, StepRecord, StepStatus};
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::time::Duration;

/// SendGrid v3 send endpoint
pub const SENDGRID_ENDPOINT: &str = "https://api.sendgrid.com/v3/mail/send";

/// One outbound HTML email
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EmailMessage {
    /// Recipient
    pub to: String,
    /// Verified sender
    pub from: String,
    /// Subject line
    pub subject: String,
    /// HTML body
    pub html: String,
}

/// Sends emails
#[async_trait::async_trait]
pub trait NotificationGateway: Send + Sync {
    /// Deliver one message
    async fn send(&self, message: &EmailMessage) -> Result<(), GatewayError>;
}

/// SendGrid-backed gateway
#[derive(Debug, Clone)]
pub struct SendGridNotifier {
    client: reqwest::Client,
    endpoint: String,
}

impl SendGridNotifier {
    /// Client authenticated with an API key
    ///
    /// # Errors
    /// Invalid key characters or client construction failure
    pub fn new(api_key: &str) -> Result<Self, GatewayError> {
        let mut headers = HeaderMap::new();
        let bearer = HeaderValue::from_str(&format!("Bearer {api_key}"))
            .map_err(|_| GatewayError::InvalidCredential("SENDGRID_API_KEY"))?;
        headers.insert(AUTHORIZATION, bearer);

        let client = reqwest::Client::builder()
            .default_headers(headers)
            .timeout(Duration::from_secs(15))
            .build()?;
        Ok(Self {
            client,
            endpoint: SENDGRID_ENDPOINT.to_string(),
        })
    }

    /// Send to a different endpoint (sandbox or local relay)
    #[must_use]
    pub fn with_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = endpoint.into();
        self
    }
}

/// SendGrid v3 request body
#[must_use]
pub fn sendgrid_body(message: &EmailMessage) -> serde_json::Value {
    json!({
        "personalizations": [{ "to": [{ "email": message.to }] }],
        "from": { "email": message.from },
        "subject": message.subject,
        "content": [{ "type": "text/html", "value": message.html }],
    })
}

#[async_trait::async_trait]
impl NotificationGateway for SendGridNotifier {
    async fn send(&self, message: &EmailMessage) -> Result<(), GatewayError> {
        let response = self
            .client
            .post(&self.endpoint)
            .json(&sendgrid_body(message))
            .send()
            .await?;
        if !response.status().is_success() {
            return Err(GatewayError::from_response(response).await);
        }
        tracing::info!("email sent to {}", message.to);
        Ok(())
    }
}

/// Who and what the rollback email is about
#[derive(Debug, Clone, Copy)]
pub struct RollbackNotice<'a> {
    /// Backup restored
    pub backup_id: &'a str,
    /// Run timestamp
    pub run_timestamp: &'a str,
    /// Force mode
    pub force: bool,
    /// Operator address
    pub to: &'a str,
    /// Verified sender
    pub from: &'a str,
}

#[derive(askama::Template)]
#[template(path = "rollback_email.html")]
struct RollbackEmail<'a> {
    outcome: &'a str,
    backup_id: &'a str,
    run_timestamp: &'a str,
    sent: String,
    mode: &'a str,
    succeeded: usize,
    failed: usize,
    errors: &'a [String],
    steps: &'a [StepRecord],
}

/// Render the rollback summary email
///
/// # Errors
/// [`GatewayError::Render`] if the template fails to render
pub fn compose_rollback_email(
    notice: &RollbackNotice<'_>,
    result: &RunResult,
    now: DateTime<Utc>,
) -> Result<EmailMessage, GatewayError> {
    let outcome = if result.success { "Completed" } else { "Failed" };
    let html = RollbackEmail {
        outcome,
        backup_id: notice.backup_id,
        run_timestamp: notice.run_timestamp,
        sent: now.to_rfc3339(),
        mode: if notice.force { "Force" } else { "Standard" },
        succeeded: result.count(StepStatus::Success),
        failed: result.count(StepStatus::Failed),
        errors: &result.errors,
        steps: &result.steps,
    }
    .render()?;

    Ok(EmailMessage {
        to: notice.to.to_string(),
        from: notice.from.to_string(),
        subject: format!("🚨 Emergency Rollback {outcome} - {}", notice.backup_id),
        html,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use pretty_assertions::assert_eq;

    fn notice() -> RollbackNotice<'static> {
        RollbackNotice {
            backup_id: "2026-01-01T00-00-00-000Z",
            run_timestamp: "2026-01-02T00-00-00-000Z",
            force: true,
            to: "ops@example.com",
            from: "noreply@example.com",
        }
    }

    #[test]
    fn escapes_markup() {
        let mut result = RunResult::new();
        result.errors.push(r#"<b>"a" & 'b'"#.to_string());
        let now = Utc.with_ymd_and_hms(2026, 1, 2, 0, 5, 0).unwrap();
        let email = compose_rollback_email(&notice(), &result, now).unwrap();

        assert!(email.html.contains("&lt;b&gt;&quot;a&quot; &amp; "));
        assert!(!email.html.contains("<b>"));
        assert!(!email.html.contains("'b'"));
    }

    #[test]
    fn composes_summary_with_errors() {
        let mut result = RunResult::new();
        result.steps.push(StepRecord::new(
            "restore-database",
            StepStatus::Failed,
            "insert <failed>",
            Duration::from_millis(3),
            true,
        ));
        result.errors.push("restore-database: <audit_history>".to_string());
        result.finish(Duration::from_secs(2));

        let now = Utc.with_ymd_and_hms(2026, 1, 2, 0, 5, 0).unwrap();
        let email = compose_rollback_email(&notice(), &result, now).unwrap();

        assert_eq!(email.subject, "🚨 Emergency Rollback Failed - 2026-01-01T00-00-00-000Z");
        assert_eq!(email.to, "ops@example.com");
        assert!(email.html.contains("<li>restore-database: &lt;audit_history&gt;</li>"));
        assert!(email.html.contains("insert &lt;failed&gt;"));
        assert!(email.html.contains("<strong>Failed:</strong> 1"));
        assert!(email.html.contains("<strong>Mode:</strong> Force"));
    }

    #[test]
    fn sendgrid_body_shape() {
        let email = EmailMessage {
            to: "a@x".to_string(),
            from: "b@x".to_string(),
            subject: "s".to_string(),
            html: "<p>h</p>".to_string(),
        };
        let body = sendgrid_body(&email);
        assert_eq!(body["personalizations"][0]["to"][0]["email"], "a@x");
        assert_eq!(body["content"][0]["type"], "text/html");
    }

    #[tokio::test]
    async fn unreachable_endpoint_is_transport_error() {
        let notifier = SendGridNotifier::new("key").unwrap().with_endpoint("http://127.0.0.1:9/v3/mail/send");
        let email = EmailMessage {
            to: "a@x".to_string(),
            from: "b@x".to_string(),
            subject: "s".to_string(),
            html: String::new(),
        };
        assert!(matches!(notifier.send(&email).await, Err(GatewayError::Transport(_))));
    }
}
