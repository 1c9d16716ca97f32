//! Notification side effects
//!
//! Report mail and error-report mail are fire-and-forget: a sink failure is
//! logged and swallowed, never surfaced to the reconciliation flow.

use chrono::{DateTime, Utc};
use reqwest::Client;
use serde::{Deserialize, Serialize};

/// Metadata attached to an emailed report
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReportMeta {
    pub subject: String,
    pub period: String,
    pub generated_at: DateTime<Utc>,
}

/// Outbound mail contract. Implementations must not propagate errors.
pub trait NotificationSink {
    fn email_report(
        &self,
        recipients: &[String],
        document: &serde_json::Value,
        meta: &ReportMeta,
    ) -> impl std::future::Future<Output = ()> + Send;

    fn email_error_report(
        &self,
        user: &str,
        subject: &str,
        body: &str,
    ) -> impl std::future::Future<Output = ()> + Send;
}

/// Posts mail requests to the notification service
pub struct HttpNotifier {
    client: Client,
    endpoint: String,
}

impl HttpNotifier {
    pub fn new(endpoint: impl Into<String>) -> Self {
        Self {
            client: Client::new(),
            endpoint: endpoint.into(),
        }
    }
}

impl NotificationSink for HttpNotifier {
    async fn email_report(
        &self,
        recipients: &[String],
        document: &serde_json::Value,
        meta: &ReportMeta,
    ) {
        let payload = serde_json::json!({
            "recipients": recipients,
            "document": document,
            "meta": meta,
        });
        let result = self
            .client
            .post(format!("{}/report", self.endpoint))
            .json(&payload)
            .send()
            .await;

        match result {
            Ok(resp) if resp.status().is_success() => {
                tracing::info!(subject = %meta.subject, "report email dispatched");
            }
            Ok(resp) => {
                tracing::warn!(status = %resp.status(), "report email rejected");
            }
            Err(e) => {
                tracing::warn!("report email failed: {}", e);
            }
        }
    }

    async fn email_error_report(&self, user: &str, subject: &str, body: &str) {
        let payload = serde_json::json!({
            "user": user,
            "subject": subject,
            "body": body,
        });
        let result = self
            .client
            .post(format!("{}/error", self.endpoint))
            .json(&payload)
            .send()
            .await;

        if let Err(e) = result {
            tracing::warn!("error-report email failed: {}", e);
        }
    }
}

/// Sink that records nothing; used by tests and offline runs
#[derive(Debug, Default, Clone)]
pub struct NullNotifier;

impl NotificationSink for NullNotifier {
    async fn email_report(
        &self,
        recipients: &[String],
        _document: &serde_json::Value,
        meta: &ReportMeta,
    ) {
        tracing::debug!(
            recipients = recipients.len(),
            subject = %meta.subject,
            "report email suppressed (null notifier)"
        );
    }

    async fn email_error_report(&self, user: &str, subject: &str, _body: &str) {
        tracing::debug!(%user, %subject, "error report suppressed (null notifier)");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_null_notifier_is_silent() {
        let sink = NullNotifier;
        let meta = ReportMeta {
            subject: "CMR March".to_string(),
            period: "2026-03".to_string(),
            generated_at: Utc::now(),
        };
        // must complete without error or panic
        sink.email_report(&["qa@example.com".to_string()], &serde_json::json!({}), &meta)
            .await;
        sink.email_error_report("QR-1", "save failed", "details").await;
    }
}
