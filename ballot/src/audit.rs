// Audit trail for elections and liveness decisions
//
// Every record becomes a tracing event on the `ballot::audit` target. When a
// collector URL is configured the record is also POSTed there from a
// detached task; a failing collector never affects the caller.

use serde::Serialize;
use std::fmt;
use std::time::Duration;
use tracing::{debug, error, info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Severity {
    Success,
    Attention,
    Error,
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Severity::Success => f.write_str("Success"),
            Severity::Attention => f.write_str("Attention"),
            Severity::Error => f.write_str("Error"),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct AuditRecord {
    pub from: String,
    pub severity: Severity,
    pub comment: String,
    pub body: String,
}

#[derive(Debug, Clone)]
struct Collector {
    client: reqwest::Client,
    url: String,
}

#[derive(Debug, Clone)]
pub struct AuditLog {
    origin: String,
    collector: Option<Collector>,
}

impl AuditLog {
    /// Audit log that only emits tracing events.
    pub fn local(origin: impl Into<String>) -> Self {
        Self {
            origin: origin.into(),
            collector: None,
        }
    }

    /// Audit log that also ships records to a remote collector.
    pub fn with_collector(
        origin: impl Into<String>,
        url: impl Into<String>,
        timeout: Duration,
    ) -> crate::Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| crate::Error::Config(format!("audit client: {e}")))?;
        Ok(Self {
            origin: origin.into(),
            collector: Some(Collector {
                client,
                url: url.into(),
            }),
        })
    }

    pub fn record(&self, severity: Severity, comment: impl Into<String>, body: impl Into<String>) {
        let record = AuditRecord {
            from: self.origin.clone(),
            severity,
            comment: comment.into(),
            body: body.into(),
        };

        match severity {
            Severity::Success => {
                info!(target: "ballot::audit", comment = %record.comment, body = %record.body, "audit")
            }
            Severity::Attention => {
                warn!(target: "ballot::audit", comment = %record.comment, body = %record.body, "audit")
            }
            Severity::Error => {
                error!(target: "ballot::audit", comment = %record.comment, body = %record.body, "audit")
            }
        }

        let Some(collector) = self.collector.clone() else {
            return;
        };
        // Outside a runtime there is nowhere to ship the record to.
        let Ok(handle) = tokio::runtime::Handle::try_current() else {
            return;
        };
        handle.spawn(async move {
            let sent = collector
                .client
                .post(&collector.url)
                .json(&record)
                .send()
                .await
                .and_then(reqwest::Response::error_for_status);
            if let Err(e) = sent {
                debug!("audit collector {} rejected record: {}", collector.url, e);
            }
        });
    }

    pub fn success(&self, comment: impl Into<String>, body: impl Into<String>) {
        self.record(Severity::Success, comment, body);
    }

    pub fn attention(&self, comment: impl Into<String>, body: impl Into<String>) {
        self.record(Severity::Attention, comment, body);
    }

    pub fn error(&self, comment: impl Into<String>, body: impl Into<String>) {
        self.record(Severity::Error, comment, body);
    }
}
