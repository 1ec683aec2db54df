//! Best-effort notification side channel.
//!
//! Ingestion hands the stored record to a queue and returns immediately; a
//! single worker drives the `Notifier`. Failures are logged and dropped,
//! never surfaced to the submitter and never retried here.

use async_trait::async_trait;
use pulse_types::Record;
use std::sync::Arc;
use tokio::sync::mpsc;

#[derive(Debug, thiserror::Error)]
pub enum NotifyError {
    #[error("notification error: {0}")]
    Other(String),
}

/// Delivery mechanism for "new submission" notifications (e.g. outbound
/// email). Implementations own their transport; retry policy, if any,
/// belongs to them.
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn notify(&self, record: &Record) -> Result<(), NotifyError>;
}

/// Notifier that only writes a structured log line. Default in the binary.
pub struct LogNotifier;

#[async_trait]
impl Notifier for LogNotifier {
    async fn notify(&self, record: &Record) -> Result<(), NotifyError> {
        tracing::info!(
            id = record.id,
            category = %record.category,
            status = %record.status,
            "new submission"
        );
        Ok(())
    }
}

/// Sending half of the notification queue. Cloneable; `send` never blocks
/// and never fails the caller.
#[derive(Clone)]
pub struct NotifyHandle {
    tx: mpsc::UnboundedSender<Record>,
}

impl NotifyHandle {
    pub fn send(&self, record: Record) {
        if self.tx.send(record).is_err() {
            tracing::warn!("notifier worker is gone; notification dropped");
        }
    }
}

/// Spawn the worker and return a handle. Must run inside a tokio runtime.
pub fn spawn_notifier(notifier: Arc<dyn Notifier>) -> NotifyHandle {
    let (tx, mut rx) = mpsc::unbounded_channel::<Record>();
    tokio::spawn(async move {
        while let Some(record) = rx.recv().await {
            if let Err(e) = notifier.notify(&record).await {
                tracing::warn!(id = record.id, error = %e, "notification failed");
            }
        }
    });
    NotifyHandle { tx }
}

/// Recording notifier for tests.
#[cfg(any(test, feature = "test-util"))]
pub struct MockNotifier {
    notified: std::sync::Mutex<Vec<i64>>,
    fail: bool,
}

#[cfg(any(test, feature = "test-util"))]
impl MockNotifier {
    pub fn new() -> Self {
        Self {
            notified: std::sync::Mutex::new(Vec::new()),
            fail: false,
        }
    }

    pub fn failing() -> Self {
        Self {
            notified: std::sync::Mutex::new(Vec::new()),
            fail: true,
        }
    }

    pub fn notified_ids(&self) -> Vec<i64> {
        self.notified.lock().map(|g| g.clone()).unwrap_or_default()
    }
}

#[cfg(any(test, feature = "test-util"))]
impl Default for MockNotifier {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(any(test, feature = "test-util"))]
#[async_trait]
impl Notifier for MockNotifier {
    async fn notify(&self, record: &Record) -> Result<(), NotifyError> {
        if self.fail {
            return Err(NotifyError::Other("mock failure".to_string()));
        }
        if let Ok(mut guard) = self.notified.lock() {
            guard.push(record.id);
        }
        Ok(())
    }
}
