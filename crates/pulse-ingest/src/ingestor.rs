//! Ingestion endpoint: one submission in, one stored record out.

use crate::validator;
use pulse_notify::NotifyHandle;
use pulse_types::{FieldError, IngestConfig, Record, RecordStore, StoreError, SubmitRequest};
use std::sync::Arc;
use tokio::sync::broadcast;

#[derive(Debug, thiserror::Error)]
pub enum IngestError {
    /// Client input malformed or missing; recoverable locally, surfaced as a
    /// field-level error list.
    #[error("validation failed")]
    Validation(Vec<FieldError>),
    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Event published on the extensibility hook after a successful ingest.
#[derive(Debug, Clone)]
pub enum RecordEvent {
    Created(Record),
}

/// Accepts one submission at a time: validate, persist atomically, then
/// notify best-effort and publish a hook event.
///
/// Repeated identical submissions create distinct records; each submission is
/// a new observation. Anonymous submissions are allowed.
pub struct Ingestor {
    store: Arc<dyn RecordStore>,
    notify: NotifyHandle,
    config: IngestConfig,
    events: broadcast::Sender<RecordEvent>,
}

impl Ingestor {
    pub fn new(store: Arc<dyn RecordStore>, notify: NotifyHandle, config: IngestConfig) -> Self {
        let (events, _) = broadcast::channel(64);
        Self {
            store,
            notify,
            config,
            events,
        }
    }

    /// Subscribe to post-ingest events. Slow subscribers may miss events;
    /// the hook is advisory, not a durable queue.
    pub fn subscribe(&self) -> broadcast::Receiver<RecordEvent> {
        self.events.subscribe()
    }

    pub async fn submit(
        &self,
        raw: &SubmitRequest,
        submitter_id: Option<&str>,
    ) -> Result<Record, IngestError> {
        // Validation runs fully in memory; a failure writes nothing.
        let mut new = validator::validate(raw, &self.config).map_err(IngestError::Validation)?;
        new.submitter_id = submitter_id.map(str::to_string);

        let record = self.store.create(new).await?;
        tracing::info!(
            id = record.id,
            category = %record.category,
            anonymous = record.submitter_id.is_none(),
            "submission ingested"
        );

        // The caller already has durability; notification and hook are
        // fire-and-forget from here.
        self.notify.send(record.clone());
        let _ = self.events.send(RecordEvent::Created(record.clone()));

        Ok(record)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pulse_notify::{spawn_notifier, MockNotifier};
    use pulse_store::InMemoryRecordStore;
    use pulse_types::Status;

    fn submission(category: &str, rating: Option<i64>, comment: Option<&str>) -> SubmitRequest {
        SubmitRequest {
            category: Some(category.to_string()),
            rating,
            comment: comment.map(str::to_string),
            ..Default::default()
        }
    }

    fn ingestor_with(notifier: Arc<MockNotifier>) -> (Ingestor, Arc<dyn RecordStore>) {
        let store: Arc<dyn RecordStore> = Arc::new(InMemoryRecordStore::new());
        let handle = spawn_notifier(notifier);
        (
            Ingestor::new(Arc::clone(&store), handle, IngestConfig::default()),
            store,
        )
    }

    #[tokio::test]
    async fn valid_submission_creates_record_and_notifies() {
        let notifier = Arc::new(MockNotifier::new());
        let (ingestor, store) = ingestor_with(notifier.clone());

        let record = ingestor
            .submit(&submission("bug", Some(2), Some("slow page")), None)
            .await
            .unwrap();
        assert_eq!(record.status, Status::New);
        assert_eq!(record.rating, Some(2));
        assert!(record.submitter_id.is_none());

        let stored = store.get(record.id).await.unwrap().unwrap();
        assert_eq!(stored.body.as_deref(), Some("slow page"));
        assert_eq!(store.history(record.id).await.unwrap().len(), 1);

        for _ in 0..50 {
            if !notifier.notified_ids().is_empty() {
                break;
            }
            tokio::time::sleep(tokio::time::Duration::from_millis(10)).await;
        }
        assert_eq!(notifier.notified_ids(), vec![record.id]);
    }

    #[tokio::test]
    async fn invalid_submission_writes_nothing() {
        let notifier = Arc::new(MockNotifier::new());
        let (ingestor, store) = ingestor_with(notifier.clone());

        let err = ingestor
            .submit(&submission("bug", None, None), None)
            .await
            .unwrap_err();
        match err {
            IngestError::Validation(errs) => assert!(!errs.is_empty()),
            other => panic!("expected validation error, got {:?}", other),
        }
        let (_, total) = store
            .list(&pulse_types::ListOptions::default())
            .await
            .unwrap();
        assert_eq!(total, 0);
        assert!(notifier.notified_ids().is_empty());
    }

    #[tokio::test]
    async fn notification_failure_does_not_fail_the_submission() {
        let notifier = Arc::new(MockNotifier::failing());
        let (ingestor, _) = ingestor_with(notifier);
        let record = ingestor
            .submit(&submission("bug", Some(4), None), Some("u1"))
            .await
            .unwrap();
        assert_eq!(record.submitter_id.as_deref(), Some("u1"));
    }

    #[tokio::test]
    async fn hook_receives_created_event() {
        let notifier = Arc::new(MockNotifier::new());
        let (ingestor, _) = ingestor_with(notifier);
        let mut rx = ingestor.subscribe();
        let record = ingestor
            .submit(&submission("suggestion", None, Some("idea")), None)
            .await
            .unwrap();
        let RecordEvent::Created(ev) = rx.recv().await.unwrap();
        assert_eq!(ev.id, record.id);
    }

    #[tokio::test]
    async fn repeated_submissions_create_distinct_records() {
        let notifier = Arc::new(MockNotifier::new());
        let (ingestor, _) = ingestor_with(notifier);
        let req = submission("bug", Some(3), Some("dup"));
        let a = ingestor.submit(&req, None).await.unwrap();
        let b = ingestor.submit(&req, None).await.unwrap();
        assert_ne!(a.id, b.id);
    }
}
