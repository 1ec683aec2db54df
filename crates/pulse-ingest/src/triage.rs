//! Status transitions over already-stored records.
//!
//! Any state may move to any other: the domain is a human triage workflow,
//! not a protocol. Every transition appends a history entry via the store.

use pulse_types::{Record, RecordPatch, RecordStore, Status, StoreError};
use serde::Serialize;
use std::sync::Arc;

/// Per-record outcome of a bulk transition.
#[derive(Debug, Clone, Serialize)]
pub struct BulkOutcome {
    pub id: i64,
    pub ok: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

pub struct Triage {
    store: Arc<dyn RecordStore>,
}

impl Triage {
    pub fn new(store: Arc<dyn RecordStore>) -> Self {
        Self { store }
    }

    /// Apply one status transition. `Ok(None)` when the record is unknown.
    pub async fn set_status(
        &self,
        id: i64,
        status: Status,
        actor: &str,
    ) -> Result<Option<Record>, StoreError> {
        let patch = RecordPatch {
            status: Some(status),
            ..Default::default()
        };
        self.store.update(id, patch, actor).await
    }

    /// Apply one status to a set of ids. Each record's transition is
    /// all-or-nothing (data and history commit together in the store); the
    /// batch reports per-item outcomes instead of failing as a whole.
    pub async fn bulk_set_status(
        &self,
        ids: &[i64],
        status: Status,
        actor: &str,
    ) -> Vec<BulkOutcome> {
        let mut outcomes = Vec::with_capacity(ids.len());
        for &id in ids {
            let outcome = match self.set_status(id, status, actor).await {
                Ok(Some(_)) => BulkOutcome {
                    id,
                    ok: true,
                    error: None,
                },
                Ok(None) => BulkOutcome {
                    id,
                    ok: false,
                    error: Some("not found".to_string()),
                },
                Err(e) => {
                    tracing::error!(id, error = %e, "bulk status transition failed");
                    BulkOutcome {
                        id,
                        ok: false,
                        error: Some("storage failure".to_string()),
                    }
                }
            };
            outcomes.push(outcome);
        }
        outcomes
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pulse_store::InMemoryRecordStore;
    use pulse_types::NewRecord;

    async fn seeded() -> (Triage, Arc<dyn RecordStore>, i64) {
        let store: Arc<dyn RecordStore> = Arc::new(InMemoryRecordStore::new());
        let record = store
            .create(NewRecord {
                category: "bug".to_string(),
                body: Some("x".to_string()),
                ..Default::default()
            })
            .await
            .unwrap();
        (Triage::new(Arc::clone(&store)), store, record.id)
    }

    #[tokio::test]
    async fn transition_records_actor_and_history() {
        let (triage, store, id) = seeded().await;
        let updated = triage
            .set_status(id, Status::Resolved, "carol")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(updated.status, Status::Resolved);

        let history = store.history(id).await.unwrap();
        assert_eq!(history.len(), 2);
        assert_eq!(history[1].actor, "carol");
        assert_eq!(history[1].old_status, Some(Status::New));
        assert_eq!(history[1].new_status, Some(Status::Resolved));
    }

    #[tokio::test]
    async fn bulk_reports_per_item_outcomes() {
        let (triage, store, id) = seeded().await;
        let other = store
            .create(NewRecord {
                category: "bug".to_string(),
                body: Some("y".to_string()),
                ..Default::default()
            })
            .await
            .unwrap();

        let outcomes = triage
            .bulk_set_status(&[id, 9999, other.id], Status::Spam, "admin")
            .await;
        assert_eq!(outcomes.len(), 3);
        assert!(outcomes[0].ok);
        assert!(!outcomes[1].ok);
        assert_eq!(outcomes[1].error.as_deref(), Some("not found"));
        assert!(outcomes[2].ok);

        // The failed item did not block the others.
        assert_eq!(store.get(id).await.unwrap().unwrap().status, Status::Spam);
        assert_eq!(
            store.get(other.id).await.unwrap().unwrap().status,
            Status::Spam
        );
    }
}
