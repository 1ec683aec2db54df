//! Record store trait and storage error taxonomy.

use crate::{
    HistoryEntry, ListOptions, MetaMap, NewRecord, Record, RecordDetail, RecordFilter, RecordPatch,
};
use async_trait::async_trait;

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// Underlying storage failed. Logged server-side with context; callers
    /// see a generic failure and may retry.
    #[error("persistence error: {0}")]
    Persistence(String),
    #[error("serialization error: {0}")]
    Serialization(String),
}

/// CRUD over records plus metadata keyed by (record_id, key) and the
/// append-only history log.
///
/// Contract notes:
/// - `create` commits the record, its metadata, and the "created" history
///   entry together: no reader may observe the record without that entry.
/// - `update` mutates only supplied fields, always refreshes `updated_at`,
///   and appends a history entry when the status changes.
/// - `delete` cascades to metadata and history; `Ok(false)` when absent.
/// - Concurrent updates to one record are last-write-wins per field.
#[async_trait]
pub trait RecordStore: Send + Sync {
    async fn create(&self, new: NewRecord) -> Result<Record, StoreError>;

    async fn get(&self, id: i64) -> Result<Option<Record>, StoreError>;

    /// Record with embedded metadata and history, for detail views.
    async fn get_detail(&self, id: i64) -> Result<Option<RecordDetail>, StoreError>;

    /// Filtered, ordered, paginated listing. Returns the page plus the total
    /// count of matching records.
    async fn list(&self, opts: &ListOptions) -> Result<(Vec<Record>, u64), StoreError>;

    /// Unpaginated filtered read, for the aggregation layer.
    async fn scan(&self, filter: &RecordFilter) -> Result<Vec<Record>, StoreError>;

    /// Partial update. `Ok(None)` when the record does not exist.
    async fn update(
        &self,
        id: i64,
        patch: RecordPatch,
        actor: &str,
    ) -> Result<Option<Record>, StoreError>;

    async fn delete(&self, id: i64) -> Result<bool, StoreError>;

    async fn get_meta(&self, id: i64, key: &str)
        -> Result<Option<serde_json::Value>, StoreError>;

    async fn all_meta(&self, id: i64) -> Result<MetaMap, StoreError>;

    /// Upsert one metadata entry. `Ok(false)` when the record does not exist.
    async fn set_meta(
        &self,
        id: i64,
        key: &str,
        value: serde_json::Value,
    ) -> Result<bool, StoreError>;

    async fn delete_meta(&self, id: i64, key: &str) -> Result<bool, StoreError>;

    async fn history(&self, id: i64) -> Result<Vec<HistoryEntry>, StoreError>;
}
