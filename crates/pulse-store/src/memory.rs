//! In-memory record store.
//!
//! One write lock covers the record, its metadata, and its history, so the
//! "created" history entry is visible the moment the record is.

use crate::now_rfc3339;
use async_trait::async_trait;
use pulse_types::{
    HistoryEntry, ListOptions, MetaMap, NewRecord, OrderDir, OrderField, Record, RecordDetail,
    RecordFilter, RecordPatch, RecordStore, Status, StoreError,
};
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;
use tokio::sync::RwLock;

struct Stored {
    record: Record,
    meta: MetaMap,
    history: Vec<HistoryEntry>,
}

/// In-memory implementation of RecordStore. Ids are assigned monotonically
/// from an atomic counter; records are kept in id order.
pub struct InMemoryRecordStore {
    records: Arc<RwLock<BTreeMap<i64, Stored>>>,
    next_id: AtomicI64,
}

impl InMemoryRecordStore {
    pub fn new() -> Self {
        Self {
            records: Arc::new(RwLock::new(BTreeMap::new())),
            next_id: AtomicI64::new(1),
        }
    }
}

impl Default for InMemoryRecordStore {
    fn default() -> Self {
        Self::new()
    }
}

fn sort_records(records: &mut [Record], field: OrderField, dir: OrderDir) {
    records.sort_by(|a, b| {
        let ord = match field {
            OrderField::CreatedAt => a.created_at.cmp(&b.created_at),
            OrderField::Id => a.id.cmp(&b.id),
            OrderField::Rating => a.rating.unwrap_or(0).cmp(&b.rating.unwrap_or(0)),
            OrderField::Status => a.status.as_str().cmp(b.status.as_str()),
            OrderField::Category => a.category.cmp(&b.category),
        };
        // Tie-break by id so pages are stable across identical sort keys.
        let ord = ord.then_with(|| a.id.cmp(&b.id));
        match dir {
            OrderDir::Asc => ord,
            OrderDir::Desc => ord.reverse(),
        }
    });
}

#[async_trait]
impl RecordStore for InMemoryRecordStore {
    async fn create(&self, new: NewRecord) -> Result<Record, StoreError> {
        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        let now = now_rfc3339();
        let record = Record {
            id,
            submitter_id: new.submitter_id,
            category: new.category,
            rating: new.rating,
            body: new.body,
            source_url: new.source_url,
            source_title: new.source_title,
            status: Status::New,
            assignee_id: None,
            priority: Default::default(),
            created_at: now.clone(),
            updated_at: now.clone(),
        };
        let stored = Stored {
            record: record.clone(),
            meta: new.meta,
            history: vec![HistoryEntry::created(&now)],
        };
        let mut guard = self.records.write().await;
        guard.insert(id, stored);
        Ok(record)
    }

    async fn get(&self, id: i64) -> Result<Option<Record>, StoreError> {
        let guard = self.records.read().await;
        Ok(guard.get(&id).map(|s| s.record.clone()))
    }

    async fn get_detail(&self, id: i64) -> Result<Option<RecordDetail>, StoreError> {
        let guard = self.records.read().await;
        Ok(guard.get(&id).map(|s| RecordDetail {
            record: s.record.clone(),
            meta: s.meta.clone(),
            history: s.history.clone(),
        }))
    }

    async fn list(&self, opts: &ListOptions) -> Result<(Vec<Record>, u64), StoreError> {
        let guard = self.records.read().await;
        let mut matched: Vec<Record> = guard
            .values()
            .filter(|s| opts.filter.matches(&s.record))
            .map(|s| s.record.clone())
            .collect();
        let total = matched.len() as u64;
        sort_records(&mut matched, opts.order_field, opts.order_dir);
        let page: Vec<Record> = matched
            .into_iter()
            .skip(opts.offset as usize)
            .take(if opts.limit == 0 {
                usize::MAX
            } else {
                opts.limit as usize
            })
            .collect();
        Ok((page, total))
    }

    async fn scan(&self, filter: &RecordFilter) -> Result<Vec<Record>, StoreError> {
        let guard = self.records.read().await;
        Ok(guard
            .values()
            .filter(|s| filter.matches(&s.record))
            .map(|s| s.record.clone())
            .collect())
    }

    async fn update(
        &self,
        id: i64,
        patch: RecordPatch,
        actor: &str,
    ) -> Result<Option<Record>, StoreError> {
        let mut guard = self.records.write().await;
        let Some(stored) = guard.get_mut(&id) else {
            return Ok(None);
        };
        let now = now_rfc3339();
        let old_status = stored.record.status;
        if let Some(category) = patch.category {
            stored.record.category = category;
        }
        if let Some(body) = patch.body {
            stored.record.body = Some(body);
        }
        if let Some(assignee) = patch.assignee_id {
            stored.record.assignee_id = Some(assignee);
        }
        if let Some(priority) = patch.priority {
            stored.record.priority = priority;
        }
        if let Some(status) = patch.status {
            stored.record.status = status;
            if status != old_status {
                stored
                    .history
                    .push(HistoryEntry::status_changed(old_status, status, actor, &now));
            }
        }
        stored.record.updated_at = now;
        Ok(Some(stored.record.clone()))
    }

    async fn delete(&self, id: i64) -> Result<bool, StoreError> {
        let mut guard = self.records.write().await;
        Ok(guard.remove(&id).is_some())
    }

    async fn get_meta(
        &self,
        id: i64,
        key: &str,
    ) -> Result<Option<serde_json::Value>, StoreError> {
        let guard = self.records.read().await;
        Ok(guard.get(&id).and_then(|s| s.meta.get(key).cloned()))
    }

    async fn all_meta(&self, id: i64) -> Result<MetaMap, StoreError> {
        let guard = self.records.read().await;
        Ok(guard.get(&id).map(|s| s.meta.clone()).unwrap_or_default())
    }

    async fn set_meta(
        &self,
        id: i64,
        key: &str,
        value: serde_json::Value,
    ) -> Result<bool, StoreError> {
        let mut guard = self.records.write().await;
        match guard.get_mut(&id) {
            Some(stored) => {
                stored.meta.insert(key.to_string(), value);
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn delete_meta(&self, id: i64, key: &str) -> Result<bool, StoreError> {
        let mut guard = self.records.write().await;
        Ok(guard
            .get_mut(&id)
            .map(|s| s.meta.remove(key).is_some())
            .unwrap_or(false))
    }

    async fn history(&self, id: i64) -> Result<Vec<HistoryEntry>, StoreError> {
        let guard = self.records.read().await;
        Ok(guard.get(&id).map(|s| s.history.clone()).unwrap_or_default())
    }
}
