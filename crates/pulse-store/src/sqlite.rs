//! SQLite-backed record store.
//!
//! Three tables: `records`, `record_meta`, `record_history`, with cascade
//! foreign keys so deleting a record removes its metadata and history.
//! Metadata reads are cached per record id and invalidated on any write that
//! touches that record's metadata or the record itself.

use crate::now_rfc3339;
use async_trait::async_trait;
use pulse_types::{
    HistoryEntry, ListOptions, MetaMap, NewRecord, OrderDir, Priority, Record, RecordDetail,
    RecordFilter, RecordPatch, RecordStore, Status, StoreError,
};
use std::collections::HashMap;
use std::path::Path;

pub struct SqliteRecordStore {
    conn: std::sync::Mutex<rusqlite::Connection>,
    meta_cache: std::sync::Mutex<HashMap<i64, MetaMap>>,
}

impl SqliteRecordStore {
    /// Open (or create) a store at the given path. `":memory:"` works too.
    pub fn new(path: impl AsRef<Path>) -> Result<Self, StoreError> {
        let conn = rusqlite::Connection::open(path)
            .map_err(|e| StoreError::Persistence(e.to_string()))?;

        conn.execute_batch(
            r#"
            PRAGMA foreign_keys = ON;

            CREATE TABLE IF NOT EXISTS records (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                submitter_id TEXT,
                category TEXT NOT NULL,
                rating INTEGER,
                body TEXT,
                source_url TEXT,
                source_title TEXT,
                status TEXT NOT NULL DEFAULT 'new',
                assignee_id TEXT,
                priority TEXT NOT NULL DEFAULT 'medium',
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL
            );

            CREATE TABLE IF NOT EXISTS record_meta (
                record_id INTEGER NOT NULL,
                key TEXT NOT NULL,
                value TEXT NOT NULL,
                PRIMARY KEY (record_id, key),
                FOREIGN KEY (record_id) REFERENCES records(id) ON DELETE CASCADE
            );

            CREATE TABLE IF NOT EXISTS record_history (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                record_id INTEGER NOT NULL,
                actor TEXT NOT NULL,
                message TEXT NOT NULL,
                old_status TEXT,
                new_status TEXT,
                created_at TEXT NOT NULL,
                FOREIGN KEY (record_id) REFERENCES records(id) ON DELETE CASCADE
            );

            CREATE INDEX IF NOT EXISTS idx_records_status ON records(status);
            CREATE INDEX IF NOT EXISTS idx_records_category ON records(category);
            CREATE INDEX IF NOT EXISTS idx_records_created ON records(created_at);
            CREATE INDEX IF NOT EXISTS idx_history_record ON record_history(record_id);
            "#,
        )
        .map_err(|e| StoreError::Persistence(e.to_string()))?;

        Ok(Self {
            conn: std::sync::Mutex::new(conn),
            meta_cache: std::sync::Mutex::new(HashMap::new()),
        })
    }

    fn with_conn<T, F>(&self, f: F) -> Result<T, StoreError>
    where
        F: FnOnce(&rusqlite::Connection) -> Result<T, rusqlite::Error>,
    {
        let conn = self
            .conn
            .lock()
            .map_err(|e| StoreError::Persistence(format!("failed to acquire lock: {}", e)))?;
        f(&conn).map_err(|e| StoreError::Persistence(e.to_string()))
    }

    fn invalidate_meta(&self, id: i64) {
        if let Ok(mut cache) = self.meta_cache.lock() {
            cache.remove(&id);
        }
    }

    fn cached_meta(&self, id: i64) -> Option<MetaMap> {
        self.meta_cache.lock().ok()?.get(&id).cloned()
    }

    fn cache_meta(&self, id: i64, meta: &MetaMap) {
        if let Ok(mut cache) = self.meta_cache.lock() {
            cache.insert(id, meta.clone());
        }
    }
}

const RECORD_COLS: &str = "id, submitter_id, category, rating, body, source_url, source_title, \
                           status, assignee_id, priority, created_at, updated_at";

fn row_to_record(row: &rusqlite::Row) -> Result<Record, rusqlite::Error> {
    let status: String = row.get(7)?;
    let priority: String = row.get(9)?;
    Ok(Record {
        id: row.get(0)?,
        submitter_id: row.get(1)?,
        category: row.get(2)?,
        rating: row.get::<_, Option<i64>>(3)?.map(|v| v as u8),
        body: row.get(4)?,
        source_url: row.get(5)?,
        source_title: row.get(6)?,
        status: Status::parse(&status).unwrap_or_default(),
        assignee_id: row.get(8)?,
        priority: Priority::parse(&priority).unwrap_or_default(),
        created_at: row.get(10)?,
        updated_at: row.get(11)?,
    })
}

/// WHERE clause + string params from a filter. Every fragment is a fixed
/// template; user input only ever travels as a bound parameter.
fn build_where(filter: &RecordFilter) -> (String, Vec<String>) {
    let mut clauses: Vec<String> = Vec::new();
    let mut params: Vec<String> = Vec::new();

    if !filter.statuses.is_empty() {
        let marks: Vec<&str> = filter.statuses.iter().map(|_| "?").collect();
        clauses.push(format!("status IN ({})", marks.join(",")));
        params.extend(filter.statuses.iter().map(|s| s.as_str().to_string()));
    }
    if let Some(ref cat) = filter.category {
        clauses.push("category = ?".to_string());
        params.push(cat.clone());
    }
    if let Some(ref sub) = filter.submitter_id {
        clauses.push("submitter_id = ?".to_string());
        params.push(sub.clone());
    }
    if let Some(ref after) = filter.date_after {
        if after.len() == 10 {
            clauses.push("substr(created_at, 1, 10) >= ?".to_string());
        } else {
            clauses.push("created_at >= ?".to_string());
        }
        params.push(after.clone());
    }
    if let Some(ref before) = filter.date_before {
        if before.len() == 10 {
            clauses.push("substr(created_at, 1, 10) <= ?".to_string());
        } else {
            clauses.push("created_at <= ?".to_string());
        }
        params.push(before.clone());
    }
    if let Some(ref search) = filter.search {
        clauses.push(
            "(LOWER(COALESCE(body, '')) LIKE ? OR LOWER(COALESCE(source_title, '')) LIKE ?)"
                .to_string(),
        );
        let needle = format!("%{}%", search.to_lowercase());
        params.push(needle.clone());
        params.push(needle);
    }

    let sql = if clauses.is_empty() {
        String::new()
    } else {
        format!(" WHERE {}", clauses.join(" AND "))
    };
    (sql, params)
}

#[async_trait]
impl RecordStore for SqliteRecordStore {
    async fn create(&self, new: NewRecord) -> Result<Record, StoreError> {
        let now = now_rfc3339();
        let mut meta_rows: Vec<(String, String)> = Vec::with_capacity(new.meta.len());
        for (k, v) in &new.meta {
            let serialized = serde_json::to_string(v)
                .map_err(|e| StoreError::Serialization(e.to_string()))?;
            meta_rows.push((k.clone(), serialized));
        }

        // Record, metadata, and the "created" history entry commit together:
        // a reader can never see the record without its first history entry.
        let id = self.with_conn(|conn| {
            let tx = conn.unchecked_transaction()?;
            tx.execute(
                "INSERT INTO records (submitter_id, category, rating, body, source_url, \
                 source_title, status, assignee_id, priority, created_at, updated_at) \
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)",
                rusqlite::params![
                    new.submitter_id,
                    new.category,
                    new.rating.map(|r| r as i64),
                    new.body,
                    new.source_url,
                    new.source_title,
                    Status::New.as_str(),
                    Option::<String>::None,
                    Priority::default().as_str(),
                    now,
                    now,
                ],
            )?;
            let id = tx.last_insert_rowid();
            for (key, value) in &meta_rows {
                tx.execute(
                    "INSERT INTO record_meta (record_id, key, value) VALUES (?1, ?2, ?3)",
                    rusqlite::params![id, key, value],
                )?;
            }
            tx.execute(
                "INSERT INTO record_history (record_id, actor, message, old_status, new_status, \
                 created_at) VALUES (?1, 'system', 'created', NULL, ?2, ?3)",
                rusqlite::params![id, Status::New.as_str(), now],
            )?;
            tx.commit()?;
            Ok(id)
        })?;

        self.invalidate_meta(id);
        self.get(id)
            .await?
            .ok_or_else(|| StoreError::Persistence("created record not readable".to_string()))
    }

    async fn get(&self, id: i64) -> Result<Option<Record>, StoreError> {
        self.with_conn(|conn| {
            let sql = format!("SELECT {} FROM records WHERE id = ?1", RECORD_COLS);
            let mut stmt = conn.prepare(&sql)?;
            match stmt.query_row([id], row_to_record) {
                Ok(r) => Ok(Some(r)),
                Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
                Err(e) => Err(e),
            }
        })
    }

    async fn get_detail(&self, id: i64) -> Result<Option<RecordDetail>, StoreError> {
        let Some(record) = self.get(id).await? else {
            return Ok(None);
        };
        let meta = self.all_meta(id).await?;
        let history = self.history(id).await?;
        Ok(Some(RecordDetail {
            record,
            meta,
            history,
        }))
    }

    async fn list(&self, opts: &ListOptions) -> Result<(Vec<Record>, u64), StoreError> {
        let (where_sql, params) = build_where(&opts.filter);
        let order_sql = format!(
            " ORDER BY {} {}, id ASC",
            opts.order_field.column(),
            opts.order_dir.keyword()
        );
        // LIMIT -1 means unlimited in SQLite.
        let limit = if opts.limit == 0 {
            -1
        } else {
            opts.limit as i64
        };
        let page_sql = format!(
            "SELECT {} FROM records{}{} LIMIT {} OFFSET {}",
            RECORD_COLS, where_sql, order_sql, limit, opts.offset
        );
        let count_sql = format!("SELECT COUNT(*) FROM records{}", where_sql);

        self.with_conn(|conn| {
            let refs: Vec<&dyn rusqlite::ToSql> =
                params.iter().map(|p| p as &dyn rusqlite::ToSql).collect();

            let total: i64 = conn.query_row(&count_sql, refs.as_slice(), |row| row.get(0))?;

            let mut stmt = conn.prepare(&page_sql)?;
            let rows = stmt.query_map(refs.as_slice(), row_to_record)?;
            let mut items = Vec::new();
            for row in rows {
                items.push(row?);
            }
            Ok((items, total as u64))
        })
    }

    async fn scan(&self, filter: &RecordFilter) -> Result<Vec<Record>, StoreError> {
        let (where_sql, params) = build_where(filter);
        let sql = format!(
            "SELECT {} FROM records{} ORDER BY id ASC",
            RECORD_COLS, where_sql
        );
        self.with_conn(|conn| {
            let refs: Vec<&dyn rusqlite::ToSql> =
                params.iter().map(|p| p as &dyn rusqlite::ToSql).collect();
            let mut stmt = conn.prepare(&sql)?;
            let rows = stmt.query_map(refs.as_slice(), row_to_record)?;
            let mut items = Vec::new();
            for row in rows {
                items.push(row?);
            }
            Ok(items)
        })
    }

    async fn update(
        &self,
        id: i64,
        patch: RecordPatch,
        actor: &str,
    ) -> Result<Option<Record>, StoreError> {
        let now = now_rfc3339();
        let actor = actor.to_string();

        let updated = self.with_conn(|conn| {
            let tx = conn.unchecked_transaction()?;

            let sql = format!("SELECT {} FROM records WHERE id = ?1", RECORD_COLS);
            let existing = {
                let mut stmt = tx.prepare(&sql)?;
                match stmt.query_row([id], row_to_record) {
                    Ok(r) => r,
                    Err(rusqlite::Error::QueryReturnedNoRows) => return Ok(None),
                    Err(e) => return Err(e),
                }
            };

            let mut sets: Vec<&str> = Vec::new();
            let mut params: Vec<Box<dyn rusqlite::ToSql>> = Vec::new();
            if let Some(ref category) = patch.category {
                sets.push("category = ?");
                params.push(Box::new(category.clone()));
            }
            if let Some(ref body) = patch.body {
                sets.push("body = ?");
                params.push(Box::new(body.clone()));
            }
            if let Some(status) = patch.status {
                sets.push("status = ?");
                params.push(Box::new(status.as_str().to_string()));
            }
            if let Some(ref assignee) = patch.assignee_id {
                sets.push("assignee_id = ?");
                params.push(Box::new(assignee.clone()));
            }
            if let Some(priority) = patch.priority {
                sets.push("priority = ?");
                params.push(Box::new(priority.as_str().to_string()));
            }
            sets.push("updated_at = ?");
            params.push(Box::new(now.clone()));
            params.push(Box::new(id));

            let update_sql = format!(
                "UPDATE records SET {} WHERE id = ?",
                sets.join(", ")
            );
            tx.execute(&update_sql, rusqlite::params_from_iter(params))?;

            if let Some(status) = patch.status {
                if status != existing.status {
                    let entry =
                        HistoryEntry::status_changed(existing.status, status, &actor, &now);
                    tx.execute(
                        "INSERT INTO record_history (record_id, actor, message, old_status, \
                         new_status, created_at) VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                        rusqlite::params![
                            id,
                            entry.actor,
                            entry.message,
                            existing.status.as_str(),
                            status.as_str(),
                            now,
                        ],
                    )?;
                }
            }

            let refreshed = {
                let mut stmt = tx.prepare(&sql)?;
                stmt.query_row([id], row_to_record)?
            };
            tx.commit()?;
            Ok(Some(refreshed))
        })?;

        Ok(updated)
    }

    async fn delete(&self, id: i64) -> Result<bool, StoreError> {
        let deleted = self.with_conn(|conn| {
            // Cascades to record_meta and record_history via FKs.
            let n = conn.execute("DELETE FROM records WHERE id = ?1", [id])?;
            Ok(n > 0)
        })?;
        self.invalidate_meta(id);
        Ok(deleted)
    }

    async fn get_meta(
        &self,
        id: i64,
        key: &str,
    ) -> Result<Option<serde_json::Value>, StoreError> {
        Ok(self.all_meta(id).await?.get(key).cloned())
    }

    async fn all_meta(&self, id: i64) -> Result<MetaMap, StoreError> {
        if let Some(cached) = self.cached_meta(id) {
            return Ok(cached);
        }
        let meta = self.with_conn(|conn| {
            let mut stmt =
                conn.prepare("SELECT key, value FROM record_meta WHERE record_id = ?1")?;
            let rows = stmt.query_map([id], |row| {
                Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?))
            })?;
            let mut meta = MetaMap::new();
            for row in rows {
                let (key, raw) = row?;
                let value = serde_json::from_str(&raw)
                    .unwrap_or(serde_json::Value::String(raw));
                meta.insert(key, value);
            }
            Ok(meta)
        })?;
        self.cache_meta(id, &meta);
        Ok(meta)
    }

    async fn set_meta(
        &self,
        id: i64,
        key: &str,
        value: serde_json::Value,
    ) -> Result<bool, StoreError> {
        let serialized =
            serde_json::to_string(&value).map_err(|e| StoreError::Serialization(e.to_string()))?;
        let key = key.to_string();
        let set = self.with_conn(|conn| {
            let exists: bool = conn
                .query_row("SELECT 1 FROM records WHERE id = ?1", [id], |_| Ok(true))
                .or_else(|e| match e {
                    rusqlite::Error::QueryReturnedNoRows => Ok(false),
                    other => Err(other),
                })?;
            if !exists {
                return Ok(false);
            }
            conn.execute(
                "INSERT INTO record_meta (record_id, key, value) VALUES (?1, ?2, ?3) \
                 ON CONFLICT(record_id, key) DO UPDATE SET value = excluded.value",
                rusqlite::params![id, key, serialized],
            )?;
            Ok(true)
        })?;
        self.invalidate_meta(id);
        Ok(set)
    }

    async fn delete_meta(&self, id: i64, key: &str) -> Result<bool, StoreError> {
        let key = key.to_string();
        let deleted = self.with_conn(|conn| {
            let n = conn.execute(
                "DELETE FROM record_meta WHERE record_id = ?1 AND key = ?2",
                rusqlite::params![id, key],
            )?;
            Ok(n > 0)
        })?;
        self.invalidate_meta(id);
        Ok(deleted)
    }

    async fn history(&self, id: i64) -> Result<Vec<HistoryEntry>, StoreError> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT actor, message, old_status, new_status, created_at \
                 FROM record_history WHERE record_id = ?1 ORDER BY id ASC",
            )?;
            let rows = stmt.query_map([id], |row| {
                let old: Option<String> = row.get(2)?;
                let new: Option<String> = row.get(3)?;
                Ok(HistoryEntry {
                    actor: row.get(0)?,
                    message: row.get(1)?,
                    old_status: old.as_deref().and_then(Status::parse),
                    new_status: new.as_deref().and_then(Status::parse),
                    created_at: row.get(4)?,
                })
            })?;
            let mut entries = Vec::new();
            for row in rows {
                entries.push(row?);
            }
            Ok(entries)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn store() -> SqliteRecordStore {
        SqliteRecordStore::new(":memory:").unwrap()
    }

    fn new_record(category: &str, rating: Option<u8>, body: Option<&str>) -> NewRecord {
        NewRecord {
            category: category.to_string(),
            rating,
            body: body.map(str::to_string),
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn create_persists_record_meta_and_history_together() {
        let store = store();
        let mut new = new_record("bug", Some(4), Some("report"));
        new.meta.insert("referrer".to_string(), json!("https://a/b"));
        new.meta.insert("depth".to_string(), json!({"x": 1}));
        let created = store.create(new).await.unwrap();
        assert!(created.id > 0);
        assert_eq!(created.status, Status::New);

        let detail = store.get_detail(created.id).await.unwrap().unwrap();
        assert_eq!(detail.meta.len(), 2);
        assert_eq!(detail.meta.get("depth"), Some(&json!({"x": 1})));
        assert_eq!(detail.history.len(), 1);
        assert_eq!(detail.history[0].message, "created");
    }

    #[tokio::test]
    async fn delete_cascades_and_reports_absence() {
        let store = store();
        let created = store.create(new_record("bug", None, Some("x"))).await.unwrap();
        store.set_meta(created.id, "k", json!("v")).await.unwrap();

        assert!(store.delete(created.id).await.unwrap());
        assert!(store.get(created.id).await.unwrap().is_none());
        assert!(store.all_meta(created.id).await.unwrap().is_empty());
        assert!(store.history(created.id).await.unwrap().is_empty());
        assert!(!store.delete(created.id).await.unwrap());
    }

    #[tokio::test]
    async fn meta_cache_sees_writes() {
        let store = store();
        let created = store.create(new_record("bug", None, Some("x"))).await.unwrap();
        // Warm the cache, then write through it.
        assert!(store.all_meta(created.id).await.unwrap().is_empty());
        store.set_meta(created.id, "k", json!(1)).await.unwrap();
        assert_eq!(store.get_meta(created.id, "k").await.unwrap(), Some(json!(1)));
        store.set_meta(created.id, "k", json!(2)).await.unwrap();
        assert_eq!(store.get_meta(created.id, "k").await.unwrap(), Some(json!(2)));
        store.delete_meta(created.id, "k").await.unwrap();
        assert!(store.all_meta(created.id).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn update_and_list_with_filters() {
        let store = store();
        let a = store
            .create(new_record("bug", Some(1), Some("slow checkout")))
            .await
            .unwrap();
        let b = store
            .create(new_record("praise", Some(5), Some("love it")))
            .await
            .unwrap();

        let patch = RecordPatch {
            status: Some(Status::Resolved),
            ..Default::default()
        };
        let updated = store.update(a.id, patch, "admin").await.unwrap().unwrap();
        assert_eq!(updated.status, Status::Resolved);
        assert!(updated.updated_at >= updated.created_at);
        assert_eq!(store.history(a.id).await.unwrap().len(), 2);

        let opts = ListOptions {
            filter: RecordFilter {
                statuses: vec![Status::Resolved],
                ..Default::default()
            },
            ..Default::default()
        };
        let (items, total) = store.list(&opts).await.unwrap();
        assert_eq!(total, 1);
        assert_eq!(items[0].id, a.id);

        let opts = ListOptions {
            filter: RecordFilter {
                search: Some("LOVE".to_string()),
                ..Default::default()
            },
            ..Default::default()
        };
        let (items, _) = store.list(&opts).await.unwrap();
        assert_eq!(items[0].id, b.id);

        // Unknown record updates report absence.
        let patch = RecordPatch {
            status: Some(Status::Closed),
            ..Default::default()
        };
        assert!(store.update(9999, patch, "admin").await.unwrap().is_none());
    }
}
