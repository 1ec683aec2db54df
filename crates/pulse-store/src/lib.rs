//! Record store backends: in-memory and SQLite.

mod memory;

#[cfg(feature = "sqlite")]
mod sqlite;

pub use memory::InMemoryRecordStore;
pub use pulse_types::{
    HistoryEntry, ListOptions, MetaMap, NewRecord, Record, RecordDetail, RecordFilter,
    RecordPatch, RecordStore, Status, StoreError,
};

#[cfg(feature = "sqlite")]
pub use sqlite::SqliteRecordStore;

pub(crate) fn now_rfc3339() -> String {
    chrono::Utc::now().to_rfc3339()
}
