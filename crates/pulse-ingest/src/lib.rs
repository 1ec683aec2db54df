//! Ingestion pipeline: validate, persist, notify, emit hook. Plus triage.

mod ingestor;
mod triage;
pub mod validator;

pub use ingestor::{IngestError, Ingestor, RecordEvent};
pub use triage::{BulkOutcome, Triage};
