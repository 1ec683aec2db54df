//! Core types and traits for the pulse feedback/event pipeline.
//!
//! Record, metadata, and history model plus the `RecordStore` trait that the
//! store backends implement and the wire DTOs the HTTP layer deserializes.

mod config;
mod dto;
mod filter;
mod record;
mod traits;

pub use config::*;
pub use dto::*;
pub use filter::*;
pub use record::*;
pub use traits::*;
