//! HTTP layer for the pulse feedback/event pipeline.

pub mod server;
