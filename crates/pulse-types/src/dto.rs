//! Wire DTOs for submissions and field-level validation errors.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Raw submission body as posted by a tracking script or feedback form.
///
/// Unknown fields land in `extra` and are preserved as metadata when their
/// keys pass sanitization; nothing is rejected for being unrecognized.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct SubmitRequest {
    /// Tracking scripts post this as `type`; both spellings are accepted.
    #[serde(default, alias = "type")]
    pub category: Option<String>,
    #[serde(default)]
    pub rating: Option<i64>,
    #[serde(default)]
    pub comment: Option<String>,
    #[serde(default)]
    pub page_url: Option<String>,
    #[serde(default)]
    pub page_title: Option<String>,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(flatten)]
    pub extra: HashMap<String, serde_json::Value>,
}

/// One human-readable validation failure, tied to the offending field.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldError {
    pub field: String,
    pub message: String,
}

impl FieldError {
    pub fn new(field: &str, message: impl Into<String>) -> Self {
        FieldError {
            field: field.to_string(),
            message: message.into(),
        }
    }
}
