//! Explicit configuration passed into the validator, ingestor, and API at
//! construction time. No component reads settings from a global.

use serde::{Deserialize, Serialize};

/// One category in the configured vocabulary. The data model keeps category
/// open-ended; this list only backs the vocabulary endpoint and UI pickers.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Category {
    pub slug: String,
    pub label: String,
}

impl Category {
    pub fn new(slug: &str, label: &str) -> Self {
        Category {
            slug: slug.to_string(),
            label: label.to_string(),
        }
    }
}

/// Bounds applied by the submission validator.
#[derive(Debug, Clone)]
pub struct IngestConfig {
    /// Max length (chars) of the free-text body after sanitization.
    pub max_body_len: usize,
    /// Max length (chars) of every other scalar field.
    pub max_field_len: usize,
    /// Cap on client-supplied metadata entries per submission.
    pub max_meta_entries: usize,
}

impl Default for IngestConfig {
    fn default() -> Self {
        IngestConfig {
            max_body_len: 4000,
            max_field_len: 200,
            max_meta_entries: 20,
        }
    }
}

/// Top-level service configuration.
#[derive(Debug, Clone)]
pub struct PulseConfig {
    /// Shared-secret capability token for admin-mutating endpoints. An empty
    /// token disables admin access entirely.
    pub admin_token: String,
    pub categories: Vec<Category>,
    pub ingest: IngestConfig,
}

impl Default for PulseConfig {
    fn default() -> Self {
        PulseConfig {
            admin_token: String::new(),
            categories: vec![
                Category::new("bug", "Bug report"),
                Category::new("suggestion", "Suggestion"),
                Category::new("question", "Question"),
                Category::new("praise", "Praise"),
                Category::new("page_view", "Page view"),
            ],
            ingest: IngestConfig::default(),
        }
    }
}
