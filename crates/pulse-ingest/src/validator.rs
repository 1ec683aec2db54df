//! Submission validation and sanitization.
//!
//! Side-effect free: turns a raw wire submission into either a normalized
//! record-creation payload or a list of field-level errors. Never touches
//! storage, so a request dropped mid-validation leaves nothing behind.

use pulse_types::{FieldError, IngestConfig, NewRecord, SubmitRequest};

pub fn validate(raw: &SubmitRequest, cfg: &IngestConfig) -> Result<NewRecord, Vec<FieldError>> {
    let mut errors: Vec<FieldError> = Vec::new();

    let category = clean_scalar(raw.category.as_deref(), cfg.max_field_len);
    if category.is_none() {
        errors.push(FieldError::new("category", "category is required"));
    }

    let body = raw
        .comment
        .as_deref()
        .map(|c| clean_text(c, cfg.max_body_len))
        .filter(|c| !c.is_empty());

    let rating = match raw.rating {
        None => None,
        Some(r) if (1..=5).contains(&r) => Some(r as u8),
        Some(_) => {
            errors.push(FieldError::new("rating", "rating must be between 1 and 5"));
            None
        }
    };

    if body.is_none() && raw.rating.is_none() {
        errors.push(FieldError::new(
            "comment",
            "either a comment or a rating is required",
        ));
    }

    let mut meta = pulse_types::MetaMap::new();

    if let Some(email) = clean_scalar(raw.email.as_deref(), cfg.max_field_len) {
        if is_valid_email(&email) {
            meta.insert("email".to_string(), serde_json::Value::String(email));
        } else {
            errors.push(FieldError::new("email", "email address is not valid"));
        }
    }
    if let Some(name) = clean_scalar(raw.name.as_deref(), cfg.max_field_len) {
        meta.insert("name".to_string(), serde_json::Value::String(name));
    }

    // Unknown extra fields survive as metadata when the key is clean;
    // anything else is dropped rather than failing the submission.
    for (key, value) in &raw.extra {
        if meta.len() >= cfg.max_meta_entries {
            break;
        }
        if let Some(key) = sanitize_meta_key(key) {
            meta.entry(key).or_insert_with(|| value.clone());
        }
    }

    if !errors.is_empty() {
        return Err(errors);
    }

    Ok(NewRecord {
        submitter_id: None,
        category: category.unwrap_or_default(),
        rating,
        body,
        source_url: clean_scalar(raw.page_url.as_deref(), cfg.max_field_len),
        source_title: clean_scalar(raw.page_title.as_deref(), cfg.max_field_len),
        meta,
    })
}

/// Trim, strip markup, and bound a scalar field; None when empty.
fn clean_scalar(value: Option<&str>, max_len: usize) -> Option<String> {
    let cleaned = clean_text(value?, max_len);
    if cleaned.is_empty() {
        None
    } else {
        Some(cleaned)
    }
}

fn clean_text(value: &str, max_len: usize) -> String {
    let stripped = strip_tags(value);
    stripped.trim().chars().take(max_len).collect()
}

/// Remove anything between `<` and `>`, including the delimiters. A trailing
/// unterminated tag is dropped entirely.
fn strip_tags(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    let mut in_tag = false;
    for c in s.chars() {
        match c {
            '<' => in_tag = true,
            '>' if in_tag => in_tag = false,
            c if !in_tag => out.push(c),
            _ => {}
        }
    }
    out
}

/// Metadata keys allow only alphanumerics and underscore; invalid keys mean
/// the entry is discarded, not the submission.
fn sanitize_meta_key(key: &str) -> Option<String> {
    if key.is_empty() || key.len() > 64 {
        return None;
    }
    if key.chars().all(|c| c.is_ascii_alphanumeric() || c == '_') {
        Some(key.to_string())
    } else {
        None
    }
}

/// Syntactic check only: one `@`, non-empty local part, dotted domain.
fn is_valid_email(s: &str) -> bool {
    if s.chars().any(char::is_whitespace) {
        return false;
    }
    let mut parts = s.split('@');
    match (parts.next(), parts.next(), parts.next()) {
        (Some(local), Some(domain), None) => {
            !local.is_empty()
                && domain.contains('.')
                && !domain.starts_with('.')
                && !domain.ends_with('.')
        }
        _ => false,
    }
}
