//! Listing filters, whitelisted ordering, and pagination options.

use crate::{Record, Status};

/// Filter over stored records. All conditions are conjunctive.
#[derive(Debug, Clone, Default)]
pub struct RecordFilter {
    /// Match any of these statuses; empty means all.
    pub statuses: Vec<Status>,
    pub category: Option<String>,
    pub submitter_id: Option<String>,
    /// ISO 8601 lower bound on created_at, inclusive. A bare date ("2026-01-31")
    /// compares against the record's date part.
    pub date_after: Option<String>,
    /// ISO 8601 upper bound on created_at, inclusive.
    pub date_before: Option<String>,
    /// Case-insensitive substring over body and source_title.
    pub search: Option<String>,
}

impl RecordFilter {
    pub fn matches(&self, r: &Record) -> bool {
        if !self.statuses.is_empty() && !self.statuses.contains(&r.status) {
            return false;
        }
        if let Some(ref cat) = self.category {
            if &r.category != cat {
                return false;
            }
        }
        if let Some(ref sub) = self.submitter_id {
            if r.submitter_id.as_deref() != Some(sub.as_str()) {
                return false;
            }
        }
        if let Some(ref after) = self.date_after {
            if ts_key(&r.created_at, after) < after.as_str() {
                return false;
            }
        }
        if let Some(ref before) = self.date_before {
            if ts_key(&r.created_at, before) > before.as_str() {
                return false;
            }
        }
        if let Some(ref needle) = self.search {
            let needle = needle.to_lowercase();
            let in_body = r
                .body
                .as_deref()
                .is_some_and(|b| b.to_lowercase().contains(&needle));
            let in_title = r
                .source_title
                .as_deref()
                .is_some_and(|t| t.to_lowercase().contains(&needle));
            if !in_body && !in_title {
                return false;
            }
        }
        true
    }
}

/// RFC 3339 strings order lexically; a date-only bound compares against the
/// timestamp's date prefix so both bound shapes stay inclusive.
fn ts_key<'a>(created_at: &'a str, bound: &str) -> &'a str {
    if bound.len() == 10 && created_at.len() >= 10 {
        &created_at[..10]
    } else {
        created_at
    }
}

/// Whitelisted ordering fields; anything else is refused at parse time so the
/// order-by clause can never carry injected input.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OrderField {
    #[default]
    CreatedAt,
    Id,
    Rating,
    Status,
    Category,
}

impl OrderField {
    pub fn parse(s: &str) -> Option<OrderField> {
        match s {
            "created_at" => Some(OrderField::CreatedAt),
            "id" => Some(OrderField::Id),
            "rating" => Some(OrderField::Rating),
            "status" => Some(OrderField::Status),
            "category" => Some(OrderField::Category),
            _ => None,
        }
    }

    /// Column name; total because the enum is the whitelist.
    pub fn column(self) -> &'static str {
        match self {
            OrderField::CreatedAt => "created_at",
            OrderField::Id => "id",
            OrderField::Rating => "rating",
            OrderField::Status => "status",
            OrderField::Category => "category",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OrderDir {
    Asc,
    #[default]
    Desc,
}

impl OrderDir {
    pub fn parse(s: &str) -> Option<OrderDir> {
        match s {
            "asc" | "ASC" => Some(OrderDir::Asc),
            "desc" | "DESC" => Some(OrderDir::Desc),
            _ => None,
        }
    }

    pub fn keyword(self) -> &'static str {
        match self {
            OrderDir::Asc => "ASC",
            OrderDir::Desc => "DESC",
        }
    }
}

/// Filter + ordering + offset/limit pagination for `RecordStore::list`.
#[derive(Debug, Clone)]
pub struct ListOptions {
    pub filter: RecordFilter,
    pub order_field: OrderField,
    pub order_dir: OrderDir,
    pub offset: u64,
    pub limit: u64,
}

impl Default for ListOptions {
    fn default() -> Self {
        ListOptions {
            filter: RecordFilter::default(),
            order_field: OrderField::default(),
            order_dir: OrderDir::default(),
            offset: 0,
            limit: 20,
        }
    }
}
