//! Read-only aggregation over the record store. Never mutates.
//!
//! Rating rules apply everywhere: null ratings are excluded from
//! rating-based statistics but included in count-based ones.
//! Positive = rating >= 4, neutral = 3, negative = 1..=2.

use pulse_types::{Record, RecordFilter, RecordStore, StoreError};
use serde::Serialize;
use std::collections::{BTreeMap, HashMap};

/// Grouping axes for `count_by`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Dimension {
    Status,
    Category,
}

/// One (value, count) bucket, ordered by count descending.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BucketCount {
    pub value: String,
    pub count: u64,
}

/// One day of the sparse time series. Days with zero records are omitted;
/// callers fill gaps if they need a dense series.
#[derive(Debug, Clone, Serialize)]
pub struct DaySummary {
    pub date: String,
    pub total: u64,
    pub average_rating: Option<f64>,
    pub positive_count: u64,
    pub neutral_count: u64,
    pub negative_count: u64,
}

/// Per-page rollup for the "top pages" report.
#[derive(Debug, Clone, Serialize)]
pub struct PageSummary {
    pub page_url: String,
    pub page_title: String,
    pub count: u64,
    pub average_rating: Option<f64>,
}

/// Count of matching records; null ratings included.
pub async fn count(store: &dyn RecordStore, filter: &RecordFilter) -> Result<u64, StoreError> {
    Ok(store.scan(filter).await?.len() as u64)
}

/// Mean rating over matching rated records; `None` when none are rated.
pub async fn average_rating(
    store: &dyn RecordStore,
    filter: &RecordFilter,
) -> Result<Option<f64>, StoreError> {
    let records = store.scan(filter).await?;
    Ok(mean_rating(records.iter()))
}

/// Counts grouped by status or category, count descending; ties break by
/// value lexical order so output is deterministic.
pub async fn count_by(
    store: &dyn RecordStore,
    dimension: Dimension,
    filter: &RecordFilter,
) -> Result<Vec<BucketCount>, StoreError> {
    let records = store.scan(filter).await?;
    let mut buckets: HashMap<String, u64> = HashMap::new();
    for r in &records {
        let key = match dimension {
            Dimension::Status => r.status.as_str().to_string(),
            Dimension::Category => r.category.clone(),
        };
        *buckets.entry(key).or_insert(0) += 1;
    }
    let mut out: Vec<BucketCount> = buckets
        .into_iter()
        .map(|(value, count)| BucketCount { value, count })
        .collect();
    out.sort_by(|a, b| b.count.cmp(&a.count).then_with(|| a.value.cmp(&b.value)));
    Ok(out)
}

/// Sparse per-day series over created_at, bounded by the filter's date range.
pub async fn summary_over_time(
    store: &dyn RecordStore,
    filter: &RecordFilter,
) -> Result<Vec<DaySummary>, StoreError> {
    let records = store.scan(filter).await?;
    // BTreeMap keeps days sorted ascending.
    let mut days: BTreeMap<String, Vec<&Record>> = BTreeMap::new();
    for r in &records {
        days.entry(day_of(&r.created_at)).or_default().push(r);
    }
    let mut out = Vec::with_capacity(days.len());
    for (date, group) in days {
        let mut positive = 0u64;
        let mut neutral = 0u64;
        let mut negative = 0u64;
        for r in &group {
            match r.rating {
                Some(v) if v >= 4 => positive += 1,
                Some(3) => neutral += 1,
                Some(v) if v > 0 => negative += 1,
                _ => {}
            }
        }
        out.push(DaySummary {
            date,
            total: group.len() as u64,
            average_rating: mean_rating(group.iter().copied()),
            positive_count: positive,
            neutral_count: neutral,
            negative_count: negative,
        });
    }
    Ok(out)
}

/// Pages with the most matching records, count descending, ties broken by
/// page_url lexical order. Records without a source URL are skipped.
pub async fn top_by_page(
    store: &dyn RecordStore,
    filter: &RecordFilter,
    limit: usize,
) -> Result<Vec<PageSummary>, StoreError> {
    let records = store.scan(filter).await?;
    let mut pages: HashMap<String, (String, Vec<&Record>)> = HashMap::new();
    for r in &records {
        let Some(url) = r.source_url.as_deref() else {
            continue;
        };
        let entry = pages
            .entry(url.to_string())
            .or_insert_with(|| (r.source_title.clone().unwrap_or_default(), Vec::new()));
        if entry.0.is_empty() {
            if let Some(title) = r.source_title.as_deref() {
                entry.0 = title.to_string();
            }
        }
        entry.1.push(r);
    }
    let mut out: Vec<PageSummary> = pages
        .into_iter()
        .map(|(url, (title, group))| PageSummary {
            page_url: url,
            page_title: title,
            count: group.len() as u64,
            average_rating: mean_rating(group.into_iter()),
        })
        .collect();
    out.sort_by(|a, b| {
        b.count
            .cmp(&a.count)
            .then_with(|| a.page_url.cmp(&b.page_url))
    });
    out.truncate(limit);
    Ok(out)
}

fn mean_rating<'a>(records: impl Iterator<Item = &'a Record>) -> Option<f64> {
    let mut sum = 0u64;
    let mut n = 0u64;
    for r in records {
        if let Some(v) = r.rating {
            sum += v as u64;
            n += 1;
        }
    }
    if n == 0 {
        None
    } else {
        Some(sum as f64 / n as f64)
    }
}

/// Date part of an RFC 3339 timestamp; falls back to chrono parsing when the
/// string is not plain `YYYY-MM-DD...`.
fn day_of(created_at: &str) -> String {
    if created_at.len() >= 10 && created_at.as_bytes()[4] == b'-' {
        return created_at[..10].to_string();
    }
    chrono::DateTime::parse_from_rfc3339(created_at)
        .map(|dt| dt.date_naive().to_string())
        .unwrap_or_else(|_| created_at.to_string())
}
