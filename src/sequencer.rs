//! Order the final result set by recency and cap its size.

use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};

use crate::post::PostRecord;

/// Parse a post timestamp into UTC.
///
/// Accepts RFC 3339 (`2024-01-02T10:00:00.000Z`), a naive date-time read as
/// UTC, and a bare date read as UTC midnight.
#[must_use]
pub fn parse_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    let raw = raw.trim();
    if raw.is_empty() {
        return None;
    }

    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return Some(dt.with_timezone(&Utc));
    }
    if let Ok(naive) = NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S%.f") {
        return Some(naive.and_utc());
    }
    NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .ok()
        .and_then(|date| date.and_hms_opt(0, 0, 0))
        .map(|naive| naive.and_utc())
}

/// Sort key: missing or unparsable timestamps compare lowest.
fn sort_key(post: &PostRecord) -> Option<DateTime<Utc>> {
    post.timestamp.as_deref().and_then(parse_timestamp)
}

/// Sort newest first, then keep at most `max_posts`.
///
/// The sort is stable, so posts with equal keys keep their incoming order.
#[must_use]
pub fn sequence(mut posts: Vec<PostRecord>, max_posts: usize) -> Vec<PostRecord> {
    posts.sort_by_cached_key(|post| std::cmp::Reverse(sort_key(post)));
    posts.truncate(max_posts);
    posts
}
