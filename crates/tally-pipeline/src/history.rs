// SPDX-FileCopyrightText: 2026 Tally Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Formatting of retrieved memories into prompt history lines.

use chrono::{DateTime, Utc};
use tally_core::ScoredMemory;

const DAY_SECS: i64 = 24 * 60 * 60;

/// Human-readable age of a unix timestamp relative to `now`.
///
/// A zero timestamp is unknown and renders as `long ago`. Timestamps in the
/// future count as today.
pub fn relative_time(timestamp: i64, now: DateTime<Utc>) -> String {
    if timestamp == 0 {
        return "long ago".to_string();
    }
    let age = now.timestamp() - timestamp;
    if age < DAY_SECS {
        "today".to_string()
    } else if age < 2 * DAY_SECS {
        "yesterday".to_string()
    } else {
        format!("{} days ago", age / DAY_SECS)
    }
}

/// Render each hit as `<relative-time> [<category>] <description>`, keeping
/// the similarity order.
pub fn format_history(hits: &[ScoredMemory], now: DateTime<Utc>) -> Vec<String> {
    hits.iter()
        .map(|hit| {
            format!(
                "{} [{}] {}",
                relative_time(hit.entry.timestamp, now),
                hit.entry.category,
                hit.entry.description
            )
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use tally_core::MemoryEntry;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 6, 10, 12, 0, 0).unwrap()
    }

    #[test]
    fn relative_time_buckets() {
        let n = now().timestamp();
        assert_eq!(relative_time(n - 60, now()), "today");
        assert_eq!(relative_time(n - DAY_SECS + 1, now()), "today");
        assert_eq!(relative_time(n - DAY_SECS, now()), "yesterday");
        assert_eq!(relative_time(n - 2 * DAY_SECS, now()), "2 days ago");
        assert_eq!(relative_time(n - 9 * DAY_SECS - 5, now()), "9 days ago");
        assert_eq!(relative_time(n + 600, now()), "today");
        assert_eq!(relative_time(0, now()), "long ago");
    }

    #[test]
    fn lines_carry_category_tag_in_order() {
        let hit = |id, category: &str, description: &str, ts| ScoredMemory {
            entry: MemoryEntry {
                id,
                owner_id: "u1".into(),
                embedding: Vec::new(),
                description: description.into(),
                category: category.into(),
                timestamp: ts,
            },
            score: 0.9,
        };
        let n = now().timestamp();
        let lines = format_history(
            &[
                hit(1, "Transport", "taxi to the office", n - 3600),
                hit(2, "Food & Dining", "two lattes", n - 3 * DAY_SECS),
            ],
            now(),
        );
        assert_eq!(
            lines,
            vec![
                "today [Transport] taxi to the office",
                "3 days ago [Food & Dining] two lattes",
            ]
        );
    }
}
