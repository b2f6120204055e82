use serde::Serialize;

const MINUTE: i64 = 60;
const HOUR: i64 = 60 * MINUTE;
const DAY: i64 = 24 * HOUR;
const WEEK: i64 = 7 * DAY;

/// How recently a pod was seen
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum Freshness {
    Fresh,
    Recent,
    Stale,
    VeryStale,
}

impl Freshness {
    /// CSS class used by the HTML renderer
    pub fn class(&self) -> &'static str {
        match self {
            Freshness::Fresh => "fresh",
            Freshness::Recent => "recent",
            Freshness::Stale => "stale",
            Freshness::VeryStale => "very-stale",
        }
    }
}

/// Human readable "time since" with its freshness bucket
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RelativeTime {
    pub text: String,
    pub freshness: Freshness,
}

/// Format `timestamp` relative to `now` (both unix seconds)
pub fn format_relative(timestamp: i64, now: i64) -> RelativeTime {
    // Clock skew can put last-seen slightly in the future
    let diff = (now - timestamp).max(0);

    let (text, freshness) = if diff < MINUTE {
        (plural(diff, "second"), Freshness::Fresh)
    } else if diff < HOUR {
        (plural(diff / MINUTE, "minute"), Freshness::Recent)
    } else if diff < DAY {
        (plural(diff / HOUR, "hour"), Freshness::Stale)
    } else if diff < WEEK {
        (plural(diff / DAY, "day"), Freshness::VeryStale)
    } else {
        (plural(diff / WEEK, "week"), Freshness::VeryStale)
    };

    RelativeTime { text, freshness }
}

fn plural(count: i64, unit: &str) -> String {
    if count == 1 {
        format!("1 {} ago", unit)
    } else {
        format!("{} {}s ago", count, unit)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const NOW: i64 = 1_700_000_000;

    #[test]
    fn test_seconds_are_fresh() {
        let t = format_relative(NOW - 30, NOW);
        assert_eq!(t.text, "30 seconds ago");
        assert_eq!(t.freshness, Freshness::Fresh);
        assert_eq!(t.freshness.class(), "fresh");
    }

    #[test]
    fn test_minutes_are_recent() {
        let t = format_relative(NOW - 61, NOW);
        assert_eq!(t.text, "1 minute ago");
        assert_eq!(t.freshness, Freshness::Recent);
    }

    #[test]
    fn test_hours_are_stale() {
        let t = format_relative(NOW - 2 * HOUR, NOW);
        assert_eq!(t.text, "2 hours ago");
        assert_eq!(t.freshness.class(), "stale");
    }

    #[test]
    fn test_days_and_weeks_are_very_stale() {
        let t = format_relative(NOW - 3 * DAY, NOW);
        assert_eq!(t.text, "3 days ago");
        assert_eq!(t.freshness, Freshness::VeryStale);

        let t = format_relative(NOW - 9 * DAY, NOW);
        assert_eq!(t.text, "1 week ago");
        assert_eq!(t.freshness.class(), "very-stale");
    }

    #[test]
    fn test_future_timestamp_clamps_to_zero() {
        let t = format_relative(NOW + 5, NOW);
        assert_eq!(t.text, "0 seconds ago");
        assert_eq!(t.freshness, Freshness::Fresh);
    }
}
