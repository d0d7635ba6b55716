//! Formatting utilities for CLI output.

use chrono::{DateTime, Utc};

/// Truncate a string to at most `max_len` characters, ending in `...` when cut.
///
/// Newlines are flattened to spaces first so table rows stay on one line.
pub fn truncate_str(s: &str, max_len: usize) -> String {
    let flat: String = s
        .chars()
        .map(|c| if c.is_whitespace() { ' ' } else { c })
        .collect();
    if flat.chars().count() <= max_len {
        return flat;
    }
    if max_len <= 3 {
        return ".".repeat(max_len);
    }
    let kept: String = flat.chars().take(max_len - 3).collect();
    format!("{}...", kept)
}

/// Format a timestamp relative to now ("just now", "5 mins ago", "3h ago", "2d ago").
///
/// Timestamps older than a week, or in the future, are shown as a date.
pub fn format_relative_time(timestamp: DateTime<Utc>) -> String {
    let duration = Utc::now().signed_duration_since(timestamp);

    if duration.num_seconds() < 0 {
        return timestamp.format("%Y-%m-%d").to_string();
    }

    if duration.num_minutes() < 1 {
        "just now".to_string()
    } else if duration.num_hours() < 1 {
        format!("{} mins ago", duration.num_minutes())
    } else if duration.num_hours() < 24 {
        format!("{}h ago", duration.num_hours())
    } else if duration.num_days() < 7 {
        format!("{}d ago", duration.num_days())
    } else {
        timestamp.format("%Y-%m-%d").to_string()
    }
}

/// Format a number with thousands separators.
pub fn format_thousands(n: u64) -> String {
    let digits = n.to_string();
    let len = digits.len();
    let mut result = String::with_capacity(len + len / 3);
    for (i, c) in digits.chars().enumerate() {
        if i > 0 && (len - i) % 3 == 0 {
            result.push(',');
        }
        result.push(c);
    }
    result
}

/// Format a duration in milliseconds ("850 ms", "1.2 s").
pub fn format_millis(ms: f64) -> String {
    if ms >= 1000.0 {
        format!("{:.1} s", ms / 1000.0)
    } else if ms >= 10.0 {
        format!("{:.0} ms", ms)
    } else {
        format!("{:.2} ms", ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    #[test]
    fn test_truncate_str() {
        assert_eq!(truncate_str("hello", 10), "hello");
        assert_eq!(truncate_str("hello", 5), "hello");
        assert_eq!(truncate_str("hello world", 8), "hello...");
        assert_eq!(truncate_str("line one\nline two", 40), "line one line two");
        assert_eq!(truncate_str("hello", 3), "...");
        assert_eq!(truncate_str("héllo wörld", 8), "héllo...");
    }

    #[test]
    fn test_format_relative_time() {
        assert_eq!(format_relative_time(Utc::now()), "just now");
        assert_eq!(
            format_relative_time(Utc::now() - Duration::minutes(5)),
            "5 mins ago"
        );
        assert_eq!(format_relative_time(Utc::now() - Duration::hours(3)), "3h ago");
        assert_eq!(format_relative_time(Utc::now() - Duration::days(2)), "2d ago");
    }

    #[test]
    fn test_format_thousands() {
        assert_eq!(format_thousands(0), "0");
        assert_eq!(format_thousands(999), "999");
        assert_eq!(format_thousands(1000), "1,000");
        assert_eq!(format_thousands(1234567), "1,234,567");
    }

    #[test]
    fn test_format_millis() {
        assert_eq!(format_millis(0.5), "0.50 ms");
        assert_eq!(format_millis(850.0), "850 ms");
        assert_eq!(format_millis(1200.0), "1.2 s");
    }
}
