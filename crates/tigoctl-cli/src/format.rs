//! Display helpers for terminal output.

use chrono::{DateTime, Local, Utc};

/// Truncate a string to a maximum length, adding ellipsis if needed
pub fn truncate_string(s: &str, max_len: usize) -> String {
    if s.chars().count() <= max_len {
        s.to_string()
    } else if max_len <= 3 {
        s.chars().take(max_len).collect()
    } else {
        let truncated: String = s.chars().take(max_len - 3).collect();
        format!("{}...", truncated)
    }
}

/// Server timestamps in local time when they parse as RFC 3339, as-is otherwise
pub fn format_server_date(date: &str) -> String {
    match DateTime::parse_from_rfc3339(date) {
        Ok(dt) => dt.with_timezone(&Local).format("%Y-%m-%d %H:%M:%S").to_string(),
        Err(_) => date.to_string(),
    }
}

pub fn format_local(dt: DateTime<Utc>) -> String {
    dt.with_timezone(&Local).format("%Y-%m-%d %H:%M:%S").to_string()
}

/// "45m", "1h 05m", or "expired"
pub fn format_remaining(minutes: i64) -> String {
    if minutes <= 0 {
        "expired".to_string()
    } else if minutes < 60 {
        format!("{}m", minutes)
    } else {
        format!("{}h {:02}m", minutes / 60, minutes % 60)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_truncate_string() {
        assert_eq!(truncate_string("Hello", 10), "Hello");
        assert_eq!(truncate_string("Hello World", 8), "Hello...");
        assert_eq!(truncate_string("Hi", 2), "Hi");
        assert_eq!(truncate_string("Transferencia recibida", 10), "Transfe...");
    }

    #[test]
    fn test_format_server_date_passes_through_unparsed() {
        assert_eq!(format_server_date("not a date"), "not a date");
        assert_eq!(format_server_date("2025-08-01T10:00:00Z").len(), 19);
    }

    #[test]
    fn test_format_remaining() {
        assert_eq!(format_remaining(0), "expired");
        assert_eq!(format_remaining(45), "45m");
        assert_eq!(format_remaining(65), "1h 05m");
    }
}
