use chrono::{Local, Utc};

use crate::config::TimestampMode;

// ============== Timestamp Helpers ==============

/// Append a human timestamp to a message, separated by a blank line.
pub fn append_timestamp(message: &str, mode: TimestampMode) -> String {
    let ts = match mode {
        TimestampMode::None => return message.to_string(),
        TimestampMode::Local => Local::now().format("%Y-%m-%d %H:%M:%S %:z").to_string(),
        TimestampMode::Utc => Utc::now().format("%Y-%m-%d %H:%M:%S UTC").to_string(),
    };
    format!("{message}\n\n{ts}")
}

// ============== Text Helpers ==============

/// Cut `s` to `max_len` characters, marking the cut with `...` (counted in `max_len`).
pub fn truncate_text(s: &str, max_len: usize) -> String {
    if s.chars().count() <= max_len {
        return s.to_string();
    }
    let mut out = s
        .chars()
        .take(max_len.saturating_sub(3))
        .collect::<String>();
    out.push_str("...");
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn timestamp_none_leaves_message_alone() {
        assert_eq!(append_timestamp("hi", TimestampMode::None), "hi");
    }

    #[test]
    fn timestamp_local_is_appended() {
        let s = append_timestamp("hi", TimestampMode::Local);
        assert!(s.starts_with("hi\n\n"));
        assert!(s.len() > "hi\n\n".len());
    }

    #[test]
    fn truncate_counts_chars_not_bytes() {
        assert_eq!(truncate_text("héllo", 5), "héllo");
        assert_eq!(truncate_text("héllo wörld", 8), "héllo...");
    }
}
