//! Formatting utilities (notification titles, Telegram HTML).

use crate::{domain::LogLevel, utils::truncate_text};

/// Escape HTML special characters for Telegram HTML parse mode.
pub fn escape_html(text: &str) -> String {
    text.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
}

/// Title of a notification raised from a log event: `LEVEL: caption [tag]`.
pub fn format_title(level: LogLevel, caption: &str, app_tag: Option<&str>) -> String {
    match app_tag {
        Some(tag) => format!("{level}: {caption} [{tag}]"),
        None => format!("{level}: {caption}"),
    }
}

/// Render a notification as Telegram HTML: bold title, then the text.
///
/// `max_len` is in characters of visible text (Telegram counts after entity
/// parsing); the text is truncated to fit.
pub fn render_notification_html(title: &str, text: &str, max_len: usize) -> String {
    let title = title.trim();
    if title.is_empty() {
        return escape_html(&truncate_text(text, max_len));
    }
    let budget = max_len.saturating_sub(title.chars().count() + 1);
    format!(
        "<b>{}</b>\n{}",
        escape_html(title),
        escape_html(&truncate_text(text, budget))
    )
}
