//! Plain-text rendering of messages for the terminal.

use std::fmt::Display;

use chrono::{DateTime, TimeZone, Utc};
use little_chat_core::{MessageView, Role};

/// Left bar drawn in front of every message header.
pub const BAR_CHAR: &str = "▎";

/// Label shown for each role.
#[inline]
pub fn role_label(role: Role) -> &'static str {
    match role {
        Role::User => "🧑 You",
        Role::Assistant => "🤖 Assistant",
    }
}

/// Formats a message time as `MM/dd HH:mm` in `tz`.
pub fn format_timestamp<Tz>(timestamp: DateTime<Utc>, tz: &Tz) -> String
where
    Tz: TimeZone,
    Tz::Offset: Display,
{
    timestamp.with_timezone(tz).format("%m/%d %H:%M").to_string()
}

/// The header line of a message, without the bar.
pub fn header<Tz>(view: &MessageView, tz: &Tz) -> String
where
    Tz: TimeZone,
    Tz::Offset: Display,
{
    format!(
        "{} · {}",
        role_label(view.role),
        format_timestamp(view.timestamp, tz)
    )
}

/// The text to show for a message. A reply that has not started yet shows
/// a typing indicator.
pub fn body(view: &MessageView) -> &str {
    if view.is_loading && view.text.is_empty() {
        "..."
    } else {
        &view.text
    }
}
