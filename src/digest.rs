//! Digest rendering in Telegram's HTML parse mode.
//!
//! A digest is a fixed header, one block per item (bold title, summary lines,
//! trailing link) separated by a dash line, and a fixed attribution footer.
//! The automatic variant splices a publication marker and the local time in
//! front of the footer.

use crate::models::NewsItem;
use chrono::{DateTime, TimeZone};
use html_escape::{encode_double_quoted_attribute, encode_text};
use std::fmt::Display;

pub const HEADER: &str = "🔥 <b>LATEST NEWS</b> 🔥\n\n";
pub const SEPARATOR: &str = "\n\n—\n\n";
pub const FOOTER: &str = "📢 <b>News digest compiled by an automated Telegram bot</b> 🎉";
pub const AUTO_MARKER: &str = "🤖 <b>Automatic publication</b>";

/// Render one item block.
pub fn render_item(item: &NewsItem) -> String {
    let summary = item
        .summary
        .iter()
        .map(|s| encode_text(s))
        .collect::<Vec<_>>()
        .join("\n");
    format!(
        "📰 <b>{}</b>\n{}\n<a href=\"{}\">👉 Read more</a>",
        encode_text(&item.title),
        summary,
        encode_double_quoted_attribute(&item.link)
    )
}

/// Render a digest for an interactive request or a manual channel post.
///
/// With no items this is just header and footer; callers treat an empty
/// selection as a failure before rendering.
pub fn render(items: &[NewsItem]) -> String {
    let mut message = body(items);
    message.push_str(FOOTER);
    message
}

/// Render the automatic-publication variant, stamped with `at` in its own
/// timezone (e.g. `🕐 12:00 MSK`).
pub fn render_auto<Tz>(items: &[NewsItem], at: &DateTime<Tz>) -> String
where
    Tz: TimeZone,
    Tz::Offset: Display,
{
    let body = body(items);
    format!(
        "{}\n\n{}\n🕐 {}\n\n{}",
        body.trim_end_matches('\n'),
        AUTO_MARKER,
        at.format("%H:%M %Z"),
        FOOTER
    )
}

fn body(items: &[NewsItem]) -> String {
    let mut message = String::from(HEADER);
    for item in items {
        message.push_str(&render_item(item));
        message.push_str(SEPARATOR);
    }
    message
}
