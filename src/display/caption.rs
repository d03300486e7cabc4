//! Channel caption template

use crate::catalog::CatalogRecord;

/// Escape text for Telegram's HTML parse mode
pub fn escape_html(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            _ => out.push(c),
        }
    }
    out
}

/// Render the caption posted under a character's image.
///
/// The caption depends on the record alone, with no uploader attribution, so
/// an edited caption is identical to the one a fresh publish would produce.
pub fn render_caption(record: &CatalogRecord) -> String {
    format!(
        "<b>Character Name:</b> {}\n\
         <b>Anime Name:</b> {}\n\
         <b>Rarity:</b> {} {}\n\
         <b>ID:</b> {}",
        escape_html(&record.display_name),
        escape_html(&record.group_name),
        record.rarity.marker(),
        record.rarity.label(),
        escape_html(record.id.as_str()),
    )
}
