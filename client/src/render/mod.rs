//! Output renderers.
//!
//! A renderer is handed the resolved field list once and then every record
//! the collator releases. Column choice and order come only from that list.

pub mod detail;
pub mod json;
pub mod text;

pub use detail::{DetailJsonRenderer, DetailTextRenderer};
pub use json::JsonRenderer;
pub use text::{TextOptions, TextRenderer};

use crate::record::ServerRecord;
use std::io;

pub trait Renderer {
    /// Called once before the first record.
    fn begin(&mut self) -> io::Result<()> {
        Ok(())
    }

    fn render(&mut self, record: &ServerRecord) -> io::Result<()>;

    /// Called once after the last record.
    fn finish(&mut self) -> io::Result<()> {
        Ok(())
    }
}

/// Pads `text` with trailing spaces to `width` characters. Longer text is
/// returned whole.
pub(crate) fn pad_right(text: &str, width: usize) -> String {
    let len = text.chars().count();
    let mut out = String::with_capacity(text.len() + width.saturating_sub(len));
    out.push_str(text);
    out.extend(std::iter::repeat(' ').take(width.saturating_sub(len)));
    out
}

pub(crate) fn pad_left(text: &str, width: usize) -> String {
    let len = text.chars().count();
    let mut out: String = std::iter::repeat(' ')
        .take(width.saturating_sub(len))
        .collect();
    out.push_str(text);
    out
}

/// Centers `text` in `width`; the odd space goes on the right.
pub(crate) fn center(text: &str, width: usize) -> String {
    let rem = width.saturating_sub(text.chars().count());
    let left = rem / 2;
    let right = rem - left;
    format!("{}{}{}", " ".repeat(left), text, " ".repeat(right))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_padding_never_truncates() {
        assert_eq!(pad_right("abc", 5), "abc  ");
        assert_eq!(pad_right("abcdef", 3), "abcdef");
        assert_eq!(pad_left("7", 3), "  7");
        assert_eq!(pad_left("1234", 3), "1234");
    }

    #[test]
    fn test_padding_counts_characters() {
        assert_eq!(pad_right("ñé", 4), "ñé  ");
        assert_eq!(center("¦", 3), " ¦ ");
    }

    #[test]
    fn test_center_puts_extra_space_right() {
        assert_eq!(center("IP", 5), " IP  ");
        assert_eq!(center("Name", 4), "Name");
        assert_eq!(center("Players", 3), "Players");
    }
}
