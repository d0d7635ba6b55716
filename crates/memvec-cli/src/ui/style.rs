//! Message styling for CLI output.
//!
//! | Prefix | Meaning | Color |
//! |--------|---------|-------|
//! | `[ok]` | Success | Green |
//! | `[err]` | Error | Red |
//! | `[warn]` | Warning | Yellow |
//! | `[info]` | Information | Blue |
//! | `[hint]` | Suggestion | Cyan |

use owo_colors::OwoColorize;

use super::color::ColorMode;

/// Message severity/type for CLI output.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessageType {
    Ok,
    Err,
    Warn,
    Info,
    Hint,
}

impl MessageType {
    pub fn prefix(&self) -> &'static str {
        match self {
            Self::Ok => "[ok]",
            Self::Err => "[err]",
            Self::Warn => "[warn]",
            Self::Info => "[info]",
            Self::Hint => "[hint]",
        }
    }
}

/// Formats messages and fragments, with or without color.
#[derive(Debug, Clone)]
pub struct Style {
    color_mode: ColorMode,
}

impl Style {
    pub fn new(color_mode: ColorMode) -> Self {
        Self { color_mode }
    }

    pub fn colors_enabled(&self) -> bool {
        self.color_mode.is_enabled()
    }

    /// A message with its type prefix, e.g. `[ok] Stored memory`.
    pub fn message(&self, msg_type: MessageType, text: &str) -> String {
        let prefix = msg_type.prefix();
        if !self.colors_enabled() {
            return format!("{} {}", prefix, text);
        }
        let colored_prefix = match msg_type {
            MessageType::Ok => prefix.green().to_string(),
            MessageType::Err => prefix.red().to_string(),
            MessageType::Warn => prefix.yellow().to_string(),
            MessageType::Info => prefix.blue().to_string(),
            MessageType::Hint => prefix.cyan().to_string(),
        };
        format!("{} {}", colored_prefix, text)
    }

    /// A detail line indented under a message.
    pub fn message_detail(&self, label: &str, value: &str) -> String {
        format!("     {}: {}", label, value)
    }

    /// A section header.
    pub fn section(&self, title: &str) -> String {
        if self.colors_enabled() {
            title.bold().to_string()
        } else {
            title.to_string()
        }
    }

    /// An error with optional cause and hint lines.
    pub fn error_with_context(&self, msg: &str, cause: Option<&str>, hint: Option<&str>) -> String {
        let mut output = self.message(MessageType::Err, msg);
        if let Some(cause) = cause {
            output.push_str(&format!("\n      Cause: {}", cause));
        }
        if let Some(hint) = hint {
            output.push_str(&format!("\n      Hint: {}", hint));
        }
        output
    }

    pub fn key_value(&self, key: &str, value: &str) -> String {
        if self.colors_enabled() {
            format!("{}: {}", key.dimmed(), value)
        } else {
            format!("{}: {}", key, value)
        }
    }

    /// A record id (yellow).
    pub fn record_id(&self, id: &str) -> String {
        if self.colors_enabled() {
            id.yellow().to_string()
        } else {
            id.to_string()
        }
    }

    /// A similarity score: green from 0.8, yellow from 0.5, red below.
    pub fn score(&self, value: f32) -> String {
        let formatted = format!("{:.3}", value);
        if !self.colors_enabled() {
            return formatted;
        }
        if value >= 0.8 {
            formatted.green().to_string()
        } else if value >= 0.5 {
            formatted.yellow().to_string()
        } else {
            formatted.red().to_string()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn plain() -> Style {
        Style::new(ColorMode::Never)
    }

    #[test]
    fn test_message_prefixes() {
        assert_eq!(plain().message(MessageType::Ok, "Done"), "[ok] Done");
        assert_eq!(plain().message(MessageType::Err, "Failed"), "[err] Failed");
        assert_eq!(MessageType::Hint.prefix(), "[hint]");
    }

    #[test]
    fn test_error_with_context() {
        let output = plain().error_with_context(
            "Storage full",
            Some("quota of 10 records reached"),
            Some("Run `memvec evict 5`"),
        );
        assert_eq!(
            output,
            "[err] Storage full\n      Cause: quota of 10 records reached\n      Hint: Run `memvec evict 5`"
        );
    }

    #[test]
    fn test_plain_fragments() {
        let style = plain();
        assert_eq!(style.key_value("Records", "3"), "Records: 3");
        assert_eq!(style.score(0.91234), "0.912");
        assert_eq!(style.record_id("abc"), "abc");
        assert_eq!(style.message_detail("Id", "abc"), "     Id: abc");
    }

    #[test]
    fn test_colored_output_differs() {
        let style = Style::new(ColorMode::Always);
        assert_ne!(style.message(MessageType::Ok, "Done"), "[ok] Done");
        assert!(style.score(0.9).contains("0.900"));
    }
}
