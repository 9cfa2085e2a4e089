//! Display palette for the terminal frontend.
//!
//! `--theme` only changes which [`Theme`] variant renders these helpers; it
//! never affects turn semantics.

use colored::{Color, Colorize};

/// A named display palette, selected via `--theme`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, clap::ValueEnum)]
pub enum Theme {
    /// Cyan/green accents (default).
    #[default]
    Dark,
    /// Blue/magenta accents, for light terminal backgrounds.
    Light,
    /// No color codes at all.
    Plain,
}

impl Theme {
    fn accent(self) -> Color {
        match self {
            Self::Dark | Self::Plain => Color::Cyan,
            Self::Light => Color::Blue,
        }
    }

    /// Section header.
    pub fn header(self, text: &str) -> String {
        if self == Self::Plain {
            return text.to_owned();
        }
        text.bold().color(self.accent()).to_string()
    }

    /// A successful status line.
    pub fn success(self, text: &str) -> String {
        if self == Self::Plain {
            return format!("[ok] {text}");
        }
        format!("{} {text}", "OK".green())
    }

    /// An error status line.
    pub fn error(self, text: &str) -> String {
        if self == Self::Plain {
            return format!("[error] {text}");
        }
        format!("{} {}", "ERR".red(), text.red())
    }

    /// A warning status line.
    pub fn warning(self, text: &str) -> String {
        if self == Self::Plain {
            return format!("[warn] {text}");
        }
        format!("{} {}", "!".yellow(), text.yellow())
    }

    /// A dimmed, low-emphasis string.
    pub fn dimmed(self, text: &str) -> String {
        if self == Self::Plain {
            return text.to_owned();
        }
        text.dimmed().to_string()
    }

    /// A tool-call annotation, e.g. `shell(command=ls -la)`.
    pub fn tool_call(self, display: &str) -> String {
        if self == Self::Plain {
            return format!("> {display}");
        }
        format!("{} {}", "\u{25b6}".color(self.accent()), display.bold())
    }

    /// A key: value pair.
    pub fn kv(self, key: &str, value: &str) -> String {
        if self == Self::Plain {
            return format!("{key}: {value}");
        }
        format!("{}: {value}", key.bold())
    }
}
