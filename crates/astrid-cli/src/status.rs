//! System health snapshot shared by the `/status` slash command and the
//! `astrid status` subcommand (§6: both print the same snapshot).

use astrid_core::IsolationLevel;

use crate::theme::Theme;

/// A point-in-time snapshot of runtime health.
pub struct StatusSnapshot {
    /// Provider name in use (e.g. `"claude"`).
    pub provider_name: String,
    /// Model id configured for primary turns.
    pub model: String,
    /// Sandbox isolation currently in effect.
    pub isolation: IsolationLevel,
    /// Number of registered built-in tools.
    pub tool_count: usize,
    /// Messages currently held in the session's working history.
    pub history_messages: usize,
    /// Whether `deps.auto_confirm` is set.
    pub auto_confirm: bool,
}

impl StatusSnapshot {
    /// Render the snapshot in the given theme.
    pub fn render(&self, theme: Theme) -> String {
        let isolation = match self.isolation {
            IsolationLevel::Full => "full",
            IsolationLevel::None => "none (unsandboxed subprocess)",
        };
        let mut lines = vec![theme.header("Astrid status")];
        lines.push(theme.kv("provider", &format!("{} ({})", self.provider_name, self.model)));
        lines.push(theme.kv("sandbox isolation", isolation));
        lines.push(theme.kv("tools registered", &self.tool_count.to_string()));
        lines.push(theme.kv("history messages", &self.history_messages.to_string()));
        lines.push(theme.kv("auto_confirm", &self.auto_confirm.to_string()));
        lines.join("\n")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn render_includes_every_field() {
        let snapshot = StatusSnapshot {
            provider_name: "claude".into(),
            model: "claude-sonnet-4-20250514".into(),
            isolation: IsolationLevel::Full,
            tool_count: 5,
            history_messages: 12,
            auto_confirm: false,
        };
        let rendered = snapshot.render(Theme::Plain);
        assert!(rendered.contains("claude"));
        assert!(rendered.contains("full"));
        assert!(rendered.contains("5"));
        assert!(rendered.contains("12"));
        assert!(rendered.contains("false"));
    }
}
