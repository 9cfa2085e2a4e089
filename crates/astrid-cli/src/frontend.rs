//! Terminal frontend (C5): renders streaming deltas to stdout, throttled,
//! and prompts for approval on stdin.

use std::io::Write as _;
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

use astrid_core::{Frontend, ToolResultContent};

use crate::theme::Theme;

/// Minimum interval between delta repaints, keeping well under the
/// ≥20 FPS-equivalent load the contract asks implementations to avoid.
const DELTA_THROTTLE: Duration = Duration::from_millis(80);

/// Rich terminal [`Frontend`]: colored output via `colored`, throttled
/// incremental text rendering, and a blocking stdin prompt for approvals.
pub struct TerminalFrontend {
    theme: Theme,
    verbose: bool,
    printed_len: Mutex<usize>,
    last_render: Mutex<Instant>,
    in_text_run: Mutex<bool>,
}

/// Lock a mutex, recovering the guard instead of panicking if a prior holder
/// panicked while holding it — a rendering hiccup shouldn't take the REPL down.
fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

impl TerminalFrontend {
    /// Build a terminal frontend using `theme` for formatting; `verbose`
    /// enables the thinking-stream callbacks.
    #[must_use]
    pub fn new(theme: Theme, verbose: bool) -> Self {
        Self {
            theme,
            verbose,
            printed_len: Mutex::new(0),
            last_render: Mutex::new(Instant::now() - DELTA_THROTTLE),
            in_text_run: Mutex::new(false),
        }
    }

    fn print_new_suffix(&self, accumulated_text: &str) {
        let mut printed_len = lock(&self.printed_len);
        if accumulated_text.len() < *printed_len {
            // A new run started without an intervening commit reset; reprint fresh.
            *printed_len = 0;
        }
        let suffix = &accumulated_text[*printed_len..];
        if suffix.is_empty() {
            return;
        }
        print!("{suffix}");
        let _ = std::io::stdout().flush();
        *printed_len = accumulated_text.len();
    }

    fn should_render_now(&self) -> bool {
        let mut last = lock(&self.last_render);
        if last.elapsed() < DELTA_THROTTLE {
            return false;
        }
        *last = Instant::now();
        true
    }

    fn reset_run(&self) {
        *lock(&self.printed_len) = 0;
    }
}

#[async_trait::async_trait]
impl Frontend for TerminalFrontend {
    fn on_text_delta(&self, accumulated_text: &str) {
        *lock(&self.in_text_run) = true;
        if self.should_render_now() {
            self.print_new_suffix(accumulated_text);
        }
    }

    fn on_text_commit(&self, final_text: &str) {
        // Always flush the true final state regardless of throttling.
        self.print_new_suffix(final_text);
        if *lock(&self.in_text_run) {
            println!();
        }
        *lock(&self.in_text_run) = false;
        self.reset_run();
    }

    fn on_thinking_delta(&self, accumulated: &str) {
        if !self.verbose {
            return;
        }
        if self.should_render_now() {
            print!("{}", self.theme.dimmed(accumulated));
            let _ = std::io::stdout().flush();
        }
    }

    fn on_thinking_commit(&self, final_text: &str) {
        if !self.verbose || final_text.is_empty() {
            return;
        }
        println!();
    }

    fn on_tool_call(&self, tool_name: &str, args_display: &str) {
        println!("{}", self.theme.tool_call(args_display));
        let _ = tool_name;
    }

    fn on_tool_result(&self, title: &str, content: &ToolResultContent) {
        match content {
            ToolResultContent::Text(text) if !text.is_empty() => {
                println!("{}", self.theme.dimmed(&format!("  {title}: {text}")));
            },
            ToolResultContent::Display(value) => {
                // Shown verbatim, including embedded URLs — never summarized.
                match value.as_str() {
                    Some(text) => println!("{text}"),
                    None => println!("{value}"),
                }
            },
            ToolResultContent::Text(_) | ToolResultContent::Silent => {},
        }
    }

    fn on_status(&self, message: &str) {
        eprintln!("{}", self.theme.warning(message));
    }

    fn on_final_output(&self, text: &str) {
        println!("{text}");
    }

    async fn prompt_approval(&self, description: &str) -> String {
        let header = self.theme.header("Approval requested:").to_owned();
        let description = description.to_owned();
        tokio::task::spawn_blocking(move || {
            println!();
            println!("{header} {description}");
            let options = &["Approve (once)", "Approve (always this session)", "Deny"];
            let selection = dialoguer::Select::with_theme(&dialoguer::theme::ColorfulTheme::default())
                .items(options)
                .default(0)
                .interact_opt();
            match selection {
                Ok(Some(0)) => "y".to_owned(),
                Ok(Some(1)) => "a".to_owned(),
                _ => "n".to_owned(),
            }
        })
        .await
        .unwrap_or_else(|_| "n".to_owned())
    }

    fn cleanup(&self) {
        self.reset_run();
    }
}
