//! The interactive dispatcher loop (§4.10): reads a line, routes it to a
//! sandbox passthrough, a slash command, or a model turn.

use std::time::{Duration, Instant};

use astrid_core::{DepsBundle, Frontend, Message, MessageHistory};
use astrid_llm::{LlmProvider, ModelSettings};
use astrid_runtime::history::Processor;
use astrid_runtime::turn::{run_turn, TurnContext};
use astrid_sandbox::SandboxBackend;
use astrid_tools::{ToolContext, ToolRegistry};
use rustyline::completion::{Completer, Pair};
use rustyline::error::ReadlineError;
use rustyline::hint::{Hinter, HistoryHinter};
use rustyline::{Config, Editor, Helper, Highlighter, Validator};
use tokio::sync::Notify;

use crate::status::StatusSnapshot;
use crate::theme::Theme;

/// How soon a second Ctrl-C at the prompt (outside a turn) must follow the
/// first to exit, per the design note on double-interrupt confirmation.
const DOUBLE_INTERRUPT_WINDOW: Duration = Duration::from_secs(2);

/// Slash commands completed on tab, kept in sync with [`dispatch_slash_command`].
const SLASH_COMMANDS: &[&str] =
    &["/help", "/clear", "/status", "/tools", "/history", "/compact", "/yolo"];

/// Completes `/`-prefixed words against [`SLASH_COMMANDS`] and hints the
/// current line against prior history, same division of labor as rustyline's
/// own `DefaultEditor` but with slash-command awareness layered on top.
#[derive(Helper, Validator, Highlighter)]
struct ReplHelper {
    hinter: HistoryHinter,
}

impl Completer for ReplHelper {
    type Candidate = Pair;

    fn complete(
        &self,
        line: &str,
        pos: usize,
        _ctx: &rustyline::Context<'_>,
    ) -> rustyline::Result<(usize, Vec<Pair>)> {
        let prefix = &line[..pos];
        let word_start = prefix.rfind(char::is_whitespace).map_or(0, |i| i + 1);
        let word = &prefix[word_start..];

        if !word.starts_with('/') {
            return Ok((pos, Vec::new()));
        }

        let matches = SLASH_COMMANDS
            .iter()
            .filter(|cmd| cmd.starts_with(word))
            .map(|cmd| Pair { display: (*cmd).to_owned(), replacement: (*cmd).to_owned() })
            .collect();
        Ok((word_start, matches))
    }
}

impl Hinter for ReplHelper {
    type Hint = String;

    fn hint(&self, line: &str, pos: usize, ctx: &rustyline::Context<'_>) -> Option<String> {
        self.hinter.hint(line, pos, ctx)
    }
}

/// Everything the dispatcher needs to run turns and answer slash commands.
pub struct ReplSession<'a> {
    /// LLM provider used for every turn this session runs.
    pub provider: &'a dyn LlmProvider,
    /// Per-request model configuration shared by every turn.
    pub settings: &'a ModelSettings,
    /// Pre-request history processor chain (truncation, summarisation).
    pub processors: &'a [Processor],
    /// Built-in tool registry.
    pub registry: &'a ToolRegistry,
    /// Shared tool execution context.
    pub tool_ctx: &'a ToolContext,
    /// Session resource/approval state.
    pub deps: &'a DepsBundle,
    /// Display and approval-prompt sink.
    pub frontend: &'a dyn Frontend,
    /// Sandbox backend used for `!`-prefixed passthrough commands.
    pub sandbox: &'a dyn SandboxBackend,
    /// Max `BACKOFF` retries the turn machine allows per turn.
    pub model_http_retries: u32,
    /// Configured per-turn LLM round-trip cap (`runtime.max_request_limit`).
    pub max_requests: u32,
    /// Per-tool self-correction budget (`runtime.tool_retries`).
    pub tool_retries: u32,
    /// Upper bound, in seconds, on a single shell passthrough command.
    pub shell_max_timeout: u64,
    /// Display palette for slash-command output.
    pub theme: Theme,
}

/// Run the dispatcher loop until the user exits, then tear down the
/// sandbox on every exit path.
pub async fn run(session: &ReplSession<'_>) {
    let mut editor: Editor<ReplHelper, rustyline::history::DefaultHistory> =
        match Editor::with_config(Config::builder().build()) {
            Ok(editor) => editor,
            Err(e) => {
                session.frontend.on_status(&format!("failed to start line editor: {e}"));
                return;
            },
        };
    editor.set_helper(Some(ReplHelper { hinter: HistoryHinter::new() }));
    let mut history = MessageHistory::new();
    let mut last_interrupt_at: Option<Instant> = None;

    loop {
        let line = match editor.readline("astrid> ") {
            Ok(line) => line,
            Err(ReadlineError::Interrupted) => {
                let now = Instant::now();
                let is_double = last_interrupt_at
                    .is_some_and(|prev| now.duration_since(prev) < DOUBLE_INTERRUPT_WINDOW);
                if is_double {
                    break;
                }
                last_interrupt_at = Some(now);
                session.frontend.on_status("interrupt again within 2s to exit");
                continue;
            },
            Err(ReadlineError::Eof) => break,
            Err(e) => {
                session.frontend.on_status(&format!("input error: {e}"));
                break;
            },
        };
        last_interrupt_at = None;

        let trimmed = line.trim();
        if trimmed.is_empty() {
            continue;
        }
        let _ = editor.add_history_entry(trimmed);

        if trimmed == "exit" || trimmed == "quit" {
            break;
        }

        if let Some(command) = trimmed.strip_prefix('!') {
            run_shell_passthrough(session, command).await;
            continue;
        }

        if let Some(command) = trimmed.strip_prefix('/') {
            if dispatch_slash_command(session, command, &mut history).await {
                break;
            }
            continue;
        }

        history = run_one_turn(session, trimmed, history).await;
    }

    let _ = session.sandbox.cleanup().await;
}

async fn run_shell_passthrough(session: &ReplSession<'_>, command: &str) {
    let timeout = session.shell_max_timeout;
    match session.sandbox.run_command(command, timeout).await {
        Ok(output) => {
            print!("{}", output.stdout_stderr);
            if output.exit_code != 0 {
                session.frontend.on_status(&format!("exited with status {}", output.exit_code));
            }
        },
        Err(e) => session.frontend.on_status(&format!("command failed: {e}")),
    }
}

async fn run_one_turn(
    session: &ReplSession<'_>,
    input: &str,
    history: MessageHistory,
) -> MessageHistory {
    let cancel = Notify::new();
    let ctx = TurnContext {
        provider: session.provider,
        settings: session.settings,
        processors: session.processors,
        registry: session.registry,
        tool_ctx: session.tool_ctx,
        deps: session.deps,
        frontend: session.frontend,
        model_http_retries: session.model_http_retries,
        max_requests: session.max_requests,
        tool_retries: session.tool_retries,
        cancel: &cancel,
    };

    let turn = run_turn(input, &history, &ctx);
    tokio::pin!(turn);

    let result = tokio::select! {
        result = &mut turn => result,
        _ = tokio::signal::ctrl_c() => {
            cancel.notify_one();
            turn.await
        },
    };

    if let Some(error) = &result.error {
        session.frontend.on_status(&format!("turn failed: {error}"));
    }

    let mut next = history;
    next.replace(result.messages);
    next
}

/// Returns `true` if the dispatcher should exit the loop afterward.
async fn dispatch_slash_command(
    session: &ReplSession<'_>,
    command: &str,
    history: &mut MessageHistory,
) -> bool {
    let command = command.trim();
    match command {
        "help" => print_help(session.theme),
        "clear" => {
            history.clear();
            session.frontend.on_status("history cleared");
        },
        "status" => {
            let snapshot = build_status_snapshot(session, history);
            println!("{}", snapshot.render(session.theme));
        },
        "tools" => {
            for definition in session.registry.all_definitions() {
                println!("{}", session.theme.kv(&definition.name, &definition.description));
            }
        },
        "history" => {
            let turns =
                history.messages().iter().filter(|m| matches!(m, Message::UserRequest { .. })).count();
            println!("{}", session.theme.kv("messages", &history.len().to_string()));
            println!("{}", session.theme.kv("turns", &turns.to_string()));
        },
        "compact" => compact_history(session, history).await,
        "yolo" => {
            let enabled = session.deps.toggle_auto_confirm();
            session.frontend.on_status(&format!("auto_confirm is now {enabled}"));
        },
        other => session
            .frontend
            .on_status(&format!("unknown command: /{other} (try /help)")),
    }
    false
}

async fn compact_history(session: &ReplSession<'_>, history: &mut MessageHistory) {
    if history.is_empty() {
        session.frontend.on_status("nothing to compact");
        return;
    }
    let summary = match session
        .provider
        .run_stream_events(
            Some("Summarize this conversation so far, concisely."),
            history,
            session.settings,
            None,
        )
        .await
    {
        Ok(mut events) => {
            use astrid_llm::types::{RunOutput, StreamingEvent};
            use futures::StreamExt as _;
            let mut text = String::new();
            while let Some(event) = events.next().await {
                match event {
                    Ok(StreamingEvent::AgentRunResult(result)) => {
                        if let RunOutput::Text(final_text) = result.output {
                            text = final_text;
                        }
                        break;
                    },
                    Ok(_) => {},
                    Err(e) => {
                        session.frontend.on_status(&format!("compaction failed: {e}"));
                        return;
                    },
                }
            }
            text
        },
        Err(e) => {
            session.frontend.on_status(&format!("compaction failed: {e}"));
            return;
        },
    };

    history.replace(vec![
        Message::user_text(format!("[Compacted conversation summary]\n{summary}")),
        Message::assistant_text("Understood."),
    ]);
    session.frontend.on_status("history compacted");
}

fn print_help(theme: Theme) {
    println!("{}", theme.header("Slash commands"));
    for (name, desc) in [
        ("/help", "show this message"),
        ("/clear", "clear the conversation history"),
        ("/status", "show a runtime health snapshot"),
        ("/tools", "list registered tools"),
        ("/history", "show message and turn counts"),
        ("/compact", "replace history with a summarized stand-in"),
        ("/yolo", "toggle auto-approval of tool calls"),
    ] {
        println!("{}", theme.kv(name, desc));
    }
    println!("exit | quit  leave the REPL");
    println!("!<command>    run a shell command directly");
}

fn build_status_snapshot(session: &ReplSession<'_>, history: &MessageHistory) -> StatusSnapshot {
    StatusSnapshot {
        provider_name: session.provider.name().to_owned(),
        model: session.provider.model().to_owned(),
        isolation: session.sandbox.isolation_level(),
        tool_count: session.registry.all_definitions().len(),
        history_messages: history.len(),
        auto_confirm: session.deps.auto_confirm(),
    }
}
