//! Approval cycle (C8): resolves one batch of deferred tool requests into
//! executed results or structured denials, per the contract in §4.8.

use std::collections::HashMap;

use astrid_core::{DeferredToolRequest, DepsBundle, Frontend, IsolationLevel};
use astrid_llm::DeferredToolResults;
use astrid_tools::{ToolContext, ToolErrorCategory, ToolRegistry, is_safe};
use serde_json::Value;

use crate::error::{RuntimeError, RuntimeResult};

/// Reason recorded for a user-denied tool call.
const DENIED_REASON: &str = "User denied this action";

/// Per-turn count of `Transient`/`Misuse` failures for each tool name, used
/// to cap how many times the model is invited to retry the same tool
/// before the runtime instead reports a non-retryable terminal error.
pub type ToolRetryCounts = HashMap<String, u32>;

/// Resolve every deferred request in `requests`, executing approved calls
/// and denying the rest, in input order.
///
/// `"a"` from `frontend.prompt_approval` flips `deps.auto_confirm()` for the
/// remainder of the session, including later requests in this same batch.
///
/// `retry_counts` accumulates `Transient`/`Misuse` failures per tool name
/// across the whole turn (every approval hop shares the same map); once a
/// tool's count exceeds `tool_retries`, further failures of that tool are
/// reported as `Terminal` instead, so the model stops being invited to
/// retry a call that keeps failing the same way.
///
/// # Errors
///
/// Returns `RuntimeError::InternalInvariant` if a request names a tool not
/// present in `registry` — the dispatcher only defers calls it sourced from
/// the registry's own definitions, so this indicates a structural bug.
pub async fn resolve_deferred(
    requests: &[DeferredToolRequest],
    registry: &ToolRegistry,
    tool_ctx: &ToolContext,
    deps: &DepsBundle,
    frontend: &dyn Frontend,
    retry_counts: &mut ToolRetryCounts,
    tool_retries: u32,
) -> RuntimeResult<DeferredToolResults> {
    let mut results = Vec::with_capacity(requests.len());

    for request in requests {
        let args = parse_args(&request.args_json);

        let approved = if deps.auto_confirm() {
            true
        } else if is_shell_auto_approved(request, tool_ctx, &args) {
            true
        } else {
            let description = describe(&request.tool_name, &args);
            match frontend.prompt_approval(&description).as_str() {
                "a" => {
                    deps.set_auto_confirm(true);
                    true
                },
                "y" => true,
                _ => false,
            }
        };

        if !approved {
            results.push((request.call_id.clone(), Err(DENIED_REASON.to_owned())));
            continue;
        }

        let Some(tool) = registry.get(&request.tool_name) else {
            return Err(RuntimeError::InternalInvariant(format!(
                "deferred request names unregistered tool {:?}",
                request.tool_name
            )));
        };

        let content = match tool.execute(args, tool_ctx).await {
            Ok(text) => Value::String(text),
            Err(error) => {
                tool_error_to_content(&error, &request.tool_name, retry_counts, tool_retries)
            },
        };
        results.push((request.call_id.clone(), Ok(content)));
    }

    Ok(DeferredToolResults { results })
}

/// §9 open question: the safe-command bypass is keyed on the literal tool
/// name `"shell"` — no other tool, built-in or otherwise, is eligible.
fn is_shell_auto_approved(
    request: &DeferredToolRequest,
    tool_ctx: &ToolContext,
    args: &Value,
) -> bool {
    if request.tool_name != "shell" {
        return false;
    }
    if tool_ctx.sandbox.isolation_level() != IsolationLevel::Full {
        return false;
    }
    args.get("command")
        .and_then(Value::as_str)
        .is_some_and(is_safe)
}

/// Parse a deferred request's `args_json`. Providers may encode arguments
/// once (a JSON object as a string) or, in practice, twice (a JSON-encoded
/// string whose content is itself a JSON object) — handle both, falling
/// back to an empty object if neither parses.
fn parse_args(args_json: &str) -> Value {
    match serde_json::from_str::<Value>(args_json) {
        Ok(Value::String(inner)) => {
            serde_json::from_str(&inner).unwrap_or(Value::Object(serde_json::Map::new()))
        },
        Ok(value) => value,
        Err(_) => Value::Object(serde_json::Map::new()),
    }
}

/// `tool_name(k=v, …)`, sorted by key for determinism.
fn describe(tool_name: &str, args: &Value) -> String {
    let Value::Object(map) = args else {
        return format!("{tool_name}()");
    };
    let mut pairs: Vec<(&String, &Value)> = map.iter().collect();
    pairs.sort_by_key(|(k, _)| (*k).clone());
    let rendered = pairs
        .into_iter()
        .map(|(k, v)| format!("{k}={}", render_value(v)))
        .collect::<Vec<_>>()
        .join(", ");
    format!("{tool_name}({rendered})")
}

fn render_value(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// Build the structured error object returned to the model for a failed
/// tool call, escalating `Transient`/`Misuse` to `Terminal` once the tool's
/// retry budget for this turn is exhausted.
fn tool_error_to_content(
    error: &astrid_tools::ToolError,
    tool_name: &str,
    retry_counts: &mut ToolRetryCounts,
    tool_retries: u32,
) -> Value {
    let category = match error.category() {
        ToolErrorCategory::Transient | ToolErrorCategory::Misuse => {
            let count = retry_counts.entry(tool_name.to_owned()).or_insert(0);
            *count += 1;
            if *count > tool_retries {
                ToolErrorCategory::Terminal
            } else {
                error.category()
            }
        },
        terminal => terminal,
    };
    serde_json::json!({
        "error": error.to_string(),
        "category": format!("{category:?}"),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use astrid_core::SandboxLimits;
    use astrid_sandbox::{CommandOutput, SandboxBackend, SandboxResult};
    use std::sync::{Arc, Mutex};

    struct ScriptedSandbox {
        level: IsolationLevel,
    }

    #[async_trait::async_trait]
    impl SandboxBackend for ScriptedSandbox {
        async fn run_command(&self, cmd: &str, _timeout_s: u64) -> SandboxResult<CommandOutput> {
            Ok(CommandOutput {
                exit_code: 0,
                stdout_stderr: format!("ran: {cmd}"),
                duration_ms: 1,
            })
        }

        fn isolation_level(&self) -> IsolationLevel {
            self.level
        }

        async fn cleanup(&self) -> SandboxResult<()> {
            Ok(())
        }
    }

    fn ctx_with_isolation(level: IsolationLevel) -> ToolContext {
        ToolContext::new(
            std::env::temp_dir(),
            Arc::new(ScriptedSandbox { level }),
        )
    }

    fn deferred(call_id: &str, tool_name: &str, args_json: &str) -> DeferredToolRequest {
        DeferredToolRequest {
            call_id: call_id.to_owned(),
            tool_name: tool_name.to_owned(),
            args_json: args_json.to_owned(),
            approval_required: true,
        }
    }

    struct ScriptedFrontend {
        answers: Mutex<Vec<String>>,
        prompts: Mutex<Vec<String>>,
    }

    impl ScriptedFrontend {
        fn new(answers: &[&str]) -> Self {
            Self {
                answers: Mutex::new(answers.iter().rev().map(|s| (*s).to_owned()).collect()),
                prompts: Mutex::new(Vec::new()),
            }
        }
    }

    #[async_trait::async_trait]
    impl Frontend for ScriptedFrontend {
        fn on_text_delta(&self, _accumulated_text: &str) {}
        fn on_text_commit(&self, _final_text: &str) {}
        fn on_tool_call(&self, _tool_name: &str, _args_display: &str) {}
        fn on_tool_result(&self, _title: &str, _content: &astrid_core::ToolResultContent) {}
        fn on_status(&self, _message: &str) {}
        fn on_final_output(&self, _text: &str) {}

        async fn prompt_approval(&self, description: &str) -> String {
            self.prompts.lock().unwrap().push(description.to_owned());
            self.answers.lock().unwrap().pop().unwrap_or_else(|| "n".into())
        }
    }

    #[tokio::test]
    async fn auto_confirm_bypasses_prompting_entirely() {
        let registry = ToolRegistry::with_defaults();
        let ctx = ctx_with_isolation(IsolationLevel::None);
        let deps = DepsBundle::new(SandboxLimits::default());
        deps.set_auto_confirm(true);
        let frontend = ScriptedFrontend::new(&[]);

        let requests = vec![deferred("1", "shell", r#"{"command":"rm -rf /"}"#)];
        let outcome = resolve_deferred(&requests, &registry, &ctx, &deps, &frontend, &mut ToolRetryCounts::new(), 3)
            .await
            .unwrap();

        assert!(outcome.results[0].1.is_ok());
        assert!(frontend.prompts.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn safe_command_under_full_isolation_auto_approves() {
        let registry = ToolRegistry::with_defaults();
        let ctx = ctx_with_isolation(IsolationLevel::Full);
        let deps = DepsBundle::new(SandboxLimits::default());
        let frontend = ScriptedFrontend::new(&[]);

        let requests = vec![deferred("1", "shell", r#"{"command":"ls -la"}"#)];
        let outcome = resolve_deferred(&requests, &registry, &ctx, &deps, &frontend, &mut ToolRetryCounts::new(), 3)
            .await
            .unwrap();

        assert!(outcome.results[0].1.is_ok());
        assert!(frontend.prompts.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn unsafe_command_under_full_isolation_still_prompts() {
        let registry = ToolRegistry::with_defaults();
        let ctx = ctx_with_isolation(IsolationLevel::Full);
        let deps = DepsBundle::new(SandboxLimits::default());
        let frontend = ScriptedFrontend::new(&["y"]);

        let requests = vec![deferred("1", "shell", r#"{"command":"rm -rf /"}"#)];
        let outcome = resolve_deferred(&requests, &registry, &ctx, &deps, &frontend, &mut ToolRetryCounts::new(), 3)
            .await
            .unwrap();

        assert!(outcome.results[0].1.is_ok());
        assert_eq!(frontend.prompts.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn safe_command_bypass_never_applies_to_non_shell_tools() {
        let registry = ToolRegistry::with_defaults();
        let ctx = ctx_with_isolation(IsolationLevel::Full);
        let deps = DepsBundle::new(SandboxLimits::default());
        let frontend = ScriptedFrontend::new(&["y"]);

        let requests = vec![deferred(
            "1",
            "read_file",
            r#"{"path":"/etc/passwd"}"#,
        )];
        let _ = resolve_deferred(&requests, &registry, &ctx, &deps, &frontend, &mut ToolRetryCounts::new(), 3)
            .await
            .unwrap();

        assert_eq!(frontend.prompts.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn denial_records_reason_without_executing() {
        let registry = ToolRegistry::with_defaults();
        let ctx = ctx_with_isolation(IsolationLevel::None);
        let deps = DepsBundle::new(SandboxLimits::default());
        let frontend = ScriptedFrontend::new(&["n"]);

        let requests = vec![deferred("1", "shell", r#"{"command":"echo hi"}"#)];
        let outcome = resolve_deferred(&requests, &registry, &ctx, &deps, &frontend, &mut ToolRetryCounts::new(), 3)
            .await
            .unwrap();

        assert_eq!(outcome.results[0].1, Err(DENIED_REASON.to_owned()));
    }

    #[tokio::test]
    async fn approve_all_flips_auto_confirm_for_rest_of_batch() {
        let registry = ToolRegistry::with_defaults();
        let ctx = ctx_with_isolation(IsolationLevel::None);
        let deps = DepsBundle::new(SandboxLimits::default());
        let frontend = ScriptedFrontend::new(&["a"]);

        let requests = vec![
            deferred("1", "shell", r#"{"command":"echo one"}"#),
            deferred("2", "shell", r#"{"command":"echo two"}"#),
        ];
        let outcome = resolve_deferred(&requests, &registry, &ctx, &deps, &frontend, &mut ToolRetryCounts::new(), 3)
            .await
            .unwrap();

        assert!(outcome.results[0].1.is_ok());
        assert!(outcome.results[1].1.is_ok());
        assert_eq!(frontend.prompts.lock().unwrap().len(), 1);
        assert!(deps.auto_confirm());
    }

    #[tokio::test]
    async fn unregistered_tool_is_internal_invariant_error() {
        let registry = ToolRegistry::new();
        let ctx = ctx_with_isolation(IsolationLevel::None);
        let deps = DepsBundle::new(SandboxLimits::default());
        deps.set_auto_confirm(true);
        let frontend = ScriptedFrontend::new(&[]);

        let requests = vec![deferred("1", "ghost", "{}")];
        let result = resolve_deferred(&requests, &registry, &ctx, &deps, &frontend, &mut ToolRetryCounts::new(), 3).await;
        assert!(matches!(result, Err(RuntimeError::InternalInvariant(_))));
    }

    #[tokio::test]
    async fn double_encoded_args_json_are_unwrapped() {
        let registry = ToolRegistry::with_defaults();
        let ctx = ctx_with_isolation(IsolationLevel::None);
        let deps = DepsBundle::new(SandboxLimits::default());
        deps.set_auto_confirm(true);
        let frontend = ScriptedFrontend::new(&[]);

        let double_encoded = serde_json::to_string(&r#"{"command":"echo hi"}"#).unwrap();
        let requests = vec![deferred("1", "shell", &double_encoded)];
        let outcome = resolve_deferred(&requests, &registry, &ctx, &deps, &frontend, &mut ToolRetryCounts::new(), 3)
            .await
            .unwrap();

        let Ok(Value::String(text)) = &outcome.results[0].1 else {
            panic!("expected a successful shell result");
        };
        assert!(text.contains("echo hi"));
    }

    #[test]
    fn describe_renders_sorted_key_value_pairs() {
        let args = serde_json::json!({"b": 2, "a": "x"});
        assert_eq!(describe("tool", &args), "tool(a=x, b=2)");
    }

    #[test]
    fn describe_handles_non_object_args() {
        assert_eq!(describe("tool", &Value::Null), "tool()");
    }

    #[test]
    fn transient_failures_escalate_to_terminal_once_retries_are_exhausted() {
        let mut counts = ToolRetryCounts::new();
        let error = astrid_tools::ToolError::Timeout(5);

        let first = tool_error_to_content(&error, "shell", &mut counts, 2);
        assert_eq!(first["category"], "Transient");
        let second = tool_error_to_content(&error, "shell", &mut counts, 2);
        assert_eq!(second["category"], "Transient");
        let third = tool_error_to_content(&error, "shell", &mut counts, 2);
        assert_eq!(third["category"], "Terminal");
    }

    #[test]
    fn retry_counts_are_tracked_independently_per_tool() {
        let mut counts = ToolRetryCounts::new();
        let error = astrid_tools::ToolError::InvalidArguments("bad path".into());

        let first = tool_error_to_content(&error, "read_file", &mut counts, 1);
        assert_eq!(first["category"], "Misuse");
        let escalated = tool_error_to_content(&error, "read_file", &mut counts, 1);
        assert_eq!(escalated["category"], "Terminal");

        let other_tool = tool_error_to_content(&error, "write_file", &mut counts, 1);
        assert_eq!(other_tool["category"], "Misuse");
    }
}
