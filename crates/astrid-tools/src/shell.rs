//! Shell tool — runs a command through the active sandbox backend, with a
//! persistent working directory (§4.2, §4.3).
//!
//! Unlike the teacher's `bash.rs`, this never spawns a process directly: the
//! sandbox backend owns process lifetime, isolation, and resource limits.
//! Cwd persistence is the tool's job, not the backend's — `run_command`
//! takes no `cwd` parameter, so each call is prefixed with `cd <cwd> &&`.

use crate::{BuiltinTool, ToolContext, ToolError, ToolResult};
use serde_json::Value;
use std::path::PathBuf;

/// Default timeout in seconds.
const DEFAULT_TIMEOUT_S: u64 = 120;
/// Maximum timeout in seconds, matching the default `shell_max_timeout` (§6).
const MAX_TIMEOUT_S: u64 = 600;
/// Sentinel used to extract the post-command working directory.
const CWD_SENTINEL: &str = "__ASTRID_CWD__";

/// Built-in tool for executing shell commands via the sandbox backend.
pub struct ShellTool;

#[async_trait::async_trait]
impl BuiltinTool for ShellTool {
    fn name(&self) -> &'static str {
        "shell"
    }

    fn description(&self) -> &'static str {
        "Executes a shell command inside the sandbox. The working directory persists between \
         invocations. Use for git, npm, cargo, and other terminal operations. Optional timeout \
         in seconds (max 600)."
    }

    fn input_schema(&self) -> Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "command": {
                    "type": "string",
                    "description": "The shell command to execute"
                },
                "timeout": {
                    "type": "integer",
                    "description": "Timeout in seconds (default: 120, max: 600)"
                }
            },
            "required": ["command"]
        })
    }

    fn requires_approval(&self) -> bool {
        true
    }

    async fn execute(&self, args: Value, ctx: &ToolContext) -> ToolResult {
        let command = args
            .get("command")
            .and_then(Value::as_str)
            .ok_or_else(|| ToolError::InvalidArguments("command is required".into()))?;

        let timeout_s = args
            .get("timeout")
            .and_then(Value::as_u64)
            .unwrap_or(DEFAULT_TIMEOUT_S)
            .min(MAX_TIMEOUT_S);

        let cwd = ctx.cwd.read().await.clone();

        let wrapped = format!(
            "cd {} && {command}\n__ASTRID_EXIT__=$?\necho \"{CWD_SENTINEL}\"\npwd\nexit $__ASTRID_EXIT__",
            shell_quote(&cwd.display().to_string()),
        );

        let output = ctx
            .sandbox
            .run_command(&wrapped, timeout_s)
            .await
            .map_err(|e| match e {
                astrid_sandbox::SandboxError::CommandTimeout(secs) => ToolError::Timeout(secs),
                other => ToolError::ExecutionFailed(other.to_string()),
            })?;

        let (text, new_cwd) = parse_sentinel_output(&output.stdout_stderr);

        if let Some(new_cwd) = new_cwd {
            *ctx.cwd.write().await = new_cwd;
        }

        let mut result_text = text;
        if output.exit_code != 0 {
            if !result_text.is_empty() {
                result_text.push('\n');
            }
            result_text.push_str("(exit code: ");
            result_text.push_str(&output.exit_code.to_string());
            result_text.push(')');
        }

        if result_text.is_empty() {
            result_text.push_str("(no output)");
        }

        Ok(result_text)
    }
}

/// Single-quote a string for safe embedding in `sh -c '...'`.
fn shell_quote(s: &str) -> String {
    format!("'{}'", s.replace('\'', r"'\''"))
}

/// Parse the sentinel out of combined stdout/stderr to recover command
/// output and the post-command working directory.
fn parse_sentinel_output(combined: &str) -> (String, Option<PathBuf>) {
    if let Some(sentinel_pos) = combined.find(CWD_SENTINEL) {
        let output = combined[..sentinel_pos].trim_end().to_string();
        let after_sentinel = combined
            .get(sentinel_pos.saturating_add(CWD_SENTINEL.len())..)
            .unwrap_or_default();
        let new_cwd = after_sentinel
            .lines()
            .find(|l| !l.is_empty())
            .map(|l| PathBuf::from(l.trim()));
        (output, new_cwd)
    } else {
        (combined.to_string(), None)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use astrid_core::IsolationLevel;
    use astrid_sandbox::{CommandOutput, SandboxBackend, SandboxResult};
    use std::sync::{Arc, Mutex};

    /// A fake backend that records the wrapped command it was asked to run
    /// and returns a scripted response, so tests exercise the tool's
    /// wrapping/parsing logic without a real shell.
    struct FakeBackend {
        last_cmd: Mutex<Option<String>>,
        response: CommandOutput,
    }

    #[async_trait::async_trait]
    impl SandboxBackend for FakeBackend {
        async fn run_command(&self, cmd: &str, _timeout_s: u64) -> SandboxResult<CommandOutput> {
            *self.last_cmd.lock().unwrap() = Some(cmd.to_string());
            Ok(self.response.clone())
        }

        fn isolation_level(&self) -> IsolationLevel {
            IsolationLevel::None
        }

        async fn cleanup(&self) -> SandboxResult<()> {
            Ok(())
        }
    }

    fn ctx_with_response(response: CommandOutput) -> (ToolContext, Arc<FakeBackend>) {
        let backend = Arc::new(FakeBackend {
            last_cmd: Mutex::new(None),
            response,
        });
        let ctx = ToolContext::new(std::env::temp_dir(), backend.clone());
        (ctx, backend)
    }

    #[tokio::test]
    async fn wraps_command_with_cwd_prefix_and_sentinel() {
        let (ctx, backend) = ctx_with_response(CommandOutput {
            exit_code: 0,
            stdout_stderr: format!("hello\n{CWD_SENTINEL}\n/tmp\n"),
            duration_ms: 5,
        });

        let result = ShellTool
            .execute(serde_json::json!({"command": "echo hello"}), &ctx)
            .await
            .unwrap();

        assert_eq!(result, "hello");
        let sent = backend.last_cmd.lock().unwrap().clone().unwrap();
        assert!(sent.starts_with("cd '"));
        assert!(sent.contains("echo hello"));
        assert!(sent.contains(CWD_SENTINEL));
    }

    #[tokio::test]
    async fn updates_persisted_cwd_from_sentinel() {
        let (ctx, _backend) = ctx_with_response(CommandOutput {
            exit_code: 0,
            stdout_stderr: format!("{CWD_SENTINEL}\n/workspace/subdir\n"),
            duration_ms: 1,
        });

        ShellTool
            .execute(serde_json::json!({"command": "cd subdir"}), &ctx)
            .await
            .unwrap();

        assert_eq!(*ctx.cwd.read().await, PathBuf::from("/workspace/subdir"));
    }

    #[tokio::test]
    async fn nonzero_exit_code_is_appended_to_output() {
        let (ctx, _backend) = ctx_with_response(CommandOutput {
            exit_code: 42,
            stdout_stderr: format!("{CWD_SENTINEL}\n/tmp\n"),
            duration_ms: 1,
        });

        let result = ShellTool
            .execute(serde_json::json!({"command": "exit 42"}), &ctx)
            .await
            .unwrap();

        assert!(result.contains("exit code: 42"));
    }

    #[tokio::test]
    async fn missing_command_arg_is_rejected() {
        let (ctx, _backend) = ctx_with_response(CommandOutput {
            exit_code: 0,
            stdout_stderr: String::new(),
            duration_ms: 0,
        });

        let result = ShellTool.execute(serde_json::json!({}), &ctx).await;
        assert!(matches!(
            result.unwrap_err(),
            ToolError::InvalidArguments(_)
        ));
    }

    #[tokio::test]
    async fn timeout_is_capped_and_mapped_to_tool_error() {
        struct TimeoutBackend;

        #[async_trait::async_trait]
        impl SandboxBackend for TimeoutBackend {
            async fn run_command(
                &self,
                _cmd: &str,
                timeout_s: u64,
            ) -> SandboxResult<CommandOutput> {
                assert_eq!(timeout_s, MAX_TIMEOUT_S);
                Err(astrid_sandbox::SandboxError::CommandTimeout(timeout_s))
            }

            fn isolation_level(&self) -> IsolationLevel {
                IsolationLevel::None
            }

            async fn cleanup(&self) -> SandboxResult<()> {
                Ok(())
            }
        }

        let ctx = ToolContext::new(std::env::temp_dir(), Arc::new(TimeoutBackend));
        let result = ShellTool
            .execute(
                serde_json::json!({"command": "sleep 10", "timeout": 999_999}),
                &ctx,
            )
            .await;

        assert!(matches!(result.unwrap_err(), ToolError::Timeout(MAX_TIMEOUT_S)));
    }

    #[test]
    fn parse_sentinel_output_splits_text_and_cwd() {
        let combined = format!("hello world\n{CWD_SENTINEL}\n/tmp/test\n");
        let (output, cwd) = parse_sentinel_output(&combined);
        assert_eq!(output, "hello world");
        assert_eq!(cwd, Some(PathBuf::from("/tmp/test")));
    }

    #[test]
    fn parse_sentinel_output_without_sentinel_returns_as_is() {
        let (output, cwd) = parse_sentinel_output("hello world\n");
        assert_eq!(output, "hello world\n");
        assert!(cwd.is_none());
    }

    #[test]
    fn shell_quote_escapes_single_quotes() {
        assert_eq!(shell_quote("it's"), r"'it'\''s'");
    }
}
