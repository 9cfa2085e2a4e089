#![deny(unsafe_code)]
#![warn(missing_docs)]
#![deny(clippy::all)]
#![warn(unreachable_pub)]
#![deny(clippy::unwrap_used)]
#![cfg_attr(test, allow(clippy::unwrap_used))]
//! Built-in tools for the Astrid agent runtime.
//!
//! Provides direct Rust function calls (not MCP) for the hot-path coding
//! operations: read, write, edit, search, and shell execution.

mod edit_file;
mod glob;
mod read_file;
mod safe_command;
mod shell;
mod truncate;
mod write_file;

pub use edit_file::EditFileTool;
pub use glob::GlobTool;
pub use read_file::ReadFileTool;
pub use safe_command::is_safe;
pub use shell::ShellTool;
pub use truncate::truncate_at_char_boundary;
pub use write_file::WriteFileTool;

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;

use astrid_llm::LlmToolDefinition;
use serde_json::Value;
use tokio::sync::RwLock;

/// A built-in tool that executes directly in-process.
#[async_trait::async_trait]
pub trait BuiltinTool: Send + Sync {
    /// Tool name (no colons — distinguishes from MCP `"server:tool"` names).
    fn name(&self) -> &'static str;

    /// Human-readable description shown to the model.
    fn description(&self) -> &'static str;

    /// JSON schema for tool input parameters.
    fn input_schema(&self) -> Value;

    /// Whether the runtime must surface calls to this tool as deferred,
    /// approval-gated requests (§6 tool contract).
    fn requires_approval(&self) -> bool {
        false
    }

    /// Execute the tool with the given arguments.
    async fn execute(&self, args: Value, ctx: &ToolContext) -> ToolResult;
}

/// Shared context available to all built-in tools.
pub struct ToolContext {
    /// Workspace root directory.
    pub workspace_root: PathBuf,
    /// Current working directory, persisted across shell invocations.
    pub cwd: Arc<RwLock<PathBuf>>,
    /// Shell sandbox backend.
    pub sandbox: Arc<dyn astrid_sandbox::SandboxBackend>,
}

impl ToolContext {
    /// Create a new tool context rooted at `workspace_root`.
    #[must_use]
    pub fn new(workspace_root: PathBuf, sandbox: Arc<dyn astrid_sandbox::SandboxBackend>) -> Self {
        let cwd = Arc::new(RwLock::new(workspace_root.clone()));
        Self {
            workspace_root,
            cwd,
            sandbox,
        }
    }
}

/// Tool execution errors.
#[derive(Debug, thiserror::Error)]
pub enum ToolError {
    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    /// Invalid arguments.
    #[error("invalid arguments: {0}")]
    InvalidArguments(String),
    /// Execution failed for a reason not covered by a more specific variant.
    #[error("execution failed: {0}")]
    ExecutionFailed(String),
    /// Path not found.
    #[error("path not found: {0}")]
    PathNotFound(String),
    /// Command timed out.
    #[error("timed out after {0}s")]
    Timeout(u64),
}

/// How a tool's failure should be surfaced back to the model (§6, §7).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ToolErrorCategory {
    /// Return a structured error object; the model should not retry this
    /// exact call.
    Terminal,
    /// Request the model retry — infrastructure hiccup, no parameter change
    /// implied.
    Transient,
    /// Request the model retry with a parameter-shape hint.
    Misuse,
}

impl ToolError {
    /// Classify this error for the model-retry accounting in §7.
    #[must_use]
    pub fn category(&self) -> ToolErrorCategory {
        match self {
            Self::InvalidArguments(_) => ToolErrorCategory::Misuse,
            Self::Io(_) | Self::Timeout(_) => ToolErrorCategory::Transient,
            Self::ExecutionFailed(_) | Self::PathNotFound(_) => ToolErrorCategory::Terminal,
        }
    }
}

/// Result type for tool execution.
pub type ToolResult = Result<String, ToolError>;

/// Registry of built-in tools for lookup and LLM definition export.
pub struct ToolRegistry {
    tools: HashMap<String, Box<dyn BuiltinTool>>,
}

impl ToolRegistry {
    /// Create an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self {
            tools: HashMap::new(),
        }
    }

    /// Create a registry with all default tools registered.
    #[must_use]
    pub fn with_defaults() -> Self {
        let mut registry = Self::new();
        registry.register(Box::new(ReadFileTool));
        registry.register(Box::new(WriteFileTool));
        registry.register(Box::new(EditFileTool));
        registry.register(Box::new(GlobTool));
        registry.register(Box::new(ShellTool));
        registry
    }

    /// Register a tool.
    pub fn register(&mut self, tool: Box<dyn BuiltinTool>) {
        self.tools.insert(tool.name().to_owned(), tool);
    }

    /// Get a tool by name.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&dyn BuiltinTool> {
        self.tools.get(name).map(AsRef::as_ref)
    }

    /// Check if a name refers to a built-in tool (no colon = built-in).
    #[must_use]
    pub fn is_builtin(name: &str) -> bool {
        !name.contains(':')
    }

    /// Export all tool definitions for the LLM.
    #[must_use]
    pub fn all_definitions(&self) -> Vec<LlmToolDefinition> {
        self.tools
            .values()
            .map(|t| LlmToolDefinition {
                name: t.name().to_owned(),
                description: t.description().to_owned(),
                input_schema: t.input_schema(),
                requires_approval: t.requires_approval(),
            })
            .collect()
    }
}

impl Default for ToolRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
pub(crate) mod tests_support {
    use super::ToolContext;
    use astrid_core::IsolationLevel;
    use astrid_sandbox::{CommandOutput, SandboxBackend, SandboxResult};
    use std::sync::Arc;

    struct NullSandbox;

    #[async_trait::async_trait]
    impl SandboxBackend for NullSandbox {
        async fn run_command(&self, _cmd: &str, _timeout_s: u64) -> SandboxResult<CommandOutput> {
            Ok(CommandOutput {
                exit_code: 0,
                stdout_stderr: String::new(),
                duration_ms: 0,
            })
        }

        fn isolation_level(&self) -> IsolationLevel {
            IsolationLevel::None
        }

        async fn cleanup(&self) -> SandboxResult<()> {
            Ok(())
        }
    }

    /// A `ToolContext` rooted at the system temp dir, backed by a no-op
    /// sandbox. Tools other than `ShellTool` never touch the sandbox, so
    /// this is sufficient for their fixtures.
    pub(crate) fn test_ctx() -> ToolContext {
        ToolContext::new(std::env::temp_dir(), Arc::new(NullSandbox))
    }

    /// Same as `test_ctx` but rooted at a caller-supplied directory.
    pub(crate) fn test_ctx_at(root: &std::path::Path) -> ToolContext {
        ToolContext::new(root.to_path_buf(), Arc::new(NullSandbox))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn is_builtin_distinguishes_mcp_names() {
        assert!(ToolRegistry::is_builtin("read_file"));
        assert!(ToolRegistry::is_builtin("shell"));
        assert!(!ToolRegistry::is_builtin("filesystem:read_file"));
    }

    #[test]
    fn registry_with_defaults_has_expected_tools() {
        let registry = ToolRegistry::with_defaults();
        assert!(registry.get("read_file").is_some());
        assert!(registry.get("write_file").is_some());
        assert!(registry.get("edit_file").is_some());
        assert!(registry.get("glob").is_some());
        assert!(registry.get("shell").is_some());
        assert!(registry.get("nonexistent").is_none());
    }

    #[test]
    fn all_definitions_flags_shell_as_approval_required() {
        let registry = ToolRegistry::with_defaults();
        let defs = registry.all_definitions();
        assert_eq!(defs.len(), 5);
        let shell = defs.iter().find(|d| d.name == "shell").unwrap();
        assert!(shell.requires_approval);
        let read = defs.iter().find(|d| d.name == "read_file").unwrap();
        assert!(!read.requires_approval);
    }
}
