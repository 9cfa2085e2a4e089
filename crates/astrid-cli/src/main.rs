//! Astrid CLI: an interactive terminal agent built on the Astrid runtime.

#![deny(unsafe_code)]
#![warn(missing_docs)]
#![deny(clippy::all)]
#![warn(unreachable_pub)]
#![deny(clippy::unwrap_used)]

mod frontend;
mod repl;
mod status;
mod theme;

use std::path::PathBuf;
use std::sync::Arc;

use astrid_core::{DepsBundle, SandboxLimits};
use astrid_llm::{ClaudeProvider, LlmProvider, ModelSettings};
use astrid_runtime::history::{Processor, SlidingWindowSummariser, ToolOutputTruncator};
use astrid_sandbox::{build_backend, SandboxBackend};
use astrid_telemetry::{LogConfig, LogFormat};
use astrid_tools::{ToolContext, ToolRegistry};
use clap::{Parser, Subcommand};

use crate::frontend::TerminalFrontend;
use crate::repl::ReplSession;
use crate::status::StatusSnapshot;
use crate::theme::Theme;

/// Astrid: an interactive terminal agent.
#[derive(Parser)]
#[command(name = "astrid")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Stream the model's thinking, in addition to its final text.
    #[arg(long, global = true)]
    verbose: bool,

    /// Display palette: dark (default), light, or plain.
    #[arg(long, global = true, default_value = "dark")]
    theme: Theme,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the interactive REPL (the default when no subcommand is given).
    Chat,
    /// Print a runtime health snapshot and exit.
    Status,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let workspace_root = std::env::current_dir().unwrap_or_else(|_| PathBuf::from("."));
    let config = astrid_config::Config::load(Some(&workspace_root)).unwrap_or_else(|e| {
        eprintln!("warning: failed to load config, using defaults: {e}");
        astrid_config::Config::default()
    });

    let log_config = LogConfig::new(if cli.verbose { "debug" } else { "info" })
        .with_format(LogFormat::Compact);
    if let Err(e) = astrid_telemetry::setup_logging(&log_config) {
        eprintln!("warning: failed to initialize logging: {e}");
    }

    let Some(api_key) = config.model.api_key.clone() else {
        eprintln!(
            "error: no API key configured. Set ANTHROPIC_API_KEY or `model.api_key` in .astrid/config.toml"
        );
        std::process::exit(1);
    };

    let mut provider = ClaudeProvider::new(api_key, config.model.model.clone());
    if let Some(api_url) = &config.model.api_url {
        provider = provider.with_api_url(api_url.clone());
    }
    let provider: Arc<dyn LlmProvider> = Arc::new(provider);

    let limits = SandboxLimits {
        net_mode: config.sandbox.sandbox_network.clone(),
        shell_max_timeout_secs: config.sandbox.shell_max_timeout,
        ..SandboxLimits::default()
    };
    let sandbox = match build_backend(
        config.sandbox.sandbox_backend,
        config.sandbox.sandbox_fallback,
        limits.clone(),
        workspace_root.display().to_string(),
    )
    .await
    {
        Ok(sandbox) => sandbox,
        Err(e) => {
            eprintln!("error: failed to start sandbox: {e}");
            std::process::exit(1);
        },
    };
    let sandbox: Arc<dyn SandboxBackend> = Arc::from(sandbox);

    let registry = ToolRegistry::with_defaults();
    let tool_ctx = ToolContext::new(workspace_root.clone(), Arc::clone(&sandbox));

    let settings = ModelSettings {
        model: config.model.model.clone(),
        max_tokens: config.model.max_tokens,
        temperature: config.model.temperature,
        system_prompt: "You are Astrid, an interactive terminal coding assistant.".to_owned(),
        tools: registry.all_definitions(),
    };

    let processors: Vec<Processor> = vec![
        Processor::Sync(Box::new(ToolOutputTruncator::new(config.runtime.tool_output_trim_chars))),
        Processor::Async(Box::new(SlidingWindowSummariser::new(
            Arc::clone(&provider),
            config.model.summarization_model_or_default().to_owned(),
            config.runtime.max_history_messages,
        ))),
    ];

    let deps = DepsBundle::new(limits);
    deps.set_auto_confirm(config.approval.auto_confirm);

    let frontend = TerminalFrontend::new(cli.theme, cli.verbose);

    let session = ReplSession {
        provider: provider.as_ref(),
        settings: &settings,
        processors: &processors,
        registry: &registry,
        tool_ctx: &tool_ctx,
        deps: &deps,
        frontend: &frontend,
        sandbox: sandbox.as_ref(),
        model_http_retries: config.runtime.model_http_retries,
        max_requests: config.runtime.max_request_limit,
        tool_retries: config.runtime.tool_retries,
        shell_max_timeout: config.sandbox.shell_max_timeout,
        theme: cli.theme,
    };

    match cli.command.unwrap_or(Commands::Chat) {
        Commands::Chat => repl::run(&session).await,
        Commands::Status => {
            let snapshot = StatusSnapshot {
                provider_name: provider.name().to_owned(),
                model: provider.model().to_owned(),
                isolation: sandbox.isolation_level(),
                tool_count: registry.all_definitions().len(),
                history_messages: 0,
                auto_confirm: deps.auto_confirm(),
            };
            println!("{}", snapshot.render(cli.theme));
        },
    }

    Ok(())
}
