//! Turn state machine (C9): runs one user turn to completion, owning the
//! REFLECT/BACKOFF/ABORT retry policy and the interrupt-repair path.

use astrid_core::{
    ClassifiedAction, DepsBundle, Frontend, Message, MessageHistory, ProviderFailure, TurnBudget,
    classify_provider_failure, patch_dangling_tool_calls,
};
use astrid_llm::{LlmError, LlmProvider, ModelSettings, RunOutput, Usage};
use astrid_tools::{ToolContext, ToolRegistry};
use tokio::sync::Notify;

use crate::approval::{ToolRetryCounts, resolve_deferred};
use crate::dispatcher::dispatch;
use crate::error::RuntimeError;
use crate::history::{Processor, apply_processors};

/// Outcome of one `run_turn` call.
#[derive(Debug)]
pub struct TurnResult {
    /// The turn's contribution to history: everything that happened this
    /// turn, to be appended to the session's canonical history.
    pub messages: Vec<Message>,
    /// The turn's terminal output, if it completed normally.
    pub output: Option<RunOutput>,
    /// Set when the turn ended in `ABORT`, a budget exhaustion, or an
    /// internal invariant violation.
    pub error: Option<RuntimeError>,
    /// Set when the turn ended via keyboard interrupt or cancellation.
    pub interrupted: bool,
    /// Total usage consumed across every request this turn made.
    pub usage: Usage,
}

impl TurnResult {
    fn success(messages: Vec<Message>, output: RunOutput, usage: Usage) -> Self {
        Self {
            messages,
            output: Some(output),
            error: None,
            interrupted: false,
            usage,
        }
    }

    fn failed(messages: Vec<Message>, error: RuntimeError, usage: Usage) -> Self {
        Self {
            messages,
            output: None,
            error: Some(error),
            interrupted: false,
            usage,
        }
    }

    fn interrupted(messages: Vec<Message>, usage: Usage) -> Self {
        Self {
            messages: patch_dangling_tool_calls(messages),
            output: None,
            error: None,
            interrupted: true,
            usage,
        }
    }
}

/// Everything a turn needs beyond the user's input and the running history:
/// the provider, its settings, the pre-request processor chain, and the
/// tool-execution collaborators the approval cycle drives.
pub struct TurnContext<'a> {
    /// LLM provider used for every request this turn makes.
    pub provider: &'a dyn LlmProvider,
    /// Per-request model configuration (model id, tools, system prompt).
    pub settings: &'a ModelSettings,
    /// Pre-request history processor chain (C6), applied before every
    /// outbound request, initial or resumed.
    pub processors: &'a [Processor],
    /// Built-in tool registry the approval cycle executes approved calls
    /// against.
    pub registry: &'a ToolRegistry,
    /// Shared tool execution context (workspace root, cwd, sandbox).
    pub tool_ctx: &'a ToolContext,
    /// Session resource/approval state.
    pub deps: &'a DepsBundle,
    /// Display and approval-prompt sink.
    pub frontend: &'a dyn Frontend,
    /// Max `BACKOFF` retries before giving up the turn.
    pub model_http_retries: u32,
    /// Configured per-turn LLM round-trip cap (`runtime.max_request_limit`).
    pub max_requests: u32,
    /// Per-tool self-correction budget (`runtime.tool_retries`) before a
    /// `Transient`/`Misuse` tool failure is escalated to `Terminal`.
    pub tool_retries: u32,
    /// Cancellation signal checked at every suspension point within the turn.
    pub cancel: &'a Notify,
}

/// What to do after a provider-facing await resolved: continue retrying
/// this turn's attempt, or stop the turn immediately with a result.
enum Recovery {
    Retry,
    Stop(TurnResult),
}

/// Race `fut` against `cancel`, returning `None` if cancellation wins.
async fn race<F: std::future::Future>(cancel: &Notify, fut: F) -> Option<F::Output> {
    tokio::select! {
        biased;
        () = cancel.notified() => None,
        out = fut => Some(out),
    }
}

/// Run one user turn to completion.
///
/// `history` is the canonical, already-committed history; this function
/// never mutates it, returning instead the messages the caller should
/// append on success (or the interrupt-patched partial messages).
pub async fn run_turn(user_input: &str, history: &MessageHistory, ctx: &TurnContext<'_>) -> TurnResult {
    let mut budget = TurnBudget::new(ctx.max_requests);
    let mut tool_retry_counts = ToolRetryCounts::new();
    let mut working_history = history.messages().to_vec();
    let mut current_input: Option<String> = Some(user_input.to_owned());
    let mut last_reflected_body: Option<String> = None;
    let mut attempt: u32 = 0;
    let mut usage_acc = Usage::default();

    loop {
        if !budget.has_remaining() {
            return TurnResult::failed(
                working_history,
                RuntimeError::BudgetExceeded {
                    requests: ctx.max_requests,
                },
                usage_acc,
            );
        }

        let effective = MessageHistory::from_vec(
            apply_processors(ctx.processors, &MessageHistory::from_vec(working_history.clone())).await,
        );

        budget.consume_one();
        let Some(stream_result) = race(
            ctx.cancel,
            ctx.provider
                .run_stream_events(current_input.as_deref(), &effective, ctx.settings, None),
        )
        .await
        else {
            return TurnResult::interrupted(working_history, usage_acc);
        };

        let stream = match stream_result {
            Ok(stream) => stream,
            Err(error) => {
                match handle_provider_error(
                    &error,
                    &mut attempt,
                    ctx.model_http_retries,
                    &mut last_reflected_body,
                    &mut working_history,
                    &mut current_input,
                    ctx,
                    usage_acc,
                )
                .await
                {
                    Recovery::Retry => continue,
                    Recovery::Stop(result) => return result,
                }
            },
        };

        let Some(dispatch_result) = race(ctx.cancel, dispatch(stream, ctx.frontend)).await else {
            return TurnResult::interrupted(working_history, usage_acc);
        };

        let outcome = match dispatch_result {
            Ok(outcome) => outcome,
            Err(error) => {
                match handle_provider_error(
                    &error,
                    &mut attempt,
                    ctx.model_http_retries,
                    &mut last_reflected_body,
                    &mut working_history,
                    &mut current_input,
                    ctx,
                    usage_acc,
                )
                .await
                {
                    Recovery::Retry => continue,
                    Recovery::Stop(result) => return result,
                }
            },
        };

        if let Some(text) = current_input.take() {
            working_history.push(Message::user_text(text));
        }
        working_history.extend(outcome.new_messages);
        usage_acc.add(outcome.usage);

        let RunOutput::Deferred(mut pending) = outcome.output else {
            let RunOutput::Text(text) = outcome.output else {
                unreachable!("matched Deferred above");
            };
            if !outcome.streamed_text {
                ctx.frontend.on_final_output(&text);
            }
            return TurnResult::success(working_history, RunOutput::Text(text), usage_acc);
        };

        // Approval loop: resolve this batch, resume, and repeat for as long
        // as the resumed run itself keeps producing DeferredToolRequests.
        loop {
            if !budget.has_remaining() {
                return TurnResult::failed(
                    working_history,
                    RuntimeError::BudgetExceeded {
                        requests: ctx.max_requests,
                    },
                    usage_acc,
                );
            }

            let Some(decisions_result) = race(
                ctx.cancel,
                resolve_deferred(
                    &pending,
                    ctx.registry,
                    ctx.tool_ctx,
                    ctx.deps,
                    ctx.frontend,
                    &mut tool_retry_counts,
                    ctx.tool_retries,
                ),
            )
            .await
            else {
                return TurnResult::interrupted(working_history, usage_acc);
            };

            let decisions = match decisions_result {
                Ok(decisions) => decisions,
                Err(error) => return TurnResult::failed(working_history, error, usage_acc),
            };

            let effective = MessageHistory::from_vec(
                apply_processors(ctx.processors, &MessageHistory::from_vec(working_history.clone()))
                    .await,
            );

            budget.consume_one();
            let Some(stream_result) = race(
                ctx.cancel,
                ctx.provider
                    .run_stream_events(None, &effective, ctx.settings, Some(decisions)),
            )
            .await
            else {
                return TurnResult::interrupted(working_history, usage_acc);
            };

            let stream = match stream_result {
                Ok(stream) => stream,
                Err(error) => {
                    match handle_provider_error(
                        &error,
                        &mut attempt,
                        ctx.model_http_retries,
                        &mut last_reflected_body,
                        &mut working_history,
                        &mut current_input,
                        ctx,
                        usage_acc,
                    )
                    .await
                    {
                        Recovery::Retry => break,
                        Recovery::Stop(result) => return result,
                    }
                },
            };

            let Some(dispatch_result) = race(ctx.cancel, dispatch(stream, ctx.frontend)).await else {
                return TurnResult::interrupted(working_history, usage_acc);
            };

            let outcome = match dispatch_result {
                Ok(outcome) => outcome,
                Err(error) => {
                    match handle_provider_error(
                        &error,
                        &mut attempt,
                        ctx.model_http_retries,
                        &mut last_reflected_body,
                        &mut working_history,
                        &mut current_input,
                        ctx,
                        usage_acc,
                    )
                    .await
                    {
                        Recovery::Retry => break,
                        Recovery::Stop(result) => return result,
                    }
                },
            };

            working_history.extend(outcome.new_messages);
            usage_acc.add(outcome.usage);

            match outcome.output {
                RunOutput::Text(text) => {
                    if !outcome.streamed_text {
                        ctx.frontend.on_final_output(&text);
                    }
                    return TurnResult::success(working_history, RunOutput::Text(text), usage_acc);
                },
                RunOutput::Deferred(more) => pending = more,
            }
        }
        // `break` above from the approval loop means a REFLECT/BACKOFF was
        // applied; fall through to the outer loop to retry the whole attempt.
    }
}

/// Classify a provider failure and either mutate turn state for a retry
/// (`Recovery::Retry`, via REFLECT or BACKOFF) or produce the turn's final
/// `ABORT` result.
#[allow(clippy::too_many_arguments)]
async fn handle_provider_error(
    error: &LlmError,
    attempt: &mut u32,
    model_http_retries: u32,
    last_reflected_body: &mut Option<String>,
    working_history: &mut Vec<Message>,
    current_input: &mut Option<String>,
    ctx: &TurnContext<'_>,
    usage_acc: Usage,
) -> Recovery {
    let failure: ProviderFailure = error.into();
    let action = classify_provider_failure(&failure);

    match action {
        ClassifiedAction::Reflect => {
            let body = reflect_body(&failure);
            if last_reflected_body.as_deref() == Some(body.as_str()) {
                ctx.frontend.on_status(&format!(
                    "provider repeated the same rejection; aborting turn: {error}"
                ));
                return Recovery::Stop(TurnResult::failed(
                    working_history.clone(),
                    RuntimeError::Provider(error_clone(error)),
                    usage_acc,
                ));
            }
            *last_reflected_body = Some(body.clone());
            working_history.push(Message::user_text(body));
            *current_input = None;
            Recovery::Retry
        },
        ClassifiedAction::Backoff { .. } => {
            if *attempt >= model_http_retries {
                return Recovery::Stop(TurnResult::failed(
                    working_history.clone(),
                    RuntimeError::Provider(error_clone(error)),
                    usage_acc,
                ));
            }
            let delay = astrid_core::backoff_delay(&action, *attempt);
            *attempt = attempt.saturating_add(1);
            if race(ctx.cancel, tokio::time::sleep(delay)).await.is_none() {
                return Recovery::Stop(TurnResult::interrupted(working_history.clone(), usage_acc));
            }
            Recovery::Retry
        },
        ClassifiedAction::Abort { reason } => {
            ctx.frontend.on_status(&reason);
            Recovery::Stop(TurnResult::failed(
                working_history.clone(),
                RuntimeError::Provider(error_clone(error)),
                usage_acc,
            ))
        },
    }
}

fn reflect_body(failure: &ProviderFailure) -> String {
    match failure {
        ProviderFailure::Http { body, .. } => body.clone(),
        ProviderFailure::Transport(msg) => msg.clone(),
    }
}

/// `LlmError` doesn't implement `Clone` (it wraps a `Duration` and owned
/// strings only, so this just rebuilds it field-by-field).
fn error_clone(error: &LlmError) -> LlmError {
    match error {
        LlmError::Http {
            status,
            retry_after,
            body,
        } => LlmError::Http {
            status: *status,
            retry_after: *retry_after,
            body: body.clone(),
        },
        LlmError::Transport(msg) => LlmError::Transport(msg.clone()),
        LlmError::MalformedResponse(msg) => LlmError::MalformedResponse(msg.clone()),
    }
}
