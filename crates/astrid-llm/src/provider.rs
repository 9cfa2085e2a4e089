//! The external LLM provider contract (§6).

use std::pin::Pin;

use async_trait::async_trait;
use astrid_core::MessageHistory;
use futures::Stream;

use crate::error::LlmResult;
use crate::types::{DeferredToolResults, ModelSettings, StreamingEvent};

/// A boxed, owned stream of [`StreamingEvent`]s, each fallible.
pub type EventStream = Pin<Box<dyn Stream<Item = LlmResult<StreamingEvent>> + Send>>;

/// Any provider fitting this contract is acceptable to the runtime: the
/// transport itself (Claude, OpenAI, a local model server, …) is an
/// external collaborator.
#[async_trait]
pub trait LlmProvider: Send + Sync {
    /// Provider identifier, e.g. `"claude"`.
    fn name(&self) -> &str;

    /// Model identifier currently configured.
    fn model(&self) -> &str;

    /// Start (or resume) one run, yielding an ordered event stream
    /// terminating in `AgentRunResult`.
    ///
    /// `user_input` is `None` on a reflection or approval resume, where the
    /// stream should continue from `history` alone. `deferred_results`,
    /// when present, feeds resolved tool outcomes back into the run.
    async fn run_stream_events(
        &self,
        user_input: Option<&str>,
        history: &MessageHistory,
        settings: &ModelSettings,
        deferred_results: Option<DeferredToolResults>,
    ) -> LlmResult<EventStream>;
}

#[async_trait]
impl LlmProvider for Box<dyn LlmProvider> {
    fn name(&self) -> &str {
        (**self).name()
    }

    fn model(&self) -> &str {
        (**self).model()
    }

    async fn run_stream_events(
        &self,
        user_input: Option<&str>,
        history: &MessageHistory,
        settings: &ModelSettings,
        deferred_results: Option<DeferredToolResults>,
    ) -> LlmResult<EventStream> {
        (**self)
            .run_stream_events(user_input, history, settings, deferred_results)
            .await
    }
}
