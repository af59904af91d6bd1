use futures::future::BoxFuture;
use futures::stream::BoxStream;

use crate::config::ModelConfig;
use crate::error::Result;
use crate::types::*;

/// Streaming LLM client.
pub trait LlmClient: Send + Sync + 'static {
    /// Send a chat request and receive a stream of deltas.
    fn chat_stream(
        &self,
        config: &ModelConfig,
        messages: Vec<ChatMessage>,
    ) -> BoxFuture<'_, Result<BoxStream<'_, Result<StreamDelta>>>>;
}

/// Retrieval worker: one opaque `question -> result` backend.
pub trait Worker: Send + Sync + 'static {
    /// Worker name (used as the graph step name and the reference key).
    fn name(&self) -> &str;

    /// Human-readable specialty, shown to the oracle when selecting workers.
    fn scope(&self) -> &str;

    /// Retrieve a result for the question.
    fn retrieve(&self, question: String) -> BoxFuture<'_, Result<Reference>>;

    /// Timeout in seconds for one retrieval.
    fn timeout_secs(&self) -> u64 {
        120
    }
}
