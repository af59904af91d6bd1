use std::sync::Arc;

use futures::future::BoxFuture;
use tracing::debug;

use multirag_agent::collect_text;
use multirag_core::config::{LlmSelfConfig, ModelConfig};
use multirag_core::error::{RagError, Result};
use multirag_core::traits::{LlmClient, Worker};
use multirag_core::types::{ChatMessage, Reference};

pub const NAME: &str = "llmself";

const SYSTEM_PROMPT: &str = "You are a knowledgeable AI. Answer concisely and precisely \
using only your internal knowledge. No external context.";

/// Answers from the model's own knowledge, with no retrieval.
pub struct LlmSelfWorker {
    llm: Arc<dyn LlmClient>,
    model: ModelConfig,
    system_prompt: String,
    timeout_secs: u64,
}

impl LlmSelfWorker {
    pub fn new(llm: Arc<dyn LlmClient>, model: ModelConfig, config: &LlmSelfConfig) -> Self {
        Self {
            llm,
            model,
            system_prompt: config
                .system_prompt
                .clone()
                .unwrap_or_else(|| SYSTEM_PROMPT.to_string()),
            timeout_secs: config.timeout_secs,
        }
    }
}

impl Worker for LlmSelfWorker {
    fn name(&self) -> &str {
        NAME
    }

    fn scope(&self) -> &str {
        "Fallback only if others are irrelevant."
    }

    fn retrieve(&self, question: String) -> BoxFuture<'_, Result<Reference>> {
        Box::pin(async move {
            debug!(question = %question, "Answering from internal knowledge");
            let messages = vec![
                ChatMessage::system(self.system_prompt.clone()),
                ChatMessage::user(question),
            ];
            let answer = collect_text(self.llm.as_ref(), &self.model, messages)
                .await
                .map_err(|e| RagError::WorkerFailed {
                    worker: NAME.to_string(),
                    message: e.to_string(),
                })?;
            Ok(Reference::text(answer.trim()))
        })
    }

    fn timeout_secs(&self) -> u64 {
        self.timeout_secs
    }
}
