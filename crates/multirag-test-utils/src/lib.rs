//! Mocks shared by the multirag test suites.
//!
//! - `ScriptedLlm`: an `LlmClient` that replays queued replies and records
//!   every request.
//! - `StaticWorker`, `FailingWorker`, `PanickingWorker`, `SlowWorker`: canned
//!   retrieval workers.

use std::collections::VecDeque;
use std::sync::Mutex;
use std::time::Duration;

use futures::future::BoxFuture;
use futures::stream::BoxStream;

use multirag_core::config::ModelConfig;
use multirag_core::error::{RagError, Result};
use multirag_core::traits::{LlmClient, Worker};
use multirag_core::types::{ChatMessage, Reference, StopReason, StreamDelta};

/// LLM client replaying a fixed script of replies.
///
/// Each `chat_stream` call pops the next reply; an exhausted script (or a
/// queued failure) returns `RagError::LlmRequest`.
#[derive(Default)]
pub struct ScriptedLlm {
    replies: Mutex<VecDeque<std::result::Result<String, String>>>,
    calls: Mutex<Vec<Vec<ChatMessage>>>,
}

impl ScriptedLlm {
    pub fn new<I, T>(replies: I) -> Self
    where
        I: IntoIterator<Item = T>,
        T: Into<String>,
    {
        Self {
            replies: Mutex::new(replies.into_iter().map(|r| Ok(r.into())).collect()),
            calls: Mutex::new(Vec::new()),
        }
    }

    pub fn push_reply(&self, reply: impl Into<String>) {
        self.replies.lock().unwrap().push_back(Ok(reply.into()));
    }

    /// Queue a transport failure.
    pub fn push_error(&self, message: impl Into<String>) {
        self.replies.lock().unwrap().push_back(Err(message.into()));
    }

    /// Every request received so far, in order.
    pub fn calls(&self) -> Vec<Vec<ChatMessage>> {
        self.calls.lock().unwrap().clone()
    }

    pub fn remaining(&self) -> usize {
        self.replies.lock().unwrap().len()
    }
}

impl LlmClient for ScriptedLlm {
    fn chat_stream(
        &self,
        _config: &ModelConfig,
        messages: Vec<ChatMessage>,
    ) -> BoxFuture<'_, Result<BoxStream<'_, Result<StreamDelta>>>> {
        self.calls.lock().unwrap().push(messages);
        let next = self.replies.lock().unwrap().pop_front();

        Box::pin(async move {
            let text = match next {
                Some(Ok(text)) => text,
                Some(Err(message)) => return Err(RagError::LlmRequest(message)),
                None => return Err(RagError::LlmRequest("script exhausted".into())),
            };

            // Split the reply so consumers must concatenate deltas.
            let mid = text
                .char_indices()
                .nth(text.chars().count() / 2)
                .map(|(i, _)| i)
                .unwrap_or(0);
            let deltas = vec![
                Ok(StreamDelta::TextDelta(text[..mid].to_string())),
                Ok(StreamDelta::TextDelta(text[mid..].to_string())),
                Ok(StreamDelta::Stop(StopReason::EndTurn)),
            ];
            Ok(Box::pin(futures::stream::iter(deltas)) as BoxStream<'_, Result<StreamDelta>>)
        })
    }
}

/// Worker returning the same reference for every question.
pub struct StaticWorker {
    name: String,
    scope: String,
    reference: Reference,
    questions: Mutex<Vec<String>>,
}

impl StaticWorker {
    pub fn new(name: impl Into<String>, reference: impl Into<Reference>) -> Self {
        Self {
            name: name.into(),
            scope: "Test worker".into(),
            reference: reference.into(),
            questions: Mutex::new(Vec::new()),
        }
    }

    pub fn with_scope(mut self, scope: impl Into<String>) -> Self {
        self.scope = scope.into();
        self
    }

    /// Questions received, in order.
    pub fn questions(&self) -> Vec<String> {
        self.questions.lock().unwrap().clone()
    }

    pub fn call_count(&self) -> usize {
        self.questions.lock().unwrap().len()
    }
}

impl Worker for StaticWorker {
    fn name(&self) -> &str {
        &self.name
    }

    fn scope(&self) -> &str {
        &self.scope
    }

    fn retrieve(&self, question: String) -> BoxFuture<'_, Result<Reference>> {
        self.questions.lock().unwrap().push(question);
        let reference = self.reference.clone();
        Box::pin(async move { Ok(reference) })
    }
}

/// Worker whose every call fails.
pub struct FailingWorker {
    name: String,
    message: String,
}

impl FailingWorker {
    pub fn new(name: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            message: message.into(),
        }
    }
}

impl Worker for FailingWorker {
    fn name(&self) -> &str {
        &self.name
    }

    fn scope(&self) -> &str {
        "Always fails"
    }

    fn retrieve(&self, _question: String) -> BoxFuture<'_, Result<Reference>> {
        Box::pin(async move {
            Err(RagError::WorkerFailed {
                worker: self.name.clone(),
                message: self.message.clone(),
            })
        })
    }
}

/// Worker that panics on every call.
pub struct PanickingWorker {
    name: String,
    message: String,
    eager: bool,
}

impl PanickingWorker {
    pub fn new(name: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            message: message.into(),
            eager: false,
        }
    }

    /// Panic in `retrieve` itself rather than inside the returned future.
    pub fn eager(mut self) -> Self {
        self.eager = true;
        self
    }
}

impl Worker for PanickingWorker {
    fn name(&self) -> &str {
        &self.name
    }

    fn scope(&self) -> &str {
        "Always panics"
    }

    fn retrieve(&self, _question: String) -> BoxFuture<'_, Result<Reference>> {
        if self.eager {
            panic!("{}", self.message);
        }
        Box::pin(async move { panic!("{}", self.message) })
    }
}

/// Worker that sleeps before answering.
pub struct SlowWorker {
    name: String,
    delay: Duration,
    timeout_secs: u64,
}

impl SlowWorker {
    pub fn new(name: impl Into<String>, delay: Duration) -> Self {
        Self {
            name: name.into(),
            delay,
            timeout_secs: 120,
        }
    }

    pub fn with_timeout_secs(mut self, secs: u64) -> Self {
        self.timeout_secs = secs;
        self
    }
}

impl Worker for SlowWorker {
    fn name(&self) -> &str {
        &self.name
    }

    fn scope(&self) -> &str {
        "Slow test worker"
    }

    fn retrieve(&self, _question: String) -> BoxFuture<'_, Result<Reference>> {
        Box::pin(async move {
            tokio::time::sleep(self.delay).await;
            Ok(Reference::text(format!("{} answered late", self.name)))
        })
    }

    fn timeout_secs(&self) -> u64 {
        self.timeout_secs
    }
}

/// A structured payload shaped like an empty knowledge-graph answer.
pub fn empty_graph_result() -> serde_json::Value {
    serde_json::json!({
        "generated_cypher": "MATCH (d:Disease)-[:HAS_SYMPTOM]->(s) RETURN s.name",
        "retrieved_result": []
    })
}
