use std::sync::Arc;

use futures::future::BoxFuture;
use futures::StreamExt;
use tracing::debug;

use multirag_core::config::ModelConfig;
use multirag_core::error::{RagError, Result};
use multirag_core::traits::LlmClient;
use multirag_core::types::{ChatMessage, StreamDelta};

/// The natural-language decision service behind classification and routing.
pub trait Oracle: Send + Sync {
    /// Send a system instruction plus user content, return the full reply text.
    fn complete(&self, system: String, user: String) -> BoxFuture<'_, Result<String>>;

    /// Ask for a JSON object and read one string field from the reply.
    ///
    /// Falls back to the trimmed reply text when no such field can be parsed.
    fn complete_field<'a>(
        &'a self,
        system: String,
        user: String,
        field: &'a str,
    ) -> BoxFuture<'a, Result<String>> {
        Box::pin(async move {
            let reply = self.complete(system, user).await?;
            Ok(read_field(&reply, field).unwrap_or_else(|| reply.trim().to_string()))
        })
    }
}

/// Oracle backed by an `LlmClient`.
pub struct LlmOracle {
    llm: Arc<dyn LlmClient>,
    config: ModelConfig,
}

impl LlmOracle {
    pub fn new(llm: Arc<dyn LlmClient>, config: ModelConfig) -> Self {
        Self { llm, config }
    }
}

impl Oracle for LlmOracle {
    fn complete(&self, system: String, user: String) -> BoxFuture<'_, Result<String>> {
        Box::pin(async move {
            let mut messages = Vec::with_capacity(2);
            if !system.is_empty() {
                messages.push(ChatMessage::system(system));
            }
            messages.push(ChatMessage::user(user));
            collect_text(self.llm.as_ref(), &self.config, messages).await
        })
    }
}

/// Run one chat request and concatenate its text deltas.
pub async fn collect_text(
    llm: &dyn LlmClient,
    config: &ModelConfig,
    messages: Vec<ChatMessage>,
) -> Result<String> {
    let mut stream = llm.chat_stream(config, messages).await?;

    let mut text = String::new();
    while let Some(delta) = stream.next().await {
        match delta {
            Ok(StreamDelta::TextDelta(chunk)) => text.push_str(&chunk),
            Ok(StreamDelta::Usage {
                input_tokens,
                output_tokens,
            }) => debug!(input_tokens, output_tokens, "Oracle usage"),
            Ok(StreamDelta::Stop(_)) => {}
            Err(e) => return Err(RagError::LlmStream(e.to_string())),
        }
    }
    Ok(text)
}

/// Extract JSON from a response that may contain markdown code fences.
pub fn extract_json(text: &str) -> &str {
    let trimmed = text.trim();
    if let Some(start) = trimmed.find("```json") {
        let after = &trimmed[start + 7..];
        if let Some(end) = after.find("```") {
            return after[..end].trim();
        }
    }
    if let Some(start) = trimmed.find("```") {
        let after = &trimmed[start + 3..];
        if let Some(end) = after.find("```") {
            return after[..end].trim();
        }
    }
    if let Some(start) = trimmed.find('{') {
        if let Some(end) = trimmed.rfind('}') {
            if end > start {
                return &trimmed[start..=end];
            }
        }
    }
    trimmed
}

fn read_field(reply: &str, field: &str) -> Option<String> {
    let value: serde_json::Value = serde_json::from_str(extract_json(reply)).ok()?;
    value
        .get(field)?
        .as_str()
        .map(|s| s.trim().to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use multirag_test_utils::ScriptedLlm;

    #[test]
    fn test_extract_json_variants() {
        assert_eq!(extract_json("{\"next\": \"wiki\"}"), "{\"next\": \"wiki\"}");
        assert_eq!(
            extract_json("```json\n{\"next\": \"wiki\"}\n```"),
            "{\"next\": \"wiki\"}"
        );
        assert_eq!(
            extract_json("Sure! {\"next\": \"FINISH\"} hope that helps"),
            "{\"next\": \"FINISH\"}"
        );
        assert_eq!(extract_json("  wiki  "), "wiki");
    }

    #[test]
    fn test_read_field() {
        assert_eq!(read_field("{\"next\": \" wiki \"}", "next").as_deref(), Some("wiki"));
        assert_eq!(read_field("{\"other\": 1}", "next"), None);
        assert_eq!(read_field("wiki", "next"), None);
    }

    #[tokio::test]
    async fn test_llm_oracle_sends_system_and_user() {
        let llm = Arc::new(ScriptedLlm::new(vec!["single-step"]));
        let oracle = LlmOracle::new(llm.clone(), ModelConfig::new("openai", "m"));
        let reply = oracle.complete("sys".into(), "question".into()).await.unwrap();
        assert_eq!(reply, "single-step");

        let calls = llm.calls();
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].len(), 2);
        assert_eq!(calls[0][0].content, "sys");
        assert_eq!(calls[0][1].content, "question");
    }

    #[tokio::test]
    async fn test_complete_field_falls_back_to_text() {
        let llm = Arc::new(ScriptedLlm::new(vec!["```json\n{\"next\": \"wiki\"}\n```", "  llmself \n"]));
        let oracle = LlmOracle::new(llm, ModelConfig::new("openai", "m"));
        let a = oracle.complete_field(String::new(), "q".into(), "next").await.unwrap();
        let b = oracle.complete_field(String::new(), "q".into(), "next").await.unwrap();
        assert_eq!(a, "wiki");
        assert_eq!(b, "llmself");
    }

    #[tokio::test]
    async fn test_exhausted_script_is_an_error() {
        let llm = Arc::new(ScriptedLlm::new(Vec::<&str>::new()));
        let oracle = LlmOracle::new(llm, ModelConfig::new("openai", "m"));
        assert!(oracle.complete(String::new(), "q".into()).await.is_err());
    }
}
