use std::time::Duration;

use futures::future::BoxFuture;
use futures::stream::{self, BoxStream, StreamExt};
use tracing::{info, warn};

use multirag_core::config::{ModelConfig, RetryConfig};
use multirag_core::error::{RagError, Result};
use multirag_core::traits::LlmClient;
use multirag_core::types::*;

/// An LLM client that retries failed requests and falls back to alternative models.
///
/// A stream whose first item is an error counts as a failed attempt: nothing
/// has reached the caller yet, so the request is replayed. Fallback models
/// retry with their own `retry` section, or make a single attempt without one.
pub struct RetryingClient {
    primary: Box<dyn LlmClient>,
    fallbacks: Vec<(ModelConfig, Box<dyn LlmClient>)>,
    retry_config: RetryConfig,
}

impl RetryingClient {
    pub fn new(
        primary: Box<dyn LlmClient>,
        fallbacks: Vec<(ModelConfig, Box<dyn LlmClient>)>,
        retry_config: RetryConfig,
    ) -> Self {
        Self {
            primary,
            fallbacks,
            retry_config,
        }
    }
}

/// Status code of an `HTTP <code> ...` request error.
fn http_status(msg: &str) -> Option<u16> {
    msg.strip_prefix("HTTP ")?.get(..3)?.parse().ok()
}

fn is_retryable(e: &RagError) -> bool {
    match e {
        RagError::LlmRequest(msg) => match http_status(msg) {
            Some(status) => matches!(status, 408 | 409 | 425 | 429) || (500..600).contains(&status),
            None => {
                let msg = msg.to_ascii_lowercase();
                msg.contains("timeout") || msg.contains("timed out") || msg.contains("connection")
            }
        },
        RagError::LlmStream(_) => true,
        _ => false,
    }
}

fn calculate_backoff(attempt: u32, config: &RetryConfig) -> Duration {
    let ms = config
        .initial_backoff_ms
        .saturating_mul(2u64.saturating_pow(attempt))
        .min(config.max_backoff_ms);
    // Jitter: 0.8x to 1.2x
    let jitter = 0.8 + rand::random::<f64>() * 0.4;
    Duration::from_millis((ms as f64 * jitter) as u64)
}

fn single_attempt() -> RetryConfig {
    RetryConfig {
        max_retries: 0,
        ..RetryConfig::default()
    }
}

/// Pull the first delta so an immediately failing stream surfaces as an error.
async fn open_stream(
    mut stream: BoxStream<'_, Result<StreamDelta>>,
) -> Result<BoxStream<'_, Result<StreamDelta>>> {
    match stream.next().await {
        Some(Err(e)) => Err(e),
        Some(Ok(first)) => Ok(stream::once(async move { Ok(first) }).chain(stream).boxed()),
        None => Ok(stream::empty().boxed()),
    }
}

/// Attempt loop against one model.
async fn request_with_retries<'c>(
    client: &'c dyn LlmClient,
    config: &ModelConfig,
    messages: &[ChatMessage],
    retry: &RetryConfig,
) -> Result<BoxStream<'c, Result<StreamDelta>>> {
    let mut attempt = 0;
    loop {
        let err = match client.chat_stream(config, messages.to_vec()).await {
            Ok(stream) => match open_stream(stream).await {
                Ok(stream) => return Ok(stream),
                Err(e) => e,
            },
            Err(e) => e,
        };
        if !is_retryable(&err) || attempt >= retry.max_retries {
            return Err(err);
        }

        let backoff = calculate_backoff(attempt, retry);
        warn!(
            model = %config.model_id,
            attempt = attempt + 1,
            max_retries = retry.max_retries,
            backoff_ms = backoff.as_millis() as u64,
            error = %err,
            "Retrying LLM request"
        );
        tokio::time::sleep(backoff).await;
        attempt += 1;
    }
}

impl LlmClient for RetryingClient {
    fn chat_stream(
        &self,
        config: &ModelConfig,
        messages: Vec<ChatMessage>,
    ) -> BoxFuture<'_, Result<BoxStream<'_, Result<StreamDelta>>>> {
        let config = config.clone();

        Box::pin(async move {
            let primary_err = match request_with_retries(
                self.primary.as_ref(),
                &config,
                &messages,
                &self.retry_config,
            )
            .await
            {
                Ok(stream) => return Ok(stream),
                Err(e) => e,
            };

            if !self.fallbacks.is_empty() {
                info!(error = %primary_err, "Primary LLM exhausted, trying fallback models");
            }
            for (fb_config, fb_client) in &self.fallbacks {
                let retry = fb_config.retry.clone().unwrap_or_else(single_attempt);
                match request_with_retries(fb_client.as_ref(), fb_config, &messages, &retry).await {
                    Ok(stream) => {
                        info!(
                            model = %fb_config.model_id,
                            provider = %fb_config.provider,
                            "Fell back to alternative model"
                        );
                        return Ok(stream);
                    }
                    Err(e) => {
                        warn!(model = %fb_config.model_id, error = %e, "Fallback model also failed");
                    }
                }
            }

            Err(primary_err)
        })
    }
}
