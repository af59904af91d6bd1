pub mod providers;
pub mod retry;
pub mod streaming;

use multirag_core::config::ModelConfig;
use multirag_core::error::{RagError, Result};
use multirag_core::traits::LlmClient;

pub use providers::openai::OpenAiClient;
pub use providers::presets::apply_preset_defaults;
pub use retry::RetryingClient;

/// Create an LLM client based on the provider name.
pub fn create_client(config: &ModelConfig) -> Result<Box<dyn LlmClient>> {
    match config.provider.as_str() {
        // Native Anthropic/Gemini protocols are not spoken here; use an
        // OpenAI-compatible gateway for those models.
        "anthropic" | "claude" | "gemini" | "google" => {
            Err(RagError::UnsupportedProvider(config.provider.clone()))
        }
        _ => Ok(Box::new(OpenAiClient::new())),
    }
}

/// Build the primary client wrapped with retry and model fallback.
pub fn create_retrying_client(
    model: &ModelConfig,
    fallback_models: &[ModelConfig],
) -> Result<RetryingClient> {
    let primary = create_client(model)?;
    let fallbacks = fallback_models
        .iter()
        .map(|fb| {
            let mut fb = fb.clone();
            apply_preset_defaults(&mut fb);
            create_client(&fb).map(|client| (fb, client))
        })
        .collect::<Result<Vec<_>>>()?;
    let retry = model.retry.clone().unwrap_or_default();
    Ok(RetryingClient::new(primary, fallbacks, retry))
}
