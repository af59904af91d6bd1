use std::collections::HashMap;

use multirag_core::config::ModelConfig;

/// A named provider preset for OpenAI-compatible APIs.
pub struct ProviderPreset {
    pub default_base_url: &'static str,
    pub needs_api_key: bool,
    pub extra_headers: &'static [(&'static str, &'static str)],
}

/// Look up a provider preset by name.
pub fn get_preset(provider: &str) -> Option<ProviderPreset> {
    match provider {
        "openai" => Some(ProviderPreset {
            default_base_url: "https://api.openai.com/v1/chat/completions",
            needs_api_key: true,
            extra_headers: &[],
        }),
        "deepseek" => Some(ProviderPreset {
            default_base_url: "https://api.deepseek.com/v1/chat/completions",
            needs_api_key: true,
            extra_headers: &[],
        }),
        "ollama" => Some(ProviderPreset {
            default_base_url: "http://localhost:11434/v1/chat/completions",
            needs_api_key: false,
            extra_headers: &[],
        }),
        "groq" => Some(ProviderPreset {
            default_base_url: "https://api.groq.com/openai/v1/chat/completions",
            needs_api_key: true,
            extra_headers: &[],
        }),
        "openrouter" => Some(ProviderPreset {
            default_base_url: "https://openrouter.ai/api/v1/chat/completions",
            needs_api_key: true,
            extra_headers: &[("X-Title", "multirag")],
        }),
        _ => None,
    }
}

/// Fill in the preset base URL and headers the user did not set.
pub fn apply_preset_defaults(config: &mut ModelConfig) {
    let Some(preset) = get_preset(&config.provider) else {
        return;
    };
    if config.base_url.is_none() {
        config.base_url = Some(preset.default_base_url.to_string());
    }
    config.extra_headers = merge_headers(&preset, &config.extra_headers);
}

/// Preset headers plus user headers; user values win on conflict.
fn merge_headers(
    preset: &ProviderPreset,
    user_headers: &HashMap<String, String>,
) -> HashMap<String, String> {
    let mut headers: HashMap<String, String> = preset
        .extra_headers
        .iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect();
    for (k, v) in user_headers {
        headers.insert(k.clone(), v.clone());
    }
    headers
}

/// List all known preset provider names.
pub fn all_preset_names() -> &'static [&'static str] {
    &["openai", "deepseek", "ollama", "groq", "openrouter"]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_apply_preset_fills_base_url() {
        let mut config = ModelConfig::new("deepseek", "deepseek-chat");
        apply_preset_defaults(&mut config);
        assert_eq!(
            config.base_url.as_deref(),
            Some("https://api.deepseek.com/v1/chat/completions")
        );
    }

    #[test]
    fn test_apply_preset_keeps_user_base_url_and_headers() {
        let mut config = ModelConfig::new("openrouter", "some/model");
        config.base_url = Some("http://proxy.local/v1/chat/completions".into());
        config
            .extra_headers
            .insert("X-Title".into(), "custom".into());
        apply_preset_defaults(&mut config);
        assert_eq!(
            config.base_url.as_deref(),
            Some("http://proxy.local/v1/chat/completions")
        );
        assert_eq!(config.extra_headers.get("X-Title").map(String::as_str), Some("custom"));
    }

    #[test]
    fn test_unknown_provider_untouched() {
        let mut config = ModelConfig::new("vllm", "m");
        apply_preset_defaults(&mut config);
        assert!(config.base_url.is_none());
        assert!(all_preset_names().iter().all(|p| get_preset(p).is_some()));
    }
}
