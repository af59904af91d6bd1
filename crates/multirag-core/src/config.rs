use std::collections::HashMap;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{RagError, Result};

/// Top-level multirag configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    pub model: ModelConfig,
    #[serde(default)]
    pub fallback_models: Vec<ModelConfig>,
    #[serde(default)]
    pub orchestration: OrchestrationConfig,
    #[serde(default)]
    pub workers: WorkersConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelConfig {
    #[serde(default = "default_provider")]
    pub provider: String,
    pub model_id: String,
    #[serde(default)]
    pub api_key: Option<String>,
    #[serde(default)]
    pub base_url: Option<String>,
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,
    #[serde(default = "default_temperature")]
    pub temperature: f32,
    #[serde(default)]
    pub retry: Option<RetryConfig>,
    /// Extra HTTP headers sent with every request.
    #[serde(default)]
    pub extra_headers: HashMap<String, String>,
}

fn default_provider() -> String { "openai".to_string() }
fn default_max_tokens() -> u32 { 1024 }
fn default_temperature() -> f32 { 0.0 }

impl ModelConfig {
    /// Minimal config for the given provider and model.
    pub fn new(provider: impl Into<String>, model_id: impl Into<String>) -> Self {
        Self {
            provider: provider.into(),
            model_id: model_id.into(),
            api_key: None,
            base_url: None,
            max_tokens: default_max_tokens(),
            temperature: default_temperature(),
            retry: None,
            extra_headers: HashMap::new(),
        }
    }
}

/// Retry configuration for LLM requests.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetryConfig {
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_initial_backoff")]
    pub initial_backoff_ms: u64,
    #[serde(default = "default_max_backoff")]
    pub max_backoff_ms: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: default_max_retries(),
            initial_backoff_ms: default_initial_backoff(),
            max_backoff_ms: default_max_backoff(),
        }
    }
}

fn default_max_retries() -> u32 { 3 }
fn default_initial_backoff() -> u64 { 1000 }
fn default_max_backoff() -> u64 { 30000 }

/// Budget and routing settings for one orchestration run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrchestrationConfig {
    /// Maximum number of worker results accepted into one run.
    #[serde(default = "default_max_agents")]
    pub max_agents: usize,
    /// Maximum number of step dispatches per graph run.
    #[serde(default = "default_recursion_limit")]
    pub recursion_limit: usize,
    /// Worker substituted for low-information results. Empty disables substitution.
    #[serde(default = "default_fallback_worker")]
    pub fallback_worker: String,
    /// Priority hints rendered verbatim into the selection prompt.
    #[serde(default)]
    pub routing_hints: Vec<String>,
}

impl Default for OrchestrationConfig {
    fn default() -> Self {
        Self {
            max_agents: default_max_agents(),
            recursion_limit: default_recursion_limit(),
            fallback_worker: default_fallback_worker(),
            routing_hints: vec![],
        }
    }
}

impl OrchestrationConfig {
    /// The configured fallback worker, if substitution is enabled.
    pub fn fallback(&self) -> Option<&str> {
        let name = self.fallback_worker.trim();
        if name.is_empty() {
            None
        } else {
            Some(name)
        }
    }
}

fn default_max_agents() -> usize { 2 }
fn default_recursion_limit() -> usize { 100 }
fn default_fallback_worker() -> String { "llmself".to_string() }

/// Worker roster configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkersConfig {
    /// Built-in workers to enable, in roster order.
    #[serde(default = "default_enabled_workers")]
    pub enabled: Vec<String>,
    /// Scope overrides by worker name.
    #[serde(default)]
    pub scopes: HashMap<String, String>,
    #[serde(default)]
    pub wiki: WikiConfig,
    #[serde(default)]
    pub llmself: LlmSelfConfig,
    /// Remote retrieval services, always appended after the built-ins.
    #[serde(default)]
    pub http: Vec<HttpWorkerConfig>,
}

impl Default for WorkersConfig {
    fn default() -> Self {
        Self {
            enabled: default_enabled_workers(),
            scopes: HashMap::new(),
            wiki: WikiConfig::default(),
            llmself: LlmSelfConfig::default(),
            http: vec![],
        }
    }
}

fn default_enabled_workers() -> Vec<String> {
    vec!["wiki".to_string(), "llmself".to_string()]
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WikiConfig {
    /// Wikipedia language subdomain.
    #[serde(default = "default_wiki_language")]
    pub language: String,
    /// Characters of article text kept.
    #[serde(default = "default_wiki_max_chars")]
    pub max_chars: usize,
    #[serde(default = "default_wiki_timeout")]
    pub timeout_secs: u64,
    /// Override for the article endpoint; `{title}` is replaced.
    #[serde(default)]
    pub base_url: Option<String>,
    /// Articles fetched per question. Beyond the first, linked articles are
    /// followed breadth-first.
    #[serde(default = "default_wiki_articles_limit")]
    pub articles_limit: usize,
    /// Pause between consecutive article fetches.
    #[serde(default = "default_wiki_crawl_interval")]
    pub crawl_interval_ms: u64,
}

impl Default for WikiConfig {
    fn default() -> Self {
        Self {
            language: default_wiki_language(),
            max_chars: default_wiki_max_chars(),
            timeout_secs: default_wiki_timeout(),
            base_url: None,
            articles_limit: default_wiki_articles_limit(),
            crawl_interval_ms: default_wiki_crawl_interval(),
        }
    }
}

fn default_wiki_language() -> String { "en".to_string() }
fn default_wiki_max_chars() -> usize { 1500 }
fn default_wiki_timeout() -> u64 { 30 }
fn default_wiki_articles_limit() -> usize { 1 }
fn default_wiki_crawl_interval() -> u64 { 1000 }

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmSelfConfig {
    #[serde(default)]
    pub system_prompt: Option<String>,
    #[serde(default = "default_worker_timeout")]
    pub timeout_secs: u64,
}

impl Default for LlmSelfConfig {
    fn default() -> Self {
        Self {
            system_prompt: None,
            timeout_secs: default_worker_timeout(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HttpWorkerConfig {
    pub name: String,
    pub url: String,
    #[serde(default = "default_http_scope")]
    pub scope: String,
    #[serde(default = "default_worker_timeout")]
    pub timeout_secs: u64,
    #[serde(default)]
    pub headers: HashMap<String, String>,
}

fn default_http_scope() -> String { "General purpose agent".to_string() }
fn default_worker_timeout() -> u64 { 120 }

impl AppConfig {
    /// Config with defaults everywhere except the oracle model.
    pub fn with_model(model: ModelConfig) -> Self {
        Self {
            model,
            fallback_models: vec![],
            orchestration: OrchestrationConfig::default(),
            workers: WorkersConfig::default(),
        }
    }

    /// Load config from a TOML file, with env var expansion.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|_| RagError::ConfigNotFound(path.display().to_string()))?;
        Self::parse(&content)
    }

    /// Parse config from TOML text, with env var expansion.
    pub fn parse(content: &str) -> Result<Self> {
        // Expand ${ENV_VAR} references
        let expanded = expand_env_vars(content);

        let config: Self =
            toml::from_str(&expanded).map_err(|e| RagError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Reject settings no run could honor.
    pub fn validate(&self) -> Result<()> {
        if self.orchestration.recursion_limit == 0 {
            return Err(RagError::Config(
                "orchestration.recursion_limit must be at least 1".into(),
            ));
        }
        let mut seen = std::collections::HashSet::new();
        for http in &self.workers.http {
            if http.name.trim().is_empty() {
                return Err(RagError::Config("workers.http entry without a name".into()));
            }
            if self.workers.enabled.contains(&http.name) || !seen.insert(http.name.as_str()) {
                return Err(RagError::Config(format!(
                    "duplicate worker name: {}",
                    http.name
                )));
            }
        }
        Ok(())
    }
}

/// Expand `${ENV_VAR}` patterns in a string.
fn expand_env_vars(input: &str) -> String {
    let mut result = String::with_capacity(input.len());
    let mut chars = input.chars().peekable();

    while let Some(c) = chars.next() {
        if c == '$' && chars.peek() == Some(&'{') {
            chars.next();
            let mut var_name = String::new();
            for c in chars.by_ref() {
                if c == '}' {
                    break;
                }
                var_name.push(c);
            }
            match std::env::var(&var_name) {
                Ok(val) => result.push_str(&val),
                // Keep original if env var not set
                Err(_) => result.push_str(&format!("${{{}}}", var_name)),
            }
        } else {
            result.push(c);
        }
    }
    result
}
