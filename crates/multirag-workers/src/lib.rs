pub mod http;
pub mod llmself;
pub mod wiki;

use std::sync::Arc;

use tracing::{info, warn};

use multirag_agent::Roster;
use multirag_core::config::AppConfig;
use multirag_core::error::{RagError, Result};
use multirag_core::traits::LlmClient;

pub use http::HttpWorker;
pub use llmself::LlmSelfWorker;
pub use wiki::WikiWorker;

/// Built-in worker names accepted in `workers.enabled`.
pub fn builtin_names() -> &'static [&'static str] {
    &[wiki::NAME, llmself::NAME]
}

/// Build the worker roster from config: enabled built-ins in order, then the
/// HTTP services, then scope overrides.
pub fn build_roster(config: &AppConfig, llm: Arc<dyn LlmClient>) -> Result<Roster> {
    let mut roster = Roster::new();

    for name in &config.workers.enabled {
        match name.as_str() {
            wiki::NAME => roster.register(Arc::new(WikiWorker::new(
                llm.clone(),
                config.model.clone(),
                config.workers.wiki.clone(),
            )?))?,
            llmself::NAME => roster.register(Arc::new(LlmSelfWorker::new(
                llm.clone(),
                config.model.clone(),
                &config.workers.llmself,
            )))?,
            other => {
                return Err(RagError::Config(format!(
                    "unknown built-in worker '{}' (expected one of {:?})",
                    other,
                    builtin_names()
                )))
            }
        }
    }

    for http in &config.workers.http {
        roster.register(Arc::new(HttpWorker::new(http.clone())?))?;
    }

    for (name, scope) in &config.workers.scopes {
        if !roster.contains(name) {
            warn!(worker = %name, "Scope override for a worker not in the roster");
        }
        roster.set_scope(name.clone(), scope.clone());
    }

    if let Some(fallback) = config.orchestration.fallback() {
        if !roster.contains(fallback) {
            warn!(fallback = %fallback, "Fallback worker not in roster, substitution disabled");
        }
    }

    info!(workers = ?roster.names(), "Worker roster ready");
    Ok(roster)
}

#[cfg(test)]
mod tests {
    use super::*;
    use multirag_test_utils::ScriptedLlm;

    fn config(toml: &str) -> AppConfig {
        AppConfig::parse(toml).unwrap()
    }

    #[test]
    fn test_default_roster_order() {
        let config = config("[model]\nmodel_id = \"m\"\n");
        let roster = build_roster(&config, Arc::new(ScriptedLlm::default())).unwrap();
        assert_eq!(roster.names(), vec!["wiki", "llmself"]);
        assert_eq!(roster.scope("llmself"), "Fallback only if others are irrelevant.");
    }

    #[test]
    fn test_http_workers_and_scope_overrides() {
        let config = config(
            r#"
[model]
model_id = "m"

[workers]
enabled = ["llmself"]

[workers.scopes]
llmself = "Last resort"

[[workers.http]]
name = "kg"
url = "http://localhost:8080/query"
scope = "Knowledge-graph lookups"
"#,
        );
        let roster = build_roster(&config, Arc::new(ScriptedLlm::default())).unwrap();
        assert_eq!(roster.names(), vec!["llmself", "kg"]);
        assert_eq!(roster.scope("llmself"), "Last resort");
        assert_eq!(roster.scope("kg"), "Knowledge-graph lookups");
    }

    #[test]
    fn test_unknown_builtin_rejected() {
        let config = config("[model]\nmodel_id = \"m\"\n[workers]\nenabled = [\"pubmed\"]\n");
        let err = build_roster(&config, Arc::new(ScriptedLlm::default())).unwrap_err();
        assert!(err.to_string().contains("unknown built-in worker"));
    }
}
