use std::time::Duration;

use futures::future::BoxFuture;
use tracing::debug;

use multirag_core::config::HttpWorkerConfig;
use multirag_core::error::{RagError, Result};
use multirag_core::traits::Worker;
use multirag_core::types::Reference;

/// A remote retrieval service reached over HTTP.
///
/// POSTs `{"query": "<question>"}` to the configured URL. A JSON response is
/// returned as a structured reference (a bare JSON string as text); any other
/// body is returned as text.
pub struct HttpWorker {
    config: HttpWorkerConfig,
    http: reqwest::Client,
}

impl HttpWorker {
    pub fn new(config: HttpWorkerConfig) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs.max(1)))
            .build()
            .map_err(|e| RagError::Config(format!("Failed to create HTTP client: {}", e)))?;
        Ok(Self { config, http })
    }

    fn failed(&self, message: impl Into<String>) -> RagError {
        RagError::WorkerFailed {
            worker: self.config.name.clone(),
            message: message.into(),
        }
    }
}

impl Worker for HttpWorker {
    fn name(&self) -> &str {
        &self.config.name
    }

    fn scope(&self) -> &str {
        &self.config.scope
    }

    fn retrieve(&self, question: String) -> BoxFuture<'_, Result<Reference>> {
        Box::pin(async move {
            debug!(worker = %self.config.name, url = %self.config.url, "Querying retrieval service");

            let mut req = self
                .http
                .post(&self.config.url)
                .json(&serde_json::json!({ "query": question }));
            for (k, v) in &self.config.headers {
                req = req.header(k.as_str(), v.as_str());
            }

            let resp = req
                .send()
                .await
                .map_err(|e| self.failed(format!("Request failed: {}", e)))?;

            let status = resp.status();
            if !status.is_success() {
                let body = resp.text().await.unwrap_or_default();
                return Err(self.failed(format!("HTTP {}: {}", status.as_u16(), body.trim())));
            }

            let body = resp
                .text()
                .await
                .map_err(|e| self.failed(format!("Failed to read response body: {}", e)))?;

            Ok(parse_body(&body))
        })
    }

    fn timeout_secs(&self) -> u64 {
        self.config.timeout_secs
    }
}

fn parse_body(body: &str) -> Reference {
    match serde_json::from_str::<serde_json::Value>(body) {
        Ok(value) => Reference::from(value),
        Err(_) => Reference::text(body.trim()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use multirag_agent::is_low_information;

    #[test]
    fn test_parse_body() {
        let structured = parse_body(r#"{"generated_cypher": "MATCH", "retrieved_result": []}"#);
        assert!(matches!(structured, Reference::Structured(_)));
        assert!(is_low_information(&structured));

        assert_eq!(parse_body("\"No information retrieved\""), Reference::text("No information retrieved"));
        assert_eq!(parse_body("plain text answer\n"), Reference::text("plain text answer"));
    }

    #[test]
    fn test_name_and_scope_from_config() {
        let worker = HttpWorker::new(HttpWorkerConfig {
            name: "kg".into(),
            url: "http://localhost:1/query".into(),
            scope: "Knowledge-graph lookups".into(),
            timeout_secs: 5,
            headers: Default::default(),
        })
        .unwrap();
        assert_eq!(worker.name(), "kg");
        assert_eq!(worker.scope(), "Knowledge-graph lookups");
        assert_eq!(worker.timeout_secs(), 5);
    }

    #[tokio::test]
    async fn test_unreachable_service_is_worker_error() {
        let worker = HttpWorker::new(HttpWorkerConfig {
            name: "kg".into(),
            url: "http://127.0.0.1:1/query".into(),
            scope: "x".into(),
            timeout_secs: 2,
            headers: Default::default(),
        })
        .unwrap();
        let err = worker.retrieve("q".into()).await.unwrap_err();
        assert!(matches!(err, RagError::WorkerFailed { ref worker, .. } if worker == "kg"));
    }
}
