use std::collections::{HashSet, VecDeque};
use std::sync::Arc;
use std::time::Duration;

use futures::future::BoxFuture;
use reqwest::StatusCode;
use tracing::{debug, info, warn};

use multirag_agent::{collect_text, NO_INFORMATION};
use multirag_core::config::{ModelConfig, WikiConfig};
use multirag_core::error::{RagError, Result};
use multirag_core::traits::{LlmClient, Worker};
use multirag_core::types::{ChatMessage, Reference};

pub const NAME: &str = "wiki";

const USER_AGENT: &str = concat!("multirag/", env!("CARGO_PKG_VERSION"));

/// Looks up the question's main entity on Wikipedia.
pub struct WikiWorker {
    llm: Arc<dyn LlmClient>,
    model: ModelConfig,
    http: reqwest::Client,
    config: WikiConfig,
}

impl WikiWorker {
    pub fn new(llm: Arc<dyn LlmClient>, model: ModelConfig, config: WikiConfig) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs.max(1)))
            .user_agent(USER_AGENT)
            .build()
            .map_err(|e| RagError::Config(format!("Failed to create HTTP client: {}", e)))?;
        Ok(Self {
            llm,
            model,
            http,
            config,
        })
    }

    fn failed(&self, message: impl Into<String>) -> RagError {
        RagError::WorkerFailed {
            worker: NAME.to_string(),
            message: message.into(),
        }
    }

    /// Ask the LLM for the core term of the question, as an article title.
    async fn extract_entity(&self, question: &str) -> Result<String> {
        let prompt = format!(
            "What is the main entity or concept in this query: '{}'? \
             Extract only the core term (e.g., 'hyponatremia', not 'causes of hyponatremia'). \
             Return only the entity name in one line.",
            question
        );
        let reply = collect_text(self.llm.as_ref(), &self.model, vec![ChatMessage::user(prompt)])
            .await
            .map_err(|e| self.failed(e.to_string()))?;
        Ok(article_title(&reply))
    }

    fn article_url(&self, title: &str) -> String {
        let encoded = urlencoding::encode(title);
        match &self.config.base_url {
            Some(template) => template.replace("{title}", &encoded),
            None => format!(
                "https://{}.wikipedia.org/wiki/{}",
                self.config.language, encoded
            ),
        }
    }

    /// Page HTML for one article, `None` when it does not exist.
    async fn fetch_page(&self, title: &str) -> Result<Option<String>> {
        let url = self.article_url(title);
        let resp = self
            .http
            .get(&url)
            .send()
            .await
            .map_err(|e| self.failed(format!("Request failed: {}", e)))?;

        let status = resp.status();
        if status == StatusCode::NOT_FOUND {
            debug!(url = %url, "No article");
            return Ok(None);
        }
        if !status.is_success() {
            return Err(self.failed(format!(
                "HTTP {} {}",
                status.as_u16(),
                status.canonical_reason().unwrap_or("Unknown")
            )));
        }

        resp.text()
            .await
            .map(Some)
            .map_err(|e| self.failed(format!("Failed to read response body: {}", e)))
    }

    /// Breadth-first over article links, starting at `start`, until
    /// `articles_limit` pages were fetched. Only the first fetch may fail
    /// the call; later failures are skipped.
    async fn crawl(&self, start: String) -> Result<String> {
        let limit = self.config.articles_limit.max(1);
        let mut pending = VecDeque::from([start]);
        let mut visited = HashSet::new();
        let mut texts = Vec::new();
        let mut fetched = 0;

        while let Some(title) = pending.pop_front() {
            if fetched >= limit {
                break;
            }
            if !visited.insert(title.clone()) {
                continue;
            }
            if fetched > 0 && self.config.crawl_interval_ms > 0 {
                tokio::time::sleep(Duration::from_millis(self.config.crawl_interval_ms)).await;
            }
            fetched += 1;
            debug!(article = %title, fetched, limit, "Crawling");

            let html = match self.fetch_page(&title).await {
                Ok(Some(html)) => html,
                Ok(None) => continue,
                Err(e) if fetched > 1 => {
                    warn!(article = %title, error = %e, "Skipping linked article");
                    continue;
                }
                Err(e) => return Err(e),
            };

            let text = extract_article_text(&html);
            if !text.is_empty() {
                texts.push(text);
            }
            if fetched < limit {
                for link in article_links(&html) {
                    if !visited.contains(&link) && !pending.contains(&link) {
                        pending.push_back(link);
                    }
                }
            }
        }

        Ok(texts.join("\n\n"))
    }
}

impl Worker for WikiWorker {
    fn name(&self) -> &str {
        NAME
    }

    fn scope(&self) -> &str {
        "For definitions and overviews."
    }

    fn retrieve(&self, question: String) -> BoxFuture<'_, Result<Reference>> {
        Box::pin(async move {
            let title = self.extract_entity(&question).await?;
            if title.is_empty() {
                return Ok(Reference::text(NO_INFORMATION));
            }
            info!(entity = %title, articles = self.config.articles_limit, "Fetching Wikipedia article");

            let text = self.crawl(title).await?;
            if text.is_empty() {
                return Ok(Reference::text(NO_INFORMATION));
            }
            Ok(Reference::text(truncate_chars(&text, self.config.max_chars)))
        })
    }

    fn timeout_secs(&self) -> u64 {
        self.config.timeout_secs
    }
}

/// First line of the reply, trimmed of quotes and punctuation, spaces as `_`.
fn article_title(reply: &str) -> String {
    reply
        .lines()
        .map(str::trim)
        .find(|l| !l.is_empty())
        .unwrap_or("")
        .trim_matches(|c: char| c == '"' || c == '\'' || c == '`' || c == '.')
        .trim()
        .replace(' ', "_")
}

/// Paragraph text of an article page, without markup, parenthesised asides
/// or `[n]` citation marks. Paragraphs are separated by blank lines.
pub(crate) fn extract_article_text(html: &str) -> String {
    let content = match html.find("id=\"mw-content-text\"") {
        Some(pos) => &html[pos..],
        None => html,
    };

    let (Ok(re_para), Ok(re_tags), Ok(re_parens), Ok(re_cites)) = (
        regex::Regex::new(r"(?is)<p[\s>].*?</p>"),
        regex::Regex::new(r"(?s)<[^>]+>"),
        regex::Regex::new(r"\(.+?\)"),
        regex::Regex::new(r"\[.+?\]"),
    ) else {
        return String::new();
    };

    let mut paragraphs = Vec::new();
    for para in re_para.find_iter(content) {
        let text = re_tags.replace_all(para.as_str(), "");
        let text = decode_entities(&text);
        let text = re_parens.replace_all(&text, "");
        let text = re_cites.replace_all(&text, "");
        let text = text.split_whitespace().collect::<Vec<_>>().join(" ");
        if !text.is_empty() {
            paragraphs.push(text);
        }
    }
    paragraphs.join("\n\n")
}

/// Article titles linked from the content section, in page order. Namespaced
/// pages (`File:`, `Help:`, ...) and fragments are skipped.
pub(crate) fn article_links(html: &str) -> Vec<String> {
    let content = match html.find("id=\"mw-content-text\"") {
        Some(pos) => &html[pos..],
        None => html,
    };
    let Ok(re_href) = regex::Regex::new(r##"href="/wiki/([^"#?]+)""##) else {
        return Vec::new();
    };

    let mut links: Vec<String> = Vec::new();
    for cap in re_href.captures_iter(content) {
        let raw = &cap[1];
        if raw.contains(':') {
            continue;
        }
        let Ok(title) = urlencoding::decode(raw) else {
            continue;
        };
        let title = title.into_owned();
        if !links.contains(&title) {
            links.push(title);
        }
    }
    links
}

fn decode_entities(text: &str) -> String {
    text.replace("&nbsp;", " ")
        .replace("&#160;", " ")
        .replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&#39;", "'")
        .replace("&amp;", "&")
}

fn truncate_chars(text: &str, max: usize) -> String {
    match text.char_indices().nth(max) {
        Some((idx, _)) => text[..idx].to_string(),
        None => text.to_string(),
    }
}
