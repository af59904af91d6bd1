//! Query Classifier: a two-step graph (`classify` → `decompose`).
//!
//! `classify` asks the oracle whether a question is single-step or
//! multi-step; multi-step questions go on to `decompose`, which asks for
//! exactly two narrow sub-questions as a numbered list.

use std::sync::Arc;

use futures::future::BoxFuture;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use multirag_core::error::Result;
use multirag_core::types::TranscriptEntry;

use crate::graph::{GraphExecutor, Step, END};
use crate::oracle::Oracle;
use crate::state::{ClassifierDelta, ClassifierState};

pub const CLASSIFY_STEP: &str = "classify";
pub const DECOMPOSE_STEP: &str = "decompose";

/// Transcript tags written by the classifier.
pub const PLANNER_TAG: &str = "planner";
pub const SINGLE_STEP_TAG: &str = "single_step";
pub const SUBQUERY_TAG: &str = "subquery";

const CLASSIFY_PROMPT: &str = r#"You are a query planning agent for a retrieval system.
Determine if the user's question is:

1. "single-step" - Direct factual questions
   e.g., "What is diabetes?", "What are symptoms of flu?", "Which drug treats malaria?"

2. "multi-step" - Complex questions needing multiple facts or reasoning
   e.g., "Compare treatment options for diabetes vs hypertension",
   "What's the best treatment for hypertension in a diabetic patient with renal impairment?"

Respond with either "single-step" or "multi-step"."#;

/// Whether a question needs one retrieval pass or several.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum QueryKind {
    SingleStep,
    MultiStep,
}

impl QueryKind {
    /// Decide from free oracle text: "single-step" anywhere (any case) wins,
    /// everything else is multi-step.
    pub fn from_response(text: &str) -> Self {
        if text.to_lowercase().contains("single-step") {
            Self::SingleStep
        } else {
            Self::MultiStep
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::SingleStep => "single-step",
            Self::MultiStep => "multi-step",
        }
    }
}

impl std::fmt::Display for QueryKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// What the classifier graph produced for one question.
#[derive(Debug, Clone, Serialize)]
pub struct ClassifierOutcome {
    pub kind: QueryKind,
    /// The oracle's verbatim classification (or the error text).
    pub classification: String,
    /// The oracle's raw numbered list, when the question was decomposed.
    pub sub_questions_raw: Option<String>,
    pub transcript: Vec<TranscriptEntry>,
}

impl ClassifierOutcome {
    fn from_state(state: ClassifierState) -> Self {
        let kind = state.kind.unwrap_or(QueryKind::SingleStep);
        let classification = state.tagged(PLANNER_TAG).unwrap_or_default().to_string();
        let sub_questions_raw = state.tagged(SUBQUERY_TAG).map(str::to_string);
        Self {
            kind,
            classification,
            sub_questions_raw,
            transcript: state.transcript,
        }
    }
}

struct ClassifyStep {
    oracle: Arc<dyn Oracle>,
}

impl Step<ClassifierState> for ClassifyStep {
    fn name(&self) -> &str {
        CLASSIFY_STEP
    }

    fn run<'a>(&'a self, state: &'a ClassifierState) -> BoxFuture<'a, Result<ClassifierDelta>> {
        Box::pin(async move {
            let question = state.latest_question();

            let (classification, kind) =
                match self.oracle.complete(CLASSIFY_PROMPT.to_string(), question.clone()).await {
                    Ok(text) => {
                        let kind = QueryKind::from_response(&text);
                        (text, kind)
                    }
                    Err(e) => {
                        warn!(error = %e, "Classification failed, treating as single-step");
                        (format!("classification failed: {}", e), QueryKind::SingleStep)
                    }
                };
            info!(kind = %kind, "Query classified");

            let delta = ClassifierDelta::goto(match kind {
                QueryKind::SingleStep => END,
                QueryKind::MultiStep => DECOMPOSE_STEP,
            })
            .with_kind(kind)
            .with_entry(TranscriptEntry::tagged(PLANNER_TAG, classification));

            Ok(match kind {
                QueryKind::SingleStep => {
                    delta.with_entry(TranscriptEntry::tagged(SINGLE_STEP_TAG, question))
                }
                QueryKind::MultiStep => delta,
            })
        })
    }
}

struct DecomposeStep {
    oracle: Arc<dyn Oracle>,
}

fn decompose_prompt(question: &str) -> String {
    format!(
        "Original query: {}\n\n\
         Break the query into exactly two sub-queries.\n\
         Each sub-query should:\n\
         Be SIMPLE and SPECIFIC;\n\
         Focus on a different, narrow aspect of the original query;\n\
         Avoid long or reasoning-based formulations.\n\n\
         Format your response as:\n\
         1. [sub-query 1]\n\
         2. [sub-query 2]",
        question
    )
}

impl Step<ClassifierState> for DecomposeStep {
    fn name(&self) -> &str {
        DECOMPOSE_STEP
    }

    fn run<'a>(&'a self, state: &'a ClassifierState) -> BoxFuture<'a, Result<ClassifierDelta>> {
        Box::pin(async move {
            let question = state.first_question();
            let delta = ClassifierDelta::goto(END);

            match self
                .oracle
                .complete(String::new(), decompose_prompt(&question))
                .await
            {
                Ok(raw) => Ok(delta.with_entry(TranscriptEntry::tagged(SUBQUERY_TAG, raw))),
                Err(e) => {
                    warn!(error = %e, "Decomposition failed, no sub-questions recorded");
                    Ok(delta)
                }
            }
        })
    }
}

/// Runs the classifier graph for one question.
pub struct QueryClassifier {
    graph: GraphExecutor<ClassifierState>,
}

impl QueryClassifier {
    pub fn new(oracle: Arc<dyn Oracle>) -> Result<Self> {
        let steps: Vec<Box<dyn Step<ClassifierState>>> = vec![
            Box::new(ClassifyStep {
                oracle: oracle.clone(),
            }),
            Box::new(DecomposeStep { oracle }),
        ];
        Ok(Self {
            graph: GraphExecutor::new(steps, CLASSIFY_STEP)?,
        })
    }

    pub async fn classify(&self, question: &str, recursion_limit: usize) -> Result<ClassifierOutcome> {
        let result = self
            .graph
            .execute(ClassifierState::new(question), recursion_limit)
            .await?;
        Ok(ClassifierOutcome::from_state(result.state))
    }
}

/// Split a decomposition reply into its numbered items.
///
/// The reply is expected to hold exactly two items (`1.` and `2.`); any
/// further numbered items are returned too. `1)` delimiters are accepted.
pub fn parse_sub_questions(raw: &str) -> Vec<String> {
    let Ok(item) = regex::Regex::new(r"^\s*\d+\s*[.)]\s*(.+?)\s*$") else {
        return Vec::new();
    };
    raw.lines()
        .filter_map(|line| item.captures(line))
        .filter_map(|c| c.get(1).map(|m| m.as_str().to_string()))
        .filter(|s| !s.is_empty())
        .collect()
}
