use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::info;

use multirag_core::error::Result;
use multirag_core::types::{Reference, TranscriptEntry};

use crate::classifier::{ClassifierOutcome, QueryClassifier, QueryKind};
use crate::graph::{GraphExecutor, Step, StepRecord};
use crate::oracle::Oracle;
use crate::roster::{Roster, ROUTER_STEP};
use crate::router::{Router, RouterSettings};
use crate::state::KnowledgeState;
use crate::worker_node::WorkerStep;

/// Everything a run produced, for reporting.
#[derive(Debug, Clone, Serialize)]
pub struct RunReport {
    pub run_id: String,
    pub started_at: DateTime<Utc>,
    pub question: String,
    pub kind: QueryKind,
    pub classification: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sub_questions_raw: Option<String>,
    pub references: BTreeMap<String, Reference>,
    pub completed_agents: Vec<String>,
    pub excluded_agents: Vec<String>,
    pub transcript: Vec<TranscriptEntry>,
    /// Orchestration steps dispatched.
    pub steps: usize,
    pub elapsed_ms: u64,
}

/// Classifier graph followed by the router/worker graph, for one roster.
pub struct Pipeline {
    oracle: Arc<dyn Oracle>,
    roster: Arc<Roster>,
    settings: RouterSettings,
    classifier: QueryClassifier,
}

impl Pipeline {
    pub fn new(oracle: Arc<dyn Oracle>, roster: Roster, settings: RouterSettings) -> Result<Self> {
        let classifier = QueryClassifier::new(oracle.clone())?;
        Ok(Self {
            oracle,
            roster: Arc::new(roster),
            settings,
            classifier,
        })
    }

    pub fn roster(&self) -> &Roster {
        &self.roster
    }

    pub fn classifier(&self) -> &QueryClassifier {
        &self.classifier
    }

    /// Orchestration graph: the router plus one step per worker.
    fn orchestration_graph(&self, max_agents: usize) -> Result<GraphExecutor<KnowledgeState>> {
        let settings = RouterSettings {
            max_agents,
            ..self.settings.clone()
        };
        let mut steps: Vec<Box<dyn Step<KnowledgeState>>> = vec![Box::new(Router::new(
            self.oracle.clone(),
            self.roster.clone(),
            settings,
        ))];
        for worker in self.roster.workers() {
            steps.push(Box::new(WorkerStep::new(worker.clone(), ROUTER_STEP)));
        }
        GraphExecutor::new(steps, ROUTER_STEP)
    }

    /// Answer a question: worker name → retrieved result.
    pub async fn run(
        &self,
        question: &str,
        max_agents: usize,
        recursion_limit: usize,
    ) -> Result<BTreeMap<String, Reference>> {
        Ok(self
            .run_report(question, max_agents, recursion_limit)
            .await?
            .references)
    }

    pub async fn run_report(
        &self,
        question: &str,
        max_agents: usize,
        recursion_limit: usize,
    ) -> Result<RunReport> {
        self.run_observed(question, max_agents, recursion_limit, |_, _| {})
            .await
    }

    /// Like `run_report`, calling `observe` at every orchestration step boundary.
    pub async fn run_observed<F>(
        &self,
        question: &str,
        max_agents: usize,
        recursion_limit: usize,
        observe: F,
    ) -> Result<RunReport>
    where
        F: FnMut(&StepRecord, &KnowledgeState) + Send,
    {
        let run_id = uuid::Uuid::new_v4().to_string();
        let started_at = Utc::now();
        info!(run_id = %run_id, max_agents, recursion_limit, "Starting run");

        let ClassifierOutcome {
            kind,
            classification,
            sub_questions_raw,
            transcript,
        } = self.classifier.classify(question, recursion_limit).await?;

        let graph = self.orchestration_graph(max_agents)?;
        let result = graph
            .execute_observed(
                KnowledgeState::from_transcript(transcript),
                recursion_limit,
                observe,
            )
            .await?;

        let state = result.state;
        info!(
            run_id = %run_id,
            completed = ?state.completed_agents,
            excluded = ?state.excluded_agents,
            steps = result.steps.len(),
            "Run complete"
        );

        Ok(RunReport {
            run_id,
            started_at,
            question: question.to_string(),
            kind,
            classification,
            sub_questions_raw,
            references: state.references,
            completed_agents: state.completed_agents,
            excluded_agents: state.excluded_agents.into_iter().collect(),
            transcript: state.transcript,
            steps: result.steps.len(),
            elapsed_ms: (Utc::now() - started_at).num_milliseconds().max(0) as u64,
        })
    }
}
