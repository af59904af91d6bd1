//! Router (supervisor): picks the next worker under a fixed budget.
//!
//! Every entry is evaluated in this order:
//! 1. substitution of a low-information result by the fallback worker
//!    (no oracle call),
//! 2. budget: `completed >= max_agents` ends the run,
//! 3. exhaustion: no remaining workers ends the run,
//! 4. oracle selection among the remaining workers or `FINISH`.
//!
//! Any oracle answer outside the offered options ends the run.

use std::fmt::Write as _;
use std::sync::Arc;

use futures::future::BoxFuture;
use tracing::{info, warn};

use multirag_core::config::OrchestrationConfig;
use multirag_core::error::Result;
use multirag_core::types::TranscriptEntry;

use crate::graph::Step;
use crate::oracle::Oracle;
use crate::quality::find_substitution;
use crate::roster::{Roster, FINISH, ROUTER_STEP};
use crate::state::{KnowledgeDelta, KnowledgeState};

/// Transcript tag for entries written by the router.
pub const SUPERVISOR_TAG: &str = "supervisor";

/// Budget and routing settings for the router.
#[derive(Debug, Clone)]
pub struct RouterSettings {
    pub max_agents: usize,
    /// Fallback worker for substitution; `None` disables it.
    pub fallback: Option<String>,
    /// Priority hints rendered verbatim into the selection prompt.
    pub routing_hints: Vec<String>,
}

impl RouterSettings {
    pub fn new(max_agents: usize) -> Self {
        Self {
            max_agents,
            fallback: None,
            routing_hints: Vec::new(),
        }
    }

    pub fn with_fallback(mut self, fallback: impl Into<String>) -> Self {
        self.fallback = Some(fallback.into());
        self
    }

    pub fn from_config(config: &OrchestrationConfig) -> Self {
        Self {
            max_agents: config.max_agents,
            fallback: config.fallback().map(str::to_string),
            routing_hints: config.routing_hints.clone(),
        }
    }
}

pub struct Router {
    oracle: Arc<dyn Oracle>,
    roster: Arc<Roster>,
    settings: RouterSettings,
}

impl Router {
    pub fn new(oracle: Arc<dyn Oracle>, roster: Arc<Roster>, settings: RouterSettings) -> Self {
        Self {
            oracle,
            roster,
            settings,
        }
    }

    /// Roster workers neither completed nor excluded, in roster order.
    fn remaining<'a>(&'a self, state: &KnowledgeState) -> Vec<&'a str> {
        self.roster
            .names()
            .into_iter()
            .filter(|name| !state.is_completed(name) && !state.is_excluded(name))
            .collect()
    }

    fn selection_prompt(&self, state: &KnowledgeState, remaining: &[&str]) -> String {
        let max = self.settings.max_agents;
        let done = state.completed_agents.len();

        let mut prompt = format!(
            "You are a supervisor selecting the top {max} agents for reference retrieval. \
             Choose one agent at a time based on query relevance.\n\n\
             Agent options and specialties:\n"
        );
        for name in remaining {
            let _ = writeln!(prompt, "- {}: {}", name, self.roster.scope(name));
        }

        let _ = write!(
            prompt,
            "\nCompleted agents: {:?} (Target: {max} agents)\n\
             Available agents: {:?}\n\n\
             GOAL: Select the {max} MOST RELEVANT agents.\n\
             Progress: {done}/{max} done\n\n\
             Instructions:\n\
             1. If {max} agents are done, select {FINISH}\n\
             2. Choose the most relevant agent from remaining\n",
            state.completed_agents, remaining,
        );

        if self.settings.routing_hints.is_empty() {
            let _ = writeln!(prompt, "3. Pick the next best from: {:?}", remaining);
        } else {
            prompt.push_str("3. Prioritize by question type:\n");
            for hint in &self.settings.routing_hints {
                let _ = writeln!(prompt, "   - {}", hint);
            }
            let _ = writeln!(prompt, "4. Pick the next best from: {:?}", remaining);
        }

        let mut options = vec![FINISH];
        options.extend_from_slice(remaining);
        let _ = write!(
            prompt,
            "\nDO NOT select any agents not listed in 'Valid responses' below.\n\n\
             Valid responses: {:?}\n\
             Use {max} best agents, then {FINISH}.\n\n\
             Respond with ONLY valid JSON: {{\"next\": \"<one of the valid responses>\"}}",
            options,
        );
        prompt
    }
}

impl Step<KnowledgeState> for Router {
    fn name(&self) -> &str {
        ROUTER_STEP
    }

    fn run<'a>(&'a self, state: &'a KnowledgeState) -> BoxFuture<'a, Result<KnowledgeDelta>> {
        Box::pin(async move {
            let question = state.question();

            if let Some(fallback) = self.settings.fallback.as_deref() {
                if let Some(low) = find_substitution(state, fallback, self.roster.contains(fallback)) {
                    warn!(worker = %low, fallback = %fallback, "Replacing low-information result");
                    return Ok(KnowledgeDelta::goto(fallback)
                        .with_question(question)
                        .with_substitution(low)
                        .with_entry(TranscriptEntry::tagged(
                            SUPERVISOR_TAG,
                            format!("Replacing low-quality agent '{}' with fallback agent '{}'", low, fallback),
                        )));
                }
            }

            let done = state.completed_agents.len();
            if done >= self.settings.max_agents {
                info!(completed = done, max_agents = self.settings.max_agents, "Budget reached");
                return Ok(KnowledgeDelta::finish().with_question(question));
            }

            let remaining = self.remaining(state);
            if remaining.is_empty() {
                info!(completed = done, "No workers remaining");
                return Ok(KnowledgeDelta::finish().with_question(question));
            }

            let system = self.selection_prompt(state, &remaining);
            let user = format!("Question: {}\n\nSelect the most relevant agent:", question);

            let choice = match self.oracle.complete_field(system, user, "next").await {
                Ok(choice) => choice,
                Err(e) => {
                    warn!(error = %e, "Worker selection failed, finishing run");
                    return Ok(KnowledgeDelta::finish().with_question(question));
                }
            };

            if choice == FINISH {
                info!("Oracle chose to finish");
                return Ok(KnowledgeDelta::finish().with_question(question));
            }
            match remaining.iter().find(|name| **name == choice) {
                Some(name) => {
                    info!(worker = %name, ?remaining, "Dispatching worker");
                    Ok(KnowledgeDelta::goto(*name).with_question(question))
                }
                None => {
                    warn!(selected = %choice, ?remaining, "Invalid selection, finishing run");
                    Ok(KnowledgeDelta::finish().with_question(question))
                }
            }
        })
    }
}
