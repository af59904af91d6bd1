//! Shared state records for the two graphs and their merge rules.
//!
//! | field               | merge        |
//! |---------------------|--------------|
//! | `transcript`        | append       |
//! | `original_question` | set-once     |
//! | `references`        | upsert       |
//! | `completed_agents`  | append-if-absent |
//! | substitutions       | remove from completed/references, add to excluded |
//! | `next`              | replace      |
//!
//! Substitutions are applied before completions within one delta.

use std::collections::{BTreeMap, BTreeSet};

use serde::Serialize;
use tracing::warn;

use multirag_core::types::{Reference, TranscriptEntry};

use crate::classifier::QueryKind;
use crate::graph::{GraphState, END};

/// Returned when a run has no question to work on.
pub const NO_QUESTION: &str = "No question found";

/// Orchestration state: one record per question.
#[derive(Debug, Clone, Serialize)]
pub struct KnowledgeState {
    pub transcript: Vec<TranscriptEntry>,
    pub original_question: Option<String>,
    pub references: BTreeMap<String, Reference>,
    /// Accepted workers in invocation order.
    pub completed_agents: Vec<String>,
    pub excluded_agents: BTreeSet<String>,
    pub next: String,
}

impl KnowledgeState {
    /// Fresh state for a question typed by the user.
    pub fn new(question: impl Into<String>) -> Self {
        Self::from_transcript(vec![TranscriptEntry::human(question)])
    }

    pub fn from_transcript(transcript: Vec<TranscriptEntry>) -> Self {
        Self {
            transcript,
            original_question: None,
            references: BTreeMap::new(),
            completed_agents: Vec::new(),
            excluded_agents: BTreeSet::new(),
            next: END.to_string(),
        }
    }

    /// The cached question, else the first human entry, else `NO_QUESTION`.
    pub fn question(&self) -> String {
        if let Some(q) = &self.original_question {
            return q.clone();
        }
        self.transcript
            .iter()
            .find(|e| e.is_user_authored())
            .or_else(|| self.transcript.iter().find(|e| e.is_human()))
            .map(|e| e.text.clone())
            .unwrap_or_else(|| NO_QUESTION.to_string())
    }

    pub fn is_completed(&self, name: &str) -> bool {
        self.completed_agents.iter().any(|a| a == name)
    }

    pub fn is_excluded(&self, name: &str) -> bool {
        self.excluded_agents.contains(name)
    }
}

/// A step's changes to `KnowledgeState`.
#[derive(Debug, Clone)]
pub struct KnowledgeDelta {
    pub transcript: Vec<TranscriptEntry>,
    pub original_question: Option<String>,
    /// Accepted results: upserted into `references`, appended to `completed_agents`.
    pub completions: Vec<(String, Reference)>,
    /// Workers disqualified for the rest of the run.
    pub substitutions: Vec<String>,
    pub next: String,
}

impl KnowledgeDelta {
    /// An otherwise empty delta that routes to `next`.
    pub fn goto(next: impl Into<String>) -> Self {
        Self {
            transcript: Vec::new(),
            original_question: None,
            completions: Vec::new(),
            substitutions: Vec::new(),
            next: next.into(),
        }
    }

    pub fn finish() -> Self {
        Self::goto(END)
    }

    pub fn with_entry(mut self, entry: TranscriptEntry) -> Self {
        self.transcript.push(entry);
        self
    }

    pub fn with_question(mut self, question: impl Into<String>) -> Self {
        self.original_question = Some(question.into());
        self
    }

    pub fn with_completion(mut self, name: impl Into<String>, reference: Reference) -> Self {
        self.completions.push((name.into(), reference));
        self
    }

    pub fn with_substitution(mut self, name: impl Into<String>) -> Self {
        self.substitutions.push(name.into());
        self
    }
}

impl GraphState for KnowledgeState {
    type Delta = KnowledgeDelta;

    fn merge(&mut self, delta: KnowledgeDelta) {
        for name in delta.substitutions {
            self.completed_agents.retain(|a| *a != name);
            self.references.remove(&name);
            self.excluded_agents.insert(name);
        }

        if self.original_question.is_none() {
            self.original_question = delta.original_question;
        }

        self.transcript.extend(delta.transcript);

        for (name, reference) in delta.completions {
            if self.excluded_agents.contains(&name) {
                warn!(worker = %name, "Ignoring result from excluded worker");
                continue;
            }
            if !self.is_completed(&name) {
                self.completed_agents.push(name.clone());
            }
            self.references.insert(name, reference);
        }

        self.next = delta.next;
    }

    fn next(&self) -> &str {
        &self.next
    }
}

/// Classifier state: the transcript plus the routing decision.
#[derive(Debug, Clone, Serialize)]
pub struct ClassifierState {
    pub transcript: Vec<TranscriptEntry>,
    pub kind: Option<QueryKind>,
    pub next: String,
}

impl ClassifierState {
    pub fn new(question: impl Into<String>) -> Self {
        Self {
            transcript: vec![TranscriptEntry::human(question)],
            kind: None,
            next: END.to_string(),
        }
    }

    /// Most recent user-authored entry, else the first human entry.
    pub fn latest_question(&self) -> String {
        self.transcript
            .iter()
            .rev()
            .find(|e| e.is_user_authored())
            .or_else(|| self.transcript.iter().find(|e| e.is_human()))
            .map(|e| e.text.clone())
            .unwrap_or_else(|| NO_QUESTION.to_string())
    }

    /// First user-authored entry, else the first human entry.
    pub fn first_question(&self) -> String {
        self.transcript
            .iter()
            .find(|e| e.is_user_authored())
            .or_else(|| self.transcript.iter().find(|e| e.is_human()))
            .map(|e| e.text.clone())
            .unwrap_or_else(|| NO_QUESTION.to_string())
    }

    /// Text of the last entry carrying `tag`.
    pub fn tagged(&self, tag: &str) -> Option<&str> {
        self.transcript
            .iter()
            .rev()
            .find(|e| e.has_tag(tag))
            .map(|e| e.text.as_str())
    }
}

#[derive(Debug, Clone)]
pub struct ClassifierDelta {
    pub transcript: Vec<TranscriptEntry>,
    pub kind: Option<QueryKind>,
    pub next: String,
}

impl ClassifierDelta {
    pub fn goto(next: impl Into<String>) -> Self {
        Self {
            transcript: Vec::new(),
            kind: None,
            next: next.into(),
        }
    }

    pub fn with_entry(mut self, entry: TranscriptEntry) -> Self {
        self.transcript.push(entry);
        self
    }

    pub fn with_kind(mut self, kind: QueryKind) -> Self {
        self.kind = Some(kind);
        self
    }
}

impl GraphState for ClassifierState {
    type Delta = ClassifierDelta;

    fn merge(&mut self, delta: ClassifierDelta) {
        self.transcript.extend(delta.transcript);
        if delta.kind.is_some() {
            self.kind = delta.kind;
        }
        self.next = delta.next;
    }

    fn next(&self) -> &str {
        &self.next
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_question_prefers_cache_then_first_human() {
        let mut state = KnowledgeState::from_transcript(vec![
            TranscriptEntry::tagged("planner", "single-step"),
            TranscriptEntry::human("what is gout?"),
        ]);
        assert_eq!(state.question(), "what is gout?");

        state.merge(KnowledgeDelta::finish().with_question("cached"));
        assert_eq!(state.question(), "cached");

        let empty = KnowledgeState::from_transcript(vec![]);
        assert_eq!(empty.question(), NO_QUESTION);
    }

    #[test]
    fn test_original_question_is_set_once() {
        let mut state = KnowledgeState::new("q");
        state.merge(KnowledgeDelta::finish().with_question("first"));
        state.merge(KnowledgeDelta::finish().with_question("second"));
        assert_eq!(state.original_question.as_deref(), Some("first"));
    }

    #[test]
    fn test_completion_upserts_without_duplicating() {
        let mut state = KnowledgeState::new("q");
        state.merge(KnowledgeDelta::goto("router").with_completion("wiki", Reference::text("a")));
        state.merge(KnowledgeDelta::goto("router").with_completion("wiki", Reference::text("b")));
        assert_eq!(state.completed_agents, vec!["wiki"]);
        assert_eq!(state.references["wiki"], Reference::text("b"));
        assert_eq!(state.next(), "router");
    }

    #[test]
    fn test_substitution_removes_then_excludes() {
        let mut state = KnowledgeState::new("q");
        state.merge(KnowledgeDelta::goto("router").with_completion("ds", Reference::text("x")));
        state.merge(KnowledgeDelta::goto("llmself").with_substitution("ds"));
        assert!(state.completed_agents.is_empty());
        assert!(state.references.is_empty());
        assert!(state.is_excluded("ds"));
        assert_eq!(state.next(), "llmself");
    }

    #[test]
    fn test_completion_for_excluded_worker_is_rejected() {
        let mut state = KnowledgeState::new("q");
        state.merge(KnowledgeDelta::goto("router").with_substitution("ds"));
        state.merge(KnowledgeDelta::goto("router").with_completion("ds", Reference::text("x")));
        assert!(!state.is_completed("ds"));
        assert!(!state.references.contains_key("ds"));
    }

    #[test]
    fn test_classifier_question_lookup() {
        let mut state = ClassifierState::new("first");
        state.merge(
            ClassifierDelta::goto(END)
                .with_entry(TranscriptEntry::tagged("planner", "multi-step"))
                .with_entry(TranscriptEntry::human("second")),
        );
        assert_eq!(state.latest_question(), "second");
        assert_eq!(state.first_question(), "first");
        assert_eq!(state.tagged("planner"), Some("multi-step"));

        let tagged_only = ClassifierState {
            transcript: vec![TranscriptEntry::tagged("subquery", "x")],
            kind: None,
            next: END.to_string(),
        };
        assert_eq!(tagged_only.latest_question(), "x");
    }
}
