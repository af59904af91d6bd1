use std::sync::Arc;
use std::time::Duration;

use multirag_agent::{
    KnowledgeState, LlmOracle, Pipeline, QueryKind, Roster, RouterSettings, StepRecord,
    NO_INFORMATION,
};
use multirag_core::config::ModelConfig;
use multirag_core::error::RagError;
use multirag_core::types::Reference;
use multirag_test_utils::{
    empty_graph_result, FailingWorker, PanickingWorker, ScriptedLlm, SlowWorker, StaticWorker,
};

fn pipeline(llm: Arc<ScriptedLlm>, roster: Roster, settings: RouterSettings) -> Pipeline {
    let oracle = Arc::new(LlmOracle::new(llm, ModelConfig::new("openai", "test-model")));
    Pipeline::new(oracle, roster, settings).expect("build pipeline")
}

fn roster(workers: Vec<Arc<dyn multirag_core::traits::Worker>>) -> Roster {
    let mut roster = Roster::new();
    for w in workers {
        roster.register(w).expect("register worker");
    }
    roster
}

/// Checks the state invariants at one step boundary.
fn check_invariants(max_agents: usize, state: &KnowledgeState) {
    assert!(
        state.completed_agents.len() <= max_agents,
        "budget exceeded: {:?}",
        state.completed_agents
    );
    for name in &state.completed_agents {
        assert!(!state.is_excluded(name), "{} both completed and excluded", name);
        assert!(state.references.contains_key(name));
    }
    assert_eq!(state.references.len(), state.completed_agents.len());
}

#[tokio::test]
async fn test_two_workers_then_budget() {
    let llm = Arc::new(ScriptedLlm::new(vec![
        "single-step",
        "{\"next\": \"wiki\"}",
        "{\"next\": \"llmself\"}",
    ]));
    let wiki = Arc::new(StaticWorker::new("wiki", "Diabetes is a metabolic disease."));
    let llmself = Arc::new(StaticWorker::new("llmself", "Diabetes means high blood sugar."));
    let pipeline = pipeline(
        llm.clone(),
        roster(vec![wiki.clone(), llmself.clone()]),
        RouterSettings::new(2).with_fallback("llmself"),
    );

    let mut boundaries: Vec<(StepRecord, usize)> = Vec::new();
    let report = pipeline
        .run_observed("What is diabetes?", 2, 100, |record, state| {
            check_invariants(2, state);
            boundaries.push((record.clone(), state.completed_agents.len()));
        })
        .await
        .unwrap();

    assert_eq!(report.kind, QueryKind::SingleStep);
    assert_eq!(report.completed_agents, vec!["wiki", "llmself"]);
    assert_eq!(report.references.len(), 2);
    assert!(report.excluded_agents.is_empty());
    // supervisor, wiki, supervisor, llmself, supervisor
    assert_eq!(report.steps, 5);
    assert_eq!(boundaries.len(), 5);
    assert_eq!(wiki.questions(), vec!["What is diabetes?"]);
    assert_eq!(llmself.call_count(), 1);
    // Classifier + two selections; the budget stop needs no oracle call.
    assert_eq!(llm.calls().len(), 3);
    assert_eq!(llm.remaining(), 0);
}

#[tokio::test]
async fn test_low_information_is_substituted_without_oracle() {
    let llm = Arc::new(ScriptedLlm::new(vec![
        "single-step",
        "{\"next\": \"ds\"}",
        "{\"next\": \"wiki\"}",
    ]));
    let ds = Arc::new(StaticWorker::new("ds", NO_INFORMATION));
    let wiki = Arc::new(StaticWorker::new("wiki", "Gout is inflammatory arthritis."));
    let llmself = Arc::new(StaticWorker::new("llmself", "Gout is caused by uric acid."));
    let pipeline = pipeline(
        llm.clone(),
        roster(vec![ds.clone(), wiki.clone(), llmself.clone()]),
        RouterSettings::new(2).with_fallback("llmself"),
    );

    let report = pipeline
        .run_observed("What causes gout?", 2, 100, |_, state| check_invariants(2, state))
        .await
        .unwrap();

    // ds -> substituted by llmself (no oracle) -> wiki chosen -> budget.
    assert_eq!(report.completed_agents, vec!["llmself", "wiki"]);
    assert_eq!(report.excluded_agents, vec!["ds"]);
    assert!(!report.references.contains_key("ds"));
    assert_eq!(ds.call_count(), 1);
    assert_eq!(llm.calls().len(), 3);
    assert!(report
        .transcript
        .iter()
        .any(|e| e.has_tag("supervisor") && e.text.contains("'ds'")));
}

#[tokio::test]
async fn test_excluded_worker_is_never_reentered() {
    // After substitution the oracle tries to pick the excluded worker again.
    let llm = Arc::new(ScriptedLlm::new(vec![
        "single-step",
        "{\"next\": \"kg\"}",
        "{\"next\": \"kg\"}",
    ]));
    let kg = Arc::new(StaticWorker::new("kg", Reference::Structured(empty_graph_result())));
    let llmself = Arc::new(StaticWorker::new("llmself", "answer"));
    let wiki = Arc::new(StaticWorker::new("wiki", "Influenza overview"));
    let pipeline = pipeline(
        llm,
        roster(vec![kg.clone(), llmself.clone(), wiki.clone()]),
        RouterSettings::new(3).with_fallback("llmself"),
    );

    let report = pipeline.run_report("Symptoms of flu?", 3, 100).await.unwrap();

    assert_eq!(kg.call_count(), 1);
    assert_eq!(wiki.call_count(), 0);
    assert_eq!(report.completed_agents, vec!["llmself"]);
    assert_eq!(report.excluded_agents, vec!["kg"]);
}

#[tokio::test]
async fn test_invalid_oracle_choice_terminates() {
    let llm = Arc::new(ScriptedLlm::new(vec!["single-step", "{\"next\": \"pubmed\"}"]));
    let wiki = Arc::new(StaticWorker::new("wiki", "x"));
    let pipeline = pipeline(llm, roster(vec![wiki.clone()]), RouterSettings::new(2));

    let references = pipeline.run("What is asthma?", 2, 100).await.unwrap();
    assert!(references.is_empty());
    assert_eq!(wiki.call_count(), 0);
}

#[tokio::test]
async fn test_failing_worker_triggers_fallback() {
    let llm = Arc::new(ScriptedLlm::new(vec!["single-step", "{\"next\": \"kg\"}"]));
    let llmself = Arc::new(StaticWorker::new("llmself", "internal answer"));
    let pipeline = pipeline(
        llm,
        roster(vec![
            Arc::new(FailingWorker::new("kg", "connection refused")),
            llmself.clone(),
        ]),
        RouterSettings::new(1).with_fallback("llmself"),
    );

    let references = pipeline.run("What is asthma?", 1, 100).await.unwrap();
    assert_eq!(references.len(), 1);
    assert_eq!(references["llmself"], Reference::text("internal answer"));
}

#[tokio::test]
async fn test_panicking_worker_triggers_fallback() {
    let llm = Arc::new(ScriptedLlm::new(vec!["single-step", "{\"next\": \"kg\"}"]));
    let llmself = Arc::new(StaticWorker::new("llmself", "internal answer"));
    let pipeline = pipeline(
        llm,
        roster(vec![
            Arc::new(PanickingWorker::new("kg", "driver bug in worker")),
            llmself.clone(),
        ]),
        RouterSettings::new(1).with_fallback("llmself"),
    );

    let report = pipeline
        .run_observed("What is asthma?", 1, 100, |_, state| check_invariants(1, state))
        .await
        .unwrap();
    assert_eq!(report.completed_agents, vec!["llmself"]);
    assert_eq!(report.excluded_agents, vec!["kg"]);
    assert_eq!(report.references["llmself"], Reference::text("internal answer"));
    assert_eq!(llmself.call_count(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_timed_out_worker_is_recorded_as_failure() {
    let llm = Arc::new(ScriptedLlm::new(vec!["single-step", "slow", "FINISH"]));
    let pipeline = pipeline(
        llm,
        roster(vec![Arc::new(
            SlowWorker::new("slow", Duration::from_secs(60)).with_timeout_secs(2),
        )]),
        RouterSettings::new(2),
    );

    let references = pipeline.run("q", 2, 100).await.unwrap();
    assert!(references["slow"].is_failed());
}

#[tokio::test]
async fn test_recursion_limit_exceeded() {
    let llm = Arc::new(ScriptedLlm::new(vec!["single-step", "wiki", "llmself"]));
    let pipeline = pipeline(
        llm,
        roster(vec![
            Arc::new(StaticWorker::new("wiki", "a")),
            Arc::new(StaticWorker::new("llmself", "b")),
        ]),
        RouterSettings::new(2),
    );

    // Five orchestration steps are needed; allow only three.
    let err = pipeline.run("q", 2, 3).await.unwrap_err();
    assert!(matches!(err, RagError::RecursionExceeded { limit: 3 }));
}

#[tokio::test]
async fn test_multi_step_question_is_decomposed_before_retrieval() {
    let llm = Arc::new(ScriptedLlm::new(vec![
        "multi-step",
        "1. What treats diabetes?\n2. What treats hypertension?",
        "FINISH",
    ]));
    let pipeline = pipeline(
        llm,
        roster(vec![Arc::new(StaticWorker::new("wiki", "a"))]),
        RouterSettings::new(2),
    );

    let report = pipeline
        .run_report("Compare diabetes and hypertension treatments", 2, 100)
        .await
        .unwrap();

    assert_eq!(report.kind, QueryKind::MultiStep);
    assert!(report.sub_questions_raw.unwrap().contains("2. What treats hypertension?"));
    assert!(report.references.is_empty());
    let json = serde_json::to_value(&report.references).unwrap();
    assert_eq!(json, serde_json::json!({}));
}

#[tokio::test]
async fn test_zero_budget_finishes_immediately() {
    let llm = Arc::new(ScriptedLlm::new(vec!["single-step"]));
    let wiki = Arc::new(StaticWorker::new("wiki", "a"));
    let pipeline = pipeline(llm.clone(), roster(vec![wiki.clone()]), RouterSettings::new(2));

    let report = pipeline.run_report("q", 0, 100).await.unwrap();
    assert_eq!(report.steps, 1);
    assert_eq!(wiki.call_count(), 0);
    assert_eq!(llm.calls().len(), 1);
}
