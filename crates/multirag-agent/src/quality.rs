//! Quality Gate: spots completed workers whose result carries no information.

use serde_json::Value;

use multirag_core::types::Reference;

use crate::state::KnowledgeState;

/// Text a worker returns when it found nothing.
pub const NO_INFORMATION: &str = "No information retrieved";

/// Fields marking a structured payload as a generated-query result.
const GENERATED_QUERY_FIELDS: &[&str] = &["generated_cypher", "generated_query"];
const RETRIEVED_RESULT_FIELD: &str = "retrieved_result";

/// True when a result should be replaced by the fallback worker.
///
/// Matches the `NO_INFORMATION` sentinel (trimmed, any ASCII case), a
/// generated-query payload whose retrieved result is missing or blank, and
/// recorded worker failures.
pub fn is_low_information(reference: &Reference) -> bool {
    match reference {
        Reference::Text(text) => text.trim().eq_ignore_ascii_case(NO_INFORMATION),
        Reference::Failed { .. } => true,
        Reference::Structured(value) => is_empty_generated_query(value),
    }
}

fn is_empty_generated_query(value: &Value) -> bool {
    let Some(obj) = value.as_object() else {
        return false;
    };
    if !GENERATED_QUERY_FIELDS.iter().any(|f| obj.contains_key(*f)) {
        return false;
    }
    match obj.get(RETRIEVED_RESULT_FIELD) {
        None | Some(Value::Null) => true,
        Some(Value::String(s)) => s.trim().is_empty(),
        Some(Value::Array(items)) => items.iter().all(is_blank),
        Some(Value::Object(map)) => map.is_empty(),
        Some(_) => false,
    }
}

fn is_blank(item: &Value) -> bool {
    match item {
        Value::Null => true,
        Value::String(s) => s.trim().is_empty(),
        other => other.to_string().trim().is_empty(),
    }
}

/// The first completed worker (in invocation order) with a low-information
/// result, if substitution applies.
///
/// Substitution applies only while `fallback` is in the roster and has not
/// completed yet; an excluded fallback is never re-entered.
pub fn find_substitution<'a>(
    state: &'a KnowledgeState,
    fallback: &str,
    roster_has_fallback: bool,
) -> Option<&'a str> {
    if !roster_has_fallback || state.is_completed(fallback) || state.is_excluded(fallback) {
        return None;
    }
    state
        .completed_agents
        .iter()
        .find(|name| {
            state
                .references
                .get(name.as_str())
                .is_some_and(is_low_information)
        })
        .map(String::as_str)
}
