use std::collections::HashMap;
use std::time::Instant;

use futures::future::BoxFuture;
use tracing::{debug, info, warn};

use multirag_core::error::{RagError, Result};

/// Terminal sentinel: the step name that ends a run.
pub const END: &str = "__end__";

/// State threaded through a graph run.
///
/// Steps never mutate the state directly; they return a `Delta` and the
/// executor merges it between steps.
pub trait GraphState: Send + Sync {
    type Delta: Send;

    /// Apply one step's delta.
    fn merge(&mut self, delta: Self::Delta);

    /// The step to dispatch to next (`END` to stop).
    fn next(&self) -> &str;
}

/// A named step in a graph.
pub trait Step<S: GraphState>: Send + Sync {
    fn name(&self) -> &str;

    /// Run the step against the current state and return its delta.
    fn run<'a>(&'a self, state: &'a S) -> BoxFuture<'a, Result<S::Delta>>;
}

/// Timing record for a single dispatched step.
#[derive(Debug, Clone)]
pub struct StepRecord {
    /// Which step was executed.
    pub step: String,
    /// Execution time in milliseconds.
    pub elapsed_ms: u64,
}

/// Result of executing a graph to its terminal step.
#[derive(Debug, Clone)]
pub struct ExecutionResult<S> {
    /// The final merged state.
    pub state: S,
    /// Per-step records in execution order.
    pub steps: Vec<StepRecord>,
    /// Total execution time in milliseconds.
    pub total_elapsed_ms: u64,
}

/// Walks a graph of named steps, one at a time.
pub struct GraphExecutor<S: GraphState> {
    steps: HashMap<String, Box<dyn Step<S>>>,
    start: String,
}

impl<S: GraphState> std::fmt::Debug for GraphExecutor<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut names: Vec<&String> = self.steps.keys().collect();
        names.sort();
        f.debug_struct("GraphExecutor")
            .field("start", &self.start)
            .field("steps", &names)
            .finish()
    }
}

impl<S: GraphState> GraphExecutor<S> {
    /// Build a graph from its steps.
    ///
    /// Fails on duplicate step names, a step named `END`, or a start step that
    /// is not in the graph.
    pub fn new(steps: Vec<Box<dyn Step<S>>>, start: impl Into<String>) -> Result<Self> {
        let start = start.into();
        let mut map: HashMap<String, Box<dyn Step<S>>> = HashMap::new();
        for step in steps {
            let name = step.name().to_string();
            if name == END {
                return Err(RagError::InvalidGraph(format!(
                    "step name '{}' is reserved",
                    END
                )));
            }
            if map.insert(name.clone(), step).is_some() {
                return Err(RagError::InvalidGraph(format!(
                    "duplicate step name '{}'",
                    name
                )));
            }
        }
        if !map.contains_key(&start) {
            return Err(RagError::InvalidGraph(format!(
                "start step '{}' not found in graph",
                start
            )));
        }
        Ok(Self { steps: map, start })
    }

    pub fn start(&self) -> &str {
        &self.start
    }

    pub fn contains(&self, name: &str) -> bool {
        self.steps.contains_key(name)
    }

    /// Run the graph from the start step.
    ///
    /// At most `recursion_limit` steps are dispatched; needing more is
    /// `RagError::RecursionExceeded`.
    pub async fn execute(&self, initial: S, recursion_limit: usize) -> Result<ExecutionResult<S>> {
        self.execute_observed(initial, recursion_limit, |_, _| {}).await
    }

    /// Like `execute`, calling `observe` after every merge.
    pub async fn execute_observed<F>(
        &self,
        initial: S,
        recursion_limit: usize,
        mut observe: F,
    ) -> Result<ExecutionResult<S>>
    where
        F: FnMut(&StepRecord, &S) + Send,
    {
        let start = Instant::now();
        let mut state = initial;
        let mut records: Vec<StepRecord> = Vec::new();
        let mut current = self.start.clone();

        while current != END {
            if records.len() >= recursion_limit {
                warn!(
                    limit = recursion_limit,
                    pending_step = %current,
                    "Recursion limit reached, aborting graph run"
                );
                return Err(RagError::RecursionExceeded {
                    limit: recursion_limit,
                });
            }

            let step = self
                .steps
                .get(&current)
                .ok_or_else(|| RagError::UnknownStep(current.clone()))?;

            let step_start = Instant::now();
            let delta = step.run(&state).await?;
            state.merge(delta);

            let record = StepRecord {
                step: current.clone(),
                elapsed_ms: step_start.elapsed().as_millis() as u64,
            };
            debug!(
                step = %record.step,
                elapsed_ms = record.elapsed_ms,
                next = %state.next(),
                "Step complete"
            );
            observe(&record, &state);
            records.push(record);

            current = state.next().to_string();
        }

        let total_elapsed_ms = start.elapsed().as_millis() as u64;
        info!(steps = records.len(), total_elapsed_ms, "Graph run complete");

        Ok(ExecutionResult {
            state,
            steps: records,
            total_elapsed_ms,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Counter state: each step adds to `total` and names the next step.
    #[derive(Debug, Default)]
    struct Counter {
        total: u32,
        next: String,
    }

    struct Add {
        total: u32,
        next: String,
    }

    impl GraphState for Counter {
        type Delta = Add;

        fn merge(&mut self, delta: Add) {
            self.total += delta.total;
            self.next = delta.next;
        }

        fn next(&self) -> &str {
            &self.next
        }
    }

    /// Adds `amount`, then goes to `to` until the total reaches `stop_at`.
    struct AddStep {
        name: &'static str,
        amount: u32,
        to: &'static str,
        stop_at: u32,
    }

    impl Step<Counter> for AddStep {
        fn name(&self) -> &str {
            self.name
        }

        fn run<'a>(&'a self, state: &'a Counter) -> BoxFuture<'a, Result<Add>> {
            Box::pin(async move {
                let next = if state.total + self.amount >= self.stop_at {
                    END
                } else {
                    self.to
                };
                Ok(Add {
                    total: self.amount,
                    next: next.to_string(),
                })
            })
        }
    }

    fn step(name: &'static str, to: &'static str, stop_at: u32) -> Box<dyn Step<Counter>> {
        Box::new(AddStep {
            name,
            amount: 1,
            to,
            stop_at,
        })
    }

    #[tokio::test]
    async fn test_cycle_runs_until_end() {
        let graph = GraphExecutor::new(vec![step("a", "b", 4), step("b", "a", 4)], "a").unwrap();
        let result = graph.execute(Counter::default(), 10).await.unwrap();
        assert_eq!(result.state.total, 4);
        let names: Vec<_> = result.steps.iter().map(|r| r.step.as_str()).collect();
        assert_eq!(names, vec!["a", "b", "a", "b"]);
    }

    #[tokio::test]
    async fn test_limit_equal_to_needed_steps_succeeds() {
        let graph = GraphExecutor::new(vec![step("a", "a", 3)], "a").unwrap();
        let result = graph.execute(Counter::default(), 3).await.unwrap();
        assert_eq!(result.steps.len(), 3);
    }

    #[tokio::test]
    async fn test_recursion_exceeded() {
        let graph = GraphExecutor::new(vec![step("a", "a", 100)], "a").unwrap();
        let err = graph.execute(Counter::default(), 5).await.unwrap_err();
        assert!(matches!(err, RagError::RecursionExceeded { limit: 5 }));
    }

    #[tokio::test]
    async fn test_unknown_step() {
        let graph = GraphExecutor::new(vec![step("a", "missing", 100)], "a").unwrap();
        let err = graph.execute(Counter::default(), 5).await.unwrap_err();
        assert!(matches!(err, RagError::UnknownStep(ref s) if s == "missing"));
    }

    #[tokio::test]
    async fn test_observer_sees_every_boundary() {
        let graph = GraphExecutor::new(vec![step("a", "a", 3)], "a").unwrap();
        let mut seen = Vec::new();
        graph
            .execute_observed(Counter::default(), 10, |record, state| {
                seen.push((record.step.clone(), state.total));
            })
            .await
            .unwrap();
        assert_eq!(
            seen,
            vec![("a".to_string(), 1), ("a".to_string(), 2), ("a".to_string(), 3)]
        );
    }

    #[test]
    fn test_invalid_graphs() {
        let dup = GraphExecutor::new(vec![step("a", "a", 1), step("a", "a", 1)], "a");
        assert!(matches!(dup, Err(RagError::InvalidGraph(_))));

        let no_start = GraphExecutor::new(vec![step("a", "a", 1)], "b");
        assert!(matches!(no_start, Err(RagError::InvalidGraph(_))));

        let reserved = GraphExecutor::new(vec![step(END, "a", 1)], END);
        assert!(matches!(reserved, Err(RagError::InvalidGraph(_))));
    }
}
