//! Graph execution engine: cyclic step dispatch over a shared state.
//!
//! A graph is a set of named `Step`s plus a start step. Each step reads the
//! current state and returns a delta; the executor merges the delta and
//! dispatches to whatever step the merged state names as next, until the
//! terminal sentinel `END` or the recursion ceiling.
//!
//! The executor knows nothing about workers, oracles or budgets. Those live in
//! the steps (`classifier`, `router`, `worker_node`).

pub mod executor;

pub use executor::{ExecutionResult, GraphExecutor, GraphState, Step, StepRecord, END};
