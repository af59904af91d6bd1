pub mod classifier;
pub mod graph;
pub mod oracle;
pub mod pipeline;
pub mod quality;
pub mod roster;
pub mod router;
pub mod state;
pub mod worker_node;

pub use classifier::{parse_sub_questions, ClassifierOutcome, QueryClassifier, QueryKind};
pub use graph::{ExecutionResult, GraphExecutor, GraphState, Step, StepRecord, END};
pub use oracle::{collect_text, LlmOracle, Oracle};
pub use pipeline::{Pipeline, RunReport};
pub use quality::{is_low_information, NO_INFORMATION};
pub use roster::{Roster, FINISH};
pub use router::{Router, RouterSettings};
pub use state::{KnowledgeDelta, KnowledgeState};
pub use worker_node::WorkerStep;
