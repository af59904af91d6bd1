use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;

use futures::future::BoxFuture;
use futures::FutureExt;
use tracing::{info, warn};

use multirag_core::error::{RagError, Result};
use multirag_core::traits::Worker;
use multirag_core::types::{Reference, TranscriptEntry};

use crate::graph::Step;
use crate::state::{KnowledgeDelta, KnowledgeState, NO_QUESTION};

/// Graph step wrapping one retrieval worker.
///
/// Always routes back to `return_to`. Worker errors, timeouts and panics
/// are recorded as `Reference::Failed` instead of aborting the run.
pub struct WorkerStep {
    worker: Arc<dyn Worker>,
    return_to: String,
}

impl WorkerStep {
    pub fn new(worker: Arc<dyn Worker>, return_to: impl Into<String>) -> Self {
        Self {
            worker,
            return_to: return_to.into(),
        }
    }

    async fn invoke(&self, question: String) -> Reference {
        let name = self.worker.name();
        let timeout_secs = self.worker.timeout_secs();
        // Building the future inside the async block also catches panics
        // raised before the worker's first await.
        let call =
            AssertUnwindSafe(async { self.worker.retrieve(question).await }).catch_unwind();

        let caught = if timeout_secs == 0 {
            Ok(call.await)
        } else {
            tokio::time::timeout(Duration::from_secs(timeout_secs), call).await
        };

        let outcome = match caught {
            Ok(Ok(result)) => result,
            Ok(Err(payload)) => Err(RagError::WorkerFailed {
                worker: name.to_string(),
                message: format!("worker panicked: {}", panic_message(payload.as_ref())),
            }),
            Err(_) => Err(RagError::WorkerTimeout {
                worker: name.to_string(),
                timeout_secs,
            }),
        };

        match outcome {
            Ok(reference) => reference,
            Err(e) => {
                warn!(worker = %name, error = %e, "Worker failed, recording failure");
                Reference::failed(e.to_string())
            }
        }
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> &str {
    if let Some(msg) = payload.downcast_ref::<&str>() {
        msg
    } else if let Some(msg) = payload.downcast_ref::<String>() {
        msg.as_str()
    } else {
        "unknown panic"
    }
}

impl Step<KnowledgeState> for WorkerStep {
    fn name(&self) -> &str {
        self.worker.name()
    }

    fn run<'a>(&'a self, state: &'a KnowledgeState) -> BoxFuture<'a, Result<KnowledgeDelta>> {
        Box::pin(async move {
            let name = self.worker.name();
            let question = state.question();

            let reference = self.invoke(question.clone()).await;
            info!(worker = %name, preview = %reference.preview(80), "Reference retrieved");

            let mut delta = KnowledgeDelta::goto(self.return_to.as_str())
                .with_completion(name, reference)
                .with_entry(TranscriptEntry::tagged(
                    name,
                    format!("{} reference retrieved", name),
                ));
            if question != NO_QUESTION {
                delta = delta.with_question(question);
            }
            Ok(delta)
        })
    }
}
