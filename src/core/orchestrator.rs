// src/core/orchestrator.rs

//! Sequential execution of a batch of modules against one target.
//!
//! Modules run one at a time, in the order they were requested, and every
//! step is reported as a [`RunEvent`] on an unbounded channel so the receiver
//! (UI, logger, session builder) never stalls the run and the run never
//! stalls the receiver.
//!
//! Cancellation is cooperative: [`CancelHandle::cancel`] only raises a flag
//! that is checked between modules. A module already in flight keeps running
//! until it returns on its own, its outcome is still reported, and then no
//! further module is started. A module that never returns stalls the batch;
//! modules are responsible for bounding their own network calls.

use crate::core::models::ResultTree;
use crate::core::module::{ModuleContext, ModuleError, ReconModule};
use crate::core::target::Target;
use std::any::Any;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use thiserror::Error;
use tokio::sync::mpsc;
use tokio::task::{JoinError, JoinHandle};
use tracing::{debug, error, info, warn};

/// One notification in the ordered stream produced by a run.
#[derive(Debug, Clone, PartialEq)]
pub enum RunEvent {
    Started { module: &'static str },
    Succeeded { module: &'static str, result: ResultTree },
    Failed { module: &'static str, error: String },
    Cancelled,
    Finished,
}

impl RunEvent {
    pub fn module(&self) -> Option<&'static str> {
        match self {
            RunEvent::Started { module }
            | RunEvent::Succeeded { module, .. }
            | RunEvent::Failed { module, .. } => Some(module),
            RunEvent::Cancelled | RunEvent::Finished => None,
        }
    }

    /// `Cancelled` and `Finished` close the stream.
    pub fn is_terminal(&self) -> bool {
        matches!(self, RunEvent::Cancelled | RunEvent::Finished)
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum RunState {
    #[default]
    Idle,
    Running,
    Completed,
    Cancelled,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum OrchestratorError {
    #[error("orchestrator is not idle (state: {0:?}); reset it before starting a new run")]
    NotIdle(RunState),
}

/// Everything a single run needs. Consumed by [`Orchestrator::run`].
pub struct RunRequest {
    pub target: Target,
    pub modules: Vec<Arc<dyn ReconModule>>,
    pub context: ModuleContext,
}

impl RunRequest {
    pub fn new(target: Target, modules: Vec<Arc<dyn ReconModule>>, context: ModuleContext) -> Self {
        Self { target, modules, context }
    }
}

/// Shared, set-once cancellation flag.
#[derive(Debug, Clone, Default)]
pub struct CancelHandle(Arc<AtomicBool>);

impl CancelHandle {
    pub fn cancel(&self) {
        if !self.0.swap(true, Ordering::SeqCst) {
            info!("Cancellation requested; the current module will finish first.");
        }
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// A run executing on its own tokio task.
pub struct RunHandle {
    pub cancel: CancelHandle,
    pub join: JoinHandle<Result<RunState, OrchestratorError>>,
}

#[derive(Debug, Default)]
pub struct Orchestrator {
    state: RunState,
    cancel: CancelHandle,
}

impl Orchestrator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn state(&self) -> RunState {
        self.state
    }

    pub fn cancel_handle(&self) -> CancelHandle {
        self.cancel.clone()
    }

    /// Returns to `Idle` with a fresh cancellation flag; handles obtained
    /// earlier no longer affect future runs.
    pub fn reset(&mut self) {
        self.state = RunState::Idle;
        self.cancel = CancelHandle::default();
    }

    /// Runs the request to completion or cancellation, emitting events in order.
    pub async fn run(
        &mut self,
        request: RunRequest,
        events: &mpsc::UnboundedSender<RunEvent>,
    ) -> Result<RunState, OrchestratorError> {
        if self.state != RunState::Idle {
            return Err(OrchestratorError::NotIdle(self.state));
        }
        self.state = RunState::Running;

        let RunRequest { target, modules, context } = request;
        let context = Arc::new(context);
        info!(target = %target, modules = modules.len(), "Analysis started.");

        for module in modules {
            if self.cancel.is_cancelled() {
                return Ok(self.finish_cancelled(events));
            }

            let name = module.name();
            emit(events, RunEvent::Started { module: name });
            info!(module = name, "Running module.");

            match invoke(module, target.clone(), Arc::clone(&context)).await {
                Ok(result) => {
                    info!(module = name, keys = result.len(), "Module completed.");
                    emit(events, RunEvent::Succeeded { module: name, result });
                }
                Err(e) => {
                    error!(module = name, error = %e, "Module failed.");
                    emit(events, RunEvent::Failed { module: name, error: e.to_string() });
                }
            }
        }

        if self.cancel.is_cancelled() {
            return Ok(self.finish_cancelled(events));
        }
        self.state = RunState::Completed;
        info!(target = %target, "Analysis completed.");
        emit(events, RunEvent::Finished);
        Ok(self.state)
    }

    /// Moves the orchestrator onto a dedicated task and returns the event stream.
    pub fn spawn(mut self, request: RunRequest) -> (RunHandle, mpsc::UnboundedReceiver<RunEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let cancel = self.cancel_handle();
        let join = tokio::spawn(async move { self.run(request, &tx).await });
        (RunHandle { cancel, join }, rx)
    }

    fn finish_cancelled(&mut self, events: &mpsc::UnboundedSender<RunEvent>) -> RunState {
        self.state = RunState::Cancelled;
        info!("Analysis terminated by user.");
        emit(events, RunEvent::Cancelled);
        self.state
    }
}

fn emit(events: &mpsc::UnboundedSender<RunEvent>, event: RunEvent) {
    if events.send(event).is_err() {
        debug!("Run event receiver dropped; continuing without observer.");
    }
}

/// Runs one module on its own task so that a panic is contained, and folds
/// the three failure styles into `Err(ModuleError)`.
async fn invoke(
    module: Arc<dyn ReconModule>,
    target: Target,
    context: Arc<ModuleContext>,
) -> Result<ResultTree, ModuleError> {
    let handle = tokio::spawn(async move { module.run(&target, &context).await });
    match handle.await {
        Ok(Ok(tree)) => match tree.error_message() {
            Some(message) => Err(ModuleError::Reported(message.to_string())),
            None => Ok(tree),
        },
        Ok(Err(e)) => Err(e),
        Err(join_error) => Err(ModuleError::Panicked(join_error_message(join_error))),
    }
}

fn join_error_message(join_error: JoinError) -> String {
    if join_error.is_cancelled() {
        warn!("Module task was aborted before completing.");
        return "module task was aborted".to_string();
    }
    let payload: Box<dyn Any + Send> = join_error.into_panic();
    if let Some(message) = payload.downcast_ref::<&str>() {
        message.to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic payload".to_string()
    }
}
