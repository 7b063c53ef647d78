use async_trait::async_trait;
use std::sync::Arc;
use tokio::sync::{mpsc, Notify};
use vanguard_recon::core::models::ResultTree;
use vanguard_recon::core::module::{ModuleContext, ModuleDescriptor, ModuleError, ReconModule};
use vanguard_recon::core::orchestrator::{Orchestrator, OrchestratorError, RunEvent, RunRequest, RunState};
use vanguard_recon::core::target::Target;

enum Outcome {
    Tree,
    Fail(&'static str),
    ErrorKey(&'static str),
    Panic(&'static str),
}

struct Scripted {
    descriptor: ModuleDescriptor,
    outcome: Outcome,
}

impl Scripted {
    fn new(name: &'static str, outcome: Outcome) -> Arc<dyn ReconModule> {
        Arc::new(Self { descriptor: ModuleDescriptor::new(name, "scripted test module"), outcome })
    }
}

#[async_trait]
impl ReconModule for Scripted {
    fn descriptor(&self) -> &ModuleDescriptor {
        &self.descriptor
    }

    async fn run(&self, target: &Target, _ctx: &ModuleContext) -> Result<ResultTree, ModuleError> {
        match self.outcome {
            Outcome::Tree => Ok(ResultTree::new().with("Target", target.as_str())),
            Outcome::Fail(msg) => Err(ModuleError::Failed(msg.to_string())),
            Outcome::ErrorKey(msg) => Ok(ResultTree::error(msg)),
            Outcome::Panic(msg) => panic!("{}", msg),
        }
    }
}

/// Signals when it starts, then blocks until released.
struct Gate {
    descriptor: ModuleDescriptor,
    entered: Arc<Notify>,
    release: Arc<Notify>,
}

#[async_trait]
impl ReconModule for Gate {
    fn descriptor(&self) -> &ModuleDescriptor {
        &self.descriptor
    }

    async fn run(&self, _target: &Target, _ctx: &ModuleContext) -> Result<ResultTree, ModuleError> {
        self.entered.notify_one();
        self.release.notified().await;
        Ok(ResultTree::new().with("Released", true))
    }
}

fn request(modules: Vec<Arc<dyn ReconModule>>) -> RunRequest {
    RunRequest::new(Target::parse("example.com").unwrap(), modules, ModuleContext::default())
}

fn label(event: &RunEvent) -> String {
    match event {
        RunEvent::Started { module } => format!("started:{}", module),
        RunEvent::Succeeded { module, .. } => format!("ok:{}", module),
        RunEvent::Failed { module, .. } => format!("failed:{}", module),
        RunEvent::Cancelled => "cancelled".to_string(),
        RunEvent::Finished => "finished".to_string(),
    }
}

async fn drain(mut rx: mpsc::UnboundedReceiver<RunEvent>) -> Vec<RunEvent> {
    let mut events = Vec::new();
    while let Some(event) = rx.recv().await {
        events.push(event);
    }
    events
}

#[tokio::test]
async fn every_module_is_started_then_resolved_in_order() {
    let modules = vec![
        Scripted::new("A", Outcome::Tree),
        Scripted::new("B", Outcome::Fail("nope")),
        Scripted::new("C", Outcome::Tree),
    ];
    let (handle, rx) = Orchestrator::new().spawn(request(modules));
    let events = drain(rx).await;

    let labels: Vec<String> = events.iter().map(label).collect();
    assert_eq!(
        labels,
        vec!["started:A", "ok:A", "started:B", "failed:B", "started:C", "ok:C", "finished"]
    );
    assert_eq!(handle.join.await.unwrap(), Ok(RunState::Completed));
}

#[tokio::test]
async fn failures_of_every_style_are_isolated() {
    let modules = vec![
        Scripted::new("Raises", Outcome::Fail("connection reset")),
        Scripted::new("Reports", Outcome::ErrorKey("API key rejected")),
        Scripted::new("Panics", Outcome::Panic("kaboom")),
        Scripted::new("Fine", Outcome::Tree),
    ];
    let (handle, rx) = Orchestrator::new().spawn(request(modules));
    let events = drain(rx).await;

    let failures: Vec<(&str, &str)> = events
        .iter()
        .filter_map(|e| match e {
            RunEvent::Failed { module, error } => Some((*module, error.as_str())),
            _ => None,
        })
        .collect();
    assert_eq!(failures.len(), 3);
    assert_eq!(failures[0], ("Raises", "connection reset"));
    assert_eq!(failures[1], ("Reports", "API key rejected"));
    assert_eq!(failures[2].0, "Panics");
    assert!(failures[2].1.contains("kaboom"), "{}", failures[2].1);

    let fine = events.iter().find_map(|e| match e {
        RunEvent::Succeeded { module: "Fine", result } => Some(result.clone()),
        _ => None,
    });
    assert_eq!(fine, Some(ResultTree::new().with("Target", "https://example.com/")));
    assert_eq!(events.last(), Some(&RunEvent::Finished));
    assert_eq!(handle.join.await.unwrap(), Ok(RunState::Completed));
}

#[tokio::test]
async fn cancellation_stops_at_the_next_module_boundary() {
    let entered = Arc::new(Notify::new());
    let release = Arc::new(Notify::new());
    let gate: Arc<dyn ReconModule> = Arc::new(Gate {
        descriptor: ModuleDescriptor::new("Slow", "blocks until released"),
        entered: Arc::clone(&entered),
        release: Arc::clone(&release),
    });
    let modules = vec![
        Scripted::new("First", Outcome::Tree),
        gate,
        Scripted::new("Never1", Outcome::Tree),
        Scripted::new("Never2", Outcome::Tree),
    ];

    let (handle, rx) = Orchestrator::new().spawn(request(modules));
    entered.notified().await;
    handle.cancel.cancel();
    release.notify_one();

    let labels: Vec<String> = drain(rx).await.iter().map(label).collect();
    assert_eq!(labels, vec!["started:First", "ok:First", "started:Slow", "ok:Slow", "cancelled"]);
    assert_eq!(handle.join.await.unwrap(), Ok(RunState::Cancelled));
}

#[tokio::test]
async fn cancelling_before_start_runs_nothing() {
    let orchestrator = Orchestrator::new();
    orchestrator.cancel_handle().cancel();
    let (handle, rx) = orchestrator.spawn(request(vec![Scripted::new("A", Outcome::Tree)]));

    assert_eq!(drain(rx).await, vec![RunEvent::Cancelled]);
    assert_eq!(handle.join.await.unwrap(), Ok(RunState::Cancelled));
}

#[tokio::test]
async fn finished_orchestrator_must_be_reset() {
    let mut orchestrator = Orchestrator::new();
    let (tx, rx) = mpsc::unbounded_channel();
    drop(rx);

    let state = orchestrator.run(request(vec![Scripted::new("A", Outcome::Tree)]), &tx).await;
    assert_eq!(state, Ok(RunState::Completed));

    let again = orchestrator.run(request(Vec::new()), &tx).await;
    assert_eq!(again, Err(OrchestratorError::NotIdle(RunState::Completed)));

    orchestrator.reset();
    assert_eq!(orchestrator.run(request(Vec::new()), &tx).await, Ok(RunState::Completed));
}
