// src/app.rs

use chrono::Utc;
use ratatui::widgets::{ListState, ScrollbarState};
use std::path::Path;
use std::sync::Arc;
use tokio::sync::mpsc::error::TryRecvError;
use tokio::sync::mpsc::UnboundedReceiver;
use tracing::{info, warn};
use vanguard_recon::config::AppConfig;
use vanguard_recon::core::models::{ResultTree, ResultValue};
use vanguard_recon::core::module::{ModuleContext, ModuleDescriptor, ReconModule};
use vanguard_recon::core::orchestrator::{Orchestrator, RunEvent, RunHandle, RunRequest};
use vanguard_recon::core::registry::Registry;
use vanguard_recon::core::session::{Session, SessionBuilder, SessionListing, SessionStore};
use vanguard_recon::core::target::Target;

pub const SPINNER_CHARS: [char; 8] = ['⣾', '⣽', '⣻', '⢿', '⡿', '⣟', '⣯', '⣷'];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AppState {
    Idle,
    Running,
    Finished,
}

/// Which panel receives key presses.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Focus {
    Target,
    Modules,
    Sessions,
}

impl Focus {
    pub fn next(self) -> Self {
        match self {
            Focus::Target => Focus::Modules,
            Focus::Modules => Focus::Sessions,
            Focus::Sessions => Focus::Target,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ModuleStatus {
    Pending,
    Running,
    Succeeded,
    Failed,
}

#[derive(Debug, Clone)]
pub struct ModuleRow {
    pub descriptor: ModuleDescriptor,
    pub enabled: bool,
    /// Credentials the module needs that are not in the config.
    pub missing: Vec<&'static str>,
    pub status: Option<ModuleStatus>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LineKind {
    Info,
    Success,
    Failure,
    Detail,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutputLine {
    pub kind: LineKind,
    pub text: String,
}

impl OutputLine {
    fn new(kind: LineKind, text: impl Into<String>) -> Self {
        Self { kind, text: text.into() }
    }
}

struct ActiveRun {
    handle: RunHandle,
    events: UnboundedReceiver<RunEvent>,
    builder: SessionBuilder,
}

pub struct App {
    pub should_quit: bool,
    pub state: AppState,
    pub focus: Focus,
    pub input: String,
    pub modules: Vec<ModuleRow>,
    pub module_list_state: ListState,
    pub sessions: Vec<SessionListing>,
    pub session_list_state: ListState,
    pub output: Vec<OutputLine>,
    pub output_scroll: usize,
    pub output_scroll_state: ScrollbarState,
    pub status: Option<String>,
    pub spinner_frame: usize,
    registry: Registry,
    config: AppConfig,
    store: SessionStore,
    run: Option<ActiveRun>,
}

impl App {
    pub fn new(registry: Registry, config: AppConfig, store: SessionStore) -> Self {
        let modules = registry
            .descriptors()
            .map(|descriptor| {
                let missing = config.missing_credentials(descriptor);
                ModuleRow {
                    descriptor: descriptor.clone(),
                    enabled: missing.is_empty(),
                    missing,
                    status: None,
                }
            })
            .collect();

        let mut app = Self {
            should_quit: false,
            state: AppState::Idle,
            focus: Focus::Target,
            input: String::new(),
            modules,
            module_list_state: ListState::default().with_selected(Some(0)),
            sessions: Vec::new(),
            session_list_state: ListState::default(),
            output: Vec::new(),
            output_scroll: 0,
            output_scroll_state: ScrollbarState::default(),
            status: None,
            spinner_frame: 0,
            registry,
            config,
            store,
            run: None,
        };
        app.refresh_sessions();
        app
    }

    pub fn on_tick(&mut self) {
        if self.state == AppState::Running {
            self.spinner_frame = (self.spinner_frame + 1) % SPINNER_CHARS.len();
        }
    }

    pub fn quit(&mut self) {
        self.cancel_run();
        self.should_quit = true;
    }

    pub fn is_running(&self) -> bool {
        self.run.is_some()
    }

    // --- Module table ---

    pub fn toggle_selected_module(&mut self) {
        let Some(row) = self
            .module_list_state
            .selected()
            .and_then(|i| self.modules.get_mut(i))
        else {
            return;
        };
        if !row.enabled && !row.missing.is_empty() {
            self.status = Some(format!(
                "'{}' needs {} in config.json before it can be enabled.",
                row.descriptor.name,
                row.missing.join(", ")
            ));
            return;
        }
        row.enabled = !row.enabled;
    }

    /// Enables every module that can run; if they already are, disables all.
    pub fn toggle_all_modules(&mut self) {
        let enable = self
            .modules
            .iter()
            .any(|row| !row.enabled && row.missing.is_empty());
        for row in &mut self.modules {
            row.enabled = enable && row.missing.is_empty();
        }
    }

    pub fn select_next_module(&mut self) {
        step(&mut self.module_list_state, self.modules.len(), 1);
    }

    pub fn select_previous_module(&mut self) {
        step(&mut self.module_list_state, self.modules.len(), -1);
    }

    // --- Runs ---

    pub fn start_run(&mut self) {
        if self.is_running() {
            return;
        }
        let target = match Target::parse(&self.input) {
            Ok(target) => target,
            Err(e) => {
                self.status = Some(e.to_string());
                return;
            }
        };
        let names: Vec<&str> = self
            .modules
            .iter()
            .filter(|row| row.enabled)
            .map(|row| row.descriptor.name)
            .collect();
        if names.is_empty() {
            self.status = Some("No modules enabled.".to_string());
            return;
        }
        let modules = match self.registry.select(&names) {
            Ok(modules) => modules,
            Err(e) => {
                self.status = Some(e.to_string());
                return;
            }
        };

        let context = self.config.module_context();
        self.start_run_with(target, modules, context);
    }

    fn start_run_with(
        &mut self,
        target: Target,
        modules: Vec<Arc<dyn ReconModule>>,
        context: ModuleContext,
    ) {
        info!(target = %target, modules = modules.len(), "Starting run from UI.");
        for row in &mut self.modules {
            row.status = row.enabled.then_some(ModuleStatus::Pending);
        }
        self.output.clear();
        self.output_scroll = 0;
        self.output.push(OutputLine::new(LineKind::Info, format!("Target: {}", target)));

        let builder = SessionBuilder::new(target.clone(), Utc::now());
        let (handle, events) = Orchestrator::new().spawn(RunRequest::new(target, modules, context));
        self.run = Some(ActiveRun { handle, events, builder });
        self.state = AppState::Running;
        self.status = None;
    }

    /// Requests cooperative cancellation; the module in flight still reports.
    pub fn cancel_run(&mut self) {
        if let Some(run) = &self.run {
            if !run.handle.cancel.is_cancelled() {
                run.handle.cancel.cancel();
                self.output.push(OutputLine::new(
                    LineKind::Info,
                    "Cancellation requested; waiting for the current module to finish.",
                ));
            }
        }
    }

    /// Drains pending run events without blocking.
    pub fn poll_run(&mut self) {
        loop {
            let Some(run) = self.run.as_mut() else { return };
            match run.events.try_recv() {
                Ok(event) => {
                    run.builder.observe(&event);
                    let terminal = event.is_terminal();
                    self.apply_event(&event);
                    if terminal {
                        self.finish_run();
                        return;
                    }
                }
                Err(TryRecvError::Empty) => return,
                Err(TryRecvError::Disconnected) => {
                    warn!("Run event stream closed without a terminal event.");
                    self.output.push(OutputLine::new(LineKind::Failure, "Run ended unexpectedly."));
                    self.run = None;
                    self.state = AppState::Finished;
                    return;
                }
            }
        }
    }

    pub fn apply_event(&mut self, event: &RunEvent) {
        if let Some(name) = event.module() {
            let status = match event {
                RunEvent::Started { .. } => ModuleStatus::Running,
                RunEvent::Succeeded { .. } => ModuleStatus::Succeeded,
                _ => ModuleStatus::Failed,
            };
            if let Some(row) = self.modules.iter_mut().find(|row| row.descriptor.name == name) {
                row.status = Some(status);
            }
        }

        match event {
            RunEvent::Started { module } => {
                self.output.push(OutputLine::new(LineKind::Info, format!("▶ {}", module)));
            }
            RunEvent::Succeeded { module, result } => {
                self.output.push(OutputLine::new(LineKind::Success, format!("✓ {}", module)));
                push_tree(&mut self.output, result, 1);
            }
            RunEvent::Failed { module, error } => {
                self.output.push(OutputLine::new(LineKind::Failure, format!("✗ {}: {}", module, error)));
            }
            RunEvent::Cancelled => {
                self.output.push(OutputLine::new(LineKind::Info, "Analysis terminated by user."));
            }
            RunEvent::Finished => {
                self.output.push(OutputLine::new(LineKind::Info, "Analysis completed."));
            }
        }
    }

    fn finish_run(&mut self) {
        let Some(run) = self.run.take() else { return };
        self.state = AppState::Finished;
        match run.builder.save(&self.store) {
            Ok(id) => self.status = Some(format!("Session {} saved.", id)),
            Err(e) => {
                warn!(error = %e, "Could not save session.");
                self.status = Some(format!("Could not save session: {}", e));
            }
        }
        self.refresh_sessions();
    }

    /// Back to input mode after a finished run.
    pub fn reset(&mut self) {
        if self.is_running() {
            return;
        }
        self.state = AppState::Idle;
        self.focus = Focus::Target;
        self.input.clear();
        self.output.clear();
        self.output_scroll = 0;
        self.output_scroll_state = ScrollbarState::default();
        for row in &mut self.modules {
            row.status = None;
        }
    }

    pub fn scroll_up(&mut self) {
        self.output_scroll = self.output_scroll.saturating_sub(1);
        self.output_scroll_state = self.output_scroll_state.position(self.output_scroll);
    }

    pub fn scroll_down(&mut self) {
        let max = self.output.len().saturating_sub(1);
        self.output_scroll = (self.output_scroll + 1).min(max);
        self.output_scroll_state = self.output_scroll_state.position(self.output_scroll);
    }

    // --- Sessions ---

    pub fn refresh_sessions(&mut self) {
        match self.store.list() {
            Ok(sessions) => self.sessions = sessions,
            Err(e) => {
                warn!(error = %e, "Could not list sessions.");
                self.status = Some(format!("Could not list sessions: {}", e));
            }
        }
        let selected = match self.session_list_state.selected() {
            _ if self.sessions.is_empty() => None,
            Some(i) => Some(i.min(self.sessions.len() - 1)),
            None => Some(0),
        };
        self.session_list_state.select(selected);
    }

    pub fn select_next_session(&mut self) {
        step(&mut self.session_list_state, self.sessions.len(), 1);
    }

    pub fn select_previous_session(&mut self) {
        step(&mut self.session_list_state, self.sessions.len(), -1);
    }

    fn selected_session_id(&self) -> Option<String> {
        self.session_list_state
            .selected()
            .and_then(|i| self.sessions.get(i))
            .map(|listing| listing.id().to_string())
    }

    /// Shows a stored session in the output panel.
    pub fn open_selected_session(&mut self) {
        if self.is_running() {
            return;
        }
        let Some(id) = self.selected_session_id() else { return };
        match self.store.load(&id) {
            Ok(session) => {
                self.show_session(&session);
                self.state = AppState::Finished;
            }
            Err(e) => self.status = Some(format!("{} (press D to delete it)", e)),
        }
    }

    fn show_session(&mut self, session: &Session) {
        self.output.clear();
        self.output_scroll = 0;
        self.output.push(OutputLine::new(
            LineKind::Info,
            format!("Session {} | {} | {}", session.id, session.target, session.timestamp.to_rfc3339()),
        ));
        for (module, tree) in &session.results {
            match tree.error_message() {
                Some(error) => self.output.push(OutputLine::new(LineKind::Failure, format!("✗ {}: {}", module, error))),
                None => {
                    self.output.push(OutputLine::new(LineKind::Success, format!("✓ {}", module)));
                    push_tree(&mut self.output, tree, 1);
                }
            }
        }
    }

    pub fn delete_selected_session(&mut self) {
        let Some(id) = self.selected_session_id() else { return };
        match self.store.delete(&id) {
            Ok(()) => self.status = Some(format!("Session {} deleted.", id)),
            Err(e) => self.status = Some(e.to_string()),
        }
        self.refresh_sessions();
    }

    pub fn export_selected_session(&mut self, dir: &Path) {
        let Some(id) = self.selected_session_id() else { return };
        let dest = dir.join(format!("vanguard_session_{}.json", id));
        self.status = Some(match self.store.export(&id, &dest) {
            Ok(()) => format!("Exported to {}", dest.display()),
            Err(e) => e.to_string(),
        });
    }
}

fn step(state: &mut ListState, len: usize, delta: isize) {
    if len == 0 {
        state.select(None);
        return;
    }
    let current = state.selected().unwrap_or(0) as isize;
    let next = (current + delta).rem_euclid(len as isize) as usize;
    state.select(Some(next));
}

/// Flattens a result tree into indented detail lines.
fn push_tree(out: &mut Vec<OutputLine>, tree: &ResultTree, depth: usize) {
    let indent = "  ".repeat(depth);
    for (key, value) in tree.iter() {
        match value {
            ResultValue::Tree(child) => {
                out.push(OutputLine::new(LineKind::Detail, format!("{}{}:", indent, key)));
                push_tree(out, child, depth + 1);
            }
            ResultValue::List(items) if items.iter().any(|item| matches!(item, ResultValue::Tree(_))) => {
                out.push(OutputLine::new(LineKind::Detail, format!("{}{}:", indent, key)));
                for item in items {
                    match item {
                        ResultValue::Tree(child) => {
                            out.push(OutputLine::new(LineKind::Detail, format!("{}  -", indent)));
                            push_tree(out, child, depth + 2);
                        }
                        scalar => out.push(OutputLine::new(
                            LineKind::Detail,
                            format!("{}  - {}", indent, scalar_text(scalar)),
                        )),
                    }
                }
            }
            scalar => out.push(OutputLine::new(
                LineKind::Detail,
                format!("{}{}: {}", indent, key, scalar_text(scalar)),
            )),
        }
    }
}

fn scalar_text(value: &ResultValue) -> String {
    match value {
        ResultValue::Null => "-".to_string(),
        ResultValue::Bool(b) => b.to_string(),
        ResultValue::Number(n) => n.to_string(),
        ResultValue::Text(s) => s.clone(),
        ResultValue::List(items) if items.is_empty() => "(none)".to_string(),
        ResultValue::List(items) => items.iter().map(scalar_text).collect::<Vec<_>>().join(", "),
        ResultValue::Tree(tree) => format!("{} entries", tree.len()),
    }
}
