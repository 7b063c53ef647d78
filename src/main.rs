// src/main.rs

use color_eyre::eyre::Result;
use crossterm::{
    event::{self, DisableMouseCapture, EnableMouseCapture, Event, KeyCode, KeyEvent, KeyEventKind, KeyModifiers},
    terminal::{disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen},
    ExecutableCommand,
};
use ratatui::prelude::*;
use std::io::stdout;
use std::time::Duration;
use tracing::info;
use vanguard_recon::config::AppConfig;
use vanguard_recon::core::registry::Registry;
use vanguard_recon::core::session::SessionStore;
use vanguard_recon::logging::initialize_logging;

mod app;
mod ui;

use app::{App, AppState, Focus};

#[tokio::main]
async fn main() -> Result<()> {
    color_eyre::install()?;
    let log_path = initialize_logging()?;

    let config = AppConfig::load_from(&AppConfig::default_path())?;
    let store = SessionStore::open(config.session_dir())?;
    let registry = Registry::builtin();
    info!(log = %log_path.display(), sessions = %store.dir().display(), modules = registry.len(), "Starting up.");

    // --- Setup ---
    stdout().execute(EnterAlternateScreen)?;
    stdout().execute(EnableMouseCapture)?;
    enable_raw_mode()?;
    let mut terminal = Terminal::new(CrosstermBackend::new(stdout()))?;
    terminal.clear()?;

    let mut app = App::new(registry, config, store);
    let outcome = run(&mut terminal, &mut app);

    // --- Restore Terminal ---
    stdout().execute(LeaveAlternateScreen)?;
    stdout().execute(DisableMouseCapture)?;
    disable_raw_mode()?;
    info!("Shut down.");
    outcome
}

fn run(terminal: &mut Terminal<CrosstermBackend<std::io::Stdout>>, app: &mut App) -> Result<()> {
    while !app.should_quit {
        terminal.draw(|frame| ui::render(app, frame))?;

        if event::poll(Duration::from_millis(100))? {
            if let Event::Key(key) = event::read()? {
                if key.kind == KeyEventKind::Press {
                    handle_key(app, key);
                }
            }
        }

        app.poll_run();
        app.on_tick();
    }
    Ok(())
}

fn handle_key(app: &mut App, key: KeyEvent) {
    if key.modifiers.contains(KeyModifiers::CONTROL) && key.code == KeyCode::Char('c') {
        app.quit();
        return;
    }
    if app.state == AppState::Running {
        handle_running_input(app, key.code);
        return;
    }
    if key.code == KeyCode::Tab {
        app.focus = app.focus.next();
        return;
    }
    match app.focus {
        Focus::Target => handle_target_input(app, key.code),
        Focus::Modules => handle_modules_input(app, key.code),
        Focus::Sessions => handle_sessions_input(app, key.code),
    }
}

/// While a run is active only cancellation and scrolling are accepted.
fn handle_running_input(app: &mut App, key_code: KeyCode) {
    match key_code {
        KeyCode::Esc => app.cancel_run(),
        KeyCode::Up => app.scroll_up(),
        KeyCode::Down => app.scroll_down(),
        _ => {}
    }
}

fn handle_target_input(app: &mut App, key_code: KeyCode) {
    match key_code {
        KeyCode::Esc => app.quit(),
        KeyCode::Enter => app.start_run(),
        KeyCode::Up => app.scroll_up(),
        KeyCode::Down => app.scroll_down(),
        KeyCode::Char(c) => {
            if app.state == AppState::Finished {
                app.reset();
            }
            app.input.push(c);
        }
        KeyCode::Backspace => {
            app.input.pop();
        }
        _ => {}
    }
}

fn handle_modules_input(app: &mut App, key_code: KeyCode) {
    match key_code {
        KeyCode::Char('q') => app.quit(),
        KeyCode::Char(' ') => app.toggle_selected_module(),
        KeyCode::Char('a') => app.toggle_all_modules(),
        KeyCode::Up => app.select_previous_module(),
        KeyCode::Down => app.select_next_module(),
        KeyCode::Enter => app.start_run(),
        _ => {}
    }
}

fn handle_sessions_input(app: &mut App, key_code: KeyCode) {
    match key_code {
        KeyCode::Char('q') => app.quit(),
        KeyCode::Char('n') => app.reset(),
        KeyCode::Char('d') => app.delete_selected_session(),
        KeyCode::Char('e') => match std::env::current_dir() {
            Ok(dir) => app.export_selected_session(&dir),
            Err(e) => app.status = Some(format!("Cannot determine export directory: {}", e)),
        },
        KeyCode::Char('r') => app.refresh_sessions(),
        KeyCode::Enter => app.open_selected_session(),
        KeyCode::Up => app.select_previous_session(),
        KeyCode::Down => app.select_next_session(),
        _ => {}
    }
}
