// src/ui/mod.rs

use crate::app::{App, Focus};
use ratatui::prelude::*;

mod layout;
mod widgets;

pub fn render(app: &mut App, frame: &mut Frame) {
    let layout = layout::create_layout(frame.area(), app.modules.len());

    widgets::input::render_input(frame, app, layout.input);
    widgets::modules::render_modules(frame, app, layout.modules);
    widgets::sessions::render_sessions(frame, app, layout.sessions);
    widgets::results::render_results(frame, app, layout.results);
    widgets::footer::render_status(frame, app, layout.status);
    widgets::footer::render_footer(frame, app, layout.footer);
}

/// Border style of a panel, highlighted when it has focus.
pub(crate) fn panel_style(app: &App, panel: Focus) -> Style {
    if app.focus == panel {
        Style::default().fg(Color::Cyan)
    } else {
        Style::default()
    }
}
