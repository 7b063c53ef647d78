// src/ui/widgets/footer.rs

use crate::app::{App, AppState, Focus};
use ratatui::{
    prelude::*,
    style::{Color, Style, Stylize},
    text::{Line, Span},
    widgets::Paragraph,
};

fn key(label: &str) -> Span<'_> {
    Span::styled(label, Style::new().bold().fg(Color::Yellow))
}

/// Renders the footer widget, which displays the actions available in the
/// current state and focus.
pub fn render_footer(frame: &mut Frame, app: &App, area: Rect) {
    let spans = match (app.state, app.focus) {
        (AppState::Running, _) => Line::from(vec![
            Span::raw("Running... "),
            key("Esc"),
            Span::raw(" cancel after current module, "),
            key("Ctrl+C"),
            Span::raw(" quit."),
        ]),
        (_, Focus::Target) => Line::from(vec![
            key("Enter"),
            Span::raw(" run, "),
            key("Tab"),
            Span::raw(" next panel, "),
            key("Esc"),
            Span::raw(" quit."),
        ]),
        (_, Focus::Modules) => Line::from(vec![
            key("Space"),
            Span::raw(" toggle, "),
            key("A"),
            Span::raw(" all, "),
            key("Tab"),
            Span::raw(" next panel, "),
            key("Q"),
            Span::raw("uit"),
        ]),
        (_, Focus::Sessions) => Line::from(vec![
            key("Enter"),
            Span::raw(" open, "),
            key("D"),
            Span::raw("elete, "),
            key("E"),
            Span::raw("xport, "),
            key("N"),
            Span::raw("ew run, "),
            key("Q"),
            Span::raw("uit"),
        ]),
    };

    let footer = Paragraph::new(spans).alignment(Alignment::Center);
    frame.render_widget(footer, area);
}

pub fn render_status(frame: &mut Frame, app: &App, area: Rect) {
    if let Some(status) = &app.status {
        let line = Line::styled(status.as_str(), Style::default().fg(Color::Yellow));
        frame.render_widget(Paragraph::new(line), area);
    }
}
