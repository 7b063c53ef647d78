// src/ui/widgets/results.rs

use crate::app::{App, AppState, LineKind, SPINNER_CHARS};
use ratatui::{
    prelude::*,
    widgets::{Block, Borders, Paragraph, Scrollbar, ScrollbarOrientation},
};

/// Renders the output of the current run, or of an opened session.
pub fn render_results(frame: &mut Frame, app: &mut App, area: Rect) {
    let title = match app.state {
        AppState::Running => format!("Results {} (scroll with ↑ ↓)", SPINNER_CHARS[app.spinner_frame]),
        _ => "Results (scroll with ↑ ↓)".to_string(),
    };
    let block = Block::default().borders(Borders::ALL).title(title);

    if app.output.is_empty() {
        let hint = Paragraph::new("Enter a target, choose modules, and press Enter to start.")
            .alignment(Alignment::Center)
            .block(block);
        frame.render_widget(hint, area);
        return;
    }

    let lines: Vec<Line> = app
        .output
        .iter()
        .map(|line| {
            let style = match line.kind {
                LineKind::Info => Style::default().fg(Color::Cyan),
                LineKind::Success => Style::default().fg(Color::Green).bold(),
                LineKind::Failure => Style::default().fg(Color::Red).bold(),
                LineKind::Detail => Style::default(),
            };
            Line::styled(line.text.as_str(), style)
        })
        .collect();

    app.output_scroll_state = app.output_scroll_state.content_length(lines.len());
    let offset = u16::try_from(app.output_scroll).unwrap_or(u16::MAX);
    let paragraph = Paragraph::new(lines).block(block).scroll((offset, 0));
    frame.render_widget(paragraph, area);

    let scrollbar = Scrollbar::new(ScrollbarOrientation::VerticalRight);
    frame.render_stateful_widget(
        scrollbar,
        area.inner(Margin { vertical: 1, horizontal: 0 }),
        &mut app.output_scroll_state,
    );
}
