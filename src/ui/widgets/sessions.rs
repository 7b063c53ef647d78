// src/ui/widgets/sessions.rs

use crate::app::{App, Focus};
use crate::ui::panel_style;
use ratatui::{
    prelude::*,
    widgets::{Block, Borders, List, ListItem},
};
use vanguard_recon::core::session::SessionListing;

pub fn render_sessions(frame: &mut Frame, app: &mut App, area: Rect) {
    let block = Block::default()
        .borders(Borders::ALL)
        .border_style(panel_style(app, Focus::Sessions))
        .title(format!("Sessions ({})", app.sessions.len()));

    let items: Vec<ListItem> = app
        .sessions
        .iter()
        .map(|listing| match listing {
            SessionListing::Valid(summary) => ListItem::new(Line::from(vec![
                Span::styled(
                    summary.timestamp.format("%Y-%m-%d %H:%M ").to_string(),
                    Style::default().fg(Color::DarkGray),
                ),
                Span::raw(summary.target.clone()),
            ])),
            SessionListing::Corrupt { id, .. } => ListItem::new(Line::from(vec![
                Span::styled(format!("{} ", id), Style::default().fg(Color::DarkGray)),
                Span::styled("corrupt", Style::default().fg(Color::Red)),
            ])),
        })
        .collect();

    let list = List::new(items)
        .block(block)
        .highlight_style(Style::new().bg(Color::DarkGray).add_modifier(Modifier::BOLD));
    frame.render_stateful_widget(list, area, &mut app.session_list_state);
}
