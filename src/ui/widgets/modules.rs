// src/ui/widgets/modules.rs

use crate::app::{App, Focus, ModuleStatus, SPINNER_CHARS};
use crate::ui::panel_style;
use ratatui::{
    prelude::*,
    widgets::{Block, Borders, List, ListItem},
};

pub fn render_modules(frame: &mut Frame, app: &mut App, area: Rect) {
    let block = Block::default()
        .borders(Borders::ALL)
        .border_style(panel_style(app, Focus::Modules))
        .title("Modules");

    let spinner = SPINNER_CHARS[app.spinner_frame];
    let items: Vec<ListItem> = app
        .modules
        .iter()
        .map(|row| {
            let checkbox = if row.enabled { "[x] " } else { "[ ] " };
            let (marker, marker_style) = match row.status {
                Some(ModuleStatus::Pending) => ("·".to_string(), Style::default().fg(Color::DarkGray)),
                Some(ModuleStatus::Running) => (spinner.to_string(), Style::default().fg(Color::Cyan)),
                Some(ModuleStatus::Succeeded) => ("✓".to_string(), Style::default().fg(Color::Green)),
                Some(ModuleStatus::Failed) => ("✗".to_string(), Style::default().fg(Color::Red)),
                None => (" ".to_string(), Style::default()),
            };
            let name_style = if row.missing.is_empty() {
                Style::default()
            } else {
                Style::default().fg(Color::DarkGray)
            };

            let mut spans = vec![
                Span::raw(checkbox),
                Span::styled(format!("{} ", marker), marker_style),
                Span::styled(row.descriptor.name, name_style),
            ];
            if !row.missing.is_empty() {
                spans.push(Span::styled(" (key required)", Style::default().fg(Color::Yellow)));
            }
            ListItem::new(Line::from(spans))
        })
        .collect();

    let list = List::new(items)
        .block(block)
        .highlight_style(Style::new().bg(Color::DarkGray).add_modifier(Modifier::BOLD));
    frame.render_stateful_widget(list, area, &mut app.module_list_state);
}
