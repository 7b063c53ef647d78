// src/ui/widgets/input.rs
use crate::app::{App, AppState, Focus};
use crate::ui::panel_style;
use ratatui::{prelude::*, widgets::{Block, Borders, Paragraph}};

/// Renders the target input box.
pub fn render_input(frame: &mut Frame, app: &App, area: Rect) {
    let input_block = Block::default()
        .borders(Borders::ALL)
        .border_style(panel_style(app, Focus::Target))
        .title("Target (URL, domain or IP)");
    let input_paragraph = Paragraph::new(app.input.as_str())
        .block(input_block)
        .style(Style::default().fg(Color::Yellow));
    frame.render_widget(input_paragraph, area);

    // The cursor is only shown while the target can be edited.
    if app.state == AppState::Idle && app.focus == Focus::Target {
        let offset = u16::try_from(app.input.chars().count()).unwrap_or(u16::MAX);
        frame.set_cursor_position(Position::new(
            area.x.saturating_add(offset).saturating_add(1),
            area.y + 1,
        ));
    }
}
