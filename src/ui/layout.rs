// src/ui/layout.rs

use ratatui::layout::{Constraint, Direction, Layout, Rect};

/// Screen regions, computed once per frame.
pub struct AppLayout {
    pub input: Rect,
    pub modules: Rect,
    pub sessions: Rect,
    pub results: Rect,
    pub status: Rect,
    pub footer: Rect,
}

/// Splits the frame into the input bar, a left column holding the module
/// table above the session list, the results panel on the right, and two
/// single-line bars at the bottom.
pub fn create_layout(frame_size: Rect, module_count: usize) -> AppLayout {
    let main_chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Length(3),
            Constraint::Min(0),
            Constraint::Length(1),
            Constraint::Length(1),
        ])
        .split(frame_size);

    let content_chunks = Layout::default()
        .direction(Direction::Horizontal)
        .constraints([Constraint::Percentage(35), Constraint::Percentage(65)])
        .split(main_chunks[1]);

    let table_height = u16::try_from(module_count).unwrap_or(u16::MAX).saturating_add(2);
    let left_chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([Constraint::Length(table_height), Constraint::Min(0)])
        .split(content_chunks[0]);

    AppLayout {
        input: main_chunks[0],
        modules: left_chunks[0],
        sessions: left_chunks[1],
        results: content_chunks[1],
        status: main_chunks[2],
        footer: main_chunks[3],
    }
}
