//! Side panel with the agent's todos and files.

use ratatui::{
    layout::{Constraint, Layout, Rect},
    style::{Modifier, Style},
    text::{Line, Span},
    widgets::{Block, Borders, List, ListItem, ListState, Paragraph, Wrap},
    Frame,
};

use super::theme::{BRAND_TEAL, DIMMED, SELECTED_BG, WARN_COLOR};
use crate::core::state::{group_todos, Files, TodoItem};

/// Lines for the todo list: in-progress first, then pending, then completed.
#[must_use]
pub fn todo_lines(todos: &[TodoItem]) -> Vec<Line<'static>> {
    let grouped = group_todos(todos);
    let mut lines = Vec::with_capacity(grouped.total());

    for item in &grouped.in_progress {
        lines.push(Line::from(vec![
            Span::styled("◐ ", Style::default().fg(WARN_COLOR)),
            Span::styled(
                item.content.clone(),
                Style::default().add_modifier(Modifier::BOLD),
            ),
        ]));
    }
    for item in &grouped.pending {
        lines.push(Line::from(vec![
            Span::styled("○ ", Style::default().fg(DIMMED)),
            Span::raw(item.content.clone()),
        ]));
    }
    for item in &grouped.completed {
        lines.push(Line::from(Span::styled(
            format!("● {}", item.content),
            Style::default()
                .fg(DIMMED)
                .add_modifier(Modifier::CROSSED_OUT),
        )));
    }
    lines
}

/// Render todos above the file list. `selected_file` highlights a file.
pub fn render_sidebar(
    frame: &mut Frame,
    area: Rect,
    todos: &[TodoItem],
    files: &Files,
    selected_file: Option<usize>,
) {
    let [todo_area, file_area] =
        Layout::vertical([Constraint::Percentage(55), Constraint::Percentage(45)]).areas(area);

    let grouped = group_todos(todos);
    let title = match grouped.active() {
        Some(_) => format!(
            " Tasks {}/{} ",
            grouped.completed.len(),
            grouped.total()
        ),
        None => " Tasks ".to_string(),
    };
    let todo_block = Block::default()
        .title(title)
        .borders(Borders::ALL)
        .border_style(Style::default().fg(DIMMED));
    let body = if todos.is_empty() {
        vec![Line::from(Span::styled("No tasks yet", Style::default().fg(DIMMED)))]
    } else {
        todo_lines(todos)
    };
    frame.render_widget(
        Paragraph::new(body)
            .block(todo_block)
            .wrap(Wrap { trim: false }),
        todo_area,
    );

    let items: Vec<ListItem> = files
        .iter()
        .map(|(path, content)| {
            ListItem::new(Line::from(vec![
                Span::raw(path.clone()),
                Span::styled(
                    format!("  {}L", content.lines().count()),
                    Style::default().fg(DIMMED),
                ),
            ]))
        })
        .collect();
    let file_block = Block::default()
        .title(format!(" Files ({}) ", files.len()))
        .borders(Borders::ALL)
        .border_style(Style::default().fg(if selected_file.is_some() {
            BRAND_TEAL
        } else {
            DIMMED
        }));
    let list = List::new(items)
        .block(file_block)
        .highlight_style(Style::default().bg(SELECTED_BG));
    let mut state = ListState::default();
    state.select(selected_file);
    frame.render_stateful_widget(list, file_area, &mut state);
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn todos_ordered_by_status() {
        let todos: Vec<TodoItem> = serde_json::from_value(json!([
            {"content": "done", "status": "completed"},
            {"content": "next", "status": "pending"},
            {"content": "now", "status": "in_progress"}
        ]))
        .unwrap();
        let text: Vec<String> = todo_lines(&todos)
            .iter()
            .map(|l| l.spans.iter().map(|s| s.content.as_ref()).collect())
            .collect();
        assert_eq!(text, vec!["◐ now", "○ next", "● done"]);
    }
}
