//! Thread history dialog for browsing and switching threads.

use chrono::{DateTime, Utc};
use ratatui::{
    Frame,
    layout::{Alignment, Constraint, Layout, Rect},
    style::{Color, Modifier, Style},
    text::{Line, Span},
    widgets::{Block, Borders, Clear, List, ListItem, ListState, Paragraph},
};

use super::theme::{BRAND_TEAL, DIALOG_BG, DIMMED, ERROR_COLOR, SELECTED_BG, WARN_COLOR};
use crate::client::ThreadStatus;
use crate::core::threads::{ThreadAge, ThreadSummary};

/// Thread history dialog state.
#[derive(Debug, Clone, Default)]
pub struct ThreadListDialog {
    threads: Vec<ThreadSummary>,
    /// Index into the filtered threads.
    selected: usize,
    filter: String,
    loading: bool,
    error: Option<String>,
}

/// A row of the rendered list: an age header or a thread.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ThreadRow<'a> {
    Header(ThreadAge),
    Thread(&'a ThreadSummary),
}

impl ThreadListDialog {
    /// Dialog waiting for its first load.
    #[must_use]
    pub fn loading() -> Self {
        Self {
            loading: true,
            ..Self::default()
        }
    }

    /// Replace the listed threads, keeping the selection on the same thread
    /// when it is still present.
    pub fn set_threads(&mut self, threads: Vec<ThreadSummary>) {
        let current = self.selected_thread().map(|t| t.id.clone());
        self.threads = threads;
        self.loading = false;
        self.error = None;
        self.selected = current
            .and_then(|id| self.filtered().iter().position(|t| t.id == id))
            .unwrap_or(0);
    }

    pub fn set_error(&mut self, error: String) {
        self.loading = false;
        self.error = Some(error);
    }

    #[must_use]
    pub const fn is_loading(&self) -> bool {
        self.loading
    }

    fn filtered(&self) -> Vec<&ThreadSummary> {
        if self.filter.is_empty() {
            return self.threads.iter().collect();
        }
        let needle = self.filter.to_lowercase();
        self.threads
            .iter()
            .filter(|t| {
                t.title.to_lowercase().contains(&needle)
                    || t.snippet.to_lowercase().contains(&needle)
            })
            .collect()
    }

    pub fn select_previous(&mut self) {
        self.selected = self.selected.saturating_sub(1);
    }

    pub fn select_next(&mut self) {
        let len = self.filtered().len();
        if len > 0 {
            self.selected = (self.selected + 1).min(len - 1);
        }
    }

    #[must_use]
    pub fn selected_thread(&self) -> Option<&ThreadSummary> {
        self.filtered().get(self.selected).copied()
    }

    pub fn filter_push(&mut self, c: char) {
        self.filter.push(c);
        self.selected = 0;
    }

    pub fn filter_pop(&mut self) {
        self.filter.pop();
        self.selected = 0;
    }

    #[must_use]
    pub fn filter(&self) -> &str {
        &self.filter
    }

    /// Filtered threads with a header before each age group.
    ///
    /// Threads arrive newest first, so each bucket appears once.
    #[must_use]
    pub fn rows(&self, now: DateTime<Utc>) -> Vec<ThreadRow<'_>> {
        let mut rows = Vec::new();
        let mut bucket = None;
        for thread in self.filtered() {
            let age = ThreadAge::of(thread.updated_at, now);
            if bucket != Some(age) {
                bucket = Some(age);
                rows.push(ThreadRow::Header(age));
            }
            rows.push(ThreadRow::Thread(thread));
        }
        rows
    }
}

const fn status_color(status: ThreadStatus) -> Color {
    match status {
        ThreadStatus::Busy => WARN_COLOR,
        ThreadStatus::Interrupted => BRAND_TEAL,
        ThreadStatus::Error => ERROR_COLOR,
        _ => DIMMED,
    }
}

/// Render the thread history dialog.
pub fn render_thread_list(frame: &mut Frame, dialog: &ThreadListDialog) {
    let area = frame.area();
    let width = (area.width * 3 / 4).min(90);
    let height = (area.height * 3 / 4).min(32);
    let dialog_area = Rect::new(
        (area.width - width) / 2,
        (area.height - height) / 2,
        width,
        height,
    );
    frame.render_widget(Clear, dialog_area);

    let block = Block::default()
        .title(" Threads ")
        .title_alignment(Alignment::Center)
        .borders(Borders::ALL)
        .border_style(Style::default().fg(BRAND_TEAL))
        .style(Style::default().bg(DIALOG_BG));
    let inner = block.inner(dialog_area);
    frame.render_widget(block, dialog_area);

    let [search_area, list_area, help_area] = Layout::vertical([
        Constraint::Length(3),
        Constraint::Min(3),
        Constraint::Length(1),
    ])
    .areas(inner);

    let search_text = if dialog.filter.is_empty() {
        Line::from(Span::styled("Type to filter...", Style::default().fg(DIMMED)))
    } else {
        Line::from(Span::styled(
            dialog.filter.clone(),
            Style::default().fg(Color::White),
        ))
    };
    frame.render_widget(
        Paragraph::new(search_text).block(
            Block::default()
                .title(" Search ")
                .borders(Borders::ALL)
                .border_style(Style::default().fg(DIMMED)),
        ),
        search_area,
    );

    if let Some(error) = &dialog.error {
        frame.render_widget(
            Paragraph::new(Span::styled(error.clone(), Style::default().fg(ERROR_COLOR))),
            list_area,
        );
    } else if dialog.loading {
        frame.render_widget(
            Paragraph::new(Span::styled("Loading threads...", Style::default().fg(DIMMED))),
            list_area,
        );
    } else {
        let selected_id = dialog.selected_thread().map(|t| t.id.as_str());
        let mut selected_row = None;
        let items: Vec<ListItem> = dialog
            .rows(Utc::now())
            .into_iter()
            .enumerate()
            .map(|(i, row)| match row {
                ThreadRow::Header(age) => ListItem::new(Line::from(Span::styled(
                    age.label(),
                    Style::default().fg(DIMMED).add_modifier(Modifier::BOLD),
                ))),
                ThreadRow::Thread(thread) => {
                    let is_selected = Some(thread.id.as_str()) == selected_id;
                    if is_selected {
                        selected_row = Some(i);
                    }
                    let style = if is_selected {
                        Style::default()
                            .bg(SELECTED_BG)
                            .fg(Color::White)
                            .add_modifier(Modifier::BOLD)
                    } else {
                        Style::default().fg(Color::White)
                    };
                    ListItem::new(vec![
                        Line::from(vec![
                            Span::styled(if is_selected { " ▸ " } else { "   " }, style),
                            Span::styled(thread.title.clone(), style),
                            Span::styled(
                                format!("  {}", thread.status.as_str()),
                                Style::default().fg(status_color(thread.status)),
                            ),
                        ]),
                        Line::from(Span::styled(
                            format!("   {}", thread.snippet),
                            Style::default().fg(DIMMED),
                        )),
                    ])
                }
            })
            .collect();

        let empty = items.is_empty();
        let list = List::new(items).block(
            Block::default()
                .borders(Borders::ALL)
                .border_style(Style::default().fg(DIMMED)),
        );
        let mut state = ListState::default();
        state.select(selected_row);
        frame.render_stateful_widget(list, list_area, &mut state);
        if empty {
            let hint = Rect::new(list_area.x + 2, list_area.y + 1, list_area.width.saturating_sub(4), 1);
            frame.render_widget(
                Paragraph::new(Span::styled("No threads found", Style::default().fg(DIMMED))),
                hint,
            );
        }
    }

    let help = Line::from(vec![
        Span::styled("↑↓", Style::default().fg(BRAND_TEAL)),
        Span::styled(" navigate  ", Style::default().fg(DIMMED)),
        Span::styled("enter", Style::default().fg(BRAND_TEAL)),
        Span::styled(" open  ", Style::default().fg(DIMMED)),
        Span::styled("ctrl-n", Style::default().fg(BRAND_TEAL)),
        Span::styled(" new  ", Style::default().fg(DIMMED)),
        Span::styled("esc", Style::default().fg(BRAND_TEAL)),
        Span::styled(" close", Style::default().fg(DIMMED)),
    ]);
    frame.render_widget(Paragraph::new(help).alignment(Alignment::Center), help_area);
}
