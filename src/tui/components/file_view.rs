//! Viewer and editor for one of the agent's files.

use crossterm::event::{KeyCode, KeyModifiers};
use ratatui::{
    Frame,
    layout::{Alignment, Constraint, Layout, Position, Rect},
    style::{Modifier, Style},
    text::{Line, Span},
    widgets::{Block, Borders, Clear, Paragraph},
};

use super::input::InputBuffer;
use super::theme::{BRAND_TEAL, DIALOG_BG, DIMMED, WARN_COLOR};
use super::to_u16;

/// Width of the line-number gutter.
const GUTTER: u16 = 5;

/// What a key did to the file dialog.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FileOutcome {
    None,
    Close,
    /// Save `content` under `path`.
    Save { path: String, content: String },
}

/// File dialog state. Read-only until editing starts.
#[derive(Debug, Clone)]
pub struct FileDialog {
    path: String,
    original: String,
    buffer: InputBuffer,
    editing: bool,
    scroll: u16,
}

impl FileDialog {
    #[must_use]
    pub fn new(path: impl Into<String>, content: impl Into<String>) -> Self {
        let original = content.into();
        Self {
            path: path.into(),
            buffer: InputBuffer::with_text(original.clone()),
            original,
            editing: false,
            scroll: 0,
        }
    }

    #[must_use]
    pub fn path(&self) -> &str {
        &self.path
    }

    #[must_use]
    pub fn content(&self) -> &str {
        self.buffer.text()
    }

    #[must_use]
    pub const fn is_editing(&self) -> bool {
        self.editing
    }

    #[must_use]
    pub fn is_dirty(&self) -> bool {
        self.buffer.text() != self.original
    }

    pub fn handle_key(&mut self, code: KeyCode, modifiers: KeyModifiers) -> FileOutcome {
        if !self.editing {
            return match code {
                KeyCode::Esc | KeyCode::Char('q') => FileOutcome::Close,
                KeyCode::Char('e') => {
                    self.editing = true;
                    FileOutcome::None
                }
                KeyCode::Up => {
                    self.scroll = self.scroll.saturating_sub(1);
                    FileOutcome::None
                }
                KeyCode::Down => {
                    self.scroll = self.scroll.saturating_add(1);
                    FileOutcome::None
                }
                _ => FileOutcome::None,
            };
        }

        let ctrl = modifiers.contains(KeyModifiers::CONTROL);
        match code {
            KeyCode::Char('s') if ctrl => {
                self.editing = false;
                if !self.is_dirty() {
                    return FileOutcome::None;
                }
                self.original = self.buffer.text().to_string();
                FileOutcome::Save {
                    path: self.path.clone(),
                    content: self.original.clone(),
                }
            }
            KeyCode::Esc => {
                self.buffer = InputBuffer::with_text(self.original.clone());
                self.editing = false;
                FileOutcome::None
            }
            KeyCode::Char('w') if ctrl => {
                self.buffer.delete_word();
                FileOutcome::None
            }
            KeyCode::Char(c) => {
                self.buffer.insert(c);
                FileOutcome::None
            }
            KeyCode::Enter => {
                self.buffer.insert('\n');
                FileOutcome::None
            }
            KeyCode::Tab => {
                self.buffer.insert_str("  ");
                FileOutcome::None
            }
            KeyCode::Backspace => {
                self.buffer.backspace();
                FileOutcome::None
            }
            KeyCode::Delete => {
                self.buffer.delete();
                FileOutcome::None
            }
            KeyCode::Left => {
                self.buffer.left();
                FileOutcome::None
            }
            KeyCode::Right => {
                self.buffer.right();
                FileOutcome::None
            }
            KeyCode::Home => {
                self.buffer.home();
                FileOutcome::None
            }
            KeyCode::End => {
                self.buffer.end();
                FileOutcome::None
            }
            _ => FileOutcome::None,
        }
    }
}

/// Where the edit cursor lands in `body`, or `None` when it is off screen.
fn cursor_position(body: Rect, line: usize, col: usize, scroll: u16) -> Option<Position> {
    let x = body.x.saturating_add(GUTTER).saturating_add(to_u16(col));
    let y = body.y.saturating_add(to_u16(line).saturating_sub(scroll));
    (x < body.right() && y < body.bottom()).then_some(Position::new(x, y))
}

/// Render the file dialog.
pub fn render_file(frame: &mut Frame, dialog: &FileDialog) {
    let area = frame.area();
    let width = area.width.saturating_sub(8).max(20).min(area.width);
    let height = area.height.saturating_sub(4).max(6).min(area.height);
    let dialog_area = Rect::new(
        (area.width - width) / 2,
        (area.height - height) / 2,
        width,
        height,
    );
    frame.render_widget(Clear, dialog_area);

    let marker = if dialog.is_dirty() { " *" } else { "" };
    let block = Block::default()
        .title(format!(" {}{marker} ", dialog.path))
        .title_alignment(Alignment::Center)
        .borders(Borders::ALL)
        .border_style(Style::default().fg(if dialog.editing {
            WARN_COLOR
        } else {
            BRAND_TEAL
        }))
        .style(Style::default().bg(DIALOG_BG));
    let inner = block.inner(dialog_area);
    frame.render_widget(block, dialog_area);

    let [body_area, help_area] =
        Layout::vertical([Constraint::Min(1), Constraint::Length(1)]).areas(inner);

    let numbered: Vec<Line> = dialog
        .buffer
        .text()
        .split('\n')
        .enumerate()
        .map(|(i, line)| {
            Line::from(vec![
                Span::styled(format!("{:>4} ", i + 1), Style::default().fg(DIMMED)),
                Span::raw(line.to_string()),
            ])
        })
        .collect();

    let scroll = if dialog.editing {
        let (line, _) = dialog.buffer.cursor_line_col();
        to_u16(line).saturating_sub(body_area.height.saturating_sub(1))
    } else {
        dialog.scroll
    };
    frame.render_widget(Paragraph::new(numbered).scroll((scroll, 0)), body_area);

    if dialog.editing {
        let (line, col) = dialog.buffer.cursor_line_col();
        if let Some(position) = cursor_position(body_area, line, col, scroll) {
            frame.set_cursor_position(position);
        }
    }

    let key = Style::default().fg(BRAND_TEAL).add_modifier(Modifier::BOLD);
    let dim = Style::default().fg(DIMMED);
    let help = if dialog.editing {
        Line::from(vec![
            Span::styled("ctrl-s", key),
            Span::styled(" save  ", dim),
            Span::styled("esc", key),
            Span::styled(" discard", dim),
        ])
    } else {
        Line::from(vec![
            Span::styled("e", key),
            Span::styled(" edit  ", dim),
            Span::styled("esc", key),
            Span::styled(" close", dim),
        ])
    };
    frame.render_widget(Paragraph::new(help).alignment(Alignment::Center), help_area);
}
