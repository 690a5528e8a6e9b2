//! Panel for answering interrupts.

use crossterm::event::{KeyCode, KeyModifiers};
use ratatui::{
    layout::Rect,
    style::{Modifier, Style},
    text::{Line, Span},
    widgets::{Block, Borders, Clear, Paragraph, Wrap},
    Frame,
};

use super::input::InputBuffer;
use super::theme::{BRAND_TEAL, DIALOG_BG, DIMMED, ERROR_COLOR, SELECTED_BG, WARN_COLOR};
use super::to_u16;
use crate::core::interrupt::{
    stringify_arg, HumanResponse, Interrupt, InterruptCarousel, InterruptedActions, SubmitType,
};

/// What the panel is collecting input for.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PanelMode {
    Choose,
    EditField { key: String, buffer: InputBuffer },
    Respond(InputBuffer),
}

/// Result of a key press in the panel.
#[derive(Debug, Clone, PartialEq)]
pub enum PanelOutcome {
    None,
    /// Resume the run with these responses.
    Submit(Vec<HumanResponse>),
    /// End the thread without answering.
    Resolve,
}

/// Interrupt panel state.
#[derive(Debug, Clone)]
pub struct InterruptPanel {
    title: String,
    carousel: InterruptCarousel,
    mode: PanelMode,
    field: usize,
    error: Option<String>,
}

/// Current argument values of an interrupt, edits applied.
#[must_use]
pub fn current_args(actions: &InterruptedActions) -> Vec<(String, String)> {
    let edited = actions.responses().iter().find_map(|r| match &r.response {
        HumanResponse::Edit(request) => Some(request),
        _ => None,
    });
    let request = edited.or_else(|| actions.interrupt().map(|i| &i.action_request));
    request
        .map(|r| {
            r.args
                .iter()
                .map(|(k, v)| (k.clone(), stringify_arg(v)))
                .collect()
        })
        .unwrap_or_default()
}

fn offered(actions: &InterruptedActions) -> Vec<SubmitType> {
    let mut kinds: Vec<SubmitType> = actions.responses().iter().map(|r| r.kind()).collect();
    kinds.dedup();
    kinds
}

impl InterruptPanel {
    /// Build the panel for an interrupt. Undecodable payloads only offer ignore.
    #[must_use]
    pub fn new(interrupt: &Interrupt) -> Self {
        let carousel = match interrupt.human_interrupts() {
            Ok(items) if !items.is_empty() => InterruptCarousel::new(items),
            Ok(_) => InterruptCarousel::invalid(),
            Err(e) => {
                tracing::warn!(error = %e, "could not decode interrupt");
                InterruptCarousel::invalid()
            }
        };
        Self {
            title: interrupt.title(),
            carousel,
            mode: PanelMode::Choose,
            field: 0,
            error: None,
        }
    }

    #[must_use]
    pub const fn mode(&self) -> &PanelMode {
        &self.mode
    }

    #[must_use]
    pub const fn carousel(&self) -> &InterruptCarousel {
        &self.carousel
    }

    #[must_use]
    pub fn error(&self) -> Option<&str> {
        self.error.as_deref()
    }

    fn fields(&self) -> Vec<(String, String)> {
        self.carousel.current().map(current_args).unwrap_or_default()
    }

    fn report(&mut self, result: crate::core::Result<()>) {
        self.error = result.err().map(|e| e.to_string());
    }

    /// Handle a key press.
    pub fn handle_key(&mut self, code: KeyCode, modifiers: KeyModifiers) -> PanelOutcome {
        match std::mem::replace(&mut self.mode, PanelMode::Choose) {
            PanelMode::Choose => self.handle_choose(code, modifiers),
            PanelMode::EditField { key, mut buffer } => {
                match code {
                    KeyCode::Enter => {
                        let text = buffer.take();
                        let result = self
                            .carousel
                            .current_mut()
                            .map_or(Ok(()), |a| a.edit_field(&key, text));
                        self.report(result);
                    }
                    KeyCode::Esc => {}
                    other => {
                        edit_buffer(&mut buffer, other, modifiers);
                        self.mode = PanelMode::EditField { key, buffer };
                    }
                }
                PanelOutcome::None
            }
            PanelMode::Respond(mut buffer) => {
                match code {
                    KeyCode::Enter => {
                        let text = buffer.take();
                        let result = self
                            .carousel
                            .current_mut()
                            .map_or(Ok(()), |a| a.set_response(text));
                        self.report(result);
                    }
                    KeyCode::Esc => {}
                    other => {
                        edit_buffer(&mut buffer, other, modifiers);
                        self.mode = PanelMode::Respond(buffer);
                    }
                }
                PanelOutcome::None
            }
        }
    }

    fn handle_choose(&mut self, code: KeyCode, modifiers: KeyModifiers) -> PanelOutcome {
        let shift = modifiers.contains(KeyModifiers::SHIFT);
        match code {
            KeyCode::Left => {
                self.carousel.select_previous();
                self.field = 0;
            }
            KeyCode::Right => {
                self.carousel.select_next();
                self.field = 0;
            }
            KeyCode::Up => self.field = self.field.saturating_sub(1),
            KeyCode::Down => {
                let count = self.fields().len();
                if self.field + 1 < count {
                    self.field += 1;
                }
            }
            KeyCode::Char('A') => return self.accept_all(),
            KeyCode::Char('a') if shift => return self.accept_all(),
            KeyCode::Char('a') => self.select(SubmitType::Accept),
            KeyCode::Char('i') => self.select(SubmitType::Ignore),
            KeyCode::Char('e') => {
                if let Some((key, value)) = self.fields().into_iter().nth(self.field) {
                    self.mode = PanelMode::EditField {
                        key,
                        buffer: InputBuffer::with_text(value),
                    };
                }
            }
            KeyCode::Char('u') => {
                let result = self
                    .carousel
                    .current_mut()
                    .map_or(Ok(()), InterruptedActions::reset_edits);
                self.report(result);
            }
            KeyCode::Char('r') => {
                let current = self
                    .carousel
                    .current()
                    .and_then(InterruptedActions::response_text)
                    .map(ToString::to_string);
                match current {
                    Some(text) => self.mode = PanelMode::Respond(InputBuffer::with_text(text)),
                    None => {
                        self.error = Some("this interrupt does not accept a response".to_string());
                    }
                }
            }
            KeyCode::Char('m') => return PanelOutcome::Resolve,
            KeyCode::Enter => return self.submit(),
            _ => {}
        }
        PanelOutcome::None
    }

    fn select(&mut self, kind: SubmitType) {
        let Some(actions) = self.carousel.current_mut() else {
            return;
        };
        if offered(actions).contains(&kind) {
            actions.select(kind);
            self.error = None;
        } else {
            self.error = Some(format!("{} is not allowed here", kind.as_str()));
        }
    }

    fn accept_all(&mut self) -> PanelOutcome {
        match self.carousel.accept_all() {
            Ok(responses) => PanelOutcome::Submit(responses),
            Err(e) => {
                self.error = Some(e.to_string());
                PanelOutcome::None
            }
        }
    }

    fn submit(&mut self) -> PanelOutcome {
        let result = if self.carousel.len() > 1 {
            self.carousel.address_current().and_then(|()| {
                if self.carousel.all_interrupts_addressed() {
                    self.carousel.submit_all().map(Some)
                } else {
                    Ok(None)
                }
            })
        } else {
            self.carousel
                .current_mut()
                .map_or(Ok(None), |a| a.submit().map(Some))
        };

        match result {
            Ok(Some(responses)) => {
                self.error = None;
                PanelOutcome::Submit(responses)
            }
            Ok(None) => {
                self.error = None;
                PanelOutcome::None
            }
            Err(e) => {
                self.error = Some(e.to_string());
                PanelOutcome::None
            }
        }
    }

    /// Rows the panel wants, borders included.
    #[must_use]
    pub fn height(&self) -> u16 {
        to_u16(self.fields().len().min(8)) + 7
    }

    /// Render the panel into `area`.
    pub fn render(&self, frame: &mut Frame, area: Rect) {
        let position = if self.carousel.len() > 1 {
            format!(
                " ({}/{}, {} answered)",
                self.carousel.current_index() + 1,
                self.carousel.len(),
                (0..self.carousel.len())
                    .filter(|&i| self.carousel.is_addressed(i))
                    .count()
            )
        } else {
            String::new()
        };
        let block = Block::default()
            .title(format!(" {}{position} ", self.title))
            .borders(Borders::ALL)
            .border_style(Style::default().fg(WARN_COLOR))
            .style(Style::default().bg(DIALOG_BG));

        let mut lines = Vec::new();
        let current = self.carousel.current();

        if let Some(description) = current
            .and_then(InterruptedActions::interrupt)
            .and_then(|i| i.description.as_deref())
        {
            lines.push(Line::from(Span::styled(
                description.to_string(),
                Style::default().fg(DIMMED),
            )));
        }

        for (index, (key, value)) in self.fields().into_iter().enumerate().take(8) {
            let editing = matches!(&self.mode, PanelMode::EditField { key: k, .. } if *k == key);
            let shown = match &self.mode {
                PanelMode::EditField { buffer, .. } if editing => format!("{}▏", buffer.text()),
                _ => value.replace('\n', "⏎"),
            };
            let style = if index == self.field {
                Style::default().bg(SELECTED_BG)
            } else {
                Style::default()
            };
            lines.push(Line::from(vec![
                Span::styled(format!("{key}: "), style.fg(BRAND_TEAL)),
                Span::styled(shown, style),
            ]));
        }

        if let PanelMode::Respond(buffer) = &self.mode {
            lines.push(Line::from(vec![
                Span::styled("response: ", Style::default().fg(BRAND_TEAL)),
                Span::raw(format!("{}▏", buffer.text())),
            ]));
        } else if let Some(text) = current
            .and_then(InterruptedActions::response_text)
            .filter(|t| !t.is_empty())
        {
            lines.push(Line::from(vec![
                Span::styled("response: ", Style::default().fg(BRAND_TEAL)),
                Span::raw(text.to_string()),
            ]));
        }

        if let Some(actions) = current {
            let selected = actions.selected_submit_type();
            let options: Vec<Span> = offered(actions)
                .into_iter()
                .flat_map(|kind| {
                    let style = if Some(kind) == selected {
                        Style::default().fg(BRAND_TEAL).add_modifier(Modifier::BOLD)
                    } else {
                        Style::default().fg(DIMMED)
                    };
                    [Span::styled(format!("[{}]", kind.as_str()), style), Span::raw(" ")]
                })
                .collect();
            lines.push(Line::from(options));
        }

        let mut help = String::from("a accept  e edit  u undo  r respond  i ignore  m resolve  enter submit");
        if self.carousel.len() > 1 {
            help.push_str("  ←→ switch");
        }
        if self.carousel.accept_all_available() {
            help.push_str("  A accept all");
        }
        lines.push(Line::from(Span::styled(help, Style::default().fg(DIMMED))));

        if let Some(error) = &self.error {
            lines.push(Line::from(Span::styled(
                error.clone(),
                Style::default().fg(ERROR_COLOR),
            )));
        }

        frame.render_widget(Clear, area);
        frame.render_widget(
            Paragraph::new(lines).block(block).wrap(Wrap { trim: false }),
            area,
        );
    }
}

/// Apply a line-editing key to a buffer.
pub fn edit_buffer(buffer: &mut InputBuffer, code: KeyCode, modifiers: KeyModifiers) {
    let ctrl = modifiers.contains(KeyModifiers::CONTROL);
    match code {
        KeyCode::Char('w') if ctrl => buffer.delete_word(),
        KeyCode::Char('u') if ctrl => buffer.clear(),
        KeyCode::Char('a') if ctrl => buffer.home(),
        KeyCode::Char('e') if ctrl => buffer.end(),
        KeyCode::Char(c) => buffer.insert(c),
        KeyCode::Backspace => buffer.backspace(),
        KeyCode::Delete => buffer.delete(),
        KeyCode::Left => buffer.left(),
        KeyCode::Right => buffer.right(),
        KeyCode::Home => buffer.home(),
        KeyCode::End => buffer.end(),
        _ => {}
    }
}
