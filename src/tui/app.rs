//! TUI application state and key handling.
//!
//! The app never talks to the network. Keys are turned into [`Action`]s
//! that the event loop runs against the chat session, and results come back
//! as plain state updates.

use crossterm::event::{KeyCode, KeyModifiers};

use super::components::{
    FileDialog, FileOutcome, InputBuffer, InterruptPanel, OptimizerDialog, PanelMode, PanelOutcome,
    ThreadListDialog, edit_buffer,
};
use crate::chat::ChatView;
use crate::core::diff::DiffFormat;
use crate::core::interrupt::{HumanResponse, Interrupt};
use crate::core::optimizer::OptimizerEntry;
use crate::core::threads::ThreadSummary;

/// Lines moved per scroll step.
const SCROLL_STEP: u16 = 3;

/// Work for the event loop.
#[derive(Debug, Clone, PartialEq)]
pub enum Action {
    Quit,
    /// Submit a message (a single step in debug mode).
    Send(String),
    Stop,
    NewThread,
    /// Fetch the thread history list.
    LoadThreads,
    OpenThread(String),
    Respond(Vec<HumanResponse>),
    MarkResolved,
    /// Continue a paused debug run.
    Continue,
    /// Rerun from just before a message.
    Restart { message_id: String, is_subagent: bool },
    SaveFile { path: String, content: String },
    Optimize(String),
    Approve(String),
    Reject(String),
}

/// Where keys go when no dialog is open.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Focus {
    Input,
    Interrupt,
    Files,
}

/// Modal dialog over the chat.
#[derive(Debug, Clone)]
pub enum Dialog {
    Threads(ThreadListDialog),
    File(FileDialog),
    Optimizer(OptimizerDialog),
    Help,
}

/// Application state for the TUI.
#[derive(Debug)]
pub struct App {
    pub input: InputBuffer,
    pub view: ChatView,
    pub thread_id: Option<String>,
    pub assistant_name: String,
    pub assistant_error: Option<String>,
    pub interrupt_panel: Option<InterruptPanel>,
    pub dialog: Option<Dialog>,
    pub focus: Focus,
    /// Transient notification for the status line.
    pub status: Option<String>,
    pub debug: bool,
    /// Lines scrolled up from the bottom of the conversation.
    pub scroll: u16,
    pub expand_tools: bool,
    pub selected_file: usize,
    pub optimizer_entries: Vec<OptimizerEntry>,
    pub diff_format: DiffFormat,
    /// Interrupt the panel was built from.
    panel_source: Option<Interrupt>,
}

impl App {
    #[must_use]
    pub fn new(assistant_name: impl Into<String>, debug: bool, diff_format: DiffFormat) -> Self {
        Self {
            input: InputBuffer::new(),
            view: ChatView::default(),
            thread_id: None,
            assistant_name: assistant_name.into(),
            assistant_error: None,
            interrupt_panel: None,
            dialog: None,
            focus: Focus::Input,
            status: None,
            debug,
            scroll: 0,
            expand_tools: false,
            selected_file: 0,
            optimizer_entries: Vec::new(),
            diff_format,
            panel_source: None,
        }
    }

    /// Take a fresh snapshot of the session view.
    ///
    /// The interrupt panel is rebuilt only when the interrupt itself
    /// changes, so edits in progress survive streaming updates.
    pub fn set_view(&mut self, view: ChatView) {
        if view.interrupt != self.panel_source {
            self.interrupt_panel = view.interrupt.as_ref().map(InterruptPanel::new);
            self.panel_source = view.interrupt.clone();
            self.focus = if self.interrupt_panel.is_some() {
                Focus::Interrupt
            } else if self.focus == Focus::Interrupt {
                Focus::Input
            } else {
                self.focus
            };
        }
        if let Some(error) = &view.error {
            self.status = Some(error.clone());
        }
        self.selected_file = self
            .selected_file
            .min(view.files().len().saturating_sub(1));
        self.view = view;
    }

    #[must_use]
    pub const fn is_loading(&self) -> bool {
        self.view.is_loading
    }

    #[must_use]
    pub const fn has_dialog(&self) -> bool {
        self.dialog.is_some()
    }

    pub fn threads_loaded(&mut self, result: Result<Vec<ThreadSummary>, String>) {
        if let Some(Dialog::Threads(dialog)) = &mut self.dialog {
            match result {
                Ok(threads) => dialog.set_threads(threads),
                Err(e) => dialog.set_error(e),
            }
        }
    }

    /// Record the optimizer's history after a request finished.
    pub fn optimizer_updated(&mut self, entries: Vec<OptimizerEntry>, error: Option<String>) {
        self.optimizer_entries = entries;
        if let Some(Dialog::Optimizer(dialog)) = &mut self.dialog {
            dialog.loading = false;
            dialog.selected = 0;
            dialog.scroll = 0;
            dialog.error = error;
        } else if let Some(error) = error {
            self.status = Some(error);
        }
    }

    fn last_ai_message(&self, task_only: bool) -> Option<String> {
        self.view
            .messages()
            .iter()
            .rev()
            .filter(|m| m.is_ai())
            .find(|m| !task_only || m.tool_calls.iter().any(|c| c.name.as_deref() == Some("task")))
            .and_then(|m| m.id.clone())
    }

    /// Handle a key press, returning work for the event loop.
    pub fn handle_key(&mut self, code: KeyCode, modifiers: KeyModifiers) -> Option<Action> {
        let ctrl = modifiers.contains(KeyModifiers::CONTROL);
        if ctrl && code == KeyCode::Char('c') {
            return Some(Action::Quit);
        }
        if self.dialog.is_some() {
            return self.handle_dialog_key(code, modifiers);
        }
        if ctrl {
            if let Some(action) = self.handle_global(code) {
                return action;
            }
        }
        match self.focus {
            Focus::Interrupt => self.handle_interrupt_key(code, modifiers),
            Focus::Files => self.handle_files_key(code),
            Focus::Input => self.handle_input_key(code, modifiers),
        }
    }

    /// Control shortcuts available outside dialogs. `Some(None)` means the
    /// key was consumed without producing an action.
    fn handle_global(&mut self, code: KeyCode) -> Option<Option<Action>> {
        let action = match code {
            KeyCode::Char('n') => {
                self.input.clear();
                self.scroll = 0;
                Some(Action::NewThread)
            }
            KeyCode::Char('t') => {
                self.dialog = Some(Dialog::Threads(ThreadListDialog::loading()));
                Some(Action::LoadThreads)
            }
            KeyCode::Char('p') => {
                self.dialog = Some(Dialog::Optimizer(OptimizerDialog::new(self.diff_format)));
                None
            }
            KeyCode::Char('o') => {
                self.expand_tools = !self.expand_tools;
                None
            }
            KeyCode::Char('f') => {
                self.focus = if self.focus == Focus::Files || self.view.files().is_empty() {
                    Focus::Input
                } else {
                    Focus::Files
                };
                None
            }
            KeyCode::Char('r') if self.debug && !self.is_loading() => {
                match self.last_ai_message(false) {
                    Some(message_id) => Some(Action::Restart {
                        message_id,
                        is_subagent: false,
                    }),
                    None => {
                        self.status = Some("nothing to restart from".to_string());
                        None
                    }
                }
            }
            KeyCode::Char('g') if self.debug && !self.is_loading() => {
                match self.last_ai_message(true) {
                    Some(message_id) => Some(Action::Restart {
                        message_id,
                        is_subagent: true,
                    }),
                    None => {
                        self.status = Some("no sub-agent call to rerun".to_string());
                        None
                    }
                }
            }
            _ => return None,
        };
        Some(action)
    }

    fn handle_input_key(&mut self, code: KeyCode, modifiers: KeyModifiers) -> Option<Action> {
        let ctrl = modifiers.contains(KeyModifiers::CONTROL);
        let newline = modifiers.intersects(KeyModifiers::SHIFT | KeyModifiers::ALT);
        match code {
            KeyCode::Esc if self.is_loading() => return Some(Action::Stop),
            KeyCode::Esc => self.status = None,
            KeyCode::Enter if newline => self.input.insert('\n'),
            KeyCode::Enter => {
                if self.is_loading() {
                    self.status = Some("wait for the agent to finish or press esc".to_string());
                    return None;
                }
                if self.input.text().trim().is_empty() {
                    if self.debug && !self.view.messages().is_empty() && self.view.interrupt.is_none() {
                        return Some(Action::Continue);
                    }
                    return None;
                }
                self.scroll = 0;
                self.status = None;
                return Some(Action::Send(self.input.take()));
            }
            KeyCode::Tab if self.interrupt_panel.is_some() => self.focus = Focus::Interrupt,
            KeyCode::F(1) | KeyCode::Char('?') if self.input.is_empty() => {
                self.dialog = Some(Dialog::Help);
            }
            KeyCode::PageUp => self.scroll = self.scroll.saturating_add(SCROLL_STEP * 4),
            KeyCode::PageDown => self.scroll = self.scroll.saturating_sub(SCROLL_STEP * 4),
            KeyCode::Up if self.input.is_empty() => {
                self.scroll = self.scroll.saturating_add(SCROLL_STEP);
            }
            KeyCode::Down if self.input.is_empty() => {
                self.scroll = self.scroll.saturating_sub(SCROLL_STEP);
            }
            KeyCode::Char('w') if ctrl => self.input.delete_word(),
            KeyCode::Char('u') if ctrl => self.input.clear(),
            KeyCode::Char(c) if !ctrl => self.input.insert(c),
            KeyCode::Backspace => self.input.backspace(),
            KeyCode::Delete => self.input.delete(),
            KeyCode::Left => self.input.left(),
            KeyCode::Right => self.input.right(),
            KeyCode::Home => self.input.home(),
            KeyCode::End => self.input.end(),
            _ => {}
        }
        None
    }

    fn handle_interrupt_key(&mut self, code: KeyCode, modifiers: KeyModifiers) -> Option<Action> {
        let Some(panel) = &mut self.interrupt_panel else {
            self.focus = Focus::Input;
            return None;
        };
        if matches!(panel.mode(), PanelMode::Choose) {
            match code {
                KeyCode::Esc | KeyCode::Tab => {
                    self.focus = Focus::Input;
                    return None;
                }
                _ if self.view.is_loading => {
                    self.status = Some("the run is still streaming".to_string());
                    return None;
                }
                _ => {}
            }
        }
        match panel.handle_key(code, modifiers) {
            PanelOutcome::None => None,
            PanelOutcome::Submit(responses) => Some(Action::Respond(responses)),
            PanelOutcome::Resolve => Some(Action::MarkResolved),
        }
    }

    fn handle_files_key(&mut self, code: KeyCode) -> Option<Action> {
        let count = self.view.files().len();
        match code {
            KeyCode::Esc | KeyCode::Tab => self.focus = Focus::Input,
            KeyCode::Up => self.selected_file = self.selected_file.saturating_sub(1),
            KeyCode::Down if self.selected_file + 1 < count => self.selected_file += 1,
            KeyCode::Enter => {
                if let Some((path, content)) = self.view.files().iter().nth(self.selected_file) {
                    self.dialog = Some(Dialog::File(FileDialog::new(path.clone(), content.clone())));
                }
            }
            _ => {}
        }
        None
    }

    fn handle_dialog_key(&mut self, code: KeyCode, modifiers: KeyModifiers) -> Option<Action> {
        let ctrl = modifiers.contains(KeyModifiers::CONTROL);
        let dialog = self.dialog.as_mut()?;
        match dialog {
            Dialog::Help => {
                self.dialog = None;
                None
            }
            Dialog::Threads(threads) => match code {
                KeyCode::Esc => {
                    self.dialog = None;
                    None
                }
                KeyCode::Char('n') if ctrl => {
                    self.dialog = None;
                    Some(Action::NewThread)
                }
                KeyCode::Up => {
                    threads.select_previous();
                    None
                }
                KeyCode::Down => {
                    threads.select_next();
                    None
                }
                KeyCode::Enter => {
                    let id = threads.selected_thread().map(|t| t.id.clone());
                    if id.is_some() {
                        self.dialog = None;
                        self.scroll = 0;
                    }
                    id.map(Action::OpenThread)
                }
                KeyCode::Backspace => {
                    threads.filter_pop();
                    None
                }
                KeyCode::Char(c) if !ctrl => {
                    threads.filter_push(c);
                    None
                }
                _ => None,
            },
            Dialog::File(file) => match file.handle_key(code, modifiers) {
                FileOutcome::None => None,
                FileOutcome::Close => {
                    self.dialog = None;
                    None
                }
                FileOutcome::Save { path, content } => Some(Action::SaveFile { path, content }),
            },
            Dialog::Optimizer(optimizer) => {
                let current = optimizer
                    .current(&self.optimizer_entries)
                    .map(|p| p.id.clone());
                match code {
                    KeyCode::Esc => {
                        self.dialog = None;
                        None
                    }
                    KeyCode::Enter => {
                        if optimizer.loading || optimizer.feedback.text().trim().is_empty() {
                            return None;
                        }
                        let feedback = optimizer.feedback.take();
                        optimizer.loading = true;
                        optimizer.error = None;
                        self.optimizer_entries.push(OptimizerEntry::User {
                            content: feedback.clone(),
                        });
                        Some(Action::Optimize(feedback))
                    }
                    KeyCode::Char('y') if ctrl => current.map(Action::Approve),
                    KeyCode::Char('n') if ctrl => current.map(Action::Reject),
                    KeyCode::Char('f') if ctrl => {
                        optimizer.toggle_format();
                        self.diff_format = optimizer.format;
                        None
                    }
                    KeyCode::Up => {
                        optimizer.scroll = optimizer.scroll.saturating_sub(1);
                        None
                    }
                    KeyCode::Down => {
                        optimizer.scroll = optimizer.scroll.saturating_add(1);
                        None
                    }
                    KeyCode::PageUp => {
                        optimizer.selected = optimizer.selected.saturating_sub(1);
                        optimizer.scroll = 0;
                        None
                    }
                    KeyCode::PageDown => {
                        optimizer.selected += 1;
                        optimizer.scroll = 0;
                        None
                    }
                    other => {
                        edit_buffer(&mut optimizer.feedback, other, modifiers);
                        None
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::interrupt::SubmitType;
    use crate::core::message::{Message, ToolCallDescriptor};
    use crate::core::optimizer::{ConfigProposal, ProposalStatus};
    use serde_json::json;

    fn app() -> App {
        App::new("Research agent", false, DiffFormat::Yaml)
    }

    fn press(app: &mut App, code: KeyCode) -> Option<Action> {
        app.handle_key(code, KeyModifiers::NONE)
    }

    fn ctrl(app: &mut App, c: char) -> Option<Action> {
        app.handle_key(KeyCode::Char(c), KeyModifiers::CONTROL)
    }

    fn type_text(app: &mut App, text: &str) {
        for c in text.chars() {
            press(app, KeyCode::Char(c));
        }
    }

    fn interrupted_view() -> ChatView {
        let mut view = ChatView::default();
        view.interrupt = Some(Interrupt {
            value: json!([{
                "action_request": {"action": "write_file", "args": {"path": "a.md"}},
                "config": {"allow_accept": true, "allow_ignore": true, "allow_respond": false, "allow_edit": false},
                "description": "Write a.md"
            }]),
            ..Interrupt::default()
        });
        view
    }

    #[test]
    fn enter_sends_and_clears_input() {
        let mut app = app();
        type_text(&mut app, "hello");
        assert_eq!(press(&mut app, KeyCode::Enter), Some(Action::Send("hello".to_string())));
        assert!(app.input.is_empty());
        assert_eq!(press(&mut app, KeyCode::Enter), None);
    }

    #[test]
    fn shift_enter_inserts_newline() {
        let mut app = app();
        type_text(&mut app, "a");
        assert_eq!(app.handle_key(KeyCode::Enter, KeyModifiers::SHIFT), None);
        type_text(&mut app, "b");
        assert_eq!(app.input.text(), "a\nb");
    }

    #[test]
    fn escape_stops_a_running_agent() {
        let mut app = app();
        let mut view = ChatView::default();
        view.is_loading = true;
        app.set_view(view);
        type_text(&mut app, "more");
        assert_eq!(press(&mut app, KeyCode::Enter), None);
        assert!(app.status.is_some());
        assert_eq!(press(&mut app, KeyCode::Esc), Some(Action::Stop));
    }

    #[test]
    fn interrupt_takes_focus_and_accepts() {
        let mut app = app();
        app.set_view(interrupted_view());
        assert_eq!(app.focus, Focus::Interrupt);

        match press(&mut app, KeyCode::Enter) {
            Some(Action::Respond(responses)) => {
                let kinds: Vec<_> = responses.iter().map(HumanResponse::kind).collect();
                assert_eq!(kinds, [SubmitType::Accept]);
            }
            other => panic!("unexpected {other:?}"),
        }

        press(&mut app, KeyCode::Esc);
        assert_eq!(app.focus, Focus::Input);
        assert_eq!(press(&mut app, KeyCode::Tab), None);
        assert_eq!(app.focus, Focus::Interrupt);
        assert_eq!(press(&mut app, KeyCode::Char('m')), Some(Action::MarkResolved));
    }

    #[test]
    fn same_interrupt_keeps_panel() {
        let mut app = app();
        app.set_view(interrupted_view());
        press(&mut app, KeyCode::Char('i'));
        let before = format!("{:?}", app.interrupt_panel);
        app.set_view(interrupted_view());
        assert_eq!(format!("{:?}", app.interrupt_panel), before);

        app.set_view(ChatView::default());
        assert!(app.interrupt_panel.is_none());
        assert_eq!(app.focus, Focus::Input);
    }

    #[test]
    fn thread_dialog_opens_selected_thread() {
        let mut app = app();
        assert_eq!(ctrl(&mut app, 't'), Some(Action::LoadThreads));
        app.threads_loaded(Ok(vec![ThreadSummary {
            id: "t1".to_string(),
            title: "Report".to_string(),
            snippet: String::new(),
            status: crate::client::ThreadStatus::Idle,
            updated_at: None,
        }]));
        assert_eq!(
            press(&mut app, KeyCode::Enter),
            Some(Action::OpenThread("t1".to_string()))
        );
        assert!(!app.has_dialog());
    }

    #[test]
    fn files_open_in_editor_and_save() {
        let mut app = app();
        let mut view = ChatView::default();
        view.values.files.insert("notes.md".to_string(), "draft".to_string());
        app.set_view(view);

        ctrl(&mut app, 'f');
        assert_eq!(app.focus, Focus::Files);
        press(&mut app, KeyCode::Enter);
        assert!(matches!(app.dialog, Some(Dialog::File(_))));

        press(&mut app, KeyCode::Char('e'));
        type_text(&mut app, "!");
        assert_eq!(
            ctrl(&mut app, 's'),
            Some(Action::SaveFile {
                path: "notes.md".to_string(),
                content: "draft!".to_string(),
            })
        );
    }

    #[test]
    fn optimizer_feedback_and_review() {
        let mut app = app();
        assert_eq!(ctrl(&mut app, 'p'), None);
        type_text(&mut app, "be brief");
        assert_eq!(
            press(&mut app, KeyCode::Enter),
            Some(Action::Optimize("be brief".to_string()))
        );
        assert_eq!(app.optimizer_entries.len(), 1);

        app.optimizer_updated(
            vec![
                OptimizerEntry::User {
                    content: "be brief".to_string(),
                },
                OptimizerEntry::Optimizer(ConfigProposal {
                    id: "p1".to_string(),
                    status: ProposalStatus::Pending,
                    old_config: json!({"prompt": "long"}),
                    new_config: json!({"prompt": "short"}),
                }),
            ],
            None,
        );
        assert_eq!(ctrl(&mut app, 'y'), Some(Action::Approve("p1".to_string())));
        assert_eq!(ctrl(&mut app, 'n'), Some(Action::Reject("p1".to_string())));
    }

    #[test]
    fn debug_shortcuts() {
        let mut app = App::new("agent", true, DiffFormat::Yaml);
        let mut view = ChatView::default();
        view.values.messages = vec![
            Message::human("go").with_id("h1"),
            Message::ai("a1", "").with_tool_calls(vec![ToolCallDescriptor {
                id: Some("t1".to_string()),
                name: Some("task".to_string()),
                args: Some(json!({})),
                ..Default::default()
            }]),
            Message::ai("a2", "done"),
        ];
        app.set_view(view);

        assert_eq!(press(&mut app, KeyCode::Enter), Some(Action::Continue));
        assert_eq!(
            ctrl(&mut app, 'r'),
            Some(Action::Restart {
                message_id: "a2".to_string(),
                is_subagent: false,
            })
        );
        assert_eq!(
            ctrl(&mut app, 'g'),
            Some(Action::Restart {
                message_id: "a1".to_string(),
                is_subagent: true,
            })
        );
    }
}
