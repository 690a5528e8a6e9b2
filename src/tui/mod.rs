//! Terminal user interface for deep agent chat.

mod app;
mod components;

use std::io;
use std::sync::Arc;
use std::time::Duration;

use crossterm::{
    event::{
        self, DisableBracketedPaste, DisableMouseCapture, EnableBracketedPaste, EnableMouseCapture,
        Event, KeyEventKind, MouseEventKind,
    },
    execute,
    terminal::{EnterAlternateScreen, LeaveAlternateScreen, disable_raw_mode, enable_raw_mode},
};
use ratatui::{
    Frame, Terminal,
    backend::CrosstermBackend,
    layout::{Alignment, Constraint, Layout, Position, Rect},
    style::{Modifier, Style},
    text::{Line, Span},
    widgets::{Block, Borders, Clear, Paragraph},
};
use tokio::sync::{Mutex, mpsc};

use crate::chat::{ChatEvent, ChatSession};
use crate::config::Config;
use crate::core::debounce::Debouncer;
use crate::core::message::Message;
use crate::core::optimizer::{Optimizer, OptimizerEntry};
use crate::core::threads::{ThreadSummary, history_query, summarize_threads};

pub use app::{Action, App, Dialog, Focus};
use components::{
    render_file, render_messages, render_optimizer, render_sidebar, render_thread_list,
    theme::{BRAND_TEAL, DIALOG_BG, DIMMED, ERROR_COLOR, WARN_COLOR},
    to_u16,
};

/// Title for threads whose first message has no text.
const UNTITLED: &str = "Untitled thread";
const SIDEBAR_WIDTH: u16 = 34;
const INPUT_MAX_LINES: u16 = 6;

/// Results of background work, delivered back to the event loop.
#[derive(Debug)]
enum AppEvent {
    Assistant(Result<String, String>),
    Threads(Result<Vec<ThreadSummary>, String>),
    Optimizer {
        entries: Vec<OptimizerEntry>,
        error: Option<String>,
    },
    Status(String),
}

/// Everything the background tasks share.
#[derive(Clone)]
struct Handles {
    session: Arc<ChatSession>,
    optimizer: Option<Arc<Mutex<Optimizer>>>,
    events: mpsc::UnboundedSender<AppEvent>,
}

impl Handles {
    fn send(&self, event: AppEvent) {
        if self.events.send(event).is_err() {
            tracing::trace!("app event receiver dropped");
        }
    }

    /// Run `work` in the background, reporting failures on the status line.
    fn spawn<F>(&self, label: &'static str, work: F)
    where
        F: Future<Output = crate::core::Result<()>> + Send + 'static,
    {
        let handles = self.clone();
        tokio::spawn(async move {
            if let Err(e) = work.await {
                tracing::warn!(action = label, error = %e, "action failed");
                handles.send(AppEvent::Status(format!("{label} failed: {e}")));
            }
        });
    }
}

/// Run the TUI until the user quits.
///
/// # Errors
///
/// Returns an error if terminal initialization fails or the event loop encounters an error.
pub async fn run(
    config: &Config,
    session: ChatSession,
    chat_events: mpsc::UnboundedReceiver<ChatEvent>,
    optimizer: Option<Optimizer>,
    thread_id: Option<String>,
    debug: bool,
) -> anyhow::Result<()> {
    enable_raw_mode()?;
    let mut stdout = io::stdout();
    execute!(stdout, EnterAlternateScreen, EnableBracketedPaste)?;
    if config.tui.mouse {
        execute!(stdout, EnableMouseCapture)?;
    }

    let backend = CrosstermBackend::new(stdout);
    let mut terminal = Terminal::new(backend)?;

    let mut app = App::new(
        config.chat.assistant_id.clone(),
        debug || config.tui.debug,
        config.tui.diff_format,
    );
    let (events_tx, events_rx) = mpsc::unbounded_channel();
    let handles = Handles {
        session: Arc::new(session),
        optimizer: optimizer.map(|o| Arc::new(Mutex::new(o))),
        events: events_tx,
    };

    let refresh_delay = Duration::from_millis(config.tui.refresh_debounce_ms);
    let result = run_app(
        &mut terminal,
        &mut app,
        &handles,
        chat_events,
        events_rx,
        refresh_delay,
        thread_id,
    )
    .await;

    disable_raw_mode()?;
    if config.tui.mouse {
        execute!(terminal.backend_mut(), DisableMouseCapture)?;
    }
    execute!(
        terminal.backend_mut(),
        DisableBracketedPaste,
        LeaveAlternateScreen
    )?;
    terminal.show_cursor()?;

    result
}

#[allow(clippy::too_many_arguments)]
async fn run_app(
    terminal: &mut Terminal<CrosstermBackend<io::Stdout>>,
    app: &mut App,
    handles: &Handles,
    mut chat_events: mpsc::UnboundedReceiver<ChatEvent>,
    mut app_events: mpsc::UnboundedReceiver<AppEvent>,
    refresh_delay: Duration,
    thread_id: Option<String>,
) -> anyhow::Result<()> {
    let (refresh, mut refresh_rx) = Debouncer::<()>::spawn(refresh_delay);

    let assistant = handles.clone();
    tokio::spawn(async move {
        let result = assistant
            .session
            .refresh_assistant()
            .await
            .map(|a| if a.name.is_empty() { a.assistant_id } else { a.name })
            .map_err(|e| e.to_string());
        assistant.send(AppEvent::Assistant(result));
    });

    if let Some(id) = thread_id {
        let session = Arc::clone(&handles.session);
        handles.spawn("load thread", async move { session.load_thread(&id).await });
    }

    loop {
        terminal.draw(|f| render(f, app))?;

        tokio::select! {
            () = tokio::time::sleep(Duration::from_millis(10)) => {
                while event::poll(Duration::from_millis(0))? {
                    match event::read()? {
                        Event::Key(key) if key.kind != KeyEventKind::Release => {
                            if let Some(action) = app.handle_key(key.code, key.modifiers) {
                                if action == Action::Quit {
                                    return Ok(());
                                }
                                perform(app, handles, action);
                            }
                        }
                        Event::Paste(text) => {
                            if !app.has_dialog() && app.focus == Focus::Input {
                                app.input.insert_str(text.trim_end_matches(['\n', '\r']));
                            }
                        }
                        Event::Mouse(mouse) if !app.has_dialog() => match mouse.kind {
                            MouseEventKind::ScrollUp => app.scroll = app.scroll.saturating_add(3),
                            MouseEventKind::ScrollDown => app.scroll = app.scroll.saturating_sub(3),
                            _ => {}
                        },
                        _ => {}
                    }
                }
            }

            Some(event) = chat_events.recv() => {
                match event {
                    ChatEvent::ThreadCreated(id) => {
                        tracing::debug!(thread_id = %id, "thread created");
                        refresh.push(());
                    }
                    ChatEvent::Updated => {}
                    ChatEvent::Finished => refresh.push(()),
                    ChatEvent::Error(e) => app.status = Some(e),
                }
                app.set_view(handles.session.view());
                app.thread_id = handles.session.thread_id();
            }

            Some(event) = app_events.recv() => match event {
                AppEvent::Assistant(Ok(name)) => {
                    app.assistant_name = name;
                    app.assistant_error = None;
                }
                AppEvent::Assistant(Err(e)) => app.assistant_error = Some(e),
                AppEvent::Threads(result) => app.threads_loaded(result),
                AppEvent::Optimizer { entries, error } => app.optimizer_updated(entries, error),
                AppEvent::Status(status) => app.status = Some(status),
            },

            Some(()) = refresh_rx.recv() => {
                if matches!(app.dialog, Some(Dialog::Threads(_))) {
                    load_threads(handles);
                }
            }
        }
    }
}

fn load_threads(handles: &Handles) {
    let handles = handles.clone();
    tokio::spawn(async move {
        let client = handles.session.client();
        let query = history_query(Some(handles.session.assistant_id()));
        let result = client
            .search_threads(&query)
            .await
            .map(|threads| summarize_threads(&threads, UNTITLED))
            .map_err(|e| e.to_string());
        handles.send(AppEvent::Threads(result));
    });
}

/// Run an action in the background.
fn perform(app: &mut App, handles: &Handles, action: Action) {
    tracing::debug!(action = ?action, "performing action");
    let session = Arc::clone(&handles.session);
    match action {
        Action::Quit => {}
        Action::Send(text) => {
            if app.debug {
                let human = Message::human(text);
                let mut optimistic = session.view().messages();
                optimistic.push(human.clone());
                handles.spawn("send", async move {
                    session
                        .run_single_step(vec![human], None, false, Some(optimistic))
                        .await
                });
            } else {
                handles.spawn("send", async move { session.send_message(&text).await });
            }
        }
        Action::Stop => handles.spawn("stop", async move { session.stop().await }),
        Action::NewThread => {
            session.new_thread();
            app.set_view(session.view());
            app.thread_id = None;
            app.status = None;
        }
        Action::LoadThreads => load_threads(handles),
        Action::OpenThread(id) => {
            handles.spawn("load thread", async move { session.load_thread(&id).await });
        }
        Action::Respond(responses) => handles.spawn("respond", async move {
            session.send_human_response(responses).await
        }),
        Action::MarkResolved => {
            handles.spawn("resolve", async move { session.mark_resolved().await });
        }
        Action::Continue => handles.spawn("continue", async move { session.continue_debug().await }),
        Action::Restart {
            message_id,
            is_subagent,
        } => handles.spawn("restart", async move {
            session.restart_from_message(&message_id, is_subagent).await
        }),
        Action::SaveFile { path, content } => {
            let mut files = app.view.files().clone();
            files.insert(path, content);
            handles.spawn("save file", async move { session.update_files(files).await });
        }
        Action::Optimize(feedback) => optimize(handles, feedback),
        Action::Approve(id) => approve(handles, id),
        Action::Reject(id) => {
            let Some(optimizer) = handles.optimizer.clone() else {
                return;
            };
            let handles = handles.clone();
            tokio::spawn(async move {
                let mut optimizer = optimizer.lock().await;
                let error = optimizer.reject(&id).err().map(|e| e.to_string());
                handles.send(AppEvent::Optimizer {
                    entries: optimizer.entries().to_vec(),
                    error,
                });
            });
        }
    }
}

fn optimize(handles: &Handles, feedback: String) {
    let Some(optimizer) = handles.optimizer.clone() else {
        handles.send(AppEvent::Optimizer {
            entries: Vec::new(),
            error: Some("no optimizer deployment configured".to_string()),
        });
        return;
    };
    let handles = handles.clone();
    tokio::spawn(async move {
        let mut optimizer = optimizer.lock().await;
        let error = match handles.session.assistant() {
            Some(assistant) => {
                let conversation = handles.session.view().messages();
                optimizer
                    .submit_feedback(&feedback, &assistant, &conversation)
                    .await
                    .err()
                    .map(|e| e.to_string())
            }
            None => Some("assistant is not loaded yet".to_string()),
        };
        if let Some(error) = &error {
            tracing::warn!(error = %error, "optimizer request failed");
        }
        handles.send(AppEvent::Optimizer {
            entries: optimizer.entries().to_vec(),
            error,
        });
    });
}

fn approve(handles: &Handles, id: String) {
    let Some(optimizer) = handles.optimizer.clone() else {
        return;
    };
    let handles = handles.clone();
    tokio::spawn(async move {
        let mut optimizer = optimizer.lock().await;
        let error = match handles.session.assistant() {
            Some(assistant) => {
                let client = handles.session.client();
                match optimizer.approve(&id, client.as_ref(), &assistant).await {
                    Ok(updated) => {
                        handles.session.set_assistant(updated);
                        handles.send(AppEvent::Status("assistant config updated".to_string()));
                        None
                    }
                    Err(e) => Some(e.to_string()),
                }
            }
            None => Some("assistant is not loaded yet".to_string()),
        };
        handles.send(AppEvent::Optimizer {
            entries: optimizer.entries().to_vec(),
            error,
        });
    });
}

fn render(frame: &mut Frame, app: &App) {
    let area = frame.area();
    let input_lines = to_u16(app.input.text().lines().count().max(1)).min(INPUT_MAX_LINES);
    let panel_height = app
        .interrupt_panel
        .as_ref()
        .map_or(0, |p| p.height().min(area.height / 2));

    let [header_area, body_area, panel_area, input_area, status_area] = Layout::vertical([
        Constraint::Length(1),
        Constraint::Min(3),
        Constraint::Length(panel_height),
        Constraint::Length(input_lines + 2),
        Constraint::Length(1),
    ])
    .areas(area);

    render_header(frame, header_area, app);

    let show_sidebar = body_area.width > SIDEBAR_WIDTH * 2
        && (!app.view.todos().is_empty() || !app.view.files().is_empty());
    let (chat_area, sidebar_area) = if show_sidebar {
        let [chat, side] =
            Layout::horizontal([Constraint::Min(20), Constraint::Length(SIDEBAR_WIDTH)])
                .areas(body_area);
        (chat, Some(side))
    } else {
        (body_area, None)
    };

    let title = app
        .thread_id
        .as_deref()
        .map_or_else(|| "New thread".to_string(), |id| format!("Thread {id}"));
    render_messages(
        frame,
        chat_area,
        &app.view.processed_messages(),
        app.expand_tools,
        app.scroll,
        &title,
    );
    if let Some(side) = sidebar_area {
        let selected = (app.focus == Focus::Files).then_some(app.selected_file);
        render_sidebar(frame, side, app.view.todos(), app.view.files(), selected);
    }

    if let Some(panel) = &app.interrupt_panel {
        panel.render(frame, panel_area);
    }

    render_input(frame, input_area, app);
    render_status(frame, status_area, app);

    match &app.dialog {
        Some(Dialog::Threads(dialog)) => render_thread_list(frame, dialog),
        Some(Dialog::File(dialog)) => render_file(frame, dialog),
        Some(Dialog::Optimizer(dialog)) => render_optimizer(frame, dialog, &app.optimizer_entries),
        Some(Dialog::Help) => render_help(frame, app.debug),
        None => {}
    }
}

fn render_header(frame: &mut Frame, area: Rect, app: &App) {
    let mut spans = vec![
        Span::styled(
            " deep agent ",
            Style::default().fg(BRAND_TEAL).add_modifier(Modifier::BOLD),
        ),
        Span::raw(app.assistant_name.clone()),
    ];
    if app.debug {
        spans.push(Span::styled("  debug", Style::default().fg(WARN_COLOR)));
    }
    if let Some(error) = &app.assistant_error {
        spans.push(Span::styled(
            format!("  assistant unavailable: {error}"),
            Style::default().fg(ERROR_COLOR),
        ));
    }
    frame.render_widget(Paragraph::new(Line::from(spans)), area);
}

fn render_input(frame: &mut Frame, area: Rect, app: &App) {
    let focused = app.focus == Focus::Input && !app.has_dialog();
    let block = Block::default()
        .borders(Borders::ALL)
        .border_style(Style::default().fg(if focused { BRAND_TEAL } else { DIMMED }));
    let inner = block.inner(area);

    let (line, col) = app.input.cursor_line_col();
    let scroll = to_u16(line).saturating_sub(inner.height.saturating_sub(1));
    let body = if app.input.is_empty() {
        let hint = if app.view.is_loading {
            "esc to stop"
        } else if app.debug {
            "Message the agent (enter on empty input continues)"
        } else {
            "Message the agent (? for help)"
        };
        Paragraph::new(Span::styled(hint, Style::default().fg(DIMMED)))
    } else {
        Paragraph::new(app.input.text().to_string()).scroll((scroll, 0))
    };
    frame.render_widget(body.block(block), area);

    if focused {
        let x = inner.x + to_u16(col).min(inner.width.saturating_sub(1));
        let y = inner.y + to_u16(line).saturating_sub(scroll);
        frame.set_cursor_position(Position::new(x, y));
    }
}

fn render_status(frame: &mut Frame, area: Rect, app: &App) {
    let line = if let Some(status) = &app.status {
        Line::from(Span::styled(status.clone(), Style::default().fg(WARN_COLOR)))
    } else if app.view.is_loading {
        Line::from(Span::styled("Agent is working...", Style::default().fg(BRAND_TEAL)))
    } else {
        let tasks = app.view.todos().len();
        let files = app.view.files().len();
        Line::from(Span::styled(
            format!("{tasks} tasks · {files} files · ctrl-t threads · ctrl-p optimize"),
            Style::default().fg(DIMMED),
        ))
    };
    frame.render_widget(Paragraph::new(line), area);
}

fn render_help(frame: &mut Frame, debug: bool) {
    let mut rows = vec![
        ("enter", "send message"),
        ("shift-enter", "new line"),
        ("esc", "stop the running agent"),
        ("tab", "switch to the interrupt panel"),
        ("ctrl-n", "new thread"),
        ("ctrl-t", "thread history"),
        ("ctrl-f", "browse files"),
        ("ctrl-o", "expand tool calls"),
        ("ctrl-p", "optimize the assistant"),
        ("pgup/pgdn", "scroll"),
        ("ctrl-c", "quit"),
    ];
    if debug {
        rows.extend([
            ("enter (empty)", "continue paused run"),
            ("ctrl-r", "rerun from last agent message"),
            ("ctrl-g", "rerun last sub-agent call"),
        ]);
    }

    let area = frame.area();
    let width = 52_u16.min(area.width);
    let height = to_u16(rows.len()).saturating_add(2).min(area.height);
    let dialog_area = Rect::new(
        (area.width - width) / 2,
        (area.height - height) / 2,
        width,
        height,
    );
    frame.render_widget(Clear, dialog_area);

    let lines: Vec<Line> = rows
        .into_iter()
        .map(|(key, what)| {
            Line::from(vec![
                Span::styled(format!("{key:>14}  "), Style::default().fg(BRAND_TEAL)),
                Span::raw(what),
            ])
        })
        .collect();
    let block = Block::default()
        .title(" Keys ")
        .title_alignment(Alignment::Center)
        .borders(Borders::ALL)
        .border_style(Style::default().fg(BRAND_TEAL))
        .style(Style::default().bg(DIALOG_BG));
    frame.render_widget(Paragraph::new(lines).block(block), dialog_area);
}
