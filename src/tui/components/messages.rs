//! Conversation panel: messages with their tool calls.

use ratatui::{
    layout::Rect,
    style::{Modifier, Style},
    text::{Line, Span},
    widgets::{Block, Borders, Paragraph},
    Frame,
};

use super::theme::{BRAND_TEAL, DIMMED, ERROR_COLOR, HUMAN_COLOR, TOOL_COLOR, WARN_COLOR};
use super::to_u16;
use crate::core::message::extract_citation_urls;
use crate::core::reconcile::{ProcessedMessage, ToolCall, ToolCallStatus};

const MAX_TOOL_OUTPUT_LINES: usize = 8;
const INDENT: &str = "  ";

/// Split `text` into lines of at most `width` characters, breaking on
/// whitespace where possible.
#[must_use]
pub fn wrap(text: &str, width: usize) -> Vec<String> {
    let width = width.max(1);
    let mut out = Vec::new();

    for raw in text.lines() {
        let mut line = String::new();
        let mut len = 0;
        for word in raw.split_inclusive(' ') {
            let word_len = word.chars().count();
            if len + word_len > width && len > 0 {
                out.push(line.trim_end().to_string());
                line.clear();
                len = 0;
            }
            if word_len > width {
                let mut chars = word.chars().peekable();
                while chars.peek().is_some() {
                    let chunk: String = chars.by_ref().take(width).collect();
                    if chunk.chars().count() == width && chars.peek().is_some() {
                        out.push(chunk);
                    } else {
                        len = chunk.chars().count();
                        line = chunk;
                    }
                }
            } else {
                line.push_str(word);
                len += word_len;
            }
        }
        out.push(line.trim_end().to_string());
    }

    if out.is_empty() && !text.is_empty() {
        out.push(String::new());
    }
    out
}

fn status_span(status: ToolCallStatus) -> Span<'static> {
    let (icon, color) = match status {
        ToolCallStatus::Pending => ("…", WARN_COLOR),
        ToolCallStatus::Completed => ("✓", BRAND_TEAL),
        ToolCallStatus::Interrupted => ("⏸", WARN_COLOR),
        ToolCallStatus::Error => ("✗", ERROR_COLOR),
    };
    Span::styled(format!("{icon} "), Style::default().fg(color))
}

fn tool_call_lines(call: &ToolCall, expanded: bool, width: usize, out: &mut Vec<Line<'static>>) {
    let mut header = vec![
        Span::raw(INDENT),
        status_span(call.status),
        Span::styled(call.name.clone(), Style::default().fg(TOOL_COLOR)),
    ];
    if let Some(agent) = call.subagent_type() {
        header.push(Span::styled(
            format!(" → {agent}"),
            Style::default().fg(HUMAN_COLOR),
        ));
    }
    header.push(Span::styled(
        format!("  {}", call.status.as_str()),
        Style::default().fg(DIMMED),
    ));
    out.push(Line::from(header));

    if !expanded {
        return;
    }

    let inner = width.saturating_sub(6);
    let args = serde_json::to_string(&call.args).unwrap_or_default();
    for line in wrap(&args, inner).into_iter().take(MAX_TOOL_OUTPUT_LINES) {
        out.push(Line::from(Span::styled(
            format!("{INDENT}    {line}"),
            Style::default().fg(DIMMED),
        )));
    }
    if let Some(result) = &call.result {
        let lines = wrap(result, inner);
        let hidden = lines.len().saturating_sub(MAX_TOOL_OUTPUT_LINES);
        for line in lines.into_iter().take(MAX_TOOL_OUTPUT_LINES) {
            out.push(Line::from(format!("{INDENT}  │ {line}")));
        }
        if hidden > 0 {
            out.push(Line::from(Span::styled(
                format!("{INDENT}  │ … {hidden} more lines"),
                Style::default().fg(DIMMED),
            )));
        }
    }
}

/// Lines for the conversation panel.
#[must_use]
pub fn message_lines(
    messages: &[ProcessedMessage],
    expand_tools: bool,
    width: u16,
) -> Vec<Line<'static>> {
    let width = usize::from(width);
    let mut out = Vec::new();

    for processed in messages {
        let message = &processed.message;
        if processed.show_avatar {
            if !out.is_empty() {
                out.push(Line::default());
            }
            let (name, color) = if message.is_human() {
                ("You", HUMAN_COLOR)
            } else {
                ("Agent", BRAND_TEAL)
            };
            out.push(Line::from(Span::styled(
                format!("▌ {name}"),
                Style::default().fg(color).add_modifier(Modifier::BOLD),
            )));
        }

        let text = message.text();
        for line in wrap(&text, width.saturating_sub(INDENT.len())) {
            out.push(Line::from(format!("{INDENT}{line}")));
        }

        if message.is_ai() {
            let urls = extract_citation_urls(&text);
            if !urls.is_empty() {
                out.push(Line::from(Span::styled(
                    format!("{INDENT}sources: {}", urls.join(", ")),
                    Style::default().fg(DIMMED),
                )));
            }
        }

        for call in &processed.tool_calls {
            tool_call_lines(call, expand_tools, width, &mut out);
        }
    }
    out
}

/// Render the conversation, keeping the bottom visible unless scrolled up.
///
/// `scroll_up` counts lines from the bottom.
pub fn render_messages(
    frame: &mut Frame,
    area: Rect,
    messages: &[ProcessedMessage],
    expand_tools: bool,
    scroll_up: u16,
    title: &str,
) {
    let block = Block::default()
        .title(format!(" {title} "))
        .borders(Borders::ALL)
        .border_style(Style::default().fg(DIMMED));
    let inner = block.inner(area);

    let lines = message_lines(messages, expand_tools, inner.width);
    let total = to_u16(lines.len());
    let max_offset = total.saturating_sub(inner.height);
    let offset = max_offset.saturating_sub(scroll_up);

    let paragraph = Paragraph::new(lines).block(block).scroll((offset, 0));
    frame.render_widget(paragraph, area);
}
