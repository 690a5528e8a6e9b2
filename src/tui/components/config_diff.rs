//! Config diff view and the optimizer dialog around it.

use ratatui::{
    layout::{Alignment, Constraint, Layout, Rect},
    style::{Modifier, Style},
    text::{Line, Span},
    widgets::{Block, Borders, Clear, Paragraph, Wrap},
    Frame,
};

use super::input::InputBuffer;
use super::theme::{
    BRAND_TEAL, DIALOG_BG, DIFF_ADD_BG, DIFF_ADD_FG, DIFF_DEL_BG, DIFF_DEL_FG, DIMMED, ERROR_COLOR,
    HUMAN_COLOR,
};
use crate::core::diff::{ConfigDiff, DiffFormat, DiffSegment, DiffTag};
use crate::core::optimizer::{ConfigProposal, OptimizerEntry, ProposalStatus};

/// Width at which the diff switches from unified to side by side.
pub const SPLIT_THRESHOLD: u16 = 100;

const fn tag_style(tag: DiffTag) -> Style {
    match tag {
        DiffTag::Add => Style::new().fg(DIFF_ADD_FG).bg(DIFF_ADD_BG),
        DiffTag::Delete => Style::new().fg(DIFF_DEL_FG).bg(DIFF_DEL_BG),
        DiffTag::Equal => Style::new(),
    }
}

fn segment_spans(segments: &[DiffSegment]) -> Vec<Span<'static>> {
    segments
        .iter()
        .map(|s| Span::styled(s.text.clone(), tag_style(s.tag)))
        .collect()
}

/// Unified rendering: removed then added sides of each changed row.
#[must_use]
pub fn unified_lines(diff: &ConfigDiff) -> Vec<Line<'static>> {
    let mut lines = Vec::new();
    let gutter = |n: usize| Span::styled(format!("{n:>4} "), Style::default().fg(DIMMED));

    for row in diff.rows() {
        if !row.has_changes {
            let mut spans = vec![gutter(row.line_number), Span::raw("  ")];
            spans.extend(segment_spans(&row.new));
            lines.push(Line::from(spans));
            continue;
        }
        if !row.old.is_empty() {
            let mut spans = vec![
                gutter(row.line_number),
                Span::styled("- ", Style::default().fg(DIFF_DEL_FG)),
            ];
            spans.extend(segment_spans(&row.old));
            lines.push(Line::from(spans));
        }
        if !row.new.is_empty() {
            let mut spans = vec![
                gutter(row.line_number),
                Span::styled("+ ", Style::default().fg(DIFF_ADD_FG)),
            ];
            spans.extend(segment_spans(&row.new));
            lines.push(Line::from(spans));
        }
    }
    lines
}

/// Side-by-side rendering as (old, new) line columns of equal length.
#[must_use]
pub fn split_lines(diff: &ConfigDiff) -> (Vec<Line<'static>>, Vec<Line<'static>>) {
    let mut old = Vec::new();
    let mut new = Vec::new();
    for row in diff.rows() {
        old.push(Line::from(segment_spans(&row.old)));
        new.push(Line::from(segment_spans(&row.new)));
    }
    (old, new)
}

/// Render a diff, side by side when the area is wide enough.
pub fn render_diff(frame: &mut Frame, area: Rect, diff: &ConfigDiff, scroll: u16) {
    let (added, removed) = diff.stats();
    let format = match diff.format() {
        DiffFormat::Json => "json",
        DiffFormat::Yaml => "yaml",
    };
    let title = Line::from(vec![
        Span::raw(format!(" config ({format}) ")),
        Span::styled(format!("+{added} "), Style::default().fg(DIFF_ADD_FG)),
        Span::styled(format!("-{removed} "), Style::default().fg(DIFF_DEL_FG)),
    ]);
    let block = Block::default()
        .title(title)
        .borders(Borders::ALL)
        .border_style(Style::default().fg(DIMMED));

    if !diff.has_changes() {
        frame.render_widget(
            Paragraph::new(Span::styled("No changes", Style::default().fg(DIMMED))).block(block),
            area,
        );
        return;
    }

    if area.width >= SPLIT_THRESHOLD {
        let inner = block.inner(area);
        frame.render_widget(block, area);
        let [left, right] =
            Layout::horizontal([Constraint::Percentage(50), Constraint::Percentage(50)]).areas(inner);
        let (old, new) = split_lines(diff);
        frame.render_widget(Paragraph::new(old).scroll((scroll, 0)), left);
        frame.render_widget(Paragraph::new(new).scroll((scroll, 0)), right);
    } else {
        frame.render_widget(
            Paragraph::new(unified_lines(diff))
                .block(block)
                .scroll((scroll, 0)),
            area,
        );
    }
}

/// Optimizer dialog state.
#[derive(Debug, Clone, Default)]
pub struct OptimizerDialog {
    pub feedback: InputBuffer,
    pub format: DiffFormat,
    pub scroll: u16,
    /// Index into the pending proposals being reviewed.
    pub selected: usize,
    pub loading: bool,
    pub error: Option<String>,
}

impl OptimizerDialog {
    #[must_use]
    pub fn new(format: DiffFormat) -> Self {
        Self {
            format,
            ..Self::default()
        }
    }

    pub fn toggle_format(&mut self) {
        self.format = match self.format {
            DiffFormat::Json => DiffFormat::Yaml,
            DiffFormat::Yaml => DiffFormat::Json,
        };
        self.scroll = 0;
    }

    /// The proposal under review among `entries`.
    #[must_use]
    pub fn current<'a>(&self, entries: &'a [OptimizerEntry]) -> Option<&'a ConfigProposal> {
        let pending: Vec<&ConfigProposal> = entries
            .iter()
            .filter_map(|e| match e {
                OptimizerEntry::Optimizer(p) if p.status == ProposalStatus::Pending => Some(p),
                _ => None,
            })
            .collect();
        pending
            .get(self.selected.min(pending.len().saturating_sub(1)))
            .copied()
    }
}

fn history_lines(entries: &[OptimizerEntry]) -> Vec<Line<'static>> {
    entries
        .iter()
        .map(|entry| match entry {
            OptimizerEntry::User { content } => Line::from(vec![
                Span::styled("you  ", Style::default().fg(HUMAN_COLOR)),
                Span::raw(content.clone()),
            ]),
            OptimizerEntry::Optimizer(p) => {
                let (label, color) = match p.status {
                    ProposalStatus::Pending => ("proposal (pending review)", BRAND_TEAL),
                    ProposalStatus::Approved => ("proposal approved", DIFF_ADD_FG),
                    ProposalStatus::Rejected => ("proposal rejected", DIMMED),
                };
                Line::from(vec![
                    Span::styled("opt  ", Style::default().fg(BRAND_TEAL)),
                    Span::styled(label, Style::default().fg(color)),
                ])
            }
        })
        .collect()
}

/// Render the optimizer dialog over the whole frame.
pub fn render_optimizer(frame: &mut Frame, dialog: &OptimizerDialog, entries: &[OptimizerEntry]) {
    let area = frame.area();
    let width = area.width.saturating_sub(4);
    let height = area.height.saturating_sub(2);
    let dialog_area = Rect::new(
        area.x + (area.width - width) / 2,
        area.y + (area.height - height) / 2,
        width,
        height,
    );
    frame.render_widget(Clear, dialog_area);

    let block = Block::default()
        .title(" Optimize assistant ")
        .title_alignment(Alignment::Center)
        .borders(Borders::ALL)
        .border_style(Style::default().fg(BRAND_TEAL))
        .style(Style::default().bg(DIALOG_BG));
    let inner = block.inner(dialog_area);
    frame.render_widget(block, dialog_area);

    let [history_area, diff_area, input_area, help_area] = Layout::vertical([
        Constraint::Length(6),
        Constraint::Min(5),
        Constraint::Length(3),
        Constraint::Length(1),
    ])
    .areas(inner);

    frame.render_widget(
        Paragraph::new(history_lines(entries)).wrap(Wrap { trim: false }),
        history_area,
    );

    match dialog.current(entries).map(|p| p.diff(dialog.format)) {
        Some(Ok(diff)) => render_diff(frame, diff_area, &diff, dialog.scroll),
        Some(Err(e)) => frame.render_widget(
            Paragraph::new(Span::styled(
                format!("could not render diff: {e}"),
                Style::default().fg(ERROR_COLOR),
            )),
            diff_area,
        ),
        None => {
            let text = if dialog.loading {
                "Optimizing..."
            } else {
                "Describe what the assistant should do differently."
            };
            frame.render_widget(
                Paragraph::new(Span::styled(text, Style::default().fg(DIMMED))),
                diff_area,
            );
        }
    }

    let input = Paragraph::new(format!("{}▏", dialog.feedback.text())).block(
        Block::default()
            .title(" Feedback ")
            .borders(Borders::ALL)
            .border_style(Style::default().fg(DIMMED)),
    );
    frame.render_widget(input, input_area);

    let help = match &dialog.error {
        Some(error) => Line::from(Span::styled(error.clone(), Style::default().fg(ERROR_COLOR))),
        None => Line::from(vec![
            Span::styled("enter", Style::default().fg(BRAND_TEAL).add_modifier(Modifier::BOLD)),
            Span::styled(" send  ", Style::default().fg(DIMMED)),
            Span::styled("ctrl-y", Style::default().fg(BRAND_TEAL)),
            Span::styled(" approve  ", Style::default().fg(DIMMED)),
            Span::styled("ctrl-n", Style::default().fg(BRAND_TEAL)),
            Span::styled(" reject  ", Style::default().fg(DIMMED)),
            Span::styled("ctrl-f", Style::default().fg(BRAND_TEAL)),
            Span::styled(" json/yaml  ", Style::default().fg(DIMMED)),
            Span::styled("esc", Style::default().fg(BRAND_TEAL)),
            Span::styled(" close", Style::default().fg(DIMMED)),
        ]),
    };
    frame.render_widget(Paragraph::new(help).alignment(Alignment::Center), help_area);
}
