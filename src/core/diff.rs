//! Side-by-side configuration diffs.
//!
//! Both configs are serialized with sorted keys, diffed line by line, and
//! lines that still differ inside unchanged regions get a word-level pass.
//! Rows come out as plain segments (for the terminal) or as HTML with
//! `diff-removed` / `diff-added` spans (for the view API).

use serde::ser::{Serialize, SerializeMap, Serializer};
use serde_json::Value;
use similar::{ChangeTag, TextDiff};

use super::error::Result;

/// Serialization used before diffing.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DiffFormat {
    Json,
    #[default]
    Yaml,
}

/// Tag of a diff segment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
#[serde(rename_all = "lowercase")]
pub enum DiffTag {
    /// Only in the new config
    Add,
    /// Only in the old config
    Delete,
    /// Unchanged
    Equal,
}

/// A run of text with one tag.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize)]
pub struct DiffSegment {
    pub tag: DiffTag,
    pub text: String,
}

impl DiffSegment {
    fn new(tag: DiffTag, text: impl Into<String>) -> Self {
        Self {
            tag,
            text: text.into(),
        }
    }
}

/// One side-by-side row.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize)]
pub struct DiffRow {
    /// 1-based row number.
    pub line_number: usize,
    /// Old side; empty for added lines.
    pub old: Vec<DiffSegment>,
    /// New side; empty for removed lines.
    pub new: Vec<DiffSegment>,
    pub has_changes: bool,
}

/// Row with HTML-escaped, span-marked content.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize)]
pub struct HtmlDiffRow {
    pub line_number: usize,
    pub old_line: String,
    pub new_line: String,
    pub has_changes: bool,
}

/// Diff between two configuration values.
#[derive(Debug, Clone)]
pub struct ConfigDiff {
    format: DiffFormat,
    old_text: String,
    new_text: String,
    rows: Vec<DiffRow>,
}

impl ConfigDiff {
    /// Serialize both configs and diff them.
    pub fn new(old: &Value, new: &Value, format: DiffFormat) -> Result<Self> {
        let old_text = serialize_sorted(old, format)?;
        let new_text = serialize_sorted(new, format)?;
        let rows = diff_rows(&old_text, &new_text);
        Ok(Self {
            format,
            old_text,
            new_text,
            rows,
        })
    }

    #[must_use]
    pub const fn format(&self) -> DiffFormat {
        self.format
    }

    #[must_use]
    pub fn old_text(&self) -> &str {
        &self.old_text
    }

    #[must_use]
    pub fn new_text(&self) -> &str {
        &self.new_text
    }

    #[must_use]
    pub fn rows(&self) -> &[DiffRow] {
        &self.rows
    }

    /// Whether anything differs.
    #[must_use]
    pub fn has_changes(&self) -> bool {
        self.rows.iter().any(|row| row.has_changes)
    }

    /// Count of (added, removed) lines.
    #[must_use]
    pub fn stats(&self) -> (usize, usize) {
        self.rows.iter().fold((0, 0), |(added, removed), row| {
            match (row.old.is_empty(), row.new.is_empty()) {
                (true, false) => (added + 1, removed),
                (false, true) => (added, removed + 1),
                _ => (added, removed),
            }
        })
    }

    /// Rows rendered as escaped HTML.
    #[must_use]
    pub fn html_rows(&self) -> Vec<HtmlDiffRow> {
        self.rows
            .iter()
            .map(|row| HtmlDiffRow {
                line_number: row.line_number,
                old_line: segments_to_html(&row.old),
                new_line: segments_to_html(&row.new),
                has_changes: row.has_changes,
            })
            .collect()
    }
}

/// Serializes a JSON value with object keys in sorted order.
struct Sorted<'a>(&'a Value);

impl Serialize for Sorted<'_> {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        match self.0 {
            Value::Object(map) => {
                let mut entries: Vec<_> = map.iter().collect();
                entries.sort_by(|a, b| a.0.cmp(b.0));
                let mut out = serializer.serialize_map(Some(entries.len()))?;
                for (key, value) in entries {
                    out.serialize_entry(key, &Sorted(value))?;
                }
                out.end()
            }
            Value::Array(items) => serializer.collect_seq(items.iter().map(Sorted)),
            other => other.serialize(serializer),
        }
    }
}

/// Serialize a config deterministically.
pub fn serialize_sorted(value: &Value, format: DiffFormat) -> Result<String> {
    Ok(match format {
        DiffFormat::Json => serde_json::to_string_pretty(&Sorted(value))?,
        DiffFormat::Yaml => serde_yaml::to_string(&Sorted(value))?,
    })
}

/// Escape the characters that matter inside HTML text.
#[must_use]
pub fn escape_html(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for ch in text.chars() {
        match ch {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            _ => out.push(ch),
        }
    }
    out
}

fn segments_to_html(segments: &[DiffSegment]) -> String {
    segments
        .iter()
        .map(|segment| {
            let escaped = escape_html(&segment.text);
            match segment.tag {
                DiffTag::Delete => format!(r#"<span class="diff-removed">{escaped}</span>"#),
                DiffTag::Add => format!(r#"<span class="diff-added">{escaped}</span>"#),
                DiffTag::Equal => escaped,
            }
        })
        .collect()
}

/// Word-level segments for an old/new line pair.
fn word_segments(old: &str, new: &str) -> (Vec<DiffSegment>, Vec<DiffSegment>, bool) {
    let mut old_segments = Vec::new();
    let mut new_segments = Vec::new();
    let mut changed = false;

    for change in TextDiff::from_words(old, new).iter_all_changes() {
        let text = change.value();
        match change.tag() {
            ChangeTag::Delete => {
                changed = true;
                push_segment(&mut old_segments, DiffTag::Delete, text);
            }
            ChangeTag::Insert => {
                changed = true;
                push_segment(&mut new_segments, DiffTag::Add, text);
            }
            ChangeTag::Equal => {
                push_segment(&mut old_segments, DiffTag::Equal, text);
                push_segment(&mut new_segments, DiffTag::Equal, text);
            }
        }
    }

    (old_segments, new_segments, changed)
}

/// Append text, merging with the previous segment when the tag matches.
fn push_segment(segments: &mut Vec<DiffSegment>, tag: DiffTag, text: &str) {
    match segments.last_mut() {
        Some(last) if last.tag == tag => last.text.push_str(text),
        _ => segments.push(DiffSegment::new(tag, text)),
    }
}

/// Build side-by-side rows from two serialized texts.
#[must_use]
pub fn diff_rows(old_text: &str, new_text: &str) -> Vec<DiffRow> {
    let old_lines: Vec<&str> = old_text.lines().collect();
    let new_lines: Vec<&str> = new_text.lines().collect();
    let diff = TextDiff::from_lines(old_text, new_text);

    let mut rows: Vec<DiffRow> = Vec::new();
    for change in diff.iter_all_changes() {
        let line = change.value().trim_end_matches(['\n', '\r']);
        let line_number = rows.len() + 1;

        let row = match change.tag() {
            ChangeTag::Delete => DiffRow {
                line_number,
                old: vec![DiffSegment::new(DiffTag::Delete, line)],
                new: Vec::new(),
                has_changes: true,
            },
            ChangeTag::Insert => DiffRow {
                line_number,
                old: Vec::new(),
                new: vec![DiffSegment::new(DiffTag::Add, line)],
                has_changes: true,
            },
            ChangeTag::Equal => {
                let old_line = change
                    .old_index()
                    .and_then(|i| old_lines.get(i).copied())
                    .unwrap_or(line);
                let new_line = change
                    .new_index()
                    .and_then(|i| new_lines.get(i).copied())
                    .unwrap_or(line);

                if old_line == new_line {
                    DiffRow {
                        line_number,
                        old: vec![DiffSegment::new(DiffTag::Equal, old_line)],
                        new: vec![DiffSegment::new(DiffTag::Equal, new_line)],
                        has_changes: false,
                    }
                } else {
                    let (old, new, has_changes) = word_segments(old_line, new_line);
                    DiffRow {
                        line_number,
                        old,
                        new,
                        has_changes,
                    }
                }
            }
        };
        rows.push(row);
    }

    rows
}
