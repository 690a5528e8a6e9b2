//! Human-in-the-loop interrupts.
//!
//! A graph run can pause on one or more [`HumanInterrupt`]s, each asking the
//! user to accept, edit, respond to, or ignore a pending action. This module
//! derives the response choices for an interrupt and tracks the user's edits
//! until a [`HumanResponse`] is ready to be sent back as a resume command.

mod actions;
mod carousel;

use std::collections::BTreeMap;

use serde::ser::SerializeStruct;
use serde::{Deserialize, Serialize, Serializer};
use serde_json::{Map, Value};

pub use actions::{InterruptPhase, InterruptedActions};
pub use carousel::InterruptCarousel;

use super::error::{Error, Result};

/// An interrupt as reported by the remote thread state.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Interrupt {
    /// Payload. For deep agents, a list of [`HumanInterrupt`]s.
    #[serde(default)]
    pub value: Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub when: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ns: Option<Vec<String>>,
}

impl Interrupt {
    /// Decode the human interrupts carried in `value`.
    ///
    /// A bare object is treated as a single interrupt.
    pub fn human_interrupts(&self) -> Result<Vec<HumanInterrupt>> {
        match &self.value {
            Value::Array(_) => Ok(serde_json::from_value(self.value.clone())?),
            Value::Object(_) => Ok(vec![serde_json::from_value(self.value.clone())?]),
            other => Err(Error::Parse(format!(
                "interrupt value is not a list of actions: {other}"
            ))),
        }
    }

    /// Title for the interrupt panel, derived from the first action name.
    #[must_use]
    pub fn title(&self) -> String {
        self.human_interrupts()
            .ok()
            .and_then(|items| items.into_iter().next())
            .map_or_else(
                || "Interrupt".to_string(),
                |item| prettify_text(&item.action_request.action),
            )
    }
}

/// The action an interrupted run wants to take.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ActionRequest {
    /// Action (usually tool) name.
    pub action: String,
    /// Action arguments.
    #[serde(default)]
    pub args: Map<String, Value>,
}

/// Which responses an interrupt permits.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
#[allow(clippy::struct_excessive_bools)]
pub struct HumanInterruptConfig {
    pub allow_ignore: bool,
    pub allow_respond: bool,
    pub allow_edit: bool,
    pub allow_accept: bool,
}

/// One pending action awaiting a human decision.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct HumanInterrupt {
    pub action_request: ActionRequest,
    #[serde(default)]
    pub config: HumanInterruptConfig,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

/// Kind of human response.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SubmitType {
    Accept,
    Edit,
    Response,
    Ignore,
}

impl SubmitType {
    /// Get a string representation of the type.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Accept => "accept",
            Self::Edit => "edit",
            Self::Response => "response",
            Self::Ignore => "ignore",
        }
    }
}

/// Response sent back to resume an interrupted run.
///
/// Serializes as `{"type": ..., "args": ...}` where `args` is the action
/// request for accept/edit, a string for response and `null` for ignore.
#[derive(Debug, Clone, PartialEq)]
pub enum HumanResponse {
    Accept(ActionRequest),
    Edit(ActionRequest),
    Response(String),
    Ignore,
}

impl HumanResponse {
    /// Kind of this response.
    #[must_use]
    pub const fn kind(&self) -> SubmitType {
        match self {
            Self::Accept(_) => SubmitType::Accept,
            Self::Edit(_) => SubmitType::Edit,
            Self::Response(_) => SubmitType::Response,
            Self::Ignore => SubmitType::Ignore,
        }
    }
}

impl Serialize for HumanResponse {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        let mut state = serializer.serialize_struct("HumanResponse", 2)?;
        state.serialize_field("type", self.kind().as_str())?;
        match self {
            Self::Accept(request) | Self::Edit(request) => {
                state.serialize_field("args", request)?;
            }
            Self::Response(text) => state.serialize_field("args", text)?,
            Self::Ignore => state.serialize_field("args", &Value::Null)?,
        }
        state.end()
    }
}

/// A response choice plus edit bookkeeping.
#[derive(Debug, Clone, PartialEq)]
pub struct HumanResponseWithEdits {
    pub response: HumanResponse,
    /// Set on edit responses whose interrupt also allows accept.
    pub accept_allowed: bool,
    /// Whether the edit differs from the original arguments.
    pub edits_made: bool,
}

impl HumanResponseWithEdits {
    const fn plain(response: HumanResponse) -> Self {
        Self {
            response,
            accept_allowed: false,
            edits_made: false,
        }
    }

    /// Kind of the wrapped response.
    #[must_use]
    pub const fn kind(&self) -> SubmitType {
        self.response.kind()
    }

    /// The response to actually send.
    ///
    /// An unedited edit response on an acceptable interrupt becomes an accept.
    #[must_use]
    pub fn finalize(&self) -> HumanResponse {
        match &self.response {
            HumanResponse::Edit(request) if self.accept_allowed && !self.edits_made => {
                HumanResponse::Accept(request.clone())
            }
            other => other.clone(),
        }
    }
}

/// Response choices derived for a fresh interrupt.
#[derive(Debug, Clone, PartialEq)]
pub struct DefaultResponses {
    pub responses: Vec<HumanResponseWithEdits>,
    pub default_submit_type: Option<SubmitType>,
    pub has_accept: bool,
}

/// Stringify an argument value the way it is shown in an edit field.
#[must_use]
pub fn stringify_arg(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// Whether any argument differs from its recorded initial value.
#[must_use]
pub fn have_args_changed(args: &Map<String, Value>, initial: &BTreeMap<String, String>) -> bool {
    args.iter()
        .any(|(key, value)| initial.get(key) != Some(&stringify_arg(value)))
}

/// Build the response choices for an interrupt.
///
/// Initial edit values are recorded into `initial_values` the first time a
/// key is seen and left alone afterwards.
#[must_use]
pub fn create_default_human_response(
    interrupt: &HumanInterrupt,
    initial_values: &mut BTreeMap<String, String>,
) -> DefaultResponses {
    let config = interrupt.config;
    let mut responses = Vec::new();

    if config.allow_edit {
        for (key, value) in &interrupt.action_request.args {
            initial_values
                .entry(key.clone())
                .or_insert_with(|| stringify_arg(value));
        }
        responses.push(HumanResponseWithEdits {
            response: HumanResponse::Edit(interrupt.action_request.clone()),
            accept_allowed: config.allow_accept,
            edits_made: false,
        });
    }

    if config.allow_respond {
        responses.push(HumanResponseWithEdits::plain(HumanResponse::Response(
            String::new(),
        )));
    }

    if config.allow_ignore {
        responses.push(HumanResponseWithEdits::plain(HumanResponse::Ignore));
    }

    if config.allow_accept && !responses.iter().any(|r| r.kind() == SubmitType::Accept) {
        responses.push(HumanResponseWithEdits::plain(HumanResponse::Accept(
            interrupt.action_request.clone(),
        )));
    }

    let default_submit_type = if config.allow_accept {
        Some(SubmitType::Accept)
    } else if config.allow_respond {
        Some(SubmitType::Response)
    } else if config.allow_edit {
        Some(SubmitType::Edit)
    } else {
        None
    };

    DefaultResponses {
        responses,
        default_submit_type,
        has_accept: config.allow_accept,
    }
}

/// Turn a `snake_case` identifier into Title Case words.
#[must_use]
pub fn prettify_text(action: &str) -> String {
    action
        .split('_')
        .filter(|word| !word.is_empty())
        .map(|word| {
            let mut chars = word.chars();
            chars.next().map_or_else(String::new, |first| {
                first.to_uppercase().chain(chars).collect()
            })
        })
        .collect::<Vec<_>>()
        .join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    pub(super) fn interrupt(config: HumanInterruptConfig) -> HumanInterrupt {
        HumanInterrupt {
            action_request: ActionRequest {
                action: "write_file".to_string(),
                args: json!({"path": "/a.txt", "lines": 3})
                    .as_object()
                    .cloned()
                    .unwrap(),
            },
            config,
            description: None,
        }
    }

    #[test]
    fn edit_and_accept_defaults_to_accept() {
        let mut initial = BTreeMap::new();
        let defaults = create_default_human_response(
            &interrupt(HumanInterruptConfig {
                allow_edit: true,
                allow_accept: true,
                ..Default::default()
            }),
            &mut initial,
        );

        assert_eq!(defaults.default_submit_type, Some(SubmitType::Accept));
        assert!(defaults.has_accept);
        let kinds: Vec<_> = defaults.responses.iter().map(|r| r.kind()).collect();
        assert_eq!(kinds, vec![SubmitType::Edit, SubmitType::Accept]);
        assert!(defaults.responses[0].accept_allowed);
        assert!(!defaults.responses[0].edits_made);
        assert_eq!(initial.get("path").map(String::as_str), Some("/a.txt"));
        assert_eq!(initial.get("lines").map(String::as_str), Some("3"));
    }

    #[test]
    fn respond_only_defaults_to_response() {
        let mut initial = BTreeMap::new();
        let defaults = create_default_human_response(
            &interrupt(HumanInterruptConfig {
                allow_respond: true,
                allow_ignore: true,
                ..Default::default()
            }),
            &mut initial,
        );
        assert_eq!(defaults.default_submit_type, Some(SubmitType::Response));
        let kinds: Vec<_> = defaults.responses.iter().map(|r| r.kind()).collect();
        assert_eq!(kinds, vec![SubmitType::Response, SubmitType::Ignore]);
        assert!(initial.is_empty());
    }

    #[test]
    fn edit_only_defaults_to_edit() {
        let mut initial = BTreeMap::new();
        let defaults = create_default_human_response(
            &interrupt(HumanInterruptConfig {
                allow_edit: true,
                ..Default::default()
            }),
            &mut initial,
        );
        assert_eq!(defaults.default_submit_type, Some(SubmitType::Edit));
        assert!(!defaults.has_accept);
    }

    #[test]
    fn initial_values_recorded_once() {
        let mut initial = BTreeMap::new();
        initial.insert("path".to_string(), "/original".to_string());
        let _ = create_default_human_response(
            &interrupt(HumanInterruptConfig {
                allow_edit: true,
                ..Default::default()
            }),
            &mut initial,
        );
        assert_eq!(initial["path"], "/original");
    }

    #[test]
    fn unedited_edit_finalizes_to_accept() {
        let request = interrupt(HumanInterruptConfig::default()).action_request;
        let edit = HumanResponseWithEdits {
            response: HumanResponse::Edit(request.clone()),
            accept_allowed: true,
            edits_made: false,
        };
        assert_eq!(edit.finalize(), HumanResponse::Accept(request));
    }

    #[test]
    fn response_serialization() {
        assert_eq!(
            serde_json::to_value(HumanResponse::Ignore).unwrap(),
            json!({"type": "ignore", "args": null})
        );
        assert_eq!(
            serde_json::to_value(HumanResponse::Response("no".to_string())).unwrap(),
            json!({"type": "response", "args": "no"})
        );
        let request = ActionRequest {
            action: "shell".to_string(),
            args: Map::new(),
        };
        assert_eq!(
            serde_json::to_value(HumanResponse::Accept(request)).unwrap(),
            json!({"type": "accept", "args": {"action": "shell", "args": {}}})
        );
    }

    #[test]
    fn title_from_first_action() {
        let raw = Interrupt {
            value: json!([{
                "action_request": {"action": "write_todos", "args": {}},
                "config": {"allow_accept": true}
            }]),
            ..Default::default()
        };
        assert_eq!(raw.title(), "Write Todos");
        assert_eq!(Interrupt::default().title(), "Interrupt");
    }

    #[test]
    fn prettify_handles_edges() {
        assert_eq!(prettify_text("edit_file"), "Edit File");
        assert_eq!(prettify_text("task"), "Task");
        assert_eq!(prettify_text("__end__"), "End");
    }

    #[test]
    fn detects_changed_args() {
        let mut initial = BTreeMap::new();
        initial.insert("path".to_string(), "/a".to_string());
        let mut args = Map::new();
        args.insert("path".to_string(), json!("/a"));
        assert!(!have_args_changed(&args, &initial));
        args.insert("path".to_string(), json!("/b"));
        assert!(have_args_changed(&args, &initial));
    }
}
