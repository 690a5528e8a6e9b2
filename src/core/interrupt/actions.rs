//! Response state for a single interrupt.

use std::collections::BTreeMap;

use super::{
    create_default_human_response, have_args_changed, HumanInterrupt, HumanResponse,
    HumanResponseWithEdits, SubmitType,
};
use crate::core::error::{Error, Result};

/// Lifecycle of an interrupt panel.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum InterruptPhase {
    /// Nothing to answer.
    #[default]
    NoInterrupt,
    /// Waiting for the user.
    AwaitingResponse,
    /// A response (or resolve) was handed off.
    Submitted,
}

/// Editable response state for one interrupt.
#[derive(Debug, Clone, Default)]
pub struct InterruptedActions {
    interrupt: Option<HumanInterrupt>,
    responses: Vec<HumanResponseWithEdits>,
    initial_values: BTreeMap<String, String>,
    selected: Option<SubmitType>,
    has_edited: bool,
    has_added_response: bool,
    accept_allowed: bool,
    phase: InterruptPhase,
}

impl InterruptedActions {
    /// Derive response state for an interrupt.
    #[must_use]
    pub fn new(interrupt: HumanInterrupt) -> Self {
        let mut state = Self::default();
        state.load(interrupt);
        state
    }

    /// State for an interrupt whose payload could not be decoded: only ignore is offered.
    #[must_use]
    pub fn invalid() -> Self {
        Self {
            responses: vec![HumanResponseWithEdits {
                response: HumanResponse::Ignore,
                accept_allowed: false,
                edits_made: false,
            }],
            phase: InterruptPhase::AwaitingResponse,
            ..Self::default()
        }
    }

    /// Replace the current interrupt, restarting the state machine.
    pub fn load(&mut self, interrupt: HumanInterrupt) {
        let defaults = create_default_human_response(&interrupt, &mut self.initial_values);
        self.responses = defaults.responses;
        self.selected = defaults.default_submit_type;
        self.accept_allowed = defaults.has_accept;
        self.has_edited = false;
        self.has_added_response = false;
        self.interrupt = Some(interrupt);
        self.phase = InterruptPhase::AwaitingResponse;
    }

    /// Drop all response state.
    pub fn reset(&mut self) {
        *self = Self::default();
    }

    #[must_use]
    pub const fn interrupt(&self) -> Option<&HumanInterrupt> {
        self.interrupt.as_ref()
    }

    #[must_use]
    pub fn responses(&self) -> &[HumanResponseWithEdits] {
        &self.responses
    }

    #[must_use]
    pub const fn selected_submit_type(&self) -> Option<SubmitType> {
        self.selected
    }

    #[must_use]
    pub const fn has_edited(&self) -> bool {
        self.has_edited
    }

    #[must_use]
    pub const fn has_added_response(&self) -> bool {
        self.has_added_response
    }

    #[must_use]
    pub const fn accept_allowed(&self) -> bool {
        self.accept_allowed
    }

    #[must_use]
    pub const fn phase(&self) -> InterruptPhase {
        self.phase
    }

    /// Argument values as they were when the interrupt arrived.
    #[must_use]
    pub const fn initial_values(&self) -> &BTreeMap<String, String> {
        &self.initial_values
    }

    /// Whether more than one of edit, accept and response is on offer.
    #[must_use]
    pub fn supports_multiple_methods(&self) -> bool {
        self.responses
            .iter()
            .filter(|r| {
                matches!(
                    r.kind(),
                    SubmitType::Edit | SubmitType::Accept | SubmitType::Response
                )
            })
            .count()
            > 1
    }

    /// Pick the submit type explicitly.
    pub fn select(&mut self, submit_type: SubmitType) {
        self.selected = Some(submit_type);
    }

    /// Current text of the response choice, if one is offered.
    #[must_use]
    pub fn response_text(&self) -> Option<&str> {
        self.responses.iter().find_map(|r| match &r.response {
            HumanResponse::Response(text) => Some(text.as_str()),
            _ => None,
        })
    }

    /// Edit a single argument of the edit response.
    pub fn edit_field(&mut self, key: &str, value: impl Into<String>) -> Result<()> {
        self.edit_fields([(key.to_string(), value.into())])
    }

    /// Edit several arguments of the edit response at once.
    pub fn edit_fields<I>(&mut self, changes: I) -> Result<()>
    where
        I: IntoIterator<Item = (String, String)>,
    {
        let initial = &self.initial_values;
        let Some(entry) = self
            .responses
            .iter_mut()
            .find(|r| r.kind() == SubmitType::Edit)
        else {
            return Err(Error::validation("no editable response for this interrupt"));
        };
        let HumanResponse::Edit(request) = &mut entry.response else {
            return Err(Error::validation("no editable response for this interrupt"));
        };

        for (key, value) in changes {
            request.args.insert(key, serde_json::Value::String(value));
        }

        let changed = have_args_changed(&request.args, initial);
        if entry.accept_allowed {
            entry.edits_made = changed;
        }

        if changed {
            self.selected = Some(SubmitType::Edit);
            self.has_edited = true;
        } else {
            self.has_edited = false;
            if self.accept_allowed {
                self.selected = Some(SubmitType::Accept);
            } else if self.has_added_response {
                self.selected = Some(SubmitType::Response);
            }
        }
        Ok(())
    }

    /// Restore every edited argument to its initial value.
    pub fn reset_edits(&mut self) -> Result<()> {
        let changes: Vec<(String, String)> = self
            .initial_values
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect();
        self.edit_fields(changes)
    }

    /// Set the free-text response.
    pub fn set_response(&mut self, text: impl Into<String>) -> Result<()> {
        let text = text.into();
        let Some(entry) = self
            .responses
            .iter_mut()
            .find(|r| r.kind() == SubmitType::Response)
        else {
            return Err(Error::validation("this interrupt does not accept a response"));
        };

        if text.is_empty() {
            self.has_added_response = false;
            if self.has_edited {
                self.selected = Some(SubmitType::Edit);
            } else if self.accept_allowed {
                self.selected = Some(SubmitType::Accept);
            }
        } else {
            self.selected = Some(SubmitType::Response);
            self.has_added_response = true;
        }

        entry.response = HumanResponse::Response(text);
        Ok(())
    }

    /// The response matching the selected type, ready to send.
    ///
    /// Empty free-text responses are never sent.
    pub fn selected_response(&self) -> Result<HumanResponse> {
        let selected = self.selected;
        self.responses
            .iter()
            .filter(|r| !matches!(&r.response, HumanResponse::Response(text) if text.is_empty()))
            .find(|r| Some(r.kind()) == selected)
            .map(HumanResponseWithEdits::finalize)
            .ok_or_else(|| Error::validation("No response found."))
    }

    /// Build the resume payload and mark the interrupt submitted.
    pub fn submit(&mut self) -> Result<Vec<HumanResponse>> {
        let response = self.selected_response()?;
        self.initial_values.clear();
        self.phase = InterruptPhase::Submitted;
        tracing::debug!(kind = response.kind().as_str(), "submitting human response");
        Ok(vec![response])
    }

    /// Mark the interrupt handled without answering it (thread resolved).
    pub fn resolve(&mut self) {
        self.initial_values.clear();
        self.phase = InterruptPhase::Submitted;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::interrupt::tests::interrupt;
    use crate::core::interrupt::HumanInterruptConfig;
    use serde_json::json;

    fn edit_accept() -> InterruptedActions {
        InterruptedActions::new(interrupt(HumanInterruptConfig {
            allow_edit: true,
            allow_accept: true,
            allow_respond: true,
            ..Default::default()
        }))
    }

    #[test]
    fn starts_awaiting_with_default_selection() {
        let actions = edit_accept();
        assert_eq!(actions.phase(), InterruptPhase::AwaitingResponse);
        assert_eq!(actions.selected_submit_type(), Some(SubmitType::Accept));
        assert!(actions.supports_multiple_methods());
        assert_eq!(InterruptedActions::default().phase(), InterruptPhase::NoInterrupt);
    }

    #[test]
    fn editing_selects_edit_and_reverting_selects_accept() {
        let mut actions = edit_accept();

        actions.edit_field("path", "/b.txt").unwrap();
        assert_eq!(actions.selected_submit_type(), Some(SubmitType::Edit));
        assert!(actions.has_edited());
        assert!(actions.responses()[0].edits_made);

        actions.edit_field("path", "/a.txt").unwrap();
        assert_eq!(actions.selected_submit_type(), Some(SubmitType::Accept));
        assert!(!actions.has_edited());
        assert!(!actions.responses()[0].edits_made);
    }

    #[test]
    fn submitting_edit_sends_edited_args() {
        let mut actions = edit_accept();
        actions.edit_field("path", "/b.txt").unwrap();

        let sent = actions.submit().unwrap();
        let HumanResponse::Edit(request) = &sent[0] else {
            panic!("expected edit, got {sent:?}");
        };
        assert_eq!(request.args["path"], json!("/b.txt"));
        assert_eq!(actions.phase(), InterruptPhase::Submitted);
    }

    #[test]
    fn unedited_edit_submits_as_accept() {
        let mut actions = edit_accept();
        // Editable fields are stringified; an unchanged number still compares equal.
        actions.edit_field("lines", "3").unwrap();
        assert!(!actions.has_edited());
        actions.select(SubmitType::Edit);

        let sent = actions.submit().unwrap();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].kind(), SubmitType::Accept);
    }

    #[test]
    fn response_text_selects_response_and_clearing_falls_back() {
        let mut actions = edit_accept();
        actions.set_response("please use /tmp").unwrap();
        assert_eq!(actions.selected_submit_type(), Some(SubmitType::Response));
        assert!(actions.has_added_response());

        actions.set_response("").unwrap();
        assert_eq!(actions.selected_submit_type(), Some(SubmitType::Accept));

        actions.edit_field("path", "/c").unwrap();
        actions.set_response("x").unwrap();
        actions.set_response("").unwrap();
        assert_eq!(actions.selected_submit_type(), Some(SubmitType::Edit));
    }

    #[test]
    fn empty_response_is_not_sent() {
        let mut actions = InterruptedActions::new(interrupt(HumanInterruptConfig {
            allow_respond: true,
            ..Default::default()
        }));
        let err = actions.submit().unwrap_err();
        assert!(err.is_validation());
        assert_eq!(actions.phase(), InterruptPhase::AwaitingResponse);

        actions.set_response("go ahead").unwrap();
        let sent = actions.submit().unwrap();
        assert_eq!(sent, vec![HumanResponse::Response("go ahead".to_string())]);
    }

    #[test]
    fn edit_without_edit_choice_is_rejected() {
        let mut actions = InterruptedActions::new(interrupt(HumanInterruptConfig {
            allow_accept: true,
            ..Default::default()
        }));
        assert!(actions.edit_field("path", "/x").unwrap_err().is_validation());
        assert!(actions.set_response("hi").unwrap_err().is_validation());
    }

    #[test]
    fn reset_edits_restores_initial_values() {
        let mut actions = edit_accept();
        actions.edit_field("path", "/zzz").unwrap();
        actions.reset_edits().unwrap();
        assert!(!actions.has_edited());
        assert_eq!(actions.selected_submit_type(), Some(SubmitType::Accept));
    }

    #[test]
    fn invalid_interrupt_offers_only_ignore() {
        let mut actions = InterruptedActions::invalid();
        assert_eq!(actions.selected_submit_type(), None);
        assert!(actions.submit().is_err());
        actions.select(SubmitType::Ignore);
        assert_eq!(actions.submit().unwrap(), vec![HumanResponse::Ignore]);
    }

    #[test]
    fn resolve_marks_submitted() {
        let mut actions = edit_accept();
        actions.resolve();
        assert_eq!(actions.phase(), InterruptPhase::Submitted);
        assert!(actions.initial_values().is_empty());
    }
}
