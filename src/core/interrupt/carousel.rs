//! Several interrupts answered together.

use std::collections::BTreeMap;

use super::{HumanInterrupt, HumanResponse, InterruptedActions};
use crate::core::error::{Error, Result};

/// Response state for a run paused on multiple interrupts at once.
///
/// Each interrupt is answered on its own; nothing is sent until every one
/// of them has a recorded response.
#[derive(Debug, Clone, Default)]
pub struct InterruptCarousel {
    items: Vec<InterruptedActions>,
    current: usize,
    addressed: BTreeMap<usize, HumanResponse>,
}

impl InterruptCarousel {
    #[must_use]
    pub fn new(interrupts: Vec<HumanInterrupt>) -> Self {
        Self {
            items: interrupts.into_iter().map(InterruptedActions::new).collect(),
            current: 0,
            addressed: BTreeMap::new(),
        }
    }

    /// A carousel for an interrupt payload that could not be decoded.
    #[must_use]
    pub fn invalid() -> Self {
        Self {
            items: vec![InterruptedActions::invalid()],
            ..Self::default()
        }
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.items.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    #[must_use]
    pub const fn current_index(&self) -> usize {
        self.current
    }

    #[must_use]
    pub fn current(&self) -> Option<&InterruptedActions> {
        self.items.get(self.current)
    }

    pub fn current_mut(&mut self) -> Option<&mut InterruptedActions> {
        self.items.get_mut(self.current)
    }

    pub fn select_next(&mut self) {
        if self.current + 1 < self.items.len() {
            self.current += 1;
        }
    }

    pub fn select_previous(&mut self) {
        self.current = self.current.saturating_sub(1);
    }

    /// Response recorded for an index, if any.
    #[must_use]
    pub fn response_for(&self, index: usize) -> Option<&HumanResponse> {
        self.addressed.get(&index)
    }

    #[must_use]
    pub fn is_addressed(&self, index: usize) -> bool {
        self.addressed.contains_key(&index)
    }

    /// Record a response for an index, replacing any earlier one.
    pub fn record(&mut self, index: usize, response: HumanResponse) -> Result<()> {
        if index >= self.items.len() {
            return Err(Error::validation(format!(
                "interrupt {} does not exist",
                index + 1
            )));
        }
        self.addressed.insert(index, response);
        Ok(())
    }

    /// Record the selected response of the current interrupt and move on.
    pub fn address_current(&mut self) -> Result<()> {
        let index = self.current;
        let response = self
            .items
            .get(index)
            .ok_or_else(|| Error::validation("no interrupt selected"))?
            .selected_response()?;
        self.record(index, response)?;
        tracing::debug!(index, total = self.items.len(), "interrupt addressed");
        self.select_next();
        Ok(())
    }

    /// True when there are several interrupts and every one has a response.
    #[must_use]
    pub fn all_interrupts_addressed(&self) -> bool {
        self.items.len() > 1 && self.addressed.len() == self.items.len()
    }

    /// Whether "accept all" can be offered.
    #[must_use]
    pub fn accept_all_available(&self) -> bool {
        self.items.len() > 1
            && self
                .items
                .iter()
                .all(|item| item.interrupt().is_some_and(|i| i.config.allow_accept))
    }

    /// Accept every interrupt as requested.
    pub fn accept_all(&mut self) -> Result<Vec<HumanResponse>> {
        if !self.accept_all_available() {
            return Err(Error::validation("not every interrupt can be accepted"));
        }
        let responses = self
            .items
            .iter()
            .filter_map(InterruptedActions::interrupt)
            .map(|i| HumanResponse::Accept(i.action_request.clone()))
            .collect();
        self.addressed.clear();
        Ok(responses)
    }

    /// Collect all responses in interrupt order and clear them.
    pub fn submit_all(&mut self) -> Result<Vec<HumanResponse>> {
        if !self.all_interrupts_addressed() {
            return Err(Error::validation(format!(
                "Please address all {} interrupts before submitting.",
                self.items.len()
            )));
        }

        let responses = (0..self.items.len())
            .map(|index| {
                self.addressed.get(&index).cloned().ok_or_else(|| {
                    Error::validation(format!("Missing response for interrupt {}", index + 1))
                })
            })
            .collect::<Result<Vec<_>>>()?;

        self.addressed.clear();
        Ok(responses)
    }
}
