use super::{EventFilter, FilterError};
use crate::definition::StateCondition;
use crate::dispatcher::EventScope;
use crate::event::{Event, EventKind};

/// Matches every event
pub struct Always;

impl EventFilter for Always {
    fn check(&self, _event: &Event, _scope: &EventScope) -> Result<bool, FilterError> {
        Ok(true)
    }
}

/// Exact text (any of), or the command alone when one is set
pub struct MessagePredicate {
    texts: Vec<String>,
    command: Option<String>,
}

impl MessagePredicate {
    pub fn new(texts: Vec<String>, command: Option<String>) -> Self {
        Self { texts, command }
    }
}

impl EventFilter for MessagePredicate {
    fn check(&self, event: &Event, _scope: &EventScope) -> Result<bool, FilterError> {
        let Some(text) = event.text() else {
            return Ok(false);
        };
        if let Some(command) = &self.command {
            return Ok(event.command() == Some(command.as_str()));
        }
        Ok(self.texts.iter().any(|t| t == text))
    }
}

pub struct CallbackPredicate {
    data: String,
}

impl CallbackPredicate {
    pub fn new(data: String) -> Self {
        Self { data }
    }
}

impl EventFilter for CallbackPredicate {
    fn check(&self, event: &Event, _scope: &EventScope) -> Result<bool, FilterError> {
        Ok(event.callback_data() == Some(self.data.as_str()))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PaymentStage {
    PreCheckout,
    PostCheckout,
}

pub struct PaymentPredicate {
    stage: PaymentStage,
    payload: Option<String>,
}

impl PaymentPredicate {
    pub fn new(stage: PaymentStage, payload: Option<String>) -> Self {
        Self { stage, payload }
    }
}

impl EventFilter for PaymentPredicate {
    fn check(&self, event: &Event, _scope: &EventScope) -> Result<bool, FilterError> {
        let actual = match (&event.kind, self.stage) {
            (EventKind::PreCheckout { invoice_payload, .. }, PaymentStage::PreCheckout)
            | (EventKind::SuccessfulPayment { invoice_payload, .. }, PaymentStage::PostCheckout) => {
                invoice_payload
            }
            _ => return Ok(false),
        };
        Ok(self
            .payload
            .as_deref()
            .filter(|p| !p.is_empty())
            .map_or(true, |expected| expected == actual))
    }
}

/// Context equality against the value loaded for this event
pub struct ContextPredicate {
    value: String,
}

impl ContextPredicate {
    pub fn new(value: String) -> Self {
        Self { value }
    }
}

impl EventFilter for ContextPredicate {
    fn check(&self, _event: &Event, scope: &EventScope) -> Result<bool, FilterError> {
        let context = scope.context().ok_or(FilterError::ContextUnavailable)?;
        Ok(context.check(&self.value))
    }
}

/// `present`, `eq` and `neq` on one key; every part that is set must hold
pub struct StatePredicate {
    condition: StateCondition,
}

impl StatePredicate {
    pub fn new(condition: StateCondition) -> Self {
        Self { condition }
    }
}

impl EventFilter for StatePredicate {
    fn check(&self, _event: &Event, scope: &EventScope) -> Result<bool, FilterError> {
        let state = scope.state().ok_or(FilterError::StateUnavailable)?;
        let value = state.get(&self.condition.key);
        if let Some(present) = self.condition.present {
            if value.is_some() != present {
                return Ok(false);
            }
        }
        if let Some(eq) = &self.condition.eq {
            if value != Some(eq.as_str()) {
                return Ok(false);
            }
        }
        if let Some(neq) = &self.condition.neq {
            if value == Some(neq.as_str()) {
                return Ok(false);
            }
        }
        Ok(true)
    }
}
