//! Trigger matching
//!
//! A [`Trigger`] compiles into a chain of predicates evaluated left to right:
//! the event-type predicate (message, callback or payment), then context
//! equality, then each state condition in declaration order. The chain stops
//! at the first predicate that fails or cannot be evaluated.

mod predicates;

pub use predicates::{
    Always, CallbackPredicate, ContextPredicate, MessagePredicate, PaymentPredicate, PaymentStage,
    StatePredicate,
};

use crate::definition::Trigger;
use crate::dispatcher::EventScope;
use crate::event::Event;
use std::sync::Arc;
use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum FilterError {
    #[error("conversation state unavailable")]
    StateUnavailable,
    #[error("conversation context unavailable")]
    ContextUnavailable,
}

pub trait EventFilter: Send + Sync {
    fn check(&self, event: &Event, scope: &EventScope) -> Result<bool, FilterError>;
}

impl<T: EventFilter + ?Sized> EventFilter for Arc<T> {
    fn check(&self, event: &Event, scope: &EventScope) -> Result<bool, FilterError> {
        (**self).check(event, scope)
    }
}

/// Conjunction of predicates
#[derive(Default)]
pub struct Chain {
    predicates: Vec<Box<dyn EventFilter>>,
}

impl Chain {
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn and(mut self, predicate: impl EventFilter + 'static) -> Self {
        self.predicates.push(Box::new(predicate));
        self
    }

    pub fn len(&self) -> usize {
        self.predicates.len()
    }
}

impl EventFilter for Chain {
    fn check(&self, event: &Event, scope: &EventScope) -> Result<bool, FilterError> {
        for predicate in &self.predicates {
            if !predicate.check(event, scope)? {
                return Ok(false);
            }
        }
        Ok(true)
    }
}

/// Compiled form of a trigger
pub enum Compiled {
    /// Runs only when no ordinary registration matched
    Fallback,
    Filter(Arc<dyn EventFilter>),
}

impl Compiled {
    #[allow(dead_code)] // API completeness
    pub fn is_fallback(&self) -> bool {
        matches!(self, Compiled::Fallback)
    }
}

/// Compile a validated trigger
pub fn compile(trigger: &Trigger) -> Compiled {
    if trigger.fallback {
        return Compiled::Fallback;
    }
    let mut chain = Chain::new();
    if let Some(message) = &trigger.message {
        chain = chain.and(MessagePredicate::new(
            message.text.clone(),
            message.command.clone(),
        ));
    }
    if let Some(callback) = &trigger.callback {
        chain = chain.and(CallbackPredicate::new(callback.data.clone()));
    }
    if let Some(payment) = &trigger.pre_checkout {
        chain = chain.and(PaymentPredicate::new(
            PaymentStage::PreCheckout,
            payment.invoice_payload.clone(),
        ));
    }
    if let Some(payment) = &trigger.post_checkout {
        chain = chain.and(PaymentPredicate::new(
            PaymentStage::PostCheckout,
            payment.invoice_payload.clone(),
        ));
    }
    if let Some(context) = &trigger.context {
        chain = chain.and(ContextPredicate::new(context.clone()));
    }
    for condition in &trigger.state {
        chain = chain.and(StatePredicate::new(condition.clone()));
    }
    Compiled::Filter(Arc::new(chain))
}
