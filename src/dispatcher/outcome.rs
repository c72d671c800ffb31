//! Result of handling one event

use crate::db::PersistenceError;
use crate::event::ChatId;
use crate::filters::FilterError;
use crate::handlers::HandlerError;
use std::fmt;
use std::time::Duration;
use thiserror::Error;

/// One thing that went wrong while handling an event
#[derive(Debug, Error)]
pub enum Failure {
    #[error("{label}: filter: {source}")]
    Filter { label: String, source: FilterError },
    #[error("{label}: data loader: {source}")]
    DataLoader { label: String, source: HandlerError },
    #[error("{label}: {source}")]
    Handler { label: String, source: HandlerError },
    #[error("persist {what}: {source}")]
    Persistence {
        what: &'static str,
        source: PersistenceError,
    },
    #[error("handlers exceeded the {0:?} deadline")]
    DeadlineExceeded(Duration),
}

/// What happened while an event was dispatched
///
/// Failures are collected, never short-circuited: a failing handler does not
/// undo or prevent the handlers before or after it.
#[derive(Debug)]
pub struct DispatchOutcome {
    pub chat: ChatId,
    /// Handlers that ran to completion without error
    pub handled: usize,
    /// Ordinary registrations whose filter matched
    pub matched: usize,
    pub fallback_used: bool,
    /// A validator stopped the remaining handlers
    pub validation_failed: bool,
    pub failures: Vec<Failure>,
}

impl DispatchOutcome {
    pub fn new(chat: ChatId) -> Self {
        Self {
            chat,
            handled: 0,
            matched: 0,
            fallback_used: false,
            validation_failed: false,
            failures: Vec::new(),
        }
    }

    pub fn push(&mut self, failure: Failure) {
        self.failures.push(failure);
    }

    pub fn is_success(&self) -> bool {
        self.failures.is_empty()
    }

    pub fn deadline_exceeded(&self) -> bool {
        self.failures
            .iter()
            .any(|f| matches!(f, Failure::DeadlineExceeded(_)))
    }

    pub fn into_result(self) -> Result<(), DispatchError> {
        if self.failures.is_empty() {
            Ok(())
        } else {
            Err(DispatchError {
                chat: self.chat,
                failures: self.failures,
            })
        }
    }
}

/// All failures of one event, joined
#[derive(Debug, Error)]
pub struct DispatchError {
    pub chat: ChatId,
    pub failures: Vec<Failure>,
}

impl fmt::Display for DispatchError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "chat {}: {} failure(s)", self.chat, self.failures.len())?;
        for failure in &self.failures {
            write!(f, "; {failure}")?;
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum InvokeError {
    #[error("unknown handler {0:?}")]
    UnknownHandler(String),
}
