//! Side-effecting handlers
//!
//! Each handler performs one effect for one event. Handlers read and write
//! the event's [`EventScope`]; outbound effects go through the platform
//! ports.

mod context;
mod data;
mod reply;
mod state;
pub mod templates;
mod validator;
mod webhook;

pub use context::ContextHandler;
pub use data::{DataLoader, HttpDataLoader};
pub use reply::{ReplyBuildError, ReplyHandler};
pub use state::StateHandler;
pub use templates::{Template, TemplateContext, TemplateError};
pub use validator::Validator;
pub use webhook::WebhookHandler;

use crate::dispatcher::EventScope;
use crate::event::Event;
use crate::platform::{AssetError, PlatformError};
use crate::state::StateOpError;
use async_trait::async_trait;
use std::sync::Arc;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum HandlerError {
    #[error(transparent)]
    Platform(#[from] PlatformError),
    #[error(transparent)]
    Template(#[from] TemplateError),
    #[error("state operation: {0}")]
    StateOp(#[from] StateOpError),
    #[error("http: {0}")]
    Http(String),
    #[error(transparent)]
    Asset(#[from] AssetError),
    #[error("conversation state unavailable")]
    StateUnavailable,
    #[error("conversation context unavailable")]
    ContextUnavailable,
    #[error("{kind} reply needs {needs}")]
    UnsupportedEvent {
        kind: &'static str,
        needs: &'static str,
    },
    /// Input rejected; the remaining handlers of the event are skipped
    #[error("validation failed")]
    ValidationFailed,
}

impl From<reqwest::Error> for HandlerError {
    fn from(e: reqwest::Error) -> Self {
        HandlerError::Http(e.to_string())
    }
}

#[async_trait]
pub trait Handler: Send + Sync {
    async fn handle(&self, event: &Event, scope: &mut EventScope) -> Result<(), HandlerError>;
}

#[async_trait]
impl<T: Handler + ?Sized> Handler for Arc<T> {
    async fn handle(&self, event: &Event, scope: &mut EventScope) -> Result<(), HandlerError> {
        (**self).handle(event, scope).await
    }
}
