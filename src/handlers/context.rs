use super::{Handler, HandlerError};
use crate::dispatcher::EventScope;
use crate::event::Event;
use async_trait::async_trait;

/// Records a context change; it is applied when the event scope closes
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ContextHandler {
    Set(String),
    Reset,
}

#[async_trait]
impl Handler for ContextHandler {
    async fn handle(&self, _event: &Event, scope: &mut EventScope) -> Result<(), HandlerError> {
        let context = scope.context().ok_or(HandlerError::ContextUnavailable)?;
        match self {
            ContextHandler::Set(value) => context.set(value.as_str()),
            ContextHandler::Reset => context.reset(),
        }
        Ok(())
    }
}
