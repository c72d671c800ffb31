//! Per-event working set

use crate::context::ContextScope;
use crate::event::ChatId;
use crate::secrets::Secrets;
use crate::state::State;
use serde_json::Value;
use std::sync::Arc;

/// Everything handlers and filters of one event share
///
/// `state` or `context` is `None` when its backend failed to load; filters
/// and handlers that need it report that instead of guessing.
pub struct EventScope {
    chat: ChatId,
    state: Option<State>,
    context: Option<ContextScope>,
    data: Value,
    secrets: Arc<Secrets>,
}

impl EventScope {
    pub fn new(chat: ChatId, secrets: Arc<Secrets>) -> Self {
        Self {
            chat,
            state: None,
            context: None,
            data: Value::Null,
            secrets,
        }
    }

    #[must_use]
    pub fn with_state(mut self, state: State) -> Self {
        self.state = Some(state);
        self
    }

    #[must_use]
    pub fn with_context(mut self, context: ContextScope) -> Self {
        self.context = Some(context);
        self
    }

    pub fn chat(&self) -> ChatId {
        self.chat
    }

    pub fn state(&self) -> Option<&State> {
        self.state.as_ref()
    }

    pub fn state_mut(&mut self) -> Option<&mut State> {
        self.state.as_mut()
    }

    pub fn context(&self) -> Option<&ContextScope> {
        self.context.as_ref()
    }

    /// Output of the current registration's data loader
    pub fn data(&self) -> &Value {
        &self.data
    }

    pub fn set_data(&mut self, data: Value) {
        self.data = data;
    }

    pub fn clear_data(&mut self) {
        self.data = Value::Null;
    }

    pub fn secrets(&self) -> &Secrets {
        &self.secrets
    }

    pub(crate) fn into_state(self) -> Option<State> {
        self.state
    }
}
