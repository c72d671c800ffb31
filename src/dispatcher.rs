//! Handler pipeline
//!
//! The [`Dispatcher`] is built once at startup and shared by the update loop
//! and the HTTP surface. Each event moves through fixed phases:
//!
//! - `Opened`: conversation lock taken, context scope begun, state loaded
//! - `Matching`: every ordinary registration's filter evaluated
//! - `Executing`: matched handlers run in registration order
//! - `FallbackCheck`: fallback handlers run iff nothing matched
//! - `Closed`: context committed, then state changes persisted
//!
//! `Closed` is always reached, including after a handler failure or an
//! expired deadline.

mod outcome;
mod scope;
#[cfg(test)]
pub mod testing;

pub use outcome::{DispatchError, DispatchOutcome, Failure, InvokeError};
pub use scope::EventScope;

use crate::context::{ContextCloser, ContextProvider, ContextStore, ConversationLocks};
use crate::event::{ChatId, Event, EventKind};
use crate::filters::EventFilter;
use crate::handlers::{DataLoader, Handler, HandlerError};
use crate::secrets::Secrets;
use crate::state::{State, StateProvider};
use serde_json::{Map, Value};
use std::collections::{BTreeMap, HashMap};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    Opened,
    Matching,
    Executing,
    FallbackCheck,
    Closed,
}

fn trace_phase(chat: ChatId, phase: Phase) {
    tracing::debug!(chat_id = %chat, phase = ?phase, "Dispatch phase");
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Flow {
    Continue,
    Stop,
}

/// Filter, handler and optional data loader, run as one unit
pub struct Registration {
    label: String,
    filter: Arc<dyn EventFilter>,
    handler: Arc<dyn Handler>,
    loader: Option<Arc<dyn DataLoader>>,
}

impl Registration {
    pub fn new(
        label: impl Into<String>,
        filter: Arc<dyn EventFilter>,
        handler: Arc<dyn Handler>,
    ) -> Self {
        Self {
            label: label.into(),
            filter,
            handler,
            loader: None,
        }
    }

    #[must_use]
    pub fn with_loader(mut self, loader: Arc<dyn DataLoader>) -> Self {
        self.loader = Some(loader);
        self
    }
}

struct ApiHandler {
    label: String,
    handler: Arc<dyn Handler>,
}

pub struct DispatcherBuilder {
    registrations: Vec<Registration>,
    fallback: Vec<Registration>,
    api_groups: HashMap<String, Vec<ApiHandler>>,
    state: Arc<dyn StateProvider>,
    context: Arc<dyn ContextStore>,
    secrets: Arc<Secrets>,
    event_deadline: Option<Duration>,
    api_deadline: Option<Duration>,
}

impl DispatcherBuilder {
    pub fn new(state: Arc<dyn StateProvider>, context: Arc<dyn ContextStore>) -> Self {
        Self {
            registrations: Vec::new(),
            fallback: Vec::new(),
            api_groups: HashMap::new(),
            state,
            context,
            secrets: Arc::new(Secrets::new()),
            event_deadline: None,
            api_deadline: None,
        }
    }

    #[must_use]
    pub fn secrets(mut self, secrets: Arc<Secrets>) -> Self {
        self.secrets = secrets;
        self
    }

    /// Limit on handler execution for events from the update loop
    #[must_use]
    pub fn event_deadline(mut self, deadline: Duration) -> Self {
        self.event_deadline = Some(deadline);
        self
    }

    /// Limit on handler execution for API invocations
    #[must_use]
    pub fn api_deadline(mut self, deadline: Duration) -> Self {
        self.api_deadline = Some(deadline);
        self
    }

    pub fn register(&mut self, registration: Registration) -> &mut Self {
        self.registrations.push(registration);
        self
    }

    /// Registration consulted only when no ordinary one matched
    pub fn register_fallback(&mut self, registration: Registration) -> &mut Self {
        self.fallback.push(registration);
        self
    }

    /// Append a handler to the API group `id`
    pub fn api_handler(&mut self, id: &str, handler: Arc<dyn Handler>) -> &mut Self {
        let group = self.api_groups.entry(id.to_string()).or_default();
        let label = format!("api.{id}[{}]", group.len());
        group.push(ApiHandler { label, handler });
        self
    }

    pub fn build(self) -> Dispatcher {
        tracing::info!(
            handlers = self.registrations.len(),
            fallback = self.fallback.len(),
            api_groups = self.api_groups.len(),
            "Dispatcher built"
        );
        Dispatcher {
            registrations: self.registrations,
            fallback: self.fallback,
            api_groups: self.api_groups,
            state: self.state,
            context: ContextProvider::new(self.context),
            locks: ConversationLocks::new(),
            secrets: self.secrets,
            event_deadline: self.event_deadline,
            api_deadline: self.api_deadline,
        }
    }
}

/// Immutable routing table plus the shared state and context providers
pub struct Dispatcher {
    registrations: Vec<Registration>,
    fallback: Vec<Registration>,
    api_groups: HashMap<String, Vec<ApiHandler>>,
    state: Arc<dyn StateProvider>,
    context: ContextProvider,
    locks: ConversationLocks,
    secrets: Arc<Secrets>,
    event_deadline: Option<Duration>,
    api_deadline: Option<Duration>,
}

/// Run `work` under an optional deadline; returns the deadline if it expired
async fn within(deadline: Option<Duration>, work: impl Future<Output = ()>) -> Option<Duration> {
    match deadline {
        Some(limit) => tokio::time::timeout(limit, work).await.err().map(|_| limit),
        None => {
            work.await;
            None
        }
    }
}

impl Dispatcher {
    /// Route one event to its handlers
    pub async fn dispatch(&self, event: &Event) -> DispatchOutcome {
        let chat = event.chat_id;
        let _guard = self.locks.acquire(chat).await;
        let mut outcome = DispatchOutcome::new(chat);
        let (mut scope, closer) = self.open(chat, &mut outcome).await;

        let matched = self.select(event, &scope, &mut outcome);
        let expired = within(
            self.event_deadline,
            self.execute(event, &mut scope, &matched, &mut outcome),
        )
        .await;
        if let Some(limit) = expired {
            tracing::warn!(chat_id = %chat, deadline = ?limit, "Event deadline exceeded");
            outcome.push(Failure::DeadlineExceeded(limit));
        }

        self.close(scope, closer, &mut outcome).await;
        tracing::debug!(
            chat_id = %chat,
            matched = outcome.matched,
            handled = outcome.handled,
            fallback = outcome.fallback_used,
            validation_failed = outcome.validation_failed,
            failures = outcome.failures.len(),
            "Event dispatched"
        );
        outcome
    }

    /// Run the API handler group `id` once for `chat`, skipping filters
    ///
    /// `params` are exposed to templates as `data.<key>`, along with
    /// `data.chat.id`.
    pub async fn invoke(
        &self,
        id: &str,
        chat: ChatId,
        params: BTreeMap<String, String>,
    ) -> Result<DispatchOutcome, InvokeError> {
        let group = self
            .api_groups
            .get(id)
            .ok_or_else(|| InvokeError::UnknownHandler(id.to_string()))?;

        let mut data: Map<String, Value> = params
            .iter()
            .map(|(k, v)| (k.clone(), Value::String(v.clone())))
            .collect();
        data.insert(
            "chat".to_string(),
            serde_json::json!({ "id": chat.to_string() }),
        );
        let event = Event {
            chat_id: chat,
            from: None,
            kind: EventKind::Api {
                handler_id: id.to_string(),
                params,
            },
        };

        let _guard = self.locks.acquire(chat).await;
        let mut outcome = DispatchOutcome::new(chat);
        let (mut scope, closer) = self.open(chat, &mut outcome).await;
        scope.set_data(Value::Object(data));
        outcome.matched = group.len();

        let run = async {
            trace_phase(chat, Phase::Executing);
            for api_handler in group {
                match api_handler.handler.handle(&event, &mut scope).await {
                    Ok(()) => outcome.handled += 1,
                    Err(HandlerError::ValidationFailed) => {
                        outcome.validation_failed = true;
                        break;
                    }
                    Err(source) => {
                        tracing::warn!(chat_id = %chat, handler = %api_handler.label, error = %source, "API handler failed");
                        outcome.push(Failure::Handler {
                            label: api_handler.label.clone(),
                            source,
                        });
                    }
                }
            }
        };
        if let Some(limit) = within(self.api_deadline, run).await {
            tracing::warn!(chat_id = %chat, handler = id, deadline = ?limit, "API deadline exceeded");
            outcome.push(Failure::DeadlineExceeded(limit));
        }

        self.close(scope, closer, &mut outcome).await;
        Ok(outcome)
    }

    async fn open(
        &self,
        chat: ChatId,
        outcome: &mut DispatchOutcome,
    ) -> (EventScope, Option<ContextCloser>) {
        let mut scope = EventScope::new(chat, Arc::clone(&self.secrets));

        let closer = match self.context.begin(chat).await {
            Ok((context, closer)) => {
                scope = scope.with_context(context);
                Some(closer)
            }
            Err(source) => {
                tracing::warn!(chat_id = %chat, error = %source, "Failed to load context");
                outcome.push(Failure::Persistence {
                    what: "load context",
                    source,
                });
                None
            }
        };

        let mut state = State::new();
        match self.state.load(chat, &mut state).await {
            Ok(()) => scope = scope.with_state(state),
            Err(source) => {
                tracing::warn!(chat_id = %chat, error = %source, "Failed to load state");
                outcome.push(Failure::Persistence {
                    what: "load state",
                    source,
                });
            }
        }

        trace_phase(chat, Phase::Opened);
        (scope, closer)
    }

    fn select<'a>(
        &'a self,
        event: &Event,
        scope: &EventScope,
        outcome: &mut DispatchOutcome,
    ) -> Vec<&'a Registration> {
        trace_phase(event.chat_id, Phase::Matching);
        let mut matched = Vec::new();
        for registration in &self.registrations {
            match registration.filter.check(event, scope) {
                Ok(true) => matched.push(registration),
                Ok(false) => {}
                Err(source) => {
                    tracing::warn!(
                        chat_id = %event.chat_id,
                        handler = %registration.label,
                        error = %source,
                        "Filter failed, registration skipped"
                    );
                    outcome.push(Failure::Filter {
                        label: registration.label.clone(),
                        source,
                    });
                }
            }
        }
        outcome.matched = matched.len();
        tracing::debug!(chat_id = %event.chat_id, matched = matched.len(), "Handlers matched");
        matched
    }

    async fn execute(
        &self,
        event: &Event,
        scope: &mut EventScope,
        matched: &[&Registration],
        outcome: &mut DispatchOutcome,
    ) {
        trace_phase(event.chat_id, Phase::Executing);
        for registration in matched {
            if self.run(registration, event, scope, outcome).await == Flow::Stop {
                return;
            }
        }

        trace_phase(event.chat_id, Phase::FallbackCheck);
        if !matched.is_empty() {
            return;
        }
        for registration in &self.fallback {
            match registration.filter.check(event, scope) {
                Ok(true) => {}
                Ok(false) => continue,
                Err(source) => {
                    outcome.push(Failure::Filter {
                        label: registration.label.clone(),
                        source,
                    });
                    continue;
                }
            }
            outcome.fallback_used = true;
            if self.run(registration, event, scope, outcome).await == Flow::Stop {
                return;
            }
        }
    }

    async fn run(
        &self,
        registration: &Registration,
        event: &Event,
        scope: &mut EventScope,
        outcome: &mut DispatchOutcome,
    ) -> Flow {
        let chat = event.chat_id;
        if let Some(loader) = &registration.loader {
            match loader.load(event, scope).await {
                Ok(data) => scope.set_data(data),
                Err(source) => {
                    tracing::warn!(chat_id = %chat, handler = %registration.label, error = %source, "Data loader failed");
                    outcome.push(Failure::DataLoader {
                        label: registration.label.clone(),
                        source,
                    });
                    return Flow::Continue;
                }
            }
        }

        tracing::debug!(chat_id = %chat, handler = %registration.label, "Handling");
        let result = registration.handler.handle(event, scope).await;
        scope.clear_data();

        match result {
            Ok(()) => {
                outcome.handled += 1;
                Flow::Continue
            }
            Err(HandlerError::ValidationFailed) => {
                tracing::debug!(chat_id = %chat, handler = %registration.label, "Validation failed, remaining handlers skipped");
                outcome.validation_failed = true;
                Flow::Stop
            }
            Err(source) => {
                tracing::warn!(chat_id = %chat, handler = %registration.label, error = %source, "Handler failed");
                outcome.push(Failure::Handler {
                    label: registration.label.clone(),
                    source,
                });
                Flow::Continue
            }
        }
    }

    async fn close(
        &self,
        scope: EventScope,
        closer: Option<ContextCloser>,
        outcome: &mut DispatchOutcome,
    ) {
        let chat = scope.chat();
        if let Some(closer) = closer {
            if let Err(source) = closer.close().await {
                tracing::error!(chat_id = %chat, error = %source, "Failed to commit context");
                outcome.push(Failure::Persistence {
                    what: "commit context",
                    source,
                });
            }
        }

        if let Some(state) = scope.into_state() {
            if !state.changes().is_empty() {
                if let Err(source) = self.state.update(chat, &state).await {
                    tracing::error!(chat_id = %chat, error = %source, "Failed to persist state");
                    outcome.push(Failure::Persistence {
                        what: "persist state",
                        source,
                    });
                }
            }
        }
        trace_phase(chat, Phase::Closed);
    }
}
