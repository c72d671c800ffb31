//! Bot assembly
//!
//! Turns a validated [`BotDefinition`] into a [`Dispatcher`]. Every handler
//! entry becomes a run of registrations sharing one compiled filter, in a
//! fixed order: validator, replies, state, context, webhook.

use crate::context::{ContextStore, MemoryContextStore, SqliteContextStore};
use crate::db::{Database, PersistenceError};
use crate::definition::{
    ApiAction, BotDefinition, ConfigIssue, ConfigProblem, ConfigurationError, ContextDef,
    HandlerDef, PaymentProviders, Persistence,
};
use crate::dispatcher::{Dispatcher, DispatcherBuilder, Registration};
use crate::event::ChatId;
use crate::filters::{self, Always, Compiled, EventFilter};
use crate::handlers::{
    ContextHandler, DataLoader, Handler, HttpDataLoader, ReplyBuildError, ReplyHandler,
    StateHandler, Validator, WebhookHandler,
};
use crate::platform::{Assets, ChatApi, FsAssets, LoggingChatApi};
use crate::secrets::Secrets;
use crate::state::{MemoryStateProvider, SqliteStateProvider, StateProvider};
use std::collections::HashMap;
use std::fmt::Display;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

/// Collaborators handlers are built against
pub struct Services {
    pub api: Arc<dyn ChatApi>,
    pub assets: Arc<dyn Assets>,
    pub http: reqwest::Client,
    pub secrets: Arc<Secrets>,
    pub state: Arc<dyn StateProvider>,
    pub context: Arc<dyn ContextStore>,
    pub event_deadline: Option<Duration>,
    pub api_deadline: Option<Duration>,
}

/// State and context backends of one bot
pub struct Storage {
    pub state: Arc<dyn StateProvider>,
    pub context: Arc<dyn ContextStore>,
}

/// Open the backends the definition asks for
///
/// `db_path` overrides the definition's persistence with a database file.
pub fn open_storage(
    definition: &BotDefinition,
    db_path: Option<&Path>,
    bot_id: i64,
) -> Result<Storage, PersistenceError> {
    let path = match (db_path, &definition.persistence) {
        (Some(path), _) => Some(path.to_path_buf()),
        (None, Persistence::Database { path }) => Some(path.into()),
        (None, Persistence::Memory) => None,
    };

    match path {
        Some(path) => {
            let db = Database::open(&path)?;
            tracing::info!(path = %path.display(), bot_id, "Using database persistence");
            if !definition.state.is_empty() {
                tracing::warn!(
                    keys = definition.state.len(),
                    "Default state is ignored by database persistence"
                );
            }
            Ok(Storage {
                state: Arc::new(SqliteStateProvider::new(db.clone(), bot_id)),
                context: Arc::new(SqliteContextStore::new(db, bot_id)),
            })
        }
        None => {
            tracing::info!(bot_id, "Using in-memory persistence");
            let defaults: HashMap<String, String> = definition
                .state
                .iter()
                .map(|(k, v)| (k.clone(), v.clone()))
                .collect();
            Ok(Storage {
                state: Arc::new(MemoryStateProvider::new(defaults)),
                context: Arc::new(MemoryContextStore::new()),
            })
        }
    }
}

fn issue(location: String, reason: impl Display) -> ConfigIssue {
    ConfigIssue {
        location,
        problem: ConfigProblem::Invalid {
            field: "template",
            reason: reason.to_string(),
        },
    }
}

/// Validate the definition and build the dispatcher for it
pub fn build(
    definition: &BotDefinition,
    services: &Services,
) -> Result<Dispatcher, ConfigurationError> {
    definition.validate()?;

    let mut builder = DispatcherBuilder::new(services.state.clone(), services.context.clone())
        .secrets(services.secrets.clone());
    if let Some(deadline) = services.event_deadline {
        builder = builder.event_deadline(deadline);
    }
    if let Some(deadline) = services.api_deadline {
        builder = builder.api_deadline(deadline);
    }

    let payments = definition.payment_tokens();
    let mut issues = Vec::new();
    for (i, def) in definition.handlers.iter().enumerate() {
        let at = format!("handlers[{i}]");
        register_handler(&mut builder, &at, def, services, &payments, &mut issues);
    }
    if let Some(api) = &definition.api {
        for (i, group) in api.handlers.iter().enumerate() {
            for (j, action) in group.actions.iter().enumerate() {
                let at = format!("api.handlers[{i}].actions[{j}]");
                for handler in action_handlers(&at, action, services, &mut issues) {
                    builder.api_handler(&group.id, handler);
                }
            }
        }
    }

    if !issues.is_empty() {
        return Err(ConfigurationError::Invalid(issues));
    }
    Ok(builder.build())
}

/// Parse, validate and compile a definition without opening storage
///
/// Catches everything [`build`] would reject, template syntax included.
pub fn check(source: &str) -> Result<BotDefinition, ConfigurationError> {
    let definition = BotDefinition::from_yaml(source)?;
    let services = Services {
        api: Arc::new(LoggingChatApi),
        assets: Arc::new(FsAssets::new(".")),
        http: reqwest::Client::new(),
        secrets: Arc::new(Secrets::new()),
        state: Arc::new(MemoryStateProvider::new(HashMap::new())),
        context: Arc::new(MemoryContextStore::new()),
        event_deadline: None,
        api_deadline: None,
    };
    build(&definition, &services)?;
    Ok(definition)
}

fn register_handler(
    builder: &mut DispatcherBuilder,
    at: &str,
    def: &HandlerDef,
    services: &Services,
    payments: &PaymentProviders,
    issues: &mut Vec<ConfigIssue>,
) {
    let (filter, fallback): (Arc<dyn EventFilter>, bool) = match filters::compile(&def.trigger) {
        Compiled::Fallback => (Arc::new(Always), true),
        Compiled::Filter(filter) => (filter, false),
    };

    let loader: Option<Arc<dyn DataLoader>> = match def.data.as_ref().and_then(|d| d.fetch.as_ref()) {
        Some(fetch) => match HttpDataLoader::new(services.http.clone(), fetch) {
            Ok(loader) => Some(Arc::new(loader)),
            Err(e) => {
                issues.push(issue(format!("{at}.data.fetch"), e));
                None
            }
        },
        None => None,
    };

    let mut handlers: Vec<(String, Arc<dyn Handler>)> = Vec::new();
    if let Some(validate) = &def.validate {
        match Validator::new(services.api.clone(), &validate.error_message, validate.checks.clone()) {
            Ok(validator) => handlers.push((format!("{at}.validate"), Arc::new(validator))),
            Err(e) => issues.push(issue(format!("{at}.validate"), e)),
        }
    }
    for (j, reply) in def.replies.iter().enumerate() {
        let label = format!("{at}.reply[{j}]");
        match ReplyHandler::new(reply, services.api.clone(), services.assets.clone(), payments) {
            Ok(handler) => handlers.push((label, Arc::new(handler))),
            Err(ReplyBuildError::UnknownProvider(name)) => issues.push(ConfigIssue {
                location: label,
                problem: ConfigProblem::UnknownPaymentProvider(name),
            }),
            Err(ReplyBuildError::Template(e)) => issues.push(issue(label, e)),
        }
    }
    if let Some(state) = &def.state {
        match StateHandler::new(state.to_ops()) {
            Ok(handler) => handlers.push((format!("{at}.state"), Arc::new(handler))),
            Err(e) => issues.push(issue(format!("{at}.state"), e)),
        }
    }
    if let Some(context) = &def.context {
        handlers.push((format!("{at}.context"), Arc::new(context_handler(context))));
    }
    if let Some(webhook) = &def.webhook {
        match WebhookHandler::new(services.http.clone(), webhook) {
            Ok(handler) => handlers.push((format!("{at}.webhook"), Arc::new(handler))),
            Err(e) => issues.push(issue(format!("{at}.webhook"), e)),
        }
    }

    for (label, handler) in handlers {
        let mut registration = Registration::new(label, filter.clone(), handler);
        if let Some(loader) = &loader {
            registration = registration.with_loader(loader.clone());
        }
        if fallback {
            builder.register_fallback(registration);
        } else {
            builder.register(registration);
        }
    }
}

fn context_handler(def: &ContextDef) -> ContextHandler {
    match def.set.as_deref().filter(|v| !v.is_empty()) {
        Some(value) => ContextHandler::Set(value.to_string()),
        None => ContextHandler::Reset,
    }
}

fn action_handlers(
    at: &str,
    action: &ApiAction,
    services: &Services,
    issues: &mut Vec<ConfigIssue>,
) -> Vec<Arc<dyn Handler>> {
    let mut handlers: Vec<Arc<dyn Handler>> = Vec::new();
    if let Some(message) = &action.send_message {
        let recipients = action.chat_ids.iter().copied().map(ChatId).collect();
        match ReplyHandler::send_message(message, services.api.clone(), recipients) {
            Ok(handler) => handlers.push(Arc::new(handler)),
            Err(e) => issues.push(issue(format!("{at}.send-message"), e)),
        }
    }
    if let Some(state) = &action.state {
        match StateHandler::new(state.to_ops()) {
            Ok(handler) => handlers.push(Arc::new(handler)),
            Err(e) => issues.push(issue(format!("{at}.state"), e)),
        }
    }
    if let Some(context) = &action.context {
        handlers.push(Arc::new(context_handler(context)));
    }
    handlers
}
