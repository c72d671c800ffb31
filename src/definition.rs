//! Declarative bot definition
//!
//! Parsed from YAML once at startup and validated as a whole: every problem
//! found is reported together in one [`ConfigurationError`], each tagged with
//! the location of the offending entry.

mod reply;
mod trigger;

pub use reply::{
    CallbackReply, EditReply, FileReply, InlineButton, Invoice, MessageReply, ParseMode,
    PreCheckoutAnswer, Price, Reply, ReplyMarkup, TemplateStyle,
};
pub use trigger::{
    CallbackTrigger, MessageTrigger, PaymentTrigger, StateCondition, Trigger, TriggerKind,
};

use crate::secrets::Secret;
use crate::state::StateOp;
use serde::{Deserialize, Deserializer};
use std::collections::{BTreeMap, HashMap, HashSet};
use std::fmt;
use thiserror::Error;

/// Accept either a single value or a list of values
pub(crate) fn one_or_many<'de, D, T>(deserializer: D) -> Result<Vec<T>, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum OneOrMany<T> {
        One(T),
        Many(Vec<T>),
    }

    Ok(match OneOrMany::deserialize(deserializer)? {
        OneOrMany::One(value) => vec![value],
        OneOrMany::Many(values) => values,
    })
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct BotDefinition {
    /// Default state every conversation starts from
    #[serde(default)]
    pub state: BTreeMap<String, String>,
    #[serde(default)]
    pub persistence: Persistence,
    #[serde(default)]
    pub handlers: Vec<HandlerDef>,
    #[serde(default)]
    pub api: Option<ApiDef>,
    /// Invoice providers, referenced by name from invoice replies
    #[serde(default, rename = "paymentProviders")]
    pub payment_providers: Vec<PaymentProviderDef>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PaymentProviderDef {
    pub name: String,
    pub token: Secret,
}

/// Provider tokens by provider name
pub type PaymentProviders = HashMap<String, Secret>;

/// Where state and context live
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum Persistence {
    #[default]
    Memory,
    /// SQLite database file
    Database { path: String },
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct HandlerDef {
    #[serde(rename = "on")]
    pub trigger: Trigger,
    #[serde(default, rename = "reply")]
    pub replies: Vec<Reply>,
    #[serde(default)]
    pub state: Option<StateDef>,
    #[serde(default)]
    pub context: Option<ContextDef>,
    #[serde(default)]
    pub webhook: Option<WebhookDef>,
    #[serde(default)]
    pub data: Option<DataDef>,
    #[serde(default)]
    pub validate: Option<ValidatorDef>,
}

impl HandlerDef {
    fn has_effects(&self) -> bool {
        !self.replies.is_empty()
            || self.state.is_some()
            || self.context.is_some()
            || self.webhook.is_some()
            || self.validate.is_some()
    }
}

/// State mutations: plain sets and deletes run first, then `ops` in order
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct StateDef {
    #[serde(default)]
    pub set: BTreeMap<String, String>,
    #[serde(default, deserialize_with = "one_or_many")]
    pub delete: Vec<String>,
    #[serde(default)]
    pub ops: Vec<StateOp>,
}

impl StateDef {
    pub fn to_ops(&self) -> Vec<StateOp> {
        let sets = self.set.iter().map(|(key, value)| StateOp::Set {
            key: key.clone(),
            value: value.clone(),
        });
        let deletes = self
            .delete
            .iter()
            .map(|key| StateOp::Delete { key: key.clone() });
        sets.chain(deletes).chain(self.ops.iter().cloned()).collect()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct ContextDef {
    #[serde(default)]
    pub set: Option<String>,
    /// Resets the context; the value only documents which context is left
    #[serde(default)]
    pub delete: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct WebhookDef {
    pub url: String,
    #[serde(default = "default_method")]
    pub method: String,
    #[serde(default)]
    pub headers: BTreeMap<String, String>,
    #[serde(default)]
    pub body: BTreeMap<String, String>,
}

fn default_method() -> String {
    "GET".to_string()
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct DataDef {
    #[serde(default)]
    pub fetch: Option<FetchDef>,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct FetchDef {
    #[serde(default = "default_method")]
    pub method: String,
    pub url: String,
    #[serde(default)]
    pub headers: BTreeMap<String, String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Check {
    NotEmpty,
    IsInt,
    IsFloat,
    IsBool,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct ValidatorDef {
    /// Sent to the conversation when a check fails
    #[serde(default)]
    pub error_message: String,
    pub checks: Vec<Check>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ApiDef {
    #[serde(default)]
    pub handlers: Vec<ApiHandlerDef>,
}

/// Handler group invoked by id through the HTTP surface
#[derive(Debug, Clone, Deserialize)]
pub struct ApiHandlerDef {
    pub id: String,
    pub actions: Vec<ApiAction>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ApiAction {
    #[serde(default, rename = "send-message")]
    pub send_message: Option<MessageReply>,
    #[serde(default)]
    pub state: Option<StateDef>,
    #[serde(default)]
    pub context: Option<ContextDef>,
    /// Recipients of `send-message`; the requested chat when empty
    #[serde(default, rename = "chat-id", deserialize_with = "one_or_many")]
    pub chat_ids: Vec<i64>,
}

/// One validation problem
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigProblem {
    #[error("no handlers configured")]
    NoHandlers,
    #[error("handler has no effect")]
    NoEffects,
    #[error("empty trigger")]
    EmptyTrigger,
    #[error("fallback cannot be combined with other triggers")]
    FallbackCombined,
    #[error("triggers cannot be combined: {0}")]
    ConflictingTriggers(String),
    #[error("multiple fallback handlers")]
    MultipleFallbacks,
    #[error("state condition on {0:?} has no value")]
    EmptyStateCondition(String),
    #[error("{0} is empty")]
    EmptyField(&'static str),
    #[error("invalid {field}: {reason}")]
    Invalid { field: &'static str, reason: String },
    #[error("duplicate api handler id {0:?}")]
    DuplicateApiHandler(String),
    #[error("unknown payment provider {0:?}")]
    UnknownPaymentProvider(String),
    #[error("duplicate payment provider {0:?}")]
    DuplicatePaymentProvider(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConfigIssue {
    /// Path of the offending entry, e.g. `handlers[2].on`
    pub location: String,
    pub problem: ConfigProblem,
}

impl fmt::Display for ConfigIssue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.location, self.problem)
    }
}

#[derive(Debug, Error)]
pub enum ConfigurationError {
    #[error("parse bot definition: {0}")]
    Parse(#[from] serde_yaml::Error),
    #[error("invalid bot definition: {}", join_issues(.0))]
    Invalid(Vec<ConfigIssue>),
}

fn join_issues(issues: &[ConfigIssue]) -> String {
    issues
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}

#[derive(Default)]
struct Issues(Vec<ConfigIssue>);

impl Issues {
    fn push(&mut self, location: impl Into<String>, problem: ConfigProblem) {
        self.0.push(ConfigIssue {
            location: location.into(),
            problem,
        });
    }

    fn require(&mut self, location: &str, field: &'static str, value: &str) {
        if value.trim().is_empty() {
            self.push(location, ConfigProblem::EmptyField(field));
        }
    }
}

impl BotDefinition {
    /// Parse and validate
    pub fn from_yaml(source: &str) -> Result<Self, ConfigurationError> {
        let definition: BotDefinition = serde_yaml::from_str(source)?;
        definition.validate()?;
        Ok(definition)
    }

    /// Tokens of the declared payment providers
    pub fn payment_tokens(&self) -> PaymentProviders {
        self.payment_providers
            .iter()
            .map(|p| (p.name.clone(), p.token.clone()))
            .collect()
    }

    pub fn validate(&self) -> Result<(), ConfigurationError> {
        let mut issues = Issues::default();

        if self.handlers.is_empty() {
            issues.push("handlers", ConfigProblem::NoHandlers);
        }

        let mut providers = HashSet::new();
        for (i, provider) in self.payment_providers.iter().enumerate() {
            let at = format!("paymentProviders[{i}]");
            issues.require(&at, "provider name", &provider.name);
            issues.require(&at, "provider token", provider.token.expose());
            if !providers.insert(provider.name.as_str()) {
                issues.push(
                    at,
                    ConfigProblem::DuplicatePaymentProvider(provider.name.clone()),
                );
            }
        }

        let mut fallback_seen = false;
        for (i, handler) in self.handlers.iter().enumerate() {
            let at = format!("handlers[{i}]");
            for (j, reply) in handler.replies.iter().enumerate() {
                if let Reply::Invoice(invoice) = reply {
                    if !providers.contains(invoice.provider.as_str()) {
                        issues.push(
                            format!("{at}.reply[{j}]"),
                            ConfigProblem::UnknownPaymentProvider(invoice.provider.clone()),
                        );
                    }
                }
            }
            if handler.trigger.fallback {
                if fallback_seen {
                    issues.push(format!("{at}.on"), ConfigProblem::MultipleFallbacks);
                }
                fallback_seen = true;
            }
            validate_handler(&at, handler, &mut issues);
        }

        if let Some(api) = &self.api {
            let mut seen = HashSet::new();
            for (i, handler) in api.handlers.iter().enumerate() {
                let at = format!("api.handlers[{i}]");
                issues.require(&at, "id", &handler.id);
                if !seen.insert(handler.id.as_str()) {
                    issues.push(
                        at.clone(),
                        ConfigProblem::DuplicateApiHandler(handler.id.clone()),
                    );
                }
                if handler.actions.is_empty() {
                    issues.push(at.clone(), ConfigProblem::NoEffects);
                }
                for (j, action) in handler.actions.iter().enumerate() {
                    validate_action(&format!("{at}.actions[{j}]"), action, &mut issues);
                }
            }
        }

        if issues.0.is_empty() {
            Ok(())
        } else {
            Err(ConfigurationError::Invalid(issues.0))
        }
    }
}

fn validate_handler(at: &str, handler: &HandlerDef, issues: &mut Issues) {
    validate_trigger(&format!("{at}.on"), &handler.trigger, issues);
    if !handler.has_effects() {
        issues.push(at, ConfigProblem::NoEffects);
    }
    for (j, reply) in handler.replies.iter().enumerate() {
        validate_reply(&format!("{at}.reply[{j}]"), reply, issues);
    }
    if let Some(context) = &handler.context {
        validate_context(&format!("{at}.context"), context, issues);
    }
    if let Some(webhook) = &handler.webhook {
        let at = format!("{at}.webhook");
        validate_url(&at, &webhook.url, issues);
        validate_method(&at, &webhook.method, issues);
    }
    if let Some(fetch) = handler.data.as_ref().and_then(|d| d.fetch.as_ref()) {
        let at = format!("{at}.data.fetch");
        issues.require(&at, "url", &fetch.url);
        validate_method(&at, &fetch.method, issues);
    }
    if let Some(validator) = &handler.validate {
        if validator.checks.is_empty() {
            issues.push(format!("{at}.validate"), ConfigProblem::EmptyField("checks"));
        }
    }
}

fn validate_trigger(at: &str, trigger: &Trigger, issues: &mut Issues) {
    let kinds = trigger.kinds();
    if kinds.is_empty() {
        issues.push(at, ConfigProblem::EmptyTrigger);
        return;
    }
    if trigger.fallback && kinds.len() > 1 {
        issues.push(at, ConfigProblem::FallbackCombined);
        return;
    }
    let base: Vec<_> = kinds.iter().filter(|k| k.is_base()).collect();
    if base.len() > 1 {
        let names = base
            .iter()
            .map(|k| format!("{k:?}").to_lowercase())
            .collect::<Vec<_>>()
            .join(", ");
        issues.push(at, ConfigProblem::ConflictingTriggers(names));
    }

    if let Some(message) = &trigger.message {
        if message.text.is_empty() && message.command.is_none() {
            issues.push(format!("{at}.message"), ConfigProblem::EmptyField("message trigger"));
        }
        if !message.text.is_empty() && message.command.is_some() {
            issues.push(
                format!("{at}.message"),
                ConfigProblem::ConflictingTriggers("text, command".into()),
            );
        }
    }
    if let Some(callback) = &trigger.callback {
        issues.require(&format!("{at}.callback"), "callback data", &callback.data);
    }
    for (i, condition) in trigger.state.iter().enumerate() {
        let at = format!("{at}.state[{i}]");
        issues.require(&at, "key", &condition.key);
        if condition.is_empty() {
            issues.push(at, ConfigProblem::EmptyStateCondition(condition.key.clone()));
        }
    }
}

fn validate_reply(at: &str, reply: &Reply, issues: &mut Issues) {
    match reply {
        Reply::Message(message) => validate_message(at, message, issues),
        Reply::Callback(callback) => issues.require(at, "callback text", &callback.text),
        Reply::Edit(edit) => {
            let text = edit.text.as_deref().is_some_and(|t| !t.is_empty());
            let caption = edit.caption.as_deref().is_some_and(|c| !c.is_empty());
            if !text && !caption && edit.inline_keyboard.is_none() {
                issues.push(at, ConfigProblem::EmptyField("edit"));
            }
            if text && caption {
                issues.push(
                    at,
                    ConfigProblem::Invalid {
                        field: "edit",
                        reason: "both text and caption are set".into(),
                    },
                );
            }
        }
        Reply::Delete => {}
        Reply::Image(file) | Reply::Document(file) => {
            issues.require(at, "file name", &file.name);
            issues.require(at, "file key", &file.key);
        }
        Reply::Invoice(invoice) => {
            issues.require(at, "invoice title", &invoice.title);
            issues.require(at, "invoice description", &invoice.description);
            issues.require(at, "invoice payload", &invoice.payload);
            issues.require(at, "invoice currency", &invoice.currency);
            if invoice.prices.is_empty() {
                issues.push(at, ConfigProblem::EmptyField("invoice prices"));
            }
            for price in &invoice.prices {
                issues.require(at, "price label", &price.label);
                if price.amount <= 0 {
                    issues.push(
                        at,
                        ConfigProblem::Invalid {
                            field: "price amount",
                            reason: price.amount.to_string(),
                        },
                    );
                }
            }
        }
        Reply::PreCheckout(_) => {}
    }
}

fn validate_message(at: &str, message: &MessageReply, issues: &mut Issues) {
    issues.require(at, "message text", &message.text);
    if let Some(markup) = &message.markup {
        if markup.keyboard.is_empty() && markup.inline_keyboard.is_empty() {
            issues.push(at, ConfigProblem::EmptyField("reply markup"));
        }
        if markup.keyboard.iter().any(Vec::is_empty)
            || markup.inline_keyboard.iter().any(Vec::is_empty)
        {
            issues.push(at, ConfigProblem::EmptyField("keyboard row"));
        }
        for button in markup.inline_keyboard.iter().flatten() {
            issues.require(at, "button text", &button.text);
            if button.url.is_none() && button.callback.is_none() {
                issues.push(at, ConfigProblem::EmptyField("button action"));
            }
        }
    }
}

fn validate_context(at: &str, context: &ContextDef, issues: &mut Issues) {
    let set = context.set.as_deref().is_some_and(|s| !s.is_empty());
    if !set && context.delete.is_none() {
        issues.push(at, ConfigProblem::EmptyField("context"));
    }
}

fn validate_action(at: &str, action: &ApiAction, issues: &mut Issues) {
    if action.send_message.is_none() && action.state.is_none() && action.context.is_none() {
        issues.push(at, ConfigProblem::NoEffects);
    }
    if let Some(message) = &action.send_message {
        validate_message(&format!("{at}.send-message"), message, issues);
    }
    if let Some(context) = &action.context {
        validate_context(&format!("{at}.context"), context, issues);
    }
}

fn validate_url(at: &str, url: &str, issues: &mut Issues) {
    if let Err(e) = reqwest::Url::parse(url) {
        issues.push(
            at,
            ConfigProblem::Invalid {
                field: "url",
                reason: e.to_string(),
            },
        );
    }
}

fn validate_method(at: &str, method: &str, issues: &mut Issues) {
    if reqwest::Method::from_bytes(method.to_uppercase().as_bytes()).is_err() {
        issues.push(
            at,
            ConfigProblem::Invalid {
                field: "method",
                reason: method.to_string(),
            },
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn problems(yaml: &str) -> Vec<ConfigProblem> {
        match BotDefinition::from_yaml(yaml) {
            Err(ConfigurationError::Invalid(issues)) => {
                issues.into_iter().map(|i| i.problem).collect()
            }
            other => panic!("expected validation failure, got {other:?}"),
        }
    }

    #[test]
    fn test_full_definition() {
        let definition = BotDefinition::from_yaml(
            r#"
state:
  greeting: hi
persistence:
  type: database
  path: /tmp/bot.db
handlers:
  - on: /start
    reply:
      - message: "Hello ${user.first_name}"
    state:
      set: { started: "1" }
      ops:
        - { kind: add, key: visits, value: "1" }
    context:
      set: menu
  - on:
      callback: buy
      context: menu
    reply:
      - callback: { text: Bought, alert: true }
    webhook:
      url: https://example.com/hook
      method: post
      body: { item: "${callback.data}" }
  - on: "*"
    reply:
      - message: Sorry?
api:
  handlers:
    - id: notify
      actions:
        - send-message: "Ping ${data.text}"
          chat-id: 42
"#,
        )
        .unwrap();

        assert_eq!(definition.state["greeting"], "hi");
        assert_eq!(
            definition.persistence,
            Persistence::Database {
                path: "/tmp/bot.db".into()
            }
        );
        assert_eq!(definition.handlers.len(), 3);
        assert!(definition.handlers[2].trigger.fallback);
        let ops = definition.handlers[0].state.as_ref().unwrap().to_ops();
        assert_eq!(ops.len(), 2);
        assert_eq!(ops[0].key(), "started");
        let api = definition.api.unwrap();
        assert_eq!(api.handlers[0].actions[0].chat_ids, vec![42]);
    }

    #[test]
    fn test_fallback_combined_with_message() {
        let found = problems(
            r"
handlers:
  - on: { message: hi, fallback: true }
    reply: [ { message: x } ]
",
        );
        assert_eq!(found, vec![ConfigProblem::FallbackCombined]);
    }

    #[test]
    fn test_message_and_callback_conflict() {
        let found = problems(
            r"
handlers:
  - on: { message: hi, callback: go }
    reply: [ { message: x } ]
",
        );
        assert!(matches!(found[0], ConfigProblem::ConflictingTriggers(_)));
    }

    #[test]
    fn test_multiple_fallbacks() {
        let found = problems(
            r"
handlers:
  - on: '*'
    reply: [ { message: a } ]
  - on: { fallback: true }
    reply: [ { message: b } ]
",
        );
        assert_eq!(found, vec![ConfigProblem::MultipleFallbacks]);
    }

    #[test]
    fn test_empty_trigger_and_state_condition() {
        let found = problems(
            r"
handlers:
  - on: {}
    reply: [ { message: a } ]
  - on:
      state: [ { key: x } ]
    reply: [ { message: b } ]
",
        );
        assert_eq!(
            found,
            vec![
                ConfigProblem::EmptyTrigger,
                ConfigProblem::EmptyStateCondition("x".into())
            ]
        );
    }

    #[test]
    fn test_issues_are_aggregated_with_locations() {
        let err = BotDefinition::from_yaml(
            r"
handlers:
  - on: hi
  - on: bye
    webhook: { url: not a url }
",
        )
        .unwrap_err();
        let ConfigurationError::Invalid(issues) = err else {
            panic!("expected validation failure");
        };
        assert_eq!(issues.len(), 2);
        assert_eq!(issues[0].location, "handlers[0]");
        assert_eq!(issues[1].location, "handlers[1].webhook");
    }

    #[test]
    fn test_no_handlers() {
        assert_eq!(problems("state: {}"), vec![ConfigProblem::NoHandlers]);
    }

    #[test]
    fn test_unknown_check_is_a_parse_error() {
        let err = BotDefinition::from_yaml(
            r"
handlers:
  - on: hi
    validate: { checks: [is_prime] }
",
        )
        .unwrap_err();
        assert!(matches!(err, ConfigurationError::Parse(_)));
    }

    #[test]
    fn test_invoice_provider_must_be_declared() {
        let invoice = r"
    reply:
      - invoice:
          provider: paypal
          title: Coffee
          description: One cup
          payload: order-1
          currency: EUR
          prices: [ { label: Cup, amount: 250 } ]
";
        let yaml = format!(
            "paymentProviders:\n  - {{ name: stripe, token: tok }}\n  - {{ name: stripe, token: tok2 }}\nhandlers:\n  - on: buy{invoice}"
        );
        assert_eq!(
            problems(&yaml),
            vec![
                ConfigProblem::DuplicatePaymentProvider("stripe".into()),
                ConfigProblem::UnknownPaymentProvider("paypal".into()),
            ]
        );

        let yaml = yaml.replace("provider: paypal", "provider: stripe");
        let yaml = yaml.replace("  - { name: stripe, token: tok2 }\n", "");
        let definition = BotDefinition::from_yaml(&yaml).unwrap();
        assert_eq!(definition.payment_tokens()["stripe"].expose(), "tok");
    }

    #[test]
    fn test_message_text_and_command_are_exclusive() {
        let problems = problems(
            r"
handlers:
  - on:
      message: { text: hi, command: start }
    reply: [ { message: hello } ]
",
        );
        assert_eq!(
            problems,
            vec![ConfigProblem::ConflictingTriggers("text, command".into())]
        );
    }
}
