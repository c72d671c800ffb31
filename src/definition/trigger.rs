//! When a handler runs

use super::one_or_many;
use serde::Deserialize;

/// Declarative match rule of one handler
///
/// Accepts three YAML forms: a bare string (message text, `"*"` is the
/// fallback), a list of strings (any of the texts) or a full mapping.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(from = "TriggerRepr")]
pub struct Trigger {
    pub message: Option<MessageTrigger>,
    pub callback: Option<CallbackTrigger>,
    pub context: Option<String>,
    pub pre_checkout: Option<PaymentTrigger>,
    pub post_checkout: Option<PaymentTrigger>,
    pub state: Vec<StateCondition>,
    pub fallback: bool,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum TriggerRepr {
    Text(String),
    Texts(Vec<String>),
    Full(TriggerFields),
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
struct TriggerFields {
    message: Option<MessageTrigger>,
    callback: Option<CallbackTrigger>,
    context: Option<String>,
    pre_checkout: Option<PaymentTrigger>,
    post_checkout: Option<PaymentTrigger>,
    #[serde(default)]
    state: Vec<StateCondition>,
    #[serde(default)]
    fallback: bool,
}

impl From<TriggerRepr> for Trigger {
    fn from(repr: TriggerRepr) -> Self {
        match repr {
            TriggerRepr::Text(text) if text == "*" => Trigger {
                fallback: true,
                ..Trigger::default()
            },
            TriggerRepr::Text(text) => Trigger::text([text]),
            TriggerRepr::Texts(texts) => Trigger::text(texts),
            TriggerRepr::Full(fields) => Trigger {
                message: fields.message,
                callback: fields.callback,
                context: fields.context.filter(|c| !c.is_empty()),
                pre_checkout: fields.pre_checkout,
                post_checkout: fields.post_checkout,
                state: fields.state,
                fallback: fields.fallback,
            },
        }
    }
}

/// Predicate kinds present on a trigger
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TriggerKind {
    Message,
    Callback,
    Context,
    PreCheckout,
    PostCheckout,
    State,
    Fallback,
}

impl TriggerKind {
    /// Kinds that select the event type; at most one per trigger
    pub fn is_base(self) -> bool {
        matches!(
            self,
            TriggerKind::Message
                | TriggerKind::Callback
                | TriggerKind::PreCheckout
                | TriggerKind::PostCheckout
        )
    }
}

impl Trigger {
    pub fn text<I, S>(texts: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Trigger {
            message: Some(MessageTrigger {
                text: texts.into_iter().map(Into::into).collect(),
                command: None,
            }),
            ..Trigger::default()
        }
    }

    pub fn fallback() -> Self {
        Trigger {
            fallback: true,
            ..Trigger::default()
        }
    }

    pub fn kinds(&self) -> Vec<TriggerKind> {
        let mut kinds = Vec::new();
        if self.message.is_some() {
            kinds.push(TriggerKind::Message);
        }
        if self.callback.is_some() {
            kinds.push(TriggerKind::Callback);
        }
        if self.context.is_some() {
            kinds.push(TriggerKind::Context);
        }
        if self.pre_checkout.is_some() {
            kinds.push(TriggerKind::PreCheckout);
        }
        if self.post_checkout.is_some() {
            kinds.push(TriggerKind::PostCheckout);
        }
        if !self.state.is_empty() {
            kinds.push(TriggerKind::State);
        }
        if self.fallback {
            kinds.push(TriggerKind::Fallback);
        }
        kinds
    }
}

/// Message text (any of) or bot command
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(from = "MessageTriggerRepr")]
pub struct MessageTrigger {
    pub text: Vec<String>,
    pub command: Option<String>,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum MessageTriggerRepr {
    Text(String),
    Texts(Vec<String>),
    Full {
        #[serde(default, deserialize_with = "one_or_many")]
        text: Vec<String>,
        command: Option<String>,
    },
}

impl From<MessageTriggerRepr> for MessageTrigger {
    fn from(repr: MessageTriggerRepr) -> Self {
        match repr {
            MessageTriggerRepr::Text(text) => MessageTrigger {
                text: vec![text],
                command: None,
            },
            MessageTriggerRepr::Texts(text) => MessageTrigger {
                text,
                command: None,
            },
            MessageTriggerRepr::Full { text, command } => MessageTrigger {
                text,
                command: command
                    .map(|c| c.trim_start_matches('/').to_string())
                    .filter(|c| !c.is_empty()),
            },
        }
    }
}

/// Inline button payload
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(from = "CallbackTriggerRepr")]
pub struct CallbackTrigger {
    pub data: String,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum CallbackTriggerRepr {
    Data(String),
    Full { data: String },
}

impl From<CallbackTriggerRepr> for CallbackTrigger {
    fn from(repr: CallbackTriggerRepr) -> Self {
        match repr {
            CallbackTriggerRepr::Data(data) | CallbackTriggerRepr::Full { data } => {
                CallbackTrigger { data }
            }
        }
    }
}

/// Invoice payload filter; an absent payload matches every payment
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PaymentTrigger {
    #[serde(default)]
    pub invoice_payload: Option<String>,
}

/// Condition on one state key
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct StateCondition {
    pub key: String,
    #[serde(default)]
    pub present: Option<bool>,
    #[serde(default)]
    pub eq: Option<String>,
    #[serde(default)]
    pub neq: Option<String>,
}

impl StateCondition {
    pub fn is_empty(&self) -> bool {
        self.present.is_none() && self.eq.is_none() && self.neq.is_none()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(yaml: &str) -> Trigger {
        serde_yaml::from_str(yaml).unwrap()
    }

    #[test]
    fn test_string_shorthands() {
        assert_eq!(parse("hello"), Trigger::text(["hello"]));
        assert_eq!(parse("'*'"), Trigger::fallback());
        assert_eq!(parse("[hi, hey]"), Trigger::text(["hi", "hey"]));
    }

    #[test]
    fn test_full_mapping() {
        let trigger = parse(
            r"
message:
  command: /start
context: menu
state:
  - key: x
    present: true
  - key: y
    neq: done
",
        );
        let message = trigger.message.as_ref().unwrap();
        assert_eq!(message.command.as_deref(), Some("start"));
        assert!(message.text.is_empty());
        assert_eq!(trigger.context.as_deref(), Some("menu"));
        assert_eq!(trigger.state.len(), 2);
        assert_eq!(trigger.state[0].present, Some(true));
        assert_eq!(trigger.state[1].neq.as_deref(), Some("done"));
        assert_eq!(
            trigger.kinds(),
            vec![TriggerKind::Message, TriggerKind::Context, TriggerKind::State]
        );
    }

    #[test]
    fn test_callback_and_payment_forms() {
        let trigger = parse("callback: buy");
        assert_eq!(trigger.callback.unwrap().data, "buy");

        let trigger = parse("callback:\n  data: sell");
        assert_eq!(trigger.callback.unwrap().data, "sell");

        let trigger = parse("preCheckout:\n  invoicePayload: order-1");
        assert_eq!(
            trigger.pre_checkout.unwrap().invoice_payload.as_deref(),
            Some("order-1")
        );

        let trigger = parse("postCheckout: {}");
        assert_eq!(trigger.post_checkout.unwrap().invoice_payload, None);
    }

    #[test]
    fn test_message_text_list_in_mapping() {
        let trigger = parse("message:\n  text: [a, b]");
        assert_eq!(trigger.message.unwrap().text, vec!["a", "b"]);
    }

    #[test]
    fn test_state_condition_emptiness() {
        let cond = StateCondition {
            key: "x".into(),
            ..StateCondition::default()
        };
        assert!(cond.is_empty());
        assert!(!StateCondition {
            eq: Some(String::new()),
            ..cond
        }
        .is_empty());
    }
}
