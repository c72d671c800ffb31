//! Reply kinds
//!
//! A reply entry names exactly one kind. The raw YAML mapping is checked for
//! that when parsed, so the rest of the crate only sees the closed [`Reply`]
//! sum type.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(try_from = "RawReply")]
pub enum Reply {
    Message(MessageReply),
    Callback(CallbackReply),
    Edit(EditReply),
    Delete,
    Image(FileReply),
    Document(FileReply),
    Invoice(Invoice),
    PreCheckout(PreCheckoutAnswer),
}

impl Reply {
    pub fn kind(&self) -> &'static str {
        match self {
            Reply::Message(_) => "message",
            Reply::Callback(_) => "callback",
            Reply::Edit(_) => "edit",
            Reply::Delete => "delete",
            Reply::Image(_) => "image",
            Reply::Document(_) => "document",
            Reply::Invoice(_) => "invoice",
            Reply::PreCheckout(_) => "preCheckout",
        }
    }
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
struct RawReply {
    message: Option<MessageReply>,
    callback: Option<CallbackReply>,
    edit: Option<EditReply>,
    #[serde(default)]
    delete: bool,
    image: Option<FileReply>,
    document: Option<FileReply>,
    invoice: Option<Invoice>,
    pre_checkout: Option<PreCheckoutAnswer>,
}

impl TryFrom<RawReply> for Reply {
    type Error = String;

    fn try_from(raw: RawReply) -> Result<Self, Self::Error> {
        let mut kinds: Vec<Reply> = Vec::new();
        kinds.extend(raw.message.map(Reply::Message));
        kinds.extend(raw.callback.map(Reply::Callback));
        kinds.extend(raw.edit.map(Reply::Edit));
        if raw.delete {
            kinds.push(Reply::Delete);
        }
        kinds.extend(raw.image.map(Reply::Image));
        kinds.extend(raw.document.map(Reply::Document));
        kinds.extend(raw.invoice.map(Reply::Invoice));
        kinds.extend(raw.pre_checkout.map(Reply::PreCheckout));

        match kinds.len() {
            0 => Err("empty reply".to_string()),
            1 => Ok(kinds.remove(0)),
            _ => Err(format!(
                "reply combines several kinds: {}",
                kinds.iter().map(Reply::kind).collect::<Vec<_>>().join(", ")
            )),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum ParseMode {
    #[default]
    Markdown,
    MarkdownV2,
    #[serde(rename = "HTML")]
    Html,
}

/// Engine used to render a text field
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TemplateStyle {
    /// `$key` / `${key}` interpolation
    #[default]
    Default,
    #[serde(alias = "go")]
    Handlebars,
    #[serde(alias = "no")]
    Plain,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(from = "MessageReplyRepr")]
pub struct MessageReply {
    pub text: String,
    pub parse_mode: Option<ParseMode>,
    pub markup: Option<ReplyMarkup>,
    pub template: TemplateStyle,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum MessageReplyRepr {
    Text(String),
    Full {
        text: String,
        #[serde(default, rename = "parseMode")]
        parse_mode: Option<ParseMode>,
        #[serde(default)]
        markup: Option<ReplyMarkup>,
        #[serde(default)]
        template: TemplateStyle,
    },
}

impl From<MessageReplyRepr> for MessageReply {
    fn from(repr: MessageReplyRepr) -> Self {
        match repr {
            MessageReplyRepr::Text(text) => MessageReply {
                text,
                ..MessageReply::default()
            },
            MessageReplyRepr::Full {
                text,
                parse_mode,
                markup,
                template,
            } => MessageReply {
                text,
                parse_mode,
                markup,
                template,
            },
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReplyMarkup {
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub keyboard: Vec<Vec<String>>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub inline_keyboard: Vec<Vec<InlineButton>>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct InlineButton {
    pub text: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub callback: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct CallbackReply {
    pub text: String,
    #[serde(default)]
    pub alert: bool,
}

/// Edit of the message the event refers to
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EditReply {
    #[serde(default)]
    pub text: Option<String>,
    #[serde(default)]
    pub caption: Option<String>,
    #[serde(default)]
    pub inline_keyboard: Option<Vec<Vec<InlineButton>>>,
    #[serde(default)]
    pub template: TemplateStyle,
}

/// File taken from the asset store
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct FileReply {
    /// File name shown to the user
    pub name: String,
    /// Asset key
    pub key: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Invoice {
    #[serde(default)]
    pub provider: String,
    pub title: String,
    pub description: String,
    pub payload: String,
    pub currency: String,
    pub prices: Vec<Price>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Price {
    pub label: String,
    /// Smallest currency unit
    pub amount: i64,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PreCheckoutAnswer {
    pub ok: bool,
    #[serde(default)]
    pub error_message: Option<String>,
}
