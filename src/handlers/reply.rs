//! Replies to the conversation
//!
//! One [`ReplyHandler`] per configured reply entry. The reply kind is fixed
//! at build time; templates are compiled then as well.

use super::templates::{compile, Template, TemplateContext, TemplateError};
use super::{Handler, HandlerError};
use crate::definition::{
    InlineButton, Invoice, MessageReply, ParseMode, PaymentProviders, Reply, ReplyMarkup,
    TemplateStyle,
};
use crate::dispatcher::EventScope;
use crate::event::{ChatId, Event, EventKind};
use crate::platform::{Assets, ChatApi, ChatRequest, FileKind};
use crate::secrets::Secret;
use async_trait::async_trait;
use std::sync::Arc;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ReplyBuildError {
    #[error(transparent)]
    Template(#[from] TemplateError),
    #[error("unknown payment provider {0:?}")]
    UnknownProvider(String),
}

enum Action {
    Message {
        text: Arc<dyn Template>,
        parse_mode: Option<ParseMode>,
        markup: Option<ReplyMarkup>,
    },
    Callback {
        text: Arc<dyn Template>,
        alert: bool,
    },
    Edit {
        text: Option<Arc<dyn Template>>,
        caption: Option<Arc<dyn Template>>,
        inline_keyboard: Option<Vec<Vec<InlineButton>>>,
    },
    Delete,
    File {
        kind: FileKind,
        name: String,
        key: String,
        assets: Arc<dyn Assets>,
    },
    Invoice {
        invoice: Invoice,
        token: Secret,
    },
    PreCheckout {
        ok: bool,
        error_message: Option<String>,
    },
}

pub struct ReplyHandler {
    action: Action,
    api: Arc<dyn ChatApi>,
    /// Explicit recipients of a message; the event's chat when empty
    recipients: Vec<ChatId>,
}

impl ReplyHandler {
    pub fn new(
        reply: &Reply,
        api: Arc<dyn ChatApi>,
        assets: Arc<dyn Assets>,
        payments: &PaymentProviders,
    ) -> Result<Self, ReplyBuildError> {
        let action = match reply {
            Reply::Message(message) => message_action(message)?,
            Reply::Callback(callback) => Action::Callback {
                text: compile(TemplateStyle::Default, &callback.text)?,
                alert: callback.alert,
            },
            Reply::Edit(edit) => Action::Edit {
                text: edit
                    .text
                    .as_deref()
                    .map(|t| compile(edit.template, t))
                    .transpose()?,
                caption: edit
                    .caption
                    .as_deref()
                    .map(|c| compile(edit.template, c))
                    .transpose()?,
                inline_keyboard: edit.inline_keyboard.clone(),
            },
            Reply::Delete => Action::Delete,
            Reply::Image(file) | Reply::Document(file) => Action::File {
                kind: if matches!(reply, Reply::Image(_)) {
                    FileKind::Image
                } else {
                    FileKind::Document
                },
                name: file.name.clone(),
                key: file.key.clone(),
                assets,
            },
            Reply::Invoice(invoice) => Action::Invoice {
                token: payments
                    .get(&invoice.provider)
                    .cloned()
                    .ok_or_else(|| ReplyBuildError::UnknownProvider(invoice.provider.clone()))?,
                invoice: invoice.clone(),
            },
            Reply::PreCheckout(answer) => Action::PreCheckout {
                ok: answer.ok,
                error_message: answer.error_message.clone(),
            },
        };
        Ok(Self {
            action,
            api,
            recipients: Vec::new(),
        })
    }

    /// Message sent to fixed chats, or to the requesting chat when `recipients` is empty
    pub fn send_message(
        message: &MessageReply,
        api: Arc<dyn ChatApi>,
        recipients: Vec<ChatId>,
    ) -> Result<Self, TemplateError> {
        Ok(Self {
            action: message_action(message)?,
            api,
            recipients,
        })
    }

    fn recipients(&self, event: &Event) -> Vec<ChatId> {
        if self.recipients.is_empty() {
            vec![event.chat_id]
        } else {
            self.recipients.clone()
        }
    }

    fn kind(&self) -> &'static str {
        match &self.action {
            Action::Message { .. } => "message",
            Action::Callback { .. } => "callback",
            Action::Edit { .. } => "edit",
            Action::Delete => "delete",
            Action::File { .. } => "file",
            Action::Invoice { .. } => "invoice",
            Action::PreCheckout { .. } => "pre-checkout",
        }
    }

    fn unsupported(&self, needs: &'static str) -> HandlerError {
        HandlerError::UnsupportedEvent {
            kind: self.kind(),
            needs,
        }
    }

    fn render(
        template: Option<&Arc<dyn Template>>,
        ctx: &TemplateContext<'_>,
    ) -> Result<Option<String>, TemplateError> {
        template.map(|t| t.format(ctx)).transpose()
    }
}

fn message_action(message: &MessageReply) -> Result<Action, TemplateError> {
    Ok(Action::Message {
        text: compile(message.template, &message.text)?,
        parse_mode: message.parse_mode,
        markup: message.markup.clone(),
    })
}

#[async_trait]
impl Handler for ReplyHandler {
    async fn handle(&self, event: &Event, scope: &mut EventScope) -> Result<(), HandlerError> {
        let requests = {
            let ctx = TemplateContext::new(event, scope);
            match &self.action {
                Action::Message {
                    text,
                    parse_mode,
                    markup,
                } => {
                    let text = text.format(&ctx)?;
                    self.recipients(event)
                        .into_iter()
                        .map(|chat_id| ChatRequest::SendMessage {
                            chat_id,
                            text: text.clone(),
                            parse_mode: *parse_mode,
                            markup: markup.clone(),
                        })
                        .collect()
                }
                Action::Callback { text, alert } => {
                    let EventKind::Callback { callback_id, .. } = &event.kind else {
                        return Err(self.unsupported("a callback event"));
                    };
                    vec![ChatRequest::AnswerCallback {
                        callback_id: callback_id.clone(),
                        text: text.format(&ctx)?,
                        alert: *alert,
                    }]
                }
                Action::Edit {
                    text,
                    caption,
                    inline_keyboard,
                } => {
                    let message_id = event
                        .target_message_id()
                        .ok_or_else(|| self.unsupported("a message to edit"))?;
                    vec![ChatRequest::EditMessage {
                        chat_id: event.chat_id,
                        message_id,
                        text: Self::render(text.as_ref(), &ctx)?,
                        caption: Self::render(caption.as_ref(), &ctx)?,
                        inline_keyboard: inline_keyboard.clone(),
                    }]
                }
                Action::Delete => {
                    let message_id = event
                        .target_message_id()
                        .ok_or_else(|| self.unsupported("a message to delete"))?;
                    vec![ChatRequest::DeleteMessage {
                        chat_id: event.chat_id,
                        message_id,
                    }]
                }
                Action::File { .. } => Vec::new(),
                Action::Invoice { invoice, token } => vec![ChatRequest::SendInvoice {
                    chat_id: event.chat_id,
                    invoice: invoice.clone(),
                    provider_token: token.clone(),
                }],
                Action::PreCheckout { ok, error_message } => {
                    let EventKind::PreCheckout { query_id, .. } = &event.kind else {
                        return Err(self.unsupported("a pre-checkout query"));
                    };
                    vec![ChatRequest::AnswerPreCheckout {
                        query_id: query_id.clone(),
                        ok: *ok,
                        error_message: error_message.clone(),
                    }]
                }
            }
        };

        if let Action::File {
            kind,
            name,
            key,
            assets,
        } = &self.action
        {
            let asset = assets.load(key).await?;
            self.api
                .call(ChatRequest::SendFile {
                    chat_id: event.chat_id,
                    kind: *kind,
                    name: name.clone(),
                    mime: asset.mime,
                    bytes: asset.bytes,
                })
                .await?;
            return Ok(());
        }

        for request in requests {
            self.api.call(request).await?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::definition::{CallbackReply, FileReply, PreCheckoutAnswer, Price};
    use crate::dispatcher::testing::{MemoryAssets, RecordingChatApi};
    use crate::secrets::Secrets;
    use crate::state::State;

    fn scope() -> EventScope {
        let mut state = State::new();
        state.fill([("name", "Ada")]);
        EventScope::new(ChatId(9), Arc::new(Secrets::new())).with_state(state)
    }

    fn handler(reply: &Reply, api: &Arc<RecordingChatApi>) -> ReplyHandler {
        ReplyHandler::new(
            reply,
            api.clone(),
            Arc::new(MemoryAssets::default()),
            &PaymentProviders::new(),
        )
        .unwrap()
    }

    #[tokio::test]
    async fn test_message_reply_is_rendered() {
        let api = Arc::new(RecordingChatApi::new());
        let reply = Reply::Message(MessageReply {
            text: "Hi ${state.name}".into(),
            ..MessageReply::default()
        });
        handler(&reply, &api)
            .handle(&Event::message(9, 1, "hello"), &mut scope())
            .await
            .unwrap();
        assert_eq!(api.texts(), vec!["Hi Ada"]);
    }

    #[tokio::test]
    async fn test_callback_answer_requires_callback_event() {
        let api = Arc::new(RecordingChatApi::new());
        let reply = Reply::Callback(CallbackReply {
            text: "Done".into(),
            alert: true,
        });
        let handler = handler(&reply, &api);

        handler
            .handle(&Event::callback(9, "cb-1", "buy", Some(5)), &mut scope())
            .await
            .unwrap();
        assert_eq!(
            api.requests(),
            vec![ChatRequest::AnswerCallback {
                callback_id: "cb-1".into(),
                text: "Done".into(),
                alert: true,
            }]
        );

        let err = handler
            .handle(&Event::message(9, 1, "x"), &mut scope())
            .await
            .unwrap_err();
        assert!(matches!(err, HandlerError::UnsupportedEvent { kind: "callback", .. }));
    }

    #[tokio::test]
    async fn test_delete_targets_event_message() {
        let api = Arc::new(RecordingChatApi::new());
        handler(&Reply::Delete, &api)
            .handle(&Event::callback(9, "cb", "x", Some(77)), &mut scope())
            .await
            .unwrap();
        assert_eq!(
            api.requests(),
            vec![ChatRequest::DeleteMessage {
                chat_id: ChatId(9),
                message_id: 77,
            }]
        );
    }

    #[tokio::test]
    async fn test_image_reply_loads_asset() {
        let api = Arc::new(RecordingChatApi::new());
        let assets = MemoryAssets::default().with("cat", b"meow", "image/png");
        let reply = Reply::Image(FileReply {
            name: "cat.png".into(),
            key: "cat".into(),
        });
        ReplyHandler::new(&reply, api.clone(), Arc::new(assets), &PaymentProviders::new())
            .unwrap()
            .handle(&Event::message(9, 1, "cat"), &mut scope())
            .await
            .unwrap();
        let requests = api.requests();
        let ChatRequest::SendFile {
            kind, mime, bytes, ..
        } = &requests[0]
        else {
            panic!("expected file request");
        };
        assert_eq!(*kind, FileKind::Image);
        assert_eq!(mime, "image/png");
        assert_eq!(bytes, b"meow");
    }

    #[tokio::test]
    async fn test_pre_checkout_answer() {
        let api = Arc::new(RecordingChatApi::new());
        let reply = Reply::PreCheckout(PreCheckoutAnswer {
            ok: true,
            error_message: None,
        });
        let event = Event {
            chat_id: ChatId(9),
            from: None,
            kind: EventKind::PreCheckout {
                query_id: "pq".into(),
                invoice_payload: "order".into(),
            },
        };
        handler(&reply, &api).handle(&event, &mut scope()).await.unwrap();
        assert_eq!(
            api.requests(),
            vec![ChatRequest::AnswerPreCheckout {
                query_id: "pq".into(),
                ok: true,
                error_message: None,
            }]
        );
    }

    fn invoice(provider: &str) -> Reply {
        Reply::Invoice(Invoice {
            provider: provider.into(),
            title: "Coffee".into(),
            description: "One cup".into(),
            payload: "order-1".into(),
            currency: "EUR".into(),
            prices: vec![Price {
                label: "Cup".into(),
                amount: 250,
            }],
        })
    }

    #[tokio::test]
    async fn test_invoice_carries_provider_token() {
        let api = Arc::new(RecordingChatApi::new());
        let payments = PaymentProviders::from([("stripe".to_string(), Secret::new("tok_1"))]);
        let handler = ReplyHandler::new(
            &invoice("stripe"),
            api.clone(),
            Arc::new(MemoryAssets::default()),
            &payments,
        )
        .unwrap();
        handler
            .handle(&Event::message(9, 1, "buy"), &mut scope())
            .await
            .unwrap();

        let requests = api.requests();
        let [ChatRequest::SendInvoice {
            chat_id,
            provider_token,
            ..
        }] = requests.as_slice()
        else {
            panic!("expected one invoice request");
        };
        assert_eq!(*chat_id, ChatId(9));
        assert_eq!(provider_token.expose(), "tok_1");

        let err = ReplyHandler::new(
            &invoice("paypal"),
            api.clone(),
            Arc::new(MemoryAssets::default()),
            &payments,
        )
        .err()
        .unwrap();
        assert!(matches!(err, ReplyBuildError::UnknownProvider(name) if name == "paypal"));
    }

    #[tokio::test]
    async fn test_send_message_to_fixed_recipients() {
        let api = Arc::new(RecordingChatApi::new());
        let message = MessageReply {
            text: "Ping".into(),
            ..MessageReply::default()
        };
        ReplyHandler::send_message(&message, api.clone(), vec![ChatId(1), ChatId(2)])
            .unwrap()
            .handle(&Event::message(9, 1, "x"), &mut scope())
            .await
            .unwrap();
        let chats: Vec<_> = api
            .requests()
            .into_iter()
            .filter_map(|r| match r {
                ChatRequest::SendMessage { chat_id, .. } => Some(chat_id),
                _ => None,
            })
            .collect();
        assert_eq!(chats, vec![ChatId(1), ChatId(2)]);
    }

    #[tokio::test]
    async fn test_platform_failure_is_reported() {
        let api = Arc::new(RecordingChatApi::failing());
        let reply = Reply::Message(MessageReply {
            text: "x".into(),
            ..MessageReply::default()
        });
        let err = handler(&reply, &api)
            .handle(&Event::message(9, 1, "x"), &mut scope())
            .await
            .unwrap_err();
        assert!(matches!(err, HandlerError::Platform(_)));
    }
}
