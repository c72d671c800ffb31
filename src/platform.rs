//! Outbound ports to the chat platform and asset storage
//!
//! Every side effect a reply produces is one [`ChatRequest`] handed to a
//! [`ChatApi`]. The shipped implementation only logs the request; a real
//! transport plugs in behind the same trait.

mod assets;

pub use assets::{Asset, AssetError, Assets, FsAssets};

use crate::definition::{InlineButton, Invoice, ParseMode, ReplyMarkup};
use crate::event::ChatId;
use crate::secrets::Secret;
use async_trait::async_trait;
use serde::Serialize;
use std::sync::Arc;
use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum FileKind {
    Image,
    Document,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "method", rename_all = "snake_case")]
pub enum ChatRequest {
    SendMessage {
        chat_id: ChatId,
        text: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        parse_mode: Option<ParseMode>,
        #[serde(skip_serializing_if = "Option::is_none")]
        markup: Option<ReplyMarkup>,
    },
    AnswerCallback {
        callback_id: String,
        text: String,
        alert: bool,
    },
    EditMessage {
        chat_id: ChatId,
        message_id: i64,
        #[serde(skip_serializing_if = "Option::is_none")]
        text: Option<String>,
        #[serde(skip_serializing_if = "Option::is_none")]
        caption: Option<String>,
        #[serde(skip_serializing_if = "Option::is_none")]
        inline_keyboard: Option<Vec<Vec<InlineButton>>>,
    },
    DeleteMessage {
        chat_id: ChatId,
        message_id: i64,
    },
    SendFile {
        chat_id: ChatId,
        kind: FileKind,
        name: String,
        mime: String,
        #[serde(skip)]
        bytes: Vec<u8>,
    },
    SendInvoice {
        chat_id: ChatId,
        invoice: Invoice,
        #[serde(skip)]
        provider_token: Secret,
    },
    AnswerPreCheckout {
        query_id: String,
        ok: bool,
        #[serde(skip_serializing_if = "Option::is_none")]
        error_message: Option<String>,
    },
}

impl ChatRequest {
    pub fn method(&self) -> &'static str {
        match self {
            ChatRequest::SendMessage { .. } => "send_message",
            ChatRequest::AnswerCallback { .. } => "answer_callback",
            ChatRequest::EditMessage { .. } => "edit_message",
            ChatRequest::DeleteMessage { .. } => "delete_message",
            ChatRequest::SendFile { .. } => "send_file",
            ChatRequest::SendInvoice { .. } => "send_invoice",
            ChatRequest::AnswerPreCheckout { .. } => "answer_pre_checkout",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PlatformError {
    #[error("platform rejected {method}: {reason}")]
    Rejected { method: &'static str, reason: String },
    #[error("platform unavailable: {0}")]
    Unavailable(String),
}

#[async_trait]
pub trait ChatApi: Send + Sync {
    async fn call(&self, request: ChatRequest) -> Result<(), PlatformError>;
}

#[async_trait]
impl<T: ChatApi + ?Sized> ChatApi for Arc<T> {
    async fn call(&self, request: ChatRequest) -> Result<(), PlatformError> {
        (**self).call(request).await
    }
}

/// Writes every request to the log instead of a platform
#[derive(Debug, Default)]
pub struct LoggingChatApi;

#[async_trait]
impl ChatApi for LoggingChatApi {
    async fn call(&self, request: ChatRequest) -> Result<(), PlatformError> {
        let body = serde_json::to_string(&request).map_err(|e| PlatformError::Rejected {
            method: request.method(),
            reason: e.to_string(),
        })?;
        tracing::info!(method = request.method(), request = %body, "Outbound chat request");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_logging_api_accepts_every_request() {
        let api = LoggingChatApi;
        api.call(ChatRequest::DeleteMessage {
            chat_id: ChatId(1),
            message_id: 2,
        })
        .await
        .unwrap();
    }

    #[test]
    fn test_request_wire_shape() {
        let request = ChatRequest::SendFile {
            chat_id: ChatId(7),
            kind: FileKind::Image,
            name: "cat.png".into(),
            mime: "image/png".into(),
            bytes: vec![1, 2, 3],
        };
        let json = serde_json::to_value(&request).unwrap();
        assert_eq!(json["method"], "send_file");
        assert_eq!(json["chat_id"], 7);
        assert_eq!(json["kind"], "image");
        assert!(json.get("bytes").is_none());
    }
}
