//! Outbound HTTP notifications
//!
//! The body is a JSON document with the interpolated `body` entries under
//! `data` and the chat id plus a UTC timestamp under `meta`.

use super::templates::{Interpolated, Template, TemplateContext};
use super::{Handler, HandlerError};
use crate::definition::WebhookDef;
use crate::dispatcher::EventScope;
use crate::event::Event;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::{Client, Method};
use serde::Serialize;
use std::collections::BTreeMap;

#[derive(Debug, Serialize)]
struct WebhookPayload {
    data: BTreeMap<String, String>,
    meta: WebhookMeta,
}

#[derive(Debug, Serialize)]
struct WebhookMeta {
    chat_id: i64,
    timestamp: DateTime<Utc>,
}

pub struct WebhookHandler {
    client: Client,
    method: Method,
    url: Interpolated,
    headers: Vec<(String, Interpolated)>,
    body: Vec<(String, Interpolated)>,
}

pub(super) fn parse_method(method: &str) -> Result<Method, HandlerError> {
    Method::from_bytes(method.to_uppercase().as_bytes())
        .map_err(|e| HandlerError::Http(format!("invalid method {method:?}: {e}")))
}

pub(super) fn parse_pairs(
    pairs: &BTreeMap<String, String>,
) -> Result<Vec<(String, Interpolated)>, HandlerError> {
    pairs
        .iter()
        .map(|(k, v)| Ok((k.clone(), Interpolated::parse(v)?)))
        .collect()
}

pub(super) fn render_pairs(
    pairs: &[(String, Interpolated)],
    ctx: &TemplateContext<'_>,
) -> Result<Vec<(String, String)>, HandlerError> {
    pairs
        .iter()
        .map(|(k, v)| Ok((k.clone(), v.format(ctx)?)))
        .collect()
}

impl WebhookHandler {
    pub fn new(client: Client, def: &WebhookDef) -> Result<Self, HandlerError> {
        Ok(Self {
            client,
            method: parse_method(&def.method)?,
            url: Interpolated::parse(&def.url)?,
            headers: parse_pairs(&def.headers)?,
            body: parse_pairs(&def.body)?,
        })
    }
}

#[async_trait]
impl Handler for WebhookHandler {
    async fn handle(&self, event: &Event, scope: &mut EventScope) -> Result<(), HandlerError> {
        let (url, headers, data) = {
            let ctx = TemplateContext::new(event, scope);
            (
                self.url.format(&ctx)?,
                render_pairs(&self.headers, &ctx)?,
                render_pairs(&self.body, &ctx)?,
            )
        };
        let payload = WebhookPayload {
            data: data.into_iter().collect(),
            meta: WebhookMeta {
                chat_id: event.chat_id.as_i64(),
                timestamp: Utc::now(),
            },
        };

        let mut request = self.client.request(self.method.clone(), &url).json(&payload);
        for (name, value) in headers {
            request = request.header(name, value);
        }
        let response = request.send().await?;
        let status = response.status();
        tracing::info!(method = %self.method, url = %url, status = status.as_u16(), "Webhook called");
        if !status.is_success() {
            return Err(HandlerError::Http(format!("{} {url}: {status}", self.method)));
        }
        Ok(())
    }
}
