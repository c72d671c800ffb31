//! Per-registration data loading

use super::templates::{Interpolated, Template, TemplateContext};
use super::webhook::{parse_method, parse_pairs, render_pairs};
use super::HandlerError;
use crate::definition::FetchDef;
use crate::dispatcher::EventScope;
use crate::event::Event;
use async_trait::async_trait;
use reqwest::{header, Client, Method};
use serde_json::Value;

/// Fetches auxiliary data before a handler runs
///
/// The result is visible to that handler's templates as `data.<key>` and is
/// dropped once the handler finishes.
#[async_trait]
pub trait DataLoader: Send + Sync {
    async fn load(&self, event: &Event, scope: &EventScope) -> Result<Value, HandlerError>;
}

/// JSON document fetched over HTTP
pub struct HttpDataLoader {
    client: Client,
    method: Method,
    url: Interpolated,
    headers: Vec<(String, Interpolated)>,
}

impl HttpDataLoader {
    pub fn new(client: Client, def: &FetchDef) -> Result<Self, HandlerError> {
        Ok(Self {
            client,
            method: parse_method(&def.method)?,
            url: Interpolated::parse(&def.url)?,
            headers: parse_pairs(&def.headers)?,
        })
    }
}

#[async_trait]
impl DataLoader for HttpDataLoader {
    async fn load(&self, event: &Event, scope: &EventScope) -> Result<Value, HandlerError> {
        let (url, headers) = {
            let ctx = TemplateContext::new(event, scope);
            (self.url.format(&ctx)?, render_pairs(&self.headers, &ctx)?)
        };

        let mut request = self
            .client
            .request(self.method.clone(), &url)
            .header(header::ACCEPT, "application/json");
        for (name, value) in headers {
            request = request.header(name, value);
        }
        let response = request.send().await?.error_for_status()?;
        let data = response.json::<Value>().await?;
        tracing::debug!(url = %url, "Loaded handler data");
        Ok(data)
    }
}
