//! Test doubles for the platform ports and the pipeline
//!
//! These let handler and dispatcher tests run without a chat platform.

use super::EventScope;
use crate::event::Event;
use crate::filters::{EventFilter, FilterError};
use crate::handlers::{DataLoader, Handler, HandlerError};
use crate::platform::{Asset, AssetError, Assets, ChatApi, ChatRequest, PlatformError};
use async_trait::async_trait;
use axum::Router;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

// ============================================================================
// Platform
// ============================================================================

/// Chat API that records every request
#[derive(Default)]
pub struct RecordingChatApi {
    requests: Mutex<Vec<ChatRequest>>,
    fail: bool,
}

impl RecordingChatApi {
    pub fn new() -> Self {
        Self::default()
    }

    /// Records requests, then rejects them
    pub fn failing() -> Self {
        Self {
            requests: Mutex::new(Vec::new()),
            fail: true,
        }
    }

    pub fn requests(&self) -> Vec<ChatRequest> {
        self.requests.lock().unwrap().clone()
    }

    /// Texts of the `SendMessage` requests, in order
    pub fn texts(&self) -> Vec<String> {
        self.requests()
            .into_iter()
            .filter_map(|request| match request {
                ChatRequest::SendMessage { text, .. } => Some(text),
                _ => None,
            })
            .collect()
    }
}

#[async_trait]
impl ChatApi for RecordingChatApi {
    async fn call(&self, request: ChatRequest) -> Result<(), PlatformError> {
        let method = request.method();
        self.requests.lock().unwrap().push(request);
        if self.fail {
            return Err(PlatformError::Rejected {
                method,
                reason: "rejected by test".to_string(),
            });
        }
        Ok(())
    }
}

#[derive(Default)]
pub struct MemoryAssets {
    assets: HashMap<String, Asset>,
}

impl MemoryAssets {
    #[must_use]
    pub fn with(mut self, key: &str, bytes: &[u8], mime: &str) -> Self {
        self.assets.insert(
            key.to_string(),
            Asset {
                bytes: bytes.to_vec(),
                mime: mime.to_string(),
            },
        );
        self
    }
}

#[async_trait]
impl Assets for MemoryAssets {
    async fn load(&self, key: &str) -> Result<Asset, AssetError> {
        self.assets
            .get(key)
            .cloned()
            .ok_or_else(|| AssetError::NotFound(key.to_string()))
    }
}

/// Serve `router` on an ephemeral local port, returning its base URL
pub async fn serve(router: Router) -> String {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, router).await.unwrap();
    });
    format!("http://{addr}")
}

// ============================================================================
// Pipeline
// ============================================================================

/// Shared record of which scripted handlers ran
#[derive(Clone, Default)]
pub struct CallLog(Arc<Mutex<Vec<String>>>);

impl CallLog {
    pub fn push(&self, entry: impl Into<String>) {
        self.0.lock().unwrap().push(entry.into());
    }

    pub fn entries(&self) -> Vec<String> {
        self.0.lock().unwrap().clone()
    }
}

/// What a [`ScriptedHandler`] does when called
#[derive(Clone)]
pub enum Script {
    Succeed,
    Fail,
    RejectInput,
    SetState(&'static str, &'static str),
    SetContext(&'static str),
    Sleep(Duration),
    /// Record `data.<key>` from the scope
    ReadData(&'static str),
}

pub struct ScriptedHandler {
    name: String,
    script: Script,
    log: CallLog,
}

impl ScriptedHandler {
    pub fn new(name: &str, script: Script, log: &CallLog) -> Arc<Self> {
        Arc::new(Self {
            name: name.to_string(),
            script,
            log: log.clone(),
        })
    }
}

#[async_trait]
impl Handler for ScriptedHandler {
    async fn handle(&self, _event: &Event, scope: &mut EventScope) -> Result<(), HandlerError> {
        self.log.push(self.name.as_str());
        match &self.script {
            Script::Succeed => Ok(()),
            Script::Fail => Err(HandlerError::Http("scripted failure".to_string())),
            Script::RejectInput => Err(HandlerError::ValidationFailed),
            Script::SetState(key, value) => {
                let state = scope.state_mut().ok_or(HandlerError::StateUnavailable)?;
                state.set(*key, *value);
                Ok(())
            }
            Script::SetContext(value) => {
                let context = scope.context().ok_or(HandlerError::ContextUnavailable)?;
                context.set(*value);
                Ok(())
            }
            Script::Sleep(duration) => {
                tokio::time::sleep(*duration).await;
                Ok(())
            }
            Script::ReadData(key) => {
                let value = match &scope.data()[*key] {
                    Value::String(s) => s.clone(),
                    other => other.to_string(),
                };
                self.log.push(format!("{}={value}", self.name));
                Ok(())
            }
        }
    }
}

/// Filter with a fixed answer
pub struct FixedFilter(pub Result<bool, FilterError>);

impl FixedFilter {
    pub fn matching() -> Arc<Self> {
        Arc::new(Self(Ok(true)))
    }

    pub fn rejecting() -> Arc<Self> {
        Arc::new(Self(Ok(false)))
    }

    pub fn broken(error: FilterError) -> Arc<Self> {
        Arc::new(Self(Err(error)))
    }
}

impl EventFilter for FixedFilter {
    fn check(&self, _event: &Event, _scope: &EventScope) -> Result<bool, FilterError> {
        self.0
    }
}

/// Loader returning a fixed document, or failing when none is given
pub struct StaticLoader(pub Option<Value>);

#[async_trait]
impl DataLoader for StaticLoader {
    async fn load(&self, _event: &Event, _scope: &EventScope) -> Result<Value, HandlerError> {
        self.0
            .clone()
            .ok_or_else(|| HandlerError::Http("scripted loader failure".to_string()))
    }
}
