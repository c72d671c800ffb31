//! HTTP surface
//!
//! Invokes API handler groups by id and accepts events from an external
//! transport.

mod handlers;
mod types;

pub use handlers::create_router;
#[allow(unused_imports)] // Public API re-exports
pub use types::*;

use crate::dispatcher::Dispatcher;
use crate::event::Event;
use std::sync::Arc;
use tokio::sync::mpsc;

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    pub dispatcher: Arc<Dispatcher>,
    /// Inbound queue of the update loop
    pub events: mpsc::Sender<Event>,
}

impl AppState {
    pub fn new(dispatcher: Arc<Dispatcher>, events: mpsc::Sender<Event>) -> Self {
        Self { dispatcher, events }
    }
}
