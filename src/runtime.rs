//! Update loop
//!
//! Pulls events from an [`EventSource`] and dispatches them one at a time.
//! The HTTP surface runs next to it on its own tasks; both share the
//! dispatcher and its conversation locks.

use crate::dispatcher::Dispatcher;
use crate::event::Event;
use async_trait::async_trait;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

/// Where inbound events come from
#[async_trait]
pub trait EventSource: Send {
    /// Next event, or `None` once the source is exhausted
    async fn next(&mut self) -> Option<Event>;
}

/// Event source fed through an mpsc channel
pub struct ChannelSource {
    rx: mpsc::Receiver<Event>,
}

#[async_trait]
impl EventSource for ChannelSource {
    async fn next(&mut self) -> Option<Event> {
        self.rx.recv().await
    }
}

pub fn channel(capacity: usize) -> (mpsc::Sender<Event>, ChannelSource) {
    let (tx, rx) = mpsc::channel(capacity);
    (tx, ChannelSource { rx })
}

pub struct UpdateLoop<S> {
    dispatcher: Arc<Dispatcher>,
    source: S,
    cancel: CancellationToken,
}

impl<S: EventSource> UpdateLoop<S> {
    pub fn new(dispatcher: Arc<Dispatcher>, source: S, cancel: CancellationToken) -> Self {
        Self {
            dispatcher,
            source,
            cancel,
        }
    }

    /// Run until cancelled or the source is exhausted
    ///
    /// Cancellation is observed between events; an event already being
    /// dispatched runs to completion.
    pub async fn run(mut self) {
        tracing::info!("Update loop started");
        loop {
            let event = tokio::select! {
                biased;
                () = self.cancel.cancelled() => {
                    tracing::info!("Update loop cancelled");
                    break;
                }
                event = self.source.next() => match event {
                    Some(event) => event,
                    None => {
                        tracing::info!("Event source exhausted");
                        break;
                    }
                },
            };

            let chat = event.chat_id;
            if let Err(e) = self.dispatcher.dispatch(&event).await.into_result() {
                tracing::error!(chat_id = %chat, error = %e, "Event handling failed");
            }
        }
        tracing::info!("Update loop stopped");
    }
}
