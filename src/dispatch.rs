//! Message dispatch.
//!
//! Routing, first match wins:
//! - text: logged, then falls through to the default reply
//! - event `unsubscribe`: no reply
//! - event `subscribe`: greeting
//! - event `CLICK` with the credentials key: worker credentials
//! - anything else: a default phrase

use std::sync::Arc;

use tracing::{debug, info};

use crate::envelope::{Event, InboundEnvelope, Message, OutboundEnvelope};
use crate::error::WorkerError;
use crate::phrases::{DEFAULT_PHRASES, PhrasePicker, RandomPicker};
use crate::workers::WorkerSelector;

/// Result of handling one envelope.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    Reply(OutboundEnvelope),
    /// Handled, but the platform offers no channel back to the user.
    Unsubscribed,
}

impl Outcome {
    pub fn into_reply(self) -> Option<OutboundEnvelope> {
        match self {
            Outcome::Reply(reply) => Some(reply),
            Outcome::Unsubscribed => None,
        }
    }
}

/// Dispatcher settings.
#[derive(Debug, Clone)]
pub struct DispatchConfig {
    pub greeting: String,
    pub credentials_key: String,
}

/// Routes inbound envelopes to replies.
///
/// Holds no per-request state; the worker selector is the only shared
/// collaborator.
pub struct Dispatcher {
    config: DispatchConfig,
    workers: Arc<dyn WorkerSelector>,
    picker: Arc<dyn PhrasePicker>,
}

impl Dispatcher {
    pub fn new(config: DispatchConfig, workers: Arc<dyn WorkerSelector>) -> Self {
        Self {
            config,
            workers,
            picker: Arc::new(RandomPicker),
        }
    }

    /// Replace the default-reply picker.
    pub fn with_picker(mut self, picker: Arc<dyn PhrasePicker>) -> Self {
        self.picker = picker;
        self
    }

    pub async fn handle(&self, envelope: &InboundEnvelope) -> Result<Outcome, WorkerError> {
        match &envelope.message {
            Message::Text { content } => {
                debug!(from = %envelope.from_user, content = %content, "Received text message");
            }
            Message::Event(Event::Unsubscribe) => {
                info!(from = %envelope.from_user, "User unsubscribed");
                return Ok(Outcome::Unsubscribed);
            }
            Message::Event(Event::Subscribe) => {
                info!(from = %envelope.from_user, "User subscribed");
                return Ok(self.reply(envelope, self.config.greeting.clone()));
            }
            Message::Event(Event::Click { key }) if *key == self.config.credentials_key => {
                let credentials = self.acquire_credentials().await?;
                info!(from = %envelope.from_user, "Issued worker credentials");
                return Ok(self.reply(envelope, credentials));
            }
            Message::Event(Event::Click { key }) => {
                debug!(key = %key, "Unhandled click event");
            }
            Message::Event(Event::Other { kind }) => {
                debug!(event = %kind, "Unhandled event");
            }
            Message::Other { kind } => {
                debug!(msg_type = %kind, "Received unknown message");
            }
        }

        let phrase = self.picker.pick(DEFAULT_PHRASES);
        Ok(self.reply(envelope, phrase))
    }

    /// Pick a worker, start it if needed, and format its connection details.
    async fn acquire_credentials(&self) -> Result<String, WorkerError> {
        let worker = self.workers.find_latest().await?;
        if !worker.running {
            self.workers.ensure_running(&worker).await?;
        }
        Ok(worker.credentials())
    }

    fn reply(&self, envelope: &InboundEnvelope, content: impl Into<String>) -> Outcome {
        Outcome::Reply(OutboundEnvelope::reply_to(envelope, content))
    }
}
