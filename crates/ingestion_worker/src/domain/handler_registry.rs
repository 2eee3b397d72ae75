use crate::domain::{
    HandleOutcome, HandlerError, MessageHandler, MessageTypeKey, TopicError, TopicParser,
};
use common::domain::{DomainError, PersistenceGateway};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::{debug, error, info, warn, Span};

/// What happened to one inbound message
#[derive(Debug)]
pub enum DispatchOutcome {
    Handled(HandleOutcome),
    /// The topic did not parse; no handler ran and no session was opened
    MalformedTopic(TopicError),
    /// No handler is registered for the message type
    Unhandled(MessageTypeKey),
    /// A session could not be acquired for a registered handler
    SessionUnavailable(DomainError),
    Failed(HandlerError),
}

/// Running totals of dispatch outcomes
#[derive(Debug, Default)]
pub struct DispatchStats {
    handled: AtomicU64,
    malformed: AtomicU64,
    unhandled: AtomicU64,
    failed: AtomicU64,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DispatchCounts {
    pub handled: u64,
    pub malformed: u64,
    pub unhandled: u64,
    pub failed: u64,
}

impl DispatchStats {
    fn record(&self, outcome: &DispatchOutcome) {
        let counter = match outcome {
            DispatchOutcome::Handled(_) => &self.handled,
            DispatchOutcome::MalformedTopic(_) => &self.malformed,
            DispatchOutcome::Unhandled(_) => &self.unhandled,
            DispatchOutcome::SessionUnavailable(_) | DispatchOutcome::Failed(_) => &self.failed,
        };
        counter.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> DispatchCounts {
        DispatchCounts {
            handled: self.handled.load(Ordering::Relaxed),
            malformed: self.malformed.load(Ordering::Relaxed),
            unhandled: self.unhandled.load(Ordering::Relaxed),
            failed: self.failed.load(Ordering::Relaxed),
        }
    }
}

/// Collects handler registrations before the registry is frozen
pub struct HandlerRegistryBuilder {
    parser: TopicParser,
    gateway: Arc<dyn PersistenceGateway>,
    handlers: HashMap<MessageTypeKey, Arc<dyn MessageHandler>>,
}

impl HandlerRegistryBuilder {
    pub fn new(parser: TopicParser, gateway: Arc<dyn PersistenceGateway>) -> Self {
        Self {
            parser,
            gateway,
            handlers: HashMap::new(),
        }
    }

    /// Register a handler for a message type.
    ///
    /// Registering the same key twice replaces the earlier handler and logs a warning.
    pub fn register(
        mut self,
        message_type: impl Into<MessageTypeKey>,
        handler: Arc<dyn MessageHandler>,
    ) -> Self {
        let message_type = message_type.into();
        if self.handlers.contains_key(&message_type) {
            warn!(
                message_type = %message_type,
                "handler already registered for message type, replacing it"
            );
        }
        self.handlers.insert(message_type, handler);
        self
    }

    pub fn build(self) -> HandlerRegistry {
        let mut message_types: Vec<&str> = self.handlers.keys().map(|k| k.as_str()).collect();
        message_types.sort_unstable();
        info!(message_types = ?message_types, "handler registry built");

        HandlerRegistry {
            parser: self.parser,
            gateway: self.gateway,
            handlers: self.handlers,
            stats: DispatchStats::default(),
        }
    }
}

/// Immutable routing table from message type to handler.
///
/// Shared by every concurrent dispatch; registrations cannot change once built.
pub struct HandlerRegistry {
    parser: TopicParser,
    gateway: Arc<dyn PersistenceGateway>,
    handlers: HashMap<MessageTypeKey, Arc<dyn MessageHandler>>,
    stats: DispatchStats,
}

impl HandlerRegistry {
    pub fn builder(
        parser: TopicParser,
        gateway: Arc<dyn PersistenceGateway>,
    ) -> HandlerRegistryBuilder {
        HandlerRegistryBuilder::new(parser, gateway)
    }

    pub fn handles(&self, message_type: &MessageTypeKey) -> bool {
        self.handlers.contains_key(message_type)
    }

    pub fn stats(&self) -> &DispatchStats {
        &self.stats
    }

    /// Route one message to the handler registered for its message type.
    ///
    /// A persistence session is opened only once a handler has been found and
    /// is dropped when the handler returns.
    pub async fn dispatch(&self, topic: &str, payload: &[u8]) -> DispatchOutcome {
        let outcome = self.route(topic, payload).await;
        self.stats.record(&outcome);
        outcome
    }

    async fn route(&self, topic: &str, payload: &[u8]) -> DispatchOutcome {
        let parsed = match self.parser.parse(topic) {
            Ok(parsed) => parsed,
            Err(e) => {
                warn!(error = %e, "failed to parse topic, skipping message");
                return DispatchOutcome::MalformedTopic(e);
            }
        };

        Span::current().record("device_id", parsed.device_id.as_str());

        let Some(handler) = self.handlers.get(&parsed.message_type) else {
            debug!(message_type = %parsed.message_type, "no handler registered, skipping message");
            return DispatchOutcome::Unhandled(parsed.message_type);
        };

        let mut session = match self.gateway.session().await {
            Ok(session) => session,
            Err(e) => {
                error!(error = %e, "failed to acquire persistence session");
                return DispatchOutcome::SessionUnavailable(e);
            }
        };

        match handler.handle(session.as_mut(), &parsed, payload).await {
            Ok(outcome) => {
                debug!(
                    message_type = %parsed.message_type,
                    persisted = outcome.persisted,
                    rejected = outcome.rejected,
                    "message handled"
                );
                DispatchOutcome::Handled(outcome)
            }
            Err(e @ HandlerError::Decode(_)) => {
                warn!(message_type = %parsed.message_type, error = %e, "failed to decode message");
                DispatchOutcome::Failed(e)
            }
            Err(e @ HandlerError::Persistence { .. }) => {
                error!(message_type = %parsed.message_type, error = %e, "failed to persist message");
                DispatchOutcome::Failed(e)
            }
        }
    }
}
