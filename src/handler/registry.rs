//! Handler registry for dispatching requests by message kind.

use std::collections::HashMap;
use std::sync::Arc;

use super::{GetHandler, Handler, PutOrUpdateHandler};
use crate::error::{KvError, Result};
use crate::protocol::{Message, MessageKind};
use crate::store::InMemoryStore;

/// Immutable mapping from message kind to handler
#[derive(Default)]
pub struct HandlerRegistry {
    handlers: HashMap<MessageKind, Box<dyn Handler>>,
}

impl HandlerRegistry {
    /// Create a new empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry serving `Get` and `PutOrUpdate` from `store`.
    pub fn for_store(store: Arc<InMemoryStore>) -> Self {
        Self::new()
            .with_handler(
                MessageKind::PutOrUpdate,
                PutOrUpdateHandler::new(Arc::clone(&store)),
            )
            .with_handler(MessageKind::Get, GetHandler::new(store))
    }

    /// Register `handler` for `kind`, replacing any earlier one.
    pub fn with_handler(mut self, kind: MessageKind, handler: impl Handler) -> Self {
        self.handlers.insert(kind, Box::new(handler));
        self
    }

    /// Route `message` to the handler for its kind.
    pub fn dispatch(&self, message: Message) -> Result<Vec<u8>> {
        let kind = message.kind();
        match self.handlers.get(&kind) {
            Some(handler) => handler.handle(message),
            None => Err(KvError::UnknownKind(kind.into())),
        }
    }

    pub fn contains(&self, kind: MessageKind) -> bool {
        self.handlers.contains_key(&kind)
    }
}
