//! Key/value request handlers

use std::sync::Arc;

use super::Handler;
use crate::error::Result;
use crate::protocol::{encode, Message};
use crate::store::InMemoryStore;

/// Stores the request's key/value pair and acknowledges with `Ok`
pub struct PutOrUpdateHandler {
    store: Arc<InMemoryStore>,
}

impl PutOrUpdateHandler {
    pub fn new(store: Arc<InMemoryStore>) -> Self {
        Self { store }
    }
}

impl Handler for PutOrUpdateHandler {
    fn handle(&self, message: Message) -> Result<Vec<u8>> {
        let (key, value) = message.into_key_value();
        tracing::debug!(key = %key, "put_or_update");
        self.store.put_or_update(key, value);
        encode(&Message::put_or_update_ok())
    }
}

/// Looks up the request's key
///
/// A missing key is a `NotOk` response, never an error.
pub struct GetHandler {
    store: Arc<InMemoryStore>,
}

impl GetHandler {
    pub fn new(store: Arc<InMemoryStore>) -> Self {
        Self { store }
    }
}

impl Handler for GetHandler {
    fn handle(&self, message: Message) -> Result<Vec<u8>> {
        let response = match self.store.get(message.key()) {
            Some(value) => Message::get_found(message.key(), value),
            None => Message::get_not_found(message.key()),
        };
        tracing::debug!(key = %message.key(), status = ?response.status(), "get");
        encode(&response)
    }
}
