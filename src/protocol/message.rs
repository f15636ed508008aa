//! Message definitions
//!
//! The single logical unit carried by one frame, for requests and responses alike.

use serde::{Deserialize, Serialize};

use crate::error::KvError;

/// Message kinds, with their wire codes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(into = "u32", try_from = "u32")]
#[repr(u32)]
pub enum MessageKind {
    Get = 1,
    GetResponse = 2,
    PutOrUpdate = 3,
}

impl From<MessageKind> for u32 {
    fn from(kind: MessageKind) -> Self {
        kind as u32
    }
}

impl TryFrom<u32> for MessageKind {
    type Error = KvError;

    fn try_from(code: u32) -> Result<Self, Self::Error> {
        match code {
            1 => Ok(MessageKind::Get),
            2 => Ok(MessageKind::GetResponse),
            3 => Ok(MessageKind::PutOrUpdate),
            _ => Err(KvError::Decode(format!("unknown message kind: {}", code))),
        }
    }
}

/// Response status codes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(into = "u32", try_from = "u32")]
#[repr(u32)]
pub enum Status {
    /// Requests carry no status
    #[default]
    Unset = 0,
    Ok = 1,
    NotOk = 2,
}

impl From<Status> for u32 {
    fn from(status: Status) -> Self {
        status as u32
    }
}

impl TryFrom<u32> for Status {
    type Error = KvError;

    fn try_from(code: u32) -> Result<Self, Self::Error> {
        match code {
            0 => Ok(Status::Unset),
            1 => Ok(Status::Ok),
            2 => Ok(Status::NotOk),
            _ => Err(KvError::Decode(format!("unknown status: {}", code))),
        }
    }
}

/// A decoded protocol message
///
/// Immutable once built; ownership moves from the codec to the connection
/// to the handler and back, it is never shared.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    kind: MessageKind,
    key: String,
    value: String,
    status: Status,
}

impl Message {
    pub fn new(
        kind: MessageKind,
        key: impl Into<String>,
        value: impl Into<String>,
        status: Status,
    ) -> Self {
        Self {
            kind,
            key: key.into(),
            value: value.into(),
            status,
        }
    }

    /// A request to store `value` under `key`
    pub fn put_or_update(key: impl Into<String>, value: impl Into<String>) -> Self {
        Self::new(MessageKind::PutOrUpdate, key, value, Status::Unset)
    }

    /// A request for the value stored under `key`
    pub fn get(key: impl Into<String>) -> Self {
        Self::new(MessageKind::Get, key, "", Status::Unset)
    }

    /// Acknowledgement of a stored key
    pub fn put_or_update_ok() -> Self {
        Self::new(MessageKind::PutOrUpdate, "", "", Status::Ok)
    }

    /// Response carrying a found value
    pub fn get_found(key: impl Into<String>, value: impl Into<String>) -> Self {
        Self::new(MessageKind::GetResponse, key, value, Status::Ok)
    }

    /// Response for a key with no value
    pub fn get_not_found(key: impl Into<String>) -> Self {
        Self::new(MessageKind::GetResponse, key, "", Status::NotOk)
    }

    pub fn kind(&self) -> MessageKind {
        self.kind
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    pub fn value(&self) -> &str {
        &self.value
    }

    pub fn status(&self) -> Status {
        self.status
    }

    /// Split into owned key and value
    pub fn into_key_value(self) -> (String, String) {
        (self.key, self.value)
    }
}
