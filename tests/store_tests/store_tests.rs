//! Store and Handler Tests
//!
//! These tests verify:
//! - Basic put/get on the in-memory store
//! - Concurrent readers and writers
//! - Handler responses for found and missing keys
//! - Registry dispatch by message kind

use std::sync::Arc;
use std::thread;

use eventkv::handler::{GetHandler, Handler, HandlerRegistry, PutOrUpdateHandler};
use eventkv::protocol::{decode, Message, MessageKind};
use eventkv::store::InMemoryStore;
use eventkv::KvError;

// =============================================================================
// Helper Functions
// =============================================================================

fn decode_response(bytes: &[u8]) -> Message {
    let (message, consumed) = decode(bytes).unwrap().expect("complete response frame");
    assert_eq!(consumed, bytes.len());
    message
}

// =============================================================================
// Store Tests
// =============================================================================

#[test]
fn test_store_put_get() {
    let store = InMemoryStore::new();
    assert!(store.is_empty());

    store.put_or_update("hello", "world");

    assert_eq!(store.get("hello").as_deref(), Some("world"));
    assert_eq!(store.len(), 1);
}

#[test]
fn test_store_get_nonexistent_key() {
    let store = InMemoryStore::new();
    assert_eq!(store.get("nonexistent"), None);
}

#[test]
fn test_store_overwrite() {
    let store = InMemoryStore::new();
    store.put_or_update("key", "v1");
    store.put_or_update("key", "v2");

    assert_eq!(store.get("key").as_deref(), Some("v2"));
    assert_eq!(store.len(), 1);
}

#[test]
fn test_store_concurrent_writers_and_readers() {
    let store = Arc::new(InMemoryStore::new());

    let writers: Vec<_> = (0..4)
        .map(|t| {
            let store = Arc::clone(&store);
            thread::spawn(move || {
                for i in 0..250 {
                    store.put_or_update(format!("t{}-{}", t, i), i.to_string());
                }
            })
        })
        .collect();

    let reader = {
        let store = Arc::clone(&store);
        thread::spawn(move || {
            for _ in 0..1000 {
                if let Some(value) = store.get("t0-0") {
                    assert_eq!(value, "0");
                }
            }
        })
    };

    for writer in writers {
        writer.join().unwrap();
    }
    reader.join().unwrap();

    assert_eq!(store.len(), 1000);
    assert_eq!(store.get("t3-249").as_deref(), Some("249"));
}

// =============================================================================
// Handler Tests
// =============================================================================

#[test]
fn test_put_handler_stores_and_acknowledges() {
    let store = Arc::new(InMemoryStore::new());
    let handler = PutOrUpdateHandler::new(Arc::clone(&store));

    let response = handler
        .handle(Message::put_or_update("DiskType", "NVMe SSD"))
        .unwrap();

    assert_eq!(decode_response(&response), Message::put_or_update_ok());
    assert_eq!(store.get("DiskType").as_deref(), Some("NVMe SSD"));
}

#[test]
fn test_get_handler_found_and_missing() {
    let store = Arc::new(InMemoryStore::new());
    store.put_or_update("DiskType", "NVMe SSD");
    let handler = GetHandler::new(Arc::clone(&store));

    let found = handler.handle(Message::get("DiskType")).unwrap();
    assert_eq!(
        decode_response(&found),
        Message::get_found("DiskType", "NVMe SSD")
    );

    let missing = handler.handle(Message::get("Missing")).unwrap();
    assert_eq!(decode_response(&missing), Message::get_not_found("Missing"));
}

// =============================================================================
// Registry Tests
// =============================================================================

#[test]
fn test_registry_routes_by_kind() {
    let store = Arc::new(InMemoryStore::new());
    let registry = HandlerRegistry::for_store(Arc::clone(&store));

    assert!(registry.contains(MessageKind::Get));
    assert!(registry.contains(MessageKind::PutOrUpdate));
    assert!(!registry.contains(MessageKind::GetResponse));

    registry.dispatch(Message::put_or_update("a", "1")).unwrap();
    let response = registry.dispatch(Message::get("a")).unwrap();
    assert_eq!(decode_response(&response), Message::get_found("a", "1"));
}

#[test]
fn test_registry_rejects_unregistered_kind() {
    let registry = HandlerRegistry::for_store(Arc::new(InMemoryStore::new()));

    let result = registry.dispatch(Message::get_found("a", "1"));
    assert!(matches!(result, Err(KvError::UnknownKind(2))));
}

#[test]
fn test_registry_accepts_custom_handler() {
    struct Failing;

    impl Handler for Failing {
        fn handle(&self, _message: Message) -> eventkv::Result<Vec<u8>> {
            Err(KvError::Handler("refused".to_string()))
        }
    }

    let registry = HandlerRegistry::new().with_handler(MessageKind::Get, Failing);

    let result = registry.dispatch(Message::get("a"));
    assert!(matches!(result, Err(KvError::Handler(_))));
}
