//! Server Tests
//!
//! End-to-end tests over real loopback sockets for both server variants.

use std::io::Read;
use std::net::{Shutdown, SocketAddr, TcpStream};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use eventkv::handler::{Handler, HandlerRegistry};
use eventkv::protocol::{encode, Message, MessageKind, Status, FOOTER_SIZE};
use eventkv::{Client, Config, InMemoryStore, KvError, Result, Server, ThreadedServer};

// =============================================================================
// Helper Functions
// =============================================================================

fn server_config() -> Config {
    Config::builder()
        .listen_addr("127.0.0.1:0")
        .max_clients(64)
        .poll_timeout_ms(Some(50))
        .build()
}

/// Generous reader settings so slow CI machines do not flake
fn client_config() -> Config {
    Config::builder()
        .client_read_timeout_ms(50)
        .max_idle_timeouts(100)
        .build()
}

fn start_event_loop() -> (Arc<InMemoryStore>, eventkv::ServerHandle) {
    let store = Arc::new(InMemoryStore::new());
    let server = Server::bind(server_config(), Arc::clone(&store)).unwrap();
    (store, server.spawn().unwrap())
}

fn connect(addr: SocketAddr) -> Client {
    Client::connect_with(addr, &client_config()).unwrap()
}

struct ThreadedFixture {
    addr: SocketAddr,
    stop: eventkv::StopHandle,
    thread: JoinHandle<Result<()>>,
}

fn start_threaded() -> ThreadedFixture {
    let server = ThreadedServer::bind(server_config(), Arc::new(InMemoryStore::new())).unwrap();
    let addr = server.local_addr();
    let stop = server.stop_handle();
    let thread = thread::spawn(move || server.run());
    ThreadedFixture { addr, stop, thread }
}

// =============================================================================
// Event Loop Scenarios
// =============================================================================

#[test]
fn test_put_then_get_over_one_connection() {
    let (_store, server) = start_event_loop();
    let mut client = connect(server.local_addr());

    let ack = client
        .request(&Message::put_or_update("DiskType", "NVMe SSD"))
        .unwrap();
    assert_eq!(ack, Message::put_or_update_ok());

    let response = client.request(&Message::get("DiskType")).unwrap();
    assert_eq!(response, Message::get_found("DiskType", "NVMe SSD"));

    server.stop().unwrap();
}

#[test]
fn test_get_missing_key_is_not_ok() {
    let (_store, server) = start_event_loop();
    let mut client = connect(server.local_addr());

    let response = client.request(&Message::get("Missing")).unwrap();
    assert_eq!(response.key(), "Missing");
    assert_eq!(response.value(), "");
    assert_eq!(response.status(), Status::NotOk);

    assert_eq!(client.get("Missing").unwrap(), None);
}

#[test]
fn test_latest_value_wins() {
    let (_store, server) = start_event_loop();
    let mut client = connect(server.local_addr());

    for (key, value) in [("DiskType", "NVMe SSD"), ("Storage", "LSM"), ("System", "Distributed")] {
        assert_eq!(client.put_or_update(key, value).unwrap(), Status::Ok);
    }
    assert_eq!(client.get("System").unwrap().as_deref(), Some("Distributed"));

    assert_eq!(client.put_or_update("DiskType", "HDD").unwrap(), Status::Ok);
    assert_eq!(client.get("DiskType").unwrap().as_deref(), Some("HDD"));
}

#[test]
fn test_pipelined_requests_answered_in_order() {
    let (_store, server) = start_event_loop();
    let mut client = connect(server.local_addr());

    let mut batch = Vec::new();
    for i in 0..20 {
        batch.extend(encode(&Message::put_or_update(format!("k{}", i), format!("v{}", i))).unwrap());
    }
    batch.extend(encode(&Message::get("k7")).unwrap());
    client.send_raw(&batch).unwrap();

    for _ in 0..20 {
        assert_eq!(client.receive().unwrap(), Message::put_or_update_ok());
    }
    assert_eq!(client.receive().unwrap(), Message::get_found("k7", "v7"));
}

#[test]
fn test_frame_sent_in_slow_fragments() {
    let (_store, server) = start_event_loop();
    let mut client = connect(server.local_addr());

    let frame = encode(&Message::put_or_update("slow", "drip")).unwrap();
    for piece in frame.chunks(3) {
        client.send_raw(piece).unwrap();
        thread::sleep(Duration::from_millis(5));
    }

    assert_eq!(client.receive().unwrap(), Message::put_or_update_ok());
    assert_eq!(client.get("slow").unwrap().as_deref(), Some("drip"));
}

#[test]
fn test_large_value_round_trip() {
    let (_store, server) = start_event_loop();
    let mut client = connect(server.local_addr());

    let value = "v".repeat(256 * 1024);
    assert_eq!(client.put_or_update("big", &value).unwrap(), Status::Ok);
    assert_eq!(client.get("big").unwrap(), Some(value));
}

#[test]
fn test_store_shared_across_connections() {
    let (store, server) = start_event_loop();

    let mut writer = connect(server.local_addr());
    writer.put_or_update("shared", "yes").unwrap();

    let mut reader = connect(server.local_addr());
    assert_eq!(reader.get("shared").unwrap().as_deref(), Some("yes"));
    assert_eq!(store.get("shared").as_deref(), Some("yes"));
}

#[test]
fn test_many_concurrent_clients() {
    let (_store, server) = start_event_loop();
    let addr = server.local_addr();

    let workers: Vec<_> = (0..16)
        .map(|i| {
            thread::spawn(move || {
                let mut client = connect(addr);
                for j in 0..10 {
                    let key = format!("client{}-key{}", i, j);
                    assert_eq!(client.put_or_update(&key, &j.to_string()).unwrap(), Status::Ok);
                    assert_eq!(client.get(&key).unwrap(), Some(j.to_string()));
                }
            })
        })
        .collect();

    for worker in workers {
        worker.join().unwrap();
    }
}

#[test]
fn test_malformed_client_does_not_affect_others() {
    let (_store, server) = start_event_loop();

    let mut good = connect(server.local_addr());
    assert_eq!(good.put_or_update("DiskType", "NVMe SSD").unwrap(), Status::Ok);

    let mut bad = connect(server.local_addr());
    let mut frame = encode(&Message::get("DiskType")).unwrap();
    let footer_start = frame.len() - FOOTER_SIZE;
    frame[footer_start] = b'X';
    bad.send_raw(&frame).unwrap();

    // The server hangs up on the bad client without answering
    assert!(bad.receive().is_err());

    assert_eq!(good.get("DiskType").unwrap().as_deref(), Some("NVMe SSD"));
}

#[test]
fn test_peer_disconnect_mid_frame_is_cleaned_up() {
    let (_store, server) = start_event_loop();

    {
        let mut quitter = TcpStream::connect(server.local_addr()).unwrap();
        let frame = encode(&Message::put_or_update("never", "stored")).unwrap();
        std::io::Write::write_all(&mut quitter, &frame[..frame.len() / 2]).unwrap();
    }

    let mut client = connect(server.local_addr());
    assert_eq!(client.get("never").unwrap(), None);
}

#[test]
fn test_request_then_half_close_still_answered() {
    let (_store, server) = start_event_loop();

    let mut stream = TcpStream::connect(server.local_addr()).unwrap();
    stream.set_read_timeout(Some(Duration::from_secs(5))).unwrap();
    let frame = encode(&Message::put_or_update("half", "closed")).unwrap();
    std::io::Write::write_all(&mut stream, &frame).unwrap();
    stream.shutdown(Shutdown::Write).unwrap();

    let mut reply = Vec::new();
    stream.read_to_end(&mut reply).unwrap();
    assert_eq!(reply, encode(&Message::put_or_update_ok()).unwrap());
}

#[test]
fn test_half_closed_client_receives_large_response() {
    let (_store, server) = start_event_loop();
    let mut writer = connect(server.local_addr());
    let value = "z".repeat(8 * 1024 * 1024);
    assert_eq!(writer.put_or_update("huge", &value).unwrap(), Status::Ok);

    let mut stream = TcpStream::connect(server.local_addr()).unwrap();
    stream.set_read_timeout(Some(Duration::from_secs(10))).unwrap();
    std::io::Write::write_all(&mut stream, &encode(&Message::get("huge")).unwrap()).unwrap();
    stream.shutdown(Shutdown::Write).unwrap();

    // Let the server see the half-close while most of the response is queued
    thread::sleep(Duration::from_millis(200));

    let mut reply = Vec::new();
    stream.read_to_end(&mut reply).unwrap();
    assert_eq!(reply, encode(&Message::get_found("huge", value.as_str())).unwrap());
}

#[test]
fn test_non_reading_client_does_not_stall_others() {
    let store = Arc::new(InMemoryStore::new());
    let config = Config::builder()
        .listen_addr("127.0.0.1:0")
        .poll_timeout_ms(Some(50))
        .max_pending_write_bytes(64 * 1024)
        .build();
    let server = Server::bind(config, Arc::clone(&store)).unwrap().spawn().unwrap();
    store.put_or_update("big", "b".repeat(64 * 1024));

    // Pipelines requests and never reads a response
    let mut hog = TcpStream::connect(server.local_addr()).unwrap();
    hog.set_write_timeout(Some(Duration::from_millis(500))).unwrap();
    let request = encode(&Message::get("big")).unwrap();
    for _ in 0..2000 {
        if std::io::Write::write_all(&mut hog, &request).is_err() {
            break;
        }
    }

    let mut client = connect(server.local_addr());
    assert_eq!(client.put_or_update("k", "v").unwrap(), Status::Ok);
    assert_eq!(client.get("k").unwrap().as_deref(), Some("v"));

    drop(hog);
    server.stop().unwrap();
}

#[test]
fn test_stop_closes_live_connections() {
    let (_store, server) = start_event_loop();
    let mut client = connect(server.local_addr());
    assert_eq!(client.put_or_update("k", "v").unwrap(), Status::Ok);

    server.stop().unwrap();

    let result = client.receive();
    assert!(
        matches!(result, Err(KvError::Io(_))),
        "expected closed connection, got {:?}",
        result
    );
}

#[test]
fn test_stop_interrupts_unbounded_poll() {
    let store = Arc::new(InMemoryStore::new());
    let config = Config::builder()
        .listen_addr("127.0.0.1:0")
        .poll_timeout_ms(None)
        .build();
    let server = Server::bind(config, store).unwrap().spawn().unwrap();

    thread::sleep(Duration::from_millis(20));
    server.stop().unwrap();
}

#[test]
fn test_bind_failure_is_reported() {
    let store = Arc::new(InMemoryStore::new());
    let first = Server::bind(server_config(), Arc::clone(&store)).unwrap();

    let taken = Config::builder()
        .listen_addr(first.local_addr().to_string())
        .build();
    assert!(matches!(Server::bind(taken, store), Err(KvError::Io(_))));
}

#[test]
fn test_zero_write_queue_limit_is_rejected() {
    let config = Config::builder()
        .listen_addr("127.0.0.1:0")
        .max_pending_write_bytes(0)
        .build();
    assert!(matches!(
        Server::bind(config, Arc::new(InMemoryStore::new())),
        Err(KvError::Config(_))
    ));
}

#[test]
fn test_invalid_config_is_rejected() {
    let config = Config::builder()
        .listen_addr("127.0.0.1:0")
        .read_chunk_size(0)
        .build();
    assert!(matches!(
        Server::bind(config, Arc::new(InMemoryStore::new())),
        Err(KvError::Config(_))
    ));
}

// =============================================================================
// Thread-per-connection Scenarios
// =============================================================================

#[test]
fn test_threaded_put_then_get() {
    let fixture = start_threaded();
    let mut client = connect(fixture.addr);

    assert_eq!(client.put_or_update("DiskType", "NVMe SSD").unwrap(), Status::Ok);
    assert_eq!(client.get("DiskType").unwrap().as_deref(), Some("NVMe SSD"));
    assert_eq!(client.get("Missing").unwrap(), None);

    drop(client);
    fixture.stop.stop();
    fixture.thread.join().unwrap().unwrap();
}

#[test]
fn test_threaded_fragmented_and_pipelined() {
    let fixture = start_threaded();
    let mut client = connect(fixture.addr);

    let mut batch = encode(&Message::put_or_update("a", "1")).unwrap();
    batch.extend(encode(&Message::get("a")).unwrap());
    for piece in batch.chunks(7) {
        client.send_raw(piece).unwrap();
        thread::sleep(Duration::from_millis(2));
    }

    assert_eq!(client.receive().unwrap(), Message::put_or_update_ok());
    assert_eq!(client.receive().unwrap(), Message::get_found("a", "1"));

    fixture.stop.stop();
    fixture.thread.join().unwrap().unwrap();
}

#[test]
fn test_threaded_survives_panicking_connection() {
    struct Panicking;

    impl Handler for Panicking {
        fn handle(&self, _message: Message) -> Result<Vec<u8>> {
            panic!("handler blew up");
        }
    }

    let store = Arc::new(InMemoryStore::new());
    let handlers = HandlerRegistry::for_store(Arc::clone(&store))
        .with_handler(MessageKind::Get, Panicking);
    let server = ThreadedServer::with_handlers(server_config(), handlers).unwrap();
    let addr = server.local_addr();
    let stop = server.stop_handle();
    let thread = thread::spawn(move || server.run());

    // The worker dies mid-request and its socket is dropped
    let mut doomed = connect(addr);
    assert!(doomed.request(&Message::get("k")).is_err());

    // Later accepts reap the dead worker and keep serving
    let mut client = connect(addr);
    assert_eq!(client.put_or_update("k", "v").unwrap(), Status::Ok);
    assert_eq!(store.get("k").as_deref(), Some("v"));

    drop(client);
    stop.stop();
    thread.join().unwrap().unwrap();
}
