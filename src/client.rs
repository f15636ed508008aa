//! Blocking client
//!
//! Talks to either server variant. Reads use a short timeout and give up
//! only after `max_idle_timeouts` consecutive ones, so a slow server is
//! tolerated for a bounded time rather than forever.

use std::io::{ErrorKind, Write};
use std::net::{SocketAddr, TcpStream, ToSocketAddrs};

use crate::config::Config;
use crate::error::{KvError, Result};
use crate::protocol::{write_message, FrameReader, Message, MessageKind, Status};

/// A connection to an EventKV server
pub struct Client {
    reader: FrameReader<TcpStream>,
    writer: TcpStream,
    max_idle_timeouts: u32,
    peer_addr: SocketAddr,
}

impl Client {
    /// Connect with default timeouts
    pub fn connect(addr: impl ToSocketAddrs) -> Result<Self> {
        Self::connect_with(addr, &Config::default())
    }

    /// Connect using the reader settings from `config`
    pub fn connect_with(addr: impl ToSocketAddrs, config: &Config) -> Result<Self> {
        config.validate()?;

        let stream = TcpStream::connect(addr)?;
        stream.set_nodelay(true)?;
        stream.set_read_timeout(Some(config.client_read_timeout()))?;
        let peer_addr = stream.peer_addr()?;

        let writer = stream.try_clone()?;
        Ok(Self {
            reader: FrameReader::new(stream, config.read_chunk_size),
            writer,
            max_idle_timeouts: config.max_idle_timeouts,
            peer_addr,
        })
    }

    pub fn peer_addr(&self) -> SocketAddr {
        self.peer_addr
    }

    /// Send one message without waiting for a response
    pub fn send(&mut self, message: &Message) -> Result<()> {
        write_message(&mut self.writer, message)
    }

    /// Send bytes as-is, framed or not
    pub fn send_raw(&mut self, bytes: &[u8]) -> Result<()> {
        self.writer.write_all(bytes)?;
        self.writer.flush()?;
        Ok(())
    }

    /// Wait for the next message
    pub fn receive(&mut self) -> Result<Message> {
        let mut timeouts = 0;
        loop {
            match self.reader.read_frame() {
                Ok(Some(message)) => return Ok(message),
                Ok(None) => {
                    return Err(KvError::Io(std::io::Error::new(
                        ErrorKind::UnexpectedEof,
                        "server closed the connection",
                    )))
                }
                Err(KvError::Io(ref e))
                    if matches!(e.kind(), ErrorKind::WouldBlock | ErrorKind::TimedOut) =>
                {
                    timeouts += 1;
                    if timeouts > self.max_idle_timeouts {
                        return Err(KvError::Timeout(format!(
                            "no response from {} after {} read timeouts",
                            self.peer_addr, timeouts
                        )));
                    }
                }
                Err(e) => return Err(e),
            }
        }
    }

    /// Send a request and wait for its response
    pub fn request(&mut self, message: &Message) -> Result<Message> {
        self.send(message)?;
        self.receive()
    }

    /// Store `value` under `key`, returning the acknowledged status
    pub fn put_or_update(&mut self, key: &str, value: &str) -> Result<Status> {
        let response = self.request(&Message::put_or_update(key, value))?;
        expect_kind(&response, MessageKind::PutOrUpdate)?;
        Ok(response.status())
    }

    /// Fetch the value under `key`; `None` when the server has none
    pub fn get(&mut self, key: &str) -> Result<Option<String>> {
        let response = self.request(&Message::get(key))?;
        expect_kind(&response, MessageKind::GetResponse)?;
        match response.status() {
            Status::Ok => Ok(Some(response.value().to_string())),
            _ => Ok(None),
        }
    }
}

fn expect_kind(response: &Message, expected: MessageKind) -> Result<()> {
    if response.kind() != expected {
        return Err(KvError::Decode(format!(
            "expected {:?} response, got {:?}",
            expected,
            response.kind()
        )));
    }
    Ok(())
}
