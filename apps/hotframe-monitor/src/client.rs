//! TCP client for the host's debug IPC server.

use std::io::{ErrorKind, Read, Write};
use std::net::{SocketAddr, TcpStream, ToSocketAddrs};
use std::time::Duration;

use anyhow::Context;
use hotframe_debug::ipc::protocol::{decode, encode, MAX_MESSAGE_LEN};
use hotframe_debug::{ClientMessage, OverlaySnapshot, ServerMessage, PROTOCOL_VERSION};

const CONNECT_TIMEOUT: Duration = Duration::from_secs(2);

/// Connection state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Connected,
}

/// TCP client receiving overlay snapshots.
pub struct MonitorClient {
    stream: Option<TcpStream>,
    state: ConnectionState,
    host: String,
    port: u16,
    pending: Vec<u8>,
    last_snapshot: Option<OverlaySnapshot>,
    last_error: Option<String>,
}

impl MonitorClient {
    pub fn new(host: &str, port: u16) -> Self {
        Self {
            stream: None,
            state: ConnectionState::Disconnected,
            host: host.to_string(),
            port,
            pending: Vec::new(),
            last_snapshot: None,
            last_error: None,
        }
    }

    pub const fn state(&self) -> ConnectionState {
        self.state
    }

    pub const fn last_snapshot(&self) -> Option<&OverlaySnapshot> {
        self.last_snapshot.as_ref()
    }

    /// Reason for the most recent disconnect, if any.
    pub fn last_error(&self) -> Option<&str> {
        self.last_error.as_deref()
    }

    /// Attempt to connect to the host.
    pub fn connect(&mut self) -> anyhow::Result<()> {
        self.state = ConnectionState::Connecting;

        let result = self.open_stream();
        match result {
            Ok(stream) => {
                self.stream = Some(stream);
                self.pending.clear();
                self.state = ConnectionState::Connected;
                self.last_error = None;
                Ok(())
            }
            Err(e) => {
                self.state = ConnectionState::Disconnected;
                self.last_error = Some(e.to_string());
                Err(e)
            }
        }
    }

    fn open_stream(&self) -> anyhow::Result<TcpStream> {
        let addr: SocketAddr = (self.host.as_str(), self.port)
            .to_socket_addrs()?
            .next()
            .with_context(|| format!("no address for {}:{}", self.host, self.port))?;
        let mut stream = TcpStream::connect_timeout(&addr, CONNECT_TIMEOUT)?;
        stream.set_nodelay(true)?;
        stream.write_all(&encode(&ClientMessage::Hello)?)?;
        stream.set_nonblocking(true)?;
        Ok(stream)
    }

    /// Disconnect from the host.
    pub fn disconnect(&mut self) {
        if let Some(stream) = &mut self.stream {
            if let Ok(data) = encode(&ClientMessage::Goodbye) {
                let _ = stream.write_all(&data);
            }
        }
        self.drop_connection(None);
    }

    fn drop_connection(&mut self, reason: Option<String>) {
        self.stream = None;
        self.pending.clear();
        self.state = ConnectionState::Disconnected;
        if reason.is_some() {
            self.last_error = reason;
        }
    }

    /// Read everything available and apply complete messages.
    ///
    /// Returns `true` if a new snapshot was received.
    pub fn poll(&mut self) -> bool {
        let Some(stream) = &mut self.stream else {
            return false;
        };

        let mut buf = [0u8; 8192];
        loop {
            match stream.read(&mut buf) {
                Ok(0) => {
                    self.drop_connection(Some("host closed the connection".into()));
                    return false;
                }
                Ok(n) => self.pending.extend_from_slice(&buf[..n]),
                Err(ref e) if matches!(e.kind(), ErrorKind::WouldBlock | ErrorKind::TimedOut) => {
                    break;
                }
                Err(ref e) if e.kind() == ErrorKind::Interrupted => {}
                Err(e) => {
                    self.drop_connection(Some(e.to_string()));
                    return false;
                }
            }
        }

        let mut received = false;
        loop {
            let payload = match split_frame(&mut self.pending) {
                Ok(Some(payload)) => payload,
                Ok(None) => break,
                Err(e) => {
                    self.drop_connection(Some(e));
                    return false;
                }
            };

            match decode::<ServerMessage>(&payload) {
                Ok(ServerMessage::Hello { version }) => {
                    if version != PROTOCOL_VERSION {
                        self.drop_connection(Some(format!(
                            "protocol version mismatch: host={version}, monitor={PROTOCOL_VERSION}"
                        )));
                        return false;
                    }
                }
                Ok(ServerMessage::Snapshot(snapshot)) => {
                    self.last_snapshot = Some(snapshot);
                    received = true;
                }
                Ok(ServerMessage::Goodbye) => {
                    self.drop_connection(Some("host shut down".into()));
                    return received;
                }
                Err(e) => {
                    self.drop_connection(Some(format!("invalid message: {e}")));
                    return false;
                }
            }
        }
        received
    }

    /// Ask the host to clear its counter history.
    pub fn send_reset(&mut self) -> anyhow::Result<()> {
        if let Some(stream) = &mut self.stream {
            stream.write_all(&encode(&ClientMessage::Reset)?)?;
        }
        Ok(())
    }
}

/// Remove one complete length-prefixed payload from the front of `pending`.
fn split_frame(pending: &mut Vec<u8>) -> Result<Option<Vec<u8>>, String> {
    let Some(prefix) = pending.get(..4) else {
        return Ok(None);
    };
    let mut len_buf = [0u8; 4];
    len_buf.copy_from_slice(prefix);
    let len = u32::from_le_bytes(len_buf) as usize;
    if len > MAX_MESSAGE_LEN {
        return Err(format!("message of {len} bytes exceeds limit"));
    }
    if pending.len() < 4 + len {
        return Ok(None);
    }
    let payload = pending[4..4 + len].to_vec();
    pending.drain(..4 + len);
    Ok(Some(payload))
}
