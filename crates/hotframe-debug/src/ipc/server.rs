//! TCP server broadcasting overlay snapshots.

use std::io::{self, Write};
use std::net::{SocketAddr, TcpListener, TcpStream};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use parking_lot::Mutex;

use super::protocol::{decode, encode, read_frame, ClientMessage, ServerMessage, PROTOCOL_VERSION};
use crate::events::OverlaySnapshot;

type Clients = Arc<Mutex<Vec<TcpStream>>>;

/// IPC server that broadcasts overlay data to connected monitors.
///
/// The accept thread never sees the instrumentation table: it only receives
/// encoded snapshots and raises a flag when a monitor asks for a reset.
pub struct IpcServer {
    running: Arc<AtomicBool>,
    reset_requested: Arc<AtomicBool>,
    thread: Option<JoinHandle<()>>,
    clients: Clients,
    local_addr: SocketAddr,
}

impl IpcServer {
    /// Start the IPC server on `127.0.0.1:port` (0 picks a free port).
    pub fn start(port: u16) -> io::Result<Self> {
        let running = Arc::new(AtomicBool::new(true));
        let reset_requested = Arc::new(AtomicBool::new(false));
        let clients: Clients = Arc::new(Mutex::new(Vec::new()));

        let listener = TcpListener::bind(("127.0.0.1", port))?;
        listener.set_nonblocking(true)?;
        let local_addr = listener.local_addr()?;

        let thread = {
            let running = Arc::clone(&running);
            let reset_requested = Arc::clone(&reset_requested);
            let clients = Arc::clone(&clients);
            thread::Builder::new()
                .name("hotframe-ipc".into())
                .spawn(move || Self::server_loop(&listener, &running, &reset_requested, &clients))?
        };

        tracing::info!("Debug IPC server listening on {}", local_addr);

        Ok(Self {
            running,
            reset_requested,
            thread: Some(thread),
            clients,
            local_addr,
        })
    }

    fn server_loop(
        listener: &TcpListener,
        running: &AtomicBool,
        reset_requested: &AtomicBool,
        clients: &Clients,
    ) {
        while running.load(Ordering::Relaxed) {
            match listener.accept() {
                Ok((mut stream, addr)) => {
                    tracing::info!("Monitor connected: {}", addr);

                    if let Err(e) = stream.set_nonblocking(true) {
                        tracing::warn!("Failed to set non-blocking: {}", e);
                        continue;
                    }
                    let _ = stream.set_nodelay(true);

                    if let Ok(data) = encode(&ServerMessage::Hello {
                        version: PROTOCOL_VERSION,
                    }) {
                        let _ = stream.write_all(&data);
                    }

                    clients.lock().push(stream);
                }
                Err(ref e) if e.kind() == io::ErrorKind::WouldBlock => {
                    thread::sleep(Duration::from_millis(10));
                }
                Err(e) => {
                    tracing::warn!("Accept error: {}", e);
                    thread::sleep(Duration::from_millis(100));
                }
            }

            Self::process_client_messages(clients, reset_requested);
        }
    }

    fn process_client_messages(clients: &Clients, reset_requested: &AtomicBool) {
        clients.lock().retain_mut(|stream| match read_frame(stream) {
            Ok(data) => match decode::<ClientMessage>(&data) {
                Ok(ClientMessage::Hello) => true,
                Ok(ClientMessage::Reset) => {
                    tracing::debug!("Monitor requested counter reset");
                    reset_requested.store(true, Ordering::Release);
                    true
                }
                Ok(ClientMessage::Goodbye) => {
                    tracing::info!("Monitor disconnected");
                    false
                }
                Err(e) => {
                    tracing::warn!("Dropping monitor after bad message: {}", e);
                    false
                }
            },
            Err(ref e) if e.kind() == io::ErrorKind::WouldBlock => true,
            Err(_) => false,
        });
    }

    /// Send a snapshot to every connected monitor, dropping broken ones.
    pub fn broadcast(&self, snapshot: OverlaySnapshot) {
        let data = match encode(&ServerMessage::Snapshot(snapshot)) {
            Ok(d) => d,
            Err(e) => {
                tracing::warn!("Failed to encode snapshot: {}", e);
                return;
            }
        };

        self.clients
            .lock()
            .retain_mut(|stream| stream.write_all(&data).is_ok());
    }

    /// Returns true once per reset request received since the last call.
    pub fn take_reset_request(&self) -> bool {
        self.reset_requested.swap(false, Ordering::AcqRel)
    }

    /// Address the server is bound to.
    #[must_use]
    pub const fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Number of connected monitors.
    #[must_use]
    pub fn client_count(&self) -> usize {
        self.clients.lock().len()
    }

    /// Say goodbye to monitors and join the accept thread.
    pub fn stop(mut self) {
        self.running.store(false, Ordering::Relaxed);

        if let Ok(data) = encode(&ServerMessage::Goodbye) {
            for stream in self.clients.lock().iter_mut() {
                let _ = stream.write_all(&data);
            }
        }

        if let Some(thread) = self.thread.take() {
            let _ = thread.join();
        }

        tracing::info!("Debug IPC server stopped");
    }
}

impl Drop for IpcServer {
    fn drop(&mut self) {
        self.running.store(false, Ordering::Relaxed);
    }
}
