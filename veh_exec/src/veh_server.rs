//! # Vehicle Server Module
//!
//! This module abstracts over the networking side of the vehicle executable. Operators register on
//! the command socket and are then sent every telemetry packet from the data socket. Commands are
//! received on a dedicated listener thread and passed to a [`CommandHandler`].

// ------------------------------------------------------------------------------------------------
// IMPORTS
// ------------------------------------------------------------------------------------------------

use std::io::ErrorKind;
use std::net::{SocketAddr, UdpSocket};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use comms_if::{
    net::{packet, ClientTable, NetParams, NetStats, Registration, SocketOptionError},
    tc::{Command, Reply},
    tlm::TlmMap,
};
use log::{debug, info, trace, warn};
use util::logger::RateLimiter;

// ------------------------------------------------------------------------------------------------
// CONSTANTS
// ------------------------------------------------------------------------------------------------

/// Receive buffer size, large enough for any UDP datagram.
const RECV_BUF_LEN: usize = 65_536;

// ------------------------------------------------------------------------------------------------
// TRAITS
// ------------------------------------------------------------------------------------------------

/// Receiver for the commands the server does not handle itself.
pub trait CommandHandler: Send + Sync {

    /// The text following `CONTROL:`.
    fn on_control(&self, text: &str, src: SocketAddr);

    /// A datagram which was not a recognised command.
    fn on_unknown(&self, text: &str, src: SocketAddr) {
        debug!("Ignoring unknown command {:?} from {}", text, src);
    }
}

// ------------------------------------------------------------------------------------------------
// STRUCTS
// ------------------------------------------------------------------------------------------------

/// An abstraction over the networking part of the vehicle executable.
pub struct VehServer {

    /// Socket which receives commands and sends replies
    cmd_socket: Arc<UdpSocket>,

    /// Socket which sends telemetry to all clients
    data_socket: UdpSocket,

    inbox: Arc<Inbox>,

    client_timeout: Option<Duration>,

    running: Arc<AtomicBool>,

    listener: Mutex<Option<JoinHandle<()>>>,

    send_warn: Mutex<RateLimiter>,
}

/// State shared between the listener thread and the send path.
struct Inbox {
    clients: ClientTable,
    stats: Mutex<NetStats>,
    default_telemetry_port: u16,
    drop_warn: Mutex<RateLimiter>,
}

// ------------------------------------------------------------------------------------------------
// ENUMS
// ------------------------------------------------------------------------------------------------

/// Errors which can occur in the [`VehServer`]
#[derive(thiserror::Error, Debug)]
pub enum VehServerError {
    #[error("Could not bind the {0} socket: {1}")]
    BindError(&'static str, std::io::Error),

    #[error("Socket option error: {0}")]
    SocketOptionError(#[from] SocketOptionError),

    #[error("Could not start the command listener: {0}")]
    ListenerError(std::io::Error),

    #[error("The command listener is already running")]
    ListenerRunning,
}

// ------------------------------------------------------------------------------------------------
// IMPLS
// ------------------------------------------------------------------------------------------------

impl VehServer {

    /// Create a new instance of the vehicle server.
    ///
    /// Binds both sockets but does not start listening for commands, see
    /// [`VehServer::start_listener`].
    pub fn new(params: &NetParams) -> Result<Self, VehServerError> {
        let cmd_socket = UdpSocket::bind((params.bind_addr.as_str(), params.command_port))
            .map_err(|e| VehServerError::BindError("command", e))?;
        params.command_socket_options().set(&cmd_socket)?;

        // Telemetry goes out from an ephemeral port
        let data_socket = UdpSocket::bind((params.bind_addr.as_str(), 0))
            .map_err(|e| VehServerError::BindError("data", e))?;
        params.data_socket_options().set(&data_socket)?;

        let warn_interval = Duration::from_secs_f64(params.warn_interval_s.max(0.0));

        let inbox = Inbox {
            clients: ClientTable::new(),
            stats: Mutex::new(NetStats::new(Instant::now())),
            default_telemetry_port: params.default_telemetry_port,
            drop_warn: Mutex::new(RateLimiter::new(warn_interval)),
        };

        if let Ok(addr) = cmd_socket.local_addr() {
            info!("Listening for commands on {}", addr);
        }

        Ok(Self {
            cmd_socket: Arc::new(cmd_socket),
            data_socket,
            inbox: Arc::new(inbox),
            client_timeout: params.client_timeout(),
            running: Arc::new(AtomicBool::new(false)),
            listener: Mutex::new(None),
            send_warn: Mutex::new(RateLimiter::new(warn_interval)),
        })
    }

    /// Address the command socket is bound to.
    pub fn command_addr(&self) -> std::io::Result<SocketAddr> {
        self.cmd_socket.local_addr()
    }

    /// Start the command listener thread.
    pub fn start_listener(
        &self, 
        handler: Arc<dyn CommandHandler>
    ) -> Result<(), VehServerError> {
        let mut listener = lock(&self.listener);
        if listener.is_some() {
            return Err(VehServerError::ListenerRunning);
        }

        self.running.store(true, Ordering::Relaxed);

        let socket = self.cmd_socket.clone();
        let inbox = self.inbox.clone();
        let running = self.running.clone();

        let handle = thread::Builder::new()
            .name("cmd_listener".into())
            .spawn(move || listen(socket, inbox, running, handler))
            .map_err(VehServerError::ListenerError)?;

        *listener = Some(handle);

        Ok(())
    }

    /// Process one received datagram, returning the reply to send to `src`, if any.
    pub fn handle_datagram(
        &self, 
        bytes: &[u8], 
        src: SocketAddr, 
        handler: &dyn CommandHandler
    ) -> Option<Reply> {
        self.inbox.handle(bytes, src, handler)
    }

    /// Send a telemetry packet to every client.
    ///
    /// Returns `true` if at least one client was sent the packet.
    pub fn broadcast(&self, frame: &[u8], tlm: &TlmMap) -> bool {
        if let Some(timeout) = self.client_timeout {
            for c in self.inbox.clients.prune_stale(timeout, Instant::now()) {
                info!("Client {} timed out", c.ip);
            }
        }

        let bytes = match packet::encode(frame, tlm) {
            Ok(b) => b,
            Err(e) => {
                if let Some(n) = lock(&self.send_warn).check() {
                    warn!("Could not encode telemetry packet: {} ({} more suppressed)", e, n);
                }
                return false;
            }
        };

        self.send_to_all(&bytes) > 0
    }

    /// Send the termination packet to every client, returning how many were sent it.
    pub fn send_termination(&self) -> usize {
        let sent = self.send_to_all(&packet::TERMINATION);
        info!("Termination sent to {} client(s)", sent);
        sent
    }

    pub fn clients(&self) -> &ClientTable {
        &self.inbox.clients
    }

    pub fn stats(&self) -> NetStats {
        let mut stats = *lock(&self.inbox.stats);
        stats.num_clients = self.inbox.clients.len();
        stats
    }

    /// Stop the command listener. Safe to call more than once.
    pub fn shutdown(&self) {
        self.running.store(false, Ordering::Relaxed);

        let handle = lock(&self.listener).take();
        if let Some(h) = handle {
            if h.join().is_err() {
                warn!("Command listener panicked");
            }
            info!("Command listener stopped");
        }
    }

    /// Send `bytes` to each client. The client table lock is released before any send.
    fn send_to_all(&self, bytes: &[u8]) -> usize {
        let targets = self.inbox.clients.targets();
        let mut sent = 0;
        let mut failed = 0;

        for addr in targets {
            match self.data_socket.send_to(bytes, addr) {
                Ok(_) => sent += 1,
                Err(e) => {
                    failed += 1;
                    if let Some(n) = lock(&self.send_warn).check() {
                        warn!("Could not send to {}: {} ({} more suppressed)", addr, e, n);
                    }
                }
            }
        }

        let mut stats = lock(&self.inbox.stats);
        stats.packets_sent += sent as u64;
        stats.bytes_sent += (sent * bytes.len()) as u64;
        stats.send_errors += failed;

        sent
    }
}

impl Drop for VehServer {
    fn drop(&mut self) {
        self.shutdown();
    }
}

impl Inbox {
    fn handle(
        &self, 
        bytes: &[u8], 
        src: SocketAddr, 
        handler: &dyn CommandHandler
    ) -> Option<Reply> {
        let now = Instant::now();
        lock(&self.stats).commands_received += 1;

        let cmd = match Command::from_bytes(bytes) {
            Ok(c) => c,
            Err(e) => {
                lock(&self.stats).commands_dropped += 1;
                if let Some(n) = lock(&self.drop_warn).check() {
                    warn!("Dropped datagram from {}: {} ({} more suppressed)", src, e, n);
                }
                return None;
            }
        };

        trace!("{} from {}", cmd, src);

        match cmd {
            Command::Connect { port } => {
                let port = port.unwrap_or(self.default_telemetry_port);
                match self.clients.register(src.ip(), port, now) {
                    Registration::New => {
                        info!("Client {} connected, telemetry to port {}", src.ip(), port);
                        Some(Reply::Connected)
                    },
                    Registration::Existing => {
                        info!("Client {} reconnected, telemetry to port {}", src.ip(), port);
                        Some(Reply::Reconnected)
                    }
                }
            },
            Command::Disconnect => {
                if self.clients.remove(src.ip()).is_some() {
                    info!("Client {} disconnected", src.ip());
                }
                None
            },
            Command::Ping { token } => {
                self.clients.touch(src.ip(), now);
                Some(Reply::Pong { token })
            },
            Command::Control(text) => {
                self.clients.touch(src.ip(), now);
                handler.on_control(&text, src);
                None
            },
            Command::Unknown(text) => {
                self.clients.touch(src.ip(), now);
                handler.on_unknown(&text, src);
                None
            }
        }
    }
}

// ------------------------------------------------------------------------------------------------
// FUNCTIONS
// ------------------------------------------------------------------------------------------------

fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(|e| e.into_inner())
}

/// Command listener loop, exits within one receive timeout of `running` being cleared.
fn listen(
    socket: Arc<UdpSocket>, 
    inbox: Arc<Inbox>, 
    running: Arc<AtomicBool>, 
    handler: Arc<dyn CommandHandler>
) {
    let mut buf = vec![0u8; RECV_BUF_LEN];

    while running.load(Ordering::Relaxed) {
        let (len, src) = match socket.recv_from(&mut buf) {
            Ok(r) => r,
            Err(e) if e.kind() == ErrorKind::WouldBlock || e.kind() == ErrorKind::TimedOut => {
                continue
            },
            Err(e) => {
                // Errors such as ICMP port unreachable from a previous send are not fatal
                debug!("Command socket receive error: {}", e);
                continue
            }
        };

        if let Some(reply) = inbox.handle(&buf[..len], src, handler.as_ref()) {
            if let Err(e) = socket.send_to(reply.to_string().as_bytes(), src) {
                warn!("Could not reply {} to {}: {}", reply, src, e);
            }
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[derive(Default)]
    struct Counter {
        unknown: Mutex<Vec<String>>,
    }

    impl CommandHandler for Counter {
        fn on_control(&self, _text: &str, _src: SocketAddr) {}

        fn on_unknown(&self, text: &str, _src: SocketAddr) {
            self.unknown.lock().unwrap().push(text.to_string());
        }
    }

    fn server() -> VehServer {
        VehServer::new(&NetParams {
            bind_addr: "127.0.0.1".into(),
            command_port: 0,
            ..Default::default()
        }).unwrap()
    }

    #[test]
    fn test_handle_datagram() {
        let server = server();
        let handler = Counter::default();
        let src: SocketAddr = "127.0.0.1:40000".parse().unwrap();

        // No port given, the default telemetry port is used
        assert_eq!(server.handle_datagram(b"CONNECT", src, &handler), Some(Reply::Connected));
        assert_eq!(server.clients().entries()[0].port, 9999);

        // A bad port is not a registration
        assert_eq!(server.handle_datagram(b"CONNECT:abc", src, &handler), None);
        assert_eq!(*handler.unknown.lock().unwrap(), vec!["CONNECT:abc".to_string()]);
        assert_eq!(server.clients().entries()[0].port, 9999);

        assert_eq!(server.handle_datagram(&[0xC3, 0x28], src, &handler), None);

        let stats = server.stats();
        assert_eq!(stats.commands_received, 3);
        assert_eq!(stats.commands_dropped, 1);
        assert_eq!(stats.num_clients, 1);
    }

    #[test]
    fn test_listener_cannot_start_twice() {
        let server = server();
        let handler: Arc<dyn CommandHandler> = Arc::new(Counter::default());

        server.start_listener(handler.clone()).unwrap();
        assert!(matches!(
            server.start_listener(handler),
            Err(VehServerError::ListenerRunning)
        ));

        server.shutdown();
    }
}
