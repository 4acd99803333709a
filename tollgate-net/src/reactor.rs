//! Single-threaded, readiness-driven connection reactor.
//!
//! Every network-facing daemon runs one reactor instance and no worker
//! threads. Readiness notifications are edge-triggered, so each event must
//! drain its socket completely (loop until the operation would block);
//! there is no second notification for bytes left behind.
//!
//! Connections are strictly one-request-one-response: accumulate input
//! until the listener's protocol reports a complete request, compute the
//! response synchronously, flush it, half-close. A new connection is
//! required per exchange.

use std::collections::HashMap;
use std::io::{self, Read, Write};
use std::net::{Shutdown, SocketAddr};
use std::sync::Arc;

use mio::event::Event;
use mio::net::{TcpListener, TcpStream};
use mio::{Events, Interest, Poll, Registry, Token};
use tracing::{debug, info, warn};

/// One protocol variant, selected per listener at construction time.
pub trait Protocol: Send + Sync {
    /// True once `buf` holds one complete request.
    fn request_complete(&self, buf: &[u8]) -> bool;

    /// Computes the full response for a complete request. Returning an
    /// empty response means no well-formed request was observed: the
    /// connection is closed without replying.
    fn build_response(&self, buf: &[u8], peer: SocketAddr) -> Vec<u8>;
}

const READ_CHUNK: usize = 1024;
const EVENT_CAPACITY: usize = 256;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ConnState {
    Reading,
    Responding,
}

struct Connection {
    stream: TcpStream,
    peer: SocketAddr,
    protocol: Arc<dyn Protocol>,
    state: ConnState,
    readbuf: Vec<u8>,
    writebuf: Vec<u8>,
    written: usize,
}

impl Connection {
    fn new(stream: TcpStream, peer: SocketAddr, protocol: Arc<dyn Protocol>) -> Self {
        Connection {
            stream,
            peer,
            protocol,
            state: ConnState::Reading,
            readbuf: Vec::new(),
            writebuf: Vec::new(),
            written: 0,
        }
    }

    /// Returns true when the connection is finished and must be released.
    fn handle_event(&mut self, event: &Event, registry: &Registry, token: Token) -> bool {
        if event.is_error() {
            return true;
        }
        if event.is_readable() && self.drain_read(registry, token) {
            return true;
        }
        if event.is_writable() && self.drain_write() {
            return true;
        }
        false
    }

    fn drain_read(&mut self, registry: &Registry, token: Token) -> bool {
        if self.state != ConnState::Reading {
            // The single request was already observed; surplus input is
            // ignored.
            return false;
        }
        let mut chunk = [0u8; READ_CHUNK];
        let mut peer_closed = false;
        loop {
            match self.stream.read(&mut chunk) {
                Ok(0) => {
                    peer_closed = true;
                    break;
                }
                Ok(n) => self.readbuf.extend_from_slice(&chunk[..n]),
                Err(ref e) if e.kind() == io::ErrorKind::WouldBlock => break,
                Err(ref e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => {
                    debug!("[{}] read error: {}", self.peer, e);
                    return true;
                }
            }
        }
        if self.protocol.request_complete(&self.readbuf) {
            let response = self.protocol.build_response(&self.readbuf, self.peer);
            if response.is_empty() {
                return true;
            }
            debug!(
                "[{}] request complete ({} bytes), responding with {} bytes",
                self.peer,
                self.readbuf.len(),
                response.len()
            );
            self.writebuf = response;
            self.state = ConnState::Responding;
            if let Err(e) = registry.reregister(&mut self.stream, token, Interest::WRITABLE) {
                warn!("[{}] failed to register for write: {}", self.peer, e);
                return true;
            }
            // The socket is usually writable immediately; start flushing
            // now rather than waiting for the next readiness edge.
            return self.drain_write();
        }
        peer_closed
    }

    fn drain_write(&mut self) -> bool {
        if self.state != ConnState::Responding {
            return false;
        }
        while self.written < self.writebuf.len() {
            match self.stream.write(&self.writebuf[self.written..]) {
                Ok(0) => return true,
                Ok(n) => self.written += n,
                Err(ref e) if e.kind() == io::ErrorKind::WouldBlock => return false,
                Err(ref e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => {
                    debug!("[{}] write error: {}", self.peer, e);
                    return true;
                }
            }
        }
        debug!("[{}] response sent", self.peer);
        if let Err(e) = self.stream.shutdown(Shutdown::Write) {
            debug!("[{}] shutdown failed: {}", self.peer, e);
        }
        true
    }
}

/// The readiness multiplexer. Owns every listener and connection of one
/// process.
pub struct Reactor {
    poll: Poll,
    next_token: usize,
    listeners: HashMap<Token, (TcpListener, Arc<dyn Protocol>)>,
    connections: HashMap<Token, Connection>,
}

impl Reactor {
    pub fn new() -> io::Result<Self> {
        Ok(Reactor {
            poll: Poll::new()?,
            next_token: 0,
            listeners: HashMap::new(),
            connections: HashMap::new(),
        })
    }

    fn alloc_token(&mut self) -> Token {
        let token = Token(self.next_token);
        self.next_token += 1;
        token
    }

    /// Binds a listening socket whose connections speak `protocol`.
    /// Returns the bound address (useful with port 0).
    pub fn listen(&mut self, addr: SocketAddr, protocol: Arc<dyn Protocol>) -> io::Result<SocketAddr> {
        let mut listener = TcpListener::bind(addr)?;
        let local = listener.local_addr()?;
        let token = self.alloc_token();
        self.poll
            .registry()
            .register(&mut listener, token, Interest::READABLE)?;
        info!("now listening on {}", local);
        self.listeners.insert(token, (listener, protocol));
        Ok(local)
    }

    /// Runs the event loop. Never returns under normal operation.
    pub fn run(&mut self) -> io::Result<()> {
        let mut events = Events::with_capacity(EVENT_CAPACITY);
        loop {
            self.poll.poll(&mut events, None)?;
            for event in events.iter() {
                self.dispatch(event);
            }
        }
    }

    fn dispatch(&mut self, event: &Event) {
        let token = event.token();
        if self.listeners.contains_key(&token) {
            self.accept_ready(token);
            return;
        }
        let Self {
            poll, connections, ..
        } = self;
        let close = match connections.get_mut(&token) {
            Some(conn) => conn.handle_event(event, poll.registry(), token),
            // A stale event for a connection already released this batch.
            None => false,
        };
        if close {
            self.close(token);
        }
    }

    /// Accepts until the listener would block: edge-triggered readiness
    /// reports a burst of pending connections only once.
    fn accept_ready(&mut self, token: Token) {
        loop {
            let accepted = match self.listeners.get_mut(&token) {
                Some((listener, protocol)) => match listener.accept() {
                    Ok((stream, peer)) => Some((stream, peer, Arc::clone(protocol))),
                    Err(ref e) if e.kind() == io::ErrorKind::WouldBlock => None,
                    Err(e) => {
                        warn!("accept failed: {}", e);
                        None
                    }
                },
                None => None,
            };
            let Some((mut stream, peer, protocol)) = accepted else {
                break;
            };
            let conn_token = self.alloc_token();
            if let Err(e) =
                self.poll
                    .registry()
                    .register(&mut stream, conn_token, Interest::READABLE)
            {
                warn!("failed to register connection from {}: {}", peer, e);
                continue;
            }
            debug!("accepted connection from {}", peer);
            self.connections
                .insert(conn_token, Connection::new(stream, peer, protocol));
        }
    }

    fn close(&mut self, token: Token) {
        if let Some(mut conn) = self.connections.remove(&token) {
            let _ = self.poll.registry().deregister(&mut conn.stream);
            debug!("[{}] connection closed", conn.peer);
        }
    }
}
