use std::io::{Read, Write};
use std::net::{SocketAddr, TcpListener, TcpStream};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;
use std::time::Duration;

use parking_lot::Mutex;

use crate::protocol::MethodHandler;
use crate::protocol::RtspRequest;
use crate::registry::StreamRegistry;
use crate::server::ServerConfig;
use crate::session::SessionManager;

/// Non-blocking TCP accept loop.
///
/// Checks the `running` flag between accepts with a 50ms poll interval
/// so that [`crate::server::Server::stop`] can terminate it promptly.
pub fn accept_loop(
    listener: TcpListener,
    session_manager: SessionManager,
    registry: StreamRegistry,
    config: Arc<ServerConfig>,
    running: Arc<AtomicBool>,
) {
    while running.load(Ordering::SeqCst) {
        match listener.accept() {
            Ok((stream, _)) => {
                if stream.set_nonblocking(false).is_err() {
                    continue;
                }
                let sm = session_manager.clone();
                let r = running.clone();
                let reg = registry.clone();
                let c = config.clone();
                thread::spawn(move || {
                    Connection::handle(stream, sm, reg, c, r);
                });
            }
            Err(ref e) if e.kind() == std::io::ErrorKind::WouldBlock => {
                thread::sleep(Duration::from_millis(50));
            }
            Err(e) => {
                if running.load(Ordering::SeqCst) {
                    tracing::warn!(error = %e, "TCP accept error");
                }
            }
        }
    }
    tracing::debug!("accept loop exited");
}

const READ_CHUNK: usize = 4096;

/// A single RTSP client connection with its own lifecycle.
///
/// Reads into a growable byte buffer rather than line-by-line, since a
/// request may carry a `Content-Length` body (SET_PARAMETER) and since
/// the same socket can carry `$`-framed interleaved RTP/RTCP once a
/// session negotiates TCP transport (RFC 2326 §10.12).
struct Connection {
    stream: TcpStream,
    writer: Arc<Mutex<TcpStream>>,
    handler: MethodHandler,
    session_manager: SessionManager,
    peer_addr: SocketAddr,
    buf: Vec<u8>,
}

impl Connection {
    /// Entry point: set up a connection and run its request loop.
    pub fn handle(
        stream: TcpStream,
        session_manager: SessionManager,
        registry: StreamRegistry,
        config: Arc<ServerConfig>,
        running: Arc<AtomicBool>,
    ) {
        let peer_addr = match stream.peer_addr() {
            Ok(addr) => addr,
            Err(_) => return,
        };

        tracing::info!(%peer_addr, "client connected");

        let reader_stream = match stream.try_clone() {
            Ok(s) => s,
            Err(_) => return,
        };
        let writer_stream = match stream.try_clone() {
            Ok(s) => s,
            Err(_) => return,
        };

        let handler = MethodHandler::new(session_manager.clone(), peer_addr, registry, config);

        let mut conn = Connection {
            stream: reader_stream,
            writer: Arc::new(Mutex::new(writer_stream)),
            handler,
            session_manager: session_manager.clone(),
            peer_addr,
            buf: Vec::with_capacity(READ_CHUNK),
        };

        let reason = conn.run(&running);
        conn.cleanup(&session_manager);

        tracing::info!(%peer_addr, reason, "client disconnected");
    }

    /// RTSP request/response loop. Returns the reason for exiting.
    fn run(&mut self, running: &Arc<AtomicBool>) -> &'static str {
        let mut chunk = [0u8; READ_CHUNK];

        while running.load(Ordering::SeqCst) {
            match self.pop_unit() {
                Ok(Some(PoppedUnit::Request(request))) => {
                    tracing::debug!(
                        peer = %self.peer_addr,
                        method = %request.method,
                        uri = %request.uri,
                        version = %request.version,
                        "request"
                    );

                    let response = self.handler.handle(&request);
                    self.bind_tcp_writer_for_new_sessions();

                    tracing::debug!(
                        peer = %self.peer_addr,
                        status = response.status_code,
                        "response"
                    );

                    let mut writer = self.writer.lock();
                    if writer.write_all(response.serialize().as_bytes()).is_err() {
                        return "write error";
                    }
                    continue;
                }
                Ok(Some(PoppedUnit::InterleavedFrame)) => continue,
                Ok(None) => {}
                Err(_) => {
                    tracing::warn!(peer = %self.peer_addr, "parse error, dropping connection");
                    return "parse error";
                }
            }

            match self.stream.read(&mut chunk) {
                Ok(0) => return "connection closed by client",
                Ok(n) => self.buf.extend_from_slice(&chunk[..n]),
                Err(ref e) if e.kind() == std::io::ErrorKind::Interrupted => continue,
                Err(_) => return "read error",
            }
        }

        "server shutting down"
    }

    /// Pop the next complete unit (RTSP request, or an inbound `$`-framed
    /// interleaved RTP/RTCP packet to discard) off the front of `buf`.
    fn pop_unit(&mut self) -> crate::error::Result<Option<PoppedUnit>> {
        if self.buf.first() == Some(&0x24) {
            if self.buf.len() < 4 {
                return Ok(None);
            }
            let len = u16::from_be_bytes([self.buf[2], self.buf[3]]) as usize;
            let total = 4 + len;
            if self.buf.len() < total {
                return Ok(None);
            }
            self.buf.drain(..total);
            return Ok(Some(PoppedUnit::InterleavedFrame));
        }

        match RtspRequest::try_parse_from_buffer(&self.buf)? {
            Some((request, consumed)) => {
                self.buf.drain(..consumed);
                Ok(Some(PoppedUnit::Request(request)))
            }
            None => Ok(None),
        }
    }

    /// Give every session created on this connection a handle to the
    /// shared writer, so TCP-interleaved tracks can deliver RTP/RTCP over
    /// this same socket. Harmless no-op for sessions using UDP transport.
    fn bind_tcp_writer_for_new_sessions(&mut self) {
        for id in self.handler.session_ids().to_vec() {
            if let Some(session) = self.session_manager.get_session(&id) {
                session.set_tcp_writer(self.writer.clone());
            }
        }
    }

    /// Clean up sessions owned by this connection.
    fn cleanup(&self, session_manager: &SessionManager) {
        let orphaned = self.handler.session_ids().to_vec();
        if !orphaned.is_empty() {
            let removed = session_manager.remove_sessions(&orphaned);
            tracing::info!(peer = %self.peer_addr, removed, "cleaned up sessions on disconnect");
        }
    }
}

enum PoppedUnit {
    Request(RtspRequest),
    InterleavedFrame,
}
