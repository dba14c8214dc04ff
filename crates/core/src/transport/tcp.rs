use std::io::{self, BufRead, BufReader, Read, Write};
use std::net::{TcpListener, TcpStream};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;
use std::time::Duration;

use crate::error::RtspError;
use crate::media::MediaRegistry;
use crate::protocol::{MethodHandler, RtspRequest};
use crate::server::ServerConfig;
use crate::session::SessionManager;

const ACCEPT_POLL: Duration = Duration::from_millis(50);

/// What every connection shares with the server.
#[derive(Clone)]
pub struct Shared {
    pub sessions: SessionManager,
    pub media: MediaRegistry,
    pub config: Arc<ServerConfig>,
}

/// Non-blocking accept loop, one thread per connection.
///
/// Polls `running` between accepts so [`crate::server::Server::stop`]
/// ends it promptly.
pub fn accept_loop(listener: TcpListener, shared: Shared, running: Arc<AtomicBool>) {
    while running.load(Ordering::SeqCst) {
        match listener.accept() {
            Ok((stream, peer)) => {
                let shared = shared.clone();
                let running = running.clone();
                let spawned = thread::Builder::new()
                    .name(format!("rtsp-{peer}"))
                    .spawn(move || serve(stream, shared, &running));
                if let Err(e) = spawned {
                    tracing::warn!(%peer, error = %e, "failed to spawn connection thread");
                }
            }
            Err(e) if e.kind() == io::ErrorKind::WouldBlock => thread::sleep(ACCEPT_POLL),
            Err(e) => tracing::warn!(error = %e, "TCP accept error"),
        }
    }
    tracing::debug!("accept loop exited");
}

/// Run the request/response loop for one client, then release the
/// sessions that cannot outlive its connection.
fn serve(stream: TcpStream, shared: Shared, running: &AtomicBool) {
    let (peer, local) = match (stream.peer_addr(), stream.local_addr()) {
        (Ok(peer), Ok(local)) => (peer, local),
        _ => return,
    };
    let reader = match stream.set_nonblocking(false).and_then(|_| stream.try_clone()) {
        Ok(reader) => reader,
        Err(e) => {
            tracing::warn!(%peer, error = %e, "could not set up connection");
            return;
        }
    };
    let mut reader = BufReader::new(reader);
    let mut writer = stream;
    let mut handler = MethodHandler::new(shared.sessions, shared.media, peer, local, shared.config);

    tracing::info!(%peer, "client connected");

    let reason = loop {
        if !running.load(Ordering::SeqCst) {
            break "server shutting down";
        }
        let request = match read_frame(&mut reader) {
            Ok(Frame::Request(request)) => request,
            Ok(Frame::Malformed(e)) => {
                tracing::warn!(%peer, error = %e, "parse error");
                continue;
            }
            Ok(Frame::Closed) => break "connection closed by client",
            Err(_) => break "read error",
        };

        tracing::debug!(%peer, method = %request.method, uri = %request.uri, "request");
        let response = handler.handle(&request);
        tracing::debug!(%peer, status = response.status_code, "response");

        if writer.write_all(response.serialize().as_bytes()).is_err() {
            break "write error";
        }
    };

    let released = handler.release_interleaved_sessions();
    tracing::info!(%peer, reason, released, "client disconnected");
}

/// One unit read off the signaling connection.
#[derive(Debug)]
enum Frame {
    Request(RtspRequest),
    Malformed(RtspError),
    Closed,
}

/// Read one request: header block up to the blank line, then skip any
/// `Content-Length` body (e.g. a SET_PARAMETER payload) so it is not read
/// as the next request. Blank lines between requests are ignored.
fn read_frame<R: BufRead>(reader: &mut R) -> io::Result<Frame> {
    let mut text = String::new();
    loop {
        let mut line = String::new();
        if reader.read_line(&mut line)? == 0 {
            return Ok(Frame::Closed);
        }
        let blank = line.trim_end_matches(['\r', '\n']).is_empty();
        if blank && text.is_empty() {
            continue;
        }
        text.push_str(&line);
        if blank {
            break;
        }
    }

    let request = match RtspRequest::parse(&text) {
        Ok(request) => request,
        Err(e) => return Ok(Frame::Malformed(e)),
    };

    let body_len = request
        .get_header("Content-Length")
        .and_then(|v| v.trim().parse::<u64>().ok())
        .unwrap_or(0);
    if body_len > 0 {
        let skipped = io::copy(&mut (&mut *reader).take(body_len), &mut io::sink())?;
        if skipped < body_len {
            return Ok(Frame::Closed);
        }
    }
    Ok(Frame::Request(request))
}
