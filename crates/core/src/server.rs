use std::net::{IpAddr, SocketAddr, TcpListener};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;
use std::time::Duration;

use crate::error::{Result, RtspError};
use crate::media::{MediaRegistry, MediaSession};
use crate::session::{DEFAULT_RECLAMATION_TIMEOUT, SessionId, SessionManager, SessionState};
use crate::transport::tcp;

/// Server-level configuration used by protocol handlers.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Public host advertised in `RTP-Info` URLs.
    /// When `None`, the local address of the client's connection is used.
    pub public_host: Option<String>,
    /// Public RTSP port for `RTP-Info` URLs. Defaults to the local port.
    pub public_port: Option<u16>,
    /// Idle time after which a session without commands is torn down.
    pub reclamation_timeout: Duration,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            public_host: None,
            public_port: None,
            reclamation_timeout: DEFAULT_RECLAMATION_TIMEOUT,
        }
    }
}

impl ServerConfig {
    /// `rtsp://host:port/<stream_name>` as seen by a client connected to `local`.
    pub fn playback_url(&self, local: SocketAddr, stream_name: &str) -> String {
        let host = match (&self.public_host, local.ip()) {
            (Some(host), _) => host.clone(),
            (None, IpAddr::V6(ip)) => format!("[{ip}]"),
            (None, ip) => ip.to_string(),
        };
        let port = self.public_port.unwrap_or(local.port());
        format!("rtsp://{host}:{port}/{stream_name}")
    }
}

/// High-level RTSP server orchestrator.
///
/// Owns the session manager and media registry. Delegates TCP connection
/// handling to [`transport::tcp`](crate::transport::tcp).
pub struct Server {
    session_manager: SessionManager,
    media: MediaRegistry,
    running: Arc<AtomicBool>,
    bind_addr: String,
    local_addr: Option<SocketAddr>,
    config: Arc<ServerConfig>,
}

impl Server {
    pub fn new(bind_addr: &str) -> Self {
        Self::with_config(bind_addr, ServerConfig::default())
    }

    pub fn with_config(bind_addr: &str, config: ServerConfig) -> Self {
        Self {
            session_manager: SessionManager::new(config.reclamation_timeout),
            media: MediaRegistry::new(),
            running: Arc::new(AtomicBool::new(false)),
            bind_addr: bind_addr.to_string(),
            local_addr: None,
            config: Arc::new(config),
        }
    }

    /// Register a media source. Replaces any source with the same name.
    pub fn add_media(&self, media: MediaSession) -> Arc<MediaSession> {
        self.media.add(media)
    }

    pub fn media(&self) -> &MediaRegistry {
        &self.media
    }

    pub fn start(&mut self) -> Result<()> {
        if self.running.load(Ordering::SeqCst) {
            return Err(RtspError::AlreadyRunning);
        }

        let listener = TcpListener::bind(&self.bind_addr)?;
        listener.set_nonblocking(true)?;
        self.local_addr = Some(listener.local_addr()?);

        self.running.store(true, Ordering::SeqCst);

        let running = self.running.clone();
        let shared = tcp::Shared {
            sessions: self.session_manager.clone(),
            media: self.media.clone(),
            config: self.config.clone(),
        };

        tracing::info!(
            addr = %self.bind_addr,
            timeout_secs = self.config.reclamation_timeout.as_secs(),
            "RTSP server listening"
        );

        thread::spawn(move || {
            tcp::accept_loop(listener, shared, running);
        });

        Ok(())
    }

    /// Stop accepting connections and tear down every session.
    pub fn stop(&mut self) {
        self.running.store(false, Ordering::SeqCst);
        let closed = self.session_manager.teardown_all();
        tracing::info!(closed, "server stopping");
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// Address the listener is bound to, once started.
    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.local_addr
    }

    /// Snapshot of every live session.
    pub fn sessions(&self) -> Vec<SessionInfo> {
        self.session_manager
            .session_ids()
            .into_iter()
            .filter_map(|id| self.session_manager.get_session(id))
            .map(|session| SessionInfo {
                session_id: session.id(),
                state: session.state(),
                stream: session.media().map(|m| m.name().to_string()),
                tracks: session
                    .stream_tokens()
                    .into_iter()
                    .map(|(track, _)| track)
                    .collect(),
                interleaved: session.has_interleaved_streams(),
            })
            .collect()
    }

    pub fn session_manager(&self) -> &SessionManager {
        &self.session_manager
    }

    /// Returns the server's protocol configuration.
    pub fn config(&self) -> Arc<ServerConfig> {
        self.config.clone()
    }
}

/// Information about a live session.
#[derive(Debug, Clone)]
pub struct SessionInfo {
    pub session_id: SessionId,
    pub state: SessionState,
    pub stream: Option<String>,
    pub tracks: Vec<String>,
    pub interleaved: bool,
}
