//! RTSP session management (RFC 2326 §3, §12.37).
//!
//! An RTSP session is a server-side state object created by the first SETUP
//! and destroyed by TEARDOWN or by its liveness timeout. It tracks:
//!
//! - A unique 32-bit session ID (8 uppercase hex digits in the `Session` header).
//! - The media source it is bound to. Fixed by the first successful SETUP.
//! - One [`StreamState`] per set-up track, in SETUP order, each holding the
//!   opaque token issued by the stream-control layer.
//! - A counter handing out TCP interleaved channel pairs.
//! - A [`LivenessTimer`] that reclaims the session after inactivity.
//!
//! ## Session lifecycle (RFC 2326 §A.1)
//!
//! ```text
//! (created)     -> Init
//! SETUP         -> Ready
//! PLAY          -> Playing
//! PAUSE         -> Paused   (from Playing or Ready)
//! PLAY          -> Playing  (from Paused)
//! TEARDOWN      -> TornDown (removed)
//! timeout       -> TornDown (removed)
//! ```
//!
//! All state lives behind one mutex, so a command and the timeout racing
//! on the same session cannot both release a stream token.

pub mod liveness;
pub mod transport;

use parking_lot::{Mutex, RwLock};
use rand::RngExt;
use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;
use std::sync::{Arc, Weak};
use std::time::{Duration, Instant};

use crate::error::{Result, RtspError};
use crate::media::{MediaRegistry, MediaSession, MediaSubsession, StreamToken};
use crate::protocol::target::RequestTarget;
pub use liveness::LivenessTimer;
pub use transport::{PeerAddrs, TransportDescriptor, TransportHeader};

/// Default reclamation timeout for idle sessions.
pub const DEFAULT_RECLAMATION_TIMEOUT: Duration = Duration::from_secs(65);

/// 32-bit session identifier, rendered as 8 uppercase hex digits.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SessionId(u32);

impl SessionId {
    pub fn new(raw: u32) -> Self {
        Self(raw)
    }

    pub fn raw(&self) -> u32 {
        self.0
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:08X}", self.0)
    }
}

impl FromStr for SessionId {
    type Err = RtspError;

    /// Parse the id part of a `Session` header value (hex, case-insensitive).
    fn from_str(s: &str) -> Result<Self> {
        let s = s.trim();
        if s.is_empty() || s.len() > 8 {
            return Err(RtspError::SessionNotFound(s.to_string()));
        }
        u32::from_str_radix(s, 16)
            .map(SessionId)
            .map_err(|_| RtspError::SessionNotFound(s.to_string()))
    }
}

/// RTSP session state machine (RFC 2326 §A.1).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// Session allocated, no transport negotiated yet.
    Init,
    /// At least one track has a negotiated transport.
    Ready,
    /// Media is being delivered.
    Playing,
    /// Delivery suspended; can resume via PLAY.
    Paused,
    /// Released by TEARDOWN or timeout. Terminal.
    TornDown,
}

/// Which streams of a session a command applies to (RFC 2326 §C.1.1).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StreamSelector {
    /// The whole presentation: every set-up track.
    Aggregate,
    /// One track, by its control-URL id.
    Track(String),
}

/// One set-up track: the subsession and the token for its reserved stream.
#[derive(Clone)]
pub struct StreamState {
    pub track_id: String,
    pub subsession: Arc<dyn MediaSubsession>,
    pub token: StreamToken,
    pub transport: TransportDescriptor,
}

impl fmt::Debug for StreamState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StreamState")
            .field("track_id", &self.track_id)
            .field("token", &self.token)
            .field("transport", &self.transport.to_string())
            .finish()
    }
}

/// Result of a successful SETUP.
#[derive(Debug, Clone)]
pub struct SetupOutcome {
    pub track_id: String,
    pub transport: TransportDescriptor,
    pub token: StreamToken,
}

/// Result of a successful PLAY.
#[derive(Debug, Clone)]
pub struct PlayOutcome {
    pub stream_name: String,
    /// Scale applied after clamping, when the client asked for one.
    pub scale: Option<f32>,
    /// Track ids that were started, in SETUP order.
    pub tracks: Vec<String>,
}

struct SessionInner {
    state: SessionState,
    media: Option<Arc<MediaSession>>,
    multicast: bool,
    streams: Vec<StreamState>,
    tcp_channel_counter: u8,
}

impl SessionInner {
    fn ensure_live(&self, id: SessionId) -> Result<()> {
        if self.state == SessionState::TornDown {
            return Err(RtspError::SessionNotFound(id.to_string()));
        }
        Ok(())
    }

    /// Indices of the streams a command applies to.
    ///
    /// Fails when nothing has been set up, or the named track has not.
    fn selected(&self, id: SessionId, selector: &StreamSelector) -> Result<Vec<usize>> {
        self.ensure_live(id)?;
        if self.streams.is_empty() {
            return Err(RtspError::PreconditionFailed(format!(
                "session {id} has no transport, SETUP first"
            )));
        }
        match selector {
            StreamSelector::Aggregate => Ok((0..self.streams.len()).collect()),
            StreamSelector::Track(track) => self
                .streams
                .iter()
                .position(|s| &s.track_id == track)
                .map(|i| vec![i])
                .ok_or_else(|| {
                    RtspError::PreconditionFailed(format!("track {track} was not SETUP"))
                }),
        }
    }

    fn set_state(&mut self, id: SessionId, state: SessionState) {
        if self.state != state {
            tracing::debug!(session_id = %id, old_state = ?self.state, new_state = ?state, "state transition");
            self.state = state;
        }
    }
}

/// A single RTSP session (RFC 2326 §3).
pub struct Session {
    id: SessionId,
    created_at: Instant,
    inner: Mutex<SessionInner>,
    liveness: LivenessTimer,
}

impl Session {
    /// Allocate a session and arm its liveness timer. On expiry the timer
    /// reclaims the session through `manager`.
    fn new(
        id: SessionId,
        timeout: Duration,
        this: Weak<Session>,
        manager: SessionManager,
    ) -> Self {
        let liveness = LivenessTimer::start(id, timeout, move || {
            if let Some(session) = this.upgrade() {
                manager.reclaim(&session);
            }
        });

        Session {
            id,
            created_at: Instant::now(),
            inner: Mutex::new(SessionInner {
                state: SessionState::Init,
                media: None,
                multicast: false,
                streams: Vec::new(),
                tcp_channel_counter: 0,
            }),
            liveness,
        }
    }

    pub fn id(&self) -> SessionId {
        self.id
    }

    pub fn created_at(&self) -> Instant {
        self.created_at
    }

    pub fn state(&self) -> SessionState {
        self.inner.lock().state
    }

    pub fn is_torn_down(&self) -> bool {
        self.state() == SessionState::TornDown
    }

    /// Renew the liveness deadline. Called for every command on the session.
    pub fn note_liveness(&self) {
        self.liveness.note_liveness();
    }

    pub fn liveness_deadline(&self) -> Instant {
        self.liveness.deadline()
    }

    pub fn media(&self) -> Option<Arc<MediaSession>> {
        self.inner.lock().media.clone()
    }

    pub fn is_bound(&self) -> bool {
        self.inner.lock().media.is_some()
    }

    pub fn is_multicast(&self) -> bool {
        self.inner.lock().multicast
    }

    /// Whether any set-up track is interleaved on the RTSP connection.
    pub fn has_interleaved_streams(&self) -> bool {
        self.inner
            .lock()
            .streams
            .iter()
            .any(|s| s.transport.is_interleaved())
    }

    /// `(track_id, token)` for each set-up track, in SETUP order.
    pub fn stream_tokens(&self) -> Vec<(String, StreamToken)> {
        self.inner
            .lock()
            .streams
            .iter()
            .map(|s| (s.track_id.clone(), s.token))
            .collect()
    }

    /// Bind this session to the media source named `stream_name`.
    ///
    /// - unknown name, nothing bound yet: `NotFound`
    /// - unknown name or a different source, already bound: `BadRequest`
    /// - same source again: no-op
    pub fn bind_media(&self, registry: &MediaRegistry, stream_name: &str) -> Result<Arc<MediaSession>> {
        let resolved = registry.lookup(stream_name);
        let mut inner = self.inner.lock();
        inner.ensure_live(self.id)?;

        let bound = inner.media.clone();

        match (resolved, bound) {
            (None, None) => Err(RtspError::NotFound(stream_name.to_string())),
            (None, Some(bound)) => Err(RtspError::BadRequest(format!(
                "session {} is bound to {}, {stream_name} does not exist",
                self.id,
                bound.name()
            ))),
            (Some(media), Some(bound)) if !Arc::ptr_eq(&media, &bound) => {
                Err(RtspError::BadRequest(format!(
                    "session {} is bound to {}, not {stream_name}",
                    self.id,
                    bound.name()
                )))
            }
            (Some(media), Some(_)) => Ok(media),
            (Some(media), None) => {
                tracing::debug!(session_id = %self.id, stream = stream_name, multicast = media.is_multicast(), "session bound to media");
                inner.multicast = media.is_multicast();
                inner.media = Some(media.clone());
                Ok(media)
            }
        }
    }

    /// Negotiate transport for one track of the bound media source and
    /// record its stream state.
    ///
    /// `track_id` of `None` selects the source's first track. A track that
    /// was already set up is re-negotiated and its old stream released.
    pub fn setup_stream(
        &self,
        track_id: Option<&str>,
        header: &TransportHeader,
        peers: PeerAddrs,
    ) -> Result<SetupOutcome> {
        let mut inner = self.inner.lock();
        inner.ensure_live(self.id)?;

        let media = inner.media.clone().ok_or_else(|| {
            RtspError::PreconditionFailed(format!("session {} is not bound to media", self.id))
        })?;
        let subsession = match track_id {
            Some(track) => media
                .subsession(track)
                .ok_or_else(|| RtspError::NotFound(format!("{}/{track}", media.name())))?,
            None => media
                .subsessions()
                .first()
                .cloned()
                .ok_or_else(|| RtspError::NotFound(format!("{} has no tracks", media.name())))?,
        };

        let multicast = inner.multicast;
        let (transport, token) = transport::resolve(
            header,
            self.id,
            multicast,
            &mut inner.tcp_channel_counter,
            peers,
            subsession.as_ref(),
        )?;

        let stream = StreamState {
            track_id: subsession.track_id().to_string(),
            subsession,
            token,
            transport: transport.clone(),
        };
        let track_id = stream.track_id.clone();

        match inner.streams.iter_mut().find(|s| s.track_id == track_id) {
            Some(existing) => {
                existing.subsession.delete_stream(existing.token);
                *existing = stream;
            }
            None => inner.streams.push(stream),
        }

        if inner.state == SessionState::Init {
            inner.set_state(self.id, SessionState::Ready);
        }

        tracing::info!(
            session_id = %self.id,
            stream = media.name(),
            track = %track_id,
            transport = %transport,
            "stream set up"
        );

        Ok(SetupOutcome {
            track_id,
            transport,
            token,
        })
    }

    /// Resolve a request URL to the streams it addresses.
    pub fn select(&self, target: &RequestTarget) -> Result<StreamSelector> {
        let inner = self.inner.lock();
        inner.ensure_live(self.id)?;
        let media = inner.media.as_ref().ok_or_else(|| {
            RtspError::PreconditionFailed(format!("session {} has no media, SETUP first", self.id))
        })?;

        let selector = target
            .selector_for(media.name())
            .ok_or_else(|| RtspError::NotFound(target.path()))?;
        if let StreamSelector::Track(track) = &selector
            && media.subsession(track).is_none()
        {
            return Err(RtspError::NotFound(format!("{}/{track}", media.name())));
        }
        Ok(selector)
    }

    /// Start delivery on the selected streams.
    ///
    /// A requested `scale` is passed through every selected subsession's
    /// clamp and applied to its stream before starting.
    pub fn play(&self, selector: &StreamSelector, scale: Option<f32>) -> Result<PlayOutcome> {
        let mut inner = self.inner.lock();
        let selected = inner.selected(self.id, selector)?;

        let scale = scale.map(|requested| {
            selected.iter().fold(requested, |s, &i| {
                inner.streams[i].subsession.test_scale_factor(s)
            })
        });

        for &i in &selected {
            let stream = &inner.streams[i];
            if let Some(scale) = scale {
                stream.subsession.set_stream_scale(stream.token, scale);
            }
            stream.subsession.start_stream(self.id, stream.token)?;
        }
        inner.set_state(self.id, SessionState::Playing);

        let stream_name = inner
            .media
            .as_ref()
            .map(|m| m.name().to_string())
            .unwrap_or_default();
        Ok(PlayOutcome {
            stream_name,
            scale,
            tracks: selected
                .iter()
                .map(|&i| inner.streams[i].track_id.clone())
                .collect(),
        })
    }

    /// Suspend delivery on the selected streams.
    pub fn pause(&self, selector: &StreamSelector) -> Result<()> {
        let mut inner = self.inner.lock();
        let selected = inner.selected(self.id, selector)?;

        for &i in &selected {
            let stream = &inner.streams[i];
            stream.subsession.pause_stream(stream.token)?;
        }
        inner.set_state(self.id, SessionState::Paused);
        Ok(())
    }

    /// Release the selected streams.
    ///
    /// Returns `true` when the session itself ended: an aggregate TEARDOWN,
    /// or the last remaining track released.
    pub fn teardown(&self, selector: &StreamSelector) -> Result<bool> {
        {
            let mut inner = self.inner.lock();
            let selected = inner.selected(self.id, selector)?;

            if selected.len() < inner.streams.len() {
                for &i in selected.iter().rev() {
                    let stream = inner.streams.remove(i);
                    stream.subsession.delete_stream(stream.token);
                    tracing::debug!(session_id = %self.id, track = %stream.track_id, "track torn down");
                }
                return Ok(false);
            }
        }
        Ok(self.close())
    }

    /// Release every stream and stop the liveness timer.
    ///
    /// The single release path for TEARDOWN, timeout and shutdown. Returns
    /// `false` if the session was already closed.
    pub fn close(&self) -> bool {
        {
            let mut inner = self.inner.lock();
            if inner.state == SessionState::TornDown {
                return false;
            }
            for stream in inner.streams.drain(..) {
                stream.subsession.delete_stream(stream.token);
            }
            inner.set_state(self.id, SessionState::TornDown);
        }
        self.liveness.cancel();
        tracing::info!(session_id = %self.id, "session torn down");
        true
    }
}

impl fmt::Debug for Session {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let inner = self.inner.lock();
        f.debug_struct("Session")
            .field("id", &self.id)
            .field("state", &inner.state)
            .field("media", &inner.media.as_ref().map(|m| m.name().to_string()))
            .field("streams", &inner.streams)
            .finish()
    }
}

/// Thread-safe registry of live sessions, keyed by session id.
///
/// Backed by `parking_lot::RwLock`; lookups happen on every command.
#[derive(Clone)]
pub struct SessionManager {
    sessions: Arc<RwLock<HashMap<SessionId, Arc<Session>>>>,
    timeout: Duration,
}

impl SessionManager {
    /// Sessions created by this manager are reclaimed after `timeout`
    /// without a command.
    pub fn new(timeout: Duration) -> Self {
        SessionManager {
            sessions: Arc::new(RwLock::new(HashMap::new())),
            timeout,
        }
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Create and register a session with a fresh random id.
    pub fn create_session(&self) -> Arc<Session> {
        let mut sessions = self.sessions.write();
        let id = loop {
            let candidate = SessionId(rand::rng().random::<u32>());
            if candidate.0 != 0 && !sessions.contains_key(&candidate) {
                break candidate;
            }
        };

        let manager = self.clone();
        let timeout = self.timeout;
        let session = Arc::new_cyclic(|this| Session::new(id, timeout, this.clone(), manager));
        sessions.insert(id, session.clone());

        tracing::info!(session_id = %id, total_sessions = sessions.len(), "session created");
        session
    }

    /// Look up a live session by ID.
    pub fn get_session(&self, id: SessionId) -> Option<Arc<Session>> {
        self.sessions.read().get(&id).cloned()
    }

    /// Unregister a session without releasing its streams.
    pub fn remove_session(&self, id: SessionId) -> Option<Arc<Session>> {
        let removed = self.sessions.write().remove(&id);
        if removed.is_some() {
            let total = self.sessions.read().len();
            tracing::debug!(session_id = %id, total_sessions = total, "session removed");
        }
        removed
    }

    /// Close `session` and evict it, if the registry still maps its id to
    /// this very session. Returns whether anything was evicted.
    pub fn reclaim(&self, session: &Arc<Session>) -> bool {
        let evicted = {
            let mut sessions = self.sessions.write();
            match sessions.get(&session.id) {
                Some(current) if Arc::ptr_eq(current, session) => {
                    sessions.remove(&session.id);
                    true
                }
                _ => false,
            }
        };
        session.close();
        if evicted {
            tracing::debug!(session_id = %session.id, "session evicted");
        }
        evicted
    }

    /// Close and evict every session (server shutdown).
    pub fn teardown_all(&self) -> usize {
        let drained: Vec<Arc<Session>> = self.sessions.write().drain().map(|(_, s)| s).collect();
        for session in &drained {
            session.close();
        }
        if !drained.is_empty() {
            tracing::info!(closed = drained.len(), "all sessions torn down");
        }
        drained.len()
    }

    pub fn session_count(&self) -> usize {
        self.sessions.read().len()
    }

    pub fn session_ids(&self) -> Vec<SessionId> {
        self.sessions.read().keys().copied().collect()
    }
}

impl Default for SessionManager {
    fn default() -> Self {
        Self::new(DEFAULT_RECLAMATION_TIMEOUT)
    }
}
