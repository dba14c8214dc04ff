use crate::error::{Result, RtspError};
use crate::media::MediaRegistry;
use crate::protocol::headers;
use crate::protocol::request::RtspRequest;
use crate::protocol::response::RtspResponse;
use crate::protocol::target::RequestTarget;
use crate::server::ServerConfig;
use crate::session::{PeerAddrs, Session, SessionId, SessionManager, StreamSelector};
use std::net::SocketAddr;
use std::sync::Arc;

/// Handles RTSP method requests for a single TCP connection.
///
/// Tracks which sessions were created on this connection so that
/// interleaved ones can be released when the connection drops.
pub struct MethodHandler {
    session_manager: SessionManager,
    media: MediaRegistry,
    client_addr: SocketAddr,
    local_addr: SocketAddr,
    config: Arc<ServerConfig>,
    /// Session IDs created during this connection.
    session_ids: Vec<SessionId>,
}

impl MethodHandler {
    pub fn new(
        session_manager: SessionManager,
        media: MediaRegistry,
        client_addr: SocketAddr,
        local_addr: SocketAddr,
        config: Arc<ServerConfig>,
    ) -> Self {
        MethodHandler {
            session_manager,
            media,
            client_addr,
            local_addr,
            config,
            session_ids: Vec::new(),
        }
    }

    /// Returns session IDs created on this connection.
    pub fn session_ids(&self) -> &[SessionId] {
        &self.session_ids
    }

    pub fn handle(&mut self, request: &RtspRequest) -> RtspResponse {
        let cseq = request.cseq().unwrap_or("0");

        let result = match request.method.as_str() {
            "OPTIONS" => Ok(self.handle_options(cseq)),
            "SETUP" => self.handle_setup(cseq, request),
            "PLAY" | "PAUSE" | "TEARDOWN" | "GET_PARAMETER" | "SET_PARAMETER" => {
                self.handle_within_session(cseq, request)
            }
            _ => {
                tracing::warn!(method = %request.method, %cseq, "unsupported RTSP method");
                Ok(RtspResponse::new(501, "Not Implemented")
                    .add_header("CSeq", cseq)
                    .with_date())
            }
        };

        result.unwrap_or_else(|e| {
            let (status, _) = e.status();
            tracing::warn!(method = %request.method, uri = %request.uri, %cseq, status, error = %e, "command rejected");
            RtspResponse::from_error(&e)
                .add_header("CSeq", cseq)
                .with_date()
        })
    }

    fn handle_options(&self, cseq: &str) -> RtspResponse {
        tracing::debug!(%cseq, "OPTIONS");
        RtspResponse::ok()
            .add_header("CSeq", cseq)
            .with_date()
            .add_header(
                "Public",
                "OPTIONS, SETUP, PLAY, PAUSE, TEARDOWN, GET_PARAMETER, SET_PARAMETER",
            )
    }

    fn peers(&self) -> PeerAddrs {
        PeerAddrs {
            client: self.client_addr.ip(),
            server: self.local_addr.ip(),
        }
    }

    fn lookup_session(&self, id: &str) -> Result<Arc<Session>> {
        let id: SessionId = id.parse()?;
        self.session_manager
            .get_session(id)
            .ok_or_else(|| RtspError::SessionNotFound(id.to_string()))
    }

    fn handle_setup(&mut self, cseq: &str, request: &RtspRequest) -> Result<RtspResponse> {
        let transport = request
            .transport()
            .ok_or_else(|| RtspError::BadRequest("SETUP missing Transport header".to_string()))?;

        let (session, fresh) = match request.session() {
            Some(id) => (self.lookup_session(id)?, false),
            None => (self.session_manager.create_session(), true),
        };
        session.note_liveness();

        let target = RequestTarget::from_uri(&request.uri);
        let (stream_name, track_id) = target.setup_names(&self.media);

        let outcome = session
            .bind_media(&self.media, &stream_name)
            .and_then(|_| session.setup_stream(track_id.as_deref(), &transport, self.peers()))
            .and_then(|outcome| {
                if request.play_now() {
                    session.play(&StreamSelector::Track(outcome.track_id.clone()), None)?;
                    tracing::debug!(session_id = %session.id(), track = %outcome.track_id, "x-playNow: started after SETUP");
                }
                Ok(outcome)
            });
        let outcome = match outcome {
            Ok(outcome) => outcome,
            Err(e) => {
                // A new session's id only reaches the client on success.
                if fresh {
                    self.session_manager.reclaim(&session);
                }
                return Err(e);
            }
        };

        if fresh {
            self.session_ids.push(session.id());
        }

        tracing::info!(
            session_id = %session.id(),
            stream = %stream_name,
            track = %outcome.track_id,
            client = %self.client_addr,
            "SETUP"
        );

        Ok(RtspResponse::ok()
            .add_header("CSeq", cseq)
            .with_date()
            .add_header("Transport", &outcome.transport.to_string())
            .add_header("Session", &session.id().to_string()))
    }

    fn handle_within_session(&mut self, cseq: &str, request: &RtspRequest) -> Result<RtspResponse> {
        let keepalive = matches!(request.method.as_str(), "GET_PARAMETER" | "SET_PARAMETER");

        let session = match request.session() {
            Some(id) => self.lookup_session(id)?,
            None if keepalive => {
                // GET_PARAMETER is used by clients (e.g. VLC) as a keepalive (RFC 2326 §10.8).
                tracing::trace!(%cseq, method = %request.method, "sessionless keepalive");
                return Ok(RtspResponse::ok().add_header("CSeq", cseq).with_date());
            }
            None => {
                return Err(RtspError::SessionNotFound(format!(
                    "{} without Session header",
                    request.method
                )));
            }
        };
        session.note_liveness();

        if keepalive {
            tracing::trace!(session_id = %session.id(), method = %request.method, "keepalive");
            return Ok(self.session_ok(cseq, &session));
        }

        let selector = session.select(&RequestTarget::from_uri(&request.uri))?;

        match request.method.as_str() {
            "PLAY" => self.handle_play(cseq, &session, &selector, request),
            "PAUSE" => {
                session.pause(&selector)?;
                tracing::info!(session_id = %session.id(), ?selector, "session paused");
                Ok(self.session_ok(cseq, &session))
            }
            _ => self.handle_teardown(cseq, &session, &selector),
        }
    }

    fn handle_play(
        &self,
        cseq: &str,
        session: &Session,
        selector: &StreamSelector,
        request: &RtspRequest,
    ) -> Result<RtspResponse> {
        let range = request.range();
        let outcome = session.play(selector, request.scale())?;
        let scale = outcome.scale.unwrap_or(1.0);

        tracing::info!(session_id = %session.id(), tracks = ?outcome.tracks, scale, "session started playing");

        let mut resp = RtspResponse::ok().add_header("CSeq", cseq).with_date();
        if let Some(scale) = outcome.scale {
            resp = resp.add_header("Scale", &headers::scale_response(scale));
        }

        let url = self
            .config
            .playback_url(self.local_addr, &outcome.stream_name);
        let rtp_info = outcome
            .tracks
            .iter()
            .map(|track| format!("url={url}/{track};seq=0;rtptime=0"))
            .collect::<Vec<_>>()
            .join(",");

        Ok(resp
            .add_header("Range", &headers::range_response(range.as_ref(), scale))
            .add_header("Session", &session.id().to_string())
            .add_header("RTP-Info", &rtp_info))
    }

    fn handle_teardown(
        &mut self,
        cseq: &str,
        session: &Arc<Session>,
        selector: &StreamSelector,
    ) -> Result<RtspResponse> {
        let ended = session.teardown(selector)?;
        if ended {
            self.session_manager.reclaim(session);
            self.session_ids.retain(|id| *id != session.id());
            tracing::info!(session_id = %session.id(), "session terminated via TEARDOWN");
        }
        Ok(RtspResponse::ok().add_header("CSeq", cseq).with_date())
    }

    fn session_ok(&self, cseq: &str, session: &Session) -> RtspResponse {
        RtspResponse::ok()
            .add_header("CSeq", cseq)
            .with_date()
            .add_header("Session", &session.id().to_string())
    }

    /// Tear down sessions from this connection whose media is interleaved
    /// on it. UDP sessions are left to their liveness timers.
    pub fn release_interleaved_sessions(&mut self) -> usize {
        let mut released = 0;
        for id in self.session_ids.drain(..) {
            if let Some(session) = self.session_manager.get_session(id)
                && session.has_interleaved_streams()
                && self.session_manager.reclaim(&session)
            {
                released += 1;
            }
        }
        released
    }
}
