//! Media sources and the stream-control seam.
//!
//! A [`MediaSession`] is a named source (e.g. `cam1`) made of one or more
//! [`MediaSubsession`]s, one per track. Sessions never touch RTP directly:
//! they reserve a stream with [`MediaSubsession::get_stream_parameters`],
//! receive an opaque [`StreamToken`], and hand that token back unchanged to
//! start, pause and delete the stream.
//!
//! ```text
//! SETUP    -> get_stream_parameters() -> (server ports, token)
//! PLAY     -> start_stream(session_id, token)
//! PAUSE    -> pause_stream(token)
//! TEARDOWN -> delete_stream(token)
//! ```
//!
//! [`LiveSubsession`] is the built-in implementation; it allocates server
//! port pairs and tracks delivery state per token.

pub mod live;
pub mod registry;

use std::fmt;
use std::net::IpAddr;
use std::sync::Arc;

use crate::error::Result;
use crate::session::SessionId;
use crate::session::transport::StreamingMode;

pub use live::{DeliveryState, LiveSubsession, PortAllocator};
pub use registry::MediaRegistry;

/// Opaque handle to a reserved stream, issued by the stream-control layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct StreamToken(u64);

impl StreamToken {
    pub fn new(raw: u64) -> Self {
        Self(raw)
    }

    pub fn raw(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for StreamToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:#x}", self.0)
    }
}

/// Inputs for reserving a stream, taken from the negotiated `Transport`.
#[derive(Debug, Clone)]
pub struct StreamRequest {
    pub session_id: SessionId,
    pub mode: StreamingMode,
    /// Client address the RTSP connection came from.
    pub client_ip: IpAddr,
    pub client_rtp_port: u16,
    pub client_rtcp_port: u16,
    /// `(rtp, rtcp)` interleaved channel ids, set only for RTP over TCP.
    pub interleaved: Option<(u8, u8)>,
}

/// What the stream-control layer reserved for a [`StreamRequest`].
#[derive(Debug, Clone)]
pub struct StreamParameters {
    pub server_rtp_port: u16,
    pub server_rtcp_port: u16,
    /// Group address for multicast subsessions. Unicast leaves this unset
    /// and media goes to the client address.
    pub destination: Option<IpAddr>,
    pub token: StreamToken,
}

/// One track of a [`MediaSession`], and the stream-control operations on it.
pub trait MediaSubsession: Send + Sync {
    /// Track id used in control URLs (`rtsp://host/<stream>/<track_id>`).
    fn track_id(&self) -> &str;

    /// Reserve delivery resources for one client and return the server side
    /// of the transport along with a token for later control calls.
    fn get_stream_parameters(&self, request: &StreamRequest) -> Result<StreamParameters>;

    /// Clamp a requested playback scale to what this track supports.
    ///
    /// Live sources only play at normal speed.
    fn test_scale_factor(&self, _scale: f32) -> f32 {
        1.0
    }

    /// Apply a (previously tested) scale to a reserved stream.
    fn set_stream_scale(&self, _token: StreamToken, _scale: f32) {}

    fn start_stream(&self, session_id: SessionId, token: StreamToken) -> Result<()>;

    fn pause_stream(&self, token: StreamToken) -> Result<()>;

    /// Release everything reserved for `token`. Never fails; unknown tokens
    /// are ignored.
    fn delete_stream(&self, token: StreamToken);
}

/// A named media source, made of one or more tracks.
pub struct MediaSession {
    name: String,
    multicast: bool,
    subsessions: Vec<Arc<dyn MediaSubsession>>,
}

impl MediaSession {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            multicast: false,
            subsessions: Vec::new(),
        }
    }

    /// A source whose tracks are delivered to a multicast group.
    pub fn multicast(name: &str) -> Self {
        Self {
            multicast: true,
            ..Self::new(name)
        }
    }

    pub fn with_subsession(mut self, subsession: Arc<dyn MediaSubsession>) -> Self {
        self.subsessions.push(subsession);
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn is_multicast(&self) -> bool {
        self.multicast
    }

    pub fn subsessions(&self) -> &[Arc<dyn MediaSubsession>] {
        &self.subsessions
    }

    /// Look up a track by its control-URL id.
    pub fn subsession(&self, track_id: &str) -> Option<Arc<dyn MediaSubsession>> {
        self.subsessions
            .iter()
            .find(|s| s.track_id() == track_id)
            .cloned()
    }
}

impl fmt::Debug for MediaSession {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let tracks: Vec<&str> = self.subsessions.iter().map(|s| s.track_id()).collect();
        f.debug_struct("MediaSession")
            .field("name", &self.name)
            .field("multicast", &self.multicast)
            .field("tracks", &tracks)
            .finish()
    }
}
