//! Error types for the RTSP session library.

use std::fmt;

/// Errors that can occur in the RTSP session library.
///
/// Variants map to specific failure modes across the stack:
///
/// - **Command**: [`NotFound`](Self::NotFound), [`BadRequest`](Self::BadRequest),
///   [`UnsupportedTransport`](Self::UnsupportedTransport),
///   [`PreconditionFailed`](Self::PreconditionFailed),
///   [`SessionNotFound`](Self::SessionNotFound).
/// - **Stream control**: [`StreamControl`](Self::StreamControl),
///   [`PortRangeExhausted`](Self::PortRangeExhausted).
/// - **Protocol**: [`Parse`](Self::Parse), malformed RTSP messages.
/// - **Transport**: [`Io`](Self::Io), socket/network failures.
/// - **Server**: [`AlreadyRunning`](Self::AlreadyRunning).
///
/// Every variant maps to exactly one RTSP status line via [`status`](Self::status).
#[derive(Debug, thiserror::Error)]
pub enum RtspError {
    /// Underlying I/O or socket error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The requested media source or track does not exist.
    #[error("not found: {0}")]
    NotFound(String),

    /// The request conflicts with the session (e.g. a different media source
    /// than the one already bound) or is missing a required field.
    #[error("bad request: {0}")]
    BadRequest(String),

    /// The requested transport cannot be offered (multicast over TCP).
    #[error("unsupported transport: {0}")]
    UnsupportedTransport(String),

    /// PLAY/PAUSE/TEARDOWN before a successful SETUP.
    #[error("precondition failed: {0}")]
    PreconditionFailed(String),

    /// No live session with the given ID exists in the [`SessionManager`](crate::session::SessionManager).
    #[error("session not found: {0}")]
    SessionNotFound(String),

    /// The stream-control layer refused an operation.
    #[error("stream control error: {0}")]
    StreamControl(String),

    /// [`Server::start`](crate::Server::start) was called while already running.
    #[error("server already running")]
    AlreadyRunning,

    /// Failed to parse an RTSP request message (RFC 2326 §6).
    #[error("RTSP parse error: {kind}")]
    Parse { kind: ParseErrorKind },

    /// Server-side UDP port allocation exhausted the 5000–65534 range.
    #[error("port range exhausted (tried to allocate beyond u16 range)")]
    PortRangeExhausted,
}

impl RtspError {
    /// RTSP status code and reason phrase for this error (RFC 2326 §7.1.1).
    pub fn status(&self) -> (u16, &'static str) {
        match self {
            Self::NotFound(_) => (404, "Not Found"),
            Self::BadRequest(_) | Self::Parse { .. } => (400, "Bad Request"),
            Self::PreconditionFailed(_) => (412, "Precondition Failed"),
            Self::SessionNotFound(_) => (454, "Session Not Found"),
            Self::UnsupportedTransport(_) => (461, "Unsupported Transport"),
            Self::Io(_)
            | Self::StreamControl(_)
            | Self::AlreadyRunning
            | Self::PortRangeExhausted => (500, "Internal Server Error"),
        }
    }
}

/// Specific kind of RTSP parse failure.
#[derive(Debug)]
pub enum ParseErrorKind {
    /// Input was empty (no request line).
    EmptyRequest,
    /// Request line did not have the expected `Method URI Version` format.
    InvalidRequestLine,
    /// A header line did not contain a colon separator.
    InvalidHeader,
}

impl fmt::Display for ParseErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::EmptyRequest => write!(f, "empty request"),
            Self::InvalidRequestLine => write!(f, "invalid request line"),
            Self::InvalidHeader => write!(f, "invalid header"),
        }
    }
}

/// Convenience alias for `Result<T, RtspError>`.
pub type Result<T> = std::result::Result<T, RtspError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn command_errors_map_to_rtsp_statuses() {
        assert_eq!(RtspError::NotFound("cam1".into()).status().0, 404);
        assert_eq!(RtspError::BadRequest("x".into()).status().0, 400);
        assert_eq!(RtspError::PreconditionFailed("x".into()).status().0, 412);
        assert_eq!(RtspError::SessionNotFound("x".into()).status().0, 454);
        assert_eq!(
            RtspError::UnsupportedTransport("x".into()).status(),
            (461, "Unsupported Transport")
        );
        assert_eq!(RtspError::StreamControl("x".into()).status().0, 500);
    }
}
