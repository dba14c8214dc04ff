//! RTSP protocol implementation (RFC 2326).
//!
//! This module handles the text-based RTSP signaling protocol: parsing
//! requests, building responses, and routing methods to the session
//! state machine.
//!
//! ## RTSP message format (RFC 2326 §4)
//!
//! RTSP messages follow HTTP/1.1 syntax with a different method set:
//!
//! ```text
//! SETUP rtsp://server/cam1/track1 RTSP/1.0\r\n
//! CSeq: 3\r\n
//! Transport: RTP/AVP;unicast;client_port=8000-8001\r\n
//! \r\n
//! ```
//!
//! Key differences from HTTP:
//! - Stateful: sessions persist across requests (RFC 2326 §3).
//! - Session header carries a server-assigned ID (RFC 2326 §12.37).
//!
//! ## Supported methods
//!
//! | Method | RFC section | Purpose |
//! |--------|-------------|---------|
//! | OPTIONS | §10.1 | Capability discovery |
//! | SETUP | §10.4 | Negotiate transport (UDP ports or TCP channels) |
//! | PLAY | §10.5 | Start media delivery |
//! | PAUSE | §10.6 | Suspend media delivery |
//! | TEARDOWN | §10.7 | Release one track or the whole session |
//! | GET_PARAMETER | §10.8 | Keepalive |
//! | SET_PARAMETER | §10.9 | Keepalive |

pub mod handler;
pub mod headers;
pub mod request;
pub mod response;
pub mod target;

pub use handler::MethodHandler;
pub use request::RtspRequest;
pub use response::RtspResponse;
pub use target::RequestTarget;
