pub mod error;
pub mod media;
pub mod protocol;
pub mod server;
pub mod session;
pub mod transport;

pub use error::{Result, RtspError};
pub use media::{LiveSubsession, MediaRegistry, MediaSession, MediaSubsession, PortAllocator};
pub use server::{Server, ServerConfig, SessionInfo};
pub use session::{SessionId, SessionManager, SessionState};
