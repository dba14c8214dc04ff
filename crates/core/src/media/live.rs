use std::collections::HashMap;
use std::net::IpAddr;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::Mutex;

use super::{MediaSubsession, StreamParameters, StreamRequest, StreamToken};
use crate::error::{Result, RtspError};
use crate::session::SessionId;
use crate::session::transport::StreamingMode;

static NEXT_TOKEN: AtomicU64 = AtomicU64::new(1);

const SERVER_PORT_MIN: u64 = 5000;
const SERVER_PORT_MAX: u64 = 65534;

/// Allocates (RTP, RTCP) server port pairs.
///
/// Ports come from a monotonic counter starting at 5000. When the range is
/// exhausted (> 65534) it wraps back to 5000. Per RFC 3550 §11, RTP ports
/// are even and RTCP = RTP + 1. Clones share the same counter.
#[derive(Debug, Clone)]
pub struct PortAllocator {
    next: Arc<AtomicU64>,
}

impl PortAllocator {
    pub fn new() -> Self {
        Self::starting_at(SERVER_PORT_MIN as u16)
    }

    /// Start allocating at `port` (rounded down to even).
    pub fn starting_at(port: u16) -> Self {
        Self {
            next: Arc::new(AtomicU64::new(u64::from(port & !1))),
        }
    }

    pub fn allocate(&self) -> Result<(u16, u16)> {
        let rtp = self.next.fetch_add(2, Ordering::SeqCst);

        if rtp > SERVER_PORT_MAX {
            tracing::warn!(rtp, "port range exhausted, wrapping to {SERVER_PORT_MIN}");
            self.next.store(SERVER_PORT_MIN, Ordering::SeqCst);
            let rtp = self.next.fetch_add(2, Ordering::SeqCst);
            let rtp = u16::try_from(rtp).map_err(|_| RtspError::PortRangeExhausted)?;
            return Ok((rtp, rtp + 1));
        }

        tracing::trace!(rtp_port = rtp, rtcp_port = rtp + 1, "allocated server ports");
        let rtp = u16::try_from(rtp).map_err(|_| RtspError::PortRangeExhausted)?;
        Ok((rtp, rtp + 1))
    }
}

impl Default for PortAllocator {
    fn default() -> Self {
        Self::new()
    }
}

/// Delivery state of one reserved stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeliveryState {
    /// Reserved by SETUP, nothing sent yet.
    Reserved,
    Playing,
    Paused,
}

#[derive(Debug)]
struct Delivery {
    session_id: SessionId,
    mode: StreamingMode,
    state: DeliveryState,
    scale: f32,
}

enum Addressing {
    /// Each client gets its own server port pair.
    Unicast(PortAllocator),
    /// All clients share one group address and port pair.
    Multicast { group: IpAddr, rtp_port: u16 },
}

/// Built-in stream-control layer for a live track.
///
/// Reserves server ports on SETUP and records, per token, whether the
/// stream is playing. It does not send RTP itself; a media pipeline polls
/// [`playing_sessions`](Self::playing_sessions) to know where to deliver.
pub struct LiveSubsession {
    track_id: String,
    addressing: Addressing,
    scale_range: (f32, f32),
    deliveries: Mutex<HashMap<StreamToken, Delivery>>,
}

impl LiveSubsession {
    pub fn unicast(track_id: &str, ports: PortAllocator) -> Self {
        Self::with_addressing(track_id, Addressing::Unicast(ports))
    }

    /// A track sent to `group:rtp_port` (RTCP on `rtp_port + 1`).
    pub fn multicast(track_id: &str, group: IpAddr, rtp_port: u16) -> Self {
        Self::with_addressing(track_id, Addressing::Multicast { group, rtp_port })
    }

    fn with_addressing(track_id: &str, addressing: Addressing) -> Self {
        Self {
            track_id: track_id.to_string(),
            addressing,
            scale_range: (1.0, 1.0),
            deliveries: Mutex::new(HashMap::new()),
        }
    }

    /// Accept playback scales between `min` and `max` instead of normal
    /// speed only. The bounds may be given in either order.
    pub fn with_scale_range(mut self, min: f32, max: f32) -> Self {
        self.scale_range = (min.min(max), min.max(max));
        self
    }

    /// Current state of the stream reserved under `token`, if any.
    pub fn delivery_state(&self, token: StreamToken) -> Option<DeliveryState> {
        self.deliveries.lock().get(&token).map(|d| d.state)
    }

    /// Scale applied to the stream reserved under `token`, if any.
    pub fn delivery_scale(&self, token: StreamToken) -> Option<f32> {
        self.deliveries.lock().get(&token).map(|d| d.scale)
    }

    /// Number of streams currently reserved (any state).
    pub fn reserved_count(&self) -> usize {
        self.deliveries.lock().len()
    }

    /// Sessions whose stream on this track is currently playing.
    pub fn playing_sessions(&self) -> Vec<SessionId> {
        self.deliveries
            .lock()
            .values()
            .filter(|d| d.state == DeliveryState::Playing)
            .map(|d| d.session_id)
            .collect()
    }

    fn transition(&self, token: StreamToken, state: DeliveryState) -> Result<()> {
        let mut deliveries = self.deliveries.lock();
        let delivery = deliveries.get_mut(&token).ok_or_else(|| {
            RtspError::StreamControl(format!("unknown stream token {token} on {}", self.track_id))
        })?;
        tracing::debug!(
            track = %self.track_id,
            session_id = %delivery.session_id,
            mode = ?delivery.mode,
            old_state = ?delivery.state,
            new_state = ?state,
            "delivery state change"
        );
        delivery.state = state;
        Ok(())
    }
}

impl MediaSubsession for LiveSubsession {
    fn track_id(&self) -> &str {
        &self.track_id
    }

    fn get_stream_parameters(&self, request: &StreamRequest) -> Result<StreamParameters> {
        let (server_rtp_port, server_rtcp_port, destination) = match &self.addressing {
            Addressing::Unicast(ports) => {
                let (rtp, rtcp) = ports.allocate()?;
                (rtp, rtcp, None)
            }
            Addressing::Multicast { group, rtp_port } => {
                (*rtp_port, rtp_port.wrapping_add(1), Some(*group))
            }
        };

        let token = StreamToken::new(NEXT_TOKEN.fetch_add(1, Ordering::Relaxed));
        self.deliveries.lock().insert(
            token,
            Delivery {
                session_id: request.session_id,
                mode: request.mode,
                state: DeliveryState::Reserved,
                scale: 1.0,
            },
        );

        tracing::debug!(
            track = %self.track_id,
            session_id = %request.session_id,
            %token,
            server_rtp_port,
            "stream reserved"
        );

        Ok(StreamParameters {
            server_rtp_port,
            server_rtcp_port,
            destination,
            token,
        })
    }

    fn test_scale_factor(&self, scale: f32) -> f32 {
        let (min, max) = self.scale_range;
        scale.clamp(min, max)
    }

    fn set_stream_scale(&self, token: StreamToken, scale: f32) {
        if let Some(delivery) = self.deliveries.lock().get_mut(&token) {
            delivery.scale = scale;
        }
    }

    fn start_stream(&self, session_id: SessionId, token: StreamToken) -> Result<()> {
        tracing::trace!(track = %self.track_id, %session_id, %token, "start stream");
        self.transition(token, DeliveryState::Playing)
    }

    fn pause_stream(&self, token: StreamToken) -> Result<()> {
        self.transition(token, DeliveryState::Paused)
    }

    fn delete_stream(&self, token: StreamToken) {
        if self.deliveries.lock().remove(&token).is_some() {
            tracing::debug!(track = %self.track_id, %token, "stream released");
        }
    }
}
