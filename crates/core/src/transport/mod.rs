//! Network transport for RTSP signaling.
//!
//! One TCP connection per client, with a thread per connection
//! ([`tcp`]). Media itself is delivered by the stream-control layer
//! behind [`MediaSubsession`](crate::media::MediaSubsession); interleaved
//! RTP channels are only negotiated here, not framed.

pub mod tcp;
