use std::fmt;
use std::net::IpAddr;

use crate::error::{Result, RtspError};
use crate::media::{MediaSubsession, StreamRequest, StreamToken};
use crate::session::SessionId;

/// Channel id meaning "client did not ask for specific interleaved channels".
pub const NO_CHANNEL: u8 = 0xFF;

/// Default multicast TTL when the client sends none.
pub const DEFAULT_TTL: u8 = 255;

/// How RTP is carried to the client (RFC 2326 §12.39).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamingMode {
    /// `RTP/AVP`: RTP and RTCP over UDP.
    RtpUdp,
    /// `RTP/AVP/TCP`: RTP interleaved on the RTSP connection (§10.12).
    RtpTcp,
    /// `RAW/RAW/UDP`, `MP2T/H2221/UDP`: raw payload over UDP, no RTCP.
    RawUdp,
}

/// Parsed client-side `Transport` request header.
///
/// ## Wire format examples
///
/// ```text
/// Transport: RTP/AVP;unicast;client_port=8000-8001
/// Transport: RTP/AVP/TCP;unicast;interleaved=0-1
/// Transport: RAW/RAW/UDP;unicast;client_port=1234
/// Transport: RTP/AVP;multicast;ttl=16
/// ```
#[derive(Debug, Clone, PartialEq)]
pub struct TransportHeader {
    pub mode: StreamingMode,
    /// Transport spec as sent by the client, echoed back for raw UDP.
    pub mode_str: String,
    /// Client-requested destination, if any.
    pub destination: Option<String>,
    pub ttl: u8,
    /// Client's requested RTP port (0 when absent).
    pub client_rtp_port: u16,
    /// Client's requested RTCP port (0 when absent or raw UDP).
    pub client_rtcp_port: u16,
    /// Requested interleaved RTP channel ([`NO_CHANNEL`] when absent).
    pub rtp_channel: u8,
    /// Requested interleaved RTCP channel ([`NO_CHANNEL`] when absent).
    pub rtcp_channel: u8,
}

impl Default for TransportHeader {
    fn default() -> Self {
        Self {
            mode: StreamingMode::RtpUdp,
            mode_str: "RTP/AVP".to_string(),
            destination: None,
            ttl: DEFAULT_TTL,
            client_rtp_port: 0,
            client_rtcp_port: 0,
            rtp_channel: NO_CHANNEL,
            rtcp_channel: NO_CHANNEL,
        }
    }
}

impl TransportHeader {
    /// Parse the `Transport` header value (RFC 2326 §12.39).
    ///
    /// Never fails: unknown parameters are skipped and missing ones keep
    /// their defaults, so callers validate what they need.
    ///
    /// ## Examples
    ///
    /// ```
    /// use rtsp::session::transport::{StreamingMode, TransportHeader};
    ///
    /// let th = TransportHeader::parse("RTP/AVP;unicast;client_port=8000-8001");
    /// assert_eq!(th.mode, StreamingMode::RtpUdp);
    /// assert_eq!(th.client_rtp_port, 8000);
    /// assert_eq!(th.client_rtcp_port, 8001);
    /// ```
    pub fn parse(header: &str) -> Self {
        let mut th = TransportHeader::default();

        for part in header.split(';').map(str::trim) {
            if part == "RTP/AVP/TCP" {
                th.mode = StreamingMode::RtpTcp;
            } else if part == "RAW/RAW/UDP" || part == "MP2T/H2221/UDP" {
                th.mode = StreamingMode::RawUdp;
                th.mode_str = part.to_string();
            } else if let Some(dest) = part.strip_prefix("destination=") {
                th.destination = Some(dest.to_string());
            } else if let Some(ttl) = part.strip_prefix("ttl=") {
                if let Ok(ttl) = ttl.parse() {
                    th.ttl = ttl;
                }
            } else if let Some(ports) = part.strip_prefix("client_port=") {
                if let Some((rtp, rtcp)) = parse_pair(ports) {
                    th.client_rtp_port = rtp;
                    th.client_rtcp_port = rtcp;
                } else if let Ok(rtp) = ports.parse::<u16>() {
                    th.client_rtp_port = rtp;
                    th.client_rtcp_port = match th.mode {
                        StreamingMode::RawUdp => 0,
                        _ => rtp.wrapping_add(1),
                    };
                }
            } else if let Some(channels) = part.strip_prefix("interleaved=") {
                if let Some((rtp, rtcp)) = parse_pair(channels) {
                    th.rtp_channel = rtp;
                    th.rtcp_channel = rtcp;
                } else if let Ok(rtp) = channels.parse::<u8>() {
                    th.rtp_channel = rtp;
                    th.rtcp_channel = rtp.wrapping_add(1);
                }
            }
        }

        th
    }
}

fn parse_pair<T: std::str::FromStr>(value: &str) -> Option<(T, T)> {
    let (a, b) = value.split_once('-')?;
    Some((a.trim().parse().ok()?, b.trim().parse().ok()?))
}

/// Port or channel assignment of a negotiated transport. Exactly one applies,
/// selected by the streaming mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Channels {
    /// UDP modes: where RTP/RTCP go on the client and come from on the server.
    Ports {
        client_rtp: u16,
        client_rtcp: u16,
        server_rtp: u16,
        server_rtcp: u16,
    },
    /// RTP over TCP: interleaved channel ids on the RTSP connection.
    Interleaved { rtp: u8, rtcp: u8 },
}

/// Resolved transport for one track of a session.
#[derive(Debug, Clone, PartialEq)]
pub struct TransportDescriptor {
    pub mode: StreamingMode,
    pub mode_str: String,
    pub multicast: bool,
    /// Where media is sent: the client, or the multicast group.
    pub destination: IpAddr,
    /// Server address on the RTSP connection.
    pub source: IpAddr,
    pub ttl: u8,
    pub channels: Channels,
}

impl TransportDescriptor {
    pub fn is_interleaved(&self) -> bool {
        matches!(self.channels, Channels::Interleaved { .. })
    }
}

/// Renders the `Transport` response header value.
impl fmt::Display for TransportDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let cast = if self.multicast { "multicast" } else { "unicast" };
        let (dest, src) = (self.destination, self.source);

        match (self.multicast, self.mode, self.channels) {
            (_, StreamingMode::RtpTcp, Channels::Interleaved { rtp, rtcp }) => write!(
                f,
                "RTP/AVP/TCP;{cast};destination={dest};source={src};interleaved={rtp}-{rtcp}"
            ),
            (true, StreamingMode::RtpUdp, Channels::Ports { server_rtp, server_rtcp, .. }) => {
                write!(
                    f,
                    "RTP/AVP;multicast;destination={dest};source={src};port={server_rtp}-{server_rtcp};ttl={}",
                    self.ttl
                )
            }
            (true, _, Channels::Ports { server_rtp, .. }) => write!(
                f,
                "{};multicast;destination={dest};source={src};port={server_rtp};ttl={}",
                self.mode_str, self.ttl
            ),
            (
                false,
                StreamingMode::RtpUdp,
                Channels::Ports {
                    client_rtp,
                    client_rtcp,
                    server_rtp,
                    server_rtcp,
                },
            ) => write!(
                f,
                "RTP/AVP;unicast;destination={dest};source={src};client_port={client_rtp}-{client_rtcp};server_port={server_rtp}-{server_rtcp}"
            ),
            (false, _, Channels::Ports { client_rtp, server_rtp, .. }) => write!(
                f,
                "{};unicast;destination={dest};source={src};client_port={client_rtp};server_port={server_rtp}",
                self.mode_str
            ),
            // resolve() never pairs a UDP mode with interleaved channels
            (_, _, Channels::Interleaved { rtp, rtcp }) => write!(
                f,
                "{};{cast};destination={dest};source={src};interleaved={rtp}-{rtcp}",
                self.mode_str
            ),
        }
    }
}

/// Addresses of the RTSP connection a command arrived on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PeerAddrs {
    pub client: IpAddr,
    pub server: IpAddr,
}

/// Pick the interleaved channel pair for an RTP-over-TCP request.
///
/// When the client sent no channels, `(c, c + 1)` is taken from the session
/// counter and the counter advances by 2. The RTCP channel is always
/// `c + 2`, where `c` is the counter as it was before this request.
pub fn resolve_channels(header: &TransportHeader, counter: &mut u8) -> (u8, u8) {
    let base = *counter;
    let mut rtp = header.rtp_channel;

    if rtp == NO_CHANNEL {
        rtp = base;
        *counter = base.wrapping_add(2);
    }
    let rtcp = base.wrapping_add(2);

    (rtp, rtcp)
}

/// Negotiate the transport for one track and reserve it with the
/// stream-control layer.
///
/// Returns the descriptor to answer with and the token identifying the
/// reserved stream. Multicast over TCP and unicast UDP without client
/// ports are rejected before anything is reserved.
pub fn resolve(
    header: &TransportHeader,
    session_id: SessionId,
    multicast: bool,
    channel_counter: &mut u8,
    peers: PeerAddrs,
    subsession: &dyn MediaSubsession,
) -> Result<(TransportDescriptor, StreamToken)> {
    if multicast && header.mode == StreamingMode::RtpTcp {
        return Err(RtspError::UnsupportedTransport(
            "multicast streams cannot be sent over TCP".to_string(),
        ));
    }
    if !multicast && header.mode != StreamingMode::RtpTcp && header.client_rtp_port == 0 {
        return Err(RtspError::BadRequest(
            "Transport header has no client_port".to_string(),
        ));
    }

    let interleaved = match header.mode {
        StreamingMode::RtpTcp => Some(resolve_channels(header, channel_counter)),
        _ => None,
    };

    let params = subsession.get_stream_parameters(&StreamRequest {
        session_id,
        mode: header.mode,
        client_ip: peers.client,
        client_rtp_port: header.client_rtp_port,
        client_rtcp_port: header.client_rtcp_port,
        interleaved,
    })?;

    let channels = match interleaved {
        Some((rtp, rtcp)) => Channels::Interleaved { rtp, rtcp },
        None => Channels::Ports {
            client_rtp: header.client_rtp_port,
            client_rtcp: header.client_rtcp_port,
            server_rtp: params.server_rtp_port,
            server_rtcp: params.server_rtcp_port,
        },
    };

    let destination = if multicast {
        params.destination.unwrap_or(peers.client)
    } else {
        peers.client
    };

    let descriptor = TransportDescriptor {
        mode: header.mode,
        mode_str: header.mode_str.clone(),
        multicast,
        destination,
        source: peers.server,
        ttl: header.ttl,
        channels,
    };

    tracing::debug!(
        %session_id,
        track = subsession.track_id(),
        token = %params.token,
        transport = %descriptor,
        "transport resolved"
    );

    Ok((descriptor, params.token))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::media::{LiveSubsession, PortAllocator};
    use std::net::Ipv4Addr;

    fn peers() -> PeerAddrs {
        PeerAddrs {
            client: IpAddr::V4(Ipv4Addr::new(192, 168, 1, 20)),
            server: IpAddr::V4(Ipv4Addr::new(192, 168, 1, 2)),
        }
    }

    fn unicast_track() -> LiveSubsession {
        LiveSubsession::unicast("track1", PortAllocator::starting_at(6000))
    }

    #[test]
    fn parse_udp_transport() {
        let th = TransportHeader::parse("RTP/AVP;unicast;client_port=5000-5001");
        assert_eq!(th.mode, StreamingMode::RtpUdp);
        assert_eq!(th.mode_str, "RTP/AVP");
        assert_eq!((th.client_rtp_port, th.client_rtcp_port), (5000, 5001));
        assert_eq!(th.rtp_channel, NO_CHANNEL);
        assert_eq!(th.ttl, DEFAULT_TTL);
    }

    #[test]
    fn parse_single_client_port() {
        let th = TransportHeader::parse("RTP/AVP;unicast;client_port=5000");
        assert_eq!((th.client_rtp_port, th.client_rtcp_port), (5000, 5001));

        let raw = TransportHeader::parse("RAW/RAW/UDP;unicast;client_port=1234");
        assert_eq!(raw.mode, StreamingMode::RawUdp);
        assert_eq!(raw.mode_str, "RAW/RAW/UDP");
        assert_eq!((raw.client_rtp_port, raw.client_rtcp_port), (1234, 0));
    }

    #[test]
    fn parse_tcp_interleaved() {
        let th = TransportHeader::parse("RTP/AVP/TCP;unicast;interleaved=4-5");
        assert_eq!(th.mode, StreamingMode::RtpTcp);
        assert_eq!((th.rtp_channel, th.rtcp_channel), (4, 5));

        let single = TransportHeader::parse("RTP/AVP/TCP;unicast;interleaved=6");
        assert_eq!((single.rtp_channel, single.rtcp_channel), (6, 7));

        let none = TransportHeader::parse("RTP/AVP/TCP;unicast");
        assert_eq!(none.rtp_channel, NO_CHANNEL);
    }

    #[test]
    fn parse_multicast_fields() {
        let th = TransportHeader::parse("MP2T/H2221/UDP;multicast;destination=232.1.1.1;ttl=16");
        assert_eq!(th.mode, StreamingMode::RawUdp);
        assert_eq!(th.mode_str, "MP2T/H2221/UDP");
        assert_eq!(th.destination.as_deref(), Some("232.1.1.1"));
        assert_eq!(th.ttl, 16);
    }

    #[test]
    fn parse_ignores_garbage() {
        let th = TransportHeader::parse("RTP/AVP;client_port=abc;ttl=999;foo");
        assert_eq!(th.client_rtp_port, 0);
        assert_eq!(th.ttl, DEFAULT_TTL);
    }

    #[test]
    fn channels_allocated_from_counter() {
        let th = TransportHeader::parse("RTP/AVP/TCP;unicast");
        let mut counter = 0;
        assert_eq!(resolve_channels(&th, &mut counter), (0, 2));
        assert_eq!(counter, 2);
        assert_eq!(resolve_channels(&th, &mut counter), (2, 4));
        assert_eq!(counter, 4);
    }

    #[test]
    fn client_channels_keep_rtp_but_rtcp_follows_counter() {
        let th = TransportHeader::parse("RTP/AVP/TCP;unicast;interleaved=10-11");
        let mut counter = 0;
        assert_eq!(resolve_channels(&th, &mut counter), (10, 2));
        assert_eq!(counter, 0);
    }

    #[test]
    fn resolve_unicast_udp() {
        let th = TransportHeader::parse("RTP/AVP;unicast;client_port=8000-8001");
        let mut counter = 0;
        let (desc, _) = resolve(&th, SessionId::new(1), false, &mut counter, peers(), &unicast_track())
            .unwrap();
        assert_eq!(
            desc.to_string(),
            "RTP/AVP;unicast;destination=192.168.1.20;source=192.168.1.2;client_port=8000-8001;server_port=6000-6001"
        );
        assert_eq!(counter, 0);
    }

    #[test]
    fn resolve_unicast_tcp() {
        let th = TransportHeader::parse("RTP/AVP/TCP;unicast");
        let mut counter = 0;
        let (desc, _) = resolve(&th, SessionId::new(1), false, &mut counter, peers(), &unicast_track())
            .unwrap();
        assert!(desc.is_interleaved());
        assert_eq!(
            desc.to_string(),
            "RTP/AVP/TCP;unicast;destination=192.168.1.20;source=192.168.1.2;interleaved=0-2"
        );
    }

    #[test]
    fn resolve_unicast_raw_udp() {
        let th = TransportHeader::parse("RAW/RAW/UDP;unicast;client_port=1234");
        let mut counter = 0;
        let (desc, _) = resolve(&th, SessionId::new(1), false, &mut counter, peers(), &unicast_track())
            .unwrap();
        assert_eq!(
            desc.to_string(),
            "RAW/RAW/UDP;unicast;destination=192.168.1.20;source=192.168.1.2;client_port=1234;server_port=6000"
        );
    }

    #[test]
    fn resolve_multicast_udp_uses_group() {
        let group = IpAddr::V4(Ipv4Addr::new(232, 0, 0, 9));
        let track = LiveSubsession::multicast("track1", group, 7000);
        let th = TransportHeader::parse("RTP/AVP;multicast;ttl=16");
        let mut counter = 0;
        let (desc, _) = resolve(&th, SessionId::new(1), true, &mut counter, peers(), &track).unwrap();
        assert_eq!(
            desc.to_string(),
            "RTP/AVP;multicast;destination=232.0.0.9;source=192.168.1.2;port=7000-7001;ttl=16"
        );
    }

    #[test]
    fn resolve_multicast_raw_udp() {
        let group = IpAddr::V4(Ipv4Addr::new(232, 0, 0, 9));
        let track = LiveSubsession::multicast("track1", group, 7000);
        let th = TransportHeader::parse("MP2T/H2221/UDP;multicast");
        let mut counter = 0;
        let (desc, _) = resolve(&th, SessionId::new(1), true, &mut counter, peers(), &track).unwrap();
        assert_eq!(
            desc.to_string(),
            "MP2T/H2221/UDP;multicast;destination=232.0.0.9;source=192.168.1.2;port=7000;ttl=255"
        );
    }

    #[test]
    fn multicast_over_tcp_is_rejected_without_reserving() {
        let group = IpAddr::V4(Ipv4Addr::new(232, 0, 0, 9));
        let track = LiveSubsession::multicast("track1", group, 7000);
        let th = TransportHeader::parse("RTP/AVP/TCP;interleaved=0-1");
        let mut counter = 0;
        let err = resolve(&th, SessionId::new(1), true, &mut counter, peers(), &track).unwrap_err();
        assert!(matches!(err, RtspError::UnsupportedTransport(_)));
        assert_eq!(track.reserved_count(), 0);
        assert_eq!(counter, 0);
    }

    #[test]
    fn unicast_udp_without_client_port_is_bad_request() {
        let th = TransportHeader::parse("RTP/AVP;unicast");
        let mut counter = 0;
        let err = resolve(&th, SessionId::new(1), false, &mut counter, peers(), &unicast_track())
            .unwrap_err();
        assert!(matches!(err, RtspError::BadRequest(_)));
    }
}
