use clap::Parser;
use rtsp::{LiveSubsession, MediaSession, PortAllocator, Server, ServerConfig};
use std::io;
use std::net::IpAddr;
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(
    name = "rtsp-server",
    about = "RTSP session server: SETUP/PLAY/PAUSE/TEARDOWN against live media sources"
)]
struct Args {
    /// Bind address (host:port)
    #[arg(long, short, default_value = "0.0.0.0:8554")]
    bind: String,

    /// Seconds without a command before a session is reclaimed
    #[arg(long, short, default_value_t = 65)]
    timeout: u64,

    /// Unicast stream to register (repeatable), e.g. `cam1`
    #[arg(long = "stream", short = 's', default_value = "stream")]
    streams: Vec<String>,

    /// Multicast stream to register, sent to --multicast-group
    #[arg(long)]
    multicast_stream: Option<String>,

    /// Multicast group address for --multicast-stream
    #[arg(long, default_value = "232.0.1.1")]
    multicast_group: IpAddr,

    /// Multicast RTP port (RTCP is port + 1)
    #[arg(long, default_value_t = 9000)]
    multicast_port: u16,

    /// Tracks per stream, named track1..trackN
    #[arg(long, default_value_t = 1)]
    tracks: u8,

    /// Host advertised in RTP-Info URLs (defaults to the connection's local address)
    #[arg(long)]
    public_host: Option<String>,
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let args = Args::parse();

    let config = ServerConfig {
        public_host: args.public_host.clone(),
        reclamation_timeout: Duration::from_secs(args.timeout),
        ..ServerConfig::default()
    };
    let mut server = Server::with_config(&args.bind, config);

    let ports = PortAllocator::new();
    let tracks = args.tracks.max(1);
    for name in &args.streams {
        let media = (1..=tracks).fold(MediaSession::new(name), |media, n| {
            media.with_subsession(Arc::new(LiveSubsession::unicast(
                &format!("track{n}"),
                ports.clone(),
            )))
        });
        server.add_media(media);
    }

    if let Some(name) = &args.multicast_stream {
        let media = (1..=tracks).fold(MediaSession::multicast(name), |media, n| {
            let port = args.multicast_port.saturating_add(2 * u16::from(n - 1));
            media.with_subsession(Arc::new(LiveSubsession::multicast(
                &format!("track{n}"),
                args.multicast_group,
                port,
            )))
        });
        server.add_media(media);
    }

    if let Err(e) = server.start() {
        eprintln!("Failed to start server: {}", e);
        return;
    }

    println!("RTSP server on {}, press Enter to stop", args.bind);
    let mut input = String::new();
    if let Err(e) = io::stdin().read_line(&mut input) {
        tracing::warn!(error = %e, "failed to read stdin");
    }

    server.stop();
}
