//! Integration tests: full RTSP exchanges over a real TCP connection.
//!
//! Each test starts a server on its own fixed port, connects with a TCP
//! client, and checks every response.

use std::io::{BufRead, BufReader, Write};
use std::net::{TcpStream, ToSocketAddrs};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use rtsp::{LiveSubsession, MediaSession, PortAllocator, Server, ServerConfig};

fn rtsp_request(stream: &mut TcpStream, request: &str) -> std::io::Result<String> {
    stream.write_all(request.as_bytes())?;
    stream.flush()?;

    let mut reader = BufReader::new(stream);
    let mut response = String::new();
    loop {
        let mut line = String::new();
        if reader.read_line(&mut line)? == 0 {
            break;
        }
        response.push_str(&line);
        if line == "\r\n" || line == "\n" {
            break;
        }
    }
    Ok(response)
}

fn header<'a>(response: &'a str, name: &str) -> Option<&'a str> {
    response.lines().find_map(|l| {
        let (key, value) = l.split_once(':')?;
        key.trim()
            .eq_ignore_ascii_case(name)
            .then(|| value.trim())
    })
}

fn status_line(response: &str) -> &str {
    response.lines().next().unwrap_or("")
}

fn start_server(bind: &str, config: ServerConfig) -> (Server, Arc<LiveSubsession>) {
    let mut server = Server::with_config(bind, config);
    let track = Arc::new(LiveSubsession::unicast(
        "track1",
        PortAllocator::starting_at(20000),
    ));
    server.add_media(MediaSession::new("cam1").with_subsession(track.clone()));
    server.start().expect("server start");
    (server, track)
}

fn connect(bind: &str) -> TcpStream {
    let addr = bind.to_socket_addrs().unwrap().next().unwrap();
    let stream =
        TcpStream::connect_timeout(&addr, Duration::from_secs(2)).expect("connect to server");
    stream
        .set_read_timeout(Some(Duration::from_secs(2)))
        .unwrap();
    stream
        .set_write_timeout(Some(Duration::from_secs(2)))
        .unwrap();
    stream
}

/// Fixed ports for integration tests. bind_addr must be explicit (no port 0).
const SESSION_BIND: &str = "127.0.0.1:18554";
const ERRORS_BIND: &str = "127.0.0.1:18555";
const TIMEOUT_BIND: &str = "127.0.0.1:18556";
const INTERLEAVED_BIND: &str = "127.0.0.1:18557";

#[test]
fn setup_play_pause_play_teardown() {
    let (mut server, track) = start_server(SESSION_BIND, ServerConfig::default());
    let mut stream = connect(SESSION_BIND);
    let base_uri = "rtsp://127.0.0.1:18554/cam1";

    // OPTIONS
    let resp = rtsp_request(
        &mut stream,
        &format!("OPTIONS {base_uri} RTSP/1.0\r\nCSeq: 1\r\n\r\n"),
    )
    .expect("OPTIONS response");
    assert_eq!(status_line(&resp), "RTSP/1.0 200 OK");
    assert!(header(&resp, "Public").unwrap().contains("SETUP"));

    // SETUP (track1)
    let resp = rtsp_request(
        &mut stream,
        &format!(
            "SETUP {base_uri}/track1 RTSP/1.0\r\nCSeq: 2\r\nTransport: RTP/AVP;unicast;client_port=5000-5001\r\n\r\n"
        ),
    )
    .expect("SETUP response");
    assert_eq!(status_line(&resp), "RTSP/1.0 200 OK", "{resp}");
    assert_eq!(header(&resp, "CSeq"), Some("2"));
    assert!(header(&resp, "Date").is_some());
    assert_eq!(
        header(&resp, "Transport"),
        Some(
            "RTP/AVP;unicast;destination=127.0.0.1;source=127.0.0.1;client_port=5000-5001;server_port=20000-20001"
        )
    );
    let session_id = header(&resp, "Session").expect("Session header").to_string();
    assert_eq!(session_id.len(), 8);
    assert_eq!(track.reserved_count(), 1);

    // PLAY
    let resp = rtsp_request(
        &mut stream,
        &format!(
            "PLAY {base_uri} RTSP/1.0\r\nCSeq: 3\r\nSession: {session_id}\r\nRange: npt=5.000-\r\n\r\n"
        ),
    )
    .expect("PLAY response");
    assert_eq!(status_line(&resp), "RTSP/1.0 200 OK", "{resp}");
    assert_eq!(header(&resp, "Range"), Some("npt=5.000-"));
    assert_eq!(header(&resp, "Session"), Some(session_id.as_str()));
    assert_eq!(
        header(&resp, "RTP-Info"),
        Some("url=rtsp://127.0.0.1:18554/cam1/track1;seq=0;rtptime=0")
    );
    assert_eq!(track.playing_sessions().len(), 1);

    // PAUSE
    let resp = rtsp_request(
        &mut stream,
        &format!("PAUSE {base_uri} RTSP/1.0\r\nCSeq: 4\r\nSession: {session_id}\r\n\r\n"),
    )
    .expect("PAUSE response");
    assert_eq!(status_line(&resp), "RTSP/1.0 200 OK");
    assert!(track.playing_sessions().is_empty());

    // Keepalive with a timeout suffix on the Session header
    let resp = rtsp_request(
        &mut stream,
        &format!(
            "GET_PARAMETER {base_uri} RTSP/1.0\r\nCSeq: 5\r\nSession: {session_id};timeout=65\r\n\r\n"
        ),
    )
    .expect("GET_PARAMETER response");
    assert_eq!(status_line(&resp), "RTSP/1.0 200 OK");

    // PLAY again
    let resp = rtsp_request(
        &mut stream,
        &format!("PLAY {base_uri} RTSP/1.0\r\nCSeq: 6\r\nSession: {session_id}\r\n\r\n"),
    )
    .expect("PLAY response");
    assert_eq!(header(&resp, "Range"), Some("npt=0.000-"));
    assert_eq!(track.playing_sessions().len(), 1);

    // TEARDOWN
    let resp = rtsp_request(
        &mut stream,
        &format!("TEARDOWN {base_uri} RTSP/1.0\r\nCSeq: 7\r\nSession: {session_id}\r\n\r\n"),
    )
    .expect("TEARDOWN response");
    assert_eq!(status_line(&resp), "RTSP/1.0 200 OK");
    assert_eq!(track.reserved_count(), 0);
    assert!(server.sessions().is_empty());

    // The session is gone.
    let resp = rtsp_request(
        &mut stream,
        &format!("PLAY {base_uri} RTSP/1.0\r\nCSeq: 8\r\nSession: {session_id}\r\n\r\n"),
    )
    .expect("PLAY response");
    assert_eq!(status_line(&resp), "RTSP/1.0 454 Session Not Found");
    assert_eq!(header(&resp, "CSeq"), Some("8"));

    server.stop();
}

#[test]
fn error_statuses() {
    let (mut server, _) = start_server(ERRORS_BIND, ServerConfig::default());
    let mut stream = connect(ERRORS_BIND);

    let resp = rtsp_request(
        &mut stream,
        "SETUP rtsp://127.0.0.1:18555/nope/track1 RTSP/1.0\r\nCSeq: 1\r\nTransport: RTP/AVP;unicast;client_port=5000-5001\r\n\r\n",
    )
    .expect("SETUP response");
    assert_eq!(status_line(&resp), "RTSP/1.0 404 Not Found");
    assert!(header(&resp, "Session").is_none());
    assert!(server.sessions().is_empty());

    let resp = rtsp_request(
        &mut stream,
        "PLAY rtsp://127.0.0.1:18555/cam1 RTSP/1.0\r\nCSeq: 2\r\nSession: DEADBEEF\r\n\r\n",
    )
    .expect("PLAY response");
    assert_eq!(status_line(&resp), "RTSP/1.0 454 Session Not Found");

    let resp = rtsp_request(
        &mut stream,
        "SETUP rtsp://127.0.0.1:18555/cam1/track1 RTSP/1.0\r\nCSeq: 3\r\n\r\n",
    )
    .expect("SETUP response");
    assert_eq!(status_line(&resp), "RTSP/1.0 400 Bad Request");

    server.stop();
}

#[test]
fn idle_session_is_reclaimed() {
    let config = ServerConfig {
        reclamation_timeout: Duration::from_millis(300),
        ..ServerConfig::default()
    };
    let (mut server, track) = start_server(TIMEOUT_BIND, config);
    let mut stream = connect(TIMEOUT_BIND);

    let resp = rtsp_request(
        &mut stream,
        "SETUP rtsp://127.0.0.1:18556/cam1/track1 RTSP/1.0\r\nCSeq: 1\r\nTransport: RTP/AVP;unicast;client_port=5000-5001\r\n\r\n",
    )
    .expect("SETUP response");
    let session_id = header(&resp, "Session").expect("Session header").to_string();
    assert_eq!(track.reserved_count(), 1);

    thread::sleep(Duration::from_millis(1000));
    assert_eq!(track.reserved_count(), 0);
    assert!(server.sessions().is_empty());

    let resp = rtsp_request(
        &mut stream,
        &format!(
            "PLAY rtsp://127.0.0.1:18556/cam1 RTSP/1.0\r\nCSeq: 2\r\nSession: {session_id}\r\n\r\n"
        ),
    )
    .expect("PLAY response");
    assert_eq!(status_line(&resp), "RTSP/1.0 454 Session Not Found");

    server.stop();
}

#[test]
fn interleaved_session_released_on_disconnect() {
    let (mut server, track) = start_server(INTERLEAVED_BIND, ServerConfig::default());

    {
        let mut stream = connect(INTERLEAVED_BIND);
        let resp = rtsp_request(
            &mut stream,
            "SETUP rtsp://127.0.0.1:18557/cam1/track1 RTSP/1.0\r\nCSeq: 1\r\nTransport: RTP/AVP/TCP;unicast;interleaved=0-1\r\n\r\n",
        )
        .expect("SETUP response");
        assert_eq!(status_line(&resp), "RTSP/1.0 200 OK", "{resp}");
        assert!(
            header(&resp, "Transport")
                .unwrap()
                .starts_with("RTP/AVP/TCP;unicast;")
        );
        assert_eq!(server.sessions().len(), 1);
        assert!(server.sessions()[0].interleaved);
    }

    // Connection dropped; the handler thread notices on its next read.
    thread::sleep(Duration::from_millis(500));
    assert!(server.sessions().is_empty());
    assert_eq!(track.reserved_count(), 0);

    server.stop();
}
