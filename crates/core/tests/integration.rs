//! Black-box integration tests driving the server over real TCP sockets.

use std::io::{BufRead, BufReader, Read, Write};
use std::net::{TcpStream, ToSocketAddrs};
use std::time::Duration;

use base64::prelude::{BASE64_STANDARD, Engine as _};

use rtsp::server::ServerConfig;
use rtsp::{Server, StreamConfig};

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

    if let Some(len) = response
        .lines()
        .find(|l| l.to_lowercase().starts_with("content-length:"))
        .and_then(|l| l.split(':').nth(1))
        .and_then(|v| v.trim().parse::<usize>().ok())
        && len > 0
    {
        let mut body = vec![0u8; len];
        reader.read_exact(&mut body)?;
        response.push_str(&String::from_utf8_lossy(&body));
    }

    Ok(response)
}

fn header_value<'a>(response: &'a str, name: &str) -> Option<&'a str> {
    let prefix = format!("{}:", name.to_lowercase());
    response
        .lines()
        .find(|l| l.to_lowercase().starts_with(&prefix))
        .and_then(|l| l.split_once(':'))
        .map(|(_, v)| v.trim())
}

fn connect(addr: &str) -> TcpStream {
    let sockaddr = addr.to_socket_addrs().unwrap().next().unwrap();
    let stream = TcpStream::connect_timeout(&sockaddr, Duration::from_secs(2)).expect("connect");
    stream.set_read_timeout(Some(Duration::from_secs(2))).unwrap();
    stream.set_write_timeout(Some(Duration::from_secs(2))).unwrap();
    stream
}

/// S1–S4: full handshake over UDP transport — OPTIONS, DESCRIBE, SETUP,
/// PLAY, GET_PARAMETER keepalive, TEARDOWN.
#[test]
fn full_handshake_udp_transport() {
    const BIND: &str = "127.0.0.1:18554";
    let mut server = Server::new(BIND);
    server.start().expect("server start");
    server.register_stream(StreamConfig::video_only("cam1", "Camera 1"));

    let mut stream = connect(BIND);
    let base_uri = format!("rtsp://{}/cam1", BIND);

    let opt_resp = rtsp_request(
        &mut stream,
        &format!("OPTIONS {} RTSP/1.0\r\nCSeq: 1\r\n\r\n", base_uri),
    )
    .unwrap();
    assert!(opt_resp.starts_with("RTSP/1.0 200 OK"));
    assert!(opt_resp.contains("SETUP"));
    assert!(opt_resp.contains("SET_PARAMETER"));

    let desc_resp = rtsp_request(
        &mut stream,
        &format!(
            "DESCRIBE {} RTSP/1.0\r\nCSeq: 2\r\nAccept: application/sdp\r\n\r\n",
            base_uri
        ),
    )
    .unwrap();
    assert!(desc_resp.starts_with("RTSP/1.0 200 OK"));
    assert!(desc_resp.contains("Content-Type: application/sdp"));
    assert!(desc_resp.contains("m=video"));
    assert!(desc_resp.contains("a=rtpmap:96 H264/90000"));
    assert!(desc_resp.contains("a=control:trackID=0"));

    let setup_uri = format!("{}/trackID=0", base_uri);
    let setup_resp = rtsp_request(
        &mut stream,
        &format!(
            "SETUP {} RTSP/1.0\r\nCSeq: 3\r\nTransport: RTP/AVP;unicast;client_port=5000-5001\r\n\r\n",
            setup_uri
        ),
    )
    .unwrap();
    assert!(setup_resp.starts_with("RTSP/1.0 200 OK"));
    let transport = header_value(&setup_resp, "Transport").expect("Transport header");
    assert!(transport.contains("server_port="));

    let session_id = header_value(&setup_resp, "Session")
        .map(|v| v.split(';').next().unwrap_or(v).trim().to_string())
        .expect("Session header");

    let play_resp = rtsp_request(
        &mut stream,
        &format!(
            "PLAY {} RTSP/1.0\r\nCSeq: 4\r\nSession: {}\r\n\r\n",
            base_uri, session_id
        ),
    )
    .unwrap();
    assert!(play_resp.starts_with("RTSP/1.0 200 OK"));
    assert!(play_resp.contains("RTP-Info:"));

    let keepalive_resp = rtsp_request(
        &mut stream,
        &format!(
            "GET_PARAMETER {} RTSP/1.0\r\nCSeq: 5\r\nSession: {}\r\n\r\n",
            base_uri, session_id
        ),
    )
    .unwrap();
    assert!(keepalive_resp.starts_with("RTSP/1.0 200 OK"));

    let teardown_resp = rtsp_request(
        &mut stream,
        &format!(
            "TEARDOWN {} RTSP/1.0\r\nCSeq: 6\r\nSession: {}\r\n\r\n",
            base_uri, session_id
        ),
    )
    .unwrap();
    assert!(teardown_resp.starts_with("RTSP/1.0 200 OK"));

    let after_teardown = rtsp_request(
        &mut stream,
        &format!(
            "PLAY {} RTSP/1.0\r\nCSeq: 7\r\nSession: {}\r\n\r\n",
            base_uri, session_id
        ),
    )
    .unwrap();
    assert!(after_teardown.starts_with("RTSP/1.0 454"));

    server.stop();
}

/// S5: SETUP negotiating TCP-interleaved transport gets back an
/// `interleaved=` Transport header instead of `client_port`/`server_port`.
#[test]
fn setup_negotiates_tcp_interleaved_transport() {
    const BIND: &str = "127.0.0.1:18555";
    let mut server = Server::new(BIND);
    server.start().expect("server start");
    server.register_stream(StreamConfig::video_only("cam1", "Camera 1"));

    let mut stream = connect(BIND);
    let uri = format!("rtsp://{}/cam1/trackID=0", BIND);

    let setup_resp = rtsp_request(
        &mut stream,
        &format!(
            "SETUP {} RTSP/1.0\r\nCSeq: 1\r\nTransport: RTP/AVP/TCP;unicast;interleaved=0-1\r\n\r\n",
            uri
        ),
    )
    .unwrap();
    assert!(setup_resp.starts_with("RTSP/1.0 200 OK"));
    let transport = header_value(&setup_resp, "Transport").unwrap();
    assert!(transport.contains("interleaved=0-1"));
    assert!(!transport.contains("client_port"));

    server.stop();
}

/// S6: DESCRIBE is challenged with 401 + WWW-Authenticate when credentials
/// are configured, and succeeds once the correct Basic header is supplied.
#[test]
fn describe_requires_basic_auth_when_configured() {
    const BIND: &str = "127.0.0.1:18556";
    let config = ServerConfig {
        username: Some("admin".to_string()),
        password: Some("secret".to_string()),
        ..ServerConfig::default()
    };
    let mut server = Server::with_config(BIND, config);
    server.start().expect("server start");
    server.register_stream(StreamConfig::video_only("cam1", "Camera 1"));

    let mut stream = connect(BIND);
    let uri = format!("rtsp://{}/cam1", BIND);

    let unauth_resp = rtsp_request(
        &mut stream,
        &format!("DESCRIBE {} RTSP/1.0\r\nCSeq: 1\r\n\r\n", uri),
    )
    .unwrap();
    assert!(unauth_resp.starts_with("RTSP/1.0 401"));
    assert!(unauth_resp.contains("WWW-Authenticate: Basic realm=\"motionEye RTSP Server\""));

    let creds = BASE64_STANDARD.encode("admin:secret");
    let auth_resp = rtsp_request(
        &mut stream,
        &format!(
            "DESCRIBE {} RTSP/1.0\r\nCSeq: 2\r\nAuthorization: Basic {}\r\n\r\n",
            uri, creds
        ),
    )
    .unwrap();
    assert!(auth_resp.starts_with("RTSP/1.0 200 OK"));

    server.stop();
}

/// DESCRIBE for a stream_id that was never registered returns 404.
#[test]
fn describe_unknown_stream_returns_404() {
    const BIND: &str = "127.0.0.1:18557";
    let mut server = Server::new(BIND);
    server.start().expect("server start");
    server.register_stream(StreamConfig::video_only("cam1", "Camera 1"));
    server.register_stream(StreamConfig::video_only("cam2", "Camera 2"));

    let mut stream = connect(BIND);
    let uri = format!("rtsp://{}/nope", BIND);
    let resp = rtsp_request(&mut stream, &format!("DESCRIBE {} RTSP/1.0\r\nCSeq: 1\r\n\r\n", uri)).unwrap();
    assert!(resp.starts_with("RTSP/1.0 404"));

    server.stop();
}

/// push_video before any SETUP must not panic — there is simply no one to
/// deliver to yet.
#[test]
fn push_video_with_no_sessions_is_harmless() {
    const BIND: &str = "127.0.0.1:18558";
    let mut server = Server::new(BIND);
    server.start().expect("server start");
    server.register_stream(StreamConfig::video_only("cam1", "Camera 1"));

    let frame = [0, 0, 0, 1, 0x65, 0xAA, 0xBB];
    server.push_video("cam1", &frame).unwrap();

    server.stop();
}

/// SETUP against a single registered stream via a mismatched path falls
/// back to that stream (registry's single-stream-fallback rule), and the
/// session must bind to the resolved canonical stream id so frames pushed
/// through the canonical id still reach it.
#[test]
fn setup_binds_session_to_resolved_stream_id_not_raw_path() {
    const BIND: &str = "127.0.0.1:18559";
    let mut server = Server::new(BIND);
    server.start().expect("server start");
    server.register_stream(StreamConfig::video_only("cam1", "Camera 1"));

    let mut stream = connect(BIND);
    // "mismatch" does not match the registered "cam1", but with exactly one
    // stream registered, resolve_from_uri falls back to it.
    let setup_uri = format!("rtsp://{}/mismatch/trackID=0", BIND);
    let setup_resp = rtsp_request(
        &mut stream,
        &format!(
            "SETUP {} RTSP/1.0\r\nCSeq: 1\r\nTransport: RTP/AVP;unicast;client_port=5000-5001\r\n\r\n",
            setup_uri
        ),
    )
    .unwrap();
    assert!(setup_resp.starts_with("RTSP/1.0 200 OK"));
    let session_id = header_value(&setup_resp, "Session")
        .map(|v| v.split(';').next().unwrap_or(v).trim().to_string())
        .expect("Session header");

    let play_resp = rtsp_request(
        &mut stream,
        &format!(
            "PLAY {} RTSP/1.0\r\nCSeq: 2\r\nSession: {}\r\n\r\n",
            setup_uri, session_id
        ),
    )
    .unwrap();
    assert!(play_resp.starts_with("RTSP/1.0 200 OK"));

    // Pushed via the canonical stream id ("cam1"), not the client's raw path.
    let frame = [0, 0, 0, 1, 0x65, 0xAA, 0xBB];
    server.push_video("cam1", &frame).unwrap();

    server.stop();
}

/// SETUP carrying a Session header that names an unknown/expired session
/// must be rejected with 454, not silently given a fresh session.
#[test]
fn setup_with_stale_session_header_returns_454() {
    const BIND: &str = "127.0.0.1:18560";
    let mut server = Server::new(BIND);
    server.start().expect("server start");
    server.register_stream(StreamConfig::video_only("cam1", "Camera 1"));

    let mut stream = connect(BIND);
    let setup_uri = format!("rtsp://{}/cam1/trackID=0", BIND);
    let setup_resp = rtsp_request(
        &mut stream,
        &format!(
            "SETUP {} RTSP/1.0\r\nCSeq: 1\r\nSession: does-not-exist\r\nTransport: RTP/AVP;unicast;client_port=5000-5001\r\n\r\n",
            setup_uri
        ),
    )
    .unwrap();
    assert!(setup_resp.starts_with("RTSP/1.0 454"));

    server.stop();
}
