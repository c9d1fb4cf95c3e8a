use std::net::SocketAddr;
use std::sync::Arc;

use base64::prelude::{BASE64_STANDARD, Engine as _};

use crate::media::Packetizer;
use crate::media::audio::{AudioCodec, AudioPacketizer};
use crate::media::h264::H264Packetizer;
use crate::protocol::request::RtspRequest;
use crate::protocol::response::RtspResponse;
use crate::protocol::sdp;
use crate::registry::{StreamRegistry, parse_stream_uri};
use crate::server::ServerConfig;
use crate::session::{AUDIO_TRACK_ID, ChannelTransport, RTPChannel, SessionManager, SessionState, TransportHeader, VIDEO_TRACK_ID};

/// Handles RTSP method requests for a single TCP connection.
///
/// Tracks which sessions were created on this connection so they
/// can be cleaned up when the connection drops.
pub struct MethodHandler {
    session_manager: SessionManager,
    registry: StreamRegistry,
    client_addr: SocketAddr,
    config: Arc<ServerConfig>,
    /// Session IDs created during this connection, for cleanup on disconnect.
    session_ids: Vec<String>,
}

impl MethodHandler {
    pub fn new(
        session_manager: SessionManager,
        client_addr: SocketAddr,
        registry: StreamRegistry,
        config: Arc<ServerConfig>,
    ) -> Self {
        MethodHandler {
            session_manager,
            registry,
            client_addr,
            config,
            session_ids: Vec::new(),
        }
    }

    /// Returns session IDs owned by this connection (for cleanup on disconnect).
    pub fn session_ids(&self) -> &[String] {
        &self.session_ids
    }

    pub fn handle(&mut self, request: &RtspRequest) -> RtspResponse {
        let cseq = request.cseq().unwrap_or("0");

        let response = match request.method.as_str() {
            "OPTIONS" => self.handle_options(cseq),
            "DESCRIBE" => self.handle_describe(cseq, request),
            "SETUP" => self.handle_setup(cseq, request),
            "PLAY" => self.handle_play(cseq, request),
            "PAUSE" => self.handle_pause(cseq, request),
            "TEARDOWN" => self.handle_teardown(cseq, request),
            "GET_PARAMETER" => self.handle_get_parameter(cseq, request),
            "SET_PARAMETER" => self.handle_set_parameter(cseq, request),
            _ => {
                tracing::warn!(method = %request.method, %cseq, "unsupported RTSP method");
                RtspResponse::method_not_allowed().add_header("CSeq", cseq)
            }
        };

        if let Some(session) = self.extract_session_id(request).and_then(|id| self.session_manager.get_session(&id)) {
            session.touch();
        }

        response
    }

    fn handle_options(&self, cseq: &str) -> RtspResponse {
        tracing::debug!(%cseq, "OPTIONS");
        RtspResponse::ok().add_header("CSeq", cseq).add_header(
            "Public",
            "OPTIONS, DESCRIBE, SETUP, PLAY, PAUSE, TEARDOWN, GET_PARAMETER, SET_PARAMETER",
        )
    }

    /// Parses host from an RTSP URI (e.g. rtsp://host:8554/path -> host). Falls back to client IP if invalid.
    fn host_from_uri_or_client(&self, uri: &str) -> String {
        if let Some(host) = &self.config.public_host {
            return host.clone();
        }

        if let Some(after_scheme) = uri
            .strip_prefix("rtsp://")
            .or_else(|| uri.strip_prefix("rtsps://"))
        {
            let host = after_scheme
                .split('/')
                .next()
                .and_then(|host_port| host_port.split(':').next())
                .unwrap_or("")
                .trim();
            if !host.is_empty() {
                return host.to_string();
            }
        }
        self.client_addr.ip().to_string()
    }

    /// Validate the `Authorization: Basic <b64(user:pass)>` header against
    /// the configured credentials. Returns `true` when auth is disabled or
    /// the credentials match.
    fn check_auth(&self, request: &RtspRequest) -> bool {
        let (expected_user, expected_pass) = match (&self.config.username, &self.config.password) {
            (Some(u), Some(p)) => (u, p),
            _ => return true,
        };

        let header = match request.get_header("Authorization") {
            Some(h) => h,
            None => return false,
        };

        let encoded = match header.strip_prefix("Basic ") {
            Some(rest) => rest.trim(),
            None => return false,
        };

        let decoded = match BASE64_STANDARD.decode(encoded) {
            Ok(bytes) => bytes,
            Err(_) => return false,
        };

        let decoded = match String::from_utf8(decoded) {
            Ok(s) => s,
            Err(_) => return false,
        };

        match decoded.split_once(':') {
            Some((user, pass)) => user == expected_user && pass == expected_pass,
            None => false,
        }
    }

    fn handle_describe(&self, cseq: &str, request: &RtspRequest) -> RtspResponse {
        let uri = &request.uri;
        tracing::debug!(%cseq, uri, "DESCRIBE");

        if !self.check_auth(request) {
            tracing::warn!(uri, "DESCRIBE unauthorized");
            return RtspResponse::unauthorized().add_header("CSeq", cseq);
        }

        let stream = match self.registry.resolve_from_uri(uri) {
            Some(s) => s,
            None => {
                tracing::warn!(uri, "DESCRIBE for unknown stream");
                return RtspResponse::not_found().add_header("CSeq", cseq);
            }
        };

        let host = self.host_from_uri_or_client(uri);
        let sdp_body = sdp::generate_sdp(
            &stream,
            &host,
            &self.config.sdp_session_id,
            &self.config.sdp_session_version,
            &self.config.sdp_username,
            &self.config.sdp_session_name,
            &self.config.server_name,
        );

        RtspResponse::ok()
            .add_header("CSeq", cseq)
            .add_header("Content-Type", "application/sdp")
            .add_header("Content-Base", &format!("{}/", uri.trim_end_matches('/')))
            .with_body(sdp_body)
    }

    fn handle_setup(&mut self, cseq: &str, request: &RtspRequest) -> RtspResponse {
        let (stream_id, track_id) = parse_stream_uri(&request.uri);

        let stream = match self.registry.resolve_from_uri(&request.uri) {
            Some(s) => s,
            None => {
                tracing::warn!(uri = %request.uri, "SETUP for unknown stream");
                return RtspResponse::not_found().add_header("CSeq", cseq);
            }
        };

        let track_id = track_id.unwrap_or(VIDEO_TRACK_ID);

        let transport_header = match request.get_header("Transport") {
            Some(t) => t,
            None => {
                tracing::warn!(%cseq, "SETUP missing Transport header");
                return RtspResponse::bad_request().add_header("CSeq", cseq);
            }
        };

        let client_transport = match TransportHeader::parse(transport_header) {
            Some(t) => t,
            None => {
                tracing::warn!(%cseq, transport_header, "SETUP invalid Transport header");
                return RtspResponse::bad_request().add_header("CSeq", cseq);
            }
        };

        let session = match self.extract_session_id(request) {
            Some(id) => match self.session_manager.get_session(&id) {
                Some(existing) => existing,
                None => {
                    tracing::warn!(session_id = id, "SETUP for unknown/expired session");
                    return RtspResponse::session_not_found().add_header("CSeq", cseq);
                }
            },
            None => {
                let created = self.session_manager.create_session();
                self.session_ids.push(created.id.clone());
                created
            }
        };

        let channel_transport = if client_transport.is_tcp() {
            match client_transport.interleaved_channels() {
                Some((rtp_ch, rtcp_ch)) => ChannelTransport::from_tcp(rtp_ch, rtcp_ch),
                None => {
                    tracing::warn!(%cseq, "SETUP TCP transport missing interleaved channels");
                    return RtspResponse::bad_request().add_header("CSeq", cseq);
                }
            }
        } else {
            let (client_rtp_port, client_rtcp_port) = match client_transport.client_ports() {
                Some(ports) => ports,
                None => {
                    tracing::warn!(%cseq, "SETUP UDP transport missing client_port");
                    return RtspResponse::bad_request().add_header("CSeq", cseq);
                }
            };
            match ChannelTransport::bind_udp(self.client_addr.ip(), client_rtp_port, client_rtcp_port) {
                Ok(t) => t,
                Err(e) => {
                    tracing::error!(error = %e, "failed to bind UDP transport");
                    return RtspResponse::internal_error().add_header("CSeq", cseq);
                }
            }
        };

        let packetizer: Box<dyn Packetizer> = if track_id == AUDIO_TRACK_ID && stream.has_audio() {
            match stream.audio_codec().unwrap() {
                AudioCodec::Aac => Box::new(AudioPacketizer::aac(
                    stream.audio_payload_type(),
                    stream.audio_clock_rate(),
                    rand::random(),
                )),
                codec => Box::new(AudioPacketizer::g711(codec, rand::random())),
            }
        } else {
            Box::new(H264Packetizer::with_random_ssrc(crate::registry::VIDEO_PAYLOAD_TYPE))
        };

        let response_header = channel_transport.response_header();

        session.bind_stream(stream.stream_id());
        session.add_channel(RTPChannel {
            track_id,
            transport: channel_transport,
            packetizer: parking_lot::Mutex::new(packetizer),
        });
        if session.get_state() == SessionState::Init {
            session.set_state(SessionState::Ready);
        }

        tracing::info!(
            session_id = %session.id,
            stream_id,
            track_id,
            uri = %request.uri,
            "session track configured via SETUP"
        );

        RtspResponse::ok()
            .add_header("CSeq", cseq)
            .add_header("Transport", &response_header)
            .add_header("Session", &session.session_header_value())
    }

    fn handle_play(&mut self, cseq: &str, request: &RtspRequest) -> RtspResponse {
        let session_id = match self.extract_session_id(request) {
            Some(id) => id,
            None => {
                tracing::warn!(%cseq, "PLAY missing Session header");
                return RtspResponse::session_not_found().add_header("CSeq", cseq);
            }
        };

        let session = match self.session_manager.get_session(&session_id) {
            Some(s) => s,
            None => {
                tracing::warn!(session_id, "PLAY for unknown session");
                return RtspResponse::session_not_found().add_header("CSeq", cseq);
            }
        };

        if !session.has_any_channel() {
            tracing::warn!(session_id, "PLAY before any SETUP");
            return RtspResponse::new(455, "Method Not Valid In This State").add_header("CSeq", cseq);
        }

        session.set_state(SessionState::Playing);
        tracing::info!(session_id, "session started playing");

        let mut rtp_info_parts = Vec::new();
        for track_id in [VIDEO_TRACK_ID, AUDIO_TRACK_ID] {
            if let (Some(seq), Some(ts)) = (session.next_sequence(track_id), session.next_rtp_timestamp(track_id)) {
                rtp_info_parts.push(format!(
                    "url={}/trackID={};seq={};rtptime={}",
                    request.uri.trim_end_matches('/'),
                    track_id,
                    seq,
                    ts
                ));
            }
        }

        let mut resp = RtspResponse::ok()
            .add_header("CSeq", cseq)
            .add_header("Session", &session.session_header_value())
            .add_header("Range", "npt=0.000-");

        if !rtp_info_parts.is_empty() {
            resp = resp.add_header("RTP-Info", &rtp_info_parts.join(","));
        }

        if let Some(stream_id) = session.stream_id()
            && let Some(stream) = self.registry.get(&stream_id)
            && let Some((sps, pps)) = stream.parameter_sets()
            && let Err(e) = session.send_parameter_sets(&sps, &pps)
        {
            tracing::debug!(session_id, error = %e, "failed to push parameter sets on PLAY");
        }

        resp
    }

    fn handle_pause(&mut self, cseq: &str, request: &RtspRequest) -> RtspResponse {
        let session_id = match self.extract_session_id(request) {
            Some(id) => id,
            None => {
                tracing::warn!(%cseq, "PAUSE missing Session header");
                return RtspResponse::session_not_found().add_header("CSeq", cseq);
            }
        };

        match self.session_manager.get_session(&session_id) {
            Some(session) => {
                session.set_state(SessionState::Ready);
                tracing::info!(session_id, "session paused");
                RtspResponse::ok()
                    .add_header("CSeq", cseq)
                    .add_header("Session", &session.session_header_value())
            }
            None => {
                tracing::warn!(session_id, "PAUSE for unknown session");
                RtspResponse::session_not_found().add_header("CSeq", cseq)
            }
        }
    }

    fn handle_teardown(&mut self, cseq: &str, request: &RtspRequest) -> RtspResponse {
        let session_id = match self.extract_session_id(request) {
            Some(id) => id,
            None => {
                tracing::warn!(%cseq, "TEARDOWN missing Session header");
                return RtspResponse::session_not_found().add_header("CSeq", cseq);
            }
        };

        match self.session_manager.remove_session(&session_id) {
            Some(session) => {
                session.send_rtcp_bye();
                self.session_ids.retain(|id| id != &session_id);
                tracing::info!(session_id, "session terminated via TEARDOWN");
                RtspResponse::ok().add_header("CSeq", cseq)
            }
            None => {
                tracing::warn!(session_id, "TEARDOWN for unknown session");
                RtspResponse::session_not_found().add_header("CSeq", cseq)
            }
        }
    }

    /// GET_PARAMETER is used by clients (e.g. VLC) as a keepalive (RFC 2326 §10.8).
    fn handle_get_parameter(&self, cseq: &str, request: &RtspRequest) -> RtspResponse {
        tracing::trace!(%cseq, "GET_PARAMETER keepalive");

        let mut resp = RtspResponse::ok().add_header("CSeq", cseq);

        if let Some(id) = self.extract_session_id(request)
            && self.session_manager.get_session(&id).is_some()
        {
            resp = resp.add_header("Session", &id);
        }

        resp
    }

    /// SET_PARAMETER has no server-defined parameters; accepted as a no-op
    /// (RFC 2326 §10.9), mirroring how most RTSP servers treat it.
    fn handle_set_parameter(&self, cseq: &str, request: &RtspRequest) -> RtspResponse {
        tracing::trace!(%cseq, body_len = request.body.len(), "SET_PARAMETER");

        let mut resp = RtspResponse::ok().add_header("CSeq", cseq);

        if let Some(id) = self.extract_session_id(request)
            && self.session_manager.get_session(&id).is_some()
        {
            resp = resp.add_header("Session", &id);
        }

        resp
    }

    /// Extract session ID from the Session header.
    /// Handles timeout suffix: "SESSIONID;timeout=60" -> "SESSIONID"
    fn extract_session_id(&self, request: &RtspRequest) -> Option<String> {
        request
            .get_header("Session")
            .map(|s| s.split(';').next().unwrap_or(s).trim().to_string())
    }
}
