use std::net::TcpListener;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;
use std::time::Duration;

use crate::error::{Result, RtspError};
use crate::media::h264::H264Packetizer;
use crate::registry::{StreamConfig, StreamRegistry};
use crate::session::{DEFAULT_SESSION_TIMEOUT_SECS, SessionManager};
use crate::transport::tcp;

/// Server-level configuration, mirroring the enumerated config surface of
/// the originating system (`rtsp_enabled`, `rtsp_port`, `rtsp_listen`,
/// `rtsp_username`/`rtsp_password`, `rtsp_audio_enabled`, `rtsp_audio_device`,
/// `rtsp_video_bitrate`, `rtsp_video_preset`, `session_timeout`). Fields that
/// only matter to the encoder/source pipeline (bitrate, preset, audio
/// device) are opaque to this crate and carried purely for `get_status()`.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Public host advertised in SDP `o=` and `c=` lines.
    /// When `None`, host is inferred from request URI/client address.
    pub public_host: Option<String>,
    /// Public RTSP port, advertised via [`Server::stream_url`].
    pub public_port: Option<u16>,
    /// SDP origin username field (`o=<username> ...`).
    pub sdp_username: String,
    /// SDP origin session id field (`o=... <session-id> ...`).
    pub sdp_session_id: String,
    /// SDP origin session version field (`o=... ... <session-version> ...`).
    pub sdp_session_version: String,
    /// SDP session name (`s=`).
    pub sdp_session_name: String,
    /// Server identity advertised in the SDP `i=<server_name> Stream` line,
    /// distinct from any per-stream name used in `s=`.
    pub server_name: String,
    /// HTTP Basic auth username. When both this and `password` are set,
    /// DESCRIBE requires a matching `Authorization` header.
    pub username: Option<String>,
    /// HTTP Basic auth password.
    pub password: Option<String>,
    /// Session idle timeout in seconds (RFC 2326 §12.37).
    pub session_timeout: u64,
    /// Whether the source pipeline is expected to push an audio track.
    pub audio_enabled: bool,
    /// Opaque ALSA device identifier, passed through to the source pipeline.
    pub audio_device: Option<String>,
    /// Opaque encoder bitrate hint (kbps), passed through to the source pipeline.
    pub video_bitrate: Option<u32>,
    /// Opaque encoder preset hint, passed through to the source pipeline.
    pub video_preset: Option<String>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            public_host: None,
            public_port: None,
            sdp_username: "-".to_string(),
            sdp_session_id: "0".to_string(),
            sdp_session_version: "0".to_string(),
            sdp_session_name: "Stream".to_string(),
            server_name: "rtsp-rs".to_string(),
            username: None,
            password: None,
            session_timeout: DEFAULT_SESSION_TIMEOUT_SECS,
            audio_enabled: false,
            audio_device: None,
            video_bitrate: None,
            video_preset: None,
        }
    }
}

/// High-level RTSP server orchestrator.
///
/// Owns the stream registry and session manager, and runs the TCP accept
/// loop and periodic session-cleanup task on background threads. The
/// source pipeline drives streaming through [`register_stream`](Self::register_stream)
/// and [`push_video`](Self::push_video)/[`push_audio`](Self::push_audio).
pub struct Server {
    session_manager: SessionManager,
    registry: StreamRegistry,
    running: Arc<AtomicBool>,
    bind_addr: String,
    config: Arc<ServerConfig>,
}

impl Server {
    pub fn new(bind_addr: &str) -> Self {
        Self::with_config(bind_addr, ServerConfig::default())
    }

    /// Create a server with custom protocol/SDP/auth configuration.
    pub fn with_config(bind_addr: &str, config: ServerConfig) -> Self {
        Self {
            session_manager: SessionManager::new(),
            registry: StreamRegistry::new(),
            running: Arc::new(AtomicBool::new(false)),
            bind_addr: bind_addr.to_string(),
            config: Arc::new(config),
        }
    }

    pub fn start(&mut self) -> Result<()> {
        if self.running.load(Ordering::SeqCst) {
            return Err(RtspError::AlreadyRunning);
        }

        let listener = TcpListener::bind(&self.bind_addr)?;
        listener.set_nonblocking(true)?;

        self.running.store(true, Ordering::SeqCst);

        let running = self.running.clone();
        let session_manager = self.session_manager.clone();
        let registry = self.registry.clone();
        let config = self.config.clone();

        tracing::info!(addr = %self.bind_addr, "RTSP server listening");

        thread::spawn(move || {
            tcp::accept_loop(listener, session_manager, registry, config, running);
        });

        let running = self.running.clone();
        let session_manager = self.session_manager.clone();
        thread::spawn(move || cleanup_loop(session_manager, running));

        let running = self.running.clone();
        let session_manager = self.session_manager.clone();
        let cname = self.config.sdp_username.clone();
        thread::spawn(move || rtcp_loop(session_manager, cname, running));

        Ok(())
    }

    pub fn stop(&mut self) {
        self.running.store(false, Ordering::SeqCst);
        tracing::info!("server stopping");
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// Publish a new stream. Replaces any existing stream with the same id.
    pub fn register_stream(&self, config: StreamConfig) -> Arc<StreamConfig> {
        self.registry.register(config)
    }

    /// Remove a published stream. Existing sessions bound to it keep
    /// running but stop receiving media.
    pub fn unregister_stream(&self, stream_id: &str) {
        self.registry.unregister(stream_id);
    }

    /// Push one H.264 access unit (Annex-B, start code included) for
    /// `stream_id`. SPS/PPS NALs are cached for SDP and in-band IDR
    /// prefixing (§4.10); every IDR is prepended with the cached
    /// parameter sets so decoders never stall on a missing keyframe header.
    pub fn push_video(&self, stream_id: &str, nal_with_start_code: &[u8]) -> Result<()> {
        let stream = self
            .registry
            .get(stream_id)
            .ok_or_else(|| RtspError::StreamNotFound(stream_id.to_string()))?;

        let nals = H264Packetizer::extract_nal_units(nal_with_start_code);
        let had_params_before = stream.parameter_sets().is_some();

        let mut sps = None;
        let mut pps = None;
        let mut has_idr = false;
        for nal in &nals {
            if nal.is_empty() {
                continue;
            }
            match nal[0] & 0x1f {
                7 => sps = Some(nal.clone()),
                8 => pps = Some(nal.clone()),
                5 => has_idr = true,
                _ => {}
            }
        }
        if let (Some(sps), Some(pps)) = (sps, pps) {
            stream.set_parameter_sets(sps, pps);
        }

        if !had_params_before
            && let Some((sps, pps)) = stream.parameter_sets()
        {
            for session in self.session_manager.get_playing_sessions() {
                if session.stream_id().as_deref() == Some(stream_id) {
                    let _ = session.send_parameter_sets(&sps, &pps);
                }
            }
        }

        let payload = if has_idr {
            match stream.parameter_sets() {
                Some((sps, pps)) => {
                    let mut buf = Vec::with_capacity(8 + sps.len() + pps.len() + nal_with_start_code.len());
                    buf.extend_from_slice(&[0, 0, 0, 1]);
                    buf.extend_from_slice(&sps);
                    buf.extend_from_slice(&[0, 0, 0, 1]);
                    buf.extend_from_slice(&pps);
                    buf.extend_from_slice(nal_with_start_code);
                    buf
                }
                None => nal_with_start_code.to_vec(),
            }
        } else {
            nal_with_start_code.to_vec()
        };

        let increment = stream.video_timestamp_increment();
        self.session_manager.broadcast_video(stream_id, &payload, increment);
        Ok(())
    }

    /// Push one audio chunk (PCM samples, or a single AAC frame) for `stream_id`.
    pub fn push_audio(&self, stream_id: &str, samples: &[u8], _is_aac: bool) -> Result<()> {
        let stream = self
            .registry
            .get(stream_id)
            .ok_or_else(|| RtspError::StreamNotFound(stream_id.to_string()))?;

        let increment = stream.audio_timestamp_increment();
        self.session_manager.broadcast_audio(stream_id, samples, increment);
        Ok(())
    }

    /// The `rtsp://host:port/stream_id` URL clients should use to play a stream.
    pub fn stream_url(&self, stream_id: &str) -> String {
        let host = self.config.public_host.clone().unwrap_or_else(|| "0.0.0.0".to_string());
        let port = self.config.public_port.unwrap_or(8554);
        format!("rtsp://{}:{}/{}", host, port, stream_id)
    }

    /// Snapshot of server status for the source pipeline's UI/API layer.
    pub fn get_status(&self) -> ServerStatus {
        ServerStatus {
            running: self.is_running(),
            bind_addr: self.bind_addr.clone(),
            streams: self.registry.stream_ids(),
            session_count: self.session_manager.get_playing_sessions().len(),
        }
    }

    pub fn session_manager(&self) -> &SessionManager {
        &self.session_manager
    }

    pub fn registry(&self) -> &StreamRegistry {
        &self.registry
    }

    /// Returns the server's protocol configuration.
    pub fn config(&self) -> Arc<ServerConfig> {
        self.config.clone()
    }
}

/// Periodically sweeps idle sessions (§5 — every 30 s).
fn cleanup_loop(session_manager: SessionManager, running: Arc<AtomicBool>) {
    while running.load(Ordering::SeqCst) {
        thread::sleep(Duration::from_secs(30));
        if !running.load(Ordering::SeqCst) {
            break;
        }
        session_manager.cleanup_expired();
    }
}

/// Emits RTCP Sender Reports/SDES on every playing session (§4.5 — at
/// least once per 5 s per active channel).
fn rtcp_loop(session_manager: SessionManager, cname: String, running: Arc<AtomicBool>) {
    while running.load(Ordering::SeqCst) {
        thread::sleep(Duration::from_secs(5));
        if !running.load(Ordering::SeqCst) {
            break;
        }
        session_manager.emit_rtcp_reports(&cname);
    }
}

/// Status snapshot returned by [`Server::get_status`].
#[derive(Debug, Clone)]
pub struct ServerStatus {
    pub running: bool,
    pub bind_addr: String,
    pub streams: Vec<String>,
    pub session_count: usize,
}
