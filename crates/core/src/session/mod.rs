//! RTSP session management (RFS 2326 §3, §12.37).
//!
//! An RTSP session is a server-side state object created at the first
//! SETUP and destroyed by TEARDOWN or idle timeout. It owns up to two
//! [`transport::RTPChannel`]s (track 0 video, track 1 audio), each with
//! its own packetizer instance — sequence numbers, timestamps, and SSRC
//! are never shared between sessions, even when they watch the same
//! stream.
//!
//! ## Session lifecycle (§4.8)
//!
//! ```text
//! SETUP          -> Ready     (from Init)
//! PLAY           -> Playing   (from Ready or Playing)
//! PAUSE          -> Ready     (from Playing)
//! TEARDOWN       -> (removed)
//! idle > timeout -> (removed)
//! ```

pub mod transport;

use std::collections::HashMap;
use std::net::TcpStream;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};

use parking_lot::{Mutex, RwLock};

use crate::error::{Result, RtspError};
use crate::media::rtcp;
use crate::media::Packetizer;
pub use transport::{ChannelTransport, TransportHeader};

static SESSION_COUNTER: AtomicU64 = AtomicU64::new(1);

/// Default session timeout in seconds (RFC 2326 §12.37).
pub const DEFAULT_SESSION_TIMEOUT_SECS: u64 = 60;

/// Track index convention: video is always track 0, audio always track 1.
pub const VIDEO_TRACK_ID: u8 = 0;
pub const AUDIO_TRACK_ID: u8 = 1;

/// RTSP session state machine (§4.8).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// No track has been set up yet.
    Init,
    /// At least one track is set up, not yet playing.
    Ready,
    /// Media is being delivered.
    Playing,
}

/// One negotiated RTP/RTCP track within a session.
pub struct RTPChannel {
    pub track_id: u8,
    pub transport: ChannelTransport,
    pub packetizer: Mutex<Box<dyn Packetizer>>,
}

/// A single RTSP client session (RFC 2326 §3).
pub struct Session {
    pub id: String,
    /// The stream_id bound at the first SETUP; a session is bound to at
    /// most one stream for its whole lifetime.
    stream_id: RwLock<Option<String>>,
    state: RwLock<SessionState>,
    channels: RwLock<HashMap<u8, RTPChannel>>,
    /// Shared TCP writer for interleaved delivery, set when any channel
    /// negotiates TCP transport. Wrapped so RTP/RTCP/RTSP writes never tear.
    tcp_writer: RwLock<Option<Arc<Mutex<TcpStream>>>>,
    last_activity: RwLock<Instant>,
    pub timeout_secs: u64,
}

impl Session {
    pub fn new() -> Self {
        let id = SESSION_COUNTER.fetch_add(1, Ordering::SeqCst);
        Session {
            id: format!("{:016X}", id),
            stream_id: RwLock::new(None),
            state: RwLock::new(SessionState::Init),
            channels: RwLock::new(HashMap::new()),
            tcp_writer: RwLock::new(None),
            last_activity: RwLock::new(Instant::now()),
            timeout_secs: DEFAULT_SESSION_TIMEOUT_SECS,
        }
    }

    pub fn bind_stream(&self, stream_id: &str) {
        let mut bound = self.stream_id.write();
        if bound.is_none() {
            *bound = Some(stream_id.to_string());
        }
    }

    pub fn stream_id(&self) -> Option<String> {
        self.stream_id.read().clone()
    }

    pub fn set_state(&self, state: SessionState) {
        tracing::debug!(session_id = %self.id, old_state = ?*self.state.read(), new_state = ?state, "state transition");
        *self.state.write() = state;
    }

    pub fn get_state(&self) -> SessionState {
        *self.state.read()
    }

    pub fn is_playing(&self) -> bool {
        self.get_state() == SessionState::Playing
    }

    /// Format the `Session` response header value (RFC 2326 §12.37).
    pub fn session_header_value(&self) -> String {
        format!("{};timeout={}", self.id, self.timeout_secs)
    }

    /// Record inbound activity (any successful request), resetting the
    /// idle timer.
    pub fn touch(&self) {
        *self.last_activity.write() = Instant::now();
    }

    pub fn is_expired(&self) -> bool {
        self.last_activity.read().elapsed() > Duration::from_secs(self.timeout_secs)
    }

    pub fn set_tcp_writer(&self, writer: Arc<Mutex<TcpStream>>) {
        *self.tcp_writer.write() = Some(writer);
    }

    pub fn add_channel(&self, channel: RTPChannel) {
        self.channels.write().insert(channel.track_id, channel);
    }

    pub fn has_channel(&self, track_id: u8) -> bool {
        self.channels.read().contains_key(&track_id)
    }

    pub fn has_any_channel(&self) -> bool {
        !self.channels.read().is_empty()
    }

    pub fn channel_transport_summary(&self, track_id: u8) -> Option<String> {
        self.channels
            .read()
            .get(&track_id)
            .map(|c| c.transport.response_header())
    }

    pub fn next_sequence(&self, track_id: u8) -> Option<u16> {
        self.channels
            .read()
            .get(&track_id)
            .map(|c| c.packetizer.lock().next_sequence())
    }

    pub fn next_rtp_timestamp(&self, track_id: u8) -> Option<u32> {
        self.channels
            .read()
            .get(&track_id)
            .map(|c| c.packetizer.lock().next_rtp_timestamp())
    }

    /// Packetize `data` through the given track's packetizer and deliver
    /// every resulting RTP packet over that track's transport.
    fn send_on_track(&self, track_id: u8, data: &[u8], timestamp_increment: u32) -> Result<()> {
        let channels = self.channels.read();
        let channel = match channels.get(&track_id) {
            Some(c) => c,
            None => return Ok(()),
        };

        let packets = channel.packetizer.lock().packetize(data, timestamp_increment);
        for packet in packets {
            self.deliver(channel, &packet)?;
        }
        Ok(())
    }

    fn deliver(&self, channel: &RTPChannel, payload: &[u8]) -> Result<()> {
        match &channel.transport {
            ChannelTransport::Udp { .. } => channel.transport.send_rtp(payload),
            ChannelTransport::Tcp { rtp_channel, .. } => self.write_interleaved(*rtp_channel, payload),
        }
    }

    fn write_interleaved(&self, channel_id: u8, payload: &[u8]) -> Result<()> {
        use std::io::Write;

        let writer = self.tcp_writer.read();
        let writer = match writer.as_ref() {
            Some(w) => w,
            None => {
                return Err(RtspError::TransportNotConfigured(
                    "no interleaved TCP writer bound".into(),
                ));
            }
        };

        let mut frame = Vec::with_capacity(4 + payload.len());
        frame.push(0x24); // '$'
        frame.push(channel_id);
        frame.extend_from_slice(&(payload.len() as u16).to_be_bytes());
        frame.extend_from_slice(payload);

        let mut stream = writer.lock();
        stream.write_all(&frame)?;
        Ok(())
    }

    /// Push a video access unit (Annex-B NAL bytes, possibly with SPS/PPS
    /// already prepended by the caller) to the video track.
    pub fn send_video_frame(&self, annexb: &[u8], timestamp_increment: u32) -> Result<()> {
        self.send_on_track(VIDEO_TRACK_ID, annexb, timestamp_increment)
    }

    /// Push audio samples (raw PCM chunk, or one AAC frame) to the audio track.
    pub fn send_audio_samples(&self, samples: &[u8], timestamp_increment: u32) -> Result<()> {
        self.send_on_track(AUDIO_TRACK_ID, samples, timestamp_increment)
    }

    /// Synthesize one access unit containing SPS then PPS and push it to
    /// the video track — used right after PLAY so a new client has decoder
    /// parameters even if the next IDR is seconds away (§4.9).
    pub fn send_parameter_sets(&self, sps: &[u8], pps: &[u8]) -> Result<()> {
        let mut annexb = Vec::with_capacity(8 + sps.len() + pps.len());
        annexb.extend_from_slice(&[0, 0, 0, 1]);
        annexb.extend_from_slice(sps);
        annexb.extend_from_slice(&[0, 0, 0, 1]);
        annexb.extend_from_slice(pps);
        self.send_on_track(VIDEO_TRACK_ID, &annexb, 0)
    }

    fn deliver_rtcp(&self, channel: &RTPChannel, payload: &[u8]) -> Result<()> {
        match &channel.transport {
            ChannelTransport::Udp { .. } => channel.transport.send_rtcp(payload),
            ChannelTransport::Tcp { rtcp_channel, .. } => self.write_interleaved(*rtcp_channel, payload),
        }
    }

    /// Emit a Sender Report + SDES/CNAME on every active channel (§4.5 —
    /// at least once per 5 s per channel). Called by the periodic RTCP
    /// task for every playing session.
    pub fn send_rtcp_reports(&self, cname: &str) {
        let now = SystemTime::now().duration_since(UNIX_EPOCH).unwrap_or_default();
        let ntp = rtcp::ntp_timestamp(now.as_secs(), now.subsec_nanos());

        let channels = self.channels.read();
        for channel in channels.values() {
            let (ssrc, rtp_ts, packets, octets) = {
                let pz = channel.packetizer.lock();
                (pz.ssrc(), pz.next_rtp_timestamp(), pz.packet_count(), pz.octet_count())
            };
            let sr = rtcp::build_sender_report(ssrc, ntp, rtp_ts, packets, octets);
            let sdes = rtcp::build_sdes(ssrc, cname);
            if let Err(e) = self.deliver_rtcp(channel, &sr) {
                tracing::debug!(session_id = %self.id, error = %e, "RTCP SR delivery failed");
            }
            if let Err(e) = self.deliver_rtcp(channel, &sdes) {
                tracing::debug!(session_id = %self.id, error = %e, "RTCP SDES delivery failed");
            }
        }
    }

    /// Send a BYE on every active channel (RFC 3550 §6.6), used just
    /// before a session is torn down.
    pub fn send_rtcp_bye(&self) {
        let channels = self.channels.read();
        for channel in channels.values() {
            let ssrc = channel.packetizer.lock().ssrc();
            let bye = rtcp::build_bye(&[ssrc], Some("session ended"));
            if let Err(e) = self.deliver_rtcp(channel, &bye) {
                tracing::debug!(session_id = %self.id, error = %e, "RTCP BYE delivery failed");
            }
        }
    }
}

impl Default for Session {
    fn default() -> Self {
        Self::new()
    }
}

/// Thread-safe registry of active sessions.
#[derive(Clone)]
pub struct SessionManager {
    sessions: Arc<RwLock<HashMap<String, Arc<Session>>>>,
}

impl SessionManager {
    pub fn new() -> Self {
        SessionManager {
            sessions: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    /// Create and register a new session (not yet bound to a stream).
    pub fn create_session(&self) -> Arc<Session> {
        let session = Arc::new(Session::new());
        let id = session.id.clone();
        self.sessions.write().insert(id.clone(), session.clone());
        tracing::debug!(session_id = %id, total_sessions = self.sessions.read().len(), "session created");
        session
    }

    pub fn get_session(&self, id: &str) -> Option<Arc<Session>> {
        self.sessions.read().get(id).cloned()
    }

    pub fn remove_session(&self, id: &str) -> Option<Arc<Session>> {
        let removed = self.sessions.write().remove(id);
        if removed.is_some() {
            tracing::debug!(session_id = %id, total_sessions = self.sessions.read().len(), "session removed");
        }
        removed
    }

    pub fn remove_sessions(&self, ids: &[String]) -> usize {
        let mut sessions = self.sessions.write();
        let mut removed = 0;
        for id in ids {
            if sessions.remove(id).is_some() {
                removed += 1;
            }
        }
        removed
    }

    /// Remove every session whose idle time exceeds its timeout. Called by
    /// the periodic cleanup task (§5).
    pub fn cleanup_expired(&self) -> Vec<String> {
        let expired: Vec<String> = self
            .sessions
            .read()
            .values()
            .filter(|s| s.is_expired())
            .map(|s| s.id.clone())
            .collect();

        if !expired.is_empty() {
            let mut sessions = self.sessions.write();
            for id in &expired {
                sessions.remove(id);
            }
            tracing::info!(count = expired.len(), "expired sessions removed");
        }
        expired
    }

    pub fn get_playing_sessions(&self) -> Vec<Arc<Session>> {
        self.sessions
            .read()
            .values()
            .filter(|s| s.is_playing())
            .cloned()
            .collect()
    }

    /// Push a video access unit to every playing session bound to `stream_id`.
    pub fn broadcast_video(&self, stream_id: &str, annexb: &[u8], timestamp_increment: u32) {
        for session in self.get_playing_sessions() {
            if session.stream_id().as_deref() != Some(stream_id) {
                continue;
            }
            if let Err(e) = session.send_video_frame(annexb, timestamp_increment) {
                tracing::debug!(session_id = %session.id, error = %e, "video broadcast failed for session");
            }
        }
    }

    /// Push audio samples to every playing session bound to `stream_id`.
    pub fn broadcast_audio(&self, stream_id: &str, samples: &[u8], timestamp_increment: u32) {
        for session in self.get_playing_sessions() {
            if session.stream_id().as_deref() != Some(stream_id) {
                continue;
            }
            if let Err(e) = session.send_audio_samples(samples, timestamp_increment) {
                tracing::debug!(session_id = %session.id, error = %e, "audio broadcast failed for session");
            }
        }
    }

    /// Emit RTCP Sender Reports/SDES on every playing session's channels
    /// (§4.5 — at least once per 5 s). Called by the periodic RTCP task.
    pub fn emit_rtcp_reports(&self, cname: &str) {
        for session in self.get_playing_sessions() {
            session.send_rtcp_reports(cname);
        }
    }
}

impl Default for SessionManager {
    fn default() -> Self {
        Self::new()
    }
}
