//! Stream registry: published camera streams and their codec metadata.
//!
//! A [`StreamConfig`] describes one published camera (`stream_id`, codecs,
//! payload types) and caches the most recently observed SPS/PPS so that
//! DESCRIBE can advertise `sprop-parameter-sets` and new IDR frames can be
//! prefixed with in-band parameter sets. The [`StreamRegistry`] is the
//! map from `stream_id` to `StreamConfig`, with the same single-default
//! fallback behavior the original mount lookup provided — disabled once a
//! second stream is registered, since at that point routing must be exact.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;

use base64::prelude::{BASE64_STANDARD, Engine as _};
use parking_lot::RwLock;

use crate::media::audio::AudioCodec;

pub const DEFAULT_STREAM_ID: &str = "stream";

/// Video payload type used for all H.264 streams (dynamic range, RFC 3551 §6).
pub const VIDEO_PAYLOAD_TYPE: u8 = 96;

/// Static/dynamic config describing one published camera stream.
pub struct StreamConfig {
    stream_id: String,
    name: String,
    has_video: bool,
    audio_codec: Option<AudioCodec>,
    audio_payload_type: u8,
    audio_clock_rate: u32,
    sps_pps: RwLock<Option<(Vec<u8>, Vec<u8>)>>,
    last_video_tick: RwLock<Option<Instant>>,
    last_audio_tick: RwLock<Option<Instant>>,
}

impl StreamConfig {
    /// Video-only stream (the common case for a camera with no mic/ALSA input).
    pub fn video_only(stream_id: &str, name: &str) -> Self {
        Self {
            stream_id: stream_id.to_string(),
            name: name.to_string(),
            has_video: true,
            audio_codec: None,
            audio_payload_type: 0,
            audio_clock_rate: 0,
            sps_pps: RwLock::new(None),
            last_video_tick: RwLock::new(None),
            last_audio_tick: RwLock::new(None),
        }
    }

    /// Stream with video plus an audio track using the given codec.
    pub fn with_audio(
        stream_id: &str,
        name: &str,
        audio_codec: AudioCodec,
        audio_payload_type: u8,
        audio_clock_rate: u32,
    ) -> Self {
        Self {
            stream_id: stream_id.to_string(),
            name: name.to_string(),
            has_video: true,
            audio_codec: Some(audio_codec),
            audio_payload_type,
            audio_clock_rate,
            sps_pps: RwLock::new(None),
            last_video_tick: RwLock::new(None),
            last_audio_tick: RwLock::new(None),
        }
    }

    pub fn stream_id(&self) -> &str {
        &self.stream_id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn has_video(&self) -> bool {
        self.has_video
    }

    pub fn has_audio(&self) -> bool {
        self.audio_codec.is_some()
    }

    pub fn audio_codec(&self) -> Option<AudioCodec> {
        self.audio_codec
    }

    pub fn audio_payload_type(&self) -> u8 {
        self.audio_payload_type
    }

    pub fn audio_clock_rate(&self) -> u32 {
        self.audio_clock_rate
    }

    /// Record an SPS/PPS pair observed from the incoming bitstream
    /// (Annex-B form, start code stripped).
    pub fn set_parameter_sets(&self, sps: Vec<u8>, pps: Vec<u8>) {
        *self.sps_pps.write() = Some((sps, pps));
    }

    /// The cached `(sps, pps)` pair, if one has been observed yet.
    pub fn parameter_sets(&self) -> Option<(Vec<u8>, Vec<u8>)> {
        self.sps_pps.read().clone()
    }

    /// `sprop-parameter-sets` value for the `a=fmtp` line, base64 of the raw
    /// NAL bodies (no start code), comma-separated SPS then PPS.
    pub fn sprop_parameter_sets(&self) -> Option<String> {
        self.parameter_sets()
            .map(|(sps, pps)| format!("{},{}", BASE64_STANDARD.encode(sps), BASE64_STANDARD.encode(pps)))
    }

    /// Derive `profile-level-id` from the cached SPS (RFC 6184 §8.1 — bytes
    /// 1..4 are profile_idc, constraint flags, level_idc).
    pub fn profile_level_id(&self) -> Option<String> {
        let guard = self.sps_pps.read();
        let (sps, _) = guard.as_ref()?;
        if sps.len() < 4 {
            return None;
        }
        Some(format!("{:02x}{:02x}{:02x}", sps[1], sps[2], sps[3]))
    }

    /// RTP timestamp increment since the previous video push, paced by
    /// live wall-clock time at the 90 kHz H.264 clock rate. Zero on the
    /// very first call, since there is no prior frame to measure against.
    pub fn video_timestamp_increment(&self) -> u32 {
        elapsed_ticks(&self.last_video_tick, 90_000)
    }

    /// RTP timestamp increment since the previous audio push, at the
    /// stream's configured audio clock rate.
    pub fn audio_timestamp_increment(&self) -> u32 {
        elapsed_ticks(&self.last_audio_tick, self.audio_clock_rate)
    }
}

fn elapsed_ticks(tick: &RwLock<Option<Instant>>, clock_rate: u32) -> u32 {
    let now = Instant::now();
    let mut guard = tick.write();
    let increment = match *guard {
        Some(prev) => (now.duration_since(prev).as_secs_f64() * clock_rate as f64) as u32,
        None => 0,
    };
    *guard = Some(now);
    increment
}

/// Registry of published streams, keyed by `stream_id` (the first URL path
/// segment, e.g. `cam1` in `rtsp://host:8554/cam1`).
#[derive(Clone)]
pub struct StreamRegistry {
    streams: Arc<RwLock<HashMap<String, Arc<StreamConfig>>>>,
}

impl StreamRegistry {
    pub fn new() -> Self {
        Self {
            streams: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    /// Register (or replace) a stream.
    pub fn register(&self, config: StreamConfig) -> Arc<StreamConfig> {
        let stream_id = config.stream_id.clone();
        let config = Arc::new(config);
        self.streams.write().insert(stream_id.clone(), config.clone());
        tracing::info!(stream_id, "stream registered");
        config
    }

    /// Remove a stream from the registry.
    pub fn unregister(&self, stream_id: &str) -> Option<Arc<StreamConfig>> {
        let removed = self.streams.write().remove(stream_id);
        if removed.is_some() {
            tracing::info!(stream_id, "stream unregistered");
        }
        removed
    }

    /// Look up a stream by exact id.
    pub fn get(&self, stream_id: &str) -> Option<Arc<StreamConfig>> {
        self.streams.read().get(stream_id).cloned()
    }

    pub fn len(&self) -> usize {
        self.streams.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// List of all registered stream ids.
    pub fn stream_ids(&self) -> Vec<String> {
        self.streams.read().keys().cloned().collect()
    }

    /// Resolve a stream from an RTSP request URI.
    ///
    /// Tries an exact match on the first path segment. Falls back to the
    /// single registered stream only when exactly one is registered —
    /// with two or more streams, routing must always be exact (§9).
    pub fn resolve_from_uri(&self, uri: &str) -> Option<Arc<StreamConfig>> {
        let id = stream_id_from_uri(uri);
        if let Some(cfg) = self.get(id) {
            return Some(cfg);
        }

        let streams = self.streams.read();
        if streams.len() == 1 {
            return streams.values().next().cloned();
        }
        None
    }
}

impl Default for StreamRegistry {
    fn default() -> Self {
        Self::new()
    }
}

/// Extract the `stream_id` (first path segment) and, if present, the
/// numeric `trackID` from an RTSP request URI.
///
/// - `rtsp://host:8554/cam1` → (`cam1`, None)
/// - `rtsp://host:8554/cam1/trackID=0` → (`cam1`, Some(0))
/// - `*` or a bare `rtsp://host:8554` → (`stream`, None) — the default id
pub fn parse_stream_uri(uri: &str) -> (&str, Option<u8>) {
    let path = if let Some(after) = uri
        .strip_prefix("rtsp://")
        .or_else(|| uri.strip_prefix("rtsps://"))
    {
        match after.find('/') {
            Some(slash) => &after[slash + 1..],
            None => return (DEFAULT_STREAM_ID, None),
        }
    } else if let Some(stripped) = uri.strip_prefix('/') {
        stripped
    } else {
        return (DEFAULT_STREAM_ID, None);
    };

    if path.is_empty() {
        return (DEFAULT_STREAM_ID, None);
    }

    match path.find("/trackID=") {
        Some(pos) => {
            let stream_id = &path[..pos];
            let track = path[pos + "/trackID=".len()..].parse::<u8>().ok();
            (
                if stream_id.is_empty() {
                    DEFAULT_STREAM_ID
                } else {
                    stream_id
                },
                track,
            )
        }
        None => (path.trim_end_matches('/'), None),
    }
}

/// Convenience wrapper over [`parse_stream_uri`] returning only the id.
pub fn stream_id_from_uri(uri: &str) -> &str {
    parse_stream_uri(uri).0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_bare_stream() {
        assert_eq!(parse_stream_uri("rtsp://localhost:8554/cam1"), ("cam1", None));
    }

    #[test]
    fn parse_stream_with_track() {
        assert_eq!(
            parse_stream_uri("rtsp://localhost:8554/cam1/trackID=1"),
            ("cam1", Some(1))
        );
    }

    #[test]
    fn parse_no_path_defaults() {
        assert_eq!(parse_stream_uri("rtsp://localhost:8554"), (DEFAULT_STREAM_ID, None));
    }

    #[test]
    fn parse_star() {
        assert_eq!(parse_stream_uri("*"), (DEFAULT_STREAM_ID, None));
    }

    #[test]
    fn parse_bare_path() {
        assert_eq!(parse_stream_uri("/camera1"), ("camera1", None));
    }

    #[test]
    fn registry_add_and_get() {
        let registry = StreamRegistry::new();
        registry.register(StreamConfig::video_only("cam1", "Camera 1"));
        assert!(registry.get("cam1").is_some());
        assert!(registry.get("cam2").is_none());
    }

    #[test]
    fn registry_resolve_exact_match() {
        let registry = StreamRegistry::new();
        registry.register(StreamConfig::video_only("cam1", "Camera 1"));
        assert!(
            registry
                .resolve_from_uri("rtsp://localhost:8554/cam1/trackID=0")
                .is_some()
        );
    }

    #[test]
    fn registry_single_stream_fallback() {
        let registry = StreamRegistry::new();
        registry.register(StreamConfig::video_only("cam1", "Camera 1"));
        let resolved = registry
            .resolve_from_uri("rtsp://localhost:8554/anything")
            .unwrap();
        assert_eq!(resolved.stream_id(), "cam1");
    }

    #[test]
    fn registry_fallback_disabled_with_multiple_streams() {
        let registry = StreamRegistry::new();
        registry.register(StreamConfig::video_only("cam1", "Camera 1"));
        registry.register(StreamConfig::video_only("cam2", "Camera 2"));
        assert!(registry.resolve_from_uri("rtsp://localhost:8554/unknown").is_none());
        assert!(registry.resolve_from_uri("rtsp://localhost:8554/cam1").is_some());
    }

    #[test]
    fn sps_pps_cache_and_sdp_derivation() {
        let cfg = StreamConfig::video_only("cam1", "Camera 1");
        assert!(cfg.sprop_parameter_sets().is_none());
        cfg.set_parameter_sets(vec![0x42, 0x00, 0x1e, 0xAA], vec![0xce, 0x38]);
        assert!(cfg.sprop_parameter_sets().is_some());
        assert_eq!(cfg.profile_level_id(), Some("001eaa".to_string()));
    }
}
