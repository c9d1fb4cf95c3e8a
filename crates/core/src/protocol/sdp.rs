//! SDP (Session Description Protocol) generation (RFC 4566).
//!
//! Produces the SDP body returned by DESCRIBE responses, in the fixed line
//! order expected by NVR clients probing this server:
//!
//! ```text
//! v=0
//! o=<user> <sess-id> <sess-ver> IN IP4 <addr>
//! s=<session-name>
//! i=<server_name> Stream
//! c=IN IP4 <addr>
//! t=0 0
//! a=tool:rtsp-rs
//! a=type:broadcast
//! a=control:*
//! a=range:npt=0-
//! m=video 0 RTP/AVP 96
//! b=AS:2000
//! a=rtpmap:96 H264/90000
//! a=fmtp:96 packetization-mode=1[;profile-level-id=...][;sprop-parameter-sets=...]
//! a=control:trackID=0
//! [m=audio 0 RTP/AVP <pt> ...
//! b=AS:128
//! ...]
//! ```
//!
//! `b=AS` bandwidth lines follow each `m=` line (2000 kbps video, 128 kbps
//! audio), matching NVR clients' expectations for a bandwidth hint. Session/
//! origin fields come from [`ServerConfig`](crate::ServerConfig); the `i=`
//! line identifies the server, not the individual stream.

use crate::media::audio::AudioCodec;
use crate::registry::{StreamConfig, VIDEO_PAYLOAD_TYPE};
use crate::session::{AUDIO_TRACK_ID, VIDEO_TRACK_ID};

/// Generate an SDP session description for the given stream.
pub fn generate_sdp(
    stream: &StreamConfig,
    ip: &str,
    session_id: &str,
    session_version: &str,
    username: &str,
    session_name: &str,
    server_name: &str,
) -> String {
    let mut sdp: Vec<String> = Vec::new();

    sdp.push("v=0".to_string());
    sdp.push(format!(
        "o={} {} {} IN IP4 {}",
        username, session_id, session_version, ip
    ));
    sdp.push(format!("s={}", session_name));
    sdp.push(format!("i={} Stream", server_name));
    sdp.push(format!("c=IN IP4 {}", ip));
    sdp.push("t=0 0".to_string());
    sdp.push("a=tool:rtsp-rs".to_string());
    sdp.push("a=type:broadcast".to_string());
    sdp.push("a=control:*".to_string());
    sdp.push("a=range:npt=0-".to_string());

    if stream.has_video() {
        sdp.push(format!("m=video 0 RTP/AVP {}", VIDEO_PAYLOAD_TYPE));
        sdp.push("b=AS:2000".to_string());
        sdp.push(format!("a=rtpmap:{} H264/90000", VIDEO_PAYLOAD_TYPE));
        sdp.push(format!("a=fmtp:{} {}", VIDEO_PAYLOAD_TYPE, video_fmtp_params(stream)));
        sdp.push(format!("a=control:trackID={}", VIDEO_TRACK_ID));
    }

    if let Some(codec) = stream.audio_codec() {
        let pt = stream.audio_payload_type();
        let rate = stream.audio_clock_rate();
        sdp.push(format!("m=audio 0 RTP/AVP {}", pt));
        sdp.push("b=AS:128".to_string());
        sdp.push(format!("a=rtpmap:{} {}/{}/1", pt, audio_rtpmap_name(codec), rate));
        if let Some(fmtp) = audio_fmtp(codec, pt) {
            sdp.push(fmtp);
        }
        sdp.push(format!("a=control:trackID={}", AUDIO_TRACK_ID));
    }

    tracing::debug!("SDP: {}", sdp.join("\r\n"));

    format!("{}\r\n", sdp.join("\r\n"))
}

fn video_fmtp_params(stream: &StreamConfig) -> String {
    let mut fmtp = "packetization-mode=1".to_string();
    if let Some(pl) = stream.profile_level_id() {
        fmtp.push_str(&format!(";profile-level-id={}", pl));
    }
    if let Some(sprop) = stream.sprop_parameter_sets() {
        fmtp.push_str(&format!(";sprop-parameter-sets={}", sprop));
    }
    fmtp
}

fn audio_rtpmap_name(codec: AudioCodec) -> &'static str {
    match codec {
        AudioCodec::Pcmu => "PCMU",
        AudioCodec::Pcma => "PCMA",
        AudioCodec::Aac => "mpeg4-generic",
    }
}

fn audio_fmtp(codec: AudioCodec, pt: u8) -> Option<String> {
    match codec {
        AudioCodec::Pcmu | AudioCodec::Pcma => None,
        AudioCodec::Aac => Some(format!(
            "a=fmtp:{} streamtype=5;profile-level-id=1;mode=AAC-hbr;sizelength=13;indexlength=3;indexdeltalength=3",
            pt
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn generates_h264_sdp_in_fixed_order() {
        let stream = StreamConfig::video_only("cam1", "Camera 1");
        let sdp = generate_sdp(
            &stream,
            "192.168.1.100",
            "1234567890",
            "1",
            "-",
            "Test Session",
            "rtsp-rs",
        );

        assert!(sdp.starts_with("v=0\r\n"));
        assert!(sdp.contains("o=- 1234567890 1 IN IP4 192.168.1.100\r\n"));
        assert!(sdp.contains("s=Test Session\r\n"));
        assert!(sdp.contains("i=rtsp-rs Stream\r\n"));
        assert!(sdp.contains("c=IN IP4 192.168.1.100\r\n"));
        assert!(sdp.contains("a=tool:rtsp-rs\r\n"));
        assert!(sdp.contains("a=type:broadcast\r\n"));
        assert!(sdp.contains("a=control:*\r\n"));
        assert!(sdp.contains("a=range:npt=0-\r\n"));
        assert!(sdp.contains("b=AS:2000\r\n"));
        assert!(sdp.contains("a=rtpmap:96 H264/90000\r\n"));
        assert!(sdp.contains("a=fmtp:96 packetization-mode=1\r\n"));
        assert!(sdp.contains("a=control:trackID=0\r\n"));

        let bandwidth_idx = sdp.find("b=AS:2000").unwrap();
        let rtpmap_idx = sdp.find("a=rtpmap").unwrap();
        let fmtp_idx = sdp.find("a=fmtp").unwrap();
        let m_idx = sdp.find("m=video").unwrap();
        assert!(m_idx < bandwidth_idx, "b=AS follows its m= line");
        assert!(bandwidth_idx < rtpmap_idx, "b=AS precedes rtpmap");
        assert!(rtpmap_idx < fmtp_idx, "rtpmap must precede fmtp");

        let range_idx = sdp.find("a=range").unwrap();
        assert!(range_idx < m_idx, "session-level attrs precede m= line");
        assert!(sdp.ends_with("\r\n"));
    }

    #[test]
    fn sps_pps_present_adds_sprop_parameter_sets() {
        let stream = StreamConfig::video_only("cam1", "Camera 1");
        stream.set_parameter_sets(vec![0x67, 0x42, 0x00, 0x1e], vec![0x68, 0xce]);
        let sdp = generate_sdp(&stream, "10.0.0.1", "1", "1", "-", "S", "rtsp-rs");
        assert!(sdp.contains("sprop-parameter-sets="));
        assert!(sdp.contains("profile-level-id=42001e"));
    }

    #[test]
    fn audio_track_adds_second_media_block() {
        let stream = StreamConfig::with_audio("cam1", "Camera 1", AudioCodec::Pcmu, 0, 8000);
        let sdp = generate_sdp(&stream, "10.0.0.1", "1", "1", "-", "S", "rtsp-rs");
        assert!(sdp.contains("m=audio 0 RTP/AVP 0\r\n"));
        assert!(sdp.contains("b=AS:128\r\n"));
        assert!(sdp.contains("a=rtpmap:0 PCMU/8000/1\r\n"));
        assert!(sdp.contains("a=control:trackID=1\r\n"));
    }

    #[test]
    fn aac_audio_includes_fmtp() {
        let stream = StreamConfig::with_audio("cam1", "Camera 1", AudioCodec::Aac, 97, 44100);
        let sdp = generate_sdp(&stream, "10.0.0.1", "1", "1", "-", "S", "rtsp-rs");
        assert!(sdp.contains("a=rtpmap:97 mpeg4-generic/44100/1\r\n"));
        assert!(sdp.contains("mode=AAC-hbr"));
    }
}
