//! Media codecs and RTP packetization.
//!
//! This module provides the [`Packetizer`] trait and codec-specific
//! implementations that convert raw encoded bitstreams into RTP packets.
//!
//! ## RTP overview (RFC 3550)
//!
//! Each encoded video frame or audio chunk is split into one or more RTP
//! packets. Every RTP packet carries a 12-byte fixed header
//! ([`rtp::RtpHeader`]) containing:
//!
//! - **Sequence number** (16-bit, wrapping) — for reordering and loss detection.
//! - **Timestamp** (32-bit) — media clock, typically 90 kHz for video.
//! - **SSRC** (32-bit) — randomly chosen to identify the sender.
//! - **Marker bit** — set on the last packet of an access unit (frame).
//!
//! [`rtp::RtpPacket`] is the codec-independent wire representation: it
//! parses and serializes a full RTP packet, CSRC list included.
//!
//! ## Supported codecs
//!
//! | Codec | Module | RFC | Status |
//! |-------|--------|-----|--------|
//! | H.264 | [`h264`] | [RFC 6184](https://tools.ietf.org/html/rfc6184) | Implemented |
//! | G.711 (PCMU/PCMA) | [`audio`] | [RFC 3551](https://tools.ietf.org/html/rfc3551) | Implemented |
//! | AAC (`mpeg4-generic`) | [`audio`] | [RFC 3640](https://tools.ietf.org/html/rfc3640) | Implemented |
//!
//! [`rtcp`] builds the Sender Report / SDES / BYE packets the server
//! transmits alongside RTP (RFC 3550 §6).

pub mod audio;
pub mod h264;
pub mod rtcp;
pub mod rtp;

/// Codec-specific RTP packetizer.
///
/// Each supported codec implements this trait, providing:
/// - **Packetization**: splitting encoded data into RTP-sized packets
/// - **SDP attributes**: codec parameters for the DESCRIBE response
/// - **RTP metadata**: payload type, clock rate, sequence/timestamp state
///
/// The generic RTP header is handled by [`rtp::RtpHeader`] — packetizers
/// compose it rather than reimplementing header serialization.
///
/// ## Implementing a new codec
///
/// 1. Create a new module (e.g. `media/aac.rs`)
/// 2. Implement `Packetizer` for your type
/// 3. Construct it per-session in [`crate::protocol::handler::MethodHandler`]
pub trait Packetizer: Send {
    /// Packetize raw encoded data (e.g. Annex B bitstream, PCM chunk, or
    /// AAC frame) into RTP packets.
    ///
    /// Each returned `Vec<u8>` is a complete RTP packet: 12-byte header
    /// (RFC 3550 §5.1) followed by the codec-specific payload.
    ///
    /// `timestamp_increment` advances the RTP timestamp after this access
    /// unit, typically `clock_rate / fps` for video.
    fn packetize(&mut self, encoded_data: &[u8], timestamp_increment: u32) -> Vec<Vec<u8>>;

    /// Codec name for the SDP `a=rtpmap` attribute (e.g. `"H264"`, `"PCMU"`).
    fn codec_name(&self) -> &'static str;

    /// RTP clock rate in Hz.
    fn clock_rate(&self) -> u32;

    /// RTP payload type number (RFC 3551).
    fn payload_type(&self) -> u8;

    /// SDP media-level attribute lines for this codec (no `a=control:` —
    /// that is appended by the caller, which knows the track index).
    fn sdp_attributes(&self) -> Vec<String>;

    /// Current RTP sequence number (for the `RTP-Info` header in PLAY responses).
    fn next_sequence(&self) -> u16;

    /// Current RTP timestamp as u32 (for the `RTP-Info` header in PLAY responses).
    fn next_rtp_timestamp(&self) -> u32;

    /// SSRC identifying this track's stream, for RTCP Sender Reports/SDES/BYE.
    fn ssrc(&self) -> u32;

    /// Cumulative RTP packets sent on this track (RFC 3550 §6.4.1).
    fn packet_count(&self) -> u32;

    /// Cumulative RTP payload octets sent on this track (header excluded).
    fn octet_count(&self) -> u32;
}
