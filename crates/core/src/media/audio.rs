//! Audio RTP packetizer: G.711 (PCMU/PCMA) and AAC (`mpeg4-generic`).
//!
//! G.711 is a static payload type with fixed-size frames (RFC 3551 §4.5.14):
//! the codec itself does the framing, so packetization is a straight chunk
//! split at `samples_per_packet` boundaries (160 samples = 20 ms at 8 kHz).
//!
//! AAC uses the `mpeg4-generic` payload format in "high bit-rate" mode
//! (RFC 3640 §3.2.1): one ADTS-less raw AAC frame per RTP packet, prefixed
//! by a 4-byte AU-header section (`AU-headers-length=16` + one 16-bit
//! `AU-size<<3 | AU-Index=0`).

use super::Packetizer;
use super::rtp::RtpHeader;

/// Audio codec carried by an [`AudioPacketizer`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AudioCodec {
    /// G.711 μ-law, static payload type 0, 8 kHz.
    Pcmu,
    /// G.711 A-law, static payload type 8, 8 kHz.
    Pcma,
    /// AAC, `mpeg4-generic` dynamic payload type, configurable clock rate.
    Aac,
}

impl AudioCodec {
    fn static_payload_type(self) -> Option<u8> {
        match self {
            AudioCodec::Pcmu => Some(0),
            AudioCodec::Pcma => Some(8),
            AudioCodec::Aac => None,
        }
    }

    fn rtpmap_name(self) -> &'static str {
        match self {
            AudioCodec::Pcmu => "PCMU",
            AudioCodec::Pcma => "PCMA",
            AudioCodec::Aac => "mpeg4-generic",
        }
    }
}

/// RTP packetizer for mono audio: G.711 CBR framing or AAC `mpeg4-generic`.
#[derive(Debug)]
pub struct AudioPacketizer {
    header: RtpHeader,
    codec: AudioCodec,
    clock_rate: u32,
    /// Samples per RTP packet for G.711 (ignored for AAC, which is one
    /// packet per frame). Default 160 (20 ms @ 8 kHz).
    samples_per_packet: usize,
}

impl AudioPacketizer {
    /// Create a G.711 (PCMU/PCMA) packetizer at 8 kHz.
    pub fn g711(codec: AudioCodec, ssrc: u32) -> Self {
        assert!(matches!(codec, AudioCodec::Pcmu | AudioCodec::Pcma));
        let pt = codec.static_payload_type().unwrap();
        Self {
            header: RtpHeader::new(pt, ssrc),
            codec,
            clock_rate: 8000,
            samples_per_packet: 160,
        }
    }

    /// Create an AAC (`mpeg4-generic`) packetizer with a dynamic payload type.
    pub fn aac(pt: u8, clock_rate: u32, ssrc: u32) -> Self {
        Self {
            header: RtpHeader::new(pt, ssrc),
            codec: AudioCodec::Aac,
            clock_rate,
            samples_per_packet: 0,
        }
    }

    fn packetize_pcm(&mut self, samples: &[u8]) -> Vec<Vec<u8>> {
        let mut packets = Vec::new();
        let mut offset = 0usize;
        let mut first_chunk = true;

        while offset < samples.len() {
            let end = std::cmp::min(offset + self.samples_per_packet, samples.len());
            let chunk = &samples[offset..end];

            // Marker set on the first packet of a talkspurt (RFC 3551 §4.1):
            // here, the first chunk of every packetize() call.
            let hdr = self.header.write(first_chunk);
            self.header.record_sent(chunk.len());
            let mut packet = Vec::with_capacity(12 + chunk.len());
            packet.extend_from_slice(&hdr);
            packet.extend_from_slice(chunk);
            packets.push(packet);

            self.header.advance_timestamp((end - offset) as u32);
            offset = end;
            first_chunk = false;
        }

        packets
    }

    fn packetize_aac_frame(&mut self, frame: &[u8]) -> Vec<Vec<u8>> {
        if frame.is_empty() {
            return Vec::new();
        }

        // AU-headers-length in bits (one 16-bit AU-header = 16 bits), then
        // the AU-header itself: AU-size (13 bits) << 3 | AU-Index (3 bits, 0).
        let au_size = (frame.len() as u16) << 3;

        let mut payload = Vec::with_capacity(4 + frame.len());
        payload.extend_from_slice(&16u16.to_be_bytes());
        payload.extend_from_slice(&au_size.to_be_bytes());
        payload.extend_from_slice(frame);

        // Marker is always set for AAC: one RTP packet carries exactly one
        // complete access unit (RFC 3640 §4.3).
        let hdr = self.header.write(true);
        self.header.record_sent(payload.len());
        let mut packet = Vec::with_capacity(12 + payload.len());
        packet.extend_from_slice(&hdr);
        packet.extend_from_slice(&payload);

        vec![packet]
    }
}

impl Packetizer for AudioPacketizer {
    fn packetize(&mut self, encoded_data: &[u8], timestamp_increment: u32) -> Vec<Vec<u8>> {
        match self.codec {
            AudioCodec::Pcmu | AudioCodec::Pcma => self.packetize_pcm(encoded_data),
            AudioCodec::Aac => {
                let packets = self.packetize_aac_frame(encoded_data);
                self.header.advance_timestamp(timestamp_increment);
                packets
            }
        }
    }

    fn codec_name(&self) -> &'static str {
        self.codec.rtpmap_name()
    }

    fn clock_rate(&self) -> u32 {
        self.clock_rate
    }

    fn payload_type(&self) -> u8 {
        self.header.pt
    }

    fn sdp_attributes(&self) -> Vec<String> {
        let pt = self.payload_type();
        match self.codec {
            AudioCodec::Pcmu | AudioCodec::Pcma => {
                vec![format!(
                    "a=rtpmap:{} {}/{}/1",
                    pt,
                    self.codec_name(),
                    self.clock_rate
                )]
            }
            AudioCodec::Aac => vec![
                format!("a=rtpmap:{} {}/{}/1", pt, self.codec_name(), self.clock_rate),
                format!(
                    "a=fmtp:{} streamtype=5;profile-level-id=1;mode=AAC-hbr;sizelength=13;indexlength=3;indexdeltalength=3",
                    pt
                ),
            ],
        }
    }

    fn next_sequence(&self) -> u16 {
        self.header.sequence()
    }

    fn next_rtp_timestamp(&self) -> u32 {
        self.header.timestamp() as u32
    }

    fn ssrc(&self) -> u32 {
        self.header.ssrc
    }

    fn packet_count(&self) -> u32 {
        self.header.packet_count()
    }

    fn octet_count(&self) -> u32 {
        self.header.octet_count()
    }
}
