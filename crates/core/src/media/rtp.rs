use rand::Rng;

use crate::error::{ParseErrorKind, Result, RtspError};

/// Size in bytes of the fixed RTP header (RFC 3550 §5.1), CSRC list excluded.
pub const RTP_HEADER_SIZE: usize = 12;

/// Generic RTP fixed header builder (RFC 3550 §5.1).
///
/// ```text
///  0                   1                   2                   3
///  0 1 2 3 4 5 6 7 8 9 0 1 2 3 4 5 6 7 8 9 0 1 2 3 4 5 6 7 8 9 0 1
/// +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
/// |V=2|P|X|  CC   |M|     PT      |       Sequence Number         |
/// +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
/// |                           Timestamp                           |
/// +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
/// |                             SSRC                              |
/// +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
/// ```
///
/// This struct is shared by all codec packetizers. It manages:
/// - **Sequence number**: 16-bit, wrapping — incremented on every packet.
/// - **Timestamp**: stored as u64 internally to avoid wrapping arithmetic
///   during duration calculations; the lower 32 bits are written to the wire.
/// - **SSRC**: randomly generated per RFC 3550 §8.1 to avoid collisions.
///
/// Version is always 2. Padding, extension, and CSRC count are always 0.
#[derive(Debug)]
pub struct RtpHeader {
    /// RTP payload type (7-bit, RFC 3551).
    pub pt: u8,
    /// Synchronization source identifier (RFC 3550 §8.1).
    pub ssrc: u32,
    sequence: u16,
    timestamp: u64,
    /// Cumulative packets sent, for RTCP Sender Reports (RFC 3550 §6.4.1).
    packet_count: u32,
    /// Cumulative payload octets sent (header excluded), for Sender Reports.
    octet_count: u32,
}

impl RtpHeader {
    /// Create a new RTP header state with explicit SSRC.
    pub fn new(pt: u8, ssrc: u32) -> Self {
        tracing::debug!(
            pt,
            ssrc = format_args!("{:#010X}", ssrc),
            "RTP header state created"
        );
        Self {
            pt,
            ssrc,
            sequence: rand::rng().random::<u16>(),
            timestamp: rand::rng().random::<u32>() as u64,
            packet_count: 0,
            octet_count: 0,
        }
    }

    /// Create with a random SSRC.
    ///
    /// Per RFC 3550 §8.1, the SSRC should be chosen randomly to minimize
    /// the probability of collisions between independent sessions.
    pub fn with_random_ssrc(pt: u8) -> Self {
        let ssrc = rand::rng().random::<u32>();
        Self::new(pt, ssrc)
    }

    /// Current sequence number (before the next [`write`](Self::write) call).
    pub fn sequence(&self) -> u16 {
        self.sequence
    }

    /// Current timestamp (internal u64 representation).
    pub fn timestamp(&self) -> u64 {
        self.timestamp
    }

    /// Serialize a 12-byte RTP fixed header and advance the sequence number.
    ///
    /// The `marker` bit (RFC 3550 §5.1) signals the last packet of a frame.
    /// For H.264, it is set on the last RTP packet of an access unit
    /// (RFC 6184 §5.1).
    pub fn write(&mut self, marker: bool) -> [u8; 12] {
        let first_byte: u8 = 2 << 6;
        let second_byte: u8 = ((marker as u8) << 7) | self.pt;

        let mut header = [0u8; 12];
        header[0] = first_byte;
        header[1] = second_byte;
        header[2..4].copy_from_slice(&self.sequence.to_be_bytes());
        header[4..8].copy_from_slice(&(self.timestamp as u32).to_be_bytes());
        header[8..12].copy_from_slice(&self.ssrc.to_be_bytes());

        self.sequence = self.sequence.wrapping_add(1);
        header
    }

    /// Advance the RTP timestamp by the given increment.
    ///
    /// For video at 90 kHz clock rate, the increment per frame is
    /// `90000 / fps` (e.g. 3000 for 30 fps, 3600 for 25 fps).
    pub fn advance_timestamp(&mut self, increment: u32) {
        self.timestamp = self.timestamp.wrapping_add(increment as u64);
    }

    /// Record one transmitted packet's payload size for the next Sender Report.
    pub fn record_sent(&mut self, payload_len: usize) {
        self.packet_count = self.packet_count.wrapping_add(1);
        self.octet_count = self.octet_count.wrapping_add(payload_len as u32);
    }

    pub fn packet_count(&self) -> u32 {
        self.packet_count
    }

    pub fn octet_count(&self) -> u32 {
        self.octet_count
    }
}

/// A fully decoded RTP packet (RFC 3550 §5.1), independent of any
/// particular codec's packetizer.
///
/// Unlike [`RtpHeader`], which is a stateful *builder* owned by a
/// packetizer, `RtpPacket` is a plain value type used to parse packets
/// coming back off the wire (e.g. in tests, or if the server ever needs
/// to inspect packets it sent).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RtpPacket {
    pub version: u8,
    pub padding: bool,
    pub extension: bool,
    pub csrc_count: u8,
    pub marker: bool,
    pub payload_type: u8,
    pub sequence: u16,
    pub timestamp: u32,
    pub ssrc: u32,
    pub csrc: Vec<u32>,
    pub payload: Vec<u8>,
}

impl RtpPacket {
    /// Serialize to wire bytes: fixed header, CSRC list, payload.
    pub fn serialize(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(12 + self.csrc.len() * 4 + self.payload.len());

        let byte0 = (self.version << 6)
            | ((self.padding as u8) << 5)
            | ((self.extension as u8) << 4)
            | self.csrc_count;
        let byte1 = ((self.marker as u8) << 7) | self.payload_type;

        out.push(byte0);
        out.push(byte1);
        out.extend_from_slice(&self.sequence.to_be_bytes());
        out.extend_from_slice(&self.timestamp.to_be_bytes());
        out.extend_from_slice(&self.ssrc.to_be_bytes());
        for csrc in &self.csrc {
            out.extend_from_slice(&csrc.to_be_bytes());
        }
        out.extend_from_slice(&self.payload);
        out
    }

    /// Parse a buffer into an `RtpPacket`. Inverts [`serialize`](Self::serialize).
    pub fn parse(buf: &[u8]) -> Result<Self> {
        if buf.len() < 12 {
            return Err(RtspError::Parse {
                kind: ParseErrorKind::InvalidHeader,
            });
        }

        let version = buf[0] >> 6;
        let padding = (buf[0] >> 5) & 0x1 == 1;
        let extension = (buf[0] >> 4) & 0x1 == 1;
        let csrc_count = buf[0] & 0x0f;
        let marker = (buf[1] >> 7) & 0x1 == 1;
        let payload_type = buf[1] & 0x7f;
        let sequence = u16::from_be_bytes([buf[2], buf[3]]);
        let timestamp = u32::from_be_bytes([buf[4], buf[5], buf[6], buf[7]]);
        let ssrc = u32::from_be_bytes([buf[8], buf[9], buf[10], buf[11]]);

        let csrc_bytes = csrc_count as usize * 4;
        if buf.len() < 12 + csrc_bytes {
            return Err(RtspError::Parse {
                kind: ParseErrorKind::InvalidHeader,
            });
        }

        let mut csrc = Vec::with_capacity(csrc_count as usize);
        for i in 0..csrc_count as usize {
            let start = 12 + i * 4;
            csrc.push(u32::from_be_bytes([
                buf[start],
                buf[start + 1],
                buf[start + 2],
                buf[start + 3],
            ]));
        }

        let payload = buf[12 + csrc_bytes..].to_vec();

        Ok(RtpPacket {
            version,
            padding,
            extension,
            csrc_count,
            marker,
            payload_type,
            sequence,
            timestamp,
            ssrc,
            csrc,
            payload,
        })
    }
}
