//! RTCP packet construction (RFC 3550 §6).
//!
//! The server is transmit-only: it builds Sender Reports, SDES/CNAME, and
//! BYE packets, and never parses receiver reports coming back from clients
//! (those are framed and discarded by the transport layer).

/// Offset (in seconds) between the NTP epoch (1900-01-01) and the Unix
/// epoch (1970-01-01), per RFC 3550 §4.
const NTP_UNIX_EPOCH_DELTA: u64 = 2_208_988_800;

/// Build the 64-bit NTP timestamp for a given Unix `(seconds, nanos)` pair.
pub fn ntp_timestamp(unix_secs: u64, unix_nanos: u32) -> u64 {
    let ntp_secs = unix_secs + NTP_UNIX_EPOCH_DELTA;
    let frac = ((unix_nanos as u64) << 32) / 1_000_000_000;
    (ntp_secs << 32) | frac
}

fn pad_to_word(buf: &mut Vec<u8>) {
    while buf.len() % 4 != 0 {
        buf.push(0);
    }
}

/// Write the common RTCP header (RFC 3550 §6.4.1): version/padding/count,
/// packet type, and length in 32-bit words minus one.
fn write_header(buf: &mut Vec<u8>, count: u8, packet_type: u8, body_len_words: u16) {
    buf.push((2 << 6) | count);
    buf.push(packet_type);
    buf.extend_from_slice(&body_len_words.to_be_bytes());
}

/// Build a Sender Report packet (PT=200, RFC 3550 §6.4.1).
///
/// `ntp` is the 64-bit NTP timestamp, `rtp_timestamp` is the corresponding
/// RTP timestamp, and `packet_count`/`octet_count` are cumulative since the
/// stream started.
pub fn build_sender_report(
    ssrc: u32,
    ntp: u64,
    rtp_timestamp: u32,
    packet_count: u32,
    octet_count: u32,
) -> Vec<u8> {
    let mut buf = Vec::with_capacity(28);
    // Length is in 32-bit words minus 1; SR body (without the 4-byte
    // common header) is 24 bytes == 6 words, for a total of 7 words.
    write_header(&mut buf, 0, 200, 6);
    buf.extend_from_slice(&ssrc.to_be_bytes());
    buf.extend_from_slice(&ntp.to_be_bytes());
    buf.extend_from_slice(&rtp_timestamp.to_be_bytes());
    buf.extend_from_slice(&packet_count.to_be_bytes());
    buf.extend_from_slice(&octet_count.to_be_bytes());
    buf
}

/// Build an SDES packet with a single CNAME chunk (PT=202, RFC 3550 §6.5).
pub fn build_sdes(ssrc: u32, cname: &str) -> Vec<u8> {
    let mut buf = Vec::with_capacity(16);
    buf.extend_from_slice(&ssrc.to_be_bytes());
    buf.push(1); // SDES item type CNAME
    let cname_bytes = cname.as_bytes();
    buf.push(cname_bytes.len() as u8);
    buf.extend_from_slice(cname_bytes);
    buf.push(0); // item-list terminator
    pad_to_word(&mut buf);

    let mut out = Vec::with_capacity(4 + buf.len());
    let words = (buf.len() / 4) as u16;
    write_header(&mut out, 1, 202, words);
    out.extend_from_slice(&buf);
    out
}

/// Build a BYE packet (PT=203, RFC 3550 §6.6) for one or more SSRCs.
pub fn build_bye(ssrcs: &[u32], reason: Option<&str>) -> Vec<u8> {
    let mut body = Vec::with_capacity(ssrcs.len() * 4 + 8);
    for ssrc in ssrcs {
        body.extend_from_slice(&ssrc.to_be_bytes());
    }
    if let Some(reason) = reason {
        let reason_bytes = reason.as_bytes();
        body.push(reason_bytes.len() as u8);
        body.extend_from_slice(reason_bytes);
    }
    pad_to_word(&mut body);

    let mut out = Vec::with_capacity(4 + body.len());
    let words = (body.len() / 4) as u16;
    write_header(&mut out, ssrcs.len() as u8, 203, words);
    out.extend_from_slice(&body);
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ntp_epoch_delta_applied() {
        let ts = ntp_timestamp(0, 0);
        assert_eq!(ts >> 32, NTP_UNIX_EPOCH_DELTA);
    }

    #[test]
    fn sender_report_header_fields() {
        let sr = build_sender_report(0x1234_5678, ntp_timestamp(1_700_000_000, 0), 90_000, 10, 15000);
        assert_eq!(sr[0] >> 6, 2); // version
        assert_eq!(sr[1], 200); // PT
        let len_words = u16::from_be_bytes([sr[2], sr[3]]);
        assert_eq!(len_words, 6);
        assert_eq!(sr.len(), 4 * (len_words as usize + 1));
        let ssrc = u32::from_be_bytes([sr[4], sr[5], sr[6], sr[7]]);
        assert_eq!(ssrc, 0x1234_5678);
    }

    #[test]
    fn sdes_contains_cname_padded() {
        let pkt = build_sdes(0xAABBCCDD, "cam1");
        assert_eq!(pkt[1], 202);
        assert_eq!(pkt.len() % 4, 0);
        assert!(pkt.windows(4).any(|w| w == b"cam1"));
    }

    #[test]
    fn bye_single_ssrc_no_reason() {
        let pkt = build_bye(&[0x1111_2222], None);
        assert_eq!(pkt[1], 203);
        assert_eq!(pkt[0] & 0x1f, 1); // SC = 1
        assert_eq!(pkt.len() % 4, 0);
    }

    #[test]
    fn bye_with_reason_is_padded() {
        let pkt = build_bye(&[1, 2], Some("done"));
        assert_eq!(pkt[0] & 0x1f, 2); // SC = 2
        assert_eq!(pkt.len() % 4, 0);
    }
}
