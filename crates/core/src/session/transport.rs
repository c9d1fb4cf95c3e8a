//! Per-track transport negotiation (RFC 2326 §12.39) and delivery.
//!
//! A session's `Transport` header is parsed into a generic attribute map
//! (semicolon-separated `key=value` pairs or bare flags, with the leading
//! `RTP/AVP[/TCP]` token recognized specially as the protocol). From that,
//! [`ChannelTransport`] picks one of the two supported delivery modes:
//! UDP (one kernel socket pair bound per channel) or TCP-interleaved
//! (RTP/RTCP multiplexed onto the RTSP connection with `$` framing).

use std::collections::HashMap;
use std::net::{SocketAddr, UdpSocket};

use crate::error::{RtspError, Result};

/// Parsed form of an RTSP `Transport` header (RFC 2326 §12.39).
///
/// The leading token (e.g. `RTP/AVP` or `RTP/AVP/TCP`) is captured as
/// `protocol`; every other semicolon-separated token is either a bare flag
/// (`unicast`) or a `key=value` pair, stored verbatim.
#[derive(Debug, Clone)]
pub struct TransportHeader {
    pub protocol: String,
    params: HashMap<String, String>,
    flags: Vec<String>,
}

impl TransportHeader {
    /// Parse a `Transport` header value. Returns `None` if the header is
    /// empty or carries no protocol token.
    pub fn parse(header: &str) -> Option<Self> {
        let mut parts = header.split(';').map(str::trim);
        let protocol = parts.next()?.to_string();
        if protocol.is_empty() {
            return None;
        }

        let mut params = HashMap::new();
        let mut flags = Vec::new();
        for part in parts {
            if part.is_empty() {
                continue;
            }
            match part.split_once('=') {
                Some((k, v)) => {
                    params.insert(k.to_string(), v.to_string());
                }
                None => flags.push(part.to_string()),
            }
        }

        Some(Self {
            protocol,
            params,
            flags,
        })
    }

    pub fn is_tcp(&self) -> bool {
        self.protocol.eq_ignore_ascii_case("RTP/AVP/TCP") || self.params.contains_key("interleaved")
    }

    pub fn has_flag(&self, flag: &str) -> bool {
        self.flags.iter().any(|f| f.eq_ignore_ascii_case(flag))
    }

    fn port_pair(&self, key: &str) -> Option<(u16, u16)> {
        let value = self.params.get(key)?;
        let (a, b) = value.split_once('-')?;
        Some((a.parse().ok()?, b.parse().ok()?))
    }

    pub fn client_ports(&self) -> Option<(u16, u16)> {
        self.port_pair("client_port")
    }

    pub fn interleaved_channels(&self) -> Option<(u8, u8)> {
        let (a, b) = self.port_pair("interleaved")?;
        Some((a as u8, b as u8))
    }
}

/// Negotiated delivery mechanism for one [`RTPChannel`].
#[derive(Debug)]
pub enum ChannelTransport {
    Udp {
        client_addr: SocketAddr,
        client_rtp_port: u16,
        client_rtcp_port: u16,
        server_rtp_port: u16,
        server_rtcp_port: u16,
        rtp_socket: UdpSocket,
        rtcp_socket: UdpSocket,
    },
    Tcp { rtp_channel: u8, rtcp_channel: u8 },
}

impl ChannelTransport {
    /// Bind a fresh UDP RTP/RTCP socket pair for a client and negotiate the
    /// transport. Per RFC 3550 §11, RTCP conventionally rides the next port
    /// after RTP, but bound ports are whatever the kernel hands back —
    /// clients only see the advertised `server_port` pair.
    pub fn bind_udp(client_ip: std::net::IpAddr, client_rtp_port: u16, client_rtcp_port: u16) -> Result<Self> {
        let bind_addr = if client_ip.is_ipv4() { "0.0.0.0:0" } else { "[::]:0" };
        let rtp_socket = UdpSocket::bind(bind_addr)?;
        let rtcp_socket = UdpSocket::bind(bind_addr)?;
        let server_rtp_port = rtp_socket.local_addr()?.port();
        let server_rtcp_port = rtcp_socket.local_addr()?.port();

        Ok(ChannelTransport::Udp {
            client_addr: SocketAddr::new(client_ip, client_rtp_port),
            client_rtp_port,
            client_rtcp_port,
            server_rtp_port,
            server_rtcp_port,
            rtp_socket,
            rtcp_socket,
        })
    }

    pub fn from_tcp(rtp_channel: u8, rtcp_channel: u8) -> Self {
        ChannelTransport::Tcp {
            rtp_channel,
            rtcp_channel,
        }
    }

    /// The `Transport:` response header value echoed to the client.
    pub fn response_header(&self) -> String {
        match self {
            ChannelTransport::Udp {
                client_rtp_port,
                client_rtcp_port,
                server_rtp_port,
                server_rtcp_port,
                ..
            } => format!(
                "RTP/AVP;unicast;client_port={}-{};server_port={}-{}",
                client_rtp_port, client_rtcp_port, server_rtp_port, server_rtcp_port
            ),
            ChannelTransport::Tcp {
                rtp_channel,
                rtcp_channel,
            } => format!(
                "RTP/AVP/TCP;unicast;interleaved={}-{}",
                rtp_channel, rtcp_channel
            ),
        }
    }

    pub fn send_rtp(&self, payload: &[u8]) -> Result<()> {
        match self {
            ChannelTransport::Udp {
                rtp_socket,
                client_addr,
                ..
            } => {
                rtp_socket.send_to(payload, client_addr)?;
                Ok(())
            }
            ChannelTransport::Tcp { .. } => Err(RtspError::TransportNotConfigured(
                "TCP channel writes go through the session's interleaved writer".into(),
            )),
        }
    }

    pub fn send_rtcp(&self, payload: &[u8]) -> Result<()> {
        match self {
            ChannelTransport::Udp {
                rtcp_socket,
                client_addr,
                client_rtcp_port,
                ..
            } => {
                let addr = SocketAddr::new(client_addr.ip(), *client_rtcp_port);
                rtcp_socket.send_to(payload, addr)?;
                Ok(())
            }
            ChannelTransport::Tcp { .. } => Err(RtspError::TransportNotConfigured(
                "TCP channel writes go through the session's interleaved writer".into(),
            )),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_udp_transport() {
        let th = TransportHeader::parse("RTP/AVP;unicast;client_port=5000-5001").unwrap();
        assert_eq!(th.client_ports(), Some((5000, 5001)));
        assert!(!th.is_tcp());
        assert!(th.has_flag("unicast"));
    }

    #[test]
    fn parse_tcp_interleaved_transport() {
        let th = TransportHeader::parse("RTP/AVP/TCP;unicast;interleaved=0-1").unwrap();
        assert!(th.is_tcp());
        assert_eq!(th.interleaved_channels(), Some((0, 1)));
    }

    #[test]
    fn parse_empty_header_is_none() {
        assert!(TransportHeader::parse("").is_none());
    }

    #[test]
    fn parse_missing_client_port() {
        let th = TransportHeader::parse("RTP/AVP;unicast").unwrap();
        assert!(th.client_ports().is_none());
    }

    #[test]
    fn bind_udp_allocates_distinct_ports() {
        let t = ChannelTransport::bind_udp("127.0.0.1".parse().unwrap(), 50000, 50001).unwrap();
        match t {
            ChannelTransport::Udp {
                server_rtp_port,
                server_rtcp_port,
                ..
            } => assert_ne!(server_rtp_port, server_rtcp_port),
            _ => panic!("expected UDP transport"),
        }
    }

    #[test]
    fn tcp_response_header_format() {
        let t = ChannelTransport::from_tcp(0, 1);
        assert_eq!(t.response_header(), "RTP/AVP/TCP;unicast;interleaved=0-1");
    }
}
