//! Network transport layer for RTSP signaling and RTP media delivery.
//!
//! RTSP uses a split transport model:
//!
//! - **TCP** ([`tcp`]): carries RTSP request/response signaling, one
//!   connection per client with a thread per connection. A client may also
//!   negotiate TCP-interleaved delivery (RFC 2326 §10.12), in which case
//!   RTP/RTCP packets are multiplexed onto this same socket with `$`
//!   framing — see [`crate::session::Session::write_interleaved`].
//!
//! - **UDP**: per-channel RTP/RTCP socket pairs bound during SETUP, see
//!   [`crate::session::ChannelTransport`].

pub mod tcp;
