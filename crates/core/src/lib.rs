//! # rtsp — RTSP server library for live media streaming
//!
//! A Rust library for publishing live H.264 video (with optional G.711/AAC
//! audio) over the Real-Time Streaming Protocol (RTSP).
//!
//! ## Protocol references
//!
//! | RFC | Topic | How this crate uses it |
//! |-----|-------|----------------------|
//! | [RFC 2326](https://tools.ietf.org/html/rfc2326) | RTSP 1.0 | Request/response parsing, session lifecycle, transport negotiation |
//! | [RFC 3550](https://tools.ietf.org/html/rfc3550) | RTP | Packet header format, SSRC generation, sequence/timestamp semantics |
//! | [RFC 4566](https://tools.ietf.org/html/rfc4566) | SDP | Session description generation for DESCRIBE responses |
//! | [RFC 6184](https://tools.ietf.org/html/rfc6184) | H.264 RTP payload | NAL unit packetization, FU-A fragmentation, SDP fmtp attributes |
//! | [RFC 3640](https://tools.ietf.org/html/rfc3640) | AAC RTP payload | `mpeg4-generic` hbr mode AU-header framing |
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────┐
//! │  Adapters (source pipeline / CLI)         │
//! ├──────────────────────────────────────────┤
//! │  Server        — public API, orchestrator│
//! │  StreamRegistry — published streams      │
//! ├──────────────────────────────────────────┤
//! │  Protocol      — RTSP parsing, SDP, etc. │
//! │  Session       — state machine, transport│
//! ├──────────────────────────────────────────┤
//! │  Transport     — TCP signaling, UDP data │
//! │  Media         — RTP header, packetizers │
//! └──────────────────────────────────────────┘
//! ```
//!
//! ## Quick start
//!
//! ```no_run
//! use rtsp::{Server, StreamConfig};
//!
//! let mut server = Server::new("0.0.0.0:8554");
//! server.start().unwrap();
//!
//! server.register_stream(StreamConfig::video_only("cam1", "Camera 1"));
//! // Push H.264 Annex B access units — the server packetizes and delivers via RTP.
//! // server.push_video("cam1", &h264_access_unit).unwrap();
//! ```
//!
//! ## Crate layout
//!
//! - [`server`] — High-level [`Server`] orchestrator and [`ServerConfig`].
//! - [`registry`] — [`StreamConfig`] (published stream) and [`StreamRegistry`].
//! - [`protocol`] — RTSP request/response parsing, method handling, SDP generation.
//! - [`session`] — RTSP session state machine and transport negotiation.
//! - [`transport`] — TCP listener for RTSP signaling, UDP sender for RTP delivery.
//! - [`media`] — [`Packetizer`] trait, RTP header builder, codec implementations.
//! - [`error`] — [`RtspError`] enum and [`Result`] alias.

pub mod error;
pub mod media;
pub mod protocol;
pub mod registry;
pub mod server;
pub mod session;
pub mod transport;

pub use error::{Result, RtspError};
pub use media::Packetizer;
pub use registry::{DEFAULT_STREAM_ID, StreamConfig, StreamRegistry};
pub use server::{Server, ServerConfig, ServerStatus};
