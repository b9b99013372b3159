//! RTP parsing and H.264 elementary-stream reconstruction.
//!
//! ## RTP overview (RFC 3550)
//!
//! Every uploaded media frame is one RTP packet: a 12-byte fixed header
//! ([`rtp::RtpHeader`]), an optional CSRC list and header extension, then
//! the payload. For H.264 (RFC 6184) the payload carries either a bare NAL
//! unit, an Annex B run of start-code-delimited units, or an RTP-specific
//! aggregation/fragmentation unit.
//!
//! ## Stages
//!
//! | Stage | Module | Input | Output |
//! |-------|--------|-------|--------|
//! | Packet parsing | [`rtp`] | RTP frame bytes | [`rtp::RtpPacket`] view |
//! | NAL extraction | [`h264`] | payload bytes | [`h264::NalUnit`] views |
//! | Depacketization (optional) | [`depacketize`] | STAP-A / FU-A units | complete units |

pub mod depacketize;
pub mod h264;
pub mod rtp;
