//! Upload session protocol.
//!
//! An upload is a sequence of typed frames:
//!
//! ```text
//! SDP  "v=0\r\n..."          ← exactly once, first
//! RTP  [12-byte header|...]  ← media
//! RTCP [...]                 ← control, discarded
//! RTP  ...
//! ```
//!
//! Session identity (user, camera) travels out-of-band in transport
//! metadata; see [`crate::session::SessionIdentity`].
//!
//! - [`frame`]: frame kinds and the length-prefixed record layout used by
//!   stream dumps and the framed source.
//! - [`sdp`]: codec identification from the banner.

pub mod frame;
pub mod sdp;

pub use frame::FrameKind;
pub use sdp::{Codec, CodecInfo};
