//! Pull-based frame sources.
//!
//! The pipeline never waits for pushed data: it calls
//! [`MediaSource::read`] with a bounded buffer and gets back one whole frame
//! (an SDP banner, one RTP packet, or one RTCP packet) or end of stream.
//!
//! - [`FramedSource`]: length-prefixed frame records over any [`std::io::Read`]
//!   (a streaming RPC body, a socket, or a dump file).
//! - [`ControlFilter`]: wraps a source so that RTCP is skipped and any SDP
//!   after the first frame is a protocol violation.
//! - [`ArchiveSource`]: replays a recorded session stored as a tar archive of
//!   `.sdp` and `.rtp` entries.

pub mod archive;
pub mod filter;
pub mod framed;

pub use archive::ArchiveSource;
pub use filter::ControlFilter;
pub use framed::FramedSource;

use crate::error::SourceError;
use crate::protocol::FrameKind;

/// Outcome of one [`MediaSource::read`] call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReadOutcome {
    /// A frame of `len` bytes now occupies the start of the buffer.
    Frame { kind: FrameKind, len: usize },
    /// No further frames will arrive. Not an error.
    EndOfStream,
}

/// A supplier of upload frames.
///
/// Implementations may block until a frame is available; no timeout is
/// applied at this layer. A frame that does not fit in `buf` fails with
/// [`SourceError::BufferTooSmall`] instead of being truncated, and nothing
/// is ever written past `buf.len()`.
pub trait MediaSource {
    fn read(&mut self, buf: &mut [u8]) -> Result<ReadOutcome, SourceError>;
}

impl<S: MediaSource + ?Sized> MediaSource for &mut S {
    fn read(&mut self, buf: &mut [u8]) -> Result<ReadOutcome, SourceError> {
        (**self).read(buf)
    }
}

impl<S: MediaSource + ?Sized> MediaSource for Box<S> {
    fn read(&mut self, buf: &mut [u8]) -> Result<ReadOutcome, SourceError> {
        (**self).read(buf)
    }
}
