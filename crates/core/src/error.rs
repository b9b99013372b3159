//! Error types for the ingestion core.

use std::fmt;

/// Fatal errors that end an ingestion session.
///
/// Variants map to the failure classes of an upload:
///
/// - **Transport**: [`MissingIdentity`](Self::MissingIdentity), required
///   session metadata was not supplied.
/// - **Banner**: [`Banner`](Self::Banner), no SDP banner, a malformed one, or
///   a media frame where the banner was expected.
/// - **Protocol**: [`Protocol`](Self::Protocol), frame ordering or typing
///   violations after the banner.
/// - **Source**: [`Source`](Self::Source), the [`MediaSource`](crate::source::MediaSource)
///   failed.
/// - **Storage**: [`StorageBusy`](Self::StorageBusy), [`Io`](Self::Io).
///
/// Per-packet problems ([`PacketError`], [`NalError`]) never surface here:
/// the pipeline drops the offending frame or unit and keeps going.
#[derive(Debug, thiserror::Error)]
pub enum IngestError {
    /// A required metadata key (`user` or `camera`) was absent or blank.
    #[error("missing session metadata: {0}")]
    MissingIdentity(&'static str),

    /// The SDP banner could not be obtained or understood.
    #[error("banner error: {kind}")]
    Banner { kind: BannerErrorKind },

    /// A frame violated the upload ordering contract.
    #[error("protocol error: {kind}")]
    Protocol { kind: ProtocolErrorKind },

    /// The media source failed.
    #[error("source error: {0}")]
    Source(#[from] SourceError),

    /// Another session already writes to the same (user, camera) key.
    #[error("stream already being stored: {0}")]
    StorageBusy(String),

    /// Underlying file or stream I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl IngestError {
    pub(crate) fn banner(kind: BannerErrorKind) -> Self {
        Self::Banner { kind }
    }

    pub(crate) fn protocol(kind: ProtocolErrorKind) -> Self {
        Self::Protocol { kind }
    }

    /// Transport-neutral status class for this error.
    ///
    /// RPC front-ends translate it to their own status codes.
    pub fn status(&self) -> Status {
        match self {
            Self::MissingIdentity(_) => Status::FailedPrecondition,
            Self::Banner { .. } | Self::Protocol { .. } => Status::Aborted,
            Self::Source(SourceError::UnexpectedSdp | SourceError::UnknownFrameType(_)) => {
                Status::Aborted
            }
            Self::Source(SourceError::BufferTooSmall { .. }) => Status::Aborted,
            Self::Source(_) => Status::Unavailable,
            Self::StorageBusy(_) => Status::AlreadyExists,
            Self::Io(_) => Status::Internal,
        }
    }
}

/// Coarse status class of a fatal [`IngestError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Status {
    FailedPrecondition,
    Aborted,
    AlreadyExists,
    Unavailable,
    Internal,
}

/// Specific kind of banner failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BannerErrorKind {
    /// The source ended before any frame arrived.
    Missing,
    /// The banner was blank or not valid UTF-8.
    Malformed,
    /// The first frame was RTP or RTCP instead of SDP.
    OutOfOrder,
}

impl fmt::Display for BannerErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Missing => write!(f, "no banner received"),
            Self::Malformed => write!(f, "malformed banner"),
            Self::OutOfOrder => write!(f, "banner expected"),
        }
    }
}

/// Specific kind of frame-ordering violation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProtocolErrorKind {
    /// An SDP frame arrived after the session had started.
    UnexpectedSdp,
    /// A frame carried a type tag outside SDP/RTP/RTCP.
    UnknownFrameType(u8),
}

impl fmt::Display for ProtocolErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::UnexpectedSdp => write!(f, "unexpected SDP frame"),
            Self::UnknownFrameType(tag) => write!(f, "unknown frame type {tag}"),
        }
    }
}

/// Errors raised by a [`MediaSource`](crate::source::MediaSource).
#[derive(Debug, thiserror::Error)]
pub enum SourceError {
    /// The next frame does not fit in the caller's buffer.
    #[error("frame of {needed} bytes exceeds buffer capacity {capacity}")]
    BufferTooSmall { needed: usize, capacity: usize },

    /// A frame record carried an unrecognized type tag.
    #[error("unknown frame type tag {0}")]
    UnknownFrameType(u8),

    /// An SDP frame arrived after the banner.
    #[error("unexpected SDP frame after banner")]
    UnexpectedSdp,

    /// The stream ended in the middle of a frame record.
    #[error("truncated frame: expected {expected} bytes, got {got}")]
    TruncatedFrame { expected: usize, got: usize },

    /// Underlying read failure.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Reasons an RTP packet is rejected by [`RtpPacket::parse`](crate::media::rtp::RtpPacket::parse).
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum PacketError {
    /// Fewer than 12 bytes, so not even the fixed header is present.
    #[error("packet too short: {len} bytes")]
    TooShort { len: usize },

    /// Version field is not 2.
    #[error("unsupported RTP version {0}")]
    UnsupportedVersion(u8),

    /// The CSRC list announced by the header runs past the end of the packet.
    #[error("truncated CSRC list: {count} ids announced, {available} bytes available")]
    TruncatedCsrc { count: u8, available: usize },

    /// The header extension runs past the end of the packet.
    #[error("truncated header extension: {needed} bytes needed, {available} available")]
    TruncatedExtension { needed: usize, available: usize },
}

/// Reasons a delimited byte range is not a usable NAL unit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum NalError {
    /// The byte range is empty, so there is no NAL header to decode.
    #[error("empty NAL unit")]
    EmptyUnit,
}

/// Convenience alias for `Result<T, IngestError>`.
pub type Result<T> = std::result::Result<T, IngestError>;
