use std::fmt;
use std::io::{self, Read, Write};

use crate::error::SourceError;

/// Length of a frame record header: one tag byte and a big-endian `u32` length.
pub const RECORD_HEADER_LEN: usize = 5;

/// What an upload frame carries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FrameKind {
    /// Session description banner (first frame only).
    Sdp,
    /// One RTP packet.
    Rtp,
    /// One RTCP compound packet.
    Rtcp,
}

impl FrameKind {
    /// Wire tag used in frame records.
    pub fn tag(self) -> u8 {
        match self {
            Self::Sdp => 1,
            Self::Rtp => 2,
            Self::Rtcp => 3,
        }
    }

    pub fn from_tag(tag: u8) -> Option<Self> {
        match tag {
            1 => Some(Self::Sdp),
            2 => Some(Self::Rtp),
            3 => Some(Self::Rtcp),
            _ => None,
        }
    }
}

impl fmt::Display for FrameKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Sdp => write!(f, "SDP"),
            Self::Rtp => write!(f, "RTP"),
            Self::Rtcp => write!(f, "RTCP"),
        }
    }
}

/// Header of one frame record.
///
/// ```text
/// +--------+--------+--------+--------+--------+------------------+
/// |  tag   |          length (u32, big-endian)   |  payload ...     |
/// +--------+--------+--------+--------+--------+------------------+
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RecordHeader {
    pub kind: FrameKind,
    pub len: usize,
}

impl RecordHeader {
    pub fn decode(raw: [u8; RECORD_HEADER_LEN]) -> Result<Self, SourceError> {
        let kind = FrameKind::from_tag(raw[0]).ok_or(SourceError::UnknownFrameType(raw[0]))?;
        let len = u32::from_be_bytes([raw[1], raw[2], raw[3], raw[4]]) as usize;
        Ok(Self { kind, len })
    }

    pub fn encode(&self) -> [u8; RECORD_HEADER_LEN] {
        let mut raw = [0u8; RECORD_HEADER_LEN];
        raw[0] = self.kind.tag();
        raw[1..].copy_from_slice(&(self.len as u32).to_be_bytes());
        raw
    }
}

/// Append one frame record to `writer`.
pub fn write_frame<W: Write>(writer: &mut W, kind: FrameKind, payload: &[u8]) -> io::Result<()> {
    if payload.len() > u32::MAX as usize {
        return Err(io::Error::new(
            io::ErrorKind::InvalidInput,
            "frame larger than u32::MAX bytes",
        ));
    }
    let header = RecordHeader {
        kind,
        len: payload.len(),
    };
    writer.write_all(&header.encode())?;
    writer.write_all(payload)
}

/// Read exactly `buf.len()` bytes, returning how many arrived before EOF.
pub(crate) fn read_full<R: Read>(reader: &mut R, buf: &mut [u8]) -> io::Result<usize> {
    let mut filled = 0;
    while filled < buf.len() {
        match reader.read(&mut buf[filled..]) {
            Ok(0) => break,
            Ok(n) => filled += n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e),
        }
    }
    Ok(filled)
}
