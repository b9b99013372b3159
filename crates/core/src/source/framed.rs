use std::io::Read;

use crate::error::SourceError;
use crate::protocol::frame::{RECORD_HEADER_LEN, RecordHeader, read_full};

use super::{MediaSource, ReadOutcome};

/// [`MediaSource`] over a stream of length-prefixed frame records.
///
/// Clean EOF on a record boundary is end of stream; EOF inside a record is
/// [`SourceError::TruncatedFrame`]. A record longer than the caller's buffer
/// fails with [`SourceError::BufferTooSmall`] and leaves the stream
/// positioned inside that record, so the error should end the session.
pub struct FramedSource<R> {
    reader: R,
    frames: u64,
}

impl<R: Read> FramedSource<R> {
    pub fn new(reader: R) -> Self {
        Self { reader, frames: 0 }
    }

    /// Frames returned so far.
    pub fn frames(&self) -> u64 {
        self.frames
    }

    pub fn into_inner(self) -> R {
        self.reader
    }
}

impl<R: Read> MediaSource for FramedSource<R> {
    fn read(&mut self, buf: &mut [u8]) -> Result<ReadOutcome, SourceError> {
        let mut raw = [0u8; RECORD_HEADER_LEN];
        match read_full(&mut self.reader, &mut raw)? {
            0 => return Ok(ReadOutcome::EndOfStream),
            RECORD_HEADER_LEN => {}
            got => {
                return Err(SourceError::TruncatedFrame {
                    expected: RECORD_HEADER_LEN,
                    got,
                });
            }
        }

        let header = RecordHeader::decode(raw)?;
        if header.len > buf.len() {
            return Err(SourceError::BufferTooSmall {
                needed: header.len,
                capacity: buf.len(),
            });
        }

        let got = read_full(&mut self.reader, &mut buf[..header.len])?;
        if got < header.len {
            return Err(SourceError::TruncatedFrame {
                expected: header.len,
                got,
            });
        }

        self.frames += 1;
        tracing::trace!(kind = %header.kind, len = header.len, "frame read");
        Ok(ReadOutcome::Frame {
            kind: header.kind,
            len: header.len,
        })
    }
}
