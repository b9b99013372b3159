use crate::error::SourceError;
use crate::protocol::FrameKind;

use super::{MediaSource, ReadOutcome};

/// Hides control traffic from the consumer of an upload stream.
///
/// The first frame passes through untouched (it is expected to be the
/// banner). After that, RTCP frames are skipped by reading again, and an
/// SDP frame fails with [`SourceError::UnexpectedSdp`] rather than being
/// retried.
pub struct ControlFilter<S> {
    inner: S,
    started: bool,
    rtcp_skipped: u64,
}

impl<S: MediaSource> ControlFilter<S> {
    pub fn new(inner: S) -> Self {
        Self {
            inner,
            started: false,
            rtcp_skipped: 0,
        }
    }

    pub fn rtcp_skipped(&self) -> u64 {
        self.rtcp_skipped
    }

    pub fn into_inner(self) -> S {
        self.inner
    }
}

impl<S: MediaSource> MediaSource for ControlFilter<S> {
    fn read(&mut self, buf: &mut [u8]) -> Result<ReadOutcome, SourceError> {
        loop {
            let outcome = self.inner.read(buf)?;
            let ReadOutcome::Frame { kind, len } = outcome else {
                return Ok(outcome);
            };

            if !self.started {
                self.started = true;
                return Ok(outcome);
            }

            match kind {
                FrameKind::Rtp => return Ok(outcome),
                FrameKind::Rtcp => {
                    self.rtcp_skipped += 1;
                    tracing::trace!(len, "RTCP frame skipped");
                }
                FrameKind::Sdp => {
                    tracing::warn!(len, "SDP frame after banner");
                    return Err(SourceError::UnexpectedSdp);
                }
            }
        }
    }
}
