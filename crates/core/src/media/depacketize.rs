//! RFC 6184 de-aggregation and de-fragmentation.
//!
//! Optional stage between the NAL extractor and the sink. Non-interleaved
//! mode only:
//!
//! - **STAP-A** (§5.7.1): the payload is split into its contained units,
//!   each preceded on the wire by a 16-bit size.
//! - **FU-A** (§5.8): fragments are accumulated across RTP packets and the
//!   original unit is rebuilt from the FU indicator's F/NRI bits and the FU
//!   header's type.
//!
//! ```text
//! FU indicator:  [F|NRI|Type=28]
//! FU header:     [S|E|R|NAL_Type]
//! ```
//!
//! STAP-B, MTAP16/24 and FU-B only occur in interleaved mode and are passed
//! through unchanged.

use std::borrow::Cow;

use super::h264::{NalUnit, NalUnitType};

const FU_START: u8 = 0x80;
const FU_END: u8 = 0x40;

/// Where a unit came from in the RTP stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PacketPosition {
    pub sequence_number: u16,
    pub timestamp: u32,
}

#[derive(Debug)]
struct Fragment {
    timestamp: u32,
    next_sequence: u16,
    buf: Vec<u8>,
}

/// Counters for input the depacketizer had to throw away.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct DepacketizeStats {
    /// Partial FU-A units abandoned because of a sequence gap, timestamp
    /// change, or an interleaved non-fragment unit.
    pub fragments_dropped: u64,
    /// STAP-A or FU-A payloads too short to hold their own headers.
    pub malformed: u64,
}

/// Reassembles FU-A units and splits STAP-A units.
#[derive(Debug, Default)]
pub struct Depacketizer {
    fragment: Option<Fragment>,
    stats: DepacketizeStats,
}

impl Depacketizer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn stats(&self) -> DepacketizeStats {
        self.stats
    }

    /// Whether an FU-A unit is partially assembled.
    pub fn has_partial(&self) -> bool {
        self.fragment.is_some()
    }

    /// Feed one unit from the packet at `position`.
    ///
    /// Complete units are appended to `out`: borrowed when they are a plain
    /// unit or a STAP-A member, owned when rebuilt from fragments.
    pub fn push<'a>(
        &mut self,
        position: PacketPosition,
        unit: NalUnit<'a>,
        out: &mut Vec<Cow<'a, [u8]>>,
    ) {
        match unit.unit_type() {
            NalUnitType::FuA => self.push_fragment(position, unit.data(), out),
            NalUnitType::StapA => {
                self.abandon_partial("aggregation packet");
                self.split_aggregate(unit.data(), out);
            }
            _ => {
                self.abandon_partial("single unit");
                out.push(Cow::Borrowed(unit.data()));
            }
        }
    }

    fn push_fragment<'a>(
        &mut self,
        position: PacketPosition,
        data: &[u8],
        out: &mut Vec<Cow<'a, [u8]>>,
    ) {
        if data.len() < 2 {
            self.stats.malformed += 1;
            tracing::warn!(len = data.len(), "FU-A payload without FU header");
            self.abandon_partial("malformed fragment");
            return;
        }
        let indicator = data[0];
        let fu_header = data[1];
        let chunk = &data[2..];

        if fu_header & FU_START != 0 {
            self.abandon_partial("new fragment start");
            let mut buf = Vec::with_capacity(chunk.len() + 1);
            buf.push((indicator & 0xE0) | (fu_header & 0x1F));
            buf.extend_from_slice(chunk);
            self.fragment = Some(Fragment {
                timestamp: position.timestamp,
                next_sequence: position.sequence_number.wrapping_add(1),
                buf,
            });
        } else {
            let continues = self.fragment.as_ref().is_some_and(|f| {
                f.timestamp == position.timestamp && f.next_sequence == position.sequence_number
            });
            if !continues {
                self.abandon_partial("fragment discontinuity");
                tracing::trace!(
                    seq = position.sequence_number,
                    ts = position.timestamp,
                    "FU-A continuation without start, dropped"
                );
                return;
            }
            if let Some(fragment) = self.fragment.as_mut() {
                fragment.buf.extend_from_slice(chunk);
                fragment.next_sequence = position.sequence_number.wrapping_add(1);
            }
        }

        if fu_header & FU_END != 0 {
            if let Some(fragment) = self.fragment.take() {
                tracing::trace!(
                    nal_type = fragment.buf[0] & 0x1F,
                    nal_size = fragment.buf.len(),
                    "FU-A unit reassembled"
                );
                out.push(Cow::Owned(fragment.buf));
            }
        }
    }

    fn split_aggregate<'a>(&mut self, data: &'a [u8], out: &mut Vec<Cow<'a, [u8]>>) {
        let mut rest = &data[1..];
        while !rest.is_empty() {
            if rest.len() < 2 {
                self.stats.malformed += 1;
                tracing::warn!(remaining = rest.len(), "STAP-A truncated size field");
                return;
            }
            let size = u16::from_be_bytes([rest[0], rest[1]]) as usize;
            rest = &rest[2..];
            if size == 0 || size > rest.len() {
                self.stats.malformed += 1;
                tracing::warn!(
                    size,
                    remaining = rest.len(),
                    "STAP-A unit size out of range"
                );
                return;
            }
            out.push(Cow::Borrowed(&rest[..size]));
            rest = &rest[size..];
        }
    }

    fn abandon_partial(&mut self, reason: &'static str) {
        if let Some(fragment) = self.fragment.take() {
            self.stats.fragments_dropped += 1;
            tracing::debug!(
                reason,
                partial_bytes = fragment.buf.len(),
                ts = fragment.timestamp,
                "partial FU-A unit dropped"
            );
        }
    }
}
