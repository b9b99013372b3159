//! Consumers of reconstructed NAL units.
//!
//! The pipeline only relies on [`Sink::on_unit`] and [`Sink::flush`]. What a
//! sink does with the units (encode, store, forward) is its own business.
//!
//! - [`AnnexBWriter`]: writes an Annex B elementary stream to any
//!   [`std::io::Write`].
//! - [`StreamStorage`]: hands out one file-backed writer per
//!   (user, camera) key and refuses concurrent writers for the same key.

pub mod annexb;
pub mod storage;

pub use annexb::AnnexBWriter;
pub use storage::{StorageWriter, StreamStorage};

use crate::media::h264::NalUnit;
use crate::protocol::CodecInfo;
use crate::session::SessionIdentity;

/// Receives the units of one session.
pub trait Sink {
    /// Called once, after the banner is accepted and before the first unit.
    fn on_start(&mut self, _identity: &SessionIdentity, _codec: &CodecInfo) {}

    /// Take one unit. Returning `false` asks the pipeline to stop.
    ///
    /// `unit` borrows the pipeline's read buffer; copy it to keep it.
    fn on_unit(&mut self, unit: NalUnit<'_>) -> bool;

    /// Called exactly once when the source ends cleanly.
    fn flush(&mut self);
}

impl<K: Sink + ?Sized> Sink for &mut K {
    fn on_start(&mut self, identity: &SessionIdentity, codec: &CodecInfo) {
        (**self).on_start(identity, codec)
    }

    fn on_unit(&mut self, unit: NalUnit<'_>) -> bool {
        (**self).on_unit(unit)
    }

    fn flush(&mut self) {
        (**self).flush()
    }
}

impl<K: Sink + ?Sized> Sink for Box<K> {
    fn on_start(&mut self, identity: &SessionIdentity, codec: &CodecInfo) {
        (**self).on_start(identity, codec)
    }

    fn on_unit(&mut self, unit: NalUnit<'_>) -> bool {
        (**self).on_unit(unit)
    }

    fn flush(&mut self) {
        (**self).flush()
    }
}
