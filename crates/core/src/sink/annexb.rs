use std::io::{self, Write};

use crate::media::h264::{NalUnit, START_CODE};
use crate::protocol::CodecInfo;
use crate::session::SessionIdentity;

use super::Sink;

/// Writes units as an Annex B byte stream.
///
/// Each unit is emitted behind a 4-byte start code. Parameter sets carried
/// out of band in the banner (`sprop-parameter-sets`) are written first so
/// the output decodes on its own.
///
/// The first write error is kept and every later unit is refused, which
/// makes the pipeline stop with a cancelled session.
#[derive(Debug)]
pub struct AnnexBWriter<W: Write> {
    writer: W,
    units: u64,
    bytes: u64,
    error: Option<io::Error>,
}

impl<W: Write> AnnexBWriter<W> {
    pub fn new(writer: W) -> Self {
        Self {
            writer,
            units: 0,
            bytes: 0,
            error: None,
        }
    }

    /// Units written, parameter sets included.
    pub fn units(&self) -> u64 {
        self.units
    }

    /// Bytes written, start codes included.
    pub fn bytes(&self) -> u64 {
        self.bytes
    }

    /// The write error that stopped this writer, if any.
    pub fn error(&self) -> Option<&io::Error> {
        self.error.as_ref()
    }

    pub fn get_ref(&self) -> &W {
        &self.writer
    }

    pub fn into_inner(self) -> W {
        self.writer
    }

    fn write_unit(&mut self, data: &[u8]) -> bool {
        if self.error.is_some() {
            return false;
        }
        let result = self
            .writer
            .write_all(&START_CODE)
            .and_then(|()| self.writer.write_all(data));
        match result {
            Ok(()) => {
                self.units += 1;
                self.bytes += (START_CODE.len() + data.len()) as u64;
                true
            }
            Err(e) => {
                tracing::warn!(error = %e, "elementary stream write failed");
                self.error = Some(e);
                false
            }
        }
    }
}

impl<W: Write> Sink for AnnexBWriter<W> {
    fn on_start(&mut self, identity: &SessionIdentity, codec: &CodecInfo) {
        tracing::debug!(
            %identity,
            codec = %codec.codec,
            parameter_sets = codec.parameter_sets.len(),
            "writer started"
        );
        for set in codec.parameter_sets.iter().filter(|s| !s.is_empty()) {
            if !self.write_unit(set) {
                break;
            }
        }
    }

    fn on_unit(&mut self, unit: NalUnit<'_>) -> bool {
        self.write_unit(unit.data())
    }

    fn flush(&mut self) {
        if self.error.is_some() {
            return;
        }
        if let Err(e) = self.writer.flush() {
            tracing::warn!(error = %e, "elementary stream flush failed");
            self.error = Some(e);
        }
    }
}
