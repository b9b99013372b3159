//! RTP upload ingestion.
//!
//! Takes an upload made of one SDP banner followed by RTP and RTCP frames,
//! and rebuilds the H.264 NAL units it carries for a [`Sink`].
//!
//! ```no_run
//! use ingest::{ingest, ArchiveSource, PipelineConfig, SessionIdentity, StreamStorage};
//!
//! # fn main() -> ingest::Result<()> {
//! let identity = SessionIdentity::from_metadata([("user", "alice"), ("camera", "porch")])?;
//! let storage = StreamStorage::new("/var/lib/uploads");
//! let writer = storage.open(&identity)?;
//! let report = ingest(
//!     identity,
//!     ArchiveSource::open("capture")?,
//!     writer,
//!     PipelineConfig::default(),
//! )?;
//! println!("{} units", report.stats.units_delivered);
//! # Ok(())
//! # }
//! ```

pub mod bits;
pub mod error;
pub mod media;
pub mod pipeline;
pub mod protocol;
pub mod session;
pub mod sink;
pub mod source;

pub use error::{IngestError, Result, Status};
pub use media::h264::{NalUnit, OwnedNalUnit};
pub use media::rtp::{RtpHeader, RtpPacket};
pub use pipeline::{Flow, IngestPipeline, IngestStats, PipelineConfig, SessionReport, ingest};
pub use protocol::{CodecInfo, FrameKind};
pub use session::{SessionIdentity, SessionState};
pub use sink::{AnnexBWriter, Sink, StreamStorage};
pub use source::{ArchiveSource, ControlFilter, FramedSource, MediaSource, ReadOutcome};
