//! Session orchestration.
//!
//! [`IngestPipeline`] owns one upload session. It pulls frames from a
//! [`MediaSource`], checks their ordering, parses RTP, extracts NAL units
//! and hands them to a [`Sink`]. Everything happens on the caller's thread,
//! one frame at a time.
//!
//! ```text
//! MediaSource ─read─▶ IngestPipeline ─▶ RtpPacket ─▶ extract ─▶ [Depacketizer] ─▶ Sink
//! ```

use crate::error::{BannerErrorKind, IngestError, ProtocolErrorKind, Result, SourceError};
use crate::media::depacketize::{DepacketizeStats, Depacketizer, PacketPosition};
use crate::media::h264::{self, NalUnit};
use crate::media::rtp::RtpPacket;
use crate::protocol::sdp::identify_codec;
use crate::protocol::{CodecInfo, FrameKind};
use crate::session::{SessionIdentity, SessionState};
use crate::sink::Sink;
use crate::source::{MediaSource, ReadOutcome};

/// Default read buffer; comfortably above any RTP packet on a 64 KiB path.
pub const DEFAULT_BUFFER_CAPACITY: usize = 64 * 1024;

/// Payloads of this many bytes or fewer are never handed to the extractor.
const DEGENERATE_PAYLOAD_LEN: usize = 2;

/// Per-session tuning.
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    /// Size of the buffer handed to [`MediaSource::read`].
    pub buffer_capacity: usize,
    /// Split STAP-A and reassemble FU-A before delivery.
    pub depacketize: bool,
    /// Drop RTP packets whose payload type differs from the banner's.
    pub enforce_payload_type: bool,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            buffer_capacity: DEFAULT_BUFFER_CAPACITY,
            depacketize: false,
            enforce_payload_type: false,
        }
    }
}

/// Counters kept over the life of a session.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct IngestStats {
    /// Frames pushed, whatever their kind.
    pub frames: u64,
    /// RTP frames that parsed.
    pub rtp_packets: u64,
    pub rtcp_frames: u64,
    /// RTP frames dropped because the header did not parse.
    pub malformed_packets: u64,
    /// RTP payloads too short to carry a unit.
    pub degenerate_payloads: u64,
    pub payload_type_mismatches: u64,
    /// Zero-length ranges between or after delimiters.
    pub empty_units: u64,
    /// Units delivered with the forbidden_zero_bit set.
    pub forbidden_units: u64,
    pub units_delivered: u64,
    pub bytes_delivered: u64,
}

/// Outcome of a session that did not fail.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionReport {
    pub state: SessionState,
    pub codec: Option<CodecInfo>,
    pub stats: IngestStats,
    /// Present when depacketization was enabled.
    pub depacketize: Option<DepacketizeStats>,
}

/// Whether the caller should keep feeding frames.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Flow {
    Continue,
    Stop,
}

/// Drives one upload session from banner to end of stream.
///
/// A pipeline is single-use and not shared: independent sessions run as
/// independent pipelines.
pub struct IngestPipeline<K: Sink> {
    identity: SessionIdentity,
    sink: K,
    config: PipelineConfig,
    state: SessionState,
    codec: Option<CodecInfo>,
    depacketizer: Option<Depacketizer>,
    stats: IngestStats,
}

impl<K: Sink> IngestPipeline<K> {
    /// Create a pipeline waiting for its SDP banner.
    pub fn new(identity: SessionIdentity, sink: K, config: PipelineConfig) -> Self {
        tracing::info!(%identity, "session opened");
        Self {
            identity,
            sink,
            config,
            state: SessionState::AwaitingSdp,
            codec: None,
            depacketizer: None,
            stats: IngestStats::default(),
        }
    }

    /// Create a pipeline from a banner that was already read.
    ///
    /// The banner is consumed as the session's SDP frame, so the source
    /// passed to [`run`](Self::run) must continue after it.
    pub fn with_banner(
        identity: SessionIdentity,
        banner: &[u8],
        sink: K,
        config: PipelineConfig,
    ) -> Result<Self> {
        let mut pipeline = Self::new(identity, sink, config);
        pipeline.push_frame(FrameKind::Sdp, banner)?;
        Ok(pipeline)
    }

    pub fn identity(&self) -> &SessionIdentity {
        &self.identity
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    /// Codec identified from the banner, once it has been seen.
    pub fn codec(&self) -> Option<&CodecInfo> {
        self.codec.as_ref()
    }

    pub fn stats(&self) -> IngestStats {
        self.stats
    }

    pub fn sink(&self) -> &K {
        &self.sink
    }

    pub fn into_sink(self) -> K {
        self.sink
    }

    pub fn report(&self) -> SessionReport {
        SessionReport {
            state: self.state,
            codec: self.codec.clone(),
            stats: self.stats,
            depacketize: self.depacketizer.as_ref().map(Depacketizer::stats),
        }
    }

    /// Pull frames from `source` until the session reaches a terminal state.
    ///
    /// End of stream completes the session and flushes the sink. A sink
    /// that declines a unit cancels it. Both return `Ok`. Banner, protocol
    /// and source failures abort the session and return the error.
    pub fn run<S: MediaSource>(&mut self, mut source: S) -> Result<SessionReport> {
        let mut buf = vec![0u8; self.config.buffer_capacity];

        while !self.state.is_terminal() {
            let outcome = match source.read(&mut buf) {
                Ok(outcome) => outcome,
                Err(e) => {
                    let err = IngestError::from(e);
                    self.abort(&err);
                    return Err(err);
                }
            };

            match outcome {
                ReadOutcome::Frame { kind, len } => {
                    let Some(frame) = buf.get(..len) else {
                        let err = IngestError::from(SourceError::BufferTooSmall {
                            needed: len,
                            capacity: buf.len(),
                        });
                        self.abort(&err);
                        return Err(err);
                    };
                    if self.push_frame(kind, frame)? == Flow::Stop {
                        break;
                    }
                }
                ReadOutcome::EndOfStream => self.finish()?,
            }
        }

        let report = self.report();
        tracing::debug!(
            identity = %self.identity,
            state = ?report.state,
            frames = report.stats.frames,
            rtp = report.stats.rtp_packets,
            rtcp = report.stats.rtcp_frames,
            malformed = report.stats.malformed_packets,
            units = report.stats.units_delivered,
            bytes = report.stats.bytes_delivered,
            "session report"
        );
        Ok(report)
    }

    /// Feed one frame by its wire tag.
    ///
    /// Tags outside SDP/RTP/RTCP abort the session with
    /// [`ProtocolErrorKind::UnknownFrameType`].
    pub fn push_record(&mut self, tag: u8, payload: &[u8]) -> Result<Flow> {
        match FrameKind::from_tag(tag) {
            Some(kind) => self.push_frame(kind, payload),
            None => {
                let err = IngestError::protocol(ProtocolErrorKind::UnknownFrameType(tag));
                self.abort(&err);
                Err(err)
            }
        }
    }

    /// Feed one frame.
    ///
    /// The first frame must be SDP; any later SDP aborts the session. RTCP
    /// is counted and ignored. Malformed RTP is dropped without ending the
    /// session. After a terminal state every frame is refused with
    /// [`Flow::Stop`].
    pub fn push_frame(&mut self, kind: FrameKind, payload: &[u8]) -> Result<Flow> {
        if self.state.is_terminal() {
            return Ok(Flow::Stop);
        }
        self.stats.frames += 1;

        let result = match (self.state, kind) {
            (SessionState::AwaitingSdp, FrameKind::Sdp) => self.start(payload),
            (SessionState::AwaitingSdp, _) => Err(IngestError::banner(BannerErrorKind::OutOfOrder)),
            (_, FrameKind::Sdp) => Err(IngestError::protocol(ProtocolErrorKind::UnexpectedSdp)),
            (_, FrameKind::Rtcp) => {
                self.stats.rtcp_frames += 1;
                tracing::trace!(len = payload.len(), "RTCP frame ignored");
                Ok(Flow::Continue)
            }
            (_, FrameKind::Rtp) => Ok(self.ingest_rtp(payload)),
        };

        if let Err(e) = &result {
            self.abort(e);
        }
        result
    }

    /// Signal end of stream.
    ///
    /// Flushes the sink and completes the session if the banner was seen;
    /// otherwise aborts with [`BannerErrorKind::Missing`]. Does nothing once
    /// the session is terminal, so the sink is flushed at most once.
    pub fn finish(&mut self) -> Result<()> {
        match self.state {
            SessionState::AwaitingSdp => {
                let err = IngestError::banner(BannerErrorKind::Missing);
                self.abort(&err);
                Err(err)
            }
            SessionState::Streaming => {
                if self.depacketizer.as_ref().is_some_and(Depacketizer::has_partial) {
                    tracing::debug!(identity = %self.identity, "partial fragment discarded at end of stream");
                }
                self.sink.flush();
                self.state = SessionState::Completed;
                tracing::info!(
                    identity = %self.identity,
                    units = self.stats.units_delivered,
                    "session completed"
                );
                Ok(())
            }
            _ => Ok(()),
        }
    }

    fn start(&mut self, banner: &[u8]) -> Result<Flow> {
        let codec = identify_codec(banner)?;
        if codec.provisional {
            tracing::warn!(identity = %self.identity, "codec not announced, assuming {}", codec.codec);
        }

        self.sink.on_start(&self.identity, &codec);
        if self.config.depacketize {
            self.depacketizer = Some(Depacketizer::new());
        }
        tracing::info!(
            identity = %self.identity,
            codec = %codec.codec,
            pt = codec.payload_type,
            "session streaming"
        );
        self.codec = Some(codec);
        self.state = SessionState::Streaming;
        Ok(Flow::Continue)
    }

    fn ingest_rtp(&mut self, frame: &[u8]) -> Flow {
        let packet = match RtpPacket::parse(frame) {
            Ok(packet) => packet,
            Err(e) => {
                self.stats.malformed_packets += 1;
                tracing::warn!(error = %e, len = frame.len(), "malformed RTP packet dropped");
                return Flow::Continue;
            }
        };
        self.stats.rtp_packets += 1;

        let header = packet.header;
        let expected_pt = self.codec.as_ref().map(|c| c.payload_type);
        if let Some(expected) = expected_pt
            && header.payload_type != expected
        {
            self.stats.payload_type_mismatches += 1;
            if self.config.enforce_payload_type {
                tracing::trace!(
                    pt = header.payload_type,
                    expected,
                    "payload type mismatch, dropped"
                );
                return Flow::Continue;
            }
        }

        let payload = packet.payload();
        if payload.len() <= DEGENERATE_PAYLOAD_LEN {
            self.stats.degenerate_payloads += 1;
            tracing::trace!(
                seq = header.sequence_number,
                len = payload.len(),
                "degenerate payload skipped"
            );
            return Flow::Continue;
        }

        let position = PacketPosition {
            sequence_number: header.sequence_number,
            timestamp: header.timestamp,
        };

        for unit in h264::extract(payload) {
            let unit = match unit {
                Ok(unit) => unit,
                Err(e) => {
                    self.stats.empty_units += 1;
                    tracing::trace!(seq = header.sequence_number, error = %e, "unit dropped");
                    continue;
                }
            };
            if self.route(position, unit) == Flow::Stop {
                return Flow::Stop;
            }
        }
        Flow::Continue
    }

    fn route(&mut self, position: PacketPosition, unit: NalUnit<'_>) -> Flow {
        let Some(depacketizer) = self.depacketizer.as_mut() else {
            return self.deliver(unit);
        };

        let mut complete = Vec::new();
        depacketizer.push(position, unit, &mut complete);
        for data in &complete {
            match NalUnit::parse(data) {
                Ok(unit) => {
                    if self.deliver(unit) == Flow::Stop {
                        return Flow::Stop;
                    }
                }
                Err(_) => self.stats.empty_units += 1,
            }
        }
        Flow::Continue
    }

    fn deliver(&mut self, unit: NalUnit<'_>) -> Flow {
        if !unit.header().is_well_formed() {
            self.stats.forbidden_units += 1;
            tracing::trace!(len = unit.len(), "unit has forbidden_zero_bit set");
        }
        self.stats.units_delivered += 1;
        self.stats.bytes_delivered += unit.len() as u64;
        tracing::trace!(nal_type = ?unit.unit_type(), len = unit.len(), "unit delivered");

        if self.sink.on_unit(unit) {
            Flow::Continue
        } else {
            self.state = SessionState::Cancelled;
            tracing::info!(identity = %self.identity, "sink declined further units, session cancelled");
            Flow::Stop
        }
    }

    fn abort(&mut self, err: &IngestError) {
        self.state = SessionState::Aborted;
        tracing::warn!(identity = %self.identity, error = %err, "session aborted");
    }
}

/// Run a whole session: banner, media, end of stream.
pub fn ingest<S: MediaSource, K: Sink>(
    identity: SessionIdentity,
    source: S,
    sink: K,
    config: PipelineConfig,
) -> Result<SessionReport> {
    IngestPipeline::new(identity, sink, config).run(source)
}
