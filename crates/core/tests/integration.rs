//! Integration tests: whole sessions through the public API.
//!
//! Frame streams are built with the record codec, replayed through the
//! framed and archive sources, and collected by a recording sink.

use std::fs;

use ingest::error::{BannerErrorKind, ProtocolErrorKind, SourceError};
use ingest::protocol::frame::write_frame;
use ingest::{
    ArchiveSource, CodecInfo, ControlFilter, FrameKind, FramedSource, IngestError,
    IngestPipeline, NalUnit, PipelineConfig, RtpHeader, SessionIdentity, SessionState, Sink,
    Status, StreamStorage, ingest,
};

const BANNER: &[u8] = b"v=0\r\n\
o=- 0 0 IN IP4 127.0.0.1\r\n\
s=upload\r\n\
m=video 0 RTP/AVP 96\r\n\
a=rtpmap:96 H264/90000\r\n\
a=fmtp:96 packetization-mode=1;sprop-parameter-sets=Z0IAKeKQ,aM48gA==\r\n";

#[derive(Default)]
struct Recorder {
    codec: Option<CodecInfo>,
    units: Vec<Vec<u8>>,
    flushes: usize,
}

impl Sink for Recorder {
    fn on_start(&mut self, _identity: &SessionIdentity, codec: &CodecInfo) {
        self.codec = Some(codec.clone());
    }

    fn on_unit(&mut self, unit: NalUnit<'_>) -> bool {
        self.units.push(unit.data().to_vec());
        true
    }

    fn flush(&mut self) {
        self.flushes += 1;
    }
}

fn rtp(seq: u16, payload: &[u8]) -> Vec<u8> {
    let header = RtpHeader {
        version: 2,
        padding: false,
        extension: false,
        csrc_count: 0,
        marker: true,
        payload_type: 96,
        sequence_number: seq,
        timestamp: 90000,
        ssrc: 0xdeadbeef,
    };
    let mut out = header.encode().to_vec();
    out.extend_from_slice(payload);
    out
}

fn dump(frames: &[(FrameKind, Vec<u8>)]) -> Vec<u8> {
    let mut out = Vec::new();
    for (kind, payload) in frames {
        write_frame(&mut out, *kind, payload).unwrap();
    }
    out
}

fn identity() -> SessionIdentity {
    SessionIdentity::new("alice", "porch")
}

#[test]
fn banner_then_one_rtp_frame() {
    let stream = dump(&[
        (FrameKind::Sdp, BANNER.to_vec()),
        (
            FrameKind::Rtp,
            rtp(1, &[0x00, 0x00, 0x00, 0x01, 0xAA, 0xBB, 0x00, 0x00, 0x01, 0xCC]),
        ),
    ]);
    let mut sink = Recorder::default();

    let report = ingest(
        identity(),
        FramedSource::new(stream.as_slice()),
        &mut sink,
        PipelineConfig::default(),
    )
    .unwrap();

    assert_eq!(report.state, SessionState::Completed);
    assert_eq!(sink.units, vec![vec![0xAA, 0xBB], vec![0xCC]]);
    assert_eq!(sink.flushes, 1);

    let codec = sink.codec.unwrap();
    assert!(!codec.provisional);
    assert_eq!(codec.packetization_mode, 1);
    assert_eq!(codec.parameter_sets.len(), 2);
}

#[test]
fn rtcp_and_malformed_frames_do_not_end_session() {
    let stream = dump(&[
        (FrameKind::Sdp, BANNER.to_vec()),
        (FrameKind::Rtcp, vec![0x80, 0xC8, 0x00, 0x06]),
        (FrameKind::Rtp, vec![0x80; 5]),
        (FrameKind::Rtp, rtp(2, &[0x65, 0x88, 0x84, 0x00])),
        (FrameKind::Rtp, rtp(3, &[0x41, 0x9A])),
    ]);
    let mut sink = Recorder::default();

    let report = ingest(
        identity(),
        ControlFilter::new(FramedSource::new(stream.as_slice())),
        &mut sink,
        PipelineConfig::default(),
    )
    .unwrap();

    assert_eq!(report.state, SessionState::Completed);
    assert_eq!(report.stats.malformed_packets, 1);
    assert_eq!(report.stats.degenerate_payloads, 1);
    // RTCP never reaches the pipeline through the filter
    assert_eq!(report.stats.rtcp_frames, 0);
    assert_eq!(sink.units, vec![vec![0x65, 0x88, 0x84, 0x00]]);
}

#[test]
fn second_banner_through_filter_is_source_error() {
    let stream = dump(&[
        (FrameKind::Sdp, BANNER.to_vec()),
        (FrameKind::Rtp, rtp(1, &[0x65, 0x88, 0x84])),
        (FrameKind::Sdp, BANNER.to_vec()),
    ]);
    let mut sink = Recorder::default();

    let err = ingest(
        identity(),
        ControlFilter::new(FramedSource::new(stream.as_slice())),
        &mut sink,
        PipelineConfig::default(),
    )
    .unwrap_err();

    assert!(matches!(err, IngestError::Source(SourceError::UnexpectedSdp)));
    assert_eq!(err.status(), Status::Aborted);
    assert_eq!(sink.flushes, 0);
}

#[test]
fn oversized_frame_aborts() {
    let stream = dump(&[
        (FrameKind::Sdp, BANNER.to_vec()),
        (FrameKind::Rtp, rtp(1, &[0x65; 512])),
    ]);
    let config = PipelineConfig {
        buffer_capacity: 256,
        ..Default::default()
    };
    let mut sink = Recorder::default();
    let mut pipeline = IngestPipeline::new(identity(), &mut sink, config);

    let err = pipeline
        .run(FramedSource::new(stream.as_slice()))
        .unwrap_err();
    assert!(matches!(
        err,
        IngestError::Source(SourceError::BufferTooSmall { capacity: 256, .. })
    ));
    assert_eq!(pipeline.state(), SessionState::Aborted);
}

#[test]
fn empty_stream_has_no_banner() {
    let mut sink = Recorder::default();
    let err = ingest(
        identity(),
        FramedSource::new(std::io::empty()),
        &mut sink,
        PipelineConfig::default(),
    )
    .unwrap_err();
    assert!(matches!(
        err,
        IngestError::Banner {
            kind: BannerErrorKind::Missing
        }
    ));
}

#[test]
fn unknown_record_tag_aborts() {
    let mut pipeline =
        IngestPipeline::new(identity(), Recorder::default(), PipelineConfig::default());
    pipeline.push_record(FrameKind::Sdp.tag(), BANNER).unwrap();
    let err = pipeline.push_record(0x7F, &[]).unwrap_err();
    assert!(matches!(
        err,
        IngestError::Protocol {
            kind: ProtocolErrorKind::UnknownFrameType(0x7F)
        }
    ));
}

#[test]
fn archive_replay_into_storage() {
    let dir = tempfile::tempdir().unwrap();
    let archive = dir.path().join("session.tar");
    let mut builder = tar::Builder::new(fs::File::create(&archive).unwrap());
    let entries = [
        ("session.sdp", BANNER.to_vec()),
        ("0001.rtp", rtp(1, &[0x65, 0x88, 0x84])),
        ("0002.rtp", rtp(2, &[0x41, 0x9A, 0x02])),
    ];
    for (name, data) in &entries {
        let mut header = tar::Header::new_gnu();
        header.set_size(data.len() as u64);
        header.set_mode(0o644);
        builder.append_data(&mut header, name, data.as_slice()).unwrap();
    }
    builder.finish().unwrap();
    drop(builder);

    let root = tempfile::tempdir().unwrap();
    let storage = StreamStorage::new(root.path());
    let writer = storage.open(&identity()).unwrap();
    let path = writer.path().to_path_buf();

    let mut pipeline = IngestPipeline::new(identity(), writer, PipelineConfig::default());
    let report = pipeline.run(ArchiveSource::open(&archive).unwrap()).unwrap();
    assert_eq!(report.state, SessionState::Completed);
    assert_eq!(report.stats.units_delivered, 2);

    // busy until the writer is dropped
    assert!(matches!(
        storage.open(&identity()),
        Err(IngestError::StorageBusy(_))
    ));
    drop(pipeline);
    assert!(!storage.is_active(&identity()));

    let written = fs::read(path).unwrap();
    let mut expected = Vec::new();
    // parameter sets from the banner come first
    expected.extend_from_slice(&[0, 0, 0, 1, 0x67, 0x42, 0x00, 0x29, 0xE2, 0x90]);
    expected.extend_from_slice(&[0, 0, 0, 1, 0x68, 0xCE, 0x3C, 0x80]);
    expected.extend_from_slice(&[0, 0, 0, 1, 0x65, 0x88, 0x84]);
    expected.extend_from_slice(&[0, 0, 0, 1, 0x41, 0x9A, 0x02]);
    assert_eq!(written, expected);
}

#[test]
fn fragmented_unit_reassembled_across_frames() {
    let stream = dump(&[
        (FrameKind::Sdp, BANNER.to_vec()),
        (FrameKind::Rtp, rtp(7, &[0x7C, 0x85, 0x01, 0x02])),
        (FrameKind::Rtp, rtp(8, &[0x7C, 0x05, 0x03])),
        (FrameKind::Rtp, rtp(9, &[0x7C, 0x45, 0x04])),
        // STAP-A carrying two units
        (
            FrameKind::Rtp,
            rtp(10, &[0x78, 0x00, 0x02, 0x67, 0x42, 0x00, 0x02, 0x68, 0xCE]),
        ),
    ]);
    let config = PipelineConfig {
        depacketize: true,
        ..Default::default()
    };
    let mut sink = Recorder::default();

    let report = ingest(
        identity(),
        FramedSource::new(stream.as_slice()),
        &mut sink,
        config,
    )
    .unwrap();

    assert_eq!(
        sink.units,
        vec![
            vec![0x65, 0x01, 0x02, 0x03, 0x04],
            vec![0x67, 0x42],
            vec![0x68, 0xCE],
        ]
    );
    assert_eq!(report.depacketize.unwrap().fragments_dropped, 0);
}
