use std::fs::File;
use std::io::{self, BufReader};
use std::path::PathBuf;
use std::process::ExitCode;

use clap::Parser;
use ingest::{
    ArchiveSource, ControlFilter, FramedSource, MediaSource, PipelineConfig, SessionIdentity,
    StreamStorage, ingest,
};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(
    name = "rtp-ingest",
    about = "Replay a recorded RTP upload into per-camera H.264 storage"
)]
struct Args {
    /// User id the upload belongs to
    #[arg(long)]
    user: String,

    /// Camera id the upload belongs to
    #[arg(long)]
    camera: String,

    /// Storage root; output goes to <out>/<user>/<camera>/
    #[arg(long, short, default_value = "recordings")]
    out: PathBuf,

    /// Tar archive holding an .sdp entry and .rtp entries
    #[arg(long, conflicts_with = "stream", required_unless_present = "stream")]
    archive: Option<PathBuf>,

    /// Framed stream dump, or `-` for stdin
    #[arg(long)]
    stream: Option<PathBuf>,

    /// Split STAP-A and reassemble FU-A units
    #[arg(long)]
    depacketize: bool,

    /// Read buffer size in bytes
    #[arg(long, default_value_t = ingest::pipeline::DEFAULT_BUFFER_CAPACITY)]
    buffer_size: usize,

    /// Drop packets whose payload type differs from the banner's
    #[arg(long)]
    enforce_payload_type: bool,
}

fn open_source(args: &Args) -> ingest::Result<Box<dyn MediaSource>> {
    if let Some(path) = &args.archive {
        return Ok(Box::new(ArchiveSource::open(path)?));
    }
    let reader: Box<dyn io::Read> = match args.stream.as_deref() {
        Some(path) if path.as_os_str() != "-" => Box::new(BufReader::new(File::open(path)?)),
        _ => Box::new(io::stdin().lock()),
    };
    Ok(Box::new(ControlFilter::new(FramedSource::new(reader))))
}

fn run(args: &Args) -> ingest::Result<()> {
    let identity = SessionIdentity::from_metadata([
        ("user", args.user.as_str()),
        ("camera", args.camera.as_str()),
    ])?;
    let config = PipelineConfig {
        buffer_capacity: args.buffer_size,
        depacketize: args.depacketize,
        enforce_payload_type: args.enforce_payload_type,
    };

    let source = open_source(args)?;
    let storage = StreamStorage::new(&args.out);
    let writer = storage.open(&identity)?;
    let path = writer.path().to_path_buf();

    let report = ingest(identity, source, writer, config)?;
    let stats = report.stats;
    println!(
        "{:?}: {} units ({} bytes) from {} RTP packets -> {}",
        report.state,
        stats.units_delivered,
        stats.bytes_delivered,
        stats.rtp_packets,
        path.display()
    );
    if stats.malformed_packets + stats.degenerate_payloads + stats.empty_units > 0 {
        println!(
            "dropped: {} malformed packets, {} degenerate payloads, {} empty units",
            stats.malformed_packets, stats.degenerate_payloads, stats.empty_units
        );
    }
    Ok(())
}

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let args = Args::parse();

    match run(&args) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("ingest failed ({:?}): {}", e.status(), e);
            ExitCode::FAILURE
        }
    }
}
