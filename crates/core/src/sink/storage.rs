use std::collections::HashSet;
use std::fs::{self, File, OpenOptions};
use std::io::{self, BufWriter};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use parking_lot::Mutex;

use crate::error::{IngestError, Result};
use crate::media::h264::NalUnit;
use crate::protocol::CodecInfo;
use crate::session::SessionIdentity;

use super::{AnnexBWriter, Sink};

const STREAM_EXTENSION: &str = "h264";

/// Keyed storage for uploaded streams.
///
/// Output is grouped as `<root>/<user>/<camera>/<unix-secs>.h264`. Only one
/// writer may be open per (user, camera) key at a time; clones share the
/// key registry, so independent sessions on different threads see each
/// other's claims.
#[derive(Clone)]
pub struct StreamStorage {
    root: PathBuf,
    active: Arc<Mutex<HashSet<SessionIdentity>>>,
}

impl StreamStorage {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            active: Arc::new(Mutex::new(HashSet::new())),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Whether a writer is currently open for `identity`.
    pub fn is_active(&self, identity: &SessionIdentity) -> bool {
        self.active.lock().contains(identity)
    }

    pub fn active_count(&self) -> usize {
        self.active.lock().len()
    }

    /// Claim `identity` and open a fresh stream file for it.
    ///
    /// Fails with [`IngestError::StorageBusy`] while another writer holds
    /// the same key. The claim is released when the returned writer drops.
    pub fn open(&self, identity: &SessionIdentity) -> Result<StorageWriter> {
        if !self.active.lock().insert(identity.clone()) {
            tracing::warn!(%identity, "stream already being stored");
            return Err(IngestError::StorageBusy(identity.storage_key()));
        }
        let claim = Claim {
            identity: identity.clone(),
            active: Arc::clone(&self.active),
        };

        let dir = self
            .root
            .join(sanitize(&identity.user))
            .join(sanitize(&identity.camera));
        fs::create_dir_all(&dir)?;
        let (path, file) = create_stream_file(&dir)?;

        tracing::info!(%identity, path = %path.display(), "stream storage opened");
        Ok(StorageWriter {
            writer: AnnexBWriter::new(BufWriter::new(file)),
            path,
            _claim: claim,
        })
    }
}

/// Releases a key when dropped.
#[derive(Debug)]
struct Claim {
    identity: SessionIdentity,
    active: Arc<Mutex<HashSet<SessionIdentity>>>,
}

impl Drop for Claim {
    fn drop(&mut self) {
        self.active.lock().remove(&self.identity);
        tracing::debug!(identity = %self.identity, "stream storage released");
    }
}

/// File-backed [`Sink`] handed out by [`StreamStorage::open`].
#[derive(Debug)]
pub struct StorageWriter {
    writer: AnnexBWriter<BufWriter<File>>,
    path: PathBuf,
    _claim: Claim,
}

impl StorageWriter {
    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn units(&self) -> u64 {
        self.writer.units()
    }

    pub fn bytes(&self) -> u64 {
        self.writer.bytes()
    }

    pub fn error(&self) -> Option<&io::Error> {
        self.writer.error()
    }
}

impl Sink for StorageWriter {
    fn on_start(&mut self, identity: &SessionIdentity, codec: &CodecInfo) {
        self.writer.on_start(identity, codec)
    }

    fn on_unit(&mut self, unit: NalUnit<'_>) -> bool {
        self.writer.on_unit(unit)
    }

    fn flush(&mut self) {
        self.writer.flush();
        tracing::debug!(
            path = %self.path.display(),
            units = self.writer.units(),
            bytes = self.writer.bytes(),
            "stream flushed"
        );
    }
}

/// Keep a metadata value usable as a single path component.
fn sanitize(component: &str) -> String {
    let cleaned: String = component
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.') {
                c
            } else {
                '_'
            }
        })
        .collect();
    if cleaned.is_empty() || cleaned.chars().all(|c| c == '.') {
        "_".to_string()
    } else {
        cleaned
    }
}

fn create_stream_file(dir: &Path) -> io::Result<(PathBuf, File)> {
    let secs = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or_default();

    let mut suffix = 0u32;
    loop {
        let name = if suffix == 0 {
            format!("{secs}.{STREAM_EXTENSION}")
        } else {
            format!("{secs}-{suffix}.{STREAM_EXTENSION}")
        };
        let path = dir.join(name);
        match OpenOptions::new().write(true).create_new(true).open(&path) {
            Ok(file) => return Ok((path, file)),
            Err(e) if e.kind() == io::ErrorKind::AlreadyExists => suffix += 1,
            Err(e) => return Err(e),
        }
    }
}
