use std::collections::VecDeque;
use std::fs::File;
use std::io::{BufReader, Read};
use std::path::{Path, PathBuf};

use crate::error::{BannerErrorKind, IngestError, Result, SourceError};
use crate::protocol::FrameKind;

use super::{MediaSource, ReadOutcome};

const SDP_EXTENSION: &str = "sdp";
const RTP_EXTENSION: &str = "rtp";

#[derive(Debug)]
struct ArchiveEntry {
    path: PathBuf,
    size: usize,
    data: Vec<u8>,
}

/// Replays a recorded upload stored as a tar archive.
///
/// The first `*.sdp` entry is the banner and is returned by the first
/// [`read`](MediaSource::read); every `*.rtp` entry then becomes one RTP
/// frame, in archive order. Other entries are ignored.
///
/// ```text
/// session.tar
///   session.sdp
///   000001.rtp
///   000002.rtp
///   ...
/// ```
///
/// The archive is read through once when the source is built, so a plain
/// [`Read`] such as a pipe is enough.
#[derive(Debug)]
pub struct ArchiveSource {
    banner: Option<ArchiveEntry>,
    entries: VecDeque<ArchiveEntry>,
}

impl ArchiveSource {
    /// Open the tar file at `path`.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        tracing::debug!(archive = %path.display(), "opening archive");
        Self::from_reader(BufReader::new(File::open(path)?))
    }

    /// Index a tar stream.
    ///
    /// Fails with [`BannerErrorKind::Missing`] when the archive holds no
    /// `.sdp` entry.
    pub fn from_reader<R: Read>(reader: R) -> Result<Self> {
        let mut archive = tar::Archive::new(reader);
        let mut banner = None;
        let mut entries = VecDeque::new();

        for entry in archive.entries()? {
            let mut entry = entry?;
            if !entry.header().entry_type().is_file() {
                continue;
            }
            let path = entry.path()?.into_owned();
            let is_banner = banner.is_none() && has_extension(&path, SDP_EXTENSION);
            if !is_banner && !has_extension(&path, RTP_EXTENSION) {
                continue;
            }

            let size = entry.header().size()? as usize;
            let mut data = Vec::with_capacity(size);
            entry.read_to_end(&mut data)?;
            let entry = ArchiveEntry { path, size, data };
            if is_banner {
                banner = Some(entry);
            } else {
                entries.push_back(entry);
            }
        }

        let Some(banner) = banner else {
            tracing::warn!("archive has no .sdp entry");
            return Err(IngestError::banner(BannerErrorKind::Missing));
        };
        tracing::debug!(
            banner = %banner.path.display(),
            rtp_entries = entries.len(),
            "archive indexed"
        );

        Ok(Self {
            banner: Some(banner),
            entries,
        })
    }

    /// RTP entries not yet replayed.
    pub fn remaining(&self) -> usize {
        self.entries.len()
    }
}

impl MediaSource for ArchiveSource {
    fn read(&mut self, buf: &mut [u8]) -> std::result::Result<ReadOutcome, SourceError> {
        let (kind, entry) = match self.banner.take() {
            Some(banner) => (FrameKind::Sdp, banner),
            None => match self.entries.pop_front() {
                Some(entry) => (FrameKind::Rtp, entry),
                None => return Ok(ReadOutcome::EndOfStream),
            },
        };

        if entry.size > buf.len() {
            return Err(SourceError::BufferTooSmall {
                needed: entry.size,
                capacity: buf.len(),
            });
        }
        let len = entry.data.len();
        buf[..len].copy_from_slice(&entry.data);

        tracing::trace!(entry = %entry.path.display(), %kind, len, "archive entry read");
        Ok(ReadOutcome::Frame { kind, len })
    }
}

fn has_extension(path: &Path, ext: &str) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .is_some_and(|e| e.eq_ignore_ascii_case(ext))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tarball(entries: &[(&str, &[u8])]) -> Vec<u8> {
        let mut builder = tar::Builder::new(Vec::new());
        for (name, data) in entries {
            let mut header = tar::Header::new_gnu();
            header.set_entry_type(tar::EntryType::Regular);
            header.set_size(data.len() as u64);
            header.set_mode(0o644);
            builder.append_data(&mut header, name, *data).unwrap();
        }
        builder.into_inner().unwrap()
    }

    #[test]
    fn banner_first_then_rtp_in_archive_order() {
        let tar = tarball(&[
            ("0002.rtp", &[2, 2]),
            ("notes.txt", b"ignored"),
            ("session.sdp", b"v=0\r\n"),
            ("0001.rtp", &[1]),
            ("other.sdp", b"v=1\r\n"),
        ]);

        let mut source = ArchiveSource::from_reader(tar.as_slice()).unwrap();
        assert_eq!(source.remaining(), 2);
        let mut buf = [0u8; 64];

        assert_eq!(
            source.read(&mut buf).unwrap(),
            ReadOutcome::Frame {
                kind: FrameKind::Sdp,
                len: 5
            }
        );
        assert_eq!(&buf[..5], b"v=0\r\n");
        assert_eq!(
            source.read(&mut buf).unwrap(),
            ReadOutcome::Frame {
                kind: FrameKind::Rtp,
                len: 2
            }
        );
        assert_eq!(&buf[..2], &[2, 2]);
        assert_eq!(
            source.read(&mut buf).unwrap(),
            ReadOutcome::Frame {
                kind: FrameKind::Rtp,
                len: 1
            }
        );
        assert_eq!(buf[0], 1);
        assert_eq!(source.read(&mut buf).unwrap(), ReadOutcome::EndOfStream);
    }

    #[test]
    fn missing_banner() {
        let tar = tarball(&[("0001.rtp", &[1])]);
        assert!(matches!(
            ArchiveSource::from_reader(tar.as_slice()),
            Err(IngestError::Banner {
                kind: BannerErrorKind::Missing
            })
        ));
    }

    #[test]
    fn entry_larger_than_buffer() {
        let tar = tarball(&[("a.sdp", b"v=0"), ("b.rtp", &[0u8; 100])]);
        let mut source = ArchiveSource::from_reader(tar.as_slice()).unwrap();
        let mut buf = [0u8; 16];
        source.read(&mut buf).unwrap();
        assert!(matches!(
            source.read(&mut buf),
            Err(SourceError::BufferTooSmall {
                needed: 100,
                capacity: 16
            })
        ));
    }

    #[test]
    fn opens_archive_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("session.tar");
        std::fs::write(&path, tarball(&[("s.sdp", b"v=0"), ("1.rtp", &[7, 7, 7])])).unwrap();

        let source = ArchiveSource::open(&path).unwrap();
        assert_eq!(source.remaining(), 1);
    }
}
