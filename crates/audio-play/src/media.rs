//! The currently open media file and the engine's view of it.
//!
//! The worker owns the lifecycle (open/close); the engine only reads through a
//! [`MediaReader`], which takes the shared-bus guard for each chunk. Reads
//! after the file has been closed return end-of-stream, which is how a stop
//! or track change cuts off a decoder mid-file.

use std::fs::File;
use std::io::{self, Read, Seek, SeekFrom};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard};

use symphonia::core::io::MediaSource;

use crate::bus::SharedBus;

struct OpenFile {
    path: PathBuf,
    file: File,
    len: u64,
}

/// Slot holding at most one open media file.
#[derive(Clone, Default)]
pub struct MediaSlot {
    inner: Arc<Mutex<Option<OpenFile>>>,
}

impl MediaSlot {
    pub fn new() -> Self {
        Self::default()
    }

    fn slot(&self) -> MutexGuard<'_, Option<OpenFile>> {
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Open `path`, replacing (and closing) any file already held.
    ///
    /// Touches storage, so the caller must hold the bus guard.
    pub fn open(&self, path: &Path) -> io::Result<()> {
        let file = File::open(path)?;
        let len = file.metadata().map(|m| m.len()).unwrap_or(0);
        let prev = self.slot().replace(OpenFile {
            path: path.to_path_buf(),
            file,
            len,
        });
        if let Some(prev) = prev {
            tracing::debug!(path = %prev.path.display(), "media replaced while open");
        }
        Ok(())
    }

    /// Close the open file, if any. Returns whether a file was closed.
    pub fn close(&self) -> bool {
        match self.slot().take() {
            Some(f) => {
                tracing::debug!(path = %f.path.display(), "media closed");
                true
            }
            None => false,
        }
    }

    pub fn is_open(&self) -> bool {
        self.slot().is_some()
    }
}

/// Bus-guarded reader over whatever file the [`MediaSlot`] holds.
#[derive(Clone)]
pub struct MediaReader {
    slot: MediaSlot,
    bus: SharedBus,
}

impl MediaReader {
    pub fn new(slot: MediaSlot, bus: SharedBus) -> Self {
        Self { slot, bus }
    }
}

impl Read for MediaReader {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let _bus = self.bus.lock();
        match self.slot.slot().as_mut() {
            Some(open) => open.file.read(buf),
            None => Ok(0),
        }
    }
}

impl Seek for MediaReader {
    fn seek(&mut self, pos: SeekFrom) -> io::Result<u64> {
        let _bus = self.bus.lock();
        match self.slot.slot().as_mut() {
            Some(open) => open.file.seek(pos),
            None => Err(io::Error::new(io::ErrorKind::NotFound, "media closed")),
        }
    }
}

impl MediaSource for MediaReader {
    fn is_seekable(&self) -> bool {
        self.slot.is_open()
    }

    fn byte_len(&self) -> Option<u64> {
        self.slot.slot().as_ref().map(|f| f.len)
    }
}

/// Strip a leading `scheme://` from `url`, yielding the filesystem path.
///
/// Only a leading scheme (alphanumerics, `+`, `-`, `.`) counts; anything
/// else, including a path that merely contains `://`, is a plain path.
pub fn strip_scheme(url: &str) -> &str {
    match url.split_once("://") {
        Some((scheme, rest)) if is_scheme(scheme) => rest,
        _ => url,
    }
}

fn is_scheme(s: &str) -> bool {
    !s.is_empty()
        && s.chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '+' | '-' | '.'))
}

/// Lowercase file extension of the url's last path segment, if any.
pub fn url_extension(url: &str) -> Option<String> {
    let tail = url.split('?').next().unwrap_or(url);
    let file = tail.rsplit('/').next().unwrap_or(tail);
    let mut parts = file.rsplit('.');
    let ext = parts.next()?;
    if parts.next().is_some() && !ext.is_empty() {
        Some(ext.to_ascii_lowercase())
    } else {
        None
    }
}
