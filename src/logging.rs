use std::fs::{self, File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tracing_subscriber::fmt::MakeWriter;

use crate::paths::LOG_FILE_NAME;

type SharedFile = Arc<Mutex<Option<File>>>;

fn lock(inner: &SharedFile) -> MutexGuard<'_, Option<File>> {
    inner.lock().unwrap_or_else(PoisonError::into_inner)
}

/// A `MakeWriter` that discards writes until [`LogFileHandle::open`] is
/// called, then appends to `provisioning.log`.
///
/// The subscriber is installed before settings are resolved, so the log
/// directory is not known yet at that point.
#[derive(Clone)]
pub struct DeferredLogFile {
    inner: SharedFile,
}

/// Activates a [`DeferredLogFile`] once the log directory is known.
#[derive(Clone)]
pub struct LogFileHandle {
    inner: SharedFile,
}

impl DeferredLogFile {
    pub fn new() -> (Self, LogFileHandle) {
        let inner = Arc::new(Mutex::new(None));
        (
            Self {
                inner: inner.clone(),
            },
            LogFileHandle { inner },
        )
    }
}

impl LogFileHandle {
    /// Create `logs_dir` if needed and start appending to the log file in it.
    /// Returns the path of the opened file.
    pub fn open(&self, logs_dir: &Path) -> std::io::Result<PathBuf> {
        fs::create_dir_all(logs_dir)?;
        let path = logs_dir.join(LOG_FILE_NAME);
        let file = OpenOptions::new().create(true).append(true).open(&path)?;
        *lock(&self.inner) = Some(file);
        Ok(path)
    }
}

/// Writer handed out per event; writes through to the file or drops bytes.
pub struct DeferredWriter {
    inner: SharedFile,
}

impl Write for DeferredWriter {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        match lock(&self.inner).as_mut() {
            Some(f) => f.write(buf),
            None => Ok(buf.len()),
        }
    }

    fn flush(&mut self) -> std::io::Result<()> {
        match lock(&self.inner).as_mut() {
            Some(f) => f.flush(),
            None => Ok(()),
        }
    }
}

impl<'a> MakeWriter<'a> for DeferredLogFile {
    type Writer = DeferredWriter;

    fn make_writer(&'a self) -> Self::Writer {
        DeferredWriter {
            inner: self.inner.clone(),
        }
    }
}
