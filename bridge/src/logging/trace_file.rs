use std::fs::{self, File, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use tracing_subscriber::fmt::MakeWriter;

/// Append-only trace file opened on the first event that reaches it
///
/// Missing parent directories are created, and a file removed while the
/// service runs is recreated by the next event.
#[derive(Debug, Clone)]
pub struct TraceFile {
    path:   PathBuf,
    handle: Arc<Mutex<Option<File>>>,
}

impl TraceFile {
    /// Trace file at `path`
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path:   path.into(),
            handle: Arc::new(Mutex::new(None)),
        }
    }

    /// Location of the file
    pub fn path(&self) -> &Path { &self.path }
}

/// Writer for one formatted event
#[derive(Debug)]
pub struct TraceFileWriter {
    path:   PathBuf,
    handle: Arc<Mutex<Option<File>>>,
}

impl TraceFileWriter {
    fn with_file<T>(&self, op: impl Fn(&mut File) -> io::Result<T>) -> io::Result<T> {
        let mut slot = self
            .handle
            .lock()
            .map_err(|_| io::Error::other("trace file lock poisoned"))?;
        if slot.is_none() || !self.path.exists() {
            *slot = Some(open_append(&self.path)?);
        }
        if let Some(file) = slot.as_mut()
            && let Ok(value) = op(file)
        {
            return Ok(value);
        }

        // stale handle
        let mut file = open_append(&self.path)?;
        let value = op(&mut file)?;
        *slot = Some(file);
        Ok(value)
    }
}

fn open_append(path: &Path) -> io::Result<File> {
    if let Some(parent) = path.parent()
        && !parent.as_os_str().is_empty()
    {
        fs::create_dir_all(parent)?;
    }
    OpenOptions::new().create(true).append(true).open(path)
}

impl Write for TraceFileWriter {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> { self.with_file(|file| file.write(buf)) }

    fn flush(&mut self) -> io::Result<()> {
        if !self.path.exists() {
            return Ok(());
        }
        self.with_file(File::flush)
    }
}

impl<'a> MakeWriter<'a> for TraceFile {
    type Writer = TraceFileWriter;

    fn make_writer(&'a self) -> Self::Writer {
        TraceFileWriter {
            path:   self.path.clone(),
            handle: Arc::clone(&self.handle),
        }
    }
}
