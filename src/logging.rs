use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use parking_lot::Mutex;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::fmt::MakeWriter;

pub const LOG_FILE: &str = "agentdesk.log";

/// Appends formatted events to the log file, optionally echoing them to
/// stderr so the interactive prompt on stdout stays clean.
#[derive(Clone)]
pub(crate) struct FileMakeWriter {
    file: Arc<Mutex<File>>,
    mirror_stderr: bool,
}

impl FileMakeWriter {
    pub(crate) fn open(path: &Path, mirror_stderr: bool) -> Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("failed to create {}", parent.display()))?;
        }
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .with_context(|| format!("failed to open log file {}", path.display()))?;
        Ok(Self {
            file: Arc::new(Mutex::new(file)),
            mirror_stderr,
        })
    }
}

impl<'a> MakeWriter<'a> for FileMakeWriter {
    type Writer = FileWriter;

    fn make_writer(&'a self) -> Self::Writer {
        FileWriter {
            file: Arc::clone(&self.file),
            mirror_stderr: self.mirror_stderr,
        }
    }
}

pub(crate) struct FileWriter {
    file: Arc<Mutex<File>>,
    mirror_stderr: bool,
}

impl Write for FileWriter {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        self.file.lock().write_all(buf)?;
        if self.mirror_stderr {
            std::io::stderr().write_all(buf)?;
        }
        Ok(buf.len())
    }

    fn flush(&mut self) -> std::io::Result<()> {
        self.file.lock().flush()?;
        if self.mirror_stderr {
            std::io::stderr().flush()?;
        }
        Ok(())
    }
}

pub fn log_path(data_dir: &Path) -> PathBuf {
    data_dir.join(LOG_FILE)
}

/// Installs the global subscriber. `RUST_LOG` wins over `level`.
pub fn init(data_dir: &Path, level: &str, mirror_stderr: bool) -> Result<PathBuf> {
    let path = log_path(data_dir);
    let writer = FileMakeWriter::open(&path, mirror_stderr)?;
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(level))
        .unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(writer)
        .with_ansi(false)
        .with_target(false)
        .try_init()
        .map_err(|e| anyhow::anyhow!("failed to install log subscriber: {}", e))?;
    Ok(path)
}
