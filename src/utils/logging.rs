// backup-database/src/utils/logging.rs
//! Console + rotating file logging.
//!
//! The console sink is installed at startup. The file sink can only be
//! attached once the config file has told us where `log_dir` is, so it sits
//! behind a reload handle and starts out empty.

use std::fs::{self, File, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use tracing_subscriber::fmt::format::{DefaultFields, Format, Full};
use tracing_subscriber::fmt::time::ChronoLocal;
use tracing_subscriber::registry::LookupSpan;
use tracing_subscriber::util::TryInitError;
use tracing_subscriber::{EnvFilter, Registry, fmt, layer::SubscriberExt, reload, util::SubscriberInitExt};

use crate::errors::{BackupError, Result};

/// Roll the log file over once it would grow past 1 MiB.
pub const LOG_MAX_BYTES: u64 = 1_048_576;
/// Number of rolled-over files kept next to the live one.
pub const LOG_BACKUP_COUNT: usize = 10;
const FILE_TIME_FORMAT: &str = "%m-%d-%Y %H:%M:%S";

type FileLayer<S = Registry> =
    fmt::Layer<S, DefaultFields, Format<Full, ChronoLocal>, Mutex<RotatingFile>>;

/// File lines look like `10-19-2026 10:48:00  INFO message`.
fn file_layer<S>(writer: RotatingFile) -> FileLayer<S>
where
    S: tracing::Subscriber + for<'a> LookupSpan<'a>,
{
    fmt::layer()
        .with_timer(ChronoLocal::new(FILE_TIME_FORMAT.to_string()))
        .with_target(false)
        .with_ansi(false)
        .with_writer(Mutex::new(writer))
}

pub struct LogHandle {
    file: reload::Handle<Option<FileLayer>, Registry>,
}

/// Installs the global subscriber. `RUST_LOG` overrides `default_level`.
pub fn init(default_level: &str) -> std::result::Result<LogHandle, TryInitError> {
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    let (file_layer, file) = reload::Layer::new(None::<FileLayer>);
    let console_layer = fmt::layer()
        .without_time()
        .with_level(false)
        .with_target(false)
        .with_ansi(false)
        .with_writer(io::stderr);

    tracing_subscriber::registry()
        .with(file_layer)
        .with(console_layer)
        .with(env_filter)
        .try_init()?;

    Ok(LogHandle { file })
}

impl LogHandle {
    /// Starts mirroring every message into `path`, rotated by size.
    pub fn attach_file(&self, path: &Path) -> Result<()> {
        let log_error = |source: io::Error| BackupError::LogFile {
            path: path.to_path_buf(),
            source,
        };
        let writer = RotatingFile::open(path, LOG_MAX_BYTES, LOG_BACKUP_COUNT).map_err(log_error)?;
        self.file
            .reload(Some(file_layer(writer)))
            .map_err(|e| log_error(io::Error::other(e.to_string())))
    }
}

/// Size-bounded log file keeping `backup_count` older generations as
/// `<path>.1` (newest) up to `<path>.<backup_count>` (oldest).
#[derive(Debug)]
pub struct RotatingFile {
    path: PathBuf,
    file: File,
    written: u64,
    max_bytes: u64,
    backup_count: usize,
}

impl RotatingFile {
    pub fn open(path: &Path, max_bytes: u64, backup_count: usize) -> io::Result<Self> {
        let file = OpenOptions::new().create(true).append(true).open(path)?;
        let written = file.metadata()?.len();
        Ok(RotatingFile {
            path: path.to_path_buf(),
            file,
            written,
            max_bytes,
            backup_count,
        })
    }

    fn backup_path(&self, index: usize) -> PathBuf {
        let mut name = self.path.as_os_str().to_owned();
        name.push(format!(".{}", index));
        PathBuf::from(name)
    }

    fn rotate(&mut self) -> io::Result<()> {
        self.file.flush()?;
        for index in (1..self.backup_count).rev() {
            let older = self.backup_path(index);
            if older.exists() {
                fs::rename(&older, self.backup_path(index + 1))?;
            }
        }
        fs::rename(&self.path, self.backup_path(1))?;
        self.file = OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(true)
            .open(&self.path)?;
        self.written = 0;
        Ok(())
    }
}

impl Write for RotatingFile {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let rotation_enabled = self.max_bytes > 0 && self.backup_count > 0;
        if rotation_enabled && self.written > 0 && self.written + buf.len() as u64 > self.max_bytes {
            self.rotate()?;
        }
        let n = self.file.write(buf)?;
        self.written += n as u64;
        Ok(n)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.file.flush()
    }
}
