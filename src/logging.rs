use std::{
    io::{self, Write},
    path::{Path, PathBuf},
};

use anyhow::Context;
use env_logger::{Builder, Env, Target};
use file_rotate::{
    compression::Compression,
    suffix::{AppendTimestamp, FileLimit},
    ContentLimit, FileRotate,
};

pub const LOG_FILE: &str = "easyland.log";

/// Size at which the log file is rotated.
const ROTATE_BYTES: usize = 10 * 1024 * 1024;
/// Rotated files older than this are removed.
const RETENTION_DAYS: i64 = 10;

/// Copies every record to stderr and to a second writer.
struct Tee<W> {
    file: W,
}

impl<W: Write> Write for Tee<W> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        // A closed terminal must not stop the file sink.
        let _ = io::stderr().write_all(buf);
        self.file.write_all(buf)?;
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        let _ = io::stderr().flush();
        self.file.flush()
    }
}

/// Log file under `$XDG_STATE_HOME/easyland`, creating the directory.
pub fn default_log_path() -> anyhow::Result<PathBuf> {
    xdg::BaseDirectories::with_prefix("easyland")
        .place_state_file(LOG_FILE)
        .context("Failed to resolve log directory")
}

/// `path` rotated at 10 MB, old files gzip-compressed and kept for 10 days.
pub fn rotating_file(path: &Path) -> FileRotate<AppendTimestamp> {
    FileRotate::new(
        path,
        AppendTimestamp::default(FileLimit::Age(chrono::Duration::days(RETENTION_DAYS))),
        ContentLimit::BytesSurpassed(ROTATE_BYTES),
        Compression::OnRotate(0),
        #[cfg(unix)]
        None,
    )
}

/// Sets up `env_logger` with `info` as the default filter. With a log file,
/// records go to both stderr and the rotating file.
pub fn init(log_file: Option<&Path>) {
    let mut builder = Builder::from_env(Env::default().default_filter_or("info"));
    if let Some(path) = log_file {
        builder.target(Target::Pipe(Box::new(Tee {
            file: rotating_file(path),
        })));
    }
    builder.init();
}
