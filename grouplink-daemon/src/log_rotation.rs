//! The daemon's log files and their size-based rotation.
//!
//! `daemon.log` becomes `daemon.log.1`, older copies shift up by one and the
//! copy past [`RotationPolicy::max_files`] is dropped.

use std::fs::{self, File, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use tracing_subscriber::fmt::MakeWriter;

/// 10 MiB.
pub const MAX_LOG_BYTES: u64 = 10 * 1024 * 1024;
pub const MAX_ROTATED_FILES: usize = 5;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RotationPolicy {
    pub max_bytes: u64,
    pub max_files: usize,
}

impl Default for RotationPolicy {
    fn default() -> Self {
        Self {
            max_bytes: MAX_LOG_BYTES,
            max_files: MAX_ROTATED_FILES,
        }
    }
}

impl RotationPolicy {
    /// Rotate `log_path` once it has reached `max_bytes`.
    ///
    /// Returns `true` if a rotation happened. A missing log file is not an
    /// error and never rotates.
    pub fn rotate_if_needed(&self, log_path: &Path) -> io::Result<bool> {
        let size = match fs::metadata(log_path) {
            Ok(meta) => meta.len(),
            Err(err) if err.kind() == io::ErrorKind::NotFound => return Ok(false),
            Err(err) => return Err(err),
        };
        if size < self.max_bytes {
            return Ok(false);
        }

        let oldest = numbered_path(log_path, self.max_files);
        if oldest.exists() {
            fs::remove_file(&oldest)?;
        }
        for n in (1..self.max_files).rev() {
            let src = numbered_path(log_path, n);
            if src.exists() {
                fs::rename(&src, numbered_path(log_path, n + 1))?;
            }
        }
        fs::rename(log_path, numbered_path(log_path, 1))?;

        // Writers reopen the path per event, so the next line lands here.
        fs::OpenOptions::new()
            .create(true)
            .truncate(true)
            .write(true)
            .open(log_path)?;
        Ok(true)
    }
}

/// Rotate both daemon logs under `home` with the default policy.
///
/// Failures are logged per file and never stop the daemon.
pub fn rotate_logs(home: &Path) {
    let policy = RotationPolicy::default();
    for log_path in [
        crate::paths::stdout_log_path(home),
        crate::paths::stderr_log_path(home),
    ] {
        match policy.rotate_if_needed(&log_path) {
            Ok(true) => tracing::info!(path = %log_path.display(), "log file rotated"),
            Ok(false) => {}
            Err(err) => {
                tracing::warn!(path = %log_path.display(), error = %err, "log rotation failed")
            }
        }
    }
}

/// A `tracing-subscriber` writer that appends each event to `path`.
///
/// The file is opened per event, so a rotation takes effect on the next
/// line. Lines are dropped while the file cannot be opened.
#[derive(Debug, Clone)]
pub struct AppendLog {
    path: PathBuf,
}

impl AppendLog {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

pub struct AppendWriter(Option<File>);

impl Write for AppendWriter {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        match self.0.as_mut() {
            Some(file) => file.write(buf),
            None => Ok(buf.len()),
        }
    }

    fn flush(&mut self) -> io::Result<()> {
        match self.0.as_mut() {
            Some(file) => file.flush(),
            None => Ok(()),
        }
    }
}

impl<'a> MakeWriter<'a> for AppendLog {
    type Writer = AppendWriter;

    fn make_writer(&'a self) -> Self::Writer {
        AppendWriter(
            OpenOptions::new()
                .create(true)
                .append(true)
                .open(&self.path)
                .ok(),
        )
    }
}

/// `daemon.log` → `daemon.log.<n>`
fn numbered_path(base: &Path, n: usize) -> PathBuf {
    let name = base
        .file_name()
        .and_then(|s| s.to_str())
        .unwrap_or(crate::paths::DAEMON_STDOUT_LOG);
    base.with_file_name(format!("{name}.{n}"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    const SMALL: RotationPolicy = RotationPolicy {
        max_bytes: 64,
        max_files: 3,
    };

    fn write_log(path: &Path, bytes: usize, fill: u8) {
        fs::write(path, vec![fill; bytes]).unwrap();
    }

    #[test]
    fn small_files_stay_put() {
        let dir = TempDir::new().unwrap();
        let log = dir.path().join("daemon.log");
        write_log(&log, 10, b'a');
        assert!(!SMALL.rotate_if_needed(&log).unwrap());
        assert!(!numbered_path(&log, 1).exists());
    }

    #[test]
    fn oversized_file_moves_to_first_copy() {
        let dir = TempDir::new().unwrap();
        let log = dir.path().join("daemon.log");
        write_log(&log, 65, b'a');

        assert!(SMALL.rotate_if_needed(&log).unwrap());
        assert_eq!(fs::metadata(&log).unwrap().len(), 0);
        assert_eq!(fs::read(numbered_path(&log, 1)).unwrap().len(), 65);
    }

    #[test]
    fn copies_are_capped_and_shifted_newest_first() {
        let dir = TempDir::new().unwrap();
        let log = dir.path().join("daemon.log");
        for fill in [b'1', b'2', b'3', b'4'] {
            write_log(&log, 64, fill);
            SMALL.rotate_if_needed(&log).unwrap();
        }

        assert_eq!(fs::read(numbered_path(&log, 1)).unwrap()[0], b'4');
        assert_eq!(fs::read(numbered_path(&log, 3)).unwrap()[0], b'2');
        assert!(!numbered_path(&log, 4).exists());
    }

    #[test]
    fn missing_file_is_not_an_error() {
        let dir = TempDir::new().unwrap();
        assert!(!SMALL.rotate_if_needed(&dir.path().join("absent.log")).unwrap());
    }

    #[test]
    fn append_log_follows_the_path_across_rotation() {
        let dir = TempDir::new().unwrap();
        let log = dir.path().join("daemon.log");
        let writer = AppendLog::new(&log);

        writer.make_writer().write_all(&[b'x'; 70]).unwrap();
        assert!(SMALL.rotate_if_needed(&log).unwrap());
        writer.make_writer().write_all(b"after\n").unwrap();

        assert_eq!(fs::read_to_string(&log).unwrap(), "after\n");
        assert_eq!(fs::read(numbered_path(&log, 1)).unwrap().len(), 70);
    }

    #[test]
    fn append_log_drops_lines_when_the_directory_is_missing() {
        let dir = TempDir::new().unwrap();
        let writer = AppendLog::new(dir.path().join("missing").join("daemon.log"));
        assert_eq!(writer.make_writer().write(b"lost").unwrap(), 4);
        assert!(!writer.path().exists());
    }

    #[test]
    fn default_policy_uses_ten_mebibytes_and_five_copies() {
        let policy = RotationPolicy::default();
        assert_eq!(policy.max_bytes, 10 * 1024 * 1024);
        assert_eq!(policy.max_files, 5);
    }
}
