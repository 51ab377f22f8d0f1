use std::fs::{File, OpenOptions};
use std::io::{self, Write};
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use tracing_subscriber::{fmt::writer::BoxMakeWriter, EnvFilter};

pub const LOG_LEVEL_ENV: &str = "CCD_LOG_LEVEL";
const LOG_FILE_NAME: &str = "ccd-console.log";

/// Keeps the log file open for the life of the process.
pub struct LogGuard {
    file: Option<Arc<Mutex<File>>>,
}

/// Stdout carries command output, so logs go to stderr and the optional file.
pub fn init_logging(log_dir: &str) -> Option<LogGuard> {
    let level = std::env::var(LOG_LEVEL_ENV)
        .ok()
        .filter(|level| !level.trim().is_empty())
        .unwrap_or_else(|| "warn".to_string());
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    let guard = match open_log_file(log_dir) {
        Ok(guard) => guard,
        Err(err) => {
            eprintln!("log_file_error: {err}");
            LogGuard { file: None }
        }
    };
    let file = guard.file.clone();
    let make_writer = BoxMakeWriter::new(move || MultiWriter::new(file.clone()));
    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(make_writer)
        .finish();
    if tracing::subscriber::set_global_default(subscriber).is_err() {
        return None;
    }
    Some(guard)
}

struct MultiWriter {
    stderr: io::Stderr,
    file: Option<Arc<Mutex<File>>>,
}

impl MultiWriter {
    fn new(file: Option<Arc<Mutex<File>>>) -> Self {
        Self {
            stderr: io::stderr(),
            file,
        }
    }
}

impl Write for MultiWriter {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let _ = self.stderr.write_all(buf);
        if let Some(file) = &self.file {
            if let Ok(mut file) = file.lock() {
                let _ = file.write_all(buf);
            }
        }
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        let _ = self.stderr.flush();
        if let Some(file) = &self.file {
            if let Ok(mut file) = file.lock() {
                let _ = file.flush();
            }
        }
        Ok(())
    }
}

fn open_log_file(log_dir: &str) -> io::Result<LogGuard> {
    if log_dir.trim().is_empty() {
        return Ok(LogGuard { file: None });
    }
    let dir = PathBuf::from(log_dir.trim());
    std::fs::create_dir_all(&dir)?;
    let file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(dir.join(LOG_FILE_NAME))?;
    Ok(LogGuard {
        file: Some(Arc::new(Mutex::new(file))),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::{SystemTime, UNIX_EPOCH};

    fn scratch_dir() -> PathBuf {
        let nanos = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .expect("clock")
            .as_nanos();
        std::env::temp_dir().join(format!("ccd-console-log-{}-{nanos}", std::process::id()))
    }

    #[test]
    fn blank_log_dir_disables_file() {
        let guard = open_log_file("  ").expect("guard");
        assert!(guard.file.is_none());
    }

    #[test]
    fn writer_appends_to_log_file() {
        let dir = scratch_dir();
        let guard = open_log_file(dir.to_str().expect("utf8 path")).expect("guard");
        let mut writer = MultiWriter::new(guard.file.clone());
        writer.write_all(b"first\n").expect("write");
        writer.write_all(b"second\n").expect("write");
        writer.flush().expect("flush");

        let content = std::fs::read_to_string(dir.join(LOG_FILE_NAME)).expect("read log");
        assert_eq!(content, "first\nsecond\n");
        let _ = std::fs::remove_dir_all(dir);
    }
}
