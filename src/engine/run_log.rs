use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::Path;
use std::sync::Arc;

use chrono::Local;
use parking_lot::Mutex;

/// Per-run plain-text log, written next to the derivatives of the run.
///
/// Every line also goes through `tracing`, so a disabled file sink still
/// leaves console output. Cheap to clone; all clones append to one file.
#[derive(Debug, Clone, Default)]
pub struct RunLog {
    file: Option<Arc<Mutex<File>>>,
}

impl RunLog {
    /// A log that only forwards to `tracing`.
    pub fn disabled() -> Self {
        RunLog::default()
    }

    /// Append to `path`, creating parent directories as needed.
    pub fn to_file(path: &Path) -> std::io::Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let file = OpenOptions::new().create(true).append(true).open(path)?;
        Ok(RunLog {
            file: Some(Arc::new(Mutex::new(file))),
        })
    }

    pub fn line(&self, message: &str) {
        tracing::info!("{message}");
        if let Some(file) = &self.file {
            let stamp = Local::now().format("%Y-%m-%d %H:%M:%S");
            let mut file = file.lock();
            // A failed log write must never fail the run.
            let _ = writeln!(file, "[{stamp}] {message}");
        }
    }
}
