//! JSONL-based journal backend.

use std::fs::{File, OpenOptions};
use std::io::{BufRead, BufReader, Write};
use std::path::{Path, PathBuf};

use fs2::FileExt;
use parking_lot::Mutex;

use super::{MemoryLog, Observation, RunLog};

/// A run log that appends every observation as one JSON line.
///
/// Observations are kept in memory for fast reads and simultaneously
/// persisted. Each record looks like
/// `{"id":3,"worker":1,"params":{"car_acc":1.25},"target":-0.42}`.
/// Writes hold an exclusive file lock, reads a shared one, so the file
/// can be tailed or audited by other processes while the run goes on.
///
/// # Examples
///
/// ```no_run
/// use calibrate::log::JournalLog;
///
/// let log = JournalLog::new("merge_run.jsonl");
/// ```
pub struct JournalLog {
    memory: MemoryLog,
    path: PathBuf,
    /// Serialise in-process writes so we only hold the file lock briefly.
    write_lock: Mutex<()>,
}

impl JournalLog {
    /// Creates a journal that appends to the given path.
    ///
    /// The file is created on the first write. Records already in the
    /// file are kept on disk but not loaded; use [`JournalLog::open`] to
    /// read them.
    #[must_use]
    pub fn new(path: impl AsRef<Path>) -> Self {
        Self {
            memory: MemoryLog::new(),
            path: path.as_ref().to_path_buf(),
            write_lock: Mutex::new(()),
        }
    }

    /// Opens an existing journal and loads every stored observation.
    ///
    /// If the file does not exist, returns an empty journal (no error).
    ///
    /// # Errors
    ///
    /// Returns a [`Storage`](crate::Error::Storage) error if the file
    /// exists but cannot be read or parsed.
    pub fn open(path: impl AsRef<Path>) -> crate::Result<Self> {
        let path = path.as_ref().to_path_buf();
        let observations = load_observations(&path)?;
        Ok(Self {
            memory: MemoryLog::with_observations(observations),
            path,
            write_lock: Mutex::new(()),
        })
    }

    /// Path of the journal file.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn write_to_file(&self, observation: &Observation) -> crate::Result<()> {
        let _guard = self.write_lock.lock();

        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .map_err(|e| crate::Error::Storage(e.to_string()))?;

        file.lock_exclusive()
            .map_err(|e| crate::Error::Storage(e.to_string()))?;

        let line = serde_json::to_string(observation)
            .map_err(|e| crate::Error::Storage(e.to_string()))?;

        writeln!(file, "{line}").map_err(|e| crate::Error::Storage(e.to_string()))?;
        file.flush()
            .map_err(|e| crate::Error::Storage(e.to_string()))?;

        file.unlock()
            .map_err(|e| crate::Error::Storage(e.to_string()))?;

        Ok(())
    }
}

impl RunLog for JournalLog {
    fn append(&self, observation: Observation) -> crate::Result<()> {
        let written = self.write_to_file(&observation);
        // The observation stays readable in memory even if the write failed.
        self.memory.append(observation)?;
        written
    }

    fn observations(&self) -> Vec<Observation> {
        self.memory.observations()
    }

    fn len(&self) -> usize {
        self.memory.len()
    }
}

/// Read all observations from a JSONL journal. Returns an empty vec if
/// the file does not exist; blank lines are skipped.
///
/// # Errors
///
/// Returns a [`Storage`](crate::Error::Storage) error if the file exists
/// but cannot be read, or a line is not a valid record.
pub fn load_observations(path: &Path) -> crate::Result<Vec<Observation>> {
    let file = match File::open(path) {
        Ok(f) => f,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
        Err(e) => return Err(crate::Error::Storage(e.to_string())),
    };

    file.lock_shared()
        .map_err(|e| crate::Error::Storage(e.to_string()))?;

    let reader = BufReader::new(&file);
    let mut observations = Vec::new();

    for line in reader.lines() {
        let line = line.map_err(|e| crate::Error::Storage(e.to_string()))?;
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        let observation: Observation =
            serde_json::from_str(line).map_err(|e| crate::Error::Storage(e.to_string()))?;
        observations.push(observation);
    }

    file.unlock()
        .map_err(|e| crate::Error::Storage(e.to_string()))?;

    Ok(observations)
}
