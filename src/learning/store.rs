//! Learning store - durable state for the self-improvement loop
//!
//! Three artifacts live under the storage root:
//! - `training_buffer`: JSON array of results awaiting optimization
//! - `history/`: timestamp-keyed archive of consumed batches
//! - `instructions`: the current versioned instruction snapshot
//!
//! Buffer mutation is a whole-file read-modify-write performed under an
//! internal lock with no await point inside, so a foreground append and a
//! background consume can never interleave to lose or duplicate a result.
//! Malformed persisted JSON is recoverable everywhere: it reads as empty
//! or absent, never as a crash. The one fatal condition is an unwritable
//! storage medium, surfaced as [`StoreError::StorageFault`].

use chrono::Utc;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::types::{InstructionSnapshot, TrainingResult};

const BUFFER_FILE: &str = "training_buffer";
const INSTRUCTIONS_FILE: &str = "instructions";
const HISTORY_DIR: &str = "history";

/// Fatal storage failure. Not retried internally; the caller decides.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("storage medium unwritable at {path}: {source}")]
    StorageFault {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl StoreError {
    fn fault(path: &Path, source: std::io::Error) -> Self {
        StoreError::StorageFault {
            path: path.to_path_buf(),
            source,
        }
    }
}

/// Persistent learning state backed by flat JSON files.
pub struct LearningStore {
    base_dir: PathBuf,
    /// Serializes buffer read-modify-write cycles.
    buffer_lock: Mutex<()>,
}

impl LearningStore {
    /// Create a store at the default location (`<data_dir>/state`).
    pub fn new() -> anyhow::Result<Self> {
        let base_dir = crate::config::data_dir()?.join("state");
        Self::with_dir(base_dir)
    }

    /// Create a store rooted at a custom directory.
    pub fn with_dir(base_dir: impl Into<PathBuf>) -> anyhow::Result<Self> {
        use anyhow::Context;
        let base_dir = base_dir.into();
        std::fs::create_dir_all(base_dir.join(HISTORY_DIR))
            .context("Failed to create learning state directory")?;
        Ok(Self {
            base_dir,
            buffer_lock: Mutex::new(()),
        })
    }

    /// Append one result to the live training buffer.
    pub async fn append_result(&self, result: &TrainingResult) -> Result<(), StoreError> {
        let _guard = self.buffer_lock.lock().await;
        let mut buffer = self.read_buffer();
        buffer.push(result.clone());
        self.write_buffer(&buffer)?;
        debug!("Appended training result ({} buffered)", buffer.len());
        Ok(())
    }

    /// Non-destructive view of the buffered results, in insertion order.
    /// Safe to call repeatedly.
    pub async fn peek_buffer(&self) -> Vec<TrainingResult> {
        let _guard = self.buffer_lock.lock().await;
        self.read_buffer()
    }

    /// Atomically archive the current buffer under `history/` and clear it.
    ///
    /// An empty buffer returns an empty vec and creates no archive entry.
    /// Archive keys have second resolution; collisions get a `-N` suffix so
    /// two consumes in the same tick never overwrite each other.
    pub async fn consume_buffer(&self) -> Result<Vec<TrainingResult>, StoreError> {
        let _guard = self.buffer_lock.lock().await;
        let buffer = self.read_buffer();
        if buffer.is_empty() {
            return Ok(buffer);
        }

        let archive_path = self.next_archive_path();
        let json = encode_pretty(&buffer, &archive_path)?;
        std::fs::write(&archive_path, json).map_err(|e| StoreError::fault(&archive_path, e))?;
        self.write_buffer(&[])?;

        info!(
            "Archived {} training results to {}",
            buffer.len(),
            archive_path.display()
        );
        Ok(buffer)
    }

    /// Load the current instruction snapshot.
    ///
    /// `None` means no optimization pass has produced one yet (or the file
    /// was corrupt); the executor should fall back to built-in defaults.
    pub fn load_instructions(&self) -> Option<InstructionSnapshot> {
        let path = self.instructions_path();
        let contents = match std::fs::read_to_string(&path) {
            Ok(c) => c,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return None,
            Err(e) => {
                warn!("Failed to read {}: {}", path.display(), e);
                return None;
            }
        };
        match serde_json::from_str(&contents) {
            Ok(snapshot) => Some(snapshot),
            Err(e) => {
                warn!(
                    "Malformed instruction snapshot at {} ({}); using defaults",
                    path.display(),
                    e
                );
                None
            }
        }
    }

    /// Atomically overwrite the current instruction snapshot.
    ///
    /// Written to a temp file then renamed into place, so an interrupted
    /// write never leaves a partial snapshot behind.
    pub fn save_instructions(
        &self,
        instructions: HashMap<String, Option<String>>,
        score: f64,
        generation: u64,
    ) -> Result<InstructionSnapshot, StoreError> {
        let snapshot = InstructionSnapshot {
            instructions,
            score,
            generation,
            updated_at: Utc::now(),
        };

        let path = self.instructions_path();
        let tmp = path.with_extension("tmp");
        let json = encode_pretty(&snapshot, &path)?;
        std::fs::write(&tmp, json).map_err(|e| StoreError::fault(&tmp, e))?;
        std::fs::rename(&tmp, &path).map_err(|e| StoreError::fault(&path, e))?;

        info!(
            "Saved instruction snapshot generation {} (score {:.2})",
            generation, score
        );
        Ok(snapshot)
    }

    /// Archive file paths under `history/`, oldest first.
    pub fn archive_entries(&self) -> Vec<PathBuf> {
        let dir = self.base_dir.join(HISTORY_DIR);
        let mut entries: Vec<PathBuf> = match std::fs::read_dir(&dir) {
            Ok(rd) => rd.filter_map(|e| e.ok()).map(|e| e.path()).collect(),
            Err(_) => Vec::new(),
        };
        entries.sort();
        entries
    }

    /// Get the storage root.
    pub fn base_dir(&self) -> &Path {
        &self.base_dir
    }

    // --- File I/O ---

    fn buffer_path(&self) -> PathBuf {
        self.base_dir.join(BUFFER_FILE)
    }

    fn instructions_path(&self) -> PathBuf {
        self.base_dir.join(INSTRUCTIONS_FILE)
    }

    fn next_archive_path(&self) -> PathBuf {
        let dir = self.base_dir.join(HISTORY_DIR);
        let key = Utc::now().format("%Y%m%dT%H%M%S").to_string();
        let mut path = dir.join(format!("{}.json", key));
        let mut counter = 1u32;
        while path.exists() {
            path = dir.join(format!("{}-{}.json", key, counter));
            counter += 1;
        }
        path
    }

    fn read_buffer(&self) -> Vec<TrainingResult> {
        let path = self.buffer_path();
        let contents = match std::fs::read_to_string(&path) {
            Ok(c) => c,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Vec::new(),
            Err(e) => {
                warn!("Failed to read {}: {}", path.display(), e);
                return Vec::new();
            }
        };
        match serde_json::from_str(&contents) {
            Ok(buffer) => buffer,
            Err(e) => {
                warn!(
                    "Malformed training buffer at {} ({}); treating as empty",
                    path.display(),
                    e
                );
                Vec::new()
            }
        }
    }

    fn write_buffer(&self, buffer: &[TrainingResult]) -> Result<(), StoreError> {
        let path = self.buffer_path();
        let json = encode_pretty(&buffer, &path)?;
        std::fs::write(&path, json).map_err(|e| StoreError::fault(&path, e))
    }
}

fn encode_pretty<T: serde::Serialize>(value: &T, path: &Path) -> Result<String, StoreError> {
    serde_json::to_string_pretty(value)
        .map_err(|e| StoreError::fault(path, std::io::Error::from(e)))
}
