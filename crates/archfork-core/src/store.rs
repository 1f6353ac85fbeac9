use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::feed::validate_seed;
use crate::Arrangement;

const SESSION_FILE: &str = "session.json";

/// What gets written to disk: the arrangements and which one is active.
/// Evaluated rules are never part of it; they are recomputed on read.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct SessionSnapshot {
    pub arrangements: Vec<Arrangement>,
    pub active_id: String,
}

/// JSON file backend for sessions.
#[derive(Debug, Clone)]
pub struct SessionStore {
    dir: PathBuf,
}

impl Default for SessionStore {
    fn default() -> Self {
        SessionStore::new(crate::data_dir())
    }
}

impl SessionStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        SessionStore { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn path(&self) -> PathBuf {
        self.dir.join(SESSION_FILE)
    }

    /// Read the stored session. `Ok(None)` if nothing has been saved yet.
    pub fn load(&self) -> Result<Option<SessionSnapshot>> {
        let path = self.path();
        if !path.exists() {
            return Ok(None);
        }
        let raw = fs::read_to_string(&path)?;
        let snapshot: SessionSnapshot = serde_json::from_str(&raw)?;
        validate_seed(&snapshot.arrangements)?;
        tracing::info!(
            path = %path.display(),
            arrangements = snapshot.arrangements.len(),
            "loaded stored session"
        );
        Ok(Some(snapshot))
    }

    /// Write the session atomically (temp file + rename) so a reader never
    /// sees a half-written file.
    pub fn save(&self, snapshot: &SessionSnapshot) -> Result<()> {
        fs::create_dir_all(&self.dir)?;
        let json = serde_json::to_string_pretty(snapshot)?;
        let tmp = self.dir.join(format!(".{}.tmp", SESSION_FILE));
        fs::write(&tmp, json)?;
        fs::rename(&tmp, self.path())?;
        tracing::debug!(path = %self.path().display(), "saved session");
        Ok(())
    }

    pub fn clear(&self) -> Result<()> {
        let path = self.path();
        if path.exists() {
            fs::remove_file(&path)?;
        }
        Ok(())
    }
}
