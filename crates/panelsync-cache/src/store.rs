use std::path::{Path, PathBuf};

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use crate::error::CacheError;

/// On-disk cache entry: `{"panel": <string>, "saved_at": <ISO-8601>}`.
///
/// Shared across process runs. This store is the sole writer; concurrent
/// writers from other processes are not guarded against (last write wins).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PanelCacheEntry {
    pub panel: String,
    pub saved_at: DateTime<Utc>,
}

/// File-backed cache for the discovered panel label.
///
/// The cache is an optimization, not a correctness dependency: a missing,
/// unreadable, unparsable, or expired file is a miss, never an error.
pub struct PanelStore {
    path: PathBuf,
    ttl: Duration,
}

impl PanelStore {
    pub fn new(path: impl Into<PathBuf>, ttl_hours: u64) -> Self {
        Self {
            path: path.into(),
            ttl: Duration::hours(ttl_hours as i64),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// The cached label, if the entry exists and is younger than the TTL.
    pub fn load(&self) -> Option<String> {
        self.load_at(Utc::now())
    }

    pub fn load_at(&self, now: DateTime<Utc>) -> Option<String> {
        let raw = match std::fs::read_to_string(&self.path) {
            Ok(raw) => raw,
            Err(e) => {
                tracing::debug!(path = %self.path.display(), error = %e, "No readable panel cache");
                return None;
            }
        };

        let entry: PanelCacheEntry = match serde_json::from_str(&raw) {
            Ok(entry) => entry,
            Err(e) => {
                tracing::debug!(path = %self.path.display(), error = %e, "Unparsable panel cache");
                return None;
            }
        };

        if now - entry.saved_at > self.ttl {
            tracing::debug!(panel = %entry.panel, saved_at = %entry.saved_at, "Panel cache expired");
            return None;
        }

        Some(entry.panel)
    }

    /// Persist the label with the current instant.
    pub fn save(&self, panel: &str) -> Result<(), CacheError> {
        self.save_at(panel, Utc::now())
    }

    pub fn save_at(&self, panel: &str, now: DateTime<Utc>) -> Result<(), CacheError> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        let entry = PanelCacheEntry {
            panel: panel.to_string(),
            saved_at: now,
        };
        std::fs::write(&self.path, serde_json::to_string(&entry)?)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn store_in(dir: &tempfile::TempDir) -> PanelStore {
        PanelStore::new(dir.path().join("panel.json"), 24)
    }

    #[test]
    fn save_then_load() {
        let dir = tempfile::tempdir().unwrap();
        let store = store_in(&dir);
        store.save("Merval").unwrap();
        assert_eq!(store.load(), Some("Merval".to_string()));
    }

    #[test]
    fn missing_file_is_a_miss() {
        let dir = tempfile::tempdir().unwrap();
        let store = store_in(&dir);
        assert_eq!(store.load(), None);
    }

    #[test]
    fn unparsable_file_is_a_miss() {
        let dir = tempfile::tempdir().unwrap();
        let store = store_in(&dir);
        std::fs::write(store.path(), "not json at all").unwrap();
        assert_eq!(store.load(), None);
    }

    #[test]
    fn entry_within_ttl_is_reused() {
        let dir = tempfile::tempdir().unwrap();
        let store = store_in(&dir);
        let now = Utc::now();
        store.save_at("Merval", now - Duration::hours(23)).unwrap();
        assert_eq!(store.load_at(now), Some("Merval".to_string()));
    }

    #[test]
    fn entry_past_ttl_is_a_miss() {
        let dir = tempfile::tempdir().unwrap();
        let store = store_in(&dir);
        let now = Utc::now();
        store.save_at("Merval", now - Duration::hours(25)).unwrap();
        assert_eq!(store.load_at(now), None);
    }

    #[test]
    fn save_creates_parent_directories() {
        let dir = tempfile::tempdir().unwrap();
        let store = PanelStore::new(dir.path().join("nested/cache/panel.json"), 24);
        store.save("General").unwrap();
        assert_eq!(store.load(), Some("General".to_string()));
    }

    #[test]
    fn save_to_unwritable_path_errors() {
        let dir = tempfile::tempdir().unwrap();
        // The cache path is an existing directory, so the write must fail.
        let store = PanelStore::new(dir.path(), 24);
        assert!(store.save("Merval").is_err());
    }
}
