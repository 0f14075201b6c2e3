//! State persistence: atomic writes, backups, locking, and migrations.
//!
//! The state file is single-writer. Writes go to a sibling temp file which
//! is fsynced and renamed over the original; the previous version is kept
//! as `.bak`. Concurrent scans are rejected with an advisory lock rather
//! than detected after the damage.

use anyhow::{Context, Result};
use fs2::FileExt;
use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

use crate::errors::FatalError;
use crate::state::{State, STATE_VERSION};

pub const TOOL_DIR: &str = ".codegauge";
pub const STATE_FILE: &str = "state.json";
pub const LOCK_FILE: &str = "state.lock";

pub fn tool_dir(repo_root: &Path) -> PathBuf {
    repo_root.join(TOOL_DIR)
}

pub fn state_path(repo_root: &Path) -> PathBuf {
    tool_dir(repo_root).join(STATE_FILE)
}

fn backup_path(state_path: &Path) -> PathBuf {
    let mut os = state_path.as_os_str().to_owned();
    os.push(".bak");
    PathBuf::from(os)
}

/// Advisory single-writer lock, held for the duration of a scan. Dropping
/// the guard releases the lock.
pub struct ScanLock {
    _file: File,
    path: PathBuf,
}

impl ScanLock {
    pub fn acquire(repo_root: &Path) -> Result<Self> {
        let dir = tool_dir(repo_root);
        std::fs::create_dir_all(&dir)?;
        let path = dir.join(LOCK_FILE);
        let file = OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(false)
            .open(&path)?;
        file.try_lock_exclusive()
            .map_err(|_| FatalError::ScanInProgress { path: path.clone() })?;
        debug!("acquired scan lock at {}", path.display());
        Ok(Self { _file: file, path })
    }
}

impl Drop for ScanLock {
    fn drop(&mut self) {
        debug!("released scan lock at {}", self.path.display());
    }
}

/// Load state, migrating older schema versions in place. A missing file is
/// a fresh state; an unparseable file or a newer version is fatal and the
/// file is left untouched.
pub fn load_state(repo_root: &Path) -> Result<State> {
    let path = state_path(repo_root);
    if !path.exists() {
        return Ok(State::new());
    }
    let raw = std::fs::read_to_string(&path)
        .with_context(|| format!("reading {}", path.display()))?;

    let mut value: serde_json::Value =
        serde_json::from_str(&raw).map_err(|e| FatalError::StateCorrupt {
            path: path.clone(),
            backup: backup_path(&path),
            detail: e.to_string(),
        })?;

    let version = value
        .get("version")
        .and_then(serde_json::Value::as_u64)
        .unwrap_or(0) as u32;
    if version > STATE_VERSION {
        return Err(FatalError::StateVersionTooNew {
            found: version,
            supported: STATE_VERSION,
        }
        .into());
    }
    if version < STATE_VERSION {
        info!("migrating state schema v{version} -> v{STATE_VERSION}");
        migrate(&mut value, version);
    }

    serde_json::from_value(value).map_err(|e| {
        FatalError::StateCorrupt {
            path: path.clone(),
            backup: backup_path(&path),
            detail: e.to_string(),
        }
        .into()
    })
}

/// Stepwise migrations. Each step upgrades one version; unknown fields are
/// filled with defaults by serde on the final deserialize.
fn migrate(value: &mut serde_json::Value, mut version: u32) {
    let Some(object) = value.as_object_mut() else {
        return;
    };
    while version < STATE_VERSION {
        match version {
            // v1 predates the integrity guard.
            1 => {
                object
                    .entry("subjective_integrity")
                    .or_insert_with(|| serde_json::json!({}));
            }
            // v2 predates concern dismissals and the scan counter.
            2 => {
                object
                    .entry("concern_dismissals")
                    .or_insert_with(|| serde_json::json!({}));
                object.entry("scan_count").or_insert_with(|| 0.into());
            }
            _ => {}
        }
        version += 1;
    }
    object.insert("version".into(), STATE_VERSION.into());
}

/// Atomic replace: temp file, fsync, backup the current file, rename.
/// If the rename fails the previous state is intact and the temp file is
/// surfaced for diagnosis.
pub fn save_state(repo_root: &Path, state: &State) -> Result<()> {
    let dir = tool_dir(repo_root);
    std::fs::create_dir_all(&dir)?;
    let path = state_path(repo_root);
    write_json_atomic(&path, state)
}

/// Shared atomic-write path for state, plan, and query snapshots.
pub fn write_json_atomic<T: serde::Serialize>(path: &Path, value: &T) -> Result<()> {
    let mut json = serde_json::to_string_pretty(value)?;
    json.push('\n');

    let temp_path = path.with_extension("json.tmp");
    {
        let mut temp = File::create(&temp_path)
            .with_context(|| format!("creating {}", temp_path.display()))?;
        temp.write_all(json.as_bytes())?;
        temp.sync_all()?;
    }

    if path.exists() {
        let backup = backup_path(path);
        if let Err(e) = std::fs::copy(path, &backup) {
            warn!("could not refresh backup {}: {e}", backup.display());
        }
    }

    std::fs::rename(&temp_path, path).map_err(|e| {
        FatalError::AtomicWrite {
            temp_path: temp_path.clone(),
            detail: e.to_string(),
        }
    })?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Finding, FindingStatus};
    use crate::registry::DetectorKind;
    use chrono::Utc;

    #[test]
    fn test_load_missing_is_fresh() {
        let dir = tempfile::tempdir().unwrap();
        let state = load_state(dir.path()).unwrap();
        assert_eq!(state.version, STATE_VERSION);
        assert!(state.findings.is_empty());
    }

    #[test]
    fn test_save_load_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let mut state = State::new();
        let now = Utc::now();
        state.findings.insert(
            "smells::a.py::f".into(),
            Finding {
                id: "smells::a.py::f".into(),
                detector: DetectorKind::Smells,
                file: "a.py".into(),
                tier: Default::default(),
                confidence: Default::default(),
                status: FindingStatus::Open,
                summary: "issue".into(),
                first_seen: now,
                last_seen: now,
                resolved_at: None,
                reopen_count: 0,
                suppressed: false,
                suppression_pattern: None,
                suppressed_at: None,
                resolution_attestation: None,
                zone: Default::default(),
                lang: "python".into(),
                detail: Default::default(),
            },
        );
        save_state(dir.path(), &state).unwrap();
        let loaded = load_state(dir.path()).unwrap();
        assert_eq!(loaded, state);
    }

    #[test]
    fn test_save_keeps_backup_of_previous_version() {
        let dir = tempfile::tempdir().unwrap();
        let mut state = State::new();
        save_state(dir.path(), &state).unwrap();
        state.stats.files = 42;
        save_state(dir.path(), &state).unwrap();

        let backup = backup_path(&state_path(dir.path()));
        assert!(backup.exists());
        let previous: State =
            serde_json::from_str(&std::fs::read_to_string(backup).unwrap()).unwrap();
        assert_eq!(previous.stats.files, 0);
    }

    #[test]
    fn test_corrupt_state_is_fatal_and_untouched() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(tool_dir(dir.path())).unwrap();
        std::fs::write(state_path(dir.path()), "{ not json").unwrap();
        let err = load_state(dir.path()).unwrap_err();
        assert!(matches!(
            err.downcast_ref::<FatalError>(),
            Some(FatalError::StateCorrupt { .. })
        ));
        // File untouched for forensics.
        assert_eq!(
            std::fs::read_to_string(state_path(dir.path())).unwrap(),
            "{ not json"
        );
    }

    #[test]
    fn test_newer_version_refused() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(tool_dir(dir.path())).unwrap();
        std::fs::write(
            state_path(dir.path()),
            format!("{{\"version\": {}, \"findings\": {{}}}}", STATE_VERSION + 1),
        )
        .unwrap();
        let err = load_state(dir.path()).unwrap_err();
        assert!(matches!(
            err.downcast_ref::<FatalError>(),
            Some(FatalError::StateVersionTooNew { .. })
        ));
    }

    #[test]
    fn test_older_version_migrates() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(tool_dir(dir.path())).unwrap();
        std::fs::write(
            state_path(dir.path()),
            "{\"version\": 1, \"findings\": {}}",
        )
        .unwrap();
        let state = load_state(dir.path()).unwrap();
        assert_eq!(state.version, STATE_VERSION);
    }

    #[test]
    fn test_lock_rejects_second_scanner() {
        let dir = tempfile::tempdir().unwrap();
        let _held = ScanLock::acquire(dir.path()).unwrap();
        let second = ScanLock::acquire(dir.path());
        assert!(second.is_err());
    }

    #[test]
    fn test_unknown_detector_in_state_is_fatal() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(tool_dir(dir.path())).unwrap();
        let json = format!(
            "{{\"version\": {STATE_VERSION}, \"findings\": {{\"ghost::a.py::\": {{\"id\": \"ghost::a.py::\", \"detector\": \"ghost\", \"file\": \"a.py\", \"tier\": \"judgment\", \"confidence\": \"high\", \"summary\": \"x\", \"first_seen\": \"2026-01-01T00:00:00Z\", \"last_seen\": \"2026-01-01T00:00:00Z\"}}}}}}"
        );
        std::fs::write(state_path(dir.path()), json).unwrap();
        assert!(load_state(dir.path()).is_err());
    }
}
