//! Atomic load/save of the persisted [`SymlinkProcessingState`] checkpoint
//! (§6): a small JSON document kept alongside the database file rather than
//! a store table, so a crash mid-write can never leave a half-written
//! checkpoint for the next walk to resume from.

use std::path::{Path, PathBuf};

use dtm_core::SymlinkProcessingState;

use crate::error::{FsOpsError, FsOpsResult};

/// Load the checkpoint at `path`, or [`SymlinkProcessingState::default`] if
/// the file does not exist yet (first run).
///
/// # Errors
///
/// Returns [`FsOpsError::Io`] if the file exists but cannot be read, or
/// [`FsOpsError::MalformedState`] if its contents do not parse.
pub fn load_state(path: &Path) -> FsOpsResult<SymlinkProcessingState> {
    let raw = match std::fs::read(path) {
        Ok(raw) => raw,
        Err(source) if source.kind() == std::io::ErrorKind::NotFound => return Ok(SymlinkProcessingState::default()),
        Err(source) => return Err(FsOpsError::io("load_state", path, source)),
    };
    serde_json::from_slice(&raw).map_err(|source| FsOpsError::MalformedState {
        path: path.to_path_buf(),
        source,
    })
}

/// Persist `state` to `path`, writing to a sibling temp file and renaming
/// over the destination so a reader never observes a partial write.
///
/// # Errors
///
/// Returns [`FsOpsError::Io`] if the temp write or rename fails.
pub fn save_state(path: &Path, state: &SymlinkProcessingState) -> FsOpsResult<()> {
    let tmp_path = tmp_path_for(path);
    let encoded = serde_json::to_vec_pretty(state).expect("SymlinkProcessingState always serializes");
    std::fs::write(&tmp_path, &encoded).map_err(|source| FsOpsError::io("save_state.write", &tmp_path, source))?;
    std::fs::rename(&tmp_path, path).map_err(|source| FsOpsError::io("save_state.rename", path, source))?;
    Ok(())
}

fn tmp_path_for(path: &Path) -> PathBuf {
    let mut name = path.file_name().map(|n| n.to_os_string()).unwrap_or_default();
    name.push(".tmp");
    path.with_file_name(name)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_file_yields_default_state() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("state.json");
        let state = load_state(&path).unwrap();
        assert_eq!(state, SymlinkProcessingState::default());
    }

    #[test]
    fn save_then_load_round_trips() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("state.json");
        let state = SymlinkProcessingState {
            current_directory: "C".to_string(),
            current_index: 2,
            total_directories: 5,
            scan_in_progress: true,
            ..SymlinkProcessingState::default()
        };
        save_state(&path, &state).unwrap();
        let loaded = load_state(&path).unwrap();
        assert_eq!(loaded, state);
        assert!(!tmp_path_for(&path).exists(), "temp file must not survive a successful rename");
    }

    #[test]
    fn malformed_file_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("state.json");
        std::fs::write(&path, b"not json").unwrap();
        assert!(matches!(load_state(&path), Err(FsOpsError::MalformedState { .. })));
    }
}
