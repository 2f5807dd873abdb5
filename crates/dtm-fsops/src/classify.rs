//! Per-symlink inspection (§4.5): classify a link and extract the
//! originating torrent name from its target.

use std::fs;
use std::io::Read;
use std::path::{Path, PathBuf};

use dtm_core::SymlinkStatus;

/// Minimum viable size for a resolved target; anything smaller is treated as
/// an empty remount placeholder.
const MIN_TARGET_SIZE: u64 = 1024;
/// How much of the target is read to probe for I/O errors.
const PROBE_BYTES: usize = 1024;

/// Outcome of inspecting one symbolic link. `None` means the link is healthy
/// and nothing further needs recording.
pub struct Inspection {
    /// The raw target the link points at.
    pub target: PathBuf,
    /// Classification, `None` if the link resolves, is readable, and is at
    /// least [`MIN_TARGET_SIZE`] bytes.
    pub status: Option<SymlinkStatus>,
    /// Target size, when determinable.
    pub size: u64,
    /// Detail message, set when `status` stems from a caught error.
    pub error_message: Option<String>,
}

/// Inspect the symlink at `path`, classifying it per §4.5.
pub fn inspect_symlink(path: &Path) -> Inspection {
    let target = match fs::read_link(path) {
        Ok(target) => target,
        Err(source) => {
            return Inspection {
                target: PathBuf::new(),
                status: Some(SymlinkStatus::Error),
                size: 0,
                error_message: Some(source.to_string()),
            };
        }
    };

    let resolved = if target.is_absolute() {
        target.clone()
    } else {
        path.parent().unwrap_or_else(|| Path::new(".")).join(&target)
    };

    match fs::File::open(&resolved) {
        Ok(mut file) => {
            let size = file.metadata().map(|meta| meta.len()).unwrap_or(0);
            let mut probe = [0u8; PROBE_BYTES];
            match file.read(&mut probe) {
                Ok(_) if size < MIN_TARGET_SIZE => Inspection {
                    target,
                    status: Some(SymlinkStatus::Small),
                    size,
                    error_message: None,
                },
                Ok(_) => Inspection {
                    target,
                    status: None,
                    size,
                    error_message: None,
                },
                Err(source) => Inspection {
                    target,
                    status: Some(SymlinkStatus::IoError),
                    size,
                    error_message: Some(source.to_string()),
                },
            }
        }
        Err(source) if source.kind() == std::io::ErrorKind::NotFound => Inspection {
            target,
            status: Some(SymlinkStatus::Broken),
            size: 0,
            error_message: None,
        },
        Err(source) if source.kind() == std::io::ErrorKind::PermissionDenied => Inspection {
            target,
            status: Some(SymlinkStatus::Inaccessible),
            size: 0,
            error_message: Some(source.to_string()),
        },
        Err(source) => Inspection {
            target,
            status: Some(SymlinkStatus::Error),
            size: 0,
            error_message: Some(source.to_string()),
        },
    }
}

/// Extract the originating torrent name from a symlink's target: the path
/// segment immediately following a `torrents` component, or the target's
/// parent directory name if no such segment exists.
#[must_use]
pub fn extract_torrent_name(target: &Path) -> String {
    let components: Vec<&std::ffi::OsStr> = target.iter().collect();
    if let Some(index) = components.iter().position(|segment| *segment == "torrents")
        && let Some(name) = components.get(index + 1)
    {
        return name.to_string_lossy().into_owned();
    }
    target
        .parent()
        .and_then(Path::file_name)
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extracts_name_after_torrents_segment() {
        let target = Path::new("/mnt/remote/torrents/My.Show.S01E01/video.mkv");
        assert_eq!(extract_torrent_name(target), "My.Show.S01E01");
    }

    #[test]
    fn falls_back_to_parent_dir_name_without_torrents_segment() {
        let target = Path::new("/mnt/remote/library/My.Show.S01E01/video.mkv");
        assert_eq!(extract_torrent_name(target), "My.Show.S01E01");
    }

    #[test]
    fn broken_link_is_classified_without_panicking() {
        let dir = tempfile::tempdir().unwrap();
        let link_path = dir.path().join("broken.link");
        #[cfg(unix)]
        {
            std::os::unix::fs::symlink(dir.path().join("does-not-exist"), &link_path).unwrap();
            let inspection = inspect_symlink(&link_path);
            assert_eq!(inspection.status, Some(SymlinkStatus::Broken));
        }
    }

    #[test]
    fn small_target_is_classified_small() {
        let dir = tempfile::tempdir().unwrap();
        let target_path = dir.path().join("tiny.bin");
        std::fs::write(&target_path, b"short").unwrap();
        let link_path = dir.path().join("tiny.link");
        #[cfg(unix)]
        {
            std::os::unix::fs::symlink(&target_path, &link_path).unwrap();
            let inspection = inspect_symlink(&link_path);
            assert_eq!(inspection.status, Some(SymlinkStatus::Small));
        }
    }

    #[test]
    fn healthy_target_is_not_classified() {
        let dir = tempfile::tempdir().unwrap();
        let target_path = dir.path().join("big.bin");
        std::fs::write(&target_path, vec![0u8; 2048]).unwrap();
        let link_path = dir.path().join("big.link");
        #[cfg(unix)]
        {
            std::os::unix::fs::symlink(&target_path, &link_path).unwrap();
            let inspection = inspect_symlink(&link_path);
            assert_eq!(inspection.status, None);
            assert_eq!(inspection.size, 2048);
        }
    }
}
