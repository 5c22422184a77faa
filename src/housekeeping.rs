//! # Housekeeping Sweeper
//!
//! Removes stale transient audio artifacts from the artifact directory. The
//! sweep runs once at the start of every new session rather than on a
//! background schedule; concurrent sessions may race on the same files, and
//! that is fine because removal is idempotent: losing the race is treated
//! like any other per-file error and skipped.
//!
//! Artifact *writes* are currently stubbed out elsewhere, so in practice the
//! sweep only ever sees files left behind by earlier revisions or by
//! operators, but it must handle whatever it finds.

use std::path::Path;
use std::time::{Duration, SystemTime};
use tracing::{debug, warn};

/// Delete files in `dir` carrying `extension` whose last-modified time is
/// older than `retention`. Per-file failures are logged and skipped; only a
/// failure to scan the directory itself is an error.
///
/// Returns the number of files removed.
pub fn sweep_stale_artifacts(
    dir: &Path,
    extension: &str,
    retention: Duration,
) -> std::io::Result<usize> {
    let cutoff = SystemTime::now()
        .checked_sub(retention)
        .unwrap_or(SystemTime::UNIX_EPOCH);

    let mut removed = 0;

    for entry in std::fs::read_dir(dir)? {
        let entry = match entry {
            Ok(entry) => entry,
            Err(err) => {
                warn!(error = %err, "skipping unreadable directory entry");
                continue;
            }
        };
        let path = entry.path();

        let matches_extension = path
            .extension()
            .and_then(|ext| ext.to_str())
            .map(|ext| ext.eq_ignore_ascii_case(extension))
            .unwrap_or(false);
        if !matches_extension {
            continue;
        }

        let metadata = match entry.metadata() {
            Ok(metadata) if metadata.is_file() => metadata,
            Ok(_) => continue,
            Err(err) => {
                warn!(path = %path.display(), error = %err, "skipping unreadable artifact");
                continue;
            }
        };

        let modified = match metadata.modified() {
            Ok(modified) => modified,
            Err(err) => {
                warn!(path = %path.display(), error = %err, "artifact has no mtime");
                continue;
            }
        };

        if modified >= cutoff {
            continue;
        }

        match std::fs::remove_file(&path) {
            Ok(()) => {
                debug!(path = %path.display(), "removed stale artifact");
                removed += 1;
            }
            Err(err) => {
                // Another session may have swept it first
                warn!(path = %path.display(), error = %err, "failed to remove artifact");
            }
        }
    }

    Ok(removed)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    #[test]
    fn test_young_files_are_kept() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("fresh.wav");
        fs::write(&path, b"riff").unwrap();

        let removed =
            sweep_stale_artifacts(dir.path(), "wav", Duration::from_secs(600)).unwrap();

        assert_eq!(removed, 0);
        assert!(path.exists());
    }

    #[test]
    fn test_stale_files_are_removed() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("session_20240101_000000.wav");
        fs::write(&path, b"riff").unwrap();

        // A zero retention window makes every existing file stale
        std::thread::sleep(Duration::from_millis(20));
        let removed = sweep_stale_artifacts(dir.path(), "wav", Duration::ZERO).unwrap();

        assert_eq!(removed, 1);
        assert!(!path.exists());
    }

    #[test]
    fn test_unrelated_files_are_untouched() {
        let dir = tempfile::tempdir().unwrap();
        let wav = dir.path().join("stale.wav");
        let log = dir.path().join("server.log");
        let bare = dir.path().join("noextension");
        fs::write(&wav, b"riff").unwrap();
        fs::write(&log, b"log line").unwrap();
        fs::write(&bare, b"data").unwrap();

        std::thread::sleep(Duration::from_millis(20));
        let removed = sweep_stale_artifacts(dir.path(), "wav", Duration::ZERO).unwrap();

        assert_eq!(removed, 1);
        assert!(!wav.exists());
        assert!(log.exists());
        assert!(bare.exists());
    }

    #[test]
    fn test_extension_match_ignores_case() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("UPPER.WAV");
        fs::write(&path, b"riff").unwrap();

        std::thread::sleep(Duration::from_millis(20));
        let removed = sweep_stale_artifacts(dir.path(), "wav", Duration::ZERO).unwrap();

        assert_eq!(removed, 1);
    }

    #[test]
    fn test_missing_directory_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("nope");
        assert!(sweep_stale_artifacts(&missing, "wav", Duration::ZERO).is_err());
    }
}
