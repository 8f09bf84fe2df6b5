//! Generated-asset sweeper.
//!
//! Deletes every file below the assets directory. Subdirectories are walked
//! with an explicit worklist and left in place.

use std::io;
use std::path::{Path, PathBuf};

use metrics::counter;
use thiserror::Error;
use tokio::fs;
use tracing::{info, instrument, warn};

const METRIC_SWEEP_FILES_TOTAL: &str = "purgeline_sweep_files_total";

#[derive(Debug, Error)]
pub enum SweepError {
    #[error("failed to read `{path}`: {source}")]
    ReadDir {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("failed to remove `{path}`: {source}")]
    Remove {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

#[derive(Debug, Default)]
pub struct SweepReport {
    pub files_removed: usize,
    pub directories_visited: usize,
    pub failures: Vec<SweepError>,
}

impl SweepReport {
    pub fn is_clean(&self) -> bool {
        self.failures.is_empty()
    }
}

#[derive(Debug, Clone)]
pub struct AssetSweeper {
    root: PathBuf,
}

impl AssetSweeper {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Sweep the configured directory.
    pub async fn sweep(&self) -> SweepReport {
        sweep_dir(&self.root).await
    }
}

/// Remove every file below `root`. A missing root is an empty sweep.
#[instrument(fields(root = %root.display()))]
pub async fn sweep_dir(root: &Path) -> SweepReport {
    let mut report = SweepReport::default();
    let mut pending = vec![root.to_path_buf()];

    while let Some(dir) = pending.pop() {
        let mut entries = match fs::read_dir(&dir).await {
            Ok(entries) => entries,
            Err(err) if err.kind() == io::ErrorKind::NotFound && dir == root => break,
            Err(source) => {
                report.failures.push(SweepError::ReadDir { path: dir, source });
                continue;
            }
        };
        report.directories_visited += 1;

        loop {
            let entry = match entries.next_entry().await {
                Ok(Some(entry)) => entry,
                Ok(None) => break,
                Err(source) => {
                    report.failures.push(SweepError::ReadDir {
                        path: dir.clone(),
                        source,
                    });
                    break;
                }
            };

            let path = entry.path();
            // Symlinks are removed, never followed.
            let is_dir = match entry.file_type().await {
                Ok(file_type) => file_type.is_dir(),
                Err(source) => {
                    report.failures.push(SweepError::ReadDir { path, source });
                    continue;
                }
            };

            if is_dir {
                pending.push(path);
                continue;
            }

            match fs::remove_file(&path).await {
                Ok(()) => report.files_removed += 1,
                Err(source) => report.failures.push(SweepError::Remove { path, source }),
            }
        }
    }

    counter!(METRIC_SWEEP_FILES_TOTAL).increment(report.files_removed as u64);
    for failure in &report.failures {
        warn!(error = %failure, "Asset sweep failure");
    }
    info!(
        files_removed = report.files_removed,
        directories_visited = report.directories_visited,
        failures = report.failures.len(),
        "Asset sweep finished"
    );
    report
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn removes_nested_files_and_keeps_directories() {
        let dir = tempfile::tempdir().expect("tempdir");
        std::fs::write(dir.path().join("a.txt"), b"a").expect("write a");
        std::fs::write(dir.path().join("b.css"), b"b").expect("write b");
        std::fs::create_dir(dir.path().join("sub")).expect("mkdir");
        std::fs::write(dir.path().join("sub").join("c.js"), b"c").expect("write c");

        let report = AssetSweeper::new(dir.path()).sweep().await;

        assert_eq!(report.files_removed, 3);
        assert_eq!(report.directories_visited, 2);
        assert!(report.is_clean());
        assert!(!dir.path().join("a.txt").exists());
        assert!(!dir.path().join("sub").join("c.js").exists());
        assert!(dir.path().join("sub").is_dir());
    }

    #[tokio::test]
    async fn missing_root_is_empty_sweep() {
        let dir = tempfile::tempdir().expect("tempdir");
        let report = sweep_dir(&dir.path().join("absent")).await;

        assert_eq!(report.files_removed, 0);
        assert_eq!(report.directories_visited, 0);
        assert!(report.is_clean());
    }

    #[tokio::test]
    async fn deep_trees_are_walked() {
        let dir = tempfile::tempdir().expect("tempdir");
        let mut path = dir.path().to_path_buf();
        for depth in 0..32 {
            path.push(format!("d{depth}"));
        }
        std::fs::create_dir_all(&path).expect("mkdir");
        std::fs::write(path.join("leaf.js"), b"x").expect("write leaf");

        let report = sweep_dir(dir.path()).await;
        assert_eq!(report.files_removed, 1);
        assert_eq!(report.directories_visited, 33);
    }
}
