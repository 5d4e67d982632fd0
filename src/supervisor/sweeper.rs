//! Retention Sweeper
//!
//! Deletes generated images older than the retention age from a fixed list
//! of directories. Eligibility is recomputed from each file's current
//! modification time on every sweep. Only immediate children are examined.

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info, warn};

use crate::config::RetentionConfig;
use crate::coordination::ShutdownToken;
use crate::domain::ArtifactFile;

/// Summary of one sweep
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SweepReport {
    /// Regular files with an allowed extension that were examined
    pub scanned: usize,
    pub deleted: Vec<ArtifactFile>,
    /// Files that could not be inspected or removed
    pub failed: Vec<PathBuf>,
    pub missing_dirs: Vec<PathBuf>,
}

impl SweepReport {
    pub fn bytes_freed(&self) -> u64 {
        self.deleted.iter().map(|f| f.size_bytes).sum()
    }
}

#[derive(Debug, Clone)]
pub struct RetentionSweeper {
    directories: Vec<PathBuf>,
    extensions: HashSet<String>,
    max_age: Duration,
    interval: Duration,
}

impl RetentionSweeper {
    pub fn new(
        directories: Vec<PathBuf>,
        extensions: &[String],
        max_age: Duration,
        interval: Duration,
    ) -> Self {
        Self {
            directories,
            extensions: extensions
                .iter()
                .map(|e| e.trim_start_matches('.').to_ascii_lowercase())
                .collect(),
            max_age,
            interval,
        }
    }

    pub fn from_config(config: &RetentionConfig) -> Self {
        Self::new(
            config.directories.clone(),
            &config.extensions,
            config.max_age(),
            config.sweep_interval(),
        )
    }

    pub fn directories(&self) -> &[PathBuf] {
        &self.directories
    }

    fn has_allowed_extension(&self, path: &Path) -> bool {
        path.extension()
            .and_then(|e| e.to_str())
            .is_some_and(|e| self.extensions.contains(&e.to_ascii_lowercase()))
    }

    /// One pass over every directory, judged against `now`
    pub fn sweep_once(&self, now: SystemTime) -> SweepReport {
        let mut report = SweepReport::default();
        for dir in &self.directories {
            self.sweep_dir(dir, now, &mut report);
        }

        if report.deleted.is_empty() && report.failed.is_empty() {
            debug!("Sweep: {} candidate files, nothing expired", report.scanned);
        } else {
            info!(
                "Sweep: deleted {} of {} files ({} bytes), {} failures",
                report.deleted.len(),
                report.scanned,
                report.bytes_freed(),
                report.failed.len()
            );
        }
        report
    }

    fn sweep_dir(&self, dir: &Path, now: SystemTime, report: &mut SweepReport) {
        let entries = match std::fs::read_dir(dir) {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                info!("Directory {} does not exist, skipping", dir.display());
                report.missing_dirs.push(dir.to_path_buf());
                return;
            }
            Err(e) => {
                warn!("Cannot read directory {}: {}", dir.display(), e);
                report.missing_dirs.push(dir.to_path_buf());
                return;
            }
        };

        for entry in entries {
            let entry = match entry {
                Ok(entry) => entry,
                Err(e) => {
                    warn!("Cannot read entry in {}: {}", dir.display(), e);
                    continue;
                }
            };
            let path = entry.path();
            if !self.has_allowed_extension(&path) {
                continue;
            }

            // symlink_metadata: never follow links out of the directory
            let metadata = match std::fs::symlink_metadata(&path) {
                Ok(m) => m,
                Err(e) => {
                    error!("Cannot stat {}: {}", path.display(), e);
                    report.failed.push(path);
                    continue;
                }
            };
            if !metadata.is_file() {
                continue;
            }
            report.scanned += 1;

            let file = match ArtifactFile::from_metadata(path.clone(), &metadata) {
                Ok(f) => f,
                Err(e) => {
                    error!("Cannot read mtime of {}: {}", path.display(), e);
                    report.failed.push(path);
                    continue;
                }
            };
            if !file.is_expired(now, self.max_age) {
                continue;
            }

            match std::fs::remove_file(&file.path) {
                Ok(()) => {
                    debug!(
                        "Deleted {} (age {}s)",
                        file.path.display(),
                        file.age(now).as_secs()
                    );
                    report.deleted.push(file);
                }
                Err(e) => {
                    error!("Failed to delete {}: {}", file.path.display(), e);
                    report.failed.push(file.path);
                }
            }
        }
    }

    /// Sweep off the async runtime's worker threads
    pub async fn sweep_now(&self) -> SweepReport {
        let sweeper = self.clone();
        match tokio::task::spawn_blocking(move || sweeper.sweep_once(SystemTime::now())).await {
            Ok(report) => report,
            Err(e) => {
                error!("Sweep task failed: {}", e);
                SweepReport::default()
            }
        }
    }

    /// Sweep immediately, then every interval until shutdown
    pub async fn run(self, mut shutdown: ShutdownToken) {
        info!(
            "Retention sweeper started: {} directories, max age {}s, every {}s",
            self.directories.len(),
            self.max_age.as_secs(),
            self.interval.as_secs()
        );

        let mut interval = tokio::time::interval(self.interval);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = shutdown.cancelled() => break,
                _ = interval.tick() => {
                    self.sweep_now().await;
                }
            }
        }

        info!("Retention sweeper stopped");
    }
}
