use std::path::PathBuf;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

/// A file considered for deletion by the retention sweeper.
///
/// Built from a fresh `stat` on every sweep, never cached.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArtifactFile {
    pub path: PathBuf,
    pub modified: SystemTime,
    /// Whole-second modification time, for reports
    pub mtime_epoch: i64,
    pub size_bytes: u64,
}

impl ArtifactFile {
    pub fn new(path: PathBuf, modified: SystemTime, size_bytes: u64) -> Self {
        let mtime_epoch = match modified.duration_since(UNIX_EPOCH) {
            Ok(d) => d.as_secs() as i64,
            Err(e) => -(e.duration().as_secs() as i64),
        };
        Self {
            path,
            modified,
            mtime_epoch,
            size_bytes,
        }
    }

    pub fn from_metadata(path: PathBuf, metadata: &std::fs::Metadata) -> std::io::Result<Self> {
        Ok(Self::new(path, metadata.modified()?, metadata.len()))
    }

    /// Age relative to `now`; files stamped in the future have zero age
    pub fn age(&self, now: SystemTime) -> Duration {
        now.duration_since(self.modified).unwrap_or(Duration::ZERO)
    }

    pub fn is_expired(&self, now: SystemTime, max_age: Duration) -> bool {
        self.age(now) > max_age
    }
}
