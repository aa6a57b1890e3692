use std::fs;
use std::path::Path;
use std::path::PathBuf;
use std::process;
use std::sync::Mutex;
use std::time::Duration;
use std::time::SystemTime;
use std::time::UNIX_EPOCH;

use serde::Deserialize;
use serde::Serialize;
use tracing::info;
use tracing::warn;

use crate::Result;
use crate::StakeKeysError;

/// Locks older than this are reclaimed even if the pid is alive
const DEFAULT_STALE_AFTER: Duration = Duration::from_secs(300);

fn now_secs() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkerStatus {
    Running,
    Stopping,
    Stopped,
    Error,
}

/// Which worker loop a progress entry belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoopKind {
    Execution,
    Consensus,
}

/// Progress of one periodic loop
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoopProgress {
    /// EL block number for the execution loop, slot for the consensus loop
    pub last_position: Option<u64>,
    pub ticks: u64,
    pub consecutive_failures: u64,
    pub last_error: Option<String>,
    pub last_update: u64,
}

impl LoopProgress {
    fn record(&mut self, position: Option<u64>, error: Option<&str>) {
        self.ticks += 1;
        self.last_update = now_secs();
        if let Some(position) = position {
            self.last_position = Some(position);
        }
        match error {
            Some(e) => {
                self.consecutive_failures += 1;
                self.last_error = Some(e.to_string());
            }
            None => self.consecutive_failures = 0,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkerProgress {
    pub execution: LoopProgress,
    pub consensus: LoopProgress,
}

/// Lock file contents for a running worker
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkerLockFile {
    pub pid: u32,
    pub status: WorkerStatus,
    pub start_time: u64,
    pub last_update: u64,
    pub progress: WorkerProgress,
    pub error_message: Option<String>,
}

impl WorkerLockFile {
    #[must_use]
    pub fn new(status: WorkerStatus) -> Self {
        let now = now_secs();
        Self {
            pid: process::id(),
            status,
            start_time: now,
            last_update: now,
            progress: WorkerProgress::default(),
            error_message: None,
        }
    }

    #[must_use]
    pub fn age(&self) -> Duration {
        Duration::from_secs(now_secs().saturating_sub(self.last_update))
    }
}

/// Check if a process is running
#[must_use]
pub fn is_process_running(pid: u32) -> bool {
    let Ok(pid) = i32::try_from(pid) else {
        return false;
    };
    // Signal 0 only checks that the process exists
    unsafe { libc::kill(pid, 0) == 0 }
}

/// Single-writer lock for the worker runtime.
///
/// The file doubles as a status report read by `sync status`.
pub struct WorkerLockManager {
    path: PathBuf,
    stale_after: Duration,
    current: Mutex<Option<WorkerLockFile>>,
}

impl WorkerLockManager {
    #[must_use]
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            stale_after: DEFAULT_STALE_AFTER,
            current: Mutex::new(None),
        }
    }

    #[must_use]
    pub fn with_stale_after(mut self, stale_after: Duration) -> Self {
        self.stale_after = stale_after;
        self
    }

    #[must_use]
    pub fn lock_file_path(&self) -> &Path {
        &self.path
    }

    #[must_use]
    pub fn lock_exists(&self) -> bool {
        self.path.exists()
    }

    /// Take the lock, reclaiming dead or stale ones
    ///
    /// # Errors
    /// - Another live worker holds a fresh lock
    /// - The lock file cannot be written
    pub fn acquire(&self) -> Result<WorkerLockFile> {
        if self.lock_exists() {
            match self.read_lock() {
                Ok(existing) if existing.pid == process::id() => {}
                Ok(existing) if is_process_running(existing.pid) => {
                    if existing.age() <= self.stale_after {
                        return Err(StakeKeysError::Custom(format!(
                            "Worker is already running (PID: {}) - last update: {}s ago",
                            existing.pid,
                            existing.age().as_secs()
                        )));
                    }
                    warn!(
                        "Reclaiming stale lock from PID {} (last update: {}s ago)",
                        existing.pid,
                        existing.age().as_secs()
                    );
                }
                Ok(existing) => {
                    warn!("Found lock file from dead PID {}, reclaiming it", existing.pid);
                }
                Err(e) => {
                    warn!("Found corrupted lock file, replacing it: {}", e);
                }
            }
        }

        let lock = WorkerLockFile::new(WorkerStatus::Running);
        self.store(lock.clone())?;
        info!("Created worker lock file (PID: {})", lock.pid);
        Ok(lock)
    }

    /// Record one loop tick. `position` is the last EL block or CL slot.
    pub fn record_tick(
        &self,
        kind: LoopKind,
        position: Option<u64>,
        error: Option<&str>,
    ) -> Result<()> {
        self.modify(|lock| {
            let progress = match kind {
                LoopKind::Execution => &mut lock.progress.execution,
                LoopKind::Consensus => &mut lock.progress.consensus,
            };
            progress.record(position, error);
        })
    }

    pub fn update_status(&self, status: WorkerStatus, error: Option<&str>) -> Result<()> {
        self.modify(|lock| {
            lock.status = status;
            if let Some(e) = error {
                lock.error_message = Some(e.to_string());
            }
        })
    }

    /// # Errors
    /// - Missing or unparsable lock file
    pub fn read_lock(&self) -> Result<WorkerLockFile> {
        let content = fs::read_to_string(&self.path)?;
        let lock = serde_json::from_str(&content)?;
        Ok(lock)
    }

    pub fn remove_lock(&self) -> Result<()> {
        if self.lock_exists() {
            fs::remove_file(&self.path)?;
            info!("Removed worker lock file");
        }
        Ok(())
    }

    fn modify(&self, f: impl FnOnce(&mut WorkerLockFile)) -> Result<()> {
        let mut current = self
            .current
            .lock()
            .map_err(|e| StakeKeysError::Custom(format!("lock file mutex poisoned: {e}")))?;
        let Some(lock) = current.as_mut() else {
            return Err(StakeKeysError::Custom(
                "worker lock has not been acquired".to_string(),
            ));
        };
        f(lock);
        lock.last_update = now_secs();
        write_file(&self.path, lock)
    }

    fn store(&self, lock: WorkerLockFile) -> Result<()> {
        let mut current = self
            .current
            .lock()
            .map_err(|e| StakeKeysError::Custom(format!("lock file mutex poisoned: {e}")))?;
        write_file(&self.path, &lock)?;
        *current = Some(lock);
        Ok(())
    }
}

fn write_file(path: &Path, lock: &WorkerLockFile) -> Result<()> {
    let content = serde_json::to_string_pretty(lock)?;
    // Write-then-rename so readers never see a torn file
    let tmp = path.with_extension("tmp");
    fs::write(&tmp, content)?;
    fs::rename(&tmp, path)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn manager(dir: &tempfile::TempDir) -> WorkerLockManager {
        WorkerLockManager::new(dir.path().join("stakekeys.lock"))
    }

    #[test]
    fn test_acquire_and_record_progress() {
        let dir = tempfile::tempdir().unwrap();
        let manager = manager(&dir);

        let lock = manager.acquire().unwrap();
        assert_eq!(lock.pid, process::id());
        assert_eq!(lock.status, WorkerStatus::Running);

        manager
            .record_tick(LoopKind::Execution, Some(100), None)
            .unwrap();
        manager
            .record_tick(LoopKind::Consensus, None, Some("beacon node unreachable"))
            .unwrap();
        manager
            .record_tick(LoopKind::Consensus, None, Some("beacon node unreachable"))
            .unwrap();

        let on_disk = manager.read_lock().unwrap();
        assert_eq!(on_disk.progress.execution.last_position, Some(100));
        assert_eq!(on_disk.progress.execution.consecutive_failures, 0);
        assert_eq!(on_disk.progress.consensus.ticks, 2);
        assert_eq!(on_disk.progress.consensus.consecutive_failures, 2);
        assert_eq!(
            on_disk.progress.consensus.last_error.as_deref(),
            Some("beacon node unreachable")
        );

        manager.remove_lock().unwrap();
        assert!(!manager.lock_exists());
    }

    #[test]
    fn test_live_fresh_lock_blocks_second_worker() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("stakekeys.lock");

        // The test runner's parent is alive and owned by the same user
        let mut foreign = WorkerLockFile::new(WorkerStatus::Running);
        foreign.pid = std::os::unix::process::parent_id();
        write_file(&path, &foreign).unwrap();

        let err = WorkerLockManager::new(&path).acquire().unwrap_err();
        assert!(err.to_string().contains("already running"));

        let reclaimed = WorkerLockManager::new(&path).with_stale_after(Duration::ZERO);
        foreign.last_update = now_secs().saturating_sub(10);
        write_file(&path, &foreign).unwrap();
        assert_eq!(reclaimed.acquire().unwrap().pid, process::id());
    }

    #[test]
    fn test_corrupted_lock_is_replaced() {
        let dir = tempfile::tempdir().unwrap();
        let manager = manager(&dir);
        fs::write(manager.lock_file_path(), "not json").unwrap();

        assert!(manager.acquire().is_ok());
        assert_eq!(manager.read_lock().unwrap().pid, process::id());
    }

    #[test]
    fn test_record_before_acquire_fails() {
        let dir = tempfile::tempdir().unwrap();
        let manager = manager(&dir);
        assert!(manager.record_tick(LoopKind::Execution, Some(1), None).is_err());
    }
}
