//! Purpose: Process-wide exclusive lock guarding a storage directory against other processes.
//! Exports: `ProcessFileLock`, `LockRegistry`.
//! Role: Taken once when a storage engine occupies a directory; released at shutdown.
//! Invariants: One `ProcessFileLock` per canonical path per registry; `create` hands out the same `Arc`.
//! Invariants: Locking is non-reentrant: a second lock call on a holder fails with `AlreadyLocked`.
//! Invariants: The marker file holds the holder's pid followed by a newline and nothing else.
//! Invariants: `release` removes the entry and closes the handle whatever the lock state.

use std::collections::HashMap;
use std::fs::{File, OpenOptions};
use std::io::{Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard, OnceLock};

use fs2::FileExt;
use tracing::{debug, warn};

use crate::core::error::{closed, lock_error_kind, Error, ErrorKind};

pub struct LockRegistry {
    locks: Mutex<HashMap<PathBuf, Arc<ProcessFileLock>>>,
}

impl Default for LockRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl LockRegistry {
    pub fn new() -> Self {
        Self {
            locks: Mutex::new(HashMap::new()),
        }
    }

    /// Registry shared by the whole process. Tests and embedders that need
    /// isolation construct their own with [`LockRegistry::new`].
    pub fn global() -> &'static LockRegistry {
        static GLOBAL: OnceLock<LockRegistry> = OnceLock::new();
        GLOBAL.get_or_init(LockRegistry::new)
    }

    /// Returns the lock for `path`, creating the marker file if needed. Paths
    /// that resolve to the same file share one instance.
    pub fn create(&self, path: impl AsRef<Path>) -> Result<Arc<ProcessFileLock>, Error> {
        let path = path.as_ref();
        let canonical = canonical_marker(path)?;

        let mut locks = self.lock_map();
        if let Some(existing) = locks.get(&canonical) {
            return Ok(Arc::clone(existing));
        }
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .open(&canonical)
            .map_err(|err| Error::io(err).with_path(path))?;
        debug!(path = %canonical.display(), "registered process file lock");
        let lock = Arc::new(ProcessFileLock {
            path: canonical.clone(),
            state: Mutex::new(LockState {
                file: Some(file),
                held: false,
                acquiring: false,
            }),
        });
        locks.insert(canonical, Arc::clone(&lock));
        Ok(lock)
    }

    /// Drops `lock` from the registry and closes its handle, unlocking first if held.
    pub fn release(&self, lock: &Arc<ProcessFileLock>) {
        {
            let mut locks = self.lock_map();
            if locks
                .get(&lock.path)
                .is_some_and(|registered| Arc::ptr_eq(registered, lock))
            {
                locks.remove(&lock.path);
            }
        }
        lock.close();
    }

    /// Releases every registered lock. Intended for test teardown.
    pub fn reset(&self) {
        let drained: Vec<_> = self.lock_map().drain().map(|(_, lock)| lock).collect();
        for lock in drained {
            lock.close();
        }
    }

    pub fn len(&self) -> usize {
        self.lock_map().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock_map().is_empty()
    }

    fn lock_map(&self) -> MutexGuard<'_, HashMap<PathBuf, Arc<ProcessFileLock>>> {
        self.locks.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

pub struct ProcessFileLock {
    path: PathBuf,
    state: Mutex<LockState>,
}

struct LockState {
    file: Option<File>,
    held: bool,
    // A `lock_wait` is blocked on a cloned handle outside the state mutex.
    acquiring: bool,
}

impl ProcessFileLock {
    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn is_locked(&self) -> bool {
        self.state().held
    }

    /// Takes the lock without waiting. Contention fails with `Busy`, carrying
    /// the pid recorded in the marker file when one can be read.
    pub fn lock_ex(&self) -> Result<(), Error> {
        let mut state = self.state();
        let file = self.check_unlocked(&state)?;
        match file.try_lock_exclusive() {
            Ok(()) => {
                self.acquired(&mut state);
                Ok(())
            }
            Err(err) => {
                let kind = lock_error_kind(&err);
                let mut error = Error::new(kind).with_path(&self.path).with_source(err);
                if kind == ErrorKind::Busy {
                    error = error.with_message("lock is held by another process");
                    if let Some(pid) = self.holder_pid() {
                        error = error.with_pid(pid);
                    }
                }
                Err(error)
            }
        }
    }

    /// Blocks the calling thread until the lock is free, with no deadline.
    /// The wait happens outside the state mutex, so `is_locked`, `unlock` and
    /// registry release stay responsive; a release during the wait makes this
    /// call fail with `Closed` once the OS lock arrives.
    pub fn lock_wait(&self) -> Result<(), Error> {
        let waiting = {
            let mut state = self.state();
            let file = self.check_unlocked(&state)?;
            let handle = file
                .try_clone()
                .map_err(|err| Error::io(err).with_path(&self.path))?;
            state.acquiring = true;
            handle
        };
        let result = waiting.lock_exclusive();

        let mut state = self.state();
        state.acquiring = false;
        if let Err(err) = result {
            return Err(Error::new(lock_error_kind(&err))
                .with_path(&self.path)
                .with_source(err));
        }
        if state.file.is_none() {
            if let Err(err) = FileExt::unlock(&waiting) {
                warn!(path = %self.path.display(), error = %err, "failed to unlock after release");
            }
            return Err(closed("process file lock").with_path(&self.path));
        }
        self.acquired(&mut state);
        Ok(())
    }

    /// Like `lock_ex` but reports contention as `Ok(false)`.
    pub fn try_lock(&self) -> Result<bool, Error> {
        let mut state = self.state();
        let file = self.check_unlocked(&state)?;
        match file.try_lock_exclusive() {
            Ok(()) => {
                self.acquired(&mut state);
                Ok(true)
            }
            Err(err) if lock_error_kind(&err) == ErrorKind::Busy => Ok(false),
            Err(err) => Err(Error::new(lock_error_kind(&err))
                .with_path(&self.path)
                .with_source(err)),
        }
    }

    pub fn unlock(&self) -> Result<(), Error> {
        let mut state = self.state();
        if !state.held {
            return Err(Error::new(ErrorKind::NotLocked)
                .with_message("unlock called without holding the lock")
                .with_path(&self.path));
        }
        let file = state
            .file
            .as_ref()
            .ok_or_else(|| closed("process file lock").with_path(&self.path))?;
        FileExt::unlock(file).map_err(|err| Error::io(err).with_path(&self.path))?;
        state.held = false;
        debug!(path = %self.path.display(), "released process file lock");
        Ok(())
    }

    /// Pid recorded in the marker file. This read is not coordinated with the
    /// OS lock, so the value can be stale or missing; use it for messages only.
    pub fn holder_pid(&self) -> Option<u32> {
        let text = std::fs::read_to_string(&self.path).ok()?;
        let pid = text.trim().parse::<u32>().ok();
        if pid.is_none() && !text.trim().is_empty() {
            warn!(path = %self.path.display(), "unreadable pid in lock marker");
        }
        pid
    }

    fn state(&self) -> MutexGuard<'_, LockState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn check_unlocked<'a>(&self, state: &'a LockState) -> Result<&'a File, Error> {
        if state.held {
            return Err(Error::new(ErrorKind::AlreadyLocked)
                .with_message("lock already held by this instance")
                .with_path(&self.path));
        }
        if state.acquiring {
            return Err(Error::new(ErrorKind::AlreadyLocked)
                .with_message("lock_wait already in progress on this instance")
                .with_path(&self.path));
        }
        state
            .file
            .as_ref()
            .ok_or_else(|| closed("process file lock").with_path(&self.path))
    }

    /// Records the acquisition. The pid marker is informational, so a failed
    /// write is logged and the lock stays taken.
    fn acquired(&self, state: &mut LockState) {
        state.held = true;
        debug!(path = %self.path.display(), "acquired process file lock");
        if let Some(file) = state.file.as_ref() {
            if let Err(err) = write_pid(file, std::process::id()) {
                warn!(path = %self.path.display(), error = %err, "failed to record pid in lock marker");
            }
        }
    }

    fn close(&self) {
        let mut state = self.state();
        if let Some(file) = state.file.take() {
            if state.held {
                if let Err(err) = FileExt::unlock(&file) {
                    warn!(path = %self.path.display(), error = %err, "failed to unlock on release");
                }
            }
            debug!(path = %self.path.display(), "closed process file lock");
        }
        state.held = false;
    }
}

/// Resolves the marker path, creating the marker file first when missing.
fn canonical_marker(path: &Path) -> Result<PathBuf, Error> {
    match std::fs::canonicalize(path) {
        Ok(canonical) => Ok(canonical),
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
            OpenOptions::new()
                .create(true)
                .truncate(false)
                .write(true)
                .open(path)
                .map_err(|err| Error::io(err).with_path(path))?;
            std::fs::canonicalize(path).map_err(|err| Error::io(err).with_path(path))
        }
        Err(err) => Err(Error::io(err).with_path(path)),
    }
}

fn write_pid(mut file: &File, pid: u32) -> std::io::Result<()> {
    file.set_len(0)?;
    file.seek(SeekFrom::Start(0))?;
    file.write_all(format!("{pid}\n").as_bytes())?;
    file.sync_data()
}
