//! Purpose: Behavioural coverage for the process file lock and its registry.
//! Exports: Integration tests only.
//! Role: Verify identity per canonical path, non-reentrancy, release semantics and contention reporting.
//! Notes: Contention is simulated with two registries, each holding its own OS handle.

use std::sync::Arc;
use std::sync::mpsc;
use std::thread;
use std::time::Duration;

use blockstore::core::error::ErrorKind;
use blockstore::core::lock::LockRegistry;
use blockstore::logging::init_tracing;

#[test]
fn equivalent_paths_share_one_instance() {
    let dir = tempfile::tempdir().expect("tempdir");
    std::fs::create_dir(dir.path().join("sub")).expect("mkdir");
    let registry = LockRegistry::new();

    let direct = registry.create(dir.path().join("tdb.lock")).expect("create");
    let roundabout = registry
        .create(dir.path().join("sub").join("..").join(".").join("tdb.lock"))
        .expect("create via other path");
    assert!(Arc::ptr_eq(&direct, &roundabout));
    assert_eq!(registry.len(), 1);

    direct.lock_ex().expect("lock");
    assert!(roundabout.is_locked());
    assert_eq!(
        roundabout.lock_ex().expect_err("same instance").kind(),
        ErrorKind::AlreadyLocked
    );
}

#[test]
fn second_lock_on_same_instance_is_rejected() {
    let dir = tempfile::tempdir().expect("tempdir");
    let registry = LockRegistry::new();
    let lock = registry.create(dir.path().join("tdb.lock")).expect("create");
    lock.lock_ex().expect("first lock");
    let err = lock.lock_ex().expect_err("second lock");
    assert_eq!(err.kind(), ErrorKind::AlreadyLocked);
    assert_eq!(lock.try_lock().expect_err("try while held").kind(), ErrorKind::AlreadyLocked);
    assert_eq!(lock.lock_wait().expect_err("wait while held").kind(), ErrorKind::AlreadyLocked);
    lock.unlock().expect("unlock");
    lock.lock_ex().expect("relock after unlock");
}

#[test]
fn release_makes_create_return_a_new_unlocked_instance() {
    let dir = tempfile::tempdir().expect("tempdir");
    let registry = LockRegistry::new();
    let path = dir.path().join("tdb.lock");
    let first = registry.create(&path).expect("create");
    first.lock_ex().expect("lock");
    registry.release(&first);

    let second = registry.create(&path).expect("create again");
    assert!(!Arc::ptr_eq(&first, &second));
    assert!(!second.is_locked());
    second.lock_ex().expect("lock fresh instance");
}

#[test]
fn contention_reports_holder_pid() {
    init_tracing();
    let dir = tempfile::tempdir().expect("tempdir");
    let path = dir.path().join("tdb.lock");
    let ours = LockRegistry::new();
    let theirs = LockRegistry::new();

    let holder = ours.create(&path).expect("create");
    holder.lock_ex().expect("lock");

    let contender = theirs.create(&path).expect("create");
    let err = contender.lock_ex().expect_err("contended");
    assert_eq!(err.kind(), ErrorKind::Busy);
    assert_eq!(err.pid(), Some(std::process::id()));
    assert!(err.to_string().contains("held by process"));
    assert!(!contender.try_lock().expect("try_lock"));
    assert!(!contender.is_locked());

    holder.unlock().expect("unlock");
    assert!(contender.try_lock().expect("try_lock after unlock"));
}

#[test]
fn lock_wait_blocks_until_released() {
    let dir = tempfile::tempdir().expect("tempdir");
    let path = dir.path().join("tdb.lock");
    let ours = LockRegistry::new();
    let theirs = LockRegistry::new();

    let holder = ours.create(&path).expect("create");
    holder.lock_ex().expect("lock");

    let waiter = theirs.create(&path).expect("create");
    let handle = {
        let waiter = Arc::clone(&waiter);
        thread::spawn(move || waiter.lock_wait())
    };
    thread::sleep(Duration::from_millis(50));
    assert!(!handle.is_finished());

    ours.release(&holder);
    handle.join().expect("join").expect("lock_wait");
    assert!(waiter.is_locked());
}

#[test]
fn release_during_lock_wait_does_not_block() {
    let dir = tempfile::tempdir().expect("tempdir");
    let path = dir.path().join("tdb.lock");
    let ours = LockRegistry::new();
    let theirs = Arc::new(LockRegistry::new());

    let holder = ours.create(&path).expect("create");
    holder.lock_ex().expect("lock");

    let waiter = theirs.create(&path).expect("create");
    let handle = {
        let waiter = Arc::clone(&waiter);
        thread::spawn(move || waiter.lock_wait())
    };
    thread::sleep(Duration::from_millis(50));
    assert_eq!(
        waiter.lock_ex().expect_err("wait in progress").kind(),
        ErrorKind::AlreadyLocked
    );

    let (tx, rx) = mpsc::channel();
    {
        let waiter = Arc::clone(&waiter);
        let theirs = Arc::clone(&theirs);
        thread::spawn(move || {
            let locked = waiter.is_locked();
            theirs.release(&waiter);
            let _ = tx.send(locked);
        });
    }
    let locked = rx
        .recv_timeout(Duration::from_secs(2))
        .expect("is_locked and release return while a wait is pending");
    assert!(!locked);
    assert!(theirs.is_empty());

    ours.release(&holder);
    let err = handle.join().expect("join").expect_err("released mid-wait");
    assert_eq!(err.kind(), ErrorKind::Closed);
    assert!(!waiter.is_locked());

    let fresh = ours.create(&path).expect("create after release");
    fresh.lock_ex().expect("lock is free again");
}

#[cfg(unix)]
#[test]
fn create_reuses_registered_handle() {
    use std::os::unix::fs::PermissionsExt;

    let dir = tempfile::tempdir().expect("tempdir");
    let path = dir.path().join("tdb.lock");
    let registry = LockRegistry::new();
    let first = registry.create(&path).expect("create");

    std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o444)).expect("chmod");
    let again = registry.create(&path).expect("lookup needs no reopen");
    assert!(Arc::ptr_eq(&first, &again));
    again.lock_ex().expect("lock");
}
