// ABOUTME: Integration tests for deploy lock functionality.
// ABOUTME: Tests lock acquisition, stale detection, and force breaking.

use chrono::{Duration, Utc};
use switchyard::deploy::{DeployErrorKind, DeployLock, LockInfo};
use switchyard::types::ServiceName;

fn service(name: &str) -> ServiceName {
    ServiceName::new(name).unwrap()
}

/// Test: Lock acquired prevents second deployment.
#[tokio::test]
async fn lock_acquired_prevents_second_deployment() {
    let dir = tempfile::tempdir().unwrap();
    let service = service("test-lock-prevent");

    let lock = DeployLock::acquire(dir.path(), &service, false)
        .await
        .expect("first lock should succeed");

    let result = DeployLock::acquire(dir.path(), &service, false).await;
    assert!(result.is_err(), "second lock should fail");

    let err = result.unwrap_err();
    assert_eq!(err.kind(), DeployErrorKind::LockHeld);
    let info = err
        .lock_holder_info()
        .expect("should have lock holder info");
    assert!(!info.holder.is_empty(), "holder should be set");
    assert_eq!(info.pid, std::process::id());

    lock.release().await.expect("release should succeed");

    let lock2 = DeployLock::acquire(dir.path(), &service, false)
        .await
        .expect("lock should succeed after release");
    lock2.release().await.expect("cleanup release");
}

/// Test: Locks are per service.
#[tokio::test]
async fn locks_are_scoped_to_service() {
    let dir = tempfile::tempdir().unwrap();

    let a = DeployLock::acquire(dir.path(), &service("alpha"), false)
        .await
        .unwrap();
    let b = DeployLock::acquire(dir.path(), &service("beta"), false)
        .await
        .expect("different service should not conflict");

    a.release().await.unwrap();
    b.release().await.unwrap();
}

/// Test: Stale lock (older than one hour) is broken automatically.
#[tokio::test]
async fn stale_lock_is_broken() {
    let dir = tempfile::tempdir().unwrap();
    let service = service("test-stale");

    let stale = LockInfo {
        holder: "other-host".to_string(),
        pid: 4242,
        started_at: Utc::now() - Duration::hours(2),
        service: service.to_string(),
    };
    std::fs::write(
        LockInfo::lock_path(dir.path(), &service),
        serde_json::to_vec(&stale).unwrap(),
    )
    .unwrap();

    let lock = DeployLock::acquire(dir.path(), &service, false)
        .await
        .expect("stale lock should be broken");

    let holder = DeployLock::holder(dir.path(), &service).await.unwrap();
    assert_eq!(holder.pid, std::process::id());
    lock.release().await.unwrap();
}

/// Test: Force flag breaks a fresh lock.
#[tokio::test]
async fn force_breaks_fresh_lock() {
    let dir = tempfile::tempdir().unwrap();
    let service = service("test-force");

    let first = DeployLock::acquire(dir.path(), &service, false).await.unwrap();
    // Keep the first guard from cleaning up the forced lock on drop.
    std::mem::forget(first);

    let forced = DeployLock::acquire(dir.path(), &service, true)
        .await
        .expect("force should break the lock");
    forced.release().await.unwrap();
}

/// Test: An unreadable lock file is treated as abandoned.
#[tokio::test]
async fn unreadable_lock_is_broken() {
    let dir = tempfile::tempdir().unwrap();
    let service = service("test-garbage");
    std::fs::write(LockInfo::lock_path(dir.path(), &service), "not json").unwrap();

    let lock = DeployLock::acquire(dir.path(), &service, false)
        .await
        .expect("garbage lock should be broken");
    lock.release().await.unwrap();
}

/// Test: Dropping a lock without releasing still removes the file.
#[tokio::test]
async fn drop_releases_lock() {
    let dir = tempfile::tempdir().unwrap();
    let service = service("test-drop");

    {
        let _lock = DeployLock::acquire(dir.path(), &service, false).await.unwrap();
        assert!(LockInfo::lock_path(dir.path(), &service).exists());
    }

    assert!(!LockInfo::lock_path(dir.path(), &service).exists());
    assert!(DeployLock::holder(dir.path(), &service).await.is_none());
}

/// Test: Lock directory is created on demand.
#[tokio::test]
async fn creates_missing_lock_dir() {
    let dir = tempfile::tempdir().unwrap();
    let nested = dir.path().join("state").join("locks");

    let lock = DeployLock::acquire(&nested, &service("test-mkdir"), false)
        .await
        .unwrap();

    assert!(nested.is_dir());
    lock.release().await.unwrap();
}
