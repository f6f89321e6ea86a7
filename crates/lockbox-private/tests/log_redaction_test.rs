//! Log output never carries user ids, their storage keys or logical paths
//!
//! Installs a process-wide subscriber (with the `log` bridge), so this file
//! holds a single test.

use std::io::Write;
use std::sync::{Arc, Mutex};

use lockbox_core::config::{BackendKind, LockboxConfig};
use lockbox_core::{LockboxError, PrivatePath, UserId, UserPassword};
use lockbox_private::Lockbox;
use lockbox_storage::{build_operator, OpendalBackend};
use tracing_subscriber::filter::LevelFilter;

#[derive(Clone, Default)]
struct Captured(Arc<Mutex<Vec<u8>>>);

impl Captured {
    fn text(&self) -> String {
        String::from_utf8_lossy(&self.0.lock().unwrap()).into_owned()
    }
}

impl Write for Captured {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        self.0.lock().unwrap().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> std::io::Result<()> {
        Ok(())
    }
}

#[tokio::test]
async fn test_lifecycle_logs_hide_user_and_paths() {
    let captured = Captured::default();
    let writer = captured.clone();
    tracing_subscriber::fmt()
        .with_max_level(LevelFilter::TRACE)
        .with_ansi(false)
        .with_writer(move || writer.clone())
        .try_init()
        .unwrap();

    let dir = tempfile::tempdir().unwrap();
    let mut config = LockboxConfig::default();
    config.storage.backend = BackendKind::Fs;
    config.storage.root = dir.path().to_path_buf();
    config.crypto.argon2_mem_cost_kib = 1024;
    config.crypto.argon2_time_cost = 1;
    config.crypto.argon2_parallelism = 1;
    let op = build_operator(&config.storage, None).unwrap();
    let lockbox = Lockbox::new(&config, Arc::new(OpendalBackend::new(op))).unwrap();

    let user = UserId::new("jane.doe@example.com").unwrap();
    let password = UserPassword::new("secure-password jane");
    let doc = PrivatePath::parse("folder1/secret.txt").unwrap();

    let auth = lockbox.profiles().register(&user, &password).await.unwrap();
    let mut handle = lockbox.private().write(&auth, &doc).await.unwrap();
    handle.write(b"Hello here 1").await.unwrap();
    handle.close().await.unwrap();

    let read = lockbox
        .private()
        .read(&auth, &doc)
        .await
        .unwrap()
        .read_to_end()
        .await
        .unwrap();
    assert_eq!(read, b"Hello here 1");

    let missing = PrivatePath::parse("folder1/missing.txt").unwrap();
    assert!(matches!(
        lockbox.private().read(&auth, &missing).await,
        Err(LockboxError::NotFound { .. })
    ));
    assert!(matches!(
        lockbox
            .profiles()
            .unlock(&user, &UserPassword::new("wrong"))
            .await,
        Err(LockboxError::BadCredentials)
    ));
    lockbox.profiles().remove(&user).await.unwrap();

    let storage_key = user.storage_key();
    let logs = captured.text();
    assert!(logs.contains("lockbox_storage::logging"), "storage events were not captured");
    assert!(logs.contains("profile registered"));
    for secret in [
        storage_key.as_str(),
        user.as_str(),
        "jane",
        "folder1",
        "secret.txt",
        "missing.txt",
    ] {
        assert!(!logs.contains(secret), "log output contains {secret:?}");
    }
}
