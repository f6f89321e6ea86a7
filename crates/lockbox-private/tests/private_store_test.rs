//! Private-store behaviour end to end over in-memory and fs backends

use std::sync::Arc;

use bytes::Bytes;
use futures::{StreamExt, TryStreamExt};
use lockbox_core::config::{BackendKind, LockboxConfig};
use lockbox_core::{AbsoluteLocation, LockboxError, PrivatePath, ResolvedResource, UserId, UserPassword};
use lockbox_private::{Lockbox, UserAuth};
use lockbox_storage::{build_operator, OpendalBackend, StorageBackend};
use opendal::Operator;
use proptest::prelude::*;

const SEGMENT: usize = 1024;

fn test_config() -> LockboxConfig {
    let mut config = LockboxConfig::default();
    config.storage.backend = BackendKind::Memory;
    config.crypto.argon2_mem_cost_kib = 1024;
    config.crypto.argon2_time_cost = 1;
    config.crypto.argon2_parallelism = 1;
    config.crypto.segment_size = SEGMENT as u32;
    config
}

fn memory_backend() -> Arc<dyn StorageBackend> {
    let op = Operator::new(opendal::services::Memory::default())
        .expect("memory operator")
        .finish();
    Arc::new(OpendalBackend::new(op))
}

fn lockbox() -> (Lockbox, Arc<dyn StorageBackend>) {
    let backend = memory_backend();
    let lockbox = Lockbox::new(&test_config(), backend.clone()).unwrap();
    (lockbox, backend)
}

fn user(id: &str) -> UserId {
    UserId::new(id).unwrap()
}

fn path(raw: &str) -> PrivatePath {
    PrivatePath::parse(raw).unwrap()
}

fn data(len: usize) -> Vec<u8> {
    (0..len).map(|i| (i * 31 % 251) as u8).collect()
}

async fn register(lockbox: &Lockbox, id: &str) -> UserAuth {
    lockbox
        .profiles()
        .register(&user(id), &UserPassword::new(format!("secure-password {id}")))
        .await
        .unwrap()
}

/// Write `bytes` in uneven pieces so segment boundaries fall mid-call.
async fn put(lockbox: &Lockbox, auth: &UserAuth, raw: &str, bytes: &[u8]) -> ResolvedResource {
    let mut handle = lockbox.private().write(auth, &path(raw)).await.unwrap();
    for piece in bytes.chunks(700) {
        handle.write(piece).await.unwrap();
    }
    handle.close().await.unwrap()
}

async fn get(lockbox: &Lockbox, auth: &UserAuth, raw: &str) -> Result<Vec<u8>, LockboxError> {
    lockbox
        .private()
        .read(auth, &path(raw))
        .await?
        .read_to_end()
        .await
}

async fn list(lockbox: &Lockbox, auth: &UserAuth, prefix: &str) -> Vec<ResolvedResource> {
    let mut found: Vec<ResolvedResource> = lockbox
        .private()
        .list(auth, &path(prefix))
        .await
        .unwrap()
        .try_collect()
        .await
        .unwrap();
    found.sort_by(|a, b| a.logical.cmp(&b.logical));
    found
}

async fn raw_bytes(backend: &dyn StorageBackend, location: &AbsoluteLocation) -> Vec<u8> {
    let mut source = backend.read(location).await.unwrap();
    let mut out = Vec::new();
    while let Some(chunk) = source.next_chunk().await.unwrap() {
        out.extend_from_slice(&chunk);
    }
    out
}

async fn raw_put(backend: &dyn StorageBackend, location: &AbsoluteLocation, bytes: Vec<u8>) {
    let mut sink = backend.write(location).await.unwrap();
    sink.write(Bytes::from(bytes)).await.unwrap();
    sink.commit().await.unwrap();
}

#[tokio::test]
async fn test_jane_scenario() {
    let (lockbox, _) = lockbox();
    let jane = lockbox
        .profiles()
        .register(&user("jane"), &UserPassword::new("secure-password jane"))
        .await
        .unwrap();

    put(&lockbox, &jane, "folder1/secret.txt", b"Hello here 1").await;

    let listed = list(&lockbox, &jane, "").await;
    assert_eq!(listed.len(), 1);
    assert_eq!(listed[0].logical.to_string(), "folder1/secret.txt");

    let plain = lockbox
        .private()
        .read(&jane, &listed[0])
        .await
        .unwrap()
        .read_to_end()
        .await
        .unwrap();
    assert_eq!(plain, b"Hello here 1");
}

#[tokio::test]
async fn test_roundtrip_across_segment_boundaries() {
    let (lockbox, _) = lockbox();
    let auth = register(&lockbox, "jane").await;

    for len in [0, 1, SEGMENT - 1, SEGMENT, SEGMENT + 1, 5 * SEGMENT + 3] {
        let doc = data(len);
        put(&lockbox, &auth, "doc.bin", &doc).await;
        assert_eq!(get(&lockbox, &auth, "doc.bin").await.unwrap(), doc, "len {len}");
    }
}

#[tokio::test]
async fn test_read_as_stream() {
    let (lockbox, _) = lockbox();
    let auth = register(&lockbox, "jane").await;
    let doc = data(4 * SEGMENT + 10);
    put(&lockbox, &auth, "big", &doc).await;

    let handle = lockbox.private().read(&auth, &path("big")).await.unwrap();
    let chunks: Vec<Bytes> = handle.into_stream().try_collect().await.unwrap();
    assert!(!chunks.is_empty());
    assert_eq!(chunks.concat(), doc);
}

#[tokio::test]
async fn test_overwrite_replaces_document() {
    let (lockbox, _) = lockbox();
    let auth = register(&lockbox, "jane").await;
    put(&lockbox, &auth, "note", &data(3 * SEGMENT)).await;
    put(&lockbox, &auth, "note", b"short").await;
    assert_eq!(get(&lockbox, &auth, "note").await.unwrap(), b"short");
    assert_eq!(list(&lockbox, &auth, "").await.len(), 1);
}

#[tokio::test]
async fn test_resolution_is_isolated_per_user() {
    let (lockbox, _) = lockbox();
    let jane = register(&lockbox, "jane").await;
    let john = register(&lockbox, "john").await;
    let resolver = lockbox.private().resolver();

    for raw in ["a", "folder1/secret.txt", "x/y/z"] {
        let for_jane = resolver.resolve(&jane, &path(raw)).unwrap();
        let for_john = resolver.resolve(&john, &path(raw)).unwrap();
        assert_ne!(for_jane.location, for_john.location);
        assert!(!for_jane.location.is_under(&resolver.private_root(&john)));
    }

    let a = resolver.resolve(&jane, &path("folder1/a")).unwrap();
    let b = resolver.resolve(&jane, &path("folder1/b")).unwrap();
    assert_ne!(a.location, b.location);
    assert_eq!(a, resolver.resolve(&jane, &path("folder1/./x/../a")).unwrap());
}

#[tokio::test]
async fn test_other_users_resources_are_not_found() {
    let (lockbox, _) = lockbox();
    let jane = register(&lockbox, "jane").await;
    let john = register(&lockbox, "john").await;
    let johns = put(&lockbox, &john, "folder1/secret.txt", b"john only").await;

    let result = lockbox.private().read(&jane, &johns).await;
    assert!(matches!(result, Err(LockboxError::NotFound { .. })));
    assert!(list(&lockbox, &jane, "").await.is_empty());
    assert!(matches!(
        get(&lockbox, &jane, "folder1/secret.txt").await,
        Err(LockboxError::NotFound { .. })
    ));

    // Removing someone else's resource is a no-op for them
    lockbox.private().remove(&jane, &johns).await.unwrap();
    assert_eq!(get(&lockbox, &john, "folder1/secret.txt").await.unwrap(), b"john only");
}

#[tokio::test]
async fn test_never_registered_user() {
    let (lockbox, _) = lockbox();
    let jane = register(&lockbox, "jane").await;

    let unlock = lockbox
        .profiles()
        .unlock(&user("ghost"), &UserPassword::new("anything"))
        .await;
    assert!(matches!(unlock, Err(LockboxError::NotFound { .. })));

    let ghost_resource = ResolvedResource {
        logical: path("folder1/secret.txt"),
        location: AbsoluteLocation::new(
            "lockbox/users/3f1a4c1e-0000-4000-8000-000000000000/private/files/abc/def",
        ),
    };
    let result = lockbox.private().read(&jane, &ghost_resource).await;
    assert!(matches!(result, Err(LockboxError::NotFound { .. })));
}

#[tokio::test]
async fn test_missing_document_is_not_found() {
    let (lockbox, _) = lockbox();
    let auth = register(&lockbox, "jane").await;
    assert!(matches!(
        get(&lockbox, &auth, "nope.txt").await,
        Err(LockboxError::NotFound { .. })
    ));
}

#[tokio::test]
async fn test_any_bit_flip_is_integrity_failure() {
    let (lockbox, backend) = lockbox();
    let auth = register(&lockbox, "jane").await;
    let doc = data(2 * SEGMENT + 100);
    let resource = put(&lockbox, &auth, "tamper.bin", &doc).await;
    let pristine = raw_bytes(backend.as_ref(), &resource.location).await;

    let positions: Vec<usize> = (0..pristine.len()).step_by(53).chain([pristine.len() - 1]).collect();
    for pos in positions {
        let mut tampered = pristine.clone();
        tampered[pos] ^= 0x80;
        raw_put(backend.as_ref(), &resource.location, tampered).await;

        let result = get(&lockbox, &auth, "tamper.bin").await;
        assert!(
            matches!(result, Err(LockboxError::IntegrityFailure { .. })),
            "flip at byte {pos} was not detected"
        );
    }

    raw_put(backend.as_ref(), &resource.location, pristine).await;
    assert_eq!(get(&lockbox, &auth, "tamper.bin").await.unwrap(), doc);
}

#[tokio::test]
async fn test_truncated_envelope_is_integrity_failure() {
    let (lockbox, backend) = lockbox();
    let auth = register(&lockbox, "jane").await;
    let resource = put(&lockbox, &auth, "cut.bin", &data(3 * SEGMENT)).await;
    let pristine = raw_bytes(backend.as_ref(), &resource.location).await;

    raw_put(backend.as_ref(), &resource.location, pristine[..pristine.len() - 10].to_vec()).await;
    assert!(matches!(
        get(&lockbox, &auth, "cut.bin").await,
        Err(LockboxError::IntegrityFailure { .. })
    ));
}

#[tokio::test]
async fn test_remove_is_idempotent() {
    let (lockbox, _) = lockbox();
    let auth = register(&lockbox, "jane").await;
    let resource = put(&lockbox, &auth, "folder1/secret.txt", b"bye").await;

    lockbox.private().remove(&auth, &resource).await.unwrap();
    lockbox.private().remove(&auth, &resource).await.unwrap();
    lockbox.private().remove(&auth, &path("never/existed")).await.unwrap();

    assert!(list(&lockbox, &auth, "").await.is_empty());
    assert!(matches!(
        get(&lockbox, &auth, "folder1/secret.txt").await,
        Err(LockboxError::NotFound { .. })
    ));
}

#[tokio::test]
async fn test_password_rotation_preserves_documents() {
    let (lockbox, _) = lockbox();
    let auth = register(&lockbox, "jane").await;
    put(&lockbox, &auth, "folder1/secret.txt", b"Hello here 1").await;

    let new_password = UserPassword::new("rotated password");
    lockbox.profiles().update_password(&auth, &new_password).await.unwrap();

    let fresh = lockbox.profiles().unlock(&user("jane"), &new_password).await.unwrap();
    assert_eq!(get(&lockbox, &fresh, "folder1/secret.txt").await.unwrap(), b"Hello here 1");
    assert_eq!(list(&lockbox, &fresh, "").await.len(), 1);
}

#[tokio::test]
async fn test_removed_profile_revokes_auth() {
    let (lockbox, _) = lockbox();
    let auth = register(&lockbox, "jane").await;
    let resource = put(&lockbox, &auth, "folder1/secret.txt", b"x").await;

    lockbox.profiles().remove(&user("jane")).await.unwrap();

    let private = lockbox.private();
    assert!(matches!(
        private.write(&auth, &path("again")).await,
        Err(LockboxError::RevokedAuth)
    ));
    assert!(matches!(
        private.read(&auth, &resource).await,
        Err(LockboxError::RevokedAuth)
    ));
    assert!(matches!(
        private.list(&auth, &PrivatePath::root()).await,
        Err(LockboxError::RevokedAuth)
    ));
    assert!(matches!(
        private.remove(&auth, &resource).await,
        Err(LockboxError::RevokedAuth)
    ));

    // A new registration under the same id does not revive the old auth
    register(&lockbox, "jane").await;
    assert!(matches!(
        private.read(&auth, &resource).await,
        Err(LockboxError::RevokedAuth)
    ));
}

#[tokio::test]
async fn test_write_open_across_removal_publishes_nothing() {
    let (lockbox, backend) = lockbox();
    let auth = register(&lockbox, "jane").await;
    let user_root = lockbox
        .profiles()
        .layout()
        .user_root(&auth.profile().layout_root);

    let mut handle = lockbox.private().write(&auth, &path("folder1/late.txt")).await.unwrap();
    handle.write(&data(2 * SEGMENT + 3)).await.unwrap();

    lockbox.profiles().remove(&user("jane")).await.unwrap();

    assert!(matches!(handle.close().await, Err(LockboxError::RevokedAuth)));
    let leftovers: Vec<AbsoluteLocation> = backend
        .list(&user_root)
        .await
        .unwrap()
        .try_collect()
        .await
        .unwrap();
    assert!(leftovers.is_empty());
}

#[tokio::test]
async fn test_aborted_and_dropped_writes_publish_nothing() {
    let (lockbox, _) = lockbox();
    let auth = register(&lockbox, "jane").await;
    put(&lockbox, &auth, "kept", b"original").await;

    let mut handle = lockbox.private().write(&auth, &path("kept")).await.unwrap();
    handle.write(&data(3 * SEGMENT)).await.unwrap();
    handle.abort().await.unwrap();

    let mut handle = lockbox.private().write(&auth, &path("dropped")).await.unwrap();
    handle.write(&data(3 * SEGMENT)).await.unwrap();
    drop(handle);

    assert_eq!(get(&lockbox, &auth, "kept").await.unwrap(), b"original");
    assert!(matches!(
        get(&lockbox, &auth, "dropped").await,
        Err(LockboxError::NotFound { .. })
    ));
    let listed = list(&lockbox, &auth, "").await;
    assert_eq!(listed.len(), 1);
}

#[tokio::test]
async fn test_list_prefix_is_segment_wise() {
    let (lockbox, _) = lockbox();
    let auth = register(&lockbox, "jane").await;
    for raw in ["folder1/a", "folder1/sub/b", "folder10/c", "top"] {
        put(&lockbox, &auth, raw, raw.as_bytes()).await;
    }

    let names = |found: Vec<ResolvedResource>| -> Vec<String> {
        found.into_iter().map(|r| r.logical.to_string()).collect()
    };
    assert_eq!(
        names(list(&lockbox, &auth, "").await),
        vec!["folder1/a", "folder1/sub/b", "folder10/c", "top"]
    );
    assert_eq!(
        names(list(&lockbox, &auth, "folder1").await),
        vec!["folder1/a", "folder1/sub/b"]
    );
    assert_eq!(names(list(&lockbox, &auth, "folder1/sub").await), vec!["folder1/sub/b"]);
    assert!(list(&lockbox, &auth, "missing").await.is_empty());

    // Restartable: a second enumeration sees later writes
    put(&lockbox, &auth, "folder1/later", b"later").await;
    assert_eq!(list(&lockbox, &auth, "folder1").await.len(), 3);
}

#[tokio::test]
async fn test_list_skips_foreign_entries() {
    let (lockbox, backend) = lockbox();
    let auth = register(&lockbox, "jane").await;
    put(&lockbox, &auth, "real", b"real").await;

    let root = lockbox.private().resolver().private_root(&auth);
    raw_put(backend.as_ref(), &root.join("planted-not-encrypted"), b"junk".to_vec()).await;

    let listed = list(&lockbox, &auth, "").await;
    assert_eq!(listed.len(), 1);
    assert_eq!(listed[0].logical.to_string(), "real");

    // The listing stream is lazy and can be consumed one item at a time
    let mut stream = lockbox.private().list(&auth, &PrivatePath::root()).await.unwrap();
    assert!(stream.next().await.unwrap().is_ok());
    assert!(stream.next().await.is_none());
}

#[tokio::test]
async fn test_backend_sees_no_plaintext_names_or_content() {
    let (lockbox, backend) = lockbox();
    let auth = register(&lockbox, "jane").await;
    let resource = put(&lockbox, &auth, "folder1/secret.txt", b"Hello here 1").await;

    assert!(!resource.location.as_str().contains("folder1"));
    assert!(!resource.location.as_str().contains("secret"));
    let raw = raw_bytes(backend.as_ref(), &resource.location).await;
    assert!(!raw.windows(5).any(|w| w == b"Hello"));
}

#[tokio::test]
async fn test_root_is_not_writable() {
    let (lockbox, _) = lockbox();
    let auth = register(&lockbox, "jane").await;
    let result = lockbox.private().write(&auth, &PrivatePath::root()).await;
    assert!(matches!(result, Err(LockboxError::InvalidPath { .. })));
    assert!(PrivatePath::parse("../escape").is_err());
    assert!(PrivatePath::parse("/etc/passwd").is_err());
}

#[tokio::test]
async fn test_users_run_concurrently() {
    let (lockbox, _) = lockbox();
    let lockbox = Arc::new(lockbox);
    let mut tasks = Vec::new();
    for i in 0..4 {
        let lockbox = lockbox.clone();
        tasks.push(tokio::spawn(async move {
            let id = format!("user-{i}");
            let auth = register(&lockbox, &id).await;
            let doc = data(SEGMENT * (i + 1));
            put(&lockbox, &auth, "doc", &doc).await;
            assert_eq!(get(&lockbox, &auth, "doc").await.unwrap(), doc);
        }));
    }
    for task in tasks {
        task.await.unwrap();
    }
}

#[tokio::test]
async fn test_fs_backend_roundtrip() {
    let dir = tempfile::tempdir().unwrap();
    let mut config = test_config();
    config.storage.backend = BackendKind::Fs;
    config.storage.root = dir.path().to_path_buf();
    let op = build_operator(&config.storage, None).unwrap();
    let lockbox = Lockbox::new(&config, Arc::new(OpendalBackend::new(op))).unwrap();

    let auth = register(&lockbox, "jane").await;
    let doc = data(3 * SEGMENT + 5);
    put(&lockbox, &auth, "folder1/secret.txt", &doc).await;
    assert_eq!(get(&lockbox, &auth, "folder1/secret.txt").await.unwrap(), doc);

    let listed = list(&lockbox, &auth, "folder1").await;
    assert_eq!(listed.len(), 1);

    lockbox.profiles().remove(&user("jane")).await.unwrap();
    let fresh = register(&lockbox, "jane").await;
    assert!(list(&lockbox, &fresh, "").await.is_empty());
}

#[tokio::test]
async fn test_invalid_segment_size_is_config_error() {
    let mut config = test_config();
    config.crypto.segment_size = 10;
    let result = Lockbox::new(&config, memory_backend());
    assert!(matches!(result, Err(LockboxError::Config(_))));
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(24))]

    #[test]
    fn arbitrary_documents_roundtrip(doc in proptest::collection::vec(any::<u8>(), 0..4 * SEGMENT)) {
        let rt = tokio::runtime::Runtime::new().unwrap();
        let read_back = rt.block_on(async {
            let (lockbox, _) = lockbox();
            let auth = register(&lockbox, "prop").await;
            put(&lockbox, &auth, "p/doc", &doc).await;
            get(&lockbox, &auth, "p/doc").await.unwrap()
        });
        prop_assert_eq!(read_back, doc);
    }
}
