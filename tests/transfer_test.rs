//! Transfer Task Integration Tests
//!
//! Drives whole transfers against the recording store and checks the exact
//! sequence of store calls for the success and failure paths.

mod common;

use common::{internal_error, Call, RecordingStore, MIB};
use s3_loadgen::config::UploadMode;
use s3_loadgen::s3::S3ClientError;
use s3_loadgen::source::{FileSource, MemorySource};
use s3_loadgen::upload::{TransferSpec, TransferStatus, TransferTask, UploadError};
use std::sync::Arc;

fn spec(mode: UploadMode, part_size: usize) -> Arc<TransferSpec> {
    Arc::new(TransferSpec {
        bucket: "test-bucket".into(),
        key_prefix: "obj".into(),
        key_suffix: ".bin".into(),
        part_size,
        mode,
    })
}

fn task(store: &Arc<RecordingStore>, size: usize, spec: Arc<TransferSpec>) -> TransferTask {
    TransferTask::new(
        store.clone(),
        Arc::new(MemorySource::zeroed(size)),
        spec,
        1,
        0,
    )
}

#[tokio::test]
async fn test_45mb_in_20mb_parts() {
    let store = Arc::new(RecordingStore::new());

    let outcome = task(&store, 45 * MIB, spec(UploadMode::Multipart, 20 * MIB))
        .run()
        .await;

    assert!(outcome.is_success());
    assert_eq!(outcome.bytes_uploaded, 45 * MIB as u64);

    let key = outcome.object_key.clone();
    assert_eq!(
        store.calls(),
        vec![
            Call::Create { key: key.clone() },
            Call::UploadPart {
                key: key.clone(),
                part_number: 1,
                size: 20 * MIB
            },
            Call::UploadPart {
                key: key.clone(),
                part_number: 2,
                size: 20 * MIB
            },
            Call::UploadPart {
                key: key.clone(),
                part_number: 3,
                size: 5 * MIB
            },
            Call::Complete {
                key: key.clone(),
                parts: vec![1, 2, 3]
            },
            Call::Delete { key },
        ]
    );
}

#[tokio::test]
async fn test_part_count_matches_ceiling() {
    for (size, part_size) in [(1usize, 7usize), (7, 7), (8, 7), (100, 9), (64, 1)] {
        let store = Arc::new(RecordingStore::new());
        let outcome = task(&store, size, spec(UploadMode::Multipart, part_size))
            .run()
            .await;
        assert!(outcome.is_success());

        let expected: Vec<i32> = (1..=size.div_ceil(part_size) as i32).collect();
        let completed = store.calls().into_iter().find_map(|c| match c {
            Call::Complete { parts, .. } => Some(parts),
            _ => None,
        });
        assert_eq!(completed, Some(expected), "size {} part {}", size, part_size);
    }
}

#[tokio::test]
async fn test_part_two_failure_aborts_once() {
    let store = Arc::new(RecordingStore::new().with_failure(|call| match call {
        Call::UploadPart { part_number: 2, .. } => Some(internal_error()),
        _ => None,
    }));

    let outcome = task(&store, 45 * MIB, spec(UploadMode::Multipart, 20 * MIB))
        .run()
        .await;

    assert_eq!(outcome.status, TransferStatus::UploadFailed);
    assert!(matches!(
        outcome.error,
        Some(UploadError::UploadPartError { part_number: 2, .. })
    ));
    assert_eq!(outcome.bytes_uploaded, 20 * MIB as u64);

    assert_eq!(store.count(|c| matches!(c, Call::Abort { .. })), 1);
    assert_eq!(store.count(|c| matches!(c, Call::Complete { .. })), 0);
    assert_eq!(store.count(|c| matches!(c, Call::Delete { .. })), 0);
    // Part 3 is never attempted once part 2 failed
    assert_eq!(store.count(|c| matches!(c, Call::UploadPart { .. })), 2);
}

#[tokio::test]
async fn test_abort_failure_still_reports_upload_failure() {
    let store = Arc::new(RecordingStore::new().with_failure(|call| match call {
        Call::UploadPart { .. } => Some(internal_error()),
        Call::Abort { .. } => Some(S3ClientError::service("NoSuchUpload", "gone")),
        _ => None,
    }));

    let outcome = task(&store, 10, spec(UploadMode::Multipart, 4)).run().await;

    assert_eq!(outcome.status, TransferStatus::UploadFailed);
    assert!(matches!(
        outcome.error,
        Some(UploadError::UploadPartError { .. })
    ));
    assert_eq!(store.count(|c| matches!(c, Call::Abort { .. })), 1);
}

#[tokio::test]
async fn test_delete_failure_is_not_retried() {
    let store = Arc::new(RecordingStore::new().with_failure(|call| match call {
        Call::Delete { .. } => Some(S3ClientError::service("AccessDenied", "Access Denied")),
        _ => None,
    }));

    let outcome = task(&store, 10, spec(UploadMode::Multipart, 4)).run().await;

    assert_eq!(outcome.status, TransferStatus::DeleteFailed);
    assert!(matches!(outcome.error, Some(UploadError::DeleteError(_))));
    assert_eq!(store.count(|c| matches!(c, Call::Delete { .. })), 1);
    assert_eq!(store.count(|c| matches!(c, Call::Create { .. })), 1);
    assert_eq!(store.count(|c| matches!(c, Call::Abort { .. })), 0);
}

#[tokio::test]
async fn test_initiate_failure_touches_nothing_else() {
    let store = Arc::new(RecordingStore::new().with_failure(|call| match call {
        Call::Create { .. } => Some(S3ClientError::service("NoSuchBucket", "missing")),
        _ => None,
    }));

    let outcome = task(&store, 10, spec(UploadMode::Multipart, 4)).run().await;

    assert_eq!(outcome.status, TransferStatus::UploadFailed);
    assert!(matches!(outcome.error, Some(UploadError::InitiateError(_))));
    assert_eq!(store.calls().len(), 1);
}

#[tokio::test]
async fn test_missing_source_fails_before_initiate() {
    let store = Arc::new(RecordingStore::new());
    let outcome = TransferTask::new(
        store.clone(),
        Arc::new(FileSource::new("/no/such/source.bin")),
        spec(UploadMode::Multipart, 4),
        1,
        0,
    )
    .run()
    .await;

    assert_eq!(outcome.status, TransferStatus::UploadFailed);
    assert!(matches!(outcome.error, Some(UploadError::ReadError(_))));
    assert!(store.calls().is_empty());
}

#[tokio::test]
async fn test_file_source_transfer() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("source.bin");
    std::fs::write(&path, vec![7u8; 25]).unwrap();

    let store = Arc::new(RecordingStore::new());
    let outcome = TransferTask::new(
        store.clone(),
        Arc::new(FileSource::new(&path)),
        spec(UploadMode::Multipart, 10),
        2,
        5,
    )
    .run()
    .await;

    assert!(outcome.is_success());
    assert!(outcome.object_key.starts_with("obj-2-5-"));
    let sizes: Vec<usize> = store
        .calls()
        .into_iter()
        .filter_map(|c| match c {
            Call::UploadPart { size, .. } => Some(size),
            _ => None,
        })
        .collect();
    assert_eq!(sizes, vec![10, 10, 5]);
}

#[tokio::test]
async fn test_put_mode() {
    let store = Arc::new(RecordingStore::new());

    let outcome = task(&store, 3 * MIB, spec(UploadMode::Put, MIB)).run().await;

    assert!(outcome.is_success());
    let key = outcome.object_key.clone();
    assert_eq!(
        store.calls(),
        vec![
            Call::Put {
                key: key.clone(),
                size: 3 * MIB
            },
            Call::Delete { key },
        ]
    );
}

#[tokio::test]
async fn test_put_failure_skips_delete() {
    let store = Arc::new(RecordingStore::new().with_failure(|call| match call {
        Call::Put { .. } => Some(S3ClientError::service("SlowDown", "Please reduce your request rate")),
        _ => None,
    }));

    let outcome = task(&store, 16, spec(UploadMode::Put, 4)).run().await;

    assert_eq!(outcome.status, TransferStatus::UploadFailed);
    assert!(matches!(outcome.error, Some(UploadError::PutError(_))));
    assert_eq!(store.count(|c| matches!(c, Call::Delete { .. })), 0);
}
