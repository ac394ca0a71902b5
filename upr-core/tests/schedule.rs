use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tempfile::{tempdir, TempDir};
use upr_core::collect::{collect, UploadGroup};
use upr_core::contract::{MockObjectStore, ObjectStore, StoreError, StoreResult};
use upr_core::schedule;

fn fixture(files: usize) -> (TempDir, UploadGroup) {
    let tmp = tempdir().unwrap();
    for i in 0..files {
        let dir = tmp.path().join(format!("d{}", i % 3));
        std::fs::create_dir_all(&dir).unwrap();
        std::fs::write(dir.join(format!("f{i}.txt")), format!("file {i}")).unwrap();
    }
    let group = collect(tmp.path().to_str().unwrap());
    assert_eq!(group.len(), files);
    (tmp, group)
}

fn url_for(key: &str) -> String {
    format!("https://objects.example.com/bucket/{key}")
}

#[tokio::test]
async fn every_item_is_uploaded_exactly_once_for_any_worker_count() {
    for workers in [1usize, 3, 8] {
        let (_tmp, mut group) = fixture(7);

        let mut store = MockObjectStore::new();
        store
            .expect_put_object()
            .times(7)
            .returning(|key, _| Ok(url_for(key)));

        let report = schedule::run(&mut group, Arc::new(store), workers).await;

        assert_eq!(report.attempted, 7, "workers = {workers}");
        assert_eq!(report.uploaded, 7);
        assert_eq!(report.failed, 0);
        assert_eq!(group.uploaded(), 7);
        for (_, item) in group.iter() {
            assert_eq!(item.url.as_deref(), Some(url_for(&item.key).as_str()));
        }
    }
}

#[tokio::test]
async fn a_failed_upload_does_not_abort_the_others() {
    let (_tmp, mut group) = fixture(5);
    let failing = group
        .iter()
        .map(|(_, item)| item.key.clone())
        .nth(2)
        .unwrap();

    let mut store = MockObjectStore::new();
    let rejected = failing.clone();
    store
        .expect_put_object()
        .times(5)
        .returning(move |key, _| {
            if key == rejected {
                Err(StoreError::Upload {
                    key: key.to_string(),
                    message: "503 Slow Down".into(),
                })
            } else {
                Ok(url_for(key))
            }
        });

    let report = schedule::run(&mut group, Arc::new(store), 2).await;

    assert_eq!(report.attempted, 5);
    assert_eq!(report.uploaded, 4);
    assert_eq!(report.failed, 1);
    for (_, item) in group.iter() {
        assert_eq!(item.url.is_none(), item.key == failing, "{}", item.key);
    }
}

#[tokio::test]
async fn unreadable_files_and_empty_keys_never_reach_the_store() {
    let (tmp, mut group) = fixture(2);
    group
        .insert(tmp.path().join("vanished.txt"))
        .expect("new path");
    group.insert(PathBuf::from("/")).expect("new path");

    let mut store = MockObjectStore::new();
    store
        .expect_put_object()
        .times(2)
        .returning(|key, _| Ok(url_for(key)));

    let report = schedule::run(&mut group, Arc::new(store), 4).await;

    assert_eq!(report.uploaded, 2);
    assert_eq!(report.failed, 1);
    assert_eq!(report.skipped, 1);
    assert_eq!(report.attempted, 2);
}

#[tokio::test]
async fn zero_workers_still_drains_the_queue() {
    let (_tmp, mut group) = fixture(3);
    let mut store = MockObjectStore::new();
    store
        .expect_put_object()
        .times(3)
        .returning(|key, _| Ok(url_for(key)));

    let report = schedule::run(&mut group, Arc::new(store), 0).await;
    assert_eq!(report.uploaded, 3);
}

/// Tracks how many uploads are in flight at once.
#[derive(Default)]
struct CountingStore {
    in_flight: AtomicUsize,
    peak: AtomicUsize,
    calls: AtomicUsize,
}

#[async_trait]
impl ObjectStore for CountingStore {
    async fn ensure_bucket(&self) -> StoreResult<()> {
        Ok(())
    }

    async fn make_public(&self) -> StoreResult<()> {
        Ok(())
    }

    async fn configure_expiry(&self) -> StoreResult<()> {
        Ok(())
    }

    async fn put_object(&self, key: &str, _body: tokio::fs::File) -> StoreResult<String> {
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(now, Ordering::SeqCst);
        self.calls.fetch_add(1, Ordering::SeqCst);
        tokio::time::sleep(Duration::from_millis(20)).await;
        self.in_flight.fetch_sub(1, Ordering::SeqCst);
        Ok(url_for(key))
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn never_more_uploads_in_flight_than_workers() {
    let (_tmp, mut group) = fixture(12);
    let store = Arc::new(CountingStore::default());

    let report = schedule::run(&mut group, store.clone(), 3).await;

    assert_eq!(report.uploaded, 12);
    assert_eq!(store.calls.load(Ordering::SeqCst), 12);
    let peak = store.peak.load(Ordering::SeqCst);
    assert!(peak <= 3, "peak concurrency {peak} exceeds 3 workers");
    assert!(peak > 1, "uploads should overlap, peak was {peak}");
}

