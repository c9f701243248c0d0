mod common;

use std::fs;
use std::path::Path;

use filetime::FileTime;
use lics_sync::cancel::CancelToken;
use lics_sync::http::HttpClient;
use lics_sync::logger::{NoopLogger, TextLogger};
use lics_sync::manifest::{load_manifest, prepare_destinations, ManifestEntry};
use lics_sync::pool::{PoolError, RunOutcome, WorkerPool};
use lics_sync::transfer::{TransferContext, TransferOutcome};
use tempfile::TempDir;

use common::{TestServer, MODIFIED, MODIFIED_LATER, MODIFIED_LATER_SECS, MODIFIED_SECS};

fn mirror(
    entries: Vec<ManifestEntry>,
    root: &Path,
    lanes: usize,
) -> Result<RunOutcome<TransferOutcome>, PoolError> {
    prepare_destinations(root, &entries).unwrap();
    let client = HttpClient::default();
    let ctx = TransferContext {
        remote: &client,
        out_root: root,
        logger: &NoopLogger,
    };
    WorkerPool::new(lanes)?.run(entries, |e, c| ctx.transfer(e, c))
}

fn completed(outcome: RunOutcome<TransferOutcome>) -> Vec<TransferOutcome> {
    match outcome {
        RunOutcome::Completed(results) => results,
        RunOutcome::Cancelled { .. } => panic!("run was cancelled"),
    }
}

fn mtime(path: &Path) -> i64 {
    FileTime::from_last_modification_time(&fs::metadata(path).unwrap()).unix_seconds()
}

#[test]
fn mirrors_a_manifest_then_reruns_without_transferring() {
    let server = TestServer::start();
    server.put("/x/a.tif", vec![42u8; 1024], MODIFIED);

    let work = TempDir::new().unwrap();
    let manifest = work.path().join("manifest.json");
    fs::write(
        &manifest,
        format!(
            r#"[{{"name":"a.tif","path":"10","url":"{}","size":1024}}]"#,
            server.url("/x/a.tif")
        ),
    )
    .unwrap();
    let root = work.path().join("out");

    let entries = load_manifest(&manifest).unwrap();
    let first = completed(mirror(entries.clone(), &root, 2).unwrap());
    assert_eq!(first, vec![TransferOutcome::Fetched(1024)]);

    let dst = root.join("10/a.tif");
    assert_eq!(fs::metadata(&dst).unwrap().len(), 1024);
    assert_eq!(mtime(&dst), MODIFIED_SECS);
    assert_eq!(server.gets(), 1);

    let second = completed(mirror(entries, &root, 2).unwrap());
    assert_eq!(second, vec![TransferOutcome::Skipped]);
    assert_eq!(server.gets(), 1);
    assert_eq!(fs::metadata(&dst).unwrap().len(), 1024);
    assert_eq!(mtime(&dst), MODIFIED_SECS);
}

#[test]
fn changed_remote_is_fetched_again() {
    let server = TestServer::start();
    server.put("/a.tif", b"version one".to_vec(), MODIFIED);
    let work = TempDir::new().unwrap();
    let entries = vec![ManifestEntry {
        name: "a.tif".into(),
        path: "10".into(),
        url: server.url("/a.tif"),
        size: 11,
    }];

    completed(mirror(entries.clone(), work.path(), 1).unwrap());
    server.put("/a.tif", b"version two, longer".to_vec(), MODIFIED_LATER);

    let results = completed(mirror(entries, work.path(), 1).unwrap());
    assert_eq!(results, vec![TransferOutcome::Fetched(19)]);
    let dst = work.path().join("10/a.tif");
    assert_eq!(fs::read(&dst).unwrap(), b"version two, longer");
    assert_eq!(mtime(&dst), MODIFIED_LATER_SECS);
    assert_eq!(server.gets(), 2);
}

#[test]
fn truncated_body_fails_the_run_and_leaves_nothing_behind() {
    let server = TestServer::start();
    server.put("/big.tif", vec![1u8; 64 * 1024], MODIFIED);
    server.truncate("/big.tif", 1000);
    let work = TempDir::new().unwrap();
    let entries = vec![ManifestEntry {
        name: "big.tif".into(),
        path: "10".into(),
        url: server.url("/big.tif"),
        size: 64 * 1024,
    }];

    match mirror(entries, work.path(), 2) {
        Err(PoolError::JobFailed { job, .. }) => assert!(job.ends_with("/big.tif")),
        other => panic!("expected a job failure, got {:?}", other.map(|o| o.is_cancelled())),
    }
    let dir = work.path().join("10");
    assert!(!dir.join("big.tif").exists());
    assert_eq!(fs::read_dir(&dir).unwrap().count(), 0);
}

#[test]
fn missing_remote_file_is_a_job_failure() {
    let server = TestServer::start();
    let work = TempDir::new().unwrap();
    let entries = vec![ManifestEntry {
        name: "gone.tif".into(),
        path: "10".into(),
        url: server.url("/gone.tif"),
        size: 1,
    }];
    let err = mirror(entries, work.path(), 1).unwrap_err();
    let chain = format!("{:#}", anyhow::Error::from(err));
    assert!(chain.contains("HTTP 404"), "{chain}");
}

#[test]
fn many_files_across_lanes_keep_manifest_order() {
    let server = TestServer::start();
    let mut entries = Vec::new();
    for i in 0..20usize {
        let path = format!("/f{i}.bin");
        server.put(&path, vec![i as u8; i + 1], MODIFIED);
        entries.push(ManifestEntry {
            name: format!("f{i}.bin"),
            path: format!("{}", i % 3),
            url: server.url(&path),
            size: (i + 1) as u64,
        });
    }
    let work = TempDir::new().unwrap();

    let results = completed(mirror(entries, work.path(), 4).unwrap());
    let expected: Vec<TransferOutcome> =
        (0..20u64).map(|i| TransferOutcome::Fetched(i + 1)).collect();
    assert_eq!(results, expected);
    assert_eq!(server.gets(), 20);
    assert_eq!(fs::read(work.path().join("1/f4.bin")).unwrap(), vec![4u8; 5]);
}

#[test]
fn audit_log_records_each_transfer() {
    let server = TestServer::start();
    server.put("/a.tif", b"abc".to_vec(), MODIFIED);
    let work = TempDir::new().unwrap();
    let log_path = work.path().join("run.log");
    let logger = TextLogger::open(&log_path, "lics-fetch").unwrap();
    let client = HttpClient::default();
    let ctx = TransferContext {
        remote: &client,
        out_root: work.path(),
        logger: &logger,
    };
    let entry = ManifestEntry {
        name: "a.tif".into(),
        path: "10".into(),
        url: server.url("/a.tif"),
        size: 3,
    };
    let token = CancelToken::new();
    ctx.transfer(&entry, &token).unwrap();
    ctx.transfer(&entry, &token).unwrap();

    let text = fs::read_to_string(&log_path).unwrap();
    let tags: Vec<&str> = text
        .lines()
        .filter_map(|l| l.split("] ").nth(1))
        .filter_map(|l| l.split_whitespace().nth(2))
        .collect();
    assert_eq!(tags, vec!["START", "FETCH", "START", "SKIP"]);
    let run = format!("run={}", logger.run_id());
    assert!(text.lines().all(|l| l.contains(&run)));
}
