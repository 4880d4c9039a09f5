use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::time::timeout;
use tokio_util::sync::CancellationToken;

use crate::source::{DataSet, FileSource, Source, WatchPush};
use crate::{Error, SourceError};

const POLL: Duration = Duration::from_millis(50);

fn channel_push() -> (WatchPush, tokio::sync::mpsc::UnboundedReceiver<crate::Result<DataSet>>) {
    let (tx, rx) = tokio::sync::mpsc::unbounded_channel();
    let push: WatchPush = Arc::new(move |result| tx.send(result).is_ok());
    (push, rx)
}

/// Replace a file atomically so a concurrent poll never sees a torn write.
fn replace_file(path: &std::path::Path, content: &str) {
    let staged = path.with_extension("tmp");
    std::fs::write(&staged, content).unwrap();
    std::fs::rename(&staged, path).unwrap();
}

#[tokio::test]
async fn test_format_follows_the_extension() {
    let dir = tempfile::tempdir().expect("tempdir should be created");

    let toml_path = dir.path().join("app.TOML");
    std::fs::write(&toml_path, "port = 1").unwrap();
    let ds = FileSource::new(&toml_path).read().await.unwrap();
    assert_eq!(ds.format(), "toml");
    assert_eq!(ds.data(), b"port = 1");

    let bare_path = dir.path().join("config");
    std::fs::write(&bare_path, "{}").unwrap();
    let ds = FileSource::new(&bare_path).read().await.unwrap();
    assert_eq!(ds.format(), "json");

    let ds = FileSource::new(&bare_path)
        .with_format("YAML")
        .read()
        .await
        .unwrap();
    assert_eq!(ds.format(), "yaml");
}

#[tokio::test]
async fn test_read_of_a_missing_file_fails() {
    let dir = tempfile::tempdir().expect("tempdir should be created");
    let err = FileSource::new(dir.path().join("absent.json"))
        .read()
        .await
        .unwrap_err();
    assert!(
        matches!(err, Error::Source(SourceError::Read { .. })),
        "got: {err}"
    );
}

#[tokio::test(start_paused = true)]
async fn test_push_only_when_the_content_changes() {
    let dir = tempfile::tempdir().expect("tempdir should be created");
    let path = dir.path().join("app.json");
    std::fs::write(&path, r#"{"port": 1}"#).unwrap();

    let source = FileSource::new(&path).with_poll_interval(POLL);
    let (push, mut rx) = channel_push();
    let exit = CancellationToken::new();
    let handle = source
        .watch(push, exit.clone())
        .await
        .expect("watch should start")
        .expect("file sources watch in the background");

    // Case 1: content the watcher baselined against is never pushed.
    replace_file(&path, r#"{"port": 1}"#);
    tokio::time::sleep(POLL * 4).await;
    assert!(rx.try_recv().is_err(), "unchanged content was pushed");

    // Case 2: a rewrite with new content is pushed once.
    replace_file(&path, r#"{"port": 2}"#);
    let pushed = timeout(Duration::from_secs(60), rx.recv())
        .await
        .expect("push should arrive within a few polls")
        .expect("push channel should stay open")
        .expect("payload should be readable");
    assert_eq!(pushed.data(), br#"{"port": 2}"#);
    tokio::time::sleep(POLL * 4).await;
    assert!(rx.try_recv().is_err(), "a second push arrived for one change");

    // Case 3: cancelling the exit token stops the task.
    exit.cancel();
    timeout(Duration::from_secs(60), handle)
        .await
        .expect("watcher should stop after cancel")
        .expect("watcher should not panic");
}

#[tokio::test(start_paused = true)]
async fn test_retry_a_rejected_payload_on_the_next_tick() {
    let dir = tempfile::tempdir().expect("tempdir should be created");
    let path = dir.path().join("app.json");
    std::fs::write(&path, r#"{"port": 1}"#).unwrap();

    let source = FileSource::new(&path).with_poll_interval(POLL);
    let attempts = Arc::new(AtomicUsize::new(0));
    let counter = attempts.clone();
    let push: WatchPush = Arc::new(move |_| {
        counter.fetch_add(1, Ordering::SeqCst);
        false
    });
    let exit = CancellationToken::new();
    source
        .watch(push, exit.clone())
        .await
        .expect("watch should start")
        .expect("file sources watch in the background");

    replace_file(&path, r#"{"port": 2}"#);
    // A rejected push leaves the baseline untouched, so the same payload
    // keeps coming back.
    let mut polls = 0;
    while attempts.load(Ordering::SeqCst) < 2 && polls < 200 {
        tokio::time::sleep(POLL).await;
        polls += 1;
    }
    assert!(
        attempts.load(Ordering::SeqCst) >= 2,
        "got: {} attempts",
        attempts.load(Ordering::SeqCst)
    );
    exit.cancel();
}

#[tokio::test(start_paused = true)]
async fn test_stay_quiet_until_a_missing_file_appears() {
    let dir = tempfile::tempdir().expect("tempdir should be created");
    let path = dir.path().join("late.json");

    let source = FileSource::new(&path).with_poll_interval(POLL);
    let (push, mut rx) = channel_push();
    let exit = CancellationToken::new();
    source
        .watch(push, exit.clone())
        .await
        .expect("watch should start")
        .expect("file sources watch in the background");

    tokio::time::sleep(POLL * 4).await;
    assert!(rx.try_recv().is_err(), "a missing file produced a push");

    replace_file(&path, r#"{"port": 3}"#);
    let pushed = timeout(Duration::from_secs(60), rx.recv())
        .await
        .expect("push should arrive once the file exists")
        .expect("push channel should stay open")
        .expect("payload should be readable");
    assert_eq!(pushed.data(), br#"{"port": 3}"#);
    exit.cancel();
}
