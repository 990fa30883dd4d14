//! Client orchestrator behavior against fake transport and fetcher seams.

use std::collections::VecDeque;
use std::io::Cursor;
use std::sync::Arc;
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use image::{DynamicImage, ImageFormat, Rgb, RgbImage};
use tokio::time::sleep;

use stylebooth::client::transport::{
    ArtifactFetcher, DownloadError, TransportError, WorkerTransport,
};
use stylebooth::client::{Orchestrator, OrchestratorConfig, SubmitError};
use stylebooth::models::job::{ArtifactOrigin, JobState};
use stylebooth::models::style::StylePreset;
use stylebooth::models::wire::StyleBatchRequest;

fn png_with_tint(tint: u8) -> Vec<u8> {
    let img = RgbImage::from_pixel(8, 8, Rgb([tint, 10, 200]));
    let mut out = Cursor::new(Vec::new());
    DynamicImage::ImageRgb8(img)
        .write_to(&mut out, ImageFormat::Png)
        .unwrap();
    out.into_inner()
}

/// Four distinct captures, so fallbacks are tellable apart by bytes.
fn session(n: usize) -> Vec<Vec<u8>> {
    (0..n).map(|i| png_with_tint(i as u8 * 40)).collect()
}

fn styled_png() -> Vec<u8> {
    png_with_tint(255)
}

/// Transport that replays a script, then answers one URL per photo after an
/// optional delay.
struct FakeTransport {
    calls: AtomicUsize,
    delay: Duration,
    script: Mutex<VecDeque<Result<Vec<String>, TransportError>>>,
}

impl FakeTransport {
    fn quick() -> Arc<Self> {
        Self::delayed(Duration::from_millis(10))
    }

    fn delayed(delay: Duration) -> Arc<Self> {
        Arc::new(Self {
            calls: AtomicUsize::new(0),
            delay,
            script: Mutex::new(VecDeque::new()),
        })
    }

    fn scripted(reply: Result<Vec<String>, TransportError>) -> Arc<Self> {
        let transport = Self::delayed(Duration::from_millis(10));
        transport.script.lock().unwrap().push_back(reply);
        transport
    }

    fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl WorkerTransport for FakeTransport {
    async fn process(&self, request: &StyleBatchRequest) -> Result<Vec<String>, TransportError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        sleep(self.delay).await;
        if let Some(reply) = self.script.lock().unwrap().pop_front() {
            return reply;
        }
        Ok((0..request.photos.len())
            .map(|i| format!("https://cdn.test/{i}.png"))
            .collect())
    }
}

/// Fetcher serving a styled image everywhere except the URLs told to fail or
/// to answer garbage.
#[derive(Default)]
struct FakeFetcher {
    calls: AtomicUsize,
    missing: Vec<String>,
    garbage: Vec<String>,
}

impl FakeFetcher {
    fn healthy() -> Arc<Self> {
        Arc::new(Self::default())
    }

    fn missing(urls: &[&str]) -> Arc<Self> {
        Arc::new(Self {
            missing: urls.iter().map(|u| u.to_string()).collect(),
            ..Self::default()
        })
    }

    fn garbage(urls: &[&str]) -> Arc<Self> {
        Arc::new(Self {
            garbage: urls.iter().map(|u| u.to_string()).collect(),
            ..Self::default()
        })
    }

    fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ArtifactFetcher for FakeFetcher {
    async fn fetch(&self, url: &str) -> Result<Vec<u8>, DownloadError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.missing.iter().any(|u| u == url) {
            return Err(DownloadError::Status(404));
        }
        if self.garbage.iter().any(|u| u == url) {
            return Ok(b"definitely not an image".to_vec());
        }
        Ok(styled_png())
    }
}

fn orchestrator_with(
    transport: Arc<FakeTransport>,
    fetcher: Arc<FakeFetcher>,
    timeout: Duration,
) -> Orchestrator {
    Orchestrator::new(
        transport,
        fetcher,
        OrchestratorConfig {
            expected_count: 4,
            timeout,
            heartbeat: Duration::from_millis(20),
        },
    )
}

fn quick_orchestrator(transport: Arc<FakeTransport>, fetcher: Arc<FakeFetcher>) -> Orchestrator {
    orchestrator_with(transport, fetcher, Duration::from_secs(5))
}

#[tokio::test]
async fn test_submit_happy_path() {
    let transport = FakeTransport::quick();
    let fetcher = FakeFetcher::healthy();
    let orchestrator = quick_orchestrator(Arc::clone(&transport), Arc::clone(&fetcher));

    let styled = orchestrator
        .submit("session-1", session(4), StylePreset::Vintage)
        .await
        .expect("submission should succeed");

    assert_eq!(styled.len(), 4);
    for (i, photo) in styled.iter().enumerate() {
        assert_eq!(photo.index, i);
        assert_eq!(photo.origin, ArtifactOrigin::Styled);
        assert_eq!(photo.bytes, styled_png());
    }
    assert_eq!(transport.calls(), 1);
    assert_eq!(fetcher.calls(), 4);
    assert_eq!(orchestrator.state("session-1"), JobState::Idle);
}

#[tokio::test]
async fn test_wrong_count_rejected_before_any_work() {
    let transport = FakeTransport::quick();
    let orchestrator = quick_orchestrator(Arc::clone(&transport), FakeFetcher::healthy());

    let err = orchestrator
        .submit("session-1", session(3), StylePreset::Vintage)
        .await
        .expect_err("three photos must be rejected");

    assert_eq!(
        err,
        SubmitError::InvalidCount {
            expected: 4,
            got: 3
        }
    );
    assert_eq!(transport.calls(), 0);
    assert_eq!(orchestrator.state("session-1"), JobState::Idle);
}

#[tokio::test]
async fn test_unreadable_photo_fails_encoding() {
    let transport = FakeTransport::quick();
    let orchestrator = quick_orchestrator(Arc::clone(&transport), FakeFetcher::healthy());

    let mut photos = session(4);
    photos[1] = b"garbage".to_vec();
    let err = orchestrator
        .submit("session-1", photos, StylePreset::Anime)
        .await
        .expect_err("undecodable capture must fail the submit");

    assert!(matches!(err, SubmitError::EncodingFailed { index: 1, .. }));
    assert_eq!(transport.calls(), 0, "nothing must reach the worker");
}

#[tokio::test]
async fn test_concurrent_submits_share_one_job() {
    let transport = FakeTransport::delayed(Duration::from_millis(50));
    let orchestrator = quick_orchestrator(Arc::clone(&transport), FakeFetcher::healthy());

    let (a, b) = tokio::join!(
        orchestrator.submit("session-1", session(4), StylePreset::Anime),
        orchestrator.submit("session-1", session(4), StylePreset::Anime),
    );

    let a = a.expect("first submit should succeed");
    let b = b.expect("second submit should succeed");
    assert!(Arc::ptr_eq(&a, &b), "both callers must share one result");
    assert_eq!(transport.calls(), 1, "the worker must be invoked once");
}

#[tokio::test]
async fn test_many_waiters_all_get_the_same_result() {
    let transport = FakeTransport::delayed(Duration::from_millis(50));
    let orchestrator = quick_orchestrator(Arc::clone(&transport), FakeFetcher::healthy());

    let submits =
        (0..3).map(|_| orchestrator.submit("session-1", session(4), StylePreset::Vintage));
    let outcomes = futures::future::join_all(submits).await;

    let first = outcomes[0].as_ref().expect("submit should succeed");
    for outcome in &outcomes {
        let styled = outcome.as_ref().expect("every waiter should succeed");
        assert!(Arc::ptr_eq(first, styled));
    }
    assert_eq!(transport.calls(), 1);
}

#[tokio::test]
async fn test_distinct_keys_do_not_deduplicate() {
    let transport = FakeTransport::quick();
    let orchestrator = quick_orchestrator(Arc::clone(&transport), FakeFetcher::healthy());

    let (a, b) = tokio::join!(
        orchestrator.submit("session-1", session(4), StylePreset::Anime),
        orchestrator.submit("session-2", session(4), StylePreset::Anime),
    );

    a.unwrap();
    b.unwrap();
    assert_eq!(transport.calls(), 2);
}

#[tokio::test]
async fn test_timeout_fails_the_job() {
    let transport = FakeTransport::delayed(Duration::from_secs(10));
    let orchestrator = orchestrator_with(
        Arc::clone(&transport),
        FakeFetcher::healthy(),
        Duration::from_millis(80),
    );

    let err = orchestrator
        .submit("session-1", session(4), StylePreset::Cyberpunk)
        .await
        .expect_err("a hung worker must time the submit out");

    assert_eq!(err, SubmitError::Timeout { after_ms: 80 });
    assert_eq!(transport.calls(), 1);
    assert_eq!(orchestrator.state("session-1"), JobState::Idle);
}

#[tokio::test]
async fn test_cancel_while_waiting_on_worker() {
    let transport = FakeTransport::delayed(Duration::from_secs(10));
    let orchestrator = quick_orchestrator(Arc::clone(&transport), FakeFetcher::healthy());

    let task = {
        let orchestrator = orchestrator.clone();
        tokio::spawn(async move {
            orchestrator
                .submit("session-1", session(4), StylePreset::Vintage)
                .await
        })
    };

    // Let the job reach the worker call, then pull the plug.
    sleep(Duration::from_millis(30)).await;
    assert_eq!(orchestrator.state("session-1"), JobState::AwaitingResult);
    assert!(orchestrator.cancel("session-1"));

    let outcome = task.await.expect("task must not panic");
    assert_eq!(outcome.expect_err("must be cancelled"), SubmitError::Cancelled);
    assert_eq!(orchestrator.state("session-1"), JobState::Idle);
    assert!(
        !orchestrator.cancel("session-1"),
        "nothing left to cancel once the job wound down"
    );
}

#[tokio::test]
async fn test_failed_download_falls_back_to_original() {
    let transport = FakeTransport::quick();
    let fetcher = FakeFetcher::missing(&["https://cdn.test/2.png"]);
    let orchestrator = quick_orchestrator(Arc::clone(&transport), Arc::clone(&fetcher));

    let sources = session(4);
    let styled = orchestrator
        .submit("session-1", sources.clone(), StylePreset::Vintage)
        .await
        .expect("one lost artifact must not fail the submit");

    assert_eq!(styled.len(), 4);
    assert_eq!(styled[2].origin, ArtifactOrigin::OriginalFallback);
    assert_eq!(styled[2].bytes, sources[2], "fallback must be the capture itself");
    for i in [0, 1, 3] {
        assert_eq!(styled[i].origin, ArtifactOrigin::Styled);
        assert_eq!(styled[i].bytes, styled_png());
    }
    assert_eq!(fetcher.calls(), 4);
}

#[tokio::test]
async fn test_undecodable_artifact_falls_back_to_original() {
    let transport = FakeTransport::quick();
    let fetcher = FakeFetcher::garbage(&["https://cdn.test/1.png"]);
    let orchestrator = quick_orchestrator(Arc::clone(&transport), Arc::clone(&fetcher));

    let sources = session(4);
    let styled = orchestrator
        .submit("session-1", sources.clone(), StylePreset::Anime)
        .await
        .expect("garbage artifact must not fail the submit");

    assert_eq!(styled[1].origin, ArtifactOrigin::OriginalFallback);
    assert_eq!(styled[1].bytes, sources[1]);
    assert_eq!(styled[0].origin, ArtifactOrigin::Styled);
}

#[tokio::test]
async fn test_worker_reported_error_propagates() {
    let transport = FakeTransport::scripted(Err(TransportError::Worker("model melted".into())));
    let orchestrator = quick_orchestrator(Arc::clone(&transport), FakeFetcher::healthy());

    let err = orchestrator
        .submit("session-1", session(4), StylePreset::Vintage)
        .await
        .expect_err("worker failure must fail the submit");

    match err {
        SubmitError::Api(message) => assert!(message.contains("model melted"), "{message}"),
        other => panic!("expected api error, got {other:?}"),
    }
}

#[tokio::test]
async fn test_short_url_list_is_rejected() {
    let transport =
        FakeTransport::scripted(Ok(vec!["https://cdn.test/only.png".to_string()]));
    let fetcher = FakeFetcher::healthy();
    let orchestrator = quick_orchestrator(Arc::clone(&transport), Arc::clone(&fetcher));

    let err = orchestrator
        .submit("session-1", session(4), StylePreset::Vintage)
        .await
        .expect_err("arity mismatch must fail the submit");

    match err {
        SubmitError::Api(message) => {
            assert!(message.contains("expected 4 urls, got 1"), "{message}")
        }
        other => panic!("expected api error, got {other:?}"),
    }
    assert_eq!(fetcher.calls(), 0, "no downloads from a malformed response");
}
