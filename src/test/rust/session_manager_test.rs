use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::{mpsc, Notify};
use tokio::time::timeout;

use ppe_session::domain::errors::{FailureReason, TransportError, UploadError, UploadRejection};
use ppe_session::domain::ports::{
    DeviceAccess, FrameStream, InferenceBackend, MetricsReporter, PermissionOutcome, StreamTarget,
    StreamTicket,
};
use ppe_session::domain::value_objects::{
    BoundingBox, DetectedObject, DetectionEvent, FrameRef, MediaCandidate, Metrics, SessionConfig,
    SessionState, SourceKind, UploadedFile,
};
use ppe_session::{DetectionSessionManager, Subscription, UpdateKind};

/// What the test pushes into an open fake stream
enum Feed {
    Event(DetectionEvent),
    End,
    Fail,
}

#[derive(Default)]
struct FakeBackend {
    reject_upload: Option<UploadRejection>,
    stall_upload: bool,
    feeds: Mutex<Vec<mpsc::UnboundedSender<Feed>>>,
    opened: Notify,
    open_now: Arc<AtomicUsize>,
    max_open: AtomicUsize,
    uploads: AtomicUsize,
}

impl FakeBackend {
    /// Feed of the `index`-th opened stream, waiting for it to be opened
    async fn feed(&self, index: usize) -> mpsc::UnboundedSender<Feed> {
        loop {
            let found = self.feeds.lock().unwrap().get(index).cloned();
            if let Some(tx) = found {
                return tx;
            }
            self.opened.notified().await;
        }
    }

    fn opens(&self) -> usize {
        self.feeds.lock().unwrap().len()
    }
}

struct FakeStream {
    rx: mpsc::UnboundedReceiver<Feed>,
    open_now: Arc<AtomicUsize>,
}

impl Drop for FakeStream {
    fn drop(&mut self) {
        self.open_now.fetch_sub(1, Ordering::SeqCst);
    }
}

#[async_trait]
impl FrameStream for FakeStream {
    async fn next_event(&mut self) -> Result<Option<DetectionEvent>, TransportError> {
        match self.rx.recv().await {
            Some(Feed::Event(event)) => Ok(Some(event)),
            Some(Feed::End) => Ok(None),
            Some(Feed::Fail) => Err(TransportError::Interrupted("connection reset".to_string())),
            None => std::future::pending().await,
        }
    }
}

#[async_trait]
impl InferenceBackend for FakeBackend {
    async fn upload(&self, file: &UploadedFile) -> Result<StreamTicket, UploadError> {
        self.uploads.fetch_add(1, Ordering::SeqCst);
        if self.stall_upload {
            std::future::pending::<()>().await;
        }
        match self.reject_upload {
            Some(rejection) => Err(UploadError::Rejected(rejection)),
            None => Ok(StreamTicket {
                stream_id: format!("stream-{}", file.name),
            }),
        }
    }

    async fn open_stream(
        &self,
        _target: &StreamTarget,
    ) -> Result<Box<dyn FrameStream>, TransportError> {
        let now = self.open_now.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_open.fetch_max(now, Ordering::SeqCst);

        let (tx, rx) = mpsc::unbounded_channel();
        self.feeds.lock().unwrap().push(tx);
        self.opened.notify_one();

        Ok(Box::new(FakeStream {
            rx,
            open_now: self.open_now.clone(),
        }))
    }
}

struct FakeDevices {
    outcome: PermissionOutcome,
    /// Never answer the permission prompt
    hang: bool,
}

#[async_trait]
impl DeviceAccess for FakeDevices {
    async fn request_capture(&self, _device_id: &str) -> PermissionOutcome {
        if self.hang {
            std::future::pending::<()>().await;
        }
        self.outcome
    }
}

#[derive(Default)]
struct RecordingReporter {
    failures: Mutex<Vec<FailureReason>>,
    started: AtomicUsize,
}

impl MetricsReporter for RecordingReporter {
    fn report_state_change(&self, _state: &SessionState) {}
    fn report_session_started(&self, _kind: SourceKind) {
        self.started.fetch_add(1, Ordering::SeqCst);
    }
    fn report_failure(&self, reason: FailureReason) {
        self.failures.lock().unwrap().push(reason);
    }
    fn report_window(&self, _metrics: &Metrics) {}
    fn report_detections(&self, _count: u64) {}
    fn report_out_of_order(&self) {}
    fn report_uptime(&self, _uptime_secs: f64) {}
}

struct Harness {
    manager: DetectionSessionManager,
    backend: Arc<FakeBackend>,
    reporter: Arc<RecordingReporter>,
    updates: Subscription,
}

fn harness_with(backend: FakeBackend, devices: FakeDevices) -> Harness {
    let backend = Arc::new(backend);
    let reporter = Arc::new(RecordingReporter::default());
    let manager = DetectionSessionManager::spawn(
        SessionConfig::default(),
        backend.clone(),
        Arc::new(devices),
        reporter.clone(),
    )
    .unwrap();
    let updates = manager.subscribe();
    Harness {
        manager,
        backend,
        reporter,
        updates,
    }
}

fn harness() -> Harness {
    harness_with(
        FakeBackend::default(),
        FakeDevices {
            outcome: PermissionOutcome::Granted,
            hang: false,
        },
    )
}

fn video_file() -> MediaCandidate {
    MediaCandidate::file("site.mp4", 10 * 1024 * 1024, "video/mp4", "/tmp/site.mp4")
}

fn helmet(ts: u64, confidence: f64) -> Feed {
    Feed::Event(DetectionEvent::new(
        ts,
        vec![DetectedObject::new("helmet", confidence, BoundingBox::default())],
    ))
}

async fn next_transition(updates: &mut Subscription) -> SessionState {
    loop {
        let update = timeout(Duration::from_secs(120), updates.recv())
            .await
            .expect("timed out waiting for a transition")
            .expect("manager stopped");
        if update.kind == UpdateKind::Transition {
            return update.state;
        }
    }
}

async fn transitions(updates: &mut Subscription, count: usize) -> Vec<SessionState> {
    let mut states = Vec::with_capacity(count);
    for _ in 0..count {
        states.push(next_transition(updates).await);
    }
    states
}

async fn assert_quiet(updates: &mut Subscription) {
    let next = timeout(Duration::from_secs(60), next_transition(updates)).await;
    assert!(next.is_err(), "unexpected transition: {:?}", next);
}

fn failed(reason: FailureReason) -> SessionState {
    SessionState::Failed { reason }
}

#[tokio::test(start_paused = true)]
async fn test_uploaded_file_reaches_active_with_metrics() {
    let mut h = harness();

    let id = h.manager.start(video_file()).await.unwrap();
    let feed = h.backend.feed(0).await;
    feed.send(helmet(0, 0.92)).ok();

    assert_eq!(
        transitions(&mut h.updates, 3).await,
        vec![
            SessionState::Validating,
            SessionState::Connecting,
            SessionState::Active
        ]
    );

    let snapshot = h.manager.snapshot();
    assert_eq!(snapshot.session_id, Some(id));
    assert_eq!(snapshot.metrics.total_detections, 1);
    assert_eq!(snapshot.metrics.compliant_count, 1);
    assert_eq!(snapshot.metrics.violation_count, 0);
    assert_eq!(snapshot.metrics.average_confidence, Some(0.92));
    assert_eq!(h.backend.uploads.load(Ordering::SeqCst), 1);
}

#[tokio::test(start_paused = true)]
async fn test_denied_device_fails_without_connection() {
    let mut h = harness_with(
        FakeBackend::default(),
        FakeDevices {
            outcome: PermissionOutcome::Denied,
            hang: false,
        },
    );

    h.manager.start(MediaCandidate::device("0")).await.unwrap();
    assert_eq!(
        transitions(&mut h.updates, 2).await,
        vec![
            SessionState::Validating,
            failed(FailureReason::DeviceUnavailable)
        ]
    );

    // failure is sticky until acknowledged
    assert_quiet(&mut h.updates).await;
    assert!(h.manager.state().is_failed());

    h.manager.acknowledge().await.unwrap();
    assert_eq!(next_transition(&mut h.updates).await, SessionState::Idle);
    assert_eq!(h.backend.opens(), 0);
    assert_eq!(
        *h.reporter.failures.lock().unwrap(),
        vec![FailureReason::DeviceUnavailable]
    );
}

#[tokio::test(start_paused = true)]
async fn test_invalid_media_type_is_rejected() {
    let mut h = harness();

    h.manager
        .start(MediaCandidate::file("notes.pdf", 10, "application/pdf", "/tmp/notes.pdf"))
        .await
        .unwrap();

    assert_eq!(
        transitions(&mut h.updates, 2).await,
        vec![
            SessionState::Validating,
            failed(FailureReason::InvalidMediaType)
        ]
    );
    assert_eq!(h.backend.uploads.load(Ordering::SeqCst), 0);
}

#[tokio::test(start_paused = true)]
async fn test_new_start_closes_previous_connection_first() {
    let mut h = harness();

    h.manager.start(MediaCandidate::device("0")).await.unwrap();
    h.backend.feed(0).await.send(helmet(0, 0.8)).ok();
    assert_eq!(
        transitions(&mut h.updates, 3).await,
        vec![
            SessionState::Validating,
            SessionState::Connecting,
            SessionState::Active
        ]
    );

    let second = h.manager.start(video_file()).await.unwrap();
    assert_eq!(
        transitions(&mut h.updates, 4).await,
        vec![
            SessionState::Stopping,
            SessionState::Idle,
            SessionState::Validating,
            SessionState::Connecting
        ]
    );

    h.backend.feed(1).await.send(helmet(0, 0.6)).ok();
    assert_eq!(next_transition(&mut h.updates).await, SessionState::Active);

    assert_eq!(h.backend.max_open.load(Ordering::SeqCst), 1);
    assert_eq!(h.manager.snapshot().session_id, Some(second));
    // the window was reset for the new session
    assert_eq!(h.manager.metrics().total_detections, 1);
}

#[tokio::test(start_paused = true)]
async fn test_stop_while_connecting_never_becomes_active() {
    let mut h = harness();

    h.manager.start(MediaCandidate::device("0")).await.unwrap();
    let feed = h.backend.feed(0).await;
    feed.send(helmet(0, 0.9)).ok();
    h.manager.stop().await.unwrap();

    assert_eq!(
        transitions(&mut h.updates, 4).await,
        vec![
            SessionState::Validating,
            SessionState::Connecting,
            SessionState::Stopping,
            SessionState::Idle
        ]
    );
    assert_quiet(&mut h.updates).await;
    assert_eq!(h.backend.open_now.load(Ordering::SeqCst), 0);
}

#[tokio::test(start_paused = true)]
async fn test_silence_degrades_once_then_times_out() {
    let mut h = harness();

    h.manager.start(MediaCandidate::device("0")).await.unwrap();
    let feed = h.backend.feed(0).await;
    feed.send(helmet(0, 0.9)).ok();

    assert_eq!(
        transitions(&mut h.updates, 5).await,
        vec![
            SessionState::Validating,
            SessionState::Connecting,
            SessionState::Active,
            SessionState::Degraded,
            failed(FailureReason::Timeout)
        ]
    );
    assert_eq!(h.backend.open_now.load(Ordering::SeqCst), 0);
}

#[tokio::test(start_paused = true)]
async fn test_degraded_stream_recovers() {
    let mut h = harness();

    h.manager.start(MediaCandidate::device("0")).await.unwrap();
    let feed = h.backend.feed(0).await;
    feed.send(helmet(0, 0.9)).ok();

    assert_eq!(
        transitions(&mut h.updates, 4).await,
        vec![
            SessionState::Validating,
            SessionState::Connecting,
            SessionState::Active,
            SessionState::Degraded
        ]
    );

    feed.send(helmet(6_000, 0.7)).ok();
    assert_eq!(next_transition(&mut h.updates).await, SessionState::Active);
}

#[tokio::test(start_paused = true)]
async fn test_dropped_transport_reconnects() {
    let mut h = harness();

    h.manager.start(MediaCandidate::device("0")).await.unwrap();
    let first = h.backend.feed(0).await;
    first.send(helmet(0, 0.9)).ok();
    assert_eq!(
        transitions(&mut h.updates, 3).await,
        vec![
            SessionState::Validating,
            SessionState::Connecting,
            SessionState::Active
        ]
    );

    first.send(Feed::Fail).ok();
    assert_eq!(next_transition(&mut h.updates).await, SessionState::Degraded);

    let second = h.backend.feed(1).await;
    second.send(helmet(1_000, 0.9)).ok();
    assert_eq!(next_transition(&mut h.updates).await, SessionState::Active);
    assert_eq!(h.backend.max_open.load(Ordering::SeqCst), 1);
}

#[tokio::test(start_paused = true)]
async fn test_transport_failure_before_first_event() {
    let mut h = harness();

    h.manager.start(MediaCandidate::device("0")).await.unwrap();
    h.backend.feed(0).await.send(Feed::Fail).ok();

    assert_eq!(
        transitions(&mut h.updates, 3).await,
        vec![
            SessionState::Validating,
            SessionState::Connecting,
            failed(FailureReason::TransportClosed)
        ]
    );
}

#[tokio::test(start_paused = true)]
async fn test_upload_rejection_fails_session() {
    let mut h = harness_with(
        FakeBackend {
            reject_upload: Some(UploadRejection::Unsupported),
            ..FakeBackend::default()
        },
        FakeDevices {
            outcome: PermissionOutcome::Granted,
            hang: false,
        },
    );

    h.manager.start(video_file()).await.unwrap();
    assert_eq!(
        transitions(&mut h.updates, 3).await,
        vec![
            SessionState::Validating,
            SessionState::Connecting,
            failed(FailureReason::UploadFailed)
        ]
    );
    assert_eq!(h.backend.opens(), 0);
}

#[tokio::test(start_paused = true)]
async fn test_stop_cancels_outstanding_upload() {
    let mut h = harness_with(
        FakeBackend {
            stall_upload: true,
            ..FakeBackend::default()
        },
        FakeDevices {
            outcome: PermissionOutcome::Granted,
            hang: false,
        },
    );

    h.manager.start(video_file()).await.unwrap();
    h.manager.stop().await.unwrap();

    assert_eq!(
        transitions(&mut h.updates, 4).await,
        vec![
            SessionState::Validating,
            SessionState::Connecting,
            SessionState::Stopping,
            SessionState::Idle
        ]
    );
    assert_eq!(h.backend.opens(), 0);
}

#[tokio::test(start_paused = true)]
async fn test_end_of_file_returns_to_idle() {
    let mut h = harness();

    h.manager.start(video_file()).await.unwrap();
    let feed = h.backend.feed(0).await;
    feed.send(helmet(0, 0.9)).ok();
    feed.send(helmet(40, 0.8)).ok();
    feed.send(Feed::End).ok();

    assert_eq!(
        transitions(&mut h.updates, 5).await,
        vec![
            SessionState::Validating,
            SessionState::Connecting,
            SessionState::Active,
            SessionState::Stopping,
            SessionState::Idle
        ]
    );
    let snapshot = h.manager.snapshot();
    assert_eq!(snapshot.metrics.total_detections, 0);
    assert_eq!(snapshot.latest_frame, None);
    assert!(h.reporter.failures.lock().unwrap().is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_stop_clears_statistics() {
    let mut h = harness();

    h.manager.start(MediaCandidate::device("0")).await.unwrap();
    let feed = h.backend.feed(0).await;
    let framed = DetectionEvent::new(
        0,
        vec![DetectedObject::new("helmet", 0.92, BoundingBox::default())],
    )
    .with_frame(FrameRef {
        sequence: 1,
        uri: None,
    });
    feed.send(Feed::Event(framed)).ok();
    assert_eq!(
        transitions(&mut h.updates, 3).await,
        vec![
            SessionState::Validating,
            SessionState::Connecting,
            SessionState::Active
        ]
    );
    assert_eq!(h.manager.metrics().total_detections, 1);

    h.manager.stop().await.unwrap();

    let snapshot = h.manager.snapshot();
    assert_eq!(snapshot.state, SessionState::Idle);
    assert_eq!(snapshot.session_id, None);
    assert_eq!(snapshot.metrics.total_detections, 0);
    assert_eq!(snapshot.metrics.average_confidence, None);
    assert_eq!(snapshot.latest_frame, None);
}

#[tokio::test(start_paused = true)]
async fn test_unacknowledged_upload_times_out() {
    let mut h = harness_with(
        FakeBackend {
            stall_upload: true,
            ..FakeBackend::default()
        },
        FakeDevices {
            outcome: PermissionOutcome::Granted,
            hang: false,
        },
    );

    h.manager.start(video_file()).await.unwrap();
    assert_eq!(
        transitions(&mut h.updates, 3).await,
        vec![
            SessionState::Validating,
            SessionState::Connecting,
            failed(FailureReason::Timeout)
        ]
    );
    assert_eq!(h.backend.opens(), 0);
}

#[tokio::test(start_paused = true)]
async fn test_command_during_validation_cancels_it() {
    let mut h = harness_with(
        FakeBackend::default(),
        FakeDevices {
            outcome: PermissionOutcome::Granted,
            hang: true,
        },
    );

    let manager = h.manager.clone();
    let pending_start = tokio::spawn(async move { manager.start(MediaCandidate::device("0")).await });
    assert_eq!(next_transition(&mut h.updates).await, SessionState::Validating);

    h.manager.stop().await.unwrap();
    assert_eq!(next_transition(&mut h.updates).await, SessionState::Idle);
    assert!(pending_start.await.unwrap().is_ok());
    assert_eq!(h.backend.opens(), 0);
    assert_eq!(h.reporter.started.load(Ordering::SeqCst), 0);
}

#[tokio::test(start_paused = true)]
async fn test_start_from_failed_clears_failure() {
    let mut h = harness();

    h.manager
        .start(MediaCandidate::file("a.png", 1, "image/png", "/tmp/a.png"))
        .await
        .unwrap();
    h.manager.start(MediaCandidate::device("0")).await.unwrap();

    assert_eq!(
        transitions(&mut h.updates, 5).await,
        vec![
            SessionState::Validating,
            failed(FailureReason::InvalidMediaType),
            SessionState::Idle,
            SessionState::Validating,
            SessionState::Connecting
        ]
    );
}

#[tokio::test(start_paused = true)]
async fn test_frame_updates_carry_latest_frame() {
    let mut h = harness();

    h.manager.start(MediaCandidate::device("0")).await.unwrap();
    let feed = h.backend.feed(0).await;
    feed.send(helmet(0, 0.9)).ok();
    assert_eq!(
        transitions(&mut h.updates, 3).await,
        vec![
            SessionState::Validating,
            SessionState::Connecting,
            SessionState::Active
        ]
    );

    let framed = DetectionEvent::new(40, Vec::new()).with_frame(FrameRef {
        sequence: 12,
        uri: Some("frame://12".to_string()),
    });
    feed.send(Feed::Event(framed)).ok();

    let update = timeout(Duration::from_secs(1), h.updates.recv())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(update.kind, UpdateKind::Frame);
    assert_eq!(update.state, SessionState::Active);
    assert_eq!(update.latest_frame.map(|f| f.sequence), Some(12));
}

#[tokio::test(start_paused = true)]
async fn test_callback_subscription_sees_every_transition_until_unsubscribed() {
    let h = harness_with(
        FakeBackend::default(),
        FakeDevices {
            outcome: PermissionOutcome::NotFound,
            hang: false,
        },
    );

    let seen = Arc::new(Mutex::new(Vec::new()));
    let sink = seen.clone();
    let handle = h.manager.on_state_change(move |update| {
        if update.kind == UpdateKind::Transition {
            sink.lock().unwrap().push(update.state);
        }
    });

    h.manager.start(MediaCandidate::device("7")).await.unwrap();
    h.manager.acknowledge().await.unwrap();
    tokio::time::sleep(Duration::from_millis(10)).await;

    assert_eq!(
        *seen.lock().unwrap(),
        vec![
            SessionState::Validating,
            failed(FailureReason::DeviceUnavailable),
            SessionState::Idle
        ]
    );

    handle.unsubscribe();
    h.manager.start(MediaCandidate::device("7")).await.unwrap();
    tokio::time::sleep(Duration::from_millis(10)).await;
    assert_eq!(seen.lock().unwrap().len(), 3);
}

#[tokio::test(start_paused = true)]
async fn test_shutdown_stops_session_and_rejects_commands() {
    let mut h = harness();

    h.manager.start(MediaCandidate::device("0")).await.unwrap();
    let _feed = h.backend.feed(0).await;
    h.manager.shutdown().await.unwrap();

    assert_eq!(
        transitions(&mut h.updates, 4).await,
        vec![
            SessionState::Validating,
            SessionState::Connecting,
            SessionState::Stopping,
            SessionState::Idle
        ]
    );
    assert!(h.manager.start(MediaCandidate::device("0")).await.is_err());
    assert_eq!(h.backend.open_now.load(Ordering::SeqCst), 0);
}
