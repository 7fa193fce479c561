use std::sync::Arc;
use std::time::{Duration, SystemTime};

use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::{sleep_until, Instant};
use tracing::{debug, info, warn};

use super::reorder_buffer::ReorderBuffer;
use crate::domain::errors::TransportError;
use crate::domain::ports::{FrameStream, InferenceBackend, StreamTarget};
use crate::domain::value_objects::{
    BackoffPolicy, CloseReason, ConnectionHealth, DetectionEvent, HealthChange, HealthStatus,
    MediaSource, SequencedEvent, SessionConfig,
};

/// Item delivered by a [`StreamConnection`]
#[derive(Debug, Clone, PartialEq)]
pub enum ConnectionItem {
    Event(SequencedEvent),
    Health(HealthChange),
}

/// Owns the transport to the inference backend for one session.
///
/// The transport runs on its own task. Health changes travel on an unbounded
/// channel and are handed out ahead of queued detection events; the terminal
/// `Closed` change is held back until every event sent before it was handed
/// out.
pub struct StreamConnection {
    health_rx: mpsc::UnboundedReceiver<HealthChange>,
    events_rx: mpsc::Receiver<SequencedEvent>,
    shutdown_tx: watch::Sender<bool>,
    task: Option<JoinHandle<()>>,
    pending_close: Option<HealthChange>,
    closed: Option<CloseReason>,
}

impl StreamConnection {
    /// Start connecting to the backend. Must be called from within a tokio runtime.
    pub fn open(
        source: MediaSource,
        backend: Arc<dyn InferenceBackend>,
        config: &SessionConfig,
    ) -> Self {
        let (health_tx, health_rx) = mpsc::unbounded_channel();
        let (events_tx, events_rx) = mpsc::channel(config.event_channel_capacity());
        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        let task = ConnectionTask {
            source,
            backend,
            liveness_timeout: config.liveness_timeout(),
            reconnect_timeout: config.reconnect_timeout(),
            backoff: config.backoff().clone(),
            reorder: ReorderBuffer::new(config.reorder_capacity(), config.reorder_max_delay()),
            health: ConnectionHealth::connecting(),
            health_tx,
            events_tx,
            shutdown_rx,
        };

        Self {
            health_rx,
            events_rx,
            shutdown_tx,
            task: Some(tokio::spawn(task.run())),
            pending_close: None,
            closed: None,
        }
    }

    pub fn is_closed(&self) -> bool {
        self.closed.is_some()
    }

    /// Next item, or `None` once closed. Returning `None` before a terminal
    /// `Closed` change means the transport task died.
    pub async fn recv(&mut self) -> Option<ConnectionItem> {
        loop {
            if self.closed.is_some() {
                return None;
            }

            if let Some(terminal) = self.pending_close.take() {
                if let Ok(event) = self.events_rx.try_recv() {
                    self.pending_close = Some(terminal);
                    return Some(ConnectionItem::Event(event));
                }
                self.closed = Some(terminal.reason.unwrap_or(CloseReason::TransportClosed));
                return Some(ConnectionItem::Health(terminal));
            }

            let change = tokio::select! {
                biased;
                change = self.health_rx.recv() => change,
                event = self.events_rx.recv() => match event {
                    Some(event) => return Some(ConnectionItem::Event(event)),
                    None => self.health_rx.recv().await,
                },
            };

            match change {
                Some(change) if change.is_terminal() => self.pending_close = Some(change),
                Some(change) => return Some(ConnectionItem::Health(change)),
                None => return None,
            }
        }
    }

    /// Close the connection. Idempotent; returns the terminal reason.
    ///
    /// Waits at most `grace` for the transport to wind down, then aborts it.
    /// Events still queued are discarded.
    pub async fn close(&mut self, grace: Duration) -> CloseReason {
        if let Some(reason) = self.closed {
            return reason;
        }

        let _ = self.shutdown_tx.send(true);

        let outcome = tokio::time::timeout(grace, async {
            loop {
                match self.recv().await {
                    Some(ConnectionItem::Health(change)) if change.is_terminal() => {
                        return change.reason
                    }
                    Some(_) => continue,
                    None => return None,
                }
            }
        })
        .await;

        let reason = match outcome {
            Ok(Some(reason)) => reason,
            Ok(None) => CloseReason::UserStopped,
            Err(_) => {
                warn!(grace_ms = grace.as_millis() as u64, "Stream did not close in time, forcing");
                CloseReason::UserStopped
            }
        };

        if let Some(task) = self.task.take() {
            task.abort();
            let _ = task.await;
        }

        self.closed = Some(reason);
        reason
    }
}

impl Drop for StreamConnection {
    fn drop(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}

struct ConnectionTask {
    source: MediaSource,
    backend: Arc<dyn InferenceBackend>,
    liveness_timeout: Duration,
    reconnect_timeout: Duration,
    backoff: BackoffPolicy,
    reorder: ReorderBuffer,
    health: ConnectionHealth,
    health_tx: mpsc::UnboundedSender<HealthChange>,
    events_tx: mpsc::Sender<SequencedEvent>,
    shutdown_rx: watch::Receiver<bool>,
}

impl ConnectionTask {
    async fn run(mut self) {
        let (reason, detail) = self.drive().await;

        match &detail {
            Some(detail) => info!(%reason, %detail, "Stream connection closed"),
            None => info!(%reason, "Stream connection closed"),
        }

        let _ = self
            .health_tx
            .send(HealthChange::closed(self.health.last_event_at, reason, detail));
    }

    /// Runs until the connection is over. The frame stream is dropped before returning.
    async fn drive(&mut self) -> (CloseReason, Option<String>) {
        self.emit(HealthStatus::Connecting);
        // covers the upload, the handshake and the wait for the first event
        let first_event_deadline = Instant::now() + self.reconnect_timeout;

        let target = match self.source.clone() {
            MediaSource::UploadedFile(file) => {
                debug!(name = %file.name, "Uploading media to backend");
                tokio::select! {
                    biased;
                    _ = shutdown_requested(&mut self.shutdown_rx) => {
                        return (CloseReason::UserStopped, None);
                    }
                    _ = sleep_until(first_event_deadline) => {
                        return (CloseReason::Timeout, Some("upload was not acknowledged".to_string()));
                    }
                    result = self.backend.upload(&file) => match result {
                        Ok(ticket) => StreamTarget::Processed {
                            stream_id: ticket.stream_id,
                        },
                        Err(err) => return (CloseReason::UploadFailed, Some(err.to_string())),
                    },
                }
            }
            MediaSource::LiveDevice(device) => StreamTarget::Live {
                device_id: device.device_id,
            },
        };
        let ends_with_media = matches!(target, StreamTarget::Processed { .. });

        debug!(?target, "Opening detection stream");
        let mut stream: Option<Box<dyn FrameStream>> = tokio::select! {
            biased;
            _ = shutdown_requested(&mut self.shutdown_rx) => {
                return (CloseReason::UserStopped, None);
            }
            _ = sleep_until(first_event_deadline) => {
                return (CloseReason::Timeout, Some("stream did not open".to_string()));
            }
            result = self.backend.open_stream(&target) => match result {
                Ok(stream) => Some(stream),
                Err(err) => return (CloseReason::TransportClosed, Some(err.to_string())),
            },
        };

        let mut status = HealthStatus::Connecting;
        let mut last_event = Instant::now();
        let mut degraded_since: Option<Instant> = None;
        let mut transport_lost = false;
        let mut reconnect_at: Option<Instant> = None;
        let mut backoff = self.backoff.initial_delay();

        loop {
            let now = Instant::now();
            let reorder_deadline = self.reorder.next_deadline();
            let liveness_deadline = last_event + self.liveness_timeout;
            let give_up_at = match (status, degraded_since) {
                (HealthStatus::Degraded, Some(since)) => since + self.reconnect_timeout,
                _ => first_event_deadline,
            };
            let waiting = matches!(status, HealthStatus::Connecting | HealthStatus::Degraded);

            tokio::select! {
                biased;
                _ = shutdown_requested(&mut self.shutdown_rx) => {
                    return (CloseReason::UserStopped, None);
                }
                _ = sleep_until(reorder_deadline.unwrap_or(now)), if reorder_deadline.is_some() => {
                    let released = self.reorder.release_due(Instant::now());
                    if !self.deliver(released).await {
                        return (CloseReason::UserStopped, None);
                    }
                }
                _ = sleep_until(liveness_deadline), if status == HealthStatus::Live => {
                    warn!(
                        timeout_ms = self.liveness_timeout.as_millis() as u64,
                        "No detection events received, stream degraded"
                    );
                    status = HealthStatus::Degraded;
                    degraded_since = Some(Instant::now());
                    self.emit(status);
                }
                _ = sleep_until(give_up_at), if waiting => {
                    let released = self.reorder.drain();
                    self.deliver(released).await;
                    return if transport_lost {
                        (CloseReason::TransportClosed, Some("stream could not be re-opened".to_string()))
                    } else {
                        (CloseReason::Timeout, Some("no detection events".to_string()))
                    };
                }
                _ = sleep_until(reconnect_at.unwrap_or(now)), if stream.is_none() && reconnect_at.is_some() => {
                    reconnect_at = None;
                    let reopened = tokio::select! {
                        biased;
                        _ = shutdown_requested(&mut self.shutdown_rx) => {
                            return (CloseReason::UserStopped, None);
                        }
                        result = self.backend.open_stream(&target) => result,
                    };
                    match reopened {
                        Ok(reopened) => {
                            info!("Detection stream re-opened");
                            stream = Some(reopened);
                            backoff = self.backoff.initial_delay();
                        }
                        Err(err) => {
                            debug!(error = %err, retry_in = ?backoff, "Re-opening stream failed");
                            reconnect_at = Some(Instant::now() + backoff);
                            backoff = self.backoff.next_delay(backoff);
                        }
                    }
                }
                next = next_event(&mut stream), if stream.is_some() => match next {
                    Ok(Some(event)) => {
                        last_event = Instant::now();
                        self.health.last_event_at = Some(SystemTime::now());
                        transport_lost = false;

                        let released = self.reorder.push(event, last_event);
                        if !self.deliver(released).await {
                            return (CloseReason::UserStopped, None);
                        }
                        if status != HealthStatus::Live {
                            status = HealthStatus::Live;
                            degraded_since = None;
                            self.emit(status);
                        }
                    }
                    Ok(None) if ends_with_media => {
                        let released = self.reorder.drain();
                        self.deliver(released).await;
                        return (CloseReason::EndOfStream, None);
                    }
                    other => {
                        stream = None;
                        let detail = match other {
                            Err(err) => err.to_string(),
                            _ => "stream ended".to_string(),
                        };

                        if status == HealthStatus::Connecting {
                            return (CloseReason::TransportClosed, Some(detail));
                        }

                        warn!(%detail, "Detection stream lost, reconnecting");
                        transport_lost = true;
                        if status == HealthStatus::Live {
                            status = HealthStatus::Degraded;
                            degraded_since = Some(Instant::now());
                            self.emit(status);
                        }
                        reconnect_at = Some(Instant::now() + backoff);
                        backoff = self.backoff.next_delay(backoff);
                    }
                },
            }
        }
    }

    fn emit(&mut self, status: HealthStatus) {
        self.health.status = status;
        let _ = self.health_tx.send(HealthChange::status(self.health));
    }

    /// Hand released events to the manager; `false` once nobody listens.
    async fn deliver(&mut self, released: Vec<SequencedEvent>) -> bool {
        for event in released {
            if self.events_tx.send(event).await.is_err() {
                return false;
            }
        }
        true
    }
}

async fn shutdown_requested(rx: &mut watch::Receiver<bool>) {
    loop {
        if *rx.borrow_and_update() {
            return;
        }
        if rx.changed().await.is_err() {
            return;
        }
    }
}

async fn next_event(
    stream: &mut Option<Box<dyn FrameStream>>,
) -> Result<Option<DetectionEvent>, TransportError> {
    match stream {
        Some(stream) => stream.next_event().await,
        None => std::future::pending().await,
    }
}
