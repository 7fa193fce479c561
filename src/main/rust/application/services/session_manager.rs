use std::collections::VecDeque;
use std::sync::Arc;

use tokio::sync::{mpsc, oneshot};
use tracing::{debug, error, info, warn};

use super::media_validator::MediaSourceValidator;
use super::statistics_aggregator::StatisticsAggregator;
use super::stream_connection::{ConnectionItem, StreamConnection};
use super::subscriptions::{SessionUpdate, SubscriberRegistry, Subscription, SubscriptionHandle, UpdateKind};
use crate::domain::entities::{Session, SessionId, SessionLifecycle};
use crate::domain::errors::{DomainError, FailureReason, Result};
use crate::domain::ports::{DeviceAccess, InferenceBackend, MetricsReporter};
use crate::domain::services::RequiredPpePolicy;
use crate::domain::value_objects::{
    CloseReason, FrameRef, HealthChange, HealthStatus, MediaCandidate, Metrics, SequencedEvent,
    SessionConfig, SessionState,
};

const COMMAND_QUEUE_DEPTH: usize = 32;

enum Command {
    Start {
        candidate: MediaCandidate,
        reply: oneshot::Sender<SessionId>,
    },
    Stop {
        reply: oneshot::Sender<()>,
    },
    Acknowledge {
        reply: oneshot::Sender<()>,
    },
    Shutdown {
        reply: oneshot::Sender<()>,
    },
}

/// Handle to the detection session manager.
///
/// The manager runs as a single task that owns the session, its stream
/// connection and the statistics window. Commands and connection items are
/// processed one at a time, so no transition ever interleaves with another.
/// The handle is cheap to clone; the task stops on `shutdown()` or when the
/// last handle is dropped.
#[derive(Clone)]
pub struct DetectionSessionManager {
    commands: mpsc::Sender<Command>,
    registry: Arc<SubscriberRegistry>,
}

impl DetectionSessionManager {
    /// Spawn the manager task. Must be called from within a tokio runtime.
    pub fn spawn(
        config: SessionConfig,
        backend: Arc<dyn InferenceBackend>,
        devices: Arc<dyn DeviceAccess>,
        metrics: Arc<dyn MetricsReporter>,
    ) -> Result<Self> {
        config.validate()?;

        let registry = Arc::new(SubscriberRegistry::new());
        let (commands, rx) = mpsc::channel(COMMAND_QUEUE_DEPTH);

        let policy = RequiredPpePolicy::new(config.required_ppe_classes().clone(), config.grouping());
        let actor = SessionActor {
            validator: MediaSourceValidator::new(devices, config.file_size_limit_bytes()),
            aggregator: StatisticsAggregator::new(
                config.aggregation_window(),
                config.min_confidence(),
                Arc::new(policy),
            ),
            config,
            backend,
            metrics,
            registry: registry.clone(),
            lifecycle: SessionLifecycle::new(),
            session: None,
            connection: None,
            latest_frame: None,
            sequence: 0,
            deferred: VecDeque::new(),
        };
        actor.metrics.report_state_change(&SessionState::Idle);
        tokio::spawn(actor.run(rx));

        Ok(Self { commands, registry })
    }

    /// Start a session on `candidate`, stopping the current one first.
    ///
    /// Returns once the new session is connecting, has failed validation or
    /// was cancelled by a later command.
    pub async fn start(&self, candidate: MediaCandidate) -> Result<SessionId> {
        let (reply, rx) = oneshot::channel();
        self.send(Command::Start { candidate, reply }).await?;
        rx.await.map_err(|_| DomainError::ManagerClosed)
    }

    /// Stop the current session; returns once it is `Idle`.
    pub async fn stop(&self) -> Result<()> {
        let (reply, rx) = oneshot::channel();
        self.send(Command::Stop { reply }).await?;
        rx.await.map_err(|_| DomainError::ManagerClosed)
    }

    /// Clear a `Failed` state
    pub async fn acknowledge(&self) -> Result<()> {
        let (reply, rx) = oneshot::channel();
        self.send(Command::Acknowledge { reply }).await?;
        rx.await.map_err(|_| DomainError::ManagerClosed)
    }

    /// Stop the current session and end the manager task
    pub async fn shutdown(&self) -> Result<()> {
        let (reply, rx) = oneshot::channel();
        self.send(Command::Shutdown { reply }).await?;
        rx.await.map_err(|_| DomainError::ManagerClosed)
    }

    pub fn subscribe(&self) -> Subscription {
        self.registry.subscribe()
    }

    /// Invoke `callback` for every update until the handle is unsubscribed
    pub fn on_state_change<F>(&self, callback: F) -> SubscriptionHandle
    where
        F: FnMut(SessionUpdate) + Send + 'static,
    {
        SubscriptionHandle::spawn(self.registry.subscribe(), callback)
    }

    pub fn snapshot(&self) -> SessionUpdate {
        self.registry.snapshot()
    }

    pub fn state(&self) -> SessionState {
        self.registry.snapshot().state
    }

    pub fn metrics(&self) -> Arc<Metrics> {
        self.registry.snapshot().metrics
    }

    async fn send(&self, command: Command) -> Result<()> {
        self.commands
            .send(command)
            .await
            .map_err(|_| DomainError::ManagerClosed)
    }
}

struct SessionActor {
    config: SessionConfig,
    backend: Arc<dyn InferenceBackend>,
    validator: MediaSourceValidator,
    aggregator: StatisticsAggregator,
    metrics: Arc<dyn MetricsReporter>,
    registry: Arc<SubscriberRegistry>,
    lifecycle: SessionLifecycle,
    session: Option<Session>,
    connection: Option<StreamConnection>,
    latest_frame: Option<FrameRef>,
    sequence: u64,
    /// Commands that arrived while a candidate was being validated
    deferred: VecDeque<Command>,
}

impl SessionActor {
    async fn run(mut self, mut commands: mpsc::Receiver<Command>) {
        info!("Detection session manager started");

        loop {
            let command = match self.deferred.pop_front() {
                Some(command) => command,
                None => {
                    tokio::select! {
                        biased;
                        command = commands.recv() => match command {
                            Some(command) => command,
                            None => break,
                        },
                        item = next_item(&mut self.connection) => {
                            self.on_connection_item(item).await;
                            continue;
                        }
                    }
                }
            };

            if !self.handle(command, &mut commands).await {
                break;
            }
        }

        self.stop_session("manager shutting down").await;
        info!("Detection session manager stopped");
    }

    /// Returns `false` once the manager should stop
    async fn handle(&mut self, command: Command, commands: &mut mpsc::Receiver<Command>) -> bool {
        match command {
            Command::Start { candidate, reply } => {
                let id = self.start_session(candidate, commands).await;
                let _ = reply.send(id);
            }
            Command::Stop { reply } => {
                self.stop_session("stop requested").await;
                let _ = reply.send(());
            }
            Command::Acknowledge { reply } => {
                self.acknowledge();
                let _ = reply.send(());
            }
            Command::Shutdown { reply } => {
                self.stop_session("manager shutting down").await;
                let _ = reply.send(());
                return false;
            }
        }
        true
    }

    fn state(&self) -> SessionState {
        *self.lifecycle.current_state()
    }

    async fn start_session(
        &mut self,
        candidate: MediaCandidate,
        commands: &mut mpsc::Receiver<Command>,
    ) -> SessionId {
        if self.state().is_failed() {
            self.transition(SessionState::Idle, "failure cleared by new session");
        } else {
            self.stop_session("replaced by new session").await;
        }

        self.clear_window();
        let session = Session::new(candidate.kind());
        let id = session.id();
        self.session = Some(session);
        self.transition(SessionState::Validating, format!("{} source", candidate.kind()));

        let validator = self.validator.clone();
        let outcome = tokio::select! {
            biased;
            result = validator.validate(&candidate) => Some(result),
            command = commands.recv() => {
                if let Some(command) = command {
                    self.deferred.push_back(command);
                }
                None
            }
        };

        match outcome {
            None => {
                info!(session_id = %id, "Validation interrupted by a newer command");
                self.transition(SessionState::Idle, "validation cancelled");
            }
            Some(Err(err)) => {
                warn!(session_id = %id, error = %err, "Media source rejected");
                self.fail(FailureReason::from(&err), err.to_string());
            }
            Some(Ok(source)) => {
                let description = source.describe();
                if let Some(session) = self.session.as_mut() {
                    session.attach_source(source.clone());
                }
                self.metrics.report_session_started(source.kind());
                self.transition(SessionState::Connecting, description);
                self.connection = Some(StreamConnection::open(
                    source,
                    self.backend.clone(),
                    &self.config,
                ));
            }
        }

        id
    }

    /// Close the connection and settle in `Idle`. No-op without a connection.
    async fn stop_session(&mut self, reason: &str) {
        if !self.state().holds_connection() {
            return;
        }

        self.transition(SessionState::Stopping, reason);
        if let Some(mut connection) = self.connection.take() {
            let closed = connection.close(self.config.stop_grace_period()).await;
            debug!(reason = %closed, "Stream connection released");
        }
        self.clear_window();
        self.transition(SessionState::Idle, reason);
    }

    fn acknowledge(&mut self) {
        if self.state().is_failed() {
            self.transition(SessionState::Idle, "failure acknowledged");
        } else {
            debug!(state = %self.state(), "Nothing to acknowledge");
        }
    }

    async fn on_connection_item(&mut self, item: Option<ConnectionItem>) {
        match item {
            Some(ConnectionItem::Event(event)) => self.on_event(event),
            Some(ConnectionItem::Health(change)) => self.on_health(change).await,
            None => {
                error!("Stream connection task ended without closing");
                self.connection = None;
                self.fail(FailureReason::Internal, "stream connection lost".to_string());
            }
        }
    }

    fn on_event(&mut self, sequenced: SequencedEvent) {
        let state = self.state();
        if !state.holds_connection() {
            debug!(%state, "Dropping detection event");
            return;
        }

        let event = sequenced.event;
        if sequenced.out_of_order {
            warn!(timestamp = event.timestamp, "Detection event delivered out of order");
            self.metrics.report_out_of_order();
        }

        let metrics = self.aggregator.fold(&event);
        self.metrics.report_window(&metrics);
        self.metrics.report_detections(event.objects.len() as u64);
        if let Some(session) = &self.session {
            self.metrics.report_uptime(session.uptime().as_secs_f64());
        }
        if let Some(frame) = event.frame {
            self.latest_frame = Some(frame);
        }

        if state == SessionState::Connecting {
            self.transition(SessionState::Active, "first detection event");
        } else {
            self.publish(UpdateKind::Frame);
        }
    }

    async fn on_health(&mut self, change: HealthChange) {
        if let Some(session) = self.session.as_mut() {
            session.update_health(change.health);
        }

        let state = self.state();
        match change.health.status {
            HealthStatus::Connecting => {}
            HealthStatus::Live => {
                if state == SessionState::Degraded {
                    self.transition(SessionState::Active, "stream recovered");
                }
            }
            HealthStatus::Degraded => {
                if state == SessionState::Active {
                    self.transition(SessionState::Degraded, "stream went quiet");
                }
            }
            HealthStatus::Closed => {
                if let Some(mut connection) = self.connection.take() {
                    connection.close(self.config.stop_grace_period()).await;
                }

                let reason = change.reason.unwrap_or(CloseReason::TransportClosed);
                let detail = change.detail.unwrap_or_else(|| reason.to_string());
                match (state, reason) {
                    (SessionState::Active | SessionState::Degraded, CloseReason::EndOfStream) => {
                        self.transition(SessionState::Stopping, "stream ended");
                        self.clear_window();
                        self.transition(SessionState::Idle, "stream ended");
                    }
                    _ => self.fail(reason.into(), detail),
                }
            }
        }
    }

    /// Drop the statistics window and frame of the current session
    fn clear_window(&mut self) {
        self.aggregator.reset();
        self.latest_frame = None;
        self.metrics.report_window(&self.aggregator.metrics());
    }

    fn fail(&mut self, reason: FailureReason, detail: String) {
        self.metrics.report_failure(reason);
        self.transition(SessionState::Failed { reason }, detail);
    }

    fn transition(&mut self, next: SessionState, reason: impl Into<String>) {
        let reason = reason.into();
        let from = self.state();

        match self.lifecycle.transition(next, Some(reason.clone())) {
            Ok(()) => info!(
                session_id = ?self.session.as_ref().map(Session::id),
                %from,
                to = %next,
                %reason,
                "Session state changed"
            ),
            Err(err) => {
                error!(error = %err, "Forcing session into internal failure");
                self.connection = None;
                self.lifecycle.force_internal_failure(err.to_string());
                self.metrics.report_failure(FailureReason::Internal);
            }
        }

        let state = self.state();
        if let Some(session) = self.session.as_mut() {
            session.set_state(state);
            if matches!(state, SessionState::Idle | SessionState::Failed { .. }) {
                session.end();
            }
        }
        if state == SessionState::Idle {
            self.session = None;
            self.metrics.report_uptime(0.0);
        }

        self.metrics.report_state_change(&state);
        self.publish(UpdateKind::Transition);
    }

    fn publish(&mut self, kind: UpdateKind) {
        self.sequence += 1;
        self.registry.publish(SessionUpdate {
            kind,
            sequence: self.sequence,
            session_id: self.session.as_ref().map(Session::id),
            state: self.state(),
            metrics: self.aggregator.metrics(),
            latest_frame: self.latest_frame.clone(),
            health: self.session.as_ref().map(|s| *s.health()),
        });
    }
}

async fn next_item(connection: &mut Option<StreamConnection>) -> Option<ConnectionItem> {
    match connection {
        Some(connection) => connection.recv().await,
        None => std::future::pending().await,
    }
}
