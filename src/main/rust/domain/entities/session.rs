use std::time::{Duration, Instant, SystemTime};

use uuid::Uuid;

use crate::domain::value_objects::{ConnectionHealth, MediaSource, SessionState, SourceKind};

pub type SessionId = Uuid;

/// One run of the detection pipeline bound to a single media source
#[derive(Debug, Clone)]
pub struct Session {
    id: SessionId,
    source_kind: SourceKind,
    source: Option<MediaSource>,
    state: SessionState,
    started_at: SystemTime,
    started: Instant,
    ended_at: Option<SystemTime>,
    health: ConnectionHealth,
}

impl Session {
    pub fn new(source_kind: SourceKind) -> Self {
        Self {
            id: Uuid::new_v4(),
            source_kind,
            source: None,
            state: SessionState::Idle,
            started_at: SystemTime::now(),
            started: Instant::now(),
            ended_at: None,
            health: ConnectionHealth::connecting(),
        }
    }

    pub fn id(&self) -> SessionId {
        self.id
    }

    pub fn source_kind(&self) -> SourceKind {
        self.source_kind
    }

    /// The validated source, once validation succeeded
    pub fn source(&self) -> Option<&MediaSource> {
        self.source.as_ref()
    }

    /// Bind the validated source. The first source sticks.
    pub fn attach_source(&mut self, source: MediaSource) -> bool {
        if self.source.is_some() || source.kind() != self.source_kind {
            return false;
        }
        self.source = Some(source);
        true
    }

    pub fn state(&self) -> &SessionState {
        &self.state
    }

    pub(crate) fn set_state(&mut self, state: SessionState) {
        self.state = state;
    }

    pub fn started_at(&self) -> SystemTime {
        self.started_at
    }

    pub fn ended_at(&self) -> Option<SystemTime> {
        self.ended_at
    }

    pub fn uptime(&self) -> Duration {
        self.started.elapsed()
    }

    pub fn health(&self) -> &ConnectionHealth {
        &self.health
    }

    pub fn update_health(&mut self, health: ConnectionHealth) {
        self.health = health;
    }

    pub fn end(&mut self) {
        if self.ended_at.is_none() {
            self.ended_at = Some(SystemTime::now());
        }
    }

    pub fn is_ended(&self) -> bool {
        self.ended_at.is_some()
    }
}
