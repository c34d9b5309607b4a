//! Agent session tracking.
//!
//! The engine owns one session record per active agent: when it was
//! created, when it was last touched, and how many times each primitive
//! ran under it. Sessions age out after a configured idle window; the
//! maintenance tick sweeps them.

use crate::error::{AgramaError, AgramaResult};
use crate::primitives::PrimitiveKind;
use chrono::{DateTime, Duration, Utc};
use dashmap::DashMap;
use serde::Serialize;
use uuid::Uuid;

/// Per-primitive call counters.
#[derive(Debug, Clone, Copy, Default, Serialize)]
pub struct PrimitiveCounts {
    /// store calls
    pub store: u64,
    /// retrieve calls
    pub retrieve: u64,
    /// search calls
    pub search: u64,
    /// link calls
    pub link: u64,
    /// transform calls
    pub transform: u64,
}

impl PrimitiveCounts {
    fn bump(&mut self, kind: PrimitiveKind) {
        match kind {
            PrimitiveKind::Store => self.store += 1,
            PrimitiveKind::Retrieve => self.retrieve += 1,
            PrimitiveKind::Search => self.search += 1,
            PrimitiveKind::Link => self.link += 1,
            PrimitiveKind::Transform => self.transform += 1,
        }
    }
}

/// One agent's session record.
#[derive(Debug, Clone, Serialize)]
pub struct AgentSession {
    /// The agent this session belongs to
    pub agent_id: String,
    /// Opaque session identifier (UUID v4)
    pub session_id: String,
    /// When the session was created
    pub started_at: DateTime<Utc>,
    /// Last primitive call under this session
    pub last_activity: DateTime<Utc>,
    /// Total primitive calls
    pub operation_count: u64,
    /// Per-primitive breakdown
    pub counts: PrimitiveCounts,
}

/// Tracks active agent sessions.
///
/// Create/update paths are short critical sections on the agent's shard;
/// the sweep runs on the maintenance tick.
#[derive(Debug)]
pub struct SessionTracker {
    sessions: DashMap<String, AgentSession>,
    idle_window: Duration,
    /// Ceiling on simultaneously tracked agents (0 = unlimited)
    max_agents: usize,
}

impl SessionTracker {
    /// Create a tracker with the given idle window and agent ceiling.
    pub fn new(idle_seconds: u64, max_agents: usize) -> Self {
        Self {
            sessions: DashMap::new(),
            idle_window: Duration::seconds(idle_seconds as i64),
            max_agents,
        }
    }

    /// Record a primitive call for `agent_id`, creating the session on
    /// first contact. Returns the session id.
    ///
    /// # Errors
    ///
    /// `TooManyConnections` when a new agent would exceed the ceiling.
    pub fn touch(&self, agent_id: &str, kind: PrimitiveKind) -> AgramaResult<String> {
        if let Some(mut session) = self.sessions.get_mut(agent_id) {
            session.last_activity = Utc::now();
            session.operation_count += 1;
            session.counts.bump(kind);
            return Ok(session.session_id.clone());
        }

        if self.max_agents > 0 && self.sessions.len() >= self.max_agents {
            return Err(AgramaError::TooManyConnections {
                limit: self.max_agents,
            });
        }

        let now = Utc::now();
        let mut counts = PrimitiveCounts::default();
        counts.bump(kind);
        let session = AgentSession {
            agent_id: agent_id.to_string(),
            session_id: Uuid::new_v4().to_string(),
            started_at: now,
            last_activity: now,
            operation_count: 1,
            counts,
        };
        let session_id = session.session_id.clone();
        self.sessions.insert(agent_id.to_string(), session);
        Ok(session_id)
    }

    /// Snapshot one agent's session.
    pub fn get(&self, agent_id: &str) -> Option<AgentSession> {
        self.sessions.get(agent_id).map(|s| s.clone())
    }

    /// Number of tracked sessions.
    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    /// Whether no sessions are tracked.
    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }

    /// Drop sessions idle past the window. Returns how many were swept.
    pub fn sweep_idle(&self, now: DateTime<Utc>) -> usize {
        let cutoff = now - self.idle_window;
        let before = self.sessions.len();
        self.sessions.retain(|_, session| session.last_activity >= cutoff);
        before - self.sessions.len()
    }

    /// Snapshot all sessions, ordered by agent id.
    pub fn snapshot(&self) -> Vec<AgentSession> {
        let mut sessions: Vec<AgentSession> =
            self.sessions.iter().map(|entry| entry.value().clone()).collect();
        sessions.sort_by(|a, b| a.agent_id.cmp(&b.agent_id));
        sessions
    }
}
