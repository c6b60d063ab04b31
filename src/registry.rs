//! Session registry with a concurrent-client cap.
//!
//! Tracks every client the server has seen over its lifetime, enforces the
//! maximum number of simultaneously active sessions, and hands out sequential
//! identities. All state lives behind a single mutex so the capacity check,
//! identity allocation, and session insertion are one indivisible step.

use chrono::{DateTime, Local};
use std::net::SocketAddr;
use std::sync::Mutex;
use tracing::{debug, info};

/// Default maximum number of simultaneously active sessions
pub const DEFAULT_MAX_CLIENTS: usize = 3;

/// Timestamp format used in status output
const TIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Why a session ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CloseReason {
    /// Client sent an explicit exit command
    Graceful,
    /// Peer disconnected or the connection failed
    Abrupt,
}

/// Session state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionStatus {
    Active,
    Closed,
}

/// One client's connection record, retained for the life of the process
#[derive(Debug, Clone)]
pub struct Session {
    /// Assigned identity, e.g. "Client01"
    pub identity: String,
    /// Peer address captured at accept time
    pub remote_addr: SocketAddr,
    /// When the session was admitted
    pub connected_at: DateTime<Local>,
    /// When the session ended (None while active)
    pub disconnected_at: Option<DateTime<Local>>,
    /// Active or closed
    pub status: SessionStatus,
    /// How the session ended (None while active)
    pub reason: Option<CloseReason>,
}

impl Session {
    /// One pipe-delimited status line:
    /// `identity|host:port|connected|disconnected|state`
    pub fn render(&self) -> String {
        let disconnected = self
            .disconnected_at
            .map(|t| t.format(TIME_FORMAT).to_string())
            .unwrap_or_else(|| "-".to_string());
        let state = match (self.status, self.reason) {
            (SessionStatus::Active, _) => "active",
            (SessionStatus::Closed, Some(CloseReason::Abrupt)) => "dropped",
            (SessionStatus::Closed, _) => "closed",
        };
        format!(
            "{}|{}|{}|{}|{}",
            self.identity,
            self.remote_addr,
            self.connected_at.format(TIME_FORMAT),
            disconnected,
            state
        )
    }
}

/// Outcome of an admission attempt
#[derive(Debug, Clone)]
pub enum Admission {
    /// Admitted; the created session (a copy of the registry entry)
    Admitted(Session),
    /// Server at capacity; no session was created
    Rejected,
}

struct Inner {
    /// Monotonic identity counter, never reused
    next_id: u64,
    /// Number of sessions currently active
    active: usize,
    /// All sessions ever admitted, in admission order
    sessions: Vec<Session>,
}

/// Thread-safe registry of client sessions
pub struct SessionRegistry {
    max_clients: usize,
    inner: Mutex<Inner>,
}

impl SessionRegistry {
    /// Create a registry enforcing the given concurrency cap
    pub fn new(max_clients: usize) -> Self {
        info!(max_clients, "Initializing session registry");
        SessionRegistry {
            max_clients,
            inner: Mutex::new(Inner {
                next_id: 0,
                active: 0,
                sessions: Vec::new(),
            }),
        }
    }

    /// Atomically check capacity and, if a slot is free, create an active
    /// session with the next sequential identity. A rejected attempt consumes
    /// no identity and leaves the registry untouched.
    pub fn try_admit(&self, remote_addr: SocketAddr) -> Admission {
        let mut inner = self.inner.lock().unwrap();
        if inner.active >= self.max_clients {
            debug!(peer = %remote_addr, active = inner.active, "Admission rejected: at capacity");
            return Admission::Rejected;
        }

        inner.next_id += 1;
        let session = Session {
            identity: format!("Client{:02}", inner.next_id),
            remote_addr,
            connected_at: Local::now(),
            disconnected_at: None,
            status: SessionStatus::Active,
            reason: None,
        };
        inner.active += 1;
        inner.sessions.push(session.clone());

        debug!(identity = %session.identity, peer = %remote_addr, active = inner.active, "Session admitted");
        Admission::Admitted(session)
    }

    /// Mark a session closed, recording the disconnect time and reason.
    /// Idempotent: closing an already-closed session changes nothing.
    pub fn close(&self, identity: &str, reason: CloseReason) {
        let mut inner = self.inner.lock().unwrap();
        let inner = &mut *inner;
        if let Some(session) = inner.sessions.iter_mut().find(|s| s.identity == identity) {
            if session.status == SessionStatus::Active {
                session.status = SessionStatus::Closed;
                session.disconnected_at = Some(Local::now());
                session.reason = Some(reason);
                inner.active -= 1;
                debug!(identity, ?reason, active = inner.active, "Session closed");
            }
        }
    }

    /// Point-in-time copy of all sessions, in admission order
    pub fn snapshot(&self) -> Vec<Session> {
        self.inner.lock().unwrap().sessions.clone()
    }

    /// Number of currently active sessions
    pub fn active_count(&self) -> usize {
        self.inner.lock().unwrap().active
    }
}
