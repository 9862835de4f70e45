//! Process-wide bridge status.
//!
//! Single-writer rules:
//! - connection state and `connected_since` are written only by the
//!   [`ChannelClient`](crate::channel::ChannelClient);
//! - `commands_handled` is incremented only by the orchestrator;
//! - `last_error` is written by either, last writer wins.
//!
//! Handlers only ever see a [`StatusSnapshot`].

use std::fmt;
use std::sync::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Connected,
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            ConnectionState::Disconnected => "Disconnected",
            ConnectionState::Connecting => "Connecting",
            ConnectionState::Connected => "Connected",
        })
    }
}

#[derive(Debug)]
struct Connection {
    state: ConnectionState,
    since: Option<DateTime<Utc>>,
}

#[derive(Debug)]
pub struct BridgeStatus {
    agent_id: String,
    console_name: String,
    console_url: String,
    started: Instant,
    connection: Mutex<Connection>,
    commands_handled: AtomicU64,
    last_error: Mutex<Option<String>>,
}

/// Read-only copy handed to the `status` handler.
#[derive(Debug, Clone, Serialize)]
pub struct StatusSnapshot {
    pub agent_id: String,
    pub console_name: String,
    pub console_url: String,
    pub connection_state: ConnectionState,
    pub connected_since: Option<DateTime<Utc>>,
    pub uptime: Duration,
    pub commands_handled: u64,
    pub last_error: Option<String>,
}

impl BridgeStatus {
    pub fn new(agent_id: &str, console_name: &str, console_url: &str) -> Self {
        Self {
            agent_id: agent_id.to_string(),
            console_name: console_name.to_string(),
            console_url: console_url.to_string(),
            started: Instant::now(),
            connection: Mutex::new(Connection {
                state: ConnectionState::Disconnected,
                since: None,
            }),
            commands_handled: AtomicU64::new(0),
            last_error: Mutex::new(None),
        }
    }

    pub fn agent_id(&self) -> &str {
        &self.agent_id
    }

    pub fn connection_state(&self) -> ConnectionState {
        self.connection
            .lock()
            .map(|c| c.state)
            .unwrap_or(ConnectionState::Disconnected)
    }

    // --- Channel client writes ---

    pub(crate) fn set_connecting(&self) {
        self.set_connection(ConnectionState::Connecting);
    }

    pub(crate) fn set_connected(&self) {
        self.set_connection(ConnectionState::Connected);
    }

    pub(crate) fn set_disconnected(&self, error: Option<String>) {
        self.set_connection(ConnectionState::Disconnected);
        if let Some(error) = error {
            self.record_error(error);
        }
    }

    fn set_connection(&self, state: ConnectionState) {
        if let Ok(mut conn) = self.connection.lock() {
            conn.state = state;
            conn.since = (state == ConnectionState::Connected).then(Utc::now);
        }
    }

    // --- Orchestrator writes ---

    pub(crate) fn record_command(&self) -> u64 {
        self.commands_handled.fetch_add(1, Ordering::Relaxed) + 1
    }

    pub(crate) fn record_error(&self, error: String) {
        if let Ok(mut last) = self.last_error.lock() {
            *last = Some(error);
        }
    }

    pub fn snapshot(&self) -> StatusSnapshot {
        let (connection_state, connected_since) = self
            .connection
            .lock()
            .map(|c| (c.state, c.since))
            .unwrap_or((ConnectionState::Disconnected, None));
        StatusSnapshot {
            agent_id: self.agent_id.clone(),
            console_name: self.console_name.clone(),
            console_url: self.console_url.clone(),
            connection_state,
            connected_since,
            uptime: self.started.elapsed(),
            commands_handled: self.commands_handled.load(Ordering::Relaxed),
            last_error: self.last_error.lock().ok().and_then(|e| e.clone()),
        }
    }
}

/// Human uptime: `2h 5m`, `3m 12s`, `45s`.
pub fn format_uptime(uptime: Duration) -> String {
    let seconds = uptime.as_secs();
    let minutes = seconds / 60;
    let hours = minutes / 60;
    if hours > 0 {
        format!("{hours}h {}m", minutes % 60)
    } else if minutes > 0 {
        format!("{minutes}m {}s", seconds % 60)
    } else {
        format!("{seconds}s")
    }
}
