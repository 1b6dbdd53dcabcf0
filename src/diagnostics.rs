use std::{
    fmt,
    sync::{Mutex, MutexGuard, PoisonError},
};

use serde::Serialize;

use crate::util::{truncate_message, unix_now_secs};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub enum ConnectionState {
    #[default]
    Disconnected,
    Connecting,
    Connected,
    Backoff,
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            ConnectionState::Disconnected => "Disconnected",
            ConnectionState::Connecting => "Connecting",
            ConnectionState::Connected => "Connected",
            ConnectionState::Backoff => "Backoff",
        };
        f.write_str(label)
    }
}

#[derive(Debug, Serialize, Clone, PartialEq, Eq)]
pub struct RuntimeDiagnostics {
    pub connection_state: ConnectionState,
    pub should_run: bool,
    pub connections: u64,
    pub last_connected_at: Option<u64>,
    pub last_stream_event_at: Option<u64>,
    pub last_signal_at: Option<u64>,
    pub signals_received: u64,
    pub stale_for_seconds: Option<u64>,
    pub last_error: Option<String>,
    pub backoff_seconds: u64,
    pub reconnect_attempts: u64,
}

#[derive(Default)]
struct SocketRuntime {
    connection_state: ConnectionState,
    should_run: bool,
    connections: u64,
    last_connected_at: Option<u64>,
    last_stream_event_at: Option<u64>,
    last_signal_at: Option<u64>,
    signals_received: u64,
    last_error: Option<String>,
    backoff_seconds: u64,
    reconnect_attempts: u64,
}

/// Shared view of the events socket, written by the socket loop and read by the CLI.
#[derive(Default)]
pub struct SocketDiagnostics {
    runtime: Mutex<SocketRuntime>,
}

impl SocketDiagnostics {
    pub fn snapshot(&self) -> RuntimeDiagnostics {
        let runtime = self.lock();
        let now = unix_now_secs();
        RuntimeDiagnostics {
            connection_state: runtime.connection_state,
            should_run: runtime.should_run,
            connections: runtime.connections,
            last_connected_at: runtime.last_connected_at,
            last_stream_event_at: runtime.last_stream_event_at,
            last_signal_at: runtime.last_signal_at,
            signals_received: runtime.signals_received,
            stale_for_seconds: runtime
                .last_stream_event_at
                .map(|last| now.saturating_sub(last)),
            last_error: runtime.last_error.clone(),
            backoff_seconds: runtime.backoff_seconds,
            reconnect_attempts: runtime.reconnect_attempts,
        }
    }

    pub fn connections(&self) -> u64 {
        self.lock().connections
    }

    pub(crate) fn set_running(&self, should_run: bool) {
        let mut runtime = self.lock();
        runtime.should_run = should_run;
        if !should_run {
            runtime.backoff_seconds = 0;
        }
    }

    pub(crate) fn set_state(&self, state: ConnectionState) {
        let mut runtime = self.lock();
        if runtime.connection_state != state {
            log::debug!("socket: {} -> {state}", runtime.connection_state);
        }
        runtime.connection_state = state;
    }

    pub(crate) fn mark_connected(&self, at: u64) {
        let mut runtime = self.lock();
        runtime.connection_state = ConnectionState::Connected;
        runtime.connections = runtime.connections.saturating_add(1);
        runtime.last_connected_at = Some(at);
        runtime.last_stream_event_at = Some(at);
        runtime.last_error = None;
        runtime.backoff_seconds = 0;
    }

    pub(crate) fn mark_activity(&self, at: u64) {
        self.lock().last_stream_event_at = Some(at);
    }

    pub(crate) fn mark_signal(&self, at: u64) {
        let mut runtime = self.lock();
        runtime.last_stream_event_at = Some(at);
        runtime.last_signal_at = Some(at);
        runtime.signals_received = runtime.signals_received.saturating_add(1);
    }

    pub(crate) fn record_failure(&self, error: &str, backoff_seconds: u64) {
        let mut runtime = self.lock();
        runtime.connection_state = ConnectionState::Backoff;
        runtime.last_error = Some(truncate_message(error, 300));
        runtime.backoff_seconds = backoff_seconds;
        runtime.reconnect_attempts = runtime.reconnect_attempts.saturating_add(1);
    }

    fn lock(&self) -> MutexGuard<'_, SocketRuntime> {
        self.runtime.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
