//! Events socket: turns `/eventsws` frames into feed refresh signals.
//!
//! Frames carry no payload worth reading; any text or binary frame means
//! "the event list changed". Signals are coalesced into a channel of
//! capacity one, so a burst of frames costs at most one queued refresh.

use std::{sync::Arc, time::Duration};

use futures_util::{SinkExt, StreamExt};
use tokio::sync::{mpsc, watch};
use tokio_tungstenite::{connect_async, tungstenite::Message};

use crate::{
    consts::{
        EVENTS_WS_PATH, STREAM_CONNECT_TIMEOUT_SECS, STREAM_LIVENESS_CHECK_INTERVAL_SECS,
        STREAM_LIVENESS_IDLE_SECS, STREAM_LIVENESS_PING_GRACE_SECS, STREAM_MAX_BACKOFF_SECS,
    },
    diagnostics::{ConnectionState, SocketDiagnostics},
    util::{redact_url, server_url, truncate_message, unix_now_secs},
};

/// Derives the socket URL from the server URL: `http` becomes `ws`, `https` becomes `wss`.
pub fn build_events_ws_url(base_url: &str) -> Result<String, String> {
    let raw = server_url(base_url, EVENTS_WS_PATH);
    let mut url =
        reqwest::Url::parse(&raw).map_err(|error| format!("Invalid server URL: {error}"))?;
    let scheme = match url.scheme() {
        "http" => "ws",
        "https" => "wss",
        other => return Err(format!("Unsupported server URL scheme: {other}")),
    };
    url.set_scheme(scheme)
        .map_err(|_| format!("Failed to derive websocket URL from {base_url}"))?;
    Ok(url.to_string())
}

pub struct EventsSocket {
    ws_url: String,
    signals: mpsc::Sender<()>,
    diagnostics: Arc<SocketDiagnostics>,
}

impl EventsSocket {
    pub fn new(
        base_url: &str,
        signals: mpsc::Sender<()>,
        diagnostics: Arc<SocketDiagnostics>,
    ) -> Result<Self, String> {
        Ok(Self {
            ws_url: build_events_ws_url(base_url)?,
            signals,
            diagnostics,
        })
    }

    /// Keeps a connection open until `stop_rx` turns true, reconnecting with backoff.
    pub async fn run(self, mut stop_rx: watch::Receiver<bool>) {
        let mut backoff_secs: u64 = 1;
        self.diagnostics.set_running(true);
        log::debug!("socket: task started");

        loop {
            if stop_requested(&stop_rx) {
                break;
            }

            self.diagnostics.set_state(ConnectionState::Connecting);
            let connections_before = self.diagnostics.connections();
            let result = self.stream_once(&mut stop_rx).await;
            if stop_requested(&stop_rx) {
                break;
            }
            if self.diagnostics.connections() > connections_before {
                backoff_secs = 1;
            }

            let error = match result {
                Ok(()) => "Stream session ended".to_string(),
                Err(error) => error,
            };
            log::warn!("socket: {error}; reconnecting in {backoff_secs}s");
            self.diagnostics.record_failure(&error, backoff_secs);

            let jitter_ms = std::time::SystemTime::now()
                .duration_since(std::time::UNIX_EPOCH)
                .map(|d| (d.subsec_millis() % 500) as u64)
                .unwrap_or(0);
            let delay = Duration::from_secs(backoff_secs) + Duration::from_millis(jitter_ms);
            tokio::select! {
                _ = tokio::time::sleep(delay) => {}
                _ = stop_rx.changed() => {}
            }
            backoff_secs = std::cmp::min(backoff_secs.saturating_mul(2), STREAM_MAX_BACKOFF_SECS);
        }

        self.diagnostics.set_running(false);
        self.diagnostics.set_state(ConnectionState::Disconnected);
        log::debug!("socket: task stopped");
    }

    async fn stream_once(&self, stop_rx: &mut watch::Receiver<bool>) -> Result<(), String> {
        log::debug!("socket: connecting to {}", redact_url(&self.ws_url));
        let (mut ws_stream, _) = tokio::select! {
            connected = tokio::time::timeout(
                Duration::from_secs(STREAM_CONNECT_TIMEOUT_SECS),
                connect_async(self.ws_url.as_str()),
            ) => connected
                .map_err(|_| {
                    format!("Stream connection timed out after {STREAM_CONNECT_TIMEOUT_SECS} seconds")
                })?
                .map_err(|error| format!("Stream connection failed: {error}"))?,
            _ = stop_rx.changed() => return Ok(()),
        };

        let now = unix_now_secs();
        self.diagnostics.mark_connected(now);
        log::info!("socket: connected");
        // A change may have been missed while disconnected.
        self.signal();

        let mut liveness_interval =
            tokio::time::interval(Duration::from_secs(STREAM_LIVENESS_CHECK_INTERVAL_SECS));
        liveness_interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
        liveness_interval.tick().await;
        let mut last_activity_at = now;
        let mut pending_ping_since: Option<u64> = None;

        loop {
            tokio::select! {
                changed = stop_rx.changed() => {
                    if changed.is_err() || *stop_rx.borrow() {
                        let _ = ws_stream.close(None).await;
                        return Ok(());
                    }
                }
                incoming = ws_stream.next() => {
                    let event_now = unix_now_secs();
                    match incoming {
                        Some(Ok(Message::Text(text))) => {
                            last_activity_at = event_now;
                            pending_ping_since = None;
                            log::debug!("socket: signal frame {}", truncate_message(text.as_str(), 40));
                            self.diagnostics.mark_signal(event_now);
                            self.signal();
                        }
                        Some(Ok(Message::Binary(payload))) => {
                            last_activity_at = event_now;
                            pending_ping_since = None;
                            log::debug!("socket: binary signal frame bytes={}", payload.len());
                            self.diagnostics.mark_signal(event_now);
                            self.signal();
                        }
                        Some(Ok(Message::Ping(payload))) => {
                            last_activity_at = event_now;
                            pending_ping_since = None;
                            self.diagnostics.mark_activity(event_now);
                            ws_stream.send(Message::Pong(payload)).await
                                .map_err(|error| format!("Failed to send pong: {error}"))?;
                        }
                        Some(Ok(Message::Close(_))) => {
                            return Err("Stream closed by server".to_string());
                        }
                        Some(Ok(_)) => {
                            last_activity_at = event_now;
                            pending_ping_since = None;
                            self.diagnostics.mark_activity(event_now);
                        }
                        Some(Err(error)) => return Err(format!("Stream read error: {error}")),
                        None => return Err("Stream ended unexpectedly".to_string()),
                    }
                }
                _ = liveness_interval.tick() => {
                    let event_now = unix_now_secs();
                    if event_now.saturating_sub(last_activity_at) < STREAM_LIVENESS_IDLE_SECS {
                        continue;
                    }
                    match pending_ping_since {
                        None => {
                            log::debug!("socket: liveness ping sent");
                            ws_stream
                                .send(Message::Ping(Vec::<u8>::new().into()))
                                .await
                                .map_err(|error| format!("Failed to send liveness ping: {error}"))?;
                            pending_ping_since = Some(event_now);
                        }
                        Some(started) => {
                            if event_now.saturating_sub(started) >= STREAM_LIVENESS_PING_GRACE_SECS {
                                return Err(format!(
                                    "Stream liveness timeout after {}s idle",
                                    event_now.saturating_sub(last_activity_at)
                                ));
                            }
                        }
                    }
                }
            }
        }
    }

    fn signal(&self) {
        match self.signals.try_send(()) {
            Ok(()) | Err(mpsc::error::TrySendError::Full(())) => {}
            Err(mpsc::error::TrySendError::Closed(())) => {
                log::debug!("socket: refresh receiver dropped");
            }
        }
    }
}

/// A dropped stop sender counts as a stop request.
fn stop_requested(stop_rx: &watch::Receiver<bool>) -> bool {
    *stop_rx.borrow() || stop_rx.has_changed().is_err()
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::net::TcpListener;

    #[test]
    fn ws_url_follows_server_scheme() {
        assert_eq!(
            build_events_ws_url("http://cam.local:8080").unwrap(),
            "ws://cam.local:8080/eventsws"
        );
        assert_eq!(
            build_events_ws_url("https://home.example/cam/").unwrap(),
            "wss://home.example/cam/eventsws"
        );
        assert!(build_events_ws_url("ftp://cam.local").is_err());
        assert!(build_events_ws_url("not a url").is_err());
    }

    /// Accepts `sessions` connections; each sends one signal frame, the last
    /// stays open until the client leaves.
    async fn serve(listener: TcpListener, sessions: usize) {
        for session in 1..=sessions {
            let (tcp, _) = listener.accept().await.unwrap();
            let mut ws = tokio_tungstenite::accept_async(tcp).await.unwrap();
            ws.send(Message::Text("update".into())).await.unwrap();
            if session < sessions {
                let _ = ws.close(None).await;
                continue;
            }
            while let Some(Ok(_)) = ws.next().await {}
        }
    }

    async fn next_signal(rx: &mut mpsc::Receiver<()>) {
        tokio::time::timeout(Duration::from_secs(5), rx.recv())
            .await
            .expect("no refresh signal")
            .expect("signal channel closed");
    }

    #[tokio::test]
    async fn frames_become_refresh_signals() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let server = tokio::spawn(serve(listener, 1));

        let diagnostics = Arc::new(SocketDiagnostics::default());
        let (signal_tx, mut signal_rx) = mpsc::channel(1);
        let (stop_tx, stop_rx) = watch::channel(false);
        let socket =
            EventsSocket::new(&format!("http://{addr}"), signal_tx, diagnostics.clone()).unwrap();
        let task = tokio::spawn(socket.run(stop_rx));

        // The first signal is sent on connect; the frame may coalesce with it.
        next_signal(&mut signal_rx).await;
        tokio::time::timeout(Duration::from_secs(5), async {
            while diagnostics.snapshot().signals_received == 0 {
                tokio::time::sleep(Duration::from_millis(10)).await;
            }
        })
        .await
        .expect("signal frame not seen");
        assert_eq!(
            diagnostics.snapshot().connection_state,
            ConnectionState::Connected
        );

        stop_tx.send(true).unwrap();
        task.await.unwrap();
        server.await.unwrap();
        let snapshot = diagnostics.snapshot();
        assert_eq!(snapshot.connection_state, ConnectionState::Disconnected);
        assert!(!snapshot.should_run);
        assert_eq!(snapshot.signals_received, 1);
    }

    #[tokio::test]
    async fn reconnects_after_server_close() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let server = tokio::spawn(serve(listener, 2));

        let diagnostics = Arc::new(SocketDiagnostics::default());
        let (signal_tx, mut signal_rx) = mpsc::channel(1);
        let (stop_tx, stop_rx) = watch::channel(false);
        let socket =
            EventsSocket::new(&format!("http://{addr}"), signal_tx, diagnostics.clone()).unwrap();
        let task = tokio::spawn(socket.run(stop_rx));

        tokio::time::timeout(Duration::from_secs(10), async {
            while diagnostics.connections() < 2 {
                next_signal(&mut signal_rx).await;
            }
        })
        .await
        .expect("socket did not reconnect");

        stop_tx.send(true).unwrap();
        task.await.unwrap();
        server.await.unwrap();
        assert!(diagnostics.snapshot().reconnect_attempts >= 1);
    }

    #[tokio::test]
    async fn stop_interrupts_backoff() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let diagnostics = Arc::new(SocketDiagnostics::default());
        let (signal_tx, _signal_rx) = mpsc::channel(1);
        let (stop_tx, stop_rx) = watch::channel(false);
        let socket =
            EventsSocket::new(&format!("http://{addr}"), signal_tx, diagnostics.clone()).unwrap();
        let task = tokio::spawn(socket.run(stop_rx));

        tokio::time::timeout(Duration::from_secs(5), async {
            while diagnostics.snapshot().reconnect_attempts == 0 {
                tokio::time::sleep(Duration::from_millis(20)).await;
            }
        })
        .await
        .unwrap();
        stop_tx.send(true).unwrap();
        tokio::time::timeout(Duration::from_secs(2), task)
            .await
            .expect("socket ignored stop during backoff")
            .unwrap();
        assert_eq!(
            diagnostics.snapshot().connection_state,
            ConnectionState::Disconnected
        );
    }
}
