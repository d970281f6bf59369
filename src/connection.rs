use std::collections::VecDeque;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::config::SyncConfig;
use crate::error::SyncError;
use crate::models::WireMessage;
use crate::notify::Notifier;
use crate::transport::{Transport, TransportSink, TransportStream};

/// Connection lifecycle states
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ConnectionStatus {
    Disconnected,
    Connecting,
    Connected,
    Reconnecting,
    Error,
}

impl fmt::Display for ConnectionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ConnectionStatus::Disconnected => "disconnected",
            ConnectionStatus::Connecting => "connecting",
            ConnectionStatus::Connected => "connected",
            ConnectionStatus::Reconnecting => "reconnecting",
            ConnectionStatus::Error => "error",
        };
        f.write_str(s)
    }
}

type SharedSink = Arc<Mutex<Box<dyn TransportSink>>>;

/// Owns the transport lifecycle: connect/disconnect/reconnect with
/// exponential backoff, the heartbeat tick, and the offline outbox.
///
/// Emits exactly one connection-status notification per state transition.
/// Frames sent while not connected are queued, never dropped.
pub struct ConnectionManager {
    transport: Box<dyn Transport>,
    sink: Option<SharedSink>,
    status: ConnectionStatus,
    attempts: u32,
    endpoint: Option<String>,
    outbox: VecDeque<WireMessage>,
    heartbeat: Option<JoinHandle<()>>,
    notifier: Notifier,
    config: SyncConfig,
}

impl ConnectionManager {
    pub fn new(transport: Box<dyn Transport>, config: SyncConfig, notifier: Notifier) -> Self {
        Self {
            transport,
            sink: None,
            status: ConnectionStatus::Disconnected,
            attempts: 0,
            endpoint: None,
            outbox: VecDeque::new(),
            heartbeat: None,
            notifier,
            config,
        }
    }

    pub fn status(&self) -> ConnectionStatus {
        self.status
    }

    pub fn is_connected(&self) -> bool {
        self.status == ConnectionStatus::Connected
    }

    pub fn attempts(&self) -> u32 {
        self.attempts
    }

    pub fn queued_len(&self) -> usize {
        self.outbox.len()
    }

    /// Open the transport. A no-op when already connected. On success the
    /// attempt counter resets, queued frames are flushed in submission
    /// order, and the heartbeat starts; the caller receives the inbound
    /// stream to pump.
    pub async fn connect(&mut self, endpoint: &str) -> Result<Option<Box<dyn TransportStream>>, SyncError> {
        if self.status == ConnectionStatus::Connected {
            debug!("connect() while already connected is a no-op");
            return Ok(None);
        }
        self.endpoint = Some(endpoint.to_string());
        self.set_status(ConnectionStatus::Connecting);

        match self.transport.open(endpoint).await {
            Ok((sink, stream)) => {
                let sink: SharedSink = Arc::new(Mutex::new(sink));
                self.sink = Some(sink.clone());
                self.set_status(ConnectionStatus::Connected);
                self.attempts = 0;
                self.flush_outbox().await;
                self.start_heartbeat(sink);
                Ok(Some(stream))
            }
            Err(e) => {
                error!("Transport open failed: {}", e);
                self.set_status(ConnectionStatus::Error);
                Err(e)
            }
        }
    }

    /// Close the transport and stop the heartbeat. The heartbeat task is
    /// aborted before the state changes, so no probe fires after this.
    pub async fn disconnect(&mut self) {
        self.stop_heartbeat();
        if let Some(sink) = self.sink.take() {
            sink.lock().await.close().await;
        }
        self.set_status(ConnectionStatus::Disconnected);
    }

    /// Increment the attempt counter and retry the last-used endpoint.
    pub async fn reconnect(&mut self) -> Result<Option<Box<dyn TransportStream>>, SyncError> {
        let endpoint = self
            .endpoint
            .clone()
            .ok_or_else(|| SyncError::State("reconnect without a prior connect".to_string()))?;
        self.attempts += 1;
        info!("Reconnect attempt {} to {}", self.attempts, endpoint);
        self.connect(&endpoint).await
    }

    /// React to the transport closing underneath us.
    pub fn handle_transport_closed(&mut self) {
        self.stop_heartbeat();
        self.sink = None;
        self.set_status(ConnectionStatus::Disconnected);
    }

    /// Whether the reconnect policy allows another attempt.
    pub fn should_retry(&self) -> bool {
        self.config.auto_reconnect && self.attempts < self.config.max_reconnect_attempts
    }

    /// Delay before the next reconnect attempt: `2^attempts` seconds,
    /// capped by configuration.
    pub fn backoff_delay(&self) -> Duration {
        let exp = self.attempts.min(16);
        let secs = (1u64 << exp).min(self.config.max_backoff_secs);
        Duration::from_secs(secs)
    }

    /// Mark that a backoff wait is in progress.
    pub fn begin_reconnect_wait(&mut self) {
        self.set_status(ConnectionStatus::Reconnecting);
    }

    /// Deliver a frame, or queue it when not connected. Send failures are
    /// absorbed: the frame goes back into the outbox and the error surfaces
    /// as a status notification.
    pub async fn send(&mut self, msg: WireMessage) {
        if self.status == ConnectionStatus::Connected {
            if let Some(sink) = self.sink.clone() {
                if let Err(e) = sink.lock().await.send(msg.clone()).await {
                    error!("Send failed, queueing {} frame: {}", msg.kind(), e);
                    self.outbox.push_back(msg);
                    self.stop_heartbeat();
                    self.sink = None;
                    self.set_status(ConnectionStatus::Error);
                }
                return;
            }
        }
        debug!("Not connected, queueing {} frame", msg.kind());
        self.outbox.push_back(msg);
    }

    async fn flush_outbox(&mut self) {
        if self.outbox.is_empty() {
            return;
        }
        let Some(sink) = self.sink.clone() else { return };
        info!("Flushing {} queued frames", self.outbox.len());
        while let Some(msg) = self.outbox.pop_front() {
            if let Err(e) = sink.lock().await.send(msg.clone()).await {
                // Put it back at the front; the rest stays in order.
                error!("Flush interrupted: {}", e);
                self.outbox.push_front(msg);
                self.stop_heartbeat();
                self.sink = None;
                self.set_status(ConnectionStatus::Error);
                return;
            }
        }
    }

    fn start_heartbeat(&mut self, sink: SharedSink) {
        self.stop_heartbeat();
        let interval = Duration::from_millis(self.config.heartbeat_interval_ms);
        self.heartbeat = Some(tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            // The first tick completes immediately; skip it.
            ticker.tick().await;
            loop {
                ticker.tick().await;
                let probe = WireMessage::Heartbeat { timestamp: Utc::now().timestamp_millis() };
                if let Err(e) = sink.lock().await.send(probe).await {
                    warn!("Heartbeat send failed, stopping tick: {}", e);
                    break;
                }
            }
        }));
    }

    fn stop_heartbeat(&mut self) {
        if let Some(task) = self.heartbeat.take() {
            task.abort();
        }
    }

    fn set_status(&mut self, status: ConnectionStatus) {
        if self.status == status {
            return;
        }
        info!("Connection status {} -> {}", self.status, status);
        self.status = status;
        self.notifier.connection_status(status);
    }
}

impl Drop for ConnectionManager {
    fn drop(&mut self) {
        self.stop_heartbeat();
    }
}
