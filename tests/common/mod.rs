use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use tokio::sync::mpsc;

use colab_sync::error::SyncError;
use colab_sync::models::WireMessage;
use colab_sync::transport::{Transport, TransportSink, TransportStream};

/// Install a test subscriber so failures come with engine logs.
#[allow(dead_code)]
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "colab_sync=debug".into()),
        )
        .with_test_writer()
        .try_init();
}

/// Scripted in-memory transport. Each `open` consumes one scripted
/// outcome; sent frames are captured for assertions, and tests can feed
/// inbound frames or drop the feeder to simulate the peer closing.
#[derive(Clone, Default)]
pub struct MockTransport {
    pub state: Arc<Mutex<MockState>>,
}

#[derive(Default)]
pub struct MockState {
    /// Outcomes for successive open() calls; empty means succeed.
    pub open_outcomes: VecDeque<Result<(), String>>,
    pub open_count: usize,
    /// Every frame sent over any connection, in order.
    pub sent: Vec<WireMessage>,
    /// Feeder for the currently open connection's inbound stream.
    pub feeder: Option<mpsc::UnboundedSender<WireMessage>>,
    /// When set, the next send over the current sink fails.
    pub fail_next_send: bool,
}

impl MockTransport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn script_open_failure(&self, reason: &str) {
        self.state.lock().unwrap().open_outcomes.push_back(Err(reason.to_string()));
    }

    pub fn sent(&self) -> Vec<WireMessage> {
        self.state.lock().unwrap().sent.clone()
    }

    pub fn sent_kinds(&self) -> Vec<&'static str> {
        self.state.lock().unwrap().sent.iter().map(|m| m.kind()).collect()
    }

    pub fn open_count(&self) -> usize {
        self.state.lock().unwrap().open_count
    }

    pub fn feed(&self, msg: WireMessage) {
        let state = self.state.lock().unwrap();
        if let Some(feeder) = &state.feeder {
            let _ = feeder.send(msg);
        }
    }

    /// Simulate the peer closing the connection.
    pub fn close_peer(&self) {
        self.state.lock().unwrap().feeder = None;
    }
}

pub struct MockSink {
    state: Arc<Mutex<MockState>>,
}

pub struct MockStream {
    rx: mpsc::UnboundedReceiver<WireMessage>,
}

#[async_trait]
impl Transport for MockTransport {
    async fn open(&mut self, _endpoint: &str) -> Result<(Box<dyn TransportSink>, Box<dyn TransportStream>), SyncError> {
        let mut state = self.state.lock().unwrap();
        state.open_count += 1;
        if let Some(Err(reason)) = state.open_outcomes.pop_front() {
            return Err(SyncError::Transport(reason));
        }
        let (tx, rx) = mpsc::unbounded_channel();
        state.feeder = Some(tx);
        Ok((
            Box::new(MockSink { state: self.state.clone() }),
            Box::new(MockStream { rx }),
        ))
    }
}

#[async_trait]
impl TransportSink for MockSink {
    async fn send(&mut self, msg: WireMessage) -> Result<(), SyncError> {
        let mut state = self.state.lock().unwrap();
        if state.fail_next_send {
            state.fail_next_send = false;
            return Err(SyncError::Transport("scripted send failure".to_string()));
        }
        state.sent.push(msg);
        Ok(())
    }

    async fn close(&mut self) {
        self.state.lock().unwrap().feeder = None;
    }
}

#[async_trait]
impl TransportStream for MockStream {
    async fn next_message(&mut self) -> Option<Result<WireMessage, SyncError>> {
        self.rx.recv().await.map(Ok)
    }
}
