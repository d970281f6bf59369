//! Client-side synchronization engine for real-time collaborative
//! sessions: session/participant bookkeeping, the event log and
//! acknowledgement protocol, pairwise operational transforms, conflict
//! detection, presence propagation, and connection management with
//! heartbeat and exponential-backoff reconnection.
//!
//! Construct one [`SyncClient`] per process, give it a transport and an
//! identity, then create or join a session and drive it with [`SyncClient::run`].

pub mod client;
pub mod clock;
pub mod config;
pub mod connection;
pub mod engine;
pub mod error;
pub mod models;
pub mod notify;
pub mod profile;
pub mod transport;

pub use client::SyncClient;
pub use config::SyncConfig;
pub use connection::{ConnectionManager, ConnectionStatus};
pub use engine::SyncEngine;
pub use error::SyncError;
pub use notify::{Notification, NotificationAction, NotificationKind, Notifier};
pub use profile::{FileProfileStore, ProfileStore, StoredProfile};
pub use transport::{Transport, TransportSink, TransportStream, WebSocketTransport};
