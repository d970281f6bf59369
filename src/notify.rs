use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tracing::warn;
use uuid::Uuid;

use crate::connection::ConnectionStatus;

/// Classification of a user-visible notification
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum NotificationKind {
    Connection,
    Conflict,
    SyncError,
    Info,
}

/// Action a consumer can attach UI to
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum NotificationAction {
    ResolveConflict { conflict_id: Uuid },
}

/// A user-visible notification. Non-sticky notifications may auto-expire
/// in the presentation layer; sticky ones persist until dismissed.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Notification {
    pub id: Uuid,
    pub kind: NotificationKind,
    pub message: String,
    pub sticky: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub action: Option<NotificationAction>,
    pub created_at: DateTime<Utc>,
}

/// Sending half of the notification channel, cloned into every component
/// that reports to the presentation layer.
#[derive(Clone)]
pub struct Notifier {
    tx: mpsc::UnboundedSender<Notification>,
}

impl Notifier {
    pub fn channel() -> (Notifier, mpsc::UnboundedReceiver<Notification>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Notifier { tx }, rx)
    }

    pub fn notify(&self, kind: NotificationKind, message: impl Into<String>, sticky: bool, action: Option<NotificationAction>) {
        let notification = Notification {
            id: Uuid::new_v4(),
            kind,
            message: message.into(),
            sticky,
            action,
            created_at: Utc::now(),
        };
        // A closed receiver means the consumer is gone; nothing to render to.
        if self.tx.send(notification).is_err() {
            warn!("Notification receiver dropped, discarding notification");
        }
    }

    pub fn connection_status(&self, status: ConnectionStatus) {
        self.notify(
            NotificationKind::Connection,
            format!("Connection status: {}", status),
            false,
            None,
        );
    }

    pub fn conflict(&self, conflict_id: Uuid) {
        self.notify(
            NotificationKind::Conflict,
            format!("Conflicting edits detected ({})", conflict_id),
            true,
            Some(NotificationAction::ResolveConflict { conflict_id }),
        );
    }

    pub fn sync_error(&self, message: impl Into<String>) {
        self.notify(NotificationKind::SyncError, message, true, None);
    }

    pub fn info(&self, message: impl Into<String>) {
        self.notify(NotificationKind::Info, message, false, None);
    }
}
