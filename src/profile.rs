use std::path::PathBuf;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::error::SyncError;
use crate::models::{Participant, SessionSettings};

/// Identity and preferences restored across restarts. The engine reads
/// this once at startup and writes it only when settings change.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct StoredProfile {
    pub user: Participant,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_session_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub preferred_settings: Option<SessionSettings>,
}

/// Persistence boundary for the stored profile.
#[async_trait]
pub trait ProfileStore: Send + Sync {
    async fn load(&self) -> Result<Option<StoredProfile>, SyncError>;
    async fn save(&self, profile: &StoredProfile) -> Result<(), SyncError>;
}

/// JSON-file profile store
pub struct FileProfileStore {
    path: PathBuf,
}

impl FileProfileStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

#[async_trait]
impl ProfileStore for FileProfileStore {
    async fn load(&self) -> Result<Option<StoredProfile>, SyncError> {
        let bytes = match tokio::fs::read(&self.path).await {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                info!("No stored profile at {}", self.path.display());
                return Ok(None);
            }
            Err(e) => return Err(SyncError::Storage(format!("failed to read {}: {}", self.path.display(), e))),
        };
        match serde_json::from_slice::<StoredProfile>(&bytes) {
            Ok(profile) => Ok(Some(profile)),
            Err(e) => {
                // A corrupt profile should not keep the client from starting.
                warn!("Ignoring unreadable profile {}: {}", self.path.display(), e);
                Ok(None)
            }
        }
    }

    async fn save(&self, profile: &StoredProfile) -> Result<(), SyncError> {
        let json = serde_json::to_vec_pretty(profile)
            .map_err(|e| SyncError::Storage(format!("failed to serialize profile: {}", e)))?;
        if let Some(parent) = self.path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| SyncError::Storage(format!("failed to create {}: {}", parent.display(), e)))?;
        }
        tokio::fs::write(&self.path, json)
            .await
            .map_err(|e| SyncError::Storage(format!("failed to write {}: {}", self.path.display(), e)))?;
        info!("Profile saved to {}", self.path.display());
        Ok(())
    }
}
