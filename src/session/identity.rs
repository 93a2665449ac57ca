//! # Persistent Session Identity
//!
//! A stable per-installation user identifier and display name. The id
//! is generated once on first use, persisted in a JSON file under the
//! platform data directory, and never regenerated for the lifetime of
//! that store. A server-known display name may override the stored one;
//! the user id never changes once established.

use crate::error::AppError;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::debug;
use uuid::Uuid;

/// The persisted identity: stable id plus display name.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserIdentity {
    pub user_id: String,
    pub display_name: String,
}

impl UserIdentity {
    /// Generate a fresh guest identity.
    fn generate() -> Self {
        let id_suffix = Uuid::new_v4().simple().to_string();
        let name_suffix = Uuid::new_v4().simple().to_string();
        Self {
            user_id: format!("guest_{}", &id_suffix[..8]),
            display_name: format!("Guest {}", &name_suffix[..4]),
        }
    }
}

/// File-backed identity store.
pub struct IdentityStore {
    path: PathBuf,
}

impl IdentityStore {
    /// Store at the default platform location
    /// (`<data dir>/duet-karaoke/identity.json`).
    pub fn open_default() -> Result<Self, AppError> {
        let base = dirs::data_dir()
            .ok_or_else(|| AppError::Config("no platform data directory available".to_string()))?;
        Ok(Self::at(base.join("duet-karaoke").join("identity.json")))
    }

    pub fn at(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Load the stored identity, or create and persist a new one.
    ///
    /// Once an identity exists it is never regenerated; a corrupt store
    /// file is the one exception (it is replaced, since the old id is
    /// unrecoverable anyway).
    pub fn load_or_create(&self) -> Result<UserIdentity, AppError> {
        if let Some(existing) = self.load()? {
            return Ok(existing);
        }

        let identity = UserIdentity::generate();
        debug!(user_id = %identity.user_id, "created new session identity");
        self.save(&identity)?;
        Ok(identity)
    }

    /// Override the display name, keeping the established user id.
    pub fn set_display_name(&self, name: &str) -> Result<UserIdentity, AppError> {
        let mut identity = self.load_or_create()?;
        identity.display_name = name.to_string();
        self.save(&identity)?;
        Ok(identity)
    }

    fn load(&self) -> Result<Option<UserIdentity>, AppError> {
        if !self.path.exists() {
            return Ok(None);
        }

        let contents = fs::read_to_string(&self.path)
            .map_err(|err| AppError::Internal(format!("identity store read failed: {}", err)))?;

        match serde_json::from_str(&contents) {
            Ok(identity) => Ok(Some(identity)),
            Err(err) => {
                debug!(error = %err, "identity store corrupt, regenerating");
                Ok(None)
            }
        }
    }

    fn save(&self, identity: &UserIdentity) -> Result<(), AppError> {
        if let Some(parent) = self.path.parent() {
            ensure_dir(parent)?;
        }

        let json = serde_json::to_string_pretty(identity)?;
        fs::write(&self.path, json)
            .map_err(|err| AppError::Internal(format!("identity store write failed: {}", err)))
    }
}

fn ensure_dir(path: &Path) -> Result<(), AppError> {
    fs::create_dir_all(path)
        .map_err(|err| AppError::Internal(format!("identity store dir failed: {}", err)))
}
