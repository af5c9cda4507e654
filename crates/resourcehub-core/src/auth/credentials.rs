//! The credential store: access token, refresh token and user profile kept
//! together in either the durable or the ephemeral storage area.

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use super::storage::{MemoryArea, StorageArea, StorageError};
use crate::models::UserProfile;

pub const ACCESS_TOKEN_KEY: &str = "accessToken";
pub const REFRESH_TOKEN_KEY: &str = "refreshToken";
pub const USER_KEY: &str = "user";

const ALL_KEYS: [&str; 3] = [ACCESS_TOKEN_KEY, REFRESH_TOKEN_KEY, USER_KEY];

/// Which storage area holds the credentials.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum StorageKind {
    /// Survives restarts until cleared ("remember me")
    Durable,
    /// Gone when the session ends
    Ephemeral,
}

impl StorageKind {
    pub fn from_remember(remember: bool) -> Self {
        if remember {
            StorageKind::Durable
        } else {
            StorageKind::Ephemeral
        }
    }

    pub fn other(self) -> Self {
        match self {
            StorageKind::Durable => StorageKind::Ephemeral,
            StorageKind::Ephemeral => StorageKind::Durable,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Credentials {
    pub access_token: String,
    pub refresh_token: Option<String>,
    pub user: UserProfile,
}

/// Credentials along with the area they were found in.
#[derive(Debug, Clone, PartialEq)]
pub struct StoredCredentials {
    pub credentials: Credentials,
    pub kind: StorageKind,
}

/// Access token, refresh token and user profile kept in exactly one of two
/// storage areas.
pub struct CredentialStore {
    durable: Box<dyn StorageArea>,
    ephemeral: Box<dyn StorageArea>,
}

impl CredentialStore {
    pub fn new(durable: impl StorageArea + 'static, ephemeral: impl StorageArea + 'static) -> Self {
        Self {
            durable: Box::new(durable),
            ephemeral: Box::new(ephemeral),
        }
    }

    /// Both areas in memory; nothing outlives the process.
    pub fn in_memory() -> Self {
        Self::new(MemoryArea::new(), MemoryArea::new())
    }

    fn area(&self, kind: StorageKind) -> &dyn StorageArea {
        match kind {
            StorageKind::Durable => self.durable.as_ref(),
            StorageKind::Ephemeral => self.ephemeral.as_ref(),
        }
    }

    /// Durable area first, then ephemeral.
    fn lookup(&self, key: &str) -> Option<(String, StorageKind)> {
        [StorageKind::Durable, StorageKind::Ephemeral]
            .into_iter()
            .find_map(|kind| {
                self.area(kind)
                    .get(key)
                    .filter(|v| !v.is_empty())
                    .map(|v| (v, kind))
            })
    }

    fn read_from(&self, kind: StorageKind) -> Option<Credentials> {
        let area = self.area(kind);
        let access_token = area.get(ACCESS_TOKEN_KEY).filter(|t| !t.is_empty())?;
        let raw_user = area.get(USER_KEY).filter(|u| !u.is_empty())?;

        let user = match serde_json::from_str::<UserProfile>(&raw_user) {
            Ok(user) => user,
            Err(e) => {
                warn!(error = %e, ?kind, "Stored user profile is not valid JSON");
                return None;
            }
        };

        Some(Credentials {
            access_token,
            refresh_token: area.get(REFRESH_TOKEN_KEY).filter(|t| !t.is_empty()),
            user,
        })
    }

    /// Return the stored credentials if either area has both an access token
    /// and a user record.
    pub fn read(&self) -> Option<StoredCredentials> {
        [StorageKind::Durable, StorageKind::Ephemeral]
            .into_iter()
            .find_map(|kind| {
                self.read_from(kind)
                    .map(|credentials| StoredCredentials { credentials, kind })
            })
    }

    /// Write all three entries into `kind`'s area after emptying the other
    /// area, so only one area ever holds credentials.
    ///
    /// Failing to empty the other area is logged, not returned: an unreachable
    /// keychain must not stop credentials landing in the area being written.
    pub fn write(&self, credentials: &Credentials, kind: StorageKind) -> Result<(), StorageError> {
        if let Err(e) = Self::clear_area(self.area(kind.other())) {
            warn!(error = %e, kind = ?kind.other(), "Failed to clear stale credentials");
        }

        let area = self.area(kind);
        let user = serde_json::to_string(&credentials.user)?;
        area.set(ACCESS_TOKEN_KEY, &credentials.access_token)?;
        match credentials.refresh_token {
            Some(ref token) => area.set(REFRESH_TOKEN_KEY, token)?,
            None => area.remove(REFRESH_TOKEN_KEY)?,
        }
        area.set(USER_KEY, &user)?;

        debug!(?kind, "Credentials written");
        Ok(())
    }

    fn clear_area(area: &dyn StorageArea) -> Result<(), StorageError> {
        let mut first_err = None;
        for key in ALL_KEYS {
            if let Err(e) = area.remove(key) {
                first_err.get_or_insert(e);
            }
        }
        first_err.map_or(Ok(()), Err)
    }

    /// Remove every credential key from both areas. Both areas are attempted
    /// even if the first fails.
    pub fn clear(&self) -> Result<(), StorageError> {
        let durable = Self::clear_area(self.durable.as_ref());
        let ephemeral = Self::clear_area(self.ephemeral.as_ref());
        durable.and(ephemeral)
    }

    /// Replace the access token in whichever area holds the refresh token.
    /// Returns false (and changes nothing) when no refresh token is stored.
    pub fn update_access_token(&self, token: &str) -> Result<bool, StorageError> {
        match self.lookup(REFRESH_TOKEN_KEY) {
            Some((_, kind)) => {
                self.area(kind).set(ACCESS_TOKEN_KEY, token)?;
                debug!(?kind, "Access token updated");
                Ok(true)
            }
            None => Ok(false),
        }
    }

    pub fn access_token(&self) -> Option<String> {
        self.lookup(ACCESS_TOKEN_KEY).map(|(token, _)| token)
    }

    pub fn refresh_token(&self) -> Option<String> {
        self.lookup(REFRESH_TOKEN_KEY).map(|(token, _)| token)
    }
}
