use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::{Mutex, RwLock};
use tracing::{debug, info, warn};

use crate::types::{AggregatorError, AuthErrorKind, Result, SourceId};

/// Bearer token for one source. Debug/display output is redacted so tokens
/// never land in logs.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AccessToken(String);

impl AccessToken {
    pub fn new(token: impl Into<String>) -> Self {
        Self(token.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Debug for AccessToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("AccessToken(***)")
    }
}

/// One source's token and its lifecycle timestamps. Created on a successful
/// auth exchange, read before every fetch.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TokenEntry {
    pub source_id: SourceId,
    pub token: AccessToken,
    pub issued_at: DateTime<Utc>,
    pub expires_at: Option<DateTime<Utc>>,
}

impl TokenEntry {
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        match self.expires_at {
            Some(expires_at) => now > expires_at,
            None => false,
        }
    }
}

/// Exchanges expired credentials for fresh ones. The network side of the
/// refresh lives with the platform clients; the manager only drives it.
#[async_trait]
pub trait TokenRefresher: Send + Sync {
    async fn refresh(&self, source_id: &SourceId) -> Result<TokenEntry>;
}

/// Tracks access-token lifecycle per source.
///
/// An expired entry is never silently used: `valid_token` refreshes it with
/// exactly one attempt, and the refresh error is terminal for that fetch
/// (no second attempt within the same call). Refreshes are
/// serialized per source id; concurrent callers for the same expired token
/// queue on the slot lock and find the fresh token instead of issuing
/// duplicate refreshes.
pub struct CredentialManager {
    refresher: Arc<dyn TokenRefresher>,
    slots: RwLock<HashMap<SourceId, Arc<Mutex<Option<TokenEntry>>>>>,
}

impl CredentialManager {
    pub fn new(refresher: Arc<dyn TokenRefresher>) -> Self {
        Self {
            refresher,
            slots: RwLock::new(HashMap::new()),
        }
    }

    /// Records the entry from a successful auth exchange.
    pub async fn store(&self, entry: TokenEntry) {
        let slot = self.slot(&entry.source_id).await;
        let mut guard = slot.lock().await;
        info!(source = %entry.source_id, "stored credential");
        *guard = Some(entry);
    }

    /// Returns a non-expired token for the source, refreshing once if the
    /// stored entry has expired.
    pub async fn valid_token(&self, source_id: &SourceId) -> Result<AccessToken> {
        let slot = self.slot(source_id).await;
        let mut guard = slot.lock().await;

        match guard.as_ref() {
            None => {
                return Err(AggregatorError::Auth {
                    source: source_id.clone(),
                    kind: AuthErrorKind::MissingToken,
                })
            }
            Some(entry) if !entry.is_expired(Utc::now()) => return Ok(entry.token.clone()),
            Some(_) => {}
        }

        debug!(source = %source_id, "token expired, refreshing");
        match self.refresher.refresh(source_id).await {
            Ok(fresh) => {
                let token = fresh.token.clone();
                *guard = Some(fresh);
                info!(source = %source_id, "token refreshed");
                Ok(token)
            }
            Err(e) => {
                warn!(source = %source_id, error = %e, "token refresh failed");
                Err(AggregatorError::Auth {
                    source: source_id.clone(),
                    kind: AuthErrorKind::RefreshFailed,
                })
            }
        }
    }

    async fn slot(&self, source_id: &SourceId) -> Arc<Mutex<Option<TokenEntry>>> {
        {
            let slots = self.slots.read().await;
            if let Some(slot) = slots.get(source_id) {
                return slot.clone();
            }
        }
        let mut slots = self.slots.write().await;
        slots
            .entry(source_id.clone())
            .or_insert_with(|| Arc::new(Mutex::new(None)))
            .clone()
    }
}
