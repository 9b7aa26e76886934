use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

use crate::credentials::{AccessToken, CredentialManager};
use crate::mapper::ContentMapper;
use crate::types::{AggregatorError, Content, Platform, Result, SourceId, TimeRange};

/// Last observed liveness of a source.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Availability {
    Unchecked,
    Available,
    Unavailable,
}

/// One configured account/feed on one external platform.
///
/// Fetches are best-effort: fewer items than requested is not an error, but
/// `count == 0` is, and transport/API trouble surfaces as
/// [`AggregatorError::SourceUnavailable`] so the aggregator can treat it as a
/// partial failure rather than letting it escape the query.
#[async_trait]
pub trait ContentSource: std::fmt::Debug + Send + Sync {
    fn id(&self) -> &SourceId;

    fn platform(&self) -> &Platform;

    /// Last observed state, without probing.
    async fn availability(&self) -> Availability;

    /// Probes liveness/credentials and transitions the availability state.
    /// Safe to call repeatedly; never touches an in-flight fetch.
    async fn check_availability(&self) -> Availability;

    /// At most `count` items, most-recent-first.
    async fn latest(&self, count: usize) -> Result<Vec<Content>>;

    /// As [`ContentSource::latest`], additionally filtered to the inclusive
    /// time range.
    async fn latest_between(&self, count: usize, range: TimeRange) -> Result<Vec<Content>>;
}

/// The narrow wire contract a platform client implements: a liveness probe
/// plus a bounded fetch of raw, platform-native records. HTTP details stay on
/// the client side of this trait.
#[async_trait]
pub trait RawContentClient: Send + Sync {
    type Raw: Send;

    async fn ping(&self, token: Option<&AccessToken>) -> Result<()>;

    async fn fetch_latest(
        &self,
        token: Option<&AccessToken>,
        limit: usize,
    ) -> Result<Vec<Self::Raw>>;
}

/// Generic [`ContentSource`] over a platform client and its mapper.
/// Credentials are optional; sources on public APIs skip the token step.
pub struct ApiSource<C, M>
where
    C: RawContentClient,
    M: ContentMapper<Raw = C::Raw>,
{
    id: SourceId,
    platform: Platform,
    client: C,
    mapper: M,
    credentials: Option<Arc<CredentialManager>>,
    availability: RwLock<Availability>,
}

impl<C, M> std::fmt::Debug for ApiSource<C, M>
where
    C: RawContentClient,
    M: ContentMapper<Raw = C::Raw>,
{
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ApiSource")
            .field("id", &self.id)
            .field("platform", &self.platform)
            .finish_non_exhaustive()
    }
}

impl<C, M> ApiSource<C, M>
where
    C: RawContentClient,
    M: ContentMapper<Raw = C::Raw>,
{
    pub fn new(
        id: SourceId,
        platform: Platform,
        client: C,
        mapper: M,
        credentials: Option<Arc<CredentialManager>>,
    ) -> Self {
        Self {
            id,
            platform,
            client,
            mapper,
            credentials,
            availability: RwLock::new(Availability::Unchecked),
        }
    }

    async fn fetch(&self, count: usize, range: Option<TimeRange>) -> Result<Vec<Content>> {
        if count == 0 {
            return Err(AggregatorError::IllegalCount { count });
        }

        let token = match &self.credentials {
            Some(credentials) => Some(credentials.valid_token(&self.id).await?),
            None => None,
        };

        // Request exactly `count` raw records; over-fetching wastes the
        // upstream quota.
        let raws = self
            .client
            .fetch_latest(token.as_ref(), count)
            .await
            .map_err(|e| isolate(&self.id, e))?;

        let batch = self.mapper.map_batch(raws);
        if !batch.skipped.is_empty() {
            warn!(
                source = %self.id,
                skipped = batch.skipped.len(),
                "dropped unmappable records from fetch"
            );
        }

        let mut items = batch.contents;
        if let Some(range) = range {
            items.retain(|c| range.contains(c.timestamp));
        }
        items.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));
        items.truncate(count);

        debug!(source = %self.id, items = items.len(), "fetched content");
        Ok(items)
    }
}

#[async_trait]
impl<C, M> ContentSource for ApiSource<C, M>
where
    C: RawContentClient,
    M: ContentMapper<Raw = C::Raw>,
{
    fn id(&self) -> &SourceId {
        &self.id
    }

    fn platform(&self) -> &Platform {
        &self.platform
    }

    async fn availability(&self) -> Availability {
        *self.availability.read().await
    }

    async fn check_availability(&self) -> Availability {
        let probe = match &self.credentials {
            Some(credentials) => match credentials.valid_token(&self.id).await {
                Ok(token) => self.client.ping(Some(&token)).await,
                Err(e) => Err(e),
            },
            None => self.client.ping(None).await,
        };

        let next = match probe {
            Ok(()) => Availability::Available,
            Err(e) => {
                warn!(source = %self.id, error = %e, "availability check failed");
                Availability::Unavailable
            }
        };

        let mut state = self.availability.write().await;
        if *state != next {
            info!(source = %self.id, state = ?next, "availability changed");
        }
        *state = next;
        next
    }

    async fn latest(&self, count: usize) -> Result<Vec<Content>> {
        self.fetch(count, None).await
    }

    async fn latest_between(&self, count: usize, range: TimeRange) -> Result<Vec<Content>> {
        self.fetch(count, Some(range)).await
    }
}

/// Keeps caller errors and auth errors intact, folds everything else into a
/// per-source `SourceUnavailable` so one bad upstream never escapes the
/// aggregation boundary as an internal error.
fn isolate(source: &SourceId, e: AggregatorError) -> AggregatorError {
    match e {
        e @ (AggregatorError::IllegalCount { .. }
        | AggregatorError::InvalidTimeRange { .. }
        | AggregatorError::Auth { .. }
        | AggregatorError::SourceUnavailable { .. }) => e,
        other => AggregatorError::SourceUnavailable {
            source: source.clone(),
            reason: other.to_string(),
        },
    }
}
