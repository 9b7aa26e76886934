use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::source::{Availability, ContentSource};
use crate::types::{AggregatorError, Content, Result, SourceId, TimeRange};

/// Knobs for the fan-out query path.
#[derive(Debug, Clone)]
pub struct QuerySettings {
    /// Per-source fetch deadline; an overrun counts as a transport failure.
    pub fetch_timeout: Duration,
    /// Upper bound on concurrent per-source fetches, to respect upstream
    /// rate limits. The effective pool never exceeds the source count.
    pub max_concurrent_fetches: usize,
}

impl Default for QuerySettings {
    fn default() -> Self {
        Self {
            fetch_timeout: Duration::from_secs(30),
            max_concurrent_fetches: 8,
        }
    }
}

/// One source's failure within an otherwise successful query.
#[derive(Debug)]
pub struct SourceFailure {
    pub source: SourceId,
    pub error: AggregatorError,
}

/// Merged feed plus per-source diagnostics for the sources that failed.
#[derive(Debug)]
pub struct QueryOutcome {
    pub items: Vec<Content>,
    pub failures: Vec<SourceFailure>,
}

/// Owns the registry of content sources for the process lifetime and
/// orchestrates concurrent fetches across them. The system's single public
/// entry point: the REST layer calls [`Aggregator::query`] and nothing else.
pub struct Aggregator {
    settings: QuerySettings,
    sources: HashMap<SourceId, Arc<dyn ContentSource>>,
}

impl Aggregator {
    pub fn new(settings: QuerySettings) -> Self {
        Self {
            settings,
            sources: HashMap::new(),
        }
    }

    /// Registers a source; duplicate ids fail.
    pub fn register(&mut self, source: Arc<dyn ContentSource>) -> Result<()> {
        let id = source.id().clone();
        if self.sources.contains_key(&id) {
            return Err(AggregatorError::DuplicateSource(id));
        }
        info!(source = %id, platform = %source.platform().display_name, "registered source");
        self.sources.insert(id, source);
        Ok(())
    }

    pub fn deregister(&mut self, id: &SourceId) -> Result<Arc<dyn ContentSource>> {
        let removed = self
            .sources
            .remove(id)
            .ok_or_else(|| AggregatorError::UnknownSource(id.clone()))?;
        info!(source = %id, "deregistered source");
        Ok(removed)
    }

    /// Administrative lookup; unknown ids map to the not-found class.
    pub fn source(&self, id: &SourceId) -> Result<Arc<dyn ContentSource>> {
        self.sources
            .get(id)
            .cloned()
            .ok_or_else(|| AggregatorError::UnknownSource(id.clone()))
    }

    pub fn source_ids(&self) -> Vec<SourceId> {
        let mut ids: Vec<SourceId> = self.sources.keys().cloned().collect();
        ids.sort();
        ids
    }

    pub fn len(&self) -> usize {
        self.sources.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sources.is_empty()
    }

    /// Fans out to every registered source requesting at most `count` items
    /// each, merges by timestamp descending, truncates to the global `count`.
    ///
    /// Arguments are validated before any source is contacted. Failed
    /// sources are excluded from the merge and reported in
    /// [`QueryOutcome::failures`]; only if every source fails does the call
    /// return [`AggregatorError::AllSourcesUnavailable`]. Dropping the
    /// returned future aborts the outstanding per-source fetches; partial
    /// results are discarded, never merged.
    pub async fn query(&self, count: usize, range: Option<TimeRange>) -> Result<QueryOutcome> {
        if count == 0 {
            return Err(AggregatorError::IllegalCount { count });
        }

        let query_id = Uuid::new_v4();
        let total = self.sources.len();
        if total == 0 {
            warn!(%query_id, "query against an empty source registry");
            return Ok(QueryOutcome {
                items: Vec::new(),
                failures: Vec::new(),
            });
        }

        info!(%query_id, count, sources = total, "starting aggregate query");

        let cap = self.settings.max_concurrent_fetches.clamp(1, total);
        let semaphore = Arc::new(Semaphore::new(cap));
        let mut tasks: JoinSet<(SourceId, Result<Vec<Content>>)> = JoinSet::new();

        for source in self.sources.values() {
            let source = source.clone();
            let semaphore = semaphore.clone();
            let fetch_timeout = self.settings.fetch_timeout;

            tasks.spawn(async move {
                let id = source.id().clone();

                let _permit = match semaphore.acquire_owned().await {
                    Ok(permit) => permit,
                    Err(_) => {
                        let err = AggregatorError::SourceUnavailable {
                            source: id.clone(),
                            reason: "query cancelled".to_string(),
                        };
                        return (id, Err(err));
                    }
                };

                if source.check_availability().await != Availability::Available {
                    let err = AggregatorError::SourceUnavailable {
                        source: id.clone(),
                        reason: "failed availability check".to_string(),
                    };
                    return (id, Err(err));
                }

                let fetch = async {
                    match range {
                        Some(range) => source.latest_between(count, range).await,
                        None => source.latest(count).await,
                    }
                };

                match tokio::time::timeout(fetch_timeout, fetch).await {
                    Ok(result) => (id, result),
                    Err(_) => {
                        let err = AggregatorError::SourceUnavailable {
                            source: id.clone(),
                            reason: format!("timed out after {:?}", fetch_timeout),
                        };
                        (id, Err(err))
                    }
                }
            });
        }

        let mut items: Vec<Content> = Vec::new();
        let mut failures: Vec<SourceFailure> = Vec::new();
        let mut lost = 0usize;

        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok((id, Ok(batch))) => {
                    debug!(%query_id, source = %id, items = batch.len(), "source fetch complete");
                    items.extend(batch);
                }
                Ok((id, Err(e))) => {
                    warn!(%query_id, source = %id, error = %e, "source failed, continuing without it");
                    failures.push(SourceFailure { source: id, error: e });
                }
                Err(e) => {
                    error!(%query_id, error = %e, "fetch task died");
                    lost += 1;
                }
            }
        }

        if items.is_empty() && failures.len() + lost == total {
            error!(%query_id, failed = total, "every source failed");
            return Err(AggregatorError::AllSourcesUnavailable { failed: total });
        }

        items.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));
        items.truncate(count);

        info!(
            %query_id,
            items = items.len(),
            failures = failures.len(),
            "aggregate query complete"
        );
        Ok(QueryOutcome { items, failures })
    }
}
