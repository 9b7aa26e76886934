use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Once};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use social_aggregator::types::AggregatorError;
use social_aggregator::{
    Actor, Aggregator, Availability, Content, ContentSource, ErrorClass, FormattingIndex,
    FormattingLanguage, Platform, QuerySettings, Result, SourceId, TimeRange,
};
use tracing::info;
use url::Url;

static INIT: Once = Once::new();

fn init_tracing() {
    INIT.call_once(|| {
        tracing_subscriber::fmt()
            .with_max_level(tracing::Level::INFO)
            .try_init()
            .ok();
    });
}

fn test_platform() -> Platform {
    Platform {
        base_url: Url::parse("https://example.com").unwrap(),
        display_name: "Example".to_string(),
        mention_prefix: "@".to_string(),
        markup: FormattingLanguage::empty(),
    }
}

fn ts(secs: i64) -> DateTime<Utc> {
    Utc.timestamp_opt(1_700_000_000 + secs, 0).unwrap()
}

fn item(id: &SourceId, at: i64, text: &str) -> Content {
    Content {
        timestamp: ts(at),
        actor: Actor {
            profile_page_url: Url::parse("https://example.com/u/ada").unwrap(),
            profile_pic_url: None,
            first_name: "Ada".to_string(),
            last_name: "Lovelace".to_string(),
            username: "ada".to_string(),
        },
        platform: test_platform(),
        source_id: id.clone(),
        text: text.to_string(),
        formatting: FormattingIndex::unformatted(FormattingLanguage::empty()),
        attachments: Vec::new(),
        reception: None,
    }
}

#[derive(Debug)]
struct MockSource {
    id: SourceId,
    platform: Platform,
    items: Vec<Content>,
    fail: bool,
    unavailable: bool,
    delay: Option<Duration>,
    fetch_calls: Arc<AtomicUsize>,
    last_requested: Arc<AtomicUsize>,
    completed: Arc<AtomicBool>,
}

impl MockSource {
    fn new(id: &str, items: Vec<Content>) -> Self {
        Self {
            id: SourceId::new(id),
            platform: test_platform(),
            items,
            fail: false,
            unavailable: false,
            delay: None,
            fetch_calls: Arc::new(AtomicUsize::new(0)),
            last_requested: Arc::new(AtomicUsize::new(0)),
            completed: Arc::new(AtomicBool::new(false)),
        }
    }

    fn failing(id: &str) -> Self {
        let mut source = Self::new(id, Vec::new());
        source.fail = true;
        source
    }

    fn unavailable(id: &str) -> Self {
        let mut source = Self::new(id, Vec::new());
        source.unavailable = true;
        source
    }

    fn slow(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    async fn run(&self, count: usize, range: Option<TimeRange>) -> Result<Vec<Content>> {
        self.fetch_calls.fetch_add(1, Ordering::SeqCst);
        self.last_requested.store(count, Ordering::SeqCst);
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        if self.fail {
            return Err(AggregatorError::SourceUnavailable {
                source: self.id.clone(),
                reason: "mock transport down".to_string(),
            });
        }
        let mut items = self.items.clone();
        if let Some(range) = range {
            items.retain(|c| range.contains(c.timestamp));
        }
        items.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));
        items.truncate(count);
        self.completed.store(true, Ordering::SeqCst);
        Ok(items)
    }
}

#[async_trait]
impl ContentSource for MockSource {
    fn id(&self) -> &SourceId {
        &self.id
    }

    fn platform(&self) -> &Platform {
        &self.platform
    }

    async fn availability(&self) -> Availability {
        Availability::Unchecked
    }

    async fn check_availability(&self) -> Availability {
        if self.unavailable {
            Availability::Unavailable
        } else {
            Availability::Available
        }
    }

    async fn latest(&self, count: usize) -> Result<Vec<Content>> {
        self.run(count, None).await
    }

    async fn latest_between(&self, count: usize, range: TimeRange) -> Result<Vec<Content>> {
        self.run(count, Some(range)).await
    }
}

fn aggregator_with(sources: Vec<MockSource>) -> Aggregator {
    let mut aggregator = Aggregator::new(QuerySettings::default());
    for source in sources {
        aggregator.register(Arc::new(source)).expect("register");
    }
    aggregator
}

#[tokio::test]
async fn merges_sorts_and_caps_across_sources() {
    init_tracing();

    let a_id = SourceId::new("alpha");
    let b_id = SourceId::new("beta");
    let a = MockSource::new(
        "alpha",
        vec![item(&a_id, 10, "a10"), item(&a_id, 40, "a40")],
    );
    let b = MockSource::new(
        "beta",
        vec![
            item(&b_id, 20, "b20"),
            item(&b_id, 30, "b30"),
            item(&b_id, 50, "b50"),
        ],
    );
    let a_requested = a.last_requested.clone();
    let b_requested = b.last_requested.clone();

    let aggregator = aggregator_with(vec![a, b]);
    let outcome = aggregator.query(3, None).await.expect("query");

    let texts: Vec<&str> = outcome.items.iter().map(|c| c.text.as_str()).collect();
    assert_eq!(texts, ["b50", "a40", "b30"], "merged most-recent-first");
    assert!(outcome.failures.is_empty());

    // Each source was asked for at most the global count, never more.
    assert_eq!(a_requested.load(Ordering::SeqCst), 3);
    assert_eq!(b_requested.load(Ordering::SeqCst), 3);
}

#[tokio::test]
async fn partial_failure_returns_items_plus_diagnostics() {
    init_tracing();

    let b_id = SourceId::new("beta");
    let b_items = vec![
        item(&b_id, 1, "one"),
        item(&b_id, 2, "two"),
        item(&b_id, 3, "three"),
        item(&b_id, 4, "four"),
    ];
    let aggregator = aggregator_with(vec![
        MockSource::failing("alpha"),
        MockSource::new("beta", b_items),
    ]);

    let outcome = aggregator.query(10, None).await.expect("query");
    assert_eq!(outcome.items.len(), 4);
    assert_eq!(outcome.failures.len(), 1);
    assert_eq!(outcome.failures[0].source.as_str(), "alpha");
    info!("partial failure stayed partial");
}

#[tokio::test]
async fn all_sources_failing_is_an_aggregate_error() {
    init_tracing();

    let aggregator = aggregator_with(vec![
        MockSource::failing("alpha"),
        MockSource::failing("beta"),
    ]);

    match aggregator.query(5, None).await {
        Err(e @ AggregatorError::AllSourcesUnavailable { failed: 2 }) => {
            assert_eq!(e.class(), ErrorClass::Degraded);
        }
        other => panic!("expected AllSourcesUnavailable, got {other:?}"),
    }
}

#[tokio::test]
async fn zero_count_rejected_before_any_source_is_contacted() {
    init_tracing();

    let source = MockSource::new("alpha", Vec::new());
    let calls = source.fetch_calls.clone();
    let aggregator = aggregator_with(vec![source]);

    match aggregator.query(0, None).await {
        Err(e @ AggregatorError::IllegalCount { .. }) => {
            assert_eq!(e.class(), ErrorClass::BadRequest);
        }
        other => panic!("expected IllegalCount, got {other:?}"),
    }
    assert_eq!(calls.load(Ordering::SeqCst), 0, "no source contacted");
}

#[tokio::test]
async fn inverted_range_rejected_at_construction() {
    init_tracing();

    // The range type is valid by construction, so an inverted range cannot
    // even reach query(); no source sees it.
    match TimeRange::new(ts(100), ts(0)) {
        Err(e @ AggregatorError::InvalidTimeRange { .. }) => {
            assert_eq!(e.class(), ErrorClass::BadRequest);
        }
        other => panic!("expected InvalidTimeRange, got {other:?}"),
    }
}

#[tokio::test]
async fn range_query_filters_inclusively() {
    init_tracing();

    let id = SourceId::new("alpha");
    let aggregator = aggregator_with(vec![MockSource::new(
        "alpha",
        vec![
            item(&id, 0, "early"),
            item(&id, 10, "start"),
            item(&id, 20, "end"),
            item(&id, 30, "late"),
        ],
    )]);

    let range = TimeRange::new(ts(10), ts(20)).expect("range");
    let outcome = aggregator.query(10, Some(range)).await.expect("query");
    let texts: Vec<&str> = outcome.items.iter().map(|c| c.text.as_str()).collect();
    assert_eq!(texts, ["end", "start"]);
}

#[tokio::test]
async fn slow_source_times_out_as_partial_failure() {
    init_tracing();

    let fast_id = SourceId::new("fast");
    let slow = MockSource::new("slow", Vec::new()).slow(Duration::from_secs(5));
    let fast = MockSource::new("fast", vec![item(&fast_id, 10, "quick")]);

    let mut aggregator = Aggregator::new(QuerySettings {
        fetch_timeout: Duration::from_millis(50),
        max_concurrent_fetches: 4,
    });
    aggregator.register(Arc::new(slow)).expect("register");
    aggregator.register(Arc::new(fast)).expect("register");

    let outcome = aggregator.query(5, None).await.expect("query");
    assert_eq!(outcome.items.len(), 1);
    assert_eq!(outcome.failures.len(), 1);
    assert_eq!(outcome.failures[0].source.as_str(), "slow");
    match &outcome.failures[0].error {
        AggregatorError::SourceUnavailable { reason, .. } => {
            assert!(reason.contains("timed out"), "reason: {reason}");
        }
        other => panic!("expected timeout as SourceUnavailable, got {other:?}"),
    }
}

#[tokio::test]
async fn unavailable_source_is_skipped_with_diagnostics() {
    init_tracing();

    let ok_id = SourceId::new("ok");
    let aggregator = aggregator_with(vec![
        MockSource::unavailable("down"),
        MockSource::new("ok", vec![item(&ok_id, 10, "up")]),
    ]);

    let outcome = aggregator.query(5, None).await.expect("query");
    assert_eq!(outcome.items.len(), 1);
    assert_eq!(outcome.failures.len(), 1);
    assert_eq!(outcome.failures[0].source.as_str(), "down");
}

#[tokio::test]
async fn duplicate_registration_fails() {
    init_tracing();

    let mut aggregator = Aggregator::new(QuerySettings::default());
    aggregator
        .register(Arc::new(MockSource::new("alpha", Vec::new())))
        .expect("first registration");

    match aggregator.register(Arc::new(MockSource::new("alpha", Vec::new()))) {
        Err(AggregatorError::DuplicateSource(id)) => assert_eq!(id.as_str(), "alpha"),
        other => panic!("expected DuplicateSource, got {other:?}"),
    }
    assert_eq!(aggregator.len(), 1);
}

#[tokio::test]
async fn unknown_source_lookups_map_to_not_found() {
    init_tracing();

    let mut aggregator = Aggregator::new(QuerySettings::default());
    let ghost = SourceId::new("ghost");

    match aggregator.source(&ghost) {
        Err(e @ AggregatorError::UnknownSource(_)) => {
            assert_eq!(e.class(), ErrorClass::NotFound);
        }
        other => panic!("expected UnknownSource, got {other:?}"),
    }
    assert!(matches!(
        aggregator.deregister(&ghost),
        Err(AggregatorError::UnknownSource(_))
    ));
}

#[tokio::test]
async fn empty_registry_yields_empty_outcome() {
    init_tracing();

    let aggregator = Aggregator::new(QuerySettings::default());
    let outcome = aggregator.query(5, None).await.expect("query");
    assert!(outcome.items.is_empty());
    assert!(outcome.failures.is_empty());
}

#[tokio::test]
async fn dropping_the_query_abandons_in_flight_fetches() {
    init_tracing();

    let slow = MockSource::new("slow", Vec::new()).slow(Duration::from_millis(200));
    let completed = slow.completed.clone();
    let aggregator = aggregator_with(vec![slow]);

    // Drop the query future mid-fetch.
    tokio::select! {
        _ = aggregator.query(5, None) => panic!("query should not finish first"),
        _ = tokio::time::sleep(Duration::from_millis(50)) => {}
    }

    // Give an orphaned task time to finish if it had leaked.
    tokio::time::sleep(Duration::from_millis(300)).await;
    assert!(
        !completed.load(Ordering::SeqCst),
        "aborted fetch must not run to completion"
    );
}

#[tokio::test]
async fn fewer_items_than_count_is_not_an_error() {
    init_tracing();

    let id = SourceId::new("alpha");
    let aggregator = aggregator_with(vec![MockSource::new(
        "alpha",
        vec![
            item(&id, 1, "one"),
            item(&id, 2, "two"),
            item(&id, 3, "three"),
        ],
    )]);

    let outcome = aggregator.query(5, None).await.expect("query");
    assert_eq!(outcome.items.len(), 3);
    assert!(outcome.failures.is_empty());
}
