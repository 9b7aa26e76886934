use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use clap::Parser;
use tracing::{error, info, warn};

use social_aggregator::sources::{github, instagram, linkedin, threads};
use social_aggregator::{
    AccessToken, AggregatorError, ApiSource, AppConfig, Aggregator, ContentSource,
    CredentialManager, HttpFetcher, SourceId, TimeRange, TokenEntry, TokenRefresher,
};

#[derive(Parser)]
#[command(name = "social-aggregator", about = "Aggregate configured social feeds once and print the merged result")]
struct Cli {
    /// Path to the JSON config file.
    #[arg(long, default_value = "config.json")]
    config: PathBuf,

    /// Maximum number of items in the merged feed.
    #[arg(long, default_value_t = 20)]
    count: usize,

    /// Inclusive lower bound on item timestamps (RFC 3339).
    #[arg(long)]
    since: Option<DateTime<Utc>>,

    /// Inclusive upper bound on item timestamps (RFC 3339).
    #[arg(long)]
    until: Option<DateTime<Utc>>,
}

/// Config-file tokens are static; "refreshing" re-issues the configured
/// value so a clock-expired entry does not strand the source.
struct ConfigTokenRefresher {
    tokens: HashMap<SourceId, String>,
}

#[async_trait]
impl TokenRefresher for ConfigTokenRefresher {
    async fn refresh(&self, source_id: &SourceId) -> social_aggregator::Result<TokenEntry> {
        let token = self.tokens.get(source_id).ok_or_else(|| {
            AggregatorError::Config(format!("no configured token for source {source_id}"))
        })?;
        Ok(TokenEntry {
            source_id: source_id.clone(),
            token: AccessToken::new(token.clone()),
            issued_at: Utc::now(),
            expires_at: None,
        })
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt::init();

    let cli = Cli::parse();
    let config = AppConfig::load(&cli.config)?;
    info!(
        sources = config.sources.len(),
        api_key = "***",
        "loaded configuration"
    );

    let fetcher = HttpFetcher::new(config.fetch.clone());

    let tokens: HashMap<SourceId, String> = config
        .sources
        .iter()
        .filter_map(|s| {
            s.token
                .as_ref()
                .map(|t| (SourceId::new(&s.id), t.clone()))
        })
        .collect();
    let credentials = Arc::new(CredentialManager::new(Arc::new(ConfigTokenRefresher {
        tokens,
    })));

    let mut aggregator = Aggregator::new(config.query_settings());

    for entry in &config.sources {
        let id = SourceId::new(&entry.id);

        if let Some(token) = &entry.token {
            credentials
                .store(TokenEntry {
                    source_id: id.clone(),
                    token: AccessToken::new(token.clone()),
                    issued_at: Utc::now(),
                    expires_at: None,
                })
                .await;
        }
        let creds = entry.token.as_ref().map(|_| credentials.clone());

        let source: Arc<dyn ContentSource> = match entry.platform.as_str() {
            "github" => Arc::new(ApiSource::new(
                id.clone(),
                github::platform(),
                github::GitHubClient::new(fetcher.clone(), &entry.account),
                github::GitHubMapper::new(id.clone()),
                creds,
            )),
            "instagram" => Arc::new(ApiSource::new(
                id.clone(),
                instagram::platform(),
                instagram::InstagramClient::new(fetcher.clone()),
                instagram::InstagramMapper::new(id.clone()),
                creds,
            )),
            "linkedin" => Arc::new(ApiSource::new(
                id.clone(),
                linkedin::platform(),
                linkedin::LinkedInClient::new(fetcher.clone(), &entry.account),
                linkedin::LinkedInMapper::new(id.clone()),
                creds,
            )),
            "threads" => Arc::new(ApiSource::new(
                id.clone(),
                threads::platform(),
                threads::ThreadsClient::new(fetcher.clone()),
                threads::ThreadsMapper::new(id.clone()),
                creds,
            )),
            other => {
                error!(source = %id, platform = other, "unknown platform in config, skipping");
                continue;
            }
        };

        aggregator.register(source)?;
    }

    let range = match (cli.since, cli.until) {
        (None, None) => None,
        (since, until) => Some(TimeRange::new(
            since.unwrap_or(DateTime::<Utc>::MIN_UTC),
            until.unwrap_or_else(Utc::now),
        )?),
    };

    let outcome = aggregator.query(cli.count, range).await?;

    for failure in &outcome.failures {
        warn!(source = %failure.source, error = %failure.error, "source failed during query");
    }
    info!(items = outcome.items.len(), "query complete");

    println!("{}", serde_json::to_string_pretty(&outcome.items)?);
    Ok(())
}
