use async_trait::async_trait;
use chrono::{TimeZone, Utc};
use serde::Deserialize;
use tracing::debug;
use url::Url;

use crate::credentials::AccessToken;
use crate::formatting::FormattingLanguage;
use crate::http::HttpFetcher;
use crate::indexer::MarkupIndexer;
use crate::mapper::ContentMapper;
use crate::source::RawContentClient;
use crate::types::{Actor, AggregatorError, Content, Platform, Result, SourceId};

const API_BASE: &str = "https://api.linkedin.com";

/// LinkedIn post commentary supports the full vocabulary this crate knows.
pub fn platform() -> Platform {
    Platform {
        base_url: Url::parse(API_BASE).expect("static platform URL"),
        display_name: "LinkedIn".to_string(),
        mention_prefix: "@".to_string(),
        markup: FormattingLanguage::full(),
    }
}

/// One UGC post. Timestamps are epoch milliseconds on this API.
#[derive(Debug, Clone, Deserialize)]
pub struct RawLinkedInShare {
    pub id: String,
    /// Member URN, e.g. `urn:li:person:AbC123`.
    pub author: String,
    pub created: RawLinkedInTimestamp,
    #[serde(default)]
    pub commentary: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RawLinkedInTimestamp {
    pub time: i64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RawLinkedInFeed {
    pub elements: Vec<RawLinkedInShare>,
}

pub struct LinkedInMapper {
    source_id: SourceId,
    platform: Platform,
    indexer: MarkupIndexer,
}

impl LinkedInMapper {
    pub fn new(source_id: SourceId) -> Self {
        let platform = platform();
        let indexer = MarkupIndexer::new(platform.markup.clone());
        Self {
            source_id,
            platform,
            indexer,
        }
    }
}

fn member_id(urn: &str) -> &str {
    urn.rsplit(':').next().unwrap_or(urn)
}

impl ContentMapper for LinkedInMapper {
    type Raw = RawLinkedInShare;

    fn map(&self, raw: RawLinkedInShare) -> Result<Content> {
        let commentary = raw.commentary.unwrap_or_default();
        let (text, formatting) = self.indexer.index(&commentary)?;

        let timestamp = Utc
            .timestamp_millis_opt(raw.created.time)
            .single()
            .ok_or_else(|| {
                AggregatorError::Parse(format!("bad epoch millis {}", raw.created.time))
            })?;

        let member = member_id(&raw.author).to_string();
        let actor = Actor {
            profile_page_url: Url::parse(&format!("https://www.linkedin.com/in/{member}"))?,
            profile_pic_url: None,
            first_name: String::new(),
            last_name: String::new(),
            username: member,
        };

        Ok(Content {
            timestamp,
            actor,
            platform: self.platform.clone(),
            source_id: self.source_id.clone(),
            text,
            formatting,
            attachments: Vec::new(),
            reception: None,
        })
    }
}

/// Client over the UGC posts endpoint; every call is authenticated.
pub struct LinkedInClient {
    fetcher: HttpFetcher,
    author_urn: String,
}

impl LinkedInClient {
    pub fn new(fetcher: HttpFetcher, author_urn: impl Into<String>) -> Self {
        Self {
            fetcher,
            author_urn: author_urn.into(),
        }
    }
}

#[async_trait]
impl RawContentClient for LinkedInClient {
    type Raw = RawLinkedInShare;

    async fn ping(&self, token: Option<&AccessToken>) -> Result<()> {
        let token = token.ok_or_else(|| {
            AggregatorError::Config("LinkedIn client needs an access token".to_string())
        })?;
        self.fetcher
            .get_json::<serde_json::Value>(&format!("{API_BASE}/v2/me"), Some(token))
            .await?;
        Ok(())
    }

    async fn fetch_latest(
        &self,
        token: Option<&AccessToken>,
        limit: usize,
    ) -> Result<Vec<RawLinkedInShare>> {
        let token = token.ok_or_else(|| {
            AggregatorError::Config("LinkedIn client needs an access token".to_string())
        })?;
        let url = format!(
            "{API_BASE}/v2/ugcPosts?q=authors&authors=List({})&count={limit}",
            self.author_urn
        );
        let feed: RawLinkedInFeed = self.fetcher.get_json(&url, Some(token)).await?;
        debug!(author = %self.author_urn, posts = feed.elements.len(), "fetched LinkedIn posts");
        Ok(feed.elements)
    }
}
