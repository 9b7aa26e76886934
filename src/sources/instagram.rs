use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Deserialize;
use tracing::debug;
use url::Url;

use crate::credentials::AccessToken;
use crate::formatting::{FormatKind, FormattingLanguage};
use crate::http::HttpFetcher;
use crate::indexer::MarkupIndexer;
use crate::mapper::ContentMapper;
use crate::source::RawContentClient;
use crate::types::{
    Actor, AggregatorError, Attachment, Content, Link, Platform, Reception, Result, SourceId,
    Stat, Visual,
};

const API_BASE: &str = "https://graph.instagram.com";

/// Instagram captions carry mentions and hashtags; there is no inline
/// bold/italic/link syntax.
pub fn platform() -> Platform {
    Platform {
        base_url: Url::parse(API_BASE).expect("static platform URL"),
        display_name: "Instagram".to_string(),
        mention_prefix: "@".to_string(),
        markup: FormattingLanguage::new([FormatKind::Mention, FormatKind::Hashtag]),
    }
}

/// One media node from `/me/media`. The timestamp arrives in Instagram's
/// `+0000` offset notation, which is not RFC 3339, so it stays a string
/// until the mapper parses it.
#[derive(Debug, Clone, Deserialize)]
pub struct RawInstagramMedia {
    pub id: String,
    #[serde(default)]
    pub caption: Option<String>,
    pub media_type: String,
    #[serde(default)]
    pub media_url: Option<String>,
    pub permalink: String,
    pub timestamp: String,
    pub username: String,
    #[serde(default)]
    pub like_count: Option<u64>,
    #[serde(default)]
    pub comments_count: Option<u64>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RawInstagramFeed {
    pub data: Vec<RawInstagramMedia>,
}

pub struct InstagramMapper {
    source_id: SourceId,
    platform: Platform,
    indexer: MarkupIndexer,
}

impl InstagramMapper {
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

pub(crate) fn parse_graph_timestamp(raw: &str) -> Result<DateTime<Utc>> {
    DateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S%z")
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| AggregatorError::Parse(format!("bad timestamp {raw:?}: {e}")))
}

impl ContentMapper for InstagramMapper {
    type Raw = RawInstagramMedia;

    fn map(&self, raw: RawInstagramMedia) -> Result<Content> {
        let caption = raw.caption.unwrap_or_default();
        let (text, formatting) = self.indexer.index(&caption)?;

        let actor = Actor {
            profile_page_url: Url::parse(&format!(
                "https://www.instagram.com/{}/",
                raw.username
            ))?,
            profile_pic_url: None,
            first_name: String::new(),
            last_name: String::new(),
            username: raw.username,
        };

        let permalink = Link {
            url: Url::parse(&raw.permalink)?,
            label: None,
        };
        let attachment = match raw.media_url.as_deref() {
            Some(media_url) => Attachment::of_visual(Visual {
                url: Url::parse(media_url)?,
                alt_text: None,
            })
            .and_link(permalink),
            None => Attachment::of_link(permalink),
        };

        let mut stats = Vec::new();
        if let Some(likes) = raw.like_count {
            stats.push(Stat {
                label: "likes".to_string(),
                value: likes as f64,
            });
        }
        if let Some(comments) = raw.comments_count {
            stats.push(Stat {
                label: "comments".to_string(),
                value: comments as f64,
            });
        }
        let reception = if stats.is_empty() {
            None
        } else {
            Some(Reception {
                stats,
                comments: Vec::new(),
            })
        };

        Ok(Content {
            timestamp: parse_graph_timestamp(&raw.timestamp)?,
            actor,
            platform: self.platform.clone(),
            source_id: self.source_id.clone(),
            text,
            formatting,
            attachments: vec![attachment],
            reception,
        })
    }
}

/// Client for the Instagram graph media endpoint; an access token is
/// mandatory there.
pub struct InstagramClient {
    fetcher: HttpFetcher,
}

impl InstagramClient {
    pub fn new(fetcher: HttpFetcher) -> Self {
        Self { fetcher }
    }

    fn media_url(&self, token: &AccessToken, limit: usize) -> String {
        format!(
            "{API_BASE}/me/media?fields=id,caption,media_type,media_url,permalink,timestamp,username,like_count,comments_count&limit={limit}&access_token={}",
            token.as_str()
        )
    }
}

#[async_trait]
impl RawContentClient for InstagramClient {
    type Raw = RawInstagramMedia;

    async fn ping(&self, token: Option<&AccessToken>) -> Result<()> {
        let token = token.ok_or_else(|| {
            AggregatorError::Config("Instagram client needs an access token".to_string())
        })?;
        let url = format!("{API_BASE}/me?fields=id&access_token={}", token.as_str());
        self.fetcher.get_json::<serde_json::Value>(&url, None).await?;
        Ok(())
    }

    async fn fetch_latest(
        &self,
        token: Option<&AccessToken>,
        limit: usize,
    ) -> Result<Vec<RawInstagramMedia>> {
        let token = token.ok_or_else(|| {
            AggregatorError::Config("Instagram client needs an access token".to_string())
        })?;
        let feed: RawInstagramFeed = self
            .fetcher
            .get_json(&self.media_url(token, limit), None)
            .await?;
        debug!(items = feed.data.len(), "fetched Instagram media");
        Ok(feed.data)
    }
}
