use async_trait::async_trait;
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
    Actor, AggregatorError, Attachment, Content, Link, Platform, Result, SourceId, Visual,
};

use super::instagram::parse_graph_timestamp;

const API_BASE: &str = "https://graph.threads.net";

/// Threads posts carry links, mentions and hashtags; no bold/italic syntax.
pub fn platform() -> Platform {
    Platform {
        base_url: Url::parse(API_BASE).expect("static platform URL"),
        display_name: "Threads".to_string(),
        mention_prefix: "@".to_string(),
        markup: FormattingLanguage::new([
            FormatKind::Link,
            FormatKind::Mention,
            FormatKind::Hashtag,
        ]),
    }
}

/// One post from `/me/threads`. Same graph timestamp notation as Instagram.
#[derive(Debug, Clone, Deserialize)]
pub struct RawThreadsPost {
    pub id: String,
    #[serde(default)]
    pub text: Option<String>,
    pub username: String,
    #[serde(default)]
    pub permalink: Option<String>,
    pub timestamp: String,
    #[serde(default)]
    pub media_url: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RawThreadsFeed {
    pub data: Vec<RawThreadsPost>,
}

pub struct ThreadsMapper {
    source_id: SourceId,
    platform: Platform,
    indexer: MarkupIndexer,
}

impl ThreadsMapper {
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

impl ContentMapper for ThreadsMapper {
    type Raw = RawThreadsPost;

    fn map(&self, raw: RawThreadsPost) -> Result<Content> {
        let body = raw.text.unwrap_or_default();
        let (text, formatting) = self.indexer.index(&body)?;

        let actor = Actor {
            profile_page_url: Url::parse(&format!(
                "https://www.threads.net/@{}",
                raw.username
            ))?,
            profile_pic_url: None,
            first_name: String::new(),
            last_name: String::new(),
            username: raw.username,
        };

        let mut attachments = Vec::new();
        match (raw.media_url.as_deref(), raw.permalink.as_deref()) {
            (Some(media_url), permalink) => {
                let mut attachment = Attachment::of_visual(Visual {
                    url: Url::parse(media_url)?,
                    alt_text: None,
                });
                if let Some(permalink) = permalink {
                    attachment = attachment.and_link(Link {
                        url: Url::parse(permalink)?,
                        label: None,
                    });
                }
                attachments.push(attachment);
            }
            (None, Some(permalink)) => {
                attachments.push(Attachment::of_link(Link {
                    url: Url::parse(permalink)?,
                    label: None,
                }));
            }
            (None, None) => {}
        }

        Ok(Content {
            timestamp: parse_graph_timestamp(&raw.timestamp)?,
            actor,
            platform: self.platform.clone(),
            source_id: self.source_id.clone(),
            text,
            formatting,
            attachments,
            reception: None,
        })
    }
}

/// Client over the Threads graph endpoint; token required on every call.
pub struct ThreadsClient {
    fetcher: HttpFetcher,
}

impl ThreadsClient {
    pub fn new(fetcher: HttpFetcher) -> Self {
        Self { fetcher }
    }
}

#[async_trait]
impl RawContentClient for ThreadsClient {
    type Raw = RawThreadsPost;

    async fn ping(&self, token: Option<&AccessToken>) -> Result<()> {
        let token = token.ok_or_else(|| {
            AggregatorError::Config("Threads client needs an access token".to_string())
        })?;
        self.fetcher
            .get_json::<serde_json::Value>(
                &format!("{API_BASE}/v1.0/me?fields=id"),
                Some(token),
            )
            .await?;
        Ok(())
    }

    async fn fetch_latest(
        &self,
        token: Option<&AccessToken>,
        limit: usize,
    ) -> Result<Vec<RawThreadsPost>> {
        let token = token.ok_or_else(|| {
            AggregatorError::Config("Threads client needs an access token".to_string())
        })?;
        let url = format!(
            "{API_BASE}/v1.0/me/threads?fields=id,text,username,permalink,timestamp,media_url&limit={limit}"
        );
        let feed: RawThreadsFeed = self.fetcher.get_json(&url, Some(token)).await?;
        debug!(posts = feed.data.len(), "fetched Threads posts");
        Ok(feed.data)
    }
}
