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
use crate::types::{Actor, Attachment, Content, Link, Platform, Result, SourceId};

const API_BASE: &str = "https://api.github.com";

/// GitHub's platform record. Commit messages and event bodies are markdown,
/// so the declared vocabulary covers bold/italic/links plus mentions; GitHub
/// has no hashtag syntax.
pub fn platform() -> Platform {
    Platform {
        base_url: Url::parse(API_BASE).expect("static platform URL"),
        display_name: "GitHub".to_string(),
        mention_prefix: "@".to_string(),
        markup: FormattingLanguage::new([
            FormatKind::Bold,
            FormatKind::Italic,
            FormatKind::Link,
            FormatKind::Mention,
        ]),
    }
}

/// One entry from `/users/{user}/events/public`.
#[derive(Debug, Clone, Deserialize)]
pub struct RawGitHubEvent {
    pub id: String,
    #[serde(rename = "type")]
    pub event_type: String,
    pub actor: RawGitHubActor,
    pub repo: RawGitHubRepo,
    #[serde(default)]
    pub payload: RawGitHubPayload,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RawGitHubActor {
    pub login: String,
    #[serde(default)]
    pub display_login: Option<String>,
    pub avatar_url: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RawGitHubRepo {
    pub name: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct RawGitHubPayload {
    #[serde(default)]
    pub action: Option<String>,
    #[serde(default)]
    pub commits: Vec<RawGitHubCommit>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RawGitHubCommit {
    pub message: String,
}

pub struct GitHubMapper {
    source_id: SourceId,
    platform: Platform,
    indexer: MarkupIndexer,
}

impl GitHubMapper {
    pub fn new(source_id: SourceId) -> Self {
        let platform = platform();
        let indexer = MarkupIndexer::new(platform.markup.clone());
        Self {
            source_id,
            platform,
            indexer,
        }
    }

    fn headline(raw: &RawGitHubEvent) -> String {
        if let Some(commit) = raw.payload.commits.first() {
            // First line of the first commit carries the story.
            let first_line = commit.message.lines().next().unwrap_or_default();
            return format!("{}: {}", raw.repo.name, first_line);
        }
        match &raw.payload.action {
            Some(action) => format!("{} {} {}", action, raw.event_type, raw.repo.name),
            None => format!("{} on {}", raw.event_type, raw.repo.name),
        }
    }
}

impl ContentMapper for GitHubMapper {
    type Raw = RawGitHubEvent;

    fn map(&self, raw: RawGitHubEvent) -> Result<Content> {
        let (text, formatting) = self.indexer.index(&Self::headline(&raw))?;

        let login = raw.actor.login.clone();
        let actor = Actor {
            profile_page_url: Url::parse(&format!("https://github.com/{login}"))?,
            profile_pic_url: Some(Url::parse(&raw.actor.avatar_url)?),
            first_name: raw.actor.display_login.unwrap_or_else(|| login.clone()),
            last_name: String::new(),
            username: login,
        };

        let repo_link = Link {
            url: Url::parse(&format!("https://github.com/{}", raw.repo.name))?,
            label: Some(raw.repo.name.clone()),
        };

        Ok(Content {
            timestamp: raw.created_at,
            actor,
            platform: self.platform.clone(),
            source_id: self.source_id.clone(),
            text,
            formatting,
            attachments: vec![Attachment::of_link(repo_link)],
            reception: None,
        })
    }
}

/// Thin client over the public events endpoint. Works unauthenticated; a
/// token lifts the rate limit.
pub struct GitHubClient {
    fetcher: HttpFetcher,
    account: String,
}

impl GitHubClient {
    pub fn new(fetcher: HttpFetcher, account: impl Into<String>) -> Self {
        Self {
            fetcher,
            account: account.into(),
        }
    }
}

#[async_trait]
impl RawContentClient for GitHubClient {
    type Raw = RawGitHubEvent;

    async fn ping(&self, token: Option<&AccessToken>) -> Result<()> {
        let url = format!("{API_BASE}/users/{}", self.account);
        self.fetcher
            .get_json::<serde_json::Value>(&url, token)
            .await?;
        Ok(())
    }

    async fn fetch_latest(
        &self,
        token: Option<&AccessToken>,
        limit: usize,
    ) -> Result<Vec<RawGitHubEvent>> {
        let url = format!(
            "{API_BASE}/users/{}/events/public?per_page={limit}",
            self.account
        );
        let events: Vec<RawGitHubEvent> = self.fetcher.get_json(&url, token).await?;
        debug!(account = %self.account, events = events.len(), "fetched GitHub events");
        Ok(events)
    }
}
