use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use url::Url;

use crate::formatting::{FormatKind, FormattingIndex};

/// Opaque identifier for one configured account/feed on a platform.
///
/// Uniqueness is enforced by the aggregator at registration time.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SourceId(String);

impl SourceId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for SourceId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for SourceId {
    fn from(id: &str) -> Self {
        Self(id.to_string())
    }
}

// `AggregatorError` has variants with a field named `source` (carrying a
// `SourceId`). thiserror treats any field named `source` as the error's
// `std::error::Error` source, which requires the type to implement `Error`.
// This blanket impl satisfies that bound; `SourceId` already provides the
// required `Display` and `Debug`.
impl std::error::Error for SourceId {}

/// One external service we pull content from. Immutable, one value per
/// distinct platform, shared by every source configured against it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Platform {
    pub base_url: Url,
    pub display_name: String,
    /// Character sequence the platform prefixes user mentions with ("@").
    pub mention_prefix: String,
    /// The markup vocabulary the platform's raw text is written in.
    pub markup: crate::formatting::FormattingLanguage,
}

/// The author of a piece of content. Value object, field equality only.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Actor {
    pub profile_page_url: Url,
    /// Not every platform exposes an avatar on its content endpoints.
    pub profile_pic_url: Option<Url>,
    pub first_name: String,
    pub last_name: String,
    pub username: String,
}

/// Image or video payload attached to a content item.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Visual {
    pub url: Url,
    pub alt_text: Option<String>,
}

/// Outbound link attached to a content item.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Link {
    pub url: Url,
    pub label: Option<String>,
}

/// Attachment on a content item. At least one of visual/link is always
/// present; the constructors make an empty attachment unrepresentable.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Attachment {
    visual: Option<Visual>,
    link: Option<Link>,
    caption: Option<String>,
}

impl Attachment {
    pub fn of_visual(visual: Visual) -> Self {
        Self {
            visual: Some(visual),
            link: None,
            caption: None,
        }
    }

    pub fn of_link(link: Link) -> Self {
        Self {
            visual: None,
            link: Some(link),
            caption: None,
        }
    }

    pub fn and_link(mut self, link: Link) -> Self {
        self.link = Some(link);
        self
    }

    pub fn and_visual(mut self, visual: Visual) -> Self {
        self.visual = Some(visual);
        self
    }

    pub fn and_caption(mut self, caption: impl Into<String>) -> Self {
        self.caption = Some(caption.into());
        self
    }

    pub fn visual(&self) -> Option<&Visual> {
        self.visual.as_ref()
    }

    pub fn link(&self) -> Option<&Link> {
        self.link.as_ref()
    }

    pub fn caption(&self) -> Option<&str> {
        self.caption.as_deref()
    }
}

/// One labeled engagement statistic (likes, reposts, stars, ...).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Stat {
    pub label: String,
    pub value: f64,
}

/// How a content item was received: engagement stats plus comments, which
/// are themselves normalized content.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Reception {
    pub stats: Vec<Stat>,
    pub comments: Vec<Content>,
}

/// One normalized unit of user-generated content from any platform.
/// Immutable once constructed by a mapper; carries no back-reference to its
/// source beyond the embedded `source_id`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Content {
    pub timestamp: DateTime<Utc>,
    pub actor: Actor,
    pub platform: Platform,
    pub source_id: SourceId,
    /// De-markup'd plain text; `formatting` offsets index into this.
    pub text: String,
    pub formatting: FormattingIndex,
    pub attachments: Vec<Attachment>,
    pub reception: Option<Reception>,
}

/// Inclusive timestamp filter for fetches. `new` rejects inverted ranges.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TimeRange {
    after: DateTime<Utc>,
    before: DateTime<Utc>,
}

impl TimeRange {
    pub fn new(after: DateTime<Utc>, before: DateTime<Utc>) -> Result<Self> {
        if after > before {
            return Err(AggregatorError::InvalidTimeRange { after, before });
        }
        Ok(Self { after, before })
    }

    pub fn after(&self) -> DateTime<Utc> {
        self.after
    }

    pub fn before(&self) -> DateTime<Utc> {
        self.before
    }

    pub fn contains(&self, ts: DateTime<Utc>) -> bool {
        self.after <= ts && ts <= self.before
    }
}

/// Why a token could not be produced for a fetch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum AuthErrorKind {
    #[error("no token on record")]
    MissingToken,
    #[error("token expired")]
    Expired,
    #[error("refresh failed")]
    RefreshFailed,
}

/// Coarse classification the HTTP exposure layer maps onto status codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorClass {
    /// Caller mistake, never retried.
    BadRequest,
    /// Administrative lookup of an id nobody registered.
    NotFound,
    /// Every upstream source failed; the service is degraded, not broken.
    Degraded,
    /// Transient upstream or internal trouble.
    Upstream,
}

#[derive(Debug, thiserror::Error)]
pub enum AggregatorError {
    #[error("illegal item count: {count}")]
    IllegalCount { count: usize },

    #[error("invalid time range: after {after} is later than before {before}")]
    InvalidTimeRange {
        after: DateTime<Utc>,
        before: DateTime<Utc>,
    },

    #[error("source {source} unavailable: {reason}")]
    SourceUnavailable { source: SourceId, reason: String },

    #[error("auth failure for source {source}: {kind}")]
    Auth { source: SourceId, kind: AuthErrorKind },

    #[error("unterminated {kind} format opened at plain-text offset {start}")]
    UnterminatedFormat { kind: FormatKind, start: usize },

    #[error("parse error: {0}")]
    Parse(String),

    #[error("all {failed} registered sources failed")]
    AllSourcesUnavailable { failed: usize },

    #[error("source {0} is already registered")]
    DuplicateSource(SourceId),

    #[error("unknown source: {0}")]
    UnknownSource(SourceId),

    #[error("config error: {0}")]
    Config(String),

    #[error("environment variable {name} is not set")]
    MissingEnvVar { name: String },

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("invalid URL: {0}")]
    InvalidUrl(#[from] url::ParseError),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl AggregatorError {
    /// Stable classification for the REST layer's status mapping.
    pub fn class(&self) -> ErrorClass {
        match self {
            AggregatorError::IllegalCount { .. } | AggregatorError::InvalidTimeRange { .. } => {
                ErrorClass::BadRequest
            }
            AggregatorError::UnknownSource(_) => ErrorClass::NotFound,
            AggregatorError::AllSourcesUnavailable { .. } => ErrorClass::Degraded,
            _ => ErrorClass::Upstream,
        }
    }
}

pub type Result<T> = std::result::Result<T, AggregatorError>;
