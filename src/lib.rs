pub mod aggregator;
pub mod config;
pub mod credentials;
pub mod formatting;
pub mod http;
pub mod indexer;
pub mod mapper;
pub mod source;
pub mod sources;
pub mod types;

pub use aggregator::{Aggregator, QueryOutcome, QuerySettings, SourceFailure};
pub use config::{AppConfig, SourceConfig};
pub use credentials::{AccessToken, CredentialManager, TokenEntry, TokenRefresher};
pub use formatting::{
    FormatKind, FormattingIndex, FormattingLanguage, FormattingSpan, SubstringRange,
};
pub use http::{FetchConfig, HttpFetcher};
pub use indexer::MarkupIndexer;
pub use mapper::{ContentMapper, MappedBatch};
pub use source::{ApiSource, Availability, ContentSource, RawContentClient};
pub use types::*;
