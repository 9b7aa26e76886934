use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};

use crate::types::{AggregatorError, Result};

/// One kind of inline formatting a platform can express.
///
/// The variant order doubles as the indexer's priority order: when two start
/// delimiters share a prefix (`**` vs `*`), the lower-numbered kind wins, and
/// spans opening at the same plain-text offset sort in this order.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "snake_case")]
pub enum FormatKind {
    Link,
    Bold,
    Italic,
    Mention,
    Hashtag,
}

impl std::fmt::Display for FormatKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            FormatKind::Link => "link",
            FormatKind::Bold => "bold",
            FormatKind::Italic => "italic",
            FormatKind::Mention => "mention",
            FormatKind::Hashtag => "hashtag",
        };
        f.write_str(name)
    }
}

/// The set of format kinds an indexer or renderer understands.
///
/// Equality ignores insertion order and duplicates; the usual set algebra
/// (`matches`, `is_subset_of`, `is_superset_of`) decides whether a renderer
/// can faithfully display an index.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FormattingLanguage {
    kinds: BTreeSet<FormatKind>,
}

impl FormattingLanguage {
    pub fn new(kinds: impl IntoIterator<Item = FormatKind>) -> Self {
        Self {
            kinds: kinds.into_iter().collect(),
        }
    }

    /// Language with no kinds; indexing against it is the identity transform.
    pub fn empty() -> Self {
        Self::default()
    }

    /// Every kind this crate knows about.
    pub fn full() -> Self {
        Self::new([
            FormatKind::Link,
            FormatKind::Bold,
            FormatKind::Italic,
            FormatKind::Mention,
            FormatKind::Hashtag,
        ])
    }

    pub fn contains(&self, kind: FormatKind) -> bool {
        self.kinds.contains(&kind)
    }

    pub fn kinds(&self) -> impl Iterator<Item = FormatKind> + '_ {
        self.kinds.iter().copied()
    }

    pub fn is_empty(&self) -> bool {
        self.kinds.is_empty()
    }

    /// True iff both languages recognize exactly the same kinds.
    pub fn matches(&self, other: &FormattingLanguage) -> bool {
        self.kinds == other.kinds
    }

    /// True iff every kind of `self` appears in `other` (true when equal).
    pub fn is_subset_of(&self, other: &FormattingLanguage) -> bool {
        self.kinds.is_subset(&other.kinds)
    }

    pub fn is_superset_of(&self, other: &FormattingLanguage) -> bool {
        other.is_subset_of(self)
    }
}

/// Half-open `[start, end)` range over the plain-text coordinate space.
///
/// Offsets count Unicode scalar values (chars), never bytes, matching how the
/// indexer advances its output buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubstringRange {
    pub start: usize,
    pub end: usize,
}

impl SubstringRange {
    pub fn new(start: usize, end: usize) -> Self {
        debug_assert!(start <= end, "range start past end");
        Self { start, end }
    }

    pub fn len(&self) -> usize {
        self.end - self.start
    }

    pub fn is_empty(&self) -> bool {
        self.start == self.end
    }

    pub fn overlaps(&self, other: &SubstringRange) -> bool {
        self.start < other.end && other.start < self.end
    }
}

/// One positioned piece of formatting over the plain text.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FormattingSpan {
    pub kind: FormatKind,
    pub range: SubstringRange,
}

/// Plain-text formatting map: the language the spans are drawn from plus the
/// spans themselves, sorted by start offset (ties broken by kind priority)
/// and additionally keyed by kind for lookup.
#[derive(Debug, Clone, Serialize)]
pub struct FormattingIndex {
    language: FormattingLanguage,
    spans: Vec<FormattingSpan>,
    #[serde(skip)]
    by_kind: BTreeMap<FormatKind, Vec<usize>>,
}

impl PartialEq for FormattingIndex {
    fn eq(&self, other: &Self) -> bool {
        // by_kind is derived from spans, so it carries no extra identity.
        self.language == other.language && self.spans == other.spans
    }
}

impl<'de> Deserialize<'de> for FormattingIndex {
    fn deserialize<D>(deserializer: D) -> std::result::Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        #[derive(Deserialize)]
        struct Wire {
            language: FormattingLanguage,
            spans: Vec<FormattingSpan>,
        }
        let wire = Wire::deserialize(deserializer)?;
        let mut by_kind: BTreeMap<FormatKind, Vec<usize>> = BTreeMap::new();
        for (i, span) in wire.spans.iter().enumerate() {
            by_kind.entry(span.kind).or_default().push(i);
        }
        Ok(Self {
            language: wire.language,
            spans: wire.spans,
            by_kind,
        })
    }
}

impl FormattingIndex {
    /// Builds an index over plain text of `plain_len` chars, validating the
    /// span invariants: every range inside the text bounds, spans sorted by
    /// start, and no two spans of the same kind overlapping.
    pub fn new(
        language: FormattingLanguage,
        mut spans: Vec<FormattingSpan>,
        plain_len: usize,
    ) -> Result<Self> {
        for span in &spans {
            if span.range.start > span.range.end || span.range.end > plain_len {
                return Err(AggregatorError::Parse(format!(
                    "{} span [{}, {}) outside plain text of length {}",
                    span.kind, span.range.start, span.range.end, plain_len
                )));
            }
            if !language.contains(span.kind) {
                return Err(AggregatorError::Parse(format!(
                    "{} span not in the declared language",
                    span.kind
                )));
            }
        }
        spans.sort_by(|a, b| {
            a.range
                .start
                .cmp(&b.range.start)
                .then(a.kind.cmp(&b.kind))
        });
        for pair in spans.windows(2) {
            if pair[0].kind == pair[1].kind && pair[0].range.overlaps(&pair[1].range) {
                return Err(AggregatorError::Parse(format!(
                    "overlapping {} spans at offsets {} and {}",
                    pair[0].kind, pair[0].range.start, pair[1].range.start
                )));
            }
        }
        let mut by_kind: BTreeMap<FormatKind, Vec<usize>> = BTreeMap::new();
        for (i, span) in spans.iter().enumerate() {
            by_kind.entry(span.kind).or_default().push(i);
        }
        Ok(Self {
            language,
            spans,
            by_kind,
        })
    }

    /// Index with no spans, for unformatted text.
    pub fn unformatted(language: FormattingLanguage) -> Self {
        Self {
            language,
            spans: Vec::new(),
            by_kind: BTreeMap::new(),
        }
    }

    pub fn language(&self) -> &FormattingLanguage {
        &self.language
    }

    /// All spans, sorted by start offset.
    pub fn spans(&self) -> &[FormattingSpan] {
        &self.spans
    }

    /// Spans of one kind, in start order.
    pub fn spans_of(&self, kind: FormatKind) -> Vec<&FormattingSpan> {
        match self.by_kind.get(&kind) {
            Some(indices) => indices.iter().map(|&i| &self.spans[i]).collect(),
            None => Vec::new(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.spans.is_empty()
    }

    /// Whether a renderer supporting `language` can display every span here.
    pub fn renderable_by(&self, language: &FormattingLanguage) -> bool {
        self.language.is_subset_of(language)
    }
}
