use tracing::debug;

use crate::formatting::{FormatKind, FormattingIndex, FormattingLanguage, FormattingSpan, SubstringRange};
use crate::types::{AggregatorError, Result};

/// Converts raw platform markup into plain text plus a [`FormattingIndex`].
///
/// The indexer recognizes only the kinds present in its declared language;
/// syntax for any other kind passes through as literal text, never stripped
/// and never indexed. All offsets in the returned index refer to the
/// de-markup'd plain text and count Unicode scalar values (chars).
///
/// Recognized syntax: bold `**…**`, italic `*…*`, link `[label](url)`
/// (the `](url)` tail is part of the end delimiter and is consumed),
/// mention `@handle`, hashtag `#tag`. Where start delimiters share a prefix
/// the longer match wins; the full tie-break order is
/// Link > Bold > Italic > Mention > Hashtag, which is also the sort order
/// for spans opening at the same plain-text offset.
///
/// Spans are flat: while a paired format is open, every delimiter other than
/// its own end delimiter is literal text. Nested or overlapping formatting is
/// not supported.
#[derive(Debug, Clone)]
pub struct MarkupIndexer {
    language: FormattingLanguage,
}

struct OpenSpan {
    kind: FormatKind,
    start: usize,
}

impl MarkupIndexer {
    pub fn new(language: FormattingLanguage) -> Self {
        Self { language }
    }

    pub fn language(&self) -> &FormattingLanguage {
        &self.language
    }

    /// Single left-to-right pass over `raw`. Never backtracks over emitted
    /// plain text; an opened-but-never-closed paired format fails the whole
    /// call with [`AggregatorError::UnterminatedFormat`].
    pub fn index(&self, raw: &str) -> Result<(String, FormattingIndex)> {
        let chars: Vec<char> = raw.chars().collect();
        let mut out = String::with_capacity(raw.len());
        let mut out_len = 0usize;
        let mut spans: Vec<FormattingSpan> = Vec::new();
        let mut open: Option<OpenSpan> = None;
        let mut i = 0usize;

        while i < chars.len() {
            if let Some(current) = &open {
                match self.match_end(current.kind, &chars, i) {
                    EndMatch::Closed { consumed } => {
                        spans.push(FormattingSpan {
                            kind: current.kind,
                            range: SubstringRange::new(current.start, out_len),
                        });
                        i += consumed;
                        open = None;
                    }
                    EndMatch::Unterminated => {
                        return Err(AggregatorError::UnterminatedFormat {
                            kind: current.kind,
                            start: current.start,
                        });
                    }
                    EndMatch::NotHere => {
                        out.push(chars[i]);
                        out_len += 1;
                        i += 1;
                    }
                }
                continue;
            }

            match self.match_start(&chars, i) {
                StartMatch::Paired { kind, consumed } => {
                    open = Some(OpenSpan {
                        kind,
                        start: out_len,
                    });
                    i += consumed;
                }
                StartMatch::Token { kind, text_len } => {
                    // Prefix char consumed, token text copied through.
                    i += 1;
                    let start = out_len;
                    for _ in 0..text_len {
                        out.push(chars[i]);
                        out_len += 1;
                        i += 1;
                    }
                    spans.push(FormattingSpan {
                        kind,
                        range: SubstringRange::new(start, out_len),
                    });
                }
                StartMatch::None => {
                    out.push(chars[i]);
                    out_len += 1;
                    i += 1;
                }
            }
        }

        if let Some(current) = open {
            return Err(AggregatorError::UnterminatedFormat {
                kind: current.kind,
                start: current.start,
            });
        }

        debug!(
            spans = spans.len(),
            plain_chars = out_len,
            "indexed markup"
        );
        let index = FormattingIndex::new(self.language.clone(), spans, out_len)?;
        Ok((out, index))
    }

    /// Start-delimiter check at `i`, priority order with longest match first
    /// among prefix-sharing delimiters (`**` before `*`).
    fn match_start(&self, chars: &[char], i: usize) -> StartMatch {
        let c = chars[i];
        if c == '[' && self.language.contains(FormatKind::Link) {
            return StartMatch::Paired {
                kind: FormatKind::Link,
                consumed: 1,
            };
        }
        if c == '*' {
            let double = chars.get(i + 1) == Some(&'*');
            if double && self.language.contains(FormatKind::Bold) {
                return StartMatch::Paired {
                    kind: FormatKind::Bold,
                    consumed: 2,
                };
            }
            if self.language.contains(FormatKind::Italic) {
                return StartMatch::Paired {
                    kind: FormatKind::Italic,
                    consumed: 1,
                };
            }
        }
        if c == '@' && self.language.contains(FormatKind::Mention) {
            if let Some(len) = token_length(chars, i + 1) {
                return StartMatch::Token {
                    kind: FormatKind::Mention,
                    text_len: len,
                };
            }
        }
        if c == '#' && self.language.contains(FormatKind::Hashtag) {
            if let Some(len) = token_length(chars, i + 1) {
                return StartMatch::Token {
                    kind: FormatKind::Hashtag,
                    text_len: len,
                };
            }
        }
        StartMatch::None
    }

    /// End-delimiter check for the currently open paired kind.
    fn match_end(&self, kind: FormatKind, chars: &[char], i: usize) -> EndMatch {
        match kind {
            FormatKind::Bold => {
                if chars[i] == '*' && chars.get(i + 1) == Some(&'*') {
                    EndMatch::Closed { consumed: 2 }
                } else {
                    EndMatch::NotHere
                }
            }
            FormatKind::Italic => {
                if chars[i] == '*' {
                    EndMatch::Closed { consumed: 1 }
                } else {
                    EndMatch::NotHere
                }
            }
            FormatKind::Link => {
                // The end delimiter is `](url)` as a whole; a `]` without the
                // url tail stays literal and the span stays open.
                if chars[i] != ']' || chars.get(i + 1) != Some(&'(') {
                    return EndMatch::NotHere;
                }
                let mut j = i + 2;
                while j < chars.len() && chars[j] != ')' {
                    j += 1;
                }
                if j == chars.len() {
                    return EndMatch::Unterminated;
                }
                EndMatch::Closed {
                    consumed: j + 1 - i,
                }
            }
            // Mention/hashtag never sit in the open state.
            FormatKind::Mention | FormatKind::Hashtag => EndMatch::NotHere,
        }
    }
}

enum StartMatch {
    Paired { kind: FormatKind, consumed: usize },
    Token { kind: FormatKind, text_len: usize },
    None,
}

enum EndMatch {
    Closed { consumed: usize },
    Unterminated,
    NotHere,
}

/// Length of the mention/hashtag token starting at `from`, or `None` when the
/// prefix is not followed by at least one token char (then the prefix itself
/// is literal text).
fn token_length(chars: &[char], from: usize) -> Option<usize> {
    let mut len = 0usize;
    while let Some(&c) = chars.get(from + len) {
        if c.is_alphanumeric() || c == '_' {
            len += 1;
        } else {
            break;
        }
    }
    if len == 0 {
        None
    } else {
        Some(len)
    }
}
