use tracing::warn;

use crate::types::{Content, Result};

/// Outcome of mapping a batch of raw records. Failed elements are omitted
/// from `contents` and reported per-index; a bad record never aborts the
/// records around it.
#[derive(Debug)]
pub struct MappedBatch {
    pub contents: Vec<Content>,
    pub skipped: Vec<(usize, crate::types::AggregatorError)>,
}

impl MappedBatch {
    pub fn skipped_indices(&self) -> Vec<usize> {
        self.skipped.iter().map(|(i, _)| *i).collect()
    }
}

/// Maps one platform's raw wire records into the unified [`Content`] entity.
///
/// Implementations run the markup indexer over the raw text with the
/// platform's declared language, so `Content.formatting` offsets always
/// target the mapped plain text.
pub trait ContentMapper: Send + Sync {
    type Raw;

    fn map(&self, raw: Self::Raw) -> Result<Content>;

    /// Order-preserving, element-wise batch mapping.
    fn map_batch(&self, raws: Vec<Self::Raw>) -> MappedBatch {
        let mut contents = Vec::with_capacity(raws.len());
        let mut skipped = Vec::new();
        for (i, raw) in raws.into_iter().enumerate() {
            match self.map(raw) {
                Ok(content) => contents.push(content),
                Err(e) => {
                    warn!(index = i, error = %e, "skipping unmappable raw record");
                    skipped.push((i, e));
                }
            }
        }
        MappedBatch { contents, skipped }
    }
}
