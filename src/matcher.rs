//! Biometric best-match over the stored identities.
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::warn;

use crate::records::Embedding;
use crate::store::{IdentityFilter, RecordStore, StoreError};

/// Label returned when no gallery entry is close enough.
pub const UNKNOWN_LABEL: &str = "unknown";

/// Default acceptance threshold on the descriptor distance.
pub const DEFAULT_MATCH_THRESHOLD: f64 = 0.6;

/// Errors from a match query.
#[derive(Debug, Error)]
pub enum MatchError {
    /// The identity store could not be read.
    #[error(transparent)]
    Store(#[from] StoreError),

    /// No stored identity carries biometrics.
    #[error("no identities with biometrics to match against")]
    EmptyGallery,

    /// Query and gallery descriptors differ in length.
    #[error("descriptor length mismatch: gallery has {expected}, query has {got}")]
    DimensionMismatch {
        /// Length of the gallery descriptors.
        expected: usize,
        /// Length of the query descriptor.
        got: usize,
    },
}

/// Labeled descriptors for one identity.
#[derive(Debug, Clone, PartialEq)]
pub struct GalleryEntry {
    /// Contract address of the identity.
    pub label: String,
    /// One or more descriptors of equal length.
    pub embeddings: Vec<Embedding>,
}

/// Outcome of a match.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MatchResult {
    /// Matched contract address, or [`UNKNOWN_LABEL`].
    pub label: String,
    /// Distance to the nearest entry.
    pub distance: f64,
}

impl MatchResult {
    /// `true` if nothing was close enough.
    pub fn is_unknown(&self) -> bool {
        self.label == UNKNOWN_LABEL
    }
}

/// Embedding-matching capability: nearest labeled entry for a query descriptor.
pub trait EmbeddingMatcher: Send + Sync {
    /// Best match for `query` among `gallery` (which is non-empty).
    fn best_match(&self, gallery: &[GalleryEntry], query: &[f64]) -> Result<MatchResult, MatchError>;
}

/// Mean Euclidean distance to each entry's descriptors, accepted at or below a fixed
/// threshold.
#[derive(Debug, Clone, Copy)]
pub struct EuclideanMatcher {
    threshold: f64,
}

impl EuclideanMatcher {
    /// Matcher accepting distances `<= threshold`.
    pub fn new(threshold: f64) -> Self {
        Self { threshold }
    }

    /// Configured threshold.
    pub fn threshold(&self) -> f64 {
        self.threshold
    }
}

impl Default for EuclideanMatcher {
    fn default() -> Self {
        Self::new(DEFAULT_MATCH_THRESHOLD)
    }
}

/// Euclidean distance between equal-length vectors.
pub fn euclidean_distance(a: &[f64], b: &[f64]) -> Result<f64, MatchError> {
    if a.len() != b.len() {
        return Err(MatchError::DimensionMismatch {
            expected: a.len(),
            got: b.len(),
        });
    }
    Ok(a.iter()
        .zip(b)
        .map(|(x, y)| (x - y) * (x - y))
        .sum::<f64>()
        .sqrt())
}

impl EmbeddingMatcher for EuclideanMatcher {
    fn best_match(&self, gallery: &[GalleryEntry], query: &[f64]) -> Result<MatchResult, MatchError> {
        let mut best: Option<(&str, f64)> = None;
        for entry in gallery {
            let mut total = 0.0;
            for e in &entry.embeddings {
                total += euclidean_distance(e, query)?;
            }
            let mean = total / entry.embeddings.len().max(1) as f64;
            if best.map_or(true, |(_, d)| mean < d) {
                best = Some((entry.label.as_str(), mean));
            }
        }

        let (label, distance) = best.ok_or(MatchError::EmptyGallery)?;
        let label = if distance > self.threshold {
            UNKNOWN_LABEL
        } else {
            label
        };
        Ok(MatchResult {
            label: label.to_string(),
            distance,
        })
    }
}

/// Answers best-match queries against the live identities.
#[derive(Clone)]
pub struct BiometricMatcher {
    store: Arc<dyn RecordStore>,
    matcher: Arc<dyn EmbeddingMatcher>,
}

impl BiometricMatcher {
    /// Matcher reading identities from `store`.
    pub fn new(store: Arc<dyn RecordStore>, matcher: Arc<dyn EmbeddingMatcher>) -> Self {
        Self { store, matcher }
    }

    /// Gallery of every live identity with usable biometrics.
    pub async fn gallery(&self) -> Result<Vec<GalleryEntry>, StoreError> {
        let identities = self.store.find_identities(&IdentityFilter::All).await?;
        Ok(identities
            .into_iter()
            .filter(|i| !i.biometrics.is_empty())
            .filter_map(|i| {
                if well_formed(&i.biometrics) {
                    Some(GalleryEntry {
                        label: i.id,
                        embeddings: i.biometrics,
                    })
                } else {
                    warn!(contract = %i.id, "skipping identity with malformed biometrics");
                    None
                }
            })
            .collect())
    }

    /// Best match for `query`.
    ///
    /// Entries whose descriptors differ in length from `query` are left out. It is an
    /// error only if that leaves nothing to compare against.
    pub async fn best_match(&self, query: &[f64]) -> Result<MatchResult, MatchError> {
        let gallery = comparable(self.gallery().await?, query.len())?;
        self.matcher.best_match(&gallery, query)
    }
}

/// Keep the entries whose descriptors have length `dim`.
fn comparable(gallery: Vec<GalleryEntry>, dim: usize) -> Result<Vec<GalleryEntry>, MatchError> {
    let expected = match gallery.first() {
        Some(entry) => descriptor_len(entry),
        None => return Err(MatchError::EmptyGallery),
    };
    let kept: Vec<GalleryEntry> = gallery
        .into_iter()
        .filter(|entry| {
            let len = descriptor_len(entry);
            if len != dim {
                warn!(
                    contract = %entry.label,
                    len,
                    query = dim,
                    "skipping identity with other descriptor length"
                );
            }
            len == dim
        })
        .collect();
    if kept.is_empty() {
        return Err(MatchError::DimensionMismatch { expected, got: dim });
    }
    Ok(kept)
}

fn descriptor_len(entry: &GalleryEntry) -> usize {
    entry.embeddings.first().map_or(0, Vec::len)
}

/// Non-empty descriptors, all the same length, all finite.
fn well_formed(embeddings: &[Embedding]) -> bool {
    let Some(first) = embeddings.first() else {
        return false;
    };
    !first.is_empty()
        && embeddings
            .iter()
            .all(|e| e.len() == first.len() && e.iter().all(|x| x.is_finite()))
}
