//! Distance between two signatures.
//!
//! Signatures are sorted ascending, so the intersection size is found with a
//! single merge scan and no allocation.

use serde::{Deserialize, Serialize};
use std::cmp::Ordering;

/// Safely convert usize to f64 for ratio calculations
///
/// Signature sizes are far below 2^52, so the conversion is exact in practice.
#[inline]
pub(crate) fn count_to_f64(count: usize) -> f64 {
    #[allow(clippy::cast_precision_loss)]
    {
        count as f64
    }
}

/// Sizes of the intersection and union of two sets
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct JaccardCounts {
    pub intersection: usize,
    pub union: usize,
}

impl JaccardCounts {
    /// |A ∩ B| / |A ∪ B|, or 0 when both sets are empty
    #[must_use]
    pub fn similarity(&self) -> f64 {
        if self.union == 0 {
            0.0
        } else {
            count_to_f64(self.intersection) / count_to_f64(self.union)
        }
    }

    /// 1 - similarity. Two empty sets are maximally distant.
    #[must_use]
    pub fn distance(&self) -> f64 {
        1.0 - self.similarity()
    }
}

/// Count intersection and union of two strictly ascending sequences.
///
/// Both inputs must be sorted and free of duplicates; the result is
/// meaningless otherwise.
pub fn jaccard_counts<A, B>(a: A, b: B) -> JaccardCounts
where
    A: IntoIterator<Item = u64>,
    B: IntoIterator<Item = u64>,
{
    let mut a = a.into_iter();
    let mut b = b.into_iter();
    let mut next_a = a.next();
    let mut next_b = b.next();
    let mut counts = JaccardCounts::default();

    loop {
        match (next_a, next_b) {
            (Some(x), Some(y)) => {
                counts.union += 1;
                match x.cmp(&y) {
                    Ordering::Less => next_a = a.next(),
                    Ordering::Greater => next_b = b.next(),
                    Ordering::Equal => {
                        counts.intersection += 1;
                        next_a = a.next();
                        next_b = b.next();
                    }
                }
            }
            (Some(_), None) => {
                counts.union += 1 + a.by_ref().count();
                break;
            }
            (None, Some(_)) => {
                counts.union += 1 + b.by_ref().count();
                break;
            }
            (None, None) => break,
        }
    }

    counts
}

/// Jaccard similarity of two sorted sets
///
/// # Examples
///
/// ```
/// use taxmatch::matching::metric::jaccard;
///
/// assert_eq!(jaccard(&[1, 2, 3], &[2, 3, 4]), 0.5);
/// assert_eq!(jaccard(&[], &[]), 0.0);
/// ```
#[must_use]
pub fn jaccard(a: &[u64], b: &[u64]) -> f64 {
    jaccard_counts(a.iter().copied(), b.iter().copied()).similarity()
}

/// Jaccard distance of two sorted sets, always within `[0, 1]`
///
/// # Examples
///
/// ```
/// use taxmatch::matching::metric::jaccard_distance;
///
/// assert_eq!(jaccard_distance(&[5, 9], &[5, 9]), 0.0);
/// assert_eq!(jaccard_distance(&[], &[]), 1.0);
/// ```
#[must_use]
pub fn jaccard_distance(a: &[u64], b: &[u64]) -> f64 {
    jaccard_counts(a.iter().copied(), b.iter().copied()).distance()
}

/// Distance metric recorded in a reference database
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Metric {
    #[default]
    Jaccard,
}

impl Metric {
    /// Distance between two sorted sets under this metric
    pub fn distance<A, B>(self, a: A, b: B) -> f64
    where
        A: IntoIterator<Item = u64>,
        B: IntoIterator<Item = u64>,
    {
        match self {
            Self::Jaccard => jaccard_counts(a, b).distance(),
        }
    }
}

impl std::fmt::Display for Metric {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Jaccard => write!(f, "jaccard"),
        }
    }
}
