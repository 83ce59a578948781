//! Genome signatures: the k-mer selection rule and the sorted k-mer sets it produces.
//!
//! A [`KmerSpec`] fixes the k-mer length and the content-based rule deciding
//! which k-mers enter a signature. Because selection depends only on the
//! bases of each window, and never on how many k-mers were seen before, the
//! signature of an assembly does not depend on contig order or fragmentation.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::core::kmer::{low_mask, KmerWindows, Window, MAX_WINDOW};
use crate::utils::validation::is_nucleotide_pattern;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SequenceError {
    #[error("Invalid k-mer length {0}: must be between 1 and {MAX_WINDOW}")]
    InvalidK(usize),

    #[error("Invalid selection pattern '{0}': only A, C, G and T are allowed")]
    InvalidPattern(String),

    #[error("Selection window of {0} bases exceeds the maximum of {MAX_WINDOW}")]
    WindowTooLong(usize),

    #[error("Seed pattern of length {len} at offset {offset} does not fit in k = {k}")]
    SeedOutOfRange { offset: usize, len: usize, k: usize },

    #[error("Signature values are not strictly ascending at position {0}")]
    Unsorted(usize),

    #[error("Signature value {value} out of range for k = {k}")]
    ValueOutOfRange { value: u64, k: usize },
}

/// Default k-mer length
pub const DEFAULT_K: usize = 11;

/// Default selection prefix
pub const DEFAULT_PREFIX: &str = "ATGAC";

/// Content-based rule selecting which k-mers enter a signature.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SelectionRule {
    /// Take the k bases that immediately follow an occurrence of `prefix`, on
    /// either strand. The stored value is read on the strand where the prefix
    /// was found.
    Prefix { prefix: String },

    /// Take canonical k-mers whose bases at `offset..offset + pattern.len()`
    /// spell `pattern`. An empty pattern selects every canonical k-mer.
    Seed { pattern: String, offset: u8 },
}

/// K-mer length plus selection rule. Two signatures are only comparable when
/// they were built with equal specs.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct KmerSpec {
    k: u8,
    rule: SelectionRule,
}

impl KmerSpec {
    /// Create a validated spec.
    ///
    /// # Errors
    ///
    /// Returns a [`SequenceError`] if `k` is out of range, the pattern contains
    /// anything but A/C/G/T, or the rule does not fit in a 32-base window.
    pub fn new(k: usize, rule: SelectionRule) -> Result<Self, SequenceError> {
        let k8 = u8::try_from(k).map_err(|_| SequenceError::InvalidK(k))?;
        let rule = match rule {
            SelectionRule::Prefix { prefix } => SelectionRule::Prefix {
                prefix: prefix.to_ascii_uppercase(),
            },
            SelectionRule::Seed { pattern, offset } => SelectionRule::Seed {
                pattern: pattern.to_ascii_uppercase(),
                offset,
            },
        };
        let spec = Self { k: k8, rule };
        spec.validate()?;
        Ok(spec)
    }

    /// Prefix-anchored spec.
    ///
    /// # Errors
    ///
    /// See [`KmerSpec::new`].
    pub fn with_prefix(k: usize, prefix: &str) -> Result<Self, SequenceError> {
        Self::new(
            k,
            SelectionRule::Prefix {
                prefix: prefix.to_string(),
            },
        )
    }

    /// Seed-pattern spec over canonical k-mers.
    ///
    /// # Errors
    ///
    /// See [`KmerSpec::new`].
    pub fn with_seed(k: usize, pattern: &str, offset: usize) -> Result<Self, SequenceError> {
        let offset_u8 = u8::try_from(offset).map_err(|_| SequenceError::SeedOutOfRange {
            offset,
            len: pattern.len(),
            k,
        })?;
        Self::new(
            k,
            SelectionRule::Seed {
                pattern: pattern.to_string(),
                offset: offset_u8,
            },
        )
    }

    /// Spec selecting every canonical k-mer.
    ///
    /// # Errors
    ///
    /// See [`KmerSpec::new`].
    pub fn all_canonical(k: usize) -> Result<Self, SequenceError> {
        Self::with_seed(k, "", 0)
    }

    /// Check the invariants of a spec, e.g. after deserializing one.
    ///
    /// # Errors
    ///
    /// See [`KmerSpec::new`].
    pub fn validate(&self) -> Result<(), SequenceError> {
        let k = self.k();
        if !(1..=MAX_WINDOW).contains(&k) {
            return Err(SequenceError::InvalidK(k));
        }
        match &self.rule {
            SelectionRule::Prefix { prefix } => {
                if !is_nucleotide_pattern(prefix) {
                    return Err(SequenceError::InvalidPattern(prefix.clone()));
                }
                if k + prefix.len() > MAX_WINDOW {
                    return Err(SequenceError::WindowTooLong(k + prefix.len()));
                }
            }
            SelectionRule::Seed { pattern, offset } => {
                if !is_nucleotide_pattern(pattern) {
                    return Err(SequenceError::InvalidPattern(pattern.clone()));
                }
                let offset = usize::from(*offset);
                if offset + pattern.len() > k {
                    return Err(SequenceError::SeedOutOfRange {
                        offset,
                        len: pattern.len(),
                        k,
                    });
                }
            }
        }
        Ok(())
    }

    #[must_use]
    pub fn k(&self) -> usize {
        usize::from(self.k)
    }

    #[must_use]
    pub fn rule(&self) -> &SelectionRule {
        &self.rule
    }

    /// Number of bases a sequence window must span to yield one candidate k-mer.
    #[must_use]
    pub fn window_len(&self) -> usize {
        match &self.rule {
            SelectionRule::Prefix { prefix } => self.k() + prefix.len(),
            SelectionRule::Seed { .. } => self.k(),
        }
    }

    /// Largest value a k-mer of this spec can take.
    #[must_use]
    pub fn max_value(&self) -> u64 {
        low_mask(self.k())
    }

    /// Bytes needed to store one k-mer value: `ceil(2k / 8)`.
    #[must_use]
    pub fn value_width(&self) -> usize {
        (2 * self.k()).div_ceil(8)
    }

    fn selector(&self) -> Selector {
        let k = self.k();
        // `k <= 32`, so shifts are at most 64 bits and fit in a `u32`
        #[allow(clippy::cast_possible_truncation)]
        let bits = |bases: usize| (2 * bases) as u32;
        match &self.rule {
            SelectionRule::Prefix { prefix } => Selector::Prefix {
                k_mask: low_mask(k),
                shift: bits(k),
                code: pattern_code(prefix),
            },
            SelectionRule::Seed { pattern, .. } if pattern.is_empty() => Selector::All,
            SelectionRule::Seed { pattern, offset } => Selector::Seed {
                shift: bits(k - usize::from(*offset) - pattern.len()),
                mask: low_mask(pattern.len()),
                code: pattern_code(pattern),
            },
        }
    }
}

impl Default for KmerSpec {
    fn default() -> Self {
        #[allow(clippy::cast_possible_truncation)]
        let k = DEFAULT_K as u8;
        Self {
            k,
            rule: SelectionRule::Prefix {
                prefix: DEFAULT_PREFIX.to_string(),
            },
        }
    }
}

impl std::fmt::Display for KmerSpec {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &self.rule {
            SelectionRule::Prefix { prefix } => write!(f, "k={}, prefix={prefix}", self.k),
            SelectionRule::Seed { pattern, .. } if pattern.is_empty() => {
                write!(f, "k={}, all canonical", self.k)
            }
            SelectionRule::Seed { pattern, offset } => {
                write!(f, "k={}, seed={pattern}@{offset}", self.k)
            }
        }
    }
}

/// Packed code of an already validated pattern.
fn pattern_code(pattern: &str) -> u64 {
    crate::core::kmer::encode(pattern.as_bytes()).unwrap_or(0)
}

/// Per-window selection test compiled from a [`KmerSpec`].
#[derive(Debug, Clone, Copy)]
enum Selector {
    Prefix { k_mask: u64, shift: u32, code: u64 },
    Seed { shift: u32, mask: u64, code: u64 },
    All,
}

impl Selector {
    #[inline]
    fn select(&self, window: &Window, out: &mut Vec<u64>) {
        match *self {
            Selector::Prefix { k_mask, shift, code } => {
                if window.forward.checked_shr(shift).unwrap_or(0) == code {
                    out.push(window.forward & k_mask);
                }
                if window.reverse.checked_shr(shift).unwrap_or(0) == code {
                    out.push(window.reverse & k_mask);
                }
            }
            Selector::Seed { shift, mask, code } => {
                let canonical = window.canonical();
                if (canonical >> shift) & mask == code {
                    out.push(canonical);
                }
            }
            Selector::All => out.push(window.canonical()),
        }
    }
}

/// The sorted, deduplicated set of selected k-mers of one genome.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct Signature(Vec<u64>);

impl Signature {
    #[must_use]
    pub fn empty() -> Self {
        Self(Vec::new())
    }

    /// Wrap values that must already be strictly ascending.
    ///
    /// # Errors
    ///
    /// Returns [`SequenceError::Unsorted`] at the first out-of-order position.
    pub fn from_values(values: Vec<u64>) -> Result<Self, SequenceError> {
        if let Some(i) = values.windows(2).position(|w| w[0] >= w[1]) {
            return Err(SequenceError::Unsorted(i + 1));
        }
        Ok(Self(values))
    }

    /// Sort and deduplicate arbitrary values.
    pub fn from_unsorted(values: impl IntoIterator<Item = u64>) -> Self {
        let mut values: Vec<u64> = values.into_iter().collect();
        values.sort_unstable();
        values.dedup();
        Self(values)
    }

    /// Values read back from a database file.
    ///
    /// A file opened without checksum verification may hold damaged sections,
    /// so out-of-order input is sorted and deduplicated rather than trusted.
    pub(crate) fn from_stored(mut values: Vec<u64>) -> Self {
        if values.windows(2).any(|w| w[0] >= w[1]) {
            values.sort_unstable();
            values.dedup();
        }
        Self(values)
    }

    /// Check that every value fits the k-mer length of `spec`.
    ///
    /// # Errors
    ///
    /// Returns [`SequenceError::ValueOutOfRange`] for the largest offending value.
    pub fn validate_for(&self, spec: &KmerSpec) -> Result<(), SequenceError> {
        match self.0.last() {
            Some(&value) if value > spec.max_value() => Err(SequenceError::ValueOutOfRange {
                value,
                k: spec.k(),
            }),
            _ => Ok(()),
        }
    }

    #[must_use]
    pub fn values(&self) -> &[u64] {
        &self.0
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> std::iter::Copied<std::slice::Iter<'_, u64>> {
        self.0.iter().copied()
    }

    #[must_use]
    pub fn into_inner(self) -> Vec<u64> {
        self.0
    }
}

impl AsRef<[u64]> for Signature {
    fn as_ref(&self) -> &[u64] {
        &self.0
    }
}

/// Selected values are sorted and deduplicated in place once this many accumulate.
const COMPACT_AT: usize = 1 << 22;

/// Accumulates the selected k-mers of one or more sequences (e.g. the contigs
/// of an assembly) into a single [`Signature`].
///
/// K-mers never span two sequences added separately.
#[derive(Debug, Clone)]
pub struct SignatureBuilder {
    spec: KmerSpec,
    selector: Selector,
    values: Vec<u64>,
    compact_at: usize,
    longest_sequence: usize,
}

impl SignatureBuilder {
    #[must_use]
    pub fn new(spec: &KmerSpec) -> Self {
        Self {
            spec: spec.clone(),
            selector: spec.selector(),
            values: Vec::new(),
            compact_at: COMPACT_AT,
            longest_sequence: 0,
        }
    }

    /// Scan one sequence and keep the k-mers selected by the spec.
    pub fn add_sequence(&mut self, seq: &[u8]) -> &mut Self {
        self.longest_sequence = self.longest_sequence.max(seq.len());

        for window in KmerWindows::new(seq, self.spec.window_len()) {
            self.selector.select(&window, &mut self.values);
            if self.values.len() >= self.compact_at {
                self.compact();
            }
        }
        self
    }

    fn compact(&mut self) {
        self.values.sort_unstable();
        self.values.dedup();
        self.compact_at = COMPACT_AT.max(self.values.len() * 2);
    }

    /// Length of the longest sequence added so far.
    #[must_use]
    pub fn longest_sequence(&self) -> usize {
        self.longest_sequence
    }

    #[must_use]
    pub fn spec(&self) -> &KmerSpec {
        &self.spec
    }

    #[must_use]
    pub fn finish(mut self) -> Signature {
        self.values.sort_unstable();
        self.values.dedup();
        Signature(self.values)
    }
}

/// Signature of a single sequence.
#[must_use]
pub fn calc_signature(spec: &KmerSpec, seq: &[u8]) -> Signature {
    let mut builder = SignatureBuilder::new(spec);
    builder.add_sequence(seq);
    builder.finish()
}

/// Signature of a multi-sequence assembly.
pub fn calc_signature_contigs<I, S>(spec: &KmerSpec, contigs: I) -> Signature
where
    I: IntoIterator<Item = S>,
    S: AsRef<[u8]>,
{
    let mut builder = SignatureBuilder::new(spec);
    for contig in contigs {
        builder.add_sequence(contig.as_ref());
    }
    builder.finish()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::kmer::{encode, reverse_complement};
    use crate::utils::test_utils::random_seq;

    #[test]
    fn test_default_spec() {
        let spec = KmerSpec::default();
        assert_eq!(spec.k(), 11);
        assert_eq!(spec.window_len(), 16);
        assert_eq!(spec.value_width(), 3);
        assert!(spec.validate().is_ok());
        assert_eq!(spec.to_string(), "k=11, prefix=ATGAC");
    }

    #[test]
    fn test_spec_validation() {
        assert_eq!(
            KmerSpec::with_prefix(0, "ATG"),
            Err(SequenceError::InvalidK(0))
        );
        assert_eq!(
            KmerSpec::with_prefix(30, "ATGAC"),
            Err(SequenceError::WindowTooLong(35))
        );
        assert!(matches!(
            KmerSpec::with_prefix(11, "ATGNC"),
            Err(SequenceError::InvalidPattern(_))
        ));
        assert!(matches!(
            KmerSpec::with_seed(8, "ACG", 6),
            Err(SequenceError::SeedOutOfRange { .. })
        ));
        assert!(KmerSpec::with_seed(8, "ACG", 5).is_ok());
        assert!(KmerSpec::all_canonical(32).is_ok());

        // Patterns are normalized to upper case
        let spec = KmerSpec::with_prefix(5, "atg").unwrap();
        assert_eq!(
            spec.rule(),
            &SelectionRule::Prefix {
                prefix: "ATG".to_string()
            }
        );
    }

    #[test]
    fn test_value_width() {
        assert_eq!(KmerSpec::all_canonical(4).unwrap().value_width(), 1);
        assert_eq!(KmerSpec::all_canonical(5).unwrap().value_width(), 2);
        assert_eq!(KmerSpec::all_canonical(16).unwrap().value_width(), 4);
        assert_eq!(KmerSpec::all_canonical(32).unwrap().value_width(), 8);
    }

    #[test]
    fn test_trivial_seed_acgtacgt() {
        let spec = KmerSpec::all_canonical(4).unwrap();
        let sig = calc_signature(&spec, b"ACGTACGT");

        let expected: Vec<u64> = [&b"ACGT"[..], b"CGTA", b"GTAC"]
            .iter()
            .map(|w| encode(w).unwrap())
            .collect();
        assert_eq!(sig.values(), expected.as_slice());
        assert!(sig.len() <= 4);
    }

    #[test]
    fn test_prefix_selection_both_strands() {
        let spec = KmerSpec::with_prefix(4, "ATG").unwrap();

        // Forward hit: ATG followed by CCCA
        let sig = calc_signature(&spec, b"TTATGCCCATT");
        assert!(sig.values().contains(&encode(b"CCCA").unwrap()));

        // Reverse strand hit: TGGGCAT is the reverse complement of ATGCCCA
        let sig_rc = calc_signature(&spec, b"TGGGCAT");
        assert_eq!(sig_rc.values(), &[encode(b"CCCA").unwrap()]);
    }

    #[test]
    fn test_prefix_requires_full_kmer() {
        let spec = KmerSpec::with_prefix(4, "ATG").unwrap();
        // Prefix present but fewer than k bases follow on either strand
        assert!(calc_signature(&spec, b"ATGCC").is_empty());
    }

    #[test]
    fn test_seed_selection() {
        let spec = KmerSpec::with_seed(5, "GG", 1).unwrap();
        let seq = random_seq(2_000, 7);
        let sig = calc_signature(&spec, &seq);

        assert!(!sig.is_empty());
        for &value in sig.values() {
            let bases = crate::core::kmer::decode(value, 5);
            assert_eq!(&bases[1..3], b"GG");
        }
    }

    #[test]
    fn test_signature_is_strand_independent() {
        let seq = random_seq(20_000, 42);
        let rc = reverse_complement(&seq);

        for spec in [
            KmerSpec::default(),
            KmerSpec::with_prefix(8, "ATG").unwrap(),
            KmerSpec::with_seed(9, "CA", 3).unwrap(),
            KmerSpec::all_canonical(6).unwrap(),
        ] {
            assert_eq!(
                calc_signature(&spec, &seq),
                calc_signature(&spec, &rc),
                "spec {spec}"
            );
        }
    }

    #[test]
    fn test_signature_deterministic_and_sorted() {
        let seq = random_seq(50_000, 3);
        let spec = KmerSpec::default();
        let a = calc_signature(&spec, &seq);
        let b = calc_signature(&spec, &seq);

        assert_eq!(a, b);
        assert!(a.values().windows(2).all(|w| w[0] < w[1]));
        assert!(a.validate_for(&spec).is_ok());
    }

    #[test]
    fn test_contig_order_does_not_matter() {
        let spec = KmerSpec::with_prefix(7, "AC").unwrap();
        let a = random_seq(3_000, 11);
        let b = random_seq(5_000, 12);

        let ab = calc_signature_contigs(&spec, [&a, &b]);
        let ba = calc_signature_contigs(&spec, [&b, &a]);
        assert_eq!(ab, ba);
    }

    #[test]
    fn test_no_kmers_across_contig_boundary() {
        let spec = KmerSpec::all_canonical(4).unwrap();
        let joined = calc_signature(&spec, b"AAAACCCC");
        let split = calc_signature_contigs(&spec, [&b"AAAA"[..], b"CCCC"]);

        // Only AAAA and CCCC (canonical GGGG -> CCCC) survive when split
        assert_eq!(split.len(), 2);
        assert!(joined.len() > split.len());
    }

    #[test]
    fn test_no_matching_kmers_is_empty() {
        let spec = KmerSpec::with_prefix(4, "GGGGG").unwrap();
        assert!(calc_signature(&spec, b"ATATATATATATATATATAT").is_empty());
    }

    #[test]
    fn test_builder_tracks_longest_sequence() {
        let mut builder = SignatureBuilder::new(&KmerSpec::default());
        builder.add_sequence(b"ACGT").add_sequence(b"ACGTACGTAC");
        assert_eq!(builder.longest_sequence(), 10);
    }

    #[test]
    fn test_signature_constructors() {
        assert_eq!(
            Signature::from_values(vec![1, 3, 3]),
            Err(SequenceError::Unsorted(2))
        );
        assert_eq!(
            Signature::from_unsorted([5, 1, 5, 3]).values(),
            &[1, 3, 5]
        );
        assert_eq!(Signature::from_stored(vec![1, 4, 9]).values(), &[1, 4, 9]);
        assert_eq!(Signature::from_stored(vec![9, 1, 4, 4]).values(), &[1, 4, 9]);

        let spec = KmerSpec::all_canonical(2).unwrap();
        let too_big = Signature::from_values(vec![1, 16]).unwrap();
        assert!(matches!(
            too_big.validate_for(&spec),
            Err(SequenceError::ValueOutOfRange { value: 16, k: 2 })
        ));
    }
}
