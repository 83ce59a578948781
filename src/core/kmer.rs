//! Nucleotide k-mer encoding and the rolling window extractor.
//!
//! Bases are packed two bits each with the first base in the most significant
//! position:
//!
//! | Base | Code |
//! |------|------|
//! | A    | 0b00 |
//! | C    | 0b01 |
//! | G    | 0b10 |
//! | T    | 0b11 |
//!
//! Because the codes follow alphabetical order, comparing two encoded k-mers
//! of the same length compares them lexicographically. The complement of a
//! code `x` is `3 - x`.

/// Longest window (in bases) whose code fits in a `u64`
pub const MAX_WINDOW: usize = 32;

/// 2-bit code of a nucleotide, or `None` for anything other than A, C, G or T.
#[inline]
#[must_use]
pub fn base_code(base: u8) -> Option<u64> {
    match base {
        b'A' | b'a' => Some(0b00),
        b'C' | b'c' => Some(0b01),
        b'G' | b'g' => Some(0b10),
        b'T' | b't' => Some(0b11),
        _ => None,
    }
}

#[inline]
fn code_base(code: u64) -> u8 {
    [b'A', b'C', b'G', b'T'][(code & 0b11) as usize]
}

/// Complement of a nucleotide, upper-cased. Ambiguous codes become `N`.
#[inline]
#[must_use]
pub fn complement(base: u8) -> u8 {
    match base {
        b'A' | b'a' => b'T',
        b'C' | b'c' => b'G',
        b'G' | b'g' => b'C',
        b'T' | b't' => b'A',
        _ => b'N',
    }
}

/// Mask covering the low `2 * bases` bits.
#[inline]
#[must_use]
pub fn low_mask(bases: usize) -> u64 {
    if bases >= MAX_WINDOW {
        u64::MAX
    } else {
        (1u64 << (2 * bases)) - 1
    }
}

/// Encode a run of bases into its packed integer form.
///
/// Returns `None` if the run is longer than [`MAX_WINDOW`] or contains a
/// non-ACGT byte.
#[must_use]
pub fn encode(bases: &[u8]) -> Option<u64> {
    if bases.len() > MAX_WINDOW {
        return None;
    }
    bases
        .iter()
        .try_fold(0u64, |acc, &b| base_code(b).map(|code| (acc << 2) | code))
}

/// Decode a packed k-mer back into upper-case bases.
#[must_use]
pub fn decode(value: u64, k: usize) -> Vec<u8> {
    (0..k)
        .map(|i| code_base(value >> (2 * (k - 1 - i))))
        .collect()
}

/// Reverse complement of a base sequence.
#[must_use]
pub fn reverse_complement(bases: &[u8]) -> Vec<u8> {
    bases.iter().rev().map(|&b| complement(b)).collect()
}

/// Reverse complement of a packed k-mer of length `k`.
#[must_use]
pub fn reverse_complement_code(value: u64, k: usize) -> u64 {
    let mut remaining = value;
    let mut rc = 0u64;
    for _ in 0..k {
        rc = (rc << 2) | (3 - (remaining & 0b11));
        remaining >>= 2;
    }
    rc
}

/// Canonical form of a packed k-mer: the smaller of it and its reverse complement.
#[inline]
#[must_use]
pub fn canonical_code(value: u64, k: usize) -> u64 {
    value.min(reverse_complement_code(value, k))
}

/// One valid window produced by [`KmerWindows`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Window {
    /// Offset of the first base of the window in the scanned sequence
    pub position: usize,
    /// Code of the window as read on the forward strand
    pub forward: u64,
    /// Code of the reverse complement of the window
    pub reverse: u64,
}

impl Window {
    /// The smaller of the two strand encodings.
    #[inline]
    #[must_use]
    pub fn canonical(&self) -> u64 {
        self.forward.min(self.reverse)
    }
}

/// Rolling extractor over every window of `width` bases made only of A, C, G, T.
///
/// Both strand encodings are updated in constant time per base. Any other
/// byte (N, IUPAC codes, gaps) resets the window so that no k-mer ever
/// contains it.
#[derive(Debug, Clone)]
pub struct KmerWindows<'a> {
    seq: &'a [u8],
    width: usize,
    pos: usize,
    filled: usize,
    forward: u64,
    reverse: u64,
    mask: u64,
    rev_shift: u32,
}

impl<'a> KmerWindows<'a> {
    /// Create an extractor over `seq`.
    ///
    /// # Panics
    ///
    /// Panics if `width` is zero or larger than [`MAX_WINDOW`].
    #[must_use]
    pub fn new(seq: &'a [u8], width: usize) -> Self {
        assert!(
            (1..=MAX_WINDOW).contains(&width),
            "window width must be between 1 and {MAX_WINDOW}, got {width}"
        );
        #[allow(clippy::cast_possible_truncation)] // width <= 32
        let rev_shift = (2 * (width - 1)) as u32;
        Self {
            seq,
            width,
            pos: 0,
            filled: 0,
            forward: 0,
            reverse: 0,
            mask: low_mask(width),
            rev_shift,
        }
    }
}

impl Iterator for KmerWindows<'_> {
    type Item = Window;

    fn next(&mut self) -> Option<Window> {
        while self.pos < self.seq.len() {
            let base = self.seq[self.pos];
            self.pos += 1;

            if let Some(code) = base_code(base) {
                self.forward = ((self.forward << 2) | code) & self.mask;
                self.reverse = (self.reverse >> 2) | ((3 - code) << self.rev_shift);
                if self.filled < self.width {
                    self.filled += 1;
                }
                if self.filled == self.width {
                    return Some(Window {
                        position: self.pos - self.width,
                        forward: self.forward,
                        reverse: self.reverse,
                    });
                }
            } else {
                self.filled = 0;
                self.forward = 0;
                self.reverse = 0;
            }
        }
        None
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let remaining = self.seq.len() - self.pos;
        let upper = if self.filled == self.width {
            remaining
        } else {
            (remaining + 1).saturating_sub(self.width - self.filled)
        };
        (0, Some(upper))
    }
}

/// Canonical codes of every valid `k`-length window of `seq`, in sequence order.
///
/// Yields nothing when `seq` is shorter than `k`.
pub fn canonical_kmers(seq: &[u8], k: usize) -> impl Iterator<Item = u64> + '_ {
    KmerWindows::new(seq, k).map(|w| w.canonical())
}
