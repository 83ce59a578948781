//! Offset index over the packed signature values.
//!
//! Signature `i` occupies values `bounds[i]..bounds[i + 1]`, so any signature
//! is located in O(1) without touching the others.

use super::store::DatabaseError;
use crate::core::signature::Signature;

/// Signature boundaries, `genome_count + 1` entries
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignatureIndex {
    bounds: Vec<u64>,
    value_width: usize,
}

impl SignatureIndex {
    /// Decode and check the bounds section.
    ///
    /// # Errors
    ///
    /// Returns [`DatabaseError::Corrupt`] unless the bounds start at zero, never
    /// decrease, and end exactly at `value_count`.
    pub fn parse(bytes: &[u8], value_width: usize, value_count: usize) -> Result<Self, DatabaseError> {
        if bytes.len() % 8 != 0 || bytes.is_empty() {
            return Err(DatabaseError::Corrupt(format!(
                "bounds section of {} bytes is malformed",
                bytes.len()
            )));
        }

        let bounds: Vec<u64> = bytes
            .chunks_exact(8)
            .map(|chunk| {
                let mut buf = [0u8; 8];
                buf.copy_from_slice(chunk);
                u64::from_le_bytes(buf)
            })
            .collect();

        if bounds[0] != 0 {
            return Err(DatabaseError::Corrupt(
                "first signature bound is not zero".to_string(),
            ));
        }
        if let Some(i) = bounds.windows(2).position(|w| w[0] > w[1]) {
            return Err(DatabaseError::Corrupt(format!(
                "signature bounds decrease at genome {i}"
            )));
        }
        let last = bounds[bounds.len() - 1];
        if usize::try_from(last).ok() != Some(value_count) {
            return Err(DatabaseError::Corrupt(format!(
                "signature bounds end at {last} but the values section holds {value_count} values"
            )));
        }

        Ok(Self {
            bounds,
            value_width,
        })
    }

    /// Bounds for a list of signature lengths, as written by the builder
    pub(crate) fn from_lengths(lengths: impl IntoIterator<Item = usize>, value_width: usize) -> Self {
        let mut bounds = vec![0u64];
        let mut total = 0u64;
        for len in lengths {
            total += len as u64;
            bounds.push(total);
        }
        Self {
            bounds,
            value_width,
        }
    }

    pub(crate) fn to_bytes(&self) -> Vec<u8> {
        self.bounds.iter().flat_map(|b| b.to_le_bytes()).collect()
    }

    /// Number of signatures
    #[must_use]
    pub fn len(&self) -> usize {
        self.bounds.len() - 1
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Total number of values across all signatures
    #[must_use]
    pub fn total_values(&self) -> usize {
        self.bounds.last().map_or(0, |&b| b as usize)
    }

    #[must_use]
    pub fn value_width(&self) -> usize {
        self.value_width
    }

    /// Byte range of signature `i` within the values section.
    ///
    /// # Panics
    ///
    /// Panics if `i >= self.len()`.
    #[must_use]
    pub fn byte_range(&self, i: usize) -> std::ops::Range<usize> {
        let start = self.bounds[i] as usize * self.value_width;
        let end = self.bounds[i + 1] as usize * self.value_width;
        start..end
    }

    /// Number of values in signature `i`
    #[must_use]
    pub fn signature_len(&self, i: usize) -> usize {
        (self.bounds[i + 1] - self.bounds[i]) as usize
    }
}

/// Zero-copy view of one stored signature
#[derive(Debug, Clone, Copy)]
pub struct PackedSignature<'a> {
    bytes: &'a [u8],
    width: usize,
}

impl<'a> PackedSignature<'a> {
    #[must_use]
    pub fn new(bytes: &'a [u8], width: usize) -> Self {
        Self { bytes, width }
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.bytes.len() / self.width
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    /// Decoded values in stored (ascending) order
    pub fn iter(&self) -> impl Iterator<Item = u64> + 'a {
        self.bytes.chunks_exact(self.width).map(|chunk| {
            chunk
                .iter()
                .rev()
                .fold(0u64, |acc, &b| (acc << 8) | u64::from(b))
        })
    }

    /// Copy the values out into an owned signature.
    #[must_use]
    pub fn to_signature(&self) -> Signature {
        Signature::from_stored(self.iter().collect())
    }
}

/// Append `values` packed as `width` little-endian bytes each.
pub(crate) fn pack_values(values: &[u64], width: usize, out: &mut Vec<u8>) {
    out.reserve(values.len() * width);
    for v in values {
        out.extend_from_slice(&v.to_le_bytes()[..width]);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_index_from_lengths() {
        let index = SignatureIndex::from_lengths([3, 0, 2], 3);
        assert_eq!(index.len(), 3);
        assert_eq!(index.total_values(), 5);
        assert_eq!(index.byte_range(0), 0..9);
        assert_eq!(index.byte_range(1), 9..9);
        assert_eq!(index.byte_range(2), 9..15);
        assert_eq!(index.signature_len(2), 2);

        let parsed = SignatureIndex::parse(&index.to_bytes(), 3, 5).unwrap();
        assert_eq!(parsed, index);
    }

    #[test]
    fn test_index_rejects_bad_bounds() {
        let bytes = |b: &[u64]| b.iter().flat_map(|v| v.to_le_bytes()).collect::<Vec<u8>>();

        assert!(SignatureIndex::parse(&bytes(&[1, 2]), 3, 2).is_err());
        assert!(SignatureIndex::parse(&bytes(&[0, 4, 2]), 3, 2).is_err());
        assert!(SignatureIndex::parse(&bytes(&[0, 2, 4]), 3, 5).is_err());
        assert!(SignatureIndex::parse(&[0u8; 7], 3, 0).is_err());
        assert!(SignatureIndex::parse(&[], 3, 0).is_err());
    }

    #[test]
    fn test_packed_signature() {
        let values = [0u64, 5, 123_456, 0x3f_ffff];
        let mut packed = Vec::new();
        pack_values(&values, 3, &mut packed);
        assert_eq!(packed.len(), 12);

        let view = PackedSignature::new(&packed, 3);
        assert_eq!(view.len(), 4);
        assert_eq!(view.iter().collect::<Vec<_>>(), values.to_vec());
        assert_eq!(view.to_signature().values(), &values);
    }
}
