//! Centralized validation and helper functions.

/// Maximum number of contigs accepted for a single query assembly (DOS protection)
pub const MAX_CONTIGS: usize = 100_000;

/// Check whether a string is a non-ambiguous nucleotide pattern (A, C, G, T only).
///
/// The empty string is a valid pattern.
///
/// # Examples
///
/// ```
/// use taxmatch::utils::validation::is_nucleotide_pattern;
///
/// assert!(is_nucleotide_pattern("ATGAC"));
/// assert!(is_nucleotide_pattern("acgt"));
/// assert!(is_nucleotide_pattern(""));
/// assert!(!is_nucleotide_pattern("ATGNC"));
/// ```
#[must_use]
pub fn is_nucleotide_pattern(s: &str) -> bool {
    s.bytes()
        .all(|b| matches!(b.to_ascii_uppercase(), b'A' | b'C' | b'G' | b'T'))
}

/// Check whether a value is usable as a distance or distance threshold.
///
/// # Examples
///
/// ```
/// use taxmatch::utils::validation::is_valid_distance;
///
/// assert!(is_valid_distance(0.0));
/// assert!(is_valid_distance(0.35));
/// assert!(!is_valid_distance(1.5));
/// assert!(!is_valid_distance(f64::NAN));
/// ```
#[must_use]
pub fn is_valid_distance(value: f64) -> bool {
    (0.0..=1.0).contains(&value)
}

/// Check if adding another contig would exceed the maximum allowed.
///
/// Call this with the current count BEFORE adding a new contig.
/// Returns an error message if adding would exceed the limit, None if safe to add.
#[must_use]
pub fn check_contig_limit(count: usize) -> Option<String> {
    if count >= MAX_CONTIGS {
        Some(format!(
            "Too many contigs: adding another would exceed maximum of {MAX_CONTIGS}"
        ))
    } else {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_nucleotide_pattern() {
        assert!(is_nucleotide_pattern("GATTACA"));
        assert!(!is_nucleotide_pattern("GATTACA "));
        assert!(!is_nucleotide_pattern("RYKM"));
    }

    #[test]
    fn test_valid_distance() {
        assert!(is_valid_distance(1.0));
        assert!(!is_valid_distance(-0.01));
        assert!(!is_valid_distance(f64::INFINITY));
    }

    #[test]
    fn test_check_contig_limit() {
        assert!(check_contig_limit(0).is_none());
        assert!(check_contig_limit(MAX_CONTIGS - 1).is_none());
        assert!(check_contig_limit(MAX_CONTIGS).is_some());
    }
}
