//! Helpers shared by the integration test targets

/// Deterministic pseudo-random nucleotide sequence (xorshift64)
pub fn random_seq(len: usize, mut state: u64) -> Vec<u8> {
    (0..len)
        .map(|_| {
            state ^= state << 13;
            state ^= state >> 7;
            state ^= state << 17;
            b"ACGT"[(state % 4) as usize]
        })
        .collect()
}
