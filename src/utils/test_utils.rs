//! Fixtures for unit tests

/// Advance a xorshift64 state and return it
pub(crate) fn xorshift(state: &mut u64) -> u64 {
    *state ^= *state << 13;
    *state ^= *state >> 7;
    *state ^= *state << 17;
    *state
}

/// Deterministic pseudo-random nucleotide sequence
pub(crate) fn random_seq(len: usize, mut state: u64) -> Vec<u8> {
    (0..len)
        .map(|_| b"ACGT"[(xorshift(&mut state) % 4) as usize])
        .collect()
}
