//! Shared helpers used across the library.

#[cfg(test)]
pub(crate) mod test_utils;
pub mod validation;
