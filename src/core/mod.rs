//! Core data types for genome signatures and taxonomy.
//!
//! This module provides the building blocks used throughout the library:
//!
//! - [`kmer`]: 2-bit nucleotide encoding and the rolling k-mer extractor
//! - [`signature`]: [`KmerSpec`](signature::KmerSpec) selection rules and sorted
//!   [`Signature`](signature::Signature) sets
//! - [`taxonomy`]: the arena-backed [`Taxonomy`](taxonomy::Taxonomy) tree with
//!   per-taxon distance thresholds
//! - [`types`]: [`GenomeRecord`](types::GenomeRecord) and
//!   [`Confidence`](types::Confidence)
//!
//! ## Signatures
//!
//! A signature is the sorted, deduplicated set of k-mers selected from a
//! genome. With the default spec (`k = 11`, prefix `ATGAC`) a typical
//! bacterial genome yields a few thousand values, independent of how the
//! assembly is fragmented or ordered.

pub mod kmer;
pub mod signature;
pub mod taxonomy;
pub mod types;
