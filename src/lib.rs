//! # taxmatch
//!
//! A library for assigning bacterial genome assemblies to a taxon by k-mer
//! signature comparison.
//!
//! Each genome is reduced to a signature: the sorted set of k-mers that
//! follow a short selection prefix. A query signature is compared to every
//! reference signature in a database with the Jaccard distance, and the
//! closest reference decides the prediction. Each taxon carries a distance
//! threshold; the prediction is the most specific taxon in the closest
//! reference's lineage whose threshold accepts the distance.
//!
//! ## Features
//!
//! - **Strand-independent signatures**: a sequence and its reverse complement
//!   produce the same signature
//! - **Compact database**: a single checksummed binary file with random access
//!   to each reference signature, optionally memory-mapped
//! - **Parallel search**: distances are computed on a rayon pool
//! - **Ambiguity reporting**: ties and inconsistent matches are reported as
//!   warnings instead of being resolved silently
//!
//! ## Example
//!
//! ```rust
//! use std::sync::Arc;
//! use taxmatch::{
//!     Classifier, ClassifierConfig, DatabaseBuilder, GenomeRecord, KmerSpec, LoadOptions,
//!     Rank, ReferenceDatabase, Taxon, Taxonomy,
//! };
//!
//! let mut taxonomy = Taxonomy::new();
//! let genus = taxonomy.add(Taxon::new("Escherichia", Rank::Genus).with_threshold(0.8), None).unwrap();
//! let species = taxonomy
//!     .add(Taxon::new("Escherichia coli", Rank::Species).with_threshold(0.3), Some(genus))
//!     .unwrap();
//!
//! let genome = b"ATGACGTTAGCCATGACTTAGGCAATGACCCGTAGGATGACTTTACAGG";
//! let mut builder = DatabaseBuilder::new(KmerSpec::with_prefix(8, "ATGAC").unwrap(), taxonomy);
//! builder
//!     .add_genome_contigs(GenomeRecord::new("GCF_000005845", species), [&genome[..]])
//!     .unwrap();
//!
//! let db = ReferenceDatabase::from_bytes(builder.to_bytes().unwrap(), LoadOptions::default()).unwrap();
//! let classifier = Classifier::new(Arc::new(db), ClassifierConfig::default()).unwrap();
//!
//! let result = classifier.classify(genome);
//! assert_eq!(result.predicted_taxon, Some(species));
//! ```
//!
//! ## Modules
//!
//! - [`catalog`]: Reference database file format, loading and building
//! - [`core`]: K-mer coding, signatures and the taxonomy tree
//! - [`matching`]: Distance metric, classifier and consensus rules
//! - [`parsing`]: FASTA input and reference tables
//! - [`cli`]: Command-line interface implementation

pub mod catalog;
pub mod cli;
pub mod core;
pub mod matching;
pub mod parsing;
pub mod utils;

// Re-export commonly used types for convenience
pub use catalog::builder::DatabaseBuilder;
pub use catalog::format::DatabaseInfo;
pub use catalog::store::{DatabaseError, LoadOptions, ReferenceDatabase};
pub use core::signature::{
    calc_signature, calc_signature_contigs, KmerSpec, SelectionRule, SequenceError, Signature,
};
pub use core::taxonomy::{Rank, TaxonId, Taxon, Taxonomy, TaxonomyError};
pub use core::types::*;
pub use matching::consensus::{ClassificationResult, GenomeMatch, Neighbor, Warning};
pub use matching::engine::{
    CancellationToken, Classifier, ClassifierConfig, ClassifyError, QueryInput,
};
pub use matching::metric::{jaccard, jaccard_distance, Metric};
