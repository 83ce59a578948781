//! Reference signature database storage and indexing.
//!
//! A database holds one signature per reference genome together with the
//! taxonomy those genomes are assigned to and the per-taxon distance
//! thresholds used for classification. It is built once, offline, and loaded
//! read-only at query time.
//!
//! ## Loading
//!
//! ```rust,no_run
//! use std::path::Path;
//! use std::sync::Arc;
//! use taxmatch::catalog::store::{LoadOptions, ReferenceDatabase};
//!
//! let db = ReferenceDatabase::open(Path::new("refseq.txm"), LoadOptions::default()).unwrap();
//! let db = Arc::new(db);
//!
//! println!("{} genomes, {}", db.signature_count(), db.kmer_spec());
//! let lineage = db.taxonomy_for(0);
//! println!("{}", lineage.format_names(db.taxonomy()));
//! ```
//!
//! ## Building
//!
//! ```rust
//! use taxmatch::catalog::builder::DatabaseBuilder;
//! use taxmatch::core::signature::KmerSpec;
//! use taxmatch::core::taxonomy::{Rank, Taxon, Taxonomy};
//! use taxmatch::core::types::GenomeRecord;
//!
//! let mut taxonomy = Taxonomy::new();
//! let species = taxonomy
//!     .add(Taxon::new("Escherichia coli", Rank::Species).with_threshold(0.3), None)
//!     .unwrap();
//!
//! let mut builder = DatabaseBuilder::new(KmerSpec::default(), taxonomy);
//! builder
//!     .add_genome_contigs(GenomeRecord::new("GCF_000005845.2", species), [b"ATGACGGTACCATGAC"])
//!     .unwrap();
//! let bytes = builder.to_bytes().unwrap();
//! assert_eq!(&bytes[..8], b"TXMSIGDB");
//! ```
//!
//! Large databases should be opened with `LoadOptions { mmap: true, .. }` so
//! signatures are paged in from disk as they are compared.

pub mod builder;
pub mod format;
pub mod index;
pub mod store;
