//! Query classification against a reference database.
//!
//! This module provides the classification pipeline:
//!
//! - [`Classifier`]: Main entry point, computes distances and makes the call
//! - [`metric`]: Jaccard distance over sorted signatures
//! - [`consensus`]: Threshold walk and reconciliation of matched taxa
//!
//! ## Classification Algorithm
//!
//! 1. **Signature**: the query's k-mers are selected with the database's spec
//! 2. **Distances**: the query is compared to every reference signature in parallel
//! 3. **Ranking**: references are sorted by `(distance, index)`, so ties are
//!    reported in a stable order
//! 4. **Threshold walk**: starting at the closest genome's taxon, the first
//!    taxon in its lineage whose threshold accepts the distance is predicted
//!
//! A query that is too short, yields no k-mers, or is not close enough to
//! anything produces a result without a prediction, never an error.
//!
//! ## Example
//!
//! ```rust,no_run
//! use std::path::Path;
//! use std::sync::Arc;
//! use taxmatch::{Classifier, ClassifierConfig, LoadOptions, ReferenceDatabase};
//!
//! let db = ReferenceDatabase::open(Path::new("refseq.txm"), LoadOptions::default()).unwrap();
//! let classifier = Classifier::new(Arc::new(db), ClassifierConfig::default()).unwrap();
//!
//! let result = classifier.classify(b"ATGACGTTAGCCATGACTTAGGCA");
//! if let Some(taxon) = result.predicted_taxon {
//!     let db = classifier.database();
//!     println!("{} ({})", db.taxonomy()[taxon].name, result.confidence());
//! }
//! ```

pub mod consensus;
pub mod engine;
pub mod metric;

pub use consensus::{ClassificationResult, GenomeMatch, Neighbor, Warning};
pub use engine::{Classifier, ClassifierConfig};
