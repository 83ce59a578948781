//! Readers for genome sequences and reference tables.
//!
//! - **FASTA files**: plain or gzip/bgzip compressed, one assembly per file
//! - **TSV tables**: taxonomy and genome lists for building a database
//!
//! ## Example
//!
//! ```rust,no_run
//! use taxmatch::parsing::fasta::read_fasta_file;
//! use std::path::Path;
//!
//! let contigs = read_fasta_file(Path::new("assembly.fna.gz")).unwrap();
//! for contig in &contigs {
//!     println!("{}\t{}", contig.name, contig.sequence.len());
//! }
//! ```

pub mod fasta;
pub mod tsv;
