//! Command-line interface for taxmatch.
//!
//! This module implements the CLI using clap. Available commands:
//!
//! - **query**: Classify genome assemblies against a reference database
//! - **dist**: Compute signature distances between assemblies
//! - **info**: Show reference database metadata
//! - **build**: Create a reference database from assemblies and a taxonomy
//!
//! ## Usage
//!
//! ```text
//! # Classify assemblies
//! taxmatch query --db refseq.txm sample1.fna sample2.fna.gz
//!
//! # Database from the environment, JSON output for scripting
//! TAXMATCH_DB=refseq.txm taxmatch query sample.fna --format json
//!
//! # Reconcile all matching references instead of the closest only
//! taxmatch query --db refseq.txm --strict sample.fna
//!
//! # Distance between two assemblies
//! taxmatch dist a.fna b.fna
//!
//! # Distance matrix of queries against references
//! taxmatch dist --query q1.fna q2.fna --ref r1.fna r2.fna r3.fna --format tsv
//!
//! # Build a database from reference tables
//! taxmatch build --taxonomy taxa.tsv --genomes genomes.tsv -o refs.txm
//! ```

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use clap::{Parser, Subcommand};

use crate::catalog::store::{LoadOptions, ReferenceDatabase};
use crate::core::taxonomy::{TaxonId, Taxonomy};

pub mod build;
pub mod dist;
pub mod info;
pub mod query;

#[derive(Parser)]
#[command(name = "taxmatch")]
#[command(version)]
#[command(about = "Taxonomic classification of bacterial genome assemblies")]
#[command(
    long_about = "taxmatch identifies the taxonomic origin of a genome assembly by comparing its k-mer signature against a database of reference signatures.\n\nThe closest references determine the prediction, which is generalized up the taxonomy until a distance threshold accepts the match."
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Enable verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Output format
    #[arg(short, long, global = true, default_value = "text")]
    pub format: OutputFormat,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Classify genome assemblies
    Query(query::QueryArgs),

    /// Distances between genome assemblies
    Dist(dist::DistArgs),

    /// Show reference database information
    Info(info::InfoArgs),

    /// Build a reference database
    Build(build::BuildArgs),
}

#[derive(Clone, Copy, Debug, clap::ValueEnum)]
pub enum OutputFormat {
    Text,
    Json,
    Tsv,
}

/// Options for locating and loading the reference database
#[derive(clap::Args, Debug, Clone)]
pub struct DatabaseArgs {
    /// Reference database file
    #[arg(short, long, env = "TAXMATCH_DB")]
    pub db: PathBuf,

    /// Memory-map the database instead of reading it into memory
    #[arg(long)]
    pub mmap: bool,

    /// Skip checksum verification when loading the database
    #[arg(long)]
    pub no_verify: bool,
}

impl DatabaseArgs {
    #[must_use]
    pub fn load_options(&self) -> LoadOptions {
        LoadOptions {
            mmap: self.mmap,
            verify_checksum: !self.no_verify,
        }
    }

    /// Load the database named on the command line.
    ///
    /// # Errors
    ///
    /// Returns an error if the database cannot be read or fails validation.
    pub fn load(&self) -> anyhow::Result<Arc<ReferenceDatabase>> {
        let db = ReferenceDatabase::open(&self.db, self.load_options())
            .with_context(|| format!("Failed to load database {}", self.db.display()))?;
        Ok(Arc::new(db))
    }
}

/// Taxon name, or an empty string when there is none
pub(crate) fn taxon_name(taxonomy: &Taxonomy, taxon: Option<TaxonId>) -> &str {
    taxon
        .and_then(|t| taxonomy.get(t))
        .map_or("", |t| t.name.as_str())
}

/// Taxon rank, or an empty string when there is none
pub(crate) fn taxon_rank(taxonomy: &Taxonomy, taxon: Option<TaxonId>) -> String {
    taxon
        .and_then(|t| taxonomy.get(t))
        .map_or_else(String::new, |t| t.rank.to_string())
}
