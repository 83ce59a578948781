use std::path::{Path, PathBuf};

use anyhow::Context;
use clap::Args;

use crate::cli::{taxon_name, taxon_rank, DatabaseArgs, OutputFormat};
use crate::core::taxonomy::{TaxonId, Taxonomy};
use crate::matching::consensus::ClassificationResult;
use crate::matching::engine::{Classifier, ClassifierConfig, DEFAULT_NEIGHBORS};
use crate::parsing::fasta::{read_fasta_file, total_length};

#[derive(Args)]
pub struct QueryArgs {
    /// Query genome assemblies (FASTA, optionally gzipped), one per file
    #[arg(required = true)]
    pub inputs: Vec<PathBuf>,

    #[command(flatten)]
    pub database: DatabaseArgs,

    /// Reconcile every matching reference instead of using the closest only
    #[arg(long)]
    pub strict: bool,

    /// Number of nearest references to report per query
    #[arg(short = 'n', long, default_value_t = DEFAULT_NEIGHBORS)]
    pub neighbors: usize,

    /// Worker threads for distance computation (default: all cores)
    #[arg(short = 't', long)]
    pub threads: Option<usize>,
}

/// Execute query subcommand
///
/// # Errors
///
/// Returns an error if the database or an input file cannot be read.
#[allow(clippy::needless_pass_by_value)] // CLI entry point, values from clap
pub fn run(args: QueryArgs, format: OutputFormat, verbose: bool) -> anyhow::Result<()> {
    let db = args.database.load()?;

    if verbose {
        eprintln!(
            "Loaded database {} ({} genomes, {})",
            db.info().name,
            db.signature_count(),
            db.kmer_spec()
        );
    }

    let config = ClassifierConfig {
        strict: args.strict,
        neighbors: args.neighbors,
        threads: args.threads,
    };
    let classifier = Classifier::new(db, config)?;

    let mut results = Vec::with_capacity(args.inputs.len());
    for path in &args.inputs {
        let records = read_fasta_file(path)
            .with_context(|| format!("Failed to read query {}", path.display()))?;
        if verbose {
            eprintln!(
                "Read {} contigs ({} bp) from {}",
                records.len(),
                total_length(&records),
                path.display()
            );
        }
        results.push((query_label(path), classifier.classify_contigs(&records)));
    }

    let taxonomy = classifier.database().taxonomy();
    match format {
        OutputFormat::Text => print_text(&results, taxonomy, verbose),
        OutputFormat::Json => print_json(&results, taxonomy)?,
        OutputFormat::Tsv => print_tsv(&results, taxonomy),
    }

    Ok(())
}

fn query_label(path: &Path) -> String {
    path.file_name()
        .map_or_else(|| path.display().to_string(), |n| n.to_string_lossy().to_string())
}

fn print_text(results: &[(String, ClassificationResult)], taxonomy: &Taxonomy, verbose: bool) {
    for (label, result) in results {
        println!("{label}");

        match result.predicted_taxon {
            Some(taxon) => {
                println!(
                    "  Prediction:  {} ({})",
                    taxon_name(taxonomy, Some(taxon)),
                    taxon_rank(taxonomy, Some(taxon))
                );
                println!(
                    "  Lineage:     {}",
                    taxonomy.path(taxon).format_names(taxonomy)
                );
                if result.report_taxon != Some(taxon) {
                    println!("  Reported as: {}", taxon_name(taxonomy, result.report_taxon));
                }
            }
            None => println!("  Prediction:  none"),
        }
        println!("  Confidence:  {}", result.confidence());

        if let Some(closest) = &result.closest_match {
            println!(
                "  Closest:     {} ({}), distance {:.4}",
                closest.key,
                taxon_name(taxonomy, Some(closest.taxon)),
                closest.distance
            );
        }
        if let Some(error) = &result.error {
            println!("  Error:       {error}");
        }
        for warning in &result.warnings {
            println!("  Warning:     {}", warning.describe(taxonomy));
        }

        if verbose && !result.neighbors.is_empty() {
            println!("  Neighbors:");
            for (i, n) in result.neighbors.iter().enumerate() {
                println!(
                    "    {:>3}. {:.4}  {}  {}",
                    i + 1,
                    n.distance,
                    n.key,
                    taxon_name(taxonomy, Some(n.taxon))
                );
            }
        }
        println!();
    }
}

fn print_json(results: &[(String, ClassificationResult)], taxonomy: &Taxonomy) -> anyhow::Result<()> {
    let taxon_json = |taxon: Option<TaxonId>| {
        taxon.map(|t| {
            serde_json::json!({
                "id": t,
                "name": taxon_name(taxonomy, Some(t)),
                "rank": taxon_rank(taxonomy, Some(t)),
            })
        })
    };

    let output: Vec<serde_json::Value> = results
        .iter()
        .map(|(label, r)| {
            serde_json::json!({
                "query": label,
                "success": r.success,
                "confidence": r.confidence(),
                "predicted_taxon": taxon_json(r.predicted_taxon),
                "report_taxon": taxon_json(r.report_taxon),
                "closest_match": r.closest_match,
                "primary_match": r.primary_match,
                "tied_matches": r.tied_matches,
                "neighbors": r.neighbors,
                "signature_size": r.signature_size,
                "warnings": r
                    .warnings
                    .iter()
                    .map(|w| w.describe(taxonomy))
                    .collect::<Vec<_>>(),
                "error": r.error,
            })
        })
        .collect();

    println!("{}", serde_json::to_string_pretty(&output)?);
    Ok(())
}

fn print_tsv(results: &[(String, ClassificationResult)], taxonomy: &Taxonomy) {
    println!("query\tpredicted\trank\treported\tconfidence\tclosest\tclosest_distance\tsignature_size\twarnings");
    for (label, r) in results {
        let (closest, distance) = r
            .closest_match
            .as_ref()
            .map_or((String::new(), String::new()), |m| {
                (m.key.clone(), format!("{:.6}", m.distance))
            });
        let warnings: Vec<String> = r.warnings.iter().map(ToString::to_string).collect();

        println!(
            "{}\t{}\t{}\t{}\t{}\t{}\t{}\t{}\t{}",
            label,
            taxon_name(taxonomy, r.predicted_taxon),
            taxon_rank(taxonomy, r.predicted_taxon),
            taxon_name(taxonomy, r.report_taxon),
            r.confidence(),
            closest,
            distance,
            r.signature_size,
            warnings.join("; ")
        );
    }
}
