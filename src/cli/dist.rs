use std::path::{Path, PathBuf};

use anyhow::{bail, Context};
use clap::Args;
use rayon::prelude::*;

use crate::catalog::store::{LoadOptions, ReferenceDatabase};
use crate::cli::OutputFormat;
use crate::core::signature::{
    calc_signature_contigs, KmerSpec, Signature, DEFAULT_K, DEFAULT_PREFIX,
};
use crate::matching::metric::jaccard_counts;
use crate::parsing::fasta::read_fasta_file;

#[derive(Args)]
pub struct DistArgs {
    /// Genome assemblies (FASTA, optionally gzipped). Two files give their
    /// pairwise distance, more give the all-vs-all matrix.
    #[arg(required_unless_present = "queries", conflicts_with_all = ["queries", "refs"])]
    pub inputs: Vec<PathBuf>,

    /// Query assemblies, the rows of the distance matrix
    #[arg(long = "query", num_args = 1.., requires = "refs")]
    pub queries: Vec<PathBuf>,

    /// Reference assemblies, the columns of the distance matrix
    #[arg(long = "ref", num_args = 1.., requires = "queries")]
    pub refs: Vec<PathBuf>,

    /// Take the k-mer spec from this database instead of --kmer/--prefix
    #[arg(long)]
    pub db: Option<PathBuf>,

    /// K-mer length
    #[arg(short = 'k', long = "kmer", default_value_t = DEFAULT_K)]
    pub k: usize,

    /// Selection prefix preceding each k-mer
    #[arg(long, default_value = DEFAULT_PREFIX)]
    pub prefix: String,
}

impl DistArgs {
    fn kmer_spec(&self) -> anyhow::Result<KmerSpec> {
        match &self.db {
            Some(path) => {
                let db = ReferenceDatabase::open(path, LoadOptions::default())
                    .with_context(|| format!("Failed to load database {}", path.display()))?;
                Ok(db.kmer_spec().clone())
            }
            None => Ok(KmerSpec::with_prefix(self.k, &self.prefix)?),
        }
    }
}

/// Distances of every query against every reference
struct DistanceMatrix {
    queries: Vec<PathBuf>,
    refs: Vec<PathBuf>,
    /// One row per query
    distances: Vec<Vec<f64>>,
}

/// Execute dist subcommand
///
/// # Errors
///
/// Returns an error if an input cannot be read or the k-mer options are invalid.
#[allow(clippy::needless_pass_by_value)] // CLI entry point, values from clap
pub fn run(args: DistArgs, format: OutputFormat, verbose: bool) -> anyhow::Result<()> {
    let spec = args.kmer_spec()?;
    if verbose {
        eprintln!("Using k-mer spec: {spec}");
    }

    if args.queries.is_empty() {
        match args.inputs.as_slice() {
            [a, b] => run_pair(&spec, a, b, format),
            [_] => bail!("dist needs at least two assemblies"),
            inputs => {
                let matrix = compute_matrix(&spec, inputs, inputs)?;
                print_matrix(&matrix, &spec, format)
            }
        }
    } else {
        let matrix = compute_matrix(&spec, &args.queries, &args.refs)?;
        print_matrix(&matrix, &spec, format)
    }
}

fn load_signature(spec: &KmerSpec, path: &Path) -> anyhow::Result<Signature> {
    let records =
        read_fasta_file(path).with_context(|| format!("Failed to read {}", path.display()))?;
    Ok(calc_signature_contigs(spec, &records))
}

fn run_pair(spec: &KmerSpec, input_a: &Path, input_b: &Path, format: OutputFormat) -> anyhow::Result<()> {
    let sig_a = load_signature(spec, input_a)?;
    let sig_b = load_signature(spec, input_b)?;

    let counts = jaccard_counts(sig_a.iter(), sig_b.iter());
    let distance = counts.distance();

    match format {
        OutputFormat::Text => {
            println!("A: {} ({} k-mers)", input_a.display(), sig_a.len());
            println!("B: {} ({} k-mers)", input_b.display(), sig_b.len());
            println!("Shared k-mers: {} of {}", counts.intersection, counts.union);
            println!("Distance: {distance:.6}");
        }
        OutputFormat::Json => {
            let output = serde_json::json!({
                "input_a": input_a.display().to_string(),
                "input_b": input_b.display().to_string(),
                "kmer_spec": spec.to_string(),
                "size_a": sig_a.len(),
                "size_b": sig_b.len(),
                "intersection": counts.intersection,
                "union": counts.union,
                "distance": distance,
            });
            println!("{}", serde_json::to_string_pretty(&output)?);
        }
        OutputFormat::Tsv => {
            println!("input_a\tinput_b\tsize_a\tsize_b\tintersection\tunion\tdistance");
            println!(
                "{}\t{}\t{}\t{}\t{}\t{}\t{:.6}",
                input_a.display(),
                input_b.display(),
                sig_a.len(),
                sig_b.len(),
                counts.intersection,
                counts.union,
                distance
            );
        }
    }

    Ok(())
}

fn compute_matrix(
    spec: &KmerSpec,
    queries: &[PathBuf],
    refs: &[PathBuf],
) -> anyhow::Result<DistanceMatrix> {
    // Each distinct file is read once even when it is both a query and a reference
    let mut paths: Vec<&PathBuf> = Vec::new();
    for path in queries.iter().chain(refs) {
        if !paths.contains(&path) {
            paths.push(path);
        }
    }
    let signatures = paths
        .par_iter()
        .map(|path| load_signature(spec, path))
        .collect::<anyhow::Result<Vec<_>>>()?;
    let signature_of = |path: &PathBuf| {
        let i = paths.iter().position(|&p| p == path).unwrap_or_default();
        &signatures[i]
    };

    let ref_signatures: Vec<&Signature> = refs.iter().map(signature_of).collect();
    let distances: Vec<Vec<f64>> = queries
        .par_iter()
        .map(|query| {
            let query = signature_of(query);
            ref_signatures
                .iter()
                .map(|r| jaccard_counts(query.iter(), r.iter()).distance())
                .collect::<Vec<f64>>()
        })
        .collect();

    Ok(DistanceMatrix {
        queries: queries.to_vec(),
        refs: refs.to_vec(),
        distances,
    })
}

fn print_matrix(matrix: &DistanceMatrix, spec: &KmerSpec, format: OutputFormat) -> anyhow::Result<()> {
    match format {
        OutputFormat::Text => {
            println!(
                "Distances ({spec}): {} queries x {} references",
                matrix.queries.len(),
                matrix.refs.len()
            );
            for (j, r) in matrix.refs.iter().enumerate() {
                println!("  [{}] {}", j + 1, r.display());
            }
            println!();
            let header: Vec<String> = (1..=matrix.refs.len()).map(|j| format!("{j:>8}")).collect();
            println!("{:<24}{}", "query", header.join(""));
            for (query, row) in matrix.queries.iter().zip(&matrix.distances) {
                let cells: Vec<String> = row.iter().map(|d| format!("{d:>8.4}")).collect();
                println!("{:<24}{}", query.display().to_string(), cells.join(""));
            }
        }
        OutputFormat::Json => {
            let output = serde_json::json!({
                "kmer_spec": spec.to_string(),
                "queries": matrix.queries.iter().map(|p| p.display().to_string()).collect::<Vec<_>>(),
                "refs": matrix.refs.iter().map(|p| p.display().to_string()).collect::<Vec<_>>(),
                "distances": matrix.distances,
            });
            println!("{}", serde_json::to_string_pretty(&output)?);
        }
        OutputFormat::Tsv => {
            let header: Vec<String> = matrix.refs.iter().map(|p| p.display().to_string()).collect();
            println!("query\t{}", header.join("\t"));
            for (query, row) in matrix.queries.iter().zip(&matrix.distances) {
                let cells: Vec<String> = row.iter().map(|d| format!("{d:.6}")).collect();
                println!("{}\t{}", query.display(), cells.join("\t"));
            }
        }
    }

    Ok(())
}
