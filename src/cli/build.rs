use std::path::PathBuf;

use anyhow::{bail, Context};
use clap::Args;
use rayon::prelude::*;

use crate::catalog::builder::DatabaseBuilder;
use crate::catalog::format::DatabaseInfo;
use crate::cli::OutputFormat;
use crate::core::signature::{calc_signature_contigs, KmerSpec, Signature, DEFAULT_K, DEFAULT_PREFIX};
use crate::core::types::GenomeRecord;
use crate::parsing::fasta::read_fasta_file;
use crate::parsing::tsv::{parse_genome_table_file, parse_taxonomy_file, GenomeEntry};

#[derive(Args)]
pub struct BuildArgs {
    /// Taxonomy table (TSV): name, rank, parent, threshold[, report, ncbi_id]
    #[arg(long, required = true)]
    pub taxonomy: PathBuf,

    /// Genome table (TSV): key, taxon, FASTA path[, description]
    #[arg(long, required = true)]
    pub genomes: PathBuf,

    /// Output database file
    #[arg(short, long, required = true)]
    pub output: PathBuf,

    /// Short database identifier (e.g., "refseq-bacteria")
    #[arg(long, default_value = "custom")]
    pub id: String,

    /// Display name
    #[arg(long, default_value = "Custom references")]
    pub name: String,

    /// Database version string
    #[arg(long = "db-version")]
    pub db_version: Option<String>,

    /// Description text
    #[arg(long)]
    pub description: Option<String>,

    /// K-mer length
    #[arg(short = 'k', long = "kmer", default_value_t = DEFAULT_K)]
    pub k: usize,

    /// Selection prefix preceding each k-mer
    #[arg(long, default_value = DEFAULT_PREFIX)]
    pub prefix: String,

    /// Worker threads for signature calculation (default: all cores)
    #[arg(short = 't', long)]
    pub threads: Option<usize>,

    /// Overwrite the output file if it exists
    #[arg(long)]
    pub force: bool,
}

/// Execute build subcommand
///
/// # Errors
///
/// Returns an error if a table or assembly cannot be read, a genome names an
/// unknown taxon, or the database cannot be written.
#[allow(clippy::needless_pass_by_value)] // CLI entry point, values from clap
pub fn run(args: BuildArgs, format: OutputFormat, verbose: bool) -> anyhow::Result<()> {
    if args.output.exists() && !args.force {
        bail!(
            "Output file {} already exists (use --force to overwrite)",
            args.output.display()
        );
    }

    let spec = KmerSpec::with_prefix(args.k, &args.prefix)?;
    let taxonomy = parse_taxonomy_file(&args.taxonomy)
        .with_context(|| format!("Failed to read taxonomy {}", args.taxonomy.display()))?;
    let entries = parse_genome_table_file(&args.genomes)
        .with_context(|| format!("Failed to read genome table {}", args.genomes.display()))?;

    if verbose {
        eprintln!(
            "Read {} taxa and {} genomes, using k-mer spec {spec}",
            taxonomy.len(),
            entries.len()
        );
    }

    // Resolve every taxon before the expensive part
    let mut records = Vec::with_capacity(entries.len());
    for entry in &entries {
        let Some(taxon) = taxonomy.find_by_name(&entry.taxon) else {
            bail!(
                "Genome '{}' refers to unknown taxon '{}'",
                entry.key,
                entry.taxon
            );
        };
        records.push(GenomeRecord::new(&entry.key, taxon).with_description(&entry.description));
    }

    let signatures = compute_signatures(&spec, &entries, args.threads)?;

    let mut info = DatabaseInfo::new(&args.id, &args.name);
    if let Some(version) = &args.db_version {
        info = info.with_version(version);
    }
    if let Some(description) = &args.description {
        info = info.with_description(description);
    }

    let mut builder = DatabaseBuilder::new(spec, taxonomy).with_info(info);
    let mut total_kmers = 0;
    for (record, signature) in records.into_iter().zip(signatures) {
        if verbose {
            eprintln!("{}: {} k-mers", record.key, signature.len());
        }
        total_kmers += signature.len();
        builder.add_genome(record, signature)?;
    }

    builder
        .write_to(&args.output)
        .with_context(|| format!("Failed to write database {}", args.output.display()))?;

    let output = args.output.display().to_string();
    match format {
        OutputFormat::Text => {
            println!("Built database: {output}");
            println!("   Genomes:  {}", builder.len());
            println!("   Taxa:     {}", builder.taxonomy().len());
            println!("   K-mers:   {total_kmers}");
            println!("   K-mer spec: {}", builder.spec());
        }
        OutputFormat::Json => {
            let summary = serde_json::json!({
                "output": output,
                "genome_count": builder.len(),
                "taxon_count": builder.taxonomy().len(),
                "total_kmers": total_kmers,
                "kmer_spec": builder.spec().to_string(),
            });
            println!("{}", serde_json::to_string_pretty(&summary)?);
        }
        OutputFormat::Tsv => {
            println!("output\tgenomes\ttaxa\tkmers\tkmer_spec");
            println!(
                "{output}\t{}\t{}\t{total_kmers}\t{}",
                builder.len(),
                builder.taxonomy().len(),
                builder.spec()
            );
        }
    }

    Ok(())
}

/// Signatures of all genome assemblies, in table order
fn compute_signatures(
    spec: &KmerSpec,
    entries: &[GenomeEntry],
    threads: Option<usize>,
) -> anyhow::Result<Vec<Signature>> {
    let compute = || {
        entries
            .par_iter()
            .map(|entry| {
                let contigs = read_fasta_file(&entry.fasta).with_context(|| {
                    format!("Failed to read genome {} ({})", entry.key, entry.fasta.display())
                })?;
                Ok(calc_signature_contigs(spec, &contigs))
            })
            .collect::<anyhow::Result<Vec<_>>>()
    };

    match threads {
        Some(n) => rayon::ThreadPoolBuilder::new()
            .num_threads(n)
            .build()
            .context("Failed to create thread pool")?
            .install(compute),
        None => compute(),
    }
}
