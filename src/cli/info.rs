use clap::Args;

use crate::catalog::format::checksum_hex;
use crate::catalog::store::ReferenceDatabase;
use crate::cli::{DatabaseArgs, OutputFormat};

#[derive(Args)]
pub struct InfoArgs {
    #[command(flatten)]
    pub database: DatabaseArgs,

    /// Also list every reference genome with its lineage
    #[arg(long)]
    pub genomes: bool,
}

/// Execute info subcommand
///
/// # Errors
///
/// Returns an error if the database cannot be loaded.
#[allow(clippy::needless_pass_by_value)] // CLI entry point, values from clap
pub fn run(args: InfoArgs, format: OutputFormat, _verbose: bool) -> anyhow::Result<()> {
    let db = args.database.load()?;

    match format {
        OutputFormat::Text => print_text(&db, args.genomes),
        OutputFormat::Json => print_json(&db, args.genomes)?,
        OutputFormat::Tsv => print_tsv(&db, args.genomes),
    }

    Ok(())
}

fn print_text(db: &ReferenceDatabase, genomes: bool) {
    let info = db.info();
    println!("Database:     {} ({})", info.name, info.id);
    println!("Version:      {}", info.version);
    if !info.description.is_empty() {
        println!("Description:  {}", info.description);
    }
    println!("Created:      {}", info.created_at);
    println!("K-mer spec:   {}", db.kmer_spec());
    println!("Metric:       {}", db.metric());
    println!("Genomes:      {}", db.signature_count());
    println!("Taxa:         {}", db.taxonomy().len());
    println!("K-mers:       {}", db.total_values());
    println!("Format:       v{}", db.header().version);
    println!("Checksum:     {}", checksum_hex(&db.header().checksum));

    if genomes {
        println!();
        for (i, genome) in db.genomes().iter().enumerate() {
            println!(
                "{}\t{}\t{}",
                genome.key,
                db.signature_view(i).len(),
                db.taxonomy_for(i).format_names(db.taxonomy())
            );
        }
    }
}

fn print_json(db: &ReferenceDatabase, genomes: bool) -> anyhow::Result<()> {
    let mut output = serde_json::json!({
        "info": db.info(),
        "kmer_spec": db.kmer_spec(),
        "metric": db.metric(),
        "genome_count": db.signature_count(),
        "taxon_count": db.taxonomy().len(),
        "total_kmers": db.total_values(),
        "format_version": db.header().version,
        "checksum": checksum_hex(&db.header().checksum),
    });

    if genomes {
        let list: Vec<serde_json::Value> = db
            .genomes()
            .iter()
            .enumerate()
            .map(|(i, g)| {
                serde_json::json!({
                    "key": g.key,
                    "description": g.description,
                    "ncbi_id": g.ncbi_id,
                    "signature_size": db.signature_view(i).len(),
                    "lineage": db.taxonomy_for(i).format_names(db.taxonomy()),
                })
            })
            .collect();
        output["genomes"] = serde_json::Value::Array(list);
    }

    println!("{}", serde_json::to_string_pretty(&output)?);
    Ok(())
}

fn print_tsv(db: &ReferenceDatabase, genomes: bool) {
    if genomes {
        println!("key\tdescription\tsignature_size\tlineage");
        for (i, g) in db.genomes().iter().enumerate() {
            println!(
                "{}\t{}\t{}\t{}",
                g.key,
                g.description,
                db.signature_view(i).len(),
                db.taxonomy_for(i).format_names(db.taxonomy())
            );
        }
    } else {
        println!("id\tname\tversion\tkmer_spec\tgenomes\ttaxa\tkmers");
        let info = db.info();
        println!(
            "{}\t{}\t{}\t{}\t{}\t{}\t{}",
            info.id,
            info.name,
            info.version,
            db.kmer_spec(),
            db.signature_count(),
            db.taxonomy().len(),
            db.total_values()
        );
    }
}
