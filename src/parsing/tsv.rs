//! Tab-separated tables describing a reference set to build a database from.
//!
//! Taxonomy table, one taxon per line, parents before their children:
//!
//! ```text
//! name              rank     parent       threshold  report  ncbi_id
//! Escherichia       genus                 0.8
//! Escherichia coli  species  Escherichia  0.3        yes     562
//! ```
//!
//! Genome table, one assembly per line:
//!
//! ```text
//! key            taxon             fasta                description
//! GCF_000005845  Escherichia coli  genomes/k12.fna.gz   K-12 MG1655
//! ```
//!
//! Blank lines and `#` comments are skipped, and a leading header line is
//! recognised by its first field. Empty or `-` fields count as missing.

use std::path::{Path, PathBuf};

use crate::core::taxonomy::{Rank, Taxon, Taxonomy};
use crate::parsing::fasta::ParseError;

/// One row of a genome table
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GenomeEntry {
    pub key: String,
    /// Name of the taxon the genome belongs to
    pub taxon: String,
    /// Assembly FASTA, resolved against the table's directory
    pub fasta: PathBuf,
    pub description: String,
}

/// Read a taxonomy table.
///
/// # Errors
///
/// Returns `ParseError::Io` if the file cannot be read, or
/// `ParseError::InvalidFormat` for a malformed line.
pub fn parse_taxonomy_file(path: &Path) -> Result<Taxonomy, ParseError> {
    let content = std::fs::read_to_string(path)?;
    parse_taxonomy_text(&content)
}

/// Parse taxonomy table text.
///
/// # Errors
///
/// Returns `ParseError::InvalidFormat` if a line has fewer than 2 fields, a
/// name is repeated, a parent is not defined on an earlier line, a threshold
/// or flag is invalid, or the table is empty.
pub fn parse_taxonomy_text(text: &str) -> Result<Taxonomy, ParseError> {
    let mut taxonomy = Taxonomy::new();

    for (line_num, fields) in data_lines(text, "name") {
        if fields.len() < 2 {
            return Err(invalid(line_num, "fewer than 2 fields"));
        }
        let name = fields[0];
        if name.is_empty() {
            return Err(invalid(line_num, "empty taxon name"));
        }
        if taxonomy.find_by_name(name).is_some() {
            return Err(invalid(line_num, &format!("duplicate taxon '{name}'")));
        }

        let parent = match optional(&fields, 2) {
            Some(parent) => Some(taxonomy.find_by_name(parent).ok_or_else(|| {
                invalid(
                    line_num,
                    &format!("parent '{parent}' must be defined before '{name}'"),
                )
            })?),
            None => None,
        };

        let mut taxon = Taxon::new(name, Rank::parse(fields[1]));
        if let Some(value) = optional(&fields, 3) {
            let threshold: f64 = value
                .parse()
                .map_err(|_| invalid(line_num, &format!("invalid threshold '{value}'")))?;
            taxon = taxon.with_threshold(threshold);
        }
        if let Some(value) = optional(&fields, 4) {
            taxon = taxon.with_report(parse_flag(value).ok_or_else(|| {
                invalid(line_num, &format!("invalid report flag '{value}'"))
            })?);
        }
        if let Some(value) = optional(&fields, 5) {
            let ncbi_id: u32 = value
                .parse()
                .map_err(|_| invalid(line_num, &format!("invalid NCBI taxonomy ID '{value}'")))?;
            taxon = taxon.with_ncbi_id(ncbi_id);
        }

        taxonomy
            .add(taxon, parent)
            .map_err(|e| invalid(line_num, &e.to_string()))?;
    }

    if taxonomy.is_empty() {
        return Err(ParseError::InvalidFormat("no taxa found".to_string()));
    }
    Ok(taxonomy)
}

/// Read a genome table, resolving relative FASTA paths against its directory.
///
/// # Errors
///
/// Returns `ParseError::Io` if the file cannot be read, or
/// `ParseError::InvalidFormat` for a malformed line.
pub fn parse_genome_table_file(path: &Path) -> Result<Vec<GenomeEntry>, ParseError> {
    let content = std::fs::read_to_string(path)?;
    let base = path.parent().unwrap_or_else(|| Path::new(""));
    parse_genome_table_text(&content, base)
}

/// Parse genome table text.
///
/// # Errors
///
/// Returns `ParseError::InvalidFormat` if a line has fewer than 3 fields or
/// lacks a key, taxon or path, or the table is empty.
pub fn parse_genome_table_text(text: &str, base: &Path) -> Result<Vec<GenomeEntry>, ParseError> {
    let mut entries = Vec::new();

    for (line_num, fields) in data_lines(text, "key") {
        if fields.len() < 3 {
            return Err(invalid(line_num, "fewer than 3 fields"));
        }
        if fields[0].is_empty() || fields[1].is_empty() || fields[2].is_empty() {
            return Err(invalid(line_num, "key, taxon and FASTA path are required"));
        }

        entries.push(GenomeEntry {
            key: fields[0].to_string(),
            taxon: fields[1].to_string(),
            fasta: base.join(fields[2]),
            description: optional(&fields, 3).unwrap_or_default().to_string(),
        });
    }

    if entries.is_empty() {
        return Err(ParseError::InvalidFormat("no genomes found".to_string()));
    }
    Ok(entries)
}

/// Trimmed fields of each data line with its 1-based line number
fn data_lines<'a>(
    text: &'a str,
    header_field: &'a str,
) -> impl Iterator<Item = (usize, Vec<&'a str>)> + 'a {
    let mut first_data_line = true;
    text.lines()
        .enumerate()
        .filter(|(_, line)| {
            let line = line.trim();
            !line.is_empty() && !line.starts_with('#')
        })
        .filter_map(move |(i, line)| {
            let fields: Vec<&str> = line.split('\t').map(str::trim).collect();
            let is_header = first_data_line && fields[0].eq_ignore_ascii_case(header_field);
            first_data_line = false;
            (!is_header).then_some((i + 1, fields))
        })
}

fn optional<'a>(fields: &[&'a str], i: usize) -> Option<&'a str> {
    fields
        .get(i)
        .copied()
        .filter(|f| !f.is_empty() && *f != "-")
}

fn parse_flag(value: &str) -> Option<bool> {
    match value.to_lowercase().as_str() {
        "yes" | "true" | "1" => Some(true),
        "no" | "false" | "0" => Some(false),
        _ => None,
    }
}

fn invalid(line_num: usize, message: &str) -> ParseError {
    ParseError::InvalidFormat(format!("line {line_num}: {message}"))
}
