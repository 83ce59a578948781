//! FASTA reader using noodles.
//!
//! Loads every record of a genome assembly into memory. Gzip and bgzip input
//! is recognised by its magic bytes, so the file extension does not matter.

use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;

use flate2::bufread::MultiGzDecoder;
use noodles::fasta;
use thiserror::Error;

use crate::utils::validation::{check_contig_limit, MAX_CONTIGS};

/// Leading bytes of every gzip member
const GZIP_MAGIC: [u8; 2] = [0x1f, 0x8b];

#[derive(Error, Debug)]
pub enum ParseError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid FASTA input: {0}")]
    InvalidFormat(String),

    #[error("Malformed FASTA record {record}: {message}")]
    Noodles { record: usize, message: String },

    #[error("Assembly has more than {} contigs", MAX_CONTIGS)]
    TooManyContigs,
}

/// One FASTA record
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SequenceRecord {
    /// Record name, up to the first whitespace of the definition line
    pub name: String,
    pub sequence: Vec<u8>,
}

impl AsRef<[u8]> for SequenceRecord {
    fn as_ref(&self) -> &[u8] {
        &self.sequence
    }
}

/// Read all records of a FASTA file, decompressing gzip/bgzip input.
///
/// # Errors
///
/// Returns `ParseError::Io` if the file cannot be read, `ParseError::Noodles`
/// for a malformed record, `ParseError::InvalidFormat` if there are no records,
/// or `ParseError::TooManyContigs` past [`MAX_CONTIGS`].
pub fn read_fasta_file(path: &Path) -> Result<Vec<SequenceRecord>, ParseError> {
    let mut reader = BufReader::new(File::open(path)?);
    if reader.fill_buf()?.starts_with(&GZIP_MAGIC) {
        // bgzip is a series of gzip members
        read_fasta(BufReader::new(MultiGzDecoder::new(reader)))
    } else {
        read_fasta(reader)
    }
}

/// Read all records from uncompressed FASTA text.
///
/// # Errors
///
/// Same as [`read_fasta_file`].
pub fn read_fasta<R: BufRead>(reader: R) -> Result<Vec<SequenceRecord>, ParseError> {
    let mut records = Vec::new();

    for (i, result) in fasta::io::Reader::new(reader).records().enumerate() {
        let record = result.map_err(|e| ParseError::Noodles {
            record: i + 1,
            message: e.to_string(),
        })?;
        if check_contig_limit(records.len()).is_some() {
            return Err(ParseError::TooManyContigs);
        }

        records.push(SequenceRecord {
            name: String::from_utf8_lossy(record.name()).into_owned(),
            sequence: record.sequence().as_ref().to_vec(),
        });
    }

    if records.is_empty() {
        return Err(ParseError::InvalidFormat("no sequence records".to_string()));
    }
    Ok(records)
}

/// Total number of bases over all records
#[must_use]
pub fn total_length(records: &[SequenceRecord]) -> usize {
    records.iter().map(|r| r.sequence.len()).sum()
}

#[cfg(test)]
mod tests {
    use super::*;
    use flate2::write::GzEncoder;
    use flate2::Compression;
    use std::io::Write;

    fn temp_file(name: &str, content: &[u8]) -> (tempfile::TempDir, std::path::PathBuf) {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(name);
        std::fs::write(&path, content).unwrap();
        (dir, path)
    }

    #[test]
    fn test_read_multi_record() {
        let (_dir, path) = temp_file(
            "assembly.fna",
            b">contig_1 len=12\nACGTACGT\nacgt\n>contig_2\nGGNG\n",
        );

        let records = read_fasta_file(&path).unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].name, "contig_1");
        assert_eq!(records[0].sequence, b"ACGTACGTacgt".to_vec());
        assert_eq!(records[1].name, "contig_2");
        assert_eq!(records[1].sequence, b"GGNG".to_vec());
        assert_eq!(total_length(&records), 16);
    }

    #[test]
    fn test_gzip_detected_by_content() {
        let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
        encoder.write_all(b">seq\nATGACATGAC\n").unwrap();
        let compressed = encoder.finish().unwrap();

        // No .gz extension
        let (_dir, path) = temp_file("assembly.fa", &compressed);
        let records = read_fasta_file(&path).unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].sequence, b"ATGACATGAC".to_vec());
    }

    #[test]
    fn test_concatenated_gzip_members() {
        let mut data = Vec::new();
        for chunk in [&b">a\nACGT\n"[..], &b">b\nTTGA\n"[..]] {
            let mut encoder = GzEncoder::new(Vec::new(), Compression::fast());
            encoder.write_all(chunk).unwrap();
            data.extend(encoder.finish().unwrap());
        }

        let (_dir, path) = temp_file("assembly.fa.bgz", &data);
        let names: Vec<String> = read_fasta_file(&path)
            .unwrap()
            .into_iter()
            .map(|r| r.name)
            .collect();
        assert_eq!(names, vec!["a", "b"]);
    }

    #[test]
    fn test_empty_input() {
        let (_dir, path) = temp_file("empty.fa", b"");
        assert!(matches!(
            read_fasta_file(&path),
            Err(ParseError::InvalidFormat(_))
        ));
    }

    #[test]
    fn test_missing_file() {
        assert!(matches!(
            read_fasta_file(Path::new("/nonexistent/genome.fa")),
            Err(ParseError::Io(_))
        ));
    }
}
