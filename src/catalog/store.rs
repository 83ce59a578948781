use memmap2::Mmap;
use std::collections::HashMap;
use std::fs::File;
use std::path::Path;
use thiserror::Error;
use tracing::{debug, info};

use super::format::{section_checksum, DatabaseInfo, DatabaseMeta, FileHeader, SectionRanges};
use super::index::{PackedSignature, SignatureIndex};
use crate::core::signature::{KmerSpec, Signature};
use crate::core::taxonomy::{TaxonId, TaxonPath, Taxonomy};
use crate::core::types::GenomeRecord;
use crate::matching::metric::Metric;

#[derive(Error, Debug)]
pub enum DatabaseError {
    #[error("Failed to read database: {0}")]
    Io(#[from] std::io::Error),

    #[error("Corrupt database: {0}")]
    Corrupt(String),

    #[error("Unsupported database format version {found} (supported: {supported})")]
    SchemaVersion { found: u32, supported: u32 },

    #[error("Invalid database contents: {0}")]
    Build(String),
}

/// How a database file is brought into memory
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LoadOptions {
    /// Map the file instead of reading it; signatures are paged in on access
    pub mmap: bool,
    /// Verify the section checksum (reads the whole file once)
    pub verify_checksum: bool,
}

impl Default for LoadOptions {
    fn default() -> Self {
        Self {
            mmap: false,
            verify_checksum: true,
        }
    }
}

#[derive(Debug)]
enum Backing {
    Owned(Vec<u8>),
    Mapped(Mmap),
}

impl Backing {
    fn bytes(&self) -> &[u8] {
        match self {
            Backing::Owned(bytes) => bytes.as_slice(),
            Backing::Mapped(map) => &map[..],
        }
    }
}

/// A loaded, read-only reference database.
///
/// Share it between threads and classifiers through an `Arc`.
#[derive(Debug)]
pub struct ReferenceDatabase {
    backing: Backing,
    header: FileHeader,
    values: std::ops::Range<usize>,
    index: SignatureIndex,
    meta: DatabaseMeta,
    key_to_index: HashMap<String, usize>,
}

impl ReferenceDatabase {
    /// Load a database file.
    ///
    /// # Errors
    ///
    /// Returns [`DatabaseError::Io`] if the file cannot be read,
    /// [`DatabaseError::SchemaVersion`] for an unsupported format version and
    /// [`DatabaseError::Corrupt`] if any structural check fails.
    pub fn open(path: &Path, options: LoadOptions) -> Result<Self, DatabaseError> {
        let backing = if options.mmap {
            let file = File::open(path)?;
            // SAFETY: the database is treated as immutable once written; the
            // mapping is read-only and never outlives `Backing`.
            let map = unsafe { Mmap::map(&file)? };
            Backing::Mapped(map)
        } else {
            Backing::Owned(std::fs::read(path)?)
        };

        let db = Self::from_backing(backing, options)?;
        info!(
            path = %path.display(),
            genomes = db.signature_count(),
            mmap = options.mmap,
            "Loaded reference database"
        );
        Ok(db)
    }

    /// Load a database from an in-memory buffer.
    ///
    /// # Errors
    ///
    /// Same as [`ReferenceDatabase::open`], without I/O errors.
    pub fn from_bytes(bytes: Vec<u8>, options: LoadOptions) -> Result<Self, DatabaseError> {
        Self::from_backing(Backing::Owned(bytes), options)
    }

    fn from_backing(backing: Backing, options: LoadOptions) -> Result<Self, DatabaseError> {
        let bytes = backing.bytes();
        let header = FileHeader::parse(bytes)?;
        let SectionRanges {
            metadata,
            bounds,
            values,
        } = header.sections(bytes.len())?;

        if options.verify_checksum {
            let actual = section_checksum(
                &bytes[metadata.clone()],
                &bytes[bounds.clone()],
                &bytes[values.clone()],
            );
            if actual != header.checksum {
                return Err(DatabaseError::Corrupt(
                    "checksum mismatch, the file is damaged".to_string(),
                ));
            }
            debug!("Database checksum verified");
        }

        let meta = DatabaseMeta::decode(&bytes[metadata])?;
        let value_width = header.value_width as usize;
        let index = SignatureIndex::parse(&bytes[bounds], value_width, values.len() / value_width)?;
        let key_to_index = check_meta(&header, &meta, &index)?;

        debug!(
            spec = %meta.kmer_spec,
            taxa = meta.taxonomy.len(),
            values = index.total_values(),
            "Database structure validated"
        );

        Ok(Self {
            backing,
            header,
            values,
            index,
            meta,
            key_to_index,
        })
    }

    /// Number of reference signatures (one per genome)
    #[must_use]
    pub fn signature_count(&self) -> usize {
        self.index.len()
    }

    /// Zero-copy view of signature `i`.
    ///
    /// # Panics
    ///
    /// Panics if `i >= self.signature_count()`.
    #[must_use]
    pub fn signature_view(&self, i: usize) -> PackedSignature<'_> {
        let values = &self.backing.bytes()[self.values.clone()];
        PackedSignature::new(&values[self.index.byte_range(i)], self.index.value_width())
    }

    /// Owned copy of signature `i`.
    ///
    /// # Panics
    ///
    /// Panics if `i >= self.signature_count()`.
    #[must_use]
    pub fn signature_at(&self, i: usize) -> Signature {
        self.signature_view(i).to_signature()
    }

    #[must_use]
    pub fn genome(&self, i: usize) -> Option<&GenomeRecord> {
        self.meta.genomes.get(i)
    }

    #[must_use]
    pub fn genomes(&self) -> &[GenomeRecord] {
        &self.meta.genomes
    }

    /// Index of the genome with the given key
    #[must_use]
    pub fn find_genome(&self, key: &str) -> Option<usize> {
        self.key_to_index.get(key).copied()
    }

    /// Lineage of genome `i`, root first. Empty if `i` is out of range.
    #[must_use]
    pub fn taxonomy_for(&self, i: usize) -> TaxonPath {
        self.genome(i)
            .map(|g| self.meta.taxonomy.path(g.taxon))
            .unwrap_or_default()
    }

    /// Distance threshold of a taxon, if it has one
    #[must_use]
    pub fn threshold_for(&self, taxon: TaxonId) -> Option<f64> {
        self.meta.taxonomy.threshold(taxon)
    }

    #[must_use]
    pub fn taxonomy(&self) -> &Taxonomy {
        &self.meta.taxonomy
    }

    #[must_use]
    pub fn kmer_spec(&self) -> &KmerSpec {
        &self.meta.kmer_spec
    }

    #[must_use]
    pub fn metric(&self) -> Metric {
        self.meta.metric
    }

    #[must_use]
    pub fn info(&self) -> &DatabaseInfo {
        &self.meta.info
    }

    #[must_use]
    pub fn meta(&self) -> &DatabaseMeta {
        &self.meta
    }

    #[must_use]
    pub fn header(&self) -> &FileHeader {
        &self.header
    }

    /// Total number of k-mer values over all signatures
    #[must_use]
    pub fn total_values(&self) -> usize {
        self.index.total_values()
    }

    #[must_use]
    pub fn is_memory_mapped(&self) -> bool {
        matches!(self.backing, Backing::Mapped(_))
    }
}

/// Cross-check metadata against the header and index, returning the genome key lookup.
fn check_meta(
    header: &FileHeader,
    meta: &DatabaseMeta,
    index: &SignatureIndex,
) -> Result<HashMap<String, usize>, DatabaseError> {
    let corrupt = DatabaseError::Corrupt;

    meta.kmer_spec
        .validate()
        .map_err(|e| corrupt(format!("invalid k-mer spec: {e}")))?;
    if meta.kmer_spec.value_width() != header.value_width as usize {
        return Err(corrupt(format!(
            "value width {} does not match k = {}",
            header.value_width,
            meta.kmer_spec.k()
        )));
    }

    if meta.genomes.len() as u64 != header.genome_count || index.len() != meta.genomes.len() {
        return Err(corrupt(format!(
            "header declares {} genomes, metadata lists {} and the index {}",
            header.genome_count,
            meta.genomes.len(),
            index.len()
        )));
    }

    meta.taxonomy
        .validate()
        .map_err(|e| corrupt(format!("invalid taxonomy: {e}")))?;

    let mut key_to_index = HashMap::with_capacity(meta.genomes.len());
    for (i, genome) in meta.genomes.iter().enumerate() {
        if !meta.taxonomy.contains(genome.taxon) {
            return Err(corrupt(format!(
                "genome '{}' refers to unknown taxon {}",
                genome.key, genome.taxon
            )));
        }
        if key_to_index.insert(genome.key.clone(), i).is_some() {
            return Err(corrupt(format!("duplicate genome key '{}'", genome.key)));
        }
    }

    Ok(key_to_index)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::builder::DatabaseBuilder;
    use crate::catalog::format::{FORMAT_VERSION, HEADER_LEN};
    use crate::core::taxonomy::{Rank, Taxon};
    use std::io::Write;

    fn build_bytes() -> Vec<u8> {
        let mut taxonomy = Taxonomy::new();
        let genus = taxonomy
            .add(Taxon::new("Listeria", Rank::Genus).with_threshold(0.7), None)
            .unwrap();
        let species = taxonomy
            .add(
                Taxon::new("Listeria monocytogenes", Rank::Species).with_threshold(0.4),
                Some(genus),
            )
            .unwrap();

        let spec = KmerSpec::all_canonical(4).unwrap();
        let mut builder = DatabaseBuilder::new(spec, taxonomy);
        builder
            .add_genome(
                GenomeRecord::new("lm_a", species),
                Signature::from_values(vec![1, 7, 200]).unwrap(),
            )
            .unwrap();
        builder
            .add_genome(GenomeRecord::new("lm_b", species), Signature::empty())
            .unwrap();
        builder
            .add_genome(
                GenomeRecord::new("listeria_sp", genus),
                Signature::from_values(vec![3, 255]).unwrap(),
            )
            .unwrap();
        builder.to_bytes().unwrap()
    }

    #[test]
    fn test_load_and_access() {
        let db = ReferenceDatabase::from_bytes(build_bytes(), LoadOptions::default()).unwrap();

        assert_eq!(db.signature_count(), 3);
        assert_eq!(db.total_values(), 5);
        assert_eq!(db.signature_at(0).values(), &[1, 7, 200]);
        assert!(db.signature_at(1).is_empty());
        assert_eq!(db.signature_view(2).iter().collect::<Vec<_>>(), vec![3, 255]);
        assert_eq!(db.kmer_spec().k(), 4);
        assert_eq!(db.metric(), Metric::Jaccard);
        assert!(!db.is_memory_mapped());

        assert_eq!(db.find_genome("lm_b"), Some(1));
        assert_eq!(db.find_genome("nope"), None);

        let path = db.taxonomy_for(0);
        assert_eq!(
            path.format_names(db.taxonomy()),
            "Listeria; Listeria monocytogenes"
        );
        assert_eq!(db.threshold_for(path.leaf().unwrap()), Some(0.4));
        assert!(db.taxonomy_for(10).is_empty());
    }

    #[test]
    fn test_mmap_backing() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(&build_bytes()).unwrap();
        file.flush().unwrap();

        let options = LoadOptions {
            mmap: true,
            ..LoadOptions::default()
        };
        let db = ReferenceDatabase::open(file.path(), options).unwrap();
        assert!(db.is_memory_mapped());
        assert_eq!(db.signature_at(2).values(), &[3, 255]);
    }

    #[test]
    fn test_checksum_mismatch_is_corrupt() {
        let mut bytes = build_bytes();
        let last = bytes.len() - 1;
        bytes[last] ^= 0xff;

        let err = ReferenceDatabase::from_bytes(bytes.clone(), LoadOptions::default()).unwrap_err();
        assert!(matches!(err, DatabaseError::Corrupt(_)));

        // Structure is still intact, so skipping verification loads it
        let options = LoadOptions {
            verify_checksum: false,
            ..LoadOptions::default()
        };
        assert!(ReferenceDatabase::from_bytes(bytes, options).is_ok());
    }

    #[test]
    fn test_unverified_out_of_order_values() {
        let mut bytes = build_bytes();
        let values = FileHeader::parse(&bytes)
            .unwrap()
            .sections(bytes.len())
            .unwrap()
            .values;
        // One byte per value at k = 4; [1, 7, 200] becomes [7, 1, 200]
        bytes.swap(values.start, values.start + 1);

        let options = LoadOptions {
            verify_checksum: false,
            ..LoadOptions::default()
        };
        let db = ReferenceDatabase::from_bytes(bytes, options).unwrap();
        assert_eq!(db.signature_at(0).values(), &[1, 7, 200]);
        assert_eq!(db.signature_at(2).values(), &[3, 255]);
    }

    #[test]
    fn test_version_mismatch() {
        let mut bytes = build_bytes();
        bytes[8..12].copy_from_slice(&(FORMAT_VERSION + 1).to_le_bytes());
        let err = ReferenceDatabase::from_bytes(bytes, LoadOptions::default()).unwrap_err();
        assert!(matches!(err, DatabaseError::SchemaVersion { .. }));
    }

    #[test]
    fn test_truncated_file() {
        let bytes = build_bytes();
        let err = ReferenceDatabase::from_bytes(bytes[..bytes.len() - 3].to_vec(), LoadOptions::default())
            .unwrap_err();
        assert!(matches!(err, DatabaseError::Corrupt(_)));

        let err = ReferenceDatabase::from_bytes(bytes[..HEADER_LEN - 1].to_vec(), LoadOptions::default())
            .unwrap_err();
        assert!(matches!(err, DatabaseError::Corrupt(_)));
    }

    #[test]
    fn test_missing_file() {
        let err = ReferenceDatabase::open(Path::new("/nonexistent/db.txm"), LoadOptions::default())
            .unwrap_err();
        assert!(matches!(err, DatabaseError::Io(_)));
    }
}
