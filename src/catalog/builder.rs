//! Offline construction of reference databases.
//!
//! The `DatabaseBuilder` collects a taxonomy and `(GenomeRecord, Signature)`
//! pairs, checks that they are consistent, and serializes them in the layout
//! described in [`format`](super::format).

use std::collections::HashSet;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;
use tracing::debug;

use super::format::{section_checksum, DatabaseInfo, DatabaseMeta, FileHeader, FORMAT_VERSION};
use super::index::{pack_values, SignatureIndex};
use super::store::DatabaseError;
use crate::core::signature::{KmerSpec, Signature, SignatureBuilder};
use crate::core::taxonomy::Taxonomy;
use crate::core::types::GenomeRecord;
use crate::matching::metric::Metric;

/// Collects genomes and writes a reference database file
#[derive(Debug, Clone)]
pub struct DatabaseBuilder {
    info: DatabaseInfo,
    spec: KmerSpec,
    metric: Metric,
    taxonomy: Taxonomy,
    genomes: Vec<GenomeRecord>,
    signatures: Vec<Signature>,
    keys: HashSet<String>,
}

impl DatabaseBuilder {
    /// Start a database for signatures built with `spec`, classified against `taxonomy`.
    #[must_use]
    pub fn new(spec: KmerSpec, taxonomy: Taxonomy) -> Self {
        Self {
            info: DatabaseInfo::default(),
            spec,
            metric: Metric::default(),
            taxonomy,
            genomes: Vec::new(),
            signatures: Vec::new(),
            keys: HashSet::new(),
        }
    }

    #[must_use]
    pub fn with_info(mut self, info: DatabaseInfo) -> Self {
        self.info = info;
        self
    }

    #[must_use]
    pub fn with_metric(mut self, metric: Metric) -> Self {
        self.metric = metric;
        self
    }

    #[must_use]
    pub fn spec(&self) -> &KmerSpec {
        &self.spec
    }

    #[must_use]
    pub fn taxonomy(&self) -> &Taxonomy {
        &self.taxonomy
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.genomes.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.genomes.is_empty()
    }

    /// Add a genome with a precomputed signature and return its index.
    ///
    /// # Errors
    ///
    /// Returns [`DatabaseError::Build`] if the key is already present, the
    /// taxon is not in the taxonomy, or the signature is not valid for the
    /// database's k-mer spec.
    pub fn add_genome(
        &mut self,
        record: GenomeRecord,
        signature: Signature,
    ) -> Result<usize, DatabaseError> {
        if self.keys.contains(&record.key) {
            return Err(DatabaseError::Build(format!(
                "duplicate genome key '{}'",
                record.key
            )));
        }
        if !self.taxonomy.contains(record.taxon) {
            return Err(DatabaseError::Build(format!(
                "genome '{}' refers to unknown taxon {}",
                record.key, record.taxon
            )));
        }
        signature
            .validate_for(&self.spec)
            .map_err(|e| DatabaseError::Build(format!("genome '{}': {e}", record.key)))?;

        self.keys.insert(record.key.clone());
        self.genomes.push(record);
        self.signatures.push(signature);
        Ok(self.genomes.len() - 1)
    }

    /// Compute the signature of an assembly and add it.
    ///
    /// # Errors
    ///
    /// Same as [`DatabaseBuilder::add_genome`].
    pub fn add_genome_contigs<I, S>(
        &mut self,
        record: GenomeRecord,
        contigs: I,
    ) -> Result<usize, DatabaseError>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<[u8]>,
    {
        let mut builder = SignatureBuilder::new(&self.spec);
        for contig in contigs {
            builder.add_sequence(contig.as_ref());
        }
        self.add_genome(record, builder.finish())
    }

    /// Serialize the database into memory.
    ///
    /// # Errors
    ///
    /// Returns [`DatabaseError::Build`] if the taxonomy is invalid or the
    /// metadata cannot be encoded.
    pub fn to_bytes(&self) -> Result<Vec<u8>, DatabaseError> {
        let mut out = Vec::new();
        self.write(&mut out)?;
        Ok(out)
    }

    /// Serialize the database to a writer.
    ///
    /// # Errors
    ///
    /// Returns [`DatabaseError::Build`] for invalid contents and
    /// [`DatabaseError::Io`] if writing fails.
    pub fn write<W: Write>(&self, mut writer: W) -> Result<(), DatabaseError> {
        self.taxonomy
            .validate()
            .map_err(|e| DatabaseError::Build(format!("invalid taxonomy: {e}")))?;

        let meta = DatabaseMeta {
            info: self.info.clone(),
            kmer_spec: self.spec.clone(),
            metric: self.metric,
            taxonomy: self.taxonomy.clone(),
            genomes: self.genomes.clone(),
        };
        let metadata = meta.encode()?;

        let width = self.spec.value_width();
        let index = SignatureIndex::from_lengths(self.signatures.iter().map(Signature::len), width);
        let bounds = index.to_bytes();

        let mut values = Vec::new();
        for signature in &self.signatures {
            pack_values(signature.values(), width, &mut values);
        }

        #[allow(clippy::cast_possible_truncation)] // width <= 8
        let value_width = width as u32;
        let header = FileHeader {
            version: FORMAT_VERSION,
            value_width,
            genome_count: self.genomes.len() as u64,
            metadata_len: metadata.len() as u64,
            bounds_len: bounds.len() as u64,
            values_len: values.len() as u64,
            checksum: section_checksum(&metadata, &bounds, &values),
        };

        writer.write_all(&header.to_bytes())?;
        writer.write_all(&metadata)?;
        writer.write_all(&bounds)?;
        writer.write_all(&values)?;
        writer.flush()?;

        debug!(
            genomes = self.genomes.len(),
            values = index.total_values(),
            metadata_bytes = metadata.len(),
            "Wrote reference database"
        );
        Ok(())
    }

    /// Write the database to a file, replacing any existing one.
    ///
    /// # Errors
    ///
    /// Same as [`DatabaseBuilder::write`].
    pub fn write_to(&self, path: &Path) -> Result<(), DatabaseError> {
        let file = File::create(path)?;
        self.write(BufWriter::new(file))
    }
}
