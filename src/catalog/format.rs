//! On-disk layout of a reference database.
//!
//! All integers are little-endian.
//!
//! ```text
//! [Header, 64 bytes]
//!   magic            8 bytes   "TXMSIGDB"
//!   format version   u32
//!   value width      u32       bytes per packed k-mer value
//!   genome count     u64
//!   metadata length  u64
//!   bounds length    u64       (genome count + 1) * 8
//!   values length    u64
//!   checksum         16 bytes  MD5 of metadata + bounds + values
//! [Metadata]  bincode-encoded DatabaseMeta
//! [Bounds]    u64 offsets (in values) of each genome's signature
//! [Values]    packed k-mer values
//! ```

use serde::{Deserialize, Serialize};

use super::store::DatabaseError;
use crate::core::signature::KmerSpec;
use crate::core::taxonomy::Taxonomy;
use crate::core::types::GenomeRecord;
use crate::matching::metric::Metric;

/// File magic
pub const MAGIC: &[u8; 8] = b"TXMSIGDB";

/// Current (and only supported) format version
pub const FORMAT_VERSION: u32 = 1;

/// Size of the fixed header in bytes
pub const HEADER_LEN: usize = 64;

/// Byte ranges of the three sections following the header
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SectionRanges {
    pub metadata: std::ops::Range<usize>,
    pub bounds: std::ops::Range<usize>,
    pub values: std::ops::Range<usize>,
}

/// Fixed-size file header
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileHeader {
    pub version: u32,
    pub value_width: u32,
    pub genome_count: u64,
    pub metadata_len: u64,
    pub bounds_len: u64,
    pub values_len: u64,
    pub checksum: [u8; 16],
}

fn le_u32(bytes: &[u8], at: usize) -> u32 {
    let mut buf = [0u8; 4];
    buf.copy_from_slice(&bytes[at..at + 4]);
    u32::from_le_bytes(buf)
}

fn le_u64(bytes: &[u8], at: usize) -> u64 {
    let mut buf = [0u8; 8];
    buf.copy_from_slice(&bytes[at..at + 8]);
    u64::from_le_bytes(buf)
}

impl FileHeader {
    /// Parse and check the header at the start of `bytes`.
    ///
    /// # Errors
    ///
    /// Returns [`DatabaseError::Corrupt`] if the data is too short or the magic
    /// does not match, and [`DatabaseError::SchemaVersion`] for any version
    /// other than [`FORMAT_VERSION`].
    pub fn parse(bytes: &[u8]) -> Result<Self, DatabaseError> {
        if bytes.len() < HEADER_LEN {
            return Err(DatabaseError::Corrupt(format!(
                "file is {} bytes, shorter than the {HEADER_LEN} byte header",
                bytes.len()
            )));
        }
        if &bytes[..8] != MAGIC {
            return Err(DatabaseError::Corrupt(
                "invalid magic, not a taxmatch signature database".to_string(),
            ));
        }

        let version = le_u32(bytes, 8);
        if version != FORMAT_VERSION {
            return Err(DatabaseError::SchemaVersion {
                found: version,
                supported: FORMAT_VERSION,
            });
        }

        let mut checksum = [0u8; 16];
        checksum.copy_from_slice(&bytes[48..64]);

        Ok(Self {
            version,
            value_width: le_u32(bytes, 12),
            genome_count: le_u64(bytes, 16),
            metadata_len: le_u64(bytes, 24),
            bounds_len: le_u64(bytes, 32),
            values_len: le_u64(bytes, 40),
            checksum,
        })
    }

    #[must_use]
    pub fn to_bytes(&self) -> [u8; HEADER_LEN] {
        let mut out = [0u8; HEADER_LEN];
        out[..8].copy_from_slice(MAGIC);
        out[8..12].copy_from_slice(&self.version.to_le_bytes());
        out[12..16].copy_from_slice(&self.value_width.to_le_bytes());
        out[16..24].copy_from_slice(&self.genome_count.to_le_bytes());
        out[24..32].copy_from_slice(&self.metadata_len.to_le_bytes());
        out[32..40].copy_from_slice(&self.bounds_len.to_le_bytes());
        out[40..48].copy_from_slice(&self.values_len.to_le_bytes());
        out[48..64].copy_from_slice(&self.checksum);
        out
    }

    /// Locate the sections in a file of `file_len` bytes.
    ///
    /// # Errors
    ///
    /// Returns [`DatabaseError::Corrupt`] if the section lengths are
    /// inconsistent with each other or with the file length.
    pub fn sections(&self, file_len: usize) -> Result<SectionRanges, DatabaseError> {
        let corrupt = |msg: String| DatabaseError::Corrupt(msg);

        let to_usize = |v: u64, what: &str| {
            usize::try_from(v).map_err(|_| corrupt(format!("{what} length {v} is too large")))
        };
        let metadata_len = to_usize(self.metadata_len, "metadata")?;
        let bounds_len = to_usize(self.bounds_len, "bounds")?;
        let values_len = to_usize(self.values_len, "values")?;
        let width = self.value_width as usize;

        let expected_bounds = self
            .genome_count
            .checked_add(1)
            .and_then(|n| n.checked_mul(8));
        if expected_bounds != Some(self.bounds_len) {
            return Err(corrupt(format!(
                "bounds section is {} bytes, expected 8 * ({} + 1)",
                self.bounds_len, self.genome_count
            )));
        }
        if width == 0 || width > 8 || values_len % width != 0 {
            return Err(corrupt(format!(
                "values section of {values_len} bytes is not a multiple of value width {width}"
            )));
        }

        let metadata_end = HEADER_LEN
            .checked_add(metadata_len)
            .ok_or_else(|| corrupt("metadata length overflows".to_string()))?;
        let bounds_end = metadata_end
            .checked_add(bounds_len)
            .ok_or_else(|| corrupt("bounds length overflows".to_string()))?;
        let values_end = bounds_end
            .checked_add(values_len)
            .ok_or_else(|| corrupt("values length overflows".to_string()))?;

        if values_end != file_len {
            return Err(corrupt(format!(
                "header declares {values_end} bytes but file has {file_len}"
            )));
        }

        Ok(SectionRanges {
            metadata: HEADER_LEN..metadata_end,
            bounds: metadata_end..bounds_end,
            values: bounds_end..values_end,
        })
    }
}

/// MD5 digest over the three sections, in file order.
#[must_use]
pub fn section_checksum(metadata: &[u8], bounds: &[u8], values: &[u8]) -> [u8; 16] {
    let mut ctx = md5::Context::new();
    ctx.consume(metadata);
    ctx.consume(bounds);
    ctx.consume(values);
    ctx.compute().0
}

/// Lowercase hex form of a checksum
#[must_use]
pub fn checksum_hex(checksum: &[u8; 16]) -> String {
    checksum.iter().map(|b| format!("{b:02x}")).collect()
}

/// Descriptive information about a database
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DatabaseInfo {
    /// Short identifier, e.g. `refseq-bacteria`
    pub id: String,
    pub name: String,
    pub version: String,
    pub description: String,
    /// RFC 3339 creation timestamp
    pub created_at: String,
}

impl DatabaseInfo {
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            version: "1.0".to_string(),
            description: String::new(),
            created_at: chrono::Utc::now().to_rfc3339(),
        }
    }

    #[must_use]
    pub fn with_version(mut self, version: impl Into<String>) -> Self {
        self.version = version.into();
        self
    }

    #[must_use]
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }
}

impl Default for DatabaseInfo {
    fn default() -> Self {
        Self::new("unnamed", "Unnamed database")
    }
}

/// Contents of the metadata section
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DatabaseMeta {
    pub info: DatabaseInfo,
    pub kmer_spec: KmerSpec,
    pub metric: Metric,
    pub taxonomy: Taxonomy,
    pub genomes: Vec<GenomeRecord>,
}

impl DatabaseMeta {
    pub(crate) fn encode(&self) -> Result<Vec<u8>, DatabaseError> {
        bincode::serialize(self)
            .map_err(|e| DatabaseError::Build(format!("failed to encode metadata: {e}")))
    }

    pub(crate) fn decode(bytes: &[u8]) -> Result<Self, DatabaseError> {
        bincode::deserialize(bytes)
            .map_err(|e| DatabaseError::Corrupt(format!("failed to decode metadata: {e}")))
    }
}
