use serde::{Deserialize, Serialize};

use super::taxonomy::TaxonId;

/// A reference genome stored in the database, alongside its signature
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GenomeRecord {
    /// Unique key within the database (e.g. an assembly accession)
    pub key: String,

    /// Free-text description (e.g. organism and strain name)
    pub description: String,

    /// Most specific taxon the genome is assigned to
    pub taxon: TaxonId,

    /// NCBI taxonomy ID of the organism, when known
    pub ncbi_id: Option<u32>,
}

impl GenomeRecord {
    pub fn new(key: impl Into<String>, taxon: TaxonId) -> Self {
        Self {
            key: key.into(),
            description: String::new(),
            taxon,
            ncbi_id: None,
        }
    }

    #[must_use]
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    #[must_use]
    pub fn with_ncbi_id(mut self, ncbi_id: u32) -> Self {
        self.ncbi_id = Some(ncbi_id);
        self
    }
}

/// Confidence level of a classification
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Confidence {
    /// No threshold accepted the nearest match, or no signature could be built
    NoMatch,
    /// A taxon was predicted, but from tied or inconsistent matches
    Ambiguous,
    /// A single, consistent taxon was predicted
    Confident,
}

impl std::fmt::Display for Confidence {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::NoMatch => write!(f, "no match"),
            Self::Ambiguous => write!(f, "ambiguous"),
            Self::Confident => write!(f, "confident"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_confidence_ordering() {
        assert!(Confidence::NoMatch < Confidence::Ambiguous);
        assert!(Confidence::Ambiguous < Confidence::Confident);
        assert_eq!(Confidence::NoMatch.to_string(), "no match");
    }

    #[test]
    fn test_genome_record_builder() {
        let record = GenomeRecord::new("GCF_000005845.2", TaxonId(4))
            .with_description("Escherichia coli K-12")
            .with_ncbi_id(511_145);
        assert_eq!(record.taxon, TaxonId(4));
        assert_eq!(record.ncbi_id, Some(511_145));
        assert_eq!(record.description, "Escherichia coli K-12");
    }
}
