//! Taxonomy tree used to generalize an identification when a finer rank is not
//! supported by the observed distance.
//!
//! Taxa live in a flat arena and refer to their parent by [`TaxonId`]. A parent
//! is always added before its children, so every id points backwards and the
//! tree cannot contain a cycle.

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use thiserror::Error;

use crate::utils::validation::is_valid_distance;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum TaxonomyError {
    #[error("Unknown parent taxon {parent} for '{name}'")]
    UnknownParent { name: String, parent: TaxonId },

    #[error("Invalid distance threshold {value} for taxon '{name}': must be within [0, 1]")]
    InvalidThreshold { name: String, value: f64 },
}

/// Index of a taxon in its [`Taxonomy`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct TaxonId(pub u32);

impl TaxonId {
    #[must_use]
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

impl std::fmt::Display for TaxonId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Taxonomic rank
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Rank {
    Domain,
    Phylum,
    Class,
    Order,
    Family,
    Genus,
    Species,
    Subspecies,
    Strain,
    Unranked,
}

impl Rank {
    /// Parse a rank name, falling back to [`Rank::Unranked`]
    #[must_use]
    pub fn parse(s: &str) -> Self {
        match s.to_lowercase().as_str() {
            "domain" | "superkingdom" => Rank::Domain,
            "phylum" => Rank::Phylum,
            "class" => Rank::Class,
            "order" => Rank::Order,
            "family" => Rank::Family,
            "genus" => Rank::Genus,
            "species" => Rank::Species,
            "subspecies" => Rank::Subspecies,
            "strain" => Rank::Strain,
            _ => Rank::Unranked,
        }
    }
}

impl std::fmt::Display for Rank {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::Domain => "domain",
            Self::Phylum => "phylum",
            Self::Class => "class",
            Self::Order => "order",
            Self::Family => "family",
            Self::Genus => "genus",
            Self::Species => "species",
            Self::Subspecies => "subspecies",
            Self::Strain => "strain",
            Self::Unranked => "unranked",
        };
        write!(f, "{name}")
    }
}

/// A node of the taxonomy
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Taxon {
    pub name: String,

    pub rank: Rank,

    /// Set when the taxon is added to a [`Taxonomy`]
    pub parent: Option<TaxonId>,

    /// Largest query distance for which a match to a genome in this taxon is
    /// accepted as an identification at this taxon
    pub distance_threshold: Option<f64>,

    /// Whether this taxon is reported to users, or only used internally
    /// (e.g. unnamed subspecies clusters)
    pub report: bool,

    /// NCBI taxonomy ID, when known
    pub ncbi_id: Option<u32>,
}

impl Taxon {
    pub fn new(name: impl Into<String>, rank: Rank) -> Self {
        Self {
            name: name.into(),
            rank,
            parent: None,
            distance_threshold: None,
            report: true,
            ncbi_id: None,
        }
    }

    #[must_use]
    pub fn with_threshold(mut self, threshold: f64) -> Self {
        self.distance_threshold = Some(threshold);
        self
    }

    #[must_use]
    pub fn with_report(mut self, report: bool) -> Self {
        self.report = report;
        self
    }

    #[must_use]
    pub fn with_ncbi_id(mut self, ncbi_id: u32) -> Self {
        self.ncbi_id = Some(ncbi_id);
        self
    }
}

/// Arena-backed taxonomy tree (possibly a forest)
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Taxonomy {
    taxa: Vec<Taxon>,
}

impl Taxonomy {
    #[must_use]
    pub fn new() -> Self {
        Self { taxa: Vec::new() }
    }

    /// Add a taxon under `parent` (or as a root) and return its id.
    ///
    /// # Errors
    ///
    /// Returns an error if `parent` does not exist yet or the threshold is not
    /// a valid distance.
    pub fn add(&mut self, mut taxon: Taxon, parent: Option<TaxonId>) -> Result<TaxonId, TaxonomyError> {
        if let Some(p) = parent {
            if p.index() >= self.taxa.len() {
                return Err(TaxonomyError::UnknownParent {
                    name: taxon.name,
                    parent: p,
                });
            }
        }
        if let Some(value) = taxon.distance_threshold {
            if !is_valid_distance(value) {
                return Err(TaxonomyError::InvalidThreshold {
                    name: taxon.name,
                    value,
                });
            }
        }
        taxon.parent = parent;

        #[allow(clippy::cast_possible_truncation)] // taxonomies are far below u32::MAX nodes
        let id = TaxonId(self.taxa.len() as u32);
        self.taxa.push(taxon);
        Ok(id)
    }

    /// Check arena invariants, e.g. after deserializing a taxonomy.
    ///
    /// # Errors
    ///
    /// Returns the first violated invariant.
    pub fn validate(&self) -> Result<(), TaxonomyError> {
        for (i, taxon) in self.taxa.iter().enumerate() {
            if let Some(parent) = taxon.parent {
                if parent.index() >= i {
                    return Err(TaxonomyError::UnknownParent {
                        name: taxon.name.clone(),
                        parent,
                    });
                }
            }
            if let Some(value) = taxon.distance_threshold {
                if !is_valid_distance(value) {
                    return Err(TaxonomyError::InvalidThreshold {
                        name: taxon.name.clone(),
                        value,
                    });
                }
            }
        }
        Ok(())
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.taxa.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.taxa.is_empty()
    }

    #[must_use]
    pub fn contains(&self, id: TaxonId) -> bool {
        id.index() < self.taxa.len()
    }

    #[must_use]
    pub fn get(&self, id: TaxonId) -> Option<&Taxon> {
        self.taxa.get(id.index())
    }

    /// All taxa with their ids, in insertion order
    pub fn iter(&self) -> impl Iterator<Item = (TaxonId, &Taxon)> {
        (0u32..).map(TaxonId).zip(self.taxa.iter())
    }

    #[must_use]
    pub fn parent(&self, id: TaxonId) -> Option<TaxonId> {
        self.get(id).and_then(|t| t.parent)
    }

    /// Iterate from `id` up to its root, starting with `id` itself
    #[must_use]
    pub fn ancestors(&self, id: TaxonId) -> Ancestors<'_> {
        Ancestors {
            taxonomy: self,
            next: self.contains(id).then_some(id),
        }
    }

    /// Number of edges between `id` and its root
    #[must_use]
    pub fn depth(&self, id: TaxonId) -> usize {
        self.ancestors(id).count().saturating_sub(1)
    }

    #[must_use]
    pub fn is_ancestor_or_self(&self, ancestor: TaxonId, id: TaxonId) -> bool {
        self.ancestors(id).any(|a| a == ancestor)
    }

    /// Lineage from the root down to `id`
    #[must_use]
    pub fn path(&self, id: TaxonId) -> TaxonPath {
        let mut ids: Vec<TaxonId> = self.ancestors(id).collect();
        ids.reverse();
        TaxonPath(ids)
    }

    #[must_use]
    pub fn find_by_name(&self, name: &str) -> Option<TaxonId> {
        self.iter().find(|(_, t)| t.name == name).map(|(id, _)| id)
    }

    #[must_use]
    pub fn threshold(&self, id: TaxonId) -> Option<f64> {
        self.get(id).and_then(|t| t.distance_threshold)
    }

    /// Most specific taxon in the lineage of `id` (inclusive) whose distance
    /// threshold accepts `distance`.
    ///
    /// Taxa without a threshold are skipped. Because the walk goes from the
    /// leaf upward and stops at the first acceptance, no accepting rank is
    /// ever skipped in favour of a coarser one.
    #[must_use]
    pub fn matching_taxon(&self, id: TaxonId, distance: f64) -> Option<TaxonId> {
        self.ancestors(id)
            .find(|&a| self.threshold(a).is_some_and(|t| distance <= t))
    }

    /// Most specific taxon in the lineage of `id` (inclusive) marked for reporting.
    #[must_use]
    pub fn reportable_taxon(&self, id: TaxonId) -> Option<TaxonId> {
        self.ancestors(id)
            .find(|&a| self.get(a).is_some_and(|t| t.report))
    }

    /// Reconcile a set of matched taxa into a single consensus taxon.
    ///
    /// When all taxa lie on one lineage the most specific of them is the
    /// consensus. When some are not descendants of one another the consensus
    /// is the lowest taxon that is an ancestor or descendant of all of them,
    /// and the second element holds the taxa that had to be generalized over
    /// (at least two in that case, empty otherwise). Taxa from disjoint trees
    /// have no consensus, and all of them are returned as inconsistent.
    #[must_use]
    pub fn consensus(&self, taxa: &[TaxonId]) -> (Option<TaxonId>, BTreeSet<TaxonId>) {
        let Some((&first, rest)) = taxa.split_first() else {
            return (None, BTreeSet::new());
        };

        // Current consensus followed by its ancestors
        let mut trunk: Vec<TaxonId> = self.ancestors(first).collect();
        // Set once the consensus has been generalized above an input taxon
        let mut widened = false;

        for &taxon in rest {
            if trunk.contains(&taxon) {
                continue;
            }

            let lowest_shared = self
                .ancestors(taxon)
                .skip(1)
                .find_map(|a| trunk.iter().position(|&t| t == a));

            match lowest_shared {
                // Descends from the current consensus. It only narrows the
                // consensus while every input so far lies on one lineage.
                Some(0) => {
                    if !widened {
                        trunk = self.ancestors(taxon).collect();
                    }
                }
                Some(i) => {
                    widened = true;
                    trunk.drain(..i);
                }
                None => return (None, taxa.iter().copied().collect()),
            }
        }

        let Some(&consensus) = trunk.first() else {
            return (None, taxa.iter().copied().collect());
        };
        let crown = if widened {
            taxa.iter()
                .copied()
                .filter(|&t| t != consensus && self.is_ancestor_or_self(consensus, t))
                .collect()
        } else {
            BTreeSet::new()
        };
        (Some(consensus), crown)
    }
}

impl std::ops::Index<TaxonId> for Taxonomy {
    type Output = Taxon;

    /// # Panics
    ///
    /// Panics if `id` does not belong to this taxonomy.
    fn index(&self, id: TaxonId) -> &Taxon {
        &self.taxa[id.index()]
    }
}

/// Iterator over a lineage, leaf first
#[derive(Debug, Clone)]
pub struct Ancestors<'a> {
    taxonomy: &'a Taxonomy,
    next: Option<TaxonId>,
}

impl Iterator for Ancestors<'_> {
    type Item = TaxonId;

    fn next(&mut self) -> Option<TaxonId> {
        let current = self.next?;
        self.next = self.taxonomy.parent(current);
        Some(current)
    }
}

/// Lineage of a taxon, root first
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct TaxonPath(Vec<TaxonId>);

impl TaxonPath {
    #[must_use]
    pub fn ids(&self) -> &[TaxonId] {
        &self.0
    }

    #[must_use]
    pub fn leaf(&self) -> Option<TaxonId> {
        self.0.last().copied()
    }

    #[must_use]
    pub fn root(&self) -> Option<TaxonId> {
        self.0.first().copied()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Taxon names joined root to leaf, e.g. `Escherichia; Escherichia coli`
    #[must_use]
    pub fn format_names(&self, taxonomy: &Taxonomy) -> String {
        self.0
            .iter()
            .filter_map(|&id| taxonomy.get(id).map(|t| t.name.as_str()))
            .collect::<Vec<_>>()
            .join("; ")
    }
}
