//! Turning query-to-reference distances into a taxonomic call.
//!
//! Each reference genome on its own predicts a taxon: the first taxon in its
//! lineage whose distance threshold accepts the observed distance (see
//! [`Taxonomy::matching_taxon`]). The classifier then either trusts the
//! closest genome alone or, in strict mode, reconciles every genome that
//! produced a prediction.
//!
//! | Mode    | Inputs considered            | Prediction                          |
//! |---------|------------------------------|-------------------------------------|
//! | closest | genome(s) at minimal distance | its matched taxon, or the consensus of tied ones |
//! | strict  | every genome with a match     | consensus of all matched taxa       |

use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet};

use crate::core::taxonomy::{TaxonId, Taxonomy};
use crate::core::types::{Confidence, GenomeRecord};

/// Match between a query and a single reference genome.
///
/// This does not imply the match produced the overall prediction.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GenomeMatch {
    /// Index of the genome in the database
    pub index: usize,

    pub key: String,

    /// Taxon the genome is assigned to
    pub taxon: TaxonId,

    pub distance: f64,

    /// Taxon predicted from this match alone: the genome's taxon or one of
    /// its ancestors
    pub matched_taxon: Option<TaxonId>,
}

impl GenomeMatch {
    /// Match against genome `index`, walking its lineage to find the matched taxon.
    #[must_use]
    pub fn new(taxonomy: &Taxonomy, genomes: &[GenomeRecord], index: usize, distance: f64) -> Self {
        let genome = &genomes[index];
        Self {
            index,
            key: genome.key.clone(),
            taxon: genome.taxon,
            distance,
            matched_taxon: taxonomy.matching_taxon(genome.taxon, distance),
        }
    }
}

/// One entry of the ranked neighbour list
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Neighbor {
    pub index: usize,
    pub key: String,
    pub taxon: TaxonId,
    pub distance: f64,
}

/// Non-fatal conditions attached to a result
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Warning {
    /// No input sequence was as long as k
    InputTooShort { length: usize, k: usize },

    /// No k-mer of the query was selected, so nothing could be compared
    EmptySignature,

    /// Several references tie at the minimal distance
    AmbiguousMatch { count: usize },

    /// Matched taxa were not all on one lineage; the reported taxon is their
    /// lowest common ancestor
    InconsistentMatches { taxa: Vec<TaxonId> },

    /// The genome supporting the prediction is not the closest one overall
    PrimaryNotClosest,
}

impl Warning {
    /// Human readable message, with taxon names resolved.
    #[must_use]
    pub fn describe(&self, taxonomy: &Taxonomy) -> String {
        match self {
            Self::InconsistentMatches { taxa } => {
                let names: Vec<&str> = taxa
                    .iter()
                    .filter_map(|&id| taxonomy.get(id).map(|t| t.name.as_str()))
                    .collect();
                format!(
                    "Query matched {} inconsistent taxa: {}. Reporting lowest common ancestor of this set.",
                    taxa.len(),
                    names.join(", ")
                )
            }
            other => other.to_string(),
        }
    }
}

impl std::fmt::Display for Warning {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::InputTooShort { length, k } => write!(
                f,
                "Query sequence is too short ({length} bp) to contain a k-mer of length {k}"
            ),
            Self::EmptySignature => write!(f, "No k-mers were selected from the query"),
            Self::AmbiguousMatch { count } => {
                write!(f, "{count} reference genomes tie at the minimal distance")
            }
            Self::InconsistentMatches { taxa } => {
                write!(f, "Query matched {} inconsistent taxa", taxa.len())
            }
            Self::PrimaryNotClosest => write!(f, "Primary genome match is not closest match"),
        }
    }
}

/// Result of classifying a single query
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ClassificationResult {
    /// False only when the classification itself failed (e.g. matched taxa
    /// without a common ancestor). A successful result may still carry no
    /// prediction.
    pub success: bool,

    pub predicted_taxon: Option<TaxonId>,

    /// Most specific reportable taxon in the lineage of the prediction
    pub report_taxon: Option<TaxonId>,

    /// Closest genome supporting the prediction
    pub primary_match: Option<GenomeMatch>,

    /// Closest genome overall
    pub closest_match: Option<GenomeMatch>,

    /// All genomes at the minimal distance, when there is more than one
    pub tied_matches: Vec<GenomeMatch>,

    /// Nearest references in ranked order
    pub neighbors: Vec<Neighbor>,

    /// Number of values in the query signature
    pub signature_size: usize,

    pub warnings: Vec<Warning>,

    pub error: Option<String>,
}

impl ClassificationResult {
    /// A result without any comparison, e.g. for a query with no usable k-mers.
    #[must_use]
    pub fn unclassified(signature_size: usize, warning: Warning) -> Self {
        Self {
            success: true,
            predicted_taxon: None,
            report_taxon: None,
            primary_match: None,
            closest_match: None,
            tied_matches: Vec::new(),
            neighbors: Vec::new(),
            signature_size,
            warnings: vec![warning],
            error: None,
        }
    }

    #[must_use]
    pub fn confidence(&self) -> Confidence {
        if self.predicted_taxon.is_none() {
            Confidence::NoMatch
        } else if self.warnings.iter().any(|w| {
            matches!(
                w,
                Warning::AmbiguousMatch { .. } | Warning::InconsistentMatches { .. }
            )
        }) {
            Confidence::Ambiguous
        } else {
            Confidence::Confident
        }
    }

    /// Distance to the closest reference, if any comparison was made
    #[must_use]
    pub fn closest_distance(&self) -> Option<f64> {
        self.closest_match.as_ref().map(|m| m.distance)
    }
}

/// Inputs shared by both decision procedures.
///
/// `ranking` lists every genome index ordered by `(distance, index)`.
#[derive(Debug, Clone, Copy)]
pub struct Evidence<'a> {
    pub taxonomy: &'a Taxonomy,
    pub genomes: &'a [GenomeRecord],
    pub distances: &'a [f64],
    pub ranking: &'a [usize],
}

impl Evidence<'_> {
    fn genome_match(&self, index: usize) -> GenomeMatch {
        GenomeMatch::new(self.taxonomy, self.genomes, index, self.distances[index])
    }

    /// Indices of all genomes at the minimal distance, in index order
    fn tied_closest(&self) -> &[usize] {
        let Some(&first) = self.ranking.first() else {
            return &[];
        };
        let best = self.distances[first];
        let n = self
            .ranking
            .iter()
            .take_while(|&&i| self.distances[i] == best)
            .count();
        &self.ranking[..n]
    }

    /// Closest genome whose matched taxon is `consensus` or one of its descendants
    fn primary_for(&self, matches: &[GenomeMatch], consensus: TaxonId) -> Option<GenomeMatch> {
        matches
            .iter()
            .filter(|m| {
                m.matched_taxon
                    .is_some_and(|t| self.taxonomy.is_ancestor_or_self(consensus, t))
            })
            .min_by(|a, b| a.distance.total_cmp(&b.distance).then(a.index.cmp(&b.index)))
            .cloned()
    }
}

/// Group genomes by the taxon their own match predicts.
///
/// Genomes whose threshold walk accepts nothing are left out.
#[must_use]
pub fn find_matches(
    taxonomy: &Taxonomy,
    genomes: &[GenomeRecord],
    distances: &[f64],
) -> BTreeMap<TaxonId, Vec<usize>> {
    let mut matches: BTreeMap<TaxonId, Vec<usize>> = BTreeMap::new();
    for (i, (genome, &d)) in genomes.iter().zip(distances).enumerate() {
        if let Some(taxon) = taxonomy.matching_taxon(genome.taxon, d) {
            matches.entry(taxon).or_default().push(i);
        }
    }
    matches
}

fn base_result(evidence: &Evidence<'_>, signature_size: usize) -> ClassificationResult {
    ClassificationResult {
        success: true,
        predicted_taxon: None,
        report_taxon: None,
        primary_match: None,
        closest_match: evidence.ranking.first().map(|&i| evidence.genome_match(i)),
        tied_matches: Vec::new(),
        neighbors: Vec::new(),
        signature_size,
        warnings: Vec::new(),
        error: None,
    }
}

fn set_prediction(result: &mut ClassificationResult, taxonomy: &Taxonomy, taxon: Option<TaxonId>) {
    result.predicted_taxon = taxon;
    result.report_taxon = taxon.and_then(|t| taxonomy.reportable_taxon(t));
}

fn no_common_ancestor(result: &mut ClassificationResult) {
    result.success = false;
    result.error = Some("Matched taxa have no common ancestor.".to_string());
}

/// Predict from the closest reference genome(s) only.
///
/// A single closest genome predicts its matched taxon. Genomes tied at the
/// minimal distance are all reported, and the prediction is the consensus of
/// their matched taxa.
#[must_use]
pub fn classify_closest(evidence: &Evidence<'_>, signature_size: usize) -> ClassificationResult {
    let mut result = base_result(evidence, signature_size);
    let tied = evidence.tied_closest();

    if tied.len() <= 1 {
        if let Some(closest) = &result.closest_match {
            let taxon = closest.matched_taxon;
            if taxon.is_some() {
                result.primary_match = Some(closest.clone());
            }
            set_prediction(&mut result, evidence.taxonomy, taxon);
        }
        return result;
    }

    let tied_matches: Vec<GenomeMatch> = tied.iter().map(|&i| evidence.genome_match(i)).collect();
    result.warnings.push(Warning::AmbiguousMatch {
        count: tied_matches.len(),
    });

    let matched: Vec<TaxonId> = unique_in_order(tied_matches.iter().filter_map(|m| m.matched_taxon));
    if !matched.is_empty() {
        let (consensus, others) = evidence.taxonomy.consensus(&matched);
        match consensus {
            Some(c) => {
                result.primary_match = evidence.primary_for(&tied_matches, c);
                set_prediction(&mut result, evidence.taxonomy, Some(c));
            }
            None => no_common_ancestor(&mut result),
        }
        if !others.is_empty() {
            result.warnings.push(Warning::InconsistentMatches {
                taxa: others.into_iter().collect(),
            });
        }
    }

    result.tied_matches = tied_matches;
    result
}

/// Predict from every reference genome that produced a match, reconciling
/// their taxa into a single consensus.
#[must_use]
pub fn classify_strict(evidence: &Evidence<'_>, signature_size: usize) -> ClassificationResult {
    let mut result = base_result(evidence, signature_size);

    let tied = evidence.tied_closest();
    if tied.len() > 1 {
        result.tied_matches = tied.iter().map(|&i| evidence.genome_match(i)).collect();
        result.warnings.push(Warning::AmbiguousMatch { count: tied.len() });
    }

    let matches = find_matches(evidence.taxonomy, evidence.genomes, evidence.distances);
    if matches.is_empty() {
        return result;
    }

    let taxa: Vec<TaxonId> = matches.keys().copied().collect();
    let (consensus, others) = evidence.taxonomy.consensus(&taxa);

    if let Some(c) = consensus {
        let candidates: Vec<GenomeMatch> = matches
            .iter()
            .filter(|(&taxon, _)| evidence.taxonomy.is_ancestor_or_self(c, taxon))
            .flat_map(|(_, idxs)| idxs.iter().map(|&i| evidence.genome_match(i)))
            .collect();
        result.primary_match = evidence.primary_for(&candidates, c);
        set_prediction(&mut result, evidence.taxonomy, Some(c));
    }

    if !others.is_empty() {
        result.warnings.push(Warning::InconsistentMatches {
            taxa: others.into_iter().collect(),
        });
    }

    if consensus.is_none() {
        no_common_ancestor(&mut result);
    }

    if let (Some(primary), Some(closest)) = (&result.primary_match, &result.closest_match) {
        if primary.index != closest.index {
            result.warnings.push(Warning::PrimaryNotClosest);
        }
    }

    result
}

fn unique_in_order(taxa: impl Iterator<Item = TaxonId>) -> Vec<TaxonId> {
    let mut seen = BTreeSet::new();
    taxa.filter(|t| seen.insert(*t)).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::taxonomy::{Rank, Taxon};

    struct Fixture {
        taxonomy: Taxonomy,
        genomes: Vec<GenomeRecord>,
        escherichia: TaxonId,
        e_coli: TaxonId,
        e_fergusonii: TaxonId,
    }

    // Genomes: 0, 1 = E. coli; 2 = E. fergusonii; 3 = Salmonella enterica
    fn fixture() -> Fixture {
        let mut taxonomy = Taxonomy::new();
        let order = taxonomy
            .add(Taxon::new("Enterobacterales", Rank::Order), None)
            .unwrap();
        let escherichia = taxonomy
            .add(
                Taxon::new("Escherichia", Rank::Genus).with_threshold(0.6),
                Some(order),
            )
            .unwrap();
        let e_coli = taxonomy
            .add(
                Taxon::new("Escherichia coli", Rank::Species).with_threshold(0.3),
                Some(escherichia),
            )
            .unwrap();
        let e_fergusonii = taxonomy
            .add(
                Taxon::new("Escherichia fergusonii", Rank::Species).with_threshold(0.3),
                Some(escherichia),
            )
            .unwrap();
        let salmonella = taxonomy
            .add(
                Taxon::new("Salmonella", Rank::Genus).with_threshold(0.5),
                Some(order),
            )
            .unwrap();
        let s_enterica = taxonomy
            .add(
                Taxon::new("Salmonella enterica", Rank::Species).with_threshold(0.3),
                Some(salmonella),
            )
            .unwrap();

        let genomes = vec![
            GenomeRecord::new("ecoli_a", e_coli),
            GenomeRecord::new("ecoli_b", e_coli),
            GenomeRecord::new("efergusonii", e_fergusonii),
            GenomeRecord::new("senterica", s_enterica),
        ];

        Fixture {
            taxonomy,
            genomes,
            escherichia,
            e_coli,
            e_fergusonii,
        }
    }

    fn rank(distances: &[f64]) -> Vec<usize> {
        let mut ranking: Vec<usize> = (0..distances.len()).collect();
        ranking.sort_by(|&a, &b| distances[a].total_cmp(&distances[b]).then(a.cmp(&b)));
        ranking
    }

    fn evidence<'a>(f: &'a Fixture, distances: &'a [f64], ranking: &'a [usize]) -> Evidence<'a> {
        Evidence {
            taxonomy: &f.taxonomy,
            genomes: &f.genomes,
            distances,
            ranking,
        }
    }

    #[test]
    fn test_closest_species_call() {
        let f = fixture();
        let distances = [0.1, 0.2, 0.5, 0.9];
        let ranking = rank(&distances);
        let result = classify_closest(&evidence(&f, &distances, &ranking), 100);

        assert!(result.success);
        assert_eq!(result.predicted_taxon, Some(f.e_coli));
        assert_eq!(result.report_taxon, Some(f.e_coli));
        assert_eq!(result.primary_match.as_ref().unwrap().index, 0);
        assert_eq!(result.closest_distance(), Some(0.1));
        assert!(result.warnings.is_empty());
        assert_eq!(result.confidence(), Confidence::Confident);
    }

    #[test]
    fn test_closest_relaxes_to_genus() {
        let f = fixture();
        let distances = [0.45, 0.5, 0.7, 0.9];
        let ranking = rank(&distances);
        let result = classify_closest(&evidence(&f, &distances, &ranking), 100);
        assert_eq!(result.predicted_taxon, Some(f.escherichia));
    }

    #[test]
    fn test_closest_no_threshold_accepts() {
        let f = fixture();
        let distances = [0.8, 0.85, 0.9, 0.95];
        let ranking = rank(&distances);
        let result = classify_closest(&evidence(&f, &distances, &ranking), 100);

        assert!(result.success);
        assert_eq!(result.predicted_taxon, None);
        assert!(result.primary_match.is_none());
        assert_eq!(result.closest_match.as_ref().unwrap().index, 0);
        assert_eq!(result.confidence(), Confidence::NoMatch);
    }

    #[test]
    fn test_closest_tie_same_species() {
        let f = fixture();
        let distances = [0.2, 0.2, 0.5, 0.9];
        let ranking = rank(&distances);
        let result = classify_closest(&evidence(&f, &distances, &ranking), 100);

        assert_eq!(result.tied_matches.len(), 2);
        assert_eq!(result.predicted_taxon, Some(f.e_coli));
        assert!(result.warnings.contains(&Warning::AmbiguousMatch { count: 2 }));
        assert_eq!(result.confidence(), Confidence::Ambiguous);
        assert_eq!(result.primary_match.as_ref().unwrap().index, 0);
    }

    #[test]
    fn test_closest_tie_across_species() {
        let f = fixture();
        let distances = [0.2, 0.6, 0.2, 0.9];
        let ranking = rank(&distances);
        let result = classify_closest(&evidence(&f, &distances, &ranking), 100);

        assert_eq!(result.predicted_taxon, Some(f.escherichia));
        let tied: Vec<usize> = result.tied_matches.iter().map(|m| m.index).collect();
        assert_eq!(tied, vec![0, 2]);
        assert!(result.warnings.contains(&Warning::InconsistentMatches {
            taxa: vec![f.e_coli, f.e_fergusonii]
        }));
    }

    #[test]
    fn test_strict_consensus_and_primary() {
        let f = fixture();
        // Closest genome is E. fergusonii but only at genus level; E. coli matches at species
        let distances = [0.25, 0.55, 0.24, 0.9];
        let ranking = rank(&distances);
        let result = classify_strict(&evidence(&f, &distances, &ranking), 100);

        // Both species match, so consensus is the genus
        assert_eq!(result.predicted_taxon, Some(f.escherichia));
        assert!(result.success);
        assert_eq!(result.primary_match.as_ref().unwrap().index, 2);
        assert!(matches!(
            result.warnings.as_slice(),
            [Warning::InconsistentMatches { .. }]
        ));
    }

    #[test]
    fn test_strict_primary_not_closest() {
        let f = fixture();
        // Closest genome (Salmonella) is past every threshold in its lineage,
        // the next one matches Escherichia at genus level
        let distances = [0.55, 0.9, 0.9, 0.52];
        let ranking = rank(&distances);
        let result = classify_strict(&evidence(&f, &distances, &ranking), 100);

        assert_eq!(result.predicted_taxon, Some(f.escherichia));
        assert_eq!(result.closest_match.as_ref().unwrap().index, 3);
        assert_eq!(result.primary_match.as_ref().unwrap().index, 0);
        assert_eq!(result.warnings, vec![Warning::PrimaryNotClosest]);
    }

    #[test]
    fn test_strict_across_genera() {
        let f = fixture();
        // E. coli matches at species level, Salmonella only at genus level
        let distances = [0.28, 0.9, 0.9, 0.45];
        let ranking = rank(&distances);
        let result = classify_strict(&evidence(&f, &distances, &ranking), 100);

        let order = f.taxonomy.find_by_name("Enterobacterales");
        assert_eq!(result.predicted_taxon, order);
        assert_eq!(result.primary_match.as_ref().unwrap().index, 0);
        assert_eq!(result.confidence(), Confidence::Ambiguous);

        let distances = [0.28, 0.9, 0.9, 0.6];
        let ranking = rank(&distances);
        let result = classify_strict(&evidence(&f, &distances, &ranking), 100);
        assert_eq!(result.predicted_taxon, Some(f.e_coli));
        assert!(result.warnings.is_empty());
    }

    #[test]
    fn test_strict_tie_mate_as_primary() {
        let mut f = fixture();
        // Salmonella genome now sorts before the E. fergusonii one
        f.genomes.swap(2, 3);
        let distances = [0.9, 0.9, 0.52, 0.52];
        let ranking = rank(&distances);
        let result = classify_strict(&evidence(&f, &distances, &ranking), 100);

        assert_eq!(result.predicted_taxon, Some(f.escherichia));
        assert_eq!(result.closest_match.as_ref().unwrap().index, 2);
        assert_eq!(result.primary_match.as_ref().unwrap().index, 3);
        assert_eq!(
            result.warnings,
            vec![Warning::AmbiguousMatch { count: 2 }, Warning::PrimaryNotClosest]
        );
    }

    #[test]
    fn test_strict_consensus_with_late_genus() {
        let mut taxonomy = Taxonomy::new();
        let order = taxonomy
            .add(Taxon::new("Enterobacterales", Rank::Order), None)
            .unwrap();
        let mut species = Vec::new();
        for (genus, name) in [
            ("Escherichia", "Escherichia coli"),
            ("Salmonella", "Salmonella enterica"),
            ("Klebsiella", "Klebsiella pneumoniae"),
        ] {
            let genus = taxonomy
                .add(Taxon::new(genus, Rank::Genus).with_threshold(0.6), Some(order))
                .unwrap();
            let sp = taxonomy
                .add(Taxon::new(name, Rank::Species).with_threshold(0.3), Some(genus))
                .unwrap();
            species.push(sp);
        }
        let klebsiella = taxonomy.find_by_name("Klebsiella").unwrap();
        let genomes: Vec<GenomeRecord> = species
            .iter()
            .enumerate()
            .map(|(i, &sp)| GenomeRecord::new(format!("g{i}"), sp))
            .collect();

        // Species-level hits in two genera, genus-level hit in the last one
        let distances = [0.2, 0.25, 0.5];
        let ranking = rank(&distances);
        let evidence = Evidence {
            taxonomy: &taxonomy,
            genomes: &genomes,
            distances: &distances,
            ranking: &ranking,
        };
        let result = classify_strict(&evidence, 100);

        assert_eq!(result.predicted_taxon, Some(order));
        assert_eq!(result.primary_match.as_ref().unwrap().index, 0);
        assert_eq!(
            result.warnings,
            vec![Warning::InconsistentMatches {
                taxa: vec![species[0], species[1], klebsiella]
            }]
        );
    }

    #[test]
    fn test_strict_no_matches() {
        let f = fixture();
        let distances = [0.9, 0.9, 0.95, 0.99];
        let ranking = rank(&distances);
        let result = classify_strict(&evidence(&f, &distances, &ranking), 10);
        assert!(result.success);
        assert!(result.predicted_taxon.is_none());
        assert!(result.closest_match.is_some());
    }

    #[test]
    fn test_find_matches_groups_by_taxon() {
        let f = fixture();
        let matches = find_matches(&f.taxonomy, &f.genomes, &[0.1, 0.2, 0.5, 0.9]);
        assert_eq!(matches.get(&f.e_coli), Some(&vec![0, 1]));
        assert_eq!(matches.get(&f.escherichia), Some(&vec![2]));
        assert_eq!(matches.len(), 2);
    }

    #[test]
    fn test_unclassified_result() {
        let result = ClassificationResult::unclassified(0, Warning::EmptySignature);
        assert!(result.success);
        assert_eq!(result.confidence(), Confidence::NoMatch);
        assert_eq!(result.warnings, vec![Warning::EmptySignature]);
    }

    #[test]
    fn test_warning_messages() {
        let f = fixture();
        let warning = Warning::InconsistentMatches {
            taxa: vec![f.e_coli, f.e_fergusonii],
        };
        let message = warning.describe(&f.taxonomy);
        assert!(message.contains("Escherichia coli, Escherichia fergusonii"));
        assert_eq!(
            Warning::InputTooShort { length: 5, k: 11 }.to_string(),
            "Query sequence is too short (5 bp) to contain a k-mer of length 11"
        );
    }
}
