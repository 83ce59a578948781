use rayon::prelude::*;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;
use thiserror::Error;
use tracing::{debug, warn};

use crate::catalog::store::{DatabaseError, ReferenceDatabase};
use crate::core::signature::{KmerSpec, Signature, SignatureBuilder};
use crate::matching::consensus::{
    classify_closest, classify_strict, ClassificationResult, Evidence, Neighbor, Warning,
};

#[derive(Error, Debug)]
pub enum ClassifyError {
    #[error("Query signature was built with {found}, but the database uses {expected}")]
    SpecMismatch { expected: KmerSpec, found: KmerSpec },

    #[error("Genome index {index} out of range for database of {count} genomes")]
    GenomeIndex { index: usize, count: usize },

    #[error("Failed to build worker pool: {0}")]
    ThreadPool(#[from] rayon::ThreadPoolBuildError),

    #[error(transparent)]
    Database(#[from] DatabaseError),
}

/// Default number of nearest references reported with each result
pub const DEFAULT_NEIGHBORS: usize = 10;

/// Configuration for the classifier
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClassifierConfig {
    /// Reconcile all matching references instead of trusting the closest one
    pub strict: bool,
    /// Number of nearest references to include in each result
    pub neighbors: usize,
    /// Worker threads for distance computation; `None` uses the global pool
    pub threads: Option<usize>,
}

impl Default for ClassifierConfig {
    fn default() -> Self {
        Self {
            strict: false,
            neighbors: DEFAULT_NEIGHBORS,
            threads: None,
        }
    }
}

/// Cooperative cancellation flag for batch classification.
///
/// Clones share the same flag.
#[derive(Debug, Clone, Default)]
pub struct CancellationToken(Arc<AtomicBool>);

impl CancellationToken {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// One query of a batch: an assembly given as its contig sequences
#[derive(Debug, Clone)]
pub struct QueryInput {
    pub label: String,
    pub contigs: Vec<Vec<u8>>,
}

impl QueryInput {
    pub fn new(label: impl Into<String>, contigs: Vec<Vec<u8>>) -> Self {
        Self {
            label: label.into(),
            contigs,
        }
    }
}

#[derive(Debug, Clone)]
pub struct BatchItem {
    pub label: String,
    pub result: ClassificationResult,
}

/// Results of a batch, in query order
#[derive(Debug, Clone, Default)]
pub struct BatchResults {
    pub items: Vec<BatchItem>,
    /// True if the batch stopped early; `items` holds the queries finished before that
    pub cancelled: bool,
}

/// Classifies query genomes against a shared reference database
pub struct Classifier {
    db: Arc<ReferenceDatabase>,
    config: ClassifierConfig,
    pool: Option<rayon::ThreadPool>,
}

impl Classifier {
    /// Create a classifier, building a dedicated worker pool if `config.threads` is set.
    ///
    /// # Errors
    ///
    /// Returns [`ClassifyError::ThreadPool`] if the worker pool cannot be created.
    pub fn new(db: Arc<ReferenceDatabase>, config: ClassifierConfig) -> Result<Self, ClassifyError> {
        let pool = match config.threads {
            Some(n) => Some(rayon::ThreadPoolBuilder::new().num_threads(n).build()?),
            None => None,
        };
        Ok(Self { db, config, pool })
    }

    #[must_use]
    pub fn database(&self) -> &Arc<ReferenceDatabase> {
        &self.db
    }

    #[must_use]
    pub fn config(&self) -> &ClassifierConfig {
        &self.config
    }

    fn install<R: Send>(&self, op: impl FnOnce() -> R + Send) -> R {
        match &self.pool {
            Some(pool) => pool.install(op),
            None => op(),
        }
    }

    /// Classify a single sequence.
    #[must_use]
    pub fn classify(&self, seq: &[u8]) -> ClassificationResult {
        self.classify_contigs([seq])
    }

    /// Classify an assembly given as separate contigs.
    pub fn classify_contigs<I, S>(&self, contigs: I) -> ClassificationResult
    where
        I: IntoIterator<Item = S>,
        S: AsRef<[u8]>,
    {
        let spec = self.db.kmer_spec();
        let mut builder = SignatureBuilder::new(spec);
        for contig in contigs {
            builder.add_sequence(contig.as_ref());
        }

        let longest = builder.longest_sequence();
        if longest < spec.k() {
            warn!(length = longest, k = spec.k(), "Query too short to classify");
            return ClassificationResult::unclassified(
                0,
                Warning::InputTooShort {
                    length: longest,
                    k: spec.k(),
                },
            );
        }

        let signature = builder.finish();
        self.classify_prepared(&signature)
    }

    /// Classify a precomputed signature.
    ///
    /// # Errors
    ///
    /// Returns [`ClassifyError::SpecMismatch`] if `spec` differs from the
    /// database's k-mer spec.
    pub fn classify_signature(
        &self,
        signature: &Signature,
        spec: &KmerSpec,
    ) -> Result<ClassificationResult, ClassifyError> {
        self.check_spec(spec)?;
        Ok(self.classify_prepared(signature))
    }

    fn check_spec(&self, spec: &KmerSpec) -> Result<(), ClassifyError> {
        let expected = self.db.kmer_spec();
        if spec == expected {
            Ok(())
        } else {
            Err(ClassifyError::SpecMismatch {
                expected: expected.clone(),
                found: spec.clone(),
            })
        }
    }

    fn classify_prepared(&self, signature: &Signature) -> ClassificationResult {
        if signature.is_empty() {
            warn!("Query signature is empty, no k-mers matched the selection rule");
            return ClassificationResult::unclassified(0, Warning::EmptySignature);
        }

        let start = Instant::now();
        let distances = self.distances(signature);
        let ranking = self.rank(&distances);
        debug!(
            signature_size = signature.len(),
            references = distances.len(),
            elapsed_ms = start.elapsed().as_millis(),
            "Computed query distances"
        );

        let evidence = Evidence {
            taxonomy: self.db.taxonomy(),
            genomes: self.db.genomes(),
            distances: &distances,
            ranking: &ranking,
        };
        let mut result = if self.config.strict {
            classify_strict(&evidence, signature.len())
        } else {
            classify_closest(&evidence, signature.len())
        };

        result.neighbors = ranking
            .iter()
            .take(self.config.neighbors)
            .map(|&i| {
                let genome = &self.db.genomes()[i];
                Neighbor {
                    index: i,
                    key: genome.key.clone(),
                    taxon: genome.taxon,
                    distance: distances[i],
                }
            })
            .collect();

        if let Some(error) = &result.error {
            warn!(%error, "Classification failed");
        }
        result
    }

    /// Distance from `signature` to every reference, in database order.
    #[must_use]
    pub fn distances(&self, signature: &Signature) -> Vec<f64> {
        let db = &self.db;
        let metric = db.metric();
        self.install(|| {
            (0..db.signature_count())
                .into_par_iter()
                .map(|i| metric.distance(signature.iter(), db.signature_view(i).iter()))
                .collect()
        })
    }

    /// Distance from `signature` to a subset of references, in the order given.
    ///
    /// # Errors
    ///
    /// Returns [`ClassifyError::GenomeIndex`] for an index outside the database.
    pub fn distances_to(
        &self,
        signature: &Signature,
        indices: &[usize],
    ) -> Result<Vec<f64>, ClassifyError> {
        let db = &self.db;
        let count = db.signature_count();
        if let Some(&index) = indices.iter().find(|&&i| i >= count) {
            return Err(ClassifyError::GenomeIndex { index, count });
        }

        let metric = db.metric();
        Ok(self.install(|| {
            indices
                .par_iter()
                .map(|&i| metric.distance(signature.iter(), db.signature_view(i).iter()))
                .collect()
        }))
    }

    /// Reference indices ordered by ascending distance, ties broken by index.
    #[must_use]
    pub fn rank(&self, distances: &[f64]) -> Vec<usize> {
        self.install(|| rank_distances(distances))
    }

    /// Classify a batch of assemblies in order, stopping early if `cancel` is set.
    ///
    /// Cancellation is checked before each query, so every returned result is complete.
    pub fn classify_batch(&self, queries: &[QueryInput], cancel: &CancellationToken) -> BatchResults {
        let mut results = BatchResults::default();

        for query in queries {
            if cancel.is_cancelled() {
                debug!(
                    completed = results.items.len(),
                    total = queries.len(),
                    "Batch cancelled"
                );
                results.cancelled = true;
                break;
            }

            let result = self.classify_contigs(&query.contigs);
            results.items.push(BatchItem {
                label: query.label.clone(),
                result,
            });
        }

        results
    }
}

/// Indices of `distances` sorted by `(distance, index)`.
#[must_use]
pub fn rank_distances(distances: &[f64]) -> Vec<usize> {
    let mut ranking: Vec<usize> = (0..distances.len()).collect();
    ranking.par_sort_by(|&a, &b| distances[a].total_cmp(&distances[b]).then(a.cmp(&b)));
    ranking
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::builder::DatabaseBuilder;
    use crate::catalog::store::LoadOptions;
    use crate::core::signature::calc_signature;
    use crate::core::taxonomy::{Rank, Taxon, Taxonomy};
    use crate::core::types::{Confidence, GenomeRecord};
    use crate::utils::test_utils::random_seq;

    /// Three unrelated random "genomes" in one genus, all-canonical k = 9
    fn make_classifier(config: ClassifierConfig) -> (Classifier, Vec<Vec<u8>>) {
        let mut taxonomy = Taxonomy::new();
        let genus = taxonomy
            .add(Taxon::new("Genus", Rank::Genus).with_threshold(0.8), None)
            .unwrap();
        let species: Vec<_> = (0..3)
            .map(|i| {
                taxonomy
                    .add(
                        Taxon::new(format!("Species {i}"), Rank::Species).with_threshold(0.2),
                        Some(genus),
                    )
                    .unwrap()
            })
            .collect();

        let spec = KmerSpec::all_canonical(9).unwrap();
        let genomes: Vec<Vec<u8>> = (0..3).map(|i| random_seq(5_000, 17 + i)).collect();
        let mut builder = DatabaseBuilder::new(spec, taxonomy);
        for (i, seq) in genomes.iter().enumerate() {
            builder
                .add_genome_contigs(GenomeRecord::new(format!("g{i}"), species[i]), [seq])
                .unwrap();
        }
        let db = ReferenceDatabase::from_bytes(builder.to_bytes().unwrap(), LoadOptions::default())
            .unwrap();
        (Classifier::new(Arc::new(db), config).unwrap(), genomes)
    }

    #[test]
    fn test_exact_copy_is_distance_zero() {
        let (classifier, genomes) = make_classifier(ClassifierConfig::default());
        let result = classifier.classify(&genomes[1]);

        let closest = result.closest_match.as_ref().unwrap();
        assert_eq!(closest.index, 1);
        assert_eq!(closest.distance, 0.0);
        assert_eq!(
            result.predicted_taxon,
            Some(classifier.database().genomes()[1].taxon)
        );
        assert_eq!(result.confidence(), Confidence::Confident);
        assert_eq!(result.neighbors.len(), 3);
        assert_eq!(result.neighbors[0].index, 1);
    }

    #[test]
    fn test_too_short_query() {
        let (classifier, _) = make_classifier(ClassifierConfig::default());
        let result = classifier.classify(b"ACGTA");
        assert!(result.success);
        assert_eq!(result.warnings, vec![Warning::InputTooShort { length: 5, k: 9 }]);
        assert_eq!(result.confidence(), Confidence::NoMatch);
        assert!(result.closest_match.is_none());
    }

    #[test]
    fn test_empty_signature_query() {
        let (classifier, _) = make_classifier(ClassifierConfig::default());
        let result = classifier.classify(b"NNNNNNNNNNNNNNNNNNNN");
        assert_eq!(result.warnings, vec![Warning::EmptySignature]);
        assert!(result.predicted_taxon.is_none());
    }

    #[test]
    fn test_distances_and_rank() {
        let (classifier, genomes) = make_classifier(ClassifierConfig::default());
        let spec = classifier.database().kmer_spec().clone();
        let sig = calc_signature(&spec, &genomes[2]);

        let distances = classifier.distances(&sig);
        assert_eq!(distances.len(), 3);
        assert_eq!(distances[2], 0.0);
        assert!(distances.iter().all(|d| (0.0..=1.0).contains(d)));

        let subset = classifier.distances_to(&sig, &[2, 0]).unwrap();
        assert_eq!(subset, vec![distances[2], distances[0]]);
        assert!(matches!(
            classifier.distances_to(&sig, &[3]),
            Err(ClassifyError::GenomeIndex { index: 3, count: 3 })
        ));

        assert_eq!(classifier.rank(&distances)[0], 2);
    }

    #[test]
    fn test_rank_breaks_ties_by_index() {
        let ranking = rank_distances(&[0.5, 0.1, 0.5, 0.1, 0.0]);
        assert_eq!(ranking, vec![4, 1, 3, 0, 2]);
    }

    #[test]
    fn test_spec_mismatch() {
        let (classifier, genomes) = make_classifier(ClassifierConfig::default());
        let other = KmerSpec::default();
        let sig = calc_signature(&other, &genomes[0]);
        let err = classifier.classify_signature(&sig, &other).unwrap_err();
        assert!(matches!(err, ClassifyError::SpecMismatch { .. }));

        let spec = classifier.database().kmer_spec().clone();
        let sig = calc_signature(&spec, &genomes[0]);
        let result = classifier.classify_signature(&sig, &spec).unwrap();
        assert_eq!(result.closest_match.unwrap().index, 0);
    }

    #[test]
    fn test_dedicated_pool_matches_global() {
        let (global, genomes) = make_classifier(ClassifierConfig::default());
        let (pooled, _) = make_classifier(ClassifierConfig {
            threads: Some(2),
            neighbors: 2,
            ..ClassifierConfig::default()
        });

        let a = global.classify(&genomes[0]);
        let b = pooled.classify(&genomes[0]);
        assert_eq!(a.predicted_taxon, b.predicted_taxon);
        assert_eq!(a.closest_match, b.closest_match);
        assert_eq!(b.neighbors.len(), 2);
        assert_eq!(&a.neighbors[..2], &b.neighbors[..]);
    }

    #[test]
    fn test_batch_and_cancellation() {
        let (classifier, genomes) = make_classifier(ClassifierConfig::default());
        let queries: Vec<QueryInput> = genomes
            .iter()
            .enumerate()
            .map(|(i, g)| QueryInput::new(format!("q{i}"), vec![g.clone()]))
            .collect();

        let token = CancellationToken::new();
        let results = classifier.classify_batch(&queries, &token);
        assert!(!results.cancelled);
        assert_eq!(results.items.len(), 3);
        for (i, item) in results.items.iter().enumerate() {
            assert_eq!(item.label, format!("q{i}"));
            assert_eq!(item.result.closest_match.as_ref().unwrap().index, i);
        }

        let token = CancellationToken::new();
        token.clone().cancel();
        assert!(token.is_cancelled());
        let results = classifier.classify_batch(&queries, &token);
        assert!(results.cancelled);
        assert!(results.items.is_empty());
    }
}
