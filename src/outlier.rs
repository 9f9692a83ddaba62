// 🔎 Outlier Detector - per-field anomaly scoring
// Two interchangeable strategies behind one trait:
//   - ZScore: |x - mean| / std above a threshold, one field at a time
//   - IsolationForest: joint, standardized feature vectors; flags the
//     `contamination` share of records that isolate fastest
// Results from several strategies are unioned, never merged into one verdict.

use crate::config::OutlierConfig;
use crate::diagnostics::Diagnostics;
use crate::error::{AnalysisError, Result};
use crate::record::{Column, RecordTable};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};

const EULER_GAMMA: f64 = 0.577_215_664_901_532_9;

// ============================================================================
// ANOMALY RESULT
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnomalyResult {
    /// Zero-based row index into the record table.
    pub record_id: usize,

    /// Scored field, or `a+b` for a joint feature vector.
    pub field: String,

    /// Which strategy produced this result.
    pub strategy: String,

    /// Z-score, or the forest's decision value (more negative = more anomalous).
    pub score: f64,

    pub is_anomaly: bool,
}

/// Union of every strategy's results, ordered by (record_id, field, strategy).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AnomalySet {
    pub results: Vec<AnomalyResult>,
}

impl AnomalySet {
    pub fn union(sets: Vec<Vec<AnomalyResult>>) -> Self {
        let mut results: Vec<AnomalyResult> = sets.into_iter().flatten().collect();
        results.sort_by(|a, b| {
            a.record_id
                .cmp(&b.record_id)
                .then_with(|| a.field.cmp(&b.field))
                .then_with(|| a.strategy.cmp(&b.strategy))
        });
        AnomalySet { results }
    }

    pub fn flagged(&self) -> impl Iterator<Item = &AnomalyResult> {
        self.results.iter().filter(|r| r.is_anomaly)
    }

    pub fn flagged_count(&self) -> usize {
        self.flagged().count()
    }

    /// Distinct record ids flagged by any strategy on any field.
    pub fn flagged_records(&self) -> Vec<usize> {
        let mut ids: Vec<usize> = self.flagged().map(|r| r.record_id).collect();
        ids.dedup();
        ids
    }

    pub fn for_record(&self, record_id: usize) -> Vec<&AnomalyResult> {
        self.results
            .iter()
            .filter(|r| r.record_id == record_id)
            .collect()
    }

    /// (record_id, field) pairs on which strategies disagree.
    pub fn conflicts(&self) -> Vec<(usize, String)> {
        let mut out = Vec::new();
        for group in self
            .results
            .chunk_by(|a, b| a.record_id == b.record_id && a.field == b.field)
        {
            if group.iter().any(|r| r.is_anomaly) && group.iter().any(|r| !r.is_anomaly) {
                out.push((group[0].record_id, group[0].field.clone()));
            }
        }
        out
    }

    pub fn len(&self) -> usize {
        self.results.len()
    }

    pub fn is_empty(&self) -> bool {
        self.results.is_empty()
    }
}

// ============================================================================
// STRATEGY TRAIT
// ============================================================================

/// One anomaly-scoring algorithm.
pub trait OutlierStrategy: Send + Sync {
    fn name(&self) -> &str;

    /// Score `fields` over `table`. Fails with `InsufficientData` when fewer
    /// than 2 usable records exist or a field is absent from the table.
    fn score(&self, table: &RecordTable, fields: &[Column]) -> Result<Vec<AnomalyResult>>;
}

fn check_fields(table: &RecordTable, fields: &[Column]) -> Result<()> {
    if fields.is_empty() {
        return Err(AnalysisError::InsufficientData(
            "no feature columns selected".to_string(),
        ));
    }
    if let Some(missing) = fields.iter().find(|c| !table.has_column(**c)) {
        return Err(AnalysisError::InsufficientData(format!(
            "feature column '{}' is absent",
            missing
        )));
    }
    if table.len() < 2 {
        return Err(AnalysisError::InsufficientData(format!(
            "{} record(s), need at least 2",
            table.len()
        )));
    }
    Ok(())
}

/// Population mean and standard deviation.
fn mean_std(values: &[f64]) -> (f64, f64) {
    if values.is_empty() {
        return (0.0, 0.0);
    }
    let n = values.len() as f64;
    let mean = values.iter().sum::<f64>() / n;
    let variance = values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / n;
    (mean, variance.sqrt())
}

/// Standard deviation this small relative to the mean is treated as zero.
fn is_degenerate(mean: f64, std: f64) -> bool {
    std <= 1e-12 * mean.abs().max(1.0)
}

// ============================================================================
// Z-SCORE STRATEGY
// ============================================================================

#[derive(Debug, Clone)]
pub struct ZScoreStrategy {
    pub threshold: f64,
}

impl ZScoreStrategy {
    pub fn new(threshold: f64) -> Self {
        ZScoreStrategy { threshold }
    }
}

impl Default for ZScoreStrategy {
    fn default() -> Self {
        Self::new(3.0)
    }
}

impl OutlierStrategy for ZScoreStrategy {
    fn name(&self) -> &str {
        "zscore"
    }

    fn score(&self, table: &RecordTable, fields: &[Column]) -> Result<Vec<AnomalyResult>> {
        check_fields(table, fields)?;

        let mut results = Vec::new();
        for field in fields {
            let values = table.numeric_values(*field);
            if values.len() < 2 {
                return Err(AnalysisError::InsufficientData(format!(
                    "field '{}' has {} value(s), need at least 2",
                    field,
                    values.len()
                )));
            }

            let raw: Vec<f64> = values.iter().map(|(_, v)| *v).collect();
            let (mean, std) = mean_std(&raw);
            let degenerate = is_degenerate(mean, std);

            for (record_id, value) in values {
                let score = if degenerate { 0.0 } else { (value - mean) / std };
                results.push(AnomalyResult {
                    record_id,
                    field: field.name().to_string(),
                    strategy: self.name().to_string(),
                    score,
                    is_anomaly: score.abs() > self.threshold,
                });
            }
        }

        Ok(results)
    }
}

// ============================================================================
// ISOLATION FOREST STRATEGY
// ============================================================================

/// Isolation forest (Liu, Ting & Zhou 2008) with scikit-learn's scoring:
/// `decision = score_samples - offset`, offset = contamination percentile.
#[derive(Debug, Clone)]
pub struct IsolationForestStrategy {
    pub n_trees: usize,
    pub max_samples: usize,
    pub contamination: f64,
    pub seed: u64,
}

impl IsolationForestStrategy {
    pub fn new(contamination: f64, seed: u64) -> Self {
        IsolationForestStrategy {
            n_trees: 100,
            max_samples: 256,
            contamination,
            seed,
        }
    }

    /// Fit on `data` and return each row's raw score (`-2^(-E[h]/c(psi))`).
    pub fn score_samples(&self, data: &[Vec<f64>]) -> Vec<f64> {
        let n = data.len();
        let psi = self.max_samples.min(n).max(2);
        let max_depth = (psi as f64).log2().ceil() as usize;
        let mut rng = StdRng::seed_from_u64(self.seed);

        let trees: Vec<IsolationTree> = (0..self.n_trees)
            .map(|_| {
                let sample = rand::seq::index::sample(&mut rng, n, psi.min(n)).into_vec();
                IsolationTree::fit(data, sample, max_depth, &mut rng)
            })
            .collect();

        let normalizer = average_path_length(psi);
        data.iter()
            .map(|row| {
                let mean_depth = trees.iter().map(|t| t.path_length(row)).sum::<f64>()
                    / trees.len() as f64;
                -(2f64.powf(-mean_depth / normalizer))
            })
            .collect()
    }
}

impl Default for IsolationForestStrategy {
    fn default() -> Self {
        Self::new(0.1, 42)
    }
}

impl OutlierStrategy for IsolationForestStrategy {
    fn name(&self) -> &str {
        "isolation_forest"
    }

    fn score(&self, table: &RecordTable, fields: &[Column]) -> Result<Vec<AnomalyResult>> {
        check_fields(table, fields)?;

        // Only records carrying every feature take part.
        let rows: Vec<(usize, Vec<f64>)> = table
            .records()
            .iter()
            .enumerate()
            .filter_map(|(i, r)| {
                let features: Option<Vec<f64>> = fields.iter().map(|f| r.numeric(*f)).collect();
                features.map(|f| (i, f))
            })
            .collect();

        if rows.len() < 2 {
            return Err(AnalysisError::InsufficientData(format!(
                "{} record(s) have every feature, need at least 2",
                rows.len()
            )));
        }

        let matrix = standardize(rows.iter().map(|(_, f)| f.clone()).collect());
        let scores = self.score_samples(&matrix);
        let offset = percentile(&scores, self.contamination * 100.0);

        let label = fields
            .iter()
            .map(|f| f.name())
            .collect::<Vec<_>>()
            .join("+");

        Ok(rows
            .iter()
            .zip(scores)
            .map(|((record_id, _), s)| {
                let decision = s - offset;
                AnomalyResult {
                    record_id: *record_id,
                    field: label.clone(),
                    strategy: self.name().to_string(),
                    score: decision,
                    is_anomaly: decision < 0.0,
                }
            })
            .collect())
    }
}

/// Zero mean, unit variance per column. Constant columns are only centered.
fn standardize(mut rows: Vec<Vec<f64>>) -> Vec<Vec<f64>> {
    let width = rows.first().map_or(0, |r| r.len());
    for j in 0..width {
        let column: Vec<f64> = rows.iter().map(|r| r[j]).collect();
        let (mean, std) = mean_std(&column);
        let scale = if is_degenerate(mean, std) { 1.0 } else { std };
        for row in rows.iter_mut() {
            row[j] = (row[j] - mean) / scale;
        }
    }
    rows
}

/// Linear-interpolated percentile, `q` in [0, 100].
fn percentile(values: &[f64], q: f64) -> f64 {
    let mut sorted = values.to_vec();
    sorted.sort_by(|a, b| a.total_cmp(b));
    if sorted.is_empty() {
        return 0.0;
    }
    let rank = (q / 100.0).clamp(0.0, 1.0) * (sorted.len() - 1) as f64;
    let lo = rank.floor() as usize;
    let hi = rank.ceil() as usize;
    sorted[lo] + (sorted[hi] - sorted[lo]) * (rank - lo as f64)
}

/// Expected path length of an unsuccessful BST search over `n` points.
fn average_path_length(n: usize) -> f64 {
    match n {
        0 | 1 => 0.0,
        2 => 1.0,
        _ => {
            let n = n as f64;
            2.0 * ((n - 1.0).ln() + EULER_GAMMA) - 2.0 * (n - 1.0) / n
        }
    }
}

#[derive(Debug, Clone)]
enum TreeNode {
    Split {
        feature: usize,
        threshold: f64,
        left: usize,
        right: usize,
    },
    Leaf {
        size: usize,
    },
}

#[derive(Debug, Clone)]
struct IsolationTree {
    nodes: Vec<TreeNode>,
}

impl IsolationTree {
    fn fit(data: &[Vec<f64>], sample: Vec<usize>, max_depth: usize, rng: &mut StdRng) -> Self {
        let mut tree = IsolationTree { nodes: Vec::new() };
        tree.grow(data, sample, 0, max_depth, rng);
        tree
    }

    fn grow(
        &mut self,
        data: &[Vec<f64>],
        rows: Vec<usize>,
        depth: usize,
        max_depth: usize,
        rng: &mut StdRng,
    ) -> usize {
        let id = self.nodes.len();
        self.nodes.push(TreeNode::Leaf { size: rows.len() });

        if depth >= max_depth || rows.len() <= 1 {
            return id;
        }

        // Candidate features: those not constant within this node.
        let width = data[rows[0]].len();
        let ranges: Vec<(usize, f64, f64)> = (0..width)
            .filter_map(|j| {
                let (lo, hi) = rows.iter().fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), &r| {
                    (lo.min(data[r][j]), hi.max(data[r][j]))
                });
                (hi > lo).then_some((j, lo, hi))
            })
            .collect();

        if ranges.is_empty() {
            return id;
        }

        let (feature, lo, hi) = ranges[rng.gen_range(0..ranges.len())];
        let threshold = rng.gen_range(lo..hi);
        let (left_rows, right_rows): (Vec<usize>, Vec<usize>) =
            rows.into_iter().partition(|&r| data[r][feature] <= threshold);

        let left = self.grow(data, left_rows, depth + 1, max_depth, rng);
        let right = self.grow(data, right_rows, depth + 1, max_depth, rng);
        self.nodes[id] = TreeNode::Split {
            feature,
            threshold,
            left,
            right,
        };
        id
    }

    fn path_length(&self, row: &[f64]) -> f64 {
        let mut node = 0;
        let mut depth = 0.0;
        loop {
            match &self.nodes[node] {
                TreeNode::Leaf { size } => return depth + average_path_length(*size),
                TreeNode::Split {
                    feature,
                    threshold,
                    left,
                    right,
                } => {
                    node = if row[*feature] <= *threshold { *left } else { *right };
                    depth += 1.0;
                }
            }
        }
    }
}

// ============================================================================
// DETECTOR
// ============================================================================

/// Runs each configured strategy over its own fields and unions the results.
pub struct OutlierDetector {
    strategies: Vec<(Box<dyn OutlierStrategy>, Vec<Column>)>,
}

impl OutlierDetector {
    pub fn new() -> Self {
        OutlierDetector {
            strategies: Vec::new(),
        }
    }

    pub fn with_strategy(mut self, strategy: Box<dyn OutlierStrategy>, fields: Vec<Column>) -> Self {
        self.strategies.push((strategy, fields));
        self
    }

    /// Z-score plus isolation forest, as configured.
    pub fn from_config(config: &OutlierConfig) -> Self {
        Self::new()
            .with_strategy(
                Box::new(ZScoreStrategy::new(config.zscore_threshold)),
                config.zscore_fields.clone(),
            )
            .with_strategy(
                Box::new(IsolationForestStrategy {
                    n_trees: config.n_trees,
                    max_samples: config.max_samples,
                    contamination: config.contamination,
                    seed: config.seed,
                }),
                config.density_fields.clone(),
            )
    }

    /// Score the table with every strategy.
    ///
    /// Configured fields absent from the table are dropped with a warning.
    /// If no strategy has any field left the stage is skipped
    /// (`MissingField`); a strategy that fails is logged and the others still
    /// contribute. If every strategy fails, the first error is returned.
    pub fn detect(&self, table: &RecordTable, diag: &mut Diagnostics) -> Result<AnomalySet> {
        let mut sets = Vec::new();
        let mut first_error = None;
        let mut attempted = 0;

        for (strategy, fields) in &self.strategies {
            let present: Vec<Column> = fields
                .iter()
                .copied()
                .filter(|f| table.has_column(*f))
                .collect();
            if present.len() < fields.len() {
                diag.warn(format!(
                    "{}: dropping absent field(s) {:?}",
                    strategy.name(),
                    fields
                        .iter()
                        .filter(|f| !present.contains(f))
                        .map(|f| f.name())
                        .collect::<Vec<_>>()
                ));
            }
            if present.is_empty() {
                continue;
            }

            attempted += 1;
            match strategy.score(table, &present) {
                Ok(results) => {
                    diag.info(format!(
                        "{}: {} scored, {} flagged",
                        strategy.name(),
                        results.len(),
                        results.iter().filter(|r| r.is_anomaly).count()
                    ));
                    sets.push(results);
                }
                Err(e) => {
                    diag.warn(format!("{}: {}", strategy.name(), e));
                    first_error.get_or_insert(e);
                }
            }
        }

        if attempted == 0 {
            return Err(AnalysisError::MissingField(
                "none of the configured outlier fields are present".to_string(),
            ));
        }
        if sets.is_empty() {
            if let Some(e) = first_error {
                return Err(e);
            }
        }

        Ok(AnomalySet::union(sets))
    }
}

impl Default for OutlierDetector {
    fn default() -> Self {
        Self::from_config(&OutlierConfig::default())
    }
}

/// Score one set of fields with one strategy.
pub fn detect(
    table: &RecordTable,
    fields: &[Column],
    strategy: &dyn OutlierStrategy,
) -> Result<AnomalySet> {
    Ok(AnomalySet::union(vec![strategy.score(table, fields)?]))
}

// ============================================================================
// TESTS
// ============================================================================
