// SPDX-License-Identifier: AGPL-3.0-or-later
// SPDX-FileCopyrightText: 2024 Hyperpolymath

//! Multi-label learners evaluated by the pipeline
//!
//! Implements:
//! - ML-kNN (Bayesian posterior from neighbour label counts)
//! - BR-kNN (binary relevance over a shared k-NN search)
//! - Classifier chain (one logistic link per label, label order)
//!
//! All learners expose the same train/predict surface through
//! [`MultiLabelLearner`] and are created from a [`ClassifierKind`] through a
//! [`ClassifierFactory`].

use crate::datasets::{AttributeKind, MultiLabelDataset};
use crate::error::{PipelineError, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Prediction for one instance
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MultiLabelOutput {
    /// Relevance decision per label
    pub bipartition: Vec<bool>,
    /// Confidence per label, higher means more relevant
    pub confidences: Vec<f64>,
}

impl MultiLabelOutput {
    /// Threshold confidences into a bipartition (`>= threshold` is relevant)
    pub fn from_confidences(confidences: Vec<f64>, threshold: f64) -> Self {
        Self {
            bipartition: confidences.iter().map(|c| *c >= threshold).collect(),
            confidences,
        }
    }

    pub fn num_labels(&self) -> usize {
        self.confidences.len()
    }

    /// 1-based rank of each label by descending confidence, ties by label order
    pub fn ranking(&self) -> Vec<usize> {
        let mut order: Vec<usize> = (0..self.confidences.len()).collect();
        // NaN confidence ranks last
        let key = |l: usize| {
            let c = self.confidences[l];
            if c.is_nan() {
                f64::NEG_INFINITY
            } else {
                c
            }
        };
        order.sort_by(|&a, &b| key(b).total_cmp(&key(a)).then(a.cmp(&b)));

        let mut ranks = vec![0; order.len()];
        for (position, &label) in order.iter().enumerate() {
            ranks[label] = position + 1;
        }
        ranks
    }
}

/// Trait for all multi-label learners
pub trait MultiLabelLearner: Send + Sync {
    /// Train on the given dataset
    fn build(&mut self, train: &MultiLabelDataset) -> Result<()>;

    /// Predict one instance from its feature values
    fn predict(&self, features: &[f64]) -> Result<MultiLabelOutput>;

    /// Label names seen during training, in output order
    fn label_names(&self) -> &[String];

    /// Feature attribute names seen during training, in input order
    fn feature_names(&self) -> &[String];

    /// Number of feature values `predict` expects
    fn num_features(&self) -> usize {
        self.feature_names().len()
    }

    /// Predict every instance of a dataset laid out like the training set
    fn predict_dataset(&self, data: &MultiLabelDataset) -> Result<Vec<MultiLabelOutput>> {
        if data.labels().names() != self.label_names() {
            return Err(PipelineError::evaluation(format!(
                "Test labels {:?} differ from training labels {:?}",
                data.labels().names(),
                self.label_names()
            )));
        }
        if data.num_features() != self.num_features() {
            return Err(PipelineError::evaluation(format!(
                "Test set has {} features, model expects {}",
                data.num_features(),
                self.num_features()
            )));
        }
        if let Some((found, expected)) = data
            .feature_attributes()
            .zip(self.feature_names())
            .find(|(attr, name)| attr.name != **name)
        {
            return Err(PipelineError::evaluation(format!(
                "Test feature '{}' found where the model expects '{}'",
                found.name, expected
            )));
        }
        (0..data.num_instances())
            .map(|row| self.predict(&data.features(row)))
            .collect()
    }

    /// Get model name
    fn name(&self) -> &str;

    /// Get model description
    fn description(&self) -> &str;
}

/// Closed set of learners the pipeline can run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ClassifierKind {
    MlKnn,
    BrKnn,
    ClassifierChain,
}

impl ClassifierKind {
    pub const ALL: [ClassifierKind; 3] =
        [ClassifierKind::MlKnn, ClassifierKind::BrKnn, ClassifierKind::ClassifierChain];

    pub fn name(&self) -> &'static str {
        match self {
            ClassifierKind::MlKnn => "MLkNN",
            ClassifierKind::BrKnn => "BRkNN",
            ClassifierKind::ClassifierChain => "ClassifierChain",
        }
    }

    /// Key enabling this classifier in the run configuration
    pub fn config_key(&self) -> &'static str {
        match self {
            ClassifierKind::MlKnn => "mlknn",
            ClassifierKind::BrKnn => "brknn",
            ClassifierKind::ClassifierChain => "chain",
        }
    }
}

impl fmt::Display for ClassifierKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for ClassifierKind {
    type Err = PipelineError;

    /// Accepts the display name, the config key, or a dotted class path
    /// whose last segment is the display name
    fn from_str(s: &str) -> Result<Self> {
        let short = s.rsplit('.').next().unwrap_or(s);
        ClassifierKind::ALL
            .into_iter()
            .find(|k| k.name().eq_ignore_ascii_case(short) || k.config_key().eq_ignore_ascii_case(short))
            .ok_or_else(|| PipelineError::ClassifierInstantiation {
                classifier: s.to_string(),
                reason: "no such classifier".to_string(),
            })
    }
}

/// Hyper-parameters shared by the learners
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClassifierParams {
    /// Neighbourhood size for the k-NN learners
    pub num_neighbors: usize,
    /// Laplace smoothing of ML-kNN
    pub smooth: f64,
    /// Gradient descent epochs per chain link
    pub chain_epochs: usize,
    pub chain_learning_rate: f64,
    pub chain_l2: f64,
}

impl Default for ClassifierParams {
    fn default() -> Self {
        Self {
            num_neighbors: 10,
            smooth: 1.0,
            chain_epochs: 200,
            chain_learning_rate: 0.5,
            chain_l2: 1e-3,
        }
    }
}

/// Maps a classifier kind to a fresh, untrained learner
pub type ClassifierFactory = fn(ClassifierKind, &ClassifierParams) -> Result<Box<dyn MultiLabelLearner>>;

/// Default factory
pub fn build_classifier(kind: ClassifierKind, params: &ClassifierParams) -> Result<Box<dyn MultiLabelLearner>> {
    if params.num_neighbors == 0 && kind != ClassifierKind::ClassifierChain {
        return Err(PipelineError::ClassifierInstantiation {
            classifier: kind.to_string(),
            reason: "number of neighbours must be positive".to_string(),
        });
    }
    Ok(match kind {
        ClassifierKind::MlKnn => Box::new(MlKnn::new(params.num_neighbors, params.smooth)),
        ClassifierKind::BrKnn => Box::new(BrKnn::new(params.num_neighbors)),
        ClassifierKind::ClassifierChain => Box::new(ClassifierChain::new(
            params.chain_epochs,
            params.chain_learning_rate,
            params.chain_l2,
        )),
    })
}

/// Factory function to create every available learner
pub fn all_classifiers(params: &ClassifierParams) -> Result<Vec<Box<dyn MultiLabelLearner>>> {
    ClassifierKind::ALL
        .into_iter()
        .map(|kind| build_classifier(kind, params))
        .collect()
}

fn check_training_set(train: &MultiLabelDataset, learner: &str) -> Result<()> {
    if train.num_instances() == 0 {
        return Err(PipelineError::training(format!("{}: training set is empty", learner)));
    }
    if train.num_labels() == 0 {
        return Err(PipelineError::training(format!(
            "{}: training set has no labels",
            learner
        )));
    }
    if train.num_features() == 0 {
        return Err(PipelineError::training(format!(
            "{}: training set has no feature attributes",
            learner
        )));
    }
    Ok(())
}

fn check_width(features: &[f64], expected: usize) -> Result<()> {
    if features.len() != expected {
        return Err(PipelineError::evaluation(format!(
            "Expected {} feature values, got {}",
            expected,
            features.len()
        )));
    }
    Ok(())
}

/// Min-max normalisation fitted on the training features
#[derive(Debug, Clone, Default)]
struct FeatureScaler {
    names: Vec<String>,
    min: Vec<f64>,
    range: Vec<f64>,
    nominal: Vec<bool>,
}

impl FeatureScaler {
    fn fit(train: &MultiLabelDataset) -> Self {
        let names = train.feature_attributes().map(|a| a.name.clone()).collect();
        let nominal: Vec<bool> = train
            .feature_attributes()
            .map(|a| matches!(a.kind, AttributeKind::Nominal(_)))
            .collect();
        let width = nominal.len();
        let mut min = vec![f64::INFINITY; width];
        let mut max = vec![f64::NEG_INFINITY; width];

        for row in 0..train.num_instances() {
            for (j, v) in train.features(row).into_iter().enumerate() {
                if v.is_nan() {
                    continue;
                }
                min[j] = min[j].min(v);
                max[j] = max[j].max(v);
            }
        }

        let range = min
            .iter()
            .zip(&max)
            .map(|(lo, hi)| if hi > lo { hi - lo } else { 1.0 })
            .collect();
        let min = min.into_iter().map(|m| if m.is_finite() { m } else { 0.0 }).collect();

        Self {
            names,
            min,
            range,
            nominal,
        }
    }


    fn transform(&self, features: &[f64]) -> Vec<f64> {
        features
            .iter()
            .enumerate()
            .map(|(j, &v)| {
                if v.is_nan() || self.nominal[j] {
                    v
                } else {
                    (v - self.min[j]) / self.range[j]
                }
            })
            .collect()
    }

    /// Squared distance; a missing value or differing nominal value counts 1
    fn distance(&self, a: &[f64], b: &[f64]) -> f64 {
        a.iter()
            .zip(b)
            .enumerate()
            .map(|(j, (x, y))| {
                let diff = if x.is_nan() || y.is_nan() {
                    1.0
                } else if self.nominal[j] {
                    if x == y {
                        0.0
                    } else {
                        1.0
                    }
                } else {
                    x - y
                };
                diff * diff
            })
            .sum()
    }
}

/// Normalised training points shared by the k-NN learners
#[derive(Debug, Clone, Default)]
struct NeighborIndex {
    scaler: FeatureScaler,
    points: Vec<Vec<f64>>,
    labels: Vec<Vec<bool>>,
}

impl NeighborIndex {
    fn fit(train: &MultiLabelDataset) -> Self {
        let scaler = FeatureScaler::fit(train);
        let points = (0..train.num_instances())
            .map(|row| scaler.transform(&train.features(row)))
            .collect();
        Self {
            scaler,
            points,
            labels: train.label_matrix(),
        }
    }

    /// Indices of the `k` closest training points, ties by index
    fn nearest(&self, query: &[f64], k: usize, exclude: Option<usize>) -> Vec<usize> {
        let mut scored: Vec<(f64, usize)> = self
            .points
            .iter()
            .enumerate()
            .filter(|(i, _)| Some(*i) != exclude)
            .map(|(i, p)| {
                let d = self.scaler.distance(query, p);
                (if d.is_nan() { f64::INFINITY } else { d }, i)
            })
            .collect();
        scored.sort_by(|a, b| a.0.total_cmp(&b.0).then(a.1.cmp(&b.1)));
        scored.into_iter().take(k).map(|(_, i)| i).collect()
    }

    /// Number of neighbours carrying each label
    fn label_counts(&self, neighbors: &[usize], num_labels: usize) -> Vec<usize> {
        let mut counts = vec![0; num_labels];
        for &n in neighbors {
            for (count, relevant) in counts.iter_mut().zip(&self.labels[n]) {
                if *relevant {
                    *count += 1;
                }
            }
        }
        counts
    }
}

/// ML-kNN: per-label posterior from the label counts among k neighbours
#[derive(Debug, Clone)]
pub struct MlKnn {
    num_neighbors: usize,
    smooth: f64,
    effective_k: usize,
    index: NeighborIndex,
    label_names: Vec<String>,
    prior: Vec<f64>,
    /// P(count = c | label relevant), indexed [label][c]
    cond_relevant: Vec<Vec<f64>>,
    /// P(count = c | label irrelevant), indexed [label][c]
    cond_irrelevant: Vec<Vec<f64>>,
}

impl MlKnn {
    pub fn new(num_neighbors: usize, smooth: f64) -> Self {
        Self {
            num_neighbors,
            smooth,
            effective_k: 0,
            index: NeighborIndex::default(),
            label_names: Vec::new(),
            prior: Vec::new(),
            cond_relevant: Vec::new(),
            cond_irrelevant: Vec::new(),
        }
    }
}

impl MultiLabelLearner for MlKnn {
    fn build(&mut self, train: &MultiLabelDataset) -> Result<()> {
        check_training_set(train, self.name())?;

        let n = train.num_instances();
        let num_labels = train.num_labels();
        let s = self.smooth;
        self.index = NeighborIndex::fit(train);
        self.label_names = train.labels().names().to_vec();
        self.effective_k = self.num_neighbors.min(n - 1);
        if self.effective_k < self.num_neighbors {
            tracing::warn!(
                "MLkNN: only {} training instances, using k={}",
                n,
                self.effective_k
            );
        }
        let k = self.effective_k;

        self.prior = (0..num_labels)
            .map(|l| {
                let count = self.index.labels.iter().filter(|y| y[l]).count() as f64;
                (s + count) / (2.0 * s + n as f64)
            })
            .collect();

        let mut hits_relevant = vec![vec![0usize; k + 1]; num_labels];
        let mut hits_irrelevant = vec![vec![0usize; k + 1]; num_labels];
        for i in 0..n {
            let neighbors = self.index.nearest(&self.index.points[i], k, Some(i));
            let counts = self.index.label_counts(&neighbors, num_labels);
            for l in 0..num_labels {
                if self.index.labels[i][l] {
                    hits_relevant[l][counts[l]] += 1;
                } else {
                    hits_irrelevant[l][counts[l]] += 1;
                }
            }
        }

        let smooth_table = |hits: &[usize]| -> Vec<f64> {
            let total: usize = hits.iter().sum();
            hits.iter()
                .map(|&h| (s + h as f64) / (s * (k + 1) as f64 + total as f64))
                .collect()
        };
        self.cond_relevant = hits_relevant.iter().map(|h| smooth_table(h.as_slice())).collect();
        self.cond_irrelevant = hits_irrelevant.iter().map(|h| smooth_table(h.as_slice())).collect();

        Ok(())
    }

    fn predict(&self, features: &[f64]) -> Result<MultiLabelOutput> {
        check_width(features, self.num_features())?;
        let query = self.index.scaler.transform(features);
        let neighbors = self.index.nearest(&query, self.effective_k, None);
        let counts = self.index.label_counts(&neighbors, self.label_names.len());

        let confidences: Vec<f64> = counts
            .iter()
            .enumerate()
            .map(|(l, &c)| {
                let relevant = self.prior[l] * self.cond_relevant[l][c];
                let irrelevant = (1.0 - self.prior[l]) * self.cond_irrelevant[l][c];
                if relevant + irrelevant > 0.0 {
                    relevant / (relevant + irrelevant)
                } else {
                    self.prior[l]
                }
            })
            .collect();

        Ok(MultiLabelOutput {
            bipartition: confidences.iter().map(|p| *p > 0.5).collect(),
            confidences,
        })
    }

    fn label_names(&self) -> &[String] {
        &self.label_names
    }

    fn feature_names(&self) -> &[String] {
        &self.index.scaler.names
    }

    fn name(&self) -> &str {
        "MLkNN"
    }

    fn description(&self) -> &str {
        "Multi-label k-nearest neighbours with Bayesian label posteriors"
    }
}

/// BR-kNN: label confidence is the share of the k neighbours carrying it
#[derive(Debug, Clone)]
pub struct BrKnn {
    num_neighbors: usize,
    effective_k: usize,
    index: NeighborIndex,
    label_names: Vec<String>,
}

impl BrKnn {
    pub fn new(num_neighbors: usize) -> Self {
        Self {
            num_neighbors,
            effective_k: 0,
            index: NeighborIndex::default(),
            label_names: Vec::new(),
        }
    }
}

impl MultiLabelLearner for BrKnn {
    fn build(&mut self, train: &MultiLabelDataset) -> Result<()> {
        check_training_set(train, self.name())?;
        self.index = NeighborIndex::fit(train);
        self.label_names = train.labels().names().to_vec();
        self.effective_k = self.num_neighbors.min(train.num_instances());
        Ok(())
    }

    fn predict(&self, features: &[f64]) -> Result<MultiLabelOutput> {
        check_width(features, self.num_features())?;
        let query = self.index.scaler.transform(features);
        let neighbors = self.index.nearest(&query, self.effective_k, None);
        let counts = self.index.label_counts(&neighbors, self.label_names.len());

        let k = neighbors.len().max(1) as f64;
        let confidences = counts.iter().map(|&c| c as f64 / k).collect();
        Ok(MultiLabelOutput::from_confidences(confidences, 0.5))
    }

    fn label_names(&self) -> &[String] {
        &self.label_names
    }

    fn feature_names(&self) -> &[String] {
        &self.index.scaler.names
    }

    fn name(&self) -> &str {
        "BRkNN"
    }

    fn description(&self) -> &str {
        "Binary relevance k-nearest neighbours"
    }
}

/// Logistic regression link of a classifier chain
#[derive(Debug, Clone, Default)]
struct LogisticLink {
    weights: Vec<f64>,
    bias: f64,
}

fn sigmoid(z: f64) -> f64 {
    1.0 / (1.0 + (-z).exp())
}

impl LogisticLink {
    /// Full-batch gradient descent from zero weights
    fn fit(inputs: &[Vec<f64>], targets: &[bool], epochs: usize, learning_rate: f64, l2: f64) -> Self {
        let width = inputs.first().map(Vec::len).unwrap_or(0);
        let n = inputs.len().max(1) as f64;
        let mut link = Self {
            weights: vec![0.0; width],
            bias: 0.0,
        };

        for _ in 0..epochs {
            let mut grad_w = vec![0.0; width];
            let mut grad_b = 0.0;
            for (x, &y) in inputs.iter().zip(targets) {
                let error = link.probability(x) - if y { 1.0 } else { 0.0 };
                for (g, xi) in grad_w.iter_mut().zip(x) {
                    *g += error * xi;
                }
                grad_b += error;
            }
            for (w, g) in link.weights.iter_mut().zip(&grad_w) {
                *w -= learning_rate * (g / n + l2 * *w);
            }
            link.bias -= learning_rate * grad_b / n;
        }

        link
    }

    fn probability(&self, x: &[f64]) -> f64 {
        let z: f64 = self.weights.iter().zip(x).map(|(w, xi)| w * xi).sum::<f64>() + self.bias;
        sigmoid(z)
    }
}

/// Classifier chain: link `j` sees the features plus labels `0..j`
#[derive(Debug, Clone)]
pub struct ClassifierChain {
    epochs: usize,
    learning_rate: f64,
    l2: f64,
    scaler: FeatureScaler,
    links: Vec<LogisticLink>,
    label_names: Vec<String>,
}

impl ClassifierChain {
    pub fn new(epochs: usize, learning_rate: f64, l2: f64) -> Self {
        Self {
            epochs,
            learning_rate,
            l2,
            scaler: FeatureScaler::default(),
            links: Vec::new(),
            label_names: Vec::new(),
        }
    }

    /// Normalised features with missing values imputed at mid-range
    fn chain_input(&self, features: &[f64]) -> Vec<f64> {
        self.scaler
            .transform(features)
            .into_iter()
            .map(|v| if v.is_nan() { 0.5 } else { v })
            .collect()
    }
}

impl MultiLabelLearner for ClassifierChain {
    fn build(&mut self, train: &MultiLabelDataset) -> Result<()> {
        check_training_set(train, self.name())?;
        self.scaler = FeatureScaler::fit(train);
        self.label_names = train.labels().names().to_vec();

        let truth = train.label_matrix();
        let mut inputs: Vec<Vec<f64>> = (0..train.num_instances())
            .map(|row| self.chain_input(&train.features(row)))
            .collect();

        self.links = Vec::with_capacity(self.label_names.len());
        for l in 0..self.label_names.len() {
            let targets: Vec<bool> = truth.iter().map(|y| y[l]).collect();
            let link = LogisticLink::fit(&inputs, &targets, self.epochs, self.learning_rate, self.l2);
            if link.weights.iter().any(|w| !w.is_finite()) || !link.bias.is_finite() {
                return Err(PipelineError::training(format!(
                    "ClassifierChain: link for '{}' diverged",
                    self.label_names[l]
                )));
            }
            self.links.push(link);

            // Later links are trained on the true value of this label
            for (input, &y) in inputs.iter_mut().zip(&targets) {
                input.push(if y { 1.0 } else { 0.0 });
            }
        }

        Ok(())
    }

    fn predict(&self, features: &[f64]) -> Result<MultiLabelOutput> {
        check_width(features, self.num_features())?;
        let mut input = self.chain_input(features);
        let mut confidences = Vec::with_capacity(self.links.len());

        for link in &self.links {
            let p = link.probability(&input);
            confidences.push(p);
            input.push(if p >= 0.5 { 1.0 } else { 0.0 });
        }

        Ok(MultiLabelOutput::from_confidences(confidences, 0.5))
    }

    fn label_names(&self) -> &[String] {
        &self.label_names
    }

    fn feature_names(&self) -> &[String] {
        &self.scaler.names
    }

    fn name(&self) -> &str {
        "ClassifierChain"
    }

    fn description(&self) -> &str {
        "Classifier chain of logistic regression links in label order"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::datasets::{Attribute, Instances, LabelMetadata};

    /// 10x10 grid; label X relevant when x > 0.5, label Y when y > 0.5
    fn grid_dataset() -> MultiLabelDataset {
        let mut instances = Instances::new(
            "grid",
            vec![
                Attribute::numeric("x"),
                Attribute::numeric("y"),
                Attribute::binary_label("X"),
                Attribute::binary_label("Y"),
            ],
        )
        .unwrap();
        for i in 0..10 {
            for j in 0..10 {
                let x = (i as f64 + 0.5) / 10.0;
                let y = (j as f64 + 0.5) / 10.0;
                let lx = if x > 0.5 { 1.0 } else { 0.0 };
                let ly = if y > 0.5 { 1.0 } else { 0.0 };
                instances.push(vec![x, y, lx, ly]).unwrap();
            }
        }
        let labels = LabelMetadata::new(vec!["X".into(), "Y".into()]).unwrap();
        MultiLabelDataset::new(instances, labels).unwrap()
    }

    fn assert_quadrants(model: &dyn MultiLabelLearner) {
        assert_eq!(model.predict(&[0.9, 0.9]).unwrap().bipartition, vec![true, true]);
        assert_eq!(model.predict(&[0.1, 0.1]).unwrap().bipartition, vec![false, false]);
        assert_eq!(model.predict(&[0.9, 0.1]).unwrap().bipartition, vec![true, false]);
        assert_eq!(model.predict(&[0.1, 0.9]).unwrap().bipartition, vec![false, true]);
    }

    #[test]
    fn test_ranking_breaks_ties_by_label_order() {
        let output = MultiLabelOutput::from_confidences(vec![0.2, 0.9, 0.2, 0.5], 0.5);
        assert_eq!(output.ranking(), vec![3, 1, 4, 2]);
        assert_eq!(output.bipartition, vec![false, true, false, true]);
    }

    #[test]
    fn test_mlknn_learns_quadrants() {
        let mut model = MlKnn::new(3, 1.0);
        model.build(&grid_dataset()).unwrap();
        assert_quadrants(&model);
        let output = model.predict(&[0.9, 0.9]).unwrap();
        assert!(output.confidences.iter().all(|p| (0.0..=1.0).contains(p)));
    }

    #[test]
    fn test_brknn_learns_quadrants() {
        let mut model = BrKnn::new(3);
        model.build(&grid_dataset()).unwrap();
        assert_quadrants(&model);
    }

    #[test]
    fn test_chain_learns_quadrants() {
        let mut model = ClassifierChain::new(500, 1.0, 0.0);
        model.build(&grid_dataset()).unwrap();
        assert_quadrants(&model);
    }

    #[test]
    fn test_empty_label_set_is_training_error() {
        let (instances, _) = grid_dataset().into_parts();
        let dataset = MultiLabelDataset::new(instances, LabelMetadata::default()).unwrap();

        for mut model in all_classifiers(&ClassifierParams::default()).unwrap() {
            let err = model.build(&dataset).unwrap_err();
            assert_eq!(err.kind(), "TrainingError", "{}", model.name());
        }
    }

    #[test]
    fn test_empty_training_set_is_training_error() {
        let instances = Instances::new("empty", vec![Attribute::numeric("x"), Attribute::binary_label("X")]).unwrap();
        let labels = LabelMetadata::new(vec!["X".into()]).unwrap();
        let dataset = MultiLabelDataset::new(instances, labels).unwrap();

        let mut model = BrKnn::new(3);
        assert_eq!(model.build(&dataset).unwrap_err().kind(), "TrainingError");
    }

    #[test]
    fn test_wrong_width_is_evaluation_error() {
        let mut model = BrKnn::new(3);
        model.build(&grid_dataset()).unwrap();
        assert_eq!(model.predict(&[0.5]).unwrap_err().kind(), "EvaluationError");
    }

    #[test]
    fn test_predict_dataset_checks_labels() {
        let mut model = MlKnn::new(3, 1.0);
        model.build(&grid_dataset()).unwrap();
        assert_eq!(model.predict_dataset(&grid_dataset()).unwrap().len(), 100);

        let (instances, _) = grid_dataset().into_parts();
        let other = MultiLabelDataset::new(instances, LabelMetadata::new(vec!["Y".into()]).unwrap()).unwrap();
        assert_eq!(model.predict_dataset(&other).unwrap_err().kind(), "EvaluationError");
    }

    #[test]
    fn test_predict_dataset_checks_feature_order() {
        let mut model = BrKnn::new(3);
        model.build(&grid_dataset()).unwrap();
        assert_eq!(model.feature_names(), &["x".to_string(), "y".to_string()]);

        let mut swapped = Instances::new(
            "grid",
            vec![
                Attribute::numeric("y"),
                Attribute::numeric("x"),
                Attribute::binary_label("X"),
                Attribute::binary_label("Y"),
            ],
        )
        .unwrap();
        swapped.push(vec![0.1, 0.9, 1.0, 0.0]).unwrap();
        let labels = LabelMetadata::new(vec!["X".into(), "Y".into()]).unwrap();
        let swapped = MultiLabelDataset::new(swapped, labels).unwrap();

        assert_eq!(model.predict_dataset(&swapped).unwrap_err().kind(), "EvaluationError");
    }

    #[test]
    fn test_nan_confidence_ranks_last() {
        let output = MultiLabelOutput::from_confidences(vec![f64::NAN, 0.2, 0.9], 0.5);
        assert_eq!(output.ranking(), vec![3, 2, 1]);
    }

    #[test]
    fn test_infinite_feature_does_not_break_search() {
        let mut model = MlKnn::new(5, 1.0);
        model.build(&grid_dataset()).unwrap();
        let output = model.predict(&[f64::INFINITY, 0.9]).unwrap();
        assert_eq!(output.num_labels(), 2);
        assert_eq!(output.ranking().len(), 2);
    }

    #[test]
    fn test_prediction_is_repeatable() {
        let train = grid_dataset();
        let mut model = MlKnn::new(5, 1.0);
        model.build(&train).unwrap();
        assert_eq!(model.predict_dataset(&train).unwrap(), model.predict_dataset(&train).unwrap());
    }

    #[test]
    fn test_kind_parsing() {
        assert_eq!("mlknn".parse::<ClassifierKind>().unwrap(), ClassifierKind::MlKnn);
        assert_eq!(
            "mulan.classifier.transformation.ClassifierChain".parse::<ClassifierKind>().unwrap(),
            ClassifierKind::ClassifierChain
        );
        assert_eq!("BRkNN".parse::<ClassifierKind>().unwrap(), ClassifierKind::BrKnn);
        let err = "RAkEL".parse::<ClassifierKind>().unwrap_err();
        assert_eq!(err.kind(), "ClassifierInstantiationError");
    }

    #[test]
    fn test_factory() {
        let params = ClassifierParams::default();
        let names: Vec<String> = all_classifiers(&params)
            .unwrap()
            .iter()
            .map(|c| c.name().to_string())
            .collect();
        assert_eq!(names, vec!["MLkNN", "BRkNN", "ClassifierChain"]);

        let zero_k = ClassifierParams {
            num_neighbors: 0,
            ..ClassifierParams::default()
        };
        assert!(build_classifier(ClassifierKind::MlKnn, &zero_k).is_err());
        assert!(build_classifier(ClassifierKind::ClassifierChain, &zero_k).is_ok());
    }
}
