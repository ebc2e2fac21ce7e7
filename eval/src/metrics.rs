// SPDX-License-Identifier: AGPL-3.0-or-later
// SPDX-FileCopyrightText: 2024 Hyperpolymath

//! Evaluation measures for multi-label classification
//!
//! Implements the standard battery:
//! - Hamming loss, subset accuracy
//! - Example-based precision, recall, F-measure, accuracy, specificity
//! - Micro-averaged precision, recall, F-measure
//! - Ranking measures: average precision, coverage, one-error, is-error,
//!   error-set size, ranking loss

use crate::classifiers::{MultiLabelLearner, MultiLabelOutput};
use crate::datasets::MultiLabelDataset;
use crate::error::{PipelineError, Result};
use serde::{Deserialize, Serialize};

/// A named score over a set of predictions
pub trait Measure: Send + Sync {
    fn name(&self) -> &str;

    /// Score `outputs` against the true relevance of each instance
    fn compute(&self, outputs: &[MultiLabelOutput], truth: &[Vec<bool>]) -> Result<f64>;
}

fn check_shapes(outputs: &[MultiLabelOutput], truth: &[Vec<bool>]) -> Result<()> {
    if outputs.len() != truth.len() {
        return Err(PipelineError::evaluation(format!(
            "{} predictions for {} instances",
            outputs.len(),
            truth.len()
        )));
    }
    for (row, (output, y)) in outputs.iter().zip(truth).enumerate() {
        if output.bipartition.len() != y.len() || output.confidences.len() != y.len() {
            return Err(PipelineError::evaluation(format!(
                "Instance {}: prediction covers {} labels, truth has {}",
                row,
                output.bipartition.len(),
                y.len()
            )));
        }
    }
    Ok(())
}

/// Per-instance score averaged over the instances it is defined for
///
/// Returns `NaN` when no instance is counted.
pub struct ExampleMeasure {
    name: &'static str,
    score: fn(&MultiLabelOutput, &[bool]) -> Option<f64>,
}

impl ExampleMeasure {
    pub fn new(name: &'static str, score: fn(&MultiLabelOutput, &[bool]) -> Option<f64>) -> Self {
        Self { name, score }
    }
}

impl Measure for ExampleMeasure {
    fn name(&self) -> &str {
        self.name
    }

    fn compute(&self, outputs: &[MultiLabelOutput], truth: &[Vec<bool>]) -> Result<f64> {
        check_shapes(outputs, truth)?;
        let mut sum = 0.0;
        let mut counted = 0usize;
        for (output, y) in outputs.iter().zip(truth) {
            if let Some(score) = (self.score)(output, y) {
                sum += score;
                counted += 1;
            }
        }
        if counted == 0 {
            return Ok(f64::NAN);
        }
        Ok(sum / counted as f64)
    }
}

/// Label-wise counts pooled over every instance and label
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LabelConfusion {
    pub tp: usize,
    pub fp: usize,
    pub fn_: usize,
    pub tn: usize,
}

impl LabelConfusion {
    pub fn from_outputs(outputs: &[MultiLabelOutput], truth: &[Vec<bool>]) -> Self {
        let mut counts = Self::default();
        for (output, y) in outputs.iter().zip(truth) {
            for (&predicted, &actual) in output.bipartition.iter().zip(y) {
                match (predicted, actual) {
                    (true, true) => counts.tp += 1,
                    (true, false) => counts.fp += 1,
                    (false, true) => counts.fn_ += 1,
                    (false, false) => counts.tn += 1,
                }
            }
        }
        counts
    }

    /// TP / (TP + FP)
    pub fn precision(&self) -> f64 {
        ratio(self.tp, self.tp + self.fp)
    }

    /// TP / (TP + FN)
    pub fn recall(&self) -> f64 {
        ratio(self.tp, self.tp + self.fn_)
    }

    /// 2TP / (2TP + FP + FN)
    pub fn f_measure(&self) -> f64 {
        ratio(2 * self.tp, 2 * self.tp + self.fp + self.fn_)
    }
}

fn ratio(num: usize, denom: usize) -> f64 {
    if denom == 0 {
        return 0.0;
    }
    num as f64 / denom as f64
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MicroAverage {
    Precision,
    Recall,
    FMeasure,
}

/// Micro-averaged measure for a fixed label count
pub struct MicroMeasure {
    average: MicroAverage,
    num_labels: usize,
}

impl MicroMeasure {
    pub fn new(average: MicroAverage, num_labels: usize) -> Self {
        Self { average, num_labels }
    }
}

impl Measure for MicroMeasure {
    fn name(&self) -> &str {
        match self.average {
            MicroAverage::Precision => "Micro-averaged Precision",
            MicroAverage::Recall => "Micro-averaged Recall",
            MicroAverage::FMeasure => "Micro-averaged F-Measure",
        }
    }

    fn compute(&self, outputs: &[MultiLabelOutput], truth: &[Vec<bool>]) -> Result<f64> {
        check_shapes(outputs, truth)?;
        if let Some(y) = truth.iter().find(|y| y.len() != self.num_labels) {
            return Err(PipelineError::evaluation(format!(
                "{} configured for {} labels, instance has {}",
                self.name(),
                self.num_labels,
                y.len()
            )));
        }

        let counts = LabelConfusion::from_outputs(outputs, truth);
        Ok(match self.average {
            MicroAverage::Precision => counts.precision(),
            MicroAverage::Recall => counts.recall(),
            MicroAverage::FMeasure => counts.f_measure(),
        })
    }
}

fn count_true(values: impl IntoIterator<Item = bool>) -> usize {
    values.into_iter().filter(|v| *v).count()
}

fn hamming_loss(output: &MultiLabelOutput, y: &[bool]) -> Option<f64> {
    if y.is_empty() {
        return None;
    }
    let wrong = count_true(output.bipartition.iter().zip(y).map(|(p, t)| p != t));
    Some(wrong as f64 / y.len() as f64)
}

fn subset_accuracy(output: &MultiLabelOutput, y: &[bool]) -> Option<f64> {
    Some(if output.bipartition.as_slice() == y { 1.0 } else { 0.0 })
}

/// (|P and Y|, |P|, |Y|, |P or Y|) for one instance
fn set_sizes(output: &MultiLabelOutput, y: &[bool]) -> (usize, usize, usize, usize) {
    let pairs = || output.bipartition.iter().zip(y);
    (
        count_true(pairs().map(|(p, t)| *p && *t)),
        count_true(output.bipartition.iter().copied()),
        count_true(y.iter().copied()),
        count_true(pairs().map(|(p, t)| *p || *t)),
    )
}

fn example_precision(output: &MultiLabelOutput, y: &[bool]) -> Option<f64> {
    let (inter, predicted, actual, _) = set_sizes(output, y);
    Some(match (predicted, actual) {
        (0, 0) => 1.0,
        (0, _) => 0.0,
        _ => inter as f64 / predicted as f64,
    })
}

fn example_recall(output: &MultiLabelOutput, y: &[bool]) -> Option<f64> {
    let (inter, predicted, actual, _) = set_sizes(output, y);
    Some(match (predicted, actual) {
        (0, 0) => 1.0,
        (_, 0) => 0.0,
        _ => inter as f64 / actual as f64,
    })
}

fn example_f_measure(output: &MultiLabelOutput, y: &[bool]) -> Option<f64> {
    let (inter, predicted, actual, _) = set_sizes(output, y);
    if predicted + actual == 0 {
        return Some(1.0);
    }
    Some(2.0 * inter as f64 / (predicted + actual) as f64)
}

fn example_accuracy(output: &MultiLabelOutput, y: &[bool]) -> Option<f64> {
    let (inter, _, _, union) = set_sizes(output, y);
    if union == 0 {
        return Some(1.0);
    }
    Some(inter as f64 / union as f64)
}

fn example_specificity(output: &MultiLabelOutput, y: &[bool]) -> Option<f64> {
    let negatives = count_true(y.iter().map(|t| !t));
    if negatives == 0 {
        return Some(1.0);
    }
    let true_negatives = count_true(output.bipartition.iter().zip(y).map(|(p, t)| !p && !t));
    Some(true_negatives as f64 / negatives as f64)
}

/// Relevant labels ranked below an irrelevant one
fn error_set_size_of(ranks: &[usize], y: &[bool]) -> usize {
    let mut errors = 0;
    for (r, _) in y.iter().enumerate().filter(|(_, t)| **t) {
        for (i, _) in y.iter().enumerate().filter(|(_, t)| !**t) {
            if ranks[r] > ranks[i] {
                errors += 1;
            }
        }
    }
    errors
}

/// Both the relevant and the irrelevant set are non-empty
fn has_both_sets(y: &[bool]) -> bool {
    y.iter().any(|t| *t) && y.iter().any(|t| !*t)
}

fn average_precision(output: &MultiLabelOutput, y: &[bool]) -> Option<f64> {
    if !y.iter().any(|t| *t) {
        return None;
    }
    let ranks = output.ranking();
    let relevant: Vec<usize> = (0..y.len()).filter(|&l| y[l]).collect();
    let sum: f64 = relevant
        .iter()
        .map(|&l| {
            let above = relevant.iter().filter(|&&m| ranks[m] <= ranks[l]).count();
            above as f64 / ranks[l] as f64
        })
        .sum();
    Some(sum / relevant.len() as f64)
}

fn coverage(output: &MultiLabelOutput, y: &[bool]) -> Option<f64> {
    let ranks = output.ranking();
    (0..y.len())
        .filter(|&l| y[l])
        .map(|l| ranks[l])
        .max()
        .map(|deepest| (deepest - 1) as f64)
}

fn one_error(output: &MultiLabelOutput, y: &[bool]) -> Option<f64> {
    if !y.iter().any(|t| *t) {
        return None;
    }
    let ranks = output.ranking();
    let top = ranks.iter().position(|&r| r == 1)?;
    Some(if y[top] { 0.0 } else { 1.0 })
}

fn is_error(output: &MultiLabelOutput, y: &[bool]) -> Option<f64> {
    if !has_both_sets(y) {
        return None;
    }
    let errors = error_set_size_of(&output.ranking(), y);
    Some(if errors > 0 { 1.0 } else { 0.0 })
}

fn error_set_size(output: &MultiLabelOutput, y: &[bool]) -> Option<f64> {
    if !has_both_sets(y) {
        return None;
    }
    Some(error_set_size_of(&output.ranking(), y) as f64)
}

fn ranking_loss(output: &MultiLabelOutput, y: &[bool]) -> Option<f64> {
    if !has_both_sets(y) {
        return None;
    }
    let relevant = count_true(y.iter().copied());
    let pairs = relevant * (y.len() - relevant);
    Some(error_set_size_of(&output.ranking(), y) as f64 / pairs as f64)
}

/// Ordered list of measures applied to every evaluation
pub struct MeasureBattery {
    measures: Vec<Box<dyn Measure>>,
}

impl MeasureBattery {
    pub fn new(measures: Vec<Box<dyn Measure>>) -> Self {
        Self { measures }
    }

    /// The sixteen standard measures; micro averages are fixed to `num_labels`
    pub fn standard(num_labels: usize) -> Self {
        Self::new(vec![
            Box::new(ExampleMeasure::new("Hamming Loss", hamming_loss)),
            Box::new(ExampleMeasure::new("Subset Accuracy", subset_accuracy)),
            Box::new(ExampleMeasure::new("Example-Based Precision", example_precision)),
            Box::new(ExampleMeasure::new("Example-Based Recall", example_recall)),
            Box::new(ExampleMeasure::new("Example-Based F Measure", example_f_measure)),
            Box::new(ExampleMeasure::new("Example-Based Accuracy", example_accuracy)),
            Box::new(ExampleMeasure::new("Example-Based Specificity", example_specificity)),
            Box::new(MicroMeasure::new(MicroAverage::Precision, num_labels)),
            Box::new(MicroMeasure::new(MicroAverage::Recall, num_labels)),
            Box::new(MicroMeasure::new(MicroAverage::FMeasure, num_labels)),
            Box::new(ExampleMeasure::new("Average Precision", average_precision)),
            Box::new(ExampleMeasure::new("Coverage", coverage)),
            Box::new(ExampleMeasure::new("OneError", one_error)),
            Box::new(ExampleMeasure::new("IsError", is_error)),
            Box::new(ExampleMeasure::new("ErrorSetSize", error_set_size)),
            Box::new(ExampleMeasure::new("Ranking Loss", ranking_loss)),
        ])
    }

    /// Append a measure after the existing ones
    pub fn push(&mut self, measure: Box<dyn Measure>) {
        self.measures.push(measure);
    }

    pub fn len(&self) -> usize {
        self.measures.len()
    }

    pub fn is_empty(&self) -> bool {
        self.measures.is_empty()
    }

    pub fn names(&self) -> Vec<&str> {
        self.measures.iter().map(|m| m.name()).collect()
    }

    /// Every measure in order
    pub fn compute_all(&self, outputs: &[MultiLabelOutput], truth: &[Vec<bool>]) -> Result<Vec<(String, f64)>> {
        self.measures
            .iter()
            .map(|m| -> Result<(String, f64)> { Ok((m.name().to_string(), m.compute(outputs, truth)?)) })
            .collect()
    }

    /// Evaluate a trained learner against a test set
    pub fn evaluate(
        &self,
        learner: &dyn MultiLabelLearner,
        test: &MultiLabelDataset,
        key: &str,
    ) -> Result<EvaluationReport> {
        let outputs = learner.predict_dataset(test)?;
        let truth = test.label_matrix();
        Ok(EvaluationReport {
            classifier: learner.name().to_string(),
            key: key.to_string(),
            num_instances: test.num_instances(),
            values: self.compute_all(&outputs, &truth)?,
        })
    }
}

/// Measure values of one model on one test fold
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EvaluationReport {
    pub classifier: String,
    /// Artifact key of the test fold
    pub key: String,
    pub num_instances: usize,
    pub values: Vec<(String, f64)>,
}

impl EvaluationReport {
    pub fn value(&self, name: &str) -> Option<f64> {
        self.values.iter().find(|(n, _)| n == name).map(|(_, v)| *v)
    }

    /// Format as the text written to the report file
    pub fn format(&self) -> String {
        let mut out = format!("=> Evaluation of {}\n\n", self.classifier);
        for (name, value) in &self.values {
            out.push_str(&format!("{}: {:.4}\n", name, value));
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::classifiers::{BrKnn, MultiLabelLearner};
    use crate::datasets::SyntheticConfig;

    fn output(bipartition: &[bool], confidences: &[f64]) -> MultiLabelOutput {
        MultiLabelOutput {
            bipartition: bipartition.to_vec(),
            confidences: confidences.to_vec(),
        }
    }

    fn value(battery: &MeasureBattery, outputs: &[MultiLabelOutput], truth: &[Vec<bool>], name: &str) -> f64 {
        battery
            .compute_all(outputs, truth)
            .unwrap()
            .into_iter()
            .find(|(n, _)| n == name)
            .map(|(_, v)| v)
            .unwrap()
    }

    #[test]
    fn test_standard_battery_has_sixteen_measures() {
        let battery = MeasureBattery::standard(4);
        assert_eq!(battery.len(), 16);
        assert_eq!(battery.names()[0], "Hamming Loss");
        assert_eq!(battery.names()[15], "Ranking Loss");
    }

    #[test]
    fn test_perfect_prediction() {
        let battery = MeasureBattery::standard(3);
        let outputs = vec![
            output(&[true, false, true], &[0.9, 0.1, 0.8]),
            output(&[false, true, false], &[0.2, 0.7, 0.3]),
        ];
        let truth = vec![vec![true, false, true], vec![false, true, false]];

        assert_eq!(value(&battery, &outputs, &truth, "Hamming Loss"), 0.0);
        assert_eq!(value(&battery, &outputs, &truth, "Subset Accuracy"), 1.0);
        assert_eq!(value(&battery, &outputs, &truth, "Example-Based F Measure"), 1.0);
        assert_eq!(value(&battery, &outputs, &truth, "Micro-averaged Precision"), 1.0);
        assert_eq!(value(&battery, &outputs, &truth, "Average Precision"), 1.0);
        assert_eq!(value(&battery, &outputs, &truth, "OneError"), 0.0);
        assert_eq!(value(&battery, &outputs, &truth, "IsError"), 0.0);
        assert_eq!(value(&battery, &outputs, &truth, "Ranking Loss"), 0.0);
        // Deepest relevant rank is 2 for the first instance, 1 for the second
        assert_eq!(value(&battery, &outputs, &truth, "Coverage"), 0.5);
    }

    #[test]
    fn test_example_based_values() {
        let battery = MeasureBattery::standard(4);
        // P = {0,1}, Y = {1,2}
        let outputs = vec![output(&[true, true, false, false], &[0.9, 0.8, 0.3, 0.1])];
        let truth = vec![vec![false, true, true, false]];

        assert!((value(&battery, &outputs, &truth, "Hamming Loss") - 0.5).abs() < 1e-12);
        assert!((value(&battery, &outputs, &truth, "Example-Based Precision") - 0.5).abs() < 1e-12);
        assert!((value(&battery, &outputs, &truth, "Example-Based Recall") - 0.5).abs() < 1e-12);
        assert!((value(&battery, &outputs, &truth, "Example-Based Accuracy") - 1.0 / 3.0).abs() < 1e-12);
        assert!((value(&battery, &outputs, &truth, "Example-Based Specificity") - 0.5).abs() < 1e-12);
        assert_eq!(value(&battery, &outputs, &truth, "Subset Accuracy"), 0.0);
    }

    #[test]
    fn test_ranking_values() {
        let battery = MeasureBattery::standard(4);
        // Ranks: label0=1, label1=2, label2=3, label3=4; relevant {1, 3}
        let outputs = vec![output(&[true, true, false, false], &[0.9, 0.8, 0.3, 0.1])];
        let truth = vec![vec![false, true, false, true]];

        assert_eq!(value(&battery, &outputs, &truth, "OneError"), 1.0);
        assert_eq!(value(&battery, &outputs, &truth, "Coverage"), 3.0);
        assert_eq!(value(&battery, &outputs, &truth, "IsError"), 1.0);
        // label1 below label0; label3 below label0 and label2
        assert_eq!(value(&battery, &outputs, &truth, "ErrorSetSize"), 3.0);
        assert!((value(&battery, &outputs, &truth, "Ranking Loss") - 0.75).abs() < 1e-12);
        // (1/2 + 2/4) / 2
        assert!((value(&battery, &outputs, &truth, "Average Precision") - 0.5).abs() < 1e-12);
    }

    #[test]
    fn test_empty_sets() {
        let battery = MeasureBattery::standard(2);
        let outputs = vec![output(&[false, false], &[0.1, 0.2])];
        let truth = vec![vec![false, false]];

        assert_eq!(value(&battery, &outputs, &truth, "Example-Based Precision"), 1.0);
        assert_eq!(value(&battery, &outputs, &truth, "Example-Based Recall"), 1.0);
        assert_eq!(value(&battery, &outputs, &truth, "Example-Based Accuracy"), 1.0);
        assert!(value(&battery, &outputs, &truth, "Average Precision").is_nan());
        assert!(value(&battery, &outputs, &truth, "Ranking Loss").is_nan());
    }

    #[test]
    fn test_micro_measure_rejects_wrong_label_count() {
        let measure = MicroMeasure::new(MicroAverage::FMeasure, 3);
        let outputs = vec![output(&[true, false], &[0.9, 0.1])];
        let truth = vec![vec![true, false]];
        assert_eq!(measure.compute(&outputs, &truth).unwrap_err().kind(), "EvaluationError");
    }

    #[test]
    fn test_shape_mismatch_is_evaluation_error() {
        let battery = MeasureBattery::standard(2);
        let outputs = vec![output(&[true], &[0.9])];
        let truth = vec![vec![true, false]];
        assert_eq!(battery.compute_all(&outputs, &truth).unwrap_err().kind(), "EvaluationError");
    }

    #[test]
    fn test_label_confusion() {
        let outputs = vec![output(&[true, true], &[0.9, 0.6]), output(&[false, true], &[0.1, 0.9])];
        let truth = vec![vec![true, false], vec![true, true]];
        let counts = LabelConfusion::from_outputs(&outputs, &truth);
        assert_eq!(counts, LabelConfusion { tp: 2, fp: 1, fn_: 1, tn: 0 });
        assert!((counts.precision() - 2.0 / 3.0).abs() < 1e-12);
        assert!((counts.f_measure() - 2.0 / 3.0).abs() < 1e-12);
    }

    #[test]
    fn test_evaluation_is_deterministic() {
        let train = MultiLabelDataset::synthetic(&SyntheticConfig::default(), 1).unwrap();
        let test = MultiLabelDataset::synthetic(&SyntheticConfig::default(), 2).unwrap();
        let mut model = BrKnn::new(5);
        model.build(&train).unwrap();

        let battery = MeasureBattery::standard(train.num_labels());
        let first = battery.evaluate(&model, &test, "k").unwrap();
        let second = battery.evaluate(&model, &test, "k").unwrap();
        assert_eq!(first.format(), second.format());
        assert_eq!(first.num_instances, 60);
        assert_eq!(first.classifier, "BRkNN");
    }

    #[test]
    fn test_report_format() {
        let report = EvaluationReport {
            classifier: "MLkNN".to_string(),
            key: "r-Ehd-Sub1-T".to_string(),
            num_instances: 3,
            values: vec![("Hamming Loss".to_string(), 0.125), ("Coverage".to_string(), 2.0)],
        };
        assert_eq!(
            report.format(),
            "=> Evaluation of MLkNN\n\nHamming Loss: 0.1250\nCoverage: 2.0000\n"
        );
        assert_eq!(report.value("Coverage"), Some(2.0));
    }
}
