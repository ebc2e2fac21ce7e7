// SPDX-License-Identifier: AGPL-3.0-or-later
// SPDX-FileCopyrightText: 2024 Hyperpolymath

//! Multi-label dataset model for image-descriptor folds
//!
//! A dataset is an attribute table ([`Instances`]) plus the [`LabelMetadata`]
//! naming which attributes are labels. Labels are always resolved by name,
//! never by position, because partitioning removes attributes.

use crate::error::{PipelineError, Result};
use crate::formats;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::Path;

/// Value type of an attribute
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum AttributeKind {
    Numeric,
    /// Nominal attribute; instance values store the index into this list
    Nominal(Vec<String>),
}

/// A named column of the attribute table
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Attribute {
    pub name: String,
    pub kind: AttributeKind,
}

impl Attribute {
    pub fn numeric(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            kind: AttributeKind::Numeric,
        }
    }

    pub fn nominal(name: impl Into<String>, values: Vec<String>) -> Self {
        Self {
            name: name.into(),
            kind: AttributeKind::Nominal(values),
        }
    }

    /// A `{0,1}` indicator attribute, the shape every label attribute has
    pub fn binary_label(name: impl Into<String>) -> Self {
        Self::nominal(name, vec!["0".to_string(), "1".to_string()])
    }

    pub fn is_numeric(&self) -> bool {
        matches!(self.kind, AttributeKind::Numeric)
    }

    /// True for nominal attributes declared with exactly the values 0 and 1
    pub fn is_binary_indicator(&self) -> bool {
        match &self.kind {
            AttributeKind::Nominal(values) => {
                values.len() == 2
                    && values.iter().any(|v| v == "0")
                    && values.iter().any(|v| v == "1")
            }
            AttributeKind::Numeric => false,
        }
    }

    /// Declared nominal value for a stored index
    pub fn value_label(&self, value: f64) -> Option<&str> {
        match &self.kind {
            AttributeKind::Nominal(values) if value.is_finite() && value >= 0.0 => {
                values.get(value as usize).map(String::as_str)
            }
            _ => None,
        }
    }

    /// Index of a nominal value, or `None` for numeric attributes / unknown values
    pub fn value_index(&self, label: &str) -> Option<usize> {
        match &self.kind {
            AttributeKind::Nominal(values) => values.iter().position(|v| v == label),
            AttributeKind::Numeric => None,
        }
    }
}

/// Ordered set of unique label names
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct LabelMetadata {
    names: Vec<String>,
}

impl LabelMetadata {
    pub fn new(names: Vec<String>) -> Result<Self> {
        let mut seen = HashSet::new();
        for name in &names {
            if !seen.insert(name.as_str()) {
                return Err(PipelineError::format(format!("Duplicate label name '{}'", name)));
            }
        }
        Ok(Self { names })
    }

    pub fn names(&self) -> &[String] {
        &self.names
    }

    pub fn num_labels(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.names.iter().any(|n| n == name)
    }

    /// Labels satisfying `keep`, in their original order
    pub fn retain(&self, keep: impl Fn(&str) -> bool) -> Self {
        Self {
            names: self.names.iter().filter(|n| keep(n)).cloned().collect(),
        }
    }
}

/// Attribute table: declarations plus one row of values per instance
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Instances {
    pub relation: String,
    attributes: Vec<Attribute>,
    rows: Vec<Vec<f64>>,
}

impl Instances {
    pub fn new(relation: impl Into<String>, attributes: Vec<Attribute>) -> Result<Self> {
        let mut seen = HashSet::new();
        for attr in &attributes {
            if !seen.insert(attr.name.as_str()) {
                return Err(PipelineError::format(format!(
                    "Duplicate attribute name '{}'",
                    attr.name
                )));
            }
        }
        Ok(Self {
            relation: relation.into(),
            attributes,
            rows: Vec::new(),
        })
    }

    pub fn push(&mut self, row: Vec<f64>) -> Result<()> {
        if row.len() != self.attributes.len() {
            return Err(PipelineError::format(format!(
                "Instance {} has {} values, expected {}",
                self.rows.len(),
                row.len(),
                self.attributes.len()
            )));
        }
        self.rows.push(row);
        Ok(())
    }

    pub fn attributes(&self) -> &[Attribute] {
        &self.attributes
    }

    pub fn rows(&self) -> &[Vec<f64>] {
        &self.rows
    }

    pub fn num_instances(&self) -> usize {
        self.rows.len()
    }

    pub fn num_attributes(&self) -> usize {
        self.attributes.len()
    }

    pub fn attribute_index(&self, name: &str) -> Option<usize> {
        self.attributes.iter().position(|a| a.name == name)
    }

    /// Copy of the table without the named attributes; unknown names are ignored
    pub fn without_attributes(&self, names: &HashSet<&str>) -> Self {
        let kept: Vec<usize> = (0..self.attributes.len())
            .filter(|&i| !names.contains(self.attributes[i].name.as_str()))
            .collect();

        Self {
            relation: self.relation.clone(),
            attributes: kept.iter().map(|&i| self.attributes[i].clone()).collect(),
            rows: self
                .rows
                .iter()
                .map(|row| kept.iter().map(|&i| row[i]).collect())
                .collect(),
        }
    }
}

/// Instances paired with the label metadata describing them
#[derive(Debug, Clone, PartialEq)]
pub struct MultiLabelDataset {
    instances: Instances,
    labels: LabelMetadata,
    label_indices: Vec<usize>,
    feature_indices: Vec<usize>,
}

impl MultiLabelDataset {
    /// Pair instances with label metadata, checking that they agree
    pub fn new(instances: Instances, labels: LabelMetadata) -> Result<Self> {
        let mut label_indices = Vec::with_capacity(labels.num_labels());

        for name in labels.names() {
            let idx = instances.attribute_index(name).ok_or_else(|| {
                PipelineError::format(format!(
                    "Label '{}' is not an attribute of relation '{}'",
                    name, instances.relation
                ))
            })?;
            let attr = &instances.attributes[idx];
            if !attr.is_binary_indicator() {
                return Err(PipelineError::format(format!(
                    "Label attribute '{}' must be nominal {{0,1}}",
                    name
                )));
            }
            label_indices.push(idx);
        }

        for (row_idx, row) in instances.rows.iter().enumerate() {
            if row.len() != instances.attributes.len() {
                return Err(PipelineError::format(format!(
                    "Instance {} has {} values, expected {}",
                    row_idx,
                    row.len(),
                    instances.attributes.len()
                )));
            }
            for &idx in &label_indices {
                if instances.attributes[idx].value_label(row[idx]).is_none() {
                    return Err(PipelineError::format(format!(
                        "Instance {} has invalid value {} for label '{}'",
                        row_idx, row[idx], instances.attributes[idx].name
                    )));
                }
            }
        }

        let feature_indices = (0..instances.attributes.len())
            .filter(|i| !label_indices.contains(i))
            .collect();

        Ok(Self {
            instances,
            labels,
            label_indices,
            feature_indices,
        })
    }

    /// Read a feature file and the label declaration that interprets it
    pub fn load(feature_path: &Path, labels_path: &Path) -> Result<Self> {
        let labels = formats::read_label_declaration(labels_path)?;
        let instances = formats::read_instances(feature_path, &labels)?;
        Self::new(instances, labels)
    }

    pub fn instances(&self) -> &Instances {
        &self.instances
    }

    pub fn labels(&self) -> &LabelMetadata {
        &self.labels
    }

    pub fn into_parts(self) -> (Instances, LabelMetadata) {
        (self.instances, self.labels)
    }

    pub fn num_instances(&self) -> usize {
        self.instances.num_instances()
    }

    pub fn num_labels(&self) -> usize {
        self.labels.num_labels()
    }

    pub fn num_features(&self) -> usize {
        self.feature_indices.len()
    }

    /// Attribute positions of the labels, in label order
    pub fn label_indices(&self) -> &[usize] {
        &self.label_indices
    }

    /// Attribute positions of the non-label attributes
    pub fn feature_indices(&self) -> &[usize] {
        &self.feature_indices
    }

    pub fn feature_attributes(&self) -> impl Iterator<Item = &Attribute> {
        self.feature_indices.iter().map(|&i| &self.instances.attributes[i])
    }

    /// Non-label values of one instance
    pub fn features(&self, row: usize) -> Vec<f64> {
        let values = &self.instances.rows[row];
        self.feature_indices.iter().map(|&i| values[i]).collect()
    }

    /// Relevance of each label for one instance
    pub fn truth(&self, row: usize) -> Vec<bool> {
        let values = &self.instances.rows[row];
        self.label_indices
            .iter()
            .map(|&i| self.instances.attributes[i].value_label(values[i]) == Some("1"))
            .collect()
    }

    pub fn label_matrix(&self) -> Vec<Vec<bool>> {
        (0..self.num_instances()).map(|row| self.truth(row)).collect()
    }

    /// Number of instances carrying each label
    pub fn label_frequencies(&self) -> Vec<(String, usize)> {
        let mut counts = vec![0usize; self.num_labels()];
        for row in 0..self.num_instances() {
            for (count, relevant) in counts.iter_mut().zip(self.truth(row)) {
                if relevant {
                    *count += 1;
                }
            }
        }
        self.labels.names().iter().cloned().zip(counts).collect()
    }

    /// Mean number of relevant labels per instance
    pub fn label_cardinality(&self) -> f64 {
        if self.num_instances() == 0 {
            return 0.0;
        }
        let total: usize = self.label_frequencies().iter().map(|(_, c)| c).sum();
        total as f64 / self.num_instances() as f64
    }

    /// Generate a reproducible dataset whose labels depend on the features
    ///
    /// Label `j` is relevant when feature `j mod num_features` exceeds 0.6,
    /// with 10% of the indicators flipped. Label names must not collide with
    /// the generated feature names `f0..`.
    pub fn synthetic(config: &SyntheticConfig, seed: u64) -> Result<Self> {
        use rand::{Rng, SeedableRng};
        use rand_chacha::ChaCha8Rng;

        let mut rng = ChaCha8Rng::seed_from_u64(seed);
        let num_features = config.num_features.max(1);

        let mut attributes: Vec<Attribute> = (0..num_features)
            .map(|i| Attribute::numeric(format!("f{}", i)))
            .collect();
        attributes.extend(config.label_names.iter().map(Attribute::binary_label));

        let labels = LabelMetadata::new(config.label_names.clone())?;
        let mut instances = Instances::new(config.relation.clone(), attributes)?;

        for _ in 0..config.num_instances {
            let features: Vec<f64> = (0..num_features).map(|_| rng.gen::<f64>()).collect();
            let flags: Vec<f64> = (0..labels.num_labels())
                .map(|j| {
                    let mut relevant = features[j % num_features] > 0.6;
                    if rng.gen_bool(0.1) {
                        relevant = !relevant;
                    }
                    if relevant {
                        1.0
                    } else {
                        0.0
                    }
                })
                .collect();
            instances.push(features.into_iter().chain(flags).collect())?;
        }

        Self::new(instances, labels)
    }
}

/// Shape of a generated dataset
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyntheticConfig {
    pub relation: String,
    pub num_instances: usize,
    pub num_features: usize,
    pub label_names: Vec<String>,
}

impl Default for SyntheticConfig {
    fn default() -> Self {
        Self {
            relation: "synthetic".to_string(),
            num_instances: 60,
            num_features: 8,
            label_names: ["T1", "T2", "D1", "D2", "A1", "A2", "B1", "B2"]
                .iter()
                .map(|s| s.to_string())
                .collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn small_instances() -> Instances {
        let mut instances = Instances::new(
            "small",
            vec![
                Attribute::numeric("f0"),
                Attribute::binary_label("T1"),
                Attribute::numeric("f1"),
                Attribute::binary_label("D1"),
            ],
        )
        .unwrap();
        instances.push(vec![0.5, 1.0, 2.0, 0.0]).unwrap();
        instances.push(vec![0.1, 0.0, 3.0, 1.0]).unwrap();
        instances
    }

    #[test]
    fn test_label_metadata_rejects_duplicates() {
        let err = LabelMetadata::new(vec!["T1".to_string(), "T1".to_string()]).unwrap_err();
        assert_eq!(err.kind(), "FormatError");
    }

    #[test]
    fn test_label_metadata_retain_keeps_order() {
        let labels =
            LabelMetadata::new(vec!["T2".into(), "D1".into(), "T1".into()]).unwrap();
        let kept = labels.retain(|n| n.starts_with('T'));
        assert_eq!(kept.names(), &["T2".to_string(), "T1".to_string()]);
    }

    #[test]
    fn test_dataset_resolves_labels_by_name() {
        let labels = LabelMetadata::new(vec!["T1".into(), "D1".into()]).unwrap();
        let dataset = MultiLabelDataset::new(small_instances(), labels).unwrap();

        assert_eq!(dataset.label_indices(), &[1, 3]);
        assert_eq!(dataset.feature_indices(), &[0, 2]);
        assert_eq!(dataset.features(0), vec![0.5, 2.0]);
        assert_eq!(dataset.truth(0), vec![true, false]);
        assert_eq!(dataset.truth(1), vec![false, true]);
        assert!((dataset.label_cardinality() - 1.0).abs() < 1e-9);
    }

    #[test]
    fn test_dataset_rejects_missing_label_attribute() {
        let labels = LabelMetadata::new(vec!["A1".into()]).unwrap();
        let err = MultiLabelDataset::new(small_instances(), labels).unwrap_err();
        assert_eq!(err.kind(), "FormatError");
    }

    #[test]
    fn test_dataset_rejects_numeric_label_attribute() {
        let labels = LabelMetadata::new(vec!["f0".into()]).unwrap();
        assert!(MultiLabelDataset::new(small_instances(), labels).is_err());
    }

    #[test]
    fn test_dataset_rejects_invalid_label_value() {
        let mut instances = small_instances();
        instances.push(vec![0.0, 2.0, 0.0, 0.0]).unwrap();
        let labels = LabelMetadata::new(vec!["T1".into()]).unwrap();
        assert!(MultiLabelDataset::new(instances, labels).is_err());
    }

    #[test]
    fn test_push_checks_width() {
        let mut instances = small_instances();
        assert!(instances.push(vec![1.0]).is_err());
    }

    #[test]
    fn test_without_attributes() {
        let instances = small_instances();
        let removed: HashSet<&str> = ["T1"].into_iter().collect();
        let reduced = instances.without_attributes(&removed);
        assert_eq!(reduced.num_attributes(), 3);
        assert_eq!(reduced.rows()[1], vec![0.1, 3.0, 1.0]);
    }

    #[test]
    fn test_synthetic_dataset() {
        let config = SyntheticConfig::default();
        let dataset = MultiLabelDataset::synthetic(&config, 42).unwrap();
        assert_eq!(dataset.num_instances(), 60);
        assert_eq!(dataset.num_features(), 8);
        assert_eq!(dataset.num_labels(), 8);

        // Same seed, same data
        let again = MultiLabelDataset::synthetic(&config, 42).unwrap();
        assert_eq!(dataset, again);

        // Generated data passes validation
        let (instances, labels) = dataset.into_parts();
        assert!(MultiLabelDataset::new(instances, labels).is_ok());
    }

    #[test]
    fn test_synthetic_rejects_label_named_like_a_feature() {
        let config = SyntheticConfig {
            label_names: vec!["f0".to_string(), "T1".to_string()],
            ..SyntheticConfig::default()
        };
        let err = MultiLabelDataset::synthetic(&config, 1).unwrap_err();
        assert_eq!(err.kind(), "FormatError");

        let duplicated = SyntheticConfig {
            label_names: vec!["T1".to_string(), "T1".to_string()],
            ..SyntheticConfig::default()
        };
        assert!(MultiLabelDataset::synthetic(&duplicated, 1).is_err());
    }
}
