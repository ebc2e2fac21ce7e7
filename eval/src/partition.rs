// SPDX-License-Identifier: AGPL-3.0-or-later
// SPDX-FileCopyrightText: 2024 Hyperpolymath

//! Label-axis partitioning
//!
//! An axis is a named group of labels sharing a code prefix (`T`, `D`, `A`,
//! `B`). Partitioning a dataset on an axis removes every label attribute
//! outside the axis and re-derives the label metadata from what survives.
//! Feature attributes are never touched.

use crate::datasets::{LabelMetadata, MultiLabelDataset};
use crate::error::{PipelineError, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;

/// Label-name predicate: prefix match against the axis code
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Axis {
    code: String,
}

impl Axis {
    pub fn new(code: impl Into<String>) -> Self {
        Self { code: code.into() }
    }

    /// The four axes of the image taxonomy, always enabled
    pub fn standard() -> Vec<Axis> {
        ["T", "D", "A", "B"].into_iter().map(Axis::new).collect()
    }

    pub fn code(&self) -> &str {
        &self.code
    }

    pub fn matches(&self, label: &str) -> bool {
        label.starts_with(&self.code)
    }
}

impl fmt::Display for Axis {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.code)
    }
}

/// Restrict a dataset to the labels of one axis
///
/// An axis matching no label yields a dataset with an empty label set;
/// rejecting it is left to training.
pub fn partition(dataset: &MultiLabelDataset, axis: &Axis) -> Result<MultiLabelDataset> {
    let removed: HashSet<&str> = dataset
        .labels()
        .names()
        .iter()
        .filter(|name| !axis.matches(name))
        .map(String::as_str)
        .collect();

    tracing::debug!(
        "Removing {} labels outside axis {} from relation '{}'",
        removed.len(),
        axis,
        dataset.instances().relation
    );

    let instances = dataset.instances().without_attributes(&removed);

    // Label metadata follows the surviving label attributes, in attribute order
    let survivors: Vec<String> = instances
        .attributes()
        .iter()
        .filter(|attr| dataset.labels().contains(&attr.name))
        .map(|attr| attr.name.clone())
        .collect();
    let labels = LabelMetadata::new(survivors)?;

    let expected = dataset.labels().retain(|name| axis.matches(name));
    if labels != expected {
        return Err(PipelineError::format(format!(
            "Label structure for axis {} could not be reconciled: kept {:?}, expected {:?}",
            axis,
            labels.names(),
            expected.names()
        )));
    }

    MultiLabelDataset::new(instances, labels).map_err(|e| {
        PipelineError::format(format!("Failed to rebuild dataset for axis {}: {}", axis, e))
    })
}
