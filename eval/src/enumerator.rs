// SPDX-License-Identifier: AGPL-3.0-or-later
// SPDX-FileCopyrightText: 2024 Hyperpolymath

//! Expansion of a run configuration into the ordered list of runs
//!
//! Partitioning runs are `technique x axis x fold`, evaluation runs are
//! `technique x axis x classifier`, both technique-major. Disabled
//! techniques and classifiers are skipped entirely.

use crate::artifacts::ArtifactKey;
use crate::classifiers::ClassifierKind;
use crate::config::RunConfig;
use crate::error::PipelineError;
use crate::partition::Axis;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Number of pre-split folds per technique
pub const NUM_FOLDS: usize = 10;

/// Fold the model is trained on; every other fold is a test fold
pub const TRAINING_FOLD: usize = 0;

/// Image descriptor extraction technique
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Technique {
    Ehd,
    Lbp,
    Sift,
    Gabor,
}

impl Technique {
    pub const ALL: [Technique; 4] = [Technique::Ehd, Technique::Lbp, Technique::Sift, Technique::Gabor];

    /// Name used in directory and artifact names
    pub fn name(&self) -> &'static str {
        match self {
            Technique::Ehd => "Ehd",
            Technique::Lbp => "Lbp",
            Technique::Sift => "Sift",
            Technique::Gabor => "Gabor",
        }
    }

    /// Key enabling this technique in the run configuration
    pub fn config_key(&self) -> &'static str {
        match self {
            Technique::Ehd => "ehd",
            Technique::Lbp => "lbp",
            Technique::Sift => "sift",
            Technique::Gabor => "gabor",
        }
    }
}

impl fmt::Display for Technique {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Technique {
    type Err = PipelineError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Technique::ALL
            .into_iter()
            .find(|t| t.name().eq_ignore_ascii_case(s))
            .ok_or_else(|| PipelineError::format(format!("Unknown technique '{}'", s)))
    }
}

/// One sub-dataset to produce
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PartitionRun {
    pub technique: Technique,
    pub axis: Axis,
    pub fold: usize,
}

impl PartitionRun {
    pub fn key(&self, run_id: &str) -> ArtifactKey {
        ArtifactKey::new(run_id, self.technique, self.fold, self.axis.clone())
    }
}

/// One train-once, test-on-every-other-fold evaluation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EvaluationRun {
    pub technique: Technique,
    pub axis: Axis,
    pub classifier: ClassifierKind,
}

impl EvaluationRun {
    pub fn training_key(&self, run_id: &str) -> ArtifactKey {
        ArtifactKey::new(run_id, self.technique, TRAINING_FOLD, self.axis.clone())
    }

    /// Test folds in evaluation order
    pub fn test_folds(&self) -> impl Iterator<Item = usize> {
        (0..NUM_FOLDS).filter(|&fold| fold != TRAINING_FOLD)
    }

    pub fn label(&self) -> String {
        format!("{}/{}/{}", self.technique, self.axis, self.classifier)
    }
}

/// Cross-product of enabled techniques, axes and classifiers
#[derive(Debug, Clone)]
pub struct ExperimentEnumerator {
    techniques: Vec<Technique>,
    axes: Vec<Axis>,
    classifiers: Vec<ClassifierKind>,
}

impl ExperimentEnumerator {
    pub fn new(config: &RunConfig) -> Self {
        Self {
            techniques: Technique::ALL
                .into_iter()
                .filter(|t| config.technique_enabled(*t))
                .collect(),
            axes: Axis::standard(),
            classifiers: ClassifierKind::ALL
                .into_iter()
                .filter(|c| config.classifier_enabled(*c))
                .collect(),
        }
    }

    /// Replace the standard axes
    pub fn with_axes(mut self, axes: Vec<Axis>) -> Self {
        self.axes = axes;
        self
    }

    pub fn techniques(&self) -> &[Technique] {
        &self.techniques
    }

    pub fn axes(&self) -> &[Axis] {
        &self.axes
    }

    pub fn classifiers(&self) -> &[ClassifierKind] {
        &self.classifiers
    }

    pub fn partition_runs(&self) -> Vec<PartitionRun> {
        let mut runs = Vec::new();
        for &technique in &self.techniques {
            for axis in &self.axes {
                for fold in 0..NUM_FOLDS {
                    runs.push(PartitionRun {
                        technique,
                        axis: axis.clone(),
                        fold,
                    });
                }
            }
        }
        runs
    }

    pub fn evaluation_runs(&self) -> Vec<EvaluationRun> {
        let mut runs = Vec::new();
        for &technique in &self.techniques {
            for axis in &self.axes {
                for &classifier in &self.classifiers {
                    runs.push(EvaluationRun {
                        technique,
                        axis: axis.clone(),
                        classifier,
                    });
                }
            }
        }
        runs
    }
}
