// SPDX-License-Identifier: AGPL-3.0-or-later
// SPDX-FileCopyrightText: 2024 Hyperpolymath

//! Label-axis evaluation pipeline for multi-label image descriptors
//!
//! This crate provides:
//! - Dataset loading (ARFF, CSV) against a label declaration
//! - Label-axis partitioning and checksummed artifact storage
//! - Multi-label learners (ML-kNN, BR-kNN, classifier chain)
//! - The standard multi-label measure battery
//! - A batch pipeline training on fold 0 and testing on folds 1 to 9

pub mod artifacts;
pub mod classifiers;
pub mod config;
pub mod datasets;
pub mod enumerator;
pub mod error;
pub mod formats;
pub mod metrics;
pub mod partition;
pub mod pipeline;

pub use artifacts::{ArtifactKey, ArtifactStore};
pub use classifiers::{
    build_classifier, BrKnn, ClassifierChain, ClassifierFactory, ClassifierKind, ClassifierParams, MlKnn,
    MultiLabelLearner, MultiLabelOutput,
};
pub use config::RunConfig;
pub use datasets::{Attribute, AttributeKind, Instances, LabelMetadata, MultiLabelDataset, SyntheticConfig};
pub use enumerator::{EvaluationRun, ExperimentEnumerator, PartitionRun, Technique};
pub use error::{PipelineError, Result};
pub use metrics::{EvaluationReport, Measure, MeasureBattery};
pub use partition::{partition, Axis};
pub use pipeline::{EvaluationPipeline, EvaluationSummary, PartitionStage, RunStage};
