// SPDX-License-Identifier: AGPL-3.0-or-later
// SPDX-FileCopyrightText: 2024 Hyperpolymath

//! Batch pipeline for label-axis experiments
//!
//! Orchestrates:
//! - Partitioning every technique fold on every label axis into artifacts
//! - Training each enabled classifier once on fold 0
//! - Evaluating that fixed model against folds 1 to 9, one report per fold
//! - Summarising mean measure values per run

use crate::artifacts::{ArtifactKey, ArtifactStore};
use crate::classifiers::{build_classifier, ClassifierFactory, ClassifierParams};
use crate::config::RunConfig;
use crate::datasets::{MultiLabelDataset, SyntheticConfig};
use crate::enumerator::{EvaluationRun, ExperimentEnumerator, PartitionRun, Technique, NUM_FOLDS};
use crate::error::{PipelineError, Result};
use crate::formats;
use crate::metrics::{EvaluationReport, MeasureBattery};
use crate::partition::partition;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Splits every input fold into per-axis artifacts
pub struct PartitionStage<'a> {
    config: &'a RunConfig,
    enumerator: &'a ExperimentEnumerator,
    store: ArtifactStore,
}

impl<'a> PartitionStage<'a> {
    pub fn new(config: &'a RunConfig, enumerator: &'a ExperimentEnumerator) -> Self {
        Self {
            config,
            enumerator,
            store: ArtifactStore::new(&config.artifact_dir),
        }
    }

    pub fn run(&self) -> Result<Vec<ArtifactKey>> {
        self.run_with(|_| {})
    }

    /// Run every partition in order, calling `on_done` after each one
    pub fn run_with(&self, mut on_done: impl FnMut(&PartitionRun)) -> Result<Vec<ArtifactKey>> {
        let runs = self.enumerator.partition_runs();
        tracing::info!(
            "Partitioning {} technique(s) on {} axes, {} artifact pairs",
            self.enumerator.techniques().len(),
            self.enumerator.axes().len(),
            runs.len()
        );

        let mut keys = Vec::with_capacity(runs.len());
        for run in &runs {
            keys.push(self.partition_one(run)?);
            on_done(run);
        }
        Ok(keys)
    }

    /// Load one input fold, restrict it to one axis and store the result
    pub fn partition_one(&self, run: &PartitionRun) -> Result<ArtifactKey> {
        let key = run.key(&self.config.run_id);
        let input = self.config.feature_path(run.technique, run.fold);

        tracing::info!("Instantiating dataset {} for axis {}", input.display(), run.axis);
        let dataset = MultiLabelDataset::load(&input, &self.config.labels_path)?;

        tracing::info!("Building label filter for axis {}", run.axis);
        let reduced = partition(&dataset, &run.axis)?;
        tracing::debug!(
            "{}: {} of {} labels kept",
            key,
            reduced.num_labels(),
            dataset.num_labels()
        );

        self.store.store_dataset(&key, &reduced)?;
        Ok(key)
    }
}

/// Position of one evaluation run in its state machine
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RunStage {
    Idle,
    TrainingSetLoaded,
    ModelTrained,
    TestSetLoaded { fold: usize },
    Evaluated { fold: usize },
    ReportWritten { fold: usize },
    Done,
    Aborted,
}

/// A finished evaluation run
#[derive(Debug, Clone)]
pub struct RunOutcome {
    pub run: EvaluationRun,
    pub stages: Vec<RunStage>,
    pub reports: Vec<EvaluationReport>,
    pub report_paths: Vec<PathBuf>,
}

/// Mean of every measure over the test folds of one run
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunSummary {
    pub technique: Technique,
    pub axis: String,
    pub classifier: String,
    pub num_labels: usize,
    pub folds_evaluated: usize,
    pub mean: Vec<(String, f64)>,
}

impl RunSummary {
    fn from_outcome(outcome: &RunOutcome, num_labels: usize) -> Self {
        let names: Vec<String> = outcome
            .reports
            .first()
            .map(|r| r.values.iter().map(|(n, _)| n.clone()).collect())
            .unwrap_or_default();

        let mean = names
            .into_iter()
            .enumerate()
            .map(|(i, name)| {
                let values: Vec<f64> = outcome
                    .reports
                    .iter()
                    .filter_map(|r| r.values.get(i).map(|(_, v)| *v))
                    .filter(|v| !v.is_nan())
                    .collect();
                let mean = if values.is_empty() {
                    f64::NAN
                } else {
                    values.iter().sum::<f64>() / values.len() as f64
                };
                (name, mean)
            })
            .collect();

        Self {
            technique: outcome.run.technique,
            axis: outcome.run.axis.to_string(),
            classifier: outcome.run.classifier.to_string(),
            num_labels,
            folds_evaluated: outcome.reports.len(),
            mean,
        }
    }

    pub fn mean_of(&self, name: &str) -> Option<f64> {
        self.mean.iter().find(|(n, _)| n == name).map(|(_, v)| *v)
    }
}

/// A run that failed while `continue_on_error` was set
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FailedRun {
    pub run: String,
    pub error_kind: String,
    pub message: String,
    /// Last stage completed before the failure
    pub last_stage: RunStage,
    /// Every stage entered, ending in `Aborted`
    pub stages: Vec<RunStage>,
}

/// Results of a whole evaluation batch
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EvaluationSummary {
    pub run_id: String,
    pub config: RunConfig,
    pub runs: Vec<RunSummary>,
    pub failures: Vec<FailedRun>,
    pub timestamp: DateTime<Utc>,
    pub version: String,
}

/// Trains and evaluates every enabled classifier on every stored axis
pub struct EvaluationPipeline {
    config: RunConfig,
    store: ArtifactStore,
    factory: ClassifierFactory,
    params: ClassifierParams,
}

impl EvaluationPipeline {
    pub fn new(config: RunConfig) -> Self {
        let params = ClassifierParams {
            num_neighbors: config.num_neighbors,
            ..ClassifierParams::default()
        };
        Self {
            store: ArtifactStore::new(&config.artifact_dir),
            config,
            factory: build_classifier,
            params,
        }
    }

    /// Replace the classifier factory
    pub fn with_factory(mut self, factory: ClassifierFactory) -> Self {
        self.factory = factory;
        self
    }

    pub fn config(&self) -> &RunConfig {
        &self.config
    }

    pub fn store(&self) -> &ArtifactStore {
        &self.store
    }

    /// `<artifact_dir>/<key>-<classifier>.result`
    pub fn report_path(&self, key: &ArtifactKey, classifier: &str) -> PathBuf {
        self.config
            .artifact_dir
            .join(format!("{}-{}.result", key.stem(), classifier))
    }

    /// Train on fold 0 and evaluate on every other fold
    pub fn run_one(&self, run: &EvaluationRun) -> Result<RunOutcome> {
        let mut stages = vec![RunStage::Idle];
        match self.execute(run, &mut stages) {
            Ok((reports, report_paths, _)) => Ok(RunOutcome {
                run: run.clone(),
                stages,
                reports,
                report_paths,
            }),
            Err(e) => {
                tracing::error!("{} aborted, stages {:?}: {}", run.label(), stages, e);
                Err(e)
            }
        }
    }

    /// Walk the run's stages; any failure appends `Aborted` to the trace
    #[allow(clippy::type_complexity)]
    fn execute(
        &self,
        run: &EvaluationRun,
        stages: &mut Vec<RunStage>,
    ) -> Result<(Vec<EvaluationReport>, Vec<PathBuf>, usize)> {
        let result = self.advance(run, stages);
        if result.is_err() {
            stages.push(RunStage::Aborted);
        }
        result
    }

    #[allow(clippy::type_complexity)]
    fn advance(
        &self,
        run: &EvaluationRun,
        stages: &mut Vec<RunStage>,
    ) -> Result<(Vec<EvaluationReport>, Vec<PathBuf>, usize)> {
        let training_key = run.training_key(&self.config.run_id);

        tracing::info!("Deserializing training set {}", training_key);
        let train = self.store.load_dataset(&training_key)?;
        stages.push(RunStage::TrainingSetLoaded);

        let mut model = (self.factory)(run.classifier, &self.params)?;
        tracing::info!(
            "Training {} on {} instances, {} labels",
            model.name(),
            train.num_instances(),
            train.num_labels()
        );
        model.build(&train)?;
        stages.push(RunStage::ModelTrained);

        let battery = MeasureBattery::standard(train.num_labels());
        let num_labels = train.num_labels();
        drop(train);

        let mut reports = Vec::with_capacity(NUM_FOLDS - 1);
        let mut paths = Vec::with_capacity(NUM_FOLDS - 1);
        for fold in run.test_folds() {
            let key = training_key.with_fold(fold);

            tracing::info!("Deserializing test set {}", key);
            let test = self.store.load_dataset(&key)?;
            stages.push(RunStage::TestSetLoaded { fold });

            tracing::info!("Evaluating {} on {}", model.name(), key);
            let report = battery.evaluate(model.as_ref(), &test, &key.stem())?;
            stages.push(RunStage::Evaluated { fold });

            let path = self.report_path(&key, run.classifier.name());
            tracing::info!("Saving results to {}", path.display());
            std::fs::write(&path, report.format()).map_err(|e| PipelineError::io(&path, e))?;
            stages.push(RunStage::ReportWritten { fold });

            reports.push(report);
            paths.push(path);
        }

        stages.push(RunStage::Done);
        Ok((reports, paths, num_labels))
    }

    pub fn run_all(&self, enumerator: &ExperimentEnumerator) -> Result<EvaluationSummary> {
        self.run_all_with(enumerator, |_| {})
    }

    /// Run every evaluation in order, calling `on_done` after each one
    ///
    /// The first failure ends the batch unless `continue_on_error` is set,
    /// in which case it is recorded and the next run starts.
    pub fn run_all_with(
        &self,
        enumerator: &ExperimentEnumerator,
        mut on_done: impl FnMut(&EvaluationRun),
    ) -> Result<EvaluationSummary> {
        let mut runs = Vec::new();
        let mut failures = Vec::new();

        for run in enumerator.evaluation_runs() {
            tracing::info!("Starting {}", run.label());
            let mut stages = vec![RunStage::Idle];
            match self.execute(&run, &mut stages) {
                Ok((reports, report_paths, num_labels)) => {
                    let outcome = RunOutcome {
                        run: run.clone(),
                        stages,
                        reports,
                        report_paths,
                    };
                    runs.push(RunSummary::from_outcome(&outcome, num_labels));
                }
                Err(e) if self.config.continue_on_error => {
                    tracing::error!("{} failed with {}: {}", run.label(), e.kind(), e);
                    let last_stage = stages
                        .iter()
                        .rev()
                        .find(|s| **s != RunStage::Aborted)
                        .copied()
                        .unwrap_or(RunStage::Idle);
                    failures.push(FailedRun {
                        run: run.label(),
                        error_kind: e.kind().to_string(),
                        message: e.to_string(),
                        last_stage,
                        stages,
                    });
                }
                Err(e) => {
                    tracing::error!("{} aborted, stages {:?}: {}", run.label(), stages, e);
                    return Err(e);
                }
            }
            on_done(&run);
        }

        Ok(EvaluationSummary {
            run_id: self.config.run_id.clone(),
            config: self.config.clone(),
            runs,
            failures,
            timestamp: Utc::now(),
            version: env!("CARGO_PKG_VERSION").to_string(),
        })
    }

    /// Save summary to JSON file
    pub fn save_results(summary: &EvaluationSummary, output_path: &Path) -> Result<()> {
        if let Some(parent) = output_path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| PipelineError::io(parent, e))?;
        }
        let json = serde_json::to_string_pretty(summary)
            .map_err(|e| PipelineError::io_message(output_path, e.to_string()))?;
        std::fs::write(output_path, json).map_err(|e| PipelineError::io(output_path, e))?;
        tracing::info!("Summary saved to {}", output_path.display());
        Ok(())
    }

    /// Write `<run_id>-summary.json` and `<run_id>-summary.md` to the artifact directory
    pub fn save_summary(&self, summary: &EvaluationSummary) -> Result<(PathBuf, PathBuf)> {
        let json_path = self
            .config
            .artifact_dir
            .join(format!("{}-summary.json", summary.run_id));
        Self::save_results(summary, &json_path)?;

        let md_path = self.config.artifact_dir.join(format!("{}-summary.md", summary.run_id));
        std::fs::write(&md_path, Self::generate_report(summary))
            .map_err(|e| PipelineError::io(&md_path, e))?;
        tracing::info!("Report saved to {}", md_path.display());

        Ok((json_path, md_path))
    }

    /// Generate a markdown report
    pub fn generate_report(summary: &EvaluationSummary) -> String {
        let mut report = String::new();

        report.push_str("# Label-Axis Evaluation Report\n\n");
        report.push_str(&format!(
            "**Generated:** {}\n\n",
            summary.timestamp.format("%Y-%m-%d %H:%M:%S UTC")
        ));
        report.push_str(&format!("**Run:** {}\n\n", summary.run_id));
        report.push_str(&format!("**Version:** {}\n\n", summary.version));

        report.push_str("## Runs\n\n");
        report.push_str("| Technique | Axis | Classifier | Labels | Folds | Hamming Loss | Subset Accuracy | Micro F | Avg Precision |\n");
        report.push_str("|-----------|------|------------|--------|-------|--------------|-----------------|---------|---------------|\n");
        let cell = |run: &RunSummary, name: &str| {
            run.mean_of(name)
                .map_or("-".to_string(), |v| format!("{:.4}", v))
        };
        for run in &summary.runs {
            report.push_str(&format!(
                "| {} | {} | {} | {} | {} | {} | {} | {} | {} |\n",
                run.technique,
                run.axis,
                run.classifier,
                run.num_labels,
                run.folds_evaluated,
                cell(run, "Hamming Loss"),
                cell(run, "Subset Accuracy"),
                cell(run, "Micro-averaged F-Measure"),
                cell(run, "Average Precision"),
            ));
        }

        if !summary.failures.is_empty() {
            report.push_str("\n## Failed Runs\n\n");
            for failure in &summary.failures {
                report.push_str(&format!(
                    "- **{}**: {} after {:?} ({})\n",
                    failure.run, failure.error_kind, failure.last_stage, failure.message
                ));
            }
        }

        report.push_str("\n## Configuration\n\n");
        report.push_str(&format!(
            "```json\n{}\n```\n",
            serde_json::to_string_pretty(&summary.config).unwrap_or_default()
        ));

        report
    }
}

/// Write a seeded ten-fold ARFF tree and its label declaration
///
/// Each technique gets its own seed range so folds differ across techniques.
pub fn write_synthetic_folds(
    config: &RunConfig,
    techniques: &[Technique],
    synthetic: &SyntheticConfig,
    seed: u64,
) -> Result<Vec<PathBuf>> {
    if config.feature_extension != "arff" {
        return Err(PipelineError::format(format!(
            "Synthetic folds are written as ARFF, extension is '{}'",
            config.feature_extension
        )));
    }

    let mut written = Vec::new();
    let mut labels = None;
    for (t, &technique) in techniques.iter().enumerate() {
        for fold in 0..NUM_FOLDS {
            let fold_config = SyntheticConfig {
                relation: format!("{}-Sub{}", technique, fold),
                ..synthetic.clone()
            };
            let fold_seed = seed + (t * NUM_FOLDS + fold) as u64;
            let dataset = MultiLabelDataset::synthetic(&fold_config, fold_seed)?;

            let path = config.feature_path(technique, fold);
            if let Some(parent) = path.parent() {
                std::fs::create_dir_all(parent).map_err(|e| PipelineError::io(parent, e))?;
            }
            formats::write_arff(dataset.instances(), &path)?;
            written.push(path);
            labels.get_or_insert_with(|| dataset.labels().clone());
        }
    }

    // Declaration goes last so a rejected shape leaves nothing behind
    let labels = match labels {
        Some(labels) => labels,
        None => crate::datasets::LabelMetadata::new(synthetic.label_names.clone())?,
    };
    if let Some(parent) = config.labels_path.parent() {
        std::fs::create_dir_all(parent).map_err(|e| PipelineError::io(parent, e))?;
    }
    formats::write_label_declaration(&labels, &config.labels_path)?;

    tracing::info!("Wrote {} synthetic feature files", written.len());
    Ok(written)
}
