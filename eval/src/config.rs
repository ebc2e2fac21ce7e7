// SPDX-License-Identifier: AGPL-3.0-or-later
// SPDX-FileCopyrightText: 2024 Hyperpolymath

//! Run configuration
//!
//! The batch job is driven by a flat `key=value` map:
//! `ehd`, `lbp`, `sift`, `gabor` enable techniques, `mlknn`, `brknn`,
//! `chain` enable classifiers and `rotulos` names the label declaration.
//! Flags are true only when their value is `true` (any case).

use crate::classifiers::ClassifierKind;
use crate::enumerator::Technique;
use crate::error::{PipelineError, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

/// Immutable settings for one batch
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunConfig {
    /// Prefix of every artifact and report name
    pub run_id: String,
    pub ehd: bool,
    pub lbp: bool,
    pub sift: bool,
    pub gabor: bool,
    pub mlknn: bool,
    pub brknn: bool,
    pub chain: bool,
    /// Label declaration interpreting the feature files
    pub labels_path: PathBuf,
    /// Root of the `<Technique>/<Technique>-Sub<fold>.<ext>` tree
    pub data_dir: PathBuf,
    /// Extension of the feature files (`arff` or `csv`)
    pub feature_extension: String,
    /// Where artifacts and reports are written
    pub artifact_dir: PathBuf,
    /// Neighbourhood size of the k-NN learners
    pub num_neighbors: usize,
    /// Record a failed run and go on instead of aborting the batch
    pub continue_on_error: bool,
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            run_id: default_run_id(),
            ehd: false,
            lbp: false,
            sift: false,
            gabor: false,
            mlknn: false,
            brknn: false,
            chain: false,
            labels_path: PathBuf::from("rotulos.xml"),
            data_dir: PathBuf::from("."),
            feature_extension: "arff".to_string(),
            artifact_dir: PathBuf::from("artifacts"),
            num_neighbors: 10,
            continue_on_error: false,
        }
    }
}

/// UTC timestamp used when no run id is given
pub fn default_run_id() -> String {
    chrono::Utc::now().format("%Y%m%d%H%M%S").to_string()
}

fn parse_flag(value: &str) -> bool {
    value.trim().eq_ignore_ascii_case("true")
}

impl RunConfig {
    /// Interpret a configuration map; absent flags are false
    pub fn from_entries(entries: &BTreeMap<String, String>) -> Result<Self> {
        let mut config = Self::default();

        for (key, value) in entries {
            let value = value.trim();
            match key.as_str() {
                "ehd" => config.ehd = parse_flag(value),
                "lbp" => config.lbp = parse_flag(value),
                "sift" => config.sift = parse_flag(value),
                "gabor" => config.gabor = parse_flag(value),
                "mlknn" => config.mlknn = parse_flag(value),
                "brknn" => config.brknn = parse_flag(value),
                "chain" => config.chain = parse_flag(value),
                "rotulos" | "labels" => config.labels_path = PathBuf::from(value),
                "data_dir" => config.data_dir = PathBuf::from(value),
                "artifact_dir" => config.artifact_dir = PathBuf::from(value),
                "extension" => config.feature_extension = value.trim_start_matches('.').to_string(),
                "run_id" | "id" => config.run_id = value.to_string(),
                "k" | "num_neighbors" => {
                    config.num_neighbors = value.parse().map_err(|_| {
                        PipelineError::format(format!("Option '{}' must be an integer, got '{}'", key, value))
                    })?
                }
                "continue_on_error" => config.continue_on_error = parse_flag(value),
                other => tracing::warn!("Ignoring unrecognised option '{}'", other),
            }
        }

        Ok(config)
    }

    /// Read a `key=value` file into the configuration map
    pub fn read_entries(path: &Path) -> Result<BTreeMap<String, String>> {
        let content = std::fs::read_to_string(path).map_err(|e| PipelineError::io(path, e))?;
        Self::parse_entries(&content)
    }

    pub fn parse_entries(content: &str) -> Result<BTreeMap<String, String>> {
        let mut entries = BTreeMap::new();
        for (idx, line) in content.lines().enumerate() {
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }
            let (key, value) = line.split_once('=').ok_or_else(|| {
                PipelineError::format(format!("line {}: expected key=value, got '{}'", idx + 1, line))
            })?;
            entries.insert(key.trim().to_string(), value.trim().to_string());
        }
        Ok(entries)
    }

    /// Load a configuration file
    pub fn load(path: &Path) -> Result<Self> {
        Self::from_entries(&Self::read_entries(path)?)
    }

    pub fn technique_enabled(&self, technique: Technique) -> bool {
        match technique {
            Technique::Ehd => self.ehd,
            Technique::Lbp => self.lbp,
            Technique::Sift => self.sift,
            Technique::Gabor => self.gabor,
        }
    }

    pub fn classifier_enabled(&self, classifier: ClassifierKind) -> bool {
        match classifier {
            ClassifierKind::MlKnn => self.mlknn,
            ClassifierKind::BrKnn => self.brknn,
            ClassifierKind::ClassifierChain => self.chain,
        }
    }

    /// Input feature file of one technique fold
    pub fn feature_path(&self, technique: Technique, fold: usize) -> PathBuf {
        self.data_dir
            .join(technique.name())
            .join(format!("{}-Sub{}.{}", technique, fold, self.feature_extension))
    }
}
