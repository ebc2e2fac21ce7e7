// SPDX-License-Identifier: AGPL-3.0-or-later
// SPDX-FileCopyrightText: 2024 Hyperpolymath

//! Batch CLI for label-axis experiments
//!
//! Usage:
//!   axis-pipeline run.conf
//!   axis-pipeline run.conf --stage evaluate --run-id 20240101120000
//!   axis-pipeline --techniques ehd,lbp --classifiers mlknn --labels rotulos.xml

use anyhow::{bail, Context, Result};
use axis_eval::config::RunConfig;
use axis_eval::enumerator::{ExperimentEnumerator, Technique};
use axis_eval::pipeline::{EvaluationPipeline, PartitionStage};
use axis_eval::ClassifierKind;
use clap::{Parser, ValueEnum};
use indicatif::{ProgressBar, ProgressStyle};
use std::collections::BTreeMap;
use std::fs::File;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use tracing_subscriber::EnvFilter;

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum Stage {
    /// Partition the input folds into artifacts
    Build,
    /// Train and evaluate on stored artifacts
    Evaluate,
    /// Build, then evaluate
    All,
}

#[derive(Parser, Debug)]
#[command(name = "axis-pipeline")]
#[command(about = "Partition image-descriptor folds by label axis and evaluate multi-label classifiers")]
#[command(version)]
struct Args {
    /// Run configuration file (key=value lines)
    config: Option<PathBuf>,

    /// Which stage to run
    #[arg(short, long, value_enum, default_value = "all")]
    stage: Stage,

    /// Run id prefixing artifacts and reports (required for --stage evaluate)
    #[arg(long)]
    run_id: Option<String>,

    /// Techniques to enable (comma-separated: ehd,lbp,sift,gabor)
    #[arg(short, long)]
    techniques: Option<String>,

    /// Classifiers to enable (comma-separated: mlknn,brknn,chain)
    #[arg(short, long)]
    classifiers: Option<String>,

    /// Label declaration file
    #[arg(short, long)]
    labels: Option<PathBuf>,

    /// Root of the <Technique>/<Technique>-Sub<fold> tree
    #[arg(short, long)]
    data_dir: Option<PathBuf>,

    /// Artifact and report directory
    #[arg(short, long)]
    artifact_dir: Option<PathBuf>,

    /// Neighbourhood size of the k-NN learners
    #[arg(short)]
    k: Option<usize>,

    /// Record failed runs and keep going instead of aborting
    #[arg(long)]
    continue_on_error: bool,

    /// Write the log to this file instead of stderr
    #[arg(long)]
    log_file: Option<PathBuf>,

    /// Hide progress bars
    #[arg(long)]
    no_progress: bool,
}

fn init_logging(log_file: Option<&Path>) -> Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    match log_file {
        Some(path) => {
            let file = File::create(path)
                .with_context(|| format!("Failed to create log file {}", path.display()))?;
            tracing_subscriber::fmt()
                .with_env_filter(filter)
                .with_ansi(false)
                .with_writer(Mutex::new(file))
                .init();
        }
        None => tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_writer(std::io::stderr)
            .init(),
    }
    Ok(())
}

fn progress_bar(len: usize, hidden: bool) -> Result<ProgressBar> {
    if hidden {
        return Ok(ProgressBar::hidden());
    }
    let pb = ProgressBar::new(len as u64);
    pb.set_style(
        ProgressStyle::default_bar()
            .template("{spinner:.green} [{elapsed_precise}] [{wide_bar:.cyan/blue}] {pos}/{len} {msg}")?
            .progress_chars("#>-"),
    );
    Ok(pb)
}

fn build_config(args: &Args) -> Result<RunConfig> {
    let mut entries = match &args.config {
        Some(path) => RunConfig::read_entries(path)
            .with_context(|| format!("Failed to read configuration {}", path.display()))?,
        None => BTreeMap::new(),
    };

    if let Some(list) = &args.techniques {
        for technique in Technique::ALL {
            entries.insert(technique.config_key().to_string(), "false".to_string());
        }
        for name in list.split(',').map(str::trim).filter(|s| !s.is_empty()) {
            let technique: Technique = name.parse()?;
            entries.insert(technique.config_key().to_string(), "true".to_string());
        }
    }
    if let Some(list) = &args.classifiers {
        for classifier in ClassifierKind::ALL {
            entries.insert(classifier.config_key().to_string(), "false".to_string());
        }
        for name in list.split(',').map(str::trim).filter(|s| !s.is_empty()) {
            let classifier: ClassifierKind = name.parse()?;
            entries.insert(classifier.config_key().to_string(), "true".to_string());
        }
    }

    let run_id_given = args.run_id.is_some() || entries.contains_key("run_id") || entries.contains_key("id");
    if args.stage == Stage::Evaluate && !run_id_given {
        bail!("--stage evaluate needs the run id of the stored artifacts (--run-id)");
    }

    let mut config = RunConfig::from_entries(&entries)?;
    if let Some(run_id) = &args.run_id {
        config.run_id = run_id.clone();
    }
    if let Some(labels) = &args.labels {
        config.labels_path = labels.clone();
    }
    if let Some(dir) = &args.data_dir {
        config.data_dir = dir.clone();
    }
    if let Some(dir) = &args.artifact_dir {
        config.artifact_dir = dir.clone();
    }
    if let Some(k) = args.k {
        config.num_neighbors = k;
    }
    if args.continue_on_error {
        config.continue_on_error = true;
    }
    Ok(config)
}

fn run(args: &Args) -> Result<()> {
    let config = build_config(args)?;
    let enumerator = ExperimentEnumerator::new(&config);

    tracing::info!("Label-Axis Evaluation Pipeline");
    tracing::info!("==============================");
    tracing::info!("Run: {}", config.run_id);
    tracing::info!("Techniques: {:?}", enumerator.techniques());
    tracing::info!("Classifiers: {:?}", enumerator.classifiers());
    tracing::info!("Labels: {}", config.labels_path.display());

    if enumerator.techniques().is_empty() {
        tracing::warn!("No technique enabled, nothing to do");
    }

    if matches!(args.stage, Stage::Build | Stage::All) {
        let stage = PartitionStage::new(&config, &enumerator);
        let pb = progress_bar(enumerator.partition_runs().len(), args.no_progress)?;
        let keys = stage.run_with(|run| {
            pb.set_message(format!("{} {} fold {}", run.technique, run.axis, run.fold));
            pb.inc(1);
        })?;
        pb.finish_with_message("partitioned");
        println!("{} artifact pairs written to {}", keys.len(), config.artifact_dir.display());
    }

    if matches!(args.stage, Stage::Evaluate | Stage::All) {
        let pipeline = EvaluationPipeline::new(config.clone());
        let pb = progress_bar(enumerator.evaluation_runs().len(), args.no_progress)?;
        let summary = pipeline.run_all_with(&enumerator, |run| {
            pb.set_message(run.label());
            pb.inc(1);
        })?;
        pb.finish_with_message("evaluated");

        println!("\n{}", "=".repeat(78));
        println!("EVALUATION SUMMARY ({})", summary.run_id);
        println!("{}", "=".repeat(78));
        println!(
            "{:<8} {:<5} {:<16} {:>8} {:>12} {:>12} {:>12}",
            "Tech", "Axis", "Classifier", "Labels", "Hamming", "Micro F", "Avg Prec"
        );
        println!("{:-<78}", "");
        for run in &summary.runs {
            let fmt = |name: &str| run.mean_of(name).map_or("-".to_string(), |v| format!("{:.4}", v));
            println!(
                "{:<8} {:<5} {:<16} {:>8} {:>12} {:>12} {:>12}",
                run.technique.to_string(),
                run.axis,
                run.classifier,
                run.num_labels,
                fmt("Hamming Loss"),
                fmt("Micro-averaged F-Measure"),
                fmt("Average Precision"),
            );
        }
        println!("{:-<78}", "");

        for failure in &summary.failures {
            println!("FAILED {}: {} ({})", failure.run, failure.error_kind, failure.message);
        }

        let (json_path, md_path) = pipeline.save_summary(&summary)?;
        println!("\nJSON summary saved to: {}", json_path.display());
        println!("Markdown report saved to: {}", md_path.display());
    }

    println!("\nPipeline complete!");
    Ok(())
}

fn main() {
    let args = Args::parse();

    if let Err(e) = init_logging(args.log_file.as_deref()) {
        eprintln!("{:#}", e);
        std::process::exit(1);
    }

    if let Err(e) = run(&args) {
        tracing::error!("{:#}", e);
        std::process::exit(1);
    }
}
