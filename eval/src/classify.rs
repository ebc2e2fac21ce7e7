// SPDX-License-Identifier: AGPL-3.0-or-later
// SPDX-FileCopyrightText: 2024 Hyperpolymath

//! Standalone classifier runner
//!
//! Trains one classifier on a stored fold-0 artifact and prints its report
//! against one test fold, for quick inspection

use anyhow::{Context, Result};
use axis_eval::artifacts::{ArtifactKey, ArtifactStore};
use axis_eval::classifiers::{all_classifiers, build_classifier, ClassifierKind, ClassifierParams};
use axis_eval::enumerator::{Technique, TRAINING_FOLD};
use axis_eval::metrics::MeasureBattery;
use axis_eval::partition::Axis;
use clap::Parser;
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "run-classifier")]
#[command(about = "Train one classifier on a stored artifact and evaluate it")]
#[command(version)]
struct Args {
    /// Classifier to run (MLkNN, BRkNN, ClassifierChain)
    #[arg(short, long, default_value = "MLkNN")]
    classifier: String,

    /// Directory holding the artifacts
    #[arg(short, long, default_value = "artifacts")]
    artifact_dir: PathBuf,

    /// Run id the artifacts were written under
    #[arg(short, long)]
    run_id: Option<String>,

    /// Technique (Ehd, Lbp, Sift, Gabor)
    #[arg(short, long, default_value = "Ehd")]
    technique: String,

    /// Label axis code
    #[arg(short = 'x', long, default_value = "T")]
    axis: String,

    /// Fold to evaluate on
    #[arg(short, long, default_value_t = 1)]
    fold: usize,

    /// Neighbourhood size of the k-NN learners
    #[arg(short, default_value_t = 10)]
    k: usize,

    /// List available classifiers
    #[arg(long)]
    list: bool,
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let args = Args::parse();
    let params = ClassifierParams {
        num_neighbors: args.k,
        ..ClassifierParams::default()
    };

    if args.list {
        println!("Available classifiers:");
        println!("----------------------");
        for classifier in all_classifiers(&params)? {
            println!("  {}: {}", classifier.name(), classifier.description());
        }
        return Ok(());
    }

    let run_id = args.run_id.context("--run-id is required to locate the artifacts")?;
    let kind: ClassifierKind = args.classifier.parse()?;
    let technique: Technique = args.technique.parse()?;
    let store = ArtifactStore::new(&args.artifact_dir);

    let train_key = ArtifactKey::new(run_id, technique, TRAINING_FOLD, Axis::new(args.axis));
    let test_key = train_key.with_fold(args.fold);

    let train = store.load_dataset(&train_key)?;
    let test = store.load_dataset(&test_key)?;

    println!("\nTraining set: {}", train_key);
    println!("  Instances: {}", train.num_instances());
    println!("  Features: {}", train.num_features());
    println!("  Label cardinality: {:.3}", train.label_cardinality());
    for (label, count) in train.label_frequencies() {
        println!(
            "  {}: {} ({:.1}%)",
            label,
            count,
            count as f64 / train.num_instances().max(1) as f64 * 100.0
        );
    }
    println!("\nTest set: {} ({} instances)", test_key, test.num_instances());

    let mut model = build_classifier(kind, &params)?;
    println!("\n## {} ##", model.name());
    println!("{}", model.description());
    println!("{}", "-".repeat(50));

    model.build(&train)?;
    let battery = MeasureBattery::standard(train.num_labels());
    let report = battery.evaluate(model.as_ref(), &test, &test_key.stem())?;

    println!("{}", report.format());
    Ok(())
}
