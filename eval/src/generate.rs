// SPDX-License-Identifier: AGPL-3.0-or-later
// SPDX-FileCopyrightText: 2024 Hyperpolymath

//! Synthetic fold generator
//!
//! Writes a seeded `<Technique>/<Technique>-Sub<fold>.arff` tree, the label
//! declaration interpreting it, and a matching run configuration, so the
//! pipeline can run without real image descriptors.

use anyhow::{Context, Result};
use axis_eval::config::RunConfig;
use axis_eval::datasets::SyntheticConfig;
use axis_eval::enumerator::Technique;
use axis_eval::pipeline::write_synthetic_folds;
use clap::Parser;
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "generate-folds")]
#[command(about = "Generate synthetic ten-fold descriptor files")]
#[command(version)]
struct Args {
    /// Output directory
    #[arg(short, long, default_value = "synthetic")]
    output: PathBuf,

    /// Techniques to generate (comma-separated or 'all')
    #[arg(short, long, default_value = "all")]
    techniques: String,

    /// Instances per fold
    #[arg(short = 'n', long, default_value_t = 60)]
    num_instances: usize,

    /// Feature attributes per instance
    #[arg(short = 'f', long, default_value_t = 8)]
    num_features: usize,

    /// Label names (comma-separated)
    #[arg(short, long, default_value = "T1,T2,D1,D2,A1,A2,B1,B2")]
    labels: String,

    /// Random seed
    #[arg(short, long, default_value_t = 42)]
    seed: u64,
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let args = Args::parse();

    let techniques: Vec<Technique> = if args.techniques == "all" {
        Technique::ALL.to_vec()
    } else {
        args.techniques
            .split(',')
            .map(|s| s.trim().parse())
            .collect::<Result<_, _>>()?
    };

    let config = RunConfig {
        run_id: "synthetic".to_string(),
        labels_path: args.output.join("rotulos.xml"),
        data_dir: args.output.join("data"),
        artifact_dir: args.output.join("artifacts"),
        ..RunConfig::default()
    };
    let synthetic = SyntheticConfig {
        num_instances: args.num_instances,
        num_features: args.num_features,
        label_names: args.labels.split(',').map(|s| s.trim().to_string()).collect(),
        ..SyntheticConfig::default()
    };

    std::fs::create_dir_all(&args.output)
        .with_context(|| format!("Failed to create {}", args.output.display()))?;
    let files = write_synthetic_folds(&config, &techniques, &synthetic, args.seed)?;

    // Run configuration enabling what was generated, plus every classifier
    let mut conf = String::from("# generated by generate-folds\n");
    for technique in Technique::ALL {
        conf.push_str(&format!("{}={}\n", technique.config_key(), techniques.contains(&technique)));
    }
    conf.push_str("mlknn=true\nbrknn=true\nchain=true\n");
    conf.push_str(&format!("rotulos={}\n", config.labels_path.display()));
    conf.push_str(&format!("data_dir={}\n", config.data_dir.display()));
    conf.push_str(&format!("artifact_dir={}\n", config.artifact_dir.display()));
    let conf_path = args.output.join("run.conf");
    std::fs::write(&conf_path, conf).with_context(|| format!("Failed to write {}", conf_path.display()))?;

    println!("\nGenerated {} feature files under {}", files.len(), config.data_dir.display());
    println!("  Labels: {}", config.labels_path.display());
    println!("  Run configuration: {}", conf_path.display());
    println!("\nNext: axis-pipeline {} --run-id synthetic", conf_path.display());

    Ok(())
}
