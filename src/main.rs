// src/main.rs
// ============================================================================
// ARIA-CONVERT CLI
// ============================================================================
//
// Uso:
//   aria-convert model.safetensors aria-ggml.bin
//   aria-convert --size medium --fp32 model.safetensors aria-ggml-f32.bin
//
// ============================================================================

use std::path::PathBuf;
use std::time::Instant;

use anyhow::{Context, Result};
use clap::Parser;
use indicatif::{ProgressBar, ProgressStyle};

use aria_convert::{
    convert_model, EncodeOptions, Encoder, HyperparameterRecord, ModelSize, PrecisionMode,
    SkipRules,
};

#[derive(Parser, Debug)]
#[command(name = "aria-convert")]
#[command(about = "Convert a safetensors checkpoint to a ggml container")]
#[command(version)]
struct Args {
    /// Model size (selects <config-dir>/<size>.json)
    #[arg(long, value_enum, default_value_t = ModelSize::Large)]
    size: ModelSize,

    /// Directory holding the hyperparameter files
    #[arg(long, default_value = "config")]
    config_dir: PathBuf,

    /// Explicit hyperparameter file (overrides --size/--config-dir)
    #[arg(long)]
    config: Option<PathBuf>,

    /// Use fp32 for every tensor instead of fp16 weight matrices
    #[arg(long)]
    fp32: bool,

    /// Source weights (.safetensors)
    #[arg(value_name = "MODEL_PATH")]
    model_path: PathBuf,

    /// Output file
    #[arg(value_name = "TARGET_PATH")]
    target_path: PathBuf,

    /// Extra name suffix to skip (repeatable)
    #[arg(long = "skip-suffix", value_name = "SUFFIX")]
    skip_suffix: Vec<String>,

    /// Drop size-1 dimensions before writing
    #[arg(long)]
    squeeze: bool,

    /// Tensors converted in parallel per batch (1 = sequential)
    #[arg(long, default_value_t = 1)]
    batch: usize,

    /// Verbose output
    #[arg(short, long)]
    verbose: bool,
}

fn main() -> Result<()> {
    let args = Args::parse();

    env_logger::Builder::from_env(
        env_logger::Env::default().default_filter_or(if args.verbose { "info" } else { "warn" }),
    )
    .init();

    let start = Instant::now();

    let config_path = args
        .config
        .clone()
        .unwrap_or_else(|| args.size.config_path(&args.config_dir));
    let hparams = HyperparameterRecord::load(&config_path)
        .with_context(|| format!("Cannot load hyperparameters for size '{}'", args.size))?;

    let skip_rules = args
        .skip_suffix
        .iter()
        .fold(SkipRules::default(), |rules, s| rules.with_suffix(s.as_str()));

    let options = EncodeOptions::new(!args.fp32)
        .with_skip_rules(skip_rules)
        .with_squeeze(args.squeeze)
        .with_batch_size(args.batch);
    let mode = options.mode;
    let encoder = Encoder::new(options);

    println!("═══════════════════════════════════════════════════════════════");
    println!("  ARIA CONVERTER v{}", env!("CARGO_PKG_VERSION"));
    println!("═══════════════════════════════════════════════════════════════");
    println!("  Config:     {}", config_path.display());
    println!("  Hparams:    {:?}", hparams);
    println!("  Mode:       {}", match mode {
        PrecisionMode::Full => "FP32",
        PrecisionMode::Compact => "FP16 (2-D weights)",
    });
    println!("  Skip:       {}", encoder.options().skip_rules.suffixes().join(", "));
    println!("  Input:      {}", args.model_path.display());
    println!("  Output:     {}", args.target_path.display());
    println!("═══════════════════════════════════════════════════════════════");

    // Con --verbose el log ya enseña cada tensor
    let progress = if args.verbose {
        ProgressBar::hidden()
    } else {
        ProgressBar::new(0)
    };
    if let Ok(style) = ProgressStyle::with_template("  [{bar:40}] {pos}/{len} tensors") {
        progress.set_style(style);
    }

    let stats = convert_model(&args.model_path, &args.target_path, &hparams, &encoder, &progress)
        .with_context(|| format!("Conversion of {} failed", args.model_path.display()))?;

    let elapsed = start.elapsed();

    println!("\n═══════════════════════════════════════════════════════════════");
    println!("  CONVERSION COMPLETE");
    println!("═══════════════════════════════════════════════════════════════");
    println!("  Time:       {:.1}s", elapsed.as_secs_f64());
    println!("  Size:       {:.1} MB", stats.bytes_written as f64 / 1024.0 / 1024.0);
    println!("  Tensors:    {} (FP32:{}, FP16:{})",
        stats.total_records(), stats.f32_count, stats.f16_count);
    println!("  Skipped:    {}", stats.skipped.len());
    for name in &stats.skipped {
        println!("              - {}", name);
    }
    println!("  XXH3:       {:016x}", stats.digest);
    println!("  Output:     {}", args.target_path.display());
    println!("═══════════════════════════════════════════════════════════════");

    Ok(())
}
