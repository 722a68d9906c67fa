// src/bin/inspect.rs
// ============================================================================
// GGML INSPECTOR - Inspecciona contenedores generados por aria-convert
// ============================================================================
//
// Uso: aria-inspect aria-ggml.bin [--tensor NAME] [--limit N]
//
// ============================================================================

use std::fs::File;
use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use memmap2::Mmap;

use aria_convert::ggml::{record_size, GgmlReader, PrecisionMode, StorageKind};

#[derive(Parser)]
#[command(name = "aria-inspect")]
#[command(about = "Inspect ggml container structure")]
struct Args {
    /// Container file to inspect
    file: PathBuf,

    /// Print the first values of this tensor
    #[arg(long)]
    tensor: Option<String>,

    /// Number of values printed with --tensor
    #[arg(long, default_value_t = 8)]
    limit: usize,
}

fn format_size(size: u64) -> String {
    if size == 0 {
        "vacío".to_string()
    } else if size < 1024 {
        format!("{} B", size)
    } else if size < 1024 * 1024 {
        format!("{:.1} KB", size as f64 / 1024.0)
    } else if size < 1024 * 1024 * 1024 {
        format!("{:.1} MB", size as f64 / 1024.0 / 1024.0)
    } else {
        format!("{:.2} GB", size as f64 / 1024.0 / 1024.0 / 1024.0)
    }
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn")).init();
    let args = Args::parse();

    let file = File::open(&args.file)
        .with_context(|| format!("Cannot open {}", args.file.display()))?;
    let mmap = unsafe { Mmap::map(&file)? };

    let reader = GgmlReader::new(&mmap)
        .with_context(|| format!("{} is not a ggml container", args.file.display()))?;
    let header = reader.header();
    let hp = &header.hparams;

    println!("═══════════════════════════════════════════════════════════════");
    println!("  {}", args.file.display());
    println!("═══════════════════════════════════════════════════════════════");
    println!("  File size:   {}", format_size(mmap.len() as u64));
    println!("  vocab_size:  {}", hp.vocab_size);
    println!("  max_seq_len: {}", hp.max_seq_len);
    println!("  d_model:     {}", hp.d_model);
    println!("  n_heads:     {}", hp.n_heads);
    println!("  n_layers:    {}", hp.n_layers);
    println!("  ff_mult:     {}", hp.ff_mult);
    println!("  storage:     {} ({})", header.mode.flag(), match header.mode {
        PrecisionMode::Full => "fp32 requested",
        PrecisionMode::Compact => "compact requested",
    });
    println!("───────────────────────────────────────────────────────────────");

    let mut f16_count = 0;
    let mut f32_count = 0;
    let mut payload_bytes = 0u64;
    for record in reader.records() {
        let record = record?;
        match record.kind {
            StorageKind::F16 => f16_count += 1,
            StorageKind::F32 => f32_count += 1,
        }
        payload_bytes += record.payload.len() as u64;
        let size = record_size(record.dims.len(), record.name.len(), record.numel(), record.kind);
        println!(
            "  0x{:08X}  {}  {:<18}  {:>10}  {}",
            record.offset,
            record.kind,
            format!("{:?}", record.shape()),
            format_size(size as u64),
            record.name,
        );
    }

    println!("───────────────────────────────────────────────────────────────");
    println!("  Records: {} (FP32:{}, FP16:{})", f32_count + f16_count, f32_count, f16_count);
    println!("  Payload: {}", format_size(payload_bytes));

    if let Some(name) = &args.tensor {
        let record = reader
            .find(name)?
            .with_context(|| format!("Tensor '{}' not found", name))?;
        let values = record.to_f32();
        let shown: Vec<String> = values.iter().take(args.limit).map(|v| format!("{:.6}", v)).collect();
        println!("\n  {} {:?} ({} values)", record.name, record.shape(), values.len());
        println!("  [{}{}]", shown.join(", "), if values.len() > args.limit { ", ..." } else { "" });
    }

    println!("═══════════════════════════════════════════════════════════════");
    Ok(())
}
