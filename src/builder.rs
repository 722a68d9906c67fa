// src/builder.rs
// ============================================================================
// BUILDER - Orquestador: safetensors → encoder → fichero de salida
// ============================================================================
//
// La salida se escribe en un temporal junto al destino y solo se renombra
// si todo terminó bien. Si falla algo, el temporal se borra al soltarse y
// no queda ningún fichero a medias.
//
// ============================================================================

use std::fs::File;
use std::io::BufWriter;
use std::path::Path;

use indicatif::ProgressBar;
use log::info;
use tempfile::NamedTempFile;

use crate::encoder::{EncodeStats, Encoder};
use crate::error::Result;
use crate::hparams::HyperparameterRecord;
use crate::safetensor::SafetensorFile;

/// Convierte `model_path` y deja el contenedor en `target_path`.
///
/// `progress` avanza un paso por tensor leído (incluidos los excluidos).
pub fn convert_model(
    model_path: &Path,
    target_path: &Path,
    hparams: &HyperparameterRecord,
    encoder: &Encoder,
    progress: &ProgressBar,
) -> Result<EncodeStats> {
    let source = SafetensorFile::open(model_path)?;
    info!("Opened {} ({} tensors)", source.path.display(), source.len());
    progress.set_length(source.len() as u64);

    let dir = match target_path.parent() {
        Some(p) if !p.as_os_str().is_empty() => p,
        _ => Path::new("."),
    };
    let tmp = NamedTempFile::new_in(dir)?;

    let stats = {
        let sink = BufWriter::new(tmp.as_file());
        encoder.encode(hparams, progress.wrap_iter(source.tensors()), sink)?
    };
    progress.finish_and_clear();

    tmp.as_file().sync_all()?;
    persist(tmp, target_path)?;
    Ok(stats)
}

fn persist(tmp: NamedTempFile, target_path: &Path) -> Result<File> {
    tmp.persist(target_path).map_err(|e| e.error.into())
}
