// src/policy.rs
// ============================================================================
// POLICY - Qué se escribe y en qué formato
// ============================================================================
//
// Dos decisiones puras, sin I/O:
//   - SkipRules: buffers derivados que el runtime recalcula (no se escriben)
//   - decide_storage: FP16 solo para matrices `*.weight` de rango 2 y solo
//     en modo compacto
//
// ============================================================================

use crate::ggml::{PrecisionMode, StorageKind};

/// Sufijo de las frecuencias RoPE (el runtime las recalcula)
pub const ROTARY_INV_FREQ_SUFFIX: &str = ".rotary_emb.inv_freq";

/// Formato de almacenamiento de un tensor.
///
/// En modo compacto, FP16 solo si el último componente del nombre es
/// exactamente `weight` y el rango es 2. Biases, norms y embeddings 1-D
/// quedan en FP32.
pub fn decide_storage(mode: PrecisionMode, name: &str, rank: usize) -> StorageKind {
    match mode {
        PrecisionMode::Full => StorageKind::F32,
        PrecisionMode::Compact => {
            let last = name.rsplit('.').next().unwrap_or(name);
            if last == "weight" && rank == 2 {
                StorageKind::F16
            } else {
                StorageKind::F32
            }
        }
    }
}

/// Conjunto de sufijos excluidos
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SkipRules {
    suffixes: Vec<String>,
}

impl Default for SkipRules {
    fn default() -> Self {
        Self {
            suffixes: vec![ROTARY_INV_FREQ_SUFFIX.to_string()],
        }
    }
}

impl SkipRules {
    /// Sin exclusiones
    pub fn none() -> Self {
        Self { suffixes: Vec::new() }
    }

    pub fn with_suffix(mut self, suffix: impl Into<String>) -> Self {
        let suffix = suffix.into();
        if !suffix.is_empty() && !self.suffixes.contains(&suffix) {
            self.suffixes.push(suffix);
        }
        self
    }

    /// Sufijo que excluye `name`, si lo hay
    pub fn matching(&self, name: &str) -> Option<&str> {
        self.suffixes
            .iter()
            .find(|s| name.ends_with(s.as_str()))
            .map(|s| s.as_str())
    }

    pub fn suffixes(&self) -> &[String] {
        &self.suffixes
    }
}
