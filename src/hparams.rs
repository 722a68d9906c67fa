// src/hparams.rs
// ============================================================================
// HIPERPARÁMETROS - config/<size>.json → HyperparameterRecord
// ============================================================================

use std::fmt;
use std::path::{Path, PathBuf};

use serde_json::Value;

use crate::error::{EncodeError, Result};

/// Claves obligatorias, en el orden en que se escriben en el header
pub const REQUIRED_KEYS: [&str; 6] = [
    "vocab_size",
    "max_seq_len",
    "d_model",
    "n_heads",
    "n_layers",
    "ff_mult",
];

/// Tamaño de modelo (selecciona el JSON de hiperparámetros)
#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum ModelSize {
    Medium,
    Large,
}

impl ModelSize {
    pub fn name(&self) -> &'static str {
        match self {
            Self::Medium => "medium",
            Self::Large => "large",
        }
    }

    /// Ruta `<dir>/<size>.json`
    pub fn config_path(&self, dir: impl AsRef<Path>) -> PathBuf {
        dir.as_ref().join(format!("{}.json", self.name()))
    }
}

impl fmt::Display for ModelSize {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HyperparameterRecord {
    pub vocab_size: i32,
    pub max_seq_len: i32,
    pub d_model: i32,
    pub n_heads: i32,
    pub n_layers: i32,
    pub ff_mult: i32,
}

impl HyperparameterRecord {
    /// Lee y valida el JSON de hiperparámetros
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|e| EncodeError::Configuration {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;
        let value: Value = serde_json::from_str(&text).map_err(|e| EncodeError::Configuration {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;
        Self::from_json(&value)
    }

    /// Extrae las seis claves. Las claves extra se ignoran.
    pub fn from_json(value: &Value) -> Result<Self> {
        let mut values = [0i32; 6];
        for (slot, key) in values.iter_mut().zip(REQUIRED_KEYS) {
            let v = value
                .get(key)
                .ok_or_else(|| EncodeError::MissingHyperparameter(key.to_string()))?;
            *slot = v
                .as_i64()
                .and_then(|n| i32::try_from(n).ok())
                .ok_or_else(|| EncodeError::InvalidHyperparameter {
                    key: key.to_string(),
                    value: v.to_string(),
                })?;
        }
        Ok(Self::from_array(values))
    }

    /// Valores en orden de header (mismo orden que REQUIRED_KEYS)
    pub fn as_array(&self) -> [i32; 6] {
        [
            self.vocab_size,
            self.max_seq_len,
            self.d_model,
            self.n_heads,
            self.n_layers,
            self.ff_mult,
        ]
    }

    pub fn from_array(values: [i32; 6]) -> Self {
        Self {
            vocab_size: values[0],
            max_seq_len: values[1],
            d_model: values[2],
            n_heads: values[3],
            n_layers: values[4],
            ff_mult: values[5],
        }
    }
}
