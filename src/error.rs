// src/error.rs
// ============================================================================
// ERRORES - Taxonomía de fallos de la conversión
// ============================================================================
//
// Todos los errores son fatales: la conversión es un batch de una sola
// pasada, no se reintenta nada. Cada variante lleva el nombre del tensor
// o de la clave que lo provocó.
//
// ============================================================================

use std::path::PathBuf;

use thiserror::Error;

pub type Result<T> = std::result::Result<T, EncodeError>;

#[derive(Debug, Error)]
pub enum EncodeError {
    /// Fichero de hiperparámetros ausente o con JSON inválido
    #[error("configuration error in {path}: {reason}")]
    Configuration { path: PathBuf, reason: String },

    #[error("missing hyperparameter '{0}'")]
    MissingHyperparameter(String),

    #[error("hyperparameter '{key}' is not a 32-bit integer: {value}")]
    InvalidHyperparameter { key: String, value: String },

    #[error("tensor '{name}': expected {expected} bytes for its shape, got {actual}")]
    ShapeMismatch {
        name: String,
        expected: usize,
        actual: usize,
    },

    #[error("tensor '{name}': unsupported dtype {dtype}")]
    UnsupportedDtype { name: String, dtype: String },

    #[error("tensor name must not be empty")]
    InvalidTensorName,

    #[error("tensor '{name}': value {value} does not fit in int32")]
    DimensionOverflow { name: String, value: usize },

    /// Archivo safetensors corrupto
    #[error("invalid source archive: {0}")]
    Source(String),

    /// Contenedor ggml corrupto (solo al decodificar)
    #[error("invalid ggml container: {0}")]
    Format(String),

    #[error("I/O failure: {0}")]
    IoFailure(#[from] std::io::Error),
}

impl EncodeError {
    pub fn shape_mismatch(name: &str, expected: usize, actual: usize) -> Self {
        Self::ShapeMismatch {
            name: name.to_string(),
            expected,
            actual,
        }
    }
}
