// src/lib.rs
// ============================================================================
// ARIA-CONVERT - Conversor de checkpoints a contenedor ggml
// ============================================================================

pub mod builder;
pub mod encoder;
pub mod error;
pub mod ggml;
pub mod hparams;
pub mod policy;
pub mod safetensor;
pub mod tensor;

// Re-exports principales
pub use builder::convert_model;
pub use encoder::{encode, EncodeOptions, EncodeStats, Encoder};
pub use error::{EncodeError, Result};
pub use ggml::{GgmlReader, GgmlWriter, PrecisionMode, StorageKind};
pub use hparams::{HyperparameterRecord, ModelSize};
pub use policy::{decide_storage, SkipRules};
pub use safetensor::SafetensorFile;
pub use tensor::{DType, SourceTensor, TensorEntry};
