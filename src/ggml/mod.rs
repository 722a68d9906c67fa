// src/ggml/mod.rs
// ============================================================================
// GGML - Contenedor binario (header + registros de tensor)
// ============================================================================

pub mod header;
pub mod reader;
pub mod writer;

pub use header::*;
pub use reader::{GgmlReader, RecordView};
pub use writer::{GgmlWriter, WriteSummary};
