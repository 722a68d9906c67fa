// src/ggml/header.rs
// ============================================================================
// GGML HEADER - 8 × int32 little-endian (32 bytes)
// ============================================================================
//
//   magic | vocab_size | max_seq_len | d_model | n_heads | n_layers
//         | ff_mult | storage_flag
//
// Cada registro de tensor va después:
//
//   dim_count | name_len | storage_kind | dims[dim_count] (invertidas)
//   | name (UTF-8, sin terminador) | payload
//
// ============================================================================

use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
use std::fmt;
use std::io::{self, Cursor, Write};

use crate::error::{EncodeError, Result};
use crate::hparams::HyperparameterRecord;

/// Magic: "ggml" en hex
pub const MAGIC: i32 = 0x6767_6D6C;

/// Tamaño del header
pub const HEADER_SIZE: usize = 8 * 4;

/// Prefijo fijo de cada registro (dim_count, name_len, storage_kind)
pub const RECORD_PREFIX_SIZE: usize = 3 * 4;

/// Modo pedido en el CLI. Se guarda en el header como `storage_flag`;
/// no dice nada del formato real de cada tensor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PrecisionMode {
    /// Todo en FP32
    Full = 0,
    /// Matrices `*.weight` 2-D en FP16, el resto FP32
    Compact = 1,
}

impl PrecisionMode {
    pub fn from_half(use_half_precision: bool) -> Self {
        if use_half_precision {
            Self::Compact
        } else {
            Self::Full
        }
    }

    pub fn flag(&self) -> i32 {
        *self as i32
    }

    pub fn from_flag(flag: i32) -> Option<Self> {
        match flag {
            0 => Some(Self::Full),
            1 => Some(Self::Compact),
            _ => None,
        }
    }
}

/// Codificación en disco de los elementos de un tensor
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StorageKind {
    F32 = 0,
    F16 = 1,
}

impl StorageKind {
    pub fn code(&self) -> i32 {
        *self as i32
    }

    pub fn from_code(code: i32) -> Option<Self> {
        match code {
            0 => Some(Self::F32),
            1 => Some(Self::F16),
            _ => None,
        }
    }

    /// Bytes por elemento
    pub fn width(&self) -> usize {
        match self {
            Self::F32 => 4,
            Self::F16 => 2,
        }
    }
}

impl fmt::Display for StorageKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::F32 => f.write_str("f32"),
            Self::F16 => f.write_str("f16"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GgmlHeader {
    pub hparams: HyperparameterRecord,
    pub mode: PrecisionMode,
}

impl GgmlHeader {
    pub fn new(hparams: HyperparameterRecord, mode: PrecisionMode) -> Self {
        Self { hparams, mode }
    }

    pub fn write_to<W: Write>(&self, w: &mut W) -> io::Result<()> {
        w.write_i32::<LittleEndian>(MAGIC)?;
        for value in self.hparams.as_array() {
            w.write_i32::<LittleEndian>(value)?;
        }
        w.write_i32::<LittleEndian>(self.mode.flag())
    }

    /// Serializa a bytes
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut buf = Vec::with_capacity(HEADER_SIZE);
        // Escribir en un Vec no falla
        let _ = self.write_to(&mut buf);
        buf
    }

    /// Deserializa y valida magic + flag
    pub fn from_bytes(data: &[u8]) -> Result<Self> {
        if data.len() < HEADER_SIZE {
            return Err(EncodeError::Format(format!(
                "header truncated: {} bytes (expected {})",
                data.len(),
                HEADER_SIZE
            )));
        }
        let mut cursor = Cursor::new(data);

        let magic = cursor.read_i32::<LittleEndian>()?;
        if magic != MAGIC {
            return Err(EncodeError::Format(format!("invalid magic: 0x{:08X}", magic)));
        }

        let mut values = [0i32; 6];
        for v in values.iter_mut() {
            *v = cursor.read_i32::<LittleEndian>()?;
        }

        let flag = cursor.read_i32::<LittleEndian>()?;
        let mode = PrecisionMode::from_flag(flag)
            .ok_or_else(|| EncodeError::Format(format!("invalid storage flag: {}", flag)))?;

        Ok(Self {
            hparams: HyperparameterRecord::from_array(values),
            mode,
        })
    }
}

/// Bytes que ocupa un registro completo
pub fn record_size(rank: usize, name_len: usize, numel: usize, kind: StorageKind) -> usize {
    RECORD_PREFIX_SIZE + rank * 4 + name_len + numel * kind.width()
}

/// Contador del formato (i32); rechaza lo que no cabe
pub(crate) fn count_i32(value: usize, what: &str) -> io::Result<i32> {
    i32::try_from(value).map_err(|_| {
        io::Error::new(
            io::ErrorKind::InvalidInput,
            format!("{} {} does not fit in int32", what, value),
        )
    })
}

/// Prefijo de un registro: contadores + dims invertidas.
/// `shape` es la forma lógica (dimensión más lenta primero).
pub fn write_record_prefix<W: Write>(
    w: &mut W,
    shape: &[i32],
    name_len: usize,
    kind: StorageKind,
) -> io::Result<()> {
    let dim_count = count_i32(shape.len(), "dim count")?;
    let name_len = count_i32(name_len, "name length")?;
    w.write_i32::<LittleEndian>(dim_count)?;
    w.write_i32::<LittleEndian>(name_len)?;
    w.write_i32::<LittleEndian>(kind.code())?;
    for &dim in shape.iter().rev() {
        w.write_i32::<LittleEndian>(dim)?;
    }
    Ok(())
}
