// src/tensor.rs
// ============================================================================
// TENSOR - Entrada de la conversión + casts numéricos explícitos
// ============================================================================
//
// Redondeo:
//   - x → FP16: IEEE round-to-nearest, ties-to-even (half::f16::from_f32 /
//     from_f64). Fuera de rango → ±inf, NaN se conserva.
//   - F64 → F32: `as` (nearest-even).
//   - Enteros → F32: `as f32` (nearest). BOOL → 0.0 / 1.0.
//   - F32→F32 y F16→F16 copian los bytes tal cual.
//
// ============================================================================

use std::borrow::Cow;

use byteorder::{ByteOrder, LittleEndian};
use half::{bf16, f16};

use crate::error::{EncodeError, Result};
use crate::ggml::StorageKind;

/// Tipo de elemento del origen (nombres de safetensors)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DType {
    F64,
    F32,
    F16,
    BF16,
    I64,
    I32,
    I16,
    I8,
    U8,
    Bool,
}

impl DType {
    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_uppercase().as_str() {
            "F64" => Some(Self::F64),
            "F32" => Some(Self::F32),
            "F16" => Some(Self::F16),
            "BF16" => Some(Self::BF16),
            "I64" => Some(Self::I64),
            "I32" => Some(Self::I32),
            "I16" => Some(Self::I16),
            "I8" => Some(Self::I8),
            "U8" => Some(Self::U8),
            "BOOL" => Some(Self::Bool),
            _ => None,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::F64 => "F64",
            Self::F32 => "F32",
            Self::F16 => "F16",
            Self::BF16 => "BF16",
            Self::I64 => "I64",
            Self::I32 => "I32",
            Self::I16 => "I16",
            Self::I8 => "I8",
            Self::U8 => "U8",
            Self::Bool => "BOOL",
        }
    }

    /// Bytes por elemento
    pub fn width(&self) -> usize {
        match self {
            Self::F64 | Self::I64 => 8,
            Self::F32 | Self::I32 => 4,
            Self::F16 | Self::BF16 | Self::I16 => 2,
            Self::I8 | Self::U8 | Self::Bool => 1,
        }
    }
}

/// Tensor con nombre. Los bytes pueden venir prestados de un mmap.
#[derive(Debug, Clone)]
pub struct TensorEntry<'a> {
    pub name: String,
    pub shape: Vec<usize>,
    pub dtype: DType,
    /// Little-endian, row-major
    pub data: Cow<'a, [u8]>,
}

impl<'a> TensorEntry<'a> {
    pub fn new(
        name: impl Into<String>,
        shape: Vec<usize>,
        dtype: DType,
        data: impl Into<Cow<'a, [u8]>>,
    ) -> Self {
        Self {
            name: name.into(),
            shape,
            dtype,
            data: data.into(),
        }
    }

    pub fn from_f32(name: impl Into<String>, shape: Vec<usize>, values: &[f32]) -> TensorEntry<'static> {
        let data: Vec<u8> = values.iter().flat_map(|v| v.to_le_bytes()).collect();
        TensorEntry::new(name, shape, DType::F32, data)
    }

    pub fn numel(&self) -> usize {
        self.shape.iter().product()
    }

    /// Bytes esperados según shape × dtype (None si desborda)
    pub fn expected_len(&self) -> Option<usize> {
        self.shape
            .iter()
            .try_fold(self.dtype.width(), |acc, &d| acc.checked_mul(d))
    }

    /// Comprueba nombre y tamaño de los datos
    pub fn validate(&self) -> Result<()> {
        if self.name.is_empty() {
            return Err(EncodeError::InvalidTensorName);
        }
        match self.expected_len() {
            Some(expected) if expected == self.data.len() => Ok(()),
            Some(expected) => Err(EncodeError::shape_mismatch(&self.name, expected, self.data.len())),
            None => Err(EncodeError::shape_mismatch(&self.name, usize::MAX, self.data.len())),
        }
    }
}

/// Tensor tal como lo entrega el origen. Un dtype desconocido no es error
/// hasta que el encoder decide que el tensor se escribe.
#[derive(Debug, Clone)]
pub enum SourceTensor<'a> {
    Entry(TensorEntry<'a>),
    Unsupported {
        name: String,
        shape: Vec<usize>,
        dtype: String,
    },
}

impl<'a> SourceTensor<'a> {
    pub fn name(&self) -> &str {
        match self {
            Self::Entry(t) => &t.name,
            Self::Unsupported { name, .. } => name,
        }
    }

    pub fn shape(&self) -> &[usize] {
        match self {
            Self::Entry(t) => &t.shape,
            Self::Unsupported { shape, .. } => shape,
        }
    }

    /// El tensor legible, o `UnsupportedDtype`
    pub fn into_entry(self) -> Result<TensorEntry<'a>> {
        match self {
            Self::Entry(t) => Ok(t),
            Self::Unsupported { name, dtype, .. } => Err(EncodeError::UnsupportedDtype { name, dtype }),
        }
    }
}

impl<'a> From<TensorEntry<'a>> for SourceTensor<'a> {
    fn from(entry: TensorEntry<'a>) -> Self {
        Self::Entry(entry)
    }
}

/// Decodifica cualquier dtype soportado a f32
pub fn to_f32_vec(data: &[u8], dtype: DType) -> Vec<f32> {
    match dtype {
        DType::F64 => data.chunks_exact(8).map(|b| LittleEndian::read_f64(b) as f32).collect(),
        DType::F32 => data.chunks_exact(4).map(LittleEndian::read_f32).collect(),
        DType::F16 => data
            .chunks_exact(2)
            .map(|b| f16::from_le_bytes([b[0], b[1]]).to_f32())
            .collect(),
        DType::BF16 => data
            .chunks_exact(2)
            .map(|b| bf16::from_le_bytes([b[0], b[1]]).to_f32())
            .collect(),
        DType::I64 => data.chunks_exact(8).map(|b| LittleEndian::read_i64(b) as f32).collect(),
        DType::I32 => data.chunks_exact(4).map(|b| LittleEndian::read_i32(b) as f32).collect(),
        DType::I16 => data.chunks_exact(2).map(|b| LittleEndian::read_i16(b) as f32).collect(),
        DType::I8 => data.iter().map(|&b| b as i8 as f32).collect(),
        DType::U8 => data.iter().map(|&b| b as f32).collect(),
        DType::Bool => data.iter().map(|&b| if b != 0 { 1.0 } else { 0.0 }).collect(),
    }
}

/// Convierte los bytes del origen al formato de almacenamiento
pub fn convert(data: &[u8], from: DType, to: StorageKind) -> Cow<'_, [u8]> {
    match (from, to) {
        (DType::F32, StorageKind::F32) | (DType::F16, StorageKind::F16) => Cow::Borrowed(data),
        // Directo para no redondear dos veces
        (DType::F64, StorageKind::F16) => Cow::Owned(
            data.chunks_exact(8)
                .flat_map(|b| f16::from_f64(LittleEndian::read_f64(b)).to_le_bytes())
                .collect(),
        ),
        (_, StorageKind::F32) => Cow::Owned(
            to_f32_vec(data, from)
                .into_iter()
                .flat_map(|v| v.to_le_bytes())
                .collect(),
        ),
        (_, StorageKind::F16) => Cow::Owned(
            to_f32_vec(data, from)
                .into_iter()
                .flat_map(|v| f16::from_f32(v).to_le_bytes())
                .collect(),
        ),
    }
}
