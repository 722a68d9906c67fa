// src/safetensor/mod.rs
// ============================================================================
// SAFETENSOR SOURCE - Lee el checkpoint entrenado (un solo fichero)
// ============================================================================
//
// Los tensores se entregan en el orden físico del fichero (offset de datos
// ascendente), que es estable entre ejecuciones. El JSON del header se
// guarda en un HashMap, así que su orden no sirve.
//
// ============================================================================

use std::collections::HashMap;
use std::fs::File;
use std::io::{BufReader, Read};
use std::path::{Path, PathBuf};

use memmap2::Mmap;
use serde::Deserialize;

use crate::error::{EncodeError, Result};
use crate::tensor::{DType, SourceTensor, TensorEntry};

/// Información de un tensor en el archivo safetensor
#[derive(Debug, Clone, Deserialize)]
pub struct TensorInfo {
    pub dtype: String,
    pub shape: Vec<usize>,
    pub data_offsets: [usize; 2],
}

/// Header del archivo safetensor
#[derive(Debug, Deserialize)]
pub struct SafetensorHeader {
    #[serde(flatten)]
    pub tensors: HashMap<String, TensorInfo>,
    #[serde(rename = "__metadata__")]
    pub metadata: Option<HashMap<String, String>>,
}

/// Tensor ya validado contra el fichero. El dtype se guarda tal cual:
/// uno desconocido solo falla si el tensor llega a escribirse.
#[derive(Debug, Clone)]
struct Slot {
    name: String,
    dtype: String,
    shape: Vec<usize>,
    start: usize,
    end: usize,
}

/// Archivo safetensor abierto
pub struct SafetensorFile {
    pub path: PathBuf,
    pub metadata: HashMap<String, String>,
    data_start: usize,
    slots: Vec<Slot>,
    mmap: Mmap,
}

impl SafetensorFile {
    /// Abre un archivo safetensor y valida header + offsets
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let file = File::open(&path)?;

        // Leer tamaño del header (primeros 8 bytes, little-endian u64)
        let mut reader = BufReader::new(&file);
        let mut header_size_bytes = [0u8; 8];
        reader.read_exact(&mut header_size_bytes)?;
        let header_size = usize::try_from(u64::from_le_bytes(header_size_bytes))
            .map_err(|_| EncodeError::Source("header size does not fit in memory".into()))?;

        let file_len = file.metadata()?.len() as usize;
        if header_size > file_len.saturating_sub(8) {
            return Err(EncodeError::Source(format!(
                "header size {} exceeds file size {}",
                header_size, file_len
            )));
        }

        // Leer header JSON
        let mut header_bytes = vec![0u8; header_size];
        reader.read_exact(&mut header_bytes)?;

        let header: SafetensorHeader = serde_json::from_slice(&header_bytes)
            .map_err(|e| EncodeError::Source(format!("invalid header JSON: {}", e)))?;

        // Memory map el archivo
        let mmap = unsafe { Mmap::map(&file)? };
        let data_start = 8 + header_size;
        let data_len = mmap.len() - data_start;

        let mut slots = Vec::with_capacity(header.tensors.len());
        for (name, info) in header.tensors {
            let [start, end] = info.data_offsets;
            if start > end || end > data_len {
                return Err(EncodeError::Source(format!(
                    "tensor '{}' has invalid offsets [{}, {}] (data size {})",
                    name, start, end, data_len
                )));
            }
            slots.push(Slot {
                name,
                dtype: info.dtype,
                shape: info.shape,
                start,
                end,
            });
        }

        // Orden físico; empate (tensores vacíos) por nombre
        slots.sort_by(|a, b| a.start.cmp(&b.start).then_with(|| a.name.cmp(&b.name)));

        // Dos tensores no pueden compartir bytes (los vacíos no ocupan nada)
        let mut previous: Option<&Slot> = None;
        for slot in slots.iter().filter(|s| s.start < s.end) {
            if let Some(prev) = previous {
                if prev.end > slot.start {
                    return Err(EncodeError::Source(format!(
                        "tensors '{}' [{}, {}] and '{}' [{}, {}] overlap",
                        prev.name, prev.start, prev.end, slot.name, slot.start, slot.end
                    )));
                }
            }
            previous = Some(slot);
        }

        Ok(Self {
            path,
            metadata: header.metadata.unwrap_or_default(),
            data_start,
            slots,
            mmap,
        })
    }

    /// Número total de tensores
    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    /// Nombres en orden de entrega
    pub fn tensor_names(&self) -> impl Iterator<Item = &str> {
        self.slots.iter().map(|s| s.name.as_str())
    }

    fn entry(&self, slot: &Slot) -> SourceTensor<'_> {
        let Some(dtype) = DType::from_str(&slot.dtype) else {
            return SourceTensor::Unsupported {
                name: slot.name.clone(),
                shape: slot.shape.clone(),
                dtype: slot.dtype.clone(),
            };
        };
        let bytes = &self.mmap[self.data_start + slot.start..self.data_start + slot.end];
        TensorEntry::new(slot.name.clone(), slot.shape.clone(), dtype, bytes).into()
    }

    /// Tensores zero-copy (prestados del mmap), en orden de fichero.
    /// El tamaño y el dtype de cada uno los valida el encoder.
    pub fn tensors(&self) -> impl Iterator<Item = SourceTensor<'_>> + '_ {
        self.slots.iter().map(move |slot| self.entry(slot))
    }

    /// Lee un tensor por nombre
    pub fn tensor(&self, name: &str) -> Option<SourceTensor<'_>> {
        self.slots.iter().find(|s| s.name == name).map(|s| self.entry(s))
    }
}
