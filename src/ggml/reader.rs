// src/ggml/reader.rs
// ============================================================================
// GGML READER - Decodificación zero-copy (slice o mmap)
// ============================================================================

use byteorder::{ByteOrder, LittleEndian};
use half::f16;

use super::header::*;
use crate::error::{EncodeError, Result};

/// Vista de un registro dentro del buffer
#[derive(Debug, Clone)]
pub struct RecordView<'a> {
    pub name: &'a str,
    pub kind: StorageKind,
    /// Dims tal como están en disco (más rápida primero)
    pub dims: Vec<i32>,
    pub payload: &'a [u8],
    /// Offset del registro en el fichero
    pub offset: usize,
}

impl<'a> RecordView<'a> {
    /// Forma lógica (dims des-invertidas)
    pub fn shape(&self) -> Vec<usize> {
        self.dims.iter().rev().map(|&d| d as usize).collect()
    }

    pub fn numel(&self) -> usize {
        self.dims.iter().map(|&d| d as usize).product()
    }

    /// Payload como f32
    pub fn to_f32(&self) -> Vec<f32> {
        match self.kind {
            StorageKind::F32 => self
                .payload
                .chunks_exact(4)
                .map(LittleEndian::read_f32)
                .collect(),
            StorageKind::F16 => self
                .payload
                .chunks_exact(2)
                .map(|b| f16::from_le_bytes([b[0], b[1]]).to_f32())
                .collect(),
        }
    }
}

pub struct GgmlReader<'a> {
    data: &'a [u8],
    header: GgmlHeader,
}

impl<'a> GgmlReader<'a> {
    pub fn new(data: &'a [u8]) -> Result<Self> {
        let header = GgmlHeader::from_bytes(data)?;
        Ok(Self { data, header })
    }

    pub fn header(&self) -> &GgmlHeader {
        &self.header
    }

    /// Iterador sobre registros en orden de fichero
    pub fn records(&self) -> Records<'a> {
        Records {
            data: self.data,
            pos: HEADER_SIZE,
            failed: false,
        }
    }

    /// Todos los registros; falla en el primero corrupto
    pub fn read_all(&self) -> Result<Vec<RecordView<'a>>> {
        self.records().collect()
    }

    pub fn find(&self, name: &str) -> Result<Option<RecordView<'a>>> {
        for record in self.records() {
            let record = record?;
            if record.name == name {
                return Ok(Some(record));
            }
        }
        Ok(None)
    }
}

pub struct Records<'a> {
    data: &'a [u8],
    pos: usize,
    failed: bool,
}

impl<'a> Records<'a> {
    fn take(&mut self, len: usize, what: &str) -> Result<&'a [u8]> {
        let end = self
            .pos
            .checked_add(len)
            .filter(|&end| end <= self.data.len())
            .ok_or_else(|| {
                EncodeError::Format(format!("truncated {} at offset {}", what, self.pos))
            })?;
        let slice = &self.data[self.pos..end];
        self.pos = end;
        Ok(slice)
    }

    fn read_i32(&mut self, what: &str) -> Result<i32> {
        Ok(LittleEndian::read_i32(self.take(4, what)?))
    }

    fn next_record(&mut self) -> Result<RecordView<'a>> {
        let offset = self.pos;

        let dim_count = self.read_i32("record header")?;
        let name_len = self.read_i32("record header")?;
        let kind_code = self.read_i32("record header")?;

        if dim_count < 0 || name_len < 0 {
            return Err(EncodeError::Format(format!(
                "negative counts at offset {}: dims={} name_len={}",
                offset, dim_count, name_len
            )));
        }
        let kind = StorageKind::from_code(kind_code).ok_or_else(|| {
            EncodeError::Format(format!("unknown storage kind {} at offset {}", kind_code, offset))
        })?;

        // dim_count viene del fichero: no reservar más de lo que queda
        let remaining = self.data.len() - self.pos;
        if dim_count as usize > remaining / 4 {
            return Err(EncodeError::Format(format!(
                "truncated dims at offset {}: {} declared, {} bytes left",
                offset, dim_count, remaining
            )));
        }
        let mut dims = Vec::with_capacity(dim_count as usize);
        for _ in 0..dim_count {
            let d = self.read_i32("dims")?;
            if d < 0 {
                return Err(EncodeError::Format(format!("negative dim {} at offset {}", d, offset)));
            }
            dims.push(d);
        }

        let name = std::str::from_utf8(self.take(name_len as usize, "name")?)
            .map_err(|_| EncodeError::Format(format!("non UTF-8 name at offset {}", offset)))?;

        let payload_len = dims
            .iter()
            .try_fold(kind.width(), |acc, &d| acc.checked_mul(d as usize))
            .ok_or_else(|| EncodeError::Format(format!("payload size overflow for '{}'", name)))?;
        let payload = self.take(payload_len, "payload")?;

        Ok(RecordView {
            name,
            kind,
            dims,
            payload,
            offset,
        })
    }
}

impl<'a> Iterator for Records<'a> {
    type Item = Result<RecordView<'a>>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.failed || self.pos >= self.data.len() {
            return None;
        }
        let result = self.next_record();
        if result.is_err() {
            self.failed = true;
        }
        Some(result)
    }
}
