// src/ggml/writer.rs
// ============================================================================
// GGML WRITER - Escritura secuencial del contenedor
// ============================================================================
//
// Solo avanza: header, luego registros en el orden recibido. No hay seek,
// así que sirve cualquier `Write` (fichero, Vec, stdout).
//
// ============================================================================

use std::io::{self, Write};

use xxhash_rust::xxh3::Xxh3;

use super::header::*;

/// Resumen de lo escrito
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WriteSummary {
    pub bytes_written: u64,
    /// XXH3-64 de todo el stream
    pub digest: u64,
}

pub struct GgmlWriter<W: Write> {
    sink: W,
    hasher: Xxh3,
    bytes_written: u64,
    records: usize,
}

impl<W: Write> GgmlWriter<W> {
    pub fn new(sink: W) -> Self {
        Self {
            sink,
            hasher: Xxh3::new(),
            bytes_written: 0,
            records: 0,
        }
    }

    fn put(&mut self, data: &[u8]) -> io::Result<()> {
        self.sink.write_all(data)?;
        self.hasher.update(data);
        self.bytes_written += data.len() as u64;
        Ok(())
    }

    pub fn write_header(&mut self, header: &GgmlHeader) -> io::Result<()> {
        self.put(&header.to_bytes())
    }

    /// Escribe un registro de tensor.
    /// `shape` es la forma lógica; se invierte al escribir las dims.
    pub fn write_record(
        &mut self,
        name: &str,
        shape: &[i32],
        kind: StorageKind,
        payload: &[u8],
    ) -> io::Result<()> {
        let name_bytes = name.as_bytes();
        let mut prefix = Vec::with_capacity(RECORD_PREFIX_SIZE + shape.len() * 4);
        write_record_prefix(&mut prefix, shape, name_bytes.len(), kind)?;

        self.put(&prefix)?;
        self.put(name_bytes)?;
        self.put(payload)?;
        self.records += 1;
        Ok(())
    }

    pub fn records(&self) -> usize {
        self.records
    }

    pub fn bytes_written(&self) -> u64 {
        self.bytes_written
    }

    /// Flush y devuelve el resumen
    pub fn finish(mut self) -> io::Result<WriteSummary> {
        self.sink.flush()?;
        Ok(WriteSummary {
            bytes_written: self.bytes_written,
            digest: self.hasher.digest(),
        })
    }
}
