// src/encoder.rs
// ============================================================================
// ENCODER - Hiperparámetros + tensores → contenedor ggml
// ============================================================================
//
// Una sola pasada hacia delante:
//   1. header (magic + 6 hparams + storage_flag)
//   2. por tensor: exclusión → dtype/validación → decide_storage → cast
//      → registro
//
// Con batch_size > 1 los casts de un lote van en paralelo (rayon), pero la
// escritura sigue siendo secuencial y en el orden de entrada.
//
// ============================================================================

use std::borrow::Cow;
use std::io::Write;

use log::{debug, info};
use rayon::prelude::*;

use crate::error::{EncodeError, Result};
use crate::ggml::{GgmlHeader, GgmlWriter, PrecisionMode, StorageKind};
use crate::hparams::HyperparameterRecord;
use crate::policy::{decide_storage, SkipRules};
use crate::tensor::{convert, DType, SourceTensor, TensorEntry};

/// Opciones de codificación
#[derive(Debug, Clone)]
pub struct EncodeOptions {
    pub mode: PrecisionMode,
    pub skip_rules: SkipRules,
    /// Quita dimensiones de tamaño 1 antes de escribir (como el conversor legacy)
    pub squeeze: bool,
    /// Tensores convertidos en paralelo por lote; 1 = secuencial
    pub batch_size: usize,
}

impl Default for EncodeOptions {
    fn default() -> Self {
        Self {
            mode: PrecisionMode::Compact,
            skip_rules: SkipRules::default(),
            squeeze: false,
            batch_size: 1,
        }
    }
}

impl EncodeOptions {
    pub fn new(use_half_precision: bool) -> Self {
        Self {
            mode: PrecisionMode::from_half(use_half_precision),
            ..Default::default()
        }
    }

    pub fn with_skip_rules(mut self, rules: SkipRules) -> Self {
        self.skip_rules = rules;
        self
    }

    pub fn with_squeeze(mut self, squeeze: bool) -> Self {
        self.squeeze = squeeze;
        self
    }

    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size.max(1);
        self
    }
}

/// Estadísticas de conversión
#[derive(Debug, Default, Clone)]
pub struct EncodeStats {
    pub f32_count: usize,
    pub f16_count: usize,
    /// Nombres excluidos, en orden de entrada
    pub skipped: Vec<String>,
    pub bytes_written: u64,
    /// XXH3-64 del stream completo
    pub digest: u64,
}

impl EncodeStats {
    pub fn total_records(&self) -> usize {
        self.f32_count + self.f16_count
    }

    pub fn record(&mut self, kind: StorageKind) {
        match kind {
            StorageKind::F32 => self.f32_count += 1,
            StorageKind::F16 => self.f16_count += 1,
        }
    }
}

/// Tensor listo para escribir
#[derive(Debug)]
pub struct PreparedRecord<'t> {
    pub name: &'t str,
    /// Forma lógica (tras squeeze si aplica)
    pub shape: Vec<i32>,
    pub kind: StorageKind,
    pub payload: Cow<'t, [u8]>,
}

pub struct Encoder {
    options: EncodeOptions,
}

impl Encoder {
    pub fn new(options: EncodeOptions) -> Self {
        Self { options }
    }

    pub fn options(&self) -> &EncodeOptions {
        &self.options
    }

    /// Escribe el contenedor completo en `sink`.
    ///
    /// Cualquier error aborta; lo ya escrito no es un fichero válido.
    pub fn encode<'a, W, I>(&self, hparams: &HyperparameterRecord, tensors: I, sink: W) -> Result<EncodeStats>
    where
        W: Write,
        I: IntoIterator,
        I::Item: Into<SourceTensor<'a>>,
    {
        let mut writer = GgmlWriter::new(sink);
        writer.write_header(&GgmlHeader::new(*hparams, self.options.mode))?;

        let mut stats = EncodeStats::default();
        let batch_size = self.options.batch_size.max(1);
        let mut batch: Vec<TensorEntry<'a>> = Vec::with_capacity(batch_size);

        for item in tensors {
            let source: SourceTensor<'a> = item.into();
            info!("Processing variable: {} with shape: {:?}", source.name(), source.shape());

            if let Some(suffix) = self.options.skip_rules.matching(source.name()) {
                info!("  Skipping variable: {} (suffix {})", source.name(), suffix);
                stats.skipped.push(source.name().to_string());
                continue;
            }

            // dtype desconocido: lo anterior se escribe y se aborta aquí
            let tensor = match source.into_entry() {
                Ok(tensor) => tensor,
                Err(e) => {
                    self.flush_batch(&mut batch, &mut writer, &mut stats)?;
                    return Err(e);
                }
            };

            batch.push(tensor);
            if batch.len() >= batch_size {
                self.flush_batch(&mut batch, &mut writer, &mut stats)?;
            }
        }
        self.flush_batch(&mut batch, &mut writer, &mut stats)?;
        info!("Wrote {} records, {} bytes", writer.records(), writer.bytes_written());

        let summary = writer.finish()?;
        stats.bytes_written = summary.bytes_written;
        stats.digest = summary.digest;
        Ok(stats)
    }

    fn flush_batch<W: Write>(
        &self,
        batch: &mut Vec<TensorEntry<'_>>,
        writer: &mut GgmlWriter<W>,
        stats: &mut EncodeStats,
    ) -> Result<()> {
        // collect() de rayon conserva el orden de entrada
        let prepared: Vec<Result<PreparedRecord<'_>>> = if batch.len() > 1 {
            batch.par_iter().map(|t| self.prepare(t)).collect()
        } else {
            batch.iter().map(|t| self.prepare(t)).collect()
        };

        for record in prepared {
            let record = record?;
            writer.write_record(record.name, &record.shape, record.kind, &record.payload)?;
            stats.record(record.kind);
        }
        batch.clear();
        Ok(())
    }

    /// Valida, decide formato y convierte un tensor (sin I/O)
    pub fn prepare<'t>(&self, tensor: &'t TensorEntry<'_>) -> Result<PreparedRecord<'t>> {
        tensor.validate()?;

        let name_len = tensor.name.len();
        if i32::try_from(name_len).is_err() {
            return Err(EncodeError::DimensionOverflow {
                name: tensor.name.clone(),
                value: name_len,
            });
        }

        let shape = tensor
            .shape
            .iter()
            .copied()
            .filter(|&d| !(self.options.squeeze && d == 1))
            .map(|d| {
                i32::try_from(d).map_err(|_| EncodeError::DimensionOverflow {
                    name: tensor.name.clone(),
                    value: d,
                })
            })
            .collect::<Result<Vec<i32>>>()?;

        let kind = decide_storage(self.options.mode, &tensor.name, shape.len());
        match (tensor.dtype, kind) {
            (DType::F32, StorageKind::F32) | (DType::F16, StorageKind::F16) => {}
            (from, to) => debug!(
                "  Converting {} elements {} -> {}",
                tensor.numel(),
                from.name(),
                to
            ),
        }

        let payload = convert(&tensor.data, tensor.dtype, kind);

        Ok(PreparedRecord {
            name: &tensor.name,
            shape,
            kind,
            payload,
        })
    }
}

/// Atajo con opciones por defecto: `use_half_precision` elige el modo
pub fn encode<'a, W, I>(
    hparams: &HyperparameterRecord,
    tensors: I,
    use_half_precision: bool,
    sink: W,
) -> Result<EncodeStats>
where
    W: Write,
    I: IntoIterator,
    I::Item: Into<SourceTensor<'a>>,
{
    Encoder::new(EncodeOptions::new(use_half_precision)).encode(hparams, tensors, sink)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ggml::{GgmlReader, HEADER_SIZE};
    use half::f16;

    fn hparams() -> HyperparameterRecord {
        HyperparameterRecord::from_array([100, 8, 4, 1, 1, 4])
    }

    fn seq(n: usize) -> Vec<f32> {
        (0..n).map(|i| i as f32 * 0.25 - 1.0).collect()
    }

    fn sample_tensors() -> Vec<TensorEntry<'static>> {
        vec![
            TensorEntry::from_f32("layer.0.weight", vec![4, 4], &seq(16)),
            TensorEntry::from_f32("layer.0.bias", vec![4], &seq(4)),
            TensorEntry::from_f32("layer.0.rotary_emb.inv_freq", vec![2], &seq(2)),
        ]
    }

    fn model_tensors() -> Vec<TensorEntry<'static>> {
        let half: Vec<u8> = seq(6).iter().flat_map(|&v| f16::from_f32(v).to_le_bytes()).collect();
        let ints: Vec<u8> = (0..3i64).flat_map(|v| v.to_le_bytes()).collect();
        vec![
            TensorEntry::from_f32("tok_emb.weight", vec![10, 4], &seq(40)),
            TensorEntry::from_f32("layers.0.attn.rotary_emb.inv_freq", vec![2], &seq(2)),
            TensorEntry::new("layers.0.attn.qkv.weight", vec![2, 3], DType::F16, half),
            TensorEntry::from_f32("layers.0.attn.qkv.bias", vec![6], &seq(6)),
            TensorEntry::from_f32("layers.0.conv.weight", vec![2, 1, 3], &seq(6)),
            TensorEntry::new("layers.0.pos_ids", vec![3], DType::I64, ints),
            TensorEntry::from_f32("layers.1.attn.rotary_emb.inv_freq", vec![2], &seq(2)),
            TensorEntry::from_f32("norm.weight", vec![4], &seq(4)),
            TensorEntry::from_f32("scale", vec![], &[2.0]),
        ]
    }

    fn encode_to_vec(options: EncodeOptions, tensors: Vec<TensorEntry<'static>>) -> (Vec<u8>, EncodeStats) {
        let mut buf = Vec::new();
        let stats = Encoder::new(options).encode(&hparams(), tensors, &mut buf).unwrap();
        (buf, stats)
    }

    #[test]
    fn test_example_scenario() {
        let mut buf = Vec::new();
        let stats = encode(&hparams(), sample_tensors(), true, &mut buf).unwrap();

        assert_eq!(stats.total_records(), 2);
        assert_eq!(stats.f16_count, 1);
        assert_eq!(stats.skipped, vec!["layer.0.rotary_emb.inv_freq".to_string()]);
        assert_eq!(stats.bytes_written as usize, buf.len());

        let reader = GgmlReader::new(&buf).unwrap();
        assert_eq!(reader.header().hparams, hparams());
        assert_eq!(reader.header().mode, PrecisionMode::Compact);

        let records = reader.read_all().unwrap();
        assert_eq!(records.len(), 2);

        assert_eq!(records[0].name, "layer.0.weight");
        assert_eq!(records[0].kind, StorageKind::F16);
        assert_eq!(records[0].dims, vec![4, 4]);
        assert_eq!(records[0].payload.len(), 32);

        assert_eq!(records[1].name, "layer.0.bias");
        assert_eq!(records[1].kind, StorageKind::F32);
        assert_eq!(records[1].dims, vec![4]);
        assert_eq!(records[1].payload.len(), 16);
        assert_eq!(records[1].to_f32(), seq(4));

        // header + (12 + 8 + 14 + 32) + (12 + 4 + 12 + 16)
        assert_eq!(buf.len(), HEADER_SIZE + 66 + 44);
    }

    #[test]
    fn test_roundtrip_shape_and_order() {
        let input = model_tensors();
        let expected: Vec<(String, Vec<usize>)> = input
            .iter()
            .filter(|t| !t.name.ends_with(".rotary_emb.inv_freq"))
            .map(|t| (t.name.clone(), t.shape.clone()))
            .collect();

        let (buf, stats) = encode_to_vec(EncodeOptions::new(true), input);
        assert_eq!(stats.skipped.len(), 2);

        let reader = GgmlReader::new(&buf).unwrap();
        let records = reader.read_all().unwrap();
        assert_eq!(records.len(), expected.len());
        for (record, (name, shape)) in records.iter().zip(&expected) {
            assert_eq!(record.name, name);
            assert_eq!(&record.shape(), shape);
            assert_eq!(record.numel(), shape.iter().product::<usize>());
            assert_eq!(record.payload.len(), record.numel() * record.kind.width());
        }
    }

    #[test]
    fn test_dims_reversed_on_disk() {
        let tensors = vec![TensorEntry::from_f32("proj.weight", vec![2, 3], &seq(6))];
        let (buf, _) = encode_to_vec(EncodeOptions::new(true), tensors);
        let records = GgmlReader::new(&buf).unwrap().read_all().unwrap();
        assert_eq!(records[0].dims, vec![3, 2]);
        assert_eq!(records[0].shape(), vec![2, 3]);
        // el payload mantiene el orden row-major original
        assert_eq!(records[0].to_f32(), seq(6));
    }

    #[test]
    fn test_full_precision_policy() {
        let (buf, stats) = encode_to_vec(EncodeOptions::new(false), model_tensors());
        assert_eq!(stats.f16_count, 0);

        let reader = GgmlReader::new(&buf).unwrap();
        assert_eq!(reader.header().mode, PrecisionMode::Full);
        for record in reader.read_all().unwrap() {
            assert_eq!(record.kind, StorageKind::F32, "{}", record.name);
        }

        // F16 e I64 se convierten numéricamente a F32
        let qkv = reader.find("layers.0.attn.qkv.weight").unwrap().unwrap();
        assert_eq!(qkv.to_f32(), seq(6));
        let ids = reader.find("layers.0.pos_ids").unwrap().unwrap();
        assert_eq!(ids.to_f32(), vec![0.0, 1.0, 2.0]);
    }

    #[test]
    fn test_compact_policy() {
        let (buf, _) = encode_to_vec(EncodeOptions::new(true), model_tensors());
        for record in GgmlReader::new(&buf).unwrap().read_all().unwrap() {
            let is_weight = record.name.rsplit('.').next() == Some("weight");
            let expected = if is_weight && record.dims.len() == 2 {
                StorageKind::F16
            } else {
                StorageKind::F32
            };
            assert_eq!(record.kind, expected, "{}", record.name);
        }
    }

    #[test]
    fn test_squeeze_changes_rank() {
        let tensors = || vec![TensorEntry::from_f32("layers.0.conv.weight", vec![2, 1, 3], &seq(6))];

        let (plain, _) = encode_to_vec(EncodeOptions::new(true), tensors());
        let records = GgmlReader::new(&plain).unwrap().read_all().unwrap();
        assert_eq!(records[0].kind, StorageKind::F32);
        assert_eq!(records[0].dims, vec![3, 1, 2]);

        let (squeezed, _) = encode_to_vec(EncodeOptions::new(true).with_squeeze(true), tensors());
        let records = GgmlReader::new(&squeezed).unwrap().read_all().unwrap();
        assert_eq!(records[0].kind, StorageKind::F16);
        assert_eq!(records[0].dims, vec![3, 2]);
    }

    #[test]
    fn test_deterministic() {
        let (a, sa) = encode_to_vec(EncodeOptions::new(true), model_tensors());
        let (b, sb) = encode_to_vec(EncodeOptions::new(true), model_tensors());
        assert_eq!(a, b);
        assert_eq!(sa.digest, sb.digest);
    }

    #[test]
    fn test_parallel_matches_sequential() {
        let (seq_bytes, _) = encode_to_vec(EncodeOptions::new(true), model_tensors());
        for batch in [2, 3, 64] {
            let (par_bytes, stats) =
                encode_to_vec(EncodeOptions::new(true).with_batch_size(batch), model_tensors());
            assert_eq!(par_bytes, seq_bytes, "batch {}", batch);
            assert_eq!(stats.total_records(), 7);
        }
    }

    #[test]
    fn test_custom_skip_rules() {
        let rules = SkipRules::default().with_suffix(".pos_ids");
        let (buf, stats) = encode_to_vec(EncodeOptions::new(true).with_skip_rules(rules), model_tensors());
        assert_eq!(stats.skipped.len(), 3);
        let reader = GgmlReader::new(&buf).unwrap();
        assert!(reader.find("layers.0.pos_ids").unwrap().is_none());
    }

    #[test]
    fn test_shape_mismatch_aborts() {
        let tensors = vec![
            TensorEntry::from_f32("a.weight", vec![2, 2], &seq(4)),
            TensorEntry::new("b.weight", vec![2, 2], DType::F32, vec![0u8; 12]),
            TensorEntry::from_f32("c.weight", vec![2, 2], &seq(4)),
        ];
        for batch in [1, 3] {
            let mut buf = Vec::new();
            let err = Encoder::new(EncodeOptions::new(true).with_batch_size(batch))
                .encode(&hparams(), tensors.clone(), &mut buf)
                .unwrap_err();
            match err {
                EncodeError::ShapeMismatch { name, .. } => assert_eq!(name, "b.weight"),
                other => panic!("unexpected {:?}", other),
            }
            // "c.weight" nunca llega a escribirse
            let text = String::from_utf8_lossy(&buf);
            assert!(!text.contains("c.weight"));
        }
    }

    #[test]
    fn test_excluded_tensor_is_not_validated() {
        let tensors = vec![TensorEntry::new("x.rotary_emb.inv_freq", vec![4], DType::F32, vec![0u8; 3])];
        let (buf, stats) = encode_to_vec(EncodeOptions::new(true), tensors);
        assert_eq!(buf.len(), HEADER_SIZE);
        assert_eq!(stats.total_records(), 0);
    }

    #[test]
    fn test_unsupported_dtype_checked_after_exclusion() {
        let fp8 = |name: &str| SourceTensor::Unsupported {
            name: name.to_string(),
            shape: vec![2],
            dtype: "F8_E4M3".to_string(),
        };
        let bias = SourceTensor::from(TensorEntry::from_f32("a.bias", vec![2], &seq(2)));

        // excluido: no importa que su dtype sea ilegible
        let mut buf = Vec::new();
        let stats = Encoder::new(EncodeOptions::new(true))
            .encode(&hparams(), vec![fp8("x.rotary_emb.inv_freq"), bias.clone()], &mut buf)
            .unwrap();
        assert_eq!(stats.skipped, vec!["x.rotary_emb.inv_freq".to_string()]);
        assert_eq!(stats.total_records(), 1);

        for batch in [1, 4] {
            let mut buf = Vec::new();
            let err = Encoder::new(EncodeOptions::new(true).with_batch_size(batch))
                .encode(&hparams(), vec![bias.clone(), fp8("q.weight")], &mut buf)
                .unwrap_err();
            match err {
                EncodeError::UnsupportedDtype { name, dtype } => {
                    assert_eq!(name, "q.weight");
                    assert_eq!(dtype, "F8_E4M3");
                }
                other => panic!("unexpected {:?}", other),
            }
            // el tensor anterior sí llegó al stream
            let records: Vec<_> = GgmlReader::new(&buf).unwrap().records().collect();
            assert_eq!(records.len(), 1);
            assert_eq!(records[0].as_ref().unwrap().name, "a.bias");
        }
    }

    #[test]
    fn test_dimension_overflow() {
        let big = i32::MAX as usize + 1;
        let tensor = TensorEntry::new("huge", vec![big, 0], DType::F32, vec![]);
        let encoder = Encoder::new(EncodeOptions::new(false));
        assert!(matches!(
            encoder.prepare(&tensor),
            Err(EncodeError::DimensionOverflow { value, .. }) if value == big
        ));
    }

    #[test]
    fn test_io_failure() {
        struct Closed;
        impl Write for Closed {
            fn write(&mut self, _: &[u8]) -> std::io::Result<usize> {
                Err(std::io::Error::new(std::io::ErrorKind::BrokenPipe, "closed"))
            }
            fn flush(&mut self) -> std::io::Result<()> {
                Ok(())
            }
        }
        let err = encode(&hparams(), sample_tensors(), true, Closed).unwrap_err();
        assert!(matches!(err, EncodeError::IoFailure(_)));
    }
}
