
//! The codec abstraction used to compress and decompress tile payloads,
//! and the built-in codec implementations.
//!
//! A file carries an ordered list of codec identifications. The position of a
//! codec in that list is its index, and the first byte of every compressed
//! packing names the codec that produced it. Decoding a file therefore only
//! requires that the reading application has codecs registered under the same
//! identifications.

mod deflate;
mod float;
mod huffman;

pub use deflate::CodecDeflate;
pub use float::CodecFloat;
pub use huffman::CodecHuffman;

use std::sync::Arc;

use crate::error::{Error, Result};
use crate::spec::{validate_identifier, STANDARD_CODEC_IDENTIFICATIONS};

#[cfg(feature = "rayon")]
use std::sync::Mutex;


/// Number of workers racing the candidate encoders of one tile.
#[cfg(feature = "rayon")]
const ENCODER_WORKER_COUNT: usize = 3;


/// A compression scheme for tile element payloads.
///
/// Implementations declare which sample domains they support. An encoder
/// returns `None` when its output would not beat the raw sample bytes; the
/// caller separately compares the winning output against the standard tile
/// form. The first byte of every produced packing must be the `codec_index`
/// passed in, and decoding failures surface as `InvalidCompressionCode`.
pub trait Codec: std::fmt::Debug + Send + Sync {

    /// Whether integer samples (`Short`, `Int`, `IntCodedFloat`) can be encoded.
    fn implements_integer_encoding(&self) -> bool;

    /// Whether floating-point samples can be encoded.
    fn implements_floating_point_encoding(&self) -> bool;

    /// Compress integer samples, or `None` if compression does not pay off.
    fn encode_integers(&self, _codec_index: u8, _n_rows: usize, _n_cols: usize, _values: &[i32])
        -> Option<Vec<u8>> { None }

    /// Compress floating-point samples, or `None` if compression does not pay off.
    fn encode_floats(&self, _codec_index: u8, _n_rows: usize, _n_cols: usize, _values: &[f32])
        -> Option<Vec<u8>> { None }

    /// Decompress integer samples from a packing this codec produced.
    fn decode_integers(&self, _n_rows: usize, _n_cols: usize, packing: &[u8]) -> Result<Vec<i32>> {
        Err(invalid_packing(packing))
    }

    /// Decompress floating-point samples from a packing this codec produced.
    fn decode_floats(&self, _n_rows: usize, _n_cols: usize, packing: &[u8]) -> Result<Vec<f32>> {
        Err(invalid_packing(packing))
    }
}

pub(crate) fn invalid_packing(packing: &[u8]) -> Error {
    Error::InvalidCompressionCode(packing.first().copied().unwrap_or(0))
}


/// The codecs an application has made available,
/// keyed by their identification strings.
#[derive(Debug, Clone)]
pub struct CodecRegistry {
    entries: Vec<(String, Arc<dyn Codec>)>,
}

impl CodecRegistry {

    /// A registry with no codecs at all. Files opened through it can
    /// read standard-form tiles but fail to decode compressed ones.
    pub fn empty() -> Self {
        CodecRegistry { entries: Vec::new() }
    }

    /// A registry holding the standard codecs.
    pub fn standard() -> Self {
        let mut registry = CodecRegistry { entries: Vec::new() };

        let [huffman, deflate, float] = STANDARD_CODEC_IDENTIFICATIONS;
        registry.entries.push((huffman.to_string(), Arc::new(CodecHuffman)));
        registry.entries.push((deflate.to_string(), Arc::new(CodecDeflate)));
        registry.entries.push((float.to_string(), Arc::new(CodecFloat)));
        registry
    }

    /// Make a codec available under the given identification,
    /// replacing any codec previously registered under the same name.
    pub fn register(&mut self, identification: impl Into<String>, codec: Arc<dyn Codec>)
        -> Result<()>
    {
        let identification = identification.into();
        validate_identifier(&identification)?;

        if identification.len() > 16 {
            return Err(Error::invalid_spec("codec identification longer than 16 characters"));
        }

        match self.entries.iter_mut().find(|(name, _)| *name == identification) {
            Some(entry) => entry.1 = codec,
            None => self.entries.push((identification, codec)),
        }

        Ok(())
    }

    /// The codec registered under the given identification.
    pub fn find(&self, identification: &str) -> Option<Arc<dyn Codec>> {
        self.entries.iter()
            .find(|(name, _)| name == identification)
            .map(|(_, codec)| codec.clone())
    }
}


/// The resolved codec list of one file, in index order.
///
/// Identifications that have no registered codec keep their slot so that the
/// indices of the remaining codecs stay aligned with the file; packings that
/// name such a slot fail to decode.
#[derive(Debug)]
pub struct CodecMaster {
    codecs: Vec<(String, Option<Arc<dyn Codec>>)>,

    #[cfg(feature = "rayon")]
    workers: Option<rayon_core::ThreadPool>,
}

impl CodecMaster {

    /// Resolve the identification list of a file against a registry.
    pub fn new(identifications: &[String], registry: &CodecRegistry) -> Self {
        let codecs: Vec<_> = identifications.iter()
            .map(|identification| (identification.clone(), registry.find(identification)))
            .collect();

        #[cfg(feature = "rayon")]
        let workers = if codecs.len() > 1 {
            rayon_core::ThreadPoolBuilder::new()
                .num_threads(ENCODER_WORKER_COUNT)
                .build().ok()
        } else { None };

        CodecMaster {
            codecs,

            #[cfg(feature = "rayon")]
            workers,
        }
    }

    /// Whether this file has any codecs at all.
    pub fn is_enabled(&self) -> bool {
        !self.codecs.is_empty()
    }

    /// The identifications of this file, in index order.
    pub fn identifications(&self) -> impl Iterator<Item = &str> {
        self.codecs.iter().map(|(identification, _)| identification.as_str())
    }

    fn codec_for_packing(&self, packing: &[u8]) -> Result<&dyn Codec> {
        let index = *packing.first().ok_or(Error::InvalidCompressionCode(0))?;

        self.codecs
            .get(index as usize)
            .and_then(|(_, codec)| codec.as_deref())
            .ok_or(Error::InvalidCompressionCode(index))
    }

    /// Compress integer samples with whichever capable codec
    /// produces the shortest packing.
    pub fn encode_integers(&self, n_rows: usize, n_cols: usize, values: &[i32]) -> Option<Vec<u8>> {
        self.race(
            |codec| codec.implements_integer_encoding(),
            |codec, index| codec.encode_integers(index, n_rows, n_cols, values),
        )
    }

    /// Compress floating-point samples with whichever capable codec
    /// produces the shortest packing.
    pub fn encode_floats(&self, n_rows: usize, n_cols: usize, values: &[f32]) -> Option<Vec<u8>> {
        self.race(
            |codec| codec.implements_floating_point_encoding(),
            |codec, index| codec.encode_floats(index, n_rows, n_cols, values),
        )
    }

    /// Decompress integer samples; the first packing byte selects the codec.
    pub fn decode_integers(&self, n_rows: usize, n_cols: usize, packing: &[u8]) -> Result<Vec<i32>> {
        self.codec_for_packing(packing)?.decode_integers(n_rows, n_cols, packing)
    }

    /// Decompress floating-point samples; the first packing byte selects the codec.
    pub fn decode_floats(&self, n_rows: usize, n_cols: usize, packing: &[u8]) -> Result<Vec<f32>> {
        self.codec_for_packing(packing)?.decode_floats(n_rows, n_cols, packing)
    }

    fn candidates<'c>(&'c self, capable: &'c dyn Fn(&dyn Codec) -> bool)
        -> impl Iterator<Item = (u8, &'c dyn Codec)> + 'c
    {
        self.codecs.iter().enumerate()
            .filter_map(|(index, (_, codec))| Some((index as u8, codec.as_deref()?)))
            .filter(move |(_, codec)| capable(*codec))
    }

    /// Run every capable encoder and keep the shortest successful output.
    /// With the `rayon` feature the candidates are dispatched across a small
    /// worker pool and collected under a mutex; the collector is drained
    /// before this returns, so the caller never observes a pending encode.
    fn race(
        &self,
        capable: impl Fn(&dyn Codec) -> bool + Sync,
        encode: impl Fn(&dyn Codec, u8) -> Option<Vec<u8>> + Sync,
    ) -> Option<Vec<u8>>
    {
        #[cfg(feature = "rayon")]
        if let Some(workers) = &self.workers {
            let results = Mutex::new(CompressorResults::default());

            workers.scope(|scope| {
                for (index, codec) in self.candidates(&capable) {
                    let results = &results;
                    let encode = &encode;
                    scope.spawn(move |_| {
                        let packing = encode(codec, index);
                        results.lock().expect("encoder worker panicked").offer(packing);
                    });
                }
            });

            return results.into_inner().expect("encoder worker panicked").shortest;
        }

        let mut results = CompressorResults::default();
        for (index, codec) in self.candidates(&capable) {
            results.offer(encode(codec, index));
        }

        results.shortest
    }
}


/// Collects the candidate packings of one tile; the shortest wins.
#[derive(Debug, Default)]
struct CompressorResults {
    shortest: Option<Vec<u8>>,
}

impl CompressorResults {
    fn offer(&mut self, candidate: Option<Vec<u8>>) {
        if let Some(packing) = candidate {
            let improves = self.shortest.as_ref()
                .map_or(true, |shortest| packing.len() < shortest.len());

            if improves { self.shortest = Some(packing); }
        }
    }
}


/// Byte-stream filters shared by the built-in codecs.
pub(crate) mod filters {

    /// Replace each byte with its difference to the previous byte.
    /// Sample streams with smooth gradients become long runs of small values.
    pub fn samples_to_differences(buffer: &mut [u8]) {
        for index in (1 .. buffer.len()).rev() {
            buffer[index] = buffer[index].wrapping_sub(buffer[index - 1]);
        }
    }

    /// Integrate over all differences to reconstruct the sample bytes.
    pub fn differences_to_samples(buffer: &mut [u8]) {
        for index in 1 .. buffer.len() {
            buffer[index] = buffer[index].wrapping_add(buffer[index - 1]);
        }
    }

    /// Regroup little-endian i32 sample bytes into four planes,
    /// least significant byte plane first.
    pub fn separate_integer_planes(values: &[i32]) -> Vec<u8> {
        let mut planes = vec![0_u8; values.len() * 4];

        for plane in 0 .. 4 {
            let shift = plane * 8;
            for (index, value) in values.iter().enumerate() {
                planes[plane * values.len() + index] = (*value >> shift) as u8;
            }
        }

        planes
    }

    /// Reassemble i32 samples from four byte planes.
    pub fn interleave_integer_planes(planes: &[u8], count: usize) -> Vec<i32> {
        debug_assert_eq!(planes.len(), count * 4);

        let mut values = vec![0_i32; count];
        for plane in 0 .. 4 {
            let shift = plane * 8;
            for (index, value) in values.iter_mut().enumerate() {
                *value |= (planes[plane * count + index] as i32) << shift;
            }
        }

        values
    }


    #[cfg(test)]
    mod test {

        #[test]
        fn roundtrip_differences(){
            let source = vec![ 0, 1, 2, 250, 4, 5, 6, 7, 13, 9, 10 ];
            let mut modified = source.clone();

            super::samples_to_differences(&mut modified);
            super::differences_to_samples(&mut modified);

            assert_eq!(source, modified);
        }

        #[test]
        fn roundtrip_planes(){
            let source = vec![ 0, -1, 70_000, i32::MIN, i32::MAX, 42 ];
            let planes = super::separate_integer_planes(&source);
            assert_eq!(super::interleave_integer_planes(&planes, source.len()), source);
        }

        #[test]
        fn planes_group_low_bytes_together(){
            let planes = super::separate_integer_planes(&[0x0403_0201, 0x0807_0605]);
            assert_eq!(planes, [0x01, 0x05, 0x02, 0x06, 0x03, 0x07, 0x04, 0x08]);
        }
    }
}


#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn standard_registry_resolves_all_identifications(){
        let registry = CodecRegistry::standard();
        for identification in STANDARD_CODEC_IDENTIFICATIONS {
            assert!(registry.find(identification).is_some());
        }
        assert!(registry.find("NoSuchCodec").is_none());
    }

    #[test]
    fn master_keeps_unknown_slots_aligned(){
        let identifications = vec!["Mystery".to_string(), "GvrsDeflate".to_string()];
        let master = CodecMaster::new(&identifications, &CodecRegistry::standard());

        // slot 0 is unresolved, so index 1 must still reach the deflate codec
        let values = vec![7_i32; 1000];
        let packing = master.encode_integers(10, 100, &values).unwrap();
        assert_eq!(packing[0], 1);

        assert_eq!(master.decode_integers(10, 100, &packing).unwrap(), values);
        assert!(matches!(
            master.decode_integers(10, 100, &[0, 0, 0]),
            Err(Error::InvalidCompressionCode(0)),
        ));
    }

    #[test]
    fn race_prefers_the_shortest_packing(){
        let mut results = CompressorResults::default();
        results.offer(Some(vec![0; 100]));
        results.offer(None);
        results.offer(Some(vec![1; 40]));
        results.offer(Some(vec![2; 60]));
        assert_eq!(results.shortest.unwrap().len(), 40);
    }

    #[test]
    fn smooth_integer_surface_compresses(){
        let master = CodecMaster::new(
            &STANDARD_CODEC_IDENTIFICATIONS.map(String::from),
            &CodecRegistry::standard(),
        );

        let values: Vec<i32> = (0 .. 60 * 60)
            .map(|index| 400 + (index % 60) + index / 60)
            .collect();

        let packing = master.encode_integers(60, 60, &values).unwrap();
        assert!(packing.len() < values.len() * 4);
        assert_eq!(master.decode_integers(60, 60, &packing).unwrap(), values);
    }

    #[test]
    fn smooth_float_surface_compresses(){
        let master = CodecMaster::new(
            &STANDARD_CODEC_IDENTIFICATIONS.map(String::from),
            &CodecRegistry::standard(),
        );

        let values: Vec<f32> = (0 .. 60 * 60)
            .map(|index| (index % 60) as f32 * 0.25 + (index / 60) as f32)
            .collect();

        let packing = master.encode_floats(60, 60, &values).unwrap();
        assert!(packing.len() < values.len() * 4);
        assert_eq!(master.decode_floats(60, 60, &packing).unwrap(), values);
    }
}
