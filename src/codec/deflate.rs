
//! The standard zlib codec for integer samples.
//!
//! Samples are regrouped into byte planes so that the high-order bytes,
//! which are near-constant for most raster data, form long compressible
//! runs. A one-byte predictor field records whether the difference filter
//! was applied; the encoder tries both forms and keeps the shorter one.

use super::filters::{
    differences_to_samples, interleave_integer_planes,
    samples_to_differences, separate_integer_planes,
};
use super::{invalid_packing, Codec};
use crate::error::Result;


const PREDICTOR_NONE: u8 = 0;
const PREDICTOR_DIFFERENCING: u8 = 1;

const COMPRESSION_LEVEL: u8 = 6;


/// The built-in codec registered as `GvrsDeflate`.
#[derive(Debug, Clone, Copy, Default)]
pub struct CodecDeflate;

impl Codec for CodecDeflate {

    fn implements_integer_encoding(&self) -> bool { true }
    fn implements_floating_point_encoding(&self) -> bool { false }

    fn encode_integers(&self, codec_index: u8, n_rows: usize, n_cols: usize, values: &[i32])
        -> Option<Vec<u8>>
    {
        debug_assert_eq!(values.len(), n_rows * n_cols);
        let raw_size = values.len() * 4;

        let mut plain = Vec::with_capacity(raw_size);
        for value in values {
            plain.extend_from_slice(&value.to_le_bytes());
        }

        let mut filtered = separate_integer_planes(values);
        samples_to_differences(&mut filtered);

        let mut best: Option<Vec<u8>> = None;
        for (predictor, bytes) in [(PREDICTOR_NONE, &plain), (PREDICTOR_DIFFERENCING, &filtered)] {
            let deflated = miniz_oxide::deflate::compress_to_vec_zlib(bytes, COMPRESSION_LEVEL);
            let packed_size = deflated.len() + 2;

            if packed_size >= raw_size { continue; }

            if best.as_ref().map_or(true, |shortest| packed_size < shortest.len()) {
                let mut packing = Vec::with_capacity(packed_size);
                packing.push(codec_index);
                packing.push(predictor);
                packing.extend_from_slice(&deflated);
                best = Some(packing);
            }
        }

        best
    }

    fn decode_integers(&self, n_rows: usize, n_cols: usize, packing: &[u8]) -> Result<Vec<i32>> {
        let count = n_rows * n_cols;
        let expected_size = count * 4;

        let (predictor, deflated) = match packing {
            [_, predictor, deflated @ ..] => (*predictor, deflated),
            _ => return Err(invalid_packing(packing)),
        };

        let options = zune_inflate::DeflateOptions::default()
            .set_limit(expected_size)
            .set_size_hint(expected_size);

        let mut bytes = zune_inflate::DeflateDecoder::new_with_options(deflated, options)
            .decode_zlib()
            .map_err(|_| invalid_packing(packing))?;

        if bytes.len() != expected_size {
            return Err(invalid_packing(packing));
        }

        match predictor {
            PREDICTOR_NONE => Ok(
                bytes.chunks_exact(4)
                    .map(|chunk| i32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]))
                    .collect()
            ),

            PREDICTOR_DIFFERENCING => {
                differences_to_samples(&mut bytes);
                Ok(interleave_integer_planes(&bytes, count))
            },

            _ => Err(invalid_packing(packing)),
        }
    }
}


#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn constant_surface_round_trips_small(){
        let values = vec![42_i32; 60 * 60];
        let packing = CodecDeflate.encode_integers(1, 60, 60, &values).unwrap();

        assert_eq!(packing[0], 1);
        assert!(packing.len() < values.len() * 4 / 10);
        assert_eq!(CodecDeflate.decode_integers(60, 60, &packing).unwrap(), values);
    }

    #[test]
    fn gradient_surface_round_trips(){
        let values: Vec<i32> = (0 .. 48 * 33).map(|index| -2000 + index * 3).collect();
        let packing = CodecDeflate.encode_integers(0, 48, 33, &values).unwrap();
        assert_eq!(CodecDeflate.decode_integers(48, 33, &packing).unwrap(), values);
    }

    #[test]
    fn incompressible_noise_is_declined(){
        // a linear congruential scramble defeats both predictor forms
        let mut state = 0x2545_f491_u32;
        let values: Vec<i32> = (0 .. 32 * 32).map(|_| {
            state = state.wrapping_mul(747_796_405).wrapping_add(2_891_336_453);
            state as i32
        }).collect();

        assert!(CodecDeflate.encode_integers(0, 32, 32, &values).is_none());
    }

    #[test]
    fn corrupt_packing_is_rejected(){
        assert!(CodecDeflate.decode_integers(4, 4, &[0, 1, 99, 98, 97]).is_err());
        assert!(CodecDeflate.decode_integers(4, 4, &[0]).is_err());
    }

    #[test]
    fn floats_are_not_supported(){
        assert!(!CodecDeflate.implements_floating_point_encoding());
        assert!(CodecDeflate.encode_floats(0, 2, 2, &[1.0, 2.0, 3.0, 4.0]).is_none());
    }
}
