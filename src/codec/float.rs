
//! The standard codec for floating-point samples.
//!
//! IEEE-754 bit patterns compress poorly as whole words because the
//! mantissa bytes are noisy while the sign/exponent bytes are highly
//! repetitive. This codec splits the samples into four byte planes,
//! most significant first, difference-filters each plane, and deflates
//! the planes as separate streams.

use super::filters::{differences_to_samples, samples_to_differences};
use super::{invalid_packing, Codec};
use crate::error::Result;


const COMPRESSION_LEVEL: u8 = 6;


/// The built-in codec registered as `GvrsFloat`.
#[derive(Debug, Clone, Copy, Default)]
pub struct CodecFloat;

impl Codec for CodecFloat {

    fn implements_integer_encoding(&self) -> bool { false }
    fn implements_floating_point_encoding(&self) -> bool { true }

    fn encode_floats(&self, codec_index: u8, n_rows: usize, n_cols: usize, values: &[f32])
        -> Option<Vec<u8>>
    {
        debug_assert_eq!(values.len(), n_rows * n_cols);
        let raw_size = values.len() * 4;

        let mut packing = vec![codec_index];

        // plane 3 first: sign and exponent bytes
        for plane in (0 .. 4).rev() {
            let shift = plane * 8;

            let mut bytes: Vec<u8> = values.iter()
                .map(|value| (value.to_bits() >> shift) as u8)
                .collect();

            samples_to_differences(&mut bytes);

            let deflated = miniz_oxide::deflate::compress_to_vec_zlib(&bytes, COMPRESSION_LEVEL);
            packing.extend_from_slice(&(deflated.len() as u32).to_le_bytes());
            packing.extend_from_slice(&deflated);

            if packing.len() >= raw_size { return None; }
        }

        Some(packing)
    }

    fn decode_floats(&self, n_rows: usize, n_cols: usize, packing: &[u8]) -> Result<Vec<f32>> {
        let count = n_rows * n_cols;
        let mut bits = vec![0_u32; count];
        let mut remaining = packing.get(1 ..).ok_or_else(|| invalid_packing(packing))?;

        for plane in (0 .. 4).rev() {
            let shift = plane * 8;

            if remaining.len() < 4 { return Err(invalid_packing(packing)); }
            let (prefix, rest) = remaining.split_at(4);
            let deflated_len = u32::from_le_bytes([prefix[0], prefix[1], prefix[2], prefix[3]]) as usize;

            if rest.len() < deflated_len { return Err(invalid_packing(packing)); }
            let (deflated, rest) = rest.split_at(deflated_len);
            remaining = rest;

            let options = zune_inflate::DeflateOptions::default()
                .set_limit(count)
                .set_size_hint(count);

            let mut bytes = zune_inflate::DeflateDecoder::new_with_options(deflated, options)
                .decode_zlib()
                .map_err(|_| invalid_packing(packing))?;

            if bytes.len() != count { return Err(invalid_packing(packing)); }
            differences_to_samples(&mut bytes);

            for (value, byte) in bits.iter_mut().zip(&bytes) {
                *value |= (*byte as u32) << shift;
            }
        }

        Ok(bits.into_iter().map(f32::from_bits).collect())
    }
}


#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn smooth_surface_round_trips_exactly(){
        let values: Vec<f32> = (0 .. 60 * 60)
            .map(|index| 1013.25 + (index % 60) as f32 * 0.125)
            .collect();

        let packing = CodecFloat.encode_floats(2, 60, 60, &values).unwrap();
        assert_eq!(packing[0], 2);
        assert!(packing.len() < values.len() * 4);

        // a lossless codec must reproduce the exact bit patterns
        let decoded = CodecFloat.decode_floats(60, 60, &packing).unwrap();
        let bits: Vec<u32> = decoded.iter().map(|value| value.to_bits()).collect();
        let expected: Vec<u32> = values.iter().map(|value| value.to_bits()).collect();
        assert_eq!(bits, expected);
    }

    #[test]
    fn special_values_survive(){
        let values = vec![
            0.0, -0.0, f32::NAN, f32::INFINITY, f32::NEG_INFINITY,
            f32::MIN_POSITIVE, 1.0e-40,  // subnormal
            0.0, 0.0, 0.0, 0.0, 0.0, 0.0, 0.0, 0.0, 0.0,
        ];

        let packing = CodecFloat.encode_floats(0, 4, 4, &values).unwrap();
        let decoded = CodecFloat.decode_floats(4, 4, &packing).unwrap();

        for (before, after) in values.iter().zip(&decoded) {
            assert_eq!(before.to_bits(), after.to_bits());
        }
    }

    #[test]
    fn truncated_packing_is_rejected(){
        let values = vec![1.5_f32; 100];
        let packing = CodecFloat.encode_floats(0, 10, 10, &values).unwrap();

        assert!(CodecFloat.decode_floats(10, 10, &packing[.. packing.len() - 3]).is_err());
        assert!(CodecFloat.decode_floats(10, 10, &[0]).is_err());
    }

    #[test]
    fn integers_are_not_supported(){
        assert!(!CodecFloat.implements_integer_encoding());
        assert!(CodecFloat.encode_integers(0, 2, 2, &[1, 2, 3, 4]).is_none());
    }
}
