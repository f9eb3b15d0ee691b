
//! The canonical Huffman codec for integer samples.
//!
//! Operates on the same plane-separated, difference-filtered byte streams as
//! the deflate codec, but entropy-codes them directly. On strongly quantized
//! rasters, where a handful of difference values dominate, this often beats
//! the zlib dictionary approach.
//!
//! Packing layout after the codec index and predictor byte: a 256-entry
//! table of canonical code lengths (zero marks an unused symbol), then the
//! bit stream, most significant bit first. The sample count is implied by
//! the tile dimensions, so neither a byte count nor a bit count is stored.

use std::cmp::Reverse;
use std::collections::BinaryHeap;

use super::filters::{
    differences_to_samples, interleave_integer_planes,
    samples_to_differences, separate_integer_planes,
};
use super::{invalid_packing, Codec};
use crate::error::Result;


const PREDICTOR_NONE: u8 = 0;
const PREDICTOR_DIFFERENCING: u8 = 1;

/// Codes longer than this cannot be flushed through the 64-bit buffer.
/// Such trees require astronomically skewed counts; the encoder declines.
const MAX_CODE_LENGTH: u8 = 56;


/// The built-in codec registered as `GvrsHuffman`.
#[derive(Debug, Clone, Copy, Default)]
pub struct CodecHuffman;

impl Codec for CodecHuffman {

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
            let encoded = match encode_bytes(bytes) {
                Some(encoded) => encoded,
                None => continue,
            };

            let packed_size = encoded.len() + 2;
            if packed_size >= raw_size { continue; }

            if best.as_ref().map_or(true, |shortest| packed_size < shortest.len()) {
                let mut packing = Vec::with_capacity(packed_size);
                packing.push(codec_index);
                packing.push(predictor);
                packing.extend_from_slice(&encoded);
                best = Some(packing);
            }
        }

        best
    }

    fn decode_integers(&self, n_rows: usize, n_cols: usize, packing: &[u8]) -> Result<Vec<i32>> {
        let count = n_rows * n_cols;

        let (predictor, encoded) = match packing {
            [_, predictor, encoded @ ..] => (*predictor, encoded),
            _ => return Err(invalid_packing(packing)),
        };

        let mut bytes = decode_bytes(encoded, count * 4)
            .ok_or_else(|| invalid_packing(packing))?;

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


/// Derive a code length per symbol from the frequency counts
/// by pairing the two least frequent subtrees until one remains.
fn build_code_lengths(frequencies: &[u64; 256]) -> [u8; 256] {
    let mut lengths = [0_u8; 256];

    let symbols: Vec<usize> = (0 .. 256)
        .filter(|&symbol| frequencies[symbol] > 0)
        .collect();

    match symbols.as_slice() {
        [] => return lengths,
        [only] => { lengths[*only] = 1; return lengths; },
        _ => {},
    }

    // leaves are nodes 0..symbols.len(), internal nodes follow
    let mut parent = vec![usize::MAX; symbols.len() * 2 - 1];

    let mut heap: BinaryHeap<Reverse<(u64, usize)>> = symbols.iter().enumerate()
        .map(|(node, &symbol)| Reverse((frequencies[symbol], node)))
        .collect();

    let mut next_node = symbols.len();
    while let (Some(Reverse((weight_a, a))), Some(Reverse((weight_b, b)))) = (heap.pop(), heap.pop()) {
        parent[a] = next_node;
        parent[b] = next_node;
        heap.push(Reverse((weight_a + weight_b, next_node)));
        next_node += 1;

        if heap.len() == 1 { break; }
    }

    for (node, &symbol) in symbols.iter().enumerate() {
        let mut depth = 0_u8;
        let mut cursor = node;

        while parent[cursor] != usize::MAX {
            depth += 1;
            cursor = parent[cursor];
        }

        lengths[symbol] = depth;
    }

    lengths
}

/// The starting canonical code for each length, derived from the
/// per-length symbol counts in the usual deflate manner.
fn first_codes(count_per_length: &[u64; 64]) -> [u64; 64] {
    let mut first = [0_u64; 64];
    let mut code = 0_u64;

    for bits in 1 .. 64 {
        code = (code + count_per_length[bits - 1]) << 1;
        first[bits] = code;
    }

    first
}

fn encode_bytes(bytes: &[u8]) -> Option<Vec<u8>> {
    let mut frequencies = [0_u64; 256];
    for &byte in bytes {
        frequencies[byte as usize] += 1;
    }

    let lengths = build_code_lengths(&frequencies);
    if lengths.iter().any(|&length| length > MAX_CODE_LENGTH) { return None; }

    let mut count_per_length = [0_u64; 64];
    for &length in &lengths {
        if length > 0 { count_per_length[length as usize] += 1; }
    }

    let mut next_code = first_codes(&count_per_length);
    let mut codes = [0_u64; 256];
    for symbol in 0 .. 256 {
        let length = lengths[symbol] as usize;
        if length > 0 {
            codes[symbol] = next_code[length];
            next_code[length] += 1;
        }
    }

    let mut out = Vec::with_capacity(256 + bytes.len() / 2);
    out.extend_from_slice(&lengths);

    let mut bit_buffer = 0_u64;
    let mut bit_count = 0_u32;

    for &byte in bytes {
        let length = lengths[byte as usize] as u32;
        bit_buffer = (bit_buffer << length) | codes[byte as usize];
        bit_count += length;

        while bit_count >= 8 {
            out.push((bit_buffer >> (bit_count - 8)) as u8);
            bit_count -= 8;
        }
    }

    if bit_count > 0 {
        out.push((bit_buffer << (8 - bit_count)) as u8);
    }

    Some(out)
}

/// Decode exactly `count` symbols, or `None` when the table or
/// the bit stream is malformed.
fn decode_bytes(encoded: &[u8], count: usize) -> Option<Vec<u8>> {
    if encoded.len() < 256 { return None; }
    let (table, stream) = encoded.split_at(256);

    let mut count_per_length = [0_u64; 64];
    for &length in table {
        if length > MAX_CODE_LENGTH { return None; }
        if length > 0 { count_per_length[length as usize] += 1; }
    }

    let first = first_codes(&count_per_length);

    // symbols ordered by (length, symbol), plus the index of
    // each length class within that ordering
    let mut sorted_symbols = Vec::with_capacity(256);
    let mut class_start = [0_usize; 64];
    for length in 1 .. 64_u8 {
        class_start[length as usize] = sorted_symbols.len();
        for (symbol, &symbol_length) in table.iter().enumerate() {
            if symbol_length == length { sorted_symbols.push(symbol as u8); }
        }
    }

    let mut out = Vec::with_capacity(count);
    let mut code = 0_u64;
    let mut length = 0_usize;

    for &byte in stream {
        for bit_position in (0 .. 8).rev() {
            code = (code << 1) | ((byte >> bit_position) & 1) as u64;
            length += 1;

            if length >= 64 { return None; }

            if count_per_length[length] > 0 && code >= first[length] {
                let class_index = code - first[length];

                if class_index < count_per_length[length] {
                    let sorted_index = class_start[length] + class_index as usize;
                    out.push(*sorted_symbols.get(sorted_index)?);

                    if out.len() == count { return Some(out); }
                    code = 0;
                    length = 0;
                }
            }
        }
    }

    None
}


#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn byte_stream_round_trips(){
        let bytes: Vec<u8> = (0 .. 4000_u32)
            .map(|index| match index % 16 {
                0 ..= 9 => 0,
                10 ..= 13 => 1,
                14 => 7,
                _ => (index % 251) as u8,
            })
            .collect();

        let encoded = encode_bytes(&bytes).unwrap();
        assert_eq!(decode_bytes(&encoded, bytes.len()).unwrap(), bytes);
    }

    #[test]
    fn single_symbol_stream_round_trips(){
        let bytes = vec![9_u8; 1000];
        let encoded = encode_bytes(&bytes).unwrap();

        // one bit per symbol plus the table
        assert_eq!(encoded.len(), 256 + 125);
        assert_eq!(decode_bytes(&encoded, bytes.len()).unwrap(), bytes);
    }

    #[test]
    fn constant_tile_beats_standard_size(){
        let values = vec![42_i32; 60 * 60];
        let packing = CodecHuffman.encode_integers(0, 60, 60, &values).unwrap();

        assert!(packing.len() < values.len() * 4);
        assert_eq!(CodecHuffman.decode_integers(60, 60, &packing).unwrap(), values);
    }

    #[test]
    fn quantized_gradient_round_trips(){
        let values: Vec<i32> = (0 .. 90 * 120)
            .map(|index| 1200 + 5 * ((index % 120) / 3) - 4 * (index / 360))
            .collect();

        let packing = CodecHuffman.encode_integers(0, 90, 120, &values).unwrap();
        assert_eq!(CodecHuffman.decode_integers(90, 120, &packing).unwrap(), values);
    }

    #[test]
    fn truncated_stream_is_rejected(){
        let values = vec![3_i32; 400];
        let packing = CodecHuffman.encode_integers(0, 20, 20, &values).unwrap();

        assert!(CodecHuffman.decode_integers(20, 20, &packing[.. packing.len() - 20]).is_err());
        assert!(CodecHuffman.decode_integers(20, 20, &[0, 1, 2]).is_err());
    }
}
