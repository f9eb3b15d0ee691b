
//! The per-element sample buffer of one tile.
//!
//! Each variant owns a typed array of `n_rows * n_cols` cells together with
//! the range and fill parameters of its element. All variants serialize to a
//! 4-byte-aligned standard form and can alternatively pass through a codec.

use crate::codec::CodecMaster;
use crate::error::{Error, Result, UnitResult};
use crate::io::{Data, Read, Write};
use crate::spec::element::{ElementType, IntCodedFloatRange};


/// The sample buffer of one element within one tile.
#[derive(Debug, Clone)]
pub enum TileElement {

    /// 16-bit integer samples.
    Short {
        /// Smallest acceptable value.
        min_value: i16,
        /// Largest acceptable value.
        max_value: i16,
        /// Value of unpopulated cells; reads as NaN through the float accessor.
        fill_value: i16,
        /// Cell values in row-major order.
        values: Vec<i16>,
    },

    /// 32-bit integer samples.
    Int {
        /// Smallest acceptable value.
        min_value: i32,
        /// Largest acceptable value.
        max_value: i32,
        /// Value of unpopulated cells.
        fill_value: i32,
        /// Cell values in row-major order.
        values: Vec<i32>,
    },

    /// 32-bit floating-point samples.
    Float {
        /// Smallest acceptable value.
        min_value: f32,
        /// Largest acceptable value.
        max_value: f32,
        /// Value of unpopulated cells, possibly NaN.
        fill_value: f32,
        /// Cell values in row-major order.
        values: Vec<f32>,
    },

    /// Floating-point samples stored in integer-coded form.
    IntCodedFloat {
        /// The scale/offset mapping and both range triples.
        range: IntCodedFloatRange,
        /// Coded cell values in row-major order.
        values: Vec<i32>,
    },
}

/// Compares floating-point samples by bit pattern, so that fill cells
/// holding NaN compare equal across a serialization round trip.
impl PartialEq for TileElement {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (
                TileElement::Short { min_value, max_value, fill_value, values },
                TileElement::Short { min_value: min, max_value: max, fill_value: fill, values: samples },
            ) => min_value == min && max_value == max && fill_value == fill && values == samples,

            (
                TileElement::Int { min_value, max_value, fill_value, values },
                TileElement::Int { min_value: min, max_value: max, fill_value: fill, values: samples },
            ) => min_value == min && max_value == max && fill_value == fill && values == samples,

            (
                TileElement::Float { min_value, max_value, fill_value, values },
                TileElement::Float { min_value: min, max_value: max, fill_value: fill, values: samples },
            ) => min_value.to_bits() == min.to_bits()
                && max_value.to_bits() == max.to_bits()
                && fill_value.to_bits() == fill.to_bits()
                && values.len() == samples.len()
                && values.iter().zip(samples)
                    .all(|(value, sample)| value.to_bits() == sample.to_bits()),

            (
                TileElement::IntCodedFloat { range, values },
                TileElement::IntCodedFloat { range: other_range, values: samples },
            ) => range == other_range && values == samples,

            _ => false,
        }
    }
}

impl TileElement {

    /// A buffer of `n_cells` fill values for the given element type.
    pub fn new(element_type: &ElementType, n_cells: usize) -> Self {
        match element_type {
            ElementType::Short { min_value, max_value, fill_value } => TileElement::Short {
                min_value: *min_value, max_value: *max_value, fill_value: *fill_value,
                values: vec![*fill_value; n_cells],
            },

            ElementType::Int { min_value, max_value, fill_value } => TileElement::Int {
                min_value: *min_value, max_value: *max_value, fill_value: *fill_value,
                values: vec![*fill_value; n_cells],
            },

            ElementType::Float { min_value, max_value, fill_value } => TileElement::Float {
                min_value: *min_value, max_value: *max_value, fill_value: *fill_value,
                values: vec![*fill_value; n_cells],
            },

            ElementType::IntCodedFloat(range) => TileElement::IntCodedFloat {
                range: *range,
                values: vec![range.fill_value_i; n_cells],
            },
        }
    }

    /// Number of cells in this buffer.
    pub fn len(&self) -> usize {
        match self {
            TileElement::Short { values, .. } => values.len(),
            TileElement::Int { values, .. } => values.len(),
            TileElement::Float { values, .. } => values.len(),
            TileElement::IntCodedFloat { values, .. } => values.len(),
        }
    }

    /// Whether this buffer holds zero cells.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Size of the standard serialized form. Always a multiple of four bytes,
    /// so 16-bit buffers with an odd cell count carry two padding bytes.
    pub fn standard_size_in_bytes(&self) -> usize {
        let bytes_per_sample = match self {
            TileElement::Short { .. } => 2,
            _ => 4,
        };

        (self.len() * bytes_per_sample + 3) / 4 * 4
    }

    /// Reset every cell to the fill value.
    pub fn set_to_null_state(&mut self) {
        match self {
            TileElement::Short { values, fill_value, .. } =>
                values.iter_mut().for_each(|value| *value = *fill_value),

            TileElement::Int { values, fill_value, .. } =>
                values.iter_mut().for_each(|value| *value = *fill_value),

            TileElement::Float { values, fill_value, .. } =>
                values.iter_mut().for_each(|value| *value = *fill_value),

            TileElement::IntCodedFloat { values, range } =>
                values.iter_mut().for_each(|value| *value = range.fill_value_i),
        }
    }

    /// Whether at least one cell holds the fill value.
    pub fn has_fill_data_values(&self) -> bool {
        match self {
            TileElement::Short { values, fill_value, .. } =>
                values.iter().any(|value| value == fill_value),

            TileElement::Int { values, fill_value, .. } =>
                values.iter().any(|value| value == fill_value),

            TileElement::Float { values, fill_value, .. } =>
                if fill_value.is_nan() { values.iter().any(|value| value.is_nan()) }
                else { values.iter().any(|value| value == fill_value) },

            TileElement::IntCodedFloat { values, range } =>
                values.iter().any(|value| *value == range.fill_value_i),
        }
    }

    /// Whether at least one cell holds something other than the fill value.
    pub fn has_valid_data(&self) -> bool {
        match self {
            TileElement::Short { values, fill_value, .. } =>
                values.iter().any(|value| value != fill_value),

            TileElement::Int { values, fill_value, .. } =>
                values.iter().any(|value| value != fill_value),

            TileElement::Float { values, fill_value, .. } =>
                if fill_value.is_nan() { values.iter().any(|value| !value.is_nan()) }
                else { values.iter().any(|value| value != fill_value) },

            TileElement::IntCodedFloat { values, range } =>
                values.iter().any(|value| *value != range.fill_value_i),
        }
    }

    /// Store an integer, validating it against the declared range.
    /// The fill value is always accepted.
    pub fn set_int_value(&mut self, cell: usize, value: i32) -> UnitResult {
        match self {
            TileElement::Short { values, min_value, max_value, fill_value } => {
                let narrowed = value as i16;

                if i32::from(narrowed) != value
                    || (narrowed != *fill_value && (narrowed < *min_value || narrowed > *max_value))
                {
                    return Err(Error::out_of_range(format!("{} is not a valid short sample", value)));
                }

                values[cell] = narrowed;
            },

            TileElement::Int { values, min_value, max_value, fill_value } => {
                if value != *fill_value && (value < *min_value || value > *max_value) {
                    return Err(Error::out_of_range(format!("{} is not a valid int sample", value)));
                }

                values[cell] = value;
            },

            TileElement::Float { values, min_value, max_value, fill_value } => {
                let widened = value as f32;

                if (widened < *min_value || widened > *max_value) && widened != *fill_value {
                    return Err(Error::out_of_range(format!("{} is not a valid float sample", value)));
                }

                values[cell] = widened;
            },

            TileElement::IntCodedFloat { values, range } => {
                if value != range.fill_value_i
                    && (value < range.min_value_i || value > range.max_value_i)
                {
                    return Err(Error::out_of_range(format!("{} is not a valid coded sample", value)));
                }

                values[cell] = value;
            },
        }

        Ok(())
    }

    /// Store a floating-point value, validating it against the declared range.
    /// NaN is accepted exactly where the element's fill reads as NaN.
    pub fn set_value(&mut self, cell: usize, value: f32) -> UnitResult {
        match self {
            TileElement::Short { values, min_value, max_value, fill_value } => {
                if value.is_nan() {
                    values[cell] = *fill_value;
                    return Ok(());
                }

                let coded = (value + 0.5).floor() as i32;
                let narrowed = coded as i16;

                if i32::from(narrowed) != coded || narrowed < *min_value || narrowed > *max_value {
                    return Err(Error::out_of_range(format!("{} is not a valid short sample", value)));
                }

                values[cell] = narrowed;
            },

            TileElement::Int { values, min_value, max_value, .. } => {
                if value.is_nan() {
                    return Err(Error::out_of_range("NaN written to an int element without NaN fill"));
                }

                let coded = (value + 0.5).floor() as i32;
                if coded < *min_value || coded > *max_value {
                    return Err(Error::out_of_range(format!("{} is not a valid int sample", value)));
                }

                values[cell] = coded;
            },

            TileElement::Float { values, min_value, max_value, fill_value } => {
                if value.is_nan() {
                    if !fill_value.is_nan() {
                        return Err(Error::out_of_range("NaN written to an element without NaN fill"));
                    }

                    values[cell] = f32::NAN;
                    return Ok(());
                }

                if (value < *min_value || value > *max_value) && value != *fill_value {
                    return Err(Error::out_of_range(format!("{} is not a valid float sample", value)));
                }

                values[cell] = value;
            },

            TileElement::IntCodedFloat { values, range } => {
                if value.is_nan() {
                    if !range.fill_value.is_nan() {
                        return Err(Error::out_of_range("NaN written to an element without NaN fill"));
                    }

                    values[cell] = range.fill_value_i;
                    return Ok(());
                }

                if value < range.min_value || value > range.max_value {
                    return Err(Error::out_of_range(format!("{} is not a valid coded sample", value)));
                }

                values[cell] = range.map_value_to_int(value);
            },
        }

        Ok(())
    }

    /// Read a cell as an integer.
    pub fn int_value(&self, cell: usize) -> i32 {
        match self {
            TileElement::Short { values, .. } => i32::from(values[cell]),
            TileElement::Int { values, .. } => values[cell],

            TileElement::Float { values, .. } => {
                let value = values[cell];
                if value.is_nan() { i32::MIN } else { (value + 0.5).floor() as i32 }
            },

            TileElement::IntCodedFloat { values, .. } => values[cell],
        }
    }

    /// Read a cell as a floating-point value. The fill value of
    /// integer elements without a floating-point form reads as NaN.
    pub fn value(&self, cell: usize) -> f32 {
        match self {
            TileElement::Short { values, fill_value, .. } => {
                let value = values[cell];
                if value == *fill_value { f32::NAN } else { f32::from(value) }
            },

            TileElement::Int { values, .. } => values[cell] as f32,
            TileElement::Float { values, .. } => values[cell],
            TileElement::IntCodedFloat { values, range } => range.map_int_to_value(values[cell]),
        }
    }

    /// The fill value as reported by the floating-point accessor.
    pub fn fill_value_as_float(&self) -> f32 {
        match self {
            TileElement::Short { .. } => f32::NAN,
            TileElement::Int { fill_value, .. } => *fill_value as f32,
            TileElement::Float { fill_value, .. } => *fill_value,
            TileElement::IntCodedFloat { range, .. } => range.fill_value,
        }
    }

    /// The fill value as reported by the integer accessor.
    pub fn fill_value_as_int(&self) -> i32 {
        match self {
            TileElement::Short { fill_value, .. } => i32::from(*fill_value),
            TileElement::Int { fill_value, .. } => *fill_value,
            TileElement::Float { fill_value, .. } =>
                if fill_value.is_nan() { i32::MIN } else { (*fill_value + 0.5).floor() as i32 },
            TileElement::IntCodedFloat { range, .. } => range.fill_value_i,
        }
    }

    /// Serialize in the fixed-size standard form.
    pub fn write_standard_format(&self, write: &mut impl Write) -> UnitResult {
        match self {
            TileElement::Short { values, .. } => {
                i16::write_slice(write, values)?;
                if values.len() % 2 != 0 { 0_i16.write(write)?; }
                Ok(())
            },

            TileElement::Int { values, .. } => i32::write_slice(write, values),
            TileElement::Float { values, .. } => f32::write_slice(write, values),
            TileElement::IntCodedFloat { values, .. } => i32::write_slice(write, values),
        }
    }

    /// Deserialize the fixed-size standard form, consuming any padding.
    pub fn read_standard_format(&mut self, read: &mut impl Read) -> UnitResult {
        match self {
            TileElement::Short { values, .. } => {
                i16::read_slice(read, values)?;
                if values.len() % 2 != 0 { i16::read(read)?; }
                Ok(())
            },

            TileElement::Int { values, .. } => i32::read_slice(read, values),
            TileElement::Float { values, .. } => f32::read_slice(read, values),
            TileElement::IntCodedFloat { values, .. } => i32::read_slice(read, values),
        }
    }

    /// Produce the smaller of the compressed and standard serialized forms.
    pub fn encode(&self, codec: &CodecMaster, n_rows: usize, n_cols: usize) -> Result<Vec<u8>> {
        let standard_size = self.standard_size_in_bytes();

        let compressed = match self {
            TileElement::Short { values, .. } => {
                let widened: Vec<i32> = values.iter().map(|value| i32::from(*value)).collect();
                codec.encode_integers(n_rows, n_cols, &widened)
            },

            TileElement::Int { values, .. } => codec.encode_integers(n_rows, n_cols, values),
            TileElement::Float { values, .. } => codec.encode_floats(n_rows, n_cols, values),
            TileElement::IntCodedFloat { values, .. } => codec.encode_integers(n_rows, n_cols, values),
        };

        match compressed {
            Some(packing) if packing.len() < standard_size => Ok(packing),

            _ => {
                let mut standard = Vec::with_capacity(standard_size);
                self.write_standard_format(&mut standard)?;
                Ok(standard)
            },
        }
    }

    /// Deserialize from either form: a payload of exactly the standard size
    /// is the standard form, anything else is a compressed packing.
    pub fn decode(&mut self, codec: &CodecMaster, n_rows: usize, n_cols: usize, bytes: &[u8])
        -> UnitResult
    {
        if bytes.len() == self.standard_size_in_bytes() {
            return self.read_standard_format(&mut &bytes[..]);
        }

        match self {
            TileElement::Short { values, .. } => {
                let decoded = codec.decode_integers(n_rows, n_cols, bytes)?;
                if decoded.len() != values.len() {
                    return Err(Error::InvalidCompressionCode(bytes.first().copied().unwrap_or(0)));
                }

                for (target, source) in values.iter_mut().zip(&decoded) {
                    *target = *source as i16;
                }
                Ok(())
            },

            TileElement::Int { values, .. } | TileElement::IntCodedFloat { values, .. } => {
                let decoded = codec.decode_integers(n_rows, n_cols, bytes)?;
                if decoded.len() != values.len() {
                    return Err(Error::InvalidCompressionCode(bytes.first().copied().unwrap_or(0)));
                }

                values.copy_from_slice(&decoded);
                Ok(())
            },

            TileElement::Float { values, .. } => {
                let decoded = codec.decode_floats(n_rows, n_cols, bytes)?;
                if decoded.len() != values.len() {
                    return Err(Error::InvalidCompressionCode(bytes.first().copied().unwrap_or(0)));
                }

                values.copy_from_slice(&decoded);
                Ok(())
            },
        }
    }
}


#[cfg(test)]
mod test {
    use super::*;

    fn short_element(n_cells: usize) -> TileElement {
        TileElement::new(&ElementType::Short {
            min_value: -11000, max_value: 9000, fill_value: i16::MIN,
        }, n_cells)
    }

    #[test]
    fn new_buffers_hold_only_fill(){
        let element = short_element(12);
        assert!(!element.has_valid_data());
        assert!(element.has_fill_data_values());
        assert!(element.value(0).is_nan());
    }

    #[test]
    fn range_validation(){
        let mut element = short_element(4);

        assert!(element.set_int_value(0, 8999).is_ok());
        assert!(element.set_int_value(0, 9001).is_err());
        assert!(element.set_int_value(0, -11001).is_err());
        assert!(element.set_int_value(0, 100_000).is_err());

        // the fill value itself is always accepted
        assert!(element.set_int_value(0, i32::from(i16::MIN)).is_ok());
    }

    #[test]
    fn nan_stores_the_fill_code(){
        let mut element = short_element(4);
        element.set_value(2, f32::NAN).unwrap();

        assert!(element.value(2).is_nan());
        assert_eq!(element.int_value(2), i32::from(i16::MIN));

        let mut int_element = TileElement::new(&ElementType::Int {
            min_value: 0, max_value: 10, fill_value: -1,
        }, 4);
        assert!(int_element.set_value(0, f32::NAN).is_err());
    }

    #[test]
    fn odd_short_count_pads_to_four_bytes(){
        let element = short_element(5);
        assert_eq!(element.standard_size_in_bytes(), 12);

        let mut bytes = Vec::new();
        element.write_standard_format(&mut bytes).unwrap();
        assert_eq!(bytes.len(), 12);

        let mut decoded = short_element(5);
        decoded.read_standard_format(&mut bytes.as_slice()).unwrap();
        assert_eq!(decoded, element);
    }

    #[test]
    fn int_coded_float_stores_coded_form(){
        let range = IntCodedFloatRange::new(0.0, 100.0, 10.0, 0.0).unwrap();
        let mut element = TileElement::new(&ElementType::IntCodedFloat(range), 4);

        element.set_value(0, 25.13).unwrap();
        assert_eq!(element.int_value(0), 251);
        assert!((element.value(0) - 25.1).abs() < 1e-6);

        assert!(element.set_value(1, 100.2).is_err());
    }

    #[test]
    fn encode_falls_back_to_standard_form_for_noise(){
        use crate::codec::{CodecMaster, CodecRegistry};
        use crate::spec::STANDARD_CODEC_IDENTIFICATIONS;

        let codec = CodecMaster::new(
            &STANDARD_CODEC_IDENTIFICATIONS.map(String::from),
            &CodecRegistry::standard(),
        );

        let mut element = TileElement::new(&ElementType::Int {
            min_value: i32::MIN + 1, max_value: i32::MAX, fill_value: i32::MIN,
        }, 16);

        let mut state = 0x9e37_79b9_u32;
        for cell in 0 .. 16 {
            state = state.wrapping_mul(747_796_405).wrapping_add(2_891_336_453);
            element.set_int_value(cell, (state >> 1) as i32).unwrap();
        }

        let encoded = element.encode(&codec, 4, 4).unwrap();
        assert_eq!(encoded.len(), element.standard_size_in_bytes());

        let mut decoded = TileElement::new(&ElementType::Int {
            min_value: i32::MIN + 1, max_value: i32::MAX, fill_value: i32::MIN,
        }, 16);
        decoded.decode(&codec, 4, 4, &encoded).unwrap();
        assert_eq!(decoded, element);
    }

    #[test]
    fn encode_compresses_constant_data(){
        use crate::codec::{CodecMaster, CodecRegistry};
        use crate::spec::STANDARD_CODEC_IDENTIFICATIONS;

        let codec = CodecMaster::new(
            &STANDARD_CODEC_IDENTIFICATIONS.map(String::from),
            &CodecRegistry::standard(),
        );

        let mut element = short_element(3600);
        for cell in 0 .. 3600 {
            element.set_int_value(cell, 42).unwrap();
        }

        let encoded = element.encode(&codec, 60, 60).unwrap();
        assert!(encoded.len() < element.standard_size_in_bytes());

        let mut decoded = short_element(3600);
        decoded.decode(&codec, 60, 60, &encoded).unwrap();
        assert_eq!(decoded, element);
    }
}
