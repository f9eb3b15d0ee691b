
//! Describes the elements stored in each raster cell.
//!
//! Every cell of a gvrs raster holds a fixed-order tuple of elements. Each
//! element declares a data type, a valid value range, and the fill value that
//! unpopulated cells report.

use crate::error::{Error, Result, UnitResult};
use crate::io::{read_utf, write_utf, Data, Read, Write};
use crate::spec::validate_identifier;


/// Longest permitted element or metadata name.
pub const MAX_NAME_LENGTH: usize = 32;

/// Serialized type codes, in the order the data-type table defines them.
const CODE_SHORT: u8 = 0;
const CODE_INT: u8 = 1;
const CODE_FLOAT: u8 = 2;
const CODE_INT_CODED_FLOAT: u8 = 3;


/// The data type of one element together with its range triple.
#[derive(Debug, Clone)]
pub enum ElementType {

    /// 16-bit signed integer storage. The fill value maps to NaN
    /// when cells are read through the floating-point accessors.
    Short {
        /// Smallest value a cell may hold.
        min_value: i16,
        /// Largest value a cell may hold.
        max_value: i16,
        /// Value reported by unpopulated cells.
        fill_value: i16,
    },

    /// 32-bit signed integer storage.
    Int {
        /// Smallest value a cell may hold.
        min_value: i32,
        /// Largest value a cell may hold.
        max_value: i32,
        /// Value reported by unpopulated cells.
        fill_value: i32,
    },

    /// 32-bit IEEE-754 storage. NaN is allowed as the fill value.
    Float {
        /// Smallest value a cell may hold.
        min_value: f32,
        /// Largest value a cell may hold.
        max_value: f32,
        /// Value reported by unpopulated cells.
        fill_value: f32,
    },

    /// Floating-point values stored as scaled and offset 32-bit integers.
    IntCodedFloat(IntCodedFloatRange),
}

/// Compares floating-point range fields by bit pattern, so that a NaN
/// fill value equals itself and a round-tripped type equals its source.
impl PartialEq for ElementType {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (
                ElementType::Short { min_value, max_value, fill_value },
                ElementType::Short { min_value: min, max_value: max, fill_value: fill },
            ) => min_value == min && max_value == max && fill_value == fill,

            (
                ElementType::Int { min_value, max_value, fill_value },
                ElementType::Int { min_value: min, max_value: max, fill_value: fill },
            ) => min_value == min && max_value == max && fill_value == fill,

            (
                ElementType::Float { min_value, max_value, fill_value },
                ElementType::Float { min_value: min, max_value: max, fill_value: fill },
            ) => min_value.to_bits() == min.to_bits()
                && max_value.to_bits() == max.to_bits()
                && fill_value.to_bits() == fill.to_bits(),

            (ElementType::IntCodedFloat(range), ElementType::IntCodedFloat(other)) =>
                range == other,

            _ => false,
        }
    }
}

impl ElementType {

    /// Bytes one cell of this type occupies in standard tile form.
    pub fn bytes_per_sample(&self) -> usize {
        match self {
            ElementType::Short { .. } => 2,
            _ => 4,
        }
    }

    fn code(&self) -> u8 {
        match self {
            ElementType::Short { .. } => CODE_SHORT,
            ElementType::Int { .. } => CODE_INT,
            ElementType::Float { .. } => CODE_FLOAT,
            ElementType::IntCodedFloat(_) => CODE_INT_CODED_FLOAT,
        }
    }
}


/// The lossy fixed-point representation used by `ElementType::IntCodedFloat`.
///
/// A value maps to `floor((value - offset) * scale + 0.5)` and back to
/// `integer / scale + offset`, so the round-trip error never exceeds
/// `1 / (2 * scale)`. The fill value may be NaN on the floating-point side;
/// it always has a distinct integer sentinel.
#[derive(Debug, Clone, Copy)]
pub struct IntCodedFloatRange {

    /// Multiplier applied when encoding a value.
    pub scale: f32,

    /// Subtracted from a value before scaling.
    pub offset: f32,

    /// Smallest value a cell may hold.
    pub min_value: f32,

    /// Largest value a cell may hold.
    pub max_value: f32,

    /// Value reported by unpopulated cells, possibly NaN.
    pub fill_value: f32,

    /// Integer form of `min_value`.
    pub min_value_i: i32,

    /// Integer form of `max_value`.
    pub max_value_i: i32,

    /// Integer sentinel for the fill value.
    pub fill_value_i: i32,
}

/// Compares the floating-point fields by bit pattern; see [`ElementType`].
impl PartialEq for IntCodedFloatRange {
    fn eq(&self, other: &Self) -> bool {
        self.scale.to_bits() == other.scale.to_bits()
            && self.offset.to_bits() == other.offset.to_bits()
            && self.min_value.to_bits() == other.min_value.to_bits()
            && self.max_value.to_bits() == other.max_value.to_bits()
            && self.fill_value.to_bits() == other.fill_value.to_bits()
            && self.min_value_i == other.min_value_i
            && self.max_value_i == other.max_value_i
            && self.fill_value_i == other.fill_value_i
    }
}

impl IntCodedFloatRange {

    /// Define a range with a NaN fill value, encoded as `i32::MIN`.
    pub fn new(min_value: f32, max_value: f32, scale: f32, offset: f32) -> Result<Self> {
        Self::with_fill(min_value, max_value, f32::NAN, scale, offset)
    }

    /// Define a range with an explicit fill value. A NaN fill is encoded
    /// as `i32::MIN`; any other fill must be encodable without overflow.
    pub fn with_fill(min_value: f32, max_value: f32, fill_value: f32, scale: f32, offset: f32)
        -> Result<Self>
    {
        if !scale.is_finite() || scale <= 0.0 {
            return Err(Error::invalid_spec("int-coded-float scale must be finite and positive"));
        }

        if !offset.is_finite() {
            return Err(Error::invalid_spec("int-coded-float offset must be finite"));
        }

        if !(min_value.is_finite() && max_value.is_finite()) || min_value > max_value {
            return Err(Error::invalid_spec("int-coded-float range is not a finite interval"));
        }

        let mut range = IntCodedFloatRange {
            scale, offset,
            min_value, max_value, fill_value,
            min_value_i: 0, max_value_i: 0,
            fill_value_i: i32::MIN,
        };

        range.min_value_i = range.map_value_to_int(min_value);
        range.max_value_i = range.map_value_to_int(max_value);
        range.fill_value_i = range.map_value_to_int(fill_value);

        if !fill_value.is_nan()
            && range.fill_value_i >= range.min_value_i
            && range.fill_value_i <= range.max_value_i
        {
            return Err(Error::invalid_spec("int-coded-float fill value lies inside the value range"));
        }

        Ok(range)
    }

    /// Encode a value as its scaled integer form. NaN maps to the fill
    /// sentinel. The arithmetic runs in f64 so that the quantization
    /// error stays within half a step even for large magnitudes.
    pub fn map_value_to_int(&self, value: f32) -> i32 {
        if value.is_nan() { return i32::MIN; }
        ((f64::from(value) - f64::from(self.offset)) * f64::from(self.scale) + 0.5).floor() as i32
    }

    /// Decode a scaled integer back to its value. The fill sentinel maps
    /// to the declared fill value, which may be NaN.
    pub fn map_int_to_value(&self, integer: i32) -> f32 {
        if integer == self.fill_value_i { return self.fill_value; }
        (f64::from(integer) / f64::from(self.scale) + f64::from(self.offset)) as f32
    }
}


/// Describes one element of the cell tuple.
#[derive(Debug, Clone, PartialEq)]
pub struct ElementSpecification {

    /// Stable identifier, at most 32 characters.
    pub name: String,

    /// Free-form description of the element.
    pub description: Option<String>,

    /// Human readable label, for presentation rather than lookup.
    pub label: Option<String>,

    /// Unit of measure, such as `m` or `ft`.
    pub unit_of_measure: Option<String>,

    /// Whether the values form a continuous surface (true) or
    /// categorical classes (false).
    pub continuous: bool,

    /// Data type and range.
    pub element_type: ElementType,
}

impl ElementSpecification {

    /// Define an element after validating the name syntax.
    pub fn new(name: impl Into<String>, element_type: ElementType) -> Result<Self> {
        let name = name.into();
        validate_identifier(&name)?;

        Ok(ElementSpecification {
            name,
            description: None,
            label: None,
            unit_of_measure: None,
            continuous: true,
            element_type,
        })
    }

    /// Set the free-form description.
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    /// Set the presentation label.
    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.label = Some(label.into());
        self
    }

    /// Set the unit of measure.
    pub fn with_unit_of_measure(mut self, unit: impl Into<String>) -> Self {
        self.unit_of_measure = Some(unit.into());
        self
    }

    /// Mark the element as categorical rather than continuous.
    pub fn categorical(mut self) -> Self {
        self.continuous = false;
        self
    }

    /// Bytes one cell of this element occupies in standard tile form.
    pub fn bytes_per_sample(&self) -> usize {
        self.element_type.bytes_per_sample()
    }

    pub(crate) fn write(&self, write: &mut impl Write) -> UnitResult {
        self.element_type.code().write(write)?;
        (self.description.is_some() as u8).write(write)?;
        (self.unit_of_measure.is_some() as u8).write(write)?;
        (self.label.is_some() as u8).write(write)?;
        (self.continuous as u8).write(write)?;
        u8::write_slice(write, &[0_u8; 7])?;

        write_utf(write, &self.name)?;

        match &self.element_type {
            ElementType::Short { min_value, max_value, fill_value } => {
                min_value.write(write)?;
                max_value.write(write)?;
                fill_value.write(write)?;
            },

            ElementType::Int { min_value, max_value, fill_value } => {
                min_value.write(write)?;
                max_value.write(write)?;
                fill_value.write(write)?;
            },

            ElementType::Float { min_value, max_value, fill_value } => {
                min_value.write(write)?;
                max_value.write(write)?;
                fill_value.write(write)?;
            },

            ElementType::IntCodedFloat(range) => {
                range.scale.write(write)?;
                range.offset.write(write)?;
                range.min_value_i.write(write)?;
                range.max_value_i.write(write)?;
                range.fill_value_i.write(write)?;
                range.min_value.write(write)?;
                range.max_value.write(write)?;
                range.fill_value.write(write)?;
            },
        }

        if let Some(description) = &self.description { write_utf(write, description)?; }
        if let Some(unit) = &self.unit_of_measure { write_utf(write, unit)?; }
        if let Some(label) = &self.label { write_utf(write, label)?; }
        Ok(())
    }

    pub(crate) fn read(read: &mut impl Read) -> Result<Self> {
        let code = u8::read(read)?;
        let has_description = u8::read(read)? != 0;
        let has_unit = u8::read(read)? != 0;
        let has_label = u8::read(read)? != 0;
        let continuous = u8::read(read)? != 0;

        let mut reserved = [0_u8; 7];
        u8::read_slice(read, &mut reserved)?;

        let name = read_utf(read)?;
        validate_identifier(&name)?;

        let element_type = match code {
            CODE_SHORT => ElementType::Short {
                min_value: i16::read(read)?,
                max_value: i16::read(read)?,
                fill_value: i16::read(read)?,
            },

            CODE_INT => ElementType::Int {
                min_value: i32::read(read)?,
                max_value: i32::read(read)?,
                fill_value: i32::read(read)?,
            },

            CODE_FLOAT => ElementType::Float {
                min_value: f32::read(read)?,
                max_value: f32::read(read)?,
                fill_value: f32::read(read)?,
            },

            CODE_INT_CODED_FLOAT => {
                let scale = f32::read(read)?;
                let offset = f32::read(read)?;
                let min_value_i = i32::read(read)?;
                let max_value_i = i32::read(read)?;
                let fill_value_i = i32::read(read)?;
                let min_value = f32::read(read)?;
                let max_value = f32::read(read)?;
                let fill_value = f32::read(read)?;

                ElementType::IntCodedFloat(IntCodedFloatRange {
                    scale, offset,
                    min_value, max_value, fill_value,
                    min_value_i, max_value_i, fill_value_i,
                })
            },

            other => return Err(Error::invalid_spec(format!("unknown element type code {}", other))),
        };

        let description = if has_description { Some(read_utf(read)?) } else { None };
        let unit_of_measure = if has_unit { Some(read_utf(read)?) } else { None };
        let label = if has_label { Some(read_utf(read)?) } else { None };

        Ok(ElementSpecification {
            name, description, label, unit_of_measure, continuous, element_type,
        })
    }
}
