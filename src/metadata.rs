
//! Named metadata records: the side channel for everything that is not
//! raster data, such as provenance notes, codec lists, or calibration
//! constants.
//!
//! A metadata object is identified by its name plus a numeric record id, so
//! several records may share a name. Content is an opaque little-endian
//! blob tagged with one of a handful of primitive layouts.

use crate::error::{usize_to_i32, Error, Result, UnitResult};
use crate::io::{read_utf, write_utf, Data, Read, Write};
use crate::spec::validate_identifier;


/// The layout of a metadata record's content.
#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub enum MetadataType {

    /// Uninterpreted bytes.
    Unspecified,

    /// Array of little-endian i32.
    Integer,

    /// Array of little-endian i16.
    Short,

    /// Array of little-endian u16.
    UnsignedShort,

    /// Array of little-endian f64.
    Double,

    /// A length-prefixed utf-8 string.
    String,

    /// A length-prefixed string restricted to ascii.
    /// Storage-compatible with `String`.
    Ascii,
}

impl MetadataType {
    pub(crate) fn code(self) -> u8 {
        match self {
            MetadataType::Unspecified => 0,
            MetadataType::Integer => 1,
            MetadataType::Short => 2,
            MetadataType::UnsignedShort => 3,
            MetadataType::Double => 4,
            MetadataType::String => 5,
            MetadataType::Ascii => 6,
        }
    }

    pub(crate) fn from_code(code: u8) -> Result<Self> {
        match code {
            0 => Ok(MetadataType::Unspecified),
            1 => Ok(MetadataType::Integer),
            2 => Ok(MetadataType::Short),
            3 => Ok(MetadataType::UnsignedShort),
            4 => Ok(MetadataType::Double),
            5 => Ok(MetadataType::String),
            6 => Ok(MetadataType::Ascii),
            other => Err(Error::invalid_spec(format!("unknown metadata type code {}", other))),
        }
    }
}


/// One named, typed metadata record.
#[derive(Debug, Clone, PartialEq)]
pub struct GvrsMetadata {

    /// Identifier-syntax name, at most 32 characters.
    pub name: String,

    /// Distinguishes records sharing a name. Assigned sequentially
    /// on write unless declared unique by the application.
    pub record_id: i32,

    /// Whether `record_id` was declared by the application. A unique
    /// record replaces any stored record under the same name and id;
    /// a non-unique record is stored under the next free id.
    pub unique_record_id: bool,

    /// Layout of `content`.
    pub data_type: MetadataType,

    /// Free-form description.
    pub description: Option<String>,

    content: Vec<u8>,
}

impl GvrsMetadata {

    /// An empty record of the given type.
    pub fn new(name: impl Into<String>, data_type: MetadataType) -> Result<Self> {
        let name = name.into();
        validate_identifier(&name)?;

        Ok(GvrsMetadata {
            name,
            record_id: 0,
            unique_record_id: false,
            data_type,
            description: None,
            content: Vec::new(),
        })
    }

    /// A utf-8 string record.
    pub fn new_string(name: impl Into<String>, text: &str) -> Result<Self> {
        let mut metadata = Self::new(name, MetadataType::String)?;
        write_utf(&mut metadata.content, text)?;
        Ok(metadata)
    }

    /// An ascii string record. Non-ascii characters are rejected.
    pub fn new_ascii(name: impl Into<String>, text: &str) -> Result<Self> {
        if !text.is_ascii() {
            return Err(Error::invalid_spec("non-ascii characters in ascii metadata"));
        }

        let mut metadata = Self::new(name, MetadataType::Ascii)?;
        write_utf(&mut metadata.content, text)?;
        Ok(metadata)
    }

    /// An f64 array record.
    pub fn new_doubles(name: impl Into<String>, values: &[f64]) -> Result<Self> {
        let mut metadata = Self::new(name, MetadataType::Double)?;
        f64::write_slice(&mut metadata.content, values)?;
        Ok(metadata)
    }

    /// An i32 array record.
    pub fn new_integers(name: impl Into<String>, values: &[i32]) -> Result<Self> {
        let mut metadata = Self::new(name, MetadataType::Integer)?;
        i32::write_slice(&mut metadata.content, values)?;
        Ok(metadata)
    }

    /// An i16 array record.
    pub fn new_shorts(name: impl Into<String>, values: &[i16]) -> Result<Self> {
        let mut metadata = Self::new(name, MetadataType::Short)?;
        i16::write_slice(&mut metadata.content, values)?;
        Ok(metadata)
    }

    /// A u16 array record.
    pub fn new_unsigned_shorts(name: impl Into<String>, values: &[u16]) -> Result<Self> {
        let mut metadata = Self::new(name, MetadataType::UnsignedShort)?;
        u16::write_slice(&mut metadata.content, values)?;
        Ok(metadata)
    }

    /// Declare an application-managed record id.
    pub fn with_record_id(mut self, record_id: i32) -> Self {
        self.record_id = record_id;
        self.unique_record_id = true;
        self
    }

    /// Attach a description.
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    /// The raw content bytes.
    pub fn content(&self) -> &[u8] {
        &self.content
    }

    /// The content interpreted as a string, for `String` and `Ascii` records.
    pub fn as_string(&self) -> Result<String> {
        match self.data_type {
            MetadataType::String | MetadataType::Ascii => read_utf(&mut self.content.as_slice()),
            _ => Err(Error::invalid_spec("metadata content is not a string")),
        }
    }

    /// The content interpreted as an f64 array.
    pub fn as_doubles(&self) -> Result<Vec<f64>> {
        if self.data_type != MetadataType::Double || self.content.len() % 8 != 0 {
            return Err(Error::invalid_spec("metadata content is not a double array"));
        }

        f64::read_vec(&mut self.content.as_slice(), self.content.len() / 8)
    }

    /// The content interpreted as an i32 array.
    pub fn as_integers(&self) -> Result<Vec<i32>> {
        if self.data_type != MetadataType::Integer || self.content.len() % 4 != 0 {
            return Err(Error::invalid_spec("metadata content is not an integer array"));
        }

        i32::read_vec(&mut self.content.as_slice(), self.content.len() / 4)
    }

    /// The content interpreted as an i16 array.
    pub fn as_shorts(&self) -> Result<Vec<i16>> {
        if self.data_type != MetadataType::Short || self.content.len() % 2 != 0 {
            return Err(Error::invalid_spec("metadata content is not a short array"));
        }

        i16::read_vec(&mut self.content.as_slice(), self.content.len() / 2)
    }

    /// The content interpreted as a u16 array.
    pub fn as_unsigned_shorts(&self) -> Result<Vec<u16>> {
        if self.data_type != MetadataType::UnsignedShort || self.content.len() % 2 != 0 {
            return Err(Error::invalid_spec("metadata content is not an unsigned short array"));
        }

        u16::read_vec(&mut self.content.as_slice(), self.content.len() / 2)
    }

    /// The `(name, record id)` ordering key.
    pub fn key(&self) -> (String, i32) {
        (self.name.clone(), self.record_id)
    }

    /// Serialized size of this record's payload.
    pub fn payload_size(&self) -> usize {
        let mut size = 2 + self.name.len() + 4 + 4;

        if !self.content.is_empty() {
            size += 4 + self.content.len();
        }

        if let Some(description) = &self.description {
            size += 2 + description.len();
        }

        size
    }

    /// Serialize the record payload.
    pub fn write(&self, write: &mut impl Write) -> UnitResult {
        write_utf(write, &self.name)?;
        self.record_id.write(write)?;
        self.data_type.code().write(write)?;
        ((!self.content.is_empty()) as u8).write(write)?;
        (self.description.is_some() as u8).write(write)?;
        0_u8.write(write)?;

        if !self.content.is_empty() {
            usize_to_i32(self.content.len()).write(write)?;
            u8::write_slice(write, &self.content)?;
        }

        if let Some(description) = &self.description {
            write_utf(write, description)?;
        }

        Ok(())
    }

    /// Deserialize a record payload.
    pub fn read(read: &mut impl Read) -> Result<Self> {
        let name = read_utf(read)?;
        validate_identifier(&name)?;

        let record_id = i32::read(read)?;
        let data_type = MetadataType::from_code(u8::read(read)?)?;
        let has_content = u8::read(read)? != 0;
        let has_description = u8::read(read)? != 0;
        u8::read(read)?;

        let content = if has_content {
            let length = i32::read(read)?;
            if length < 0 {
                return Err(Error::invalid_spec("negative metadata content length"));
            }

            u8::read_vec(read, length as usize)?
        } else { Vec::new() };

        let description = if has_description { Some(read_utf(read)?) } else { None };

        Ok(GvrsMetadata {
            name,
            record_id,
            unique_record_id: true,
            data_type,
            description,
            content,
        })
    }
}


#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn string_record_round_trips(){
        let metadata = GvrsMetadata::new_string("Author", "somebody with a keyboard").unwrap()
            .with_description("who made this");

        let mut bytes = Vec::new();
        metadata.write(&mut bytes).unwrap();
        assert_eq!(bytes.len(), metadata.payload_size());

        let decoded = GvrsMetadata::read(&mut bytes.as_slice()).unwrap();
        assert_eq!(decoded.name, "Author");
        assert_eq!(decoded.as_string().unwrap(), "somebody with a keyboard");
        assert_eq!(decoded.description.as_deref(), Some("who made this"));
    }

    #[test]
    fn typed_arrays_round_trip(){
        let doubles = GvrsMetadata::new_doubles("calibration", &[0.5, -1.25, 3e9]).unwrap();
        assert_eq!(doubles.as_doubles().unwrap(), vec![0.5, -1.25, 3e9]);

        let integers = GvrsMetadata::new_integers("spans", &[1, -2, 3]).unwrap();
        assert_eq!(integers.as_integers().unwrap(), vec![1, -2, 3]);

        let shorts = GvrsMetadata::new_shorts("codes", &[7, -7]).unwrap();
        assert_eq!(shorts.as_shorts().unwrap(), vec![7, -7]);

        let unsigned = GvrsMetadata::new_unsigned_shorts("flags", &[0xffff, 1]).unwrap();
        assert_eq!(unsigned.as_unsigned_shorts().unwrap(), vec![0xffff, 1]);

        // mismatched accessor
        assert!(doubles.as_integers().is_err());
    }

    #[test]
    fn ascii_rejects_non_ascii(){
        assert!(GvrsMetadata::new_ascii("note", "plain text").is_ok());
        assert!(GvrsMetadata::new_ascii("note", "s\u{00fc}dsee").is_err());
    }

    #[test]
    fn name_rules(){
        assert!(GvrsMetadata::new("Author", MetadataType::Unspecified).is_ok());
        assert!(GvrsMetadata::new("x9_y", MetadataType::Unspecified).is_ok());

        assert!(matches!(
            GvrsMetadata::new("_tail", MetadataType::Unspecified),
            Err(Error::InvalidMetadataName(_)),
        ));
        assert!(GvrsMetadata::new("", MetadataType::Unspecified).is_err());
        assert!(GvrsMetadata::new("dotted.name", MetadataType::Unspecified).is_err());
    }

    #[test]
    fn empty_content_is_marked_absent(){
        let metadata = GvrsMetadata::new("empty", MetadataType::Unspecified).unwrap();

        let mut bytes = Vec::new();
        metadata.write(&mut bytes).unwrap();

        let decoded = GvrsMetadata::read(&mut bytes.as_slice()).unwrap();
        assert!(decoded.content().is_empty());
        assert!(decoded.description.is_none());
    }
}
