
//! The immutable description of a gvrs raster: grid dimensions, tiling,
//! element schemas, model coordinate system, codec identifications,
//! and feature flags. Fixed once the file is created.

pub mod element;
pub mod transform;

use smallvec::SmallVec;

use crate::error::{i32_to_usize, usize_to_i32, Error, Result, UnitResult};
use crate::io::{read_utf, skip_bytes, write_utf, Data, Read, Write};

use self::element::{ElementSpecification, MAX_NAME_LENGTH};
use self::transform::{CellGeometry, CoordinateSystem, ModelTransform};


/// Identifications of the codecs registered by default,
/// in the order they are assigned indices.
pub const STANDARD_CODEC_IDENTIFICATIONS: [&str; 3] =
    ["GvrsHuffman", "GvrsDeflate", "GvrsFloat"];

/// List of elements. Most files declare only a few.
pub type Elements = SmallVec<[ElementSpecification; 4]>;


/// Check the identifier syntax shared by element and metadata names:
/// an ascii letter followed by letters, digits, or underscores,
/// at most 32 characters.
pub(crate) fn validate_identifier(name: &str) -> UnitResult {
    let mut characters = name.chars();

    let valid = match characters.next() {
        Some(first) => first.is_ascii_alphabetic()
            && characters.all(|c| c.is_ascii_alphanumeric() || c == '_')
            && name.len() <= MAX_NAME_LENGTH,
        None => false,
    };

    if valid { Ok(()) } else { Err(Error::InvalidMetadataName(name.to_string())) }
}


/// Describes a gvrs raster file. Built by the application before creating a
/// file, serialized into the file header, and reconstructed on open.
#[derive(Debug, Clone, PartialEq)]
pub struct GvrsFileSpecification {

    /// Number of cell rows in the raster.
    pub n_rows_in_raster: usize,

    /// Number of cell columns in the raster.
    pub n_cols_in_raster: usize,

    /// Number of cell rows in one tile.
    pub n_rows_in_tile: usize,

    /// Number of cell columns in one tile.
    pub n_cols_in_tile: usize,

    /// Number of tile rows covering the raster.
    pub n_rows_of_tiles: usize,

    /// Number of tile columns covering the raster.
    pub n_cols_of_tiles: usize,

    /// Whether the file was created for 64-bit tile addressing from the start.
    pub extended_file_size: bool,

    /// Whether header and record checksums are computed and verified.
    pub checksums_enabled: bool,

    /// Interpretation of a cell value relative to its cell.
    pub geometry: CellGeometry,

    /// Model coordinate system, bounds, and affine mappings.
    pub model: ModelTransform,

    /// Identifications of the codecs available to this file, in index order.
    /// An empty list disables tile compression.
    pub codec_identifications: Vec<String>,

    /// The elements stored in each cell, in tuple order.
    pub elements: Elements,

    /// Free-form product label.
    pub product_label: Option<String>,
}

impl GvrsFileSpecification {

    /// Describe a raster of the given cell dimensions, split into tiles of the
    /// given tile dimensions. The tile grid is derived by rounding up, so the
    /// last row and column of tiles may be only partially populated.
    pub fn new(
        n_rows_in_raster: usize, n_cols_in_raster: usize,
        n_rows_in_tile: usize, n_cols_in_tile: usize,
    ) -> Result<Self>
    {
        if n_rows_in_raster == 0 || n_cols_in_raster == 0 {
            return Err(Error::invalid_spec("raster dimensions must be positive"));
        }

        if n_rows_in_raster > i32::MAX as usize || n_cols_in_raster > i32::MAX as usize {
            return Err(Error::invalid_spec("raster dimensions exceed the 31-bit cell index space"));
        }

        if n_rows_in_tile == 0 || n_cols_in_tile == 0 {
            return Err(Error::invalid_spec("tile dimensions must be positive"));
        }

        if n_rows_in_tile > n_rows_in_raster || n_cols_in_tile > n_cols_in_raster {
            return Err(Error::invalid_spec("tile dimensions exceed raster dimensions"));
        }

        let n_rows_of_tiles = (n_rows_in_raster + n_rows_in_tile - 1) / n_rows_in_tile;
        let n_cols_of_tiles = (n_cols_in_raster + n_cols_in_tile - 1) / n_cols_in_tile;

        // every tile index must fit a 31-bit signed integer
        if n_rows_of_tiles.checked_mul(n_cols_of_tiles)
            .map_or(true, |count| count > i32::MAX as usize)
        {
            return Err(Error::invalid_spec("tile count exceeds the 31-bit tile index space"));
        }

        Ok(GvrsFileSpecification {
            n_rows_in_raster, n_cols_in_raster,
            n_rows_in_tile, n_cols_in_tile,
            n_rows_of_tiles, n_cols_of_tiles,
            extended_file_size: false,
            checksums_enabled: false,
            geometry: CellGeometry::Unspecified,
            model: ModelTransform::unspecified(),
            codec_identifications: Vec::new(),
            elements: Elements::new(),
            product_label: None,
        })
    }

    /// Append an element to the cell tuple. Names must be unique.
    pub fn add_element(&mut self, element: ElementSpecification) -> UnitResult {
        if self.elements.iter().any(|existing| existing.name == element.name) {
            return Err(Error::invalid_spec(format!("duplicate element name `{}`", element.name)));
        }

        self.elements.push(element);
        Ok(())
    }

    /// Enable tile compression with the standard codecs.
    pub fn enable_data_compression(&mut self) {
        if self.codec_identifications.is_empty() {
            self.codec_identifications = STANDARD_CODEC_IDENTIFICATIONS
                .iter().map(|id| id.to_string()).collect();
        }
    }

    /// Enable checksums on the header and all records.
    pub fn enable_checksums(&mut self) {
        self.checksums_enabled = true;
    }

    /// Whether tiles are compressed when written.
    pub fn is_data_compression_enabled(&self) -> bool {
        !self.codec_identifications.is_empty()
    }

    /// Number of tiles covering the raster.
    pub fn tile_count(&self) -> usize {
        self.n_rows_of_tiles * self.n_cols_of_tiles
    }

    /// Number of cells in one full tile.
    pub fn cells_in_tile(&self) -> usize {
        self.n_rows_in_tile * self.n_cols_in_tile
    }

    /// The uncompressed serialized size of one tile's element payloads.
    /// Each element is padded to a multiple of four bytes, so elements
    /// always start 4-byte aligned.
    pub fn standard_tile_size_in_bytes(&self) -> usize {
        let cells = self.cells_in_tile();

        self.elements.iter()
            .map(|element| (cells * element.bytes_per_sample() + 3) / 4 * 4)
            .sum()
    }

    /// The tile index covering the given cell, if the cell lies in the raster.
    pub fn tile_index_of_cell(&self, row: usize, col: usize) -> Result<i32> {
        if row >= self.n_rows_in_raster || col >= self.n_cols_in_raster {
            return Err(Error::InvalidTileIndex((row.max(col)) as i64));
        }

        let tile_row = row / self.n_rows_in_tile;
        let tile_col = col / self.n_cols_in_tile;
        Ok(usize_to_i32(tile_row * self.n_cols_of_tiles + tile_col))
    }

    /// Position of the named element within the cell tuple.
    pub fn index_of_element(&self, name: &str) -> Option<usize> {
        self.elements.iter().position(|element| element.name == name)
    }

    /// Serialize the specification payload of the file header.
    pub fn write(&self, write: &mut impl Write) -> UnitResult {
        usize_to_i32(self.n_rows_in_raster).write(write)?;
        usize_to_i32(self.n_cols_in_raster).write(write)?;
        usize_to_i32(self.n_rows_in_tile).write(write)?;
        usize_to_i32(self.n_cols_in_tile).write(write)?;
        u8::write_slice(write, &[0_u8; 20])?;

        (self.extended_file_size as u8).write(write)?;
        (self.checksums_enabled as u8).write(write)?;
        self.geometry.code().write(write)?;
        self.model.coordinate_system.code().write(write)?;
        self.model.write(write)?;

        usize_to_i32(self.codec_identifications.len()).write(write)?;
        for identification in &self.codec_identifications {
            write_utf(write, identification)?;
        }

        usize_to_i32(self.elements.len()).write(write)?;
        for element in &self.elements {
            element.write(write)?;
        }

        write_utf(write, self.product_label.as_deref().unwrap_or(""))
    }

    /// Deserialize the specification payload of the file header.
    pub fn read(read: &mut impl Read) -> Result<Self> {
        let n_rows_in_raster = i32_to_usize(i32::read(read)?, "negative raster row count")?;
        let n_cols_in_raster = i32_to_usize(i32::read(read)?, "negative raster column count")?;
        let n_rows_in_tile = i32_to_usize(i32::read(read)?, "negative tile row count")?;
        let n_cols_in_tile = i32_to_usize(i32::read(read)?, "negative tile column count")?;
        skip_bytes(read, 20)?;

        let extended_file_size = u8::read(read)? != 0;
        let checksums_enabled = u8::read(read)? != 0;
        let geometry = CellGeometry::from_code(u8::read(read)?)?;
        let coordinate_system = CoordinateSystem::from_code(u8::read(read)?)?;
        let model = ModelTransform::read(read, coordinate_system)?;

        let n_codecs = i32_to_usize(i32::read(read)?, "negative codec count")?;
        if n_codecs > 255 {
            return Err(Error::invalid_spec("more than 255 codec identifications"));
        }

        let mut codec_identifications = Vec::with_capacity(n_codecs);
        for _ in 0 .. n_codecs {
            codec_identifications.push(read_utf(read)?);
        }

        let n_elements = i32_to_usize(i32::read(read)?, "negative element count")?;
        let mut specification = GvrsFileSpecification::new(
            n_rows_in_raster, n_cols_in_raster,
            n_rows_in_tile, n_cols_in_tile,
        )?;

        specification.extended_file_size = extended_file_size;
        specification.checksums_enabled = checksums_enabled;
        specification.geometry = geometry;
        specification.model = model;
        specification.codec_identifications = codec_identifications;

        for _ in 0 .. n_elements {
            specification.add_element(ElementSpecification::read(read)?)?;
        }

        let product_label = read_utf(read)?;
        specification.product_label =
            if product_label.is_empty() { None } else { Some(product_label) };

        Ok(specification)
    }

    /// Check that the specification can describe a file: it must declare
    /// at least one element, and no more than 255 codecs.
    pub fn validate(&self) -> UnitResult {
        if self.elements.is_empty() {
            return Err(Error::invalid_spec("a file requires at least one element"));
        }

        if self.codec_identifications.len() > 255 {
            return Err(Error::invalid_spec("more than 255 codec identifications"));
        }

        for identification in &self.codec_identifications {
            if identification.len() > 16 {
                return Err(Error::invalid_spec("codec identification longer than 16 characters"));
            }
            validate_identifier(identification)?;
        }

        Ok(())
    }
}


#[cfg(test)]
mod test {
    use super::*;
    use super::element::ElementType;

    fn sample_specification() -> GvrsFileSpecification {
        let mut specification = GvrsFileSpecification::new(722, 1442, 90, 120).unwrap();

        specification.add_element(
            ElementSpecification::new("z", ElementType::Short {
                min_value: -11000, max_value: 9000, fill_value: -32768,
            }).unwrap().with_unit_of_measure("m"),
        ).unwrap();

        specification.enable_data_compression();
        specification.enable_checksums();
        specification.product_label = Some("ETOPO1 subset".to_string());
        specification
    }

    #[test]
    fn derives_tile_grid_by_rounding_up(){
        let specification = sample_specification();
        assert_eq!(specification.n_rows_of_tiles, 9);   // 722 / 90 rounded up
        assert_eq!(specification.n_cols_of_tiles, 13);  // 1442 / 120 rounded up
        assert_eq!(specification.tile_count(), 117);
    }

    #[test]
    fn tile_index_is_row_major(){
        let specification = sample_specification();
        assert_eq!(specification.tile_index_of_cell(0, 0).unwrap(), 0);
        assert_eq!(specification.tile_index_of_cell(0, 120).unwrap(), 1);
        assert_eq!(specification.tile_index_of_cell(90, 0).unwrap(), 13);
        assert_eq!(specification.tile_index_of_cell(721, 1441).unwrap(), 116);

        assert!(specification.tile_index_of_cell(722, 0).is_err());
        assert!(specification.tile_index_of_cell(0, 1442).is_err());
    }

    #[test]
    fn standard_tile_size_pads_shorts(){
        // 90 * 120 = 10800 cells; shorts need 21600 bytes, already 4-aligned
        assert_eq!(sample_specification().standard_tile_size_in_bytes(), 21600);

        // odd cell count: 3 * 3 shorts = 18 bytes, padded to 20
        let mut odd = GvrsFileSpecification::new(3, 3, 3, 3).unwrap();
        odd.add_element(ElementSpecification::new("s", ElementType::Short {
            min_value: 0, max_value: 1, fill_value: -1,
        }).unwrap()).unwrap();
        assert_eq!(odd.standard_tile_size_in_bytes(), 20);
    }

    #[test]
    fn rejects_oversized_tile_grid(){
        assert!(GvrsFileSpecification::new(usize::MAX / 2, usize::MAX / 2, 1, 1).is_err());
    }

    #[test]
    fn payload_round_trips(){
        let specification = sample_specification();

        let mut bytes = Vec::new();
        specification.write(&mut bytes).unwrap();

        let decoded = GvrsFileSpecification::read(&mut bytes.as_slice()).unwrap();
        assert_eq!(decoded, specification);
    }

    #[test]
    fn requires_an_element(){
        let empty = GvrsFileSpecification::new(10, 10, 5, 5).unwrap();
        assert!(empty.validate().is_err());
        assert!(sample_specification().validate().is_ok());
    }
}
