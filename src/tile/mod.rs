
//! In-memory tiles: the unit of io, caching, and compression.

pub mod cache;
pub mod element;

use smallvec::SmallVec;

use crate::codec::CodecMaster;
use crate::error::{usize_to_i32, Error, Result, UnitResult};
use crate::io::{Data, Read, Write};
use crate::spec::GvrsFileSpecification;

use self::element::TileElement;


/// One tile of the raster, holding a sample buffer per element.
///
/// A tile always covers the full tile dimensions of its file, even at the
/// ragged right and bottom edges of the raster; cells outside the raster
/// simply keep their fill values.
#[derive(Debug, Clone)]
pub struct RasterTile {

    /// Row-major index of this tile in the tile grid.
    pub tile_index: i32,

    /// Row of this tile in the tile grid.
    pub tile_row: usize,

    /// Column of this tile in the tile grid.
    pub tile_col: usize,

    /// Cell rows covered by this tile.
    pub n_rows: usize,

    /// Cell columns covered by this tile.
    pub n_cols: usize,

    /// Set by every mutating access, cleared when the tile reaches disk.
    pub writing_required: bool,

    /// One sample buffer per element, in tuple order.
    pub elements: SmallVec<[TileElement; 4]>,
}

impl RasterTile {

    /// A fill-initialized tile for the given index.
    pub fn new(specification: &GvrsFileSpecification, tile_index: i32) -> Result<Self> {
        let tile_count = specification.tile_count();

        if tile_index < 0 || tile_index as usize >= tile_count {
            return Err(Error::InvalidTileIndex(i64::from(tile_index)));
        }

        let n_rows = specification.n_rows_in_tile;
        let n_cols = specification.n_cols_in_tile;
        let n_cells = n_rows * n_cols;

        let elements = specification.elements.iter()
            .map(|element| TileElement::new(&element.element_type, n_cells))
            .collect();

        Ok(RasterTile {
            tile_index,
            tile_row: tile_index as usize / specification.n_cols_of_tiles,
            tile_col: tile_index as usize % specification.n_cols_of_tiles,
            n_rows, n_cols,
            writing_required: false,
            elements,
        })
    }

    /// Whether any element of any cell holds something besides its fill value.
    pub fn has_valid_data(&self) -> bool {
        self.elements.iter().any(TileElement::has_valid_data)
    }

    /// Reset every cell of every element to the fill value.
    pub fn set_to_null_state(&mut self) {
        for element in &mut self.elements {
            element.set_to_null_state();
        }
    }

    /// Serialized size of the element payloads in standard form,
    /// including the per-element length prefixes.
    pub fn standard_payload_size(&self) -> usize {
        self.elements.iter()
            .map(|element| 4 + element.standard_size_in_bytes())
            .sum()
    }

    /// Encode every element, concatenating `[length, bytes]` packets.
    /// Elements that do not benefit from compression are carried in their
    /// standard form, so the packing may not be smaller than
    /// [`standard_payload_size`](Self::standard_payload_size);
    /// the caller compares before committing to the compressed form.
    pub fn compressed_packing(&self, codec: &CodecMaster) -> Result<Vec<u8>> {
        let mut packing = Vec::with_capacity(self.standard_payload_size());

        for element in &self.elements {
            let encoded = element.encode(codec, self.n_rows, self.n_cols)?;
            usize_to_i32(encoded.len()).write(&mut packing)?;
            packing.extend_from_slice(&encoded);
        }

        Ok(packing)
    }

    /// Write the element payloads in standard form, each preceded
    /// by its length.
    pub fn write_standard_payload(&self, write: &mut impl Write) -> UnitResult {
        for element in &self.elements {
            usize_to_i32(element.standard_size_in_bytes()).write(write)?;
            element.write_standard_format(write)?;
        }

        Ok(())
    }

    /// Read the element payloads: a packet of exactly the standard size is
    /// read directly, any other length is decoded through the codec.
    pub fn read_payload(&mut self, codec: &CodecMaster, read: &mut impl Read) -> UnitResult {
        for element in &mut self.elements {
            let length = i32::read(read)?;

            if length < 0 {
                return Err(Error::InvalidCompressionCode(0));
            }

            if length as usize == element.standard_size_in_bytes() {
                element.read_standard_format(read)?;
            }
            else {
                let bytes = u8::read_vec(read, length as usize)?;
                element.decode(codec, self.n_rows, self.n_cols, &bytes)?;
            }
        }

        self.writing_required = false;
        Ok(())
    }
}


#[cfg(test)]
mod test {
    use super::*;
    use crate::codec::{CodecMaster, CodecRegistry};
    use crate::spec::element::{ElementSpecification, ElementType};
    use crate::spec::STANDARD_CODEC_IDENTIFICATIONS;

    fn two_element_specification() -> GvrsFileSpecification {
        let mut specification = GvrsFileSpecification::new(120, 120, 10, 12).unwrap();

        specification.add_element(ElementSpecification::new("z", ElementType::Short {
            min_value: -11000, max_value: 9000, fill_value: i16::MIN,
        }).unwrap()).unwrap();

        specification.add_element(ElementSpecification::new("confidence", ElementType::Float {
            min_value: 0.0, max_value: 1.0, fill_value: f32::NAN,
        }).unwrap()).unwrap();

        specification
    }

    #[test]
    fn rejects_out_of_grid_indices(){
        let specification = two_element_specification();
        assert!(RasterTile::new(&specification, -1).is_err());
        assert!(RasterTile::new(&specification, 144).is_err());
        assert!(RasterTile::new(&specification, 143).is_ok());
    }

    #[test]
    fn locates_tile_in_grid(){
        let specification = two_element_specification();
        let tile = RasterTile::new(&specification, 25).unwrap();
        assert_eq!((tile.tile_row, tile.tile_col), (2, 5));
    }

    #[test]
    fn standard_payload_round_trips(){
        let specification = two_element_specification();
        let codec = CodecMaster::new(&[], &CodecRegistry::standard());

        let mut tile = RasterTile::new(&specification, 0).unwrap();
        tile.elements[0].set_int_value(7, 1234).unwrap();
        tile.elements[1].set_value(7, 0.75).unwrap();

        let mut payload = Vec::new();
        tile.write_standard_payload(&mut payload).unwrap();
        assert_eq!(payload.len(), tile.standard_payload_size());

        let mut decoded = RasterTile::new(&specification, 0).unwrap();
        decoded.read_payload(&codec, &mut payload.as_slice()).unwrap();

        assert_eq!(decoded.elements[0].int_value(7), 1234);
        assert!((decoded.elements[1].value(7) - 0.75).abs() < 1e-6);
        assert!(decoded.has_valid_data());
    }

    #[test]
    fn compressed_packing_round_trips(){
        let mut specification = two_element_specification();
        specification.enable_data_compression();

        let codec = CodecMaster::new(
            &STANDARD_CODEC_IDENTIFICATIONS.map(String::from),
            &CodecRegistry::standard(),
        );

        let mut tile = RasterTile::new(&specification, 3).unwrap();
        for cell in 0 .. 120 {
            tile.elements[0].set_int_value(cell, 500).unwrap();
            tile.elements[1].set_value(cell, 0.5).unwrap();
        }

        let packing = tile.compressed_packing(&codec).unwrap();
        assert!(packing.len() < tile.standard_payload_size());

        let mut decoded = RasterTile::new(&specification, 3).unwrap();
        decoded.read_payload(&codec, &mut packing.as_slice()).unwrap();
        assert_eq!(decoded.elements, tile.elements);
    }

    #[test]
    fn null_tile_has_no_valid_data(){
        let specification = two_element_specification();
        let mut tile = RasterTile::new(&specification, 0).unwrap();
        assert!(!tile.has_valid_data());

        tile.elements[0].set_int_value(0, 1).unwrap();
        assert!(tile.has_valid_data());

        tile.set_to_null_state();
        assert!(!tile.has_valid_data());
    }
}
