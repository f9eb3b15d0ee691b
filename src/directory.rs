
//! The tile directory: a sparse mapping from tile index to file offset.
//!
//! Offsets are held for a growable sub-rectangle of the tile grid, so a file
//! that populates only a corner of a huge raster pays for the corner, not the
//! grid. The compact form stores each offset as a 32-bit word counting
//! 8-byte units, which addresses files up to 2^35 bytes; the extended form
//! stores plain 64-bit offsets. A compact directory is promoted in place the
//! first time an allocation lands beyond the compact limit.

use crate::error::{i32_to_usize, usize_to_i32, Error, Result, UnitResult};
use crate::io::{Data, Read, Write};
use crate::spec::GvrsFileSpecification;


/// Largest file position the compact form can address.
pub const COMPACT_OFFSET_LIMIT: u64 = 1 << 35;


/// The tile-offset rectangle shared by both directory forms.
///
/// Rows and columns are tile-grid coordinates. The rectangle starts empty
/// and grows to the bounding box of every position ever set.
#[derive(Debug, Clone, PartialEq, Eq)]
struct OffsetGrid<Word> {
    n_cols_of_tiles: usize,

    row0: usize,
    col0: usize,
    n_rows: usize,
    n_cols: usize,

    /// Row-major offsets of the covered rectangle; zero marks an absent tile.
    offsets: Vec<Word>,
}

impl<Word: Copy + Default + Eq> OffsetGrid<Word> {

    fn new(n_cols_of_tiles: usize) -> Self {
        OffsetGrid {
            n_cols_of_tiles,
            row0: 0, col0: 0,
            n_rows: 0, n_cols: 0,
            offsets: Vec::new(),
        }
    }

    fn split_index(&self, tile_index: i32) -> (usize, usize) {
        let tile_index = tile_index as usize;
        (tile_index / self.n_cols_of_tiles, tile_index % self.n_cols_of_tiles)
    }

    fn get(&self, tile_index: i32) -> Word {
        let (row, col) = self.split_index(tile_index);

        if row < self.row0 || row >= self.row0 + self.n_rows
            || col < self.col0 || col >= self.col0 + self.n_cols
        {
            return Word::default();
        }

        self.offsets[(row - self.row0) * self.n_cols + (col - self.col0)]
    }

    fn set(&mut self, tile_index: i32, word: Word) {
        let (row, col) = self.split_index(tile_index);

        if self.offsets.is_empty() {
            self.row0 = row;
            self.col0 = col;
            self.n_rows = 1;
            self.n_cols = 1;
            self.offsets = vec![Word::default(); 1];
        }
        else if row < self.row0 || row >= self.row0 + self.n_rows
            || col < self.col0 || col >= self.col0 + self.n_cols
        {
            let row0 = self.row0.min(row);
            let col0 = self.col0.min(col);
            let row1 = (self.row0 + self.n_rows - 1).max(row);
            let col1 = (self.col0 + self.n_cols - 1).max(col);

            let n_rows = row1 - row0 + 1;
            let n_cols = col1 - col0 + 1;
            let mut offsets = vec![Word::default(); n_rows * n_cols];

            for old_row in 0 .. self.n_rows {
                let target_row = self.row0 + old_row - row0;
                let target_col = self.col0 - col0;
                let target_start = target_row * n_cols + target_col;
                let source_start = old_row * self.n_cols;

                offsets[target_start .. target_start + self.n_cols]
                    .copy_from_slice(&self.offsets[source_start .. source_start + self.n_cols]);
            }

            self.row0 = row0;
            self.col0 = col0;
            self.n_rows = n_rows;
            self.n_cols = n_cols;
            self.offsets = offsets;
        }

        self.offsets[(row - self.row0) * self.n_cols + (col - self.col0)] = word;
    }

    fn count_populated(&self) -> usize {
        self.offsets.iter().filter(|word| **word != Word::default()).count()
    }

    fn storage_size(&self, word_size: usize) -> usize {
        16 + self.offsets.len() * word_size
    }
}

impl<Word: Data + Copy + Default + Eq> OffsetGrid<Word> {

    fn write(&self, write: &mut impl Write) -> UnitResult {
        usize_to_i32(self.row0).write(write)?;
        usize_to_i32(self.col0).write(write)?;
        usize_to_i32(self.n_rows).write(write)?;
        usize_to_i32(self.n_cols).write(write)?;
        Word::write_slice(write, &self.offsets)
    }

    fn read(read: &mut impl Read, n_cols_of_tiles: usize) -> Result<Self> {
        let row0 = i32_to_usize(i32::read(read)?, "negative directory row origin")?;
        let col0 = i32_to_usize(i32::read(read)?, "negative directory column origin")?;
        let n_rows = i32_to_usize(i32::read(read)?, "negative directory row count")?;
        let n_cols = i32_to_usize(i32::read(read)?, "negative directory column count")?;

        let count = n_rows.checked_mul(n_cols)
            .ok_or_else(|| Error::invalid_spec("directory rectangle overflows"))?;

        let offsets = Word::read_vec(read, count)?;
        Ok(OffsetGrid { n_cols_of_tiles, row0, col0, n_rows, n_cols, offsets })
    }
}


/// The sparse tile index of one file, in either addressing form.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TileDirectory {

    /// 32-bit words holding `file_offset / 8`.
    Compact(OffsetGridCompact),

    /// 64-bit words holding file offsets directly.
    Extended(OffsetGridExtended),
}

/// The compact directory representation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OffsetGridCompact(OffsetGrid<u32>);

/// The extended directory representation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OffsetGridExtended(OffsetGrid<u64>);

impl TileDirectory {

    /// An empty directory for the given raster, in the form the
    /// specification's extended-file-size flag selects.
    pub fn new(specification: &GvrsFileSpecification) -> Self {
        if specification.extended_file_size {
            TileDirectory::Extended(OffsetGridExtended(OffsetGrid::new(specification.n_cols_of_tiles)))
        }
        else {
            TileDirectory::Compact(OffsetGridCompact(OffsetGrid::new(specification.n_cols_of_tiles)))
        }
    }

    /// Whether offsets are stored as direct 64-bit words.
    pub fn uses_extended_file_offset(&self) -> bool {
        matches!(self, TileDirectory::Extended(_))
    }

    /// The file position of a tile record's content, or zero
    /// when the tile does not exist in the file.
    pub fn file_position(&self, tile_index: i32) -> u64 {
        match self {
            TileDirectory::Compact(OffsetGridCompact(grid)) => u64::from(grid.get(tile_index)) * 8,
            TileDirectory::Extended(OffsetGridExtended(grid)) => grid.get(tile_index),
        }
    }

    /// Whether a tile exists in the file.
    pub fn is_file_position_set(&self, tile_index: i32) -> bool {
        self.file_position(tile_index) != 0
    }

    /// Store the file position of a tile. Zero clears the slot. Positions at
    /// or beyond 2^35 bytes do not fit the compact form and must be preceded
    /// by a promotion to the extended form.
    pub fn set_file_position(&mut self, tile_index: i32, offset: u64) -> UnitResult {
        match self {
            TileDirectory::Compact(OffsetGridCompact(grid)) => {
                if offset >= COMPACT_OFFSET_LIMIT {
                    return Err(Error::FilePositionExceedsCompactLimit(offset));
                }

                debug_assert_eq!(offset % 8, 0, "unaligned tile record position");
                grid.set(tile_index, (offset / 8) as u32);
            },

            TileDirectory::Extended(OffsetGridExtended(grid)) => {
                grid.set(tile_index, offset);
            },
        }

        Ok(())
    }

    /// A copy of this directory in the extended form,
    /// preserving every stored position.
    pub fn to_extended(&self) -> Self {
        match self {
            TileDirectory::Extended(_) => self.clone(),

            TileDirectory::Compact(OffsetGridCompact(grid)) => {
                TileDirectory::Extended(OffsetGridExtended(OffsetGrid {
                    n_cols_of_tiles: grid.n_cols_of_tiles,
                    row0: grid.row0,
                    col0: grid.col0,
                    n_rows: grid.n_rows,
                    n_cols: grid.n_cols,
                    offsets: grid.offsets.iter().map(|word| u64::from(*word) * 8).collect(),
                }))
            },
        }
    }

    /// Number of tiles that exist in the file.
    pub fn count_of_populated_tiles(&self) -> usize {
        match self {
            TileDirectory::Compact(OffsetGridCompact(grid)) => grid.count_populated(),
            TileDirectory::Extended(OffsetGridExtended(grid)) => grid.count_populated(),
        }
    }

    /// Serialized size of the directory payload, in bytes.
    pub fn storage_size(&self) -> usize {
        match self {
            TileDirectory::Compact(OffsetGridCompact(grid)) => grid.storage_size(4),
            TileDirectory::Extended(OffsetGridExtended(grid)) => grid.storage_size(8),
        }
    }

    /// Serialize the offset rectangle.
    pub fn write_tile_positions(&self, write: &mut impl Write) -> UnitResult {
        match self {
            TileDirectory::Compact(OffsetGridCompact(grid)) => grid.write(write),
            TileDirectory::Extended(OffsetGridExtended(grid)) => grid.write(write),
        }
    }

    /// Deserialize an offset rectangle in the given form.
    pub fn read_tile_positions(
        read: &mut impl Read,
        specification: &GvrsFileSpecification,
        extended: bool,
    ) -> Result<Self> {
        let n_cols_of_tiles = specification.n_cols_of_tiles;

        let directory = if extended {
            TileDirectory::Extended(OffsetGridExtended(OffsetGrid::read(read, n_cols_of_tiles)?))
        }
        else {
            TileDirectory::Compact(OffsetGridCompact(OffsetGrid::read(read, n_cols_of_tiles)?))
        };

        Ok(directory)
    }
}
