
//! The top level of the library: opening, creating, and closing gvrs files,
//! and the element-based read/write surface over the tile machinery.

use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};

use log::debug;

use crate::codec::{CodecMaster, CodecRegistry};
use crate::crc;
use crate::error::{Error, Result, UnitResult};
use crate::io::{Data, RandomAccessFile, Read};
use crate::metadata::GvrsMetadata;
use crate::record::{DirectoryPositions, RecordManager};
use crate::spec::element::ElementType;
use crate::spec::GvrsFileSpecification;
use crate::tile::cache::{CacheSize, CacheStatistics, TileCache};


/// The identifier bytes every gvrs file starts with.
pub const MAGIC: [u8; 12] = *b"gvrs raster\0";

/// Major format version written by this library.
pub const VERSION: u8 = 1;

/// Sub version written by this library. Files with sub versions 0 and 1
/// are accepted on open.
pub const SUBVERSION: u8 = 1;

const OFFSET_TIME_MODIFIED: u64 = 32;
const OFFSET_OPENED_FOR_WRITING: u64 = 40;
const OFFSET_CONTENT: u64 = 48;
const OFFSET_FREESPACE_DIRECTORY: u64 = 56;
const OFFSET_TILE_DIRECTORY: u64 = 80;

/// Names of the codec metadata records written at file creation.
const JAVA_CODECS_NAME: &str = "GvrsJavaCodecs";
const COMPRESSION_CODECS_NAME: &str = "GvrsCompressionCodecs";


/// A handle to one declared element, resolved by name from a [`GvrsFile`].
///
/// The handle is a token; all access goes through the owning file, which
/// keeps the single-writer discipline visible in the types.
#[derive(Debug, Clone)]
pub struct GvrsElement {
    index: usize,
    name: String,
    fill_int: i32,
    fill_float: f32,
}

impl GvrsElement {

    /// The element name this handle resolves.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Position of the element in the cell tuple.
    pub fn index(&self) -> usize {
        self.index
    }
}


/// An open gvrs raster store over one backing file.
///
/// A file is either read-only or read-write; a writer stamps its presence in
/// the header so that a second writer, or a reader racing a writer, is
/// refused. Dropping the file closes it on a best-effort basis; call
/// [`close`](Self::close) to observe errors.
#[derive(Debug)]
pub struct GvrsFile {
    path: PathBuf,
    file: RandomAccessFile,
    records: RecordManager,
    cache: TileCache,

    header_size: u64,
    identity: (u64, u64),
    writable: bool,

    /// Latched by an io failure during a mutating operation;
    /// all further writes are refused.
    write_failure: bool,

    closed: bool,
}

impl GvrsFile {

    /// Create a new file described by the specification, with the
    /// standard codecs.
    pub fn create(path: impl AsRef<Path>, specification: GvrsFileSpecification) -> Result<Self> {
        Self::create_with_registry(path, specification, &CodecRegistry::standard())
    }

    /// Create a new file, resolving codec identifications against an
    /// application-supplied registry.
    pub fn create_with_registry(
        path: impl AsRef<Path>,
        specification: GvrsFileSpecification,
        registry: &CodecRegistry,
    ) -> Result<Self>
    {
        specification.validate()?;

        let path = path.as_ref().to_path_buf();
        let mut file = RandomAccessFile::create(&path)?;

        let identity = generate_identity();
        let now = current_time_millis();

        u8::write_slice(&mut file, &MAGIC)?;
        VERSION.write(&mut file)?;
        SUBVERSION.write(&mut file)?;
        u8::write_slice(&mut file, &[0_u8; 2])?;

        identity.0.write(&mut file)?;
        identity.1.write(&mut file)?;
        now.write(&mut file)?;
        now.write(&mut file)?;           // opened for writing: held by us

        0_u64.write(&mut file)?;         // offset to content, patched below
        0_u64.write(&mut file)?;         // offset to free-space directory
        0_u64.write(&mut file)?;         // offset to metadata directory
        1_i16.write(&mut file)?;         // number of levels
        u8::write_slice(&mut file, &[0_u8; 6])?;
        0_u64.write(&mut file)?;         // offset to tile directory
        u8::write_slice(&mut file, &[0_u8; 16])?;

        specification.write(&mut file)?;
        u8::write_slice(&mut file, &[0_u8; 8])?;

        // pad so the content base is 8-aligned, with the last
        // four header bytes reserved for the header checksum
        let written = file.position();
        let header_size = (written + 4 + 7) & !7;
        let padding = header_size - 4 - written;
        u8::write_slice(&mut file, &vec![0_u8; padding as usize])?;
        0_u32.write(&mut file)?;

        file.seek(OFFSET_CONTENT)?;
        header_size.write(&mut file)?;

        let codec = CodecMaster::new(&specification.codec_identifications, registry);
        let cache = TileCache::new(CacheSize::Medium.tile_capacity(&specification));
        let records = RecordManager::new(specification, codec, header_size);

        let mut gvrs = GvrsFile {
            path, file, records, cache,
            header_size, identity,
            writable: true,
            write_failure: false,
            closed: false,
        };

        gvrs.stamp_header_checksum()?;

        // record which codecs this file depends on; the class-path record
        // exists for cross-implementation compatibility and is empty here
        if gvrs.records.codec().is_enabled() {
            let identifications = gvrs.records.codec()
                .identifications().collect::<Vec<_>>().join("|");

            gvrs.write_metadata(GvrsMetadata::new_ascii(JAVA_CODECS_NAME, "")?
                .with_record_id(1))?;
            gvrs.write_metadata(GvrsMetadata::new_ascii(COMPRESSION_CODECS_NAME, &identifications)?
                .with_record_id(1))?;
        }

        debug!("created {:?} with header of {} bytes", gvrs.path, header_size);
        Ok(gvrs)
    }

    /// Open an existing file read-only. Multiple read-only instances over
    /// the same contents may coexist.
    pub fn open_read_only(path: impl AsRef<Path>) -> Result<Self> {
        Self::open_with_registry(path, false, &CodecRegistry::standard())
    }

    /// Open an existing file for reading and writing. Refused while another
    /// writer holds the file or after an unclean close.
    pub fn open_for_writing(path: impl AsRef<Path>) -> Result<Self> {
        Self::open_with_registry(path, true, &CodecRegistry::standard())
    }

    /// Open an existing file, resolving codec identifications against an
    /// application-supplied registry.
    pub fn open_with_registry(
        path: impl AsRef<Path>,
        writable: bool,
        registry: &CodecRegistry,
    ) -> Result<Self>
    {
        let path = path.as_ref().to_path_buf();
        let mut file = RandomAccessFile::open(&path, writable)?;

        let mut magic = [0_u8; 12];
        file.read_exact(&mut magic)?;
        if magic != MAGIC {
            return Err(Error::BadMagic);
        }

        let version = u8::read(&mut file)?;
        let subversion = u8::read(&mut file)?;
        if version != VERSION || subversion > SUBVERSION {
            return Err(Error::UnsupportedVersion { version, subversion });
        }

        crate::io::skip_bytes(&mut file, 2)?;
        let identity = (u64::read(&mut file)?, u64::read(&mut file)?);
        let _time_modified = i64::read(&mut file)?;

        let opened_for_writing = i64::read(&mut file)?;
        if opened_for_writing != 0 {
            return Err(Error::FileBusyOrUnclean);
        }

        let header_size = u64::read(&mut file)?;
        let freespace_position = u64::read(&mut file)?;
        let metadata_position = u64::read(&mut file)?;

        let n_levels = i16::read(&mut file)?;
        if n_levels != 1 {
            return Err(Error::invalid_spec("multi-level rasters are not defined"));
        }

        crate::io::skip_bytes(&mut file, 6)?;
        let tile_position = u64::read(&mut file)?;
        crate::io::skip_bytes(&mut file, 16)?;

        let specification = GvrsFileSpecification::read(&mut file)?;

        if specification.checksums_enabled {
            let computed = checksum_over(&mut file, 0, header_size - 4)?;
            file.seek(header_size - 4)?;
            if u32::read(&mut file)? != computed {
                return Err(Error::HeaderChecksumMismatch);
            }
        }

        let codec = CodecMaster::new(&specification.codec_identifications, registry);
        let cache = TileCache::new(CacheSize::Medium.tile_capacity(&specification));
        let mut records = RecordManager::new(specification, codec, header_size);

        let positions = DirectoryPositions {
            freespace: freespace_position,
            metadata: metadata_position,
            tiles: tile_position,
        };

        let stored_directories =
            positions.freespace != 0 || positions.metadata != 0 || positions.tiles != 0;

        if stored_directories {
            records.read_directories(&mut file, positions)?;
        }
        else if file.length() > header_size {
            // the pointers are gone but records exist; rebuild from the
            // records themselves
            records.scan_file_for_tiles(&mut file)?;
        }

        let mut gvrs = GvrsFile {
            path, file, records, cache,
            header_size, identity,
            writable,
            write_failure: false,
            closed: false,
        };

        if writable {
            // hold the file, and drop the directory records: the runtime
            // structures supersede them until the next clean close
            gvrs.file.seek(OFFSET_OPENED_FOR_WRITING)?;
            current_time_millis().write(&mut gvrs.file)?;

            gvrs.file.seek(OFFSET_FREESPACE_DIRECTORY)?;
            0_u64.write(&mut gvrs.file)?;
            0_u64.write(&mut gvrs.file)?;
            gvrs.file.seek(OFFSET_TILE_DIRECTORY)?;
            0_u64.write(&mut gvrs.file)?;

            if stored_directories {
                gvrs.records.dealloc_directories(&mut gvrs.file, positions)?;
            }

            gvrs.file.flush()?;
        }

        debug!("opened {:?} (writable: {})", gvrs.path, writable);
        Ok(gvrs)
    }

    /// The description this file was created with.
    pub fn specification(&self) -> &GvrsFileSpecification {
        self.records.specification()
    }

    /// The 128-bit identity stamped into the header at creation.
    pub fn identity(&self) -> (u64, u64) {
        self.identity
    }

    /// Whether this instance may write.
    pub fn is_writable(&self) -> bool {
        self.writable && !self.write_failure
    }

    /// Access counters of the tile cache.
    pub fn cache_statistics(&self) -> CacheStatistics {
        self.cache.statistics()
    }

    /// Replace the tile cache with one of the given size.
    /// Dirty tiles are flushed first.
    pub fn set_tile_cache_size(&mut self, size: CacheSize) -> UnitResult {
        self.cache.flush(&mut self.records, &mut self.file)?;
        self.cache = TileCache::new(size.tile_capacity(self.records.specification()));
        Ok(())
    }


    // ----- elements --------------------------------------------------------

    /// Resolve an element handle by name.
    pub fn element(&self, name: &str) -> Option<GvrsElement> {
        let specification = self.records.specification();
        let index = specification.index_of_element(name)?;
        let element_type = &specification.elements[index].element_type;

        Some(GvrsElement {
            index,
            name: name.to_string(),
            fill_int: fill_as_int(element_type),
            fill_float: fill_as_float(element_type),
        })
    }

    /// Handles for every declared element, in tuple order.
    pub fn elements(&self) -> Vec<GvrsElement> {
        let names: Vec<String> = self.records.specification().elements.iter()
            .map(|element| element.name.clone())
            .collect();

        names.iter().filter_map(|name| self.element(name)).collect()
    }

    fn tile_access(&self, row: usize, col: usize) -> Result<(i32, usize)> {
        let specification = self.records.specification();
        let tile_index = specification.tile_index_of_cell(row, col)?;

        let index_in_tile = (row % specification.n_rows_in_tile)
            * specification.n_cols_in_tile
            + (col % specification.n_cols_in_tile);

        Ok((tile_index, index_in_tile))
    }

    fn check_writable(&self) -> UnitResult {
        if self.writable && !self.write_failure { Ok(()) }
        else { Err(Error::NotOpenForWriting) }
    }

    /// Read one cell as a floating-point value. Unpopulated cells
    /// report the element's fill value.
    pub fn read_value(&mut self, element: &GvrsElement, row: usize, col: usize) -> Result<f32> {
        let (tile_index, index_in_tile) = self.tile_access(row, col)?;

        match self.cache.get_tile(&mut self.records, &mut self.file, tile_index, false)? {
            Some(tile) => Ok(tile.elements[element.index].value(index_in_tile)),
            None => Ok(element.fill_float),
        }
    }

    /// Read one cell as an integer. Unpopulated cells report the
    /// element's fill value.
    pub fn read_value_int(&mut self, element: &GvrsElement, row: usize, col: usize) -> Result<i32> {
        let (tile_index, index_in_tile) = self.tile_access(row, col)?;

        match self.cache.get_tile(&mut self.records, &mut self.file, tile_index, false)? {
            Some(tile) => Ok(tile.elements[element.index].int_value(index_in_tile)),
            None => Ok(element.fill_int),
        }
    }

    /// Store a floating-point value into one cell.
    pub fn write_value(&mut self, element: &GvrsElement, row: usize, col: usize, value: f32)
        -> UnitResult
    {
        self.check_writable()?;
        let (tile_index, index_in_tile) = self.tile_access(row, col)?;

        let tile = match self.cache.get_tile(&mut self.records, &mut self.file, tile_index, true) {
            Ok(tile) => tile.expect("write access always yields a tile"),
            Err(error) => {
                self.write_failure = true;
                return Err(error);
            },
        };

        tile.elements[element.index].set_value(index_in_tile, value)?;
        tile.writing_required = true;
        Ok(())
    }

    /// Store an integer value into one cell.
    pub fn write_value_int(&mut self, element: &GvrsElement, row: usize, col: usize, value: i32)
        -> UnitResult
    {
        self.check_writable()?;
        let (tile_index, index_in_tile) = self.tile_access(row, col)?;

        let tile = match self.cache.get_tile(&mut self.records, &mut self.file, tile_index, true) {
            Ok(tile) => tile.expect("write access always yields a tile"),
            Err(error) => {
                self.write_failure = true;
                return Err(error);
            },
        };

        tile.elements[element.index].set_int_value(index_in_tile, value)?;
        tile.writing_required = true;
        Ok(())
    }

    /// Read a `n_rows` by `n_cols` block of floating-point values starting
    /// at `(row, col)`, in row-major order. Cells of unpopulated tiles
    /// report the fill value.
    pub fn read_block(
        &mut self,
        element: &GvrsElement,
        row: usize, col: usize,
        n_rows: usize, n_cols: usize,
    ) -> Result<Vec<f32>>
    {
        self.gather_block(element, row, col, n_rows, n_cols, element.fill_float,
            |tile_element, cell| tile_element.value(cell))
    }

    /// Read a `n_rows` by `n_cols` block of integer values starting at
    /// `(row, col)`, in row-major order. Cells of unpopulated tiles
    /// report the fill value.
    pub fn read_block_int(
        &mut self,
        element: &GvrsElement,
        row: usize, col: usize,
        n_rows: usize, n_cols: usize,
    ) -> Result<Vec<i32>>
    {
        self.gather_block(element, row, col, n_rows, n_cols, element.fill_int,
            |tile_element, cell| tile_element.int_value(cell))
    }

    /// Walk the tile rectangle covering the requested block and copy the
    /// overlap of each tile into the output buffer.
    fn gather_block<T: Copy>(
        &mut self,
        element: &GvrsElement,
        row: usize, col: usize,
        n_rows: usize, n_cols: usize,
        fill: T,
        fetch: impl Fn(&crate::tile::element::TileElement, usize) -> T,
    ) -> Result<Vec<T>>
    {
        let specification = self.records.specification();

        if n_rows == 0 || n_cols == 0 {
            return Ok(Vec::new());
        }

        let last_row = row + n_rows - 1;
        let last_col = col + n_cols - 1;

        if last_row >= specification.n_rows_in_raster
            || last_col >= specification.n_cols_in_raster
        {
            return Err(Error::InvalidTileIndex(last_row.max(last_col) as i64));
        }

        let rows_in_tile = specification.n_rows_in_tile;
        let cols_in_tile = specification.n_cols_in_tile;
        let n_cols_of_tiles = specification.n_cols_of_tiles;

        let tile_row0 = row / rows_in_tile;
        let tile_row1 = last_row / rows_in_tile;
        let tile_col0 = col / cols_in_tile;
        let tile_col1 = last_col / cols_in_tile;

        let mut block = vec![fill; n_rows * n_cols];

        for tile_row in tile_row0 ..= tile_row1 {
            let grid_row0 = (tile_row * rows_in_tile).max(row);
            let grid_row1 = (tile_row * rows_in_tile + rows_in_tile - 1).min(last_row);

            for tile_col in tile_col0 ..= tile_col1 {
                let grid_col0 = (tile_col * cols_in_tile).max(col);
                let grid_col1 = (tile_col * cols_in_tile + cols_in_tile - 1).min(last_col);

                let tile_index = (tile_row * n_cols_of_tiles + tile_col) as i32;
                let tile = self.cache
                    .get_tile(&mut self.records, &mut self.file, tile_index, false)?;

                let tile = match tile {
                    Some(tile) => tile,
                    None => continue,   // the block buffer already holds fill
                };

                let tile_element = &tile.elements[element.index];

                for grid_row in grid_row0 ..= grid_row1 {
                    let cell_row = grid_row % rows_in_tile;

                    for grid_col in grid_col0 ..= grid_col1 {
                        let cell = cell_row * cols_in_tile + grid_col % cols_in_tile;
                        let target = (grid_row - row) * n_cols + (grid_col - col);
                        block[target] = fetch(tile_element, cell);
                    }
                }
            }
        }

        Ok(block)
    }


    // ----- metadata --------------------------------------------------------

    /// Store a metadata record, returning the record id it was filed under.
    pub fn write_metadata(&mut self, metadata: GvrsMetadata) -> Result<i32> {
        self.check_writable()?;
        self.records.write_metadata(&mut self.file, metadata)
    }

    /// Read one metadata record, if present.
    pub fn read_metadata(&mut self, name: &str, record_id: i32) -> Result<Option<GvrsMetadata>> {
        self.records.read_metadata(&mut self.file, name, record_id)
    }

    /// Read every metadata record of the given name, ordered by record id.
    pub fn read_metadata_by_name(&mut self, name: &str) -> Result<Vec<GvrsMetadata>> {
        self.records.read_metadata_by_name(&mut self.file, name)
    }

    /// Remove a metadata record, releasing its space.
    pub fn delete_metadata(&mut self, name: &str, record_id: i32) -> UnitResult {
        self.check_writable()?;
        self.records.delete_metadata(&mut self.file, name, record_id)
    }

    /// Every stored `(name, record id)` pair, in order.
    pub fn metadata_keys(&self) -> Vec<(String, i32)> {
        self.records.metadata_keys()
    }


    // ----- lifecycle -------------------------------------------------------

    /// Write every dirty tile to disk. Directories and the header are
    /// only finalized by [`close`](Self::close).
    pub fn flush(&mut self) -> UnitResult {
        if self.writable {
            if let Err(error) = self.cache.flush(&mut self.records, &mut self.file) {
                self.write_failure = true;
                return Err(error);
            }
        }

        self.file.flush()
    }

    /// Flush, finalize the directories and header, and release the file.
    pub fn close(mut self) -> UnitResult {
        self.finish_close()
    }

    fn finish_close(&mut self) -> UnitResult {
        if self.closed {
            return Ok(());
        }

        if self.writable && !self.write_failure {
            self.cache.flush(&mut self.records, &mut self.file)?;

            let positions = self.records.write_directories(&mut self.file)?;

            self.file.seek(OFFSET_FREESPACE_DIRECTORY)?;
            positions.freespace.write(&mut self.file)?;
            positions.metadata.write(&mut self.file)?;
            self.file.seek(OFFSET_TILE_DIRECTORY)?;
            positions.tiles.write(&mut self.file)?;

            self.file.seek(OFFSET_TIME_MODIFIED)?;
            current_time_millis().write(&mut self.file)?;
            0_i64.write(&mut self.file)?;    // release the writer stamp

            self.stamp_header_checksum()?;
        }

        self.file.flush()?;
        self.closed = true;
        debug!("closed {:?}", self.path);
        Ok(())
    }

    /// Recompute the header checksum slot, or zero it when disabled.
    fn stamp_header_checksum(&mut self) -> UnitResult {
        let checksum = if self.records.specification().checksums_enabled {
            checksum_over(&mut self.file, 0, self.header_size - 4)?
        } else { 0 };

        self.file.seek(self.header_size - 4)?;
        checksum.write(&mut self.file)
    }
}

impl Drop for GvrsFile {
    fn drop(&mut self) {
        if !self.closed {
            let _ = self.finish_close();
        }
    }
}


fn current_time_millis() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|elapsed| elapsed.as_millis() as i64)
        .unwrap_or_default()
}

/// A time-derived 128-bit identity. Two files created in the same
/// nanosecond on the same machine would collide, which is acceptable
/// for an identity that exists to tell files apart in pipelines.
fn generate_identity() -> (u64, u64) {
    fn mix(mut value: u64) -> u64 {
        value ^= value >> 33;
        value = value.wrapping_mul(0xff51_afd7_ed55_8ccd);
        value ^= value >> 33;
        value = value.wrapping_mul(0xc4ce_b9fe_1a85_ec53);
        value ^ (value >> 33)
    }

    let nanos = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|elapsed| elapsed.as_nanos())
        .unwrap_or_default();

    (
        mix(nanos as u64),
        mix((nanos >> 64) as u64 ^ 0x9e37_79b9_7f4a_7c15),
    )
}

/// Stream a CRC-32C over a span of the file.
fn checksum_over(file: &mut RandomAccessFile, start: u64, end: u64) -> Result<u32> {
    let mut buffer = [0_u8; 4096];
    let mut checksum = 0;
    let mut position = start;

    file.seek(start)?;
    while position < end {
        let step = ((end - position) as usize).min(buffer.len());
        file.read_exact(&mut buffer[.. step])?;
        checksum = if position == start { crc::checksum(&buffer[.. step]) }
                   else { crc::append(checksum, &buffer[.. step]) };
        position += step as u64;
    }

    Ok(checksum)
}

fn fill_as_int(element_type: &ElementType) -> i32 {
    match element_type {
        ElementType::Short { fill_value, .. } => i32::from(*fill_value),
        ElementType::Int { fill_value, .. } => *fill_value,
        ElementType::Float { fill_value, .. } =>
            if fill_value.is_nan() { i32::MIN } else { (*fill_value + 0.5).floor() as i32 },
        ElementType::IntCodedFloat(range) => range.fill_value_i,
    }
}

fn fill_as_float(element_type: &ElementType) -> f32 {
    match element_type {
        ElementType::Short { .. } => f32::NAN,
        ElementType::Int { fill_value, .. } => *fill_value as f32,
        ElementType::Float { fill_value, .. } => *fill_value,
        ElementType::IntCodedFloat(range) => range.fill_value,
    }
}


#[cfg(test)]
mod test {
    use super::*;
    use crate::spec::element::ElementSpecification;

    fn elevation_specification() -> GvrsFileSpecification {
        let mut specification = GvrsFileSpecification::new(200, 300, 50, 60).unwrap();

        specification.add_element(ElementSpecification::new("z", ElementType::Short {
            min_value: -11000, max_value: 9000, fill_value: i16::MIN,
        }).unwrap().with_unit_of_measure("m")).unwrap();

        specification
    }

    #[test]
    fn values_round_trip_in_one_session(){
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("session.gvrs");

        let mut gvrs = GvrsFile::create(&path, elevation_specification()).unwrap();
        let z = gvrs.element("z").unwrap();

        gvrs.write_value_int(&z, 0, 0, 100).unwrap();
        gvrs.write_value_int(&z, 199, 299, -200).unwrap();
        gvrs.write_value(&z, 57, 63, 321.0).unwrap();

        assert_eq!(gvrs.read_value_int(&z, 0, 0).unwrap(), 100);
        assert_eq!(gvrs.read_value_int(&z, 199, 299).unwrap(), -200);
        assert_eq!(gvrs.read_value(&z, 57, 63).unwrap(), 321.0);

        // untouched cells report fill
        assert!(gvrs.read_value(&z, 100, 100).unwrap().is_nan());
        assert_eq!(gvrs.read_value_int(&z, 100, 100).unwrap(), i32::from(i16::MIN));

        gvrs.close().unwrap();
    }

    #[test]
    fn out_of_grid_coordinates_are_rejected(){
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bounds.gvrs");

        let mut gvrs = GvrsFile::create(&path, elevation_specification()).unwrap();
        let z = gvrs.element("z").unwrap();

        assert!(matches!(gvrs.read_value(&z, 200, 0), Err(Error::InvalidTileIndex(_))));
        assert!(matches!(gvrs.write_value_int(&z, 0, 300, 1), Err(Error::InvalidTileIndex(_))));
        gvrs.close().unwrap();
    }

    #[test]
    fn read_only_files_refuse_writes(){
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("readonly.gvrs");

        GvrsFile::create(&path, elevation_specification()).unwrap().close().unwrap();

        let mut gvrs = GvrsFile::open_read_only(&path).unwrap();
        let z = gvrs.element("z").unwrap();

        assert!(matches!(
            gvrs.write_value_int(&z, 0, 0, 1),
            Err(Error::NotOpenForWriting),
        ));
        assert!(matches!(
            gvrs.write_metadata(GvrsMetadata::new_string("n", "v").unwrap()),
            Err(Error::NotOpenForWriting),
        ));
    }

    #[test]
    fn unknown_elements_do_not_resolve(){
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("elements.gvrs");

        let gvrs = GvrsFile::create(&path, elevation_specification()).unwrap();
        assert!(gvrs.element("z").is_some());
        assert!(gvrs.element("w").is_none());
        assert_eq!(gvrs.elements().len(), 1);
    }

    #[test]
    fn block_reads_cross_tile_seams(){
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("blocks.gvrs");

        let mut gvrs = GvrsFile::create(&path, elevation_specification()).unwrap();
        let z = gvrs.element("z").unwrap();

        // populate a band crossing the seam between tile columns 0 and 1
        for row in 45 .. 55 {
            for col in 55 .. 65 {
                gvrs.write_value_int(&z, row, col, (row * 100 + col) as i32).unwrap();
            }
        }

        let block = gvrs.read_block_int(&z, 45, 55, 10, 10).unwrap();
        for row_offset in 0 .. 10 {
            for col_offset in 0 .. 10 {
                let expected = ((45 + row_offset) * 100 + 55 + col_offset) as i32;
                assert_eq!(block[row_offset * 10 + col_offset], expected);
            }
        }

        // a block over unpopulated territory is all fill
        let empty = gvrs.read_block_int(&z, 150, 200, 4, 4).unwrap();
        assert!(empty.iter().all(|value| *value == i32::from(i16::MIN)));

        // blocks reaching past the raster are rejected
        assert!(gvrs.read_block_int(&z, 195, 295, 10, 10).is_err());
        gvrs.close().unwrap();
    }
}
