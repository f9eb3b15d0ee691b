
//! Record lifecycle and free-space management.
//!
//! Everything after the file header is a record: 8-byte aligned, sized in
//! multiples of 8, framed as `[size i32][type u8][3 reserved]` up front and a
//! CRC-32C trailer at the end. The record manager hands out file space
//! first-fit from an ordered free list, coalesces neighbors on release, and
//! performs all tile, metadata, and directory io on top of that framing.

use std::collections::BTreeMap;

use log::{debug, warn};

use crate::codec::CodecMaster;
use crate::crc;
use crate::directory::{TileDirectory, COMPACT_OFFSET_LIMIT};
use crate::error::{usize_to_i32, Error, Result, UnitResult};
use crate::io::{Data, RandomAccessFile, Read};
use crate::metadata::GvrsMetadata;
use crate::spec::GvrsFileSpecification;
use crate::tile::RasterTile;


/// Bytes of the `[size][type][reserved]` frame in front of every record.
pub const RECORD_HEADER_SIZE: u64 = 8;

/// Frame plus the 4-byte checksum trailer.
pub const RECORD_OVERHEAD_SIZE: u64 = 12;

/// A free block is only split when the leftover would be at least this large.
const MIN_SPLIT_SURPLUS: u64 = 32;

/// Version byte of serialized tile-directory records.
const TILE_DIRECTORY_VERSION: u8 = 1;


/// The role of a record, stored in the fifth byte of its frame.
#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub enum RecordType {
    /// Space available for reallocation.
    Freespace,
    /// A metadata record.
    Metadata,
    /// A tile record.
    Tile,
    /// The persisted free list.
    FreespaceDirectory,
    /// The persisted metadata directory.
    MetadataDirectory,
    /// The persisted tile directory.
    TileDirectory,
}

impl RecordType {
    pub(crate) fn code(self) -> u8 {
        match self {
            RecordType::Freespace => 0,
            RecordType::Metadata => 1,
            RecordType::Tile => 2,
            RecordType::FreespaceDirectory => 3,
            RecordType::MetadataDirectory => 4,
            RecordType::TileDirectory => 5,
        }
    }

    pub(crate) fn from_code(code: u8) -> Result<Self> {
        match code {
            0 => Ok(RecordType::Freespace),
            1 => Ok(RecordType::Metadata),
            2 => Ok(RecordType::Tile),
            3 => Ok(RecordType::FreespaceDirectory),
            4 => Ok(RecordType::MetadataDirectory),
            5 => Ok(RecordType::TileDirectory),
            other => Err(Error::InvalidRecordType(other)),
        }
    }
}


/// One reusable span of file space.
#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub struct FreeNode {

    /// File position of the free record's frame.
    pub position: u64,

    /// Total size of the free record, including frame and checksum.
    pub size: u64,
}


/// File positions of the three directory records written at close.
#[derive(Debug, Clone, Copy, Default)]
pub struct DirectoryPositions {

    /// Content position of the free-space directory record.
    pub freespace: u64,

    /// Content position of the metadata directory record.
    pub metadata: u64,

    /// Content position of the tile directory record.
    pub tiles: u64,
}


fn round_up_multiple_of_8(value: u64) -> u64 {
    (value + 7) & !7
}


/// Allocates, frees, reads, and writes the records of one file.
#[derive(Debug)]
pub struct RecordManager {
    specification: GvrsFileSpecification,
    codec: CodecMaster,

    /// First file position that may hold a record.
    base_position: u64,

    checksums_enabled: bool,

    /// Reusable spans, strictly ascending by position, never adjacent.
    free_list: Vec<FreeNode>,

    tile_directory: TileDirectory,

    /// Content position of every metadata record, ordered by name and id.
    metadata_directory: BTreeMap<(String, i32), u64>,

    directory_probes: u64,
}

impl RecordManager {

    /// A manager for a file whose records begin at `base_position`
    /// (the size of the file header).
    pub fn new(specification: GvrsFileSpecification, codec: CodecMaster, base_position: u64) -> Self {
        let checksums_enabled = specification.checksums_enabled;
        let tile_directory = TileDirectory::new(&specification);

        RecordManager {
            specification,
            codec,
            base_position,
            checksums_enabled,
            free_list: Vec::new(),
            tile_directory,
            metadata_directory: BTreeMap::new(),
            directory_probes: 0,
        }
    }

    /// The grid and element description this manager serves.
    pub fn specification(&self) -> &GvrsFileSpecification {
        &self.specification
    }

    /// The resolved codecs of this file.
    pub fn codec(&self) -> &CodecMaster {
        &self.codec
    }

    /// The tile directory in its current representation.
    pub fn tile_directory(&self) -> &TileDirectory {
        &self.tile_directory
    }

    /// The current free list, for inspection.
    pub fn free_nodes(&self) -> &[FreeNode] {
        &self.free_list
    }

    /// Number of tile-directory probes performed so far.
    pub fn directory_probe_count(&self) -> u64 {
        self.directory_probes
    }

    /// Whether a tile has a record in the file.
    pub fn tile_exists_on_disk(&mut self, tile_index: i32) -> bool {
        self.directory_probes += 1;
        self.tile_directory.is_file_position_set(tile_index)
    }


    // ----- allocation ------------------------------------------------------

    /// Reserve a record able to hold `size_of_content` payload bytes, write
    /// its frame, and return the content position (just after the frame).
    ///
    /// The first free block that fits exactly, or with enough surplus to
    /// leave a usable leftover, is taken; ties go to the lowest position.
    /// Otherwise the record lands at the end of the file, absorbing a
    /// trailing free block when one is there.
    pub fn alloc_file_space(
        &mut self,
        file: &mut RandomAccessFile,
        size_of_content: usize,
        record_type: RecordType,
    ) -> Result<u64>
    {
        let size_to_store = round_up_multiple_of_8(size_of_content as u64 + RECORD_OVERHEAD_SIZE);
        let min_size_for_split = size_to_store + MIN_SPLIT_SURPLUS;

        let found = self.free_list.iter().position(|node|
            node.size == size_to_store || node.size >= min_size_for_split);

        let (position, record_size) = match found {
            Some(index) => {
                let node = self.free_list.remove(index);

                if node.size > size_to_store {
                    let leftover = FreeNode {
                        position: node.position + size_to_store,
                        size: node.size - size_to_store,
                    };

                    self.write_free_record(file, leftover.position, leftover.size)?;

                    let insertion = self.free_list
                        .partition_point(|other| other.position < leftover.position);
                    self.free_list.insert(insertion, leftover);
                }

                (node.position, size_to_store)
            },

            None => {
                let end_of_file = round_up_multiple_of_8(file.length()).max(self.base_position);

                // a trailing free block is absorbed rather than skipped over;
                // a slightly oversized one becomes padding inside the record
                // so that no span of the file is orphaned
                match self.free_list.last().copied() {
                    Some(last) if last.position + last.size == end_of_file => {
                        self.free_list.pop();
                        (last.position, size_to_store.max(last.size))
                    },
                    _ => (end_of_file, size_to_store),
                }
            },
        };

        if record_size > i32::MAX as u64 {
            return Err(Error::invalid_spec("record larger than 2^31 bytes"));
        }

        file.seek(position)?;
        (record_size as i32).write(file)?;
        record_type.code().write(file)?;
        u8::write_slice(file, &[0_u8; 3])?;

        // claim the full span up front, so that the next allocation starts
        // beyond this record even if the content has not been written yet;
        // `finish_record` replaces this placeholder with the real checksum
        file.seek(position + record_size - 4)?;
        0_u32.write(file)?;

        debug!(
            "allocated {:?} record of {} bytes at {}",
            record_type, record_size, position,
        );

        Ok(position + RECORD_HEADER_SIZE)
    }

    /// Release the record whose content starts at `content_position`,
    /// merging it with any free neighbor so that no two free records
    /// are ever adjacent.
    pub fn dealloc_file_space(&mut self, file: &mut RandomAccessFile, content_position: u64)
        -> UnitResult
    {
        let record_position = content_position - RECORD_HEADER_SIZE;

        file.seek(record_position)?;
        let record_size = i32::read(file)?;
        if record_size <= 0 || record_size % 8 != 0 {
            return Err(Error::invalid_spec("dealloc on a malformed record"));
        }
        let record_size = record_size as u64;

        let index = self.free_list.partition_point(|node| node.position < record_position);

        let prior_abuts = index > 0
            && self.free_list[index - 1].position + self.free_list[index - 1].size == record_position;

        let next_abuts = index < self.free_list.len()
            && record_position + record_size == self.free_list[index].position;

        let merged = if prior_abuts {
            self.free_list[index - 1].size += record_size;

            if next_abuts {
                let next = self.free_list.remove(index);
                self.free_list[index - 1].size += next.size;
            }

            self.free_list[index - 1]
        }
        else if next_abuts {
            self.free_list[index].position = record_position;
            self.free_list[index].size += record_size;
            self.free_list[index]
        }
        else {
            let node = FreeNode { position: record_position, size: record_size };
            self.free_list.insert(index, node);
            node
        };

        debug!("freed {} bytes at {}, free span now {:?}", record_size, record_position, merged);
        self.write_free_record(file, merged.position, merged.size)
    }

    /// Write a free-space frame, and its header-only checksum, to disk.
    fn write_free_record(&self, file: &mut RandomAccessFile, position: u64, size: u64)
        -> UnitResult
    {
        file.seek(position)?;
        (size as i32).write(file)?;
        RecordType::Freespace.code().write(file)?;
        u8::write_slice(file, &[0_u8; 3])?;

        if self.checksums_enabled {
            let mut header = [0_u8; 8];
            header[.. 4].copy_from_slice(&(size as i32).to_le_bytes());

            let checksum = crc::free_space_checksum(
                &header, (size - RECORD_OVERHEAD_SIZE) as usize);

            file.seek(position + size - 4)?;
            checksum.write(file)?;
        }

        Ok(())
    }

    /// Zero-fill the slack between the written content and the checksum
    /// slot, then stamp the record checksum (or zero when disabled).
    pub fn finish_record(
        &mut self,
        file: &mut RandomAccessFile,
        content_position: u64,
        content_size: usize,
    ) -> UnitResult
    {
        let record_position = content_position - RECORD_HEADER_SIZE;

        file.seek(record_position)?;
        let record_size = i32::read(file)? as u64;

        let pad_start = content_position + content_size as u64;
        let record_end = record_position + record_size;

        file.seek(pad_start)?;
        let zeroes = vec![0_u8; (record_end - pad_start) as usize];
        u8::write_slice(file, &zeroes)?;

        if self.checksums_enabled {
            let checksum = self.checksum_over(file, record_position, record_end - 4)?;
            file.seek(record_end - 4)?;
            checksum.write(file)?;
        }

        Ok(())
    }

    /// Stream a CRC-32C over a span of the file.
    fn checksum_over(&self, file: &mut RandomAccessFile, start: u64, end: u64) -> Result<u32> {
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


    // ----- tiles -----------------------------------------------------------

    /// Write a tile to the file, choosing between the compressed and the
    /// standard form, or elide it entirely when it holds no valid data.
    /// Clears the tile's dirty flag on success.
    pub fn write_tile(&mut self, file: &mut RandomAccessFile, tile: &mut RasterTile) -> UnitResult {
        let tile_index = tile.tile_index;
        let mut existing = self.tile_directory.file_position(tile_index);

        // a tile of nothing but fill values is stored as "does not exist"
        if !tile.has_valid_data() {
            if existing != 0 {
                self.dealloc_file_space(file, existing)?;
                self.tile_directory.set_file_position(tile_index, 0)?;
            }

            tile.writing_required = false;
            return Ok(());
        }

        let standard_payload = 4 + tile.standard_payload_size();

        if self.codec.is_enabled() {
            // the compressed size will differ from the stored record,
            // so the old record cannot be rewritten in place
            if existing != 0 {
                self.dealloc_file_space(file, existing)?;
                self.tile_directory.set_file_position(tile_index, 0)?;
                existing = 0;
            }

            let packing = tile.compressed_packing(&self.codec)?;

            if 4 + packing.len() < standard_payload {
                let content_size = 4 + packing.len();
                let content_position =
                    self.alloc_file_space(file, content_size, RecordType::Tile)?;

                file.seek(content_position)?;
                tile_index.write(file)?;
                u8::write_slice(file, &packing)?;
                self.finish_record(file, content_position, content_size)?;

                self.store_tile_position(tile_index, content_position)?;
                tile.writing_required = false;
                return Ok(());
            }
        }

        let content_position = if existing != 0 { existing } else {
            self.alloc_file_space(file, standard_payload, RecordType::Tile)?
        };

        file.seek(content_position)?;
        tile_index.write(file)?;
        tile.write_standard_payload(file)?;
        self.finish_record(file, content_position, standard_payload)?;

        if existing == 0 {
            self.store_tile_position(tile_index, content_position)?;
        }

        tile.writing_required = false;
        Ok(())
    }

    /// Record a tile position, promoting the directory to extended
    /// addressing the first time a position passes the compact limit.
    fn store_tile_position(&mut self, tile_index: i32, content_position: u64) -> UnitResult {
        if content_position >= COMPACT_OFFSET_LIMIT
            && !self.tile_directory.uses_extended_file_offset()
        {
            debug!("promoting tile directory to extended offsets");
            self.tile_directory = self.tile_directory.to_extended();
        }

        self.tile_directory.set_file_position(tile_index, content_position)
    }

    /// Fill a tile from its record, or reset it to the null state
    /// when it has no record.
    pub fn read_tile(&mut self, file: &mut RandomAccessFile, tile: &mut RasterTile) -> UnitResult {
        let position = self.tile_directory.file_position(tile.tile_index);

        if position == 0 {
            tile.set_to_null_state();
            tile.writing_required = false;
            return Ok(());
        }

        file.seek(position)?;

        let stored_index = i32::read(file)?;
        if stored_index != tile.tile_index {
            return Err(Error::InvalidTileIndex(i64::from(stored_index)));
        }

        tile.read_payload(&self.codec, file)
    }


    // ----- metadata --------------------------------------------------------

    /// Store a metadata record and return the record id it was filed under.
    ///
    /// A record with a unique id replaces any stored record under the same
    /// name and id. Otherwise the next id after the largest stored one for
    /// that name is assigned, starting from 1.
    pub fn write_metadata(&mut self, file: &mut RandomAccessFile, metadata: GvrsMetadata)
        -> Result<i32>
    {
        let mut metadata = metadata;

        if metadata.unique_record_id {
            let key = metadata.key();
            if let Some(old_position) = self.metadata_directory.remove(&key) {
                self.dealloc_file_space(file, old_position)?;
            }
        }
        else {
            let name = metadata.name.clone();
            let largest = self.metadata_directory
                .range((name.clone(), i32::MIN) ..= (name, i32::MAX))
                .map(|((_, record_id), _)| *record_id)
                .next_back();

            metadata.record_id = match largest {
                None => 1,
                Some(i32::MAX) => return Err(Error::invalid_spec("metadata record ids exhausted")),
                Some(largest) => largest + 1,
            };
        }

        let mut payload = Vec::with_capacity(metadata.payload_size());
        metadata.write(&mut payload)?;

        let content_position = self.alloc_file_space(file, payload.len(), RecordType::Metadata)?;
        file.seek(content_position)?;
        u8::write_slice(file, &payload)?;
        self.finish_record(file, content_position, payload.len())?;

        self.metadata_directory.insert(metadata.key(), content_position);
        Ok(metadata.record_id)
    }

    /// Read one metadata record, if present.
    pub fn read_metadata(&mut self, file: &mut RandomAccessFile, name: &str, record_id: i32)
        -> Result<Option<GvrsMetadata>>
    {
        let position = match self.metadata_directory.get(&(name.to_string(), record_id)) {
            Some(position) => *position,
            None => return Ok(None),
        };

        file.seek(position)?;
        Ok(Some(GvrsMetadata::read(file)?))
    }

    /// Read every metadata record sharing a name, ordered by record id.
    pub fn read_metadata_by_name(&mut self, file: &mut RandomAccessFile, name: &str)
        -> Result<Vec<GvrsMetadata>>
    {
        let positions: Vec<u64> = self.metadata_directory
            .range((name.to_string(), i32::MIN) ..= (name.to_string(), i32::MAX))
            .map(|(_, position)| *position)
            .collect();

        let mut records = Vec::with_capacity(positions.len());
        for position in positions {
            file.seek(position)?;
            records.push(GvrsMetadata::read(file)?);
        }

        Ok(records)
    }

    /// Remove a metadata record, releasing its space.
    pub fn delete_metadata(&mut self, file: &mut RandomAccessFile, name: &str, record_id: i32)
        -> UnitResult
    {
        if let Some(position) = self.metadata_directory.remove(&(name.to_string(), record_id)) {
            self.dealloc_file_space(file, position)?;
        }

        Ok(())
    }

    /// Every stored `(name, record id)` pair, in order.
    pub fn metadata_keys(&self) -> Vec<(String, i32)> {
        self.metadata_directory.keys().cloned().collect()
    }


    // ----- directory records -----------------------------------------------

    /// Persist the free list, metadata directory, and tile directory as
    /// records, returning their content positions for the file header.
    ///
    /// The free-space record is allocated before its content is computed:
    /// the allocation itself may consume a free node, and the list that is
    /// serialized must be the list that is true once the record exists.
    pub fn write_directories(&mut self, file: &mut RandomAccessFile) -> Result<DirectoryPositions> {
        let mut positions = DirectoryPositions::default();

        // tile directory: preamble + offset rectangle
        {
            let content_size = 8 + self.tile_directory.storage_size();
            let content_position =
                self.alloc_file_space(file, content_size, RecordType::TileDirectory)?;

            let mut payload = Vec::with_capacity(content_size);
            TILE_DIRECTORY_VERSION.write(&mut payload)?;
            (self.tile_directory.uses_extended_file_offset() as u8).write(&mut payload)?;
            u8::write_slice(&mut payload, &[0_u8; 6])?;
            self.tile_directory.write_tile_positions(&mut payload)?;

            file.seek(content_position)?;
            u8::write_slice(file, &payload)?;
            self.finish_record(file, content_position, payload.len())?;
            positions.tiles = content_position;
        }

        // metadata directory: count, then (position, name, record id) entries
        {
            let content_size = 4 + self.metadata_directory.iter()
                .map(|((name, _), _)| 8 + 2 + name.len() + 4)
                .sum::<usize>();

            let content_position =
                self.alloc_file_space(file, content_size, RecordType::MetadataDirectory)?;

            let mut payload = Vec::with_capacity(content_size);
            usize_to_i32(self.metadata_directory.len()).write(&mut payload)?;
            for ((name, record_id), position) in &self.metadata_directory {
                position.write(&mut payload)?;
                crate::io::write_utf(&mut payload, name)?;
                record_id.write(&mut payload)?;
            }

            file.seek(content_position)?;
            u8::write_slice(file, &payload)?;
            self.finish_record(file, content_position, payload.len())?;
            positions.metadata = content_position;
        }

        // free-space directory: sized for the list before allocation, which
        // is an upper bound because allocation never grows the list
        {
            let content_size = 4 + 16 * self.free_list.len();
            let content_position =
                self.alloc_file_space(file, content_size, RecordType::FreespaceDirectory)?;

            let mut payload = Vec::with_capacity(content_size);
            usize_to_i32(self.free_list.len()).write(&mut payload)?;
            for node in &self.free_list {
                node.position.write(&mut payload)?;
                node.size.write(&mut payload)?;
            }

            file.seek(content_position)?;
            u8::write_slice(file, &payload)?;
            self.finish_record(file, content_position, payload.len())?;
            positions.freespace = content_position;
        }

        Ok(positions)
    }

    /// Restore the runtime structures from the directory records written
    /// by [`write_directories`](Self::write_directories).
    pub fn read_directories(
        &mut self,
        file: &mut RandomAccessFile,
        positions: DirectoryPositions,
    ) -> UnitResult
    {
        if positions.freespace != 0 {
            file.seek(positions.freespace)?;

            let count = i32::read(file)?;
            if count < 0 { return Err(Error::invalid_spec("negative free-list length")); }

            self.free_list.clear();
            for _ in 0 .. count {
                let position = u64::read(file)?;
                let size = u64::read(file)?;
                self.free_list.push(FreeNode { position, size });
            }
        }

        if positions.metadata != 0 {
            file.seek(positions.metadata)?;

            let count = i32::read(file)?;
            if count < 0 { return Err(Error::invalid_spec("negative metadata directory length")); }

            self.metadata_directory.clear();
            for _ in 0 .. count {
                let position = u64::read(file)?;
                let name = crate::io::read_utf(file)?;
                let record_id = i32::read(file)?;
                self.metadata_directory.insert((name, record_id), position);
            }
        }

        if positions.tiles != 0 {
            file.seek(positions.tiles)?;

            let _version = u8::read(file)?;
            let extended = u8::read(file)? != 0;
            crate::io::skip_bytes(file, 6)?;

            self.tile_directory =
                TileDirectory::read_tile_positions(file, &self.specification, extended)?;
        }

        Ok(())
    }

    /// Release the three directory records after reading them; they are
    /// regenerated at close. Positions of zero are ignored.
    pub fn dealloc_directories(
        &mut self,
        file: &mut RandomAccessFile,
        positions: DirectoryPositions,
    ) -> UnitResult
    {
        for position in [positions.freespace, positions.metadata, positions.tiles] {
            if position != 0 {
                self.dealloc_file_space(file, position)?;
            }
        }

        Ok(())
    }


    // ----- recovery --------------------------------------------------------

    /// Rebuild the free list, tile directory, and metadata directory by
    /// walking every record from the content base to the end of the file.
    /// Used when a file was not closed cleanly and the persisted
    /// directories are missing.
    ///
    /// The walk is best effort: a record failing its checksum is skipped,
    /// and two consecutive failures terminate the scan.
    pub fn scan_file_for_tiles(&mut self, file: &mut RandomAccessFile) -> UnitResult {
        self.free_list.clear();
        self.metadata_directory.clear();
        self.tile_directory = TileDirectory::new(&self.specification);

        let file_length = file.length();
        let mut position = self.base_position;
        let mut consecutive_failures = 0;
        let mut stale_directories = Vec::new();

        while position + RECORD_OVERHEAD_SIZE <= file_length {
            file.seek(position)?;

            let record_size = i32::read(file)?;
            if record_size < RECORD_OVERHEAD_SIZE as i32
                || record_size % 8 != 0
                || position + record_size as u64 > file_length
            {
                warn!("scan stopped at {}: malformed record frame", position);
                break;
            }

            let record_size = record_size as u64;
            let record_type = RecordType::from_code(u8::read(file)?)?;

            if self.checksums_enabled && !self.verify_record(file, position, record_size, record_type)? {
                warn!("scan skipping {:?} record at {}: checksum mismatch", record_type, position);
                consecutive_failures += 1;

                if consecutive_failures >= 2 {
                    return Err(Error::RecordChecksumMismatch { position });
                }

                position += record_size;
                continue;
            }

            consecutive_failures = 0;
            let content_position = position + RECORD_HEADER_SIZE;

            match record_type {
                RecordType::Freespace => {
                    self.absorb_free_span(position, record_size);
                },

                RecordType::Tile => {
                    file.seek(content_position)?;
                    let tile_index = i32::read(file)?;

                    if tile_index < 0 || tile_index as usize >= self.specification.tile_count() {
                        return Err(Error::InvalidTileIndex(i64::from(tile_index)));
                    }

                    self.store_tile_position(tile_index, content_position)?;
                },

                RecordType::Metadata => {
                    file.seek(content_position)?;
                    let metadata = GvrsMetadata::read(file)?;
                    self.metadata_directory.insert(metadata.key(), content_position);
                },

                // stale directory records become free space
                RecordType::FreespaceDirectory
                | RecordType::MetadataDirectory
                | RecordType::TileDirectory => {
                    stale_directories.push((position, record_size));
                    self.absorb_free_span(position, record_size);
                },
            }

            position += record_size;
        }

        for (position, size) in stale_directories {
            self.write_free_record(file, position, size)?;
        }

        debug!(
            "scan recovered {} tiles, {} metadata records, {} free spans",
            self.tile_directory.count_of_populated_tiles(),
            self.metadata_directory.len(),
            self.free_list.len(),
        );

        Ok(())
    }

    /// Append a span to the free list, merging with a trailing neighbor.
    /// The scan visits positions in ascending order, so only the last
    /// node can ever abut.
    fn absorb_free_span(&mut self, position: u64, size: u64) {
        match self.free_list.last_mut() {
            Some(last) if last.position + last.size == position => last.size += size,
            _ => self.free_list.push(FreeNode { position, size }),
        }
    }

    /// Check a record's stored checksum. Free-space records cover only
    /// their frame, everything else covers the whole record.
    fn verify_record(
        &self,
        file: &mut RandomAccessFile,
        position: u64,
        record_size: u64,
        record_type: RecordType,
    ) -> Result<bool>
    {
        let computed = if record_type == RecordType::Freespace {
            let mut header = [0_u8; 8];
            file.seek(position)?;
            file.read_exact(&mut header)?;
            crc::free_space_checksum(&header, (record_size - RECORD_OVERHEAD_SIZE) as usize)
        }
        else {
            self.checksum_over(file, position, position + record_size - 4)?
        };

        file.seek(position + record_size - 4)?;
        let stored = u32::read(file)?;
        Ok(stored == computed)
    }
}
