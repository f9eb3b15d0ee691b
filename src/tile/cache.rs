
//! A bounded write-back cache of raster tiles.
//!
//! Recency order is a doubly linked list threaded through an arena of slots,
//! with slot indices in place of pointers. A hash map resolves tile indices
//! to slots, the list head is the most recently touched tile, and the tail is
//! the next eviction victim. Dirty tiles are written through the record
//! manager before their memory is released.

use std::collections::HashMap;

use log::trace;

use crate::error::{Result, UnitResult};
use crate::io::RandomAccessFile;
use crate::record::RecordManager;
use crate::spec::GvrsFileSpecification;
use crate::tile::RasterTile;


const NIL: usize = usize::MAX;


/// Preset capacities for the tile cache.
#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub enum CacheSize {

    /// Four tiles. Suitable for strictly sequential access.
    Small,

    /// Sixteen tiles.
    Medium,

    /// One full row or column of tiles, plus slack. Suitable for
    /// row-by-row or column-by-column sweeps over the whole raster.
    Large,
}

impl CacheSize {

    /// The number of tiles this preset holds for the given raster.
    pub fn tile_capacity(self, specification: &GvrsFileSpecification) -> usize {
        match self {
            CacheSize::Small => 4,
            CacheSize::Medium => 16,
            CacheSize::Large =>
                specification.n_rows_of_tiles.max(specification.n_cols_of_tiles) + 4,
        }
    }
}


/// Access counters of one cache.
#[derive(Debug, Clone, Copy, Default)]
pub struct CacheStatistics {

    /// Number of tile requests.
    pub gets: u64,

    /// Requests satisfied from memory.
    pub hits: u64,

    /// Requests satisfied by the most recently used tile.
    pub first_hits: u64,

    /// Tiles read from disk.
    pub reads: u64,

    /// Tiles written to disk, whether by eviction or flush.
    pub writes: u64,

    /// Tiles discarded to make room.
    pub evictions: u64,
}


#[derive(Debug)]
struct Slot {
    tile: RasterTile,
    prior: usize,
    next: usize,
}


/// The bounded LRU of in-memory tiles.
#[derive(Debug)]
pub struct TileCache {
    capacity: usize,

    slots: Vec<Slot>,
    free_slots: Vec<usize>,
    by_tile_index: HashMap<i32, usize>,

    head: usize,
    tail: usize,

    /// The last tile index that was requested but absent on disk.
    /// A repeated request is answered without another directory probe.
    prior_unsatisfied_request: Option<i32>,

    statistics: CacheStatistics,
}

impl TileCache {

    /// An empty cache holding at most `capacity` tiles.
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);

        TileCache {
            capacity,
            slots: Vec::with_capacity(capacity + 1),
            free_slots: Vec::new(),
            by_tile_index: HashMap::with_capacity(capacity + 1),
            head: NIL,
            tail: NIL,
            prior_unsatisfied_request: None,
            statistics: CacheStatistics::default(),
        }
    }

    /// The access counters accumulated so far.
    pub fn statistics(&self) -> CacheStatistics {
        self.statistics
    }

    /// Number of tiles currently held.
    pub fn len(&self) -> usize {
        self.by_tile_index.len()
    }

    /// Whether the cache holds no tiles.
    pub fn is_empty(&self) -> bool {
        self.by_tile_index.is_empty()
    }

    /// The resident tile indices in most-recent-first order.
    pub fn resident_tile_indices(&self) -> Vec<i32> {
        let mut indices = Vec::with_capacity(self.len());
        let mut slot = self.head;

        while slot != NIL {
            indices.push(self.slots[slot].tile.tile_index);
            slot = self.slots[slot].next;
        }

        indices
    }

    /// Look up a tile, reading or allocating it as necessary.
    ///
    /// Returns `None` when the tile does not exist on disk and
    /// `write_access` is false. With `write_access`, a missing tile is
    /// allocated in its null state and inserted. The returned tile has
    /// been moved to the front of the recency order.
    pub fn get_tile(
        &mut self,
        records: &mut RecordManager,
        file: &mut RandomAccessFile,
        tile_index: i32,
        write_access: bool,
    ) -> Result<Option<&mut RasterTile>>
    {
        self.statistics.gets += 1;

        if !write_access && self.prior_unsatisfied_request == Some(tile_index) {
            return Ok(None);
        }

        if self.head != NIL && self.slots[self.head].tile.tile_index == tile_index {
            self.statistics.hits += 1;
            self.statistics.first_hits += 1;
            return Ok(Some(&mut self.slots[self.head].tile));
        }

        if let Some(&slot) = self.by_tile_index.get(&tile_index) {
            self.statistics.hits += 1;
            self.unlink(slot);
            self.link_at_head(slot);
            return Ok(Some(&mut self.slots[slot].tile));
        }

        if !records.tile_exists_on_disk(tile_index) {
            if !write_access {
                self.prior_unsatisfied_request = Some(tile_index);
                return Ok(None);
            }

            trace!("allocating tile {} in null state", tile_index);
            let tile = RasterTile::new(records.specification(), tile_index)?;

            if self.prior_unsatisfied_request == Some(tile_index) {
                self.prior_unsatisfied_request = None;
            }

            let slot = self.insert_at_head(tile);
            self.trim(records, file)?;
            return Ok(Some(&mut self.slots[slot].tile));
        }

        let mut tile = RasterTile::new(records.specification(), tile_index)?;
        records.read_tile(file, &mut tile)?;
        self.statistics.reads += 1;

        let slot = self.insert_at_head(tile);
        self.trim(records, file)?;
        Ok(Some(&mut self.slots[slot].tile))
    }

    /// Write every dirty tile, front to back, keeping all tiles resident.
    pub fn flush(&mut self, records: &mut RecordManager, file: &mut RandomAccessFile) -> UnitResult {
        let mut slot = self.head;

        while slot != NIL {
            let next = self.slots[slot].next;

            if self.slots[slot].tile.writing_required {
                records.write_tile(file, &mut self.slots[slot].tile)?;
                self.statistics.writes += 1;
            }

            slot = next;
        }

        Ok(())
    }

    /// Insert a fresh tile at the front of the recency order.
    /// Never evicts; call `trim` afterwards.
    fn insert_at_head(&mut self, tile: RasterTile) -> usize {
        let tile_index = tile.tile_index;

        let slot = match self.free_slots.pop() {
            Some(slot) => {
                self.slots[slot] = Slot { tile, prior: NIL, next: NIL };
                slot
            },
            None => {
                self.slots.push(Slot { tile, prior: NIL, next: NIL });
                self.slots.len() - 1
            },
        };

        self.by_tile_index.insert(tile_index, slot);
        self.link_at_head(slot);
        slot
    }

    /// Discard from the back until the capacity bound holds again. The cache
    /// intentionally exceeds its bound by one tile between insert and trim,
    /// so that a read never evicts the tile it is about to return.
    fn trim(&mut self, records: &mut RecordManager, file: &mut RandomAccessFile) -> UnitResult {
        while self.by_tile_index.len() > self.capacity {
            self.discard_tail(records, file)?;
        }

        Ok(())
    }

    fn discard_tail(&mut self, records: &mut RecordManager, file: &mut RandomAccessFile) -> UnitResult {
        let slot = self.tail;
        debug_assert_ne!(slot, NIL, "discard on an empty cache");

        if self.slots[slot].tile.writing_required {
            records.write_tile(file, &mut self.slots[slot].tile)?;
            self.statistics.writes += 1;
        }

        trace!("evicting tile {}", self.slots[slot].tile.tile_index);
        self.unlink(slot);
        self.by_tile_index.remove(&self.slots[slot].tile.tile_index);
        self.free_slots.push(slot);
        self.statistics.evictions += 1;
        Ok(())
    }

    fn unlink(&mut self, slot: usize) {
        let Slot { prior, next, .. } = self.slots[slot];

        match prior {
            NIL => self.head = next,
            prior => self.slots[prior].next = next,
        }

        match next {
            NIL => self.tail = prior,
            next => self.slots[next].prior = prior,
        }

        self.slots[slot].prior = NIL;
        self.slots[slot].next = NIL;
    }

    fn link_at_head(&mut self, slot: usize) {
        self.slots[slot].prior = NIL;
        self.slots[slot].next = self.head;

        match self.head {
            NIL => self.tail = slot,
            head => self.slots[head].prior = slot,
        }

        self.head = slot;
    }
}
