
//! Read and write gvrs raster files.
//!
//! Gvrs (gridded virtual raster store) is a random-access file format for 2D
//! raster grids that are too large to hold in memory: elevation and
//! bathymetry models, and gridded scientific data in general. The file is
//! organized as tiles; a write-back tile cache, a free-space allocator,
//! per-tile compression codecs, and a sparse tile directory form the engine.
//!
//! ```no_run
//! use gvrs::prelude::*;
//!
//! fn main() -> gvrs::error::Result<()> {
//!     let mut specification = GvrsFileSpecification::new(722, 1442, 90, 120)?;
//!     specification.add_element(ElementSpecification::new("z", ElementType::Short {
//!         min_value: -11000, max_value: 9000, fill_value: i16::MIN,
//!     })?)?;
//!     specification.enable_data_compression();
//!
//!     let mut gvrs = GvrsFile::create("etopo.gvrs", specification)?;
//!     let z = gvrs.element("z").expect("declared above");
//!     gvrs.write_value_int(&z, 100, 200, 1357)?;
//!     gvrs.close()?;
//!
//!     let mut gvrs = GvrsFile::open_read_only("etopo.gvrs")?;
//!     let z = gvrs.element("z").expect("stored in the file");
//!     assert_eq!(gvrs.read_value_int(&z, 100, 200)?, 1357);
//!     Ok(())
//! }
//! ```

#![warn(
    rust_2018_idioms,
    future_incompatible,
    unused_extern_crates,
    unused,

    missing_docs,
    missing_copy_implementations,
    missing_debug_implementations,
)]

#![deny(
    unused_variables,
    unused_assignments,
    dead_code,
    unused_must_use,
    trivial_numeric_casts,
)]

#![forbid(unsafe_code)]


pub mod io; // public to allow custom record inspection tooling

pub mod codec;
pub mod crc;
pub mod directory;
pub mod error;
pub mod file;
pub mod metadata;
pub mod record;
pub mod spec;
pub mod tile;

/// Re-exports of the types commonly required for reading
/// and writing a gvrs raster.
pub mod prelude {

    // main exports
    pub use crate::file::{GvrsElement, GvrsFile};
    pub use crate::spec::GvrsFileSpecification;

    // secondary data types
    pub use crate::codec::{Codec, CodecRegistry};
    pub use crate::error::{Error, Result};
    pub use crate::metadata::{GvrsMetadata, MetadataType};
    pub use crate::spec::element::{ElementSpecification, ElementType, IntCodedFloatRange};
    pub use crate::spec::transform::{CellGeometry, CoordinateSystem, ModelTransform};
    pub use crate::tile::cache::CacheSize;
}
