
//! The model coordinate system of a raster: bounds, a coordinate-system tag,
//! and the affine mappings between model and grid coordinates.
//!
//! Both mapping directions are persisted redundantly so that a file
//! round-trips bit-identically even when one matrix is not exactly the
//! inverse of the other.

use crate::error::{Error, Result, UnitResult};
use crate::io::{Data, Read, Write};


/// How the model coordinates of a raster are to be interpreted.
#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub enum CoordinateSystem {

    /// No coordinate system was declared.
    Unspecified,

    /// Planar x/y coordinates in an arbitrary unit.
    Cartesian,

    /// Longitude/latitude in degrees.
    Geographic,
}

impl CoordinateSystem {
    pub(crate) fn code(self) -> u8 {
        match self {
            CoordinateSystem::Unspecified => 0,
            CoordinateSystem::Cartesian => 1,
            CoordinateSystem::Geographic => 2,
        }
    }

    pub(crate) fn from_code(code: u8) -> Result<Self> {
        match code {
            0 => Ok(CoordinateSystem::Unspecified),
            1 => Ok(CoordinateSystem::Cartesian),
            2 => Ok(CoordinateSystem::Geographic),
            other => Err(Error::invalid_spec(format!("unknown coordinate system code {}", other))),
        }
    }
}


/// Whether a cell value describes the whole cell area or the point
/// at the cell's coordinates.
#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub enum CellGeometry {

    /// No geometry was declared.
    Unspecified,

    /// A value covers the area of its cell.
    Area,

    /// A value is a sample at the cell coordinate.
    Point,
}

impl CellGeometry {
    pub(crate) fn code(self) -> u8 {
        match self {
            CellGeometry::Unspecified => 0,
            CellGeometry::Area => 1,
            CellGeometry::Point => 2,
        }
    }

    pub(crate) fn from_code(code: u8) -> Result<Self> {
        match code {
            0 => Ok(CellGeometry::Unspecified),
            1 => Ok(CellGeometry::Area),
            2 => Ok(CellGeometry::Point),
            other => Err(Error::invalid_spec(format!("unknown geometry code {}", other))),
        }
    }
}


/// Six coefficients of a planar affine mapping.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AffineTransform {
    /// Scale of x into the output x.
    pub a00: f64,
    /// Scale of y into the output x.
    pub a01: f64,
    /// Offset of the output x.
    pub a02: f64,
    /// Scale of x into the output y.
    pub a10: f64,
    /// Scale of y into the output y.
    pub a11: f64,
    /// Offset of the output y.
    pub a12: f64,
}

impl AffineTransform {

    /// The mapping that leaves coordinates unchanged.
    pub const IDENTITY: AffineTransform = AffineTransform {
        a00: 1.0, a01: 0.0, a02: 0.0,
        a10: 0.0, a11: 1.0, a12: 0.0,
    };

    /// Apply the mapping to a coordinate pair.
    pub fn apply(&self, x: f64, y: f64) -> (f64, f64) {
        (
            self.a00 * x + self.a01 * y + self.a02,
            self.a10 * x + self.a11 * y + self.a12,
        )
    }

    fn write(&self, write: &mut impl Write) -> UnitResult {
        for coefficient in [self.a00, self.a01, self.a02, self.a10, self.a11, self.a12] {
            coefficient.write(write)?;
        }
        Ok(())
    }

    fn read(read: &mut impl Read) -> Result<Self> {
        Ok(AffineTransform {
            a00: f64::read(read)?, a01: f64::read(read)?, a02: f64::read(read)?,
            a10: f64::read(read)?, a11: f64::read(read)?, a12: f64::read(read)?,
        })
    }
}


/// The complete model-space description of a raster.
#[derive(Debug, Clone, PartialEq)]
pub struct ModelTransform {

    /// Interpretation of the model coordinates.
    pub coordinate_system: CoordinateSystem,

    /// Model x coordinate of the first column.
    pub x0: f64,

    /// Model y coordinate of the first row.
    pub y0: f64,

    /// Model x coordinate of the last column.
    pub x1: f64,

    /// Model y coordinate of the last row.
    pub y1: f64,

    /// Maps model coordinates to fractional grid coordinates.
    pub model_to_grid: AffineTransform,

    /// Maps fractional grid coordinates to model coordinates.
    pub grid_to_model: AffineTransform,
}

impl ModelTransform {

    /// A transform that equates model and grid coordinates.
    pub fn unspecified() -> Self {
        ModelTransform {
            coordinate_system: CoordinateSystem::Unspecified,
            x0: 0.0, y0: 0.0, x1: 0.0, y1: 0.0,
            model_to_grid: AffineTransform::IDENTITY,
            grid_to_model: AffineTransform::IDENTITY,
        }
    }

    /// Define an axis-aligned mapping from the model rectangle
    /// `(x0, y0)..(x1, y1)` onto a grid of the given cell counts.
    /// Row zero corresponds to `y0` and column zero to `x0`.
    pub fn axis_aligned(
        coordinate_system: CoordinateSystem,
        x0: f64, y0: f64, x1: f64, y1: f64,
        n_rows: usize, n_cols: usize,
    ) -> Result<Self>
    {
        if n_rows < 2 || n_cols < 2 {
            return Err(Error::invalid_spec("model mapping requires at least a 2x2 grid"));
        }

        if !(x0.is_finite() && y0.is_finite() && x1.is_finite() && y1.is_finite()) {
            return Err(Error::invalid_spec("model bounds must be finite"));
        }

        if x0 == x1 || y0 == y1 {
            return Err(Error::invalid_spec("model bounds describe an empty rectangle"));
        }

        let cell_width = (x1 - x0) / (n_cols - 1) as f64;
        let cell_height = (y1 - y0) / (n_rows - 1) as f64;

        Ok(ModelTransform {
            coordinate_system,
            x0, y0, x1, y1,

            model_to_grid: AffineTransform {
                a00: 1.0 / cell_width, a01: 0.0, a02: -x0 / cell_width,
                a10: 0.0, a11: 1.0 / cell_height, a12: -y0 / cell_height,
            },

            grid_to_model: AffineTransform {
                a00: cell_width, a01: 0.0, a02: x0,
                a10: 0.0, a11: cell_height, a12: y0,
            },
        })
    }

    /// Map a model coordinate to a fractional `(row, column)` grid coordinate.
    pub fn map_model_to_grid(&self, x: f64, y: f64) -> (f64, f64) {
        let (column, row) = self.model_to_grid.apply(x, y);
        (row, column)
    }

    /// Map a `(row, column)` grid coordinate to its model coordinate.
    pub fn map_grid_to_model(&self, row: f64, column: f64) -> (f64, f64) {
        self.grid_to_model.apply(column, row)
    }

    pub(crate) fn write(&self, write: &mut impl Write) -> UnitResult {
        self.x0.write(write)?;
        self.y0.write(write)?;
        self.x1.write(write)?;
        self.y1.write(write)?;
        self.model_to_grid.write(write)?;
        self.grid_to_model.write(write)
    }

    pub(crate) fn read(read: &mut impl Read, coordinate_system: CoordinateSystem) -> Result<Self> {
        Ok(ModelTransform {
            coordinate_system,
            x0: f64::read(read)?,
            y0: f64::read(read)?,
            x1: f64::read(read)?,
            y1: f64::read(read)?,
            model_to_grid: AffineTransform::read(read)?,
            grid_to_model: AffineTransform::read(read)?,
        })
    }
}
