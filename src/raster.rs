use anyhow::{bail, Result};
use geo::{Coord, Rect};
use ndarray::{s, Array2};

/// A rectangular view into a categorical raster, placed in the raster's
/// projected CRS. Row 0 is the top of the window (y decreasing), and
/// `origin` is the outer corner of cell (0, 0).
#[derive(Debug, Clone)]
pub struct RasterWindow {
    data: Array2<u8>,
    origin: Coord<f64>, // top-left corner, CRS units (meters)
    cell_size: f64,
    nodata: u8,
}

impl RasterWindow {
    pub fn new(data: Array2<u8>, origin: Coord<f64>, cell_size: f64, nodata: u8) -> Self {
        Self { data, origin, cell_size, nodata }
    }

    /// A window with no cells; still carries grid parameters.
    pub fn empty(origin: Coord<f64>, cell_size: f64, nodata: u8) -> Self {
        Self { data: Array2::zeros((0, 0)), origin, cell_size, nodata }
    }

    #[inline] pub fn nrows(&self) -> usize { self.data.nrows() }

    #[inline] pub fn ncols(&self) -> usize { self.data.ncols() }

    #[inline] pub fn is_empty(&self) -> bool { self.data.is_empty() }

    #[inline] pub fn nodata(&self) -> u8 { self.nodata }

    #[inline] pub fn cell_size(&self) -> f64 { self.cell_size }

    #[inline] pub fn data(&self) -> &Array2<u8> { &self.data }

    /// Center coordinate of cell (row, col), the sample point used for
    /// polygon membership.
    #[inline]
    pub fn cell_center(&self, row: usize, col: usize) -> Coord<f64> {
        Coord {
            x: self.origin.x + (col as f64 + 0.5) * self.cell_size,
            y: self.origin.y - (row as f64 + 0.5) * self.cell_size,
        }
    }

    /// Geographic extent covered by the window's cells.
    pub fn extent(&self) -> Rect<f64> {
        Rect::new(
            Coord {
                x: self.origin.x,
                y: self.origin.y - self.nrows() as f64 * self.cell_size,
            },
            Coord {
                x: self.origin.x + self.ncols() as f64 * self.cell_size,
                y: self.origin.y,
            },
        )
    }
}

/// Lazy, extent-keyed read access to a classified raster. Implementations
/// must be shareable across the scheduler's workers.
pub trait RasterSource: Sync {
    /// Grid resolution in CRS units.
    fn cell_size(&self) -> f64;

    /// The smallest cell-aligned window covering the intersection of
    /// `extent` with the raster. Disjoint extents yield an empty window,
    /// not an error.
    fn crop(&self, extent: &Rect<f64>) -> Result<RasterWindow>;
}

/// A raster held fully in memory. The pipeline only ever reads windows
/// cropped to one block's extent, so this also stands in for tiled
/// sources in tests.
#[derive(Debug, Clone)]
pub struct MemoryRaster {
    grid: RasterWindow,
}

impl MemoryRaster {
    pub fn new(data: Array2<u8>, origin: Coord<f64>, cell_size: f64, nodata: u8) -> Result<Self> {
        if !(cell_size > 0.0) {
            bail!("raster cell size must be positive, got {cell_size}");
        }
        Ok(Self { grid: RasterWindow::new(data, origin, cell_size, nodata) })
    }

    pub fn extent(&self) -> Rect<f64> { self.grid.extent() }
}

impl RasterSource for MemoryRaster {
    fn cell_size(&self) -> f64 { self.grid.cell_size() }

    fn crop(&self, extent: &Rect<f64>) -> Result<RasterWindow> {
        let cell = self.grid.cell_size();
        let corner = self.grid.origin;

        // Cell index range covering the requested extent, clamped to the grid.
        let col0 = ((extent.min().x - corner.x) / cell).floor() as isize;
        let col1 = ((extent.max().x - corner.x) / cell).ceil() as isize;
        let row0 = ((corner.y - extent.max().y) / cell).floor() as isize;
        let row1 = ((corner.y - extent.min().y) / cell).ceil() as isize;

        let col0 = col0.clamp(0, self.grid.ncols() as isize) as usize;
        let col1 = col1.clamp(0, self.grid.ncols() as isize) as usize;
        let row0 = row0.clamp(0, self.grid.nrows() as isize) as usize;
        let row1 = row1.clamp(0, self.grid.nrows() as isize) as usize;

        if row1 <= row0 || col1 <= col0 {
            return Ok(RasterWindow::empty(corner, cell, self.grid.nodata()));
        }

        let data = self.grid.data().slice(s![row0..row1, col0..col1]).to_owned();
        let window_origin = Coord {
            x: corner.x + col0 as f64 * cell,
            y: corner.y - row0 as f64 * cell,
        };

        Ok(RasterWindow::new(data, window_origin, cell, self.grid.nodata()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    fn raster_4x4() -> MemoryRaster {
        // Top-left corner at (0, 40), 10m cells, nodata 0.
        let data = array![
            [11, 11, 21, 21],
            [11, 41, 41, 21],
            [41, 41, 41, 90],
            [ 0,  0, 90, 90],
        ];
        MemoryRaster::new(data, Coord { x: 0.0, y: 40.0 }, 10.0, 0).unwrap()
    }

    #[test]
    fn cell_centers() {
        let raster = raster_4x4();
        let window = raster.crop(&raster.extent()).unwrap();
        assert_eq!(window.cell_center(0, 0), Coord { x: 5.0, y: 35.0 });
        assert_eq!(window.cell_center(3, 3), Coord { x: 35.0, y: 5.0 });
    }

    #[test]
    fn crop_is_cell_aligned_and_covering() {
        let raster = raster_4x4();
        // Extent straddling cell boundaries must expand outward.
        let window = raster
            .crop(&Rect::new(Coord { x: 12.0, y: 12.0 }, Coord { x: 28.0, y: 28.0 }))
            .unwrap();
        assert_eq!((window.nrows(), window.ncols()), (2, 2));
        assert_eq!(window.extent(), Rect::new(Coord { x: 10.0, y: 10.0 }, Coord { x: 30.0, y: 30.0 }));
        assert_eq!(window.data()[[0, 0]], 41);
    }

    #[test]
    fn crop_clamps_to_grid() {
        let raster = raster_4x4();
        let window = raster
            .crop(&Rect::new(Coord { x: -100.0, y: -100.0 }, Coord { x: 100.0, y: 100.0 }))
            .unwrap();
        assert_eq!((window.nrows(), window.ncols()), (4, 4));
    }

    #[test]
    fn disjoint_crop_is_empty() {
        let raster = raster_4x4();
        let window = raster
            .crop(&Rect::new(Coord { x: 500.0, y: 500.0 }, Coord { x: 600.0, y: 600.0 }))
            .unwrap();
        assert!(window.is_empty());
    }

    #[test]
    fn rejects_degenerate_cell_size() {
        assert!(MemoryRaster::new(Array2::zeros((1, 1)), Coord { x: 0.0, y: 0.0 }, 0.0, 0).is_err());
    }
}
