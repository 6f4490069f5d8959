use std::collections::BTreeMap;

use ahash::AHashMap;
use anyhow::{bail, Context, Result};
use geo::{BoundingRect, Contains, Coord, MultiPolygon, Point, Rect};

use crate::raster::{RasterSource, RasterWindow};
use crate::types::GeoId;

/// One (unit, category, count) record: the number of raster cells of
/// `category` whose center lies inside the unit's polygon.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CellCount {
    pub geo_id: GeoId,
    pub category: u8,
    pub count: u64,
}

/// Categorical histogram of the window cells whose centers fall inside
/// `shape`. Nodata cells contribute nothing; cells outside the polygon
/// contribute nothing. Pure function of its two inputs, which is what
/// makes the scheduler's parallelism safe.
pub fn tally_shape(window: &RasterWindow, shape: &MultiPolygon<f64>) -> BTreeMap<u8, u64> {
    if window.is_empty() {
        return BTreeMap::new();
    }

    let mut hist: AHashMap<u8, u64> = AHashMap::new();
    for ((row, col), &code) in window.data().indexed_iter() {
        if code == window.nodata() {
            continue;
        }
        let center = window.cell_center(row, col);
        if shape.contains(&Point::from(center)) {
            *hist.entry(code).or_insert(0) += 1;
        }
    }

    // Sorted map for deterministic downstream ordering.
    hist.into_iter().collect()
}

/// Tally one block: crop the raster to the block's extent (padded one
/// cell so border centers are never clipped out), then histogram the
/// in-polygon cells. A block entirely over nodata yields no records.
pub fn tally_block<R: RasterSource + ?Sized>(
    raster: &R,
    geo_id: &GeoId,
    shape: &MultiPolygon<f64>,
) -> Result<Vec<CellCount>> {
    let Some(bounds) = shape.bounding_rect() else {
        bail!("block {} has an empty geometry", geo_id.id());
    };

    let pad = raster.cell_size();
    let extent = Rect::new(
        Coord { x: bounds.min().x - pad, y: bounds.min().y - pad },
        Coord { x: bounds.max().x + pad, y: bounds.max().y + pad },
    );

    let window = raster
        .crop(&extent)
        .with_context(|| format!("raster crop failed for block {}", geo_id.id()))?;

    Ok(tally_shape(&window, shape)
        .into_iter()
        .map(|(category, count)| CellCount { geo_id: geo_id.clone(), category, count })
        .collect())
}
