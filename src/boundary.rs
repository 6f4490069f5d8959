use std::path::{Path, PathBuf};

use ahash::AHashSet;
use anyhow::{anyhow, bail, Context, Result};
use geo::{Coord, MapCoords, MultiPolygon};
use proj4rs::{proj::Proj as Proj4, transform::transform};
use shapefile::{dbase::FieldValue, Reader, Shape};

use crate::types::{GeoId, GeoType};

/// One census block: its GEOID and its geometry in the raster's CRS.
#[derive(Debug, Clone)]
pub struct BlockBoundary {
    pub geo_id: GeoId,
    pub shape: MultiPolygon<f64>,
}

/// Per-state polygon collections, already reprojected to the raster CRS.
pub trait BoundarySource {
    fn for_state(&self, fips: &str) -> Result<Vec<BlockBoundary>>;
}

/// TIGER/Line source CRS: NAD83 geographic (degrees -> radians handled in code).
const NAD83_LONLAT: &str = "+proj=longlat +datum=NAD83 +no_defs +type=crs";

/// NLCD raster CRS: CONUS Albers equal-area (EPSG:5070).
const CONUS_ALBERS: &str =
    "+proj=aea +lat_1=29.5 +lat_2=45.5 +lat_0=23 +lon_0=-96 +x_0=0 +y_0=0 \
     +datum=NAD83 +units=m +no_defs +type=crs";

/// Reads TIGER/Line tabblock shapefiles from a download directory and
/// hands back boundaries reprojected into the raster CRS.
pub struct ShapefileBoundaries {
    pub dir: PathBuf,
    pub geoid_field: String,
    pub verbose: u8,
}

impl ShapefileBoundaries {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into(), geoid_field: "GEOID20".into(), verbose: 0 }
    }

    fn state_path(&self, fips: &str) -> PathBuf {
        self.dir
            .join(format!("tl_2020_{fips}_tabblock20"))
            .join(format!("tl_2020_{fips}_tabblock20.shp"))
    }
}

impl BoundarySource for ShapefileBoundaries {
    fn for_state(&self, fips: &str) -> Result<Vec<BlockBoundary>> {
        let path = self.state_path(fips);
        if self.verbose > 0 {
            eprintln!("[boundary] state={fips} <- {}", path.display());
        }
        read_block_shapefile(&path, &self.geoid_field)
    }
}

/// Read all block polygons + GEOIDs from a `.shp` file and reproject
/// them from NAD83 lon/lat into CONUS Albers.
pub fn read_block_shapefile(path: &Path, geoid_field: &str) -> Result<Vec<BlockBoundary>> {
    let mut reader = Reader::from_path(path)
        .with_context(|| format!("failed to open shapefile: {}", path.display()))?;

    let from = Proj4::from_proj_string(NAD83_LONLAT)
        .with_context(|| anyhow!("failed to build source PROJ.4: {NAD83_LONLAT}"))?;
    let to = Proj4::from_proj_string(CONUS_ALBERS)
        .with_context(|| anyhow!("failed to build target PROJ.4: {CONUS_ALBERS}"))?;

    let mut seen: AHashSet<GeoId> = AHashSet::new();
    let mut blocks = Vec::with_capacity(reader.shape_count()?);

    for result in reader.iter_shapes_and_records() {
        let (shape, record) = result.context("error reading shape+record")?;

        let polygon = match shape {
            Shape::Polygon(p) => p,
            other => bail!("unexpected shape type in {}: {}", path.display(), other.shapetype()),
        };

        let geoid = match record.get(geoid_field) {
            Some(FieldValue::Character(Some(text))) => text.trim().to_string(),
            Some(other) => bail!("field {geoid_field} has non-character value: {other:?}"),
            None => bail!("missing {geoid_field} attribute in {}", path.display()),
        };

        let geo_id = GeoId::new(GeoType::Block, &geoid);
        if !seen.insert(geo_id.clone()) {
            bail!("duplicate block GEOID {geoid} in {}", path.display());
        }

        blocks.push(BlockBoundary {
            geo_id,
            shape: to_raster_crs(&shp_to_geo(&polygon), &from, &to)?,
        });
    }

    Ok(blocks)
}

/// Map a lon/lat geometry into the raster CRS: radians in, meters out.
fn to_raster_crs(
    shape: &MultiPolygon<f64>,
    from: &Proj4,
    to: &Proj4,
) -> Result<MultiPolygon<f64>> {
    shape
        .try_map_coords(|coord: Coord<f64>| {
            let mut point = (coord.x.to_radians(), coord.y.to_radians(), 0.0);
            transform(from, to, &mut point)?;
            Ok::<_, proj4rs::errors::Error>(Coord { x: point.0, y: point.1 })
        })
        .context("CRS transform failed")
}

/// Convert shapefile::Polygon to geo::MultiPolygon<f64>.
///
/// Shapefile rings come CW-exterior / CCW-hole, each exterior followed by
/// its holes; geo wants explicit polygon/interior structure.
pub(crate) fn shp_to_geo(p: &shapefile::Polygon) -> MultiPolygon<f64> {
    /// Ensure first and last are the same for geo::LineString coords
    fn ensure_closed(coords: &mut Vec<Coord<f64>>) {
        if !coords.is_empty() && coords[0] != coords[coords.len() - 1] {
            coords.push(coords[0])
        }
    }

    /// Get the signed area of a geo::Coord list (negative for exterior)
    fn signed_area(pts: &[Coord<f64>]) -> f64 {
        let mut a = 0.0;
        for w in pts.windows(2) {
            a += w[0].x * w[1].y - w[1].x * w[0].y;
        }
        a / 2.0
    }

    // 1) Convert each ring into a LineString (ensure closed)
    let mut ls_rings: Vec<(geo::LineString<f64>, bool /*is_exterior*/)> =
        Vec::with_capacity(p.rings().len());
    for ring in p.rings().iter() {
        let mut coords: Vec<Coord<f64>> =
            ring.points().iter().map(|pt| Coord { x: pt.x, y: pt.y }).collect();
        ensure_closed(&mut coords);
        let ls = geo::LineString(coords);
        // Shapefile convention: CW => exterior, which is negative signed area.
        let is_exterior = signed_area(&ls.0) < 0.0;
        ls_rings.push((ls, is_exterior));
    }

    // 2) Group: each exterior with its following holes
    let mut polys: Vec<geo::Polygon<f64>> = Vec::new();
    let mut current_exterior: Option<geo::LineString<f64>> = None;
    let mut current_holes: Vec<geo::LineString<f64>> = Vec::new();

    for (ls, is_exterior) in ls_rings {
        if is_exterior {
            // flush previous polygon
            if let Some(ext) = current_exterior.take() {
                polys.push(geo::Polygon::new(ext, current_holes));
                current_holes = Vec::new();
            }
            current_exterior = Some(ls);
        } else {
            current_holes.push(ls);
        }
    }
    if let Some(ext) = current_exterior {
        polys.push(geo::Polygon::new(ext, current_holes));
    }

    MultiPolygon(polys)
}
