//! Geospatial helpers: great-circle distance, boundary containment, and
//! nearest-feature search.
//!
//! Boundary rings use GeoJSON position order (`[lon, lat]`); everything else
//! in the crate works with [`Coordinate`] (`lat`, `lon`).

use serde::{Deserialize, Serialize};

use crate::error::ReconError;

/// Mean Earth radius used by the haversine formula.
pub const EARTH_RADIUS_M: f64 = 6_371_000.0;

/// Tolerance for treating a point as lying on a boundary edge.
const EDGE_EPSILON: f64 = 1e-10;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Coordinate {
    pub lat: f64,
    pub lon: f64,
}

impl Coordinate {
    pub fn new(lat: f64, lon: f64) -> Self {
        Self { lat, lon }
    }

    pub fn is_finite(&self) -> bool {
        self.lat.is_finite() && self.lon.is_finite()
    }
}

/// Haversine great-circle distance in meters.
pub fn distance_m(a: Coordinate, b: Coordinate) -> f64 {
    let phi1 = a.lat.to_radians();
    let phi2 = b.lat.to_radians();
    let d_phi = (b.lat - a.lat).to_radians();
    let d_lambda = (b.lon - a.lon).to_radians();

    let h = (d_phi / 2.0).sin().powi(2) + phi1.cos() * phi2.cos() * (d_lambda / 2.0).sin().powi(2);
    let c = 2.0 * h.sqrt().atan2((1.0 - h).sqrt());
    EARTH_RADIUS_M * c
}

// ---------------------------------------------------------------------------
// Boundary
// ---------------------------------------------------------------------------

/// GeoJSON position: `[lon, lat]`.
pub type Position = [f64; 2];

#[derive(Debug, Clone, PartialEq)]
pub struct Polygon {
    pub outer: Vec<Position>,
    pub holes: Vec<Vec<Position>>,
}

impl Polygon {
    fn from_rings(mut rings: Vec<Vec<Position>>) -> Result<Self, ReconError> {
        if rings.is_empty() {
            return Err(ReconError::Boundary("polygon has no rings".into()));
        }
        let outer = rings.remove(0);
        if outer.len() < 3 {
            return Err(ReconError::Boundary(format!(
                "outer ring has {} positions, need at least 3",
                outer.len()
            )));
        }
        Ok(Self {
            outer,
            holes: rings,
        })
    }

    /// Inside the outer ring (edges included) and outside every hole.
    /// A point on a hole's edge counts as excluded.
    pub fn contains(&self, point: Position) -> bool {
        point_in_ring(point, &self.outer) && !self.holes.iter().any(|h| point_in_ring(point, h))
    }
}

/// Region of interest. A coordinate is inside when any polygon contains it.
#[derive(Debug, Clone, PartialEq)]
pub struct Boundary {
    polygons: Vec<Polygon>,
}

#[derive(Deserialize)]
#[serde(tag = "type")]
enum GeoJson {
    FeatureCollection { features: Vec<GeoJson> },
    Feature { geometry: Option<Box<GeoJson>> },
    Polygon { coordinates: Vec<Vec<Position>> },
    MultiPolygon { coordinates: Vec<Vec<Vec<Position>>> },
}

impl Boundary {
    pub fn new(polygons: Vec<Polygon>) -> Result<Self, ReconError> {
        if polygons.is_empty() {
            return Err(ReconError::Boundary("boundary contains no polygons".into()));
        }
        Ok(Self { polygons })
    }

    /// Parse a GeoJSON `Polygon`, `MultiPolygon`, `Feature`, or
    /// `FeatureCollection` holding polygonal geometry.
    pub fn from_geojson(input: &str) -> Result<Self, ReconError> {
        let doc: GeoJson = serde_json::from_str(input)
            .map_err(|e| ReconError::Boundary(format!("invalid GeoJSON: {e}")))?;
        let mut polygons = Vec::new();
        collect_polygons(doc, &mut polygons)?;
        Self::new(polygons)
    }

    pub fn polygons(&self) -> &[Polygon] {
        &self.polygons
    }

    pub fn contains(&self, coordinate: Coordinate) -> bool {
        let point = [coordinate.lon, coordinate.lat];
        self.polygons.iter().any(|p| p.contains(point))
    }
}

fn collect_polygons(doc: GeoJson, out: &mut Vec<Polygon>) -> Result<(), ReconError> {
    match doc {
        GeoJson::FeatureCollection { features } => {
            for feature in features {
                collect_polygons(feature, out)?;
            }
        }
        GeoJson::Feature { geometry } => {
            if let Some(geometry) = geometry {
                collect_polygons(*geometry, out)?;
            }
        }
        GeoJson::Polygon { coordinates } => out.push(Polygon::from_rings(coordinates)?),
        GeoJson::MultiPolygon { coordinates } => {
            for rings in coordinates {
                out.push(Polygon::from_rings(rings)?);
            }
        }
    }
    Ok(())
}

fn point_on_segment(p: Position, a: Position, b: Position) -> bool {
    let cross = (p[1] - a[1]) * (b[0] - a[0]) - (p[0] - a[0]) * (b[1] - a[1]);
    if cross.abs() > EDGE_EPSILON {
        return false;
    }
    let dot = (p[0] - a[0]) * (p[0] - b[0]) + (p[1] - a[1]) * (p[1] - b[1]);
    dot <= EDGE_EPSILON
}

/// Even-odd ray cast. Points on an edge count as inside.
fn point_in_ring(p: Position, ring: &[Position]) -> bool {
    if ring.len() < 3 {
        return false;
    }
    let mut inside = false;
    let mut j = ring.len() - 1;
    for i in 0..ring.len() {
        let a = ring[i];
        let b = ring[j];
        if point_on_segment(p, a, b) {
            return true;
        }
        if (a[1] > p[1]) != (b[1] > p[1]) {
            let x_cross = (b[0] - a[0]) * (p[1] - a[1]) / (b[1] - a[1]) + a[0];
            if p[0] < x_cross {
                inside = !inside;
            }
        }
        j = i;
    }
    inside
}

// ---------------------------------------------------------------------------
// Nearest-feature search
// ---------------------------------------------------------------------------

/// Anything with one or more representative positions.
pub trait Located {
    fn positions(&self) -> Vec<Coordinate>;
}

#[derive(Debug)]
pub struct Nearest<'a, T> {
    pub item: &'a T,
    pub distance_m: f64,
}

/// Closest item within `max_m` of `origin`, measured to each item's nearest
/// position. Ties keep the first item seen.
pub fn nearest_within<'a, T, I>(origin: Coordinate, items: I, max_m: f64) -> Option<Nearest<'a, T>>
where
    T: Located + 'a,
    I: IntoIterator<Item = &'a T>,
{
    let mut best: Option<Nearest<'a, T>> = None;
    for item in items {
        for position in item.positions() {
            if !position.is_finite() {
                continue;
            }
            let d = distance_m(origin, position);
            if d > max_m {
                continue;
            }
            if best.as_ref().map_or(true, |b| d < b.distance_m) {
                best = Some(Nearest {
                    item,
                    distance_m: d,
                });
            }
        }
    }
    best
}
