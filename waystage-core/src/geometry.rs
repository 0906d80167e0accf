//! Geometries reconstructed from resolved ways.

use geo::{Coord, LineString, Polygon};

/// Geometry of a single resolved way.
#[derive(Debug, Clone, PartialEq)]
pub enum WayGeometry {
    /// Open ways and closed ways carrying the linear marker.
    Line(LineString<f64>),
    /// Closed area candidates: one exterior ring, no holes.
    Polygon(Polygon<f64>),
}

impl WayGeometry {
    /// Build the geometry for a resolved coordinate sequence.
    ///
    /// No validity checks are applied; self-intersecting rings pass through
    /// unchanged.
    ///
    /// # Examples
    /// ```
    /// use geo::Coord;
    /// use waystage_core::WayGeometry;
    ///
    /// let ring = vec![
    ///     Coord { x: 0.0, y: 0.0 },
    ///     Coord { x: 1.0, y: 0.0 },
    ///     Coord { x: 1.0, y: 1.0 },
    ///     Coord { x: 0.0, y: 0.0 },
    /// ];
    /// assert!(matches!(WayGeometry::build(ring.clone(), true), WayGeometry::Polygon(_)));
    /// assert!(matches!(WayGeometry::build(ring, false), WayGeometry::Line(_)));
    /// ```
    #[must_use]
    pub fn build(coords: Vec<Coord<f64>>, area_candidate: bool) -> Self {
        let line = LineString::new(coords);
        if area_candidate {
            Self::Polygon(Polygon::new(line, Vec::new()))
        } else {
            Self::Line(line)
        }
    }

    /// Coordinates in drawing order (the exterior ring for polygons).
    #[must_use]
    pub fn coords(&self) -> &[Coord<f64>] {
        match self {
            Self::Line(line) => &line.0,
            Self::Polygon(polygon) => &polygon.exterior().0,
        }
    }
}
