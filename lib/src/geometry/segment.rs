//! Directed segment type and vertex-driven subdivision.
//!
//! Segments are the working representation of the overlap engine: a
//! polygon is exploded into directed point pairs, split wherever foreign
//! vertices project onto it, and later reassembled. The subdivision
//! step is what makes a single long pass comparable against the shorter
//! segments of a doubled-back pass.

use super::{Point, Polygon, Polygons};
use crate::Coord;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// A directed pair of points.
#[derive(Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Segment {
    pub start: Point,
    pub end: Point,
}

impl Segment {
    /// Create a new segment from start to end.
    #[inline]
    pub const fn new(start: Point, end: Point) -> Self {
        Self { start, end }
    }

    /// Direction vector (end - start).
    #[inline]
    pub fn direction(&self) -> Point {
        self.end - self.start
    }

    /// Planar length in micrometres.
    #[inline]
    pub fn length(&self) -> Coord {
        self.direction().length()
    }

    /// Explode a polygon into segments: `n` for a closed polygon,
    /// `n - 1` for an open one.
    pub fn from_polygon(polygon: &Polygon, closed: bool) -> Vec<Segment> {
        let n = polygon.len();
        if n < 2 {
            return Vec::new();
        }
        let count = if closed { n } else { n - 1 };
        let mut segments = Vec::with_capacity(count);
        for i in 0..count {
            segments.push(Segment::new(polygon[i], polygon[(i + 1) % n]));
        }
        segments
    }

    /// Explode a set of polygons into one flat segment list.
    pub fn from_polygons(polygons: &Polygons, closed: bool) -> Vec<Segment> {
        polygons
            .iter()
            .flat_map(|polygon| Self::from_polygon(polygon, closed))
            .collect()
    }

    /// Explode a point chain into segments, stamping every endpoint
    /// with the given z. Used to lift 2D intermediates back onto a
    /// layer plane.
    pub fn from_points_at_z(points: &[Point], z: Coord, closed: bool) -> Vec<Segment> {
        let n = points.len();
        if n < 2 {
            return Vec::new();
        }
        let count = if closed { n } else { n - 1 };
        let mut segments = Vec::with_capacity(count);
        for i in 0..count {
            segments.push(Segment::new(
                points[i].at_z(z),
                points[(i + 1) % n].at_z(z),
            ));
        }
        segments
    }

    /// Split this segment at every vertex that projects strictly inside
    /// it and lies within `max_distance` of its infinite line.
    ///
    /// Returns the replacement chain (endpoints preserved, original z
    /// re-stamped on every point), or `None` when no vertex qualified so
    /// callers can detect "no change".
    ///
    /// The distance gate compares against `max_distance * length` using
    /// an unnormalised perpendicular, which keeps the whole test in
    /// integers. Vertices landing on the same projected distance are
    /// dropped (first insertion wins).
    pub fn split_at_vertices(&self, vertices: &[Point], max_distance: Coord) -> Option<Vec<Segment>> {
        let start = self.start.xy();
        let end = self.end.xy();
        let direction = end - start;
        let length = direction.length();
        if length == 0 {
            return None;
        }
        let length_squared = length * length;
        let right_normal = direction.perp_right();
        let threshold = max_distance * length;

        // Ordered by distance along the segment so the rebuilt chain
        // advances monotonically.
        let mut splits: BTreeMap<Coord, Point> = BTreeMap::new();
        for vertex in vertices {
            let to_vertex = vertex.xy() - start;
            let side = right_normal.dot(&to_vertex);
            if side.abs() >= threshold {
                continue;
            }
            let along = direction.dot(&to_vertex);
            if along <= 0 || along >= length_squared {
                continue;
            }
            let t = along / length;
            splits
                .entry(t)
                .or_insert_with(|| start + direction.with_length(t));
        }

        if splits.is_empty() {
            return None;
        }
        splits.entry(0).or_insert(start);
        splits.entry(length).or_insert(end);

        let chain: Vec<Point> = splits.into_values().collect();
        Some(Self::from_points_at_z(&chain, self.start.z, false))
    }
}

impl fmt::Debug for Segment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?} -> {:?}", self.start, self.end)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn square(size: Coord) -> Polygon {
        Polygon::from_points(vec![
            Point::new(0, 0),
            Point::new(size, 0),
            Point::new(size, size),
            Point::new(0, size),
        ])
    }

    #[test]
    fn test_segment_counts() {
        let poly = square(10_000);
        assert_eq!(Segment::from_polygon(&poly, true).len(), 4);
        assert_eq!(Segment::from_polygon(&poly, false).len(), 3);
        assert!(Segment::from_polygon(&Polygon::new(), true).is_empty());
    }

    #[test]
    fn test_from_points_at_z() {
        let points = [Point::new(0, 0), Point::new(100, 0), Point::new(100, 100)];
        let segments = Segment::from_points_at_z(&points, 200, false);
        assert_eq!(segments.len(), 2);
        assert!(segments.iter().all(|s| s.start.z == 200 && s.end.z == 200));
    }

    #[test]
    fn test_split_no_qualifying_vertex() {
        let segment = Segment::new(Point::new(0, 0), Point::new(10_000, 0));
        // Too far from the line.
        assert!(segment
            .split_at_vertices(&[Point::new(5_000, 900)], 500)
            .is_none());
        // Projects onto an endpoint, not strictly inside.
        assert!(segment
            .split_at_vertices(&[Point::new(0, 100), Point::new(10_000, 100)], 500)
            .is_none());
    }

    #[test]
    fn test_split_inserts_projection() {
        let segment = Segment::new(Point::new(0, 0).at_z(200), Point::new(10_000, 0).at_z(200));
        let chain = segment
            .split_at_vertices(&[Point::new(4_000, 100)], 500)
            .expect("vertex should split the segment");
        assert_eq!(chain.len(), 2);
        assert_eq!(chain[0].start, Point::new(0, 0));
        assert_eq!(chain[0].end, Point::new(4_000, 0));
        assert_eq!(chain[1].start, Point::new(4_000, 0));
        assert_eq!(chain[1].end, Point::new(10_000, 0));
        // Original z preserved along the chain.
        assert!(chain.iter().all(|s| s.start.z == 200 && s.end.z == 200));
    }

    #[test]
    fn test_split_orders_and_dedupes() {
        let segment = Segment::new(Point::new(0, 0), Point::new(10_000, 0));
        let chain = segment
            .split_at_vertices(
                &[
                    Point::new(7_000, 50),
                    Point::new(2_000, -50),
                    // Same projected distance as the first vertex: dropped.
                    Point::new(7_000, -80),
                ],
                500,
            )
            .expect("two vertices should split the segment");
        assert_eq!(chain.len(), 3);
        assert_eq!(chain[0].end, Point::new(2_000, 0));
        assert_eq!(chain[1].end, Point::new(7_000, 0));
        // Chain endpoints equal the original endpoints.
        assert_eq!(chain[0].start, segment.start);
        assert_eq!(chain[2].end, segment.end);
    }

    #[test]
    fn test_split_points_lie_on_the_line() {
        let segment = Segment::new(Point::new(0, 0), Point::new(9_000, 3_000));
        let chain = segment
            .split_at_vertices(&[Point::new(3_000, 1_050)], 500)
            .expect("near vertex should split");
        for s in &chain {
            // Every intermediate point stays within 1um of the original line.
            let d = segment.direction();
            let offset = s.end.xy() - segment.start.xy();
            let deviation = d.cross(&offset).abs() as f64 / d.length() as f64;
            assert!(deviation <= 1.5, "deviation {deviation} too large");
        }
    }
}
