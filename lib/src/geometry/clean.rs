//! Tolerance-based polygon cleaning.
//!
//! Collapses runs of near-coincident vertices and drops vertices that
//! deviate from the line through their neighbours by less than the
//! tolerance. Run before overlap merging so that noisy, densely
//! sampled perimeters do not produce spurious segment pairs.

use super::{Point, Polygon, Polygons};
use crate::Coord;

/// Clean a polygon with the given tolerance in micrometres.
///
/// Vertices closer than `tolerance` to their predecessor are collapsed
/// (for a closed polygon this includes the last-to-first wrap), then
/// vertices within `tolerance` of the line through their neighbours are
/// removed until stable.
pub fn clean_polygon(polygon: &Polygon, tolerance: Coord, closed: bool) -> Polygon {
    let mut points = deduplicate(polygon.points(), tolerance, closed);
    remove_near_collinear(&mut points, tolerance, closed);
    Polygon::from_points(points)
}

/// Clean every polygon in a set. Polygons that collapse below two
/// points are dropped.
pub fn clean_polygons(polygons: &Polygons, tolerance: Coord, closed: bool) -> Polygons {
    polygons
        .iter()
        .map(|polygon| clean_polygon(polygon, tolerance, closed))
        .filter(|polygon| polygon.len() >= 2)
        .collect()
}

fn deduplicate(points: &[Point], tolerance: Coord, closed: bool) -> Vec<Point> {
    let mut kept: Vec<Point> = Vec::with_capacity(points.len());
    for &point in points {
        if let Some(last) = kept.last() {
            if !(point - *last).longer_than(tolerance) {
                continue;
            }
        }
        kept.push(point);
    }
    if closed {
        while kept.len() > 1 && !(kept[kept.len() - 1] - kept[0]).longer_than(tolerance) {
            kept.pop();
        }
    }
    kept
}

fn remove_near_collinear(points: &mut Vec<Point>, tolerance: Coord, closed: bool) {
    let min_len = if closed { 3 } else { 2 };
    let mut changed = true;
    while changed && points.len() > min_len {
        changed = false;
        let mut i = usize::from(!closed);
        while points.len() > min_len {
            let n = points.len();
            let limit = if closed { n } else { n - 1 };
            if i >= limit {
                break;
            }
            let prev = points[(i + n - 1) % n];
            let next = points[(i + 1) % n];
            let edge = next - prev;
            let offset = points[i] - prev;
            let edge_length = edge.length();
            if edge_length == 0 || edge.cross(&offset).abs() <= tolerance * edge_length {
                points.remove(i);
                changed = true;
            } else {
                i += 1;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_removes_duplicates() {
        let poly = Polygon::from_points(vec![
            Point::new(0, 0),
            Point::new(0, 5),
            Point::new(10_000, 0),
            Point::new(10_000, 10_000),
            Point::new(0, 10_000),
            Point::new(0, 3),
        ]);
        let cleaned = clean_polygon(&poly, 10, true);
        assert_eq!(cleaned.len(), 4);
        assert_eq!(cleaned[0], Point::new(0, 0));
    }

    #[test]
    fn test_removes_near_collinear_vertex() {
        let poly = Polygon::from_points(vec![
            Point::new(0, 0),
            Point::new(5_000, 4),
            Point::new(10_000, 0),
            Point::new(10_000, 10_000),
            Point::new(0, 10_000),
        ]);
        let cleaned = clean_polygon(&poly, 10, true);
        assert_eq!(cleaned.len(), 4);
        assert!(!cleaned.points().contains(&Point::new(5_000, 4)));
    }

    #[test]
    fn test_preserves_real_corners() {
        let hairpin = Polygon::from_points(vec![
            Point::new(0, 0),
            Point::new(10_000, 0),
            Point::new(10_000, 200),
            Point::new(0, 200),
        ]);
        let cleaned = clean_polygon(&hairpin, 10, false);
        assert_eq!(cleaned.len(), 4);
    }

    #[test]
    fn test_open_path_keeps_endpoints() {
        let path = Polygon::from_points(vec![
            Point::new(0, 0),
            Point::new(5_000, 2),
            Point::new(10_000, 0),
        ]);
        let cleaned = clean_polygon(&path, 10, false);
        assert_eq!(cleaned.first_point(), Point::new(0, 0));
        assert_eq!(cleaned.last_point(), Point::new(10_000, 0));
    }

    #[test]
    fn test_empty_input() {
        assert!(clean_polygon(&Polygon::new(), 10, true).is_empty());
    }
}
