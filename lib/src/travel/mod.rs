//! Boundary-aware travel routing.
//!
//! `AvoidCrossingPerimeters` answers the planner's three questions
//! about the outer-perimeter boundary: is a point inside it, how do I
//! push a stray point back inside, and can a travel reach its
//! destination without leaving it. Routes that would cross the
//! boundary are detoured along the crossed contour, walking its
//! vertices in whichever direction is shorter.

use crate::geometry::{Point, Polygon, Polygons};
use crate::Coord;
use log::debug;

/// How far detour waypoints are pushed off the boundary contour.
const WAYPOINT_INSET_UM: Coord = 200;

/// Boundary membership and routing queries over a set of contours.
/// Membership is even-odd, so hole contours need no special casing.
#[derive(Debug, Clone)]
pub struct AvoidCrossingPerimeters {
    boundary: Polygons,
}

impl AvoidCrossingPerimeters {
    /// Create a helper over the given boundary contours.
    pub fn new(boundary: Polygons) -> Self {
        Self { boundary }
    }

    /// The boundary contours.
    #[inline]
    pub fn boundary(&self) -> &Polygons {
        &self.boundary
    }

    /// Even-odd membership test across all contours.
    pub fn point_is_inside_boundary(&self, point: Point) -> bool {
        let mut inside = false;
        for polygon in &self.boundary {
            let n = polygon.len();
            if n < 3 {
                continue;
            }
            for i in 0..n {
                let a = polygon[i];
                let b = polygon[(i + 1) % n];
                let dy = b.y - a.y;
                if (a.y > point.y) == (b.y > point.y) {
                    continue;
                }
                let lhs = (point.x - a.x) as i128 * dy as i128;
                let rhs = (b.x - a.x) as i128 * (point.y - a.y) as i128;
                if (dy > 0 && lhs < rhs) || (dy < 0 && lhs > rhs) {
                    inside = !inside;
                }
            }
        }
        inside
    }

    /// Move `point` onto the inside of the boundary, `distance` away
    /// from the nearest contour edge. Returns whether a move was made.
    /// A point already inside is still re-projected, which is what lets
    /// a second call walk a result out of a tight corner.
    pub fn move_point_inside_boundary(&self, point: &mut Point, distance: Coord) -> bool {
        let Some((edge_start, edge_end, projection)) = self.closest_boundary_point(*point) else {
            return false;
        };
        let edge_direction = edge_end - edge_start;

        let left = projection + edge_direction.perp_left().with_length(distance);
        if self.point_is_inside_boundary(left) {
            *point = left;
            return true;
        }
        let right = projection + edge_direction.perp_right().with_length(distance);
        if self.point_is_inside_boundary(right) {
            *point = right;
            return true;
        }
        false
    }

    /// Find interior waypoints for a travel from `from` to `to`.
    ///
    /// Returns `Some(vec![])` when the straight line already stays
    /// inside, `Some(waypoints)` when a detour along crossed contours
    /// exists, and `None` when no interior route was found (endpoint
    /// outside the boundary, or a crossed contour that cannot be walked
    /// around).
    pub fn create_path_inside_boundary(&self, from: Point, to: Point) -> Option<Vec<Point>> {
        if !self.point_is_inside_boundary(from) || !self.point_is_inside_boundary(to) {
            return None;
        }

        // One crossing group per contour the straight line enters.
        let mut groups: Vec<CrossingGroup> = Vec::new();
        for (polygon_index, polygon) in self.boundary.iter().enumerate() {
            let n = polygon.len();
            if n < 3 {
                continue;
            }
            let mut crossings: Vec<(f64, usize)> = Vec::new();
            for edge_index in 0..n {
                let a = polygon[edge_index];
                let b = polygon[(edge_index + 1) % n];
                if let Some(t) = segment_intersection_parameter(from, to, a, b) {
                    crossings.push((t, edge_index));
                }
            }
            if crossings.len() < 2 {
                // Zero: untouched. One: grazing a corner, no detour.
                continue;
            }
            crossings.sort_by(|x, y| x.0.total_cmp(&y.0));
            groups.push(CrossingGroup {
                polygon_index,
                entry_t: crossings[0].0,
                entry_edge: crossings[0].1,
                exit_edge: crossings[crossings.len() - 1].1,
            });
        }

        if groups.is_empty() {
            return Some(Vec::new());
        }

        groups.sort_by(|x, y| x.entry_t.total_cmp(&y.entry_t));
        let mut waypoints = Vec::new();
        for group in &groups {
            let polygon = &self.boundary[group.polygon_index];
            let detour = self.walk_around(polygon, group.entry_edge, group.exit_edge)?;
            waypoints.extend(detour);
        }
        Some(waypoints)
    }

    /// Vertices between the entry and exit edges of a crossed contour,
    /// along the cheaper of the two walking directions, each nudged off
    /// the contour into the interior.
    fn walk_around(
        &self,
        polygon: &Polygon,
        entry_edge: usize,
        exit_edge: usize,
    ) -> Option<Vec<Point>> {
        let n = polygon.len();
        if entry_edge == exit_edge {
            return Some(Vec::new());
        }

        // Forward: the entry edge's end vertex up to the exit edge's
        // start vertex. Backward: the entry edge's start vertex down to
        // the exit edge's end vertex.
        let mut forward = Vec::new();
        let mut index = (entry_edge + 1) % n;
        loop {
            forward.push(index);
            if index == exit_edge {
                break;
            }
            index = (index + 1) % n;
        }
        let mut backward = Vec::new();
        let mut index = entry_edge;
        loop {
            backward.push(index);
            if index == (exit_edge + 1) % n {
                break;
            }
            index = (index + n - 1) % n;
        }

        let chain = if chain_length(polygon, &forward) <= chain_length(polygon, &backward) {
            forward
        } else {
            backward
        };

        let mut waypoints = Vec::with_capacity(chain.len());
        for vertex_index in chain {
            let Some(inset) = self.inset_vertex(polygon, vertex_index) else {
                debug!("boundary detour vertex cannot be moved inside, no interior route");
                return None;
            };
            waypoints.push(inset);
        }
        Some(waypoints)
    }

    /// Push a contour vertex into the interior along the bisector of
    /// its adjacent edge normals.
    fn inset_vertex(&self, polygon: &Polygon, index: usize) -> Option<Point> {
        let n = polygon.len();
        let previous = polygon[(index + n - 1) % n];
        let vertex = polygon[index];
        let next = polygon[(index + 1) % n];

        let normal_in = (vertex - previous).perp_left().with_length(WAYPOINT_INSET_UM);
        let normal_out = (next - vertex).perp_left().with_length(WAYPOINT_INSET_UM);
        let offset = (normal_in + normal_out) / 2;

        let candidate = vertex + offset;
        if self.point_is_inside_boundary(candidate) {
            return Some(candidate);
        }
        let candidate = vertex - offset;
        if self.point_is_inside_boundary(candidate) {
            return Some(candidate);
        }
        None
    }

    /// Closest point on any boundary edge, with the edge it lies on.
    fn closest_boundary_point(&self, point: Point) -> Option<(Point, Point, Point)> {
        let mut best: Option<(Point, Point, Point)> = None;
        let mut best_distance = i64::MAX;
        for polygon in &self.boundary {
            let n = polygon.len();
            if n < 2 {
                continue;
            }
            for i in 0..n {
                let a = polygon[i];
                let b = polygon[(i + 1) % n];
                let projection = project_onto_segment(point, a, b);
                let distance = (point - projection).length_squared();
                if distance < best_distance {
                    best_distance = distance;
                    best = Some((a, b, projection));
                }
            }
        }
        best
    }
}

struct CrossingGroup {
    polygon_index: usize,
    entry_t: f64,
    entry_edge: usize,
    exit_edge: usize,
}

fn chain_length(polygon: &Polygon, indices: &[usize]) -> Coord {
    let mut total = 0;
    for window in indices.windows(2) {
        total += (polygon[window[1]] - polygon[window[0]]).length();
    }
    total
}

/// Project a point onto a segment, clamped to the segment's extent.
fn project_onto_segment(point: Point, a: Point, b: Point) -> Point {
    let ab = b - a;
    let length_squared = ab.length_squared();
    if length_squared == 0 {
        return a;
    }
    let along = ab.dot(&(point - a));
    if along <= 0 {
        return a;
    }
    if along >= length_squared {
        return b;
    }
    let x = a.x + (ab.x as i128 * along as i128 / length_squared as i128) as Coord;
    let y = a.y + (ab.y as i128 * along as i128 / length_squared as i128) as Coord;
    Point::new(x, y)
}

/// Parameter of the intersection along `p1 -> p2`, when the two
/// segments properly intersect.
fn segment_intersection_parameter(p1: Point, p2: Point, p3: Point, p4: Point) -> Option<f64> {
    let d1 = p2 - p1;
    let d2 = p4 - p3;
    let denominator = d1.x as i128 * d2.y as i128 - d1.y as i128 * d2.x as i128;
    if denominator == 0 {
        return None;
    }
    let offset = p3 - p1;
    let t_numerator = offset.x as i128 * d2.y as i128 - offset.y as i128 * d2.x as i128;
    let u_numerator = offset.x as i128 * d1.y as i128 - offset.y as i128 * d1.x as i128;

    let in_range = |numerator: i128| {
        if denominator > 0 {
            numerator >= 0 && numerator <= denominator
        } else {
            numerator <= 0 && numerator >= denominator
        }
    };
    if !in_range(t_numerator) || !in_range(u_numerator) {
        return None;
    }
    Some(t_numerator as f64 / denominator as f64)
}
