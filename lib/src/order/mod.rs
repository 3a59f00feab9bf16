//! Island ordering for polygon batches.
//!
//! `PathOrderOptimizer` picks the order in which a batch of polygons is
//! printed and the vertex each one starts from, greedily chaining the
//! nearest island to the running position. Ties break deterministically
//! on the lower polygon index so repeated runs produce identical
//! toolpaths.

use crate::gcode::GCodePathConfig;
use crate::geometry::{Point, Polygon, Polygons};

/// Greedy nearest-neighbour tour over a polygon batch.
pub struct PathOrderOptimizer<'a> {
    start_position: Point,
    polygons: Vec<&'a Polygon>,
    /// Island indices in print order.
    pub best_island_order_index: Vec<usize>,
    /// Chosen start vertex per polygon (indexed by polygon, not by
    /// print order).
    pub start_index_in_polygon: Vec<usize>,
}

impl<'a> PathOrderOptimizer<'a> {
    /// Create an optimizer starting from the given position.
    pub fn new(start_position: Point) -> Self {
        Self {
            start_position,
            polygons: Vec::new(),
            best_island_order_index: Vec::new(),
            start_index_in_polygon: Vec::new(),
        }
    }

    /// Add a single polygon to the batch.
    pub fn add_polygon(&mut self, polygon: &'a Polygon) {
        self.polygons.push(polygon);
    }

    /// Add a batch of polygons.
    pub fn add_polygons(&mut self, polygons: &'a Polygons) {
        for polygon in polygons {
            self.add_polygon(polygon);
        }
    }

    /// Compute the island order and per-polygon start vertices. Closed
    /// loops may start at any vertex; open paths start at whichever
    /// endpoint is nearer when their turn comes.
    pub fn optimize(&mut self, config: &GCodePathConfig) {
        let count = self.polygons.len();
        self.best_island_order_index.clear();
        self.start_index_in_polygon = vec![0; count];

        let mut remaining: Vec<usize> = (0..count)
            .filter(|&i| !self.polygons[i].is_empty())
            .collect();
        let mut position = self.start_position;

        while !remaining.is_empty() {
            let mut best_slot = 0;
            let mut best_vertex = 0;
            let mut best_distance = i64::MAX;

            for (slot, &polygon_index) in remaining.iter().enumerate() {
                let polygon = self.polygons[polygon_index];
                let candidates: Vec<usize> = if config.closed_loop {
                    (0..polygon.len()).collect()
                } else {
                    vec![0, polygon.len() - 1]
                };
                for vertex_index in candidates {
                    let distance = (polygon[vertex_index] - position).length_squared();
                    // Strict less-than keeps the lower polygon index
                    // (and lower vertex index) on ties.
                    if distance < best_distance {
                        best_distance = distance;
                        best_slot = slot;
                        best_vertex = vertex_index;
                    }
                }
            }

            let polygon_index = remaining.remove(best_slot);
            let polygon = self.polygons[polygon_index];
            self.best_island_order_index.push(polygon_index);
            self.start_index_in_polygon[polygon_index] = best_vertex;

            // A closed loop ends back on its start vertex; an open path
            // ends on the opposite endpoint.
            position = if config.closed_loop {
                polygon[best_vertex]
            } else if best_vertex == 0 {
                polygon[polygon.len() - 1]
            } else {
                polygon[0]
            };
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn square_at(x: i64, y: i64, size: i64) -> Polygon {
        Polygon::from_points(vec![
            Point::new(x, y),
            Point::new(x + size, y),
            Point::new(x + size, y + size),
            Point::new(x, y + size),
        ])
    }

    fn closed_config() -> GCodePathConfig {
        GCodePathConfig::new(50, 400, "WALL-OUTER")
    }

    #[test]
    fn test_orders_islands_by_proximity() {
        let polygons = vec![
            square_at(50_000, 0, 5_000),
            square_at(5_000, 0, 5_000),
            square_at(25_000, 0, 5_000),
        ];
        let mut optimizer = PathOrderOptimizer::new(Point::new(0, 0));
        optimizer.add_polygons(&polygons);
        optimizer.optimize(&closed_config());
        assert_eq!(optimizer.best_island_order_index, vec![1, 2, 0]);
    }

    #[test]
    fn test_closed_loop_starts_at_nearest_vertex() {
        let polygons = vec![square_at(10_000, 10_000, 5_000)];
        let mut optimizer = PathOrderOptimizer::new(Point::new(16_000, 16_000));
        optimizer.add_polygons(&polygons);
        optimizer.optimize(&closed_config());
        // (15000, 15000) is the corner nearest to the start position.
        assert_eq!(optimizer.start_index_in_polygon[0], 2);
    }

    #[test]
    fn test_open_path_picks_nearer_endpoint() {
        let line = Polygon::from_points(vec![
            Point::new(0, 0),
            Point::new(5_000, 0),
            Point::new(10_000, 0),
        ]);
        let polygons = vec![line];
        let mut optimizer = PathOrderOptimizer::new(Point::new(11_000, 0));
        optimizer.add_polygons(&polygons);
        optimizer.optimize(&closed_config().with_closed_loop(false));
        assert_eq!(optimizer.start_index_in_polygon[0], 2);
    }

    #[test]
    fn test_empty_polygons_are_skipped() {
        let polygons = vec![Polygon::new(), square_at(0, 0, 5_000)];
        let mut optimizer = PathOrderOptimizer::new(Point::new(0, 0));
        optimizer.add_polygons(&polygons);
        optimizer.optimize(&closed_config());
        assert_eq!(optimizer.best_island_order_index, vec![1]);
    }

    #[test]
    fn test_deterministic_tie_breaking() {
        // Two identical squares equidistant from the start.
        let polygons = vec![square_at(0, 0, 5_000), square_at(0, 0, 5_000)];
        let mut optimizer = PathOrderOptimizer::new(Point::new(2_500, -1_000));
        optimizer.add_polygons(&polygons);
        optimizer.optimize(&closed_config());
        assert_eq!(optimizer.best_island_order_index, vec![0, 1]);
    }
}
