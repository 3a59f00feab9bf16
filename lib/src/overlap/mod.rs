//! Back-on-itself overlap detection and variable-width merging.
//!
//! When a perimeter doubles back on itself within less than one
//! extrusion width, printing both passes deposits twice the material.
//! The functions here find such opposite-direction near-parallel
//! segment pairs and collapse each pair into a single centreline stroke
//! whose per-vertex `width` covers both passes.
//!
//! # Overview
//!
//! - [`make_close_segments_mergeable`] subdivides segments at nearby
//!   vertices so that one long pass becomes pairwise comparable with
//!   the shorter segments of the opposite pass
//! - [`find_thin_lines`] returns only the merged centrelines (thin-wall
//!   discovery: the caller prints the cores and nothing else)
//! - [`merge_perimeter_overlaps`] returns the whole path with merged
//!   sections widened in place (perimeter de-duplication)
//!
//! All functions are pure over their inputs; outputs are fresh
//! allocations.

use crate::geometry::{clean_polygon, Polygon, Polygons, Segment};
use crate::Coord;
use log::debug;

/// Per-segment outcome of the pairwise merge scan.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum MergeTag {
    /// Not part of any merged pair.
    Untouched,
    /// Rewritten to the pair's centreline; carries the merged width.
    Merged,
    /// Absorbed into a merged partner.
    Remove,
}

/// Gates and width arithmetic distinguishing the two merge flavours.
struct MergeRules {
    /// Both endpoint deltas of a candidate pair must be under this.
    merge_distance: Coord,
    /// Thin-line detection only: reject pairs narrower than this.
    min_width: Option<Coord>,
    /// Perimeter merging only: require anti-parallel directions.
    require_opposed: bool,
    /// Thin-line detection only: the centreline must lie to the left of
    /// the first segment (inside the curve), so detection cannot
    /// manufacture strokes outside a convex hull.
    require_inside: bool,
    /// Added to the measured gap: zero for thin cores, the nominal line
    /// width for perimeter merging (the merged stroke covers both
    /// original widths plus the gap).
    extra_width: Coord,
}

/// Subdivide `polygon`'s segments at every vertex of `split_on` that
/// lies within `distance`, then rebuild the polygon.
///
/// Without this preprocessing the pairwise overlap scan would miss a
/// single long segment doubling back past several short ones: the
/// endpoint-proximity test only fires on segments of comparable extent.
pub fn make_close_segments_mergeable(
    polygon: &Polygon,
    split_on: &Polygon,
    distance: Coord,
    closed: bool,
) -> Polygon {
    let mut segments = Segment::from_polygon(polygon, closed);
    if segments.is_empty() {
        return polygon.clone();
    }

    // Replace in place, iterating backwards to keep indices stable.
    for i in (0..segments.len()).rev() {
        if let Some(chain) = segments[i].split_at_vertices(split_on.points(), distance) {
            segments.splice(i..=i, chain);
        }
    }

    let mut rebuilt = Polygon::with_capacity(segments.len() + 1);
    for segment in &segments {
        rebuilt.push(segment.start);
    }
    if !closed {
        rebuilt.push(segments[segments.len() - 1].end);
    }
    rebuilt
}

/// Subdivide every polygon of a set against every polygon of the same
/// set, itself included. Self-splitting is intentional: it subdivides a
/// perimeter at its own vertices where it doubles back.
pub fn make_close_segments_mergeable_set(
    polygons: &Polygons,
    distance: Coord,
    closed: bool,
) -> Polygons {
    polygons
        .iter()
        .map(|target| {
            let mut rebuilt = target.clone();
            for split_on in polygons {
                rebuilt = make_close_segments_mergeable(&rebuilt, split_on, distance, closed);
            }
            rebuilt
        })
        .collect()
}

/// Find regions where the path doubles back on itself within
/// `merge_distance` and return only the merged centrelines.
///
/// Pairs narrower than `min_width` are ignored, as are pairs whose
/// centreline would fall outside the curve. Returns whether anything
/// merged and the centreline chains (open polygons, each point carrying
/// the merged stroke width).
pub fn find_thin_lines(
    polygons: &Polygons,
    merge_distance: Coord,
    min_width: Coord,
    closed: bool,
) -> (bool, Polygons) {
    let split = make_close_segments_mergeable_set(polygons, merge_distance, closed);
    let mut segments = Segment::from_polygons(&split, closed);
    let (merged_any, tags) = merge_segment_pairs(
        &mut segments,
        &MergeRules {
            merge_distance,
            min_width: Some(min_width),
            require_opposed: false,
            require_inside: true,
            extra_width: 0,
        },
    );

    // Thin-line discovery keeps nothing but the merged cores.
    let kept = segments
        .into_iter()
        .zip(tags)
        .filter(|(_, tag)| *tag == MergeTag::Merged)
        .map(|(segment, _)| segment);
    (merged_any, chain_segments(kept))
}

/// Collapse back-on-itself overlaps of a single perimeter into
/// variable-width strokes, keeping the rest of the path intact.
///
/// The perimeter is cleaned first (tolerance `line_width / 40`); every
/// surviving endpoint is seeded with the nominal `line_width` so
/// unmerged runs still carry a stroke width through to emission. A pair
/// merges only when the two segments run in genuinely opposed
/// directions, and the merged width is the measured gap plus
/// `line_width`. Returns whether anything merged and the reassembled
/// chains.
pub fn merge_perimeter_overlaps(
    perimeter: &Polygon,
    line_width: Coord,
    closed: bool,
) -> (bool, Polygons) {
    let cleaned = clean_polygon(perimeter, line_width / 40, closed);
    if cleaned.is_empty() {
        return (false, Polygons::new());
    }

    let split = make_close_segments_mergeable(&cleaned, &cleaned, line_width, closed);
    let mut segments = Segment::from_polygon(&split, closed);
    for segment in &mut segments {
        segment.start.width = line_width;
        segment.end.width = line_width;
    }

    let (merged_any, tags) = merge_segment_pairs(
        &mut segments,
        &MergeRules {
            merge_distance: line_width,
            min_width: None,
            require_opposed: true,
            require_inside: false,
            extra_width: line_width,
        },
    );

    // Unlike thin-line discovery, the full path survives: only absorbed
    // partners are dropped.
    let kept = segments
        .into_iter()
        .zip(tags)
        .filter(|(_, tag)| *tag != MergeTag::Remove)
        .map(|(segment, _)| segment);
    (merged_any, chain_segments(kept))
}

/// The pairwise scan: for each segment, find at most one later partner
/// whose endpoints are cross-wise close, and rewrite the first segment
/// of the pair to the centreline.
fn merge_segment_pairs(segments: &mut [Segment], rules: &MergeRules) -> (bool, Vec<MergeTag>) {
    let mut tags = vec![MergeTag::Untouched; segments.len()];
    let mut merged_any = false;

    for i in 0..segments.len() {
        for j in (i + 1)..segments.len() {
            let start_delta = (segments[i].start - segments[j].end).length();
            if start_delta >= rules.merge_distance {
                continue;
            }
            let end_delta = (segments[i].end - segments[j].start).length();
            if end_delta >= rules.merge_distance {
                continue;
            }
            let gap = start_delta.min(end_delta);
            if let Some(min_width) = rules.min_width {
                if gap <= min_width {
                    continue;
                }
            }
            if rules.require_opposed
                && segments[i].direction().dot(&segments[j].direction()) >= 0
            {
                continue;
            }
            if rules.require_inside {
                let midpoint = (segments[i].start + segments[j].end) / 2;
                let left_normal = segments[i].direction().perp_left();
                let offset = midpoint - segments[i].start;
                if left_normal.dot(&offset) <= 0 {
                    continue;
                }
            }

            let width = gap + rules.extra_width;
            let new_start = ((segments[i].start + segments[j].end) / 2).with_width(width);
            let new_end = ((segments[i].end + segments[j].start) / 2).with_width(width);
            segments[i] = Segment::new(new_start, new_end);
            tags[i] = MergeTag::Merged;
            tags[j] = MergeTag::Remove;
            merged_any = true;
            // One merge partner per segment.
            break;
        }
    }

    if merged_any {
        let count = tags.iter().filter(|t| **t == MergeTag::Merged).count();
        debug!("merged {count} overlapping segment pair(s)");
    }
    (merged_any, tags)
}

/// Reassemble a filtered segment list into polygons, starting a new
/// polygon whenever consecutive segments are not end-to-end coincident.
fn chain_segments(segments: impl Iterator<Item = Segment>) -> Polygons {
    let mut result = Polygons::new();
    let mut current = Polygon::new();
    for segment in segments {
        if let Some(&last) = current.last() {
            if last == segment.start {
                current.push(segment.end);
                continue;
            }
            result.push(std::mem::take(&mut current));
        }
        current.push(segment.start);
        current.push(segment.end);
    }
    if !current.is_empty() {
        result.push(current);
    }
    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geometry::Point;

    fn open_path(points: &[(Coord, Coord)]) -> Polygon {
        points.iter().map(|&(x, y)| Point::new(x, y)).collect()
    }

    #[test]
    fn test_mergeable_subdivides_at_foreign_vertex() {
        let path = open_path(&[(0, 0), (10_000, 0), (10_000, 200), (4_000, 200)]);
        let rebuilt = make_close_segments_mergeable(&path, &path, 400, false);
        // The bottom pass gains the projection of (4000, 200).
        assert_eq!(rebuilt.len(), 5);
        assert_eq!(rebuilt[1], Point::new(4_000, 0));
        // Endpoints survive untouched.
        assert_eq!(rebuilt.first_point(), path.first_point());
        assert_eq!(rebuilt.last_point(), path.last_point());
    }

    #[test]
    fn test_mergeable_is_idempotent() {
        let path = open_path(&[(0, 0), (10_000, 0), (10_000, 200), (4_000, 200)]);
        let once = make_close_segments_mergeable(&path, &path, 400, false);
        let twice = make_close_segments_mergeable(&once, &once, 400, false);
        assert_eq!(once.points(), twice.points());
    }

    #[test]
    fn test_thin_lines_antiparallel_pair() {
        let polygons = vec![
            open_path(&[(0, 0), (10_000, 0)]),
            open_path(&[(10_000, 50), (0, 50)]),
        ];
        let (found, lines) = find_thin_lines(&polygons, 200, 10, false);
        assert!(found);
        assert_eq!(lines.len(), 1);
        let core = &lines[0];
        assert_eq!(core.points(), &[Point::new(0, 25), Point::new(10_000, 25)]);
        assert!(core.iter().all(|p| p.width == 50));
    }

    #[test]
    fn test_thin_lines_rejects_outside_of_curve() {
        // Same geometry, opposite winding: the centreline would sit to
        // the right of the first segment.
        let polygons = vec![
            open_path(&[(0, 50), (10_000, 50)]),
            open_path(&[(10_000, 0), (0, 0)]),
        ];
        let (found, lines) = find_thin_lines(&polygons, 200, 10, false);
        assert!(!found);
        assert!(lines.is_empty());
    }

    #[test]
    fn test_thin_lines_respects_minimum_width() {
        let polygons = vec![
            open_path(&[(0, 0), (10_000, 0)]),
            open_path(&[(10_000, 50), (0, 50)]),
        ];
        let (found, lines) = find_thin_lines(&polygons, 200, 50, false);
        assert!(!found);
        assert!(lines.is_empty());
    }

    #[test]
    fn test_thin_lines_none_when_far_apart() {
        let polygons = vec![open_path(&[
            (0, 0),
            (10_000, 0),
            (10_000, 10_000),
            (0, 10_000),
        ])];
        let (found, lines) = find_thin_lines(&polygons, 200, 10, true);
        assert!(!found);
        assert!(lines.is_empty());
    }

    #[test]
    fn test_merge_rectangle_has_no_overlaps() {
        let rectangle = open_path(&[(0, 0), (10_000, 0), (10_000, 10_000), (0, 10_000)]);
        let (merged, _) = merge_perimeter_overlaps(&rectangle, 400, true);
        assert!(!merged);
    }

    #[test]
    fn test_merge_hairpin() {
        let hairpin = open_path(&[(0, 0), (10_000, 0), (10_000, 200), (0, 200)]);
        let (merged, polygons) = merge_perimeter_overlaps(&hairpin, 400, false);
        assert!(merged);
        let core = polygons
            .iter()
            .find(|p| p.iter().any(|point| point.width == 600))
            .expect("merged stroke should be present");
        assert_eq!(core.points(), &[Point::new(0, 100), Point::new(10_000, 100)]);
        // min(200, 200) + 400
        assert!(core.iter().all(|p| p.width == 600));
    }

    #[test]
    fn test_merge_output_widths_are_positive() {
        let hairpin = open_path(&[(0, 0), (10_000, 0), (10_000, 200), (0, 200)]);
        let (_, polygons) = merge_perimeter_overlaps(&hairpin, 400, false);
        assert!(!polygons.is_empty());
        for polygon in &polygons {
            assert!(polygon.iter().all(|p| p.width > 0));
        }
    }

    #[test]
    fn test_pair_scan_requires_opposed_directions() {
        // Perpendicular segments with cross-wise close endpoints: only
        // the opposed-direction gate tells them apart from a fold-back.
        let make_segments = || {
            vec![
                Segment::new(Point::new(0, 0), Point::new(200, 0)),
                Segment::new(Point::new(250, 100), Point::new(250, -150)),
            ]
        };
        let rules = MergeRules {
            merge_distance: 400,
            min_width: None,
            require_opposed: true,
            require_inside: false,
            extra_width: 400,
        };
        let mut segments = make_segments();
        let (merged, _) = merge_segment_pairs(&mut segments, &rules);
        assert!(!merged);

        let mut segments = make_segments();
        let relaxed = MergeRules {
            require_opposed: false,
            ..rules
        };
        let (merged, tags) = merge_segment_pairs(&mut segments, &relaxed);
        assert!(merged);
        assert_eq!(tags, vec![MergeTag::Merged, MergeTag::Remove]);
    }

    #[test]
    fn test_merge_empty_perimeter() {
        let (merged, polygons) = merge_perimeter_overlaps(&Polygon::new(), 400, true);
        assert!(!merged);
        assert!(polygons.is_empty());
    }
}
