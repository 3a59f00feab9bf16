//! Point type for fixed-point planar geometry.
//!
//! Points use 64-bit integer coordinates in micrometres. The `z` field
//! rides along as the layer-height annotation and the `width` field
//! carries a per-vertex extrusion-width override (`0` means "use the
//! path config width"). Vector math (dot, cross, perpendiculars,
//! lengths) is planar; `z` and `width` never participate.

use crate::{scale, unscale, Coord, CoordF};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::hash::{Hash, Hasher};
use std::ops::{Add, AddAssign, Div, Mul, Neg, Sub, SubAssign};

/// A 2D point in integer micrometres, with a layer-Z annotation and an
/// extrusion-width override channel.
///
/// Position identity is the planar position only: two points are equal
/// when their `x` and `y` match, regardless of `z` or `width`.
///
/// # Example
/// ```
/// use toolpath::geometry::Point;
/// use toolpath::scale;
///
/// // A point at (1mm, 2mm)
/// let p = Point::new(scale(1.0), scale(2.0));
/// assert_eq!(p, Point::new(1000, 2000));
/// ```
#[derive(Clone, Copy, Default, Eq, Serialize, Deserialize)]
pub struct Point {
    pub x: Coord,
    pub y: Coord,
    /// Layer height annotation (micrometres). Ignored for equality.
    #[serde(default)]
    pub z: Coord,
    /// Extrusion width override (micrometres, `0` = path config width).
    /// Ignored for equality.
    #[serde(default)]
    pub width: Coord,
}

impl Point {
    /// Create a new planar point (z and width zero).
    #[inline]
    pub const fn new(x: Coord, y: Coord) -> Self {
        Self {
            x,
            y,
            z: 0,
            width: 0,
        }
    }

    /// Create a point with an explicit z annotation.
    #[inline]
    pub const fn new_3d(x: Coord, y: Coord, z: Coord) -> Self {
        Self { x, y, z, width: 0 }
    }

    /// Create a point from floating-point millimetre coordinates.
    #[inline]
    pub fn new_scale(x: CoordF, y: CoordF) -> Self {
        Self::new(scale(x), scale(y))
    }

    /// A point at the origin.
    #[inline]
    pub const fn zero() -> Self {
        Self::new(0, 0)
    }

    /// Copy of this point with the given z annotation.
    #[inline]
    pub const fn at_z(mut self, z: Coord) -> Self {
        self.z = z;
        self
    }

    /// Copy of this point with the given width override.
    #[inline]
    pub const fn with_width(mut self, width: Coord) -> Self {
        self.width = width;
        self
    }

    /// Copy of this point with z and width cleared (planar position only).
    #[inline]
    pub const fn xy(&self) -> Self {
        Self::new(self.x, self.y)
    }

    /// Squared planar length of this point as a vector.
    #[inline]
    pub fn length_squared(&self) -> i64 {
        self.x * self.x + self.y * self.y
    }

    /// Planar Euclidean length in micrometres.
    #[inline]
    pub fn length(&self) -> Coord {
        (self.length_squared() as CoordF).sqrt() as Coord
    }

    /// Planar Euclidean length in millimetres.
    #[inline]
    pub fn length_mm(&self) -> CoordF {
        unscale(self.length())
    }

    /// Cheap "is this vector shorter than `len`" test (no square root).
    #[inline]
    pub fn shorter_than(&self, len: Coord) -> bool {
        self.length_squared() < len * len
    }

    /// Cheap "is this vector longer than `len`" test (no square root).
    #[inline]
    pub fn longer_than(&self, len: Coord) -> bool {
        self.length_squared() > len * len
    }

    /// Planar dot product.
    #[inline]
    pub fn dot(&self, other: &Point) -> i64 {
        self.x * other.x + self.y * other.y
    }

    /// Planar pseudo cross product. Positive when `other` is
    /// counter-clockwise from `self`.
    #[inline]
    pub fn cross(&self, other: &Point) -> i64 {
        self.x * other.y - self.y * other.x
    }

    /// Perpendicular to the left of this direction (90° counter-clockwise).
    /// Unnormalised: same length as the input.
    #[inline]
    pub const fn perp_left(&self) -> Self {
        Self::new(-self.y, self.x)
    }

    /// Perpendicular to the right of this direction (90° clockwise).
    /// Unnormalised: same length as the input.
    #[inline]
    pub const fn perp_right(&self) -> Self {
        Self::new(self.y, -self.x)
    }

    /// A vector along the same direction with planar length `len`.
    /// Returns zero for a zero-length input.
    #[inline]
    pub fn with_length(&self, len: Coord) -> Self {
        let current = self.length();
        if current == 0 {
            return Self::zero();
        }
        Self::new(self.x * len / current, self.y * len / current)
    }

    /// Planar distance to another point, in micrometres.
    #[inline]
    pub fn distance_to(&self, other: &Point) -> Coord {
        (*other - *self).length()
    }
}

// Position identity: planar coordinates only. The z annotation and the
// width override never distinguish two positions.
impl PartialEq for Point {
    #[inline]
    fn eq(&self, other: &Self) -> bool {
        self.x == other.x && self.y == other.y
    }
}

impl Hash for Point {
    #[inline]
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.x.hash(state);
        self.y.hash(state);
    }
}

impl Add for Point {
    type Output = Point;

    #[inline]
    fn add(self, rhs: Point) -> Point {
        Point::new_3d(self.x + rhs.x, self.y + rhs.y, self.z + rhs.z)
    }
}

impl AddAssign for Point {
    #[inline]
    fn add_assign(&mut self, rhs: Point) {
        *self = *self + rhs;
    }
}

impl Sub for Point {
    type Output = Point;

    #[inline]
    fn sub(self, rhs: Point) -> Point {
        Point::new_3d(self.x - rhs.x, self.y - rhs.y, self.z - rhs.z)
    }
}

impl SubAssign for Point {
    #[inline]
    fn sub_assign(&mut self, rhs: Point) {
        *self = *self - rhs;
    }
}

impl Mul<Coord> for Point {
    type Output = Point;

    #[inline]
    fn mul(self, rhs: Coord) -> Point {
        Point::new_3d(self.x * rhs, self.y * rhs, self.z * rhs)
    }
}

impl Div<Coord> for Point {
    type Output = Point;

    #[inline]
    fn div(self, rhs: Coord) -> Point {
        Point::new_3d(self.x / rhs, self.y / rhs, self.z / rhs)
    }
}

impl Neg for Point {
    type Output = Point;

    #[inline]
    fn neg(self) -> Point {
        Point::new_3d(-self.x, -self.y, -self.z)
    }
}

impl fmt::Debug for Point {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({}, {}", self.x, self.y)?;
        if self.z != 0 {
            write!(f, ", z{}", self.z)?;
        }
        if self.width != 0 {
            write!(f, ", w{}", self.width)?;
        }
        write!(f, ")")
    }
}

impl fmt::Display for Point {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({:.3}, {:.3})", unscale(self.x), unscale(self.y))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_arithmetic() {
        let a = Point::new(100, 200);
        let b = Point::new(30, -50);
        assert_eq!(a + b, Point::new(130, 150));
        assert_eq!(a - b, Point::new(70, 250));
        assert_eq!(b * 2, Point::new(60, -100));
        assert_eq!(a / 2, Point::new(50, 100));
    }

    #[test]
    fn test_arithmetic_clears_width() {
        let a = Point::new(100, 0).with_width(400);
        let b = Point::new(0, 100).with_width(300);
        let sum = a + b;
        assert_eq!(sum.width, 0);
    }

    #[test]
    fn test_equality_ignores_z_and_width() {
        let a = Point::new(10, 20);
        let b = Point::new(10, 20).at_z(200).with_width(400);
        assert_eq!(a, b);
        assert_ne!(a, Point::new(10, 21));
    }

    #[test]
    fn test_length() {
        let p = Point::new(3000, 4000);
        assert_eq!(p.length(), 5000);
        assert!((p.length_mm() - 5.0).abs() < 1e-9);
    }

    #[test]
    fn test_shorter_longer_than() {
        let p = Point::new(3000, 4000);
        assert!(p.shorter_than(5001));
        assert!(!p.shorter_than(5000));
        assert!(p.longer_than(4999));
        assert!(!p.longer_than(5000));
    }

    #[test]
    fn test_perpendiculars() {
        let east = Point::new(1000, 0);
        assert_eq!(east.perp_left(), Point::new(0, 1000));
        assert_eq!(east.perp_right(), Point::new(0, -1000));
        // A left perpendicular is a CCW rotation.
        assert!(east.cross(&east.perp_left()) > 0);
    }

    #[test]
    fn test_with_length() {
        let p = Point::new(3000, 4000);
        let n = p.with_length(100);
        assert_eq!(n, Point::new(60, 80));
        assert_eq!(Point::zero().with_length(100), Point::zero());
    }

    #[test]
    fn test_dot_cross() {
        let a = Point::new(2, 0);
        let b = Point::new(0, 3);
        assert_eq!(a.dot(&b), 0);
        assert_eq!(a.cross(&b), 6);
        assert_eq!(b.cross(&a), -6);
    }
}
