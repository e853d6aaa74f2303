use nalgebra::Vector2;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt;
use std::ops::{Add, AddAssign, Mul, Neg, Sub, SubAssign};

/// A point `(y, x)` in arcseconds. Deflection vectors use the same type.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Coordinate {
    pub y: f64,
    pub x: f64,
}

impl Coordinate {
    pub const fn new(y: f64, x: f64) -> Self {
        Self { y, x }
    }

    pub const fn origin() -> Self {
        Self { y: 0.0, x: 0.0 }
    }

    pub fn norm(&self) -> f64 {
        self.y.hypot(self.x)
    }

    pub fn distance(&self, other: &Coordinate) -> f64 {
        (*self - *other).norm()
    }

    /// Largest per-axis separation, i.e. the L∞ distance.
    pub fn chebyshev_distance(&self, other: &Coordinate) -> f64 {
        (self.y - other.y).abs().max((self.x - other.x).abs())
    }

    pub fn is_finite(&self) -> bool {
        self.y.is_finite() && self.x.is_finite()
    }

    /// Orders by `y`, then `x`, with a total order over floats.
    pub fn cmp_yx(&self, other: &Coordinate) -> Ordering {
        self.y
            .total_cmp(&other.y)
            .then_with(|| self.x.total_cmp(&other.x))
    }

    pub fn to_vector(self) -> Vector2<f64> {
        Vector2::new(self.y, self.x)
    }

    pub fn from_vector(vector: &Vector2<f64>) -> Self {
        Self::new(vector[0], vector[1])
    }
}

impl fmt::Display for Coordinate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({}, {})", self.y, self.x)
    }
}

impl From<(f64, f64)> for Coordinate {
    fn from((y, x): (f64, f64)) -> Self {
        Self::new(y, x)
    }
}

impl Add for Coordinate {
    type Output = Self;
    fn add(self, rhs: Self) -> Self {
        Self::new(self.y + rhs.y, self.x + rhs.x)
    }
}

impl Sub for Coordinate {
    type Output = Self;
    fn sub(self, rhs: Self) -> Self {
        Self::new(self.y - rhs.y, self.x - rhs.x)
    }
}

impl Neg for Coordinate {
    type Output = Self;
    fn neg(self) -> Self {
        Self::new(-self.y, -self.x)
    }
}

impl Mul<f64> for Coordinate {
    type Output = Self;
    fn mul(self, rhs: f64) -> Self {
        Self::new(self.y * rhs, self.x * rhs)
    }
}

impl AddAssign for Coordinate {
    fn add_assign(&mut self, rhs: Self) {
        *self = *self + rhs;
    }
}

impl SubAssign for Coordinate {
    fn sub_assign(&mut self, rhs: Self) {
        *self = *self - rhs;
    }
}

#[cfg(test)]
mod tests {
    use super::Coordinate;
    use std::cmp::Ordering;

    #[test]
    fn arithmetic_is_componentwise() {
        let a = Coordinate::new(1.0, 2.0);
        let b = Coordinate::new(0.5, -1.0);
        assert_eq!(a + b, Coordinate::new(1.5, 1.0));
        assert_eq!(a - b, Coordinate::new(0.5, 3.0));
        assert_eq!(-a, Coordinate::new(-1.0, -2.0));
        assert_eq!(a * 2.0, Coordinate::new(2.0, 4.0));
    }

    #[test]
    fn distances_use_euclidean_and_chebyshev_metrics() {
        let a = Coordinate::new(0.0, 0.0);
        let b = Coordinate::new(3.0, -4.0);
        assert!((a.distance(&b) - 5.0).abs() < 1e-12);
        assert!((a.chebyshev_distance(&b) - 4.0).abs() < 1e-12);
    }

    #[test]
    fn cmp_yx_orders_by_y_first() {
        let low = Coordinate::new(-1.0, 5.0);
        let high = Coordinate::new(0.0, -5.0);
        assert_eq!(low.cmp_yx(&high), Ordering::Less);
        assert_eq!(
            Coordinate::new(0.0, 1.0).cmp_yx(&Coordinate::new(0.0, 2.0)),
            Ordering::Less
        );
    }

    #[test]
    fn vector_round_trip_keeps_component_order() {
        let c = Coordinate::new(0.25, -0.75);
        let v = c.to_vector();
        assert_eq!(v[0], 0.25);
        assert_eq!(Coordinate::from_vector(&v), c);
    }
}
