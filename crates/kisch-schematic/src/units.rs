//! Fixed-precision schematic coordinates.
//!
//! KiCad schematics store positions in millimetres with an internal
//! resolution of 100 nm (1e-4 mm). [`Mm`] keeps that resolution as an
//! integer so load, transform and save never accumulate float error.

use serde::{Serialize, Serializer};
use std::fmt;
use std::ops::{Add, Neg, Sub};

/// Internal units per millimetre.
const SCALE: i64 = 10_000;

/// A length in millimetres, stored as a count of 1e-4 mm.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
pub struct Mm(i64);

impl Mm {
    pub const ZERO: Mm = Mm(0);

    /// KiCad's default connection grid (50 mil).
    pub const GRID: Mm = Mm(12_700);

    pub const fn from_units(units: i64) -> Self {
        Mm(units)
    }

    pub const fn units(self) -> i64 {
        self.0
    }

    pub fn from_mm(value: f64) -> Self {
        Mm((value * SCALE as f64).round() as i64)
    }

    pub fn to_mm(self) -> f64 {
        self.0 as f64 / SCALE as f64
    }

    /// Parse a decimal literal exactly. Digits past the fourth decimal are
    /// rounded half away from zero.
    pub fn parse(literal: &str) -> Option<Self> {
        let (negative, body) = match literal.strip_prefix('-') {
            Some(rest) => (true, rest),
            None => (false, literal.strip_prefix('+').unwrap_or(literal)),
        };
        let (int_part, frac_part) = body.split_once('.').unwrap_or((body, ""));
        if int_part.is_empty() && frac_part.is_empty() {
            return None;
        }
        if !int_part.bytes().chain(frac_part.bytes()).all(|b| b.is_ascii_digit()) {
            return None;
        }

        let whole: i64 = if int_part.is_empty() {
            0
        } else {
            int_part.parse().ok()?
        };
        let mut frac: i64 = 0;
        for (i, digit) in frac_part.bytes().take(4).enumerate() {
            frac += i64::from(digit - b'0') * 10_i64.pow(3 - i as u32);
        }
        if frac_part.as_bytes().get(4).is_some_and(|&d| d >= b'5') {
            frac += 1;
        }

        let units = whole.checked_mul(SCALE)?.checked_add(frac)?;
        Some(Mm(if negative { -units } else { units }))
    }

    /// Round to the nearest multiple of `step`.
    pub fn round_to(self, step: Mm) -> Mm {
        if step.0 == 0 {
            return self;
        }
        let half = step.0 / 2;
        let q = if self.0 >= 0 {
            (self.0 + half) / step.0
        } else {
            (self.0 - half) / step.0
        };
        Mm(q * step.0)
    }

    pub fn is_multiple_of(self, step: Mm) -> bool {
        step.0 == 0 || self.0 % step.0 == 0
    }
}

impl fmt::Display for Mm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let sign = if self.0 < 0 { "-" } else { "" };
        let abs = self.0.unsigned_abs();
        let whole = abs / SCALE as u64;
        let frac = abs % SCALE as u64;
        if frac == 0 {
            write!(f, "{sign}{whole}")
        } else {
            let digits = format!("{frac:04}");
            write!(f, "{sign}{whole}.{}", digits.trim_end_matches('0'))
        }
    }
}

impl Serialize for Mm {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_f64(self.to_mm())
    }
}

impl Add for Mm {
    type Output = Mm;
    fn add(self, rhs: Mm) -> Mm {
        Mm(self.0 + rhs.0)
    }
}

impl Sub for Mm {
    type Output = Mm;
    fn sub(self, rhs: Mm) -> Mm {
        Mm(self.0 - rhs.0)
    }
}

impl Neg for Mm {
    type Output = Mm;
    fn neg(self) -> Mm {
        Mm(-self.0)
    }
}

impl From<f64> for Mm {
    fn from(value: f64) -> Self {
        Mm::from_mm(value)
    }
}

/// A position on the schematic sheet (y grows downwards).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize)]
pub struct Point {
    pub x: Mm,
    pub y: Mm,
}

impl Point {
    pub const fn new(x: Mm, y: Mm) -> Self {
        Point { x, y }
    }

    pub fn mm(x: f64, y: f64) -> Self {
        Point::new(Mm::from_mm(x), Mm::from_mm(y))
    }

    pub fn to_mm(self) -> (f64, f64) {
        (self.x.to_mm(), self.y.to_mm())
    }

    pub fn offset(self, dx: Mm, dy: Mm) -> Self {
        Point::new(self.x + dx, self.y + dy)
    }

    pub fn round_to(self, step: Mm) -> Self {
        Point::new(self.x.round_to(step), self.y.round_to(step))
    }

    /// Whether the point lies on the segment `a`-`b` (inclusive).
    pub fn on_segment(self, a: Point, b: Point) -> bool {
        let (px, py) = (i128::from(self.x.0), i128::from(self.y.0));
        let (ax, ay) = (i128::from(a.x.0), i128::from(a.y.0));
        let (bx, by) = (i128::from(b.x.0), i128::from(b.y.0));
        let cross = (bx - ax) * (py - ay) - (by - ay) * (px - ax);
        cross == 0
            && px >= ax.min(bx)
            && px <= ax.max(bx)
            && py >= ay.min(by)
            && py <= ay.max(by)
    }
}

impl From<(f64, f64)> for Point {
    fn from((x, y): (f64, f64)) -> Self {
        Point::mm(x, y)
    }
}

impl fmt::Display for Point {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({}, {})", self.x, self.y)
    }
}

/// Placement rotation of a symbol.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize)]
pub enum Rotation {
    #[default]
    R0,
    R90,
    R180,
    R270,
}

impl Rotation {
    /// Accepts any multiple of 90, including negative angles.
    pub fn from_degrees(degrees: i64) -> Option<Self> {
        match degrees.rem_euclid(360) {
            0 => Some(Rotation::R0),
            90 => Some(Rotation::R90),
            180 => Some(Rotation::R180),
            270 => Some(Rotation::R270),
            _ => None,
        }
    }

    pub fn degrees(self) -> i64 {
        match self {
            Rotation::R0 => 0,
            Rotation::R90 => 90,
            Rotation::R180 => 180,
            Rotation::R270 => 270,
        }
    }
}

/// Placement mirror of a symbol: `(mirror x)` flips across the x axis.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize)]
pub enum Mirror {
    #[default]
    None,
    X,
    Y,
}

impl Mirror {
    pub fn as_token(self) -> Option<&'static str> {
        match self {
            Mirror::None => None,
            Mirror::X => Some("x"),
            Mirror::Y => Some("y"),
        }
    }

    pub fn from_token(token: &str) -> Self {
        match token {
            "x" => Mirror::X,
            "y" => Mirror::Y,
            _ => Mirror::None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_literals_exactly() {
        assert_eq!(Mm::parse("96.19"), Some(Mm(961_900)));
        assert_eq!(Mm::parse("-3.81"), Some(Mm(-38_100)));
        assert_eq!(Mm::parse("12.000000"), Some(Mm(120_000)));
        assert_eq!(Mm::parse(".5"), Some(Mm(5_000)));
        assert_eq!(Mm::parse("0.00005"), Some(Mm(1)));
        assert_eq!(Mm::parse("1.2.3"), None);
        assert_eq!(Mm::parse("-"), None);
        assert_eq!(Mm::parse("abc"), None);
    }

    #[test]
    fn displays_trimmed() {
        assert_eq!(Mm(961_900).to_string(), "96.19");
        assert_eq!(Mm(1_000_000).to_string(), "100");
        assert_eq!(Mm(-38_100).to_string(), "-3.81");
        assert_eq!(Mm(-5).to_string(), "-0.0005");
        assert_eq!(Mm(0).to_string(), "0");
    }

    #[test]
    fn float_conversion_rounds_to_internal_units() {
        assert_eq!(Mm::from_mm(3.81), Mm(38_100));
        assert_eq!(Mm::from_mm(100.0) - Mm::from_mm(3.81), Mm::parse("96.19").unwrap());
    }

    #[test]
    fn rounding_and_grid() {
        assert_eq!(Mm(12_349).round_to(Mm(100)), Mm(12_300));
        assert_eq!(Mm(12_350).round_to(Mm(100)), Mm(12_400));
        assert_eq!(Mm(-12_350).round_to(Mm(100)), Mm(-12_400));
        assert!(Mm::parse("101.6").unwrap().is_multiple_of(Mm::GRID));
        assert!(!Mm::parse("101.5").unwrap().is_multiple_of(Mm::GRID));
    }

    #[test]
    fn rotations() {
        assert_eq!(Rotation::from_degrees(-90), Some(Rotation::R270));
        assert_eq!(Rotation::from_degrees(450), Some(Rotation::R90));
        assert_eq!(Rotation::from_degrees(45), None);
    }

    #[test]
    fn segments() {
        let a = Point::mm(0.0, 0.0);
        let b = Point::mm(10.0, 0.0);
        assert!(Point::mm(5.0, 0.0).on_segment(a, b));
        assert!(b.on_segment(a, b));
        assert!(!Point::mm(11.0, 0.0).on_segment(a, b));
        assert!(!Point::mm(5.0, 0.1).on_segment(a, b));
    }
}
