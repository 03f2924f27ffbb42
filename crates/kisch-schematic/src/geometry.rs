//! Absolute pin positions of placed symbols.

use crate::units::{Mirror, Point, Rotation};
use kisch_eda::Pin;

/// Offset of a pin's connection point in symbol space (y up).
pub fn local_offset(pin: &Pin) -> Point {
    Point::mm(pin.x, pin.y)
}

/// Map a symbol-space offset onto the sheet for a symbol placed at `origin`.
///
/// The mirror is applied first, then the rotation, then the y axis is
/// flipped into sheet space and the result translated to `origin`.
pub fn pin_position(local: Point, origin: Point, rotation: Rotation, mirror: Mirror) -> Point {
    let (x, y) = match mirror {
        Mirror::None => (local.x, local.y),
        Mirror::X => (local.x, -local.y),
        Mirror::Y => (-local.x, local.y),
    };

    let (x, y) = match rotation {
        Rotation::R0 => (x, y),
        Rotation::R90 => (y, -x),
        Rotation::R180 => (-x, -y),
        Rotation::R270 => (-y, x),
    };

    Point::new(origin.x + x, origin.y - y)
}

/// Sheet position of a library pin on a placed symbol.
pub fn place_pin(pin: &Pin, origin: Point, rotation: Rotation, mirror: Mirror) -> Point {
    pin_position(local_offset(pin), origin, rotation, mirror)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn at(rotation: Rotation, mirror: Mirror) -> (f64, f64) {
        pin_position(
            Point::mm(0.0, 3.81),
            Point::mm(100.0, 100.0),
            rotation,
            mirror,
        )
        .to_mm()
    }

    #[test]
    fn rotations_of_top_pin() {
        assert_eq!(at(Rotation::R0, Mirror::None), (100.0, 96.19));
        assert_eq!(at(Rotation::R90, Mirror::None), (103.81, 100.0));
        assert_eq!(at(Rotation::R180, Mirror::None), (100.0, 103.81));
        assert_eq!(at(Rotation::R270, Mirror::None), (96.19, 100.0));
    }

    #[test]
    fn mirror_is_applied_before_rotation() {
        // Mirroring across x puts the pin at the bottom, then rotation moves it.
        assert_eq!(at(Rotation::R0, Mirror::X), (100.0, 103.81));
        assert_eq!(at(Rotation::R90, Mirror::X), (96.19, 100.0));
        // A pin on the y axis is unaffected by a y mirror.
        assert_eq!(at(Rotation::R90, Mirror::Y), (103.81, 100.0));

        let side = |rotation, mirror| {
            pin_position(
                Point::mm(7.62, 2.54),
                Point::mm(50.8, 50.8),
                rotation,
                mirror,
            )
            .to_mm()
        };
        assert_eq!(side(Rotation::R0, Mirror::Y), (43.18, 48.26));
        assert_eq!(side(Rotation::R90, Mirror::Y), (53.34, 43.18));
        assert_eq!(side(Rotation::R180, Mirror::X), (43.18, 48.26));
    }
}
