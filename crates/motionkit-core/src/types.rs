//! Base data types for positions and axes
//!
//! This module provides:
//! - Six-axis position vectors (X, Y, Z, A, B, C)
//! - Axis identifiers with their G-code letters
//! - Unit management (MM, INCH)

use serde::{Deserialize, Serialize};
use std::fmt;
use std::ops::{Add, Neg, Sub};

/// Machine coordinate units (millimeters or inches)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum Units {
    /// Millimeters (metric)
    #[default]
    MM,
    /// Inches (imperial)
    INCH,
}

impl Units {
    /// Convert a value from one unit to another
    pub fn convert(value: f64, from: Units, to: Units) -> f64 {
        match (from, to) {
            (Units::MM, Units::INCH) => value / 25.4,
            (Units::INCH, Units::MM) => value * 25.4,
            _ => value,
        }
    }
}

impl fmt::Display for Units {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Units::MM => write!(f, "mm"),
            Units::INCH => write!(f, "in"),
        }
    }
}

/// Machine axes, in the order devices report them
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Axis {
    /// X linear axis
    X,
    /// Y linear axis
    Y,
    /// Z linear axis
    Z,
    /// A rotary axis
    A,
    /// B rotary axis
    B,
    /// C rotary axis
    C,
}

impl Axis {
    /// All six axes, in report order
    pub const ALL: [Axis; 6] = [Axis::X, Axis::Y, Axis::Z, Axis::A, Axis::B, Axis::C];

    /// The G-code word letter for this axis
    pub fn letter(&self) -> char {
        match self {
            Axis::X => 'X',
            Axis::Y => 'Y',
            Axis::Z => 'Z',
            Axis::A => 'A',
            Axis::B => 'B',
            Axis::C => 'C',
        }
    }
}

impl fmt::Display for Axis {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.letter())
    }
}

/// Six-axis position vector
///
/// Used for machine positions, work positions and coordinate frame offsets.
/// The unit of the values is whatever the owning modal context currently
/// reports; the vector itself is unit-agnostic.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Position {
    /// X-axis value
    pub x: f64,
    /// Y-axis value
    pub y: f64,
    /// Z-axis value
    pub z: f64,
    /// A-axis value
    pub a: f64,
    /// B-axis value
    pub b: f64,
    /// C-axis value
    pub c: f64,
}

impl Position {
    /// Zero on all six axes
    pub const ZERO: Position = Position {
        x: 0.0,
        y: 0.0,
        z: 0.0,
        a: 0.0,
        b: 0.0,
        c: 0.0,
    };

    /// Create a position from the three linear axes, rotary axes zero
    pub fn linear(x: f64, y: f64, z: f64) -> Self {
        Self {
            x,
            y,
            z,
            ..Self::ZERO
        }
    }

    /// Create a position with all six axes specified
    pub fn with_axes(x: f64, y: f64, z: f64, a: f64, b: f64, c: f64) -> Self {
        debug_assert!(
            x.is_finite()
                && y.is_finite()
                && z.is_finite()
                && a.is_finite()
                && b.is_finite()
                && c.is_finite(),
            "Position axes must be finite: x={x}, y={y}, z={z}, a={a}, b={b}, c={c}"
        );
        Self { x, y, z, a, b, c }
    }

    /// Read one axis value
    pub fn get(&self, axis: Axis) -> f64 {
        match axis {
            Axis::X => self.x,
            Axis::Y => self.y,
            Axis::Z => self.z,
            Axis::A => self.a,
            Axis::B => self.b,
            Axis::C => self.c,
        }
    }

    /// Replace one axis value, returning the updated position
    pub fn with(mut self, axis: Axis, value: f64) -> Self {
        match axis {
            Axis::X => self.x = value,
            Axis::Y => self.y = value,
            Axis::Z => self.z = value,
            Axis::A => self.a = value,
            Axis::B => self.b = value,
            Axis::C => self.c = value,
        }
        self
    }

    /// Compare two positions within a tolerance on every axis
    pub fn approx_eq(&self, other: &Position, tolerance: f64) -> bool {
        Axis::ALL
            .iter()
            .all(|&axis| (self.get(axis) - other.get(axis)).abs() <= tolerance)
    }
}

impl Add for Position {
    type Output = Position;

    fn add(self, rhs: Position) -> Position {
        Position {
            x: self.x + rhs.x,
            y: self.y + rhs.y,
            z: self.z + rhs.z,
            a: self.a + rhs.a,
            b: self.b + rhs.b,
            c: self.c + rhs.c,
        }
    }
}

impl Sub for Position {
    type Output = Position;

    fn sub(self, rhs: Position) -> Position {
        self + (-rhs)
    }
}

impl Neg for Position {
    type Output = Position;

    fn neg(self) -> Position {
        Position {
            x: -self.x,
            y: -self.y,
            z: -self.z,
            a: -self.a,
            b: -self.b,
            c: -self.c,
        }
    }
}

impl fmt::Display for Position {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "({:.3}, {:.3}, {:.3}, {:.3}, {:.3}, {:.3})",
            self.x, self.y, self.z, self.a, self.b, self.c
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_units_conversion() {
        assert!((Units::convert(25.4, Units::MM, Units::INCH) - 1.0).abs() < 1e-9);
        assert!((Units::convert(2.0, Units::INCH, Units::MM) - 50.8).abs() < 1e-9);
        assert_eq!(Units::convert(7.0, Units::MM, Units::MM), 7.0);
    }

    #[test]
    fn test_position_arithmetic() {
        let work = Position::linear(12.0, 7.0, 0.0);
        let offset = Position::linear(5.0, 5.0, 0.0);
        let diff = work - offset;
        assert_eq!(diff, Position::linear(7.0, 2.0, 0.0));
        assert_eq!(-offset, Position::linear(-5.0, -5.0, 0.0));
    }

    #[test]
    fn test_axis_access() {
        let pos = Position::with_axes(1.0, 2.0, 3.0, 4.0, 5.0, 6.0);
        assert_eq!(pos.get(Axis::A), 4.0);
        assert_eq!(pos.with(Axis::Z, 9.0).z, 9.0);
        assert_eq!(Axis::C.letter(), 'C');
    }
}
