// src/axes.rs - Logical axes and the per-axis value register
use serde::{Deserialize, Serialize};
use std::fmt;
use std::ops::{Index, IndexMut};

/// Number of logical axes the machine understands.
pub const NUM_AXES: usize = 10;

/// Logical machine axes, in register order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Axis {
    X,
    Y,
    Z,
    E,
    A,
    B,
    C,
    U,
    V,
    W,
}

impl Axis {
    pub const ALL: [Axis; NUM_AXES] = [
        Axis::X,
        Axis::Y,
        Axis::Z,
        Axis::E,
        Axis::A,
        Axis::B,
        Axis::C,
        Axis::U,
        Axis::V,
        Axis::W,
    ];

    /// Case-insensitive conversion from an axis letter.
    pub fn from_letter(letter: char) -> Option<Axis> {
        match letter.to_ascii_uppercase() {
            'X' => Some(Axis::X),
            'Y' => Some(Axis::Y),
            'Z' => Some(Axis::Z),
            'E' => Some(Axis::E),
            'A' => Some(Axis::A),
            'B' => Some(Axis::B),
            'C' => Some(Axis::C),
            'U' => Some(Axis::U),
            'V' => Some(Axis::V),
            'W' => Some(Axis::W),
            _ => None,
        }
    }

    pub fn letter(self) -> char {
        match self {
            Axis::X => 'X',
            Axis::Y => 'Y',
            Axis::Z => 'Z',
            Axis::E => 'E',
            Axis::A => 'A',
            Axis::B => 'B',
            Axis::C => 'C',
            Axis::U => 'U',
            Axis::V => 'V',
            Axis::W => 'W',
        }
    }

    pub fn index(self) -> usize {
        self as usize
    }
}

impl fmt::Display for Axis {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.letter())
    }
}

/// One value per logical axis.
///
/// Used for positions in mm (`AxesRegister<f64>`, the default), for per-axis
/// limits read from the configuration, and for step counts
/// (`AxesRegister<i64>`).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct AxesRegister<T = f64> {
    values: [T; NUM_AXES],
}

impl<T: Copy + Default> Default for AxesRegister<T> {
    fn default() -> Self {
        Self {
            values: [T::default(); NUM_AXES],
        }
    }
}

impl<T: Copy + Default> AxesRegister<T> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register with every slot set to `value`.
    pub fn splat(value: T) -> Self {
        Self {
            values: [value; NUM_AXES],
        }
    }

    pub fn from_array(values: [T; NUM_AXES]) -> Self {
        Self { values }
    }

    /// Builds a register from `(axis, value)` pairs; unmentioned axes stay at default.
    pub fn with(pairs: &[(Axis, T)]) -> Self {
        let mut register = Self::default();
        for &(axis, value) in pairs {
            register[axis] = value;
        }
        register
    }

    pub fn as_array(&self) -> &[T; NUM_AXES] {
        &self.values
    }

    /// Iterates `(axis, value)` pairs in register order.
    pub fn iter(&self) -> impl Iterator<Item = (Axis, T)> + '_ {
        Axis::ALL.iter().map(move |&axis| (axis, self.values[axis.index()]))
    }
}

impl<T> Index<Axis> for AxesRegister<T> {
    type Output = T;

    fn index(&self, axis: Axis) -> &T {
        &self.values[axis.index()]
    }
}

impl<T> IndexMut<Axis> for AxesRegister<T> {
    fn index_mut(&mut self, axis: Axis) -> &mut T {
        &mut self.values[axis.index()]
    }
}
