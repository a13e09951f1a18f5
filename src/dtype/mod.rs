//! Scalar types for distributed matrices
//!
//! This module provides the `DType` tag, the [`Element`] trait every stored
//! entry implements, and the [`Field`]/[`RealField`] traits the numerical
//! kernels are written against.

pub mod complex;
mod element;

pub use complex::{Complex64, Complex128};
pub use element::{Element, Field, RealField};

use std::fmt;

/// Runtime tag for an element type
///
/// Used in log output and file headers; the type system does the real work.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum DType {
    /// 64-bit signed integer
    I64 = 0,
    /// 32-bit floating point
    F32 = 1,
    /// 64-bit floating point
    F64 = 2,
    /// 64-bit complex (two f32: re, im)
    Complex64 = 3,
    /// 128-bit complex (two f64: re, im)
    Complex128 = 4,
}

impl DType {
    /// Size of one element in bytes
    #[inline]
    pub const fn size_in_bytes(self) -> usize {
        match self {
            Self::Complex128 => 16,
            Self::I64 | Self::F64 | Self::Complex64 => 8,
            Self::F32 => 4,
        }
    }

    /// Returns true for the complex types
    #[inline]
    pub const fn is_complex(self) -> bool {
        matches!(self, Self::Complex64 | Self::Complex128)
    }

    /// Short lowercase name
    pub const fn short_name(self) -> &'static str {
        match self {
            Self::I64 => "i64",
            Self::F32 => "f32",
            Self::F64 => "f64",
            Self::Complex64 => "c64",
            Self::Complex128 => "c128",
        }
    }

    /// Inverse of the `repr(u8)` discriminant, used when reading dumps
    pub const fn from_u8(tag: u8) -> Option<Self> {
        match tag {
            0 => Some(Self::I64),
            1 => Some(Self::F32),
            2 => Some(Self::F64),
            3 => Some(Self::Complex64),
            4 => Some(Self::Complex128),
            _ => None,
        }
    }
}

impl fmt::Display for DType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.short_name())
    }
}
