//! Element traits mapping Rust scalar types to distributed matrix entries

use super::DType;
use super::complex::{Complex64, Complex128};
use bytemuck::{Pod, Zeroable};
use num_traits::Float;
use std::fmt::Debug;
use std::ops::{Add, Div, Mul, Neg, Sub};

/// Trait for types that can be stored in a distributed matrix
///
/// # Bounds
/// - `Pod + Zeroable` - entries travel through the transport as raw bytes
/// - `Add + Sub + Mul` - enough arithmetic for reductions and updates
///
/// Integer elements are used for pivot vectors and iteration counts; the
/// factorizations themselves require [`Field`].
pub trait Element:
    Copy
    + Clone
    + Send
    + Sync
    + Pod
    + Zeroable
    + Debug
    + PartialEq
    + 'static
    + Add<Output = Self>
    + Sub<Output = Self>
    + Mul<Output = Self>
{
    /// The corresponding DType for this Rust type
    const DTYPE: DType;

    /// Convert to f64
    ///
    /// For complex types this returns the magnitude.
    fn to_f64(self) -> f64;

    /// Convert from f64 (complex types get a zero imaginary part)
    fn from_f64(v: f64) -> Self;

    /// Zero value
    fn zero() -> Self;

    /// One value
    fn one() -> Self;
}

/// Scalars the factorizations operate on: real or complex floating point
///
/// Method names carry a suffix where they would otherwise collide with the
/// inherent float methods.
pub trait Field: Element + Div<Output = Self> + Neg<Output = Self> {
    /// The underlying real type
    type Real: RealField;

    /// Whether this type has an imaginary part
    const IS_COMPLEX: bool;

    /// Embed a real value
    fn from_real(r: Self::Real) -> Self;

    /// Build from real and imaginary parts (the imaginary part is dropped for
    /// real types)
    fn from_parts(re: Self::Real, im: Self::Real) -> Self;

    /// Real part
    fn real_part(self) -> Self::Real;

    /// Imaginary part (zero for real types)
    fn imag_part(self) -> Self::Real;

    /// Complex conjugate (identity for real types)
    fn conj(self) -> Self;

    /// Absolute value / modulus
    fn abs_val(self) -> Self::Real;

    /// Squared modulus
    fn abs_sq(self) -> Self::Real;

    /// Multiply by a real scalar
    #[inline]
    fn scale_by(self, r: Self::Real) -> Self {
        self * Self::from_real(r)
    }
}

/// Real floating point scalars
pub trait RealField: Field<Real = Self> + PartialOrd {
    /// Square root
    fn sqrt_val(self) -> Self;

    /// Natural logarithm
    fn ln_val(self) -> Self;

    /// Exponential
    fn exp_val(self) -> Self;

    /// Machine epsilon
    fn epsilon_val() -> Self;

    /// NaN check
    fn is_nan_val(self) -> bool;

    /// Larger of two values, ignoring NaN like `f64::max`
    fn max_val(self, other: Self) -> Self;
}

macro_rules! impl_real {
    ($t:ty, $dtype:expr) => {
        impl Element for $t {
            const DTYPE: DType = $dtype;

            #[inline]
            fn to_f64(self) -> f64 {
                self as f64
            }

            #[inline]
            fn from_f64(v: f64) -> Self {
                v as $t
            }

            #[inline]
            fn zero() -> Self {
                0.0
            }

            #[inline]
            fn one() -> Self {
                1.0
            }
        }

        impl Field for $t {
            type Real = $t;
            const IS_COMPLEX: bool = false;

            #[inline]
            fn from_real(r: $t) -> Self {
                r
            }

            #[inline]
            fn from_parts(re: $t, _im: $t) -> Self {
                re
            }

            #[inline]
            fn real_part(self) -> $t {
                self
            }

            #[inline]
            fn imag_part(self) -> $t {
                0.0
            }

            #[inline]
            fn conj(self) -> Self {
                self
            }

            #[inline]
            fn abs_val(self) -> $t {
                Float::abs(self)
            }

            #[inline]
            fn abs_sq(self) -> $t {
                self * self
            }
        }

        impl RealField for $t {
            #[inline]
            fn sqrt_val(self) -> Self {
                Float::sqrt(self)
            }

            #[inline]
            fn ln_val(self) -> Self {
                Float::ln(self)
            }

            #[inline]
            fn exp_val(self) -> Self {
                Float::exp(self)
            }

            #[inline]
            fn epsilon_val() -> Self {
                <$t as Float>::epsilon()
            }

            #[inline]
            fn is_nan_val(self) -> bool {
                Float::is_nan(self)
            }

            #[inline]
            fn max_val(self, other: Self) -> Self {
                Float::max(self, other)
            }
        }
    };
}

impl_real!(f32, DType::F32);
impl_real!(f64, DType::F64);

macro_rules! impl_complex_field {
    ($t:ty, $real:ty, $dtype:expr) => {
        impl Element for $t {
            const DTYPE: DType = $dtype;

            #[inline]
            fn to_f64(self) -> f64 {
                self.magnitude() as f64
            }

            #[inline]
            fn from_f64(v: f64) -> Self {
                Self::new(v as $real, 0.0)
            }

            #[inline]
            fn zero() -> Self {
                Self::ZERO
            }

            #[inline]
            fn one() -> Self {
                Self::ONE
            }
        }

        impl Field for $t {
            type Real = $real;
            const IS_COMPLEX: bool = true;

            #[inline]
            fn from_real(r: $real) -> Self {
                Self::new(r, 0.0)
            }

            #[inline]
            fn from_parts(re: $real, im: $real) -> Self {
                Self::new(re, im)
            }

            #[inline]
            fn real_part(self) -> $real {
                self.re
            }

            #[inline]
            fn imag_part(self) -> $real {
                self.im
            }

            #[inline]
            fn conj(self) -> Self {
                <$t>::conj(self)
            }

            #[inline]
            fn abs_val(self) -> $real {
                self.magnitude()
            }

            #[inline]
            fn abs_sq(self) -> $real {
                self.magnitude_squared()
            }

            #[inline]
            fn scale_by(self, r: $real) -> Self {
                Self::new(self.re * r, self.im * r)
            }
        }
    };
}

impl_complex_field!(Complex64, f32, DType::Complex64);
impl_complex_field!(Complex128, f64, DType::Complex128);

impl Element for i64 {
    const DTYPE: DType = DType::I64;

    #[inline]
    fn to_f64(self) -> f64 {
        self as f64
    }

    #[inline]
    fn from_f64(v: f64) -> Self {
        v as i64
    }

    #[inline]
    fn zero() -> Self {
        0
    }

    #[inline]
    fn one() -> Self {
        1
    }
}
