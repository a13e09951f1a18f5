//! Complex scalars for distributed matrices
//!
//! `Complex64` and `Complex128` are `#[repr(C)]` pairs of floats so that
//! buffers of them can be packed and shipped through the transport with
//! `bytemuck` casts, exactly like the real types.
//!
//! Arithmetic follows the usual definitions:
//! - Multiplication: `(a+bi)(c+di) = (ac-bd) + (ad+bc)i`
//! - Division: `(a+bi)/(c+di) = (a+bi)*conj(c+di)/|c+di|²`

use bytemuck::{Pod, Zeroable};
use std::fmt;
use std::ops::{Add, Div, Mul, Neg, Sub};

/// Generates a complex type over one float width
macro_rules! impl_complex {
    ($name:ident, $float:ty, $doc_bits:literal, $doc_float:literal) => {
        #[doc = concat!($doc_bits, "-bit complex number with ", $doc_float, " real and imaginary parts")]
        #[repr(C)]
        #[derive(Copy, Clone, Debug, Default, PartialEq, Pod, Zeroable)]
        pub struct $name {
            /// Real part
            pub re: $float,
            /// Imaginary part
            pub im: $float,
        }

        impl $name {
            /// Zero complex number
            pub const ZERO: Self = Self { re: 0.0, im: 0.0 };

            /// One (real unit)
            pub const ONE: Self = Self { re: 1.0, im: 0.0 };

            /// Imaginary unit i
            pub const I: Self = Self { re: 0.0, im: 1.0 };

            /// Create a new complex number
            #[inline]
            pub const fn new(re: $float, im: $float) -> Self {
                Self { re, im }
            }

            /// Magnitude: |z| = sqrt(re² + im²), computed without overflow
            #[inline]
            pub fn magnitude(self) -> $float {
                self.re.hypot(self.im)
            }

            /// Squared magnitude: |z|² = re² + im²
            #[inline]
            pub fn magnitude_squared(self) -> $float {
                self.re * self.re + self.im * self.im
            }

            /// Complex conjugate: conj(a + bi) = a - bi
            #[inline]
            pub fn conj(self) -> Self {
                Self {
                    re: self.re,
                    im: -self.im,
                }
            }

            /// Reciprocal: 1/z = conj(z)/|z|²
            #[inline]
            pub fn recip(self) -> Self {
                Self::ONE / self
            }
        }

        impl Add for $name {
            type Output = Self;

            #[inline]
            fn add(self, rhs: Self) -> Self {
                Self {
                    re: self.re + rhs.re,
                    im: self.im + rhs.im,
                }
            }
        }

        impl Sub for $name {
            type Output = Self;

            #[inline]
            fn sub(self, rhs: Self) -> Self {
                Self {
                    re: self.re - rhs.re,
                    im: self.im - rhs.im,
                }
            }
        }

        impl Mul for $name {
            type Output = Self;

            #[inline]
            fn mul(self, rhs: Self) -> Self {
                Self {
                    re: self.re * rhs.re - self.im * rhs.im,
                    im: self.re * rhs.im + self.im * rhs.re,
                }
            }
        }

        impl Div for $name {
            type Output = Self;

            /// Smith's algorithm, which avoids forming |rhs|² directly
            #[inline]
            fn div(self, rhs: Self) -> Self {
                if rhs.re == 0.0 && rhs.im == 0.0 {
                    return Self {
                        re: <$float>::NAN,
                        im: <$float>::NAN,
                    };
                }
                if rhs.re.abs() >= rhs.im.abs() {
                    let ratio = rhs.im / rhs.re;
                    let denom = rhs.re + rhs.im * ratio;
                    Self {
                        re: (self.re + self.im * ratio) / denom,
                        im: (self.im - self.re * ratio) / denom,
                    }
                } else {
                    let ratio = rhs.re / rhs.im;
                    let denom = rhs.re * ratio + rhs.im;
                    Self {
                        re: (self.re * ratio + self.im) / denom,
                        im: (self.im * ratio - self.re) / denom,
                    }
                }
            }
        }

        impl Neg for $name {
            type Output = Self;

            #[inline]
            fn neg(self) -> Self {
                Self {
                    re: -self.re,
                    im: -self.im,
                }
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                if self.im >= 0.0 {
                    write!(f, "{}+{}i", self.re, self.im)
                } else {
                    write!(f, "{}{}i", self.re, self.im)
                }
            }
        }

        impl From<$float> for $name {
            #[inline]
            fn from(re: $float) -> Self {
                Self { re, im: 0.0 }
            }
        }

        impl From<($float, $float)> for $name {
            #[inline]
            fn from((re, im): ($float, $float)) -> Self {
                Self { re, im }
            }
        }
    };
}

impl_complex!(Complex64, f32, "64", "f32");
impl_complex!(Complex128, f64, "128", "f64");

impl From<Complex64> for Complex128 {
    #[inline]
    fn from(c: Complex64) -> Self {
        Self {
            re: c.re as f64,
            im: c.im as f64,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    macro_rules! test_complex_type {
        ($mod_name:ident, $type_name:ident) => {
            mod $mod_name {
                use super::*;

                #[test]
                fn test_arithmetic() {
                    let a = $type_name::new(1.0, 2.0);
                    let b = $type_name::new(3.0, 4.0);
                    assert_eq!(a + b, $type_name::new(4.0, 6.0));
                    assert_eq!(a - b, $type_name::new(-2.0, -2.0));
                    // (1+2i)(3+4i) = -5 + 10i
                    assert_eq!(a * b, $type_name::new(-5.0, 10.0));
                    assert_eq!(-a, $type_name::new(-1.0, -2.0));
                }

                #[test]
                fn test_division() {
                    // 1/i = -i
                    let q = $type_name::ONE / $type_name::I;
                    assert!(q.re.abs() < 1e-6);
                    assert!((q.im + 1.0).abs() < 1e-6);

                    let a = $type_name::new(-5.0, 10.0);
                    let b = $type_name::new(3.0, 4.0);
                    let q = a / b;
                    assert!((q.re - 1.0).abs() < 1e-5);
                    assert!((q.im - 2.0).abs() < 1e-5);
                }

                #[test]
                fn test_magnitude_and_conj() {
                    let z = $type_name::new(3.0, 4.0);
                    assert_eq!(z.magnitude(), 5.0);
                    assert_eq!(z.magnitude_squared(), 25.0);
                    let w = z * z.conj();
                    assert!((w.re - 25.0).abs() < 1e-5);
                    assert!(w.im.abs() < 1e-5);
                    let r = z.recip() * z;
                    assert!((r.re - 1.0).abs() < 1e-5);
                }
            }
        };
    }

    test_complex_type!(complex64_tests, Complex64);
    test_complex_type!(complex128_tests, Complex128);

    #[test]
    fn test_complex_pod() {
        let z = Complex128::new(3.0, 4.0);
        let bytes = bytemuck::bytes_of(&z);
        assert_eq!(bytes.len(), 16);
        let back: Complex128 = bytemuck::pod_read_unaligned(bytes);
        assert_eq!(back, z);
        assert_eq!(std::mem::size_of::<Complex64>(), 8);
    }
}
