//! Arithmetic over GF(256), the field underlying Shamir secret sharing.
//!
//! Elements are single bytes; addition is XOR, multiplication is polynomial
//! multiplication reduced modulo x^8 + x^4 + x^3 + x + 1 (the AES
//! polynomial). The module is private to the Shamir implementation so all
//! constructions go through the validated higher-level API.

use std::ops::{Add, Div, Mul};

/// One element of GF(256).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct Gf256(u8);

impl Gf256 {
    pub(crate) const ZERO: Self = Gf256(0);
    pub(crate) const ONE: Self = Gf256(1);

    #[inline]
    pub(crate) fn new(value: u8) -> Self {
        Self(value)
    }

    #[inline]
    pub(crate) fn value(self) -> u8 {
        self.0
    }

    /// Multiplicative inverse via a^254 = a^-1.
    ///
    /// Callers must not pass zero; the Shamir layer guarantees non-zero
    /// share indices, which is the only place division occurs.
    pub(crate) fn invert(self) -> Self {
        debug_assert!(self.0 != 0, "zero has no inverse in GF(256)");
        let mut acc = self;
        for _ in 0..253 {
            acc = acc * self;
        }
        acc
    }

    /// Evaluate a polynomial (coefficients in increasing degree order) at
    /// `x` using Horner's method.
    pub(crate) fn eval_polynomial(coefficients: &[Self], x: Self) -> Self {
        let mut acc = Self::ZERO;
        for &c in coefficients.iter().rev() {
            acc = acc * x + c;
        }
        acc
    }

    /// Reconstruct f(0) from distinct evaluation points via Lagrange
    /// interpolation, without materializing the polynomial.
    pub(crate) fn lagrange_at_zero(points: &[(Self, Self)]) -> Self {
        let mut acc = Self::ZERO;
        for (i, &(xi, yi)) in points.iter().enumerate() {
            let mut numerator = Self::ONE;
            let mut denominator = Self::ONE;
            for (j, &(xj, _)) in points.iter().enumerate() {
                if i != j {
                    numerator = numerator * xj;
                    // Subtraction and addition coincide in GF(2^8)
                    denominator = denominator * (xj + xi);
                }
            }
            acc = acc + (numerator / denominator) * yi;
        }
        acc
    }
}

impl Add for Gf256 {
    type Output = Self;

    #[allow(clippy::suspicious_arithmetic_impl)]
    fn add(self, rhs: Self) -> Self {
        Self(self.0 ^ rhs.0)
    }
}

impl Mul for Gf256 {
    type Output = Self;

    fn mul(self, rhs: Self) -> Self {
        let mut a = self.0;
        let mut b = rhs.0;
        let mut result = 0u8;
        while b != 0 {
            if b & 1 != 0 {
                result ^= a;
            }
            let carry = a & 0x80;
            a <<= 1;
            if carry != 0 {
                a ^= 0x1B;
            }
            b >>= 1;
        }
        Self(result)
    }
}

impl Div for Gf256 {
    type Output = Self;

    #[allow(clippy::suspicious_arithmetic_impl)]
    fn div(self, rhs: Self) -> Self {
        self * rhs.invert()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn addition_is_xor() {
        assert_eq!((Gf256::new(0x57) + Gf256::new(0x83)).value(), 0xD4);
        assert_eq!((Gf256::new(9) + Gf256::new(9)).value(), 0);
    }

    #[test]
    fn multiplication_matches_known_vector() {
        // 0x57 * 0x83 = 0xC1 in the AES field
        assert_eq!((Gf256::new(0x57) * Gf256::new(0x83)).value(), 0xC1);
        assert_eq!((Gf256::new(0) * Gf256::new(0xFF)).value(), 0);
    }

    #[test]
    fn every_nonzero_element_inverts() {
        for value in 1..=255u8 {
            let element = Gf256::new(value);
            assert_eq!((element * element.invert()).value(), 1, "value {value}");
        }
    }

    #[test]
    fn polynomial_eval_at_zero_yields_constant_term() {
        let coefficients = [Gf256::new(42), Gf256::new(17), Gf256::new(99)];
        assert_eq!(
            Gf256::eval_polynomial(&coefficients, Gf256::ZERO).value(),
            42
        );
    }

    #[test]
    fn lagrange_recovers_constant_term() {
        let coefficients = [Gf256::new(0xAB), Gf256::new(3), Gf256::new(250)];
        let points: Vec<(Gf256, Gf256)> = (1..=3u8)
            .map(|x| {
                let x = Gf256::new(x);
                (x, Gf256::eval_polynomial(&coefficients, x))
            })
            .collect();
        assert_eq!(Gf256::lagrange_at_zero(&points).value(), 0xAB);
    }
}
