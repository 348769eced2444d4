//! Exact dyadic rational arithmetic (spec §4.A, component A).
//!
//! `Rat` backs the cursor normaliser's ascend/descend multiplications and the
//! scene builder's window ascent: the only two places in this crate where
//! exact position preservation (spec §8 property 2) must hold regardless of
//! nesting depth. Every other hot path (scene descent, the byte adapter) uses
//! plain `f64`.

use num_bigint::BigInt;
use num_integer::Integer;
use num_traits::{Signed, Zero};

use crate::{Error, Result};

/// A reduced fraction `n / d` with `d > 0` and `gcd(|n|, d) = 1`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Rat {
    n: BigInt,
    d: BigInt,
}

impl Rat {
    pub fn zero() -> Self {
        Rat { n: BigInt::zero(), d: BigInt::from(1) }
    }

    pub fn one() -> Self {
        Rat { n: BigInt::from(1), d: BigInt::from(1) }
    }

    /// Constructs `n / d`, reducing to lowest terms with a positive
    /// denominator. Fails with `ArithmeticError` if `d == 0`.
    pub fn new(n: impl Into<BigInt>, d: impl Into<BigInt>) -> Result<Self> {
        let n = n.into();
        let d = d.into();
        if d.is_zero() {
            return Err(Error::ArithmeticError {
                detail: "zero denominator".into(),
            });
        }
        Ok(Self::reduce(n, d))
    }

    /// Forces a positive denominator and divides out the gcd.
    fn reduce(mut n: BigInt, mut d: BigInt) -> Self {
        if d.is_negative() {
            n = -n;
            d = -d;
        }
        if n.is_zero() {
            return Rat { n: BigInt::zero(), d: BigInt::from(1) };
        }
        let g = n.abs().gcd(&d);
        if g > BigInt::from(1) {
            n /= &g;
            d /= &g;
        }
        Rat { n, d }
    }

    pub fn numerator(&self) -> &BigInt {
        &self.n
    }

    pub fn denominator(&self) -> &BigInt {
        &self.d
    }

    pub fn add(&self, other: &Self) -> Self {
        Self::reduce(
            &self.n * &other.d + &other.n * &self.d,
            &self.d * &other.d,
        )
    }

    pub fn sub(&self, other: &Self) -> Self {
        Self::reduce(
            &self.n * &other.d - &other.n * &self.d,
            &self.d * &other.d,
        )
    }

    pub fn mul(&self, other: &Self) -> Self {
        Self::reduce(&self.n * &other.n, &self.d * &other.d)
    }

    /// Fails with `ArithmeticError` if `other` is zero.
    pub fn div(&self, other: &Self) -> Result<Self> {
        if other.n.is_zero() {
            return Err(Error::ArithmeticError {
                detail: "division by zero rational".into(),
            });
        }
        Ok(Self::reduce(&self.n * &other.d, &self.d * &other.n))
    }

    pub fn lt(&self, other: &Self) -> bool {
        &self.n * &other.d < &other.n * &self.d
    }

    pub fn gte(&self, other: &Self) -> bool {
        !self.lt(other)
    }

    /// Extracts the exact IEEE-754 bit pattern of `f` into a `Rat`. Every
    /// finite `f64` is representable exactly. Sub-normals use exponent
    /// `1 - 1023 - 52 = -1074`; normals use the biased exponent with an
    /// implicit leading 1 bit.
    pub fn from_float(f: f64) -> Result<Self> {
        if !f.is_finite() {
            return Err(Error::ArithmeticError {
                detail: format!("non-finite float {f}"),
            });
        }
        if f == 0.0 {
            return Ok(Self::zero());
        }
        let bits = f.to_bits();
        let sign: i64 = if bits >> 63 == 1 { -1 } else { 1 };
        let biased_exponent = ((bits >> 52) & 0x7ff) as i64;
        let mantissa = bits & ((1u64 << 52) - 1);

        let (significand, exponent): (BigInt, i64) = if biased_exponent == 0 {
            (BigInt::from(mantissa), 1 - 1023 - 52)
        } else {
            let implicit = mantissa | (1u64 << 52);
            (BigInt::from(implicit), biased_exponent - 1023 - 52)
        };

        let signed = BigInt::from(sign) * significand;
        if exponent >= 0 {
            Ok(Self::reduce(signed << (exponent as usize), BigInt::from(1)))
        } else {
            Ok(Self::reduce(signed, BigInt::from(1) << ((-exponent) as usize)))
        }
    }

    /// Converts back to `f64`. Divides directly when both `n` and `d` fit in
    /// about 1023 bits; otherwise right-shifts both to about 53 significant
    /// bits and compensates with a power-of-two scale, so the result never
    /// needlessly overflows or loses more precision than an `f64` already
    /// would.
    pub fn to_float(&self) -> f64 {
        if self.n.is_zero() {
            return 0.0;
        }
        const SAFE_BITS: u64 = 1023;
        let n_bits = self.n.bits();
        let d_bits = self.d.bits();
        if n_bits <= SAFE_BITS && d_bits <= SAFE_BITS {
            return big_to_f64_lossy(&self.n) / big_to_f64_lossy(&self.d);
        }
        const TARGET_BITS: u64 = 53;
        let n_shift = n_bits.saturating_sub(TARGET_BITS) as usize;
        let d_shift = d_bits.saturating_sub(TARGET_BITS) as usize;
        let n_small = &self.n >> n_shift;
        let d_small = &self.d >> d_shift;
        let ratio = big_to_f64_lossy(&n_small) / big_to_f64_lossy(&d_small);
        let scale_exp = n_shift as i32 - d_shift as i32;
        ratio * 2f64.powi(scale_exp)
    }
}

/// `BigInt::to_f64` loses precision beyond 53 bits by construction of `f64`
/// itself; for values already bounded to ~1023 bits of exponent this matches
/// what any float division would do.
fn big_to_f64_lossy(n: &BigInt) -> f64 {
    use num_traits::ToPrimitive;
    n.to_f64().unwrap_or_else(|| if n.is_negative() { f64::NEG_INFINITY } else { f64::INFINITY })
}

impl crate::Arbitrary for Rat {
    fn random() -> Self {
        use rand::Rng;
        let mut rng = rand::rng();
        let n: i64 = rng.random_range(-1_000_000..=1_000_000);
        let d: i64 = rng.random_range(1..=1_000_000);
        Rat::new(n, d).expect("nonzero denominator")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reduces_to_lowest_terms() {
        let r = Rat::new(4, 8).unwrap();
        assert_eq!(r.numerator(), &BigInt::from(1));
        assert_eq!(r.denominator(), &BigInt::from(2));
    }

    #[test]
    fn negative_denominator_is_normalised() {
        let r = Rat::new(3, -4).unwrap();
        assert_eq!(r.numerator(), &BigInt::from(-3));
        assert_eq!(r.denominator(), &BigInt::from(4));
    }

    #[test]
    fn div_by_zero_is_arithmetic_error() {
        let a = Rat::one();
        let b = Rat::zero();
        assert!(matches!(a.div(&b), Err(Error::ArithmeticError { .. })));
    }

    #[test]
    fn from_float_round_trips_common_values() {
        for f in [0.0, 1.0, -1.0, 0.5, 0.1, 1e-300, 1e300, f64::MIN_POSITIVE] {
            let r = Rat::from_float(f).unwrap();
            assert_eq!(r.to_float(), f, "round trip failed for {f}");
        }
    }

    #[test]
    fn from_float_rejects_non_finite() {
        assert!(matches!(
            Rat::from_float(f64::NAN),
            Err(Error::ArithmeticError { .. })
        ));
        assert!(matches!(
            Rat::from_float(f64::INFINITY),
            Err(Error::ArithmeticError { .. })
        ));
    }

    #[test]
    fn add_sub_mul_agree_with_float_arithmetic() {
        let a = Rat::from_float(0.25).unwrap();
        let b = Rat::from_float(0.125).unwrap();
        assert_eq!(a.add(&b).to_float(), 0.375);
        assert_eq!(a.sub(&b).to_float(), 0.125);
        assert_eq!(a.mul(&b).to_float(), 0.03125);
    }

    #[test]
    fn ordering_matches_float_ordering() {
        let a = Rat::from_float(0.3).unwrap();
        let b = Rat::from_float(0.7).unwrap();
        assert!(a.lt(&b));
        assert!(b.gte(&a));
        assert!(!b.lt(&a));
    }

    #[test]
    fn exact_chain_has_no_drift_across_deep_nesting() {
        // Repeated halving, as the cursor normaliser does at each descent
        // level: exact arithmetic must reproduce 2^-200 exactly, something
        // f64 multiplication alone would round away.
        let half = Rat::new(1, 2).unwrap();
        let mut acc = Rat::one();
        for _ in 0..200 {
            acc = acc.mul(&half);
        }
        let expected = Rat::new(1, BigInt::from(1) << 200usize).unwrap();
        assert_eq!(acc, expected);
    }
}
