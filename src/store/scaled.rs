//! Scaled-integer representation for the cumulative CPU counter.
//!
//! The node agent reports CPU nanoseconds as an unsigned 64-bit counter,
//! which can exceed `i64::MAX` on a long-lived node. Rather than truncate
//! or round-trip through a float, we keep a mantissa that always fits in
//! `i64` plus a decimal exponent, and only ever fall back to floating point
//! at the very last step (producing the output rate in cores).

use std::cmp::Ordering;

/// `value * 10^scale` approximates the original nanosecond count.
///
/// `scale` is 0 for any counter that fits in `i64` as-is, and 1 for the
/// (rare) counter that required one decimal order of magnitude of
/// precision loss to fit. The spec only calls for a single reduction step,
/// not an unbounded loop, so `scale` never exceeds 1.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScaledNanos {
    pub mantissa: i64,
    pub scale: u8,
}

impl ScaledNanos {
    pub fn from_raw(raw: u64) -> Self {
        if raw <= i64::MAX as u64 {
            ScaledNanos { mantissa: raw as i64, scale: 0 }
        } else {
            ScaledNanos { mantissa: (raw / 10) as i64, scale: 1 }
        }
    }

    fn aligned(self, other: Self) -> (i128, i128, u8) {
        let scale = self.scale.max(other.scale);
        let a = (self.mantissa as i128) * 10i128.pow((scale - self.scale) as u32);
        let b = (other.mantissa as i128) * 10i128.pow((scale - other.scale) as u32);
        (a, b, scale)
    }

    /// Signed delta `self - other`, expressed at the larger of the two scales.
    pub fn checked_sub(self, other: Self) -> ScaledDelta {
        let (a, b, scale) = self.aligned(other);
        ScaledDelta { mantissa: a - b, scale }
    }

    /// Approximate magnitude as nanoseconds, used only for the final rate
    /// computation (never for ordering or equality).
    pub fn approx_ns(self) -> f64 {
        self.mantissa as f64 * 10f64.powi(self.scale as i32)
    }
}

impl PartialOrd for ScaledNanos {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for ScaledNanos {
    fn cmp(&self, other: &Self) -> Ordering {
        let (a, b, _) = self.aligned(*other);
        a.cmp(&b)
    }
}

/// The signed difference between two `ScaledNanos`, kept in the same
/// mantissa/exponent shape so downstream arithmetic never has to guess
/// which scale a raw delta was computed at.
#[derive(Debug, Clone, Copy)]
pub struct ScaledDelta {
    pub mantissa: i128,
    pub scale: u8,
}

impl ScaledDelta {
    pub fn approx_ns(self) -> f64 {
        self.mantissa as f64 * 10f64.powi(self.scale as i32)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fits_in_i64_keeps_scale_zero() {
        let v = ScaledNanos::from_raw(1_500_000_000);
        assert_eq!(v.scale, 0);
        assert_eq!(v.mantissa, 1_500_000_000);
    }

    #[test]
    fn overflow_reduces_precision_by_one_order() {
        let raw: u64 = i64::MAX as u64 + 10_000_000_000;
        let v = ScaledNanos::from_raw(raw);
        assert_eq!(v.scale, 1);
        assert_eq!(v.mantissa, (raw / 10) as i64);
        // Round-trips to within one decimal order of magnitude.
        let recovered = v.approx_ns();
        let diff = (recovered - raw as f64).abs();
        assert!(diff < 10.0);
    }

    #[test]
    fn ordering_across_scales() {
        let small = ScaledNanos::from_raw(5_000_000_000);
        let huge = ScaledNanos::from_raw(i64::MAX as u64 + 10_000_000_000);
        assert!(huge > small);
    }

    #[test]
    fn delta_is_positive_for_increasing_counter() {
        let prev = ScaledNanos::from_raw(1_000_000_000);
        let latest = ScaledNanos::from_raw(1_500_000_000);
        let delta = latest.checked_sub(prev);
        assert_eq!(delta.mantissa, 500_000_000);
    }
}
