//! Fixed-point money in minor currency units.
//!
//! All amounts in the engine are integers of the currency's minor unit
//! (cents). Equality is exact integer comparison; there is no floating-point
//! arithmetic anywhere on a money path. Operations that can overflow return
//! `None` and are surfaced as domain errors by callers.

use serde::{Deserialize, Serialize};

/// An amount in minor currency units (e.g. cents).
#[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Money(i64);

impl Money {
    pub const ZERO: Money = Money(0);

    /// From minor units (1500.00 == `from_minor(150_000)`).
    pub const fn from_minor(minor: i64) -> Self {
        Self(minor)
    }

    /// From whole major units; `None` on overflow.
    pub fn from_major(major: i64) -> Option<Self> {
        major.checked_mul(100).map(Self)
    }

    pub const fn minor(&self) -> i64 {
        self.0
    }

    pub const fn is_zero(&self) -> bool {
        self.0 == 0
    }

    pub const fn is_positive(&self) -> bool {
        self.0 > 0
    }

    pub const fn is_negative(&self) -> bool {
        self.0 < 0
    }

    pub fn checked_add(self, other: Money) -> Option<Money> {
        self.0.checked_add(other.0).map(Money)
    }

    pub fn checked_sub(self, other: Money) -> Option<Money> {
        self.0.checked_sub(other.0).map(Money)
    }

    /// Addition that pins at the representable extremes instead of wrapping;
    /// used only for report accumulators, never for balances.
    pub fn saturating_add(self, other: Money) -> Money {
        Money(self.0.saturating_add(other.0))
    }

    /// `quantity x unit price`, widened through i128 so the overflow check is
    /// exact before narrowing back.
    pub fn checked_mul_quantity(self, quantity: u32) -> Option<Money> {
        let wide = (self.0 as i128).checked_mul(quantity as i128)?;
        i64::try_from(wide).ok().map(Money)
    }

    /// Sum of amounts; `None` if any step overflows.
    pub fn checked_sum<I: IntoIterator<Item = Money>>(amounts: I) -> Option<Money> {
        amounts
            .into_iter()
            .try_fold(Money::ZERO, |acc, m| acc.checked_add(m))
    }
}

impl core::fmt::Display for Money {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        let sign = if self.0 < 0 { "-" } else { "" };
        let abs = self.0.unsigned_abs();
        write!(f, "{sign}{}.{:02}", abs / 100, abs % 100)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_formats_minor_units() {
        assert_eq!(Money::from_minor(150_000).to_string(), "1500.00");
        assert_eq!(Money::from_minor(5).to_string(), "0.05");
        assert_eq!(Money::from_minor(-1250).to_string(), "-12.50");
        assert_eq!(Money::ZERO.to_string(), "0.00");
    }

    #[test]
    fn from_major_scales_to_cents() {
        assert_eq!(Money::from_major(1500), Some(Money::from_minor(150_000)));
        assert_eq!(Money::from_major(i64::MAX), None);
    }

    #[test]
    fn quantity_multiplication_is_exact() {
        let price = Money::from_minor(1999);
        assert_eq!(price.checked_mul_quantity(3), Some(Money::from_minor(5997)));
        assert_eq!(Money::from_minor(i64::MAX).checked_mul_quantity(2), None);
    }

    #[test]
    fn checked_sum_detects_overflow() {
        let amounts = vec![Money::from_minor(100), Money::from_minor(250)];
        assert_eq!(Money::checked_sum(amounts), Some(Money::from_minor(350)));

        let overflow = vec![Money::from_minor(i64::MAX), Money::from_minor(1)];
        assert_eq!(Money::checked_sum(overflow), None);
    }
}
