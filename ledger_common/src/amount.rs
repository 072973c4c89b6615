use std::{
    fmt::Display,
    iter::Sum,
    ops::{Add, AddAssign, Neg, Sub, SubAssign},
};

use serde::{Deserialize, Serialize};
use sqlx::Type;
use thiserror::Error;

use crate::op;

//--------------------------------------       Amount        ---------------------------------------------------------
/// A balance amount, expressed in the smallest indivisible unit of the asset.
///
/// Amounts are signed so that ledger deltas (debits and credits) can be expressed with the same type as balances.
#[derive(Debug, Clone, Copy, Default, Type, Ord, PartialOrd, Hash, Serialize, Deserialize)]
#[sqlx(transparent)]
pub struct Amount(i64);

op!(binary Amount, Add, add);
op!(binary Amount, Sub, sub);
op!(inplace Amount, AddAssign, add_assign);
op!(inplace Amount, SubAssign, sub_assign);
op!(unary Amount, Neg, neg);

impl Sum for Amount {
    fn sum<I: Iterator<Item = Self>>(iter: I) -> Self {
        iter.fold(Self::default(), Add::add)
    }
}

#[derive(Debug, Clone, Error)]
#[error("Value cannot be represented as an amount: {0}")]
pub struct AmountConversionError(String);

impl From<i64> for Amount {
    fn from(value: i64) -> Self {
        Self(value)
    }
}

impl PartialEq for Amount {
    fn eq(&self, other: &Self) -> bool {
        self.0 == other.0
    }
}

impl Eq for Amount {}

impl TryFrom<u64> for Amount {
    type Error = AmountConversionError;

    fn try_from(value: u64) -> Result<Self, Self::Error> {
        if value > i64::MAX as u64 {
            Err(AmountConversionError(format!("Value {value} is too large to convert to an Amount")))
        } else {
            #[allow(clippy::cast_possible_wrap)]
            Ok(Self(value as i64))
        }
    }
}

impl Display for Amount {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl Amount {
    pub const fn zero() -> Self {
        Self(0)
    }

    pub fn value(&self) -> i64 {
        self.0
    }

    pub fn is_zero(&self) -> bool {
        self.0 == 0
    }

    pub fn is_positive(&self) -> bool {
        self.0 > 0
    }

    pub fn is_negative(&self) -> bool {
        self.0 < 0
    }

    /// Addition that reports overflow rather than wrapping. Balances are summed from untrusted history, so the
    /// ledger uses this wherever a result is persisted.
    pub fn checked_add(self, rhs: Self) -> Option<Self> {
        self.0.checked_add(rhs.0).map(Self)
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn arithmetic() {
        let a = Amount::from(100);
        let b = Amount::from(30);
        assert_eq!(a - b, Amount::from(70));
        assert_eq!(a + b, Amount::from(130));
        assert_eq!(-b, Amount::from(-30));
        let mut c = a;
        c -= b;
        c += Amount::from(5);
        assert_eq!(c, Amount::from(75));
        assert!((-b).is_negative());
        assert!(Amount::zero().is_zero());
    }

    #[test]
    fn sum_of_deltas() {
        let deltas = [100, -30, 30, -25].into_iter().map(Amount::from);
        assert_eq!(deltas.sum::<Amount>(), Amount::from(75));
    }

    #[test]
    fn conversion_limits() {
        assert!(Amount::try_from(u64::MAX).is_err());
        assert_eq!(Amount::try_from(42u64).unwrap().value(), 42);
        assert!(Amount::from(i64::MAX).checked_add(Amount::from(1)).is_none());
    }

    #[test]
    fn serde_is_transparent() {
        let json = serde_json::to_string(&Amount::from(1500)).unwrap();
        assert_eq!(json, "1500");
    }
}
