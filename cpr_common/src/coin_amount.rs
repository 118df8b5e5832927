use std::{
    fmt::Display,
    iter::Sum,
    ops::{Add, Mul, Neg, Sub, SubAssign},
    str::FromStr,
};

use serde::{Deserialize, Serialize};
use sqlx::Type;
use thiserror::Error;

use crate::op;

/// Number of atoms in one whole coin. Amounts for every supported currency are
/// normalised to this fixed-point scale, which is fine enough for the smallest
/// subdivision of the majors (1 satoshi, 10^-8).
pub const ATOMS_PER_COIN: i64 = 100_000_000;
pub const COIN_DECIMALS: u32 = 8;

//--------------------------------------     CoinAmount       --------------------------------------------------------
/// A currency-agnostic crypto amount, counted in atoms (10^-8 of a whole coin).
///
/// All arithmetic is integer arithmetic. Amounts cross the wire as decimal strings and are
/// converted with [`CoinAmount::from_str`], so no floating point is involved anywhere in the
/// matching or settlement paths.
#[derive(Debug, Clone, Copy, Default, Type, Ord, PartialOrd, Serialize, Deserialize)]
#[sqlx(transparent)]
pub struct CoinAmount(i64);

op!(binary CoinAmount, Add, add);
op!(binary CoinAmount, Sub, sub);
op!(inplace CoinAmount, SubAssign, sub_assign);
op!(unary CoinAmount, Neg, neg);

impl Mul<i64> for CoinAmount {
    type Output = Self;

    fn mul(self, rhs: i64) -> Self::Output {
        Self::from(self.value() * rhs)
    }
}

impl Sum for CoinAmount {
    fn sum<I: Iterator<Item = Self>>(iter: I) -> Self {
        iter.fold(Self::default(), Add::add)
    }
}

#[derive(Debug, Clone, Error)]
pub enum CoinAmountError {
    #[error("Invalid amount: {0}")]
    InvalidAmount(String),
    #[error("Amount has more than {COIN_DECIMALS} decimal places: {0}")]
    TooPrecise(String),
    #[error("Value cannot be represented in atoms: {0}")]
    Overflow(String),
}

impl From<i64> for CoinAmount {
    fn from(value: i64) -> Self {
        Self(value)
    }
}

impl PartialEq for CoinAmount {
    fn eq(&self, other: &Self) -> bool {
        self.0 == other.0
    }
}

impl Eq for CoinAmount {}

impl TryFrom<u64> for CoinAmount {
    type Error = CoinAmountError;

    fn try_from(value: u64) -> Result<Self, Self::Error> {
        if value > i64::MAX as u64 {
            Err(CoinAmountError::Overflow(format!("{value} is too large to convert to CoinAmount")))
        } else {
            #[allow(clippy::cast_possible_wrap)]
            Ok(Self(value as i64))
        }
    }
}

/// Amounts arrive from the deposit APIs as decimal strings, e.g. "100.05".
impl FromStr for CoinAmount {
    type Err = CoinAmountError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        let (negative, digits) = match trimmed.strip_prefix('-') {
            Some(rest) => (true, rest),
            None => (false, trimmed),
        };
        let mut parts = digits.splitn(2, '.');
        let whole = parts
            .next()
            .unwrap_or_default()
            .parse::<i64>()
            .map_err(|e| CoinAmountError::InvalidAmount(format!("{s}: {e}")))?;
        let frac_str = parts.next().unwrap_or("");
        if frac_str.len() as u32 > COIN_DECIMALS {
            return Err(CoinAmountError::TooPrecise(s.to_string()));
        }
        let frac = if frac_str.is_empty() {
            0
        } else {
            format!("{frac_str:0<8}").parse::<i64>().map_err(|e| CoinAmountError::InvalidAmount(format!("{s}: {e}")))?
        };
        let atoms = whole
            .checked_mul(ATOMS_PER_COIN)
            .and_then(|w| w.checked_add(frac))
            .ok_or_else(|| CoinAmountError::Overflow(s.to_string()))?;
        Ok(Self(if negative { -atoms } else { atoms }))
    }
}

impl Display for CoinAmount {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.to_decimal_string())
    }
}

impl CoinAmount {
    pub fn value(&self) -> i64 {
        self.0
    }

    pub fn from_coins(coins: i64) -> Self {
        Self(coins * ATOMS_PER_COIN)
    }

    pub fn is_zero(&self) -> bool {
        self.0 == 0
    }

    /// Renders the amount as a plain decimal string with trailing zeros trimmed, e.g. "100.05".
    pub fn to_decimal_string(&self) -> String {
        let whole = self.0 / ATOMS_PER_COIN;
        let frac = (self.0 % ATOMS_PER_COIN).abs();
        let sign = if self.0 < 0 && whole == 0 { "-" } else { "" };
        if frac == 0 {
            return format!("{sign}{whole}");
        }
        let frac = format!("{frac:08}");
        format!("{sign}{whole}.{}", frac.trim_end_matches('0'))
    }

    /// The inclusive band `[self - delta, self + delta]` where `delta = self * bps / 10_000`.
    /// Computed in i128 so that band math cannot overflow for any representable amount.
    pub fn tolerance_band(&self, bps: i64) -> (CoinAmount, CoinAmount) {
        let delta = ((self.0 as i128 * bps as i128) / 10_000) as i64;
        (Self(self.0 - delta), Self(self.0 + delta))
    }

    /// True when `self` lies within `expected ± expected·bps/10_000`, both edges included.
    pub fn within_tolerance(&self, expected: CoinAmount, bps: i64) -> bool {
        let (lower, upper) = expected.tolerance_band(bps);
        *self >= lower && *self <= upper
    }
}
