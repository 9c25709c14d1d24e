use std::{fmt, ops::Neg};

use serde::{Deserialize, Serialize};

pub const TINYBARS_PER_HBAR: i64 = 100_000_000;

/// Native currency amount, stored in tinybars.
#[derive(
    Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Debug, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct Hbar(i64);

impl Hbar {
    pub const ZERO: Self = Self(0);

    pub const fn new(hbars: i64) -> Self {
        Self(hbars * TINYBARS_PER_HBAR)
    }

    pub const fn from_tinybars(tinybars: i64) -> Self {
        Self(tinybars)
    }

    pub const fn to_tinybars(self) -> i64 {
        self.0
    }

    pub fn checked_add(self, other: Self) -> Option<Self> {
        self.0.checked_add(other.0).map(Self)
    }
}

impl Neg for Hbar {
    type Output = Self;

    fn neg(self) -> Self::Output {
        Self(-self.0)
    }
}

impl fmt::Display for Hbar {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.0 % TINYBARS_PER_HBAR == 0 {
            write!(f, "{} ℏ", self.0 / TINYBARS_PER_HBAR)
        } else {
            write!(f, "{} tℏ", self.0)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn displays_whole_and_fractional_amounts() {
        assert_eq!(Hbar::new(2).to_string(), "2 ℏ");
        assert_eq!(Hbar::from_tinybars(150).to_string(), "150 tℏ");
        assert_eq!((-Hbar::new(1)).to_tinybars(), -TINYBARS_PER_HBAR);
    }
}
