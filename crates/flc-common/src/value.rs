use std::fmt::{self, Display};
use std::ops::{Add, Div, Mul, Neg, Sub};

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// A float that remembers whether it was ever actually filled in.
///
/// Report cells are frequently absent: a missing cell reads as `0.0` with
/// the null flag set, so that aggregations can distinguish "a sum of
/// zeroes" from "nothing was there at all". Binary arithmetic propagates
/// the flag by AND — the result is null only when *every* operand was
/// null.
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct NullableFloat {
    value: f64,
    null: bool,
}

impl NullableFloat {
    pub fn new(value: f64) -> Self {
        NullableFloat { value, null: false }
    }

    /// A null value. Reads as `0.0` everywhere a number is needed.
    pub fn null() -> Self {
        NullableFloat {
            value: 0.0,
            null: true,
        }
    }

    /// Parse a cell text. Anything that is not a number yields a null.
    pub fn parse(text: &str) -> Self {
        match text.trim().parse::<f64>() {
            Ok(value) => NullableFloat { value, null: false },
            Err(_) => NullableFloat::null(),
        }
    }

    pub fn value(self) -> f64 {
        self.value
    }

    pub fn is_null(self) -> bool {
        self.null
    }

    pub fn abs(self) -> Self {
        if self.null {
            self
        } else {
            NullableFloat::new(self.value.abs())
        }
    }

    pub fn floor(self) -> Self {
        if self.null {
            self
        } else {
            NullableFloat::new(self.value.floor())
        }
    }

    /// Decimal rounding to `ndigits` fractional digits. Negative `ndigits`
    /// rounds to tens, hundreds and so on.
    pub fn round(self, ndigits: i32) -> Self {
        if self.null {
            return self;
        }
        let scale = 10f64.powi(ndigits);
        NullableFloat::new((self.value * scale).round() / scale)
    }

    /// Format with exactly `ndigits` fractional digits and reparse,
    /// discarding everything beyond them.
    pub fn truncate(self, ndigits: i32) -> Self {
        if self.null {
            return self;
        }
        let text = format!("{:.*}", ndigits.unsigned_abs() as usize, self.value);
        NullableFloat::parse(&text)
    }

    fn combine(self, rhs: Self, value: f64) -> Self {
        NullableFloat {
            value,
            null: self.null && rhs.null,
        }
    }
}

impl Add for NullableFloat {
    type Output = NullableFloat;

    fn add(self, rhs: Self) -> Self::Output {
        self.combine(rhs, self.value + rhs.value)
    }
}

impl Sub for NullableFloat {
    type Output = NullableFloat;

    fn sub(self, rhs: Self) -> Self::Output {
        self.combine(rhs, self.value - rhs.value)
    }
}

impl Mul for NullableFloat {
    type Output = NullableFloat;

    fn mul(self, rhs: Self) -> Self::Output {
        self.combine(rhs, self.value * rhs.value)
    }
}

impl Div for NullableFloat {
    type Output = NullableFloat;

    /// Division by zero leaves the receiver unchanged.
    fn div(self, rhs: Self) -> Self::Output {
        if rhs.value == 0.0 {
            self
        } else {
            self.combine(rhs, self.value / rhs.value)
        }
    }
}

impl Neg for NullableFloat {
    type Output = NullableFloat;

    fn neg(self) -> Self::Output {
        if self.null {
            self
        } else {
            NullableFloat::new(-self.value)
        }
    }
}

impl From<f64> for NullableFloat {
    fn from(value: f64) -> Self {
        NullableFloat::new(value)
    }
}

impl Display for NullableFloat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.value)
    }
}
