//! The CD format uses binary-coded decimal (BCD) extensively in its
//! internal format (track numbers, timestamps etc...), probably in
//! order to make it easier to display those informations on the first
//! CD players.
//!
//! BCD bytes end up verbatim in sector headers and subchannel data so
//! the conversions here must be bit-exact.

use std::fmt;
use std::str::FromStr;

/// Convert a decimal value in the range 0-99 to a packed BCD byte.
/// Values above 99 are not representable and produce garbage, use
/// `Bcd::from_binary` if you need validation.
pub const fn decimal_to_bcd(d: u8) -> u8 {
    ((d / 10) << 4) | (d % 10)
}

/// Convert a packed BCD byte to its decimal value. Invalid nibbles are
/// not rejected, use `Bcd::from_bcd` if you need validation.
pub const fn bcd_to_decimal(b: u8) -> u8 {
    (b >> 4) * 10 + (b & 0xf)
}

/// A single packed BCD value in the range 0-99 (2 digits, 4bits per
/// digit).
#[derive(Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Debug)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Bcd(u8);

impl Bcd {
    /// BCD for 0
    pub const ZERO: Bcd = Bcd(0);

    /// BCD for 1
    pub const ONE: Bcd = Bcd(1);

    /// BCD for 99
    pub const MAX: Bcd = Bcd(0x99);

    /// All the valid BCD values, indexed by their binary value.
    pub const TABLE: [Bcd; 100] = {
        let mut table = [Bcd(0); 100];
        let mut i = 0;

        while i < 100 {
            table[i] = Bcd(decimal_to_bcd(i as u8));
            i += 1;
        }

        table
    };

    /// Build a `Bcd` from an `u8` in BCD format. Returns `None` if
    /// the value provided is not valid BCD.
    pub const fn from_bcd(b: u8) -> Option<Bcd> {
        if b <= 0x99 && (b & 0xf) <= 0x9 {
            Some(Bcd(b))
        } else {
            None
        }
    }

    /// Build a `Bcd` from a binary `u8`. Returns `None` if the value
    /// is greater than 99.
    pub const fn from_binary(b: u8) -> Option<Bcd> {
        if b > 99 {
            None
        } else {
            Some(Bcd::TABLE[b as usize])
        }
    }

    /// Returns the BCD as an u8
    pub const fn bcd(self) -> u8 {
        self.0
    }

    /// Convert the BCD as a binary byte
    pub const fn binary(self) -> u8 {
        bcd_to_decimal(self.0)
    }

    /// Returns the BCD value plus one. Wrap to 0 if `self` is equal
    /// to 99.
    pub const fn wrapping_next(self) -> Bcd {
        let b = self.0;

        if b & 0xf < 9 {
            Bcd(b + 1)
        } else if b < 0x99 {
            Bcd((b & 0xf0) + 0x10)
        } else {
            Bcd(0)
        }
    }
}

impl FromStr for Bcd {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let b = u8::from_str(s).map_err(|_| ())?;

        Bcd::from_binary(b).ok_or(())
    }
}

impl fmt::Display for Bcd {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{:02x}", self.0)
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn conversions() {
        assert!(Bcd::from_bcd(0) == Some(Bcd(0)));
        assert!(Bcd::from_bcd(1) == Some(Bcd(1)));
        assert!(Bcd::from_bcd(0x42) == Some(Bcd(0x42)));
        assert!(Bcd::from_bcd(0x1a).is_none());
        assert!(Bcd::from_bcd(0xf2).is_none());

        assert!(Bcd::from_binary(0) == Some(Bcd(0)));
        assert!(Bcd::from_binary(1) == Some(Bcd(1)));
        assert!(Bcd::from_binary(42) == Some(Bcd(0x42)));
        assert!(Bcd::from_binary(100).is_none());
        assert!(Bcd::from_binary(0xff).is_none());
    }

    #[test]
    fn decimal_round_trip() {
        for d in 0..=99u8 {
            assert_eq!(bcd_to_decimal(decimal_to_bcd(d)), d);
            assert_eq!(Bcd::from_binary(d).unwrap().binary(), d);
        }

        assert_eq!(decimal_to_bcd(59), 0x59);
        assert_eq!(bcd_to_decimal(0x74), 74);
    }

    #[test]
    fn next() {
        assert!(Bcd(0x00).wrapping_next() == Bcd(0x01));
        assert!(Bcd(0x09).wrapping_next() == Bcd(0x10));
        assert!(Bcd(0x59).wrapping_next() == Bcd(0x60));
        assert!(Bcd(0x99).wrapping_next() == Bcd(0x00));
    }

    #[test]
    fn from_str() {
        assert!(Bcd::from_str("00") == Ok(Bcd(0)));
        assert!(Bcd::from_str("0") == Ok(Bcd(0)));
        assert!(Bcd::from_str("04") == Ok(Bcd(4)));
        assert!(Bcd::from_str("99") == Ok(Bcd(0x99)));
        assert!(Bcd::from_str("42") == Ok(Bcd(0x42)));

        assert!(Bcd::from_str("0x00") == Err(()));
        assert!(Bcd::from_str("ab") == Err(()));
        assert!(Bcd::from_str("100") == Err(()));
        assert!(Bcd::from_str("-2") == Err(()));
    }
}
