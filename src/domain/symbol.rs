//! Listing symbol resolution for Taiwan equities.

use crate::domain::error::ForecastError;
use std::fmt;

/// Codes numerically below this are exchange-listed; the rest trade OTC.
const TPEX_CODE_START: u32 = 10_000;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Board {
    /// Taiwan Stock Exchange.
    Twse,
    /// Taipei Exchange (OTC).
    Tpex,
}

impl Board {
    pub fn suffix(self) -> &'static str {
        match self {
            Board::Twse => "TW",
            Board::Tpex => "TWO",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ListingSymbol {
    pub code: String,
    pub board: Board,
}

impl ListingSymbol {
    pub fn parse(input: &str) -> Result<Self, ForecastError> {
        let code = input.trim();
        let invalid = |reason: &str| ForecastError::InvalidSymbol {
            code: code.to_string(),
            reason: reason.to_string(),
        };
        if code.is_empty() {
            return Err(invalid("empty code"));
        }
        if !code.chars().all(|c| c.is_ascii_digit()) {
            return Err(invalid("code must be numeric"));
        }
        if !(4..=6).contains(&code.len()) {
            return Err(invalid("code must have 4 to 6 digits"));
        }
        let number: u32 = code.parse().map_err(|_| invalid("code out of range"))?;
        let board = if number < TPEX_CODE_START {
            Board::Twse
        } else {
            Board::Tpex
        };
        Ok(Self {
            code: code.to_string(),
            board,
        })
    }
}

impl fmt::Display for ListingSymbol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.code, self.board.suffix())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn four_digit_codes_are_exchange_listed() {
        let s = ListingSymbol::parse("2330").unwrap();
        assert_eq!(s.board, Board::Twse);
        assert_eq!(s.to_string(), "2330.TW");
        assert_eq!(ListingSymbol::parse(" 4979 ").unwrap().to_string(), "4979.TW");
    }

    #[test]
    fn large_codes_are_otc() {
        let s = ListingSymbol::parse("10001").unwrap();
        assert_eq!(s.board, Board::Tpex);
        assert_eq!(s.to_string(), "10001.TWO");
    }

    #[test]
    fn leading_zero_codes_keep_their_text() {
        let s = ListingSymbol::parse("0050").unwrap();
        assert_eq!(s.to_string(), "0050.TW");
    }

    #[test]
    fn rejects_non_numeric_and_bad_length() {
        assert!(ListingSymbol::parse("").is_err());
        assert!(ListingSymbol::parse("23A0").is_err());
        assert!(ListingSymbol::parse("233").is_err());
        assert!(matches!(
            ListingSymbol::parse("1234567"),
            Err(ForecastError::InvalidSymbol { .. })
        ));
    }
}
