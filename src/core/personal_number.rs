use std::{fmt, str::FromStr};

use chrono::{Datelike, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// A Swedish personal identity number (personnummer) or coordination number
/// (samordningsnummer), kept in the 12 digit `YYYYMMDDNNNC` form the provider expects.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct PersonalNumber(String);

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PersonalNumberError {
    #[error("expected 12 digits, found {0}")]
    Length(usize),
    #[error("unexpected character '{0}'")]
    Character(char),
    #[error("'{0}' is not a valid birth date")]
    Date(String),
    #[error("check digit does not match")]
    CheckDigit,
}

impl PersonalNumber {
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Parse relative to `today`, which decides the century of the ten digit forms.
    ///
    /// Accepts `YYYYMMDDNNNC`, `YYYYMMDD-NNNC`, `YYMMDD-NNNC` and `YYMMDD+NNNC`.
    /// A `+` marks someone who is 100 or older.
    pub fn parse_on(s: &str, today: NaiveDate) -> Result<Self, PersonalNumberError> {
        let mut digits = String::with_capacity(12);
        let mut separator = None;
        for c in s.trim().chars() {
            match c {
                '0'..='9' => digits.push(c),
                '-' | '+' | ' ' if separator.is_none() => separator = Some((c, digits.len())),
                other => return Err(PersonalNumberError::Character(other)),
            }
        }

        if let Some((c, at)) = separator {
            // The separator always sits before the last four digits.
            if digits.len() < 4 || at != digits.len() - 4 || (c == '+' && digits.len() != 10) {
                return Err(PersonalNumberError::Character(c));
            }
        }

        let digits = match digits.len() {
            12 => digits,
            10 => {
                let current = today.year();
                let mut year = current - current.rem_euclid(100) + value(&digits[..2]) as i32;
                if year > current {
                    year -= 100;
                }
                if matches!(separator, Some(('+', _))) {
                    year -= 100;
                }
                format!("{year:04}{digits}")
            }
            n => return Err(PersonalNumberError::Length(n)),
        };

        let year = value(&digits[..4]) as i32;
        let month = value(&digits[4..6]);
        // Coordination numbers add 60 to the day of birth.
        let day = match value(&digits[6..8]) {
            d @ 61..=91 => d - 60,
            d => d,
        };
        if NaiveDate::from_ymd_opt(year, month, day).is_none() {
            return Err(PersonalNumberError::Date(digits[..8].to_owned()));
        }

        if luhn_check_digit(&digits[2..11]) != digits.as_bytes()[11] - b'0' {
            return Err(PersonalNumberError::CheckDigit);
        }

        Ok(Self(digits))
    }
}

impl FromStr for PersonalNumber {
    type Err = PersonalNumberError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse_on(s, Utc::now().date_naive())
    }
}

/// Decimal value of a run of ASCII digits.
fn value(digits: &str) -> u32 {
    digits
        .bytes()
        .fold(0, |acc, b| acc * 10 + u32::from(b - b'0'))
}

/// Luhn check digit over the ten digit short form, excluding the check digit.
fn luhn_check_digit(digits: &str) -> u8 {
    let sum: u32 = digits
        .bytes()
        .enumerate()
        .map(|(i, b)| {
            let d = u32::from(b - b'0') * if i % 2 == 0 { 2 } else { 1 };
            d / 10 + d % 10
        })
        .sum();
    ((10 - sum % 10) % 10) as u8
}

impl TryFrom<String> for PersonalNumber {
    type Error = PersonalNumberError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<PersonalNumber> for String {
    fn from(pn: PersonalNumber) -> Self {
        pn.0
    }
}

impl fmt::Display for PersonalNumber {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}
