//! Seat label ↔ passenger-facing sequential number.
//!
//! Labels are stored as a row letter plus a row number (`"B3"`); the letter is
//! the 0-based offset inside the row and the number is the 1-based row index.
//! Passengers see a single ordinal counting front-to-back, left-to-right:
//!
//! ```text
//! sequential = (row - 1) * row_width + letter_offset + 1
//! ```

use std::collections::HashSet;
use core::str::FromStr;

use serde::{Deserialize, Serialize};

use busline_core::{DomainError, DomainResult, ValueObject};

use crate::layout::SeatLayout;

/// Storage-level seat label: row letter + 1-based row number.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct SeatLabel {
    letter: char,
    row: u32,
}

impl ValueObject for SeatLabel {}

impl SeatLabel {
    pub fn new(letter: char, row: u32) -> DomainResult<Self> {
        let letter = letter.to_ascii_uppercase();
        if !letter.is_ascii_uppercase() {
            return Err(DomainError::validation(format!(
                "seat letter must be A-Z, got '{letter}'"
            )));
        }
        if row == 0 {
            return Err(DomainError::validation("seat row numbers start at 1"));
        }
        Ok(Self { letter, row })
    }

    /// Label of the seat holding `number` on a bus with `layout`.
    pub fn from_sequential_number(number: u32, layout: SeatLayout) -> DomainResult<Self> {
        if number == 0 {
            return Err(DomainError::validation("sequential seat numbers start at 1"));
        }
        let width = layout.row_width();
        let offset = (number - 1) % width;
        if offset >= 26 {
            return Err(DomainError::validation(format!(
                "layout {layout} is too wide for single-letter seat labels"
            )));
        }
        let letter = char::from(b'A' + offset as u8);
        Self::new(letter, (number - 1) / width + 1)
    }

    pub fn letter(&self) -> char {
        self.letter
    }

    /// 1-based row index.
    pub fn row(&self) -> u32 {
        self.row
    }

    /// 0-based position inside the row (`A` = 0).
    pub fn letter_offset(&self) -> u32 {
        u32::from(self.letter) - u32::from('A')
    }

    /// Sequential number under `layout`, or `None` when the letter falls
    /// outside the row.
    pub fn sequential_number(&self, layout: SeatLayout) -> Option<u32> {
        let width = layout.row_width();
        let offset = self.letter_offset();
        if offset >= width {
            return None;
        }
        (self.row - 1)
            .checked_mul(width)
            .and_then(|n| n.checked_add(offset + 1))
    }
}

impl core::fmt::Display for SeatLabel {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "{}{}", self.letter, self.row)
    }
}

impl FromStr for SeatLabel {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        let mut chars = s.chars();
        let letter = chars
            .next()
            .ok_or_else(|| DomainError::validation("empty seat label"))?;
        let digits = chars.as_str();
        if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
            return Err(DomainError::validation(format!(
                "invalid seat label '{s}', expected a letter followed by a row number"
            )));
        }
        let row: u32 = digits
            .parse()
            .map_err(|_| DomainError::validation(format!("seat row out of range in '{s}'")))?;
        Self::new(letter, row)
    }
}

impl TryFrom<String> for SeatLabel {
    type Error = DomainError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<SeatLabel> for String {
    fn from(value: SeatLabel) -> Self {
        value.to_string()
    }
}

/// What a passenger is shown for a seat.
///
/// `Raw` carries a label the codec could not resolve; it is displayed as-is
/// and sorts after every resolved number.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(untagged)]
pub enum SeatNumber {
    Sequential(u32),
    Raw(String),
}

impl core::fmt::Display for SeatNumber {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            SeatNumber::Sequential(n) => write!(f, "{n}"),
            SeatNumber::Raw(label) => f.write_str(label),
        }
    }
}

/// Translates labels for one bus, resolved against its known seat set.
#[derive(Debug, Clone)]
pub struct SeatLayoutCodec {
    layout: SeatLayout,
    known: HashSet<SeatLabel>,
}

impl SeatLayoutCodec {
    pub fn new(layout: SeatLayout, labels: impl IntoIterator<Item = SeatLabel>) -> Self {
        Self {
            layout,
            known: labels.into_iter().collect(),
        }
    }

    pub fn layout(&self) -> SeatLayout {
        self.layout
    }

    /// Resolve a stored label to the passenger-facing number.
    ///
    /// Never fails: unparseable labels, labels not on this bus, and labels
    /// whose letter lies outside the row all come back unchanged.
    pub fn to_sequential_number(&self, label: &str) -> SeatNumber {
        let resolved = label
            .parse::<SeatLabel>()
            .ok()
            .filter(|parsed| self.known.contains(parsed))
            .and_then(|parsed| parsed.sequential_number(self.layout));

        match resolved {
            Some(n) => SeatNumber::Sequential(n),
            None => SeatNumber::Raw(label.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::layout::generate_seats;
    use proptest::prelude::*;

    fn layout(s: &str) -> SeatLayout {
        s.parse().unwrap()
    }

    fn codec_for(layout: SeatLayout, total: u32) -> SeatLayoutCodec {
        let seats = generate_seats(layout, total).unwrap();
        SeatLayoutCodec::new(layout, seats.into_iter().map(|s| s.label))
    }

    #[test]
    fn b2_on_two_by_two_is_six() {
        let label: SeatLabel = "B2".parse().unwrap();
        assert_eq!(label.row(), 2);
        assert_eq!(label.letter_offset(), 1);
        assert_eq!(label.sequential_number(layout("2x2")), Some(6));

        let codec = codec_for(layout("2x2"), 40);
        assert_eq!(codec.to_sequential_number("B2"), SeatNumber::Sequential(6));
    }

    #[test]
    fn a1_on_two_by_three_is_one() {
        let codec = codec_for(layout("2x3"), 45);
        assert_eq!(codec.to_sequential_number("A1"), SeatNumber::Sequential(1));
        assert_eq!(codec.to_sequential_number("E1"), SeatNumber::Sequential(5));
        assert_eq!(codec.to_sequential_number("A2"), SeatNumber::Sequential(6));
    }

    #[test]
    fn zero_padded_rows_parse() {
        let label: SeatLabel = "c07".parse().unwrap();
        assert_eq!(label.to_string(), "C7");
    }

    #[test]
    fn unresolvable_labels_come_back_unchanged() {
        let codec = codec_for(layout("2x2"), 12);
        // Not a label at all.
        assert_eq!(codec.to_sequential_number("17"), SeatNumber::Raw("17".into()));
        // Well-formed but not on this bus.
        assert_eq!(codec.to_sequential_number("A9"), SeatNumber::Raw("A9".into()));
        // Letter outside a 4-wide row.
        assert_eq!(codec.to_sequential_number("E1"), SeatNumber::Raw("E1".into()));
    }

    #[test]
    fn malformed_labels_rejected() {
        for bad in ["", "A", "1A", "A0", "Ax", "#3"] {
            assert!(bad.parse::<SeatLabel>().is_err(), "{bad} should not parse");
        }
    }

    #[test]
    fn seat_number_displays_plainly() {
        assert_eq!(SeatNumber::Sequential(6).to_string(), "6");
        assert_eq!(SeatNumber::Raw("Z9".into()).to_string(), "Z9");
    }

    proptest! {
        /// Sequential numbering is an order-preserving bijection onto
        /// `1..=total` for every fully generated bus.
        #[test]
        fn numbering_is_row_major_bijection(
            wide in any::<bool>(),
            total in 10u32..=60,
        ) {
            let layout = if wide { layout("2x3") } else { layout("2x2") };
            let seats = generate_seats(layout, total).unwrap();
            let codec = SeatLayoutCodec::new(layout, seats.iter().map(|s| s.label));

            let numbers: Vec<u32> = seats
                .iter()
                .map(|s| match codec.to_sequential_number(&s.label.to_string()) {
                    SeatNumber::Sequential(n) => n,
                    SeatNumber::Raw(raw) => panic!("unresolved label {raw}"),
                })
                .collect();

            let expected: Vec<u32> = (1..=total).collect();
            prop_assert_eq!(numbers, expected);

            for seat in &seats {
                let back = SeatLabel::from_sequential_number(seat.number, layout).unwrap();
                prop_assert_eq!(back, seat.label);
            }
        }
    }
}
