//! Bus seat layout: row width, seat typing, and seat generation.
//!
//! A layout descriptor reads `"<left>x<right>"` (e.g. `"2x2"`): seats to the
//! left of the aisle plus seats to the right make one row. Seat type is a pure
//! function of the 1-based position within a row, looked up in a table keyed
//! by row width. Widths without a table entry are rejected when a bus is
//! registered.

use core::str::FromStr;

use serde::{Deserialize, Serialize};

use busline_core::{DomainError, DomainResult, ValueObject};

use crate::codec::SeatLabel;

/// Smallest bus the fleet accepts.
pub const MIN_TOTAL_SEATS: u32 = 10;
/// Largest bus the fleet accepts.
pub const MAX_TOTAL_SEATS: u32 = 60;

/// Widest row a descriptor may describe, one letter per seat.
pub const MAX_ROW_WIDTH: u32 = 26;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SeatType {
    Window,
    Aisle,
    Middle,
}

impl SeatType {
    pub fn as_str(&self) -> &'static str {
        match self {
            SeatType::Window => "window",
            SeatType::Aisle => "aisle",
            SeatType::Middle => "middle",
        }
    }
}

impl FromStr for SeatType {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "window" => Ok(SeatType::Window),
            "aisle" => Ok(SeatType::Aisle),
            "middle" => Ok(SeatType::Middle),
            other => Err(DomainError::validation(format!("unknown seat type '{other}'"))),
        }
    }
}

/// Position → type rules, indexed by row width.
const SEAT_TYPE_RULES: &[(u32, &[SeatType])] = &[
    (
        4,
        &[SeatType::Window, SeatType::Aisle, SeatType::Aisle, SeatType::Window],
    ),
    (
        5,
        &[
            SeatType::Window,
            SeatType::Aisle,
            SeatType::Aisle,
            SeatType::Middle,
            SeatType::Window,
        ],
    ),
];

/// Row layout descriptor (`left x right`). Immutable once a bus is registered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct SeatLayout {
    left: u32,
    right: u32,
}

impl ValueObject for SeatLayout {}

impl SeatLayout {
    pub fn new(left: u32, right: u32) -> DomainResult<Self> {
        if left == 0 || right == 0 {
            return Err(DomainError::validation(
                "seat layout needs at least one seat on each side of the aisle",
            ));
        }
        // Seat letters run A..=Z across a row.
        match left.checked_add(right) {
            Some(width) if width <= MAX_ROW_WIDTH => Ok(Self { left, right }),
            _ => Err(DomainError::validation(format!(
                "seat layout {left}x{right} exceeds {MAX_ROW_WIDTH} seats per row"
            ))),
        }
    }

    pub fn left(&self) -> u32 {
        self.left
    }

    pub fn right(&self) -> u32 {
        self.right
    }

    /// Seats per row.
    pub fn row_width(&self) -> u32 {
        self.left + self.right
    }

    /// Per-position seat types for this layout's width.
    pub fn seat_types(&self) -> DomainResult<&'static [SeatType]> {
        let width = self.row_width();
        SEAT_TYPE_RULES
            .iter()
            .find(|(w, _)| *w == width)
            .map(|(_, types)| *types)
            .ok_or_else(|| {
                DomainError::validation(format!(
                    "unsupported seat layout {self} ({width} seats per row); supported: {}",
                    supported_widths()
                ))
            })
    }

    /// Type of the seat at 1-based `position` in a row.
    pub fn seat_type_at(&self, position: u32) -> DomainResult<SeatType> {
        let types = self.seat_types()?;
        position
            .checked_sub(1)
            .and_then(|idx| types.get(idx as usize))
            .copied()
            .ok_or_else(|| {
                DomainError::validation(format!("position {position} is outside a row of {self}"))
            })
    }
}

fn supported_widths() -> String {
    SEAT_TYPE_RULES
        .iter()
        .map(|(w, _)| w.to_string())
        .collect::<Vec<_>>()
        .join(", ")
}

impl core::fmt::Display for SeatLayout {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "{}x{}", self.left, self.right)
    }
}

impl FromStr for SeatLayout {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || DomainError::validation(format!("invalid seat layout '{s}', expected e.g. 2x2"));
        let (left, right) = s.trim().split_once(['x', 'X']).ok_or_else(invalid)?;
        let left: u32 = left.trim().parse().map_err(|_| invalid())?;
        let right: u32 = right.trim().parse().map_err(|_| invalid())?;
        Self::new(left, right)
    }
}

impl TryFrom<String> for SeatLayout {
    type Error = DomainError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<SeatLayout> for String {
    fn from(value: SeatLayout) -> Self {
        value.to_string()
    }
}

/// One seat produced by [`generate_seats`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SeatSpec {
    pub label: SeatLabel,
    pub seat_type: SeatType,
    /// Passenger-facing sequential number.
    pub number: u32,
}

/// Generate exactly `total_seats` seats, front-to-back and left-to-right.
///
/// Fails for unsupported widths and seat counts outside
/// [`MIN_TOTAL_SEATS`]..=[`MAX_TOTAL_SEATS`].
pub fn generate_seats(layout: SeatLayout, total_seats: u32) -> DomainResult<Vec<SeatSpec>> {
    if !(MIN_TOTAL_SEATS..=MAX_TOTAL_SEATS).contains(&total_seats) {
        return Err(DomainError::validation(format!(
            "total seats must be between {MIN_TOTAL_SEATS} and {MAX_TOTAL_SEATS}, got {total_seats}"
        )));
    }
    let types = layout.seat_types()?;
    let width = layout.row_width();

    let mut seats = Vec::with_capacity(total_seats as usize);
    for number in 1..=total_seats {
        let position = (number - 1) % width;
        seats.push(SeatSpec {
            label: SeatLabel::from_sequential_number(number, layout)?,
            seat_type: types[position as usize],
            number,
        });
    }
    Ok(seats)
}
