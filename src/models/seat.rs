use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;

use super::{ClientId, ScreeningId, SeatId};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SeatState {
    Available,
    Held,
    Sold,
}

impl SeatState {
    pub fn as_str(&self) -> &'static str {
        match self {
            SeatState::Available => "AVAILABLE",
            SeatState::Held => "HELD",
            SeatState::Sold => "SOLD",
        }
    }
}

impl fmt::Display for SeatState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SeatState {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "AVAILABLE" => Ok(SeatState::Available),
            "HELD" => Ok(SeatState::Held),
            "SOLD" => Ok(SeatState::Sold),
            other => Err(format!("unknown seat state '{}'", other)),
        }
    }
}

/// Seat category. Each type carries its price multiplier as a percentage
/// of the screening's base price.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SeatType {
    Ordinary,
    Premium,
}

impl SeatType {
    pub fn multiplier_percent(&self) -> i64 {
        match self {
            SeatType::Ordinary => 100,
            SeatType::Premium => 150,
        }
    }

    /// Price of one seat of this type, rounded half up to the nearest cent.
    pub fn price_for(&self, base_price_cents: i64) -> i64 {
        (base_price_cents * self.multiplier_percent() + 50) / 100
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            SeatType::Ordinary => "ORDINARY",
            SeatType::Premium => "PREMIUM",
        }
    }
}

impl FromStr for SeatType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "ORDINARY" => Ok(SeatType::Ordinary),
            "PREMIUM" => Ok(SeatType::Premium),
            other => Err(format!("unknown seat type '{}'", other)),
        }
    }
}

/// Client-facing seat label: uppercase row letters followed by the 1-based
/// seat number, e.g. `A1`, `C12`, `AB3`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SeatCode {
    pub row: String,
    pub number: u32,
}

impl SeatCode {
    pub fn new(row: impl Into<String>, number: u32) -> Self {
        Self { row: row.into(), number }
    }

    /// Row label for a zero-based row index: A..Z, AA..AZ, BA...
    pub fn row_label(index: usize) -> String {
        let mut n = index + 1;
        let mut letters = Vec::new();
        while n > 0 {
            n -= 1;
            letters.push(b'A' + (n % 26) as u8);
            n /= 26;
        }
        letters.reverse();
        String::from_utf8(letters).unwrap_or_default()
    }

    /// Inverse of [`SeatCode::row_label`]. `None` for anything that is not
    /// a non-empty run of uppercase ASCII letters.
    pub fn row_index(label: &str) -> Option<usize> {
        if label.is_empty() || !label.bytes().all(|b| b.is_ascii_uppercase()) {
            return None;
        }
        let value = label
            .bytes()
            .try_fold(0usize, |acc, b| {
                acc.checked_mul(26)?.checked_add((b - b'A') as usize + 1)
            })?;
        Some(value - 1)
    }

    /// Display order: by row position, then seat number.
    pub fn layout_cmp(&self, other: &SeatCode) -> Ordering {
        let a = SeatCode::row_index(&self.row).unwrap_or(usize::MAX);
        let b = SeatCode::row_index(&other.row).unwrap_or(usize::MAX);
        a.cmp(&b).then(self.number.cmp(&other.number))
    }
}

impl fmt::Display for SeatCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", self.row, self.number)
    }
}

impl FromStr for SeatCode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let split = s
            .find(|c: char| !c.is_ascii_uppercase())
            .ok_or_else(|| format!("seat code '{}' has no number", s))?;
        let (row, digits) = s.split_at(split);
        if row.is_empty() {
            return Err(format!("seat code '{}' has no row", s));
        }
        if digits.starts_with('0') || !digits.bytes().all(|b| b.is_ascii_digit()) {
            return Err(format!("seat code '{}' has an invalid number", s));
        }
        let number: u32 = digits
            .parse()
            .map_err(|_| format!("seat code '{}' has an invalid number", s))?;
        Ok(SeatCode::new(row, number))
    }
}

impl Serialize for SeatCode {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for SeatCode {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        raw.parse().map_err(serde::de::Error::custom)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Seat {
    pub id: SeatId,
    pub screening_id: ScreeningId,
    pub row: String,
    pub number: u32,
    pub seat_type: SeatType,
    pub state: SeatState,
    /// Set if and only if `state == Held`.
    pub holder_id: Option<ClientId>,
    /// Set if and only if `state == Held`.
    pub hold_expires_at: Option<DateTime<Utc>>,
}

impl Seat {
    pub fn code(&self) -> SeatCode {
        SeatCode::new(self.row.clone(), self.number)
    }

    /// A hold is valid on `[held_at, hold_expires_at)`.
    pub fn is_hold_expired(&self, now: DateTime<Utc>) -> bool {
        match (self.state, self.hold_expires_at) {
            (SeatState::Held, Some(expires_at)) => now >= expires_at,
            _ => false,
        }
    }

    /// State as clients should see it: an expired hold reads as available
    /// even before the sweep has reclaimed it.
    pub fn effective_state(&self, now: DateTime<Utc>) -> SeatState {
        if self.is_hold_expired(now) {
            SeatState::Available
        } else {
            self.state
        }
    }

    pub fn is_held_by(&self, client_id: ClientId) -> bool {
        self.state == SeatState::Held && self.holder_id == Some(client_id)
    }

    pub fn mark_available(&mut self) {
        self.state = SeatState::Available;
        self.holder_id = None;
        self.hold_expires_at = None;
    }

    pub fn mark_held(&mut self, holder_id: ClientId, expires_at: DateTime<Utc>) {
        self.state = SeatState::Held;
        self.holder_id = Some(holder_id);
        self.hold_expires_at = Some(expires_at);
    }

    pub fn mark_sold(&mut self) {
        self.state = SeatState::Sold;
        self.holder_id = None;
        self.hold_expires_at = None;
    }
}
