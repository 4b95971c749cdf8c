use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::ScreeningId;

/// Read-only reference data owned by the scheduling side. The only field
/// this crate writes is the `available_seats` projection.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Screening {
    pub id: ScreeningId,
    pub movie_id: i64,
    pub movie_title: String,
    pub room_id: i64,
    pub room_name: String,
    pub room_capacity: u32,
    pub starts_at: DateTime<Utc>,
    pub base_price_cents: i64,
    pub total_seats: u32,
    /// Seats not yet sold. Recomputed from seat state on every write.
    pub available_seats: u32,
    pub active: bool,
}

impl Screening {
    pub fn summary(&self) -> ScreeningSummary {
        ScreeningSummary {
            screening_id: self.id,
            movie_id: self.movie_id,
            movie_title: self.movie_title.clone(),
            starts_at: self.starts_at,
            room_name: self.room_name.clone(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScreeningSummary {
    pub screening_id: ScreeningId,
    pub movie_id: i64,
    pub movie_title: String,
    pub starts_at: DateTime<Utc>,
    pub room_name: String,
}
