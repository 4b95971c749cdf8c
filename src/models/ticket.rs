use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::{ClientId, ScreeningId, SeatCode, SeatId, TicketId};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TicketState {
    Paid,
}

/// Issued once per seat per successful purchase; never modified afterwards.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Ticket {
    pub id: TicketId,
    pub screening_id: ScreeningId,
    pub seat_id: SeatId,
    pub seat_code: SeatCode,
    pub client_id: ClientId,
    pub price_cents: i64,
    pub state: TicketState,
    pub issued_at: DateTime<Utc>,
}

impl Ticket {
    pub fn summary(&self) -> TicketSummary {
        TicketSummary {
            ticket_id: self.id,
            seat_code: self.seat_code.clone(),
            price_cents: self.price_cents,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TicketSummary {
    pub ticket_id: TicketId,
    pub seat_code: SeatCode,
    pub price_cents: i64,
}
