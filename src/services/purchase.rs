//! Quote and atomic commit of a purchase.
//!
//! `commit` locks every seat of the order, re-checks each one under its lock
//! and then hands the whole purchase to [`Store::commit_purchase`] as a
//! single write. Nothing is written before that call, so a failed commit
//! leaves seats, stock, tickets and payments exactly as they were.

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::HashSet;
use std::sync::Arc;
use tracing::{info, warn};
use uuid::Uuid;

use crate::clock::Clock;
use crate::error::{BookingError, BookingResult};
use crate::events::{SeatAction, SeatChanged};
use crate::models::{
    ClientId, ConcessionLine, PaymentMethod, PricedLine, ReceiptType, Screening, ScreeningId,
    ScreeningSummary, Seat, SeatCode, SeatId, SeatType, Ticket, TicketSummary,
};
use crate::repository::{NewPayment, NewSale, NewTicket, PurchaseWrite, Store};
use crate::services::inventory::{concession_total, InventoryGuard};
use crate::services::ledger::SeatLedger;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct QuotedSeat {
    pub seat_id: SeatId,
    pub seat_code: SeatCode,
    pub seat_type: SeatType,
    pub price_cents: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Quote {
    pub screening: ScreeningSummary,
    pub tickets: Vec<QuotedSeat>,
    pub concessions: Vec<PricedLine>,
    pub ticket_subtotal_cents: i64,
    pub concession_subtotal_cents: i64,
    pub total_cents: i64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PurchaseOrder {
    pub screening_id: ScreeningId,
    pub purchaser_id: ClientId,
    pub seat_ids: Vec<SeatId>,
    pub concessions: Vec<ConcessionLine>,
    pub payment_method: PaymentMethod,
    pub receipt_type: ReceiptType,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Receipt {
    pub confirmation_code: String,
    pub purchased_at: DateTime<Utc>,
    pub total_cents: i64,
    pub ticket_subtotal_cents: i64,
    pub concession_subtotal_cents: i64,
    pub payment_method: PaymentMethod,
    pub receipt_type: ReceiptType,
    pub tickets: Vec<TicketSummary>,
    pub concessions: Vec<PricedLine>,
    pub screening: ScreeningSummary,
}

pub struct PurchaseOrchestrator {
    store: Arc<dyn Store>,
    ledger: Arc<SeatLedger>,
    inventory: Arc<InventoryGuard>,
    clock: Arc<dyn Clock>,
}

impl PurchaseOrchestrator {
    pub fn new(
        store: Arc<dyn Store>,
        ledger: Arc<SeatLedger>,
        inventory: Arc<InventoryGuard>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self { store, ledger, inventory, clock }
    }

    /// Prices a prospective purchase. Seat availability is not checked.
    pub async fn quote(
        &self,
        screening_id: ScreeningId,
        seat_ids: &[SeatId],
        concessions: &[ConcessionLine],
    ) -> BookingResult<Quote> {
        let (screening, seats) = self.resolve(screening_id, seat_ids).await?;
        let priced = self.inventory.price_lines(concessions).await?;

        let tickets: Vec<QuotedSeat> = seats
            .iter()
            .map(|seat| QuotedSeat {
                seat_id: seat.id,
                seat_code: seat.code(),
                seat_type: seat.seat_type,
                price_cents: seat.seat_type.price_for(screening.base_price_cents),
            })
            .collect();

        let ticket_subtotal_cents: i64 = tickets.iter().map(|t| t.price_cents).sum();
        let concession_subtotal_cents = concession_total(&priced);

        Ok(Quote {
            screening: screening.summary(),
            tickets,
            concessions: priced,
            ticket_subtotal_cents,
            concession_subtotal_cents,
            total_cents: ticket_subtotal_cents + concession_subtotal_cents,
        })
    }

    /// Sells every seat of the order to its purchaser together with the
    /// concession lines, or changes nothing.
    pub async fn commit(&self, order: PurchaseOrder) -> BookingResult<Receipt> {
        let (screening, _) = self.resolve(order.screening_id, &order.seat_ids).await?;

        let mut events = Vec::new();
        let guards = self.ledger.lock_seats(&order.seat_ids).await;
        let outcome = self.commit_locked(&order, &screening, &mut events).await;
        self.ledger.publish_all(events).await;
        drop(guards);

        match &outcome {
            Ok(receipt) => info!(
                "Purchase {} committed: {} seats for client {}, total {}",
                receipt.confirmation_code,
                receipt.tickets.len(),
                order.purchaser_id,
                receipt.total_cents
            ),
            Err(e) => warn!("Purchase by client {} aborted: {}", order.purchaser_id, e),
        }
        outcome
    }

    async fn commit_locked(
        &self,
        order: &PurchaseOrder,
        screening: &Screening,
        events: &mut Vec<SeatChanged>,
    ) -> BookingResult<Receipt> {
        let now = self.clock.now();

        let mut seats = Vec::with_capacity(order.seat_ids.len());
        for &seat_id in &order.seat_ids {
            let seat = self
                .ledger
                .check_confirmable(seat_id, order.purchaser_id, now, events)
                .await?;
            seats.push(seat);
        }

        let priced = self.inventory.price_lines(&order.concessions).await?;
        let concession_subtotal_cents = concession_total(&priced);

        let tickets: Vec<NewTicket> = seats
            .iter()
            .map(|seat| NewTicket {
                screening_id: screening.id,
                seat_id: seat.id,
                seat_code: seat.code(),
                client_id: order.purchaser_id,
                price_cents: seat.seat_type.price_for(screening.base_price_cents),
                issued_at: now,
            })
            .collect();
        let ticket_subtotal_cents: i64 = tickets.iter().map(|t| t.price_cents).sum();
        let total_cents = ticket_subtotal_cents + concession_subtotal_cents;

        let write = PurchaseWrite {
            screening_id: screening.id,
            purchaser_id: order.purchaser_id,
            seats: order.seat_ids.clone(),
            debits: priced.iter().map(PricedLine::as_line).collect(),
            tickets,
            payment: NewPayment {
                client_id: order.purchaser_id,
                amount_cents: total_cents,
                method: order.payment_method,
                receipt_type: order.receipt_type,
                confirmation_code: confirmation_code(),
                created_at: now,
            },
            sale: (!priced.is_empty()).then(|| NewSale {
                client_id: order.purchaser_id,
                method: order.payment_method,
                lines: priced.clone(),
            }),
        };

        let committed = self.store.commit_purchase(write).await?;

        for seat in &committed.seats {
            events.push(SeatChanged::from_seat(seat, Some(order.purchaser_id), SeatAction::Confirm, now));
        }

        Ok(Receipt {
            confirmation_code: committed.payment.confirmation_code,
            purchased_at: now,
            total_cents,
            ticket_subtotal_cents,
            concession_subtotal_cents,
            payment_method: order.payment_method,
            receipt_type: order.receipt_type,
            tickets: committed.tickets.iter().map(Ticket::summary).collect(),
            concessions: priced,
            screening: screening.summary(),
        })
    }

    pub async fn tickets_for(&self, client_id: ClientId) -> BookingResult<Vec<Ticket>> {
        let mut tickets = self.store.tickets_for_client(client_id).await?;
        tickets.sort_by_key(|t| (t.issued_at, t.id));
        Ok(tickets)
    }

    /// Checks the screening is on sale and every seat id is distinct and
    /// belongs to it.
    async fn resolve(&self, screening_id: ScreeningId, seat_ids: &[SeatId]) -> BookingResult<(Screening, Vec<Seat>)> {
        if seat_ids.is_empty() {
            return Err(BookingError::InvalidArgument("a purchase needs at least one seat".to_string()));
        }
        let mut seen = HashSet::with_capacity(seat_ids.len());
        if let Some(dup) = seat_ids.iter().find(|id| !seen.insert(**id)) {
            return Err(BookingError::InvalidArgument(format!("seat {} is listed twice", dup)));
        }

        let screening = self.ledger.screening(screening_id).await?;
        if !screening.active {
            return Err(BookingError::Unavailable(format!(
                "screening {} is not open for sale",
                screening_id
            )));
        }

        let mut seats = Vec::with_capacity(seat_ids.len());
        for &seat_id in seat_ids {
            let seat = self.ledger.seat(seat_id).await?;
            if seat.screening_id != screening_id {
                return Err(BookingError::InvalidArgument(format!(
                    "seat {} does not belong to screening {}",
                    seat.code(),
                    screening_id
                )));
            }
            seats.push(seat);
        }
        Ok((screening, seats))
    }
}

/// `CIN-` and 12 uppercase hex digits from a random UUID.
pub fn confirmation_code() -> String {
    let hex = Uuid::new_v4().simple().to_string().to_uppercase();
    format!("CIN-{}", &hex[..12])
}
