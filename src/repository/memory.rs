use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, MutexGuard};

use super::{
    CommittedPurchase, NewSeat, PurchaseWrite, Store, StoreError, StoreResult,
};
use crate::models::{
    ClientId, ConcessionLine, ConcessionSale, Payment, PaymentStatus, Product, ProductId,
    Screening, ScreeningId, Seat, SeatId, SeatState, Ticket, TicketState,
};

#[derive(Default)]
struct Tables {
    screenings: HashMap<ScreeningId, Screening>,
    seats: BTreeMap<SeatId, Seat>,
    products: HashMap<ProductId, Product>,
    tickets: Vec<Ticket>,
    payments: Vec<Payment>,
    sales: Vec<ConcessionSale>,
    next_id: i64,
}

impl Tables {
    fn next_id(&mut self) -> i64 {
        self.next_id += 1;
        self.next_id
    }

    fn refresh_counts(&mut self, screening_id: ScreeningId) {
        let (total, unsold) = self
            .seats
            .values()
            .filter(|s| s.screening_id == screening_id)
            .fold((0u32, 0u32), |(total, unsold), s| {
                (total + 1, unsold + u32::from(s.state != SeatState::Sold))
            });
        if let Some(screening) = self.screenings.get_mut(&screening_id) {
            screening.total_seats = total;
            screening.available_seats = unsold;
        }
    }

    /// Checks every debit against current stock before anything moves.
    fn check_stock(&self, lines: &[ConcessionLine]) -> StoreResult<()> {
        let mut wanted: BTreeMap<ProductId, u32> = BTreeMap::new();
        for line in lines {
            *wanted.entry(line.product_id).or_default() += line.quantity;
        }
        for (product_id, quantity) in wanted {
            match self.products.get(&product_id) {
                Some(p) if p.active && p.stock >= quantity => {}
                _ => return Err(StoreError::InsufficientStock(product_id)),
            }
        }
        Ok(())
    }

    fn apply_debits(&mut self, lines: &[ConcessionLine]) {
        for line in lines {
            if let Some(p) = self.products.get_mut(&line.product_id) {
                p.stock -= line.quantity;
            }
        }
    }
}

/// Store kept entirely in process memory. One lock guards all tables, so
/// each method is trivially atomic.
#[derive(Default)]
pub struct MemoryStore {
    tables: Mutex<Tables>,
    fail_next_commit: AtomicBool,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn tables(&self) -> MutexGuard<'_, Tables> {
        self.tables.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn insert_screening(&self, screening: Screening) {
        self.tables().screenings.insert(screening.id, screening);
    }

    pub fn insert_product(&self, product: Product) {
        self.tables().products.insert(product.id, product);
    }

    /// Makes the next `commit_purchase` fail as if the backend went away.
    pub fn fail_next_commit(&self) {
        self.fail_next_commit.store(true, Ordering::SeqCst);
    }

    pub fn tickets(&self) -> Vec<Ticket> {
        self.tables().tickets.clone()
    }

    pub fn payments(&self) -> Vec<Payment> {
        self.tables().payments.clone()
    }

    pub fn sales(&self) -> Vec<ConcessionSale> {
        self.tables().sales.clone()
    }
}

#[async_trait]
impl Store for MemoryStore {
    async fn screening(&self, id: ScreeningId) -> StoreResult<Option<Screening>> {
        Ok(self.tables().screenings.get(&id).cloned())
    }

    async fn seat(&self, id: SeatId) -> StoreResult<Option<Seat>> {
        Ok(self.tables().seats.get(&id).cloned())
    }

    async fn seats_for_screening(&self, screening_id: ScreeningId) -> StoreResult<Vec<Seat>> {
        Ok(self
            .tables()
            .seats
            .values()
            .filter(|s| s.screening_id == screening_id)
            .cloned()
            .collect())
    }

    async fn insert_seats(&self, screening_id: ScreeningId, seats: &[NewSeat]) -> StoreResult<Vec<Seat>> {
        let mut tables = self.tables();
        for new_seat in seats {
            let exists = tables.seats.values().any(|s| {
                s.screening_id == screening_id && s.row == new_seat.row && s.number == new_seat.number
            });
            if exists {
                continue;
            }
            let id = tables.next_id();
            tables.seats.insert(
                id,
                Seat {
                    id,
                    screening_id,
                    row: new_seat.row.clone(),
                    number: new_seat.number,
                    seat_type: new_seat.seat_type,
                    state: SeatState::Available,
                    holder_id: None,
                    hold_expires_at: None,
                },
            );
        }
        tables.refresh_counts(screening_id);
        Ok(tables
            .seats
            .values()
            .filter(|s| s.screening_id == screening_id)
            .cloned()
            .collect())
    }

    async fn save_seat(&self, seat: &Seat) -> StoreResult<()> {
        let mut tables = self.tables();
        if !tables.seats.contains_key(&seat.id) {
            return Err(StoreError::Backend(format!("seat {} does not exist", seat.id)));
        }
        tables.seats.insert(seat.id, seat.clone());
        tables.refresh_counts(seat.screening_id);
        Ok(())
    }

    async fn expired_holds(&self, now: DateTime<Utc>) -> StoreResult<Vec<Seat>> {
        Ok(self
            .tables()
            .seats
            .values()
            .filter(|s| s.is_hold_expired(now))
            .cloned()
            .collect())
    }

    async fn product(&self, id: ProductId) -> StoreResult<Option<Product>> {
        Ok(self.tables().products.get(&id).cloned())
    }

    async fn debit_stock(&self, lines: &[ConcessionLine]) -> StoreResult<()> {
        let mut tables = self.tables();
        tables.check_stock(lines)?;
        tables.apply_debits(lines);
        Ok(())
    }

    async fn credit_stock(&self, lines: &[ConcessionLine]) -> StoreResult<()> {
        let mut tables = self.tables();
        if let Some(line) = lines.iter().find(|l| !tables.products.contains_key(&l.product_id)) {
            return Err(StoreError::Backend(format!("product {} does not exist", line.product_id)));
        }
        for line in lines {
            if let Some(p) = tables.products.get_mut(&line.product_id) {
                p.stock += line.quantity;
            }
        }
        Ok(())
    }

    async fn commit_purchase(&self, write: PurchaseWrite) -> StoreResult<CommittedPurchase> {
        let mut tables = self.tables();

        if self.fail_next_commit.swap(false, Ordering::SeqCst) {
            return Err(StoreError::Backend("injected commit failure".to_string()));
        }

        // validate everything before the first write
        for seat_id in &write.seats {
            match tables.seats.get(seat_id) {
                Some(seat) if seat.is_held_by(write.purchaser_id) => {}
                _ => return Err(StoreError::SeatConflict(*seat_id)),
            }
        }
        tables.check_stock(&write.debits)?;

        let mut seats = Vec::with_capacity(write.seats.len());
        for seat_id in &write.seats {
            if let Some(seat) = tables.seats.get_mut(seat_id) {
                seat.mark_sold();
                seats.push(seat.clone());
            }
        }
        tables.apply_debits(&write.debits);

        let mut tickets = Vec::with_capacity(write.tickets.len());
        for new_ticket in write.tickets {
            let ticket = Ticket {
                id: tables.next_id(),
                screening_id: new_ticket.screening_id,
                seat_id: new_ticket.seat_id,
                seat_code: new_ticket.seat_code,
                client_id: new_ticket.client_id,
                price_cents: new_ticket.price_cents,
                state: TicketState::Paid,
                issued_at: new_ticket.issued_at,
            };
            tables.tickets.push(ticket.clone());
            tickets.push(ticket);
        }

        let payment = Payment {
            id: tables.next_id(),
            client_id: write.payment.client_id,
            amount_cents: write.payment.amount_cents,
            method: write.payment.method,
            receipt_type: write.payment.receipt_type,
            status: PaymentStatus::Completed,
            confirmation_code: write.payment.confirmation_code,
            created_at: write.payment.created_at,
        };
        tables.payments.push(payment.clone());

        let sale = write.sale.map(|new_sale| ConcessionSale {
            id: tables.next_id(),
            client_id: new_sale.client_id,
            method: new_sale.method,
            completed: true,
            lines: new_sale.lines,
        });
        if let Some(sale) = &sale {
            tables.sales.push(sale.clone());
        }

        tables.refresh_counts(write.screening_id);

        Ok(CommittedPurchase { seats, tickets, payment, sale })
    }

    async fn tickets_for_client(&self, client_id: ClientId) -> StoreResult<Vec<Ticket>> {
        Ok(self
            .tables()
            .tickets
            .iter()
            .filter(|t| t.client_id == client_id)
            .cloned()
            .collect())
    }
}
