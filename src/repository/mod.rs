//! Persistence boundary for seats, screenings, products, tickets, payments
//! and concession sales.
//!
//! Every method is atomic on its own. [`Store::commit_purchase`] is the one
//! multi-entity scope: it applies every write of a purchase or none of them.

pub mod memory;
pub mod postgres;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::models::{
    ClientId, ConcessionLine, ConcessionSale, Payment, PaymentMethod, PricedLine, Product,
    ProductId, ReceiptType, Screening, ScreeningId, Seat, SeatCode, SeatId, SeatType, Ticket,
};

pub use memory::MemoryStore;
pub use postgres::PgStore;

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("seat {0} is not held by the purchaser")]
    SeatConflict(SeatId),
    #[error("insufficient stock for product {0}")]
    InsufficientStock(ProductId),
    #[error("corrupt record: {0}")]
    Corrupt(String),
    #[error("storage backend failure: {0}")]
    Backend(String),
}

pub type StoreResult<T> = Result<T, StoreError>;

/// Seat layout entry used when a screening's seat map is materialized.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewSeat {
    pub row: String,
    pub number: u32,
    pub seat_type: SeatType,
}

#[derive(Debug, Clone)]
pub struct NewTicket {
    pub screening_id: ScreeningId,
    pub seat_id: SeatId,
    pub seat_code: SeatCode,
    pub client_id: ClientId,
    pub price_cents: i64,
    pub issued_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct NewPayment {
    pub client_id: ClientId,
    pub amount_cents: i64,
    pub method: PaymentMethod,
    pub receipt_type: ReceiptType,
    pub confirmation_code: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct NewSale {
    pub client_id: ClientId,
    pub method: PaymentMethod,
    pub lines: Vec<PricedLine>,
}

/// All writes of one purchase.
#[derive(Debug, Clone)]
pub struct PurchaseWrite {
    pub screening_id: ScreeningId,
    pub purchaser_id: ClientId,
    /// Each must still be held by `purchaser_id`; all become sold.
    pub seats: Vec<SeatId>,
    /// Each must be active with enough stock.
    pub debits: Vec<ConcessionLine>,
    pub tickets: Vec<NewTicket>,
    pub payment: NewPayment,
    pub sale: Option<NewSale>,
}

#[derive(Debug, Clone)]
pub struct CommittedPurchase {
    pub seats: Vec<Seat>,
    pub tickets: Vec<Ticket>,
    pub payment: Payment,
    pub sale: Option<ConcessionSale>,
}

#[async_trait]
pub trait Store: Send + Sync {
    async fn screening(&self, id: ScreeningId) -> StoreResult<Option<Screening>>;

    async fn seat(&self, id: SeatId) -> StoreResult<Option<Seat>>;

    async fn seats_for_screening(&self, screening_id: ScreeningId) -> StoreResult<Vec<Seat>>;

    /// Creates the seat set of a screening and sets its seat counts.
    /// Re-inserting an existing `(row, number)` leaves it untouched.
    async fn insert_seats(&self, screening_id: ScreeningId, seats: &[NewSeat]) -> StoreResult<Vec<Seat>>;

    /// Persists one seat and refreshes the screening's available count.
    async fn save_seat(&self, seat: &Seat) -> StoreResult<()>;

    /// Held seats whose hold has expired at `now`, across all screenings.
    async fn expired_holds(&self, now: DateTime<Utc>) -> StoreResult<Vec<Seat>>;

    async fn product(&self, id: ProductId) -> StoreResult<Option<Product>>;

    /// Debits every line or none of them.
    async fn debit_stock(&self, lines: &[ConcessionLine]) -> StoreResult<()>;

    async fn credit_stock(&self, lines: &[ConcessionLine]) -> StoreResult<()>;

    async fn commit_purchase(&self, write: PurchaseWrite) -> StoreResult<CommittedPurchase>;

    async fn tickets_for_client(&self, client_id: ClientId) -> StoreResult<Vec<Ticket>>;
}
