#![allow(dead_code)]

use chrono::{DateTime, TimeZone, Utc};
use std::sync::Arc;

use cinema_ticketing::clock::ManualClock;
use cinema_ticketing::config::Config;
use cinema_ticketing::events::EventPublisher;
use cinema_ticketing::models::{ClientId, Product, Screening, ScreeningId, SeatCode, SeatId};
use cinema_ticketing::repository::MemoryStore;
use cinema_ticketing::services::{PurchaseOrchestrator, SeatLedger};
use cinema_ticketing::AppState;

pub const SCREENING: ScreeningId = 1;
pub const OTHER_SCREENING: ScreeningId = 2;
pub const CLOSED_SCREENING: ScreeningId = 3;

pub const POPCORN: i64 = 1;
pub const SODA: i64 = 2;
pub const NACHOS: i64 = 3;

pub const X: ClientId = 100;
pub const Y: ClientId = 200;
pub const Z: ClientId = 300;

pub fn opening_time() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2026, 3, 1, 18, 0, 0).unwrap()
}

pub fn screening(id: ScreeningId, capacity: u32, active: bool) -> Screening {
    Screening {
        id,
        movie_id: 7,
        movie_title: "Metropolis".to_string(),
        room_id: 3,
        room_name: "Sala 3".to_string(),
        room_capacity: capacity,
        starts_at: opening_time() + chrono::Duration::hours(2),
        base_price_cents: 1000,
        total_seats: 0,
        available_seats: 0,
        active,
    }
}

pub fn product(id: i64, name: &str, price_cents: i64, stock: u32, active: bool) -> Product {
    Product {
        id,
        name: name.to_string(),
        price_cents,
        stock,
        active,
    }
}

/// Application wired over an in-memory store and a hand-driven clock.
///
/// Screening 1 seats 30 (rows A..C, B and C premium), screening 2 seats 10,
/// screening 3 is closed. Popcorn has 3 in stock, soda 10, nachos are off
/// the menu.
pub struct Fixture {
    pub store: Arc<MemoryStore>,
    pub clock: Arc<ManualClock>,
    pub state: Arc<AppState>,
}

impl Fixture {
    pub fn new() -> Self {
        Self::build(None)
    }

    /// Same fixture, with `extra` receiving every event after the in-process
    /// broadcast.
    pub fn with_publisher(extra: Arc<dyn EventPublisher>) -> Self {
        Self::build(Some(extra))
    }

    fn build(extra: Option<Arc<dyn EventPublisher>>) -> Self {
        let store = Arc::new(MemoryStore::new());
        store.insert_screening(screening(SCREENING, 30, true));
        store.insert_screening(screening(OTHER_SCREENING, 10, true));
        store.insert_screening(screening(CLOSED_SCREENING, 10, false));
        store.insert_product(product(POPCORN, "Popcorn", 500, 3, true));
        store.insert_product(product(SODA, "Soda", 300, 10, true));
        store.insert_product(product(NACHOS, "Nachos", 450, 20, false));

        let clock = Arc::new(ManualClock::new(opening_time()));
        let config = Config::from_lookup(|_| None).expect("default config");
        let state = AppState::assemble(config, store.clone(), clock.clone(), extra);

        Self { store, clock, state }
    }

    pub fn ledger(&self) -> &SeatLedger {
        &self.state.ledger
    }

    pub fn purchases(&self) -> &PurchaseOrchestrator {
        &self.state.purchases
    }

    /// Seat id for a code like `A1`, materializing the screening if needed.
    pub async fn seat(&self, screening_id: ScreeningId, code: &str) -> SeatId {
        let code: SeatCode = code.parse().expect("valid seat code");
        self.ledger()
            .materialize(screening_id)
            .await
            .expect("materialize")
            .into_iter()
            .find(|s| s.code() == code)
            .map(|s| s.id)
            .expect("seat exists")
    }

    pub async fn available_count(&self, screening_id: ScreeningId) -> u32 {
        use cinema_ticketing::repository::Store;
        self.store
            .screening(screening_id)
            .await
            .unwrap()
            .expect("screening")
            .available_seats
    }

    pub async fn stock(&self, product_id: i64) -> u32 {
        use cinema_ticketing::repository::Store;
        self.store.product(product_id).await.unwrap().expect("product").stock
    }
}
