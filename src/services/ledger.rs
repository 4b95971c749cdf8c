//! Seat ledger: the only component that changes seat state.
//!
//! Every mutation takes the seat's lock, re-reads the seat from the store,
//! checks the transition, writes it back and publishes the change before the
//! lock is released. Subscribers therefore see one seat's changes in the
//! order they were applied.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, error, info, warn};

use crate::clock::Clock;
use crate::config::LedgerConfig;
use crate::error::{BookingError, BookingResult};
use crate::events::{seat_topic, EventPublisher, SeatAction, SeatChanged};
use crate::models::{ClientId, Screening, ScreeningId, Seat, SeatCode, SeatId, SeatState, SeatType};
use crate::repository::{NewSeat, Store};
use crate::services::locks::{KeyGuard, KeyedLocks};

/// How a room's capacity is turned into rows and seats.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SeatLayout {
    pub seats_per_row: u32,
    /// Rows at the back of the room sold as premium.
    pub premium_rows: u32,
}

impl SeatLayout {
    pub fn from_config(config: &LedgerConfig) -> Self {
        Self {
            seats_per_row: config.seats_per_row.max(1),
            premium_rows: config.premium_rows,
        }
    }

    pub fn seats_for(&self, capacity: u32) -> Vec<NewSeat> {
        let per_row = self.seats_per_row.max(1);
        let rows = capacity.div_ceil(per_row);
        // a room that is all premium rows has no premium at all
        let premium_from = if rows > self.premium_rows { rows - self.premium_rows } else { rows };

        (0..capacity)
            .map(|i| {
                let row = i / per_row;
                NewSeat {
                    row: SeatCode::row_label(row as usize),
                    number: i % per_row + 1,
                    seat_type: if row >= premium_from { SeatType::Premium } else { SeatType::Ordinary },
                }
            })
            .collect()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct SeatFilter {
    pub state: Option<SeatState>,
    pub seat_type: Option<SeatType>,
    pub row: Option<String>,
}

impl SeatFilter {
    fn matches(&self, seat: &Seat) -> bool {
        self.state.is_none_or(|s| seat.state == s)
            && self.seat_type.is_none_or(|t| seat.seat_type == t)
            && self.row.as_deref().is_none_or(|r| seat.row == r)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SeatStatistics {
    pub screening_id: ScreeningId,
    pub total: u32,
    pub available: u32,
    pub held: u32,
    pub sold: u32,
    pub occupancy_percent: f64,
}

pub struct SeatLedger {
    store: Arc<dyn Store>,
    publisher: Arc<dyn EventPublisher>,
    clock: Arc<dyn Clock>,
    seat_locks: KeyedLocks<SeatId>,
    screening_locks: KeyedLocks<ScreeningId>,
    hold_ttl: Duration,
    layout: SeatLayout,
}

impl SeatLedger {
    pub fn new(
        store: Arc<dyn Store>,
        publisher: Arc<dyn EventPublisher>,
        clock: Arc<dyn Clock>,
        config: &LedgerConfig,
    ) -> Self {
        Self {
            store,
            publisher,
            clock,
            seat_locks: KeyedLocks::new(),
            screening_locks: KeyedLocks::new(),
            hold_ttl: Duration::seconds(config.hold_ttl_seconds as i64),
            layout: SeatLayout::from_config(config),
        }
    }

    pub fn now(&self) -> DateTime<Utc> {
        self.clock.now()
    }

    pub fn hold_ttl(&self) -> Duration {
        self.hold_ttl
    }

    /// Creates the seat map of a screening on first call; later calls
    /// return the existing seats untouched.
    pub async fn materialize(&self, screening_id: ScreeningId) -> BookingResult<Vec<Seat>> {
        let _guard = self.screening_locks.lock(screening_id).await;

        let screening = self.screening(screening_id).await?;
        let mut seats = self.store.seats_for_screening(screening_id).await?;
        if !seats.is_empty() {
            debug!("Screening {} already has {} seats", screening_id, seats.len());
            sort_by_layout(&mut seats);
            return Ok(seats);
        }

        if screening.room_capacity == 0 {
            return Err(BookingError::InvalidArgument(format!(
                "room {} of screening {} has no capacity",
                screening.room_id, screening_id
            )));
        }

        let layout = self.layout.seats_for(screening.room_capacity);
        let mut seats = self.store.insert_seats(screening_id, &layout).await?;
        sort_by_layout(&mut seats);
        info!("Materialized {} seats for screening {}", seats.len(), screening_id);
        Ok(seats)
    }

    /// Claims a seat for `holder_id` until now + hold TTL. Holding a seat
    /// you already hold renews the expiry.
    pub async fn hold(&self, seat_id: SeatId, holder_id: ClientId) -> BookingResult<Seat> {
        let mut events = Vec::new();
        let _guard = self.seat_locks.lock(seat_id).await;
        let outcome = self.hold_locked(seat_id, holder_id, &mut events).await;
        self.publish_all(events).await;
        outcome
    }

    async fn hold_locked(
        &self,
        seat_id: SeatId,
        holder_id: ClientId,
        events: &mut Vec<SeatChanged>,
    ) -> BookingResult<Seat> {
        let mut seat = self.load_seat(seat_id).await?;
        let screening = self.screening(seat.screening_id).await?;
        if !screening.active {
            return Err(BookingError::Unavailable(format!(
                "screening {} is not open for sale",
                screening.id
            )));
        }

        let now = self.clock.now();
        self.expire_if_stale(&mut seat, now, events).await?;

        match seat.state {
            SeatState::Sold => {
                warn!("Hold rejected: seat {} already sold", seat.code());
                return Err(BookingError::Conflict(format!("seat {} is already sold", seat.code())));
            }
            SeatState::Held if !seat.is_held_by(holder_id) => {
                warn!("Hold rejected: seat {} held by another client", seat.code());
                return Err(BookingError::Conflict(format!(
                    "seat {} is held by another client",
                    seat.code()
                )));
            }
            _ => {}
        }

        let renewal = seat.state == SeatState::Held;
        seat.mark_held(holder_id, now + self.hold_ttl);
        self.store.save_seat(&seat).await?;

        if renewal {
            info!("Seat {} hold renewed by client {}", seat.code(), holder_id);
        } else {
            info!("Seat {} held by client {}", seat.code(), holder_id);
        }
        events.push(SeatChanged::from_seat(&seat, Some(holder_id), SeatAction::Hold, now));
        Ok(seat)
    }

    /// Returns a held seat to the pool. Releasing an available seat is a
    /// no-op; a sold seat cannot be released.
    pub async fn release(&self, seat_id: SeatId) -> BookingResult<Seat> {
        let mut events = Vec::new();
        let _guard = self.seat_locks.lock(seat_id).await;
        let outcome = self.release_locked(seat_id, &mut events).await;
        self.publish_all(events).await;
        outcome
    }

    async fn release_locked(&self, seat_id: SeatId, events: &mut Vec<SeatChanged>) -> BookingResult<Seat> {
        let mut seat = self.load_seat(seat_id).await?;

        match seat.state {
            SeatState::Sold => Err(BookingError::Conflict(format!(
                "seat {} is sold and cannot be released",
                seat.code()
            ))),
            SeatState::Available => Ok(seat),
            SeatState::Held => {
                let previous_holder = seat.holder_id;
                seat.mark_available();
                self.store.save_seat(&seat).await?;

                info!("Seat {} released", seat.code());
                events.push(SeatChanged::from_seat(
                    &seat,
                    previous_holder,
                    SeatAction::Release,
                    self.clock.now(),
                ));
                Ok(seat)
            }
        }
    }

    /// Sells a seat to the client currently holding it.
    pub async fn confirm(&self, seat_id: SeatId, holder_id: ClientId) -> BookingResult<Seat> {
        let mut events = Vec::new();
        let _guard = self.seat_locks.lock(seat_id).await;
        let outcome = self.confirm_locked(seat_id, holder_id, &mut events).await;
        self.publish_all(events).await;
        outcome
    }

    async fn confirm_locked(
        &self,
        seat_id: SeatId,
        holder_id: ClientId,
        events: &mut Vec<SeatChanged>,
    ) -> BookingResult<Seat> {
        let now = self.clock.now();
        let mut seat = self.check_confirmable(seat_id, holder_id, now, events).await?;

        seat.mark_sold();
        self.store.save_seat(&seat).await?;

        info!("Seat {} sold to client {}", seat.code(), holder_id);
        events.push(SeatChanged::from_seat(&seat, Some(holder_id), SeatAction::Confirm, now));
        Ok(seat)
    }

    /// Locks the given seats for a multi-seat operation, ascending by id.
    /// Publish the resulting events before dropping the guards.
    pub(crate) async fn lock_seats(&self, seat_ids: &[SeatId]) -> Vec<KeyGuard<'_, SeatId>> {
        self.seat_locks.lock_all(seat_ids).await
    }

    /// Re-reads a seat (caller must hold its lock) and verifies that
    /// `holder_id` holds it with a live hold. An expired hold is reverted
    /// first and then reported as a conflict.
    pub(crate) async fn check_confirmable(
        &self,
        seat_id: SeatId,
        holder_id: ClientId,
        now: DateTime<Utc>,
        events: &mut Vec<SeatChanged>,
    ) -> BookingResult<Seat> {
        let mut seat = self.load_seat(seat_id).await?;

        if self.expire_if_stale(&mut seat, now, events).await? {
            warn!("Confirm rejected: hold on seat {} expired", seat.code());
            return Err(BookingError::Conflict(format!("hold on seat {} expired", seat.code())));
        }

        match seat.state {
            SeatState::Held if seat.is_held_by(holder_id) => Ok(seat),
            SeatState::Held => Err(BookingError::Conflict(format!(
                "seat {} is held by another client",
                seat.code()
            ))),
            SeatState::Sold => Err(BookingError::Conflict(format!("seat {} is already sold", seat.code()))),
            SeatState::Available => Err(BookingError::Conflict(format!("seat {} is not held", seat.code()))),
        }
    }

    /// Reverts every expired hold of one screening. Seats whose lock is
    /// taken right now are left for the next sweep.
    pub async fn sweep_expired(&self, screening_id: ScreeningId, now: DateTime<Utc>) -> BookingResult<usize> {
        self.screening(screening_id).await?;
        let candidates: Vec<SeatId> = self
            .store
            .seats_for_screening(screening_id)
            .await?
            .into_iter()
            .filter(|s| s.is_hold_expired(now))
            .map(|s| s.id)
            .collect();
        Ok(self.reclaim(candidates, now).await)
    }

    /// Same as [`SeatLedger::sweep_expired`] across all screenings.
    pub async fn sweep_all(&self, now: DateTime<Utc>) -> BookingResult<usize> {
        let candidates: Vec<SeatId> = self
            .store
            .expired_holds(now)
            .await?
            .into_iter()
            .map(|s| s.id)
            .collect();
        Ok(self.reclaim(candidates, now).await)
    }

    async fn reclaim(&self, seat_ids: Vec<SeatId>, now: DateTime<Utc>) -> usize {
        let mut reclaimed = 0;

        for seat_id in seat_ids {
            let Some(guard) = self.seat_locks.try_lock(seat_id) else {
                debug!("Sweep skipped contended seat {}", seat_id);
                continue;
            };

            match self.store.seat(seat_id).await {
                Ok(Some(mut seat)) if seat.is_hold_expired(now) => {
                    let previous_holder = seat.holder_id;
                    seat.mark_available();
                    match self.store.save_seat(&seat).await {
                        Ok(()) => {
                            debug!("Hold on seat {} expired (client {:?})", seat.code(), previous_holder);
                            reclaimed += 1;
                            let event = SeatChanged::from_seat(&seat, None, SeatAction::Expire, now);
                            self.publish_all(vec![event]).await;
                        }
                        Err(e) => error!("Sweep failed to save seat {}: {:?}", seat_id, e),
                    }
                }
                Ok(_) => {}
                Err(e) => error!("Sweep failed to load seat {}: {:?}", seat_id, e),
            }
            drop(guard);
        }

        reclaimed
    }

    /// Snapshot of a screening's seats in layout order. Expired holds are
    /// reported as available.
    pub async fn query(&self, screening_id: ScreeningId, filter: &SeatFilter) -> BookingResult<Vec<Seat>> {
        self.screening(screening_id).await?;
        let now = self.clock.now();

        let mut seats: Vec<Seat> = self
            .store
            .seats_for_screening(screening_id)
            .await?
            .into_iter()
            .map(|mut seat| {
                if seat.is_hold_expired(now) {
                    seat.mark_available();
                }
                seat
            })
            .filter(|seat| filter.matches(seat))
            .collect();
        sort_by_layout(&mut seats);
        Ok(seats)
    }

    pub async fn statistics(&self, screening_id: ScreeningId) -> BookingResult<SeatStatistics> {
        let seats = self.query(screening_id, &SeatFilter::default()).await?;

        let count = |state: SeatState| seats.iter().filter(|s| s.state == state).count() as u32;
        let total = seats.len() as u32;
        let sold = count(SeatState::Sold);
        let occupancy_percent = if total == 0 {
            0.0
        } else {
            (f64::from(sold) * 1000.0 / f64::from(total)).round() / 10.0
        };

        Ok(SeatStatistics {
            screening_id,
            total,
            available: count(SeatState::Available),
            held: count(SeatState::Held),
            sold,
            occupancy_percent,
        })
    }

    /// Whether the seat at `code` can be held right now.
    pub async fn is_available(&self, screening_id: ScreeningId, code: &SeatCode) -> BookingResult<bool> {
        let seats = self.query(screening_id, &SeatFilter::default()).await?;
        Ok(seats
            .iter()
            .any(|s| s.row == code.row && s.number == code.number && s.state == SeatState::Available))
    }

    pub async fn seat(&self, seat_id: SeatId) -> BookingResult<Seat> {
        self.load_seat(seat_id).await
    }

    pub(crate) async fn screening(&self, screening_id: ScreeningId) -> BookingResult<Screening> {
        self.store
            .screening(screening_id)
            .await?
            .ok_or_else(|| BookingError::NotFound(format!("screening {}", screening_id)))
    }

    async fn load_seat(&self, seat_id: SeatId) -> BookingResult<Seat> {
        self.store
            .seat(seat_id)
            .await?
            .ok_or_else(|| BookingError::NotFound(format!("seat {}", seat_id)))
    }

    /// Reverts an expired hold in place and persists it. Returns whether
    /// anything changed.
    async fn expire_if_stale(
        &self,
        seat: &mut Seat,
        now: DateTime<Utc>,
        events: &mut Vec<SeatChanged>,
    ) -> BookingResult<bool> {
        if !seat.is_hold_expired(now) {
            return Ok(false);
        }
        seat.mark_available();
        self.store.save_seat(seat).await?;
        debug!("Lazily expired hold on seat {}", seat.code());
        events.push(SeatChanged::from_seat(seat, None, SeatAction::Expire, now));
        Ok(true)
    }

    pub(crate) async fn publish_all(&self, events: Vec<SeatChanged>) {
        for event in events {
            let topic = seat_topic(event.screening_id);
            if let Err(e) = self.publisher.publish(&topic, &event).await {
                warn!("Failed to publish {:?} for seat {}: {}", event.action, event.seat_code, e);
            }
        }
    }
}

fn sort_by_layout(seats: &mut [Seat]) {
    seats.sort_by(|a, b| a.code().layout_cmp(&b.code()));
}
