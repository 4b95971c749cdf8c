use axum::{
    extract::{Path, Query, State},
    routing::{get, post},
    Json, Router,
};
use serde::Serialize;
use std::sync::Arc;

use crate::error::{BookingError, BookingResult};
use crate::middleware::AuthClient;
use crate::models::{ScreeningId, Seat, SeatCode, SeatId};
use crate::services::{SeatFilter, SeatStatistics};
use crate::AppState;

pub fn routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/screenings/{id}/seats", get(list_seats))
        .route("/screenings/{id}/seats/stats", get(seat_statistics))
        .route("/screenings/{id}/seats/{code}/available", get(seat_availability))
        .route("/seats/{id}/hold", post(hold_seat))
        .route("/seats/{id}/release", post(release_seat))
}

/// A seat as clients render it, with its `<row><number>` label.
#[derive(Debug, Serialize)]
struct SeatView {
    code: SeatCode,
    #[serde(flatten)]
    seat: Seat,
}

impl From<Seat> for SeatView {
    fn from(seat: Seat) -> Self {
        Self { code: seat.code(), seat }
    }
}

// GET /api/screenings/{id}/seats
async fn list_seats(
    State(state): State<Arc<AppState>>,
    Path(screening_id): Path<ScreeningId>,
    Query(filter): Query<SeatFilter>,
) -> BookingResult<Json<Vec<SeatView>>> {
    state.ledger.materialize(screening_id).await?;
    let seats = state.ledger.query(screening_id, &filter).await?;
    Ok(Json(seats.into_iter().map(SeatView::from).collect()))
}

// GET /api/screenings/{id}/seats/stats
async fn seat_statistics(
    State(state): State<Arc<AppState>>,
    Path(screening_id): Path<ScreeningId>,
) -> BookingResult<Json<SeatStatistics>> {
    state.ledger.materialize(screening_id).await?;
    Ok(Json(state.ledger.statistics(screening_id).await?))
}

#[derive(Debug, Serialize)]
struct AvailabilityResponse {
    seat_code: SeatCode,
    available: bool,
}

// GET /api/screenings/{id}/seats/{code}/available
async fn seat_availability(
    State(state): State<Arc<AppState>>,
    Path((screening_id, code)): Path<(ScreeningId, String)>,
) -> BookingResult<Json<AvailabilityResponse>> {
    let seat_code: SeatCode = code.parse().map_err(BookingError::InvalidArgument)?;
    let available = state.ledger.is_available(screening_id, &seat_code).await?;
    Ok(Json(AvailabilityResponse { seat_code, available }))
}

// POST /api/seats/{id}/hold
async fn hold_seat(
    State(state): State<Arc<AppState>>,
    client: AuthClient,
    Path(seat_id): Path<SeatId>,
) -> BookingResult<Json<SeatView>> {
    Ok(Json(state.ledger.hold(seat_id, client.client_id).await?.into()))
}

// POST /api/seats/{id}/release
async fn release_seat(
    State(state): State<Arc<AppState>>,
    _client: AuthClient,
    Path(seat_id): Path<SeatId>,
) -> BookingResult<Json<SeatView>> {
    Ok(Json(state.ledger.release(seat_id).await?.into()))
}
