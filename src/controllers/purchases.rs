use axum::{
    extract::State,
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use serde::Deserialize;
use std::sync::Arc;

use crate::error::BookingResult;
use crate::middleware::AuthClient;
use crate::models::{ConcessionLine, PaymentMethod, ReceiptType, ScreeningId, SeatId, Ticket};
use crate::services::{PurchaseOrder, Quote, Receipt};
use crate::AppState;

pub fn routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/purchases/quote", post(quote_purchase))
        .route("/purchases", post(create_purchase))
        .route("/purchases/tickets", get(list_tickets))
}

#[derive(Debug, Deserialize)]
struct QuoteRequest {
    screening_id: ScreeningId,
    seat_ids: Vec<SeatId>,
    #[serde(default)]
    concessions: Vec<ConcessionLine>,
}

// POST /api/purchases/quote
async fn quote_purchase(
    State(state): State<Arc<AppState>>,
    Json(req): Json<QuoteRequest>,
) -> BookingResult<Json<Quote>> {
    let quote = state
        .purchases
        .quote(req.screening_id, &req.seat_ids, &req.concessions)
        .await?;
    Ok(Json(quote))
}

#[derive(Debug, Deserialize)]
struct PurchaseRequest {
    screening_id: ScreeningId,
    seat_ids: Vec<SeatId>,
    #[serde(default)]
    concessions: Vec<ConcessionLine>,
    payment_method: PaymentMethod,
    receipt_type: ReceiptType,
}

// POST /api/purchases
async fn create_purchase(
    State(state): State<Arc<AppState>>,
    client: AuthClient,
    Json(req): Json<PurchaseRequest>,
) -> BookingResult<(StatusCode, Json<Receipt>)> {
    let receipt = state
        .purchases
        .commit(PurchaseOrder {
            screening_id: req.screening_id,
            purchaser_id: client.client_id,
            seat_ids: req.seat_ids,
            concessions: req.concessions,
            payment_method: req.payment_method,
            receipt_type: req.receipt_type,
        })
        .await?;
    Ok((StatusCode::CREATED, Json(receipt)))
}

// GET /api/purchases/tickets
async fn list_tickets(
    State(state): State<Arc<AppState>>,
    client: AuthClient,
) -> BookingResult<Json<Vec<Ticket>>> {
    Ok(Json(state.purchases.tickets_for(client.client_id).await?))
}
