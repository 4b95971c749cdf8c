//! Live seat map updates. Each socket receives every `SeatChanged` of one
//! screening as a JSON text frame.

use axum::{
    extract::{
        ws::{Message, WebSocket},
        Path, State, WebSocketUpgrade,
    },
    response::Response,
    routing::get,
    Router,
};
use futures::{SinkExt, StreamExt};
use std::sync::Arc;
use tokio::sync::broadcast::error::RecvError;
use tracing::{debug, info, warn};

use crate::error::BookingResult;
use crate::events::seat_topic;
use crate::models::ScreeningId;
use crate::AppState;

pub fn routes() -> Router<Arc<AppState>> {
    Router::new().route("/screenings/{id}/seats/ws", get(seat_updates))
}

// GET /api/screenings/{id}/seats/ws
async fn seat_updates(
    ws: WebSocketUpgrade,
    State(state): State<Arc<AppState>>,
    Path(screening_id): Path<ScreeningId>,
) -> BookingResult<Response> {
    state.ledger.screening(screening_id).await?;
    info!("WebSocket subscription requested for screening {}", screening_id);
    Ok(ws.on_upgrade(move |socket| stream_seat_changes(socket, state, screening_id)))
}

async fn stream_seat_changes(socket: WebSocket, state: Arc<AppState>, screening_id: ScreeningId) {
    let mut changes = state.realtime.subscribe(&seat_topic(screening_id));
    let (mut sender, mut receiver) = socket.split();

    loop {
        tokio::select! {
            change = changes.recv() => match change {
                Ok(event) => {
                    let json = match serde_json::to_string(&event) {
                        Ok(json) => json,
                        Err(e) => {
                            warn!("Failed to encode seat change: {}", e);
                            continue;
                        }
                    };
                    if sender.send(Message::Text(json.into())).await.is_err() {
                        break;
                    }
                }
                Err(RecvError::Lagged(skipped)) => {
                    warn!("Subscriber of screening {} lagged, {} changes skipped", screening_id, skipped);
                }
                Err(RecvError::Closed) => break,
            },
            incoming = receiver.next() => match incoming {
                Some(Ok(Message::Close(_))) | None | Some(Err(_)) => break,
                Some(Ok(_)) => {}
            },
        }
    }

    debug!("WebSocket for screening {} closed", screening_id);
}
