pub mod purchases;
pub mod seats;
#[cfg(feature = "realtime")]
pub mod websocket;

use axum::Router;
use std::sync::Arc;

pub fn routes() -> Router<Arc<crate::AppState>> {
    let router = Router::new()
        .merge(seats::routes())
        .merge(purchases::routes());

    #[cfg(feature = "realtime")]
    let router = router.merge(websocket::routes());

    router
}
