//! Seat change notifications and the publishers that fan them out.
//!
//! The booking core only depends on [`EventPublisher`]. Every event carries
//! the full new state of one seat, so a subscriber that sees the same event
//! twice ends up in the same place.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use tokio::sync::broadcast;
use tracing::debug;

use crate::models::{ClientId, Seat, SeatCode, SeatId, SeatState, ScreeningId};
use crate::redis_client::RedisClient;

const CHANNEL_CAPACITY: usize = 256;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SeatAction {
    Hold,
    Release,
    Confirm,
    Expire,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SeatChanged {
    pub seat_id: SeatId,
    pub screening_id: ScreeningId,
    pub seat_code: SeatCode,
    pub new_state: SeatState,
    pub actor_id: Option<ClientId>,
    pub action: SeatAction,
    pub at: DateTime<Utc>,
}

impl SeatChanged {
    pub fn from_seat(seat: &Seat, actor_id: Option<ClientId>, action: SeatAction, at: DateTime<Utc>) -> Self {
        Self {
            seat_id: seat.id,
            screening_id: seat.screening_id,
            seat_code: seat.code(),
            new_state: seat.state,
            actor_id,
            action,
            at,
        }
    }
}

/// Channel every viewer of one screening's seat map listens on.
pub fn seat_topic(screening_id: ScreeningId) -> String {
    format!("screening:{}:seats", screening_id)
}

#[derive(Debug, thiserror::Error)]
pub enum PublishError {
    #[error("failed to encode event: {0}")]
    Encode(#[from] serde_json::Error),
    #[error("redis publish failed: {0}")]
    Redis(#[from] redis::RedisError),
}

#[async_trait]
pub trait EventPublisher: Send + Sync {
    async fn publish(&self, topic: &str, event: &SeatChanged) -> Result<(), PublishError>;
}

/// In-process fan-out, one broadcast channel per topic.
#[derive(Default)]
pub struct BroadcastPublisher {
    channels: Mutex<HashMap<String, broadcast::Sender<SeatChanged>>>,
}

impl BroadcastPublisher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn subscribe(&self, topic: &str) -> broadcast::Receiver<SeatChanged> {
        let mut channels = self.channels.lock().unwrap_or_else(|e| e.into_inner());
        channels
            .entry(topic.to_string())
            .or_insert_with(|| broadcast::channel(CHANNEL_CAPACITY).0)
            .subscribe()
    }
}

#[async_trait]
impl EventPublisher for BroadcastPublisher {
    async fn publish(&self, topic: &str, event: &SeatChanged) -> Result<(), PublishError> {
        let mut channels = self.channels.lock().unwrap_or_else(|e| e.into_inner());
        if let Some(sender) = channels.get(topic) {
            if sender.send(event.clone()).is_err() {
                // nobody is listening anymore
                channels.remove(topic);
                debug!("Dropped idle channel {}", topic);
            }
        }
        Ok(())
    }
}

/// Publishes JSON-encoded events with Redis `PUBLISH`.
#[derive(Clone)]
pub struct RedisPublisher {
    redis: RedisClient,
}

impl RedisPublisher {
    pub fn new(redis: RedisClient) -> Self {
        Self { redis }
    }
}

#[async_trait]
impl EventPublisher for RedisPublisher {
    async fn publish(&self, topic: &str, event: &SeatChanged) -> Result<(), PublishError> {
        let payload = serde_json::to_string(event)?;
        self.redis.publish(topic, payload).await?;
        Ok(())
    }
}

/// Delivers to every inner publisher; reports the first failure after
/// trying all of them.
pub struct FanoutPublisher {
    publishers: Vec<Arc<dyn EventPublisher>>,
}

impl FanoutPublisher {
    pub fn new(publishers: Vec<Arc<dyn EventPublisher>>) -> Self {
        Self { publishers }
    }
}

#[async_trait]
impl EventPublisher for FanoutPublisher {
    async fn publish(&self, topic: &str, event: &SeatChanged) -> Result<(), PublishError> {
        let mut first_error = None;
        for publisher in &self.publishers {
            if let Err(e) = publisher.publish(topic, event).await {
                first_error.get_or_insert(e);
            }
        }
        match first_error {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::SeatType;

    fn event(state: SeatState) -> SeatChanged {
        let seat = Seat {
            id: 3,
            screening_id: 9,
            row: "B".to_string(),
            number: 4,
            seat_type: SeatType::Ordinary,
            state,
            holder_id: None,
            hold_expires_at: None,
        };
        SeatChanged::from_seat(&seat, Some(1), SeatAction::Release, Utc::now())
    }

    #[test]
    fn topic_is_scoped_to_the_screening() {
        assert_eq!(seat_topic(42), "screening:42:seats");
    }

    #[test]
    fn event_serializes_state_and_action() {
        let json = serde_json::to_value(event(SeatState::Available)).unwrap();
        assert_eq!(json["seat_code"], "B4");
        assert_eq!(json["new_state"], "AVAILABLE");
        assert_eq!(json["action"], "release");
    }

    #[tokio::test]
    async fn broadcast_reaches_subscribers_of_the_topic_only() {
        let publisher = BroadcastPublisher::new();
        let mut rx = publisher.subscribe(&seat_topic(9));
        let mut other = publisher.subscribe(&seat_topic(10));

        publisher.publish(&seat_topic(9), &event(SeatState::Held)).await.unwrap();

        assert_eq!(rx.recv().await.unwrap().new_state, SeatState::Held);
        assert!(other.try_recv().is_err());
    }

    #[tokio::test]
    async fn publishing_without_subscribers_succeeds() {
        let publisher = BroadcastPublisher::new();
        drop(publisher.subscribe("screening:1:seats"));
        publisher.publish("screening:1:seats", &event(SeatState::Sold)).await.unwrap();
        publisher.publish("screening:2:seats", &event(SeatState::Sold)).await.unwrap();
    }

    #[tokio::test]
    async fn fanout_delivers_to_every_publisher() {
        let a = Arc::new(BroadcastPublisher::new());
        let b = Arc::new(BroadcastPublisher::new());
        let mut rx_a = a.subscribe("t");
        let mut rx_b = b.subscribe("t");
        let fanout = FanoutPublisher::new(vec![a.clone() as Arc<dyn EventPublisher>, b.clone()]);

        fanout.publish("t", &event(SeatState::Sold)).await.unwrap();

        assert_eq!(rx_a.recv().await.unwrap().seat_id, 3);
        assert_eq!(rx_b.recv().await.unwrap().seat_id, 3);
    }
}
