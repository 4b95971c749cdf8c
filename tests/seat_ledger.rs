mod common;

use async_trait::async_trait;
use chrono::Duration;
use std::sync::{Arc, Mutex};

use cinema_ticketing::error::BookingError;
use cinema_ticketing::events::{seat_topic, EventPublisher, PublishError, SeatAction, SeatChanged};
use cinema_ticketing::models::{SeatCode, SeatState, SeatType};
use cinema_ticketing::services::SeatFilter;

use common::*;

#[tokio::test]
async fn hold_conflicts_and_confirm_follow_the_seat_state_machine() {
    let fx = Fixture::new();
    let a1 = fx.seat(SCREENING, "A1").await;
    let a2 = fx.seat(SCREENING, "A2").await;
    let a3 = fx.seat(SCREENING, "A3").await;
    let ledger = fx.ledger();

    ledger.hold(a2, X).await.unwrap();
    ledger.hold(a3, Z).await.unwrap();
    ledger.confirm(a3, Z).await.unwrap();
    let before = fx.available_count(SCREENING).await;

    let err = ledger.hold(a2, Y).await.unwrap_err();
    assert!(err.is_conflict(), "{:?}", err);
    assert!(ledger.hold(a3, Y).await.unwrap_err().is_conflict());

    let held = ledger.hold(a1, Y).await.unwrap();
    assert_eq!(held.state, SeatState::Held);
    assert_eq!(held.holder_id, Some(Y));
    assert_eq!(held.hold_expires_at, Some(opening_time() + Duration::minutes(5)));

    let sold = ledger.confirm(a1, Y).await.unwrap();
    assert_eq!(sold.state, SeatState::Sold);
    assert_eq!(sold.holder_id, None);
    assert_eq!(sold.hold_expires_at, None);
    assert_eq!(fx.available_count(SCREENING).await, before - 1);
}

#[tokio::test]
async fn sold_is_terminal() {
    let fx = Fixture::new();
    let a1 = fx.seat(SCREENING, "A1").await;
    let ledger = fx.ledger();

    ledger.hold(a1, X).await.unwrap();
    ledger.confirm(a1, X).await.unwrap();

    assert!(ledger.hold(a1, X).await.unwrap_err().is_conflict());
    assert!(ledger.release(a1).await.unwrap_err().is_conflict());
    assert!(ledger.confirm(a1, X).await.unwrap_err().is_conflict());
    assert_eq!(ledger.seat(a1).await.unwrap().state, SeatState::Sold);
}

#[tokio::test]
async fn confirm_requires_the_current_holder() {
    let fx = Fixture::new();
    let a1 = fx.seat(SCREENING, "A1").await;
    let ledger = fx.ledger();

    assert!(ledger.confirm(a1, X).await.unwrap_err().is_conflict());
    ledger.hold(a1, X).await.unwrap();
    assert!(ledger.confirm(a1, Y).await.unwrap_err().is_conflict());
    assert_eq!(ledger.seat(a1).await.unwrap().holder_id, Some(X));
}

#[tokio::test]
async fn holding_again_renews_the_expiry() {
    let fx = Fixture::new();
    let a1 = fx.seat(SCREENING, "A1").await;

    fx.ledger().hold(a1, X).await.unwrap();
    fx.clock.advance(Duration::minutes(4));
    let renewed = fx.ledger().hold(a1, X).await.unwrap();

    assert_eq!(renewed.hold_expires_at, Some(opening_time() + Duration::minutes(9)));
}

#[tokio::test]
async fn release_twice_is_the_same_as_once() {
    let fx = Fixture::new();
    let a1 = fx.seat(SCREENING, "A1").await;
    let ledger = fx.ledger();
    let mut changes = fx.state.realtime.subscribe(&seat_topic(SCREENING));

    ledger.hold(a1, X).await.unwrap();
    let first = ledger.release(a1).await.unwrap();
    let second = ledger.release(a1).await.unwrap();

    assert_eq!(first, second);
    assert_eq!(second.state, SeatState::Available);

    let hold = changes.try_recv().unwrap();
    assert_eq!(hold.action, SeatAction::Hold);
    let release = changes.try_recv().unwrap();
    assert_eq!(release.action, SeatAction::Release);
    assert_eq!(release.new_state, SeatState::Available);
    assert_eq!(release.actor_id, Some(X));
    assert!(changes.try_recv().is_err(), "second release must not publish");
}

#[tokio::test]
async fn holds_expire_at_the_first_sweep_at_or_after_expiry() {
    let fx = Fixture::new();
    let a1 = fx.seat(SCREENING, "A1").await;
    let ledger = fx.ledger();
    let mut changes = fx.state.realtime.subscribe(&seat_topic(SCREENING));

    ledger.hold(a1, X).await.unwrap();
    changes.try_recv().unwrap();

    fx.clock.advance(Duration::seconds(299));
    assert_eq!(ledger.sweep_expired(SCREENING, ledger.now()).await.unwrap(), 0);
    assert_eq!(ledger.seat(a1).await.unwrap().state, SeatState::Held);

    fx.clock.advance(Duration::seconds(1));
    assert_eq!(ledger.sweep_expired(SCREENING, ledger.now()).await.unwrap(), 1);

    let seat = ledger.seat(a1).await.unwrap();
    assert_eq!(seat.state, SeatState::Available);
    assert_eq!(seat.holder_id, None);

    let expired = changes.try_recv().unwrap();
    assert_eq!(expired.action, SeatAction::Expire);
    assert_eq!(expired.seat_id, a1);
    assert_eq!(expired.new_state, SeatState::Available);
}

#[tokio::test]
async fn sweeper_reclaims_across_screenings() {
    let fx = Fixture::new();
    let a1 = fx.seat(SCREENING, "A1").await;
    let b1 = fx.seat(OTHER_SCREENING, "A1").await;
    fx.ledger().hold(a1, X).await.unwrap();
    fx.ledger().hold(b1, Y).await.unwrap();

    let sweeper = fx.state.sweeper();
    assert_eq!(sweeper.run_once().await.unwrap(), 0);

    fx.clock.advance(Duration::minutes(6));
    assert_eq!(sweeper.run_once().await.unwrap(), 2);
    assert_eq!(fx.ledger().seat(b1).await.unwrap().state, SeatState::Available);
}

#[tokio::test]
async fn an_expired_hold_can_be_taken_before_the_sweep() {
    let fx = Fixture::new();
    let a1 = fx.seat(SCREENING, "A1").await;
    let ledger = fx.ledger();

    ledger.hold(a1, X).await.unwrap();
    fx.clock.advance(Duration::minutes(5));

    let seat = ledger.hold(a1, Y).await.unwrap();
    assert_eq!(seat.holder_id, Some(Y));
}

#[tokio::test]
async fn confirming_an_expired_hold_reverts_the_seat() {
    let fx = Fixture::new();
    let a1 = fx.seat(SCREENING, "A1").await;
    let ledger = fx.ledger();

    ledger.hold(a1, X).await.unwrap();
    fx.clock.advance(Duration::minutes(5));

    match ledger.confirm(a1, X).await {
        Err(BookingError::Conflict(msg)) => assert!(msg.contains("expired"), "{}", msg),
        other => panic!("expected conflict, got {:?}", other),
    }
    assert_eq!(ledger.seat(a1).await.unwrap().state, SeatState::Available);
}

#[tokio::test]
async fn closed_screenings_and_unknown_seats_are_rejected() {
    let fx = Fixture::new();
    let closed = fx.seat(CLOSED_SCREENING, "A1").await;

    assert!(matches!(fx.ledger().hold(closed, X).await, Err(BookingError::Unavailable(_))));
    assert!(matches!(fx.ledger().hold(9_999, X).await, Err(BookingError::NotFound(_))));
    assert!(matches!(fx.ledger().release(9_999).await, Err(BookingError::NotFound(_))));
    assert!(matches!(fx.ledger().materialize(9_999).await, Err(BookingError::NotFound(_))));
}

#[tokio::test]
async fn empty_rooms_cannot_be_materialized() {
    let fx = Fixture::new();
    fx.store.insert_screening(screening(40, 0, true));

    assert!(matches!(
        fx.ledger().materialize(40).await,
        Err(BookingError::InvalidArgument(_))
    ));
}

#[tokio::test]
async fn materialize_lays_out_rows_and_is_idempotent() {
    let fx = Fixture::new();
    let first = fx.ledger().materialize(SCREENING).await.unwrap();
    let second = fx.ledger().materialize(SCREENING).await.unwrap();

    assert_eq!(first.len(), 30);
    assert_eq!(first, second);
    assert_eq!(first[0].code(), SeatCode::new("A", 1));
    assert_eq!(first[29].code(), SeatCode::new("C", 10));
    assert!(first.iter().all(|s| s.state == SeatState::Available));
    assert_eq!(first.iter().filter(|s| s.seat_type == SeatType::Premium).count(), 20);
    assert_eq!(fx.available_count(SCREENING).await, 30);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_materialize_creates_one_seat_set() {
    let fx = Arc::new(Fixture::new());
    let tasks: Vec<_> = (0..8)
        .map(|_| {
            let fx = fx.clone();
            tokio::spawn(async move { fx.ledger().materialize(SCREENING).await.unwrap().len() })
        })
        .collect();

    for task in futures::future::join_all(tasks).await {
        assert_eq!(task.unwrap(), 30);
    }
    let all = fx.ledger().query(SCREENING, &SeatFilter::default()).await.unwrap();
    assert_eq!(all.len(), 30);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn only_one_client_wins_a_contended_seat() {
    let fx = Arc::new(Fixture::new());
    let a1 = fx.seat(SCREENING, "A1").await;

    let tasks: Vec<_> = (1..=20)
        .map(|client| {
            let fx = fx.clone();
            tokio::spawn(async move { fx.ledger().hold(a1, client).await })
        })
        .collect();

    let results: Vec<_> = futures::future::join_all(tasks)
        .await
        .into_iter()
        .map(|r| r.unwrap())
        .collect();
    let winners: Vec<_> = results.iter().filter_map(|r| r.as_ref().ok()).collect();
    assert_eq!(winners.len(), 1);
    assert!(results.iter().filter(|r| r.is_err()).all(|r| r.as_ref().unwrap_err().is_conflict()));

    let holder = winners[0].holder_id.unwrap();
    assert_eq!(fx.ledger().seat(a1).await.unwrap().holder_id, Some(holder));
}

#[tokio::test]
async fn query_filters_and_reports_expired_holds_as_available() {
    let fx = Fixture::new();
    let a1 = fx.seat(SCREENING, "A1").await;
    let b2 = fx.seat(SCREENING, "B2").await;
    let ledger = fx.ledger();

    ledger.hold(a1, X).await.unwrap();
    ledger.hold(b2, Y).await.unwrap();
    ledger.confirm(b2, Y).await.unwrap();

    let held = SeatFilter { state: Some(SeatState::Held), ..Default::default() };
    assert_eq!(ledger.query(SCREENING, &held).await.unwrap().len(), 1);

    let row_b = SeatFilter { row: Some("B".to_string()), ..Default::default() };
    let seats = ledger.query(SCREENING, &row_b).await.unwrap();
    assert_eq!(seats.len(), 10);
    assert_eq!(seats[0].code(), SeatCode::new("B", 1));

    let ordinary_available = SeatFilter {
        state: Some(SeatState::Available),
        seat_type: Some(SeatType::Ordinary),
        ..Default::default()
    };
    assert_eq!(ledger.query(SCREENING, &ordinary_available).await.unwrap().len(), 9);

    fx.clock.advance(Duration::minutes(5));
    assert!(ledger.query(SCREENING, &held).await.unwrap().is_empty());
    assert!(ledger.is_available(SCREENING, &SeatCode::new("A", 1)).await.unwrap());
    assert!(!ledger.is_available(SCREENING, &SeatCode::new("B", 2)).await.unwrap());
    assert!(!ledger.is_available(SCREENING, &SeatCode::new("Z", 1)).await.unwrap());
}

#[tokio::test]
async fn statistics_count_every_state() {
    let fx = Fixture::new();
    let a1 = fx.seat(SCREENING, "A1").await;
    let a2 = fx.seat(SCREENING, "A2").await;
    let ledger = fx.ledger();

    ledger.hold(a1, X).await.unwrap();
    ledger.hold(a2, X).await.unwrap();
    ledger.confirm(a2, X).await.unwrap();

    let stats = ledger.statistics(SCREENING).await.unwrap();
    assert_eq!(stats.total, 30);
    assert_eq!(stats.available, 28);
    assert_eq!(stats.held, 1);
    assert_eq!(stats.sold, 1);
    assert_eq!(stats.occupancy_percent, 3.3);
}

/// Records what it is sent, taking its time over holds.
#[derive(Default)]
struct SlowOnHold {
    seen: Mutex<Vec<(SeatAction, SeatState)>>,
}

#[async_trait]
impl EventPublisher for SlowOnHold {
    async fn publish(&self, _topic: &str, event: &SeatChanged) -> Result<(), PublishError> {
        if event.action == SeatAction::Hold {
            tokio::time::sleep(std::time::Duration::from_millis(100)).await;
        }
        self.seen.lock().unwrap().push((event.action, event.new_state));
        Ok(())
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn changes_to_one_seat_are_published_in_the_order_applied() {
    let recorder = Arc::new(SlowOnHold::default());
    let fx = Arc::new(Fixture::with_publisher(recorder.clone()));
    let a1 = fx.seat(SCREENING, "A1").await;

    let holding = {
        let fx = fx.clone();
        tokio::spawn(async move { fx.ledger().hold(a1, X).await })
    };
    tokio::time::sleep(std::time::Duration::from_millis(20)).await;
    let releasing = {
        let fx = fx.clone();
        tokio::spawn(async move { fx.ledger().release(a1).await })
    };
    holding.await.unwrap().unwrap();
    releasing.await.unwrap().unwrap();

    let seen = recorder.seen.lock().unwrap().clone();
    assert_eq!(
        seen,
        vec![(SeatAction::Hold, SeatState::Held), (SeatAction::Release, SeatState::Available)]
    );
    assert_eq!(fx.ledger().seat(a1).await.unwrap().state, seen[1].1);
}
