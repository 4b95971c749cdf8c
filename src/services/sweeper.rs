use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info};

use crate::error::BookingResult;
use crate::services::ledger::SeatLedger;

/// Periodically returns expired holds to the pool.
pub struct ExpirySweeper {
    ledger: Arc<SeatLedger>,
    interval: Duration,
}

impl ExpirySweeper {
    pub fn new(ledger: Arc<SeatLedger>, interval: Duration) -> Self {
        Self { ledger, interval }
    }

    /// One pass over every screening, using the ledger's clock.
    pub async fn run_once(&self) -> BookingResult<usize> {
        let reclaimed = self.ledger.sweep_all(self.ledger.now()).await?;
        if reclaimed > 0 {
            info!("🧹 Sweep released {} expired holds", reclaimed);
        } else {
            debug!("🧹 No expired holds to release");
        }
        Ok(reclaimed)
    }

    pub fn spawn(self) -> JoinHandle<()> {
        tokio::spawn(async move {
            info!("🧹 Hold sweeper started, every {:?}", self.interval);
            let mut ticker = tokio::time::interval(self.interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                if let Err(e) = self.run_once().await {
                    error!("🧹 Sweep failed: {}", e);
                }
            }
        })
    }
}
