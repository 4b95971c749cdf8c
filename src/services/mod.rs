pub mod inventory;
pub mod ledger;
pub mod locks;
pub mod purchase;
pub mod sweeper;

pub use inventory::InventoryGuard;
pub use ledger::{SeatFilter, SeatLayout, SeatLedger, SeatStatistics};
pub use purchase::{PurchaseOrchestrator, PurchaseOrder, Quote, QuotedSeat, Receipt};
pub use sweeper::ExpirySweeper;
