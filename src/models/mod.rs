pub mod seat;
pub mod screening;
pub mod product;
pub mod ticket;
pub mod payment;

pub use seat::{Seat, SeatCode, SeatState, SeatType};
pub use screening::{Screening, ScreeningSummary};
pub use product::{ConcessionLine, ConcessionSale, PricedLine, Product};
pub use ticket::{Ticket, TicketState, TicketSummary};
pub use payment::{Payment, PaymentMethod, PaymentStatus, ReceiptType};

pub type ScreeningId = i64;
pub type SeatId = i64;
pub type ProductId = i64;
pub type TicketId = i64;
pub type PaymentId = i64;
pub type SaleId = i64;
pub type ClientId = i64;
