use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{FromRow, Postgres, Transaction};
use tracing::{debug, info};

use super::{CommittedPurchase, NewSeat, PurchaseWrite, Store, StoreError, StoreResult};
use crate::database::Database;
use crate::models::{
    ClientId, ConcessionLine, ConcessionSale, Payment, PaymentStatus, Product, ProductId,
    Screening, ScreeningId, Seat, SeatCode, SeatId, Ticket, TicketState,
};

const SEAT_COLUMNS: &str =
    "id, screening_id, row_label, number, seat_type, state, holder_id, hold_expires_at";

#[derive(FromRow)]
struct ScreeningRow {
    id: i64,
    movie_id: i64,
    movie_title: String,
    room_id: i64,
    room_name: String,
    room_capacity: i32,
    starts_at: DateTime<Utc>,
    base_price_cents: i64,
    total_seats: i32,
    available_seats: i32,
    active: bool,
}

impl From<ScreeningRow> for Screening {
    fn from(row: ScreeningRow) -> Self {
        Screening {
            id: row.id,
            movie_id: row.movie_id,
            movie_title: row.movie_title,
            room_id: row.room_id,
            room_name: row.room_name,
            room_capacity: row.room_capacity.max(0) as u32,
            starts_at: row.starts_at,
            base_price_cents: row.base_price_cents,
            total_seats: row.total_seats.max(0) as u32,
            available_seats: row.available_seats.max(0) as u32,
            active: row.active,
        }
    }
}

#[derive(FromRow)]
struct SeatRow {
    id: i64,
    screening_id: i64,
    row_label: String,
    number: i32,
    seat_type: String,
    state: String,
    holder_id: Option<i64>,
    hold_expires_at: Option<DateTime<Utc>>,
}

impl TryFrom<SeatRow> for Seat {
    type Error = StoreError;

    fn try_from(row: SeatRow) -> Result<Self, Self::Error> {
        let corrupt = |e: String| StoreError::Corrupt(format!("seat {}: {}", row.id, e));
        Ok(Seat {
            id: row.id,
            screening_id: row.screening_id,
            number: u32::try_from(row.number).map_err(|e| corrupt(e.to_string()))?,
            seat_type: row.seat_type.parse().map_err(corrupt)?,
            state: row.state.parse().map_err(corrupt)?,
            row: row.row_label,
            holder_id: row.holder_id,
            hold_expires_at: row.hold_expires_at,
        })
    }
}

#[derive(FromRow)]
struct ProductRow {
    id: i64,
    name: String,
    price_cents: i64,
    stock: i32,
    active: bool,
}

impl From<ProductRow> for Product {
    fn from(row: ProductRow) -> Self {
        Product {
            id: row.id,
            name: row.name,
            price_cents: row.price_cents,
            stock: row.stock.max(0) as u32,
            active: row.active,
        }
    }
}

#[derive(FromRow)]
struct TicketRow {
    id: i64,
    screening_id: i64,
    seat_id: i64,
    seat_code: String,
    client_id: i64,
    price_cents: i64,
    issued_at: DateTime<Utc>,
}

impl TryFrom<TicketRow> for Ticket {
    type Error = StoreError;

    fn try_from(row: TicketRow) -> Result<Self, Self::Error> {
        let seat_code: SeatCode = row
            .seat_code
            .parse()
            .map_err(|e| StoreError::Corrupt(format!("ticket {}: {}", row.id, e)))?;
        Ok(Ticket {
            id: row.id,
            screening_id: row.screening_id,
            seat_id: row.seat_id,
            seat_code,
            client_id: row.client_id,
            price_cents: row.price_cents,
            state: TicketState::Paid,
            issued_at: row.issued_at,
        })
    }
}

/// Postgres-backed store. Multi-row writes run inside one transaction.
#[derive(Clone)]
pub struct PgStore {
    db: Database,
}

impl PgStore {
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    async fn refresh_available(
        tx: &mut Transaction<'_, Postgres>,
        screening_id: ScreeningId,
    ) -> StoreResult<()> {
        sqlx::query(
            r#"
            UPDATE screenings
            SET total_seats = (SELECT COUNT(*) FROM seats WHERE screening_id = $1),
                available_seats = (SELECT COUNT(*) FROM seats WHERE screening_id = $1 AND state <> 'SOLD')
            WHERE id = $1
            "#
        )
        .bind(screening_id)
        .execute(&mut **tx)
        .await?;
        Ok(())
    }

    async fn debit_in(tx: &mut Transaction<'_, Postgres>, lines: &[ConcessionLine]) -> StoreResult<()> {
        for line in lines {
            let debited = sqlx::query(
                "UPDATE products SET stock = stock - $2
                 WHERE id = $1 AND active AND stock >= $2"
            )
            .bind(line.product_id)
            .bind(line.quantity as i32)
            .execute(&mut **tx)
            .await?
            .rows_affected();

            if debited == 0 {
                return Err(StoreError::InsufficientStock(line.product_id));
            }
        }
        Ok(())
    }
}

#[async_trait]
impl Store for PgStore {
    async fn screening(&self, id: ScreeningId) -> StoreResult<Option<Screening>> {
        let row: Option<ScreeningRow> = sqlx::query_as(
            "SELECT id, movie_id, movie_title, room_id, room_name, room_capacity, starts_at,
                    base_price_cents, total_seats, available_seats, active
             FROM screenings WHERE id = $1"
        )
        .bind(id)
        .fetch_optional(&self.db.pool)
        .await?;
        Ok(row.map(Screening::from))
    }

    async fn seat(&self, id: SeatId) -> StoreResult<Option<Seat>> {
        let row: Option<SeatRow> = sqlx::query_as(&format!("SELECT {} FROM seats WHERE id = $1", SEAT_COLUMNS))
            .bind(id)
            .fetch_optional(&self.db.pool)
            .await?;
        row.map(Seat::try_from).transpose()
    }

    async fn seats_for_screening(&self, screening_id: ScreeningId) -> StoreResult<Vec<Seat>> {
        let rows: Vec<SeatRow> = sqlx::query_as(&format!(
            "SELECT {} FROM seats WHERE screening_id = $1 ORDER BY id",
            SEAT_COLUMNS
        ))
        .bind(screening_id)
        .fetch_all(&self.db.pool)
        .await?;
        rows.into_iter().map(Seat::try_from).collect()
    }

    async fn insert_seats(&self, screening_id: ScreeningId, seats: &[NewSeat]) -> StoreResult<Vec<Seat>> {
        let mut tx = self.db.pool.begin().await?;

        for seat in seats {
            sqlx::query(
                "INSERT INTO seats (screening_id, row_label, number, seat_type, state)
                 VALUES ($1, $2, $3, $4, 'AVAILABLE')
                 ON CONFLICT (screening_id, row_label, number) DO NOTHING"
            )
            .bind(screening_id)
            .bind(&seat.row)
            .bind(seat.number as i32)
            .bind(seat.seat_type.as_str())
            .execute(&mut *tx)
            .await?;
        }
        Self::refresh_available(&mut tx, screening_id).await?;
        tx.commit().await?;

        info!("Inserted seat map for screening {} ({} seats)", screening_id, seats.len());
        self.seats_for_screening(screening_id).await
    }

    async fn save_seat(&self, seat: &Seat) -> StoreResult<()> {
        let mut tx = self.db.pool.begin().await?;

        let updated = sqlx::query(
            "UPDATE seats SET state = $2, holder_id = $3, hold_expires_at = $4 WHERE id = $1"
        )
        .bind(seat.id)
        .bind(seat.state.as_str())
        .bind(seat.holder_id)
        .bind(seat.hold_expires_at)
        .execute(&mut *tx)
        .await?
        .rows_affected();

        if updated == 0 {
            let _ = tx.rollback().await;
            return Err(StoreError::Backend(format!("seat {} does not exist", seat.id)));
        }

        Self::refresh_available(&mut tx, seat.screening_id).await?;
        tx.commit().await?;
        Ok(())
    }

    async fn expired_holds(&self, now: DateTime<Utc>) -> StoreResult<Vec<Seat>> {
        let rows: Vec<SeatRow> = sqlx::query_as(&format!(
            "SELECT {} FROM seats WHERE state = 'HELD' AND hold_expires_at <= $1",
            SEAT_COLUMNS
        ))
        .bind(now)
        .fetch_all(&self.db.pool)
        .await?;
        rows.into_iter().map(Seat::try_from).collect()
    }

    async fn product(&self, id: ProductId) -> StoreResult<Option<Product>> {
        let row: Option<ProductRow> = sqlx::query_as(
            "SELECT id, name, price_cents, stock, active FROM products WHERE id = $1"
        )
        .bind(id)
        .fetch_optional(&self.db.pool)
        .await?;
        Ok(row.map(Product::from))
    }

    async fn debit_stock(&self, lines: &[ConcessionLine]) -> StoreResult<()> {
        let mut tx = self.db.pool.begin().await?;
        if let Err(e) = Self::debit_in(&mut tx, lines).await {
            let _ = tx.rollback().await;
            return Err(e);
        }
        tx.commit().await?;
        Ok(())
    }

    async fn credit_stock(&self, lines: &[ConcessionLine]) -> StoreResult<()> {
        let mut tx = self.db.pool.begin().await?;
        for line in lines {
            let credited = sqlx::query("UPDATE products SET stock = stock + $2 WHERE id = $1")
                .bind(line.product_id)
                .bind(line.quantity as i32)
                .execute(&mut *tx)
                .await?
                .rows_affected();
            if credited == 0 {
                let _ = tx.rollback().await;
                return Err(StoreError::Backend(format!("product {} does not exist", line.product_id)));
            }
        }
        tx.commit().await?;
        Ok(())
    }

    async fn commit_purchase(&self, write: PurchaseWrite) -> StoreResult<CommittedPurchase> {
        let mut tx = self.db.pool.begin().await?;

        // 1. Seats: held by the purchaser -> sold
        let mut seats = Vec::with_capacity(write.seats.len());
        for seat_id in &write.seats {
            let row: Option<SeatRow> = sqlx::query_as(&format!(
                "UPDATE seats SET state = 'SOLD', holder_id = NULL, hold_expires_at = NULL
                 WHERE id = $1 AND state = 'HELD' AND holder_id = $2
                 RETURNING {}",
                SEAT_COLUMNS
            ))
            .bind(seat_id)
            .bind(write.purchaser_id)
            .fetch_optional(&mut *tx)
            .await?;

            match row {
                Some(row) => seats.push(Seat::try_from(row)?),
                None => {
                    let _ = tx.rollback().await;
                    return Err(StoreError::SeatConflict(*seat_id));
                }
            }
        }

        // 2. Concession stock
        if let Err(e) = Self::debit_in(&mut tx, &write.debits).await {
            let _ = tx.rollback().await;
            return Err(e);
        }

        // 3. Tickets
        let mut tickets = Vec::with_capacity(write.tickets.len());
        for new_ticket in write.tickets {
            let id: i64 = sqlx::query_scalar(
                "INSERT INTO tickets (screening_id, seat_id, seat_code, client_id, price_cents, state, issued_at)
                 VALUES ($1, $2, $3, $4, $5, 'PAID', $6)
                 RETURNING id"
            )
            .bind(new_ticket.screening_id)
            .bind(new_ticket.seat_id)
            .bind(new_ticket.seat_code.to_string())
            .bind(new_ticket.client_id)
            .bind(new_ticket.price_cents)
            .bind(new_ticket.issued_at)
            .fetch_one(&mut *tx)
            .await?;

            tickets.push(Ticket {
                id,
                screening_id: new_ticket.screening_id,
                seat_id: new_ticket.seat_id,
                seat_code: new_ticket.seat_code,
                client_id: new_ticket.client_id,
                price_cents: new_ticket.price_cents,
                state: TicketState::Paid,
                issued_at: new_ticket.issued_at,
            });
        }

        // 4. Payment
        let p = write.payment;
        let payment_id: i64 = sqlx::query_scalar(
            "INSERT INTO payments (client_id, amount_cents, method, receipt_type, status, confirmation_code, created_at)
             VALUES ($1, $2, $3, $4, 'COMPLETED', $5, $6)
             RETURNING id"
        )
        .bind(p.client_id)
        .bind(p.amount_cents)
        .bind(p.method.as_str())
        .bind(p.receipt_type.as_str())
        .bind(&p.confirmation_code)
        .bind(p.created_at)
        .fetch_one(&mut *tx)
        .await?;

        let payment = Payment {
            id: payment_id,
            client_id: p.client_id,
            amount_cents: p.amount_cents,
            method: p.method,
            receipt_type: p.receipt_type,
            status: PaymentStatus::Completed,
            confirmation_code: p.confirmation_code,
            created_at: p.created_at,
        };

        // 5. Concession sale with its lines
        let sale = match write.sale {
            Some(new_sale) => {
                let sale_id: i64 = sqlx::query_scalar(
                    "INSERT INTO concession_sales (client_id, payment_id, method, completed)
                     VALUES ($1, $2, $3, TRUE)
                     RETURNING id"
                )
                .bind(new_sale.client_id)
                .bind(payment_id)
                .bind(new_sale.method.as_str())
                .fetch_one(&mut *tx)
                .await?;

                for line in &new_sale.lines {
                    sqlx::query(
                        "INSERT INTO concession_sale_lines (sale_id, product_id, quantity, unit_price_cents, subtotal_cents)
                         VALUES ($1, $2, $3, $4, $5)"
                    )
                    .bind(sale_id)
                    .bind(line.product_id)
                    .bind(line.quantity as i32)
                    .bind(line.unit_price_cents)
                    .bind(line.subtotal_cents)
                    .execute(&mut *tx)
                    .await?;
                }

                Some(ConcessionSale {
                    id: sale_id,
                    client_id: new_sale.client_id,
                    method: new_sale.method,
                    completed: true,
                    lines: new_sale.lines,
                })
            }
            None => None,
        };

        Self::refresh_available(&mut tx, write.screening_id).await?;
        tx.commit().await?;

        debug!("Committed purchase {} ({} seats)", payment.confirmation_code, seats.len());
        Ok(CommittedPurchase { seats, tickets, payment, sale })
    }

    async fn tickets_for_client(&self, client_id: ClientId) -> StoreResult<Vec<Ticket>> {
        let rows: Vec<TicketRow> = sqlx::query_as(
            "SELECT id, screening_id, seat_id, seat_code, client_id, price_cents, issued_at
             FROM tickets WHERE client_id = $1
             ORDER BY issued_at DESC, id"
        )
        .bind(client_id)
        .fetch_all(&self.db.pool)
        .await?;
        rows.into_iter().map(Ticket::try_from).collect()
    }
}
