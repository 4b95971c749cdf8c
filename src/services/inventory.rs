use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{info, warn};

use crate::error::{BookingError, BookingResult};
use crate::models::{ConcessionLine, PricedLine, ProductId};
use crate::repository::Store;

/// Keeps concession stock non-negative.
pub struct InventoryGuard {
    store: Arc<dyn Store>,
}

impl InventoryGuard {
    pub fn new(store: Arc<dyn Store>) -> Self {
        Self { store }
    }

    /// Validates and prices every line without touching stock. Lines for the
    /// same product are merged first, so the stock check sees the total.
    pub async fn price_lines(&self, lines: &[ConcessionLine]) -> BookingResult<Vec<PricedLine>> {
        let mut merged: BTreeMap<ProductId, u32> = BTreeMap::new();
        for line in lines {
            if line.quantity == 0 {
                return Err(BookingError::InvalidArgument(format!(
                    "quantity for product {} must be at least 1",
                    line.product_id
                )));
            }
            let total = merged.entry(line.product_id).or_default();
            *total = total.checked_add(line.quantity).ok_or_else(|| {
                BookingError::InvalidArgument(format!("quantity for product {} is too large", line.product_id))
            })?;
        }

        let mut priced = Vec::with_capacity(merged.len());
        for (product_id, quantity) in merged {
            let product = self
                .store
                .product(product_id)
                .await?
                .ok_or_else(|| BookingError::NotFound(format!("product {}", product_id)))?;

            if !product.active {
                warn!("Product {} ({}) is not on sale", product.id, product.name);
                return Err(BookingError::Unavailable(format!("product {} is not on sale", product.name)));
            }
            if product.stock < quantity {
                warn!(
                    "Product {} has {} in stock, {} requested",
                    product.id, product.stock, quantity
                );
                return Err(BookingError::InsufficientStock(format!(
                    "product {}: requested {}, {} left",
                    product.name, quantity, product.stock
                )));
            }

            priced.push(PricedLine {
                product_id,
                name: product.name,
                quantity,
                unit_price_cents: product.price_cents,
                subtotal_cents: product.price_cents * i64::from(quantity),
            });
        }
        Ok(priced)
    }

    /// Prices the lines and debits all of them in one store call.
    pub async fn reserve_and_debit(&self, lines: &[ConcessionLine]) -> BookingResult<Vec<PricedLine>> {
        let priced = self.price_lines(lines).await?;
        if priced.is_empty() {
            return Ok(priced);
        }

        let debits: Vec<ConcessionLine> = priced.iter().map(PricedLine::as_line).collect();
        self.store.debit_stock(&debits).await?;
        info!("Debited {} concession lines", debits.len());
        Ok(priced)
    }

    pub async fn credit(&self, lines: &[ConcessionLine]) -> BookingResult<()> {
        if lines.is_empty() {
            return Ok(());
        }
        self.store.credit_stock(lines).await?;
        info!("Returned {} concession lines to stock", lines.len());
        Ok(())
    }
}

/// Sum of line subtotals.
pub fn concession_total(lines: &[PricedLine]) -> i64 {
    lines.iter().map(|l| l.subtotal_cents).sum()
}
