use serde::{Deserialize, Serialize};

use super::{ClientId, ProductId, SaleId};
use super::payment::PaymentMethod;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Product {
    pub id: ProductId,
    pub name: String,
    pub price_cents: i64,
    pub stock: u32,
    pub active: bool,
}

/// One requested concession item inside a purchase.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConcessionLine {
    pub product_id: ProductId,
    pub quantity: u32,
}

impl ConcessionLine {
    pub fn new(product_id: ProductId, quantity: u32) -> Self {
        Self { product_id, quantity }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PricedLine {
    pub product_id: ProductId,
    pub name: String,
    pub quantity: u32,
    pub unit_price_cents: i64,
    pub subtotal_cents: i64,
}

impl PricedLine {
    pub fn as_line(&self) -> ConcessionLine {
        ConcessionLine::new(self.product_id, self.quantity)
    }
}

/// Committed concession sale with its line items.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConcessionSale {
    pub id: SaleId,
    pub client_id: ClientId,
    pub method: PaymentMethod,
    pub completed: bool,
    pub lines: Vec<PricedLine>,
}
