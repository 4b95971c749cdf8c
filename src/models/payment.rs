use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::str::FromStr;

use super::{ClientId, PaymentId};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PaymentMethod {
    Cash,
    Card,
    DigitalWallet,
}

impl PaymentMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            PaymentMethod::Cash => "CASH",
            PaymentMethod::Card => "CARD",
            PaymentMethod::DigitalWallet => "DIGITAL_WALLET",
        }
    }
}

impl FromStr for PaymentMethod {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "CASH" => Ok(PaymentMethod::Cash),
            "CARD" => Ok(PaymentMethod::Card),
            "DIGITAL_WALLET" => Ok(PaymentMethod::DigitalWallet),
            other => Err(format!("unknown payment method '{}'", other)),
        }
    }
}

/// Kind of fiscal document the purchaser asked for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ReceiptType {
    Receipt,
    Invoice,
}

impl ReceiptType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ReceiptType::Receipt => "RECEIPT",
            ReceiptType::Invoice => "INVOICE",
        }
    }
}

impl FromStr for ReceiptType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "RECEIPT" => Ok(ReceiptType::Receipt),
            "INVOICE" => Ok(ReceiptType::Invoice),
            other => Err(format!("unknown receipt type '{}'", other)),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PaymentStatus {
    Completed,
}

/// Recorded outcome of a purchase. No gateway is involved.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Payment {
    pub id: PaymentId,
    pub client_id: ClientId,
    pub amount_cents: i64,
    pub method: PaymentMethod,
    pub receipt_type: ReceiptType,
    pub status: PaymentStatus,
    pub confirmation_code: String,
    pub created_at: DateTime<Utc>,
}
