use crate::domain::receipt::ReceiptId;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;

/// The two external recognition steps, in execution order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RecognitionStage {
    /// Stage 1: which bank and receipt template version.
    Identify,
    /// Stage 2: the transferred amount.
    Extract,
}

impl fmt::Display for RecognitionStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Identify => f.write_str("identify"),
            Self::Extract => f.write_str("extract"),
        }
    }
}

/// A row appended by a recognition stage.
///
/// Rows are never updated; the newest row for a receipt is authoritative.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReceiptProcess {
    pub id: u64,
    pub receipt: ReceiptId,
    pub bank: Option<String>,
    pub version: Option<String>,
    pub amount: Option<Decimal>,
    pub created_at: DateTime<Utc>,
}

/// A process row before the store assigns its id.
#[derive(Debug, Clone, PartialEq)]
pub struct NewReceiptProcess {
    pub receipt: ReceiptId,
    pub bank: Option<String>,
    pub version: Option<String>,
    pub amount: Option<Decimal>,
}

impl NewReceiptProcess {
    pub fn identified(receipt: ReceiptId, bank: &str, version: &str) -> Self {
        Self {
            receipt,
            bank: Some(bank.to_string()),
            version: Some(version.to_string()),
            amount: None,
        }
    }

    pub fn extracted(receipt: ReceiptId, bank: &str, version: &str, amount: Decimal) -> Self {
        Self {
            amount: Some(amount),
            ..Self::identified(receipt, bank, version)
        }
    }

    /// Materializes the row once the store has allocated an id.
    pub fn into_row(self, id: u64) -> ReceiptProcess {
        ReceiptProcess {
            id,
            receipt: self.receipt,
            bank: self.bank,
            version: self.version,
            amount: self.amount,
            created_at: Utc::now(),
        }
    }
}

/// Bank and template version produced by stage 1.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BankVersion {
    pub bank: String,
    pub version: String,
}

/// Amount produced by stage 2 together with the row it was read from.
#[derive(Debug, Clone, PartialEq)]
pub struct Extraction {
    pub process_id: u64,
    pub amount: Decimal,
}
