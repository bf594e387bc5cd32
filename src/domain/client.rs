use crate::error::{ReceiptError, Result};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Length of a client credential as issued by sales.
pub const CREDENTIAL_LEN: usize = 36;

/// An opaque client credential.
///
/// Only the length is validated; existence is checked against the store.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ClientId(String);

impl ClientId {
    pub fn parse(raw: &str) -> Result<Self> {
        if raw.chars().count() == CREDENTIAL_LEN {
            Ok(Self(raw.to_string()))
        } else {
            Err(ReceiptError::InvalidCredential)
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ClientId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Prepaid credit balance of a client.
///
/// `available` is what may still be spent, `spent` counts every deduction
/// ever made and never goes down.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct QuotaBalance {
    pub available: u64,
    pub spent: u64,
}

impl QuotaBalance {
    pub fn new(available: u64) -> Self {
        Self {
            available,
            spent: 0,
        }
    }

    /// Spends one credit if at least one is available.
    ///
    /// Returns `false` and leaves the balance untouched otherwise.
    pub fn deduct_one(&mut self) -> bool {
        if self.available >= 1 {
            self.available -= 1;
            self.spent += 1;
            true
        } else {
            false
        }
    }

    /// Gives back a credit taken by [`deduct_one`](Self::deduct_one).
    ///
    /// `spent` is left as is.
    pub fn refund_one(&mut self) {
        self.available = self.available.saturating_add(1);
    }

    pub fn grant(&mut self, credits: u64) {
        self.available = self.available.saturating_add(credits);
    }
}

/// Outcome of an atomic check-and-deduct against the store.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Deduction {
    /// One credit was spent; carries the balance after deduction.
    Deducted(QuotaBalance),
    /// The client exists but no balance was ever provisioned.
    NoBalanceRow,
    /// The balance exists and is empty.
    Insufficient,
}
