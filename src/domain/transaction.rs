use crate::domain::client::ClientId;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Terminal outcome code of one processing attempt.
#[derive(Debug, Serialize, Deserialize, PartialEq, Eq, Clone, Copy)]
pub enum StatusCode {
    #[serde(rename = "00")]
    Success,
    #[serde(rename = "01")]
    Duplicate,
    #[serde(rename = "02")]
    QuotaRejected,
    #[serde(rename = "03")]
    Failed,
}

impl StatusCode {
    pub fn code(&self) -> &'static str {
        match self {
            Self::Success => "00",
            Self::Duplicate => "01",
            Self::QuotaRejected => "02",
            Self::Failed => "03",
        }
    }
}

/// Append-only audit entry.
#[derive(Debug, Serialize, Deserialize, PartialEq, Clone)]
pub struct TransactionRecord {
    pub id: u64,
    pub client: ClientId,
    pub receipt_process: Option<u64>,
    pub status: StatusCode,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, PartialEq, Clone)]
pub struct NewTransaction {
    pub client: ClientId,
    pub receipt_process: Option<u64>,
    pub status: StatusCode,
}

impl NewTransaction {
    pub fn into_record(self, id: u64) -> TransactionRecord {
        TransactionRecord {
            id,
            client: self.client,
            receipt_process: self.receipt_process,
            status: self.status,
            created_at: Utc::now(),
        }
    }
}
