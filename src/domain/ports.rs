use super::client::{ClientId, Deduction, QuotaBalance};
use super::process::{NewReceiptProcess, ReceiptProcess};
use super::receipt::{Receipt, ReceiptId, Registration};
use super::transaction::{NewTransaction, TransactionRecord};
use crate::error::Result;
use async_trait::async_trait;
use std::path::PathBuf;
use std::sync::Arc;

/// Clients and their prepaid credit balances.
#[async_trait]
pub trait ClientStore: Send + Sync {
    /// Adds a client without a balance. Registering twice is a no-op.
    async fn register(&self, client: &ClientId) -> Result<()>;
    async fn exists(&self, client: &ClientId) -> Result<bool>;
    /// Adds credits, creating the balance if the client has none yet.
    async fn grant_credits(&self, client: &ClientId, credits: u64) -> Result<QuotaBalance>;
    /// Atomically spends one credit if at least one is available.
    async fn try_deduct(&self, client: &ClientId) -> Result<Deduction>;
    /// Atomically gives back one previously deducted credit.
    async fn refund_one(&self, client: &ClientId) -> Result<Option<QuotaBalance>>;
    async fn balance(&self, client: &ClientId) -> Result<Option<QuotaBalance>>;
}

/// Receipts and the rows recognition stages append for them.
#[async_trait]
pub trait ReceiptStore: Send + Sync {
    /// Inserts unless a receipt with the same identity already exists.
    async fn insert(&self, receipt: Receipt) -> Result<Registration>;
    async fn get(&self, id: &ReceiptId) -> Result<Option<Receipt>>;
    async fn append_process(&self, row: NewReceiptProcess) -> Result<ReceiptProcess>;
    /// The most recently appended process row for a receipt.
    async fn latest_process(&self, id: &ReceiptId) -> Result<Option<ReceiptProcess>>;
}

#[async_trait]
pub trait TransactionStore: Send + Sync {
    async fn append(&self, tx: NewTransaction) -> Result<TransactionRecord>;
    async fn for_client(&self, client: &ClientId) -> Result<Vec<TransactionRecord>>;
}

/// Input of the bank and version identification stage.
#[derive(Debug, Clone)]
pub struct IdentifyJob {
    pub image_path: PathBuf,
    pub receipt: ReceiptId,
}

/// Input of the amount extraction stage.
#[derive(Debug, Clone)]
pub struct ExtractJob {
    pub image_path: PathBuf,
    pub receipt: ReceiptId,
    pub bank: String,
    pub version: String,
}

/// External recognition engine.
///
/// Both stages report their outcome by appending process rows to the
/// receipt store; the returned value only signals whether the stage ran.
#[async_trait]
pub trait RecognitionEngine: Send + Sync {
    async fn identify(&self, job: &IdentifyJob) -> Result<()>;
    async fn extract(&self, job: &ExtractJob) -> Result<()>;
}

pub type ClientStoreRef = Arc<dyn ClientStore>;
pub type ReceiptStoreRef = Arc<dyn ReceiptStore>;
pub type TransactionStoreRef = Arc<dyn TransactionStore>;
pub type RecognitionEngineRef = Arc<dyn RecognitionEngine>;
