use crate::domain::client::{ClientId, Deduction, QuotaBalance};
use crate::domain::ports::{ClientStore, ReceiptStore, TransactionStore};
use crate::domain::process::{NewReceiptProcess, ReceiptProcess};
use crate::domain::receipt::{Receipt, ReceiptId, Registration};
use crate::domain::transaction::{NewTransaction, TransactionRecord};
use crate::error::Result;
use async_trait::async_trait;
use std::collections::HashMap;
use std::collections::hash_map::Entry;
use std::sync::Arc;
use tokio::sync::RwLock;

/// A thread-safe in-memory store for clients and their balances.
///
/// A client maps to `None` until credits are granted, which mirrors a
/// missing balance row. Deduction happens under the write lock so the
/// check and the decrement are one step.
#[derive(Default, Clone)]
pub struct InMemoryClientStore {
    clients: Arc<RwLock<HashMap<ClientId, Option<QuotaBalance>>>>,
}

impl InMemoryClientStore {
    /// Creates a new, empty in-memory client store.
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ClientStore for InMemoryClientStore {
    async fn register(&self, client: &ClientId) -> Result<()> {
        let mut clients = self.clients.write().await;
        clients.entry(client.clone()).or_insert(None);
        Ok(())
    }

    async fn exists(&self, client: &ClientId) -> Result<bool> {
        let clients = self.clients.read().await;
        Ok(clients.contains_key(client))
    }

    async fn grant_credits(&self, client: &ClientId, credits: u64) -> Result<QuotaBalance> {
        let mut clients = self.clients.write().await;
        let balance = clients
            .entry(client.clone())
            .or_insert(None)
            .get_or_insert_with(QuotaBalance::default);
        balance.grant(credits);
        Ok(*balance)
    }

    async fn try_deduct(&self, client: &ClientId) -> Result<Deduction> {
        let mut clients = self.clients.write().await;
        let Some(Some(balance)) = clients.get_mut(client) else {
            return Ok(Deduction::NoBalanceRow);
        };
        if balance.deduct_one() {
            Ok(Deduction::Deducted(*balance))
        } else {
            Ok(Deduction::Insufficient)
        }
    }

    async fn refund_one(&self, client: &ClientId) -> Result<Option<QuotaBalance>> {
        let mut clients = self.clients.write().await;
        let Some(Some(balance)) = clients.get_mut(client) else {
            return Ok(None);
        };
        balance.refund_one();
        Ok(Some(*balance))
    }

    async fn balance(&self, client: &ClientId) -> Result<Option<QuotaBalance>> {
        let clients = self.clients.read().await;
        Ok(clients.get(client).copied().flatten())
    }
}

#[derive(Default)]
struct ReceiptTables {
    receipts: HashMap<ReceiptId, Receipt>,
    processes: HashMap<ReceiptId, Vec<ReceiptProcess>>,
    next_process_id: u64,
}

/// A thread-safe in-memory store for receipts and their process rows.
///
/// Process rows share one id sequence across receipts so ids reflect global
/// insertion order.
#[derive(Default, Clone)]
pub struct InMemoryReceiptStore {
    tables: Arc<RwLock<ReceiptTables>>,
}

impl InMemoryReceiptStore {
    /// Creates a new, empty in-memory receipt store.
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ReceiptStore for InMemoryReceiptStore {
    async fn insert(&self, receipt: Receipt) -> Result<Registration> {
        let mut tables = self.tables.write().await;
        match tables.receipts.entry(receipt.id) {
            Entry::Occupied(_) => Ok(Registration::Duplicate),
            Entry::Vacant(slot) => {
                slot.insert(receipt.clone());
                Ok(Registration::Inserted(receipt))
            }
        }
    }

    async fn get(&self, id: &ReceiptId) -> Result<Option<Receipt>> {
        let tables = self.tables.read().await;
        Ok(tables.receipts.get(id).cloned())
    }

    async fn append_process(&self, row: NewReceiptProcess) -> Result<ReceiptProcess> {
        let mut tables = self.tables.write().await;
        tables.next_process_id += 1;
        let row = row.into_row(tables.next_process_id);
        tables
            .processes
            .entry(row.receipt)
            .or_default()
            .push(row.clone());
        Ok(row)
    }

    async fn latest_process(&self, id: &ReceiptId) -> Result<Option<ReceiptProcess>> {
        let tables = self.tables.read().await;
        Ok(tables
            .processes
            .get(id)
            .and_then(|rows| rows.iter().max_by_key(|row| row.id))
            .cloned())
    }
}

#[derive(Default)]
struct TransactionLog {
    records: Vec<TransactionRecord>,
}

/// A thread-safe in-memory append-only transaction log.
#[derive(Default, Clone)]
pub struct InMemoryTransactionStore {
    log: Arc<RwLock<TransactionLog>>,
}

impl InMemoryTransactionStore {
    /// Creates a new, empty in-memory transaction store.
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl TransactionStore for InMemoryTransactionStore {
    async fn append(&self, tx: NewTransaction) -> Result<TransactionRecord> {
        let mut log = self.log.write().await;
        let id = log.records.len() as u64 + 1;
        let record = tx.into_record(id);
        log.records.push(record.clone());
        Ok(record)
    }

    async fn for_client(&self, client: &ClientId) -> Result<Vec<TransactionRecord>> {
        let log = self.log.read().await;
        Ok(log
            .records
            .iter()
            .filter(|record| &record.client == client)
            .cloned()
            .collect())
    }
}
