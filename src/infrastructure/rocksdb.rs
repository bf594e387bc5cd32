use crate::domain::client::{ClientId, Deduction, QuotaBalance};
use crate::domain::ports::{ClientStore, ReceiptStore, TransactionStore};
use crate::domain::process::{NewReceiptProcess, ReceiptProcess};
use crate::domain::receipt::{Receipt, ReceiptId, Registration};
use crate::domain::transaction::{NewTransaction, TransactionRecord};
use crate::error::{ReceiptError, Result};
use async_trait::async_trait;
use rocksdb::{
    ColumnFamily, ColumnFamilyDescriptor, Direction, IteratorMode, Options, Transaction,
    TransactionDB, TransactionDBOptions,
};
use serde::Serialize;
use serde::de::DeserializeOwned;
use std::path::Path;
use std::sync::Arc;

/// Column Family for registered clients (value is empty).
pub const CF_CLIENTS: &str = "clients";
/// Column Family for credit balances, keyed by client.
pub const CF_QUOTAS: &str = "quotas";
/// Column Family for receipts, keyed by identity.
pub const CF_RECEIPTS: &str = "receipts";
/// Column Family for process rows, keyed by `<receipt>/<zero padded id>`.
pub const CF_PROCESSES: &str = "receipt_processes";
/// Column Family for transaction records, keyed by big-endian id.
pub const CF_TRANSACTIONS: &str = "transactions";
/// Column Family holding id sequences.
pub const CF_SEQUENCES: &str = "sequences";

const SEQ_PROCESS: &[u8] = b"receipt_process";
const SEQ_TRANSACTION: &[u8] = b"transaction";

/// How long a transaction waits for a key another request has locked.
const LOCK_TIMEOUT_MS: i64 = 5_000;

/// A persistent store implementation using a transactional RocksDB.
///
/// Every read-modify-write (credit deduction, receipt insert-if-absent,
/// sequence allocation) runs in a pessimistic transaction that locks the
/// touched key with `get_for_update`, so concurrent requests serialize on
/// the same client or receipt identity.
///
/// This struct is thread-safe (`Clone` shares the underlying `Arc<TransactionDB>`).
#[derive(Clone)]
pub struct RocksDBStore {
    db: Arc<TransactionDB>,
}

impl RocksDBStore {
    /// Opens or creates a RocksDB instance at the specified path.
    ///
    /// Ensures that all required column families exist.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let mut opts = Options::default();
        opts.create_if_missing(true);
        opts.create_missing_column_families(true);

        let families = [
            CF_CLIENTS,
            CF_QUOTAS,
            CF_RECEIPTS,
            CF_PROCESSES,
            CF_TRANSACTIONS,
            CF_SEQUENCES,
        ]
        .into_iter()
        .map(|name| ColumnFamilyDescriptor::new(name, Options::default()));

        let mut txn_db_opts = TransactionDBOptions::default();
        txn_db_opts.set_txn_lock_timeout(LOCK_TIMEOUT_MS);

        let db = TransactionDB::open_cf_descriptors(&opts, &txn_db_opts, path, families)?;

        Ok(Self { db: Arc::new(db) })
    }

    fn cf(&self, name: &str) -> Result<&ColumnFamily> {
        self.db
            .cf_handle(name)
            .ok_or_else(|| ReceiptError::Store(format!("{name} column family not found")))
    }

    fn next_id(&self, txn: &Transaction<'_, TransactionDB>, sequence: &[u8]) -> Result<u64> {
        let cf = self.cf(CF_SEQUENCES)?;
        let current = match txn.get_for_update_cf(cf, sequence, true)? {
            Some(bytes) => {
                let raw: [u8; 8] = bytes.as_slice().try_into().map_err(|_| {
                    ReceiptError::Store("corrupt sequence value".to_string())
                })?;
                u64::from_be_bytes(raw)
            }
            None => 0,
        };
        let next = current + 1;
        txn.put_cf(cf, sequence, next.to_be_bytes())?;
        Ok(next)
    }

    fn get_json<T: DeserializeOwned>(&self, cf_name: &str, key: &[u8]) -> Result<Option<T>> {
        let cf = self.cf(cf_name)?;
        match self.db.get_cf(cf, key)? {
            Some(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
            None => Ok(None),
        }
    }

    fn put_json<T: Serialize>(
        &self,
        txn: &Transaction<'_, TransactionDB>,
        cf_name: &str,
        key: &[u8],
        value: &T,
    ) -> Result<()> {
        let cf = self.cf(cf_name)?;
        txn.put_cf(cf, key, serde_json::to_vec(value)?)?;
        Ok(())
    }

    fn grant_sync(&self, client: &ClientId, credits: u64) -> Result<QuotaBalance> {
        let txn = self.db.transaction();
        txn.put_cf(self.cf(CF_CLIENTS)?, client.as_str(), b"")?;
        let mut balance: QuotaBalance =
            match txn.get_for_update_cf(self.cf(CF_QUOTAS)?, client.as_str(), true)? {
                Some(bytes) => serde_json::from_slice(&bytes)?,
                None => QuotaBalance::default(),
            };
        balance.grant(credits);
        self.put_json(&txn, CF_QUOTAS, client.as_str().as_bytes(), &balance)?;
        txn.commit()?;
        Ok(balance)
    }

    fn deduct_sync(&self, client: &ClientId) -> Result<Deduction> {
        let txn = self.db.transaction();
        let Some(bytes) = txn.get_for_update_cf(self.cf(CF_QUOTAS)?, client.as_str(), true)?
        else {
            return Ok(Deduction::NoBalanceRow);
        };
        let mut balance: QuotaBalance = serde_json::from_slice(&bytes)?;
        if !balance.deduct_one() {
            // Dropping the transaction releases the lock without writing
            return Ok(Deduction::Insufficient);
        }
        self.put_json(&txn, CF_QUOTAS, client.as_str().as_bytes(), &balance)?;
        txn.commit()?;
        Ok(Deduction::Deducted(balance))
    }

    fn refund_sync(&self, client: &ClientId) -> Result<Option<QuotaBalance>> {
        let txn = self.db.transaction();
        let Some(bytes) = txn.get_for_update_cf(self.cf(CF_QUOTAS)?, client.as_str(), true)?
        else {
            return Ok(None);
        };
        let mut balance: QuotaBalance = serde_json::from_slice(&bytes)?;
        balance.refund_one();
        self.put_json(&txn, CF_QUOTAS, client.as_str().as_bytes(), &balance)?;
        txn.commit()?;
        Ok(Some(balance))
    }

    fn insert_receipt_sync(&self, receipt: Receipt) -> Result<Registration> {
        let key = receipt.id.to_string();
        let txn = self.db.transaction();
        if txn
            .get_for_update_cf(self.cf(CF_RECEIPTS)?, &key, true)?
            .is_some()
        {
            return Ok(Registration::Duplicate);
        }
        self.put_json(&txn, CF_RECEIPTS, key.as_bytes(), &receipt)?;
        txn.commit()?;
        Ok(Registration::Inserted(receipt))
    }

    fn append_process_sync(&self, row: NewReceiptProcess) -> Result<ReceiptProcess> {
        let txn = self.db.transaction();
        let id = self.next_id(&txn, SEQ_PROCESS)?;
        let row = row.into_row(id);
        let key = process_key(&row.receipt, id);
        self.put_json(&txn, CF_PROCESSES, key.as_bytes(), &row)?;
        txn.commit()?;
        Ok(row)
    }

    fn latest_process_sync(&self, id: &ReceiptId) -> Result<Option<ReceiptProcess>> {
        let cf = self.cf(CF_PROCESSES)?;
        let prefix = format!("{id}/");
        // '~' sorts after every digit, so this seeks just past the newest row
        let upper = format!("{id}/~");
        let mut iter = self
            .db
            .iterator_cf(cf, IteratorMode::From(upper.as_bytes(), Direction::Reverse));

        match iter.next() {
            Some(item) => {
                let (key, value) = item?;
                if key.starts_with(prefix.as_bytes()) {
                    Ok(Some(serde_json::from_slice(&value)?))
                } else {
                    Ok(None)
                }
            }
            None => Ok(None),
        }
    }

    fn append_transaction_sync(&self, tx: NewTransaction) -> Result<TransactionRecord> {
        let txn = self.db.transaction();
        let id = self.next_id(&txn, SEQ_TRANSACTION)?;
        let record = tx.into_record(id);
        self.put_json(&txn, CF_TRANSACTIONS, &id.to_be_bytes(), &record)?;
        txn.commit()?;
        Ok(record)
    }

    fn transactions_for_sync(&self, client: &ClientId) -> Result<Vec<TransactionRecord>> {
        let cf = self.cf(CF_TRANSACTIONS)?;
        let mut records = Vec::new();
        for item in self.db.iterator_cf(cf, IteratorMode::Start) {
            let (_key, value) = item?;
            let record: TransactionRecord = serde_json::from_slice(&value)?;
            if &record.client == client {
                records.push(record);
            }
        }
        Ok(records)
    }
}

fn process_key(receipt: &ReceiptId, id: u64) -> String {
    format!("{receipt}/{id:020}")
}

#[async_trait]
impl ClientStore for RocksDBStore {
    async fn register(&self, client: &ClientId) -> Result<()> {
        self.db.put_cf(self.cf(CF_CLIENTS)?, client.as_str(), b"")?;
        Ok(())
    }

    async fn exists(&self, client: &ClientId) -> Result<bool> {
        let result = self.db.get_pinned_cf(self.cf(CF_CLIENTS)?, client.as_str())?;
        Ok(result.is_some())
    }

    async fn grant_credits(&self, client: &ClientId, credits: u64) -> Result<QuotaBalance> {
        self.grant_sync(client, credits)
    }

    async fn try_deduct(&self, client: &ClientId) -> Result<Deduction> {
        self.deduct_sync(client)
    }

    async fn refund_one(&self, client: &ClientId) -> Result<Option<QuotaBalance>> {
        self.refund_sync(client)
    }

    async fn balance(&self, client: &ClientId) -> Result<Option<QuotaBalance>> {
        self.get_json(CF_QUOTAS, client.as_str().as_bytes())
    }
}

#[async_trait]
impl ReceiptStore for RocksDBStore {
    async fn insert(&self, receipt: Receipt) -> Result<Registration> {
        self.insert_receipt_sync(receipt)
    }

    async fn get(&self, id: &ReceiptId) -> Result<Option<Receipt>> {
        self.get_json(CF_RECEIPTS, id.to_string().as_bytes())
    }

    async fn append_process(&self, row: NewReceiptProcess) -> Result<ReceiptProcess> {
        self.append_process_sync(row)
    }

    async fn latest_process(&self, id: &ReceiptId) -> Result<Option<ReceiptProcess>> {
        self.latest_process_sync(id)
    }
}

#[async_trait]
impl TransactionStore for RocksDBStore {
    async fn append(&self, tx: NewTransaction) -> Result<TransactionRecord> {
        self.append_transaction_sync(tx)
    }

    async fn for_client(&self, client: &ClientId) -> Result<Vec<TransactionRecord>> {
        self.transactions_for_sync(client)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::receipt::{ImageDimensions, ReceiptDraft, receipt_identity};
    use crate::domain::transaction::StatusCode;
    use rust_decimal_macros::dec;
    use std::path::PathBuf;
    use tempfile::tempdir;

    fn client(c: char) -> ClientId {
        ClientId::parse(&c.to_string().repeat(36)).unwrap()
    }

    fn receipt(owner: &ClientId) -> Receipt {
        let dimensions = ImageDimensions {
            width: 400,
            height: 800,
        };
        ReceiptDraft {
            id: receipt_identity(owner, 12345, dimensions),
            client: owner.clone(),
            filename: format!("{owner}_20261017120000.jpg"),
            path: PathBuf::from("uploads"),
            size: 12345,
            dimensions,
        }
        .into()
    }

    #[tokio::test]
    async fn test_rocksdb_open_cf() {
        let dir = tempdir().unwrap();
        let store = RocksDBStore::open(dir.path()).expect("Failed to open RocksDB");

        for name in [CF_CLIENTS, CF_QUOTAS, CF_RECEIPTS, CF_PROCESSES, CF_TRANSACTIONS] {
            assert!(store.db.cf_handle(name).is_some());
        }
    }

    #[tokio::test]
    async fn test_rocksdb_quota_ledger() {
        let dir = tempdir().unwrap();
        let store = RocksDBStore::open(dir.path()).unwrap();
        let a = client('a');

        store.register(&a).await.unwrap();
        assert!(store.exists(&a).await.unwrap());
        assert_eq!(store.try_deduct(&a).await.unwrap(), Deduction::NoBalanceRow);

        store.grant_credits(&a, 1).await.unwrap();
        assert!(matches!(
            store.try_deduct(&a).await.unwrap(),
            Deduction::Deducted(_)
        ));
        assert_eq!(store.try_deduct(&a).await.unwrap(), Deduction::Insufficient);
        assert_eq!(
            store.balance(&a).await.unwrap(),
            Some(QuotaBalance {
                available: 0,
                spent: 1
            })
        );

        assert_eq!(
            store.refund_one(&a).await.unwrap(),
            Some(QuotaBalance {
                available: 1,
                spent: 1
            })
        );
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_rocksdb_concurrent_deductions_spend_exactly_the_balance() {
        let dir = tempdir().unwrap();
        let store = RocksDBStore::open(dir.path()).unwrap();
        let a = client('a');
        store.grant_credits(&a, 1).await.unwrap();

        let mut handles = Vec::new();
        for _ in 0..16 {
            let store = store.clone();
            let a = a.clone();
            handles.push(tokio::spawn(async move { store.try_deduct(&a).await }));
        }

        let mut deducted = 0;
        let mut insufficient = 0;
        for handle in handles {
            match handle.await.unwrap() {
                Ok(Deduction::Deducted(_)) => deducted += 1,
                Ok(Deduction::Insufficient) => insufficient += 1,
                other => panic!("unexpected deduction outcome: {other:?}"),
            }
        }

        assert_eq!(deducted, 1);
        assert_eq!(insufficient, 15);
        assert_eq!(
            store.balance(&a).await.unwrap(),
            Some(QuotaBalance {
                available: 0,
                spent: 1
            })
        );
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_rocksdb_concurrent_inserts_register_once() {
        let dir = tempdir().unwrap();
        let store = RocksDBStore::open(dir.path()).unwrap();
        let r = receipt(&client('a'));

        let mut handles = Vec::new();
        for _ in 0..16 {
            let store = store.clone();
            let r = r.clone();
            handles.push(tokio::spawn(async move { store.insert(r).await }));
        }

        let mut inserted = 0;
        let mut duplicates = 0;
        for handle in handles {
            match handle.await.unwrap() {
                Ok(Registration::Inserted(_)) => inserted += 1,
                Ok(Registration::Duplicate) => duplicates += 1,
                Err(e) => panic!("insert failed: {e}"),
            }
        }

        assert_eq!(inserted, 1);
        assert_eq!(duplicates, 15);
    }

    #[tokio::test]
    async fn test_rocksdb_receipts_and_processes() {
        let dir = tempdir().unwrap();
        let store = RocksDBStore::open(dir.path()).unwrap();
        let r = receipt(&client('a'));

        assert!(matches!(
            store.insert(r.clone()).await.unwrap(),
            Registration::Inserted(_)
        ));
        assert_eq!(store.insert(r.clone()).await.unwrap(), Registration::Duplicate);
        assert_eq!(store.get(&r.id).await.unwrap().unwrap().filename, r.filename);

        assert!(store.latest_process(&r.id).await.unwrap().is_none());
        store
            .append_process(NewReceiptProcess::identified(r.id, "bbva", "v2"))
            .await
            .unwrap();
        store
            .append_process(NewReceiptProcess::extracted(r.id, "bbva", "v2", dec!(150.00)))
            .await
            .unwrap();

        let latest = store.latest_process(&r.id).await.unwrap().unwrap();
        assert_eq!(latest.id, 2);
        assert_eq!(latest.amount, Some(dec!(150.00)));
    }

    #[tokio::test]
    async fn test_rocksdb_persistence_recovery() {
        let dir = tempdir().unwrap();
        let a = client('a');
        {
            let store = RocksDBStore::open(dir.path()).unwrap();
            store.grant_credits(&a, 5).await.unwrap();
            store
                .append(NewTransaction {
                    client: a.clone(),
                    receipt_process: None,
                    status: StatusCode::Duplicate,
                })
                .await
                .unwrap();
        }

        let store = RocksDBStore::open(dir.path()).unwrap();
        assert_eq!(store.balance(&a).await.unwrap(), Some(QuotaBalance::new(5)));
        let history = store.for_client(&a).await.unwrap();
        assert_eq!(history.len(), 1);
        assert_eq!(history[0].status, StatusCode::Duplicate);

        // The sequence survives reopening
        let next = store
            .append(NewTransaction {
                client: a.clone(),
                receipt_process: None,
                status: StatusCode::Success,
            })
            .await
            .unwrap();
        assert_eq!(next.id, 2);
    }
}
