use crate::domain::client::ClientId;
use crate::domain::ports::TransactionStoreRef;
use crate::domain::transaction::{NewTransaction, StatusCode, TransactionRecord};
use tracing::{debug, error};

/// Best-effort audit trail of processing attempts.
#[derive(Clone)]
pub struct TransactionLedger {
    transactions: TransactionStoreRef,
}

impl TransactionLedger {
    pub fn new(transactions: TransactionStoreRef) -> Self {
        Self { transactions }
    }

    /// Appends one attempt record.
    ///
    /// Never fails: a store error is logged and `None` is returned so the
    /// request outcome is unaffected.
    pub async fn record_attempt(
        &self,
        client: &ClientId,
        receipt_process: Option<u64>,
        status: StatusCode,
    ) -> Option<TransactionRecord> {
        let tx = NewTransaction {
            client: client.clone(),
            receipt_process,
            status,
        };
        match self.transactions.append(tx).await {
            Ok(record) => {
                debug!(%client, status = status.code(), id = record.id, "recorded transaction");
                Some(record)
            }
            Err(e) => {
                error!(%client, status = status.code(), error = %e, "failed to record transaction");
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::ports::TransactionStore;
    use crate::error::{ReceiptError, Result};
    use crate::infrastructure::in_memory::InMemoryTransactionStore;
    use async_trait::async_trait;
    use std::sync::Arc;

    struct BrokenStore;

    #[async_trait]
    impl TransactionStore for BrokenStore {
        async fn append(&self, _tx: NewTransaction) -> Result<TransactionRecord> {
            Err(ReceiptError::Store("disk full".to_string()))
        }

        async fn for_client(&self, _client: &ClientId) -> Result<Vec<TransactionRecord>> {
            Ok(Vec::new())
        }
    }

    #[tokio::test]
    async fn test_record_attempt_swallows_store_errors() {
        let ledger = TransactionLedger::new(Arc::new(BrokenStore));
        let client = ClientId::parse(&"a".repeat(36)).unwrap();

        let record = ledger.record_attempt(&client, None, StatusCode::Failed).await;
        assert!(record.is_none());
    }

    #[tokio::test]
    async fn test_record_attempt_appends() {
        let store = Arc::new(InMemoryTransactionStore::new());
        let ledger = TransactionLedger::new(store.clone());
        let client = ClientId::parse(&"a".repeat(36)).unwrap();

        let record = ledger
            .record_attempt(&client, Some(3), StatusCode::Success)
            .await
            .unwrap();
        assert_eq!(record.receipt_process, Some(3));
        assert_eq!(store.for_client(&client).await.unwrap(), vec![record]);
    }
}
