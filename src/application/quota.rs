use crate::domain::client::{ClientId, Deduction, QuotaBalance};
use crate::domain::ports::ClientStoreRef;
use crate::error::{ReceiptError, Result};
use tracing::{debug, error, warn};

/// Gatekeeper deciding whether a client may spend a request.
#[derive(Clone)]
pub struct QuotaLedger {
    clients: ClientStoreRef,
}

impl QuotaLedger {
    pub fn new(clients: ClientStoreRef) -> Self {
        Self { clients }
    }

    /// Checks the credential shape and that the client is known.
    pub async fn validate_client(&self, raw: &str) -> Result<ClientId> {
        let client = ClientId::parse(raw)?;
        if self.clients.exists(&client).await? {
            Ok(client)
        } else {
            Err(ReceiptError::InvalidCredential)
        }
    }

    /// Spends one credit or explains why it could not.
    ///
    /// A credit spent here stays spent whatever happens to the request
    /// afterwards, except for a duplicate rejection.
    pub async fn check_and_deduct(&self, client: &ClientId) -> Result<QuotaBalance> {
        match self.clients.try_deduct(client).await? {
            Deduction::Deducted(balance) => Ok(balance),
            Deduction::NoBalanceRow => {
                warn!(%client, "client has no credit balance provisioned");
                Err(ReceiptError::NoBalanceRow(client.to_string()))
            }
            Deduction::Insufficient => Err(ReceiptError::InsufficientCredit),
        }
    }

    /// Gives back the credit of a request rejected as a duplicate.
    ///
    /// Best-effort: a failure is logged and the credit stays spent.
    pub async fn refund_duplicate(&self, client: &ClientId) {
        match self.clients.refund_one(client).await {
            Ok(Some(balance)) => {
                debug!(%client, available = balance.available, "refunded duplicate submission")
            }
            Ok(None) => warn!(%client, "no balance to refund duplicate submission to"),
            Err(e) => error!(%client, error = %e, "failed to refund duplicate submission"),
        }
    }
}
