use crate::domain::client::ClientId;
use crate::domain::ports::ReceiptStoreRef;
use crate::domain::receipt::{
    ImageDimensions, Receipt, ReceiptDraft, Registration, receipt_identity,
};
use crate::error::{ReceiptError, Result};
use crate::infrastructure::filesystem::{ImageStore, StoredImage};
use tracing::{debug, info};

/// Persists receipt images and registers them under their derived identity.
#[derive(Clone)]
pub struct ReceiptRegistry {
    receipts: ReceiptStoreRef,
    images: ImageStore,
}

impl ReceiptRegistry {
    pub fn new(receipts: ReceiptStoreRef, images: ImageStore) -> Self {
        Self { receipts, images }
    }

    pub async fn store_image(&self, client: &ClientId, bytes: &[u8]) -> Result<StoredImage> {
        self.images.put(client, bytes).await
    }

    /// Measures the stored image and derives its identity.
    ///
    /// The bytes are re-read from storage so the identity reflects what was
    /// actually persisted.
    pub async fn compute_identity(
        &self,
        client: &ClientId,
        stored: &StoredImage,
    ) -> Result<ReceiptDraft> {
        let bytes = self.images.read(stored).await?;
        let size = bytes.len() as u64;
        let dimensions = ImageDimensions::probe(&bytes)?;
        let id = receipt_identity(client, size, dimensions);
        debug!(
            %id,
            size,
            width = dimensions.width,
            height = dimensions.height,
            "derived receipt identity"
        );

        Ok(ReceiptDraft {
            id,
            client: client.clone(),
            filename: stored.filename.clone(),
            path: stored.path.clone(),
            size,
            dimensions,
        })
    }

    /// Inserts the receipt, turning an identity conflict into
    /// [`ReceiptError::AlreadyProcessed`].
    pub async fn register_receipt(&self, draft: ReceiptDraft) -> Result<Receipt> {
        match self.receipts.insert(Receipt::from(draft)).await? {
            Registration::Inserted(receipt) => {
                info!(receipt = %receipt.id, file = %receipt.filename, "registered receipt");
                Ok(receipt)
            }
            Registration::Duplicate => Err(ReceiptError::AlreadyProcessed),
        }
    }
}
