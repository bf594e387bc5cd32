use crate::domain::ports::{ExtractJob, IdentifyJob, ReceiptStoreRef, RecognitionEngineRef};
use crate::domain::process::{BankVersion, Extraction, RecognitionStage};
use crate::domain::receipt::Receipt;
use crate::error::{ReceiptError, Result};
use tracing::info;

/// Drives the two recognition stages and reads their results back from the
/// receipt store.
#[derive(Clone)]
pub struct RecognitionPipeline {
    engine: RecognitionEngineRef,
    receipts: ReceiptStoreRef,
}

impl RecognitionPipeline {
    pub fn new(engine: RecognitionEngineRef, receipts: ReceiptStoreRef) -> Self {
        Self { engine, receipts }
    }

    /// Stage 1. The newest process row must carry both bank and version.
    pub async fn identify(&self, receipt: &Receipt) -> Result<BankVersion> {
        let stage = RecognitionStage::Identify;
        self.engine
            .identify(&IdentifyJob {
                image_path: receipt.path.clone(),
                receipt: receipt.id,
            })
            .await?;

        let row = self
            .receipts
            .latest_process(&receipt.id)
            .await?
            .ok_or_else(|| ReceiptError::stage(stage, "no process row after identification"))?;

        match (row.bank, row.version) {
            (Some(bank), Some(version)) => {
                info!(receipt = %receipt.id, %bank, %version, "identified receipt template");
                Ok(BankVersion { bank, version })
            }
            _ => Err(ReceiptError::stage(
                stage,
                format!("process row {} lacks bank or version", row.id),
            )),
        }
    }

    /// Stage 2. The newest process row must carry an amount.
    pub async fn extract(&self, receipt: &Receipt, identified: &BankVersion) -> Result<Extraction> {
        let stage = RecognitionStage::Extract;
        self.engine
            .extract(&ExtractJob {
                image_path: receipt.path.clone(),
                receipt: receipt.id,
                bank: identified.bank.clone(),
                version: identified.version.clone(),
            })
            .await?;

        let row = self
            .receipts
            .latest_process(&receipt.id)
            .await?
            .ok_or_else(|| ReceiptError::stage(stage, "no process row after extraction"))?;
        let amount = row.amount.ok_or_else(|| {
            ReceiptError::stage(stage, format!("latest process row {} has no amount", row.id))
        })?;

        info!(receipt = %receipt.id, %amount, "extracted receipt amount");
        Ok(Extraction {
            process_id: row.id,
            amount,
        })
    }
}
