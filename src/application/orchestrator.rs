use crate::application::ledger::TransactionLedger;
use crate::application::quota::QuotaLedger;
use crate::application::recognition::RecognitionPipeline;
use crate::application::registry::ReceiptRegistry;
use crate::domain::client::ClientId;
use crate::domain::ports::{
    ClientStoreRef, ReceiptStoreRef, RecognitionEngineRef, TransactionStoreRef,
};
use crate::domain::transaction::StatusCode;
use crate::error::{ErrorKind, ReceiptError, Result};
use crate::infrastructure::filesystem::ImageStore;
use crate::interfaces::request::{ProcessRequest, ProcessedReceipt, decode_image};
use std::fmt;
use tracing::{debug, error, info, warn};

/// Position of a request in the processing sequence.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProcessingState {
    Validating,
    QuotaChecking,
    Storing,
    Registering,
    RecognizingStage1,
    RecognizingStage2,
    Finalizing,
    Done,
}

impl fmt::Display for ProcessingState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Validating => "validating",
            Self::QuotaChecking => "quota_checking",
            Self::Storing => "storing",
            Self::Registering => "registering",
            Self::RecognizingStage1 => "recognizing_stage1",
            Self::RecognizingStage2 => "recognizing_stage2",
            Self::Finalizing => "finalizing",
            Self::Done => "done",
        };
        f.write_str(name)
    }
}

/// A failed request together with the state it was aborted in.
#[derive(Debug)]
pub struct Aborted {
    pub state: ProcessingState,
    pub error: ReceiptError,
}

/// The main entry point for receipt processing.
///
/// `ReceiptProcessor` owns the storage ports and the recognition engine and
/// sequences quota, storage, deduplication, recognition and auditing for one
/// request at a time. It holds no per-request state, so a single instance
/// can be shared across concurrent requests.
#[derive(Clone)]
pub struct ReceiptProcessor {
    quota: QuotaLedger,
    registry: ReceiptRegistry,
    recognition: RecognitionPipeline,
    ledger: TransactionLedger,
}

impl ReceiptProcessor {
    /// Creates a new `ReceiptProcessor` instance.
    ///
    /// # Arguments
    ///
    /// * `clients` - Credentials and credit balances.
    /// * `receipts` - Receipts and recognition results.
    /// * `transactions` - The audit trail.
    /// * `images` - Blob store for the uploaded images.
    /// * `engine` - The external recognition engine.
    pub fn new(
        clients: ClientStoreRef,
        receipts: ReceiptStoreRef,
        transactions: TransactionStoreRef,
        images: ImageStore,
        engine: RecognitionEngineRef,
    ) -> Self {
        Self {
            quota: QuotaLedger::new(clients),
            registry: ReceiptRegistry::new(receipts.clone(), images),
            recognition: RecognitionPipeline::new(engine, receipts),
            ledger: TransactionLedger::new(transactions),
        }
    }

    /// Processes one submitted receipt image.
    ///
    /// Returns the extracted amount and stored filename, or the error the
    /// caller should be shown via [`ReceiptError::client_message`].
    pub async fn process(&self, request: ProcessRequest) -> Result<ProcessedReceipt> {
        self.run(request).await.map_err(|aborted| aborted.error)
    }

    /// Like [`process`](Self::process) but also reports where the request
    /// stopped.
    #[tracing::instrument(name = "process_receipt", skip_all, fields(client = %request.client_id))]
    pub async fn run(
        &self,
        request: ProcessRequest,
    ) -> std::result::Result<ProcessedReceipt, Aborted> {
        let result = self.pipeline(&request).await;
        match &result {
            Ok(done) => info!(file = %done.file, amount = %done.amount, "receipt processed"),
            Err(aborted) => match aborted.error.kind() {
                ErrorKind::Infrastructure => error!(
                    state = %aborted.state,
                    error = %aborted.error,
                    "receipt processing failed"
                ),
                _ => warn!(state = %aborted.state, error = %aborted.error, "receipt rejected"),
            },
        }
        result
    }

    async fn pipeline(
        &self,
        request: &ProcessRequest,
    ) -> std::result::Result<ProcessedReceipt, Aborted> {
        let mut state = ProcessingState::Validating;
        let abort = |state: ProcessingState| move |error: ReceiptError| Aborted { state, error };

        debug!(%state, "entering state");
        let client = self
            .quota
            .validate_client(&request.client_id)
            .await
            .map_err(abort(state))?;
        let image = decode_image(&request.image_base64).map_err(abort(state))?;

        state = ProcessingState::QuotaChecking;
        debug!(%state, "entering state");
        if let Err(error) = self.quota.check_and_deduct(&client).await {
            if matches!(
                error,
                ReceiptError::InsufficientCredit | ReceiptError::NoBalanceRow(_)
            ) {
                self.ledger
                    .record_attempt(&client, None, StatusCode::QuotaRejected)
                    .await;
            }
            return Err(abort(state)(error));
        }

        // From here on the credit is spent; only a duplicate gets it back
        match self.paid(&client, &image, &mut state).await {
            Ok((done, process_id)) => {
                self.ledger
                    .record_attempt(&client, Some(process_id), StatusCode::Success)
                    .await;
                debug!(state = %ProcessingState::Done, "entering state");
                Ok(done)
            }
            Err(error) => {
                let status = match error {
                    ReceiptError::AlreadyProcessed => {
                        self.quota.refund_duplicate(&client).await;
                        StatusCode::Duplicate
                    }
                    _ => StatusCode::Failed,
                };
                self.ledger.record_attempt(&client, None, status).await;
                Err(abort(state)(error))
            }
        }
    }

    /// The steps that run after a credit was deducted.
    ///
    /// `state` tracks progress so the caller can report where a failure
    /// happened.
    async fn paid(
        &self,
        client: &ClientId,
        image: &[u8],
        state: &mut ProcessingState,
    ) -> Result<(ProcessedReceipt, u64)> {
        *state = ProcessingState::Storing;
        debug!(state = %state, "entering state");
        let stored = self.registry.store_image(client, image).await?;

        *state = ProcessingState::Registering;
        debug!(state = %state, "entering state");
        let draft = self.registry.compute_identity(client, &stored).await?;
        let receipt = self.registry.register_receipt(draft).await?;

        *state = ProcessingState::RecognizingStage1;
        debug!(state = %state, "entering state");
        let identified = self.recognition.identify(&receipt).await?;

        *state = ProcessingState::RecognizingStage2;
        debug!(state = %state, "entering state");
        let extraction = self.recognition.extract(&receipt, &identified).await?;

        *state = ProcessingState::Finalizing;
        debug!(state = %state, "entering state");
        Ok((
            ProcessedReceipt {
                amount: extraction.amount,
                file: receipt.filename,
            },
            extraction.process_id,
        ))
    }
}
