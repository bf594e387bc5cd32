#![allow(dead_code)]

use async_trait::async_trait;
use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use image::{ImageFormat, Rgb, RgbImage};
use receipt_amount::application::orchestrator::ReceiptProcessor;
use receipt_amount::domain::client::ClientId;
use receipt_amount::domain::ports::{
    ClientStore, ExtractJob, IdentifyJob, ReceiptStore, ReceiptStoreRef, RecognitionEngine,
};
use receipt_amount::domain::process::{NewReceiptProcess, RecognitionStage};
use receipt_amount::error::{ReceiptError, Result};
use receipt_amount::infrastructure::filesystem::ImageStore;
use receipt_amount::infrastructure::in_memory::{
    InMemoryClientStore, InMemoryReceiptStore, InMemoryTransactionStore,
};
use receipt_amount::interfaces::request::ProcessRequest;
use rust_decimal::Decimal;
use std::io::Cursor;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use tempfile::TempDir;

pub const BANK: &str = "bbva";
pub const VERSION: &str = "v2";

/// What a scripted recognition stage does when invoked.
#[derive(Debug, Clone)]
pub enum StageScript {
    /// Appends its rows and exits cleanly.
    Persist,
    /// Exits cleanly without writing anything.
    Silent,
    /// Behaves like a non-zero exit.
    Fail,
}

/// In-process recognition engine writing rows the way the executables do.
pub struct ScriptedEngine {
    receipts: ReceiptStoreRef,
    identify: StageScript,
    extract: StageScript,
    /// Amounts appended by the extraction stage, oldest first.
    amounts: Vec<Decimal>,
    pub calls: AtomicUsize,
}

impl ScriptedEngine {
    pub fn new(receipts: ReceiptStoreRef, amounts: Vec<Decimal>) -> Self {
        Self {
            receipts,
            identify: StageScript::Persist,
            extract: StageScript::Persist,
            amounts,
            calls: AtomicUsize::new(0),
        }
    }

    pub fn with_identify(mut self, script: StageScript) -> Self {
        self.identify = script;
        self
    }

    pub fn with_extract(mut self, script: StageScript) -> Self {
        self.extract = script;
        self
    }
}

#[async_trait]
impl RecognitionEngine for ScriptedEngine {
    async fn identify(&self, job: &IdentifyJob) -> Result<()> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        match self.identify {
            StageScript::Persist => {
                self.receipts
                    .append_process(NewReceiptProcess::identified(job.receipt, BANK, VERSION))
                    .await?;
                Ok(())
            }
            StageScript::Silent => Ok(()),
            StageScript::Fail => Err(ReceiptError::RecognitionStageFailed {
                stage: RecognitionStage::Identify,
                reason: "exit status 1".to_string(),
            }),
        }
    }

    async fn extract(&self, job: &ExtractJob) -> Result<()> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        match self.extract {
            StageScript::Persist => {
                for amount in &self.amounts {
                    self.receipts
                        .append_process(NewReceiptProcess::extracted(
                            job.receipt,
                            &job.bank,
                            &job.version,
                            *amount,
                        ))
                        .await?;
                }
                Ok(())
            }
            StageScript::Silent => Ok(()),
            StageScript::Fail => Err(ReceiptError::RecognitionStageFailed {
                stage: RecognitionStage::Extract,
                reason: "exit status 2".to_string(),
            }),
        }
    }
}

/// A processor wired to in-memory stores and a temporary upload root.
pub struct Harness {
    pub processor: ReceiptProcessor,
    pub clients: Arc<InMemoryClientStore>,
    pub receipts: Arc<InMemoryReceiptStore>,
    pub transactions: Arc<InMemoryTransactionStore>,
    pub engine: Arc<ScriptedEngine>,
    pub upload_dir: TempDir,
}

impl Harness {
    pub fn new(
        configure: impl FnOnce(ScriptedEngine) -> ScriptedEngine,
        amounts: Vec<Decimal>,
    ) -> Self {
        let clients = Arc::new(InMemoryClientStore::new());
        let receipts = Arc::new(InMemoryReceiptStore::new());
        let transactions = Arc::new(InMemoryTransactionStore::new());
        let engine = Arc::new(configure(ScriptedEngine::new(receipts.clone(), amounts)));
        let upload_dir = tempfile::tempdir().unwrap();

        let processor = ReceiptProcessor::new(
            clients.clone(),
            receipts.clone(),
            transactions.clone(),
            ImageStore::new(upload_dir.path().join("uploads")),
            engine.clone(),
        );

        Self {
            processor,
            clients,
            receipts,
            transactions,
            engine,
            upload_dir,
        }
    }

    /// Both stages succeed and the amount stage reports `amount`.
    pub fn succeeding(amount: Decimal) -> Self {
        Self::new(|engine| engine, vec![amount])
    }

    /// Registers a fresh client, granting `credits` when given.
    pub async fn client(&self, credits: Option<u64>) -> ClientId {
        let client = ClientId::parse(&uuid::Uuid::new_v4().to_string()).unwrap();
        self.clients.register(&client).await.unwrap();
        if let Some(credits) = credits {
            self.clients.grant_credits(&client, credits).await.unwrap();
        }
        client
    }

    pub async fn available(&self, client: &ClientId) -> u64 {
        self.clients
            .balance(client)
            .await
            .unwrap()
            .map(|balance| balance.available)
            .unwrap_or_default()
    }

    pub fn stored_files(&self) -> usize {
        match std::fs::read_dir(self.upload_dir.path().join("uploads")) {
            Ok(entries) => entries.count(),
            Err(_) => 0,
        }
    }
}

/// A PNG of the given size; `seed` varies the pixels so images of equal
/// dimensions usually differ in bytes.
pub fn png(width: u32, height: u32, seed: u8) -> Vec<u8> {
    let image = RgbImage::from_fn(width, height, |x, y| {
        Rgb([seed, (x % 251) as u8 ^ seed, (y % 241) as u8])
    });
    let mut out = Cursor::new(Vec::new());
    image.write_to(&mut out, ImageFormat::Png).unwrap();
    out.into_inner()
}

pub fn request(client: &ClientId, image: &[u8]) -> ProcessRequest {
    ProcessRequest {
        client_id: client.to_string(),
        image_base64: STANDARD.encode(image),
    }
}
