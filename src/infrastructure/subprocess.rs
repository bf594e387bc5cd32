//! Recognition engine backed by two external executables.
//!
//! Each stage receives a per-receipt result path instead of database
//! credentials. The child appends one JSON object per line to that file;
//! after a zero exit every line is appended to the receipt store as a
//! process row. Stdout is ignored and stderr is only logged.

use crate::domain::ports::{ExtractJob, IdentifyJob, ReceiptStoreRef, RecognitionEngine};
use crate::domain::process::{NewReceiptProcess, RecognitionStage};
use crate::domain::receipt::ReceiptId;
use crate::error::{ReceiptError, Result};
use async_trait::async_trait;
use rust_decimal::Decimal;
use serde::Deserialize;
use std::ffi::OsString;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;
use tokio::process::Command;
use tokio::time::timeout;
use tracing::{debug, info, warn};

/// Locations and limits for the recognition executables.
#[derive(Debug, Clone)]
pub struct RecognitionConfig {
    pub bank_executable: PathBuf,
    pub amount_executable: PathBuf,
    /// Scratch directory the amount stage may write debug artifacts to.
    pub artifacts_dir: PathBuf,
    /// Directory holding the per-stage result files.
    pub results_dir: PathBuf,
    /// `None` waits for the child indefinitely.
    pub stage_timeout: Option<Duration>,
}

/// One line of a stage result file.
#[derive(Debug, Deserialize)]
struct StageOutput {
    #[serde(default)]
    bank: Option<String>,
    #[serde(default)]
    version: Option<String>,
    #[serde(default)]
    amount: Option<Decimal>,
}

pub struct SubprocessEngine {
    config: RecognitionConfig,
    receipts: ReceiptStoreRef,
}

impl SubprocessEngine {
    pub fn new(config: RecognitionConfig, receipts: ReceiptStoreRef) -> Self {
        Self { config, receipts }
    }

    fn result_path(&self, receipt: &ReceiptId, stage: RecognitionStage) -> PathBuf {
        self.config
            .results_dir
            .join(format!("{receipt}-{stage}.jsonl"))
    }

    async fn prepare_result_path(&self, path: &Path, stage: RecognitionStage) -> Result<()> {
        tokio::fs::create_dir_all(&self.config.results_dir)
            .await
            .map_err(|e| ReceiptError::stage(stage, format!("cannot create results dir: {e}")))?;
        // A leftover file from an earlier crashed run must not be ingested
        match tokio::fs::remove_file(path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(ReceiptError::stage(
                stage,
                format!("cannot clear stale result file: {e}"),
            )),
        }
    }

    async fn run(
        &self,
        stage: RecognitionStage,
        executable: &Path,
        args: Vec<OsString>,
    ) -> Result<()> {
        info!(%stage, executable = %executable.display(), "running recognition stage");

        let mut cmd = Command::new(executable);
        cmd.args(&args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        let child = cmd
            .spawn()
            .map_err(|e| ReceiptError::stage(stage, format!("failed to spawn: {e}")))?;

        let output = match self.config.stage_timeout {
            Some(limit) => match timeout(limit, child.wait_with_output()).await {
                Ok(result) => result,
                Err(_) => {
                    warn!(%stage, "recognition stage timed out");
                    return Err(ReceiptError::stage(
                        stage,
                        format!("timed out after {}s", limit.as_secs_f64()),
                    ));
                }
            },
            None => child.wait_with_output().await,
        }
        .map_err(|e| ReceiptError::stage(stage, format!("failed to wait: {e}")))?;

        let stdout = String::from_utf8_lossy(&output.stdout);
        let stderr = String::from_utf8_lossy(&output.stderr);
        if !stdout.trim().is_empty() {
            debug!(%stage, stdout = %stdout.trim(), "recognition stage stdout");
        }
        if !stderr.trim().is_empty() {
            warn!(%stage, stderr = %stderr.trim(), "recognition stage wrote to stderr");
        }

        if output.status.success() {
            Ok(())
        } else {
            let code = output.status.code().unwrap_or(-1);
            Err(ReceiptError::stage(stage, format!("exited with code {code}")))
        }
    }

    /// Appends every line of the result file as a process row.
    ///
    /// Returns how many rows were appended; a missing file appends none.
    /// The whole file is parsed before anything is appended, so a malformed
    /// line appends nothing. The file is removed either way.
    async fn ingest(
        &self,
        path: &Path,
        stage: RecognitionStage,
        receipt: ReceiptId,
        defaults: Option<(&str, &str)>,
    ) -> Result<usize> {
        let contents = match tokio::fs::read_to_string(path).await {
            Ok(contents) => contents,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                warn!(%stage, %receipt, "recognition stage left no result file");
                return Ok(0);
            }
            Err(e) => {
                return Err(ReceiptError::stage(
                    stage,
                    format!("cannot read result file: {e}"),
                ));
            }
        };

        let parsed: serde_json::Result<Vec<StageOutput>> = contents
            .lines()
            .filter(|line| !line.trim().is_empty())
            .map(serde_json::from_str::<StageOutput>)
            .collect();
        if let Err(e) = tokio::fs::remove_file(path).await {
            warn!(%stage, error = %e, "failed to remove result file");
        }
        let outputs = parsed
            .map_err(|e| ReceiptError::stage(stage, format!("malformed result line: {e}")))?;

        let mut appended = 0;
        for output in outputs {
            let row = NewReceiptProcess {
                receipt,
                bank: output
                    .bank
                    .or_else(|| defaults.map(|(bank, _)| bank.to_string())),
                version: output
                    .version
                    .or_else(|| defaults.map(|(_, version)| version.to_string())),
                amount: output.amount,
            };
            self.receipts.append_process(row).await?;
            appended += 1;
        }
        Ok(appended)
    }
}

#[async_trait]
impl RecognitionEngine for SubprocessEngine {
    async fn identify(&self, job: &IdentifyJob) -> Result<()> {
        let stage = RecognitionStage::Identify;
        let result_path = self.result_path(&job.receipt, stage);
        self.prepare_result_path(&result_path, stage).await?;

        let args = vec![
            job.image_path.clone().into_os_string(),
            job.receipt.to_string().into(),
            result_path.clone().into_os_string(),
        ];
        self.run(stage, &self.config.bank_executable, args).await?;

        let rows = self.ingest(&result_path, stage, job.receipt, None).await?;
        debug!(%stage, rows, "ingested recognition results");
        Ok(())
    }

    async fn extract(&self, job: &ExtractJob) -> Result<()> {
        let stage = RecognitionStage::Extract;
        let result_path = self.result_path(&job.receipt, stage);
        self.prepare_result_path(&result_path, stage).await?;

        let args = vec![
            job.image_path.clone().into_os_string(),
            job.bank.clone().into(),
            job.version.clone().into(),
            job.receipt.to_string().into(),
            result_path.clone().into_os_string(),
            self.config.artifacts_dir.clone().into_os_string(),
        ];
        self.run(stage, &self.config.amount_executable, args).await?;

        let defaults = Some((job.bank.as_str(), job.version.as_str()));
        let rows = self
            .ingest(&result_path, stage, job.receipt, defaults)
            .await?;
        debug!(%stage, rows, "ingested recognition results");
        Ok(())
    }
}
