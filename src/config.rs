//! Command line and environment configuration.
//!
//! Every setting can be given as a flag or through the environment variable
//! named next to it, which is how deployments usually configure the service.

use crate::infrastructure::subprocess::RecognitionConfig;
use clap::Args;
use std::path::PathBuf;
use std::time::Duration;

/// Where state is kept.
#[derive(Args, Debug, Clone)]
pub struct StorageArgs {
    /// Path to persistent database (optional). If provided, uses RocksDB.
    #[arg(long, env = "RECEIPT_DB_PATH", global = true)]
    pub db_path: Option<PathBuf>,
}

/// Settings needed to process receipts.
#[derive(Args, Debug, Clone)]
pub struct ProcessingArgs {
    /// Directory receipt images are written to
    #[arg(long, env = "UPLOAD_DIR", default_value = "uploads")]
    pub upload_dir: PathBuf,

    /// Executable identifying bank and template version (stage 1)
    #[arg(long, env = "RECOGNIZE_BANK_EXECUTABLE")]
    pub bank_executable: PathBuf,

    /// Executable extracting the amount (stage 2)
    #[arg(long, env = "RECOGNIZE_AMOUNT_EXECUTABLE")]
    pub amount_executable: PathBuf,

    /// Directory the amount stage may write intermediate images to
    #[arg(long, env = "PROCESS_ARTIFACTS_DIR", default_value = "artifacts")]
    pub artifacts_dir: PathBuf,

    /// Directory for the per-stage result files
    #[arg(long, env = "RECOGNITION_RESULTS_DIR", default_value = "results")]
    pub results_dir: PathBuf,

    /// Kill a recognition stage after this many seconds. Waits forever if unset.
    #[arg(long, env = "RECOGNITION_STAGE_TIMEOUT_SECS")]
    pub stage_timeout_secs: Option<u64>,
}

impl ProcessingArgs {
    pub fn recognition(&self) -> RecognitionConfig {
        RecognitionConfig {
            bank_executable: self.bank_executable.clone(),
            amount_executable: self.amount_executable.clone(),
            artifacts_dir: self.artifacts_dir.clone(),
            results_dir: self.results_dir.clone(),
            stage_timeout: self.stage_timeout_secs.map(Duration::from_secs),
        }
    }
}
