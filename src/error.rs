use crate::domain::process::RecognitionStage;
use thiserror::Error;

/// Message shown to callers for every infrastructure failure.
pub const SUPPORT_MESSAGE: &str = "server error, contact support";

#[derive(Error, Debug)]
pub enum ReceiptError {
    #[error("invalid credential")]
    InvalidCredential,
    #[error("invalid base64 image: {0}")]
    InvalidImageEncoding(String),
    #[error("no credits available, contact sales to purchase more")]
    InsufficientCredit,
    #[error("client {0} has no credit balance configured")]
    NoBalanceRow(String),
    #[error("the image was already processed")]
    AlreadyProcessed,
    #[error("failed to write receipt image: {0}")]
    StorageWrite(#[source] std::io::Error),
    #[error("failed to read image dimensions: {0}")]
    DimensionProbe(String),
    #[error("recognition stage {stage} failed: {reason}")]
    RecognitionStageFailed {
        stage: RecognitionStage,
        reason: String,
    },
    #[error("store error: {0}")]
    Store(String),
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Coarse classification deciding how much of an error reaches the caller.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Bad credential or payload, surfaced verbatim.
    ClientInput,
    /// No credit or duplicate image, surfaced with a specific message.
    BusinessRule,
    /// Storage, database or recognition failure, surfaced opaquely.
    Infrastructure,
}

impl ReceiptError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::InvalidCredential | Self::InvalidImageEncoding(_) => ErrorKind::ClientInput,
            Self::InsufficientCredit | Self::AlreadyProcessed => ErrorKind::BusinessRule,
            Self::NoBalanceRow(_)
            | Self::StorageWrite(_)
            | Self::DimensionProbe(_)
            | Self::RecognitionStageFailed { .. }
            | Self::Store(_)
            | Self::Serialization(_) => ErrorKind::Infrastructure,
        }
    }

    /// The text a caller is allowed to see.
    ///
    /// Infrastructure details stay in the logs.
    pub fn client_message(&self) -> String {
        match self.kind() {
            ErrorKind::ClientInput => match self {
                // Decoder internals are not useful to the caller.
                Self::InvalidImageEncoding(_) => "invalid base64 image".to_string(),
                other => other.to_string(),
            },
            ErrorKind::BusinessRule => self.to_string(),
            ErrorKind::Infrastructure => SUPPORT_MESSAGE.to_string(),
        }
    }

    pub(crate) fn stage(stage: RecognitionStage, reason: impl Into<String>) -> Self {
        Self::RecognitionStageFailed {
            stage,
            reason: reason.into(),
        }
    }
}

#[cfg(feature = "storage-rocksdb")]
impl From<rocksdb::Error> for ReceiptError {
    fn from(e: rocksdb::Error) -> Self {
        Self::Store(e.into_string())
    }
}

pub type Result<T> = std::result::Result<T, ReceiptError>;
