use crate::domain::client::ClientId;
use crate::domain::receipt::RECEIPT_EXTENSION;
use crate::error::{ReceiptError, Result};
use chrono::{DateTime, TimeDelta, Utc};
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tokio::fs::OpenOptions;
use tokio::io::AsyncWriteExt;
use tracing::debug;

/// How many later seconds `put` tries before giving up on a free name.
const MAX_NAME_ATTEMPTS: i64 = 120;

/// Where an uploaded image ended up.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredImage {
    pub path: PathBuf,
    pub filename: String,
}

/// Blob store for raw receipt images under a single upload root.
#[derive(Debug, Clone)]
pub struct ImageStore {
    root: PathBuf,
}

impl ImageStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// `<client>_<YYYYMMDDHHMMSS>.jpg`, UTC at second resolution.
    pub fn filename_for(client: &ClientId, at: DateTime<Utc>) -> String {
        format!(
            "{}_{}.{}",
            client,
            at.format("%Y%m%d%H%M%S"),
            RECEIPT_EXTENSION
        )
    }

    /// Writes the image bytes and returns their location.
    ///
    /// Existing files are never replaced. When the name for the current second
    /// is taken, the timestamp is moved forward one second at a time until a
    /// free name is found.
    pub async fn put(&self, client: &ClientId, bytes: &[u8]) -> Result<StoredImage> {
        tokio::fs::create_dir_all(&self.root)
            .await
            .map_err(ReceiptError::StorageWrite)?;

        let now = Utc::now();
        for offset in 0..MAX_NAME_ATTEMPTS {
            let filename = Self::filename_for(client, now + TimeDelta::seconds(offset));
            let path = self.root.join(&filename);

            let mut file = match OpenOptions::new()
                .write(true)
                .create_new(true)
                .open(&path)
                .await
            {
                Ok(file) => file,
                Err(e) if e.kind() == ErrorKind::AlreadyExists => continue,
                Err(e) => return Err(ReceiptError::StorageWrite(e)),
            };
            file.write_all(bytes).await.map_err(ReceiptError::StorageWrite)?;
            file.sync_all().await.map_err(ReceiptError::StorageWrite)?;

            debug!(path = %path.display(), size = bytes.len(), "stored receipt image");
            return Ok(StoredImage { path, filename });
        }

        Err(ReceiptError::StorageWrite(std::io::Error::new(
            ErrorKind::AlreadyExists,
            format!("no free file name for client {client} near {now}"),
        )))
    }

    /// Reads back a stored image.
    pub async fn read(&self, image: &StoredImage) -> Result<Vec<u8>> {
        tokio::fs::read(&image.path)
            .await
            .map_err(|e| ReceiptError::DimensionProbe(format!("cannot read stored image: {e}")))
    }
}
