use crate::domain::client::ClientId;
use crate::error::{ReceiptError, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt;
use std::io::Cursor;
use std::path::PathBuf;
use uuid::Uuid;

/// Extension every stored receipt image is saved under.
pub const RECEIPT_EXTENSION: &str = "jpg";

/// Deduplication key of a receipt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ReceiptId(Uuid);

impl ReceiptId {
    pub fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl From<Uuid> for ReceiptId {
    fn from(value: Uuid) -> Self {
        Self(value)
    }
}

impl fmt::Display for ReceiptId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// Pixel dimensions of a raster image.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImageDimensions {
    pub width: u32,
    pub height: u32,
}

impl ImageDimensions {
    /// Sniffs the image format and reads the header dimensions.
    pub fn probe(bytes: &[u8]) -> Result<Self> {
        let reader = image::ImageReader::new(Cursor::new(bytes))
            .with_guessed_format()
            .map_err(|e| ReceiptError::DimensionProbe(e.to_string()))?;
        let (width, height) = reader
            .into_dimensions()
            .map_err(|e| ReceiptError::DimensionProbe(e.to_string()))?;
        Ok(Self { width, height })
    }
}

/// Derives the receipt identity from the client and the physical properties
/// of the image.
///
/// Two different images of the same client that share byte size and
/// dimensions map to the same identity.
pub fn receipt_identity(client: &ClientId, byte_size: u64, dims: ImageDimensions) -> ReceiptId {
    let key = format!("{}-{}-{}-{}", client, byte_size, dims.width, dims.height);
    let digest = Sha256::digest(key.as_bytes());
    let mut bytes = [0u8; 16];
    bytes.copy_from_slice(&digest[..16]);
    ReceiptId(Uuid::from_bytes(bytes))
}

/// A receipt measured and identified but not yet registered.
#[derive(Debug, Clone, PartialEq)]
pub struct ReceiptDraft {
    pub id: ReceiptId,
    pub client: ClientId,
    pub filename: String,
    pub path: PathBuf,
    pub size: u64,
    pub dimensions: ImageDimensions,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Receipt {
    pub id: ReceiptId,
    pub client: ClientId,
    pub filename: String,
    pub extension: String,
    pub path: PathBuf,
    pub size: u64,
    pub width: u32,
    pub height: u32,
    pub created_at: DateTime<Utc>,
}

impl From<ReceiptDraft> for Receipt {
    fn from(draft: ReceiptDraft) -> Self {
        Self {
            id: draft.id,
            client: draft.client,
            filename: draft.filename,
            extension: RECEIPT_EXTENSION.to_string(),
            path: draft.path,
            size: draft.size,
            width: draft.dimensions.width,
            height: draft.dimensions.height,
            created_at: Utc::now(),
        }
    }
}

/// Result of an insert-if-absent on the receipt identity.
#[derive(Debug, Clone, PartialEq)]
pub enum Registration {
    Inserted(Receipt),
    Duplicate,
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{ImageFormat, RgbImage};

    fn client(c: char) -> ClientId {
        ClientId::parse(&c.to_string().repeat(36)).unwrap()
    }

    fn png(width: u32, height: u32) -> Vec<u8> {
        let mut out = Cursor::new(Vec::new());
        RgbImage::new(width, height)
            .write_to(&mut out, ImageFormat::Png)
            .unwrap();
        out.into_inner()
    }

    #[test]
    fn test_identity_is_deterministic() {
        let dims = ImageDimensions {
            width: 400,
            height: 800,
        };
        assert_eq!(
            receipt_identity(&client('a'), 12345, dims),
            receipt_identity(&client('a'), 12345, dims)
        );
    }

    #[test]
    fn test_identity_includes_every_component() {
        let dims = ImageDimensions {
            width: 400,
            height: 800,
        };
        let base = receipt_identity(&client('a'), 12345, dims);
        assert_ne!(base, receipt_identity(&client('b'), 12345, dims));
        assert_ne!(base, receipt_identity(&client('a'), 12346, dims));
        assert_ne!(
            base,
            receipt_identity(
                &client('a'),
                12345,
                ImageDimensions {
                    width: 800,
                    height: 400
                }
            )
        );
    }

    #[test]
    fn test_probe_png_dimensions() {
        let dims = ImageDimensions::probe(&png(40, 80)).unwrap();
        assert_eq!(
            dims,
            ImageDimensions {
                width: 40,
                height: 80
            }
        );
    }

    #[test]
    fn test_probe_rejects_non_images() {
        assert!(matches!(
            ImageDimensions::probe(b"definitely not a raster image"),
            Err(ReceiptError::DimensionProbe(_))
        ));
    }
}
