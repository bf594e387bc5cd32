use crate::error::{ReceiptError, Result};
use base64::Engine;
use base64::alphabet;
use base64::engine::{DecodePaddingMode, GeneralPurpose, GeneralPurposeConfig};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Standard alphabet, padding optional.
const LENIENT_BASE64: GeneralPurpose = GeneralPurpose::new(
    &alphabet::STANDARD,
    GeneralPurposeConfig::new().with_decode_padding_mode(DecodePaddingMode::Indifferent),
);

/// Marker ending a data URL header such as `data:image/jpeg;base64,`.
const DATA_URL_MARKER: &str = "base64,";

/// An image submitted for amount extraction.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct ProcessRequest {
    #[serde(rename = "idclient")]
    pub client_id: String,
    /// Plain base64 or a full data URL.
    #[serde(rename = "imageBase64")]
    pub image_base64: String,
}

/// Successful response.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProcessedReceipt {
    pub amount: Decimal,
    pub file: String,
}

/// Failure response carrying only what the caller may see.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
}

impl From<&ReceiptError> for ErrorResponse {
    fn from(err: &ReceiptError) -> Self {
        Self {
            error: err.client_message(),
        }
    }
}

/// Strips an optional data URL header and decodes the base64 payload.
pub fn decode_image(payload: &str) -> Result<Vec<u8>> {
    let encoded = match payload.split_once(DATA_URL_MARKER) {
        Some((_, rest)) => rest,
        None => payload,
    };
    let compact: String = encoded
        .chars()
        .filter(|c| !c.is_ascii_whitespace())
        .collect();

    let bytes = LENIENT_BASE64
        .decode(compact.as_bytes())
        .map_err(|e| ReceiptError::InvalidImageEncoding(e.to_string()))?;
    if bytes.is_empty() {
        return Err(ReceiptError::InvalidImageEncoding("empty image".to_string()));
    }
    Ok(bytes)
}
