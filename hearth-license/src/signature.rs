//! Verification of signed authority payloads.

use crate::canonical::canonical_json;
use crate::error::{LicenseError, LicenseResult};
use crate::keys::PublicKeyHandle;
use base64::{engine::general_purpose::STANDARD, Engine};
use serde_json::{Map, Value};

/// A `{data, signature}` response as returned by the authority's verify call.
#[derive(Debug, Clone)]
pub struct SignedPayload {
    /// Authority-controlled payload, in the member order it was signed.
    pub data: Map<String, Value>,
    /// Raw signature bytes.
    pub signature: Vec<u8>,
}

impl SignedPayload {
    /// Extracts `data` and `signature` from a parsed response body.
    ///
    /// `data` must be a non-empty object and `signature` a base64 string;
    /// whitespace inside the signature is ignored.
    pub fn from_response(body: &Value) -> LicenseResult<Self> {
        let data = match body.get("data") {
            Some(Value::Object(map)) if !map.is_empty() => map.clone(),
            Some(_) => {
                return Err(LicenseError::MalformedResponse(
                    "`data` is not a non-empty object".to_string(),
                ));
            }
            None => return Err(LicenseError::MalformedResponse("missing `data`".to_string())),
        };

        let encoded = body
            .get("signature")
            .and_then(Value::as_str)
            .ok_or_else(|| LicenseError::MalformedResponse("missing `signature`".to_string()))?;

        // Authorities may wrap long base64 lines.
        let compact: String = encoded.chars().filter(|c| !c.is_ascii_whitespace()).collect();
        let signature = STANDARD.decode(compact).map_err(|e| {
            LicenseError::MalformedResponse(format!("signature is not base64: {e}"))
        })?;

        Ok(Self { data, signature })
    }

    /// Verifies the signature over the canonical encoding of `data`.
    pub fn verify(&self, key: &PublicKeyHandle) -> LicenseResult<()> {
        verify_data(key, &self.data, &self.signature)
    }
}

/// Verifies `signature` over the canonical JSON of `data`.
///
/// This is the trust boundary: any failure here means nothing from the
/// response may be persisted.
pub fn verify_data(
    key: &PublicKeyHandle,
    data: &Map<String, Value>,
    signature: &[u8],
) -> LicenseResult<()> {
    let message = canonical_json(&Value::Object(data.clone()))?;
    key.verify(&message, signature)
}
