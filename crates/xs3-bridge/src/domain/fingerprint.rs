//! Hardware fingerprint derived from a reader object id.
//!
//! The reader reports the credential's object id as hex. The backend indexes
//! media by `sha256(oid_bytes ++ 0x00)`.

use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use serde::Serialize;
use sha2::{Digest, Sha256};

/// Object id the reader reports when it cannot read the credential
pub const MALFUNCTION_OBJECT_ID: &str = "AFFE";

/// One-byte suffix (hex) appended to the object id before hashing
pub const OBJECT_ID_SUFFIX: &str = "00";

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum FingerprintError {
    #[error("object id is empty")]
    Empty,
    #[error("object id is not valid hex: {0}")]
    InvalidHex(#[from] hex::FromHexError),
}

/// SHA-256 digest of the suffixed object id, in both encodings the backend uses
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Fingerprint {
    pub hex: String,
    pub base64: String,
}

impl Fingerprint {
    /// Derive the fingerprint for a reader object id
    pub fn derive(object_id: &str) -> Result<Self, FingerprintError> {
        if object_id.is_empty() {
            return Err(FingerprintError::Empty);
        }
        let bytes = hex::decode(format!("{object_id}{OBJECT_ID_SUFFIX}"))?;
        let digest = Sha256::digest(&bytes);
        Ok(Self {
            hex: hex::encode(digest),
            base64: STANDARD.encode(digest),
        })
    }
}
