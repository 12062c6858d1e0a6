//! Smartphone (mobile-service) types.

use crate::domain::error::{BridgeError, BridgeResult};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use sha2::{Digest, Sha256};
use uuid::Uuid;

/// Who provisions smartphone credentials
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum MobileServiceMode {
    Xms,
    SelfService,
}

impl MobileServiceMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Xms => "XMS",
            Self::SelfService => "SELF_SERVICE",
        }
    }
}

impl std::str::FromStr for MobileServiceMode {
    type Err = BridgeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "XMS" => Ok(Self::Xms),
            "SELF_SERVICE" => Ok(Self::SelfService),
            _ => Err(BridgeError::validation(
                "mobileServiceMode must be one of: XMS, SELF_SERVICE",
            )),
        }
    }
}

/// Confirmation of a smartphone update or revoke the backend has pending
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MssConfirmRequest {
    pub medium_id: String,
    pub transaction_id: String,
}

impl MssConfirmRequest {
    pub fn new(medium_id: impl Into<String>, transaction_id: impl Into<String>) -> Self {
        Self {
            medium_id: medium_id.into(),
            transaction_id: transaction_id.into(),
        }
    }

    /// Both ids must be UUID v4
    pub fn validate(&self) -> BridgeResult<()> {
        if !is_uuid_v4(&self.medium_id) {
            return Err(BridgeError::validation("mediumId must be a UUID v4"));
        }
        if !is_uuid_v4(&self.transaction_id) {
            return Err(BridgeError::validation("transactionId must be a UUID v4"));
        }
        Ok(())
    }
}

fn is_uuid_v4(s: &str) -> bool {
    Uuid::parse_str(s).is_ok_and(|uuid| uuid.get_version_num() == 4)
}

/// Parameters a smartphone app needs to disengage a lock offline
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DisengageParams {
    /// sha256 hex of the medium's `xsMobileId`
    pub mobile_id: String,
    pub mobile_device_key: Value,
    pub mobile_group_id: Value,
    pub medium_access_data: Value,
    pub meta: Value,
}

const META_FIELDS: [&str; 8] = [
    "id",
    "mediumType",
    "state",
    "transactionId",
    "validFrom",
    "validUntil",
    "xsId",
    "version",
];

impl DisengageParams {
    /// Build from an `identification-media-access-data` row
    pub fn from_access_row(row: &Value) -> Self {
        let field = |key: &str| row.get(key).cloned().unwrap_or(Value::Null);
        let xs_mobile_id = row.get("xsMobileId").and_then(Value::as_str).unwrap_or("");
        let meta: Map<String, Value> = META_FIELDS
            .iter()
            .map(|&key| (key.to_string(), field(key)))
            .collect();

        Self {
            mobile_id: hex::encode(Sha256::digest(xs_mobile_id.as_bytes())),
            mobile_device_key: field("xsMOBDK"),
            mobile_group_id: field("xsMOBGID"),
            medium_access_data: field("mediumDataFrame"),
            meta: Value::Object(meta),
        }
    }
}
