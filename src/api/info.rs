use serde::{Deserialize, Serialize};

/// Request body for `/api/v1/cfssl/info`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct InfoRequest {
    #[serde(default)]
    pub label: String,

    pub profile: String,
}

/// Signer information returned by `/api/v1/cfssl/info`.
///
/// # Example JSON
///
/// ```json
/// {
///   "certificate": "-----BEGIN CERTIFICATE-----\n...",
///   "usages": ["signing", "key encipherment", "server auth"],
///   "expiry": "8760h"
/// }
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct InfoResult {
    /// PEM encoded certificate of the signing CA.
    pub certificate: String,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub usages: Vec<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expiry: Option<String>,
}
