use serde::{Deserialize, Serialize};

use crate::util::base64_bytes;

/// Request body for `/api/v1/cfssl/sign`, also the inner request of
/// [`AuthSignRequest`].
///
/// # Example JSON
///
/// ```json
/// {
///   "hosts": ["api.example.com", "www.example.com"],
///   "certificate_request": "-----BEGIN CERTIFICATE REQUEST-----\n...",
///   "profile": "default",
///   "label": ""
/// }
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SignRequest {
    /// Names the CA should put into the SAN extension, overriding those in the CSR.
    pub hosts: Vec<String>,

    /// PEM encoded CSR.
    pub certificate_request: String,

    /// Signing profile to apply.
    pub profile: String,

    /// Selects the signer when the CA serves more than one.
    #[serde(default)]
    pub label: String,
}

/// Request body for `/api/v1/cfssl/authsign`.
///
/// `request` is the serialized [`SignRequest`] and `token` its HMAC-SHA256 under the shared auth
/// key. Both are byte strings, which CFSSL transmits base64 encoded.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthSignRequest {
    #[serde(with = "base64_bytes")]
    pub token: Vec<u8>,

    #[serde(with = "base64_bytes")]
    pub request: Vec<u8>,
}

/// Result of a sign or authsign call.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SignResult {
    /// PEM encoded certificate.
    pub certificate: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn auth_sign_request_is_base64() {
        let req = AuthSignRequest {
            token: vec![0xde, 0xad, 0xbe, 0xef],
            request: br#"{"profile":"default"}"#.to_vec(),
        };

        let json = serde_json::to_string(&req).unwrap();
        assert_eq!(
            json,
            r#"{"token":"3q2+7w==","request":"eyJwcm9maWxlIjoiZGVmYXVsdCJ9"}"#
        );

        let parsed: AuthSignRequest = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, req);
    }

    #[test]
    fn sign_request_field_names() {
        let req = SignRequest {
            hosts: vec!["api.example.com".to_owned()],
            certificate_request: "CSR".to_owned(),
            profile: "server".to_owned(),
            label: String::new(),
        };

        let json = serde_json::to_value(&req).unwrap();
        assert_eq!(json["hosts"][0], "api.example.com");
        assert_eq!(json["certificate_request"], "CSR");
        assert_eq!(json["profile"], "server");
    }
}
