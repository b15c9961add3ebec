//! CFSSL "standard" authentication.
//!
//! An authenticated sign request is the serialized [`SignRequest`] together with an
//! HMAC-SHA256 of it, keyed with a secret shared between the CA and its clients.
//!
//! [`SignRequest`]: crate::api::SignRequest

use std::fmt;

use hmac::{Hmac, Mac as _};
use sha2::Sha256;
use zeroize::Zeroizing;

use crate::{api::AuthSignRequest, Error};

type HmacSha256 = Hmac<Sha256>;

#[derive(Clone)]
pub(crate) struct AuthKey {
    key: Zeroizing<Vec<u8>>,
}

impl AuthKey {
    /// Decodes the hex encoded key CFSSL is configured with.
    pub(crate) fn from_hex(key: &str) -> Result<AuthKey, Error> {
        let key = hex::decode(key.trim())
            .map_err(|err| Error::config(format!("token must be a hex encoded key: {err}")))?;

        Ok(AuthKey {
            key: Zeroizing::new(key),
        })
    }

    /// HMAC-SHA256 of `request` under this key.
    pub(crate) fn token(&self, request: &[u8]) -> Vec<u8> {
        let mut mac =
            HmacSha256::new_from_slice(&self.key).expect("HMAC can take key of any size");
        mac.update(request);
        mac.finalize().into_bytes().to_vec()
    }

    pub(crate) fn sign_request(&self, request: Vec<u8>) -> AuthSignRequest {
        AuthSignRequest {
            token: self.token(&request),
            request,
        }
    }
}

impl fmt::Debug for AuthKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AuthKey").finish_non_exhaustive()
    }
}
