use std::{fs, path::Path, time::Duration};

use eyre::WrapErr as _;
use serde::{de::DeserializeOwned, Serialize};

use crate::{
    api::{InfoRequest, InfoResult, SignRequest, SignResult},
    auth::AuthKey,
    req::{req_handle_response, req_post},
    Config, Error,
};

const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

const SIGN_PATH: &str = "api/v1/cfssl/sign";
const AUTH_SIGN_PATH: &str = "api/v1/cfssl/authsign";
const INFO_PATH: &str = "api/v1/cfssl/info";

/// HTTP access to one CFSSL API endpoint.
///
/// Sign requests go to `authsign` wrapped in an HMAC token when an auth key is configured and
/// to the plain `sign` endpoint otherwise.
#[derive(Clone, Debug)]
pub(crate) struct Transport {
    client: reqwest::Client,
    base_url: reqwest::Url,
    auth_key: Option<AuthKey>,
}

impl Transport {
    pub(crate) fn new(config: &Config) -> Result<Self, Error> {
        let mut base_url = reqwest::Url::parse(&config.endpoint_url).map_err(|err| {
            Error::config(format!(
                "invalid endpoint url {:?}: {err}",
                config.endpoint_url
            ))
        })?;

        // API paths are joined onto the base, which must therefore end in a slash
        if !base_url.path().ends_with('/') {
            let path = format!("{}/", base_url.path());
            base_url.set_path(&path);
        }

        let auth_key = match config.token.trim() {
            "" => None,
            token => Some(AuthKey::from_hex(token)?),
        };

        let mut builder = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .user_agent(concat!(env!("CARGO_PKG_NAME"), "/", env!("CARGO_PKG_VERSION")));

        if let Some(path) = &config.tls_ca {
            // only the given CA is trusted for the API connection
            builder = builder.tls_built_in_root_certs(false);
            for cert in load_ca_certificates(path)? {
                builder = builder.add_root_certificate(cert);
            }
        }

        let client = builder
            .build()
            .map_err(|err| Error::config(format!("failed to build http client: {err}")))?;

        Ok(Transport {
            client,
            base_url,
            auth_key,
        })
    }

    /// Submits a sign request, returns the issued certificate.
    pub(crate) async fn sign(&self, req: &SignRequest) -> eyre::Result<SignResult> {
        match &self.auth_key {
            Some(key) => {
                let request = serde_json::to_vec(req)?;
                let auth_req = key.sign_request(request);
                self.call(AUTH_SIGN_PATH, &auth_req).await
            }
            None => self.call(SIGN_PATH, req).await,
        }
    }

    /// Looks up the signer, whose certificate is the CA certificate of issued certificates.
    pub(crate) async fn info(&self, req: &InfoRequest) -> eyre::Result<InfoResult> {
        self.call(INFO_PATH, req).await
    }

    async fn call<T, R>(&self, path: &str, body: &T) -> eyre::Result<R>
    where
        T: Serialize + ?Sized,
        R: DeserializeOwned,
    {
        let url = self.base_url.join(path)?;

        log::debug!("Call endpoint: {url}");

        let res = req_post(&self.client, url.clone(), body)
            .await
            .wrap_err_with(|| format!("POST {url}"))?;

        req_handle_response(res)
            .await
            .wrap_err_with(|| format!("POST {url}"))
    }
}

fn load_ca_certificates(path: &Path) -> Result<Vec<reqwest::Certificate>, Error> {
    let invalid = |msg: String| Error::config(format!("tls ca {}: {msg}", path.display()));

    let pem = fs::read(path).map_err(|err| invalid(err.to_string()))?;

    let certs = rustls_pemfile::certs(&mut pem.as_slice())
        .map(|res| {
            res.map_err(|err| invalid(err.to_string()))
                .and_then(|der| {
                    reqwest::Certificate::from_der(&der).map_err(|err| invalid(err.to_string()))
                })
        })
        .collect::<Result<Vec<_>, _>>()?;

    if certs.is_empty() {
        return Err(invalid("no certificates found".to_owned()));
    }

    Ok(certs)
}

#[cfg(test)]
mod tests {
    use std::io::Write as _;

    use super::*;
    use crate::test;

    fn config(url: &str) -> Config {
        Config {
            endpoint_url: url.to_owned(),
            domains: vec!["api.example.com".to_owned()],
            ..Default::default()
        }
    }

    #[test]
    fn base_url_gets_trailing_slash() {
        let trans = Transport::new(&config("https://ca.example.com/cfssl")).unwrap();
        assert_eq!(
            trans.base_url.join(SIGN_PATH).unwrap().as_str(),
            "https://ca.example.com/cfssl/api/v1/cfssl/sign"
        );

        let trans = Transport::new(&config("https://ca.example.com")).unwrap();
        assert_eq!(
            trans.base_url.join(INFO_PATH).unwrap().as_str(),
            "https://ca.example.com/api/v1/cfssl/info"
        );
    }

    #[test]
    fn token_selects_auth_key() {
        let trans = Transport::new(&config("https://ca.example.com")).unwrap();
        assert!(trans.auth_key.is_none());

        let trans = Transport::new(&Config {
            token: "00112233".to_owned(),
            ..config("https://ca.example.com")
        })
        .unwrap();
        assert!(trans.auth_key.is_some());
    }

    #[test]
    fn tls_ca_must_contain_certificates() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(b"not a certificate").unwrap();

        let err = Transport::new(&Config {
            tls_ca: Some(file.path().to_owned()),
            ..config("https://ca.example.com")
        })
        .unwrap_err();
        assert!(matches!(err, Error::Configuration(_)));

        let err = Transport::new(&Config {
            tls_ca: Some("/nonexistent/ca.pem".into()),
            ..config("https://ca.example.com")
        })
        .unwrap_err();
        assert!(matches!(err, Error::Configuration(_)));
    }

    #[test]
    fn tls_ca_is_loaded() {
        let now = time::OffsetDateTime::now_utc();
        let issued = test::issue_certificate(
            &["ca.example.com"],
            now - time::Duration::hours(1),
            now + time::Duration::days(1),
        );

        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(issued.ca_certificate.as_bytes()).unwrap();

        Transport::new(&Config {
            tls_ca: Some(file.path().to_owned()),
            ..config("https://ca.example.com")
        })
        .unwrap();
    }

    #[tokio::test]
    async fn api_errors_are_reported() {
        let server = test::with_cfssl_server(test::Behavior::Reject);
        let trans = Transport::new(&config(&server.url)).unwrap();

        let err = trans
            .sign(&SignRequest {
                hosts: vec!["api.example.com".to_owned()],
                certificate_request: "CSR".to_owned(),
                profile: "default".to_owned(),
                label: String::new(),
            })
            .await
            .unwrap_err();

        let msg = format!("{err:#}");
        assert!(msg.contains("/api/v1/cfssl/sign"), "{msg}");
        assert!(msg.contains("[5300] Invalid or unknown policy"), "{msg}");
    }

    #[tokio::test]
    async fn info_returns_ca_certificate() {
        let server = test::with_cfssl_server(test::Behavior::Issue);
        let trans = Transport::new(&config(&server.url)).unwrap();

        let info = trans
            .info(&InfoRequest {
                label: String::new(),
                profile: "default".to_owned(),
            })
            .await
            .unwrap();

        assert!(info.certificate.starts_with("-----BEGIN CERTIFICATE-----"));
    }
}
