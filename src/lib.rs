//! Keeps a TLS certificate issued by a [CFSSL](https://github.com/cloudflare/cfssl) CA fresh on
//! disk.
//!
//! Meant to run as a sidekick next to a service that needs a certificate, for example in the same
//! Kubernetes pod sharing a volume. It generates a private key, has the CA sign a certificate for
//! the configured domains, writes the certificate, key and CA certificate into an output directory
//! and then renews the certificate well ahead of expiry for as long as it runs.
//!
//! # Usage
//!
//! ```no_run
//! # async fn example() -> Result<(), sidekick::Error> {
//! let config = sidekick::Config {
//!     endpoint_url: "https://ca.example.com".to_owned(),
//!     token: "0123456789abcdef".to_owned(),
//!     domains: vec!["api.example.com".to_owned()],
//!     output_dir: "/certs".into(),
//!     command: Some("nginx -s reload".to_owned()),
//!     ..Default::default()
//! };
//!
//! let shutdown = tokio_util::sync::CancellationToken::new();
//! sidekick::run(&config, shutdown).await
//! # }
//! ```
//!
//! # Files
//!
//! The output directory holds `tls.pem` (certificate), `tls-key.pem` (PKCS#8 private key, only
//! readable by the owner) and `ca.pem` (CA certificate). All three are replaced atomically on every
//! renewal, after which the optional command is run so the service can pick them up.
//!
//! # Renewal
//!
//! A certificate is renewed once two thirds of its lifetime have passed. Failed attempts are
//! retried with capped exponential backoff. The first certificate must be acquired within the
//! configured timeout; renewals keep retrying since the old certificate is still valid.
//!
//! In continuous mode a certificate left by a previous run is reused if it was issued for the same
//! domains and is not yet due for renewal.

#![deny(rust_2018_idioms, nonstandard_style, future_incompatible)]

mod auth;
mod cert;
mod client;
mod controller;
mod error;
mod notify;
mod req;
mod store;
mod subject;
mod trans;
mod util;

pub mod api;
pub mod config;


use tokio_util::sync::CancellationToken;

pub use crate::{
    cert::{create_rsa_key, Bundle, CertificateInfo, Validity},
    client::{CfsslClient, Signer},
    config::{parse_duration, Config},
    controller::{renewal_delay, renewal_time, Controller},
    error::Error,
    notify::{CommandNotifier, Notifier},
    store::{CertificateStore, CA_CERTIFICATE_FILE, CERTIFICATE_FILE, PRIVATE_KEY_FILE},
    subject::Subject,
};

/// Validates `config`, then acquires and renews its certificate until done or shut down.
pub async fn run(config: &Config, shutdown: CancellationToken) -> Result<(), Error> {
    config.validate()?;

    log::info!(
        "requesting certificate for {} from {} (profile {:?})",
        config.domains.join(", "),
        config.endpoint_url,
        config.profile,
    );

    let signer = CfsslClient::new(config)?;
    let notifier = CommandNotifier::from_config(config);

    Controller::new(config, signer, notifier, shutdown)
        .run()
        .await
}
