use std::future::Future;

use eyre::WrapErr as _;
use time::OffsetDateTime;

use crate::{
    api::{InfoRequest, SignRequest},
    cert::{create_csr_pem, create_rsa_key, private_key_pem},
    trans::Transport,
    Bundle, Config, Error, Subject,
};

/// Something able to turn a subject into a signed certificate bundle.
pub trait Signer {
    /// Generates a fresh key of `key_size` bits and has a certificate issued for `subject`.
    fn request_certificate(
        &self,
        subject: &Subject,
        key_size: usize,
    ) -> impl Future<Output = Result<Bundle, Error>> + Send;
}

/// Signs certificates through a CFSSL API endpoint.
#[derive(Debug, Clone)]
pub struct CfsslClient {
    transport: Transport,
    profile: String,
}

impl CfsslClient {
    pub fn new(config: &Config) -> Result<Self, Error> {
        Ok(CfsslClient {
            transport: Transport::new(config)?,
            profile: config.profile.clone(),
        })
    }

    async fn sign(&self, subject: &Subject, key_size: usize) -> eyre::Result<Bundle> {
        // key generation is CPU bound and can take seconds for large keys
        let key = tokio::task::spawn_blocking(move || create_rsa_key(key_size))
            .await
            .wrap_err("key generation task")??;

        let csr = create_csr_pem(&key, subject)?;
        let private_key = private_key_pem(&key)?;
        drop(key);

        log::debug!("requesting certificate for {subject}");

        let signed = self
            .transport
            .sign(&SignRequest {
                hosts: subject.hosts.clone(),
                certificate_request: csr,
                profile: self.profile.clone(),
                label: String::new(),
            })
            .await
            .wrap_err("sign certificate")?;

        let ca = self
            .transport
            .info(&InfoRequest {
                label: String::new(),
                profile: self.profile.clone(),
            })
            .await
            .wrap_err("fetch CA certificate")?;

        let bundle = Bundle::parse(private_key, signed.certificate, ca.certificate)?;

        let not_after = bundle.not_after()?;
        if not_after <= OffsetDateTime::now_utc() {
            eyre::bail!("CA issued a certificate that already expired at {not_after}");
        }

        Ok(bundle)
    }
}

impl Signer for CfsslClient {
    async fn request_certificate(
        &self,
        subject: &Subject,
        key_size: usize,
    ) -> Result<Bundle, Error> {
        self.sign(subject, key_size).await.map_err(Error::Signing)
    }
}
