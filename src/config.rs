use std::{path::PathBuf, time::Duration};

use crate::Error;

pub const DEFAULT_ENDPOINT_URL: &str = "https://ca.kube-tls.svc.cluster.local";
pub const DEFAULT_PROFILE: &str = "default";
pub const DEFAULT_KEY_SIZE: usize = 2048;
pub const DEFAULT_OUTPUT_DIR: &str = "/certs";
pub const DEFAULT_ORGANIZATION: &str = "ACP Homeoffice";
pub const DEFAULT_COUNTRY: &str = "GB";
pub const DEFAULT_LOCALITY: &str = "London";
pub const DEFAULT_PROVINCE: &str = "London";
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(60);
pub const DEFAULT_COMMAND_TIMEOUT: Duration = Duration::from_secs(30);

const MIN_KEY_SIZE: usize = 1024;
const MAX_KEY_SIZE: usize = 8192;

/// Everything needed to acquire and renew one certificate.
///
/// Built once at startup and handed to the [`Controller`](crate::Controller) by reference.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    /// Base URL of the CFSSL API.
    pub endpoint_url: String,

    /// Hex encoded CFSSL auth key. Empty means the unauthenticated `sign` endpoint is used.
    pub token: String,

    /// CFSSL signing profile.
    pub profile: String,

    /// CA bundle used to verify the CFSSL endpoint itself.
    pub tls_ca: Option<PathBuf>,

    /// Names to request; the first one becomes the common name.
    pub domains: Vec<String>,

    /// RSA key size in bits.
    pub key_size: usize,

    /// Directory the certificate, key and CA certificate are written into.
    pub output_dir: PathBuf,

    pub organization: String,
    pub country: String,
    pub locality: String,
    pub province: String,

    /// Shell command run after every successful renewal.
    pub command: Option<String>,

    /// Upper bound on how long the command may run.
    pub command_timeout: Duration,

    /// Exit after the first certificate instead of renewing it.
    pub onetime: bool,

    /// Deadline for the initial acquisition, retries included.
    pub timeout: Duration,

    pub verbose: bool,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            endpoint_url: DEFAULT_ENDPOINT_URL.to_owned(),
            token: String::new(),
            profile: DEFAULT_PROFILE.to_owned(),
            tls_ca: None,
            domains: Vec::new(),
            key_size: DEFAULT_KEY_SIZE,
            output_dir: PathBuf::from(DEFAULT_OUTPUT_DIR),
            organization: DEFAULT_ORGANIZATION.to_owned(),
            country: DEFAULT_COUNTRY.to_owned(),
            locality: DEFAULT_LOCALITY.to_owned(),
            province: DEFAULT_PROVINCE.to_owned(),
            command: None,
            command_timeout: DEFAULT_COMMAND_TIMEOUT,
            onetime: false,
            timeout: DEFAULT_TIMEOUT,
            verbose: false,
        }
    }
}

impl Config {
    /// Checks the configuration for values that can never lead to a certificate.
    pub fn validate(&self) -> Result<(), Error> {
        if self.domains.is_empty() {
            return Err(Error::config("at least one domain is required"));
        }

        if let Some(domain) = self
            .domains
            .iter()
            .find(|domain| domain.trim().is_empty() || domain.contains(' '))
        {
            return Err(Error::config(format!("invalid domain name {domain:?}")));
        }

        reqwest::Url::parse(&self.endpoint_url).map_err(|err| {
            Error::config(format!(
                "invalid endpoint url {:?}: {err}",
                self.endpoint_url
            ))
        })?;

        if !(MIN_KEY_SIZE..=MAX_KEY_SIZE).contains(&self.key_size) {
            return Err(Error::config(format!(
                "key size {} is outside {MIN_KEY_SIZE}..={MAX_KEY_SIZE} bits",
                self.key_size
            )));
        }

        if self.timeout.is_zero() {
            return Err(Error::config("timeout must be greater than zero"));
        }

        if self.output_dir.as_os_str().is_empty() {
            return Err(Error::config("output directory is required"));
        }

        if !self.token.is_empty() && hex::decode(&self.token).is_err() {
            return Err(Error::config("token must be a hex encoded key"));
        }

        Ok(())
    }
}

/// Parses human readable durations such as `90s`, `1m30s`, `500ms` or `2h`.
///
/// A bare number is taken as seconds.
pub fn parse_duration(input: &str) -> Result<Duration, String> {
    let input = input.trim();

    if input.is_empty() {
        return Err("empty duration".to_owned());
    }

    if let Ok(secs) = input.parse::<u64>() {
        return Ok(Duration::from_secs(secs));
    }

    cyborgtime::parse_duration(input).map_err(|err| format!("invalid duration: {err}"))
}
