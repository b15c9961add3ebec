use std::{io, path::PathBuf, time::Duration};

use clap::Parser;
use sidekick::{config, parse_duration, Config};
use tokio::signal::unix::{signal, SignalKind};
use tokio_util::sync::CancellationToken;

/// Requests a certificate from a CFSSL CA and keeps it renewed.
#[derive(Debug, Parser)]
#[command(name = "cfssl-sidekick", version)]
struct Cli {
    /// Hex encoded auth key of the CFSSL signer; empty uses the unauthenticated endpoint
    #[arg(long = "cfssl-token", env = "CFSSL_TOKEN", default_value = "", hide_env_values = true)]
    token: String,

    /// URL of the CFSSL API
    #[arg(long = "cfssl-url", env = "CFSSL_URL", default_value = config::DEFAULT_ENDPOINT_URL)]
    url: String,

    /// CFSSL signing profile
    #[arg(long = "cfssl-profile", env = "CFSSL_PROFILE", default_value = config::DEFAULT_PROFILE)]
    profile: String,

    /// CA bundle used to verify the CFSSL endpoint
    #[arg(long, env = "TLS_CA")]
    tls_ca: Option<PathBuf>,

    /// Domain to include in the certificate, the first one is the common name
    #[arg(long, env = "DOMAIN", value_delimiter = ',', required = true)]
    domain: Vec<String>,

    /// Size of the RSA key in bits
    #[arg(long, env = "SIZE", default_value_t = config::DEFAULT_KEY_SIZE)]
    size: usize,

    /// Directory to write tls.pem, tls-key.pem and ca.pem into
    #[arg(long, env = "OUTPUT_DIR", default_value = config::DEFAULT_OUTPUT_DIR)]
    output_dir: PathBuf,

    /// Shell command to run after the certificate files have been updated
    #[arg(long, env = "COMMAND")]
    command: Option<String>,

    /// How long the command may run before it is killed
    #[arg(long, env = "COMMAND_TIMEOUT", default_value = "30s", value_parser = parse_duration)]
    command_timeout: Duration,

    #[arg(
        long = "tls-organization",
        env = "TLS_ORGANIZATION",
        default_value = config::DEFAULT_ORGANIZATION,
    )]
    organization: String,

    #[arg(long = "tls-country", env = "TLS_COUNTRY", default_value = config::DEFAULT_COUNTRY)]
    country: String,

    #[arg(long = "tls-locality", env = "TLS_LOCALITY", default_value = config::DEFAULT_LOCALITY)]
    locality: String,

    #[arg(long = "tls-province", env = "TLS_PROVINCE", default_value = config::DEFAULT_PROVINCE)]
    province: String,

    /// Exit once the certificate has been acquired instead of renewing it
    #[arg(long, env = "ONETIME")]
    onetime: bool,

    /// Time allowed for acquiring the first certificate
    #[arg(long, env = "TIMEOUT", default_value = "1m", value_parser = parse_duration)]
    timeout: Duration,

    /// Log debug output
    #[arg(long, short, env = "VERBOSE")]
    verbose: bool,
}

impl Cli {
    fn into_config(self) -> Config {
        Config {
            endpoint_url: self.url,
            token: self.token,
            profile: self.profile,
            tls_ca: self.tls_ca,
            domains: self
                .domain
                .into_iter()
                .map(|domain| domain.trim().to_owned())
                .filter(|domain| !domain.is_empty())
                .collect(),
            key_size: self.size,
            output_dir: self.output_dir,
            organization: self.organization,
            country: self.country,
            locality: self.locality,
            province: self.province,
            command: self.command,
            command_timeout: self.command_timeout,
            onetime: self.onetime,
            timeout: self.timeout,
            verbose: self.verbose,
        }
    }
}

async fn shutdown_signal() -> io::Result<()> {
    let mut terminate = signal(SignalKind::terminate())?;

    tokio::select! {
        res = tokio::signal::ctrl_c() => res,
        _ = terminate.recv() => Ok(()),
    }
}

#[tokio::main]
async fn main() {
    let config = Cli::parse().into_config();

    let level = if config.verbose { "debug" } else { "info" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level)).init();

    let shutdown = CancellationToken::new();

    tokio::spawn({
        let shutdown = shutdown.clone();

        async move {
            match shutdown_signal().await {
                Ok(()) => {
                    log::info!("shutdown signal received");
                    shutdown.cancel();
                }
                Err(err) => log::warn!("failed to listen for shutdown signals: {err}"),
            }
        }
    });

    if let Err(err) = sidekick::run(&config, shutdown).await {
        eprintln!("error: {}", error_reporter::Report::new(&err));
        std::process::exit(err.exit_code());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_domains_and_durations() {
        let cli = Cli::parse_from([
            "cfssl-sidekick",
            "--domain",
            "api.example.com,www.example.com",
            "--domain",
            "10.0.0.1",
            "--timeout",
            "90s",
            "--onetime",
            "--cfssl-url",
            "https://ca.example.com",
            "--cfssl-profile",
            "server",
            "--tls-organization",
            "Example Inc",
        ]);
        let config = cli.into_config();

        assert_eq!(
            config.domains,
            ["api.example.com", "www.example.com", "10.0.0.1"]
        );
        assert_eq!(config.timeout, Duration::from_secs(90));
        assert_eq!(config.command_timeout, Duration::from_secs(30));
        assert!(config.onetime);
        assert_eq!(config.endpoint_url, "https://ca.example.com");
        assert_eq!(config.profile, "server");
        assert_eq!(config.organization, "Example Inc");
    }

    #[test]
    fn defaults_match_library() {
        let cli = Cli::parse_from(["cfssl-sidekick", "--domain", "api.example.com"]);
        let config = cli.into_config();

        assert_eq!(
            config,
            Config {
                domains: vec!["api.example.com".to_owned()],
                ..Default::default()
            }
        );
    }

    #[test]
    fn rejects_bad_duration() {
        let res = Cli::try_parse_from([
            "cfssl-sidekick",
            "--domain",
            "api.example.com",
            "--timeout",
            "soon",
        ]);
        assert!(res.is_err());
    }
}
