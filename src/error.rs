use std::{io, path::PathBuf, time::Duration};

use crate::api::ResponseMessage;

/// Errors surfaced by the certificate lifecycle.
///
/// Signing and persistence failures are transient and retried by the
/// [`Controller`](crate::Controller); configuration errors and an exhausted initial acquisition
/// are fatal.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Invalid or missing configuration.
    #[error("invalid configuration: {0}")]
    Configuration(String),

    /// The CA could not be reached, refused the request, or sent something unusable.
    #[error("signing request failed: {0:#}")]
    Signing(eyre::Report),

    /// Writing certificate material to the output directory failed.
    #[error("failed to persist {}", path.display())]
    Persistence {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// The post-renewal command failed or could not be started.
    #[error("notification command failed: {0:#}")]
    Notification(eyre::Report),

    /// No certificate was acquired before the startup deadline.
    #[error("no certificate acquired within {timeout:?}")]
    Timeout {
        timeout: Duration,
        #[source]
        last_error: Option<Box<Error>>,
    },
}

impl Error {
    pub(crate) fn config(msg: impl Into<String>) -> Self {
        Error::Configuration(msg.into())
    }

    pub(crate) fn persistence(path: impl Into<PathBuf>, source: io::Error) -> Self {
        Error::Persistence {
            path: path.into(),
            source,
        }
    }

    /// Returns true if another acquisition attempt may succeed where this one failed.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Error::Signing(_) | Error::Persistence { .. })
    }

    /// Process exit status used when this error ends the program.
    pub fn exit_code(&self) -> i32 {
        match self {
            Error::Configuration(_) => 2,
            _ => 1,
        }
    }
}

impl From<ResponseMessage> for eyre::Report {
    fn from(msg: ResponseMessage) -> eyre::Report {
        eyre::eyre!("{msg}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn retry_policy() {
        assert!(Error::Signing(eyre::eyre!("connection refused")).is_retryable());
        assert!(Error::persistence("/certs/tls.pem", io::ErrorKind::PermissionDenied.into())
            .is_retryable());
        assert!(!Error::config("no domains").is_retryable());
        assert!(!Error::Notification(eyre::eyre!("exit status 1")).is_retryable());
    }

    #[test]
    fn timeout_reports_last_error() {
        let err = Error::Timeout {
            timeout: Duration::from_secs(5),
            last_error: Some(Box::new(Error::Signing(
                eyre::eyre!("connection refused").wrap_err("POST /api/v1/cfssl/authsign"),
            ))),
        };

        assert_eq!(err.exit_code(), 1);

        let report = error_reporter::Report::new(&err).to_string();
        assert!(report.starts_with("no certificate acquired within 5s"), "{report}");
        assert!(report.contains("POST /api/v1/cfssl/authsign: connection refused"), "{report}");
    }

    #[test]
    fn configuration_exit_code() {
        assert_eq!(Error::config("empty domain list").exit_code(), 2);
    }
}
