use std::{future::Future, process::Stdio, time::Duration};

use eyre::{eyre, WrapErr as _};
use tokio::process::Command;

use crate::{Config, Error};

/// Tells the outside world that new certificate files are in place.
pub trait Notifier {
    fn notify(&self) -> impl Future<Output = Result<(), Error>> + Send;
}

/// `None` notifies nobody.
impl<N: Notifier + Sync> Notifier for Option<N> {
    async fn notify(&self) -> Result<(), Error> {
        match self {
            Some(notifier) => notifier.notify().await,
            None => Ok(()),
        }
    }
}

/// Runs a shell command, e.g. to make a server reload its certificate.
///
/// The command inherits the working directory, environment and output streams of this process.
/// Its stdin is closed and it is killed when it outlives the timeout.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandNotifier {
    command: String,
    timeout: Duration,
}

impl CommandNotifier {
    pub fn new(command: impl Into<String>, timeout: Duration) -> Self {
        CommandNotifier {
            command: command.into(),
            timeout,
        }
    }

    /// The configured command, unless it is unset or blank.
    pub fn from_config(config: &Config) -> Option<Self> {
        config
            .command
            .as_deref()
            .map(str::trim)
            .filter(|command| !command.is_empty())
            .map(|command| CommandNotifier::new(command, config.command_timeout))
    }

    async fn run(&self) -> eyre::Result<()> {
        log::info!("running command: {}", self.command);

        let mut child = Command::new("/bin/sh")
            .arg("-c")
            .arg(&self.command)
            .stdin(Stdio::null())
            .kill_on_drop(true)
            .spawn()
            .wrap_err_with(|| format!("failed to start {:?}", self.command))?;

        let status = tokio::time::timeout(self.timeout, child.wait())
            .await
            .map_err(|_| eyre!("{:?} timed out after {:?}", self.command, self.timeout))?
            .wrap_err_with(|| format!("failed to wait for {:?}", self.command))?;

        if !status.success() {
            return Err(eyre!("{:?} exited with {status}", self.command));
        }

        Ok(())
    }
}

impl Notifier for CommandNotifier {
    async fn notify(&self) -> Result<(), Error> {
        self.run().await.map_err(Error::Notification)
    }
}
