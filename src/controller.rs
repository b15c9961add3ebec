use std::{future::Future, time::Duration};

use time::OffsetDateTime;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use crate::{
    cert::Validity, notify::Notifier, Bundle, CertificateStore, Config, Error, Signer, Subject,
};

const INITIAL_BACKOFF: Duration = Duration::from_secs(1);
const MAX_BACKOFF: Duration = Duration::from_secs(30);

/// Capped exponential backoff between acquisition attempts.
#[derive(Debug, Clone)]
pub(crate) struct Backoff {
    next: Duration,
}

impl Default for Backoff {
    fn default() -> Self {
        Backoff {
            next: INITIAL_BACKOFF,
        }
    }
}

impl Backoff {
    pub(crate) fn next_delay(&mut self) -> Duration {
        let delay = self.next;
        self.next = (self.next * 2).min(MAX_BACKOFF);
        delay
    }
}

/// Instant at which a certificate with `validity` is due for renewal.
///
/// That is once two thirds of its total lifetime have passed.
pub fn renewal_time(validity: &Validity) -> OffsetDateTime {
    validity.not_before + validity.lifetime() * 2 / 3
}

/// Time to wait from `now` until renewal is due, zero when it is overdue.
pub fn renewal_delay(validity: &Validity, now: OffsetDateTime) -> Duration {
    Duration::try_from(renewal_time(validity) - now).unwrap_or(Duration::ZERO)
}

#[derive(Debug)]
enum State {
    Acquiring,
    Steady(Validity),
    Terminated,
}

/// Drives the certificate lifecycle: initial acquisition, then renewal ahead of expiry.
///
/// Acquisition rounds are strictly sequential. Each attempt requests a certificate from the
/// [`Signer`], saves it to the [`CertificateStore`] and then notifies the [`Notifier`].
/// Failed attempts are retried with capped exponential backoff. Initial acquisition gives up
/// after the configured timeout, renewals retry for as long as it takes.
///
/// Cancelling the shutdown token ends [`run`](Self::run) successfully at the next await point.
/// Only the signing request is cut short by shutdown or the deadline; once a certificate has been
/// issued it is always saved completely.
#[derive(Debug)]
pub struct Controller<'a, S, N> {
    config: &'a Config,
    signer: S,
    notifier: N,
    store: CertificateStore,
    shutdown: CancellationToken,
}

impl<'a, S: Signer, N: Notifier> Controller<'a, S, N> {
    pub fn new(config: &'a Config, signer: S, notifier: N, shutdown: CancellationToken) -> Self {
        Controller {
            config,
            signer,
            notifier,
            store: CertificateStore::new(&config.output_dir),
            shutdown,
        }
    }

    pub fn store(&self) -> &CertificateStore {
        &self.store
    }

    /// Runs until a onetime acquisition succeeded, shutdown is requested or a fatal error occurs.
    pub async fn run(self) -> Result<(), Error> {
        let started = Instant::now();
        let subject = Subject::from_config(self.config)?;

        let mut state = self.initial_state(&subject).await;

        loop {
            state = match state {
                State::Acquiring => {
                    let deadline = started + self.config.timeout;

                    match self.acquire(&subject, Some(deadline)).await? {
                        None => return Ok(()),
                        Some(_) if self.config.onetime => State::Terminated,
                        Some(validity) => State::Steady(validity),
                    }
                }

                State::Steady(validity) => {
                    let delay = renewal_delay(&validity, OffsetDateTime::now_utc());
                    log::info!(
                        "certificate valid until {}, renewing at {} (in {}s)",
                        validity.not_after,
                        renewal_time(&validity),
                        delay.as_secs(),
                    );

                    if !self.wait(delay).await {
                        return Ok(());
                    }

                    log::info!("renewing certificate for {subject}");

                    match self.acquire(&subject, None).await? {
                        None => return Ok(()),
                        Some(validity) => State::Steady(validity),
                    }
                }

                State::Terminated => {
                    log::info!("certificate acquired, exiting");
                    return Ok(());
                }
            };
        }
    }

    /// Picks up a stored certificate from a previous run if it can still be used.
    async fn initial_state(&self, subject: &Subject) -> State {
        if self.config.onetime {
            return State::Acquiring;
        }

        let info = match self.store.current_certificate().await {
            Ok(Some(info)) => info,
            Ok(None) => return State::Acquiring,
            Err(err) => {
                log::warn!("could not read stored certificate: {err}");
                return State::Acquiring;
            }
        };

        let now = OffsetDateTime::now_utc();

        if !subject.covers_exactly(&info.alt_names) {
            log::info!("stored certificate names differ from configured domains, replacing it");
            State::Acquiring
        } else if renewal_delay(&info.validity, now).is_zero() {
            log::info!("stored certificate is due for renewal, replacing it");
            State::Acquiring
        } else {
            log::info!(
                "reusing stored certificate in {}",
                self.store.dir().display()
            );
            State::Steady(info.validity)
        }
    }

    /// Retries acquisition attempts until one succeeds.
    ///
    /// With a deadline, gives up once it is reached. Returns `None` on shutdown.
    async fn acquire(
        &self,
        subject: &Subject,
        deadline: Option<Instant>,
    ) -> Result<Option<Validity>, Error> {
        let mut backoff = Backoff::default();
        let mut last_error = None;

        loop {
            if deadline.is_some_and(|deadline| Instant::now() >= deadline) {
                return Err(Error::Timeout {
                    timeout: self.config.timeout,
                    last_error: last_error.map(Box::new),
                });
            }

            let request = bounded(
                deadline,
                self.signer.request_certificate(subject, self.config.key_size),
            );

            let res = tokio::select! {
                _ = self.shutdown.cancelled() => return Ok(None),
                res = request => res,
            };

            let res = match res {
                Some(Ok(bundle)) => self.install(subject, &bundle).await,
                Some(Err(err)) => Err(err),

                None => {
                    last_error = Some(Error::Signing(eyre::eyre!(
                        "certificate request cut off at deadline"
                    )));
                    continue;
                }
            };

            let err = match res {
                Ok(validity) => {
                    self.notify().await;
                    return Ok(Some(validity));
                }

                Err(err) if !err.is_retryable() => return Err(err),
                Err(err) => err,
            };

            let mut delay = backoff.next_delay();
            if let Some(deadline) = deadline {
                delay = delay.min(deadline.saturating_duration_since(Instant::now()));
            }

            log::warn!("{err}, retrying in {}ms", delay.as_millis());
            last_error = Some(err);

            if !self.wait(delay).await {
                return Ok(None);
            }
        }
    }

    /// Saves an issued bundle. Not raced against shutdown or the deadline.
    async fn install(&self, subject: &Subject, bundle: &Bundle) -> Result<Validity, Error> {
        self.store.save(bundle).await?;

        let info = bundle.info().map_err(Error::Signing)?;
        log::info!(
            "certificate for {} issued, valid until {}",
            info.common_name.as_deref().unwrap_or(&subject.common_name),
            info.validity.not_after,
        );

        Ok(info.validity)
    }

    async fn notify(&self) {
        tokio::select! {
            _ = self.shutdown.cancelled() => {}
            res = self.notifier.notify() => {
                if let Err(err) = res {
                    log::warn!("{err}");
                }
            }
        }
    }

    /// Sleeps for `delay`, returns false if shutdown was requested meanwhile.
    async fn wait(&self, delay: Duration) -> bool {
        tokio::select! {
            _ = self.shutdown.cancelled() => false,
            _ = tokio::time::sleep(delay) => true,
        }
    }
}

async fn bounded<F: Future>(deadline: Option<Instant>, fut: F) -> Option<F::Output> {
    match deadline {
        Some(deadline) => tokio::time::timeout_at(deadline, fut).await.ok(),
        None => Some(fut.await),
    }
}
