use std::{
    io,
    path::{Path, PathBuf},
};

use time::OffsetDateTime;
use tokio::{fs, io::AsyncWriteExt as _};
use zeroize::Zeroizing;

use crate::{cert::key_matches_certificate, Bundle, CertificateInfo, Error};

pub const CERTIFICATE_FILE: &str = "tls.pem";
pub const PRIVATE_KEY_FILE: &str = "tls-key.pem";
pub const CA_CERTIFICATE_FILE: &str = "ca.pem";

const PUBLIC_MODE: u32 = 0o644;
const PRIVATE_MODE: u32 = 0o600;

/// Certificate material on disk.
///
/// Every [`save`](Self::save) replaces all three files. Each one is written next to its final
/// location and renamed into place, so readers never see a half written file. The certificate
/// is renamed last. An interrupted save can still leave a new key next to an old certificate,
/// so [`current_certificate`](Self::current_certificate) only reports a certificate whose public
/// key matches the stored private key.
#[derive(Debug, Clone)]
pub struct CertificateStore {
    dir: PathBuf,
}

impl CertificateStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        CertificateStore { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn certificate_path(&self) -> PathBuf {
        self.dir.join(CERTIFICATE_FILE)
    }

    pub fn private_key_path(&self) -> PathBuf {
        self.dir.join(PRIVATE_KEY_FILE)
    }

    pub fn ca_certificate_path(&self) -> PathBuf {
        self.dir.join(CA_CERTIFICATE_FILE)
    }

    /// Atomically replaces the stored certificate, private key and CA certificate.
    pub async fn save(&self, bundle: &Bundle) -> Result<(), Error> {
        fs::create_dir_all(&self.dir)
            .await
            .map_err(|err| Error::persistence(&self.dir, err))?;

        // rename order: CA, key, certificate
        let files = [
            (CA_CERTIFICATE_FILE, bundle.ca_certificate(), PUBLIC_MODE),
            (PRIVATE_KEY_FILE, bundle.private_key(), PRIVATE_MODE),
            (CERTIFICATE_FILE, bundle.certificate(), PUBLIC_MODE),
        ];

        let mut staged = Vec::with_capacity(files.len());

        for (name, contents, mode) in files {
            let tmp = self.dir.join(format!(".{name}.tmp"));

            if let Err(err) = write_file(&tmp, contents.as_bytes(), mode).await {
                staged.push(tmp.clone());
                remove_all(&staged).await;
                return Err(Error::persistence(tmp, err));
            }

            staged.push(tmp);
        }

        for (idx, (name, _, _)) in files.iter().enumerate() {
            let path = self.dir.join(name);

            if let Err(err) = fs::rename(&staged[idx], &path).await {
                remove_all(&staged[idx..]).await;
                return Err(Error::persistence(path, err));
            }
        }

        log::debug!("certificate files written to {}", self.dir.display());

        Ok(())
    }

    /// Reads the stored certificate, if a complete and consistent set of files is present.
    ///
    /// A certificate that cannot be parsed, or that was not issued for the stored private key,
    /// is reported as absent.
    pub async fn current_certificate(&self) -> Result<Option<CertificateInfo>, Error> {
        let ca_path = self.ca_certificate_path();
        match fs::try_exists(&ca_path).await {
            Ok(true) => {}
            Ok(false) => return Ok(None),
            Err(err) => return Err(Error::persistence(ca_path, err)),
        }

        let Some(key_pem) = read_optional(&self.private_key_path()).await? else {
            return Ok(None);
        };
        let key_pem = Zeroizing::new(key_pem);

        let path = self.certificate_path();
        let Some(pem) = read_optional(&path).await? else {
            return Ok(None);
        };

        let info = match CertificateInfo::from_pem(&pem) {
            Ok(info) => info,
            Err(err) => {
                log::warn!("ignoring unreadable certificate {}: {err:#}", path.display());
                return Ok(None);
            }
        };

        match key_matches_certificate(&key_pem, &pem) {
            Ok(true) => Ok(Some(info)),
            Ok(false) => {
                log::warn!(
                    "ignoring certificate {}, it does not belong to the stored private key",
                    path.display(),
                );
                Ok(None)
            }
            Err(err) => {
                log::warn!("ignoring certificate {}: {err:#}", path.display());
                Ok(None)
            }
        }
    }

    /// Expiry of the stored certificate, if any.
    pub async fn current_expiry(&self) -> Result<Option<OffsetDateTime>, Error> {
        Ok(self
            .current_certificate()
            .await?
            .map(|info| info.validity.not_after))
    }
}

async fn write_file(path: &Path, contents: &[u8], mode: u32) -> io::Result<()> {
    // leftovers of an interrupted save would keep their old mode
    match fs::remove_file(path).await {
        Ok(()) => {}
        Err(err) if err.kind() == io::ErrorKind::NotFound => {}
        Err(err) => return Err(err),
    }

    let mut opts = fs::OpenOptions::new();
    opts.write(true).create_new(true);
    #[cfg(unix)]
    opts.mode(mode);

    let mut file = opts.open(path).await?;
    file.write_all(contents).await?;
    file.sync_all().await?;
    drop(file);

    // umask may have taken bits off
    #[cfg(unix)]
    {
        use std::{fs::Permissions, os::unix::fs::PermissionsExt as _};
        fs::set_permissions(path, Permissions::from_mode(mode)).await?;
    }
    #[cfg(not(unix))]
    let _ = mode;

    Ok(())
}

async fn read_optional(path: &Path) -> Result<Option<String>, Error> {
    match fs::read_to_string(path).await {
        Ok(contents) => Ok(Some(contents)),
        Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(None),
        Err(err) => Err(Error::persistence(path, err)),
    }
}

async fn remove_all(paths: &[PathBuf]) {
    for path in paths {
        if let Err(err) = fs::remove_file(path).await {
            if err.kind() != io::ErrorKind::NotFound {
                log::warn!("failed to remove {}: {err}", path.display());
            }
        }
    }
}
