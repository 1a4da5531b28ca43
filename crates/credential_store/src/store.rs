use std::fs::{self, OpenOptions};
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};

use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::debug;

use crate::error::StoreError;
use crate::paths::staging_path;
use crate::schema::Credentials;

/// Whole-file JSON persistence for [`Credentials`].
#[derive(Debug, Clone)]
pub struct CredentialStore {
    path: PathBuf,
}

impl CredentialStore {
    #[must_use]
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Reads the credential file. A missing file is `Ok(None)`; unreadable or
    /// corrupt contents are errors.
    pub fn load(&self) -> Result<Option<Credentials>, StoreError> {
        let credentials = read_json::<Credentials>(&self.path)?;
        if let Some(credentials) = &credentials {
            debug!(
                path = %self.path.display(),
                cookies = credentials.cookies.len(),
                has_token = credentials.csrf_token().is_some(),
                "loaded persisted credentials"
            );
        }
        Ok(credentials)
    }

    /// Replaces the credential file with owner-only permissions where supported.
    pub fn save(&self, credentials: &Credentials) -> Result<(), StoreError> {
        write_json(&self.path, "credentials", credentials)?;
        debug!(path = %self.path.display(), "persisted credentials");
        Ok(())
    }

    /// Removes the credential file; a file that is already gone is not an error.
    pub fn clear(&self) -> Result<(), StoreError> {
        match fs::remove_file(&self.path) {
            Ok(()) => Ok(()),
            Err(error) if error.kind() == ErrorKind::NotFound => Ok(()),
            Err(source) => Err(StoreError::io("removing credential file", &self.path, source)),
        }
    }
}

pub(crate) fn read_json<T: DeserializeOwned>(path: &Path) -> Result<Option<T>, StoreError> {
    let bytes = match fs::read(path) {
        Ok(bytes) => bytes,
        Err(error) if error.kind() == ErrorKind::NotFound => return Ok(None),
        Err(source) => return Err(StoreError::io("reading file", path, source)),
    };

    serde_json::from_slice::<T>(&bytes)
        .map(Some)
        .map_err(|source| StoreError::json_parse(path, source))
}

pub(crate) fn write_json<T: Serialize>(
    path: &Path,
    what: &'static str,
    value: &T,
) -> Result<(), StoreError> {
    let bytes = serde_json::to_vec_pretty(value)
        .map_err(|source| StoreError::json_serialize(what, path, source))?;
    write_replace(path, &bytes)
}

/// Writes to a sibling staging file and renames it over `path`.
pub(crate) fn write_replace(path: &Path, bytes: &[u8]) -> Result<(), StoreError> {
    if let Some(parent) = path.parent().filter(|parent| !parent.as_os_str().is_empty()) {
        fs::create_dir_all(parent)
            .map_err(|source| StoreError::io("creating data directory", parent, source))?;
    }

    let staging = staging_path(path);
    let mut options = OpenOptions::new();
    options.write(true).create(true).truncate(true);
    #[cfg(unix)]
    {
        use std::os::unix::fs::OpenOptionsExt;
        options.mode(0o600);
    }

    let mut file = options
        .open(&staging)
        .map_err(|source| StoreError::io("opening staging file", &staging, source))?;
    file.write_all(bytes)
        .and_then(|()| file.sync_all())
        .map_err(|source| StoreError::io("writing staging file", &staging, source))?;
    drop(file);

    fs::rename(&staging, path)
        .map_err(|source| StoreError::io("replacing file", path, source))
}
