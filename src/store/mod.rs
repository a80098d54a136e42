pub mod audit;
pub mod checkpoint;

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use serde::de::DeserializeOwned;
use serde::Serialize;
use thiserror::Error;
use tracing::warn;

pub use audit::{AuditEntry, AuditLog};
pub use checkpoint::CheckpointStore;

/// What to do when a store file exists but cannot be read.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum LoadPolicy {
    /// Warn and start empty. Items may be reprocessed.
    #[default]
    Lenient,
    /// Refuse to start.
    Strict,
}

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("cannot read {}: {source}", .path.display())]
    Read { path: PathBuf, source: io::Error },
    #[error("{} is not a valid store file: {source}", .path.display())]
    Corrupt {
        path: PathBuf,
        source: serde_json::Error,
    },
    #[error("cannot write {}: {source}", .path.display())]
    Write { path: PathBuf, source: io::Error },
    #[error("cannot encode {}: {source}", .path.display())]
    Encode {
        path: PathBuf,
        source: serde_json::Error,
    },
    #[error("cannot move unreadable {} aside: {source}", .path.display())]
    SetAside { path: PathBuf, source: io::Error },
}

/// Load a JSON document. A missing file is `Ok(None)`. An unreadable one is
/// an error under the strict policy; under the lenient one it is renamed to
/// `<path>.corrupt` (or `.corrupt.N`) and loading continues with `Ok(None)`,
/// so the next save never overwrites it.
fn load_json<T: DeserializeOwned>(path: &Path, policy: LoadPolicy) -> Result<Option<T>, StoreError> {
    let raw = match fs::read_to_string(path) {
        Ok(raw) => raw,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
        Err(source) => {
            let err = StoreError::Read {
                path: path.to_path_buf(),
                source,
            };
            return degrade(path, err, policy);
        }
    };
    match serde_json::from_str(&raw) {
        Ok(value) => Ok(Some(value)),
        Err(source) => degrade(
            path,
            StoreError::Corrupt {
                path: path.to_path_buf(),
                source,
            },
            policy,
        ),
    }
}

fn degrade<T>(path: &Path, err: StoreError, policy: LoadPolicy) -> Result<Option<T>, StoreError> {
    match policy {
        LoadPolicy::Strict => Err(err),
        LoadPolicy::Lenient => {
            let aside = set_aside(path)?;
            warn!("{}; moved to {}, starting empty", err, aside.display());
            Ok(None)
        }
    }
}

/// Rename `path` to the first free `<path>.corrupt[.N]`.
fn set_aside(path: &Path) -> Result<PathBuf, StoreError> {
    let candidate = |n: u32| {
        let mut name = path.as_os_str().to_owned();
        name.push(".corrupt");
        if n > 0 {
            name.push(format!(".{}", n));
        }
        PathBuf::from(name)
    };
    let mut n = 0;
    let mut target = candidate(n);
    while target.exists() {
        n += 1;
        target = candidate(n);
    }
    fs::rename(path, &target).map_err(|source| StoreError::SetAside {
        path: path.to_path_buf(),
        source,
    })?;
    Ok(target)
}

/// Write the whole document next to `path` and rename it into place.
fn save_json<T: Serialize + ?Sized>(path: &Path, value: &T) -> Result<(), StoreError> {
    let body = serde_json::to_string_pretty(value).map_err(|source| StoreError::Encode {
        path: path.to_path_buf(),
        source,
    })?;
    let write_err = |source: io::Error| StoreError::Write {
        path: path.to_path_buf(),
        source,
    };
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent).map_err(write_err)?;
    }
    let mut tmp = path.as_os_str().to_owned();
    tmp.push(".tmp");
    let tmp = PathBuf::from(tmp);
    fs::write(&tmp, body).map_err(write_err)?;
    fs::rename(&tmp, path).map_err(write_err)?;
    Ok(())
}
