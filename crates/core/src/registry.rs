use std::collections::HashSet;
use std::fs::{self, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard, PoisonError};

use thiserror::Error;

#[derive(Debug, Error)]
pub enum RegistryError {
    #[error("could not read submission registry `{path}`: {source}")]
    Load { path: PathBuf, source: io::Error },
    #[error("could not append to submission registry `{path}`: {source}")]
    Append { path: PathBuf, source: io::Error },
    #[error("user id `{0:?}` cannot be stored (empty or contains a line break)")]
    InvalidUserId(String),
}

/// Users who have already submitted a name.
///
/// Backed by an append-only text file with one user id per line. The whole
/// file is read once by [`SubmissionRegistry::load`]; afterwards every first
/// submission appends a single line.
#[derive(Debug)]
pub struct SubmissionRegistry {
    path: PathBuf,
    users: Mutex<HashSet<String>>,
}

impl SubmissionRegistry {
    /// A missing store yields an empty registry; the file is created on the first `record`.
    pub fn load(path: impl Into<PathBuf>) -> Result<Self, RegistryError> {
        let path = path.into();
        let users = match fs::read_to_string(&path) {
            Ok(raw) => parse_store(&raw),
            Err(source) if source.kind() == io::ErrorKind::NotFound => HashSet::new(),
            Err(source) => return Err(RegistryError::Load { path, source }),
        };

        Ok(Self { path, users: Mutex::new(users) })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn has(&self, user_id: &str) -> bool {
        self.users().contains(user_id)
    }

    pub fn len(&self) -> usize {
        self.users().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Persists `user_id` and then marks it in memory.
    ///
    /// Returns `Ok(false)` without touching the store when the id is already
    /// present. A failed append leaves the in-memory set unchanged.
    pub fn record(&self, user_id: &str) -> Result<bool, RegistryError> {
        if user_id.trim().is_empty() || user_id.contains(['\n', '\r']) {
            return Err(RegistryError::InvalidUserId(user_id.to_owned()));
        }

        let mut users = self.users();
        if users.contains(user_id) {
            return Ok(false);
        }

        self.append_line(user_id)
            .map_err(|source| RegistryError::Append { path: self.path.clone(), source })?;
        users.insert(user_id.to_owned());
        Ok(true)
    }

    fn append_line(&self, user_id: &str) -> io::Result<()> {
        let mut file = OpenOptions::new().create(true).append(true).open(&self.path)?;
        file.write_all(format!("{user_id}\n").as_bytes())?;
        file.sync_data()
    }

    fn users(&self) -> MutexGuard<'_, HashSet<String>> {
        self.users.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

fn parse_store(raw: &str) -> HashSet<String> {
    raw.lines().map(str::trim).filter(|line| !line.is_empty()).map(str::to_owned).collect()
}
