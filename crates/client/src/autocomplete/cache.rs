// On-disk completion index: a JSON object of scopes plus `last_update`
// (epoch seconds), replaced atomically through a `~` sibling file.

use std::collections::BTreeMap;
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use chrono::{DateTime, TimeDelta, Utc};
use serde::{Deserialize, Serialize};

use super::index::CompletionIndex;
use crate::error::CacheError;

const LAST_UPDATE_KEY: &str = "last_update";

#[derive(Debug, Serialize, Deserialize)]
struct CacheFile {
    last_update: i64,
    #[serde(flatten)]
    scopes: BTreeMap<String, Vec<String>>,
}

/// A cache file as read from disk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Snapshot {
    pub index: CompletionIndex,
    pub last_update: i64,
}

impl Snapshot {
    pub fn is_fresh(&self, now: DateTime<Utc>, max_age: TimeDelta) -> bool {
        now.timestamp() - self.last_update <= max_age.num_seconds()
    }
}

/// Read the cache. A missing file is `Ok(None)`.
pub fn read(path: &Path) -> Result<Option<Snapshot>, CacheError> {
    let text = match fs::read_to_string(path) {
        Ok(text) => text,
        Err(error) if error.kind() == ErrorKind::NotFound => return Ok(None),
        Err(error) => return Err(error.into()),
    };
    let file: CacheFile = serde_json::from_str(&text)?;
    Ok(Some(Snapshot { index: file.scopes.into(), last_update: file.last_update }))
}

pub fn write(path: &Path, index: &CompletionIndex, now: DateTime<Utc>) -> Result<(), CacheError> {
    if let Some(parent) = path.parent().filter(|parent| !parent.as_os_str().is_empty()) {
        fs::create_dir_all(parent)?;
    }
    // A scope named like the timestamp key would shadow it on the next read.
    let scopes = index
        .scopes()
        .iter()
        .filter(|(name, _)| name.as_str() != LAST_UPDATE_KEY)
        .map(|(name, properties)| (name.clone(), properties.clone()))
        .collect();
    let file = CacheFile { last_update: now.timestamp(), scopes };
    let staging = staging_path(path);
    fs::write(&staging, serde_json::to_vec(&file)?)?;
    fs::rename(&staging, path)?;
    Ok(())
}

fn staging_path(path: &Path) -> PathBuf {
    let mut name = path.as_os_str().to_owned();
    name.push("~");
    PathBuf::from(name)
}
