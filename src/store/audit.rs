use std::path::{Path, PathBuf};

use chrono::{DateTime, NaiveDateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use tracing::debug;

use super::{load_json, save_json, LoadPolicy, StoreError};
use crate::catalog::ItemId;

/// One applied update, as written to the platform.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditEntry {
    pub item_id: ItemId,
    pub previous_title: String,
    pub new_title: String,
    pub new_slug: String,
    pub seo_title: String,
    pub previous_description: String,
    pub new_description: String,
    #[serde(deserialize_with = "timestamp")]
    pub updated_at: DateTime<Utc>,
}

/// RFC 3339, or a bare `YYYY-MM-DDTHH:MM:SS[.ffffff]` read as UTC. Older logs
/// carry the bare form.
fn timestamp<'de, D: Deserializer<'de>>(deserializer: D) -> Result<DateTime<Utc>, D::Error> {
    let raw = String::deserialize(deserializer)?;
    if let Ok(ts) = DateTime::parse_from_rfc3339(&raw) {
        return Ok(ts.with_timezone(&Utc));
    }
    raw.parse::<NaiveDateTime>()
        .map(|naive| naive.and_utc())
        .map_err(|e| serde::de::Error::custom(format!("bad timestamp {:?}: {}", raw, e)))
}

/// Append-only change history. Entries are never edited or removed.
#[derive(Debug)]
pub struct AuditLog {
    path: PathBuf,
    entries: Vec<AuditEntry>,
}

impl AuditLog {
    pub fn open(path: impl Into<PathBuf>, policy: LoadPolicy) -> Result<Self, StoreError> {
        let path = path.into();
        let entries: Vec<AuditEntry> = load_json(&path, policy)?.unwrap_or_default();
        debug!("Loaded {} audit entries from {}", entries.len(), path.display());
        Ok(Self { path, entries })
    }

    pub fn record(&mut self, entry: AuditEntry) -> Result<(), StoreError> {
        self.entries.push(entry);
        save_json(&self.path, &self.entries)
    }

    pub fn entries(&self) -> &[AuditEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}
