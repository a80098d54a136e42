use std::collections::BTreeSet;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::debug;

use super::{load_json, save_json, LoadPolicy, StoreError};
use crate::catalog::ItemId;

#[derive(Debug, Deserialize)]
struct CheckpointFile {
    processed_ids: BTreeSet<ItemId>,
}

/// Ids of items that reached a terminal outcome. Persisted after every change.
#[derive(Debug)]
pub struct CheckpointStore {
    path: PathBuf,
    processed: BTreeSet<ItemId>,
}

impl CheckpointStore {
    pub fn open(path: impl Into<PathBuf>, policy: LoadPolicy) -> Result<Self, StoreError> {
        let path = path.into();
        let processed = load_json::<CheckpointFile>(&path, policy)?
            .map(|f| f.processed_ids)
            .unwrap_or_default();
        debug!("Loaded {} checkpointed items from {}", processed.len(), path.display());
        Ok(Self { path, processed })
    }

    pub fn is_processed(&self, id: ItemId) -> bool {
        self.processed.contains(&id)
    }

    /// Record `id` and write the full set back before returning.
    pub fn mark_processed(&mut self, id: ItemId) -> Result<(), StoreError> {
        self.processed.insert(id);
        self.save()
    }

    pub fn len(&self) -> usize {
        self.processed.len()
    }

    pub fn is_empty(&self) -> bool {
        self.processed.is_empty()
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn save(&self) -> Result<(), StoreError> {
        #[derive(Serialize)]
        struct Borrowed<'a> {
            processed_ids: &'a BTreeSet<ItemId>,
        }
        save_json(
            &self.path,
            &Borrowed {
                processed_ids: &self.processed,
            },
        )
    }
}
