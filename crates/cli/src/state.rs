//! The local state file standing in for the store, index and orchestrator.
//!
//! ```json
//! {
//!   "primary": [ { "recordType": "execution", "arn": "...", ... } ],
//!   "index": [ { "index": "cirrus", "id": { "docType": "execution", "id": "..." }, "body": { ... } } ],
//!   "orchestrator": [ { "arn": "...", "status": "running" } ]
//! }
//! ```
//!
//! A missing file is an empty state. Every section is optional.

use std::path::Path;
use std::sync::Arc;

use cirrus_index::{IndexDocument, MemoryIndex};
use cirrus_ops::{ExecutionDescription, MemoryOrchestrator};
use cirrus_storage::{MemoryStore, Record};
use serde::{Deserialize, Serialize};

#[derive(Debug, Default, Serialize, Deserialize)]
#[serde(default)]
struct StateFile {
    primary: Vec<Record>,
    index: Vec<IndexDocument>,
    orchestrator: Vec<ExecutionDescription>,
}

pub(crate) struct LocalState {
    pub(crate) store: Arc<MemoryStore>,
    pub(crate) index: Arc<MemoryIndex>,
    pub(crate) orchestrator: Arc<MemoryOrchestrator>,
}

impl LocalState {
    pub(crate) fn load(path: &Path) -> Result<Self, String> {
        let file = if path.exists() {
            let raw = std::fs::read_to_string(path)
                .map_err(|e| format!("error reading state '{}': {}", path.display(), e))?;
            serde_json::from_str(&raw)
                .map_err(|e| format!("error parsing state '{}': {}", path.display(), e))?
        } else {
            StateFile::default()
        };
        tracing::debug!(
            path = %path.display(),
            records = file.primary.len(),
            documents = file.index.len(),
            "loaded state"
        );
        Ok(LocalState {
            store: Arc::new(MemoryStore::from_records(file.primary)),
            index: Arc::new(MemoryIndex::from_documents(file.index)),
            orchestrator: Arc::new(MemoryOrchestrator::from_descriptions(file.orchestrator)),
        })
    }

    pub(crate) fn save(&self, path: &Path) -> Result<(), String> {
        let file = StateFile {
            primary: self.store.records(),
            index: self.index.documents(),
            orchestrator: self.orchestrator.descriptions(),
        };
        let json = serde_json::to_string_pretty(&file)
            .map_err(|e| format!("error serializing state: {}", e))?;
        std::fs::write(path, json)
            .map_err(|e| format!("error writing state '{}': {}", path.display(), e))
    }
}
