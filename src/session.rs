use std::collections::{HashMap, HashSet};
use std::path::Path;
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};

use serde::{Deserialize, Serialize};

use crate::backend::{path_to_uri, scan_audio_files};
use crate::error::{GainError, Result};
use crate::media::{MediaId, MediaStore, VolumeControl, UNITY_VOLUME};
use crate::models::AnalysisRequest;

/// Serialized form of one media entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EntryRecord {
    pub id: MediaId,
    /// Source file; live inputs have none and are never analyzed.
    #[serde(default)]
    pub uri: Option<String>,
    /// Linear volume; `None` when the entry has no volume element.
    #[serde(default)]
    pub volume: Option<f64>,
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct SessionFile {
    entries: Vec<EntryRecord>,
}

#[derive(Debug)]
struct SessionEntry {
    id: MediaId,
    uri: Option<String>,
    volume: Option<Arc<VolumeControl>>,
}

/// JSON-backed media entry store.
#[derive(Debug, Default)]
pub struct Session {
    entries: RwLock<Vec<SessionEntry>>,
}

impl Session {
    pub fn from_records(records: Vec<EntryRecord>) -> Self {
        let entries = records
            .into_iter()
            .map(|r| SessionEntry {
                id: r.id,
                uri: r.uri,
                volume: r.volume.map(|v| Arc::new(VolumeControl::new(v))),
            })
            .collect();
        Self {
            entries: RwLock::new(entries),
        }
    }

    /// Load a session from a JSON file.
    pub fn load(path: &Path) -> Result<Self> {
        let data = std::fs::read_to_string(path).map_err(|e| {
            GainError::Session(format!("failed to read {}: {}", path.display(), e))
        })?;
        let file: SessionFile = serde_json::from_str(&data)?;
        let duplicate = {
            let mut ids = HashSet::new();
            file.entries
                .iter()
                .find(|r| !ids.insert(r.id.as_str()))
                .map(|r| r.id.clone())
        };
        if let Some(id) = duplicate {
            return Err(GainError::Session(format!(
                "duplicate entry id '{}' in {}",
                id,
                path.display()
            )));
        }
        Ok(Self::from_records(file.entries))
    }

    /// Save the session, with current volumes, as pretty-printed JSON.
    pub fn save(&self, path: &Path) -> Result<()> {
        let file = SessionFile {
            entries: self.records(),
        };
        let json = serde_json::to_string_pretty(&file)?;
        std::fs::write(path, json)?;
        Ok(())
    }

    /// Build a session with one unity-volume entry per audio file in `dir`.
    ///
    /// Ids are file stems; files sharing a stem get `-2`, `-3`, ... suffixes.
    pub fn from_directory(dir: &Path) -> Result<Self> {
        let files = scan_audio_files(dir);
        if files.is_empty() {
            return Err(GainError::Session(format!(
                "No audio files found in {}",
                dir.display()
            )));
        }
        let mut taken = HashSet::new();
        let records = files
            .iter()
            .map(|path| {
                let stem = path
                    .file_stem()
                    .and_then(|s| s.to_str())
                    .unwrap_or("entry");
                let mut id = stem.to_string();
                let mut n = 2;
                while !taken.insert(id.clone()) {
                    id = format!("{}-{}", stem, n);
                    n += 1;
                }
                Ok(EntryRecord {
                    id,
                    uri: Some(path_to_uri(path)?),
                    volume: Some(UNITY_VOLUME),
                })
            })
            .collect::<Result<Vec<_>>>()?;
        Ok(Self::from_records(records))
    }

    /// Snapshot of all entries with their live volumes.
    pub fn records(&self) -> Vec<EntryRecord> {
        self.read()
            .iter()
            .map(|e| EntryRecord {
                id: e.id.clone(),
                uri: e.uri.clone(),
                volume: e.volume.as_ref().map(|v| v.get()),
            })
            .collect()
    }

    pub fn len(&self) -> usize {
        self.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.read().is_empty()
    }

    /// Ids of the entries selected by `only`, or of every entry when `only` is empty.
    pub fn entry_ids(&self, only: &[MediaId]) -> Vec<MediaId> {
        self.read()
            .iter()
            .filter(|e| only.is_empty() || only.contains(&e.id))
            .map(|e| e.id.clone())
            .collect()
    }

    /// Group the selected entries by source file, one request per distinct URI.
    ///
    /// Requests keep the order in which their URI first appears.
    pub fn requests(&self, reference_level: f64, only: &[MediaId]) -> Vec<AnalysisRequest> {
        let mut requests: Vec<AnalysisRequest> = Vec::new();
        let mut by_uri: HashMap<String, usize> = HashMap::new();

        for entry in self.read().iter() {
            if !only.is_empty() && !only.contains(&entry.id) {
                continue;
            }
            let Some(uri) = entry.uri.as_ref() else {
                continue;
            };
            match by_uri.get(uri) {
                Some(&idx) => requests[idx].entries.push(entry.id.clone()),
                None => {
                    by_uri.insert(uri.clone(), requests.len());
                    requests.push(AnalysisRequest {
                        uri: uri.clone(),
                        reference_level,
                        entries: vec![entry.id.clone()],
                    });
                }
            }
        }

        requests
    }

    pub fn volume_of(&self, id: &str) -> Option<f64> {
        self.volume_control(id).map(|v| v.get())
    }

    /// Drop an entry. Actions still referencing it will skip it.
    pub fn remove(&self, id: &str) -> bool {
        let mut entries = self.write();
        let before = entries.len();
        entries.retain(|e| e.id != id);
        entries.len() != before
    }

    fn read(&self) -> RwLockReadGuard<'_, Vec<SessionEntry>> {
        self.entries.read().unwrap_or_else(|e| e.into_inner())
    }

    fn write(&self) -> RwLockWriteGuard<'_, Vec<SessionEntry>> {
        self.entries.write().unwrap_or_else(|e| e.into_inner())
    }
}

impl MediaStore for Session {
    fn volume_control(&self, id: &str) -> Option<Arc<VolumeControl>> {
        self.read()
            .iter()
            .find(|e| e.id == id)
            .and_then(|e| e.volume.clone())
    }
}
