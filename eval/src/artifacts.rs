// SPDX-License-Identifier: AGPL-3.0-or-later
// SPDX-FileCopyrightText: 2024 Hyperpolymath

//! Artifact persistence between the partition and evaluation stages
//!
//! Every `(run, technique, fold, axis)` sub-dataset is stored as two files:
//! `<key>.bsi` holds the attribute table and `<key>.labels` the label
//! metadata. Each file is a bincode envelope carrying a SHA-256 checksum of
//! its payload, so a damaged artifact fails to load instead of loading wrong.

use crate::datasets::{Instances, LabelMetadata, MultiLabelDataset};
use crate::enumerator::Technique;
use crate::error::{PipelineError, Result};
use crate::partition::Axis;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt;
use std::path::{Path, PathBuf};

const MAGIC: [u8; 4] = *b"AXEV";
const FORMAT_VERSION: u16 = 1;

/// Identifies one stored sub-dataset
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ArtifactKey {
    pub run_id: String,
    pub technique: Technique,
    pub fold: usize,
    pub axis: Axis,
}

impl ArtifactKey {
    pub fn new(run_id: impl Into<String>, technique: Technique, fold: usize, axis: Axis) -> Self {
        Self {
            run_id: run_id.into(),
            technique,
            fold,
            axis,
        }
    }

    /// File stem shared by the artifact pair and the fold's reports
    pub fn stem(&self) -> String {
        format!("{}-{}-Sub{}-{}", self.run_id, self.technique, self.fold, self.axis)
    }

    /// Same run, technique and axis on another fold
    pub fn with_fold(&self, fold: usize) -> Self {
        Self {
            fold,
            ..self.clone()
        }
    }
}

impl fmt::Display for ArtifactKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.stem())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
enum PayloadKind {
    Dataset,
    Labels,
}

#[derive(Debug, Serialize, Deserialize)]
struct Envelope {
    magic: [u8; 4],
    version: u16,
    kind: PayloadKind,
    checksum: String,
    payload: Vec<u8>,
}

/// File-system store for artifact pairs
#[derive(Debug, Clone)]
pub struct ArtifactStore {
    root: PathBuf,
}

impl ArtifactStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn dataset_path(&self, key: &ArtifactKey) -> PathBuf {
        self.root.join(format!("{}.bsi", key.stem()))
    }

    pub fn labels_path(&self, key: &ArtifactKey) -> PathBuf {
        self.root.join(format!("{}.labels", key.stem()))
    }

    pub fn exists(&self, key: &ArtifactKey) -> bool {
        self.dataset_path(key).is_file() && self.labels_path(key).is_file()
    }

    /// Write both halves of an artifact, replacing any previous pair
    pub fn store(&self, key: &ArtifactKey, instances: &Instances, labels: &LabelMetadata) -> Result<()> {
        std::fs::create_dir_all(&self.root).map_err(|e| PipelineError::io(&self.root, e))?;

        tracing::info!("Serializing samples for {}", key);
        write_envelope(&self.dataset_path(key), PayloadKind::Dataset, instances)?;

        tracing::info!("Serializing label structure for {}", key);
        write_envelope(&self.labels_path(key), PayloadKind::Labels, labels)?;

        Ok(())
    }

    pub fn store_dataset(&self, key: &ArtifactKey, dataset: &MultiLabelDataset) -> Result<()> {
        self.store(key, dataset.instances(), dataset.labels())
    }

    /// Read both halves of an artifact exactly as stored
    pub fn load(&self, key: &ArtifactKey) -> Result<(Instances, LabelMetadata)> {
        tracing::info!("Deserializing instances from {}", key);
        let instances = read_envelope(&self.dataset_path(key), PayloadKind::Dataset)?;

        tracing::info!("Deserializing label structure for {}", key);
        let labels = read_envelope(&self.labels_path(key), PayloadKind::Labels)?;

        Ok((instances, labels))
    }

    /// Load an artifact and rebuild the multi-label dataset from it
    pub fn load_dataset(&self, key: &ArtifactKey) -> Result<MultiLabelDataset> {
        let (instances, labels) = self.load(key)?;
        MultiLabelDataset::new(instances, labels)
    }
}

fn checksum(payload: &[u8]) -> String {
    hex::encode(Sha256::digest(payload))
}

fn write_envelope<T: Serialize>(path: &Path, kind: PayloadKind, value: &T) -> Result<()> {
    let payload = bincode::serialize(value)
        .map_err(|e| PipelineError::io_message(path, format!("failed to encode payload: {}", e)))?;

    let envelope = Envelope {
        magic: MAGIC,
        version: FORMAT_VERSION,
        kind,
        checksum: checksum(&payload),
        payload,
    };
    let bytes = bincode::serialize(&envelope)
        .map_err(|e| PipelineError::io_message(path, format!("failed to encode envelope: {}", e)))?;

    std::fs::write(path, bytes).map_err(|e| PipelineError::io(path, e))
}

fn read_envelope<T: DeserializeOwned>(path: &Path, kind: PayloadKind) -> Result<T> {
    let bytes = std::fs::read(path).map_err(|e| PipelineError::io(path, e))?;

    let envelope: Envelope = bincode::deserialize(&bytes).map_err(|e| {
        PipelineError::format(format!("{}: unreadable artifact: {}", path.display(), e))
    })?;

    if envelope.magic != MAGIC || envelope.version != FORMAT_VERSION {
        return Err(PipelineError::format(format!(
            "{}: not an artifact of format version {}",
            path.display(),
            FORMAT_VERSION
        )));
    }
    if envelope.kind != kind {
        return Err(PipelineError::format(format!(
            "{}: expected {:?} payload, found {:?}",
            path.display(),
            kind,
            envelope.kind
        )));
    }
    let actual = checksum(&envelope.payload);
    if actual != envelope.checksum {
        return Err(PipelineError::format(format!(
            "{}: checksum mismatch (expected {}, got {})",
            path.display(),
            envelope.checksum,
            actual
        )));
    }

    bincode::deserialize(&envelope.payload).map_err(|e| {
        PipelineError::format(format!("{}: undecodable payload: {}", path.display(), e))
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::datasets::SyntheticConfig;

    fn key(fold: usize) -> ArtifactKey {
        ArtifactKey::new("run1", Technique::Ehd, fold, Axis::new("T"))
    }

    #[test]
    fn test_key_stem() {
        assert_eq!(key(3).stem(), "run1-Ehd-Sub3-T");
        assert_eq!(key(0).with_fold(9).to_string(), "run1-Ehd-Sub9-T");
    }

    #[test]
    fn test_round_trip_is_exact() {
        let dir = tempfile::tempdir().unwrap();
        let store = ArtifactStore::new(dir.path());
        let dataset = MultiLabelDataset::synthetic(&SyntheticConfig::default(), 11).unwrap();

        store.store_dataset(&key(0), &dataset).unwrap();
        assert!(store.exists(&key(0)));

        let (instances, labels) = store.load(&key(0)).unwrap();
        assert_eq!(&instances, dataset.instances());
        assert_eq!(&labels, dataset.labels());

        // Bit-exact feature values
        for (a, b) in instances.rows().iter().zip(dataset.instances().rows()) {
            let a: Vec<u64> = a.iter().map(|v| v.to_bits()).collect();
            let b: Vec<u64> = b.iter().map(|v| v.to_bits()).collect();
            assert_eq!(a, b);
        }

        assert_eq!(store.load_dataset(&key(0)).unwrap(), dataset);
    }

    #[test]
    fn test_store_overwrites() {
        let dir = tempfile::tempdir().unwrap();
        let store = ArtifactStore::new(dir.path().join("nested"));
        let first = MultiLabelDataset::synthetic(&SyntheticConfig::default(), 1).unwrap();
        let second = MultiLabelDataset::synthetic(&SyntheticConfig::default(), 2).unwrap();

        store.store_dataset(&key(1), &first).unwrap();
        store.store_dataset(&key(1), &second).unwrap();
        assert_eq!(store.load_dataset(&key(1)).unwrap(), second);
    }

    #[test]
    fn test_missing_artifact_is_io_error() {
        let dir = tempfile::tempdir().unwrap();
        let store = ArtifactStore::new(dir.path());
        assert!(!store.exists(&key(5)));
        assert_eq!(store.load(&key(5)).unwrap_err().kind(), "IOError");
    }

    #[test]
    fn test_corrupted_labels_payload_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let store = ArtifactStore::new(dir.path());
        let dataset = MultiLabelDataset::synthetic(&SyntheticConfig::default(), 5).unwrap();
        store.store_dataset(&key(0), &dataset).unwrap();

        let path = store.labels_path(&key(0));
        let mut bytes = std::fs::read(&path).unwrap();
        let last = bytes.len() - 1;
        bytes[last] ^= 0xFF;
        std::fs::write(&path, &bytes).unwrap();

        let err = store.load(&key(0)).unwrap_err();
        assert!(matches!(err.kind(), "FormatError" | "IOError"));
    }

    #[test]
    fn test_truncated_dataset_payload_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let store = ArtifactStore::new(dir.path());
        let dataset = MultiLabelDataset::synthetic(&SyntheticConfig::default(), 5).unwrap();
        store.store_dataset(&key(0), &dataset).unwrap();

        let path = store.dataset_path(&key(0));
        let bytes = std::fs::read(&path).unwrap();
        std::fs::write(&path, &bytes[..bytes.len() / 2]).unwrap();

        assert!(store.load(&key(0)).is_err());
    }

    #[test]
    fn test_swapped_halves_are_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let store = ArtifactStore::new(dir.path());
        let dataset = MultiLabelDataset::synthetic(&SyntheticConfig::default(), 5).unwrap();
        store.store_dataset(&key(0), &dataset).unwrap();

        std::fs::copy(store.dataset_path(&key(0)), store.labels_path(&key(0))).unwrap();
        assert_eq!(store.load(&key(0)).unwrap_err().kind(), "FormatError");
    }
}
