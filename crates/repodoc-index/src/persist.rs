//! On-disk index layout.
//!
//! A saved index is a directory holding a raw vector blob, a JSON chunk mapping
//! and a manifest that pins both by blake3 digest. The manifest is written
//! last, so a directory with a missing or stale manifest never restores.

use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::chunk::Chunk;
use crate::embedding::{DistanceMetric, EmbeddingIndex};
use crate::error::{IndexError, Result};

pub const MANIFEST_FILE: &str = "manifest.json";
pub const VECTORS_FILE: &str = "vectors.bin";
pub const DOCUMENTS_FILE: &str = "documents.json";

const FORMAT_VERSION: u32 = 1;

#[derive(Debug, Serialize, Deserialize)]
pub(crate) struct Mapping {
    pub documents: BTreeMap<String, Chunk>,
    pub id_to_slot: BTreeMap<String, usize>,
}

#[derive(Debug, Serialize, Deserialize)]
struct Artifact {
    file: String,
    blake3: String,
    bytes: u64,
}

#[derive(Debug, Serialize, Deserialize)]
struct Manifest {
    format_version: u32,
    model: String,
    dimension: usize,
    metric: DistanceMetric,
    count: usize,
    vectors: Artifact,
    documents: Artifact,
}

/// Verified contents of a saved index, with slot order recovered.
pub(crate) struct Snapshot {
    pub model: String,
    pub vectors: EmbeddingIndex,
    pub slots: Vec<String>,
    pub documents: BTreeMap<String, Chunk>,
}

fn write_atomic(dir: &Path, name: &str, bytes: &[u8]) -> Result<Artifact> {
    let tmp = dir.join(format!("{name}.tmp"));
    fs::write(&tmp, bytes)?;
    fs::rename(&tmp, dir.join(name))?;
    Ok(Artifact {
        file: name.to_owned(),
        blake3: blake3::hash(bytes).to_hex().to_string(),
        bytes: bytes.len() as u64,
    })
}

pub(crate) fn write(
    dir: &Path,
    model: &str,
    vectors: &EmbeddingIndex,
    mapping: &Mapping,
) -> Result<()> {
    fs::create_dir_all(dir)?;
    let vectors_artifact = write_atomic(dir, VECTORS_FILE, &vectors.to_bytes())?;
    let documents_artifact = write_atomic(dir, DOCUMENTS_FILE, &serde_json::to_vec(mapping)?)?;

    let manifest = Manifest {
        format_version: FORMAT_VERSION,
        model: model.to_owned(),
        dimension: vectors.dimension(),
        metric: vectors.metric(),
        count: vectors.len(),
        vectors: vectors_artifact,
        documents: documents_artifact,
    };
    write_atomic(dir, MANIFEST_FILE, &serde_json::to_vec_pretty(&manifest)?)?;
    Ok(())
}

fn read_verified(dir: &Path, artifact: &Artifact) -> Result<Vec<u8>> {
    let bytes = fs::read(dir.join(&artifact.file))?;
    let digest = blake3::hash(&bytes).to_hex();
    if digest.as_str() != artifact.blake3 {
        return Err(IndexError::Consistency(format!(
            "{} does not match the manifest digest",
            artifact.file
        )));
    }
    Ok(bytes)
}

pub(crate) fn read(dir: &Path, expected_dimension: usize) -> Result<Snapshot> {
    let manifest_path = dir.join(MANIFEST_FILE);
    if !manifest_path.exists() {
        return Err(IndexError::Consistency(format!(
            "no index manifest at {}",
            manifest_path.display()
        )));
    }
    let manifest: Manifest = serde_json::from_slice(&fs::read(&manifest_path)?)?;

    if manifest.format_version != FORMAT_VERSION {
        return Err(IndexError::Consistency(format!(
            "unsupported index format version {}",
            manifest.format_version
        )));
    }
    if manifest.dimension != expected_dimension {
        return Err(IndexError::Consistency(format!(
            "saved index has dimension {}, store is configured for {expected_dimension}",
            manifest.dimension
        )));
    }

    let vectors = EmbeddingIndex::from_bytes(
        manifest.dimension,
        manifest.metric,
        &read_verified(dir, &manifest.vectors)?,
    )?;
    let mapping: Mapping = serde_json::from_slice(&read_verified(dir, &manifest.documents)?)?;

    let count = manifest.count;
    if vectors.len() != count
        || mapping.documents.len() != count
        || mapping.id_to_slot.len() != count
    {
        return Err(IndexError::Consistency(format!(
            "manifest count {count} disagrees with {} vectors, {} documents, {} slots",
            vectors.len(),
            mapping.documents.len(),
            mapping.id_to_slot.len()
        )));
    }

    let mut slots: Vec<Option<String>> = vec![None; count];
    for (id, &slot) in &mapping.id_to_slot {
        let entry = slots.get_mut(slot).ok_or_else(|| {
            IndexError::Consistency(format!("chunk {id:?} has out-of-range slot {slot}"))
        })?;
        if entry.is_some() {
            return Err(IndexError::Consistency(format!("slot {slot} is assigned twice")));
        }
        match mapping.documents.get(id) {
            Some(chunk) if chunk.id == *id => {}
            _ => {
                return Err(IndexError::Consistency(format!(
                    "slot mapping names chunk {id:?} which is not stored"
                )));
            }
        }
        *entry = Some(id.clone());
    }
    // Every slot is filled: count entries were placed without collision.
    let slots = slots.into_iter().flatten().collect();

    Ok(Snapshot {
        model: manifest.model,
        vectors,
        slots,
        documents: mapping.documents,
    })
}
