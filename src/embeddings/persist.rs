//! Directory layout for saved indexes.
//!
//! | File             | Contents                                        |
//! |------------------|-------------------------------------------------|
//! | `config.json`    | manifest: format version, config, counts, times |
//! | `ids.bin`        | id map and row counter                          |
//! | `embeddings.vec` | index vectors (memory-mapped on load)           |
//! | `ivf.bin`        | IVF centroids, IVF backend only                 |
//! | `documents.bin`  | content rows, content storage only              |
//! | `model.bin`      | scoring statistics and PCA components           |
//!
//! The manifest is written last. Loading decodes and cross-checks every
//! artifact before any in-memory state is replaced.

use std::path::Path;

use bincode::{Decode, Encode};
use chrono::Utc;
use serde::{Deserialize, Serialize};

use super::Embeddings;
use super::ids::{IDS_FILE, IdMap};
use crate::ann::{self, VECTORS_FILE};
use crate::config::EmbeddingsConfig;
use crate::database::{Capabilities, ContentDatabase, DOCUMENTS_FILE, Database, NoopDatabase};
use crate::error::{EmbeddingsError, EmbeddingsResult, ErrorContext};
use crate::scoring::ScoringModel;
use crate::vector::VectorModel;
use crate::vector::pca::Pca;

/// Manifest file name.
pub const MANIFEST_FILE: &str = "config.json";

/// Scoring statistics and PCA file name.
pub const MODEL_FILE: &str = "model.bin";

/// Current format version of the saved directory.
const FORMAT_VERSION: u32 = 1;

/// Describes a saved index.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Manifest {
    /// Version of the directory format
    pub version: u32,

    /// Configuration the index was built with
    pub config: EmbeddingsConfig,

    /// Vector dimension
    pub dimension: usize,

    /// Live documents
    pub count: usize,

    /// Next row id to be assigned
    pub next_row: u32,

    /// Whether `model.bin` was written
    pub model: bool,

    /// Unix timestamp of the first index build
    pub created_at: u64,

    /// Unix timestamp of this save
    pub updated_at: u64,
}

impl Manifest {
    pub fn read(dir: &Path) -> EmbeddingsResult<Self> {
        let path = dir.join(MANIFEST_FILE);
        let json = std::fs::read_to_string(&path).load_context(&path)?;
        let manifest: Self = serde_json::from_str(&json).load_context(&path)?;

        if manifest.version > FORMAT_VERSION {
            return Err(EmbeddingsError::Storage {
                path,
                reason: format!(
                    "format version {} is newer than supported version {FORMAT_VERSION}",
                    manifest.version
                ),
            });
        }
        Ok(manifest)
    }

    fn write(&self, dir: &Path) -> EmbeddingsResult<()> {
        let path = dir.join(MANIFEST_FILE);
        let json = serde_json::to_string_pretty(self).save_context(&path)?;
        std::fs::write(&path, json).save_context(&path)
    }
}

/// Contents of `model.bin`.
#[derive(Encode, Decode)]
struct ModelFile {
    scoring: Option<ScoringModel>,
    pca: Option<Pca>,
}

/// Current Unix timestamp.
pub fn timestamp() -> u64 {
    Utc::now().timestamp() as u64
}

pub(super) fn save(embeddings: &Embeddings, dir: &Path) -> EmbeddingsResult<()> {
    std::fs::create_dir_all(dir).map_err(|source| EmbeddingsError::FileWrite {
        path: dir.to_path_buf(),
        source,
    })?;

    embeddings
        .ann
        .save(dir)
        .save_context(&dir.join(VECTORS_FILE))?;
    embeddings.ids.save(&dir.join(IDS_FILE))?;

    if embeddings.database.capabilities().contains(Capabilities::PERSIST) {
        embeddings
            .database
            .save(dir)
            .save_context(&dir.join(DOCUMENTS_FILE))?;
    }

    let scoring = embeddings.model.scoring();
    let model = ModelFile {
        scoring: scoring.is_fit().then(|| scoring.clone()),
        pca: embeddings.model.pca().cloned(),
    };
    let has_model = model.scoring.is_some() || model.pca.is_some();
    if has_model {
        let path = dir.join(MODEL_FILE);
        let bytes = bincode::encode_to_vec(&model, bincode::config::standard()).save_context(&path)?;
        std::fs::write(&path, bytes).save_context(&path)?;
    }

    Manifest {
        version: FORMAT_VERSION,
        config: embeddings.config.clone(),
        dimension: embeddings.ann.dimension().get(),
        count: embeddings.ann.count(),
        next_row: embeddings.ids.next_row(),
        model: has_model,
        created_at: embeddings.created_at,
        updated_at: timestamp(),
    }
    .write(dir)?;

    tracing::info!(
        "saved {} documents to {}",
        embeddings.ann.count(),
        dir.display()
    );
    Ok(())
}

pub(super) fn load(embeddings: &mut Embeddings, dir: &Path) -> EmbeddingsResult<()> {
    let manifest = Manifest::read(dir)?;
    let config = manifest.config.clone();
    config.validate()?;

    let storage_error = |file: &str, reason: String| EmbeddingsError::Storage {
        path: dir.join(file),
        reason,
    };

    let ids = IdMap::load(&dir.join(IDS_FILE))?;
    if ids.next_row() != manifest.next_row {
        return Err(storage_error(
            IDS_FILE,
            format!("row counter {} does not match the manifest ({})", ids.next_row(), manifest.next_row),
        ));
    }

    let index = ann::load(config.backend, dir, config.nprobe).load_context(&dir.join(VECTORS_FILE))?;
    if index.dimension().get() != manifest.dimension {
        return Err(storage_error(
            VECTORS_FILE,
            format!("dimension {} does not match the manifest ({})", index.dimension().get(), manifest.dimension),
        ));
    }
    if index.count() != ids.len() {
        return Err(storage_error(
            VECTORS_FILE,
            format!("{} live vectors for {} ids", index.count(), ids.len()),
        ));
    }

    let database: Box<dyn Database> = if config.content {
        let mut database = ContentDatabase::new(config.storevectors);
        database.load(dir).load_context(&dir.join(DOCUMENTS_FILE))?;
        let stored = database.ids().load_context(&dir.join(DOCUMENTS_FILE))?;
        let mapped: Vec<_> = ids.iter().map(|(row, id)| (row, id.clone())).collect();
        if stored != mapped {
            return Err(storage_error(
                DOCUMENTS_FILE,
                "stored rows do not match the id map".to_string(),
            ));
        }
        Box::new(database)
    } else {
        Box::new(NoopDatabase)
    };

    let (scoring, pca) = if manifest.model {
        let path = dir.join(MODEL_FILE);
        let bytes = std::fs::read(&path).load_context(&path)?;
        let (model, _): (ModelFile, usize) =
            bincode::decode_from_slice(&bytes, bincode::config::standard()).load_context(&path)?;
        let scoring = match model.scoring {
            Some(scoring) => scoring,
            None => ScoringModel::new(config.scoring, config.bm25)?,
        };
        (scoring, model.pca)
    } else {
        (ScoringModel::new(config.scoring, config.bm25)?, None)
    };

    // The current backend is kept when the saved index uses the same model
    let replacement = if config.path == embeddings.config.path {
        None
    } else {
        Some(VectorModel::load(&config, scoring.clone())?)
    };
    let model_dimension = replacement
        .as_ref()
        .map_or(embeddings.model.dimension(), VectorModel::dimension);
    if model_dimension != index.dimension() {
        return Err(storage_error(
            VECTORS_FILE,
            format!(
                "index dimension {} does not match the model dimension {}",
                index.dimension().get(),
                model_dimension.get()
            ),
        ));
    }
    if let Some(pca) = &pca {
        if pca.components().iter().any(|c| c.len() != model_dimension.get()) {
            return Err(storage_error(MODEL_FILE, "PCA components have the wrong dimension".to_string()));
        }
    }

    if let Some(model) = replacement {
        embeddings.model = model;
    }
    embeddings.model.configure(&config);
    embeddings.model.set_scoring(scoring);
    embeddings.model.set_pca(pca);
    embeddings.config = config;
    embeddings.ids = ids;
    embeddings.ann = index;
    embeddings.database = database;
    embeddings.created_at = manifest.created_at;

    tracing::info!(
        "loaded {} documents from {}",
        embeddings.ann.count(),
        dir.display()
    );
    Ok(())
}
