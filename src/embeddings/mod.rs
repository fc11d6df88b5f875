//! The embeddings index: vector model, nearest-neighbor index, content
//! database and id map kept in step under one set of row ids.
//!
//! Every public mutation leaves the live rows of the vector index and the
//! content database identical.

mod ids;
mod persist;

use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;

use crate::ann::{self, AnnIndex};
use crate::config::EmbeddingsConfig;
use crate::database::{Capabilities, ContentDatabase, Database, DatabaseError, NoopDatabase, Row};
use crate::error::{EmbeddingsError, EmbeddingsResult};
use crate::query::{self, QueryError, SCORE_COLUMN, ID_COLUMN};
use crate::scoring::{ScoringMethod, ScoringModel};
use crate::types::{DocId, Document, ResultRow, RowId};
use crate::vector::{EmbeddingGenerator, ModelBackend, VectorModel, dot};

pub use ids::{IDS_FILE, IdMap};
pub use persist::{MANIFEST_FILE, MODEL_FILE, Manifest};

#[derive(Debug)]
pub struct Embeddings {
    config: EmbeddingsConfig,
    model: VectorModel,
    ann: Box<dyn AnnIndex>,
    database: Box<dyn Database>,
    ids: IdMap,
    created_at: u64,
}

impl Embeddings {
    /// Creates an empty index, loading the model named by `config.path`.
    pub fn new(config: EmbeddingsConfig) -> EmbeddingsResult<Self> {
        config.validate()?;
        let scoring = ScoringModel::new(config.scoring, config.bm25)?;
        let model = VectorModel::load(&config, scoring)?;
        Ok(Self::with_model(config, model))
    }

    /// Creates an empty index that embeds text with `generator`.
    pub fn with_generator(
        config: EmbeddingsConfig,
        generator: Arc<dyn EmbeddingGenerator>,
    ) -> EmbeddingsResult<Self> {
        config.validate()?;
        let scoring = ScoringModel::new(config.scoring, config.bm25)?;
        let model = VectorModel::new(ModelBackend::Transformer(generator), &config, scoring);
        Ok(Self::with_model(config, model))
    }

    fn with_model(config: EmbeddingsConfig, model: VectorModel) -> Self {
        let ann = ann::create(config.backend, model.dimension(), config.quantize, config.nprobe);
        let database = new_database(&config);
        Self {
            config,
            model,
            ann,
            database,
            ids: IdMap::new(),
            created_at: persist::timestamp(),
        }
    }

    #[must_use]
    pub fn config(&self) -> &EmbeddingsConfig {
        &self.config
    }

    /// Vector dimension of the model.
    #[must_use]
    pub fn dimension(&self) -> usize {
        self.model.dimension().get()
    }

    /// Number of live documents.
    #[must_use]
    pub fn count(&self) -> usize {
        self.ann.count()
    }

    /// Discards every document and starts row ids again from zero. Scoring
    /// statistics fit with [`Embeddings::score`] are kept.
    pub fn reset(&mut self) {
        self.ids = IdMap::new();
        self.ann = ann::create(
            self.config.backend,
            self.model.dimension(),
            self.config.quantize,
            self.config.nprobe,
        );
        self.database = new_database(&self.config);
        self.model.clear_pca();
        self.created_at = persist::timestamp();
    }

    /// Rebuilds the index from `documents`. Returns the number of rows indexed.
    pub fn index(
        &mut self,
        documents: impl IntoIterator<Item = Document>,
    ) -> EmbeddingsResult<usize> {
        self.reset();
        let written = self.write(documents.into_iter().collect(), true)?;
        tracing::info!("indexed {written} documents");
        Ok(written)
    }

    /// Inserts new documents and replaces existing ones by id. An index that
    /// was never built is built with [`Embeddings::index`]. Once rows have been
    /// assigned, the row counter keeps growing even if every document is deleted.
    pub fn upsert(
        &mut self,
        documents: impl IntoIterator<Item = Document>,
    ) -> EmbeddingsResult<usize> {
        if self.ids.next_row() == 0 {
            return self.index(documents);
        }
        let written = self.write(documents.into_iter().collect(), false)?;
        tracing::info!("upserted {written} documents");
        Ok(written)
    }

    /// Removes documents by id. Unknown ids are ignored.
    pub fn delete(&mut self, ids: &[DocId]) -> EmbeddingsResult<usize> {
        let rows: Vec<RowId> = ids.iter().filter_map(|id| self.ids.remove(id)).collect();
        if rows.is_empty() {
            return Ok(0);
        }

        let removed = self.ann.remove(&rows);
        if self.has_content() {
            let deleted = self.database.delete(&rows)?;
            if deleted != removed {
                tracing::warn!("removed {removed} vectors but {deleted} rows");
            }
        }
        tracing::debug!("deleted {removed} documents");
        Ok(removed)
    }

    /// Fits the scoring model over `documents`, replacing earlier statistics.
    /// Does nothing when scoring is disabled.
    pub fn score(&mut self, documents: impl IntoIterator<Item = Document>) -> EmbeddingsResult<()> {
        if self.model.scoring().method() == ScoringMethod::None {
            tracing::debug!("scoring disabled, skipping fit");
            return Ok(());
        }
        let documents: Vec<Document> = documents.into_iter().collect();
        let texts: Vec<&str> = documents
            .iter()
            .map(|document| document.content.text().unwrap_or(""))
            .collect();
        self.model.scoring_mut().fit(texts.iter().copied())?;
        tracing::info!("fit scoring statistics over {} documents", texts.len());
        Ok(())
    }

    /// Runs a free-text or SQL query.
    ///
    /// Free text returns `id, text, score` rows with content storage and
    /// `id, score` rows without it. SQL requires content storage.
    pub fn search(&self, query: &str, limit: usize) -> EmbeddingsResult<Vec<ResultRow>> {
        let statement = query::translate(query, limit)?;

        if !self.database.capabilities().contains(Capabilities::QUERY) {
            if query::is_sql(query) {
                return Err(DatabaseError::unsupported("query").into());
            }
            return Ok(self
                .nearest(query, limit)?
                .into_iter()
                .filter_map(|(row, score)| {
                    let id = self.ids.id(row)?;
                    let mut result = ResultRow::new();
                    result.insert(ID_COLUMN.to_string(), id.to_json());
                    result.insert(SCORE_COLUMN.to_string(), serde_json::Value::from(score));
                    Some(result)
                })
                .collect());
        }

        let similarity = |text: &str, candidates: usize| {
            self.nearest(text, candidates)
                .map_err(|e| QueryError::Similarity { reason: e.to_string() })
        };
        self.database
            .execute(&statement, limit, &similarity)
            .map_err(database_error)
    }

    /// Ranks `texts` against `query` without touching the index. Returns
    /// `(position, score)` pairs by descending score.
    pub fn similarity(&self, query: &str, texts: &[&str]) -> EmbeddingsResult<Vec<(usize, f32)>> {
        let query = self.model.embed(query)?;
        let vectors = self.model.embed_batch(texts)?;

        let mut scored = vectors
            .into_iter()
            .enumerate()
            .map(|(position, vector)| -> EmbeddingsResult<(usize, f32)> {
                Ok((position, dot(&query, &vector?)))
            })
            .collect::<EmbeddingsResult<Vec<_>>>()?;
        scored.sort_by(|a, b| b.1.total_cmp(&a.1).then(a.0.cmp(&b.0)));
        Ok(scored)
    }

    /// The query vector the model produces for `text`.
    pub fn transform(&self, text: &str) -> EmbeddingsResult<Vec<f32>> {
        Ok(self.model.embed(text)?)
    }

    /// Stored row for `id`, when content storage is enabled.
    pub fn document(&self, id: &DocId) -> EmbeddingsResult<Option<ResultRow>> {
        let Some(row) = self.ids.get(id) else {
            return Ok(None);
        };
        Ok(self.database.resolve(row)?)
    }

    /// Original vector for `id`, when vector storage is enabled.
    pub fn vector(&self, id: &DocId) -> EmbeddingsResult<Option<Vec<f32>>> {
        if !self.database.capabilities().contains(Capabilities::VECTORS) {
            return Ok(None);
        }
        let Some(row) = self.ids.get(id) else {
            return Ok(None);
        };
        Ok(self.database.embed(row)?)
    }

    /// Drops deleted vectors from storage.
    pub fn compact(&mut self) {
        self.ann.compact();
    }

    pub fn save(&self, path: impl AsRef<Path>) -> EmbeddingsResult<()> {
        persist::save(self, path.as_ref())
    }

    /// Replaces this index with the one saved at `path`. On error the current
    /// state is left untouched.
    pub fn load(&mut self, path: impl AsRef<Path>) -> EmbeddingsResult<()> {
        persist::load(self, path.as_ref())
    }

    fn has_content(&self) -> bool {
        self.database.capabilities().contains(Capabilities::CONTENT)
    }

    /// Nearest live rows to `text`. A query without any usable token matches nothing.
    fn nearest(&self, text: &str, limit: usize) -> EmbeddingsResult<Vec<(RowId, f32)>> {
        let vector = self.model.embed(text)?;
        if vector.iter().all(|x| *x == 0.0) {
            return Ok(Vec::new());
        }
        Ok(self.ann.search(&vector, limit)?)
    }

    /// Embeds and stores `documents`. With `rebuild`, PCA is fit over the batch
    /// and the search structure is retrained.
    fn write(&mut self, documents: Vec<Document>, rebuild: bool) -> EmbeddingsResult<usize> {
        let documents = dedupe(documents);
        let texts: Vec<&str> = documents
            .iter()
            .map(|document| document.content.text().unwrap_or(""))
            .collect();

        let outcomes = self.model.embed_batch(&texts)?;

        let mut accepted = Vec::with_capacity(documents.len());
        let mut vectors = Vec::with_capacity(documents.len());
        for (document, outcome) in documents.iter().zip(outcomes) {
            match outcome {
                Ok(vector) => {
                    accepted.push(document);
                    vectors.push(vector);
                }
                Err(e) => tracing::warn!("skipping document {}: {e}", document.id),
            }
        }

        if rebuild && self.config.pca > 0 {
            self.model.fit_pca(&mut vectors, self.config.pca);
            tracing::debug!(
                "removed {} principal components",
                self.model.pca().map_or(0, |pca| pca.components().len())
            );
        }

        let content = self.has_content();
        let mut rows = Vec::with_capacity(if content { accepted.len() } else { 0 });
        let mut written = 0;
        for (document, vector) in accepted.into_iter().zip(vectors) {
            let row = self.ids.assign(&document.id)?;
            if content {
                rows.push((
                    row,
                    Row {
                        id: document.id.clone(),
                        text: document.content.text().map(str::to_string),
                        data: document.metadata(),
                        vector: self.config.storevectors.then(|| vector.clone()),
                    },
                ));
            }
            self.ann.add(row, vector)?;
            written += 1;
        }

        if content {
            self.database.insert(rows)?;
        }
        if rebuild {
            self.ann.build()?;
        }
        Ok(written)
    }
}

/// Keeps the last occurrence of each id at the position of its first.
fn dedupe(documents: Vec<Document>) -> Vec<Document> {
    let mut positions: HashMap<DocId, usize> = HashMap::new();
    let mut unique: Vec<Document> = Vec::with_capacity(documents.len());
    for document in documents {
        match positions.get(&document.id) {
            Some(&position) => unique[position] = document,
            None => {
                positions.insert(document.id.clone(), unique.len());
                unique.push(document);
            }
        }
    }
    unique
}

fn new_database(config: &EmbeddingsConfig) -> Box<dyn Database> {
    if config.content {
        Box::new(ContentDatabase::new(config.storevectors))
    } else {
        Box::new(NoopDatabase)
    }
}

/// Surfaces query failures as query errors rather than database errors.
fn database_error(error: DatabaseError) -> EmbeddingsError {
    match error {
        DatabaseError::Query(error) => EmbeddingsError::Query(error),
        other => EmbeddingsError::Database(other),
    }
}
