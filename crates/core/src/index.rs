use crate::error::IndexError;
use crate::models::{ChunkMetadata, Scope};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::fs;
use tokio::sync::{Mutex, OwnedMutexGuard};

#[derive(Debug, Serialize)]
struct VectorFileRef<'a> {
    dimension: usize,
    vectors: &'a [Vec<f32>],
}

#[derive(Debug, Deserialize)]
struct VectorFile {
    dimension: usize,
    vectors: Vec<Vec<f32>>,
}

/// One scope's similarity index: vectors of a fixed dimension plus a
/// positionally aligned metadata list. Position i in `vectors`
/// corresponds to element i in `metadata`; every write keeps the pair
/// in lockstep.
#[derive(Debug, Clone)]
pub struct ScopeIndex {
    dimension: usize,
    vectors: Vec<Vec<f32>>,
    metadata: Vec<ChunkMetadata>,
}

impl ScopeIndex {
    pub fn empty(dimension: usize) -> Self {
        Self {
            dimension,
            vectors: Vec::new(),
            metadata: Vec::new(),
        }
    }

    pub fn dimension(&self) -> usize {
        self.dimension
    }

    pub fn len(&self) -> usize {
        self.vectors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.vectors.is_empty()
    }

    pub fn metadata(&self) -> &[ChunkMetadata] {
        &self.metadata
    }

    /// The only mutation. Vectors and metadata land together or not at
    /// all.
    pub fn append(
        &mut self,
        vectors: Vec<Vec<f32>>,
        metadata: Vec<ChunkMetadata>,
    ) -> Result<(), IndexError> {
        if vectors.len() != metadata.len() {
            return Err(IndexError::AlignmentViolation {
                vectors: vectors.len(),
                metadata: metadata.len(),
            });
        }

        for vector in &vectors {
            if vector.len() != self.dimension {
                return Err(IndexError::DimensionMismatch {
                    stored: self.dimension,
                    requested: vector.len(),
                });
            }
        }

        self.vectors.extend(vectors);
        self.metadata.extend(metadata);
        Ok(())
    }

    fn check_alignment(&self) -> Result<(), IndexError> {
        if self.vectors.len() != self.metadata.len() {
            return Err(IndexError::AlignmentViolation {
                vectors: self.vectors.len(),
                metadata: self.metadata.len(),
            });
        }
        Ok(())
    }

    /// Top `fetch` entries by inner product, descending. With
    /// unit-normalized vectors this is cosine similarity.
    pub fn search(&self, query: &[f32], fetch: usize) -> Vec<(f32, &ChunkMetadata)> {
        let mut scored: Vec<(f32, usize)> = self
            .vectors
            .iter()
            .enumerate()
            .map(|(position, vector)| (inner_product(query, vector), position))
            .collect();

        scored.sort_by(|left, right| right.0.total_cmp(&left.0));
        scored.truncate(fetch);

        scored
            .into_iter()
            .map(|(score, position)| (score, &self.metadata[position]))
            .collect()
    }
}

fn inner_product(left: &[f32], right: &[f32]) -> f32 {
    left.iter()
        .zip(right.iter())
        .map(|(a, b)| a * b)
        .sum()
}

/// Owns the per-scope index snapshots on disk. The shared scope lives
/// at a fixed path; session scopes are keyed by session id. Writers to
/// one scope are serialized through `lock_scope`; readers load whole
/// fully-persisted snapshots and take no lock.
pub struct IndexStore {
    base_dir: PathBuf,
    write_locks: Mutex<HashMap<Scope, Arc<Mutex<()>>>>,
}

impl IndexStore {
    pub fn new(base_dir: impl Into<PathBuf>) -> Self {
        Self {
            base_dir: base_dir.into(),
            write_locks: Mutex::new(HashMap::new()),
        }
    }

    pub fn base_dir(&self) -> &Path {
        &self.base_dir
    }

    fn index_path(&self, scope: Scope) -> PathBuf {
        self.base_dir.join(format!("{}.json", scope.storage_key()))
    }

    fn sidecar_path(&self, scope: Scope) -> PathBuf {
        self.base_dir
            .join(format!("{}.meta.json", scope.storage_key()))
    }

    /// Single-writer-per-scope guard. Ingestion holds this across
    /// load, append, and persist so concurrent ingests cannot lose
    /// each other's chunks.
    pub async fn lock_scope(&self, scope: Scope) -> OwnedMutexGuard<()> {
        let lock = {
            let mut locks = self.write_locks.lock().await;
            locks
                .entry(scope)
                .or_insert_with(|| Arc::new(Mutex::new(())))
                .clone()
        };
        lock.lock_owned().await
    }

    /// Loads the persisted snapshot for a scope. A scope with no index
    /// yet is not an error. A snapshot whose vector count and metadata
    /// length diverge is reported as corrupt rather than searched.
    pub async fn load(&self, scope: Scope) -> Result<Option<ScopeIndex>, IndexError> {
        let raw = match fs::read(self.index_path(scope)).await {
            Ok(bytes) => bytes,
            Err(error) if error.kind() == ErrorKind::NotFound => return Ok(None),
            Err(error) => return Err(error.into()),
        };
        let vector_file: VectorFile = serde_json::from_slice(&raw)?;

        let metadata: Vec<ChunkMetadata> = match fs::read(self.sidecar_path(scope)).await {
            Ok(bytes) => serde_json::from_slice(&bytes)?,
            Err(error) if error.kind() == ErrorKind::NotFound => Vec::new(),
            Err(error) => return Err(error.into()),
        };

        let index = ScopeIndex {
            dimension: vector_file.dimension,
            vectors: vector_file.vectors,
            metadata,
        };
        index.check_alignment()?;
        Ok(Some(index))
    }

    /// Loads the scope's index or creates an empty one configured for
    /// `dimension`-length vectors. A persisted index of a different
    /// dimension is a hard error, never reinterpreted.
    pub async fn open_or_create(
        &self,
        scope: Scope,
        dimension: usize,
    ) -> Result<ScopeIndex, IndexError> {
        match self.load(scope).await? {
            Some(index) => {
                if index.dimension() != dimension {
                    return Err(IndexError::DimensionMismatch {
                        stored: index.dimension(),
                        requested: dimension,
                    });
                }
                Ok(index)
            }
            None => Ok(ScopeIndex::empty(dimension)),
        }
    }

    /// Snapshots the index and its sidecar, overwriting prior content.
    /// Both files are written to temp names and renamed into place,
    /// sidecar first and index last, so a concurrent reader sees either
    /// the old pair or the new pair; the one observable interleaving
    /// (new sidecar, old index) fails the load-time alignment check
    /// instead of corrupting retrieval silently.
    pub async fn persist(&self, scope: Scope, index: &ScopeIndex) -> Result<(), IndexError> {
        index.check_alignment()?;

        let index_path = self.index_path(scope);
        let sidecar_path = self.sidecar_path(scope);
        if let Some(parent) = index_path.parent() {
            fs::create_dir_all(parent).await?;
        }

        let vector_file = VectorFileRef {
            dimension: index.dimension,
            vectors: &index.vectors,
        };
        let index_tmp = temp_path(&index_path);
        let sidecar_tmp = temp_path(&sidecar_path);

        fs::write(&sidecar_tmp, serde_json::to_vec(&index.metadata)?).await?;
        fs::write(&index_tmp, serde_json::to_vec(&vector_file)?).await?;
        fs::rename(&sidecar_tmp, &sidecar_path).await?;
        fs::rename(&index_tmp, &index_path).await?;
        Ok(())
    }
}

fn temp_path(path: &Path) -> PathBuf {
    let mut name = path.as_os_str().to_owned();
    name.push(".tmp");
    PathBuf::from(name)
}
