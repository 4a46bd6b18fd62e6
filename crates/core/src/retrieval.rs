use crate::embeddings::{unit_normalize, EmbeddingProvider};
use crate::error::{IndexError, QueryError};
use crate::index::IndexStore;
use crate::models::{AcademicTags, RetrievalResult, Scope};
use std::sync::Arc;

/// Over-fetch factor applied when academic filters are set. The index
/// is not filter-aware, so extra candidates leave headroom for
/// post-filtering.
const FILTER_OVERFETCH: usize = 4;

pub struct RetrievalEngine<E> {
    store: Arc<IndexStore>,
    embedder: Arc<E>,
}

impl<E: EmbeddingProvider> RetrievalEngine<E> {
    pub fn new(store: Arc<IndexStore>, embedder: Arc<E>) -> Self {
        Self { store, embedder }
    }

    /// Embeds `query` and returns up to `top_k` results from the
    /// scope's index, ranked by cosine similarity, with conflicting
    /// academic tags filtered out. A scope with no index yet yields an
    /// empty result, not an error.
    pub async fn search(
        &self,
        scope: Scope,
        query: &str,
        top_k: usize,
        filters: &AcademicTags,
    ) -> Result<Vec<RetrievalResult>, QueryError> {
        let index = match self.store.load(scope).await? {
            Some(index) => index,
            None => return Ok(Vec::new()),
        };

        let mut query_vector = self.embedder.embed_query(query).await?;
        if query_vector.len() != index.dimension() {
            return Err(IndexError::DimensionMismatch {
                stored: index.dimension(),
                requested: query_vector.len(),
            }
            .into());
        }
        unit_normalize(&mut query_vector);

        let fetch = if filters.is_empty() {
            top_k
        } else {
            (top_k * FILTER_OVERFETCH).min(index.len())
        };

        let mut results = Vec::new();
        for (score, metadata) in index.search(&query_vector, fetch) {
            if !metadata.tags.passes(filters) {
                continue;
            }
            results.push(RetrievalResult {
                text: metadata.text.clone(),
                score,
                source_document: metadata.source_document.clone(),
                page_index: metadata.page_index,
            });
            if results.len() == top_k {
                break;
            }
        }

        Ok(results)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ProviderError;
    use crate::index::ScopeIndex;
    use crate::models::{ChunkMetadata, OwnerType};
    use async_trait::async_trait;
    use chrono::Utc;
    use tempfile::tempdir;

    struct FixedEmbedder {
        vector: Vec<f32>,
    }

    #[async_trait]
    impl EmbeddingProvider for FixedEmbedder {
        fn dimensions(&self) -> usize {
            self.vector.len()
        }

        async fn embed_query(&self, _text: &str) -> Result<Vec<f32>, ProviderError> {
            Ok(self.vector.clone())
        }

        async fn embed_documents(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, ProviderError> {
            Ok(texts.iter().map(|_| self.vector.clone()).collect())
        }
    }

    fn tagged_entry(text: &str, department: Option<&str>, year: Option<i32>) -> ChunkMetadata {
        ChunkMetadata {
            chunk_id: format!("id-{text}"),
            text: text.to_string(),
            owner_type: OwnerType::Faculty,
            owner_id: None,
            session_id: None,
            source_document: "doc.pdf".to_string(),
            page_index: 0,
            ocr_used: false,
            tags: AcademicTags {
                department: department.map(str::to_string),
                year,
                section: None,
            },
            ingested_at: Utc::now(),
        }
    }

    async fn seeded_store(dir: &std::path::Path) -> Arc<IndexStore> {
        let store = Arc::new(IndexStore::new(dir));
        let mut index = ScopeIndex::empty(2);
        index
            .append(
                vec![
                    vec![1.0, 0.0],
                    vec![0.9, 0.1],
                    vec![0.5, 0.5],
                    vec![0.0, 1.0],
                ],
                vec![
                    tagged_entry("bio-first", Some("Bio"), Some(1)),
                    tagged_entry("chem", Some("Chem"), Some(1)),
                    tagged_entry("untagged", None, None),
                    tagged_entry("bio-last", Some("Bio"), None),
                ],
            )
            .unwrap();
        store.persist(Scope::Shared, &index).await.unwrap();
        store
    }

    #[tokio::test]
    async fn missing_index_yields_empty_results() {
        let dir = tempdir().unwrap();
        let store = Arc::new(IndexStore::new(dir.path()));
        let engine = RetrievalEngine::new(store, Arc::new(FixedEmbedder { vector: vec![1.0, 0.0] }));

        let results = engine
            .search(Scope::Session(404), "anything", 5, &AcademicTags::default())
            .await
            .unwrap();
        assert!(results.is_empty());
    }

    #[tokio::test]
    async fn conflicting_tags_are_skipped_but_absent_tags_pass() {
        let dir = tempdir().unwrap();
        let store = seeded_store(dir.path()).await;
        let engine = RetrievalEngine::new(store, Arc::new(FixedEmbedder { vector: vec![1.0, 0.0] }));

        let filters = AcademicTags {
            department: Some("Bio".to_string()),
            year: Some(1),
            section: None,
        };
        let results = engine
            .search(Scope::Shared, "question", 5, &filters)
            .await
            .unwrap();

        let texts: Vec<&str> = results.iter().map(|result| result.text.as_str()).collect();
        assert_eq!(texts, vec!["bio-first", "untagged", "bio-last"]);
    }

    #[tokio::test]
    async fn top_k_caps_accepted_results() {
        let dir = tempdir().unwrap();
        let store = seeded_store(dir.path()).await;
        let engine = RetrievalEngine::new(store, Arc::new(FixedEmbedder { vector: vec![1.0, 0.0] }));

        let results = engine
            .search(Scope::Shared, "question", 2, &AcademicTags::default())
            .await
            .unwrap();
        assert_eq!(results.len(), 2);
        assert!(results[0].score >= results[1].score);
    }

    #[tokio::test]
    async fn query_dimension_mismatch_is_fatal() {
        let dir = tempdir().unwrap();
        let store = seeded_store(dir.path()).await;
        let engine = RetrievalEngine::new(
            store,
            Arc::new(FixedEmbedder { vector: vec![1.0, 0.0, 0.0] }),
        );

        let result = engine
            .search(Scope::Shared, "question", 5, &AcademicTags::default())
            .await;
        assert!(matches!(
            result,
            Err(QueryError::Index(IndexError::DimensionMismatch { .. }))
        ));
    }
}
