use crate::chunking::{clean_source_name, ChunkContext, ChunkingOptions, PageChunker};
use crate::embeddings::{unit_normalize, EmbeddingProvider};
use crate::error::{IndexError, IngestError};
use crate::index::IndexStore;
use crate::models::{AcademicTags, ExtractedPage, OwnerType, PageBody, Scope};
use chrono::Utc;
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

/// One document upload: extracted pages plus the metadata every chunk
/// will carry. `session_id` is required for student uploads.
#[derive(Debug, Clone)]
pub struct IngestRequest {
    pub source_name: String,
    pub pages: Vec<ExtractedPage>,
    pub owner_type: OwnerType,
    pub owner_id: Option<i64>,
    pub session_id: Option<i64>,
    pub tags: AcademicTags,
}

#[derive(Debug, Clone)]
pub struct FailedPage {
    pub page_index: u32,
    pub reason: String,
}

#[derive(Debug, Clone)]
pub struct IngestionReport {
    pub chunks_indexed: usize,
    pub pages_failed: Vec<FailedPage>,
}

/// Chunks, embeds, and indexes one document into its scope's pool.
/// Pages whose extraction failed are kept as placeholder chunks and
/// listed in the report. The scope's write lock is held across
/// load, append, and persist; nothing is durable (and no success is
/// reported) unless the persisted snapshot landed.
pub async fn ingest_pages<E: EmbeddingProvider>(
    store: &IndexStore,
    embedder: &E,
    request: IngestRequest,
    options: ChunkingOptions,
) -> Result<IngestionReport, IngestError> {
    let scope = Scope::for_owner(request.owner_type, request.session_id)?;
    let chunker = PageChunker::new(options)?;

    let context = ChunkContext {
        owner_type: request.owner_type,
        owner_id: request.owner_id,
        session_id: request.session_id,
        source_document: clean_source_name(&request.source_name),
        tags: request.tags,
        scope_key: scope.storage_key(),
        ingested_at: Utc::now(),
    };

    let mut chunks = Vec::new();
    let mut pages_failed = Vec::new();
    let mut cursor = 0u64;

    for page in &request.pages {
        if let PageBody::Failed(reason) = &page.body {
            pages_failed.push(FailedPage {
                page_index: page.index,
                reason: reason.clone(),
            });
        }
        let (page_chunks, next_cursor) = chunker.chunk_page(page, &context, cursor);
        cursor = next_cursor;
        chunks.extend(page_chunks);
    }

    if chunks.is_empty() {
        return Ok(IngestionReport {
            chunks_indexed: 0,
            pages_failed,
        });
    }

    let texts: Vec<String> = chunks.iter().map(|chunk| chunk.text.clone()).collect();
    let mut vectors = embedder.embed_documents(&texts).await?;
    if vectors.len() != chunks.len() {
        return Err(IndexError::AlignmentViolation {
            vectors: vectors.len(),
            metadata: chunks.len(),
        }
        .into());
    }
    for vector in &mut vectors {
        unit_normalize(vector);
    }

    let _guard = store.lock_scope(scope).await;
    let mut index = store.open_or_create(scope, embedder.dimensions()).await?;
    index.append(vectors, chunks)?;
    store.persist(scope, &index).await?;

    Ok(IngestionReport {
        chunks_indexed: texts.len(),
        pages_failed,
    })
}

pub fn discover_text_files(folder: &Path) -> Vec<PathBuf> {
    let mut files = Vec::new();

    for entry in WalkDir::new(folder)
        .into_iter()
        .filter_map(|item| item.ok())
    {
        if !entry.file_type().is_file() {
            continue;
        }

        let is_text = entry
            .path()
            .extension()
            .and_then(|ext| ext.to_str())
            .is_some_and(|ext| ext.eq_ignore_ascii_case("txt"));

        if is_text {
            files.push(entry.path().to_path_buf());
        }
    }

    files.sort_unstable();
    files
}

/// Reads an already-extracted plain-text document. Pages are separated
/// by form feed; blank pages are dropped but keep their index so page
/// citations stay correct.
pub fn read_document_pages(path: &Path) -> Result<Vec<ExtractedPage>, IngestError> {
    let raw = std::fs::read_to_string(path)?;

    let pages = raw
        .split('\u{000C}')
        .enumerate()
        .filter_map(|(index, body)| {
            let trimmed = body.trim();
            if trimmed.is_empty() {
                None
            } else {
                Some(ExtractedPage::text(index as u32, trimmed))
            }
        })
        .collect();

    Ok(pages)
}
