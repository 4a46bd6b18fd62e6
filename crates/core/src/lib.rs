pub mod chunking;
pub mod citations;
pub mod embeddings;
pub mod error;
pub mod gate;
pub mod index;
pub mod ingest;
pub mod models;
pub mod orchestrator;
pub mod retrieval;
pub mod synthesis;

pub use chunking::{clean_source_name, ChunkContext, ChunkingOptions, PageChunker};
pub use citations::build_citations;
pub use embeddings::{
    unit_normalize, EmbeddingProvider, HashingEmbedder, HttpEmbeddingProvider,
    DEFAULT_EMBEDDING_DIMENSIONS,
};
pub use error::{IndexError, IngestError, ProviderError, QueryError};
pub use gate::{
    RegexIntentClassifier, RelevanceGate, WholeDocumentClassifier, SIMILARITY_THRESHOLD,
};
pub use index::{IndexStore, ScopeIndex};
pub use ingest::{
    discover_text_files, ingest_pages, read_document_pages, FailedPage, IngestRequest,
    IngestionReport,
};
pub use models::{
    AcademicTags, AnswerMode, AnswerRequest, AnswerResponse, ChatRole, ChatTurn, ChunkMetadata,
    Citation, ExtractedPage, OwnerType, PageBody, RetrievalResult, Scope,
};
pub use orchestrator::AnswerPipeline;
pub use retrieval::RetrievalEngine;
pub use synthesis::{AnswerSynthesizer, HttpChatSynthesizer};
