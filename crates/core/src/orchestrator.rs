use crate::citations::build_citations;
use crate::embeddings::EmbeddingProvider;
use crate::error::QueryError;
use crate::gate::{RelevanceGate, WholeDocumentClassifier};
use crate::index::IndexStore;
use crate::models::{
    AcademicTags, AnswerMode, AnswerRequest, AnswerResponse, RetrievalResult, Scope,
};
use crate::retrieval::RetrievalEngine;
use crate::synthesis::AnswerSynthesizer;
use std::sync::Arc;

const RETRIEVE_TOP_K: usize = 5;
const CONTEXT_LIMIT: usize = 4;

/// Answers questions by retrieving from the session pool first, then
/// the shared pool, and falling back to a general study answer when
/// neither clears the relevance gate. Session content always pre-empts
/// shared content once it clears the gate.
pub struct AnswerPipeline<E, S, C> {
    retrieval: RetrievalEngine<E>,
    synthesizer: S,
    gate: RelevanceGate<C>,
}

impl<E, S, C> AnswerPipeline<E, S, C>
where
    E: EmbeddingProvider,
    S: AnswerSynthesizer,
    C: WholeDocumentClassifier,
{
    pub fn new(store: Arc<IndexStore>, embedder: Arc<E>, synthesizer: S, classifier: C) -> Self {
        Self {
            retrieval: RetrievalEngine::new(store, embedder),
            synthesizer,
            gate: RelevanceGate::new(classifier),
        }
    }

    /// Provider failures surface as errors; only "no relevant content"
    /// falls through to the ungrounded path.
    pub async fn answer(&self, request: AnswerRequest) -> Result<AnswerResponse, QueryError> {
        if request.mode == AnswerMode::General {
            return self.ungrounded(&request).await;
        }

        if let Some(session_id) = request.session_id {
            let results = self
                .retrieval
                .search(
                    Scope::Session(session_id),
                    &request.question,
                    RETRIEVE_TOP_K,
                    &AcademicTags::default(),
                )
                .await?;
            if self.gate.accept(&results, &request.question) {
                let selected = self.gate.select(results, &request.question, CONTEXT_LIMIT);
                return self.grounded(selected, &request).await;
            }
        }

        let results = self
            .retrieval
            .search(
                Scope::Shared,
                &request.question,
                RETRIEVE_TOP_K,
                &request.filters,
            )
            .await?;
        if self.gate.accept(&results, &request.question) {
            let selected = self.gate.select(results, &request.question, CONTEXT_LIMIT);
            if !selected.is_empty() {
                return self.grounded(selected, &request).await;
            }
        }

        self.ungrounded(&request).await
    }

    async fn grounded(
        &self,
        selected: Vec<RetrievalResult>,
        request: &AnswerRequest,
    ) -> Result<AnswerResponse, QueryError> {
        let context: Vec<String> = selected.iter().map(|result| result.text.clone()).collect();
        let answer = self
            .synthesizer
            .synthesize(&context, &request.question, &request.history)
            .await?;

        Ok(AnswerResponse {
            answer,
            sources: build_citations(&selected),
            grounded: true,
        })
    }

    async fn ungrounded(&self, request: &AnswerRequest) -> Result<AnswerResponse, QueryError> {
        let answer = self
            .synthesizer
            .general_answer(&request.question, &request.history)
            .await?;

        Ok(AnswerResponse {
            answer,
            sources: Vec::new(),
            grounded: false,
        })
    }
}
