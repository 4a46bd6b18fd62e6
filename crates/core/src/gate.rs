use crate::models::RetrievalResult;
use regex::Regex;

/// Cosine-scale relevance floor. Vectors are unit-normalized before
/// indexing and search, so scores live in [-1, 1].
pub const SIMILARITY_THRESHOLD: f32 = 0.35;

/// Detects questions about a document as a whole (summaries, overviews,
/// resume reviews). Such queries have diffuse similarity to any single
/// chunk and would always fail a per-chunk threshold, so the gate lets
/// them through whenever the scope has content at all.
pub trait WholeDocumentClassifier: Send + Sync {
    fn is_whole_document(&self, query: &str) -> bool;
}

const WHOLE_DOCUMENT_PATTERN: &str = r"(?ix)\b(
    summar(y|ies|i[sz]e[sd]?|i[sz]ing)
  | overview
  | outline
  | describe\s+(this|the)\s+(document|file|pdf|report|paper)
  | what\s+is\s+(this|the)\s+(document|file|pdf|report|paper)\s+about
  | review\s+my\s+(resume|cv)
  | (resume|cv)\s+review
  | interview\s+prep(aration)?
)\b";

pub struct RegexIntentClassifier {
    pattern: Regex,
}

impl RegexIntentClassifier {
    pub fn new() -> Result<Self, regex::Error> {
        Ok(Self {
            pattern: Regex::new(WHOLE_DOCUMENT_PATTERN)?,
        })
    }
}

impl WholeDocumentClassifier for RegexIntentClassifier {
    fn is_whole_document(&self, query: &str) -> bool {
        self.pattern.is_match(query)
    }
}

/// Decides whether one scope's retrieval results are good enough to
/// ground an answer, and which of them to keep.
pub struct RelevanceGate<C> {
    classifier: C,
}

impl<C: WholeDocumentClassifier> RelevanceGate<C> {
    pub fn new(classifier: C) -> Self {
        Self { classifier }
    }

    pub fn is_whole_document(&self, query: &str) -> bool {
        self.classifier.is_whole_document(query)
    }

    /// Whole-document queries are accepted whenever anything was
    /// retrieved; everything else needs at least one result at or above
    /// the threshold.
    pub fn accept(&self, results: &[RetrievalResult], query: &str) -> bool {
        if results.is_empty() {
            return false;
        }
        if self.classifier.is_whole_document(query) {
            return true;
        }
        results
            .iter()
            .any(|result| result.score >= SIMILARITY_THRESHOLD)
    }

    /// Keeps the individual results that meet the threshold (all of
    /// them for whole-document queries) and takes the best `limit`.
    /// Results arrive ranked by the retrieval engine, so truncation
    /// selects the top scorers.
    pub fn select(
        &self,
        results: Vec<RetrievalResult>,
        query: &str,
        limit: usize,
    ) -> Vec<RetrievalResult> {
        let mut kept: Vec<RetrievalResult> = if self.classifier.is_whole_document(query) {
            results
        } else {
            results
                .into_iter()
                .filter(|result| result.score >= SIMILARITY_THRESHOLD)
                .collect()
        };
        kept.truncate(limit);
        kept
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn result(score: f32) -> RetrievalResult {
        RetrievalResult {
            text: "chunk".to_string(),
            score,
            source_document: "doc.pdf".to_string(),
            page_index: 0,
        }
    }

    fn gate() -> RelevanceGate<RegexIntentClassifier> {
        RelevanceGate::new(RegexIntentClassifier::new().unwrap())
    }

    #[test]
    fn threshold_boundary_is_inclusive() {
        let gate = gate();
        assert!(gate.accept(&[result(0.35)], "what organelle powers the cell?"));
        assert!(!gate.accept(&[result(0.349999)], "what organelle powers the cell?"));
    }

    #[test]
    fn whole_document_query_bypasses_threshold() {
        let gate = gate();
        let weak = [result(0.02), result(0.01)];
        assert!(gate.accept(&weak, "please summarize this document"));
        assert!(gate.accept(&weak, "give me an overview of chapter 2"));
        assert!(gate.accept(&weak, "can you review my resume?"));
        assert!(gate.accept(&weak, "help me with interview prep"));
    }

    #[test]
    fn empty_results_never_pass() {
        let gate = gate();
        assert!(!gate.accept(&[], "please summarize this document"));
        assert!(!gate.accept(&[], "what organelle powers the cell?"));
    }

    #[test]
    fn ordinary_questions_are_not_whole_document() {
        let classifier = RegexIntentClassifier::new().unwrap();
        assert!(!classifier.is_whole_document("what organelle powers the cell?"));
        assert!(!classifier.is_whole_document("define osmosis"));
        assert!(classifier.is_whole_document("Summarize the uploaded report"));
        assert!(classifier.is_whole_document("what is this document about"));
    }

    #[test]
    fn selection_filters_below_threshold_and_caps_count() {
        let gate = gate();
        let results = vec![
            result(0.9),
            result(0.8),
            result(0.7),
            result(0.6),
            result(0.2),
        ];
        let selected = gate.select(results, "explain photosynthesis", 4);
        assert_eq!(selected.len(), 4);
        assert!(selected.iter().all(|r| r.score >= SIMILARITY_THRESHOLD));

        let weak = vec![result(0.1), result(0.05)];
        let selected = gate.select(weak, "summarize this file", 4);
        assert_eq!(selected.len(), 2, "whole-document selection keeps sub-threshold results");
    }
}
