use crate::models::{Citation, RetrievalResult};
use std::collections::HashSet;

/// Builds the display citations for the chunks an answer was grounded
/// on: deduplicated by (document, page), first occurrence order kept,
/// page numbers reported 1-indexed.
pub fn build_citations(results: &[RetrievalResult]) -> Vec<Citation> {
    let mut seen: HashSet<(String, u32)> = HashSet::new();
    let mut citations = Vec::new();

    for result in results {
        if seen.insert((result.source_document.clone(), result.page_index)) {
            citations.push(Citation {
                document_name: result.source_document.clone(),
                page_number: result.page_index + 1,
            });
        }
    }

    citations
}
