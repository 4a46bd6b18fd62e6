use crate::error::IngestError;
use crate::models::{AcademicTags, ChunkMetadata, ExtractedPage, OwnerType, PageBody};
use chrono::{DateTime, Utc};
use regex::Regex;
use sha2::{Digest, Sha256};

#[derive(Debug, Clone)]
pub struct ChunkingOptions {
    /// Coarse pass flushes the line buffer once it grows past this size.
    pub coarse_flush_chars: usize,
    /// Fine pass bounds every chunk to this window.
    pub window_chars: usize,
    pub window_overlap_chars: usize,
    /// "label: value unit" lines (lab results, measurements) are never
    /// treated as a chunk boundary.
    pub measurement_line_regex: &'static str,
}

impl Default for ChunkingOptions {
    fn default() -> Self {
        Self {
            coarse_flush_chars: 700,
            window_chars: 800,
            window_overlap_chars: 150,
            measurement_line_regex: r"(?i)([A-Za-z\s]+)\s*[:\-]\s*([\d\.]+)\s*([a-zA-Z/%]+)?",
        }
    }
}

/// Per-document fields every produced chunk inherits.
#[derive(Debug, Clone)]
pub struct ChunkContext {
    pub owner_type: OwnerType,
    pub owner_id: Option<i64>,
    pub session_id: Option<i64>,
    pub source_document: String,
    pub tags: AcademicTags,
    pub scope_key: String,
    pub ingested_at: DateTime<Utc>,
}

pub struct PageChunker {
    options: ChunkingOptions,
    measurement_line: Regex,
}

impl PageChunker {
    pub fn new(options: ChunkingOptions) -> Result<Self, IngestError> {
        let measurement_line = Regex::new(options.measurement_line_regex)?;
        Ok(Self {
            options,
            measurement_line,
        })
    }

    pub fn with_defaults() -> Result<Self, IngestError> {
        Self::new(ChunkingOptions::default())
    }

    /// Splits one page into chunks and attaches provenance metadata.
    /// A page whose extraction failed yields a single placeholder chunk
    /// so ingestion stays best-effort per page.
    pub fn chunk_page(
        &self,
        page: &ExtractedPage,
        context: &ChunkContext,
        start_ordinal: u64,
    ) -> (Vec<ChunkMetadata>, u64) {
        let texts = match &page.body {
            PageBody::Text(text) => self.split_page_text(text),
            PageBody::Failed(reason) => vec![format!("[Error extracting text: {reason}]")],
        };

        let mut chunks = Vec::with_capacity(texts.len());
        let mut cursor = start_ordinal;

        for text in texts {
            let chunk_id = make_chunk_id(&context.scope_key, page.index, cursor, &text);
            chunks.push(ChunkMetadata {
                chunk_id,
                text,
                owner_type: context.owner_type,
                owner_id: context.owner_id,
                session_id: context.session_id,
                source_document: context.source_document.clone(),
                page_index: page.index,
                ocr_used: page.ocr_used,
                tags: context.tags.clone(),
                ingested_at: context.ingested_at,
            });
            cursor = cursor.saturating_add(1);
        }

        (chunks, cursor)
    }

    /// Two-pass split: a measurement-aware coarse pass keeps structured
    /// lines together, then a fixed window with overlap bounds every
    /// chunk tightly.
    pub fn split_page_text(&self, text: &str) -> Vec<String> {
        self.coarse_chunks(text)
            .into_iter()
            .flat_map(|chunk| self.window_chunks(&chunk))
            .filter(|chunk| !chunk.trim().is_empty())
            .collect()
    }

    fn coarse_chunks(&self, text: &str) -> Vec<String> {
        let mut chunks = Vec::new();
        let mut buffer: Vec<&str> = Vec::new();
        let mut buffered_chars = 0usize;

        for line in text.lines() {
            if !buffer.is_empty() {
                buffered_chars += 1;
            }
            buffered_chars += line.chars().count();
            buffer.push(line);

            // A measurement line must not close the chunk it belongs to.
            if self.measurement_line.is_match(line) {
                continue;
            }

            if buffered_chars > self.options.coarse_flush_chars {
                chunks.push(buffer.join(" "));
                buffer.clear();
                buffered_chars = 0;
            }
        }

        if !buffer.is_empty() {
            let tail = buffer.join(" ");
            if !tail.trim().is_empty() {
                chunks.push(tail);
            }
        }

        chunks
    }

    fn window_chunks(&self, text: &str) -> Vec<String> {
        let window = self.options.window_chars;
        let chars: Vec<char> = text.chars().collect();

        if chars.len() <= window {
            return vec![text.to_string()];
        }

        let step = window
            .saturating_sub(self.options.window_overlap_chars)
            .max(1);
        let mut pieces = Vec::new();
        let mut start = 0;

        while start < chars.len() {
            let end = (start + window).min(chars.len());
            pieces.push(chars[start..end].iter().collect());
            if end == chars.len() {
                break;
            }
            start += step;
        }

        pieces
    }
}

/// Strips the storage-layer unique-id prefix from an uploaded file name.
/// Uploads are stored as "{uuid}_{original_name}"; the uuid is 36 chars
/// with dashes. Anything else passes through untouched.
pub fn clean_source_name(file_name: &str) -> String {
    match file_name.split_once('_') {
        Some((prefix, rest)) if prefix.len() == 36 && !rest.is_empty() => rest.to_string(),
        _ => file_name.to_string(),
    }
}

fn make_chunk_id(scope_key: &str, page: u32, ordinal: u64, text: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(scope_key.as_bytes());
    hasher.update(page.to_le_bytes());
    hasher.update(ordinal.to_le_bytes());
    hasher.update(text.as_bytes());
    format!("{:x}", hasher.finalize())
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    fn context() -> ChunkContext {
        ChunkContext {
            owner_type: OwnerType::Faculty,
            owner_id: None,
            session_id: None,
            source_document: "notes.pdf".to_string(),
            tags: AcademicTags::default(),
            scope_key: "faculty/index".to_string(),
            ingested_at: Utc::now(),
        }
    }

    #[test]
    fn uuid_prefix_is_stripped() {
        let prefixed = format!("{}_lab report.pdf", Uuid::new_v4());
        assert_eq!(clean_source_name(&prefixed), "lab report.pdf");
    }

    #[test]
    fn non_uuid_prefix_passes_through() {
        assert_eq!(clean_source_name("lab_report.pdf"), "lab_report.pdf");
        assert_eq!(clean_source_name("plain.pdf"), "plain.pdf");
    }

    #[test]
    fn measurement_lines_stay_in_one_chunk() {
        let chunker = PageChunker::with_defaults().unwrap();

        let filler = "word ".repeat(138); // ~690 chars, just under the flush size
        let text = format!("{filler}\nTemperature: 37.5 C\nHemoglobin: 13.2 g/dL\nEnd of report.");
        let chunks = chunker.split_page_text(&text);

        let with_temperature = chunks
            .iter()
            .find(|chunk| chunk.contains("Temperature: 37.5 C"))
            .expect("measurement line should survive chunking");
        assert!(
            with_temperature.contains("Hemoglobin: 13.2 g/dL"),
            "consecutive measurement lines must not be split apart"
        );
    }

    #[test]
    fn window_pass_bounds_chunk_size() {
        let chunker = PageChunker::with_defaults().unwrap();
        let text = "alpha beta gamma ".repeat(200);
        let chunks = chunker.split_page_text(&text);

        assert!(chunks.len() > 1);
        for chunk in &chunks {
            assert!(chunk.chars().count() <= 800);
        }
    }

    #[test]
    fn window_overlap_repeats_tail_text() {
        let options = ChunkingOptions {
            coarse_flush_chars: 50,
            window_chars: 40,
            window_overlap_chars: 10,
            ..ChunkingOptions::default()
        };
        let chunker = PageChunker::new(options).unwrap();
        let text: String = ('a'..='z').cycle().take(100).collect();
        let pieces = chunker.window_chunks(&text);

        for pair in pieces.windows(2) {
            let tail: String = pair[0].chars().rev().take(10).collect::<Vec<_>>().iter().rev().collect();
            assert!(pair[1].starts_with(&tail));
        }
    }

    #[test]
    fn empty_page_yields_no_chunks() {
        let chunker = PageChunker::with_defaults().unwrap();
        assert!(chunker.split_page_text("").is_empty());
        assert!(chunker.split_page_text("   \n  \n").is_empty());
    }

    #[test]
    fn failed_page_becomes_placeholder_chunk() {
        let chunker = PageChunker::with_defaults().unwrap();
        let page = ExtractedPage {
            index: 3,
            body: PageBody::Failed("encrypted stream".to_string()),
            ocr_used: false,
        };

        let (chunks, next) = chunker.chunk_page(&page, &context(), 0);
        assert_eq!(chunks.len(), 1);
        assert_eq!(next, 1);
        assert!(chunks[0].text.contains("encrypted stream"));
        assert_eq!(chunks[0].page_index, 3);
    }

    #[test]
    fn chunk_ids_are_unique_per_ordinal() {
        let chunker = PageChunker::with_defaults().unwrap();
        let page = ExtractedPage::text(0, "short page body");
        let (first, next) = chunker.chunk_page(&page, &context(), 0);
        let (second, _) = chunker.chunk_page(&page, &context(), next);

        assert_eq!(first.len(), 1);
        assert_eq!(second.len(), 1);
        assert_ne!(first[0].chunk_id, second[0].chunk_id);
    }
}
