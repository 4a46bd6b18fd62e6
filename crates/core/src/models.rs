use crate::error::IngestError;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum OwnerType {
    Faculty,
    Student,
}

/// An isolated vector pool: the shared faculty pool or one pool per
/// chat session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Scope {
    Shared,
    Session(i64),
}

impl Scope {
    pub fn for_owner(owner_type: OwnerType, session_id: Option<i64>) -> Result<Self, IngestError> {
        match owner_type {
            OwnerType::Faculty => Ok(Scope::Shared),
            OwnerType::Student => session_id
                .map(Scope::Session)
                .ok_or(IngestError::MissingSessionId),
        }
    }

    /// Relative storage key under the index base directory, without the
    /// file extension.
    pub fn storage_key(&self) -> String {
        match self {
            Scope::Shared => "faculty/index".to_string(),
            Scope::Session(id) => format!("sessions/{id}"),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
pub struct AcademicTags {
    pub department: Option<String>,
    pub year: Option<i32>,
    pub section: Option<String>,
}

impl AcademicTags {
    pub fn is_empty(&self) -> bool {
        self.department.is_none() && self.year.is_none() && self.section.is_none()
    }

    /// A chunk passes a filter unless a tag is present on both sides and
    /// differs. Absent tags are never disqualifying.
    pub fn passes(&self, filter: &AcademicTags) -> bool {
        fn compatible<T: PartialEq>(tag: &Option<T>, wanted: &Option<T>) -> bool {
            match (tag, wanted) {
                (Some(tag), Some(wanted)) => tag == wanted,
                _ => true,
            }
        }

        compatible(&self.department, &filter.department)
            && compatible(&self.year, &filter.year)
            && compatible(&self.section, &filter.section)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChunkMetadata {
    pub chunk_id: String,
    pub text: String,
    pub owner_type: OwnerType,
    pub owner_id: Option<i64>,
    pub session_id: Option<i64>,
    pub source_document: String,
    pub page_index: u32,
    pub ocr_used: bool,
    #[serde(default)]
    pub tags: AcademicTags,
    pub ingested_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub enum PageBody {
    Text(String),
    Failed(String),
}

/// One extracted document page as handed over by the extraction layer.
#[derive(Debug, Clone)]
pub struct ExtractedPage {
    pub index: u32,
    pub body: PageBody,
    pub ocr_used: bool,
}

impl ExtractedPage {
    pub fn text(index: u32, text: impl Into<String>) -> Self {
        Self {
            index,
            body: PageBody::Text(text.into()),
            ocr_used: false,
        }
    }
}

#[derive(Debug, Clone)]
pub struct RetrievalResult {
    pub text: String,
    pub score: f32,
    pub source_document: String,
    pub page_index: u32,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ChatRole {
    User,
    Assistant,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatTurn {
    pub role: ChatRole,
    pub text: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Citation {
    pub document_name: String,
    /// 1-indexed for display; chunk metadata stores 0-based page indices.
    pub page_number: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AnswerMode {
    Rag,
    General,
}

#[derive(Debug, Clone)]
pub struct AnswerRequest {
    pub question: String,
    pub session_id: Option<i64>,
    pub mode: AnswerMode,
    pub filters: AcademicTags,
    pub history: Vec<ChatTurn>,
}

impl AnswerRequest {
    pub fn rag(question: impl Into<String>) -> Self {
        Self {
            question: question.into(),
            session_id: None,
            mode: AnswerMode::Rag,
            filters: AcademicTags::default(),
            history: Vec::new(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct AnswerResponse {
    pub answer: String,
    pub sources: Vec<Citation>,
    pub grounded: bool,
}
