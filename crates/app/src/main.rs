use anyhow::bail;
use chrono::Utc;
use clap::{Parser, Subcommand, ValueEnum};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use study_rag_core::{
    discover_text_files, ingest_pages, read_document_pages, AcademicTags, AnswerMode,
    AnswerRequest, AnswerSynthesizer, ChunkingOptions, EmbeddingProvider, HashingEmbedder,
    HttpChatSynthesizer, HttpEmbeddingProvider, IndexStore, IngestRequest, OwnerType,
    AnswerPipeline, RegexIntentClassifier, DEFAULT_EMBEDDING_DIMENSIONS,
};
use tracing::{info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[derive(Parser)]
#[command(name = "study-rag", version)]
struct Cli {
    #[command(subcommand)]
    command: Command,

    /// Base directory for the per-scope index snapshots
    #[arg(long, default_value = "data/index")]
    data_dir: PathBuf,

    /// Embedding endpoint; omit to use the local hashing embedder
    #[arg(long)]
    embedding_url: Option<String>,

    /// Embedding model name
    #[arg(long, default_value = "sentence-transformers/all-MiniLM-L6-v2")]
    embedding_model: String,

    /// Embedding vector dimension
    #[arg(long, default_value_t = DEFAULT_EMBEDDING_DIMENSIONS)]
    embedding_dimensions: usize,

    /// Embedding endpoint API key
    #[arg(long, env = "EMBEDDING_API_KEY")]
    embedding_api_key: Option<String>,

    /// Chat-completions endpoint for answer synthesis
    #[arg(long)]
    llm_url: Option<String>,

    /// Chat model name
    #[arg(long, default_value = "llama-3.3-70b-versatile")]
    llm_model: String,

    /// Chat endpoint API key
    #[arg(long, env = "LLM_API_KEY")]
    llm_api_key: Option<String>,
}

#[derive(Clone, Copy, ValueEnum)]
enum OwnerArg {
    Faculty,
    Student,
}

impl From<OwnerArg> for OwnerType {
    fn from(value: OwnerArg) -> Self {
        match value {
            OwnerArg::Faculty => OwnerType::Faculty,
            OwnerArg::Student => OwnerType::Student,
        }
    }
}

#[derive(Subcommand)]
enum Command {
    /// Ingest a text file or folder of text files (pages separated by
    /// form feed) into a document pool.
    Ingest {
        /// File or folder to ingest
        #[arg(long)]
        path: PathBuf,
        /// Scope owner: faculty indexes into the shared pool, student
        /// into the session pool
        #[arg(long, value_enum)]
        owner: OwnerArg,
        /// Uploading student's user id
        #[arg(long)]
        owner_id: Option<i64>,
        /// Chat session id; required for student uploads
        #[arg(long)]
        session_id: Option<i64>,
        #[arg(long)]
        department: Option<String>,
        #[arg(long)]
        year: Option<i32>,
        #[arg(long)]
        section: Option<String>,
    },
    /// Answer a question from the indexed pools, with citations.
    Ask {
        /// The question to answer
        #[arg(long)]
        question: String,
        /// Chat session whose private pool is consulted first
        #[arg(long)]
        session_id: Option<i64>,
        /// Skip retrieval and answer from general knowledge
        #[arg(long, default_value_t = false)]
        general: bool,
        #[arg(long)]
        department: Option<String>,
        #[arg(long)]
        year: Option<i32>,
        #[arg(long)]
        section: Option<String>,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(EnvFilter::from_default_env())
        .with(fmt::layer())
        .init();

    let cli = Cli::parse();
    let store = Arc::new(IndexStore::new(&cli.data_dir));

    match cli.command {
        Command::Ingest {
            ref path,
            owner,
            owner_id,
            session_id,
            ref department,
            ref year,
            ref section,
        } => {
            let tags = AcademicTags {
                department: department.clone(),
                year: *year,
                section: section.clone(),
            };
            match embedder(&cli)? {
                Some(remote) => {
                    run_ingest(&store, &remote, path, owner.into(), owner_id, session_id, tags)
                        .await?
                }
                None => {
                    let local = HashingEmbedder {
                        dimensions: cli.embedding_dimensions,
                    };
                    run_ingest(&store, &local, path, owner.into(), owner_id, session_id, tags)
                        .await?
                }
            }
        }
        Command::Ask {
            ref question,
            session_id,
            general,
            ref department,
            ref year,
            ref section,
        } => {
            let Some(llm_url) = cli.llm_url.as_deref() else {
                bail!("--llm-url is required for ask");
            };
            let synthesizer =
                HttpChatSynthesizer::new(llm_url, &cli.llm_model, cli.llm_api_key.clone())?;

            let request = AnswerRequest {
                question: question.clone(),
                session_id,
                mode: if general {
                    AnswerMode::General
                } else {
                    AnswerMode::Rag
                },
                filters: AcademicTags {
                    department: department.clone(),
                    year: *year,
                    section: section.clone(),
                },
                history: Vec::new(),
            };

            match embedder(&cli)? {
                Some(remote) => run_ask(store, remote, synthesizer, request).await?,
                None => {
                    let local = HashingEmbedder {
                        dimensions: cli.embedding_dimensions,
                    };
                    run_ask(store, local, synthesizer, request).await?
                }
            }
        }
    }

    Ok(())
}

fn embedder(cli: &Cli) -> anyhow::Result<Option<HttpEmbeddingProvider>> {
    match cli.embedding_url.as_deref() {
        Some(url) => Ok(Some(HttpEmbeddingProvider::new(
            url,
            &cli.embedding_model,
            cli.embedding_dimensions,
            cli.embedding_api_key.clone(),
        )?)),
        None => Ok(None),
    }
}

async fn run_ingest<E: EmbeddingProvider>(
    store: &IndexStore,
    embedder: &E,
    path: &Path,
    owner_type: OwnerType,
    owner_id: Option<i64>,
    session_id: Option<i64>,
    tags: AcademicTags,
) -> anyhow::Result<()> {
    let files = if path.is_file() {
        vec![path.to_path_buf()]
    } else {
        discover_text_files(path)
    };

    if files.is_empty() {
        bail!("no text files found in {}", path.display());
    }

    let mut total_chunks = 0usize;
    for file in files {
        let pages = read_document_pages(&file)?;
        let source_name = file
            .file_name()
            .and_then(|name| name.to_str())
            .unwrap_or("document.txt")
            .to_string();

        let report = ingest_pages(
            store,
            embedder,
            IngestRequest {
                source_name,
                pages,
                owner_type,
                owner_id,
                session_id,
                tags: tags.clone(),
            },
            ChunkingOptions::default(),
        )
        .await?;

        info!(
            path = %file.display(),
            chunks = report.chunks_indexed,
            "document indexed"
        );
        for failed in &report.pages_failed {
            warn!(
                path = %file.display(),
                page = failed.page_index,
                reason = %failed.reason,
                "page extraction failed"
            );
        }
        total_chunks += report.chunks_indexed;
    }

    println!("{} chunks indexed at {}", total_chunks, Utc::now().to_rfc3339());
    Ok(())
}

async fn run_ask<E: EmbeddingProvider + 'static>(
    store: Arc<IndexStore>,
    embedder: E,
    synthesizer: impl AnswerSynthesizer,
    request: AnswerRequest,
) -> anyhow::Result<()> {
    let pipeline = AnswerPipeline::new(
        store,
        Arc::new(embedder),
        synthesizer,
        RegexIntentClassifier::new()?,
    );

    let response = pipeline.answer(request).await?;

    println!("{}", response.answer);
    if response.grounded {
        for source in &response.sources {
            println!("  source: {} (page {})", source.document_name, source.page_number);
        }
    } else {
        info!("no relevant indexed content; answered from general knowledge");
    }

    Ok(())
}
