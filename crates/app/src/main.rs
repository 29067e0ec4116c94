use anyhow::{bail, Context};
use chrono::Utc;
use clap::{Parser, Subcommand, ValueEnum};
use docchat_core::providers::gemini::{DEFAULT_BASE_URL, DEFAULT_CHAT_MODEL, DEFAULT_EMBEDDING_MODEL};
use docchat_core::retry::{DEFAULT_BACKOFF_MS, DEFAULT_RETRIES};
use docchat_core::tools::DEFAULT_TOP_K;
use docchat_core::{
    compose_prompt, ingest_folder, ChatCoordinator, ChatModel, ChatSession, ChunkingConfig,
    DocumentLibrary, Embedder, GeminiClient, GeminiConfig, RetryPolicy, Role, ScoredChunk,
    SessionStore, TrigramHashEmbedder,
};
use std::collections::BTreeSet;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[derive(Parser)]
#[command(name = "docchat", version)]
struct Cli {
    #[command(subcommand)]
    command: Command,

    /// Directory holding thread indexes and chat sessions
    #[arg(long, env = "DOCCHAT_DATA_DIR", default_value = ".docchat")]
    data_dir: PathBuf,

    /// Gemini API key
    #[arg(long, env = "GOOGLE_API_KEY", hide_env_values = true)]
    api_key: Option<String>,

    /// Gemini REST base URL
    #[arg(long, default_value = DEFAULT_BASE_URL)]
    gemini_url: String,

    /// Embedding model name
    #[arg(long, default_value = DEFAULT_EMBEDDING_MODEL)]
    embedding_model: String,

    /// Optional reduced embedding dimensionality
    #[arg(long)]
    embedding_dimensions: Option<usize>,

    /// Chat model name
    #[arg(long, default_value = DEFAULT_CHAT_MODEL)]
    chat_model: String,

    /// Which embedder builds and queries indexes. Must match between ingest and query.
    #[arg(long, value_enum, default_value_t = EmbedderKind::Gemini)]
    embedder: EmbedderKind,

    /// Chunk size in characters
    #[arg(long, default_value = "1000")]
    chunk_size: usize,

    /// Overlap between consecutive chunks in characters
    #[arg(long, default_value = "200")]
    chunk_overlap: usize,

    /// Chunks retrieved per question
    #[arg(long, default_value_t = DEFAULT_TOP_K)]
    top_k: usize,

    /// Retries for transient service failures
    #[arg(long, default_value_t = DEFAULT_RETRIES)]
    retries: u32,

    /// Base backoff between retries in milliseconds (doubles per retry)
    #[arg(long, default_value_t = DEFAULT_BACKOFF_MS)]
    backoff_ms: u64,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
enum EmbedderKind {
    /// Hosted Gemini embeddings.
    Gemini,
    /// Local trigram hashing, no network.
    Offline,
}

#[derive(Subcommand)]
enum Command {
    /// Start a new chat thread and print its id.
    NewThread,
    /// Index a PDF (or a folder of PDFs) for a thread, replacing its previous document.
    Ingest {
        #[arg(long)]
        thread: String,
        /// Single PDF file.
        #[arg(long, conflicts_with = "folder", required_unless_present = "folder")]
        pdf: Option<PathBuf>,
        /// Folder searched recursively for PDFs.
        #[arg(long)]
        folder: Option<PathBuf>,
    },
    /// Print the chunks closest to a query.
    Retrieve {
        #[arg(long)]
        thread: String,
        #[arg(long)]
        query: String,
        /// Overrides the global --top-k.
        #[arg(long)]
        top_k: Option<usize>,
    },
    /// Print the grounded prompt for a question without calling the chat model.
    Prompt {
        #[arg(long)]
        thread: String,
        #[arg(long)]
        question: String,
    },
    /// Answer a question from the thread's document and record it in the session.
    Ask {
        #[arg(long)]
        thread: String,
        #[arg(long)]
        question: String,
        /// Also print the retrieved chunks.
        #[arg(long, default_value_t = false)]
        show_context: bool,
    },
    /// List known threads with their documents.
    Threads,
    /// Print a thread's chat transcript.
    History {
        #[arg(long)]
        thread: String,
    },
    /// Detach the document from a thread.
    Clear {
        #[arg(long)]
        thread: String,
        /// Delete the chat transcript too.
        #[arg(long, default_value_t = false)]
        forget_history: bool,
    },
}

impl Cli {
    fn index_dir(&self) -> PathBuf {
        self.data_dir.join("indexes")
    }

    fn sessions(&self) -> SessionStore {
        SessionStore::new(self.data_dir.join("sessions"))
    }

    fn chunking(&self) -> anyhow::Result<ChunkingConfig> {
        Ok(ChunkingConfig::new(self.chunk_size, self.chunk_overlap)?)
    }

    fn gemini(&self) -> anyhow::Result<Arc<GeminiClient>> {
        let mut config = match self.api_key.as_deref().map(str::trim).filter(|key| !key.is_empty()) {
            Some(key) => GeminiConfig::new(key),
            None => GeminiConfig::from_env()
                .context("no Gemini API key: pass --api-key or set GOOGLE_API_KEY / GEMINI_API_KEY")?,
        };
        config.base_url = self.gemini_url.clone();
        config.embedding_model = self.embedding_model.clone();
        config.chat_model = self.chat_model.clone();
        config.embedding_dimensions = self.embedding_dimensions;
        config.retry = RetryPolicy {
            max_retries: self.retries,
            base_delay: Duration::from_millis(self.backoff_ms),
        };
        Ok(Arc::new(GeminiClient::new(config)?))
    }

    fn embedder(&self) -> anyhow::Result<Arc<dyn Embedder>> {
        let embedder: Arc<dyn Embedder> = match self.embedder {
            EmbedderKind::Gemini => self.gemini()?,
            EmbedderKind::Offline => Arc::new(TrigramHashEmbedder::default()),
        };
        Ok(embedder)
    }

    /// Library restored from disk. `embedder` is only consulted when something is embedded.
    fn library(&self, embedder: Arc<dyn Embedder>) -> anyhow::Result<Arc<DocumentLibrary>> {
        let library = DocumentLibrary::new(embedder, self.chunking()?)?;
        let restored = library
            .restore(&self.index_dir())
            .with_context(|| format!("reading indexes under {}", self.index_dir().display()))?;
        info!(threads = restored, "library opened");
        Ok(Arc::new(library))
    }

    /// For commands that never embed anything.
    fn maintenance_library(&self) -> anyhow::Result<Arc<DocumentLibrary>> {
        self.library(Arc::new(TrigramHashEmbedder::default()))
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let app_version = env!("CARGO_PKG_VERSION");

    tracing_subscriber::registry()
        .with(EnvFilter::from_default_env())
        .with(fmt::layer())
        .init();

    let cli = Cli::parse();
    info!(
        version = app_version,
        started_at = %Utc::now().to_rfc3339(),
        data_dir = %cli.data_dir.display(),
        "docchat boot"
    );

    run(&cli).await
}

async fn run(cli: &Cli) -> anyhow::Result<()> {
    let sessions = cli.sessions();

    match &cli.command {
        Command::NewThread => {
            let thread_id = ChatSession::generate_thread_id();
            sessions.save(&ChatSession::new(&thread_id))?;
            println!("{thread_id}");
        }
        Command::Ingest {
            thread,
            pdf,
            folder,
        } => {
            let library = cli.library(cli.embedder()?)?;
            let summary = match (pdf, folder) {
                (Some(path), _) => library.ingest_pdf_path(thread, path).await?,
                (None, Some(folder)) => {
                    let set = ingest_folder(folder, library.embedder().as_ref(), cli.chunking()?).await?;
                    library.install(thread, set)
                }
                (None, None) => bail!("pass --pdf or --folder"),
            };
            library.persist(&cli.index_dir())?;

            let session = sessions.load_or_create(thread)?;
            sessions.save(&session)?;

            println!(
                "{} chunks from {} page(s) of {} indexed for thread {} at {}",
                summary.chunks,
                summary.pages,
                summary.filename,
                thread,
                summary.ingested_at.to_rfc3339()
            );
        }
        Command::Retrieve {
            thread,
            query,
            top_k,
        } => {
            let library = cli.library(cli.embedder()?)?;
            if !library.has_document(thread) {
                warn!(thread = %thread, "thread has no document");
            }
            let hits = library
                .retrieve(thread, query, top_k.unwrap_or(cli.top_k))
                .await
                .context("retrieval unavailable")?;

            println!("query: {query}");
            if hits.is_empty() {
                println!("no relevant context found");
            }
            print_hits(&hits);
        }
        Command::Prompt { thread, question } => {
            let library = cli.library(cli.embedder()?)?;
            let hits = library
                .retrieve(thread, question, cli.top_k)
                .await
                .context("retrieval unavailable")?;
            print!("{}", compose_prompt(question, &hits));
        }
        Command::Ask {
            thread,
            question,
            show_context,
        } => {
            let gemini = cli.gemini()?;
            let embedder: Arc<dyn Embedder> = match cli.embedder {
                EmbedderKind::Gemini => gemini.clone(),
                EmbedderKind::Offline => Arc::new(TrigramHashEmbedder::default()),
            };
            let model: Arc<dyn ChatModel> = gemini;
            let coordinator = ChatCoordinator::new(cli.library(embedder)?, model, cli.top_k);

            let mut session = sessions.load_or_create(thread)?;
            let answer = coordinator.answer(&mut session, question).await?;
            sessions.save(&session)?;

            println!("{}", answer.text.trim_end());
            if *show_context {
                println!();
                if answer.context.is_empty() {
                    println!("(no relevant context was found)");
                }
                print_hits(&answer.context);
            }
        }
        Command::Threads => {
            let library = cli.maintenance_library()?;
            let threads = sessions
                .list_threads()?
                .into_iter()
                .chain(library.threads())
                .collect::<BTreeSet<_>>();

            if threads.is_empty() {
                println!("no threads yet");
            }
            for thread in threads {
                let messages = sessions
                    .load(&thread)?
                    .map(|session| session.messages.len())
                    .unwrap_or(0);
                match library.summary(&thread) {
                    Some(summary) => println!(
                        "{thread} messages={messages} document={} pages={} chunks={}",
                        summary.filename, summary.pages, summary.chunks
                    ),
                    None => println!("{thread} messages={messages} document=none"),
                }
            }
        }
        Command::History { thread } => {
            let Some(session) = sessions.load(thread)? else {
                bail!("no session for thread {thread}");
            };
            for message in &session.messages {
                let role = match message.role {
                    Role::User => "user",
                    Role::Assistant => "assistant",
                };
                println!("[{} {}]\n{}\n", role, message.at.to_rfc3339(), message.content);
            }
        }
        Command::Clear {
            thread,
            forget_history,
        } => {
            let library = cli.maintenance_library()?;
            let removed = library.clear(thread);
            library.persist(&cli.index_dir())?;
            let forgotten = *forget_history && sessions.delete(thread)?;
            println!("thread={thread} document_removed={removed} history_removed={forgotten}");
        }
    }

    Ok(())
}

fn print_hits(hits: &[ScoredChunk]) {
    for (rank, hit) in hits.iter().enumerate() {
        println!(
            "[{}] distance={:.4} pages={}-{} chunk={}",
            rank + 1,
            hit.distance,
            hit.chunk.page_start,
            hit.chunk.page_end,
            hit.chunk.chunk_id
        );
        println!("  chunk_text:\n{}", hit.chunk.text);
    }
}
