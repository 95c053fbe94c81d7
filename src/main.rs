use anyhow::Result;
use clap::{Parser, Subcommand};
use colored::*;
use std::path::PathBuf;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

use kbqa_cli::{
    display_banner, format_hits, format_index_report, handle_input_with_history, parse_chat_input,
    print_answer, print_help, ChatInput,
};
use kbqa_llm::{ChatClient, EmbeddingConfig, LlmConfig};
use kbqa_rag::{
    AnswerLoop, AnswerOptions, ChunkStore, CompletionService, DocumentIngestor, Embedder,
    EmbeddingProvider, IndexBuilder, IngestConfig, LocalVectorStore, QdrantVectorStore,
    QueryExpander, RagConfig, RetrievalMerger, RetrievalTool, VectorBackend, VectorIndex,
};

#[derive(Parser)]
#[command(name = "kbqa")]
#[command(about = "Ask questions about your own documents", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Ingest files or directories into the vector index
    Index {
        #[arg(required = true)]
        paths: Vec<PathBuf>,
        /// Drop the collection before indexing
        #[arg(long)]
        reset: bool,
        /// Index even if the collection already has records
        #[arg(long)]
        force: bool,
    },
    /// Answer a single question
    Ask {
        question: String,
        #[arg(short, long)]
        k: Option<usize>,
        #[arg(long)]
        max_rounds: Option<usize>,
        /// One retrieval and one completion, no decision rounds
        #[arg(long)]
        once: bool,
        /// Print the rounds that were run
        #[arg(long)]
        trace: bool,
    },
    /// Show what retrieval returns for a query
    Search {
        query: String,
        #[arg(short, long, default_value_t = 5)]
        k: usize,
        /// Render merged, alias-expanded results as prompt context
        #[arg(long)]
        context: bool,
    },
    /// Show index statistics
    Stats,
    /// Interactive question answering
    Chat,
}

fn init_tracing() {
    let filter = EnvFilter::try_from_env("KBQA_LOG").unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}

async fn open_index(
    config: &RagConfig,
    embedder: Arc<dyn Embedder>,
) -> Result<Arc<dyn VectorIndex>> {
    let index: Arc<dyn VectorIndex> = match config.backend {
        VectorBackend::Local => Arc::new(LocalVectorStore::open(&config.store_path, embedder)?),
        VectorBackend::Qdrant => Arc::new(
            QdrantVectorStore::connect(&config.qdrant_url, &config.collection, embedder).await?,
        ),
    };
    Ok(index)
}

fn answer_loop(config: &RagConfig, index: Arc<dyn VectorIndex>) -> Result<AnswerLoop> {
    let llm: Arc<dyn CompletionService> = Arc::new(ChatClient::new(LlmConfig::from_env()?)?);
    let retriever = RetrievalMerger::new(index, QueryExpander::default())
        .with_call_timeout(config.call_timeout());
    Ok(AnswerLoop::new(retriever, llm)
        .with_budget(config.budget())
        .with_call_timeout(config.call_timeout()))
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    init_tracing();
    let cli = Cli::parse();

    let config = RagConfig::from_env()?;
    let provider = EmbeddingProvider::new(EmbeddingConfig::from_env()?, config.call_timeout());
    let embedder = provider.get()?;
    let index = open_index(&config, embedder.clone()).await?;

    match cli.command {
        Commands::Index { paths, reset, force } => {
            let store = Arc::new(ChunkStore::new(index, embedder)?);
            let ingestor = Arc::new(DocumentIngestor::new(IngestConfig::default())?);
            let report = IndexBuilder::new(ingestor, store)
                .build_index(&paths, reset, !force)
                .await?;
            println!("{}", format_index_report(&report).green());
        }
        Commands::Ask {
            question,
            k,
            max_rounds,
            once,
            trace,
        } => {
            let engine = answer_loop(&config, index)?;
            let defaults = config.answer_options();
            let options = AnswerOptions {
                k: k.unwrap_or(defaults.k),
                max_rounds: max_rounds.unwrap_or(defaults.max_rounds),
            };
            if once {
                print_answer(&engine.answer_once(&question, options.k).await, None);
            } else {
                let (answer, rounds) = engine.answer_with_trace(&question, options).await;
                print_answer(&answer, trace.then_some(&rounds));
            }
        }
        Commands::Search { query, k, context } => {
            if context {
                let retriever = Arc::new(
                    RetrievalMerger::new(index, QueryExpander::default())
                        .with_call_timeout(config.call_timeout()),
                );
                let tool = RetrievalTool::new(retriever)
                    .with_k(k)
                    .with_max_chars(config.max_context_chars);
                println!("{}", tool.run(&query).await);
            } else {
                let hits = index.search(&query, k).await?;
                println!("{}", format_hits(&hits, 160));
            }
        }
        Commands::Stats => {
            let records = index.count().await?;
            println!("{} {:?}", "Backend:".bold(), config.backend);
            match config.backend {
                VectorBackend::Local => {
                    println!("{} {}", "Store:".bold(), config.store_path.display())
                }
                VectorBackend::Qdrant => println!(
                    "{} {} ({})",
                    "Collection:".bold(),
                    config.collection,
                    config.qdrant_url
                ),
            }
            println!(
                "{} {} ({} dims)",
                "Embedding:".bold(),
                embedder.model_id(),
                embedder.dimension()
            );
            println!("{} {}", "Chunks:".bold(), records);
        }
        Commands::Chat => {
            let records = index.count().await.unwrap_or(0);
            let engine = answer_loop(&config, index)?;
            display_banner(engine.model_id(), records);

            let options = config.answer_options();
            let mut history = Vec::new();
            loop {
                let input = handle_input_with_history(&mut history).await?;
                match parse_chat_input(&input) {
                    ChatInput::Empty => continue,
                    ChatInput::Help => print_help(),
                    ChatInput::Exit => {
                        println!("{}", "Goodbye!".green());
                        break;
                    }
                    ChatInput::Question(question) => {
                        println!("{}", "Thinking...".dimmed());
                        let (answer, trace) = engine.answer_with_trace(&question, options).await;
                        print_answer(&answer, Some(&trace));
                    }
                }
            }
        }
    }

    Ok(())
}
