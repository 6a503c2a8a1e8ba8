// crates/p2n-cli/src/main.rs
// ============================================================================
// Module: Paper2Notebook CLI Entry Point
// Description: Command dispatcher for the reproduction pipeline.
// Purpose: Drive ingest through report against local stores for development.
// Dependencies: clap, env_logger, log, p2n crates, serde_json, tokio
// ============================================================================

//! ## Overview
//! The `p2n` binary wires the pipeline over local backends: a `SQLite`
//! metadata store, a filesystem blob store, the built-in dataset registry,
//! and the HTTP LLM provider. Each subcommand maps onto one pipeline
//! operation and prints the typed error code on failure.
//!
//! The index provider here is a development stand-in deriving handles from
//! content checksums; production deployments wire the hosted provider behind
//! the same interface.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::io::Write;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use async_trait::async_trait;
use clap::Parser;
use clap::Subcommand;
use p2n_agents::HttpLlmConfig;
use p2n_agents::HttpLlmProvider;
use p2n_blobstore::FsBlobStore;
use p2n_broker::RunStreamBroker;
use p2n_config::Settings;
use p2n_core::ClaimId;
use p2n_core::IndexHandle;
use p2n_core::PaperId;
use p2n_core::PlanId;
use p2n_core::TypedError;
use p2n_core::hashing::sha256_hex;
use p2n_core::interfaces::IndexError;
use p2n_core::interfaces::IndexProvider;
use p2n_executor::KernelConfig;
use p2n_pipeline::IngestRequest;
use p2n_pipeline::NoopMetrics;
use p2n_pipeline::PdfSource;
use p2n_pipeline::Pipeline;
use p2n_pipeline::PipelineDeps;
use p2n_pipeline::StoreReplaySource;
use p2n_pipeline::UploadRequest;
use p2n_registry::DatasetRegistry;
use p2n_store_sqlite::SqliteJournalMode;
use p2n_store_sqlite::SqliteMetadataStore;
use p2n_store_sqlite::SqliteStoreConfig;
use tokio_stream::StreamExt;

// ============================================================================
// SECTION: Arguments
// ============================================================================

/// Paper2Notebook: reproduce quantitative claims from research papers.
#[derive(Debug, Parser)]
#[command(name = "p2n", version, about)]
struct Cli {
    /// Subcommand to run.
    #[command(subcommand)]
    command: Command,
}

/// CLI subcommands, one per pipeline operation.
#[derive(Debug, Subcommand)]
enum Command {
    /// Ingest a paper PDF from a file or URL.
    Ingest {
        /// Path to a local PDF file.
        #[arg(long, conflicts_with = "url")]
        file: Option<PathBuf>,
        /// URL to fetch the PDF from.
        #[arg(long)]
        url: Option<String>,
        /// Human title for the paper.
        #[arg(long)]
        title: String,
        /// Optional dataset file uploaded with the paper.
        #[arg(long)]
        dataset: Option<PathBuf>,
    },
    /// Extract claims from an ingested paper.
    Extract {
        /// Paper identifier.
        paper_id: String,
    },
    /// Synthesize a plan from selected claims.
    Plan {
        /// Paper identifier.
        paper_id: String,
        /// Selected claim identifiers.
        #[arg(long, required = true, num_args = 1..)]
        claims: Vec<String>,
        /// Budget in minutes.
        #[arg(long, default_value_t = 10)]
        budget: u32,
    },
    /// Materialize the notebook for a plan.
    Materialize {
        /// Plan identifier.
        plan_id: String,
    },
    /// Execute a materialized plan and follow its event stream.
    Run {
        /// Plan identifier.
        plan_id: String,
    },
    /// Report the claimed-versus-observed gap for a paper.
    Report {
        /// Paper identifier.
        paper_id: String,
    },
    /// List the built-in dataset registry.
    Registry,
    /// Delete a paper and everything it owns.
    Delete {
        /// Paper identifier.
        paper_id: String,
    },
}

// ============================================================================
// SECTION: Index Stand-In
// ============================================================================

/// Development index provider deriving handles from content checksums.
///
/// # Invariants
/// - Handles are deterministic per content; no remote state exists.
struct ChecksumIndexProvider;

#[async_trait]
impl IndexProvider for ChecksumIndexProvider {
    async fn create_index(&self, bytes: &[u8], _filename: &str) -> Result<IndexHandle, IndexError> {
        Ok(IndexHandle::new(format!("local-{}", &sha256_hex(bytes)[..16])))
    }

    async fn delete_index(&self, _handle: &IndexHandle) -> Result<(), IndexError> {
        Ok(())
    }
}

// ============================================================================
// SECTION: Entry Point
// ============================================================================

/// CLI entry point.
#[tokio::main]
async fn main() -> ExitCode {
    env_logger::init();
    let cli = Cli::parse();
    match dispatch(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(error) => {
            log::error!("{}: {}", error.code, error.message);
            emit_line(&format!("error {}: {}", error.code, error.message));
            if let Some(hint) = error.code.remediation() {
                emit_line(&format!("hint: {hint}"));
            }
            ExitCode::FAILURE
        }
    }
}

/// Builds the pipeline and dispatches one subcommand.
async fn dispatch(cli: Cli) -> Result<(), TypedError> {
    let settings = Settings::from_env().map_err(|err| {
        TypedError::new(p2n_core::ErrorCode::MetadataStoreFailure, err.to_string())
    })?;
    let pipeline = build_pipeline(&settings)?;

    match cli.command {
        Command::Ingest {
            file,
            url,
            title,
            dataset,
        } => {
            let source = match (file, url) {
                (Some(path), None) => PdfSource::Bytes(read_file(&path)?),
                (None, Some(url)) => PdfSource::Url(url),
                _ => {
                    return Err(TypedError::new(
                        p2n_core::ErrorCode::UnsupportedMediaType,
                        "pass exactly one of --file or --url",
                    ));
                }
            };
            let dataset_upload = match dataset {
                None => None,
                Some(path) => Some(UploadRequest {
                    filename: path
                        .file_name()
                        .map(|name| name.to_string_lossy().to_string())
                        .unwrap_or_else(|| "dataset.csv".to_string()),
                    bytes: read_file(&path)?,
                }),
            };
            let paper = pipeline
                .ingest(IngestRequest {
                    source,
                    title,
                    dataset_upload,
                })
                .await?;
            emit_line(&format!("paper {} stage {}", paper.id, paper.stage.as_str()));
            Ok(())
        }
        Command::Extract {
            paper_id,
        } => {
            let claims = pipeline.extract(&PaperId::new(paper_id), None).await?;
            for claim in claims {
                emit_line(&format!(
                    "claim {} dataset \"{}\" {} = {}{} ({})",
                    claim.id,
                    claim.dataset_name,
                    claim.metric_name,
                    claim.metric_value,
                    claim.units,
                    claim.source_citation,
                ));
            }
            Ok(())
        }
        Command::Plan {
            paper_id,
            claims,
            budget,
        } => {
            let claim_ids: Vec<ClaimId> = claims.into_iter().map(ClaimId::new).collect();
            let plan = pipeline.plan(&PaperId::new(paper_id), &claim_ids, budget, None).await?;
            emit_line(&format!(
                "plan {} dataset {} goal {} budget {}m",
                plan.id,
                plan.document.dataset.name,
                plan.document.metrics.goal,
                plan.document.policy.budget_minutes,
            ));
            Ok(())
        }
        Command::Materialize {
            plan_id,
        } => {
            let outcome = pipeline.materialize(&PlanId::new(plan_id)).await?;
            emit_line(&format!("notebook {}", outcome.notebook_path));
            emit_line(&format!("requirements {}", outcome.requirements_path));
            emit_line(&format!("fingerprint {}", outcome.fingerprint));
            Ok(())
        }
        Command::Run {
            plan_id,
        } => {
            let run = pipeline.run(&PlanId::new(plan_id)).await?;
            emit_line(&format!("run {} started", run.id));
            let mut stream = pipeline.broker().subscribe(&run.id).map_err(|err| {
                TypedError::new(p2n_core::ErrorCode::RunNotFound, err.to_string())
            })?;
            while let Some((event_type, payload)) = stream.next().await {
                emit_line(&format!("event {event_type} {payload}"));
            }
            Ok(())
        }
        Command::Report {
            paper_id,
        } => {
            let report = pipeline.report(&PaperId::new(paper_id)).await?;
            let rendered = serde_json::to_string_pretty(&report).unwrap_or_default();
            emit_line(&rendered);
            Ok(())
        }
        Command::Registry => {
            let registry = DatasetRegistry::builtin().map_err(|err| {
                TypedError::new(p2n_core::ErrorCode::MetadataStoreFailure, err.to_string())
            })?;
            for entry in registry.entries() {
                emit_line(&format!(
                    "{} [{}] ~{} MB: {}",
                    entry.canonical_name,
                    entry.source.as_str(),
                    entry.size_mb,
                    entry.description,
                ));
            }
            Ok(())
        }
        Command::Delete {
            paper_id,
        } => {
            let paper_id = PaperId::new(paper_id);
            pipeline.delete_paper(&paper_id).await?;
            emit_line(&format!("deleted paper {paper_id}"));
            Ok(())
        }
    }
}

// ============================================================================
// SECTION: Wiring
// ============================================================================

/// Builds the pipeline over local backends from the settings.
fn build_pipeline(settings: &Settings) -> Result<Pipeline, TypedError> {
    let external = |message: String| {
        TypedError::new(p2n_core::ErrorCode::MetadataStoreFailure, message)
    };

    let store = Arc::new(
        SqliteMetadataStore::open(&SqliteStoreConfig {
            path: PathBuf::from(&settings.metadata_store.url),
            busy_timeout_ms: 5_000,
            journal_mode: SqliteJournalMode::Wal,
        })
        .map_err(|err| external(err.to_string()))?,
    );
    let signing_secret = settings
        .object_store
        .key
        .clone()
        .unwrap_or_else(|| "p2n-dev-secret".to_string());
    let blobs = Arc::new(
        FsBlobStore::new(&settings.object_store.url, signing_secret.into_bytes())
            .map_err(|err| external(err.to_string()))?,
    );
    let base_url = settings
        .llm
        .api_base_url
        .clone()
        .ok_or_else(|| external("LLM_API_BASE_URL is required for the CLI".to_string()))?;
    let provider = Arc::new(
        HttpLlmProvider::new(HttpLlmConfig::new(base_url, settings.llm.api_key.clone()))
            .map_err(|err| external(err.to_string()))?,
    );
    let registry = Arc::new(
        DatasetRegistry::builtin().map_err(|err| external(err.to_string()))?,
    );
    let broker = Arc::new(RunStreamBroker::new(Arc::new(StoreReplaySource::new(
        store.clone(),
    ))));

    Pipeline::new(PipelineDeps {
        settings: settings.clone(),
        store,
        blobs,
        index: Arc::new(ChecksumIndexProvider),
        provider,
        registry,
        broker,
        kernel: KernelConfig::default(),
        metrics: Arc::new(NoopMetrics),
    })
}

// ============================================================================
// SECTION: Output Helpers
// ============================================================================

/// Reads a file into memory with a typed error.
fn read_file(path: &PathBuf) -> Result<Vec<u8>, TypedError> {
    std::fs::read(path).map_err(|err| {
        TypedError::new(
            p2n_core::ErrorCode::UnsupportedMediaType,
            format!("cannot read {}: {err}", path.display()),
        )
    })
}

/// Writes one line to standard output.
fn emit_line(message: &str) {
    let mut stdout = std::io::stdout();
    if writeln!(&mut stdout, "{message}").is_err() {
        // A closed stdout ends output silently.
    }
}
