// soma_frames - BODY organ daemon and CLI
// Movie frame retrieval accessible via Unix Domain Socket or one-shot commands

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::net::{UnixListener, UnixStream};
use tracing::{debug, error, info};
use tracing_subscriber::EnvFilter;

use soma_frames::organ::{FramesOrgan, Organ, Response, Stimulus};
use soma_frames::query::{QueryTarget, ResultCount};
use soma_frames::session::{EmbedderKind, FrameSession, SessionConfig};
use soma_frames::wire::{read_frame, write_frame};

#[derive(Parser)]
#[command(name = "soma_frames", version, about = "SOMA Frames - Movie Frame Retrieval Organ")]
struct Cli {
    #[command(flatten)]
    session: SessionArgs,

    #[command(subcommand)]
    command: Command,
}

#[derive(Args)]
struct SessionArgs {
    /// JSON snapshot file for the collection store (in-memory if omitted)
    #[arg(long, global = true)]
    store: Option<PathBuf>,

    /// Embedding function used for frames and prompts
    #[arg(long, value_enum, default_value_t = EmbedderKind::Hash, global = true)]
    embedder: EmbedderKind,

    /// Unix socket of the embedding organ (remote embedder)
    #[arg(long, default_value = soma_frames::embed_client::DEFAULT_EMBED_SOCKET, global = true)]
    embed_socket: String,

    /// Embedding dimensionality
    #[arg(long, default_value_t = 512, global = true)]
    dimensions: usize,

    /// Parent directory for per-ingest scratch space
    #[arg(long, global = true)]
    scratch_dir: Option<PathBuf>,
}

impl SessionArgs {
    fn into_config(self) -> SessionConfig {
        SessionConfig {
            embedder: self.embedder,
            embed_socket: self.embed_socket,
            dimensions: self.dimensions,
            store_path: self.store,
            scratch_dir: self.scratch_dir,
            ..SessionConfig::default()
        }
    }
}

#[derive(Subcommand)]
enum Command {
    /// Serve organ requests over a Unix socket
    Serve {
        /// Unix socket path for UDS server
        #[arg(long, default_value = "/tmp/soma_frames.sock")]
        socket_path: String,
    },
    /// Extract and index one movie
    Ingest {
        /// Movie title
        #[arg(long)]
        title: String,
        /// Video file (mp4, mov, avi, mkv)
        video: PathBuf,
    },
    /// Query frames by text prompt
    Query {
        /// Text prompt, e.g. "a man with a hat"
        prompt: String,
        /// Results per movie (1-10)
        #[arg(short = 'n', long, default_value_t = 3)]
        n_results: usize,
        /// Restrict to one collection (e.g. movie_test_film); all movies otherwise
        #[arg(long)]
        collection: Option<String>,
    },
    /// List indexed movies
    List,
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();
    let session = FrameSession::open(cli.session.into_config())
        .context("Failed to open frame session")?;

    match cli.command {
        Command::Serve { socket_path } => serve(session, &socket_path).await,
        Command::Ingest { title, video } => {
            let report = session
                .ingest(&title, &video)
                .await
                .with_context(|| format!("Failed to ingest {}", video.display()))?;
            println!("{}", serde_json::to_string_pretty(&report)?);
            Ok(())
        }
        Command::Query { prompt, n_results, collection } => {
            let count = ResultCount::new(n_results)?;
            let target = match collection {
                Some(name) => QueryTarget::Collection(name),
                None => QueryTarget::All,
            };
            let groups = session.query(&prompt, count, &target).await.context("Query failed")?;
            println!("{}", serde_json::to_string_pretty(&groups)?);
            Ok(())
        }
        Command::List => {
            let movies = session.list_movies().await.context("Failed to list movies")?;
            println!("{}", serde_json::to_string_pretty(&movies)?);
            Ok(())
        }
    }
}

async fn serve(session: FrameSession, socket_path: &str) -> Result<()> {
    info!("🎬 Starting SOMA Frames Daemon");
    info!("   Socket: {}", socket_path);

    let start_time = std::time::Instant::now();
    let organ = Arc::new(FramesOrgan::new(Arc::new(session)));

    // Remove old socket if exists
    let path = PathBuf::from(socket_path);
    if path.exists() {
        std::fs::remove_file(&path).context("Failed to remove old socket")?;
    }

    let listener = UnixListener::bind(&path).context("Failed to bind Unix socket")?;
    info!("   ✓ Listening on {}", socket_path);

    loop {
        match listener.accept().await {
            Ok((stream, _addr)) => {
                let organ = Arc::clone(&organ);
                tokio::spawn(async move {
                    if let Err(e) = handle_connection(stream, organ, start_time).await {
                        error!("Connection error: {}", e);
                    }
                });
            }
            Err(e) => {
                error!("Accept error: {}", e);
            }
        }
    }
}

/// Handle a single UDS connection
async fn handle_connection(
    mut stream: UnixStream,
    organ: Arc<FramesOrgan>,
    start_time: std::time::Instant,
) -> Result<()> {
    loop {
        let Some(stimulus) = read_frame::<_, Stimulus>(&mut stream)
            .await
            .context("Failed to read stimulus")?
        else {
            debug!("Client disconnected");
            return Ok(());
        };

        debug!("Received: op={}", stimulus.op);

        // Health checks bypass the organ
        let response = if stimulus.op == "health" || stimulus.op == "health.check" {
            Response {
                ok: true,
                output: serde_json::json!({
                    "status": "healthy",
                    "organ": "soma_frames",
                    "version": env!("CARGO_PKG_VERSION"),
                    "uptime_ms": start_time.elapsed().as_millis() as u64,
                }),
                latency_ms: 0,
                cost: None,
            }
        } else {
            match organ.stimulate(stimulus).await {
                Ok(resp) => resp,
                Err(e) => {
                    error!("Stimulate error: {:?}", e);
                    Response {
                        ok: false,
                        output: serde_json::json!({ "error": e.to_string() }),
                        latency_ms: 0,
                        cost: None,
                    }
                }
            }
        };

        write_frame(&mut stream, &response)
            .await
            .context("Failed to write response")?;

        debug!("Sent: ok={}, latency={}ms", response.ok, response.latency_ms);
    }
}
