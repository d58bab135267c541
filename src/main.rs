use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use parley_recorder::{
    create_router, AppState, CaptureProviderFactory, CaptureSource, Config, Party,
    SessionController, SettingsStore, StartOutcome, StartRequest,
};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

const DEFAULT_CONFIG: &str = "config/parley-recorder";

#[derive(Parser)]
#[command(name = "parley-recorder", version, about = "Timed audio capture for two-party translation")]
struct Cli {
    /// Config file (extension optional); defaults to config/parley-recorder if present
    #[arg(long, global = true)]
    config: Option<String>,

    /// Capture source (tone or microphone), overriding the config
    #[arg(long, global = true)]
    source: Option<CaptureSource>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Record one session and report the finished artifact
    Record {
        /// Party to record for
        #[arg(long, default_value = "person1")]
        mode: Party,

        /// Countdown in seconds (defaults to the configured value)
        #[arg(long)]
        countdown: Option<u32>,

        /// Stop manually after this many seconds
        #[arg(long)]
        stop_after: Option<u64>,

        /// Export the recording to this WAV file
        #[arg(long)]
        output: Option<PathBuf>,
    },

    /// Serve the HTTP control API
    Serve {
        /// Port override
        #[arg(long)]
        port: Option<u16>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt::init();

    let cli = Cli::parse();
    let mut cfg = match &cli.config {
        Some(path) => Config::load(path)?,
        None => Config::load_optional(DEFAULT_CONFIG)?,
    };
    if let Some(source) = cli.source {
        cfg.capture.source = source;
    }

    info!("{} v{}", cfg.service.name, env!("CARGO_PKG_VERSION"));
    info!("Capture source: {}", cfg.capture.source);

    match cli.command {
        Command::Record {
            mode,
            countdown,
            stop_after,
            output,
        } => record(cfg, mode, countdown, stop_after, output).await,
        Command::Serve { port } => serve(cfg, port).await,
    }
}

async fn record(
    cfg: Config,
    mode: Party,
    countdown: Option<u32>,
    stop_after: Option<u64>,
    output: Option<PathBuf>,
) -> Result<()> {
    let settings = SettingsStore::new(&cfg.parties).get(mode);
    info!(
        "Recording {} ({} -> {})",
        mode, settings.input_language, settings.output_language
    );

    let provider = CaptureProviderFactory::create(&cfg.capture)?;
    let controller = SessionController::spawn(cfg.session, provider);
    let mut snapshots = controller.subscribe();

    let request = StartRequest {
        mode: Some(mode),
        countdown_secs: countdown,
    };
    match controller.start(request).await? {
        StartOutcome::Started => {}
        StartOutcome::AlreadyActive => warn!("A recording was already in progress"),
        StartOutcome::Unavailable(reason) => {
            warn!("Capture unavailable: {}", reason);
            controller.shutdown().await?;
            return Ok(());
        }
    }

    let manual_stop = async {
        match stop_after {
            Some(secs) => tokio::time::sleep(Duration::from_secs(secs)).await,
            None => std::future::pending().await,
        }
    };

    tokio::select! {
        _ = manual_stop => {
            controller.stop().await?;
        }
        _ = tokio::signal::ctrl_c() => {
            info!("Interrupted, stopping recording");
            controller.stop().await?;
        }
        _ = snapshots.wait_for(|s| s.artifact_ref.is_some()) => {}
    }

    let artifact_ref = snapshots
        .wait_for(|s| s.artifact_ref.is_some())
        .await
        .context("Session controller exited before the recording finished")?
        .artifact_ref
        .clone()
        .context("Snapshot lost its artifact reference")?;

    let artifact = controller
        .artifacts()
        .resolve(&artifact_ref)
        .context("Artifact was revoked before it could be read")?;

    info!(
        "Recorded {:.1}s for {} as {} ({})",
        artifact.duration_secs(),
        artifact.mode,
        artifact_ref,
        artifact.mime_type()
    );

    if let Some(path) = output {
        artifact.write_wav(&path)?;
    }

    controller.shutdown().await?;
    Ok(())
}

async fn serve(cfg: Config, port: Option<u16>) -> Result<()> {
    let provider = CaptureProviderFactory::create(&cfg.capture)?;
    let controller = SessionController::spawn(cfg.session.clone(), provider);
    let settings = Arc::new(SettingsStore::new(&cfg.parties));
    let app = create_router(AppState::new(controller.clone(), settings));

    let addr = format!(
        "{}:{}",
        cfg.service.http.bind,
        port.unwrap_or(cfg.service.http.port)
    );
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind {}", addr))?;

    info!("HTTP server listening on {}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
        })
        .await
        .context("HTTP server failed")?;

    controller.shutdown().await?;
    info!("Shut down");
    Ok(())
}
