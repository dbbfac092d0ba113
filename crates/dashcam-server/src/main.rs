mod config;
mod export;
mod http;
mod metrics;
mod state;

use anyhow::Context;
use clap::{Parser, Subcommand};
use config::{Config, LocationSource, RunArgs};
use dashcam_capture::{
    Camera, CaptureEvent, CaptureLoop, FixedLocator, Locator, SpoolCamera, TrackLocator,
};
use dashcam_core::{Gallery, LocalFs, SessionStore, SystemClock};
use http::router;
use state::AppState;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "dashcam")]
#[command(about = "Periodic geotagged still capture into per-session folders")]
struct Cli {
    /// Storage root; sessions live under <root>/dashcam
    #[arg(long, global = true, env = "DASHCAM_ROOT", default_value = ".")]
    root: PathBuf,
    /// Emit logs as JSON lines
    #[arg(long, global = true)]
    log_json: bool,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the capture loop and the HTTP API
    Run(RunArgs),
    /// List session folders, newest first
    Sessions,
    /// List the photos of one session
    Photos {
        session: String,
    },
    /// Bundle a session into a zip with a manifest
    Export {
        session: String,
        /// Output directory (defaults to <root>/exports)
        #[arg(long)]
        out: Option<PathBuf>,
    },
    /// Delete a session, or only some of its photos
    Delete {
        session: String,
        /// Photo names to delete (comma-separated); whole session when omitted
        #[arg(long, value_delimiter = ',')]
        photos: Vec<String>,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.log_json);

    match cli.command {
        Commands::Run(args) => {
            let config = Config::from_args(&cli.root, &args).context("Invalid run configuration")?;
            run_capture(config).await?;
        }
        Commands::Sessions => list_sessions(&cli.root)?,
        Commands::Photos { session } => list_photos(&cli.root, &session)?,
        Commands::Export { session, out } => {
            let out = out.unwrap_or_else(|| cli.root.join("exports"));
            let path = export::export_session(&open_gallery(&cli.root), &session, &out)?;
            println!("{}", path.display());
        }
        Commands::Delete { session, photos } => {
            let gallery = open_gallery(&cli.root);
            if photos.is_empty() {
                gallery.delete_sessions(&[session.clone()])?;
                println!("Deleted {}", session);
            } else {
                let deleted = gallery.delete_photos(&session, &photos)?;
                println!("Deleted {} photo(s)", deleted);
            }
        }
    }

    Ok(())
}

fn init_tracing(json: bool) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let builder = tracing_subscriber::fmt().with_env_filter(filter);
    if json {
        builder.json().init();
    } else {
        builder.init();
    }
}

fn open_gallery(root: &Path) -> Gallery {
    Gallery::new(SessionStore::new(root, Arc::new(LocalFs)))
}

async fn run_capture(config: Config) -> anyhow::Result<()> {
    info!("Starting dashcam");
    info!(
        "Root: {:?}, spool: {:?}, interval: {:?}, quality: {}, HTTP: {}",
        config.root, config.spool_dir, config.capture.interval, config.capture.quality, config.http
    );

    let metrics_handle = metrics::install_exporter()
        .context("Failed to install Prometheus metrics exporter")?;

    let camera: Arc<dyn Camera> = Arc::new(SpoolCamera::new(&config.spool_dir, &config.staging_dir));
    let locator: Arc<dyn Locator> = match &config.location {
        LocationSource::Fixed(fix) => Arc::new(FixedLocator::new(*fix)),
        LocationSource::Track { path, speed } => Arc::new(
            TrackLocator::load(path, *speed)
                .with_context(|| format!("Failed to load track {:?}", path))?,
        ),
    };
    let store = SessionStore::new(&config.root, Arc::new(LocalFs));

    let (event_tx, event_rx) = mpsc::unbounded_channel();
    let capture = CaptureLoop::with_events(
        camera,
        locator,
        store,
        Arc::new(SystemClock),
        config.capture,
        event_tx,
    );

    let state = AppState::new(
        capture.clone(),
        config.library_dir.clone(),
        config.export_dir.clone(),
    )
    .with_metrics(metrics_handle);

    let state_clone = state.clone();
    let processor_handle = tokio::spawn(async move {
        process_capture_events(&state_clone, event_rx).await;
    });

    if config.autostart {
        capture.start().await.context("Failed to start capture")?;
    }

    let listener = tokio::net::TcpListener::bind(&config.http)
        .await
        .with_context(|| format!("Failed to bind {}", config.http))?;
    info!("HTTP server listening on http://{}", config.http);
    let app = router(state);
    let server_handle = tokio::spawn(async move { axum::serve(listener, app).await });

    tokio::select! {
        _ = tokio::signal::ctrl_c() => {
            info!("Interrupted, shutting down");
        }
        result = server_handle => {
            match result {
                Ok(Ok(())) => warn!("HTTP server task ended"),
                Ok(Err(e)) => error!("HTTP server error: {}", e),
                Err(e) => error!("HTTP server task failed: {}", e),
            }
        }
        _ = processor_handle => {
            warn!("Event processor task ended");
        }
    }

    if let Some(session) = capture.shutdown().await {
        info!("Closed session {}", session.id);
    }
    Ok(())
}

async fn process_capture_events(state: &AppState, mut rx: mpsc::UnboundedReceiver<CaptureEvent>) {
    while let Some(event) = rx.recv().await {
        state.apply_capture_event(event).await;
    }
}

fn list_sessions(root: &Path) -> anyhow::Result<()> {
    let sessions = open_gallery(root).list_sessions()?;
    if sessions.is_empty() {
        println!("No sessions under {:?}", root.join(dashcam_core::DASHCAM_DIR));
    }
    for session in sessions {
        println!("{:<24} {:>6} photo(s)", session.id, session.photo_count);
    }
    Ok(())
}

fn list_photos(root: &Path, session_id: &str) -> anyhow::Result<()> {
    for photo in open_gallery(root).list_photos(session_id)? {
        let position = photo
            .fix
            .map(|f| format!("{:.6},{:.6}", f.latitude, f.longitude))
            .unwrap_or_else(|| "-".to_string());
        println!("{:<56} {:>9} B  {}", photo.name, photo.size, position);
    }
    Ok(())
}
