use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use clap::{Parser, Subcommand};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use spraywall::core::store::{FsRouteStore, RouteStore};
use spraywall::detection::{self, DetectionService, preprocessing};
use spraywall::{Config, WorkerPool, server};

#[derive(Parser)]
#[command(name = "spraywall")]
#[command(about = "Detect climbing holds and keep a catalogue of unique routes")]
struct Cli {
    #[command(flatten)]
    config: Config,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run the HTTP API
    Serve {
        /// Address to listen on
        #[arg(long, env = "SPRAYWALL_BIND", default_value = "0.0.0.0:8000")]
        bind: SocketAddr,
    },
    /// Detect holds in a local image
    Detect {
        /// Path to input image file
        #[arg(value_name = "IMAGE")]
        image_path: PathBuf,

        /// Write the resized image with every hold outlined to this path
        #[arg(long, value_name = "FILE")]
        annotated_out: Option<PathBuf>,

        /// Print detections as JSON
        #[arg(long)]
        json: bool,
    },
    /// List stored routes
    Routes,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| format!("{}=info,tower_http=debug", env!("CARGO_CRATE_NAME")).into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let cli = Cli::parse();
    match cli.command {
        Command::Serve { bind } => {
            let state = server::build_state(&cli.config).await?;
            server::serve(server::build_router(Arc::new(state)), bind).await
        }
        Command::Detect {
            image_path,
            annotated_out,
            json,
        } => detect(&cli.config, image_path, annotated_out, json).await,
        Command::Routes => {
            let store = FsRouteStore::open(&cli.config.routes_dir).await?;
            let routes = store.list_recent().await?;
            for route in &routes {
                println!("{route}");
            }
            println!("{} route(s) in {}", routes.len(), store.dir().display());
            Ok(())
        }
    }
}

async fn detect(
    config: &Config,
    image_path: PathBuf,
    annotated_out: Option<PathBuf>,
    json: bool,
) -> anyhow::Result<()> {
    let bytes = tokio::fs::read(&image_path)
        .await
        .with_context(|| format!("Failed to read {:?}", image_path))?;
    let img = preprocessing::decode_image(&bytes)?;
    tracing::info!(width = img.width(), height = img.height(), "image loaded");

    let service = DetectionService::new(Arc::new(config.detector()?), WorkerPool::new(config.workers))
        .with_canonical_size(config.canonical_size)
        .with_min_confidence(config.min_confidence);
    let result = service.detect(img).await?;

    if let Some(path) = annotated_out {
        let preview = detection::annotate_preview(&config.annotator()?, &result);
        preview
            .save(&path)
            .with_context(|| format!("Failed to write {:?}", path))?;
        tracing::info!(path = %path.display(), "wrote annotated image");
    }

    if json {
        println!("{}", serde_json::to_string_pretty(&result.detections)?);
        return Ok(());
    }

    println!("\n=== Hold Detection Results ===");
    println!("Total holds detected: {}", result.detections.len());
    for d in &result.detections {
        let (cx, cy) = d.bbox.center();
        println!(
            "  #{:<3} {:<8} at ({}, {}) {}x{} - confidence: {:.2}",
            d.id,
            d.color.as_str(),
            cx,
            cy,
            d.bbox.width(),
            d.bbox.height(),
            d.confidence
        );
    }
    Ok(())
}
