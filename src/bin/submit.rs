use std::path::Path;
use std::process::exit;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use tokio::signal;
use tracing_subscriber::EnvFilter;
use uuid::Uuid;

use stylebooth::client::Orchestrator;
use stylebooth::client::transport::{HttpArtifactFetcher, HttpWorkerTransport};
use stylebooth::config::ClientConfig;
use stylebooth::models::job::ArtifactOrigin;
use stylebooth::models::style::StylePreset;

/// Socket-level timeout for artifact downloads.
const DOWNLOAD_TIMEOUT: Duration = Duration::from_secs(30);

#[tokio::main]
async fn main() {
    // Human-facing tool, so no JSON log lines here.
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let args: Vec<String> = std::env::args().skip(1).collect();
    if args.len() < 2 {
        eprintln!("usage: submit <style> <photo>...");
        eprintln!("styles: {}", StylePreset::registry());
        exit(2);
    }

    let style = match StylePreset::from_str(&args[0]) {
        Ok(style) => style,
        Err(_) => {
            eprintln!(
                "unknown style '{}', expected one of: {}",
                args[0],
                StylePreset::registry()
            );
            exit(2);
        }
    };

    let config = ClientConfig::from_env().expect("Failed to load client configuration");

    let paths = &args[1..];
    let mut photos = Vec::with_capacity(paths.len());
    for path in paths {
        let bytes = std::fs::read(path).unwrap_or_else(|e| {
            eprintln!("could not read {path}: {e}");
            exit(2);
        });
        photos.push(bytes);
    }

    // Socket timeout sits above the orchestrator deadline so the deadline is
    // the one that fires.
    let socket_timeout = Duration::from_millis(config.submit_timeout_ms) + Duration::from_secs(30);
    let transport = HttpWorkerTransport::new(&config.worker_url, socket_timeout)
        .expect("Failed to build worker transport");
    let fetcher =
        HttpArtifactFetcher::new(DOWNLOAD_TIMEOUT).expect("Failed to build artifact fetcher");
    let orchestrator = Orchestrator::new(
        Arc::new(transport),
        Arc::new(fetcher),
        config.orchestrator_config(),
    );

    let key = Uuid::new_v4().to_string();
    tracing::info!(key = %key, style = %style, photos = photos.len(), "submitting session");

    let submit = orchestrator.submit(&key, photos, style);
    tokio::pin!(submit);
    let outcome = tokio::select! {
        outcome = &mut submit => outcome,
        _ = signal::ctrl_c() => {
            tracing::warn!("interrupt received, cancelling job");
            orchestrator.cancel(&key);
            submit.await
        }
    };

    let styled = match outcome {
        Ok(styled) => styled,
        Err(err) => {
            eprintln!("styling failed: {err}");
            exit(1);
        }
    };

    for photo in styled.iter() {
        let name = match photo.origin {
            ArtifactOrigin::Styled => format!("styled_{}.png", photo.index),
            ArtifactOrigin::OriginalFallback => {
                let ext = Path::new(&paths[photo.index])
                    .extension()
                    .and_then(|e| e.to_str())
                    .unwrap_or("jpg");
                format!("styled_{}.{ext}", photo.index)
            }
        };
        std::fs::write(&name, &photo.bytes).unwrap_or_else(|e| {
            eprintln!("could not write {name}: {e}");
            exit(1);
        });
        let origin = match photo.origin {
            ArtifactOrigin::Styled => "styled",
            ArtifactOrigin::OriginalFallback => "original (styled copy unavailable)",
        };
        println!("{name}  [{origin}]");
    }
}
