use std::fs::File;
use std::path::Path;
use clap::Parser;
use log::{error, info};
use warp::Filter;

use room_relay::{Config, Server};

fn tls_files_readable(cert_path: &Path, key_path: &Path) -> bool {
    if let Err(e) = File::open(cert_path) {
        error!("Failed to open certificate file {}: {}", cert_path.display(), e);
        return false;
    }
    if let Err(e) = File::open(key_path) {
        error!("Failed to open private key file {}: {}", key_path.display(), e);
        return false;
    }
    true
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        error!("Failed to listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
    info!("Shutting down");
}

#[tokio::main]
async fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let config = Config::parse();

    let server = Server::new(config.typing_ttl());
    let sweeper = server.spawn_typing_sweeper(config.sweep_interval());

    let static_files = warp::fs::dir(config.static_dir.clone());
    let routes = server
        .ws_route()
        .or(static_files)
        .with(warp::cors().allow_any_origin());

    let addr = config.addr();
    let tls = config
        .tls_paths()
        .filter(|(cert, key)| tls_files_readable(cert, key));
    if config.tls_paths().is_some() && tls.is_none() {
        info!("Failed to load TLS config, falling back to HTTP/WS");
    }

    match tls {
        Some((cert, key)) => {
            info!("Starting secure server (HTTPS/WSS) on {}", addr);
            let (_, serving) = warp::serve(routes)
                .tls()
                .cert_path(cert)
                .key_path(key)
                .bind_with_graceful_shutdown(addr, shutdown_signal());
            serving.await;
        }
        None => match warp::serve(routes).try_bind_with_graceful_shutdown(addr, shutdown_signal()) {
            Ok((bound, serving)) => {
                info!("Server running on {}", bound);
                serving.await;
            }
            Err(e) => error!("Failed to bind to {}: {}", addr, e),
        },
    }

    sweeper.abort();
}
