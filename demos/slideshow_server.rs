//! Slideshow MJPEG server example
//!
//! Run with: cargo run --example slideshow_server -- [IMAGES_DIR] [PORT] [INTERVAL_MS]
//!
//! Examples:
//!   cargo run --example slideshow_server -- ./photos            # port 8084, 50ms interval
//!   cargo run --example slideshow_server -- ./photos 9000       # port 9000
//!   cargo run --example slideshow_server -- ./photos 9000 100   # 100ms between frames
//!   MJPEG_IMAGES_DIR=./photos cargo run --example slideshow_server
//!
//! Then open http://localhost:8084/ in a browser, or:
//!   ffplay -f mjpeg http://localhost:8084/
//!
//! Logging follows RUST_LOG (default `info,mjpeg_push=debug`).

use std::path::PathBuf;
use std::time::Duration;

use mjpeg_push::server::config::DEFAULT_PORT;
use mjpeg_push::{ServerConfig, Slideshow, StreamServer};

/// Environment variable consulted when no folder is given on the command line
const IMAGES_DIR_ENV: &str = "MJPEG_IMAGES_DIR";

struct Args {
    images_dir: PathBuf,
    port: u16,
    interval: Duration,
}

fn parse_args() -> Result<Args, String> {
    let mut args = std::env::args().skip(1);

    let images_dir = match args.next() {
        Some(dir) => PathBuf::from(dir),
        None => std::env::var_os(IMAGES_DIR_ENV)
            .map(PathBuf::from)
            .ok_or_else(|| format!("No image folder given and {} is not set", IMAGES_DIR_ENV))?,
    };

    let port = match args.next() {
        Some(port) => port
            .parse::<u16>()
            .map_err(|_| format!("Invalid port: '{}'", port))?,
        None => DEFAULT_PORT,
    };

    let interval = match args.next() {
        Some(ms) => ms
            .parse::<u64>()
            .map(Duration::from_millis)
            .map_err(|_| format!("Invalid interval: '{}'", ms))?,
        None => ServerConfig::default().frame_interval,
    };

    Ok(Args {
        images_dir,
        port,
        interval,
    })
}

fn print_usage() {
    eprintln!("Usage: slideshow_server [IMAGES_DIR] [PORT] [INTERVAL_MS]");
    eprintln!();
    eprintln!("Arguments:");
    eprintln!("  IMAGES_DIR   Folder searched recursively for .jpeg/.jpg files");
    eprintln!("               (default: ${})", IMAGES_DIR_ENV);
    eprintln!("  PORT         TCP port to listen on (default: {})", DEFAULT_PORT);
    eprintln!("  INTERVAL_MS  Delay before each frame (default: 50)");
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,mjpeg_push=debug".into()),
        )
        .init();

    let args = match parse_args() {
        Ok(args) => args,
        Err(e) => {
            eprintln!("Error: {}", e);
            print_usage();
            std::process::exit(1);
        }
    };

    let slideshow = Slideshow::open(&args.images_dir)?;
    println!(
        "Serving {} images from {}",
        slideshow.paths().len(),
        slideshow.root().display()
    );

    let config = ServerConfig::default().frame_interval(args.interval);
    let server = StreamServer::new(config, slideshow);
    let addr = server.start(args.port).await?;
    println!("Streaming on http://{}/ (Ctrl+C to stop)", addr);

    // Status line, like a control panel's client counter
    let mut ticker = tokio::time::interval(Duration::from_secs(1));
    let mut last_count = usize::MAX;
    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => break,
            _ = ticker.tick() => {
                if !server.is_running() {
                    eprintln!("Server stopped unexpectedly");
                    break;
                }
                let count = server.client_count();
                if count != last_count {
                    println!("Clients: {}", count);
                    last_count = count;
                }
            }
        }
    }

    server.stop().await;
    let stats = server.stats();
    println!(
        "Served {} clients, {} frames, {} bytes",
        stats.total_connections, stats.frames_sent, stats.bytes_sent
    );

    Ok(())
}
