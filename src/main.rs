//! CLI for Pollcast
//!
//! Subcommands:
//! - `server`: run the SSE stream server
//! - `client`: follow a topic and print every event
//! - `stats`: print the subscriber count of each live topic

use std::sync::Arc;

use clap::Parser;
use pollcast::broker::{Registry, TopicKey, Variants};
use pollcast::client::Reconnector;
use pollcast::config::{Settings, load_config};
use pollcast::source::FileSnapshotProducer;
use pollcast::transport::{AppState, serve};
use pollcast::utils::logging;
use tokio::net::TcpListener;
use tokio::sync::watch;
use tracing::{error, info};

#[derive(Parser)]
#[command(name = "pollcast")]
enum Command {
    /// Start the stream server
    Server,
    /// Follow one topic and print its events
    Client {
        /// Stream endpoint (defaults to `client.url` from the configuration)
        #[arg(long)]
        url: Option<String>,
        /// Project id; omit for the unscoped topic
        #[arg(long)]
        project: Option<String>,
        #[arg(long)]
        display_mode: bool,
        #[arg(long, default_value = "cli")]
        username: String,
        #[arg(long, default_value = "external")]
        variant: String,
    },
    /// Print per-topic subscriber counts of a running server
    Stats {
        #[arg(long, default_value = "http://127.0.0.1:8080/stats")]
        url: String,
    },
}

#[tokio::main]
async fn main() {
    dotenvy::dotenv().ok();
    let cmd = Command::parse();

    let settings = match load_config() {
        Ok(settings) => settings,
        Err(e) => {
            logging::init("info");
            error!("Failed to load configuration: {}", e);
            return;
        }
    };
    logging::init(&settings.log.level);

    let result = match cmd {
        Command::Server => run_server(settings).await,
        Command::Client {
            url,
            project,
            display_mode,
            username,
            variant,
        } => {
            let url = url.unwrap_or_else(|| settings.client.url.clone());
            let topic = TopicKey::new(project.filter(|p| p != "all"), display_mode);
            run_client(&settings, &url, &topic, &username, &variant).await
        }
        Command::Stats { url } => run_stats(&url).await,
    };

    if let Err(e) = result {
        error!("{}", e);
    }
}

async fn run_server(settings: Settings) -> Result<(), Box<dyn std::error::Error>> {
    let addr = format!("{}:{}", settings.server.host, settings.server.port);

    let producer = FileSnapshotProducer::new(&settings.source.data_dir)
        .with_latency(std::time::Duration::from_millis(settings.source.latency_ms));
    let variants = Variants::internal_external(settings.variants.hidden_fields.clone());
    let registry = Registry::new(Arc::new(producer), variants, settings.stream.engine_options());
    let state = AppState::new(
        registry,
        settings.stream.heartbeat_interval(),
        settings.stream.sink_capacity,
    );

    let listener = TcpListener::bind(&addr).await?;
    info!("Serving {} on {}", settings.source.data_dir, addr);

    serve(listener, state, async {
        let _ = tokio::signal::ctrl_c().await;
        info!("Shutdown signal received. Exiting gracefully.");
    })
    .await?;
    Ok(())
}

async fn run_client(
    settings: &Settings,
    url: &str,
    topic: &TopicKey,
    username: &str,
    variant: &str,
) -> Result<(), Box<dyn std::error::Error>> {
    let reconnector = Reconnector::for_topic(
        url,
        topic,
        username,
        variant,
        settings.client.reconnect_policy(),
    )?
    .on_any(|name, data| println!("{name}: {data}"));

    let (flag, enabled) = watch::channel(true);
    tokio::spawn(async move {
        let _ = tokio::signal::ctrl_c().await;
        let _ = flag.send(false);
    });

    info!("Following {} at {}", topic, reconnector.url());
    reconnector.run(enabled).await?;
    Ok(())
}

async fn run_stats(url: &str) -> Result<(), Box<dyn std::error::Error>> {
    let stats: serde_json::Value = reqwest::get(url).await?.error_for_status()?.json().await?;
    println!("{}", serde_json::to_string_pretty(&stats)?);
    Ok(())
}
