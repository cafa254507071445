use anyhow::{Context, Result};
use clap::Parser;
use std::sync::Arc;
use tracing::error;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use whalefeed::config::{Cli, Command, Instruments};
use whalefeed::{client, Server};

#[tokio::main(flavor = "multi_thread", worker_threads = 4)]
async fn main() -> Result<()> {
    init_tracing();

    let cli = Cli::parse();
    let result = match cli.command {
        Command::Serve(args) => run_serve(args).await,
        Command::Client(args) => run_client(args).await,
    };

    if let Err(e) = &result {
        error!(error = %e, "fatal error");
        for cause in e.chain().skip(1) {
            error!(cause = %cause, "caused by");
        }
        std::process::exit(1);
    }
    Ok(())
}

async fn run_serve(args: whalefeed::config::ServeArgs) -> Result<()> {
    let instruments = Instruments::default_set();
    let server = Arc::new(Server::with_ingest_url(
        instruments,
        args.emulate(),
        args.ext_vwap(),
        args.ingest_url.clone(),
    ));
    server
        .run(args.port)
        .await
        .with_context(|| format!("serving on port {}", args.port))
}

async fn run_client(args: whalefeed::config::ClientArgs) -> Result<()> {
    let config = client::ClientConfig {
        host: args.host,
        port: args.port,
        data_mask: args.data_mask,
        symbol: args.symbol,
        threshold: args.threshold,
        ext_vwap: args.ext_vwap != 0,
    };
    client::run(&config).await
}

fn init_tracing() {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "whalefeed=info,warn".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();
}
