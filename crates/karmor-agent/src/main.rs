//! Binary entry point: loads configuration, wires up the `Pipeline`, and
//! serves the streaming RPC plane until shutdown.

mod cli;
mod config;
mod exit_codes;
mod rpc;

use anyhow::{Context, Result};
use clap::Parser;
use karmor_core::pipeline::IngestItem;
use karmor_core::Pipeline;
use karmor_proto::karmor_server::KarmorServer;
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

fn init_logging() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).json().init();
}

fn now_unix() -> u64 {
    SystemTime::now().duration_since(UNIX_EPOCH).map(|d| d.as_secs()).unwrap_or(0)
}

#[tokio::main(flavor = "multi_thread")]
async fn main() {
    init_logging();
    let code = match run().await {
        Ok(()) => exit_codes::OK,
        Err(err) => {
            error!(%err, "fatal startup failure");
            exit_codes::STARTUP_FAILURE
        }
    };
    std::process::exit(code);
}

async fn run() -> Result<()> {
    let cli = cli::Cli::parse();
    let host_name = hostname();
    let settings = config::resolve(&cli, host_name)?;

    let pipeline = Arc::new(Pipeline::new(settings.pipeline, settings.local_sink));

    // The kernel probe loader and ring-buffer reader run as a separate
    // producer; this channel is where that producer would feed
    // decoded-record items. It stays open for the process lifetime so the
    // ingest loop runs until cancellation, exactly as it would with a real
    // producer attached.
    let (_ingest_tx, ingest_rx) = tokio::sync::mpsc::channel::<IngestItem>(1024);

    let ingest_handle = tokio::spawn(pipeline.clone().run_ingest_loop(ingest_rx, now_unix));
    let reclaim_handle = tokio::spawn(pipeline.clone().run_reclaim_loop(now_unix));
    let local_sink_handle = tokio::spawn(pipeline.clone().run_local_sink_loop());

    let addr = format!("0.0.0.0:{}", settings.grpc_port)
        .parse()
        .context("parsing gRPC listen address")?;
    let service = rpc::KarmorService::new(pipeline.feeder.clone());
    info!(%addr, "karmor agent listening");

    let pipeline_for_shutdown = pipeline.clone();
    let server = tonic::transport::Server::builder()
        .add_service(KarmorServer::new(service))
        .serve_with_shutdown(addr, async move {
            let _ = tokio::signal::ctrl_c().await;
            info!("shutdown signal received");
            pipeline_for_shutdown.shutdown();
        });

    server.await.context("gRPC server failed")?;

    pipeline.shutdown();
    let _ = ingest_handle.await;
    let _ = reclaim_handle.await;
    let _ = local_sink_handle.await;
    Ok(())
}

fn hostname() -> String {
    std::env::var("HOSTNAME").unwrap_or_else(|_| "unknown".to_string())
}
