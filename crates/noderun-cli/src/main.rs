//! noderun - start a server node from a distribution and keep it running.
//!
//! The node is started, its ready URL printed, and it runs until it exits on
//! its own or Ctrl-C is pressed. Either way it is stopped and its data
//! directory removed (unless `--keep-data` is given).

use anyhow::Result;
use clap::Parser;
use noderun::{parse_options, LaunchSpec, NodeOptions, NodeSupervisor, SettingValue};
use std::path::PathBuf;
use tracing::{info, warn, Level};
use tracing_subscriber::FmtSubscriber;

#[derive(Parser, Debug)]
#[command(name = "noderun")]
#[command(about = "Start a server node and wait until it is ready")]
struct Args {
    /// Extracted distribution directory
    distribution: PathBuf,

    /// Environment variable for the node (KEY=VALUE, repeatable)
    #[arg(short, long = "env", value_name = "KEY=VALUE")]
    env: Vec<String>,

    /// Node setting (KEY=VALUE, repeatable)
    #[arg(short, long = "setting", value_name = "KEY=VALUE")]
    setting: Vec<String>,

    /// Keep the data directory after the node stops
    #[arg(long)]
    keep_data: bool,

    /// Cluster name (defaults to a random one)
    #[arg(long)]
    cluster_name: Option<String>,

    /// Enable debug logging
    #[arg(short, long)]
    debug: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // Set up logging
    let log_level = if args.debug { Level::DEBUG } else { Level::INFO };
    FmtSubscriber::builder()
        .with_max_level(log_level)
        .with_target(false)
        .with_thread_ids(false)
        .compact()
        .init();

    let mut settings: noderun::Settings = parse_options(&args.setting)?
        .into_iter()
        .map(|(key, value)| (key, SettingValue::from(value)))
        .collect();
    let cluster_name = args
        .cluster_name
        .unwrap_or_else(|| format!("noderun-{}", rand::random_range(0..1_000_000_000u32)));
    settings
        .entry("cluster.name".to_string())
        .or_insert_with(|| SettingValue::from(cluster_name));

    let options = NodeOptions {
        settings,
        env: parse_options(&args.env)?.into_iter().collect(),
        keep_data: args.keep_data,
    };
    let spec = LaunchSpec::from_distribution(&args.distribution, options)?;
    let mut node = NodeSupervisor::new(spec)?;

    // Listen for Ctrl-C from the start, so an interrupt during startup
    // still stops the node.
    let interrupt = tokio::signal::ctrl_c();
    tokio::pin!(interrupt);

    let started = tokio::select! {
        result = node.start() => Some(result),
        result = &mut interrupt => {
            if let Err(e) = result {
                warn!("Failed to listen for Ctrl-C: {}", e);
            }
            None
        }
    };

    match started {
        Some(Ok(())) => {}
        Some(Err(e)) => {
            if let Err(stop_err) = node.stop().await {
                warn!("Cleanup after failed start: {}", stop_err);
            }
            return Err(e.into());
        }
        None => {
            info!("Interrupted during startup, stopping node...");
            node.stop().await?;
            info!("Node stopped");
            return Ok(());
        }
    }

    if let Some(url) = node.ready_url() {
        println!("{}", url);
    }

    tokio::select! {
        status = node.wait() => {
            let status = status?;
            warn!("Node exited on its own with {}", status);
        }
        result = &mut interrupt => {
            result?;
            info!("Stopping node...");
        }
    }

    node.stop().await?;
    info!("Node stopped");
    Ok(())
}
