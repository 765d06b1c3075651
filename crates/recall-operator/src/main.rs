//! Recall operator - restores captured cluster objects from backup archives

use std::path::PathBuf;
use std::str::FromStr;

use clap::Parser;
use kube::CustomResourceExt;
use tracing_subscriber::EnvFilter;

use recall_common::crd::{EncryptionConfig, Restore};
use recall_common::kube_utils::create_client;

mod controller;
mod startup;

/// Recall - CRD-driven operator restoring backup archives into the cluster
#[derive(Parser, Debug)]
#[command(name = "recall-operator", version, about, long_about = None)]
struct Cli {
    /// Generate CRD manifests and exit
    #[arg(long)]
    crd: bool,

    /// Path to a kubeconfig file (default: in-cluster or current context)
    #[arg(long)]
    kubeconfig: Option<PathBuf>,
}

fn init_tracing() {
    let env = std::env::var("RECALL_LOG").unwrap_or_else(|_| "info".to_string());
    let filter =
        EnvFilter::from_str(&env).unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .init();
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    if cli.crd {
        print!("{}", serde_yaml::to_string(&Restore::crd())?);
        println!("---");
        print!("{}", serde_yaml::to_string(&EncryptionConfig::crd())?);
        return Ok(());
    }

    init_tracing();
    let client = create_client(cli.kubeconfig.as_deref()).await?;

    startup::ensure_crds_installed(&client).await?;

    controller::run(client).await
}
