use anyhow::Context;
use clap::Parser;
use ghgp_common::config::AppConfig;
use ghgp_server::GhgpServer;

#[derive(Parser)]
#[command(name = "ghgp-server", about = "Greenhouse gas analytics API")]
struct Args {
    /// YAML configuration; `GHGP__*` environment variables override it
    #[arg(long, env = "GHGP_CONFIG", default_value = "config/ghgp.yaml")]
    config: String,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let app_config = AppConfig::from_file(&args.config)
        .with_context(|| format!("Failed to load configuration from {}", args.config))?;
    ghgp_common::telemetry::init_tracing(&app_config.logging)
        .context("Failed to initialize logging")?;

    GhgpServer::new(app_config).run().await
}
