use clap::Parser;
use tracing_subscriber::filter::Targets;
use tracing_subscriber::prelude::*;

use fleetcast_server::cli::Args;

fn configure_logging(args: &Args) {
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer())
        .with(
            Targets::new()
                .with_target(env!("CARGO_PKG_NAME").replace('-', "_"), args.log_level)
                .with_target("fleetcast_common", args.log_level)
                .with_target("rustls", tracing_core::Level::INFO)
                .with_target("hyper", tracing_core::Level::INFO),
        )
        .init();
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    configure_logging(&args);
    fleetcast_server::main_impl(args).await
}
