use crate::config::{Cli, parse_exit_code};
use crate::registry::SkopeoClient;
use crate::sync::Syncer;
use clap::Parser;
use tracing::info;

mod config;
mod manifest;
mod naming;
mod registry;
mod source_reference;
mod sync;
mod tag_diff;

#[cfg(target_env = "musl")]
#[global_allocator]
static GLOBAL: mimalloc::MiMalloc = mimalloc::MiMalloc;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(e) => {
            let _ = e.print();
            std::process::exit(parse_exit_code(&e));
        }
    };

    tracing_subscriber::fmt::init();
    info!("Starting image-sync {}", env!("CARGO_PKG_VERSION"));

    let config = cli.into_config()?;
    info!(
        "Syncing images from {} into {}",
        config.manifest_url,
        config.destination.repository("")
    );

    let references =
        manifest::fetch_manifest(&config.manifest_url, config.trust.manifest_tls_verify).await?;

    let registry = SkopeoClient::new(&config);
    let syncer = Syncer::new(config, registry);
    syncer.run(&references).await;

    Ok(())
}
