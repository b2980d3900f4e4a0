//! Shop client: product catalog, cart and the user session in an interactive shell

use clap::Parser;
use color_eyre::Result;
use std::io::read_to_string;
use tokio::io::BufReader;
use tracing::info;

use crate::config::{Config, LogFormat};
use crate::context::Context;
use crate::opt::Opt;

mod config;
pub mod context;
mod model;
mod opt;
mod shell;
#[cfg(test)]
mod testing;

/// Initializes tracing collection
///
/// Logs go to stderr, stdout belongs to the shell.
fn setup_tracing(config: config::Logging) -> Result<()> {
    use tracing_error::ErrorLayer;
    use tracing_subscriber::prelude::*;
    use tracing_subscriber::{EnvFilter, fmt};

    let fmt_layer = match config.format {
        LogFormat::Pretty => fmt::layer().pretty().with_writer(std::io::stderr).boxed(),
        LogFormat::Compact => fmt::layer().compact().with_writer(std::io::stderr).boxed(),
    };

    let filter_layer = EnvFilter::try_from_default_env().or_else(|_| EnvFilter::try_new("info"))?;

    let filter_layer = config
        .filters
        .into_iter()
        .fold(filter_layer, |layer, filter| layer.add_directive(filter));

    tracing_subscriber::registry()
        .with(filter_layer)
        .with(fmt_layer)
        .with(ErrorLayer::default())
        .init();

    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let Opt {
        config: mut config_file,
    } = Opt::parse();

    let config = read_to_string(&mut config_file)?;
    let config: Config = toml::from_str(&config)?;

    setup_tracing(config.logging.clone())?;
    color_eyre::install()?;

    info!(
        config = ?config_file.path().path(),
        "Tracing initialized, restoring the session"
    );

    let context = Context::with_config(config).await?;
    shell::run(&context, BufReader::new(tokio::io::stdin()), tokio::io::stdout()).await?;

    info!("Shell closed, tearing down");
    Ok(())
}
