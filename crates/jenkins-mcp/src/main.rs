use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use tokio_util::sync::CancellationToken;
use tracing::info;

use jmcp_config::{AppConfig, validate_config};

mod app;
mod cli;
mod logging;
mod mcp_server;
mod tool_defs;
mod tools;

use app::App;
use cli::{Cli, Commands};

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let _log_guard = logging::init_tracing(cli.log_file.as_deref())?;

    match cli.command.unwrap_or(Commands::Serve) {
        Commands::Serve => {
            let config = load_config(cli.config.as_deref())?;
            serve(config).await?;
        }
        Commands::Tools => {
            let tools = tool_defs::get_tools();
            println!(
                "{}",
                serde_json::to_string_pretty(&tools).context("Failed to serialize tools")?
            );
        }
        Commands::CheckConfig => {
            let config = load_config(cli.config.as_deref())?;
            println!("Configuration OK");
            println!("{config:#?}");
        }
        Commands::ConfigTemplate => {
            print!("{}", AppConfig::default_template());
        }
    }

    Ok(())
}

fn load_config(explicit: Option<&Path>) -> Result<AppConfig> {
    let config = AppConfig::load(explicit)?;
    validate_config(&config)?;
    Ok(config)
}

async fn serve(config: AppConfig) -> Result<()> {
    info!(jenkins = %config.jenkins.url, "Loaded configuration");
    let app = Arc::new(App::from_config(config)?);
    let shutdown = CancellationToken::new();
    let background = app.spawn_background(&shutdown);

    let result = tokio::select! {
        result = mcp_server::run_mcp_server(app.clone()) => result,
        _ = tokio::signal::ctrl_c() => {
            info!("Interrupted, shutting down");
            Ok(())
        }
    };

    shutdown.cancel();
    for handle in background {
        handle.await.ok();
    }
    result
}
