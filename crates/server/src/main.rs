mod api;
mod auth;
mod cli;
mod graphql;
mod handler;
mod router;
mod startup;
mod state;

use anyhow::Context;
use clap::Parser;
use tracing::info;

use crate::cli::{Cli, Command};

fn load_config() -> recipe_core::Config {
    recipe_core::config::load_dotenv();
    recipe_core::Config::from_env()
}

async fn serve(config: &recipe_core::Config) -> anyhow::Result<()> {
    config.log_summary();

    let state = startup::build_app_state(config).await?;
    let app = router::build_router(state, &config.server.cors_origin);

    let addr = format!("{}:{}", config.server.host, config.server.port);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("failed to bind {}", addr))?;
    info!("Server listening on http://localhost:{}", config.server.port);
    info!("GraphiQL at http://localhost:{}/graphql", config.server.port);
    axum::serve(listener, app).await?;

    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_target(false)
        .with_level(true)
        .init();

    let cli = Cli::parse();
    let config = load_config();
    let command = cli.command.unwrap_or(Command::Serve);

    if !cli::dispatch(&config, &command)? {
        serve(&config).await?;
    }

    Ok(())
}
