//! CLI entry point.
//!
//! Loads `.env` and logging, then hands the subcommand to its handler
//! with the bootstrapped [`CliContext`].

use clap::{CommandFactory, Parser};
use tracing_subscriber::EnvFilter;

use ailinker_cli::{Cli, CliContext, Commands, Feed, bootstrap, handlers};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env file if present (silently ignore if missing)
    dotenvy::dotenv().ok();

    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let Some(command) = cli.command else {
        Cli::command().print_help()?;
        println!();
        return Ok(());
    };

    let ctx = bootstrap(cli.config.as_deref())?;
    dispatch(ctx, command).await
}

fn init_tracing(verbose: bool) {
    let default = if verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    // stdout carries the transcript; logs go to stderr
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

async fn dispatch(ctx: CliContext, command: Commands) -> anyhow::Result<()> {
    match command {
        Commands::Tts { name } => {
            let ctx = ctx.with_node_name(name);
            handlers::session::execute(&ctx, Feed::Speech).await
        }
        Commands::Chat { name } => {
            let ctx = ctx.with_node_name(name);
            handlers::session::execute(&ctx, Feed::ChatOnly).await
        }
        Commands::Run => handlers::session::execute(&ctx, Feed::Pipeline).await,
        Commands::Config => handlers::config::execute(&ctx),
    }
}
