use anyhow::Result;
use clap::Parser;
use localcloud::cli::{self, Cli, Commands};

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    cli::init_tracing(&cli.log_level);

    match cli.action() {
        Commands::Serve { port } => cli::serve::run(&cli.config, port).await,
        Commands::Validate => cli::validate::run(&cli.config).await,
    }
}
