use clap::Parser;
use keygate::cli::{self, Cli, Command};
use keygate::config::AppConfig;
use keygate::infrastructure::logging::init_logging;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    let cli = Cli::parse();
    let config = AppConfig::load()?;
    init_logging(&config.logging);

    match cli.command {
        Command::Serve => cli::serve::run(&config).await,
        Command::Bootstrap(args) => cli::bootstrap::run(&config, args).await,
    }
}
