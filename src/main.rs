//! Release Flow CLI entry point.

use clap::Parser;

use release_flow::cli::{handle_error, Cli, Commands};
use release_flow::infrastructure::config::ConfigLoader;
use release_flow::infrastructure::logging::{LogConfig, LoggerImpl};

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let config = match ConfigLoader::load() {
        Ok(config) => config,
        Err(err) => handle_error(err, cli.json),
    };

    let _logger = match LoggerImpl::init(&LogConfig::from(&config.logging)) {
        Ok(logger) => logger,
        Err(err) => handle_error(err, cli.json),
    };

    let result = match cli.command {
        Commands::Init(args) => release_flow::cli::commands::init::execute(args, &config, cli.json).await,
        Commands::Request(args) => release_flow::cli::commands::request::execute(args, &config, cli.json).await,
        Commands::Employee(args) => release_flow::cli::commands::employee::execute(args, &config, cli.json).await,
    };

    if let Err(err) = result {
        handle_error(err, cli.json);
    }
}
