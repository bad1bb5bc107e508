use clap::Parser;
use procfleet::app::{handle_fatal_error, init_logging, AppConfig};
use procfleet::cli::{execute_command, Cli};

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    init_logging(&AppConfig::new(cli.verbose));

    if let Err(e) = execute_command(cli.command).await {
        handle_fatal_error(e, cli.verbose);
    }
}
