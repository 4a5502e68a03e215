mod platform;

use std::process::ExitCode;

use clap::Parser;

#[tokio::main]
async fn main() -> ExitCode {
    let cli = platform::cli::Cli::parse();
    platform::app::run(cli).await
}
