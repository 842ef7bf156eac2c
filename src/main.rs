use std::process;

use clap::Parser;

mod cli;

use annotator::config::{ConfigManager, EnvConfigManager};
use cli::{Cli, CliContext};

#[tokio::main(flavor = "multi_thread", worker_threads = 4)]
async fn main() {
    let cli = Cli::parse();
    let context = CliContext::new(ConfigManager(EnvConfigManager::new(cli.env_file.clone())));

    if let Err(err) = cli::execute(&context, cli.command).await {
        eprintln!("❌ {err:#}");
        process::exit(1);
    }
}
