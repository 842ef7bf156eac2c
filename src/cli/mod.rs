use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

pub mod annotate;
pub mod resolve;

use annotate::AnnotateArgs;
use resolve::ResolveArgs;

use annotator::config::ConfigManager;
use annotator::logger::LogSettings;

#[derive(Parser, Debug)]
#[command(
    name = "annotator",
    about = "Annotate variant records with a long-running SnpEff engine",
    version = "0.1.0"
)]
pub struct Cli {
    /// `.env` file to load before reading configuration
    #[arg(long, global = true)]
    pub env_file: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Annotate every record of a file
    Annotate(AnnotateArgs),

    /// Fetch the runtime, engine and data files and print where they are
    Resolve(ResolveArgs),
}

#[derive(Args, Debug, Clone)]
pub struct LogArgs {
    /// Log level override (e.g. error, warn, info, debug, trace)
    #[arg(long, default_value = "info")]
    pub log_level: String,

    /// Directory for the rolling log and the JSON event log
    #[arg(long)]
    pub log_dir: Option<PathBuf>,

    /// OpenTelemetry endpoint (e.g. http://localhost:4318)
    #[arg(long)]
    pub otel_endpoint: Option<String>,
}

impl LogArgs {
    pub fn settings(&self) -> LogSettings {
        LogSettings {
            log_level: self.log_level.clone(),
            log_dir: self.log_dir.clone(),
            otel_endpoint: self.otel_endpoint.clone(),
        }
    }
}

#[derive(Clone)]
pub struct CliContext {
    pub config_manager: ConfigManager,
}

impl CliContext {
    pub fn new(config_manager: ConfigManager) -> Self {
        Self { config_manager }
    }
}

pub async fn execute(context: &CliContext, command: Commands) -> anyhow::Result<()> {
    match command {
        Commands::Annotate(args) => annotate::execute(args, context).await,
        Commands::Resolve(args) => resolve::execute(args, context).await,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn annotate_flags() {
        let cli = Cli::try_parse_from([
            "annotator",
            "annotate",
            "in.vcf",
            "--output",
            "out.vcf",
            "--timeout-secs",
            "30",
            "--log-level",
            "debug",
            "--env-file",
            "prod.env",
        ])
        .unwrap();
        assert_eq!(cli.env_file, Some(PathBuf::from("prod.env")));
        match cli.command {
            Commands::Annotate(args) => {
                assert_eq!(args.input, PathBuf::from("in.vcf"));
                assert_eq!(args.output, Some(PathBuf::from("out.vcf")));
                assert_eq!(args.timeout_secs, Some(30));
                assert_eq!(args.log.settings().log_level, "debug");
                assert_eq!(args.log.log_dir, None);
            }
            other => panic!("unexpected command {other:?}"),
        }
    }

    #[test]
    fn resolve_defaults() {
        let cli = Cli::try_parse_from(["annotator", "resolve", "--json"]).unwrap();
        match cli.command {
            Commands::Resolve(args) => {
                assert!(args.json);
                assert_eq!(args.log.log_level, "info");
            }
            other => panic!("unexpected command {other:?}"),
        }
    }

    #[test]
    fn annotate_needs_an_input() {
        assert!(Cli::try_parse_from(["annotator", "annotate"]).is_err());
        assert!(Cli::try_parse_from(["annotator"]).is_err());
    }
}
