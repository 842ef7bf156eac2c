use std::path::PathBuf;

use anyhow::Context;
use clap::Args;
use tokio::signal;
use tracing::{error, info, warn};

use super::{CliContext, LogArgs};
use annotator::config::AnnotatorProperties;
use annotator::logger::init_tracing;
use annotator::resolver::resolve_all;
use annotator::session::{EngineResources, annotate_file};

#[derive(Args, Debug)]
pub struct AnnotateArgs {
    /// Variant file, one record per line
    pub input: PathBuf,

    /// Where annotated records go (stdout when omitted)
    #[arg(long, short)]
    pub output: Option<PathBuf>,

    /// Seconds to wait for each prediction
    #[arg(long)]
    pub timeout_secs: Option<u64>,

    #[command(flatten)]
    pub log: LogArgs,
}

pub async fn execute(args: AnnotateArgs, context: &CliContext) -> anyhow::Result<()> {
    let telemetry = init_tracing(&args.log.settings()).context("could not create logger")?;

    let mut props = AnnotatorProperties::load(&context.config_manager).await?;
    if let Some(secs) = args.timeout_secs {
        props.prediction_timeout_secs = secs;
    }
    info!(?props, "Annotator starting up");

    let resolved = resolve_all(&props, false).await?;
    let command = EngineResources::from(&resolved).command(&props);

    let outcome = tokio::select! {
        result = annotate_file(&command, &props, &telemetry, &args.input, args.output.as_deref()) => result,
        _ = signal::ctrl_c() => {
            // dropping the session kills the engine
            warn!("Interrupted, stopping engine");
            Err(anyhow::anyhow!("interrupted"))
        }
    };

    match &outcome {
        Ok(summary) => info!(
            records = summary.records,
            undecoded = summary.undecoded,
            "Annotated {}",
            args.input.display()
        ),
        Err(err) => error!("{err:#}"),
    }
    telemetry.shutdown();
    outcome.map(|_| ())
}
