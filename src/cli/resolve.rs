use clap::Args;

use super::{CliContext, LogArgs};
use annotator::config::AnnotatorProperties;
use annotator::logger::init_tracing;
use annotator::resolver::resolve_all;

#[derive(Args, Debug)]
pub struct ResolveArgs {
    /// Print the resolved paths as JSON
    #[arg(long)]
    pub json: bool,

    #[command(flatten)]
    pub log: LogArgs,
}

pub async fn execute(args: ResolveArgs, context: &CliContext) -> anyhow::Result<()> {
    let telemetry = init_tracing(&args.log.settings())?;
    let props = AnnotatorProperties::load(&context.config_manager).await?;

    let resolved = resolve_all(&props, true).await;
    telemetry.shutdown();
    let resolved = resolved?;

    if args.json {
        println!("{}", serde_json::to_string_pretty(&resolved)?);
    } else {
        println!("java             {}", resolved.java.display());
        println!("engine jar       {}", resolved.jar.display());
        println!("data dir         {}", resolved.data_dir.display());
        if let Some(genome) = &resolved.reference_genome {
            println!("reference genome {}", genome.display());
        }
    }
    Ok(())
}
