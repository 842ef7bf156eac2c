//! One annotation run: start the engine, send the header, feed the input
//! records one by one and write every answer out in input order.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, bail};
use engine_bridge::{EngineCommand, EngineError, EngineStatus, PredictionBridge};
use serde::Serialize;
use tokio::fs::File;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt, BufReader, BufWriter};
use tracing::{Instrument, debug, info, info_span, warn};
use uuid::Uuid;

use crate::config::AnnotatorProperties;
use crate::effect::Impact;
use crate::header::{decoder_header, engine_header};
use crate::logger::Telemetry;
use crate::resolver::ResolvedResources;
use crate::vcf::VcfDecoder;

/// Paths the engine is launched with.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngineResources {
    pub java: PathBuf,
    pub jar: PathBuf,
    pub data_dir: PathBuf,
}

impl From<&ResolvedResources> for EngineResources {
    fn from(resolved: &ResolvedResources) -> Self {
        Self {
            java: resolved.java.clone(),
            jar: resolved.jar.clone(),
            data_dir: resolved.data_dir.clone(),
        }
    }
}

impl EngineResources {
    pub fn command(&self, props: &AnnotatorProperties) -> EngineCommand {
        EngineCommand::snpeff(
            &self.java,
            &self.jar,
            &self.data_dir,
            &props.database_version,
            &props.jvm_options,
        )
    }
}

/// Counters for a finished (or failed) run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RunSummary {
    /// Ensembl gene build the effect annotations refer to.
    pub gene_build_version: String,
    pub records: u64,
    /// Comment and blank input lines that were not sent.
    pub skipped: u64,
    /// Results that did not decode; they are written out regardless.
    pub undecoded: u64,
    pub impacts: BTreeMap<Impact, u64>,
}

impl RunSummary {
    fn tally(&mut self, decoder: &VcfDecoder, result: &str) {
        match decoder.decode(result).and_then(|record| record.effects()) {
            Ok(effects) => {
                for effect in &effects {
                    *self.impacts.entry(effect.impact).or_default() += 1;
                }
            }
            Err(err) => {
                self.undecoded += 1;
                debug!("could not decode engine result: {err}");
            }
        }
    }
}

pub struct AnnotationSession<'a> {
    id: Uuid,
    bridge: PredictionBridge,
    decoder: VcfDecoder,
    telemetry: &'a Telemetry,
    summary: RunSummary,
}

impl<'a> AnnotationSession<'a> {
    /// Launch the engine and send it the header. No record has been sent
    /// when this returns.
    pub async fn start(
        command: &EngineCommand,
        props: &AnnotatorProperties,
        telemetry: &'a Telemetry,
    ) -> Result<Self> {
        let id = Uuid::new_v4();
        let settings = props.bridge_settings()?;
        let mut bridge = PredictionBridge::start(command, settings)?;
        info!(
            session = %id,
            database = %props.database_version,
            gene_build = %props.gene_build_version,
            "engine started: {}",
            command.program.display()
        );

        bridge
            .send_preamble(engine_header().lines())
            .await
            .context("could not send header to engine")?;

        Ok(Self {
            id,
            bridge,
            decoder: VcfDecoder::new(&decoder_header()),
            telemetry,
            summary: RunSummary {
                gene_build_version: props.gene_build_version.clone(),
                ..Default::default()
            },
        })
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn summary(&self) -> &RunSummary {
        &self.summary
    }

    /// Annotate one record line.
    pub async fn predict(&mut self, line: &str) -> Result<String, EngineError> {
        let result = self
            .telemetry
            .instrument_request("predict", self.bridge.predict(line))
            .await?;
        self.summary.records += 1;
        self.summary.tally(&self.decoder, &result);
        Ok(result)
    }

    /// Feed every record of `input` and write each answer to `output`.
    /// Stops at the first engine failure.
    pub async fn run<R, W>(&mut self, input: R, output: &mut W) -> Result<()>
    where
        R: AsyncBufRead + Unpin,
        W: AsyncWrite + Unpin,
    {
        let span = info_span!("session", id = %self.id);
        async {
            let mut lines = input.lines();
            while let Some(line) = lines.next_line().await.context("reading input")? {
                if line.trim().is_empty() || line.starts_with('#') {
                    self.summary.skipped += 1;
                    continue;
                }
                let result = self.predict(&line).await?;
                output.write_all(result.as_bytes()).await?;
                output.write_all(b"\n").await?;
            }
            output.flush().await.context("flushing output")?;
            Ok::<(), anyhow::Error>(())
        }
        .instrument(span)
        .await
    }

    /// Stop the engine and log what the run produced.
    pub async fn shutdown(self) -> (EngineStatus, RunSummary) {
        let status = self.bridge.shutdown().await;
        let summary = self.summary;
        info!(
            session = %self.id,
            gene_build = %summary.gene_build_version,
            records = summary.records,
            skipped = summary.skipped,
            undecoded = summary.undecoded,
            "impacts: {}",
            format_impacts(&summary.impacts)
        );
        (status, summary)
    }
}

fn format_impacts(impacts: &BTreeMap<Impact, u64>) -> String {
    if impacts.is_empty() {
        return "none".to_string();
    }
    impacts
        .iter()
        .map(|(impact, count)| format!("{impact}={count}"))
        .collect::<Vec<_>>()
        .join(", ")
}

/// Refuse inputs over the configured size before any engine is started.
pub async fn check_input_size(input: &Path, props: &AnnotatorProperties) -> Result<u64> {
    let size = tokio::fs::metadata(input)
        .await
        .with_context(|| format!("cannot read {}", input.display()))?
        .len();
    if size > props.max_file_size_bytes() {
        bail!(
            "{} is {} bytes, over the {} MB limit",
            input.display(),
            size,
            props.max_file_size_mb
        );
    }
    Ok(size)
}

/// Annotate `input` into `output` (stdout when `None`) with the engine
/// `command` starts.
pub async fn annotate_file(
    command: &EngineCommand,
    props: &AnnotatorProperties,
    telemetry: &Telemetry,
    input: &Path,
    output: Option<&Path>,
) -> Result<RunSummary> {
    let size = check_input_size(input, props).await?;
    info!("Annotating {} ({} bytes)", input.display(), size);

    let reader = BufReader::new(
        File::open(input)
            .await
            .with_context(|| format!("cannot open {}", input.display()))?,
    );
    let sink: Box<dyn AsyncWrite + Unpin + Send> = match output {
        Some(path) => Box::new(
            File::create(path)
                .await
                .with_context(|| format!("cannot create {}", path.display()))?,
        ),
        None => Box::new(tokio::io::stdout()),
    };
    let mut writer = BufWriter::new(sink);

    let mut session = AnnotationSession::start(command, props, telemetry).await?;
    let outcome = session.run(reader, &mut writer).await;
    let (status, summary) = session.shutdown().await;

    match outcome {
        Ok(()) => {
            if let Some(code) = status.exit_code().filter(|code| *code != 0) {
                warn!("engine exited with code {code} after a complete run");
            }
            Ok(summary)
        }
        Err(err) => Err(err.context(format!(
            "annotation of {} stopped after {} records",
            input.display(),
            summary.records
        ))),
    }
}
