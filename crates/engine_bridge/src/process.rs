use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;

use tokio::process::{Child, ChildStderr, ChildStdin, ChildStdout, Command as TokioCommand};
use tracing::{debug, info, warn};

use crate::error::{EngineError, EngineStatus};

/// Everything needed to launch the engine: program, arguments and extra
/// environment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngineCommand {
    pub program: PathBuf,
    pub args: Vec<OsString>,
    pub envs: Vec<(OsString, OsString)>,
}

impl EngineCommand {
    pub fn new<P: AsRef<Path>>(program: P) -> Self {
        Self {
            program: program.as_ref().to_path_buf(),
            args: vec![],
            envs: vec![],
        }
    }

    pub fn arg<S: Into<OsString>>(mut self, arg: S) -> Self {
        self.args.push(arg.into());
        self
    }

    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<OsString>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    pub fn env<K: Into<OsString>, V: Into<OsString>>(mut self, key: K, value: V) -> Self {
        self.envs.push((key.into(), value.into()));
        self
    }

    /// `<runtime> <jvm options…> -jar <jar> eff -dataDir <data_dir> -cancer -noLog -noStats <database_version>`
    ///
    /// SnpEff in cancer mode reads the germline/somatic pairing from the
    /// `PEDIGREE` header line, which is why the header must be sent before
    /// the first record.
    pub fn snpeff<S: AsRef<str>>(
        runtime: &Path,
        jar: &Path,
        data_dir: &Path,
        database_version: &str,
        jvm_options: &[S],
    ) -> Self {
        Self::new(runtime)
            .args(jvm_options.iter().map(|o| o.as_ref().to_string()))
            .arg("-jar")
            .arg(jar.as_os_str())
            .arg("eff")
            .arg("-dataDir")
            .arg(data_dir.as_os_str())
            .args(["-cancer", "-noLog", "-noStats"])
            .arg(database_version)
    }
}

/// The running engine. Its stdio channels are handed out once, by
/// [`EngineProcess::start`].
#[derive(Debug)]
pub struct EngineProcess {
    child: Child,
    program: PathBuf,
    final_status: Option<EngineStatus>,
}

/// The three stdio channels of a freshly started engine.
#[derive(Debug)]
pub struct EngineChannels {
    pub stdin: ChildStdin,
    pub stdout: ChildStdout,
    pub stderr: ChildStderr,
}

impl EngineProcess {
    /// Launch the engine with all three channels piped. The child is killed
    /// if this value is dropped while it is still running.
    pub fn start(command: &EngineCommand) -> Result<(Self, EngineChannels), EngineError> {
        info!(
            program = %command.program.display(),
            args = ?command.args,
            "starting engine process"
        );

        let mut child = TokioCommand::new(&command.program)
            .args(&command.args)
            .envs(command.envs.iter().map(|(k, v)| (k, v)))
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|source| EngineError::Launch {
                program: command.program.clone(),
                source,
            })?;

        let channels = match (child.stdin.take(), child.stdout.take(), child.stderr.take()) {
            (Some(stdin), Some(stdout), Some(stderr)) => EngineChannels { stdin, stdout, stderr },
            _ => {
                return Err(EngineError::Launch {
                    program: command.program.clone(),
                    source: std::io::Error::other("engine stdio channels unavailable"),
                });
            }
        };

        debug!(pid = ?child.id(), "engine process started");
        Ok((
            Self {
                child,
                program: command.program.clone(),
                final_status: None,
            },
            channels,
        ))
    }

    pub fn program(&self) -> &Path {
        &self.program
    }

    pub fn id(&self) -> Option<u32> {
        self.child.id()
    }

    /// Non-blocking liveness check.
    pub fn status(&mut self) -> EngineStatus {
        if let Some(status) = self.final_status {
            return status;
        }
        match self.child.try_wait() {
            Ok(Some(exit)) => {
                let status = EngineStatus::Exited(exit.code());
                self.final_status = Some(status);
                status
            }
            Ok(None) => EngineStatus::Running,
            Err(err) => {
                warn!("could not query engine status: {err}");
                EngineStatus::Running
            }
        }
    }

    pub fn is_alive(&mut self) -> bool {
        self.status().is_alive()
    }

    pub fn exit_code(&mut self) -> Option<i32> {
        self.status().exit_code()
    }

    /// Wait at most `grace` for the engine to exit.
    pub async fn wait(&mut self, grace: Duration) -> EngineStatus {
        if let EngineStatus::Exited(code) = self.status() {
            return EngineStatus::Exited(code);
        }
        match tokio::time::timeout(grace, self.child.wait()).await {
            Ok(Ok(exit)) => {
                let status = EngineStatus::Exited(exit.code());
                self.final_status = Some(status);
                status
            }
            Ok(Err(err)) => {
                warn!("waiting for engine failed: {err}");
                self.status()
            }
            Err(_) => EngineStatus::Running,
        }
    }

    /// Kill the engine and reap it.
    pub async fn kill(&mut self) -> EngineStatus {
        if let EngineStatus::Exited(code) = self.status() {
            return EngineStatus::Exited(code);
        }
        if let Err(err) = self.child.kill().await {
            warn!("failed to kill engine process: {err}");
        }
        self.status()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn snpeff_command_layout() {
        let cmd = EngineCommand::snpeff(
            Path::new("/opt/java/bin/java"),
            Path::new("/tmp/r/snpeff/3.6c/snpEff.jar"),
            Path::new("/tmp/r/snpeff/data"),
            "3.6c-GRCh37.75",
            &["-Xmx4g"],
        );
        let args: Vec<String> = cmd
            .args
            .iter()
            .map(|a| a.to_string_lossy().into_owned())
            .collect();
        assert_eq!(cmd.program, PathBuf::from("/opt/java/bin/java"));
        assert_eq!(
            args,
            vec![
                "-Xmx4g",
                "-jar",
                "/tmp/r/snpeff/3.6c/snpEff.jar",
                "eff",
                "-dataDir",
                "/tmp/r/snpeff/data",
                "-cancer",
                "-noLog",
                "-noStats",
                "3.6c-GRCh37.75",
            ]
        );
    }

    #[tokio::test]
    async fn launch_failure_names_program() {
        let cmd = EngineCommand::new("/definitely/not/an/engine");
        let err = EngineProcess::start(&cmd).expect_err("spawn must fail");
        match err {
            EngineError::Launch { program, .. } => {
                assert_eq!(program, PathBuf::from("/definitely/not/an/engine"))
            }
            other => panic!("unexpected error: {other}"),
        }
    }
}
