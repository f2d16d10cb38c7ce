/*!
Delegation controller: run one command through the delegated executable.

Sequence:
  1. load the initial catalog (skipped when links are disabled)
  2. start the signal relay
  3. spawn the child: stdin and stderr inherited, stdout piped to the engine
  4. pump the child's stdout through the enrichment engine concurrently
  5. wait for the child, clear its pid from the relay slot
  6. wait for the engine to drain the pipe (end of stream arrives once the
     child's side of the pipe is closed; the parent never holds the write end)
  7. send the completion notification to the relay

The child's outcome is handed back untouched; the caller decides on exit
codes.
*/

pub mod error;
pub mod resolve;

use std::path::PathBuf;
use std::process::{ExitStatus, Stdio};
use tokio::io::{AsyncWrite, AsyncWriteExt};
use tokio::process::Command;

use crate::catalog::{CatalogSource, CliCatalog};
use crate::enrich::{Enricher, RefreshPolicy};
use crate::relay::{ChildSlot, KillForwarder, SignalRelay};
use crate::{log_debug, log_error, log_trace};
pub use error::DelegateError;

/// What a finished delegation produced.
#[derive(Debug)]
pub struct Execution<W> {
    pub status: ExitStatus,
    /// Lines that went through the enrichment engine (0 when links are off).
    pub lines: usize,
    /// Signals forwarded to the child.
    pub forwarded: usize,
    /// The writer given to `execute`, handed back.
    pub output: Option<W>,
}

pub struct Delegation<S> {
    executable: PathBuf,
    source: S,
    enrich: bool,
}

impl Delegation<CliCatalog> {
    /// Delegate to `executable`, building catalogs from its own listings.
    pub fn new(executable: impl Into<PathBuf>) -> Self {
        let executable = executable.into();
        let source = CliCatalog::new(&executable);
        Self::with_source(executable, source)
    }
}

impl<S> Delegation<S>
where
    S: CatalogSource + Send + Sync + 'static,
{
    pub fn with_source(executable: impl Into<PathBuf>, source: S) -> Self {
        Self {
            executable: executable.into(),
            source,
            enrich: true,
        }
    }

    /// Turn hyperlink enrichment on or off. Off means stdout is inherited.
    pub fn enrich(mut self, enabled: bool) -> Self {
        self.enrich = enabled;
        self
    }

    /// Run with enriched output on the real stdout. A non-zero exit comes
    /// back as `DelegateError::Exited`.
    pub async fn run(self, args: &[String]) -> Result<(), DelegateError> {
        let exec = self.execute(args, tokio::io::stdout()).await?;
        log_debug!(
            "{} line(s) enriched, {} signal(s) forwarded",
            exec.lines,
            exec.forwarded
        );
        if let Some(mut stdout) = exec.output
            && let Err(e) = stdout.flush().await
        {
            log_debug!("final stdout flush failed: {e}");
        }
        if exec.status.success() {
            Ok(())
        } else {
            Err(DelegateError::Exited(exec.status))
        }
    }

    /// Run the delegated executable without enrichment or signal relay and
    /// return its stdout. Stderr goes to the real stderr; stdin is closed.
    /// A non-zero exit comes back as `DelegateError::Exited`.
    pub async fn output(&self, args: &[String]) -> Result<Vec<u8>, DelegateError> {
        let out = Command::new(&self.executable)
            .args(args)
            .stdin(Stdio::null())
            .stderr(Stdio::inherit())
            .output()
            .await
            .map_err(|source| DelegateError::Spawn {
                program: self.executable.clone(),
                source,
            })?;
        if out.status.success() {
            Ok(out.stdout)
        } else {
            Err(DelegateError::Exited(out.status))
        }
    }

    /// Run with enriched output written to `out` and report the raw outcome.
    pub async fn execute<W>(self, args: &[String], out: W) -> Result<Execution<W>, DelegateError>
    where
        W: AsyncWrite + Unpin + Send + 'static,
    {
        let enricher = if self.enrich {
            let enricher = Enricher::new(self.source, RefreshPolicy::for_args(args)).await;
            log_trace!("catalog refresh policy: {:?}", enricher.policy());
            Some(enricher)
        } else {
            None
        };

        let mut cmd = Command::new(&self.executable);
        cmd.args(args)
            .stdin(Stdio::inherit())
            .stderr(Stdio::inherit())
            .stdout(if enricher.is_some() {
                Stdio::piped()
            } else {
                Stdio::inherit()
            });

        let slot = ChildSlot::new();
        let relay = SignalRelay::start(slot.clone(), KillForwarder);

        let mut child = match cmd.spawn() {
            Ok(child) => child,
            Err(source) => {
                relay.stop().await;
                return Err(DelegateError::Spawn {
                    program: self.executable,
                    source,
                });
            }
        };
        if let Some(pid) = child.id() {
            slot.set(pid);
            log_trace!("delegated {} as pid {pid}", self.executable.display());
        }

        let (engine, unused_out) = match (enricher, child.stdout.take()) {
            (Some(enricher), Some(stdout)) => (Some(tokio::spawn(enricher.pump(stdout, out))), None),
            _ => (None, Some(out)),
        };

        let waited = child.wait().await;
        slot.clear();

        let drained = match engine {
            Some(handle) => match handle.await {
                Ok(Ok(drained)) => {
                    if let Some(e) = &drained.write_error {
                        log_debug!("output writer failed ({e}), {} line(s) drained anyway", drained.lines);
                    }
                    Some(drained)
                }
                Ok(Err(e)) => {
                    log_error!("reading delegated output failed: {e}");
                    None
                }
                Err(e) => {
                    log_error!("output task failed: {e}");
                    None
                }
            },
            None => None,
        };

        let forwarded = relay.stop().await;
        let status = waited.map_err(DelegateError::Wait)?;
        log_debug!("delegated command finished: {status}");

        let (lines, output) = match drained {
            Some(d) => (d.lines, Some(d.output)),
            None => (0, unused_out),
        };
        Ok(Execution {
            status,
            lines,
            forwarded,
            output,
        })
    }
}

/* ---- Tests ---- */
