//! Reload trigger: tells the enforcement point to reread the artifact.
//!
//! No retries happen here. A failed reload is returned to the engine, which
//! reports it to whoever requested the cycle.

use crate::error::ReloadError;
use std::io::Read;
use std::process::{Child, Command, ExitStatus, Stdio};
use std::time::{Duration, Instant};

/// Out-of-process reload signal.
pub trait ReloadTrigger: Send + Sync {
    fn reload(&self) -> Result<(), ReloadError>;
}

/// For enforcement points that watch the artifact themselves.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoReload;

impl ReloadTrigger for NoReload {
    fn reload(&self) -> Result<(), ReloadError> {
        Ok(())
    }
}

/// Runs a command (e.g. `systemctl reload squid`); success iff it exits 0.
#[derive(Debug, Clone)]
pub struct CommandReload {
    program: String,
    args: Vec<String>,
    timeout: Option<Duration>,
}

const POLL_INTERVAL: Duration = Duration::from_millis(50);

impl CommandReload {
    pub fn new<I, S>(program: impl Into<String>, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            program: program.into(),
            args: args.into_iter().map(Into::into).collect(),
            timeout: None,
        }
    }

    /// `systemctl reload squid`
    pub fn squid() -> Self {
        Self::new("systemctl", ["reload", "squid"])
    }

    /// Kill the command and fail with `TimedOut` if it runs longer than `limit`.
    pub fn with_timeout(mut self, limit: Duration) -> Self {
        self.timeout = Some(limit);
        self
    }

    pub fn program(&self) -> &str {
        &self.program
    }

    pub fn args(&self) -> &[String] {
        &self.args
    }

    pub fn timeout(&self) -> Option<Duration> {
        self.timeout
    }

    fn wait(&self, child: &mut Child) -> Result<ExitStatus, ReloadError> {
        let Some(limit) = self.timeout else {
            return child.wait().map_err(|e| self.spawn_error(e));
        };

        let start = Instant::now();
        loop {
            match child.try_wait() {
                Ok(Some(status)) => return Ok(status),
                Ok(None) if start.elapsed() >= limit => {
                    let _ = child.kill();
                    let _ = child.wait();
                    return Err(ReloadError::TimedOut {
                        program: self.program.clone(),
                        after: limit,
                    });
                }
                Ok(None) => std::thread::sleep(POLL_INTERVAL),
                Err(e) => return Err(self.spawn_error(e)),
            }
        }
    }

    fn spawn_error(&self, e: std::io::Error) -> ReloadError {
        ReloadError::Spawn {
            program: self.program.clone(),
            message: e.to_string(),
        }
    }
}

impl ReloadTrigger for CommandReload {
    fn reload(&self) -> Result<(), ReloadError> {
        tracing::debug!(program = %self.program, args = ?self.args, "running reload command");

        let mut child = Command::new(&self.program)
            .args(&self.args)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| self.spawn_error(e))?;

        // Drain stderr on its own thread so a chatty command cannot block on
        // a full pipe while we wait for it.
        let stderr_reader = child.stderr.take().map(|mut pipe| {
            std::thread::spawn(move || {
                let mut buf = String::new();
                let _ = pipe.read_to_string(&mut buf);
                buf
            })
        });

        let status = self.wait(&mut child)?;
        if status.success() {
            return Ok(());
        }

        let stderr = stderr_reader
            .and_then(|h| h.join().ok())
            .unwrap_or_default();
        let diagnostic = match stderr.trim() {
            "" => "no diagnostic output".to_string(),
            s => s.to_string(),
        };

        Err(ReloadError::Failed {
            program: self.program.clone(),
            status: status.to_string(),
            diagnostic,
        })
    }
}

/// Reload trigger chosen at runtime from configuration.
#[derive(Debug, Clone)]
pub enum AnyReload {
    Command(CommandReload),
    None(NoReload),
}

impl ReloadTrigger for AnyReload {
    fn reload(&self) -> Result<(), ReloadError> {
        match self {
            AnyReload::Command(c) => c.reload(),
            AnyReload::None(n) => n.reload(),
        }
    }
}
