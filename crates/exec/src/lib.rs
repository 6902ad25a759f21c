//! Child process stdout as a framing transport
//!
//! [`CommandTransport`] spawns a program with stdout piped and feeds what it
//! writes to a stream controller. A zero exit closes the transport; any other
//! exit (or death by signal) reports a transport failure after the output has
//! been delivered. Destroying the transport kills the child.

use std::{
  path::PathBuf,
  process::{ExitStatus, Stdio},
};

use async_trait::async_trait;
use framing::{
  DEFAULT_CHUNK_SIZE, FramingConfig, FramingError, ReaderTransport, StreamController, StreamEvents, StreamHandle,
  Transport, TransportEvent,
};
use tokio::process::{Child, ChildStdout, Command};
use tracing::{debug, error, trace, warn};

#[derive(Debug, thiserror::Error)]
pub enum ExecError {
  #[error("no command given")]
  EmptyCommand,
  #[error("failed to spawn {program}: {source}")]
  Spawn {
    program: String,
    #[source]
    source: std::io::Error,
  },
  #[error("stdout of {0} was not piped")]
  StdoutNotPiped(String),
  #[error(transparent)]
  Framing(#[from] FramingError),
}

pub type Result<T> = std::result::Result<T, ExecError>;

/// What to run and how
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandSpec {
  pub program: String,
  pub args: Vec<String>,
  pub current_dir: Option<PathBuf>,
  pub envs: Vec<(String, String)>,
  pub chunk_size: usize,
}

impl CommandSpec {
  pub fn new(program: impl Into<String>) -> Self {
    Self {
      program: program.into(),
      args: Vec::new(),
      current_dir: None,
      envs: Vec::new(),
      chunk_size: DEFAULT_CHUNK_SIZE,
    }
  }

  /// First element is the program, the rest are its arguments
  pub fn from_argv<I, S>(argv: I) -> Result<Self>
  where
    I: IntoIterator<Item = S>,
    S: Into<String>,
  {
    let mut argv = argv.into_iter().map(Into::into);
    let program = argv.next().filter(|p| !p.is_empty()).ok_or(ExecError::EmptyCommand)?;
    Ok(Self::new(program).args(argv))
  }

  pub fn arg(mut self, arg: impl Into<String>) -> Self {
    self.args.push(arg.into());
    self
  }

  pub fn args<I, S>(mut self, args: I) -> Self
  where
    I: IntoIterator<Item = S>,
    S: Into<String>,
  {
    self.args.extend(args.into_iter().map(Into::into));
    self
  }

  pub fn current_dir(mut self, dir: impl Into<PathBuf>) -> Self {
    self.current_dir = Some(dir.into());
    self
  }

  pub fn env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
    self.envs.push((key.into(), value.into()));
    self
  }

  pub fn chunk_size(mut self, size: usize) -> Self {
    self.chunk_size = size;
    self
  }

  fn command(&self) -> Command {
    let mut cmd = Command::new(&self.program);
    cmd.args(&self.args).envs(self.envs.iter().map(|(k, v)| (k, v)));
    if let Some(dir) = &self.current_dir {
      cmd.current_dir(dir);
    }
    // stderr passes through so the user still sees diagnostics
    cmd
      .stdin(Stdio::null())
      .stdout(Stdio::piped())
      .stderr(Stdio::inherit())
      .kill_on_drop(true);
    cmd
  }
}

/// Transport over a running child's stdout
#[derive(Debug)]
pub struct CommandTransport {
  program: String,
  child: Child,
  stdout: ReaderTransport<ChildStdout>,
  destroyed: bool,
}

impl CommandTransport {
  pub fn spawn(spec: &CommandSpec) -> Result<Self> {
    trace!(program = %spec.program, args = ?spec.args, "Spawning child process");

    let mut child = spec.command().spawn().map_err(|e| {
      error!(program = %spec.program, err = %e, "Failed to spawn child process");
      ExecError::Spawn {
        program: spec.program.clone(),
        source: e,
      }
    })?;

    let stdout = child
      .stdout
      .take()
      .ok_or_else(|| ExecError::StdoutNotPiped(spec.program.clone()))?;

    debug!(program = %spec.program, pid = ?child.id(), "Child process started");

    Ok(Self {
      program: spec.program.clone(),
      child,
      stdout: ReaderTransport::with_chunk_size(stdout, spec.chunk_size),
      destroyed: false,
    })
  }

  /// OS process id, `None` once the child has been reaped
  pub fn id(&self) -> Option<u32> {
    self.child.id()
  }

  /// Wait for the child after its stdout closed
  async fn reap(&mut self) -> TransportEvent {
    match self.child.wait().await {
      Ok(status) if status.success() || self.destroyed => {
        debug!(program = %self.program, %status, "Child process exited");
        TransportEvent::Closed
      }
      Ok(status) => {
        let message = exit_message(&self.program, status);
        warn!(program = %self.program, %status, "Child process failed");
        TransportEvent::Failed(message)
      }
      Err(e) => {
        error!(program = %self.program, err = %e, "Failed to wait for child process");
        TransportEvent::Failed(format!("failed to wait for {}: {}", self.program, e))
      }
    }
  }
}

fn exit_message(program: &str, status: ExitStatus) -> String {
  match status.code() {
    Some(code) => format!("{} exited with status {}", program, code),
    None => format!("{} was terminated by a signal", program),
  }
}

#[async_trait]
impl Transport for CommandTransport {
  async fn next_event(&mut self) -> TransportEvent {
    // Child::wait is cancel safe and a closed reader keeps reporting Closed,
    // so a dropped call simply reaps again on the next one
    match self.stdout.next_event().await {
      TransportEvent::Closed => self.reap().await,
      event => event,
    }
  }

  fn destroy(&mut self) {
    self.destroyed = true;
    self.stdout.destroy();
    match self.child.start_kill() {
      Ok(()) => debug!(program = %self.program, "Killed child process"),
      // already exited and reaped
      Err(e) => trace!(program = %self.program, err = %e, "Child process kill skipped"),
    }
  }
}

/// Spawn `spec` and frame its stdout on a new controller task
pub fn frame_command(spec: &CommandSpec, config: &FramingConfig) -> Result<(StreamHandle, StreamEvents)> {
  // Validate before spawning so a bad separator never starts a process
  config.validate().map_err(FramingError::from)?;
  let transport = CommandTransport::spawn(spec)?;
  Ok(StreamController::spawn(transport, config)?)
}
