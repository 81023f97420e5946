//! Client side of the tool protocol: owns one server child process and talks
//! to it over its stdin/stdout, one request at a time.

pub mod tuning;

use q2d_core::channel::LineChannel;
use q2d_core::protocol::{Request, Response};
use serde_json::Value;
use std::ffi::OsString;
use std::io;
use std::process::Stdio;
use tokio::io::BufReader;
use tokio::process::{Child, ChildStdin, ChildStdout, Command};

#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    #[error("client is not running")]
    NotRunning,
    #[error("failed to launch {program}: {source}")]
    Spawn {
        program: String,
        #[source]
        source: io::Error,
    },
    #[error("server exited before signalling readiness")]
    Handshake,
    #[error("transport error: {0}")]
    Io(#[from] io::Error),
    #[error("server closed its output while a call was pending")]
    ServerExited,
    #[error("undecodable response {line:?}: {source}")]
    Decode {
        line: String,
        #[source]
        source: serde_json::Error,
    },
    #[error("tool error: {0}")]
    Tool(String),
    #[error("unexpected tool result: {0}")]
    UnexpectedResult(String),
}

/// How to launch the server process.
#[derive(Debug, Clone)]
pub struct ServerCommand {
    pub program: OsString,
    pub args: Vec<OsString>,
    pub envs: Vec<(OsString, OsString)>,
}

impl ServerCommand {
    pub fn new(program: impl Into<OsString>) -> Self {
        Self { program: program.into(), args: Vec::new(), envs: Vec::new() }
    }

    pub fn arg(mut self, arg: impl Into<OsString>) -> Self {
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

    pub fn env(mut self, key: impl Into<OsString>, value: impl Into<OsString>) -> Self {
        self.envs.push((key.into(), value.into()));
        self
    }
}

struct Session {
    child: Child,
    channel: LineChannel<BufReader<ChildStdout>, ChildStdin>,
}

/// Exclusive owner of one server child process.
///
/// The child is spawned with `kill_on_drop`, so dropping a running client
/// still releases the process; [`ToolClient::stop`] additionally waits for it.
pub struct ToolClient {
    command: ServerCommand,
    session: Option<Session>,
    ready_line: Option<String>,
}

impl ToolClient {
    pub fn new(command: ServerCommand) -> Self {
        Self { command, session: None, ready_line: None }
    }

    pub fn is_running(&self) -> bool { self.session.is_some() }

    /// The handshake line of the current (or last) server.
    pub fn ready_line(&self) -> Option<&str> { self.ready_line.as_deref() }

    /// Launch the server and wait for its handshake line. No-op when already running.
    pub async fn start(&mut self) -> Result<(), ClientError> {
        if self.session.is_some() {
            return Ok(());
        }
        let program = self.command.program.to_string_lossy().into_owned();
        let mut child = Command::new(&self.command.program)
            .args(&self.command.args)
            .envs(self.command.envs.iter().map(|(k, v)| (k, v)))
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::inherit())
            .kill_on_drop(true)
            .spawn()
            .map_err(|source| ClientError::Spawn { program: program.clone(), source })?;

        let (Some(stdin), Some(stdout)) = (child.stdin.take(), child.stdout.take()) else {
            return Err(ClientError::Io(io::Error::other("child stdio was not captured")));
        };
        let mut channel = LineChannel::new(BufReader::new(stdout), stdin);
        match channel.recv_line().await? {
            Some(line) => {
                tracing::info!(%program, ready = %line, "server started");
                self.ready_line = Some(line);
            }
            None => {
                let _ = child.start_kill();
                let _ = child.wait().await;
                return Err(ClientError::Handshake);
            }
        }
        self.session = Some(Session { child, channel });
        Ok(())
    }

    /// Send one request and wait for its single response line.
    pub async fn call_tool(&mut self, tool: &str, args: Value) -> Result<Response, ClientError> {
        let session = self.session.as_mut().ok_or(ClientError::NotRunning)?;
        tracing::debug!(tool, "calling tool");
        session.channel.send_json(&Request::new(tool, args)).await?;
        let line = session.channel.recv_line().await?.ok_or(ClientError::ServerExited)?;
        match serde_json::from_str(&line) {
            Ok(resp) => Ok(resp),
            Err(source) => Err(ClientError::Decode { line, source }),
        }
    }

    /// Like [`call_tool`](Self::call_tool), with error responses mapped to [`ClientError::Tool`].
    pub async fn call_result(&mut self, tool: &str, args: Value) -> Result<Value, ClientError> {
        self.call_tool(tool, args).await?.into_result().map_err(ClientError::Tool)
    }

    /// Terminate the server and wait for it to exit. Idempotent.
    pub async fn stop(&mut self) -> Result<(), ClientError> {
        let Some(Session { mut child, channel }) = self.session.take() else {
            return Ok(());
        };
        // closing stdin lets the server leave its loop on EOF; kill covers the rest
        drop(channel);
        let _ = child.start_kill();
        let status = child.wait().await?;
        tracing::info!(%status, "server stopped");
        Ok(())
    }
}
