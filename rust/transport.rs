//! Subsystem C: owns the agent subprocess, plumbs the ndjson framer and
//! JSON-RPC multiplexer (`connection.rs`) across its stdio, and layers
//! per-request timeouts and graceful shutdown on top.

use std::{cell::RefCell, path::PathBuf, rc::Rc, time::Duration};

use futures::{FutureExt as _, StreamExt as _, channel::mpsc, future::LocalBoxFuture, select_biased};
use serde_json::Value;
use tokio::io::{AsyncBufReadExt as _, BufReader};
use tokio_util::compat::{TokioAsyncReadCompatExt as _, TokioAsyncWriteCompatExt as _};

use crate::connection::{Connection, NotificationHandler, RequestHandler};
use crate::error::Error;

/// Default per-request timeout applied to non-interactive RPCs.
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// The subprocess command line used to spawn an agent.
#[derive(Debug, Clone)]
pub struct AgentCommand {
    pub program: PathBuf,
    pub args: Vec<String>,
    /// Merged over the parent process's environment.
    pub env: Vec<(String, String)>,
    pub cwd: Option<PathBuf>,
}

impl AgentCommand {
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            env: Vec::new(),
            cwd: None,
        }
    }

    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    pub fn args(mut self, args: impl IntoIterator<Item = impl Into<String>>) -> Self {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    pub fn env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.push((key.into(), value.into()));
        self
    }

    pub fn cwd(mut self, cwd: impl Into<PathBuf>) -> Self {
        self.cwd = Some(cwd.into());
        self
    }
}

/// A line of stderr, a close notification, or an out-of-band error,
/// delivered in arrival order. `close` is guaranteed to fire exactly once.
#[derive(Debug, Clone)]
pub enum TransportEvent {
    Stderr(String),
    Closed {
        code: Option<i32>,
        signal: Option<i32>,
    },
    Error(String),
}

enum State {
    NotSpawned,
    Spawned {
        connection: Rc<Connection>,
        child: tokio::process::Child,
    },
    Closed,
}

/// Owns at most one [`AgentCommand`] subprocess at a time ("exactly
/// one active at a time per Transport; second spawn is a programmer
/// error").
pub struct Transport {
    state: RefCell<State>,
    default_timeout: Duration,
}

impl Transport {
    pub fn new() -> Self {
        Self {
            state: RefCell::new(State::NotSpawned),
            default_timeout: DEFAULT_REQUEST_TIMEOUT,
        }
    }

    pub fn with_default_timeout(mut self, timeout: Duration) -> Self {
        self.default_timeout = timeout;
        self
    }

    /// Spawns the agent process and wires the ndjson framer + JSON-RPC
    /// mux across its stdio. Returns an event stream and the IO driver
    /// future, which the caller must spawn (e.g. via
    /// `tokio::task::spawn_local`) for any traffic to flow.
    ///
    /// Calling `spawn` a second time on the same `Transport` is a fault
    /// and returns `Error::already_spawned()`.
    pub fn spawn(
        &self,
        command: AgentCommand,
        request_handler: RequestHandler,
        notification_handler: NotificationHandler,
        spawn: impl Fn(LocalBoxFuture<'static, ()>) + 'static,
    ) -> Result<
        (
            mpsc::UnboundedReceiver<TransportEvent>,
            impl Future<Output = ()> + 'static,
        ),
        Error,
    > {
        if !matches!(*self.state.borrow(), State::NotSpawned) {
            return Err(Error::already_spawned());
        }

        let mut cmd = tokio::process::Command::new(&command.program);
        cmd.args(&command.args)
            .envs(command.env.iter().map(|(k, v)| (k.as_str(), v.as_str())))
            .stdin(std::process::Stdio::piped())
            .stdout(std::process::Stdio::piped())
            .stderr(std::process::Stdio::piped())
            .kill_on_drop(true);
        if let Some(cwd) = &command.cwd {
            cmd.current_dir(cwd);
        }

        let mut child = cmd.spawn().map_err(|e| {
            Error::internal_error().with_data(serde_json::json!({
                "binaryPath": command.program.display().to_string(),
                "error": e.to_string(),
            }))
        })?;

        let stdin = child.stdin.take().expect("piped stdin").compat_write();
        let stdout = child.stdout.take().expect("piped stdout").compat();
        let stderr = child.stderr.take().expect("piped stderr");

        let (events_tx, events_rx) = mpsc::unbounded();

        let (connection, io_task) =
            Connection::new(request_handler, notification_handler, stdin, stdout, spawn);
        let connection = Rc::new(connection);

        let stderr_events_tx = events_tx.clone();
        let stderr_task = async move {
            let mut lines = BufReader::new(stderr).lines();
            while let Ok(Some(line)) = lines.next_line().await {
                stderr_events_tx.unbounded_send(TransportEvent::Stderr(line)).ok();
            }
        };

        let close_events_tx = events_tx.clone();
        let driver = async move {
            let mut stderr_task = Box::pin(stderr_task);
            select_biased! {
                result = io_task.fuse() => {
                    if let Err(error) = result {
                        close_events_tx.unbounded_send(TransportEvent::Error(error.to_string())).ok();
                    }
                }
                _ = &mut stderr_task => {}
            }
            stderr_task.await;
            close_events_tx
                .unbounded_send(TransportEvent::Closed { code: None, signal: None })
                .ok();
        };

        *self.state.borrow_mut() = State::Spawned { connection, child };

        Ok((events_rx, driver))
    }

    fn connection(&self) -> Result<Rc<Connection>, Error> {
        match &*self.state.borrow() {
            State::Spawned { connection, .. } => Ok(connection.clone()),
            State::NotSpawned | State::Closed => Err(Error::not_connected()),
        }
    }

    /// Sends a request with the given timeout. `timeout = None` applies
    /// the transport's default timeout; `Some(Duration::ZERO)` disables
    /// the timeout entirely (used for `session/prompt` and
    /// `authenticate`, which may block on human input).
    pub async fn request(
        &self,
        method: impl Into<Box<str>>,
        params: Value,
        timeout: Option<Duration>,
    ) -> Result<Value, Error> {
        let connection = self.connection()?;
        let request = connection.request(method, params);
        match timeout.or(Some(self.default_timeout)) {
            Some(duration) if duration > Duration::ZERO => {
                match tokio::time::timeout(duration, request).await {
                    Ok(result) => result,
                    Err(_) => Err(Error::timeout()),
                }
            }
            _ => request.await,
        }
    }

    /// Sends a request with the transport's configured default timeout.
    pub async fn request_default(
        &self,
        method: impl Into<Box<str>>,
        params: Value,
    ) -> Result<Value, Error> {
        self.request(method, params, None).await
    }

    /// Sends a notification; no response is awaited.
    pub fn notify(&self, method: impl Into<Box<str>>, params: Value) -> Result<(), Error> {
        self.connection()?.notify(method, params);
        Ok(())
    }

    /// Drops the connection (closing the agent's stdin, which most
    /// agents treat as a shutdown signal), waits up to `grace_period` for
    /// exit, then force-kills. Idempotent; returns once the process has
    /// exited.
    ///
    /// No POSIX-signal crate is in the dependency stack, so unlike a
    /// SIGTERM-then-SIGKILL implementation this can't ask the process to
    /// clean up before the grace period elapses beyond the EOF on
    /// stdin.
    pub async fn close(&self, grace_period: Duration) {
        let mut child = match std::mem::replace(&mut *self.state.borrow_mut(), State::Closed) {
            State::Spawned { connection, child } => {
                drop(connection);
                child
            }
            State::NotSpawned | State::Closed => return,
        };
        if tokio::time::timeout(grace_period, child.wait()).await.is_err() {
            child.start_kill().ok();
            child.wait().await.ok();
        }
    }

    /// Immediate force-kill without waiting. Idempotent.
    pub fn kill(&self) {
        if let State::Spawned { mut child, .. } =
            std::mem::replace(&mut *self.state.borrow_mut(), State::Closed)
        {
            child.start_kill().ok();
        }
    }

    pub fn is_connected(&self) -> bool {
        matches!(*self.state.borrow(), State::Spawned { .. })
    }
}

impl Default for Transport {
    fn default() -> Self {
        Self::new()
    }
}
