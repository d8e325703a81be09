//! Subsystem D: client-side terminal processes the agent spawns and
//! inspects via `terminal/create`, `terminal/output`,
//! `terminal/wait_for_exit`, `terminal/kill`, `terminal/release`.

use std::{cell::RefCell, collections::HashMap, path::PathBuf, process::Stdio, rc::Rc, sync::Arc};

use futures::channel::oneshot;
use tokio::io::AsyncReadExt as _;

use crate::client::{EnvVariable, TerminalExitStatus, TerminalId};
use crate::error::Error;

/// Applied when `CreateTerminalRequest.output_byte_limit` is absent.
pub const DEFAULT_OUTPUT_BYTE_LIMIT: u64 = 1_048_576;

struct TerminalEntry {
    child: RefCell<Option<tokio::process::Child>>,
    output: RefCell<Vec<u8>>,
    byte_limit: u64,
    truncated: RefCell<bool>,
    exit_status: RefCell<Option<TerminalExitStatus>>,
    exit_rx: RefCell<Option<oneshot::Receiver<()>>>,
}

/// Owns every terminal created for a session. Spawns real OS processes
/// with `stdio = {ignore, pipe, pipe}`, combines stdout+stderr into one
/// buffer per the source, and enforces a tail-truncating byte limit that
/// always starts the retained buffer at a valid UTF-8 boundary.
pub struct TerminalRegistry {
    terminals: RefCell<HashMap<TerminalId, Rc<TerminalEntry>>>,
    next_id: RefCell<u64>,
}

impl TerminalRegistry {
    pub fn new() -> Self {
        Self {
            terminals: RefCell::new(HashMap::new()),
            next_id: RefCell::new(0),
        }
    }

    fn mint_id(&self) -> TerminalId {
        let mut next_id = self.next_id.borrow_mut();
        let id = *next_id;
        *next_id += 1;
        TerminalId(Arc::from(format!("term-{id}")))
    }

    /// Spawns `command args...` with `cwd`/`env` applied, and starts
    /// background tasks that drain stdout/stderr into the shared output
    /// buffer. The caller (typically the Transport's `spawn` closure) must
    /// drive the returned future for output to actually accumulate; in
    /// practice this is spawned via `tokio::task::spawn_local` right here.
    pub fn create(
        &self,
        command: String,
        args: Vec<String>,
        cwd: Option<PathBuf>,
        env: Vec<EnvVariable>,
        output_byte_limit: Option<u64>,
        spawn: impl Fn(futures::future::LocalBoxFuture<'static, ()>) + 'static,
    ) -> Result<TerminalId, Error> {
        let mut cmd = tokio::process::Command::new(&command);
        cmd.args(&args)
            .envs(env.iter().map(|v| (v.name.as_str(), v.value.as_str())))
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        if let Some(cwd) = &cwd {
            cmd.current_dir(cwd);
        }

        let mut child = cmd.spawn().map_err(|e| {
            Error::internal_error().with_data(serde_json::json!({
                "command": command,
                "error": e.to_string(),
            }))
        })?;

        let stdout = child.stdout.take();
        let stderr = child.stderr.take();
        let id = self.mint_id();
        let (exit_tx, exit_rx) = oneshot::channel();
        let entry = Rc::new(TerminalEntry {
            child: RefCell::new(Some(child)),
            output: RefCell::new(Vec::new()),
            byte_limit: output_byte_limit.unwrap_or(DEFAULT_OUTPUT_BYTE_LIMIT),
            truncated: RefCell::new(false),
            exit_status: RefCell::new(None),
            exit_rx: RefCell::new(Some(exit_rx)),
        });

        if let Some(mut stdout) = stdout {
            let entry = entry.clone();
            spawn(
                Box::pin(async move {
                    let mut buf = [0u8; 4096];
                    loop {
                        match stdout.read(&mut buf).await {
                            Ok(0) | Err(_) => break,
                            Ok(n) => append_output(&entry, &buf[..n]),
                        }
                    }
                }),
            );
        }
        if let Some(mut stderr) = stderr {
            let entry = entry.clone();
            spawn(
                Box::pin(async move {
                    let mut buf = [0u8; 4096];
                    loop {
                        match stderr.read(&mut buf).await {
                            Ok(0) | Err(_) => break,
                            Ok(n) => append_output(&entry, &buf[..n]),
                        }
                    }
                }),
            );
        }

        // Polls `try_wait` rather than holding a mutable borrow of
        // `entry.child` across an await point, so `kill` can still reach
        // the child while this task is suspended between polls.
        let wait_entry = entry.clone();
        spawn(Box::pin(async move {
            let exit_status = loop {
                let polled = wait_entry
                    .child
                    .borrow_mut()
                    .as_mut()
                    .and_then(|c| c.try_wait().transpose());
                match polled {
                    Some(Ok(status)) => {
                        break TerminalExitStatus {
                            exit_code: status.code().map(|c| c as u32),
                            signal: terminal_signal(&status),
                        };
                    }
                    Some(Err(_)) => {
                        break TerminalExitStatus { exit_code: None, signal: None };
                    }
                    None => {
                        tokio::time::sleep(std::time::Duration::from_millis(50)).await;
                    }
                }
            };
            *wait_entry.exit_status.borrow_mut() = Some(exit_status);
            exit_tx.send(()).ok();
        }));

        self.terminals.borrow_mut().insert(id.clone(), entry);
        Ok(id)
    }

    pub fn output(&self, id: &TerminalId) -> Result<(String, bool, Option<TerminalExitStatus>), Error> {
        let terminals = self.terminals.borrow();
        let entry = terminals.get(id).ok_or_else(|| Error::terminal_not_found(id))?;
        let output = String::from_utf8_lossy(&entry.output.borrow()).into_owned();
        Ok((output, *entry.truncated.borrow(), entry.exit_status.borrow().clone()))
    }

    /// Suspends until the process exits. Entries that already exited
    /// resolve immediately on the next poll (the oneshot has already
    /// fired; `await` on a closed channel is checked after the fact
    /// below).
    pub async fn wait_for_exit(&self, id: &TerminalId) -> Result<TerminalExitStatus, Error> {
        let entry = self
            .terminals
            .borrow()
            .get(id)
            .cloned()
            .ok_or_else(|| Error::terminal_not_found(id))?;
        if let Some(status) = entry.exit_status.borrow().clone() {
            return Ok(status);
        }
        let rx = entry.exit_rx.borrow_mut().take();
        if let Some(rx) = rx {
            rx.await.ok();
        }
        Ok(entry
            .exit_status
            .borrow()
            .clone()
            .unwrap_or(TerminalExitStatus { exit_code: None, signal: None }))
    }

    /// Terminates the running command without forgetting the id.
    pub fn kill(&self, id: &TerminalId) -> Result<(), Error> {
        let terminals = self.terminals.borrow();
        let entry = terminals.get(id).ok_or_else(|| Error::terminal_not_found(id))?;
        if let Some(child) = entry.child.borrow_mut().as_mut() {
            child.start_kill().ok();
        }
        Ok(())
    }

    /// Terminates the command (if still running) and forgets the id.
    /// Idempotent: releasing an unknown id is a no-op.
    pub fn release(&self, id: &TerminalId) {
        if let Some(entry) = self.terminals.borrow_mut().remove(id) {
            if let Some(child) = entry.child.borrow_mut().as_mut() {
                child.start_kill().ok();
            }
        }
    }

    pub fn release_all(&self) {
        let ids: Vec<_> = self.terminals.borrow().keys().cloned().collect();
        for id in ids {
            self.release(&id);
        }
    }
}

impl Default for TerminalRegistry {
    fn default() -> Self {
        Self::new()
    }
}

fn terminal_signal(status: &std::process::ExitStatus) -> Option<String> {
    #[cfg(unix)]
    {
        use std::os::unix::process::ExitStatusExt as _;
        return status.signal().map(|s| s.to_string());
    }
    #[cfg(not(unix))]
    {
        let _ = status;
        None
    }
}

/// Appends `bytes` to the entry's buffer, then truncates to the byte
/// limit if needed: keep the tail whose length equals the limit, then
/// advance the start forward past any leading UTF-8 continuation bytes
/// (`10xxxxxx`) so the retained slice starts on a code-point boundary.
fn append_output(entry: &TerminalEntry, bytes: &[u8]) {
    let mut output = entry.output.borrow_mut();
    output.extend_from_slice(bytes);
    let limit = entry.byte_limit as usize;
    if limit > 0 && output.len() > limit {
        let mut start = output.len() - limit;
        while start < output.len() && output[start] & 0b1100_0000 == 0b1000_0000 {
            start += 1;
        }
        output.drain(0..start);
        *entry.truncated.borrow_mut() = true;
    }
}
