//! Ndjson framing and JSON-RPC 2.0 request/response/notification
//! correlation, combined in a single transport-agnostic `Connection`.
//!
//! This module knows nothing about subprocesses, timeouts, or the ACP
//! method set — it speaks raw `serde_json::Value` payloads keyed by
//! method name. `transport.rs` layers subprocess ownership and per-request
//! timeouts on top; the typed subsystems layer the actual ACP schema on
//! top of that.

use futures::{
    AsyncBufReadExt as _, AsyncRead, AsyncWrite, AsyncWriteExt as _, FutureExt as _,
    StreamExt as _,
    channel::{
        mpsc::{self, UnboundedReceiver, UnboundedSender},
        oneshot,
    },
    future::LocalBoxFuture,
    io::BufReader,
    select_biased,
};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::{
    collections::HashMap,
    rc::Rc,
    sync::{
        Arc,
        atomic::{AtomicI32, Ordering::SeqCst},
    },
};

use crate::error::Error;

pub(crate) type RequestHandler =
    Box<dyn Fn(Box<str>, Value) -> LocalBoxFuture<'static, Result<Value, Error>>>;
pub(crate) type NotificationHandler = Box<dyn Fn(Box<str>, Value)>;

type PendingMap = Arc<Mutex<HashMap<i32, oneshot::Sender<Result<Value, Error>>>>>;

#[derive(Debug, Deserialize)]
struct IncomingMessage {
    id: Option<i32>,
    method: Option<Box<str>>,
    #[serde(default)]
    params: Value,
    result: Option<Value>,
    error: Option<Error>,
}

#[derive(Serialize)]
#[serde(untagged)]
enum OutgoingMessage {
    Request {
        id: i32,
        method: Box<str>,
        #[serde(skip_serializing_if = "Value::is_null")]
        params: Value,
    },
    Notification {
        method: Box<str>,
        #[serde(skip_serializing_if = "Value::is_null")]
        params: Value,
    },
    OkResponse {
        id: i32,
        result: Value,
    },
    ErrorResponse {
        id: i32,
        error: Error,
    },
}

#[derive(Serialize)]
struct OutJsonRpcMessage {
    jsonrpc: &'static str,
    #[serde(flatten)]
    message: OutgoingMessage,
}

/// A bidirectional JSON-RPC 2.0 connection over two independent byte
/// streams. Owns no process; `outgoing_bytes`/`incoming_bytes` are handed
/// to it by the caller (the Transport, in production, or an
/// `async_pipe` pair in tests).
pub(crate) struct Connection {
    outgoing_tx: UnboundedSender<OutgoingMessage>,
    pending: PendingMap,
    next_id: AtomicI32,
}

impl Connection {
    /// Returns the connection handle plus the IO driver future. The
    /// driver must be polled (spawned) for any traffic to flow; it
    /// resolves once either byte stream closes.
    pub(crate) fn new(
        request_handler: RequestHandler,
        notification_handler: NotificationHandler,
        outgoing_bytes: impl Unpin + AsyncWrite + 'static,
        incoming_bytes: impl Unpin + AsyncRead + 'static,
        spawn: impl Fn(LocalBoxFuture<'static, ()>) + 'static,
    ) -> (Self, impl Future<Output = Result<(), Error>>) {
        let (outgoing_tx, outgoing_rx) = mpsc::unbounded();
        let (incoming_tx, incoming_rx) = mpsc::unbounded();
        let pending = PendingMap::default();
        let this = Self {
            outgoing_tx: outgoing_tx.clone(),
            pending: pending.clone(),
            next_id: AtomicI32::new(0),
        };
        Self::handle_dispatch(
            outgoing_tx,
            incoming_rx,
            request_handler,
            notification_handler,
            spawn,
        );
        let io_task = Self::handle_io(outgoing_rx, incoming_tx, pending, outgoing_bytes, incoming_bytes);
        (this, io_task)
    }

    /// Sends a request and returns a future that resolves when the
    /// matching response arrives. Completing the returned future is the
    /// only way the caller learns of a reply; dropping it silently
    /// leaves the entry in `pending` until a response (or transport
    /// close) removes it.
    pub(crate) fn request(
        &self,
        method: impl Into<Box<str>>,
        params: Value,
    ) -> impl Future<Output = Result<Value, Error>> + use<> {
        let (tx, rx) = oneshot::channel();
        let id = self.next_id.fetch_add(1, SeqCst);
        self.pending.lock().insert(id, tx);
        if self
            .outgoing_tx
            .unbounded_send(OutgoingMessage::Request {
                id,
                method: method.into(),
                params,
            })
            .is_err()
        {
            self.pending.lock().remove(&id);
        }
        async move { rx.await.unwrap_or_else(|_| Err(Error::transport_closed())) }
    }

    /// Sends a notification. No response is expected or possible.
    pub(crate) fn notify(&self, method: impl Into<Box<str>>, params: Value) {
        self.outgoing_tx
            .unbounded_send(OutgoingMessage::Notification {
                method: method.into(),
                params,
            })
            .ok();
    }

    async fn handle_io(
        mut outgoing_rx: UnboundedReceiver<OutgoingMessage>,
        incoming_tx: UnboundedSender<(Option<i32>, Box<str>, Value)>,
        pending: PendingMap,
        mut outgoing_bytes: impl Unpin + AsyncWrite,
        incoming_bytes: impl Unpin + AsyncRead,
    ) -> Result<(), Error> {
        let mut reader = BufReader::new(incoming_bytes);
        let mut outgoing_line = Vec::new();
        let mut incoming_line = String::new();
        loop {
            select_biased! {
                message = outgoing_rx.next() => {
                    let Some(message) = message else { break };
                    let message = OutJsonRpcMessage { jsonrpc: "2.0", message };
                    outgoing_line.clear();
                    serde_json::to_writer(&mut outgoing_line, &message).map_err(Error::into_internal_error)?;
                    log::trace!("send: {}", String::from_utf8_lossy(&outgoing_line));
                    outgoing_line.push(b'\n');
                    outgoing_bytes.write_all(&outgoing_line).await.ok();
                }
                bytes_read = reader.read_line(&mut incoming_line).fuse() => {
                    if bytes_read.map_err(Error::into_internal_error)? == 0 {
                        break;
                    }
                    let line = incoming_line.trim_end_matches(['\n', '\r']);
                    if !line.is_empty() {
                        log::trace!("recv: {line}");
                        match serde_json::from_str::<IncomingMessage>(line) {
                            Ok(IncomingMessage { id, method, params, result, error }) => {
                                if let Some(method) = method {
                                    incoming_tx.unbounded_send((id, method, params)).ok();
                                } else if let Some(id) = id {
                                    if let Some(error) = error {
                                        if let Some(tx) = pending.lock().remove(&id) {
                                            tx.send(Err(error)).ok();
                                        } else {
                                            log::error!("response for unknown request id {id}");
                                        }
                                    } else if let Some(tx) = pending.lock().remove(&id) {
                                        tx.send(Ok(result.unwrap_or(Value::Null))).ok();
                                    } else {
                                        log::error!("response for unknown request id {id}");
                                    }
                                } else {
                                    log::error!("malformed jsonrpc message, ignoring: {line}");
                                }
                            }
                            Err(error) => {
                                log::error!("failed to parse incoming line as JSON: {error}. raw: {line}");
                            }
                        }
                    }
                    incoming_line.clear();
                }
            }
        }
        for (_, tx) in pending.lock().drain() {
            tx.send(Err(Error::transport_closed())).ok();
        }
        Ok(())
    }

    fn handle_dispatch(
        outgoing_tx: UnboundedSender<OutgoingMessage>,
        mut incoming_rx: UnboundedReceiver<(Option<i32>, Box<str>, Value)>,
        request_handler: RequestHandler,
        notification_handler: NotificationHandler,
        spawn: impl Fn(LocalBoxFuture<'static, ()>) + 'static,
    ) {
        let spawn = Rc::new(spawn);
        let spawn_inner = spawn.clone();
        spawn(
            async move {
                while let Some((id, method, params)) = incoming_rx.next().await {
                    match id {
                        Some(id) => {
                            let result = request_handler(method, params);
                            let outgoing_tx = outgoing_tx.clone();
                            spawn_inner(
                                async move {
                                    let message = match result.await {
                                        Ok(result) => OutgoingMessage::OkResponse { id, result },
                                        Err(error) => OutgoingMessage::ErrorResponse { id, error },
                                    };
                                    outgoing_tx.unbounded_send(message).ok();
                                }
                                .boxed_local(),
                            );
                        }
                        None => notification_handler(method, params),
                    }
                }
            }
            .boxed_local(),
        )
    }
}
