//! Bridges `connection.rs`'s method-name-keyed, raw-`Value` handlers to
//! the typed [`crate::client::Client`] trait. This is the only place that
//! knows both the wire method names and the typed request/response shapes
//! for the agent-to-client direction.

use std::rc::Rc;

use futures::FutureExt as _;
use serde_json::Value;

use crate::client::{
    Client, CreateTerminalRequest, KillTerminalCommandRequest, ReadTextFileRequest,
    ReleaseTerminalRequest, RequestPermissionRequest, SessionNotification,
    TerminalOutputRequest, WaitForTerminalExitRequest, WriteTextFileRequest,
    CLIENT_METHOD_NAMES,
};
use crate::connection::{NotificationHandler, RequestHandler};
use crate::error::Error;
use crate::ext::{ExtMethodRequest, ExtNotification};

fn decode<T: serde::de::DeserializeOwned>(params: Value) -> Result<T, Error> {
    serde_json::from_value(params).map_err(Error::from)
}

fn encode<T: serde::Serialize>(value: &T) -> Result<Value, Error> {
    serde_json::to_value(value).map_err(Error::from)
}

/// Builds the request handler passed to `Connection::new` for a client
/// implementation `C`. Requests outside the known method set are treated
/// as extension calls when prefixed `_`, otherwise as `MethodNotFound`.
pub(crate) fn build_client_request_handler<C: Client + 'static>(client: Rc<C>) -> RequestHandler {
    Box::new(move |method: Box<str>, params: Value| {
        let client = client.clone();
        async move {
            let names = CLIENT_METHOD_NAMES;
            match &*method {
                m if m == names.session_request_permission => {
                    let request: RequestPermissionRequest = decode(params)?;
                    encode(&client.request_permission(request).await?)
                }
                m if m == names.fs_write_text_file => {
                    let request: WriteTextFileRequest = decode(params)?;
                    encode(&client.write_text_file(request).await?)
                }
                m if m == names.fs_read_text_file => {
                    let request: ReadTextFileRequest = decode(params)?;
                    encode(&client.read_text_file(request).await?)
                }
                m if m == names.terminal_create => {
                    let request: CreateTerminalRequest = decode(params)?;
                    encode(&client.create_terminal(request).await?)
                }
                m if m == names.terminal_output => {
                    let request: TerminalOutputRequest = decode(params)?;
                    encode(&client.terminal_output(request).await?)
                }
                m if m == names.terminal_release => {
                    let request: ReleaseTerminalRequest = decode(params)?;
                    encode(&client.release_terminal(request).await?)
                }
                m if m == names.terminal_kill => {
                    let request: KillTerminalCommandRequest = decode(params)?;
                    encode(&client.kill_terminal_command(request).await?)
                }
                m if m == names.terminal_wait_for_exit => {
                    let request: WaitForTerminalExitRequest = decode(params)?;
                    encode(&client.wait_for_terminal_exit(request).await?)
                }
                m if m.starts_with('_') => {
                    let request = ExtMethodRequest {
                        method: std::sync::Arc::from(m),
                        params,
                    };
                    encode(&client.ext_method(request).await?.0)
                }
                _ => Err(Error::method_not_found()),
            }
        }
        .boxed_local()
    })
}

/// Builds the notification handler passed to `Connection::new` for a
/// client implementation `C`. Unlike the request handler, notification
/// errors (e.g. decode failures) have nowhere to go but the log: there is
/// no JSON-RPC id to carry a response back on.
pub(crate) fn build_client_notification_handler<C: Client + 'static>(
    client: Rc<C>,
    spawn: impl Fn(futures::future::LocalBoxFuture<'static, ()>) + 'static,
) -> NotificationHandler {
    Box::new(move |method: Box<str>, params: Value| {
        let client = client.clone();
        if &*method == CLIENT_METHOD_NAMES.session_update {
            match decode::<SessionNotification>(params) {
                Ok(notification) => spawn(
                    async move {
                        if let Err(error) = client.session_notification(notification).await {
                            log::error!("session/update handler failed: {error}");
                        }
                    }
                    .boxed_local(),
                ),
                Err(error) => log::error!("malformed session/update notification: {error}"),
            }
        } else if method.starts_with('_') {
            let notification = ExtNotification {
                method: std::sync::Arc::from(&*method),
                params,
            };
            spawn(
                async move {
                    if let Err(error) = client.ext_notification(notification).await {
                        log::error!("extension notification handler failed: {error}");
                    }
                }
                .boxed_local(),
            );
        } else {
            log::warn!("unrecognized notification method: {method}");
        }
    })
}
