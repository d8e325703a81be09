//! Agent Client Protocol: a JSON-RPC 2.0 protocol for communication between
//! code editors (or other clients) and AI coding agents running as
//! subprocesses.
//!
//! This crate implements the client side of the protocol end to end: it
//! spawns and speaks to an agent subprocess (`transport`), performs the
//! version/capability handshake and authentication (`init`), manages
//! sessions (`session`), drives prompt turns and routes the updates an
//! agent streams back (`prompt`, `update_router`), tracks tool calls and
//! arbitrates the permission requests they raise (`tool_call`,
//! `permission`), and exposes the client-side terminals an agent can run
//! commands in (`terminal`).
//!
//! The pieces are deliberately loosely coupled rather than bundled behind
//! one god object: [`Transport`] is shared (via `Rc`) by whichever of
//! [`SessionManager`] and [`PromptHandler`] need to send on it, while
//! [`PermissionEngine`] and [`TerminalRegistry`] are tools a concrete
//! [`Client`] implementation owns and calls into from its own method
//! bodies. [`connect`] wires together only the handshake itself, since
//! that part has no reasonable variation across callers.

mod agent;
mod client;
mod connection;
mod dispatch;
mod error;
mod events;
mod ext;
mod ids;
mod init;
mod mcp_types;
mod permission;
mod plan;
mod prompt;
mod session;
mod terminal;
mod tool_call;
mod transport;
mod update_router;

#[cfg(test)]
mod acp_tests;

pub use agent::{
    Agent, AgentCapabilities, AgentMethodNames, AuthMethod, AuthMethodId, AuthenticateRequest,
    AuthenticateResponse, AvailableCommand, CancelNotification, ConfigOption, EnvVariable,
    ForkSessionRequest, ForkSessionResponse, HttpHeader, Implementation, InitializeRequest,
    InitializeResponse, ListSessionsRequest, ListSessionsResponse, LoadSessionRequest,
    LoadSessionResponse, McpCapabilities, McpServer, ModelId, ModelInfo, NewSessionRequest,
    NewSessionResponse, PromptCapabilities, PromptRequest, PromptResponse, ResumeSessionRequest,
    ResumeSessionResponse, SessionCapabilities, SessionModeId, SessionModeState,
    SessionModelState, SessionSummary, SetSessionConfigOptionRequest,
    SetSessionConfigOptionResponse, SetSessionModeRequest, SetSessionModeResponse,
    SetSessionModelRequest, SetSessionModelResponse, StopReason, AGENT_METHOD_NAMES,
};
pub use client::{
    Client, ClientCapabilities, ClientMethodNames, CreateTerminalRequest, CreateTerminalResponse,
    FileSystemCapability, KillTerminalCommandRequest, KillTerminalCommandResponse,
    PermissionOption, PermissionOptionId, PermissionOptionKind, ReadTextFileRequest,
    ReadTextFileResponse, ReleaseTerminalRequest, ReleaseTerminalResponse,
    RequestPermissionOutcome, RequestPermissionRequest, RequestPermissionResponse,
    SessionNotification, SessionUpdate, TerminalExitStatus, TerminalId, TerminalOutputRequest,
    TerminalOutputResponse, Usage, WaitForTerminalExitRequest, WaitForTerminalExitResponse,
    WriteTextFileRequest, WriteTextFileResponse, CLIENT_METHOD_NAMES,
};
pub use error::Error;
pub use events::{EventBus, ListenerId};
pub use ext::{ExtMethodRequest, ExtMethodResponse, ExtNotification};
pub use ids::{ProtocolVersion, SessionId, V1};
pub use init::{authenticate, initialize, is_auth_required_error, select_auth_method, AgentConnection, AuthState};
pub use mcp_types::{
    Annotations, AudioContent, BlobResourceContents, ContentBlock, EmbeddedResource,
    EmbeddedResourceResource, ImageContent, ResourceLink, Role, TextContent,
    TextResourceContents,
};
pub use permission::{PendingPermission, PermissionEngine, PermissionEvent, PolicyAction};
pub use plan::{Plan, PlanEntry, PlanEntryPriority, PlanEntryStatus};
pub use prompt::PromptHandler;
pub use session::{Session, SessionManager, SessionRegistry};
pub use terminal::{TerminalRegistry, DEFAULT_OUTPUT_BYTE_LIMIT};
pub use tool_call::{
    Diff, RegisteredToolCall, ToolCall, ToolCallContent, ToolCallEvent, ToolCallId,
    ToolCallLocation, ToolCallRegistry, ToolCallStatus, ToolCallUpdate, ToolCallUpdateFields,
    ToolKind,
};
pub use transport::{AgentCommand, Transport, TransportEvent, DEFAULT_REQUEST_TIMEOUT};
pub use update_router::{MessageAccumulator, RouterEvent, UpdateRouter};

use std::rc::Rc;

use futures::{channel::mpsc::UnboundedReceiver, future::LocalBoxFuture, FutureExt as _};

/// The result of [`connect`]: the shared [`Transport`] plus the negotiated
/// [`AgentConnection`]. Build a [`SessionManager`] and/or [`PromptHandler`]
/// against `transport` from here; both borrow/share it rather than take
/// it over, so either or both can be constructed.
pub struct AcpConnection {
    pub transport: Rc<Transport>,
    pub agent: AgentConnection,
}

/// Spawns `command` as an agent subprocess, wires its stdio through a
/// [`Transport`], registers `client`'s methods as the request/notification
/// handlers for the agent-to-client direction, and performs the
/// `initialize` (and, if `auto_authenticate`, `authenticate`) handshake.
///
/// `spawn` is used both to drive the transport's background IO and to run
/// the handlers `client`'s methods are dispatched onto; it's typically
/// `|fut| tokio::task::spawn_local(fut)` under a `tokio::task::LocalSet`,
/// since none of this crate's futures are `Send`.
///
/// Returns the connection plus a [`TransportEvent`] receiver the caller
/// can poll for stderr lines and the eventual `Closed` event.
pub async fn connect<C: Client + 'static>(
    command: AgentCommand,
    client: Rc<C>,
    client_capabilities: ClientCapabilities,
    client_info: Option<Implementation>,
    auto_authenticate: bool,
    spawn: impl Fn(LocalBoxFuture<'static, ()>) + Clone + 'static,
) -> Result<(AcpConnection, UnboundedReceiver<TransportEvent>), Error> {
    let transport = Rc::new(Transport::new());
    let request_handler = dispatch::build_client_request_handler(client.clone());
    let notification_handler = dispatch::build_client_notification_handler(client, spawn.clone());

    let (events, driver) =
        transport.spawn(command, request_handler, notification_handler, spawn.clone())?;
    spawn(driver.boxed_local());

    let agent = init::initialize(&transport, client_capabilities, client_info, auto_authenticate).await?;
    Ok((AcpConnection { transport, agent }, events))
}
