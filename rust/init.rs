//! Subsystems J and part of H: the version/capability handshake and the
//! authentication flow that follows it.

use crate::agent::{
    AgentCapabilities, AuthMethod, AuthMethodId, AuthenticateRequest, Implementation,
    InitializeRequest, INITIALIZE_METHOD_NAME, AUTHENTICATE_METHOD_NAME,
};
use crate::client::ClientCapabilities;
use crate::error::Error;
use crate::ids::{ProtocolVersion, V1};
use crate::transport::Transport;

/// Whether the connection has completed authentication, and with what.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthState {
    /// No `authMethods` were advertised; nothing to authenticate.
    None,
    /// `authMethods` is non-empty and `authenticate` hasn't succeeded yet.
    Required,
    Authenticated,
}

/// The negotiated handshake result. Immutable after construction
/// except for `auth_state`, which only ever advances
/// `none|required → authenticated`.
pub struct AgentConnection {
    pub protocol_version: ProtocolVersion,
    pub agent_info: Option<Implementation>,
    pub client_capabilities: ClientCapabilities,
    pub agent_capabilities: AgentCapabilities,
    pub auth_methods: Vec<AuthMethod>,
    auth_state: std::cell::Cell<AuthState>,
}

impl AgentConnection {
    pub fn auth_state(&self) -> AuthState {
        self.auth_state.get()
    }

    pub fn can_load_session(&self) -> bool {
        self.agent_capabilities.load_session
    }

    pub fn can_prompt_with_images(&self) -> bool {
        self.agent_capabilities.prompt_capabilities.image
    }

    pub fn can_prompt_with_audio(&self) -> bool {
        self.agent_capabilities.prompt_capabilities.audio
    }

    pub fn can_embed_context(&self) -> bool {
        self.agent_capabilities.prompt_capabilities.embedded_context
    }

    fn mark_authenticated(&self) {
        self.auth_state.set(AuthState::Authenticated);
    }
}

/// Sends `initialize` and builds an [`AgentConnection`] from the
/// response. Closes the transport and fails with a version-mismatch
/// error if the agent's `protocolVersion` doesn't match ours. If
/// `auto_authenticate` is true and the resulting `auth_state` is
/// `Required`, runs authentication immediately and returns an already-authenticated
/// connection.
pub async fn initialize(
    transport: &Transport,
    client_capabilities: ClientCapabilities,
    client_info: Option<Implementation>,
    auto_authenticate: bool,
) -> Result<AgentConnection, Error> {
    let request = InitializeRequest {
        protocol_version: V1,
        client_capabilities,
        client_info,
        meta: None,
    };
    let params = serde_json::to_value(&request)?;
    let result = transport.request_default(INITIALIZE_METHOD_NAME, params).await?;
    let response: crate::agent::InitializeResponse = serde_json::from_value(result)?;

    if response.protocol_version != V1 {
        transport.close(std::time::Duration::from_secs(5)).await;
        return Err(Error::version_mismatch(V1.0, response.protocol_version.0));
    }

    let auth_state = if response.auth_methods.is_empty() {
        AuthState::None
    } else {
        AuthState::Required
    };

    let connection = AgentConnection {
        protocol_version: response.protocol_version,
        agent_info: response.agent_info,
        client_capabilities: request.client_capabilities,
        agent_capabilities: response.agent_capabilities,
        auth_methods: response.auth_methods,
        auth_state: std::cell::Cell::new(auth_state),
    };

    if auto_authenticate && connection.auth_state() == AuthState::Required {
        let method = select_auth_method(&connection.auth_methods)
            .ok_or_else(|| Error::authentication_failed("<none advertised>"))?;
        authenticate(transport, &connection, method).await?;
    }

    Ok(connection)
}

/// Deterministic auth-method choice: `agent_auth` > `terminal_auth` >
/// `env_variable` > first listed.
pub fn select_auth_method(methods: &[AuthMethod]) -> Option<&AuthMethod> {
    const PRIORITY: &[&str] = &["agent_auth", "terminal_auth", "env_variable"];
    for id in PRIORITY {
        if let Some(method) = methods.iter().find(|m| method_id_str(&m.id) == *id) {
            return Some(method);
        }
    }
    methods.first()
}

fn method_id_str(id: &AuthMethodId) -> &str {
    &id.0
}

/// Sends `authenticate` with no timeout (the agent may block on
/// interactive auth, e.g. a browser OAuth dance). On success, advances
/// `connection`'s `auth_state` to `Authenticated`.
pub async fn authenticate(
    transport: &Transport,
    connection: &AgentConnection,
    method: &AuthMethod,
) -> Result<(), Error> {
    let request = AuthenticateRequest {
        method_id: method.id.clone(),
        meta: None,
    };
    let params = serde_json::to_value(&request)?;
    transport
        .request(AUTHENTICATE_METHOD_NAME, params, Some(std::time::Duration::ZERO))
        .await
        .map_err(|e| {
            Error::authentication_failed(&method.name).with_data(serde_json::json!({
                "methodId": method.id.to_string(),
                "underlying": e.to_string(),
            }))
        })?;
    connection.mark_authenticated();
    Ok(())
}

/// True iff `err`'s code is the distinguished AUTH_REQUIRED code.
pub fn is_auth_required_error(err: &Error) -> bool {
    err.is_auth_required()
}
