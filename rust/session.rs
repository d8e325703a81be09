//! Subsystem H: session CRUD, capability gating, and the auth-retry-once
//! dance on session-creating RPCs.

use std::{cell::RefCell, collections::HashMap, rc::Rc, time::SystemTime};

use serde_json::Value;

use crate::agent::{
    ForkSessionRequest, ForkSessionResponse, ListSessionsRequest, ListSessionsResponse,
    LoadSessionRequest, LoadSessionResponse, NewSessionRequest, NewSessionResponse,
    ResumeSessionRequest, ResumeSessionResponse, SessionModelState, SessionModeState,
    SetSessionConfigOptionRequest, SetSessionConfigOptionResponse, SetSessionModeRequest,
    SetSessionModeResponse, SetSessionModelRequest, SetSessionModelResponse,
    SESSION_FORK_METHOD_NAME, SESSION_LIST_METHOD_NAME, SESSION_LOAD_METHOD_NAME,
    SESSION_NEW_METHOD_NAME, SESSION_RESUME_METHOD_NAME, SESSION_SET_CONFIG_OPTION_METHOD_NAME,
    SESSION_SET_MODE_METHOD_NAME, SESSION_SET_MODEL_METHOD_NAME,
};
use crate::error::Error;
use crate::ids::SessionId;
use crate::init::{self, AgentConnection};
use crate::transport::Transport;
use crate::ConfigOption;

/// The locally tracked mirror of a session the agent has created for us
/// `created_at` is a caller-supplied instant, since
/// [`std::time::SystemTime::now`] reads wall-clock state the core's
/// callers are expected to own, not derive implicitly.
#[derive(Debug, Clone)]
pub struct Session {
    pub session_id: SessionId,
    pub cwd: std::path::PathBuf,
    pub created_at: SystemTime,
    pub modes: Option<SessionModeState>,
    pub models: Option<SessionModelState>,
    pub config_options: Vec<ConfigOption>,
}

/// Map from session id to [`Session`] plus the single active-session
/// pointer. The pointer is always either absent or a present key.
#[derive(Default)]
pub struct SessionRegistry {
    sessions: HashMap<SessionId, Session>,
    active_session_id: Option<SessionId>,
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, id: &SessionId) -> Option<&Session> {
        self.sessions.get(id)
    }

    pub fn active_session_id(&self) -> Option<&SessionId> {
        self.active_session_id.as_ref()
    }

    pub fn active_session(&self) -> Option<&Session> {
        self.active_session_id.as_ref().and_then(|id| self.sessions.get(id))
    }

    fn insert_and_activate(&mut self, session: Session) {
        let id = session.session_id.clone();
        self.sessions.insert(id.clone(), session);
        self.active_session_id = Some(id);
    }

    /// Deletes `id`, clearing `active_session_id` iff it referenced `id`.
    pub fn remove(&mut self, id: &SessionId) {
        self.sessions.remove(id);
        if self.active_session_id.as_ref() == Some(id) {
            self.active_session_id = None;
        }
    }

    fn with_session_mut(&mut self, id: &SessionId, f: impl FnOnce(&mut Session)) {
        if let Some(session) = self.sessions.get_mut(id) {
            f(session);
        }
    }
}

/// Owns the negotiated [`AgentConnection`] and the [`SessionRegistry`];
/// shares (rather than owns) the [`Transport`] it was built against, since
/// the Prompt Handler needs the same Transport concurrently.
pub struct SessionManager {
    transport: Rc<Transport>,
    connection: AgentConnection,
    registry: RefCell<SessionRegistry>,
}

impl SessionManager {
    pub fn new(transport: Rc<Transport>, connection: AgentConnection) -> Self {
        Self {
            transport,
            connection,
            registry: RefCell::new(SessionRegistry::new()),
        }
    }

    pub fn connection(&self) -> &AgentConnection {
        &self.connection
    }

    pub fn registry(&self) -> std::cell::Ref<'_, SessionRegistry> {
        self.registry.borrow()
    }

    fn require(&self, supported: bool, capability: &str) -> Result<(), Error> {
        if supported {
            Ok(())
        } else {
            Err(Error::capability_not_supported(capability))
        }
    }

    /// Sends `method` with `params`, and if the agent responds with
    /// AUTH_REQUIRED, authenticates once (via [`init::select_auth_method`])
    /// and retries exactly once. A second AUTH_REQUIRED is surfaced as-is.
    async fn send_with_auth_retry(&self, method: &'static str, params: Value) -> Result<Value, Error> {
        match self.transport.request_default(method, params.clone()).await {
            Err(err) if init::is_auth_required_error(&err) => {
                let auth_method = init::select_auth_method(&self.connection.auth_methods)
                    .ok_or(err)?
                    .clone();
                init::authenticate(self.transport, &self.connection, &auth_method).await?;
                self.transport.request_default(method, params).await
            }
            other => other,
        }
    }

    pub async fn new_session(&self, request: NewSessionRequest) -> Result<NewSessionResponse, Error> {
        let cwd = request.cwd.clone();
        let params = serde_json::to_value(&request)?;
        let result = self.send_with_auth_retry(SESSION_NEW_METHOD_NAME, params).await?;
        let response: NewSessionResponse = serde_json::from_value(result)?;
        self.registry.borrow_mut().insert_and_activate(Session {
            session_id: response.session_id.clone(),
            cwd,
            created_at: SystemTime::now(),
            modes: response.modes.clone(),
            models: response.models.clone(),
            config_options: response.config_options.clone(),
        });
        Ok(response)
    }

    pub async fn load_session(&self, request: LoadSessionRequest) -> Result<LoadSessionResponse, Error> {
        self.require(self.connection.can_load_session(), "loadSession")?;
        let cwd = request.cwd.clone();
        let session_id = request.session_id.clone();
        let params = serde_json::to_value(&request)?;
        let result = self.send_with_auth_retry(SESSION_LOAD_METHOD_NAME, params).await?;
        let response: LoadSessionResponse = serde_json::from_value(result)?;
        self.registry.borrow_mut().insert_and_activate(Session {
            session_id,
            cwd,
            created_at: SystemTime::now(),
            modes: response.modes.clone(),
            models: response.models.clone(),
            config_options: response.config_options.clone(),
        });
        Ok(response)
    }

    pub async fn resume_session(
        &self,
        request: ResumeSessionRequest,
    ) -> Result<ResumeSessionResponse, Error> {
        self.require(self.connection.agent_capabilities.session_capabilities.resume, "sessionCapabilities.resume")?;
        let cwd = request.cwd.clone();
        let session_id = request.session_id.clone();
        let params = serde_json::to_value(&request)?;
        let result = self.send_with_auth_retry(SESSION_RESUME_METHOD_NAME, params).await?;
        let response: ResumeSessionResponse = serde_json::from_value(result)?;
        self.registry.borrow_mut().insert_and_activate(Session {
            session_id,
            cwd,
            created_at: SystemTime::now(),
            modes: response.modes.clone(),
            models: response.models.clone(),
            config_options: response.config_options.clone(),
        });
        Ok(response)
    }

    pub async fn fork_session(&self, request: ForkSessionRequest) -> Result<ForkSessionResponse, Error> {
        self.require(self.connection.agent_capabilities.session_capabilities.fork, "sessionCapabilities.fork")?;
        let cwd = request.cwd.clone();
        let params = serde_json::to_value(&request)?;
        let result = self.send_with_auth_retry(SESSION_FORK_METHOD_NAME, params).await?;
        let response: ForkSessionResponse = serde_json::from_value(result)?;
        self.registry.borrow_mut().insert_and_activate(Session {
            session_id: response.session_id.clone(),
            cwd,
            created_at: SystemTime::now(),
            modes: response.modes.clone(),
            models: response.models.clone(),
            config_options: Vec::new(),
        });
        Ok(response)
    }

    pub async fn list_sessions(&self, request: ListSessionsRequest) -> Result<ListSessionsResponse, Error> {
        self.require(self.connection.agent_capabilities.session_capabilities.list, "sessionCapabilities.list")?;
        let params = serde_json::to_value(&request)?;
        let result = self.transport.request_default(SESSION_LIST_METHOD_NAME, params).await?;
        Ok(serde_json::from_value(result)?)
    }

    pub async fn set_session_mode(&self, request: SetSessionModeRequest) -> Result<SetSessionModeResponse, Error> {
        let session_id = request.session_id.clone();
        let mode_id = request.mode_id.clone();
        let params = serde_json::to_value(&request)?;
        let result = self.transport.request_default(SESSION_SET_MODE_METHOD_NAME, params).await?;
        let response: SetSessionModeResponse = serde_json::from_value(result)?;
        self.registry.borrow_mut().with_session_mut(&session_id, |session| {
            if let Some(modes) = &mut session.modes {
                modes.current_mode_id = mode_id;
            }
        });
        Ok(response)
    }

    pub async fn set_session_model(&self, request: SetSessionModelRequest) -> Result<SetSessionModelResponse, Error> {
        let session_id = request.session_id.clone();
        let model_id = request.model_id.clone();
        let params = serde_json::to_value(&request)?;
        let result = self.transport.request_default(SESSION_SET_MODEL_METHOD_NAME, params).await?;
        let response: SetSessionModelResponse = serde_json::from_value(result)?;
        self.registry.borrow_mut().with_session_mut(&session_id, |session| {
            if let Some(models) = &mut session.models {
                models.current_model_id = model_id;
            }
        });
        Ok(response)
    }

    pub async fn set_session_config_option(
        &self,
        request: SetSessionConfigOptionRequest,
    ) -> Result<SetSessionConfigOptionResponse, Error> {
        let session_id = request.session_id.clone();
        let name = request.name.clone();
        let value = request.value.clone();
        let params = serde_json::to_value(&request)?;
        let result = self
            .transport
            .request_default(SESSION_SET_CONFIG_OPTION_METHOD_NAME, params)
            .await?;
        let response: SetSessionConfigOptionResponse = serde_json::from_value(result)?;
        self.registry.borrow_mut().with_session_mut(&session_id, |session| {
            if let Some(option) = session.config_options.iter_mut().find(|o| o.name == name) {
                option.value = value;
            } else {
                session.config_options.push(ConfigOption {
                    name,
                    description: None,
                    value,
                });
            }
        });
        Ok(response)
    }

    /// Removes `id` from the registry, clearing `active_session_id` iff it
    /// referenced `id`. Purely local bookkeeping; the agent is not told.
    pub fn remove_session(&self, id: &SessionId) {
        self.registry.borrow_mut().remove(id);
    }
}
