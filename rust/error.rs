use std::{fmt::Display, ops::Deref as _};

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct Error {
    pub code: i32,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<serde_json::Value>,
}

impl Error {
    pub fn new(code: impl Into<(i32, String)>) -> Self {
        let (code, message) = code.into();
        Error {
            code,
            message,
            data: None,
        }
    }

    pub fn with_data(mut self, data: impl Into<serde_json::Value>) -> Self {
        self.data = Some(data.into());
        self
    }

    /// Invalid JSON was received by the server. An error occurred on the server while parsing the JSON text.
    pub fn parse_error() -> Self {
        Error::new(ErrorCode::PARSE_ERROR)
    }

    /// The JSON sent is not a valid Request object.
    pub fn invalid_request() -> Self {
        Error::new(ErrorCode::INVALID_REQUEST)
    }

    /// The method does not exist / is not available.
    pub fn method_not_found() -> Self {
        Error::new(ErrorCode::METHOD_NOT_FOUND)
    }

    /// Invalid method parameter(s).
    pub fn invalid_params() -> Self {
        Error::new(ErrorCode::INVALID_PARAMS)
    }

    /// Internal JSON-RPC error.
    pub fn internal_error() -> Self {
        Error::new(ErrorCode::INTERNAL_ERROR)
    }

    /// Authentication required.
    pub fn auth_required() -> Self {
        Error::new(ErrorCode::AUTH_REQUIRED)
    }

    pub fn into_internal_error(err: impl std::error::Error) -> Self {
        Error::internal_error().with_data(err.to_string())
    }

    /// True iff this error's code is the distinguished AUTH_REQUIRED code.
    pub fn is_auth_required(&self) -> bool {
        self.code == ErrorCode::AUTH_REQUIRED.code
    }

    /// True iff this error's code is the distinguished METHOD_NOT_FOUND code.
    pub fn is_method_not_found(&self) -> bool {
        self.code == ErrorCode::METHOD_NOT_FOUND.code
    }

    /// The transport was used before `spawn` or after `close`/`kill`.
    pub fn not_connected() -> Self {
        Error::new(ErrorCode::NOT_CONNECTED)
    }

    /// `spawn` was called on a transport that already owns a subprocess.
    pub fn already_spawned() -> Self {
        Error::new(ErrorCode::ALREADY_SPAWNED)
    }

    /// A request's deadline elapsed before a response arrived.
    pub fn timeout() -> Self {
        Error::new(ErrorCode::TIMEOUT)
    }

    /// The transport closed (or the subprocess exited) while a request was outstanding.
    pub fn transport_closed() -> Self {
        Error::new(ErrorCode::TRANSPORT_CLOSED)
    }

    /// `initialize` received a `protocolVersion` that does not match ours.
    pub fn version_mismatch(requested: i64, agent: i64) -> Self {
        Error::new(ErrorCode::VERSION_MISMATCH)
            .with_data(serde_json::json!({ "requestedVersion": requested, "agentVersion": agent }))
    }

    /// Authentication with the selected method failed.
    pub fn authentication_failed(method: impl Display) -> Self {
        Error::new(ErrorCode::AUTHENTICATION_FAILED).with_data(serde_json::json!({
            "method": method.to_string(),
        }))
    }

    /// The agent did not advertise the capability a call required.
    pub fn capability_not_supported(capability: impl Into<String>) -> Self {
        Error::new(ErrorCode::CAPABILITY_NOT_SUPPORTED)
            .with_data(serde_json::json!({ "capability": capability.into() }))
    }

    /// No session with the given id is present in the registry.
    pub fn session_not_found(session_id: impl Display) -> Self {
        Error::new(ErrorCode::SESSION_NOT_FOUND)
            .with_data(serde_json::json!({ "sessionId": session_id.to_string() }))
    }

    /// `sendPrompt` was called while a previous prompt on the same handler was still in flight.
    pub fn prompt_already_in_progress() -> Self {
        Error::new(ErrorCode::PROMPT_ALREADY_IN_PROGRESS)
    }

    /// No terminal with the given id is present in the registry.
    pub fn terminal_not_found(terminal_id: impl Display) -> Self {
        Error::new(ErrorCode::TERMINAL_NOT_FOUND)
            .with_data(serde_json::json!({ "terminalId": terminal_id.to_string() }))
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct ErrorCode {
    pub code: i32,
    pub message: &'static str,
}

impl ErrorCode {
    pub const PARSE_ERROR: ErrorCode = ErrorCode {
        code: -32700,
        message: "Parse error",
    };

    pub const INVALID_REQUEST: ErrorCode = ErrorCode {
        code: -32600,
        message: "Invalid Request",
    };

    pub const METHOD_NOT_FOUND: ErrorCode = ErrorCode {
        code: -32601,
        message: "Method not found",
    };

    pub const INVALID_PARAMS: ErrorCode = ErrorCode {
        code: -32602,
        message: "Invalid params",
    };

    pub const INTERNAL_ERROR: ErrorCode = ErrorCode {
        code: -32603,
        message: "Internal error",
    };

    pub const AUTH_REQUIRED: ErrorCode = ErrorCode {
        code: -32000,
        message: "Authentication required",
    };

    // Codes below are specific to this core and are not part of the wire
    // protocol's reserved JSON-RPC range; they are only ever constructed
    // locally, never deserialized off the wire.
    pub const NOT_CONNECTED: ErrorCode = ErrorCode {
        code: -32001,
        message: "Transport is not connected",
    };

    pub const ALREADY_SPAWNED: ErrorCode = ErrorCode {
        code: -32002,
        message: "Transport has already spawned a subprocess",
    };

    pub const TIMEOUT: ErrorCode = ErrorCode {
        code: -32003,
        message: "Request timed out",
    };

    pub const TRANSPORT_CLOSED: ErrorCode = ErrorCode {
        code: -32004,
        message: "Transport closed while the request was outstanding",
    };

    pub const VERSION_MISMATCH: ErrorCode = ErrorCode {
        code: -32005,
        message: "Protocol version mismatch",
    };

    pub const AUTHENTICATION_FAILED: ErrorCode = ErrorCode {
        code: -32006,
        message: "Authentication failed",
    };

    pub const CAPABILITY_NOT_SUPPORTED: ErrorCode = ErrorCode {
        code: -32007,
        message: "Capability not supported by the agent",
    };

    pub const SESSION_NOT_FOUND: ErrorCode = ErrorCode {
        code: -32008,
        message: "Session not found",
    };

    pub const PROMPT_ALREADY_IN_PROGRESS: ErrorCode = ErrorCode {
        code: -32009,
        message: "A prompt is already in progress on this handler",
    };

    pub const TERMINAL_NOT_FOUND: ErrorCode = ErrorCode {
        code: -32010,
        message: "Terminal not found",
    };
}

impl From<ErrorCode> for (i32, String) {
    fn from(error_code: ErrorCode) -> Self {
        (error_code.code, error_code.message.to_string())
    }
}

impl From<ErrorCode> for Error {
    fn from(error_code: ErrorCode) -> Self {
        Error::new(error_code)
    }
}

impl std::error::Error for Error {}

impl Display for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.message.is_empty() {
            write!(f, "{}", self.code)?;
        } else {
            write!(f, "{}", self.message)?;
        }

        if let Some(data) = &self.data {
            write!(f, ": {data}")?;
        }

        Ok(())
    }
}

impl From<anyhow::Error> for Error {
    fn from(error: anyhow::Error) -> Self {
        Error::into_internal_error(error.deref())
    }
}

impl From<serde_json::Error> for Error {
    fn from(error: serde_json::Error) -> Self {
        Error::invalid_params().with_data(error.to_string())
    }
}
