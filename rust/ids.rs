//! Core wire identifiers shared by every subsystem: the session id and the
//! protocol version number negotiated at `initialize`.

use std::sync::Arc;

use derive_more::{Display, From};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Unique identifier for a session, scoped to the lifetime of a single
/// Transport connection (a new subprocess means new ids, even for a
/// resumed session — see [`crate::agent::ResumeSessionRequest`]).
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, PartialEq, Eq, Hash, Display, From)]
#[serde(transparent)]
#[from(Arc<str>, String, &'static str)]
pub struct SessionId(pub Arc<str>);

/// The ACP protocol version number exchanged during `initialize`.
///
/// Versions are plain integers, not semver: any mismatch between what the
/// client requests and what the agent supports is a hard negotiation
/// failure (see [`crate::Error::version_mismatch`]), not a
/// feature-negotiation signal.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, JsonSchema, PartialEq, Eq, PartialOrd, Ord)]
#[serde(transparent)]
pub struct ProtocolVersion(pub i64);

/// The only protocol version this core speaks.
pub const V1: ProtocolVersion = ProtocolVersion(1);

impl std::fmt::Display for ProtocolVersion {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl Default for ProtocolVersion {
    fn default() -> Self {
        V1
    }
}
