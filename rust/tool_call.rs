use std::{path::PathBuf, sync::Arc};

use derive_more::{Display, From};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::ContentBlock;

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct ToolCall {
    #[serde(rename = "toolCallId")]
    pub id: ToolCallId,
    pub title: String,
    pub kind: ToolKind,
    pub status: ToolCallStatus,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub content: Vec<ToolCallContent>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub locations: Vec<ToolCallLocation>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub raw_input: Option<serde_json::Value>,
    #[serde(rename = "_meta", default, skip_serializing_if = "Option::is_none")]
    pub meta: Option<serde_json::Value>,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct ToolCallUpdate {
    #[serde(rename = "toolCallId")]
    pub id: ToolCallId,
    #[serde(flatten)]
    pub fields: ToolCallUpdateFields,
}

#[derive(Default, Debug, Clone, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct ToolCallUpdateFields {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub kind: Option<ToolKind>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<ToolCallStatus>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content: Option<Vec<ToolCallContent>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub locations: Option<Vec<ToolCallLocation>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub raw_input: Option<serde_json::Value>,
    #[serde(rename = "_meta", default, skip_serializing_if = "Option::is_none")]
    pub meta: Option<serde_json::Value>,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, PartialEq, Eq, Hash, Display, From)]
#[serde(transparent)]
#[from(Arc<str>, String, &'static str)]
pub struct ToolCallId(pub Arc<str>);

#[derive(Debug, Clone, Copy, Serialize, Deserialize, JsonSchema, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum ToolKind {
    Read,
    Edit,
    Delete,
    Move,
    Search,
    Execute,
    Think,
    Fetch,
    Other,
}

#[derive(Clone, Copy, Debug, Serialize, Deserialize, JsonSchema, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ToolCallStatus {
    /// The tool call has been reported but hasn't started running yet.
    Pending,
    /// The tool call is blocked on a `session/request_permission` decision.
    PendingPermission,
    /// The tool call is currently running
    InProgress,
    /// The tool call completed successfully
    Completed,
    /// The tool call failed
    Failed,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ToolCallContent {
    Content {
        content: ContentBlock,
    },
    Diff {
        #[serde(flatten)]
        diff: Diff,
    },
}

impl<T: Into<ContentBlock>> From<T> for ToolCallContent {
    fn from(content: T) -> Self {
        ToolCallContent::Content {
            content: content.into(),
        }
    }
}

impl From<Diff> for ToolCallContent {
    fn from(diff: Diff) -> Self {
        ToolCallContent::Diff { diff }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct Diff {
    pub path: PathBuf,
    pub old_text: Option<String>,
    pub new_text: String,
}

#[derive(Clone, Debug, Serialize, Deserialize, JsonSchema)]
#[serde(tag = "type", rename_all = "camelCase")]
pub struct ToolCallLocation {
    pub path: PathBuf,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub line: Option<u32>,
}

// Tool-Call Registry

use std::time::Instant;

use crate::client::RequestPermissionRequest;
use crate::events::EventBus;

/// The full record the registry keeps per tool call, a superset of the
/// wire [`ToolCall`]/[`ToolCallUpdate`] shapes: it additionally tracks the
/// in-flight permission request (if any) and registration timestamps,
/// neither of which travel over the wire.
#[derive(Debug, Clone)]
pub struct RegisteredToolCall {
    pub id: ToolCallId,
    pub title: String,
    pub kind: ToolKind,
    pub status: ToolCallStatus,
    pub content: Vec<ToolCallContent>,
    pub locations: Vec<ToolCallLocation>,
    pub raw_input: Option<serde_json::Value>,
    pub raw_output: Option<serde_json::Value>,
    pub permission_request: Option<RequestPermissionRequest>,
    pub registered_at: Instant,
    pub updated_at: Instant,
}

impl RegisteredToolCall {
    fn from_tool_call(tool_call: ToolCall, now: Instant) -> Self {
        Self {
            id: tool_call.id,
            title: tool_call.title,
            kind: tool_call.kind,
            status: tool_call.status,
            content: tool_call.content,
            locations: tool_call.locations,
            raw_input: tool_call.raw_input,
            raw_output: None,
            permission_request: None,
            registered_at: now,
            updated_at: now,
        }
    }

    fn apply(&mut self, fields: ToolCallUpdateFields, now: Instant) {
        if let Some(kind) = fields.kind {
            self.kind = kind;
        }
        if let Some(status) = fields.status {
            self.status = status;
        }
        if let Some(title) = fields.title {
            self.title = title;
        }
        if let Some(content) = fields.content {
            self.content = content;
        }
        if let Some(locations) = fields.locations {
            self.locations = locations;
        }
        if fields.raw_input.is_some() {
            self.raw_input = fields.raw_input;
        }
        self.updated_at = now;
    }
}

/// Events the registry emits. `Registered` fires before `Updated` when an
/// unknown id auto-registers.
#[derive(Debug, Clone)]
pub enum ToolCallEvent {
    Registered(RegisteredToolCall),
    Updated(RegisteredToolCall),
    Completed(RegisteredToolCall),
    Failed(RegisteredToolCall),
    PermissionPending(RegisteredToolCall),
}

/// Tracks every tool call within a session. Owned by the Prompt
/// Handler, which feeds it `tool_call`/`tool_call_update` notifications
/// pulled off the Update Router's dispatch, and by the Permission Engine
/// (borrowed, never owned — see [`crate::permission::PermissionEngine`]).
pub struct ToolCallRegistry {
    calls: std::cell::RefCell<std::collections::HashMap<ToolCallId, RegisteredToolCall>>,
    events: EventBus<ToolCallEvent>,
}

impl ToolCallRegistry {
    pub fn new() -> Self {
        Self {
            calls: std::cell::RefCell::new(std::collections::HashMap::new()),
            events: EventBus::new(),
        }
    }

    pub fn events(&self) -> &EventBus<ToolCallEvent> {
        &self.events
    }

    /// Inserts a newly announced tool call with `status` defaulting to
    /// whatever the agent sent (ordinarily `pending`), stamping
    /// `registered_at == updated_at == now`.
    pub fn register(&self, tool_call: ToolCall) {
        let now = Instant::now();
        let record = RegisteredToolCall::from_tool_call(tool_call, now);
        self.calls.borrow_mut().insert(record.id.clone(), record.clone());
        self.events.emit(&ToolCallEvent::Registered(record));
    }

    /// Merges a partial update. Unknown ids auto-register first (emitting
    /// `Registered`) before the merge is applied and `Updated` fires.
    pub fn update(&self, update: ToolCallUpdate) {
        let now = Instant::now();
        let already_present = self.calls.borrow().contains_key(&update.id);
        if !already_present {
            let placeholder = ToolCall {
                id: update.id.clone(),
                title: update.fields.title.clone().unwrap_or_default(),
                kind: update.fields.kind.clone().unwrap_or(ToolKind::Other),
                status: update.fields.status.clone().unwrap_or(ToolCallStatus::Pending),
                content: Vec::new(),
                locations: Vec::new(),
                raw_input: None,
                meta: None,
            };
            let record = RegisteredToolCall::from_tool_call(placeholder, now);
            self.calls.borrow_mut().insert(record.id.clone(), record.clone());
            self.events.emit(&ToolCallEvent::Registered(record));
        }

        let (previous_status, updated) = {
            let mut calls = self.calls.borrow_mut();
            let record = calls.get_mut(&update.id).expect("just ensured presence");
            let previous_status = record.status;
            record.apply(update.fields, now);
            (previous_status, record.clone())
        };
        self.events.emit(&ToolCallEvent::Updated(updated.clone()));
        // Only fire completed/failed on the transition into that status, not on a
        // later no-op update that leaves an already-terminal tool call terminal.
        match updated.status {
            ToolCallStatus::Completed if previous_status != ToolCallStatus::Completed => {
                self.events.emit(&ToolCallEvent::Completed(updated))
            }
            ToolCallStatus::Failed if previous_status != ToolCallStatus::Failed => {
                self.events.emit(&ToolCallEvent::Failed(updated))
            }
            _ => {}
        }
    }

    /// Marks `req.tool_call.id` as blocked on a permission decision.
    /// Unknown ids are a silent no-op.
    pub fn set_permission_pending(&self, req: &RequestPermissionRequest) {
        let now = Instant::now();
        let mut calls = self.calls.borrow_mut();
        if let Some(record) = calls.get_mut(&req.tool_call.id) {
            record.status = ToolCallStatus::PendingPermission;
            record.permission_request = Some(req.clone());
            record.updated_at = now;
            let snapshot = record.clone();
            drop(calls);
            self.events.emit(&ToolCallEvent::PermissionPending(snapshot));
        }
    }

    /// Clears the stored permission request without changing `status`;
    /// the next `tool_call_update` is what moves status forward.
    pub fn clear_permission(&self, id: &ToolCallId) {
        if let Some(record) = self.calls.borrow_mut().get_mut(id) {
            record.permission_request = None;
        }
    }

    pub fn get_call(&self, id: &ToolCallId) -> Option<RegisteredToolCall> {
        self.calls.borrow().get(id).cloned()
    }

    pub fn get_all_calls(&self) -> Vec<RegisteredToolCall> {
        self.calls.borrow().values().cloned().collect()
    }

    pub fn get_active_calls(&self) -> Vec<RegisteredToolCall> {
        self.calls
            .borrow()
            .values()
            .filter(|c| !matches!(c.status, ToolCallStatus::Completed | ToolCallStatus::Failed))
            .cloned()
            .collect()
    }

    pub fn get_pending_permissions(&self) -> Vec<RegisteredToolCall> {
        self.calls
            .borrow()
            .values()
            .filter(|c| c.permission_request.is_some())
            .cloned()
            .collect()
    }
}

impl Default for ToolCallRegistry {
    fn default() -> Self {
        Self::new()
    }
}
