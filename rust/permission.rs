//! Subsystem G: the policy store plus the `session/request_permission`
//! arbitration protocol.

use std::{
    cell::RefCell,
    collections::HashMap,
    rc::{Rc, Weak},
};

use futures::channel::oneshot;

use crate::client::{
    PermissionOption, PermissionOptionId, PermissionOptionKind, RequestPermissionOutcome,
    RequestPermissionRequest,
};
use crate::events::EventBus;
use crate::tool_call::{ToolCallId, ToolCallRegistry, ToolKind};

/// A remembered decision to always allow or reject tool calls of a given
/// kind. Session-scoped; there is no persistence across sessions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PolicyAction {
    Allow,
    Reject,
}

/// Surfaced to `permission:request` listeners when no stored policy
/// auto-resolves a request. The listener (typically UI code presenting
/// the options to a human) calls exactly one of `resolve`/`cancel`;
/// `handle_request` blocks on whichever fires first.
pub struct PendingPermission {
    pub tool_call_id: ToolCallId,
    pub tool_kind: ToolKind,
    pub options: Vec<PermissionOption>,
    resolve_tx: RefCell<Option<oneshot::Sender<Decision>>>,
}

enum Decision {
    Resolved(PermissionOptionId),
    Cancelled,
}

impl PendingPermission {
    pub fn resolve(&self, option_id: PermissionOptionId) {
        if let Some(tx) = self.resolve_tx.borrow_mut().take() {
            tx.send(Decision::Resolved(option_id)).ok();
        }
    }

    pub fn cancel(&self) {
        if let Some(tx) = self.resolve_tx.borrow_mut().take() {
            tx.send(Decision::Cancelled).ok();
        }
    }
}

impl std::fmt::Debug for PendingPermission {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PendingPermission")
            .field("tool_call_id", &self.tool_call_id)
            .field("tool_kind", &self.tool_kind)
            .field("options", &self.options)
            .finish_non_exhaustive()
    }
}

#[derive(Debug, Clone)]
pub enum PermissionEvent {
    /// No stored policy matched; a human decision is needed. `pending` is
    /// the listener's only handle onto `resolve`/`cancel` — drop it and
    /// the request hangs until the prompt turn itself is cancelled.
    Request {
        tool_call_id: ToolCallId,
        tool_kind: ToolKind,
        pending: Rc<PendingPermission>,
    },
    AutoResponded {
        tool_call_id: ToolCallId,
        option_id: PermissionOptionId,
    },
    Responded {
        tool_call_id: ToolCallId,
        outcome: RequestPermissionOutcome,
    },
}

/// Policy store (tool-kind → allow/reject) plus request arbitration.
/// Optionally holds a weak reference to a [`ToolCallRegistry`] —
/// "borrows... weak reference: never keeps it alive, never mutates
/// lifecycle".
pub struct PermissionEngine {
    policies: RefCell<HashMap<ToolKind, PolicyAction>>,
    registry: Option<Weak<ToolCallRegistry>>,
    events: EventBus<PermissionEvent>,
}

impl PermissionEngine {
    pub fn new() -> Self {
        Self {
            policies: RefCell::new(HashMap::new()),
            registry: None,
            events: EventBus::new(),
        }
    }

    pub fn with_registry(registry: Weak<ToolCallRegistry>) -> Self {
        Self {
            policies: RefCell::new(HashMap::new()),
            registry: Some(registry),
            events: EventBus::new(),
        }
    }

    pub fn events(&self) -> &EventBus<PermissionEvent> {
        &self.events
    }

    pub fn policy_store_len(&self) -> usize {
        self.policies.borrow().len()
    }

    fn registry(&self) -> Option<std::rc::Rc<ToolCallRegistry>> {
        self.registry.as_ref().and_then(Weak::upgrade)
    }

    /// Implements the five-step decision protocol. When a
    /// stored policy resolves the request, returns immediately without
    /// suspending. Otherwise emits `PermissionEvent::Request` (carrying a
    /// [`PendingPermission`] a caller can stash for later) and suspends
    /// until that pending permission's `resolve` or `cancel` is invoked.
    pub async fn handle_request(
        &self,
        req: RequestPermissionRequest,
    ) -> RequestPermissionOutcome {
        if let Some(registry) = self.registry() {
            registry.set_permission_pending(&req);
        }

        let tool_kind = req.tool_call.fields.kind.clone().unwrap_or(ToolKind::Other);
        let policy = self.policies.borrow().get(&tool_kind).copied();
        if let Some(action) = policy {
            let wanted_kind = match action {
                PolicyAction::Allow => PermissionOptionKind::AllowOnce,
                PolicyAction::Reject => PermissionOptionKind::RejectOnce,
            };
            if let Some(option) = req.options.iter().find(|o| o.kind == wanted_kind) {
                let option_id = option.id.clone();
                self.events.emit(&PermissionEvent::AutoResponded {
                    tool_call_id: req.tool_call.id.clone(),
                    option_id: option_id.clone(),
                });
                return self.finish(req.tool_call.id, RequestPermissionOutcome::Selected { option_id });
            }
        }

        let (tx, rx) = oneshot::channel();
        let pending = Rc::new(PendingPermission {
            tool_call_id: req.tool_call.id.clone(),
            tool_kind,
            options: req.options.clone(),
            resolve_tx: RefCell::new(Some(tx)),
        });
        self.events.emit(&PermissionEvent::Request {
            tool_call_id: req.tool_call.id.clone(),
            tool_kind: pending.tool_kind.clone(),
            pending: pending.clone(),
        });
        // A caller that doesn't stash `pending` from a `Request` listener
        // will wait here forever; that mirrors the source's "block on
        // whichever callback is invoked first" with no built-in fallback.
        let decision = rx.await.unwrap_or(Decision::Cancelled);

        match decision {
            Decision::Resolved(option_id) => {
                match pending.options.iter().find(|o| o.id == option_id) {
                    Some(option) => match option.kind {
                        PermissionOptionKind::AllowAlways => {
                            self.policies.borrow_mut().insert(pending.tool_kind.clone(), PolicyAction::Allow);
                        }
                        PermissionOptionKind::RejectAlways => {
                            self.policies.borrow_mut().insert(pending.tool_kind.clone(), PolicyAction::Reject);
                        }
                        _ => {}
                    },
                    None => log::warn!(
                        "resolve() called with option id {option_id} not present among the offered options; no policy recorded"
                    ),
                }
                self.finish(req.tool_call.id, RequestPermissionOutcome::Selected { option_id })
            }
            Decision::Cancelled => self.finish(req.tool_call.id, RequestPermissionOutcome::Cancelled),
        }
    }

    fn finish(&self, tool_call_id: ToolCallId, outcome: RequestPermissionOutcome) -> RequestPermissionOutcome {
        self.events.emit(&PermissionEvent::Responded {
            tool_call_id: tool_call_id.clone(),
            outcome: outcome.clone(),
        });
        if let Some(registry) = self.registry() {
            registry.clear_permission(&tool_call_id);
        }
        outcome
    }
}

impl Default for PermissionEngine {
    fn default() -> Self {
        Self::new()
    }
}
