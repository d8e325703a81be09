//! Subsystem I: single-turn prompt orchestration with streamed updates and
//! cooperative cancellation.

use std::cell::{Cell, RefCell};

use crate::agent::{PromptRequest, PromptResponse, CancelNotification, SESSION_PROMPT_METHOD_NAME, SESSION_CANCEL_METHOD_NAME};
use crate::client::SessionUpdate;
use crate::error::Error;
use crate::ids::SessionId;
use crate::tool_call::ToolCallRegistry;
use crate::transport::Transport;
use crate::update_router::{RouterEvent, UpdateRouter};
use crate::ContentBlock;

/// Owns the Update Router and Tool-Call Registry for one handler, plus the
/// single in-flight flag that enforces "one prompt at a time per handler"
/// Borrows the Transport it drives rather than owning it.
pub struct PromptHandler<'t> {
    transport: &'t Transport,
    router: RefCell<UpdateRouter>,
    tool_calls: std::rc::Rc<ToolCallRegistry>,
    in_flight: Cell<bool>,
    current_session_id: RefCell<Option<SessionId>>,
}

impl<'t> PromptHandler<'t> {
    pub fn new(transport: &'t Transport) -> Self {
        Self {
            transport,
            router: RefCell::new(UpdateRouter::new()),
            tool_calls: std::rc::Rc::new(ToolCallRegistry::new()),
            in_flight: Cell::new(false),
            current_session_id: RefCell::new(None),
        }
    }

    pub fn router(&self) -> &RefCell<UpdateRouter> {
        &self.router
    }

    pub fn tool_calls(&self) -> &std::rc::Rc<ToolCallRegistry> {
        &self.tool_calls
    }

    pub fn is_in_flight(&self) -> bool {
        self.in_flight.get()
    }

    /// Dispatches one `session/update` notification into the Update
    /// Router, routing `tool_call`/`tool_call_update` into the Tool-Call
    /// Registry as well ("registry handles separately"). Call this
    /// from the connection's notification handler for every
    /// `session/update` that arrives while a prompt is in flight.
    pub fn handle_update(&self, update: SessionUpdate) -> RouterEvent {
        match &update {
            SessionUpdate::ToolCall(tool_call) => self.tool_calls.register(tool_call.clone()),
            SessionUpdate::ToolCallUpdate(tool_call_update) => {
                self.tool_calls.update(tool_call_update.clone())
            }
            _ => {}
        }
        self.router.borrow_mut().dispatch(update)
    }

    /// Runs one prompt turn to completion. Fails with
    /// *already-in-progress* if a previous prompt on this handler hasn't
    /// resolved yet.
    pub async fn send_prompt(
        &self,
        session_id: SessionId,
        prompt: Vec<ContentBlock>,
    ) -> Result<PromptResponse, Error> {
        if self.in_flight.get() {
            return Err(Error::prompt_already_in_progress());
        }
        self.in_flight.set(true);
        *self.current_session_id.borrow_mut() = Some(session_id.clone());
        self.router.borrow_mut().reset_for_new_turn();

        let request = PromptRequest {
            session_id,
            prompt,
            meta: None,
        };
        let params = match serde_json::to_value(&request) {
            Ok(params) => params,
            Err(err) => {
                self.in_flight.set(false);
                return Err(err.into());
            }
        };

        let result = self
            .transport
            .request(SESSION_PROMPT_METHOD_NAME, params, Some(std::time::Duration::ZERO))
            .await;

        self.in_flight.set(false);
        *self.current_session_id.borrow_mut() = None;

        let result = result?;
        Ok(serde_json::from_value(result)?)
    }

    /// Sends `session/cancel`. A no-op from the caller's perspective when
    /// nothing is in flight — the notification is still sent (the agent
    /// tolerates a stray cancel), but no local state changes.
    pub fn cancel_prompt(&self, session_id: SessionId) -> Result<(), Error> {
        let notification = CancelNotification {
            session_id,
            meta: None,
        };
        let params = serde_json::to_value(&notification)?;
        self.transport.notify(SESSION_CANCEL_METHOD_NAME, params)
    }
}
