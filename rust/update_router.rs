//! Subsystem E: discriminated dispatch of the 11 `sessionUpdate` kinds
//! into accumulated turn state plus a typed event per notification.

use crate::{
    AvailableCommand, ConfigOption, ContentBlock, Plan, SessionModeId, SessionUpdate, ToolCall,
    ToolCallUpdate, Usage,
};
use crate::events::EventBus;

/// An ordered sequence of content blocks for one turn. Only text blocks
/// contribute to `full_text`; every block (text or otherwise) is kept
/// verbatim in arrival order.
#[derive(Debug, Default, Clone)]
pub struct MessageAccumulator {
    blocks: Vec<ContentBlock>,
}

impl MessageAccumulator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, block: ContentBlock) {
        self.blocks.push(block);
    }

    pub fn blocks(&self) -> &[ContentBlock] {
        &self.blocks
    }

    pub fn len(&self) -> usize {
        self.blocks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.blocks.is_empty()
    }

    pub fn reset(&mut self) {
        self.blocks.clear();
    }

    /// Concatenation of every text-kind block's text, in insertion order,
    /// with no separators.
    pub fn full_text(&self) -> String {
        let mut text = String::new();
        for block in &self.blocks {
            if let ContentBlock::Text(text_content) = block {
                text.push_str(&text_content.text);
            }
        }
        text
    }
}

/// One event per dispatched `session/update` notification, per its
/// table. The Update Router emits exactly one of these per call to
/// `dispatch`.
#[derive(Debug, Clone)]
pub enum RouterEvent {
    MessageChunk(ContentBlock),
    UserChunk(ContentBlock),
    ThoughtChunk(ContentBlock),
    ToolCall(ToolCall),
    ToolCallUpdate(ToolCallUpdate),
    PlanUpdate(Plan),
    CommandsUpdate(Vec<AvailableCommand>),
    ModeUpdate(SessionModeId),
    ConfigUpdate(ConfigOption),
    SessionInfo {
        title: Option<String>,
        updated_at: String,
    },
    UsageUpdate(Usage),
    /// A `sessionUpdate` tag this core doesn't recognize. Forward
    /// compatibility: logged, never a hard error.
    Unknown,
}

/// Holds the three per-turn message accumulators plus the last-writer-wins
/// slots (plan, commands, mode, config options, usage) and fans out a
/// [`RouterEvent`] per dispatched notification.
pub struct UpdateRouter {
    pub agent_messages: MessageAccumulator,
    pub agent_thoughts: MessageAccumulator,
    pub user_messages: MessageAccumulator,
    current_plan: Option<Plan>,
    current_commands: Vec<AvailableCommand>,
    current_mode_id: Option<SessionModeId>,
    current_config_options: Vec<ConfigOption>,
    current_usage: Option<Usage>,
    events: EventBus<RouterEvent>,
}

impl UpdateRouter {
    pub fn new() -> Self {
        Self {
            agent_messages: MessageAccumulator::new(),
            agent_thoughts: MessageAccumulator::new(),
            user_messages: MessageAccumulator::new(),
            current_plan: None,
            current_commands: Vec::new(),
            current_mode_id: None,
            current_config_options: Vec::new(),
            current_usage: None,
            events: EventBus::new(),
        }
    }

    pub fn events(&self) -> &EventBus<RouterEvent> {
        &self.events
    }

    /// Clears only the three message accumulators. Called at the start of
    /// every new prompt turn; plan/commands/mode/config/usage persist
    /// across turns since they describe session state, not turn state.
    pub fn reset_for_new_turn(&mut self) {
        self.agent_messages.reset();
        self.agent_thoughts.reset();
        self.user_messages.reset();
    }

    pub fn current_plan(&self) -> Option<&Plan> {
        self.current_plan.as_ref()
    }

    pub fn current_commands(&self) -> &[AvailableCommand] {
        &self.current_commands
    }

    pub fn current_mode_id(&self) -> Option<&SessionModeId> {
        self.current_mode_id.as_ref()
    }

    pub fn current_config_options(&self) -> &[ConfigOption] {
        &self.current_config_options
    }

    pub fn current_usage(&self) -> Option<&Usage> {
        self.current_usage.as_ref()
    }

    /// Mutates accumulated state (where applicable) and emits exactly one
    /// [`RouterEvent`] for `update`. `tool_call`/`tool_call_update` are
    /// passed through without touching router state: the Tool-Call
    /// Registry is mutated separately by the caller ("— (registry
    /// handles separately)").
    pub fn dispatch(&mut self, update: SessionUpdate) -> RouterEvent {
        let event = match update {
            SessionUpdate::AgentMessageChunk { content } => {
                self.agent_messages.push(content.clone());
                RouterEvent::MessageChunk(content)
            }
            SessionUpdate::UserMessageChunk { content } => {
                self.user_messages.push(content.clone());
                RouterEvent::UserChunk(content)
            }
            SessionUpdate::AgentThoughtChunk { content } => {
                self.agent_thoughts.push(content.clone());
                RouterEvent::ThoughtChunk(content)
            }
            SessionUpdate::ToolCall(tool_call) => RouterEvent::ToolCall(tool_call),
            SessionUpdate::ToolCallUpdate(update) => RouterEvent::ToolCallUpdate(update),
            SessionUpdate::Plan(plan) => {
                self.current_plan = Some(plan.clone());
                RouterEvent::PlanUpdate(plan)
            }
            SessionUpdate::AvailableCommandsUpdate { available_commands } => {
                self.current_commands = available_commands.clone();
                RouterEvent::CommandsUpdate(available_commands)
            }
            SessionUpdate::CurrentModeUpdate { current_mode_id } => {
                self.current_mode_id = Some(current_mode_id.clone());
                RouterEvent::ModeUpdate(current_mode_id)
            }
            SessionUpdate::ConfigOptionUpdate { config_option } => {
                if let Some(existing) = self
                    .current_config_options
                    .iter_mut()
                    .find(|o| o.name == config_option.name)
                {
                    *existing = config_option.clone();
                } else {
                    self.current_config_options.push(config_option.clone());
                }
                RouterEvent::ConfigUpdate(config_option)
            }
            SessionUpdate::SessionInfoUpdate { title, updated_at } => RouterEvent::SessionInfo {
                title,
                updated_at,
            },
            SessionUpdate::UsageUpdate { usage } => {
                self.current_usage = Some(usage.clone());
                RouterEvent::UsageUpdate(usage)
            }
            SessionUpdate::Unknown => {
                log::warn!("ignoring unrecognized sessionUpdate tag");
                RouterEvent::Unknown
            }
        };
        self.events.emit(&event);
        event
    }
}

impl Default for UpdateRouter {
    fn default() -> Self {
        Self::new()
    }
}
