//! A simple ACP client for educational purposes.
//!
//! The client starts an agent as a subprocess and communicates with it over stdio. Run the client like this:
//!
//! ```bash
//! cargo run --example client -- path/to/agent --agent-arg
//! ```

use std::rc::Rc;

use acp_client_core as acp;
use anyhow::bail;

struct ExampleClient {}

impl acp::Client for ExampleClient {
    async fn request_permission(
        &self,
        args: acp::RequestPermissionRequest,
    ) -> Result<acp::RequestPermissionResponse, acp::Error> {
        // No interactive prompt in this example: always grant the first
        // "allow" option offered, matching neither a real editor nor a
        // headless CI client but good enough to watch an agent run.
        let option = args
            .options
            .iter()
            .find(|o| {
                matches!(
                    o.kind,
                    acp::PermissionOptionKind::AllowOnce | acp::PermissionOptionKind::AllowAlways
                )
            })
            .or_else(|| args.options.first())
            .ok_or_else(acp::Error::method_not_found)?;
        Ok(acp::RequestPermissionResponse {
            outcome: acp::RequestPermissionOutcome::Selected { option_id: option.id.clone() },
            meta: None,
        })
    }

    async fn write_text_file(
        &self,
        _args: acp::WriteTextFileRequest,
    ) -> Result<acp::WriteTextFileResponse, acp::Error> {
        Err(acp::Error::method_not_found())
    }

    async fn read_text_file(
        &self,
        _args: acp::ReadTextFileRequest,
    ) -> Result<acp::ReadTextFileResponse, acp::Error> {
        Err(acp::Error::method_not_found())
    }

    async fn create_terminal(
        &self,
        _args: acp::CreateTerminalRequest,
    ) -> Result<acp::CreateTerminalResponse, acp::Error> {
        Err(acp::Error::method_not_found())
    }

    async fn terminal_output(
        &self,
        _args: acp::TerminalOutputRequest,
    ) -> Result<acp::TerminalOutputResponse, acp::Error> {
        Err(acp::Error::method_not_found())
    }

    async fn release_terminal(
        &self,
        _args: acp::ReleaseTerminalRequest,
    ) -> Result<acp::ReleaseTerminalResponse, acp::Error> {
        Err(acp::Error::method_not_found())
    }

    async fn wait_for_terminal_exit(
        &self,
        _args: acp::WaitForTerminalExitRequest,
    ) -> Result<acp::WaitForTerminalExitResponse, acp::Error> {
        Err(acp::Error::method_not_found())
    }

    async fn kill_terminal_command(
        &self,
        _args: acp::KillTerminalCommandRequest,
    ) -> Result<acp::KillTerminalCommandResponse, acp::Error> {
        Err(acp::Error::method_not_found())
    }

    async fn ext_method(&self, _args: acp::ExtMethodRequest) -> Result<acp::ExtMethodResponse, acp::Error> {
        Err(acp::Error::method_not_found())
    }

    async fn ext_notification(&self, _args: acp::ExtNotification) -> Result<(), acp::Error> {
        Err(acp::Error::method_not_found())
    }

    async fn session_notification(&self, args: acp::SessionNotification) -> Result<(), acp::Error> {
        match args.update {
            acp::SessionUpdate::AgentMessageChunk { content } => {
                print!("{}", content_text(&content));
            }
            acp::SessionUpdate::AgentThoughtChunk { content } => {
                print!("(thinking) {}", content_text(&content));
            }
            acp::SessionUpdate::ToolCall(call) => {
                println!("\n| tool call: {} [{:?}]", call.title, call.status);
            }
            acp::SessionUpdate::ToolCallUpdate(update) => {
                if let Some(status) = update.fields.status {
                    println!("\n| tool call {} -> {status:?}", update.id);
                }
            }
            acp::SessionUpdate::UserMessageChunk { .. }
            | acp::SessionUpdate::Plan(_)
            | acp::SessionUpdate::AvailableCommandsUpdate { .. }
            | acp::SessionUpdate::CurrentModeUpdate { .. }
            | acp::SessionUpdate::ConfigOptionUpdate { .. }
            | acp::SessionUpdate::SessionInfoUpdate { .. }
            | acp::SessionUpdate::UsageUpdate { .. }
            | acp::SessionUpdate::Unknown => {}
        }
        Ok(())
    }
}

fn content_text(content: &acp::ContentBlock) -> String {
    match content {
        acp::ContentBlock::Text(text_content) => text_content.text.clone(),
        acp::ContentBlock::Image(_) => "<image>".into(),
        acp::ContentBlock::Audio(_) => "<audio>".into(),
        acp::ContentBlock::ResourceLink(resource_link) => resource_link.uri.clone(),
        acp::ContentBlock::Resource(_) => "<resource>".into(),
    }
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> anyhow::Result<()> {
    env_logger::init();

    let command = std::env::args().collect::<Vec<_>>();
    let (program, args) = match command.as_slice() {
        [_, program, args @ ..] => (program.clone(), args.to_vec()),
        _ => bail!("Usage: client AGENT_PROGRAM AGENT_ARG..."),
    };

    // connect/SessionManager/PromptHandler all spawn futures onto our Tokio
    // runtime. LocalSet and spawn_local are used because none of this
    // crate's futures are Send.
    let local_set = tokio::task::LocalSet::new();
    local_set
        .run_until(async move {
            let mut command = acp::AgentCommand::new(program);
            command = command.args(args);

            let client = Rc::new(ExampleClient {});
            let (connection, mut events) = acp::connect(
                command,
                client,
                acp::ClientCapabilities::default(),
                None,
                true,
                |fut| {
                    tokio::task::spawn_local(fut);
                },
            )
            .await?;

            tokio::task::spawn_local(async move {
                while let Some(event) = futures::StreamExt::next(&mut events).await {
                    if let acp::TransportEvent::Stderr(line) = event {
                        log::debug!("agent stderr: {line}");
                    }
                }
            });

            let transport = connection.transport.clone();
            let sessions = acp::SessionManager::new(transport.clone(), connection.agent);
            let response = sessions
                .new_session(acp::NewSessionRequest {
                    mcp_servers: Vec::new(),
                    cwd: std::env::current_dir()?,
                    meta: None,
                })
                .await?;

            let prompts = acp::PromptHandler::new(&transport);
            let mut rl = rustyline::DefaultEditor::new()?;
            while let Ok(line) = rl.readline("> ") {
                let result = prompts
                    .send_prompt(
                        response.session_id.clone(),
                        vec![acp::ContentBlock::Text(acp::TextContent { annotations: None, text: line })],
                    )
                    .await;
                if let Err(e) = result {
                    log::error!("{e}");
                }
                println!();
            }

            Ok(())
        })
        .await
}
