//! Integration-style tests for the pieces that don't need a real agent
//! subprocess to exercise meaningfully: the wire-level `Connection`, the
//! Update Router's dispatch table, the Tool-Call Registry, the Permission
//! Engine's arbitration protocol, and the client-side Terminal Registry.

use std::rc::Rc;
use std::time::Duration;

use futures::FutureExt as _;
use pretty_assertions::assert_eq;
use serde_json::json;

use super::*;
use crate::connection::Connection;

fn spawn_local(fut: futures::future::LocalBoxFuture<'static, ()>) {
    tokio::task::spawn_local(fut);
}

/// Wires two `Connection`s back to back over an `async_pipe` pair, the way
/// `transport.rs` wires one to a subprocess's stdio. Returns both ends plus
/// their IO driver futures, which the caller must spawn.
fn back_to_back(
    a_requests: crate::connection::RequestHandler,
    a_notifications: crate::connection::NotificationHandler,
    b_requests: crate::connection::RequestHandler,
    b_notifications: crate::connection::NotificationHandler,
) -> (Connection, Connection, impl Future<Output = ()>, impl Future<Output = ()>) {
    let (a_writer, b_reader) = async_pipe::pipe();
    let (b_writer, a_reader) = async_pipe::pipe();

    let (a, a_io) = Connection::new(a_requests, a_notifications, a_writer, a_reader, spawn_local);
    let (b, b_io) = Connection::new(b_requests, b_notifications, b_writer, b_reader, spawn_local);

    let a_io = a_io.map(|_| ());
    let b_io = b_io.map(|_| ());
    (a, b, a_io, b_io)
}

#[tokio::test]
async fn connection_roundtrips_a_request() {
    let local = tokio::task::LocalSet::new();
    local
        .run_until(async {
            let client_requests: crate::connection::RequestHandler =
                Box::new(|_method, _params| async { Err(crate::Error::method_not_found()) }.boxed_local());
            let client_notifications: crate::connection::NotificationHandler = Box::new(|_method, _params| {});

            let agent_requests: crate::connection::RequestHandler = Box::new(|method, params| {
                async move {
                    if &*method == "echo" {
                        Ok(params)
                    } else {
                        Err(crate::Error::method_not_found())
                    }
                }
                .boxed_local()
            });
            let agent_notifications: crate::connection::NotificationHandler = Box::new(|_method, _params| {});

            let (client, _agent, client_io, agent_io) = back_to_back(
                client_requests,
                client_notifications,
                agent_requests,
                agent_notifications,
            );
            tokio::task::spawn_local(client_io);
            tokio::task::spawn_local(agent_io);

            let result = client.request("echo", json!({"hello": "world"})).await.unwrap();
            assert_eq!(result, json!({"hello": "world"}));

            let missing = client.request("nope", json!(null)).await.unwrap_err();
            assert!(missing.is_method_not_found());
        })
        .await;
}

#[tokio::test]
async fn connection_fails_pending_requests_when_the_peer_closes() {
    let local = tokio::task::LocalSet::new();
    local
        .run_until(async {
            // `b_writer`/`b_reader`, the peer's ends of the pipe, are
            // dropped immediately instead of being handed to a second
            // `Connection` — that closes the pipe out from under `a` the
            // same way a crashed agent subprocess would.
            let (a_writer, b_reader) = async_pipe::pipe();
            let (b_writer, a_reader) = async_pipe::pipe();
            drop(b_writer);
            drop(b_reader);

            let (a, a_io) = Connection::new(
                Box::new(|_m, _p| async { Err(crate::Error::method_not_found()) }.boxed_local()),
                Box::new(|_m, _p| {}),
                a_writer,
                a_reader,
                spawn_local,
            );
            tokio::task::spawn_local(a_io.map(|_| ()));

            let pending = a.request("will-hang", json!(null));
            let result = tokio::time::timeout(Duration::from_secs(2), pending).await.unwrap();
            assert!(result.is_err());
        })
        .await;
}

#[test]
fn update_router_dispatches_message_chunks_into_the_accumulator() {
    let mut router = UpdateRouter::new();
    let chunk = crate::ContentBlock::Text(crate::TextContent { annotations: None, text: "hi".into() });
    let event = router.dispatch(crate::SessionUpdate::AgentMessageChunk { content: chunk.clone() });
    assert!(matches!(event, RouterEvent::MessageChunk(_)));
    assert_eq!(router.agent_messages.full_text(), "hi");

    let event = router.dispatch(crate::SessionUpdate::AgentMessageChunk {
        content: crate::ContentBlock::Text(crate::TextContent { annotations: None, text: " there".into() }),
    });
    assert!(matches!(event, RouterEvent::MessageChunk(_)));
    assert_eq!(router.agent_messages.full_text(), "hi there");
}

#[test]
fn update_router_resets_only_message_accumulators_between_turns() {
    let mut router = UpdateRouter::new();
    router.dispatch(crate::SessionUpdate::AgentMessageChunk {
        content: crate::ContentBlock::Text(crate::TextContent { annotations: None, text: "turn one".into() }),
    });
    router.dispatch(crate::SessionUpdate::Plan(crate::Plan { entries: Vec::new(), meta: None }));
    assert!(router.current_plan().is_some());

    router.reset_for_new_turn();
    assert!(router.agent_messages.is_empty());
    assert!(router.current_plan().is_some(), "session-scoped state must survive a turn reset");
}

#[test]
fn update_router_falls_back_to_unknown_for_an_unrecognized_tag() {
    let raw = json!({"sessionUpdate": "something_from_the_future", "payload": 1});
    let update: crate::SessionUpdate = serde_json::from_value(raw).expect("unknown tags must not fail to parse");
    assert!(matches!(update, crate::SessionUpdate::Unknown));

    let mut router = UpdateRouter::new();
    assert!(matches!(router.dispatch(update), RouterEvent::Unknown));
}

#[test]
fn tool_call_registry_auto_registers_updates_for_unknown_ids() {
    let registry = ToolCallRegistry::new();
    let events: Rc<std::cell::RefCell<Vec<ToolCallEvent>>> = Rc::new(std::cell::RefCell::new(Vec::new()));
    let sink = events.clone();
    registry.events().on(move |event| sink.borrow_mut().push(event.clone()));

    registry.update(crate::ToolCallUpdate {
        id: crate::ToolCallId::from("call-1"),
        fields: crate::ToolCallUpdateFields {
            title: Some("run tests".into()),
            status: Some(crate::ToolCallStatus::InProgress),
            ..Default::default()
        },
    });

    let calls = registry.get_all_calls();
    assert_eq!(calls.len(), 1);
    assert_eq!(calls[0].title, "run tests");
    assert_eq!(calls[0].status, crate::ToolCallStatus::InProgress);

    let recorded = events.borrow();
    assert!(matches!(recorded[0], ToolCallEvent::Registered(_)));
    assert!(matches!(recorded[1], ToolCallEvent::Updated(_)));
}

#[test]
fn tool_call_registry_emits_completed_and_failed_on_terminal_status() {
    let registry = ToolCallRegistry::new();
    registry.register(crate::ToolCall {
        id: crate::ToolCallId::from("call-2"),
        title: "edit file".into(),
        kind: crate::ToolKind::Edit,
        status: crate::ToolCallStatus::Pending,
        content: Vec::new(),
        locations: Vec::new(),
        raw_input: None,
        meta: None,
    });

    let events: Rc<std::cell::RefCell<Vec<ToolCallEvent>>> = Rc::new(std::cell::RefCell::new(Vec::new()));
    let sink = events.clone();
    registry.events().on(move |event| sink.borrow_mut().push(event.clone()));

    registry.update(crate::ToolCallUpdate {
        id: crate::ToolCallId::from("call-2"),
        fields: crate::ToolCallUpdateFields { status: Some(crate::ToolCallStatus::Failed), ..Default::default() },
    });

    let recorded = events.borrow();
    assert!(recorded.iter().any(|e| matches!(e, ToolCallEvent::Failed(_))));
    assert!(registry.get_active_calls().is_empty());
}

#[tokio::test]
async fn permission_engine_auto_responds_from_a_remembered_policy() {
    let engine = PermissionEngine::new();
    let allow_once = crate::PermissionOption {
        id: crate::PermissionOptionId::from("allow"),
        name: "Allow".into(),
        kind: crate::PermissionOptionKind::AllowAlways,
    };
    let reject_once = crate::PermissionOption {
        id: crate::PermissionOptionId::from("reject"),
        name: "Reject".into(),
        kind: crate::PermissionOptionKind::RejectOnce,
    };

    let tool_call = crate::ToolCallUpdate {
        id: crate::ToolCallId::from("call-3"),
        fields: crate::ToolCallUpdateFields { kind: Some(crate::ToolKind::Execute), ..Default::default() },
    };
    let request = crate::RequestPermissionRequest {
        session_id: crate::SessionId::from("session-1"),
        tool_call,
        options: vec![allow_once.clone(), reject_once],
        meta: None,
    };

    // First request with no stored policy: resolve it as "allow always" so
    // the policy gets remembered.
    let option_id = allow_once.id.clone();
    let handle = engine.events().on(move |event| {
        if let PermissionEvent::Request { pending, .. } = event {
            pending.resolve(option_id.clone());
        }
    });
    let first = engine.handle_request(request).await;
    engine.events().off(handle);
    assert!(matches!(first, crate::RequestPermissionOutcome::Selected { .. }));
    assert_eq!(engine.policy_store_len(), 1);

    // Second request for the same tool kind auto-resolves without needing
    // a listener at all.
    let second_request = crate::RequestPermissionRequest {
        session_id: crate::SessionId::from("session-1"),
        tool_call: crate::ToolCallUpdate {
            id: crate::ToolCallId::from("call-4"),
            fields: crate::ToolCallUpdateFields { kind: Some(crate::ToolKind::Execute), ..Default::default() },
        },
        options: vec![
            crate::PermissionOption {
                id: crate::PermissionOptionId::from("allow-2"),
                name: "Allow".into(),
                kind: crate::PermissionOptionKind::AllowOnce,
            },
        ],
        meta: None,
    };
    let auto_responded = Rc::new(std::cell::Cell::new(false));
    let flag = auto_responded.clone();
    engine.events().on(move |event| {
        if matches!(event, PermissionEvent::AutoResponded { .. }) {
            flag.set(true);
        }
    });
    let second = engine.handle_request(second_request).await;
    assert!(matches!(second, crate::RequestPermissionOutcome::Selected { .. }));
    assert!(auto_responded.get());
}

#[tokio::test]
async fn permission_engine_cancels_a_pending_request_that_is_never_resolved() {
    let engine = PermissionEngine::new();
    let request = crate::RequestPermissionRequest {
        session_id: crate::SessionId::from("session-2"),
        tool_call: crate::ToolCallUpdate {
            id: crate::ToolCallId::from("call-5"),
            fields: crate::ToolCallUpdateFields { kind: Some(crate::ToolKind::Delete), ..Default::default() },
        },
        options: vec![crate::PermissionOption {
            id: crate::PermissionOptionId::from("allow"),
            name: "Allow".into(),
            kind: crate::PermissionOptionKind::AllowOnce,
        }],
        meta: None,
    };

    let handle = engine.events().on(move |event| {
        if let PermissionEvent::Request { pending, .. } = event {
            pending.cancel();
        }
    });
    let outcome = engine.handle_request(request).await;
    engine.events().off(handle);
    assert!(matches!(outcome, crate::RequestPermissionOutcome::Cancelled));
    assert_eq!(engine.policy_store_len(), 0, "a cancelled decision must not be remembered as a policy");
}

#[tokio::test]
async fn permission_engine_marks_the_registered_tool_call_pending_permission() {
    let registry = Rc::new(ToolCallRegistry::new());
    registry.register(crate::ToolCall {
        id: crate::ToolCallId::from("call-6"),
        title: "delete file".into(),
        kind: crate::ToolKind::Delete,
        status: crate::ToolCallStatus::Pending,
        content: Vec::new(),
        locations: Vec::new(),
        raw_input: None,
        meta: None,
    });

    let engine = PermissionEngine::with_registry(Rc::downgrade(&registry));
    let request = crate::RequestPermissionRequest {
        session_id: crate::SessionId::from("session-3"),
        tool_call: crate::ToolCallUpdate {
            id: crate::ToolCallId::from("call-6"),
            fields: crate::ToolCallUpdateFields::default(),
        },
        options: vec![crate::PermissionOption {
            id: crate::PermissionOptionId::from("allow"),
            name: "Allow".into(),
            kind: crate::PermissionOptionKind::AllowOnce,
        }],
        meta: None,
    };

    let handle = engine.events().on(move |event| {
        if let PermissionEvent::Request { pending, .. } = event {
            let option_id = pending.options[0].id.clone();
            pending.resolve(option_id);
        }
    });
    engine.handle_request(request).await;
    engine.events().off(handle);

    let call = registry.get_call(&crate::ToolCallId::from("call-6")).unwrap();
    assert!(call.permission_request.is_none(), "resolved requests must clear the pending permission");
}

#[tokio::test]
async fn terminal_registry_runs_a_command_and_captures_its_output() {
    let registry = crate::terminal::TerminalRegistry::new();
    let local = tokio::task::LocalSet::new();
    local
        .run_until(async {
            let id = registry
                .create(
                    "/bin/sh".into(),
                    vec!["-c".into(), "printf hello".into()],
                    None,
                    Vec::new(),
                    None,
                    spawn_local,
                )
                .unwrap();

            let status = tokio::time::timeout(Duration::from_secs(5), registry.wait_for_exit(&id))
                .await
                .expect("command should exit promptly")
                .unwrap();
            assert_eq!(status.exit_code, Some(0));
            let (output, truncated, _status) = registry.output(&id).unwrap();
            assert_eq!(output, "hello");
            assert!(!truncated);
        })
        .await;
}

#[tokio::test]
async fn terminal_registry_truncates_output_on_a_utf8_boundary() {
    let registry = crate::terminal::TerminalRegistry::new();
    let local = tokio::task::LocalSet::new();
    local
        .run_until(async {
            // "école" is 6 bytes in UTF-8 ('é' is 2 bytes); limiting to 5
            // bytes would otherwise split 'é' in half.
            let id = registry
                .create(
                    "/bin/sh".into(),
                    vec!["-c".into(), "printf '%s' école".into()],
                    None,
                    Vec::new(),
                    Some(5),
                    spawn_local,
                )
                .unwrap();

            tokio::time::timeout(Duration::from_secs(5), registry.wait_for_exit(&id)).await.unwrap().unwrap();
            let (output, truncated, _status) = registry.output(&id).unwrap();
            assert!(truncated);
            assert!(std::str::from_utf8(output.as_bytes()).is_ok());
            assert_eq!(output, "cole");
        })
        .await;
}

#[test]
fn permission_policy_action_is_copy_and_comparable() {
    assert_eq!(PolicyAction::Allow, PolicyAction::Allow);
    assert_ne!(PolicyAction::Allow, PolicyAction::Reject);
}
