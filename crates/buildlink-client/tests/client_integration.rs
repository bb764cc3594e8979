//! End-to-end client behaviour against a scripted server over an in-memory
//! connection.

use std::sync::Arc;
use std::time::Duration;

use assert_matches::assert_matches;
use async_trait::async_trait;
use buildlink_client::{Client, ClientError, ClientOptions, Interaction, NoInteraction, Notification};
use buildlink_core::protocol::{
    ClientInfo, Envelope, Event, Message, Request, Response, ScopedKey, TaskResult,
};
use buildlink_core::{Connection, ExecutionId, MemoryConnection, TaskId};
use futures::FutureExt;
use serde_json::json;
use tokio::sync::mpsc;

const WAIT: Duration = Duration::from_secs(5);

/// The server end of the link.
struct Server {
    conn: MemoryConnection,
}

impl Server {
    async fn next(&self) -> Envelope {
        tokio::time::timeout(WAIT, self.conn.receive())
            .await
            .expect("server timed out waiting for a frame")
            .expect("client side closed")
    }

    async fn expect_request(&self) -> (u64, Request) {
        let envelope = self.next().await;
        match envelope.message {
            Message::Request(request) => (envelope.serial, request),
            other => panic!("expected request, got {other:?}"),
        }
    }

    async fn expect_response(&self) -> (u64, Response) {
        let envelope = self.next().await;
        match envelope.message {
            Message::Response(response) => (envelope.reply_to.expect("reply_to"), response),
            other => panic!("expected response, got {other:?}"),
        }
    }

    async fn reply(&self, reply_to: u64, response: Response) {
        let serial = self.conn.next_serial();
        self.conn
            .send(Envelope::response(serial, reply_to, response))
            .await
            .unwrap();
    }

    async fn event(&self, event: Event) {
        let serial = self.conn.next_serial();
        self.conn.send(Envelope::event(serial, event)).await.unwrap();
    }

    async fn ask(&self, request: Request) -> u64 {
        let serial = self.conn.next_serial();
        self.conn
            .send(Envelope::request(serial, request))
            .await
            .unwrap();
        serial
    }

    async fn hang_up(&self) {
        self.conn.close().await;
    }
}

async fn connected() -> (Client, Server) {
    connected_with(ClientOptions::new(ClientInfo::new("test", "test client"))).await
}

async fn connected_with(options: ClientOptions) -> (Client, Server) {
    let (client_end, server_end) = MemoryConnection::pair();
    let server = Server { conn: server_end };

    let (client, ()) = tokio::join!(
        Client::with_connection(Arc::new(client_end), options),
        async {
            let (serial, request) = server.expect_request().await;
            assert_matches!(request, Request::RegisterClient { .. });
            server.reply(serial, Response::Received).await;
        }
    );
    (client.unwrap(), server)
}

type Received<E> = mpsc::UnboundedReceiver<Notification<E>>;

fn recorder<E: Send + 'static>() -> (
    impl FnMut(Notification<E>) -> anyhow::Result<()> + Send + 'static,
    Received<E>,
) {
    let (tx, rx) = mpsc::unbounded_channel();
    let listener = move |notification: Notification<E>| {
        let _ = tx.send(notification);
        Ok(())
    };
    (listener, rx)
}

async fn next<E>(rx: &mut Received<E>) -> Notification<E> {
    tokio::time::timeout(WAIT, rx.recv())
        .await
        .expect("listener timed out")
        .expect("listener channel closed")
}

fn exec(n: u64) -> ExecutionId {
    ExecutionId::new(n)
}

struct Scripted;

#[async_trait]
impl Interaction for Scripted {
    async fn read_line(
        &self,
        _execution_id: ExecutionId,
        prompt: &str,
        _mask: bool,
    ) -> Result<Option<String>, NoInteraction> {
        Ok(Some(format!("answer to {prompt}")))
    }

    async fn confirm(&self, _execution_id: ExecutionId, _message: &str) -> Result<bool, NoInteraction> {
        Ok(true)
    }
}

// ── Requests ────────────────────────────────────────────────────────

#[tokio::test]
async fn execution_request_resolves_to_assigned_id() {
    let (client, server) = connected().await;

    let pending = client.request_execution("compile", None);
    let (serial, request) = server.expect_request().await;
    assert_eq!(
        request,
        Request::Execution {
            command: "compile".into()
        }
    );
    assert_eq!(pending.serial(), serial);

    server
        .reply(serial, Response::ExecutionRequestReceived { id: exec(7) })
        .await;
    assert_eq!(pending.await, Ok(exec(7)));
}

#[tokio::test]
async fn lookup_and_completions_resolve() {
    let (client, server) = connected().await;

    let lookup = client.lookup_key("compile");
    let (serial, request) = server.expect_request().await;
    assert_eq!(
        request,
        Request::KeyLookup {
            name: "compile".into()
        }
    );
    server
        .reply(
            serial,
            Response::KeyLookup {
                name: "compile".into(),
                keys: vec![ScopedKey::named("compile")],
            },
        )
        .await;
    assert_eq!(lookup.await, Ok(vec![ScopedKey::named("compile")]));

    let completions = client.autocomplete("comp", 1);
    let (serial, _) = server.expect_request().await;
    server
        .reply(serial, Response::CommandCompletions { completions: vec![] })
        .await;
    assert_eq!(completions.await, Ok(vec![]));
}

#[tokio::test]
async fn cancel_reports_attempt() {
    let (client, server) = connected().await;

    let cancel = client.cancel_execution(exec(4));
    let (serial, request) = server.expect_request().await;
    assert_eq!(request, Request::CancelExecution { id: exec(4) });
    server
        .reply(serial, Response::CancelExecution { attempted: false })
        .await;
    assert_eq!(cancel.await, Ok(false));
}

#[tokio::test]
async fn server_error_fails_the_request() {
    let (client, server) = connected().await;

    let analysis = client.analyze_execution("nonsense");
    let (serial, _) = server.expect_request().await;
    server
        .reply(
            serial,
            Response::Error {
                message: "Not a valid command: nonsense".into(),
            },
        )
        .await;
    assert_eq!(
        analysis.await,
        Err(ClientError::Server {
            message: "Not a valid command: nonsense".into()
        })
    );
}

#[tokio::test]
async fn responses_complete_out_of_order() {
    let (client, server) = connected().await;

    let first = client.cancel_execution(exec(1));
    let second = client.cancel_execution(exec(2));
    let (s1, _) = server.expect_request().await;
    let (s2, _) = server.expect_request().await;

    server
        .reply(s2, Response::CancelExecution { attempted: true })
        .await;
    server
        .reply(s1, Response::CancelExecution { attempted: false })
        .await;
    assert_eq!(second.await, Ok(true));
    assert_eq!(first.await, Ok(false));
}

#[tokio::test]
async fn registration_error_is_returned() {
    let (client_end, server_end) = MemoryConnection::pair();
    let server = Server { conn: server_end };
    let options = ClientOptions::new(ClientInfo::new("test", "test client"));

    let (client, ()) = tokio::join!(
        Client::with_connection(Arc::new(client_end), options),
        async {
            let (serial, _) = server.expect_request().await;
            server
                .reply(
                    serial,
                    Response::Error {
                        message: "rejected".into(),
                    },
                )
                .await;
        }
    );
    match client {
        Ok(_) => panic!("registration should fail"),
        Err(error) => assert_eq!(
            error,
            ClientError::Server {
                message: "rejected".into()
            }
        ),
    }
}

// ── Disconnect ──────────────────────────────────────────────────────

#[tokio::test]
async fn pending_requests_fail_when_server_hangs_up() {
    let (client, server) = connected().await;

    let lookup = client.lookup_key("compile");
    let kill = client.kill_server();
    let _ = server.expect_request().await;
    let _ = server.expect_request().await;
    server.hang_up().await;

    assert_eq!(lookup.await, Err(ClientError::ConnectionClosed));
    assert_eq!(kill.await, Err(ClientError::ConnectionClosed));
    assert!(client.is_closed());

    assert_eq!(
        client.lookup_key("later").await,
        Err(ClientError::ConnectionClosed)
    );
}

#[tokio::test]
async fn disconnect_closes_out_running_executions() {
    let (client, server) = connected().await;
    let (listener, mut events) = recorder::<Event>();
    let subscription = client.subscribe_events(listener);
    assert_eq!(server.expect_request().await.1, Request::ListenToEvents);

    let sent = vec![
        Event::ExecutionWaiting {
            id: exec(3),
            command: "test".into(),
            client: None,
        },
        Event::TaskStarted {
            execution_id: exec(3),
            task_id: TaskId::new(9),
            key: None,
        },
        Event::ExecutionWaiting {
            id: exec(4),
            command: "compile".into(),
            client: None,
        },
        Event::ExecutionSuccess { id: exec(4) },
    ];
    for event in &sent {
        server.event(event.clone()).await;
    }
    for event in sent {
        assert_eq!(next(&mut events).await, Notification::Event(event));
    }

    server.hang_up().await;

    assert_eq!(
        next(&mut events).await,
        Notification::Event(Event::TaskFinished {
            execution_id: exec(3),
            task_id: TaskId::new(9),
            key: None,
            success: false,
            message: Some("connection closed".into()),
        })
    );
    assert_eq!(
        next(&mut events).await,
        Notification::Event(Event::ExecutionFailure { id: exec(3) })
    );
    assert_eq!(next(&mut events).await, Notification::Closed);

    // Cancelling after close is a no-op.
    subscription.cancel();
    assert!(subscription.is_cancelled());
}

#[tokio::test]
async fn finished_execution_gets_no_synthetic_events() {
    let (client, server) = connected().await;
    let (listener, mut events) = recorder::<Event>();
    let _subscription = client.subscribe_events(listener);
    let _ = server.expect_request().await;

    server
        .event(Event::ExecutionWaiting {
            id: exec(7),
            command: "compile".into(),
            client: None,
        })
        .await;
    server.event(Event::ExecutionSuccess { id: exec(7) }).await;
    let _ = next(&mut events).await;
    let _ = next(&mut events).await;

    client.close().await;
    assert_eq!(next(&mut events).await, Notification::Closed);
    assert!(client.is_closed());

    // Second close is harmless.
    client.close().await;
}

#[tokio::test]
async fn concurrent_closes_both_wait_for_shutdown() {
    let (client, server) = connected().await;
    let lookup = client.lookup_key("compile");
    let _ = server.expect_request().await;

    let ((), state) = tokio::join!(client.close(), async {
        client.close().await;
        lookup.now_or_never()
    });
    assert_eq!(state, Some(Err(ClientError::ConnectionClosed)));
}

#[tokio::test]
async fn subscribing_after_close_only_sees_closed() {
    let (client, _server) = connected().await;
    client.close().await;

    let (listener, mut events) = recorder::<Event>();
    let subscription = client.subscribe_events(listener);
    assert_eq!(next(&mut events).await, Notification::Closed);
    subscription.cancel();
}

// ── Subscriptions ───────────────────────────────────────────────────

#[tokio::test]
async fn value_listeners_share_one_server_subscription() {
    let (client, server) = connected().await;
    let key = ScopedKey::named("version").in_project("core");

    let first = client.watch_value(&key, |_| Ok(()));
    assert_eq!(
        server.expect_request().await.1,
        Request::ListenToValue { key: key.clone() }
    );

    let second = client.watch_value(&key, |_| Ok(()));
    assert_eq!(
        server.expect_request().await.1,
        Request::SendSyntheticValueChanged { key: key.clone() }
    );

    first.cancel();
    first.cancel();
    second.cancel();
    assert_eq!(
        server.expect_request().await.1,
        Request::UnlistenToValue { key: key.clone() }
    );
}

#[tokio::test]
async fn value_changes_reach_only_their_key() {
    let (client, server) = connected().await;
    let version = ScopedKey::named("version");
    let name = ScopedKey::named("name");

    let (listener, mut versions) = recorder::<TaskResult>();
    let _watch = client.watch_value(&version, listener);
    let _ = server.expect_request().await;

    server
        .event(Event::ValueChanged {
            key: name,
            value: TaskResult::Success {
                value: json!("core"),
                rendered: "core".into(),
            },
        })
        .await;
    let current = TaskResult::Success {
        value: json!("1.2.0"),
        rendered: "1.2.0".into(),
    };
    server
        .event(Event::ValueChanged {
            key: version,
            value: current.clone(),
        })
        .await;

    assert_eq!(next(&mut versions).await, Notification::Event(current));
}

#[tokio::test]
async fn typed_value_watch_decodes() {
    let (client, server) = connected().await;
    let key = ScopedKey::named("crossPaths");

    let (listener, mut values) = recorder::<Result<bool, String>>();
    let _watch = client.watch_value_as::<bool, _>(&key, listener);
    let _ = server.expect_request().await;

    for value in [
        TaskResult::Success {
            value: json!(true),
            rendered: "true".into(),
        },
        TaskResult::Success {
            value: json!("yes"),
            rendered: "yes".into(),
        },
        TaskResult::Failure {
            message: "undefined setting".into(),
        },
    ] {
        server
            .event(Event::ValueChanged {
                key: key.clone(),
                value,
            })
            .await;
    }

    assert_eq!(next(&mut values).await, Notification::Event(Ok(true)));
    assert_matches!(next(&mut values).await, Notification::Event(Err(_)));
    assert_eq!(
        next(&mut values).await,
        Notification::Event(Err("undefined setting".into()))
    );
}

#[tokio::test]
async fn late_build_listener_triggers_refresh() {
    let (client, server) = connected().await;

    let _first = client.subscribe_build_structure(|_| Ok(()));
    assert_eq!(server.expect_request().await.1, Request::ListenToBuildChange);
    let _second = client.subscribe_build_structure(|_| Ok(()));
    assert_eq!(
        server.expect_request().await.1,
        Request::SendSyntheticBuildChanged
    );
}

#[tokio::test]
async fn failing_listener_keeps_receiving() {
    let (client, server) = connected().await;
    let (tx, mut seen) = mpsc::unbounded_channel();
    let _subscription = client.subscribe_events(move |notification| {
        let _ = tx.send(notification);
        anyhow::bail!("listener exploded")
    });
    let _ = server.expect_request().await;

    server.event(Event::ExecutionStarting { id: exec(1) }).await;
    server.event(Event::ExecutionStarting { id: exec(2) }).await;
    assert_eq!(
        next(&mut seen).await,
        Notification::Event(Event::ExecutionStarting { id: exec(1) })
    );
    assert_eq!(
        next(&mut seen).await,
        Notification::Event(Event::ExecutionStarting { id: exec(2) })
    );
}

// ── Server requests ─────────────────────────────────────────────────

#[tokio::test]
async fn read_line_without_interaction_is_refused() {
    let (_client, server) = connected().await;

    let serial = server
        .ask(Request::ReadLine {
            execution_id: exec(5),
            prompt: "Password: ".into(),
            mask: true,
        })
        .await;
    let (reply_to, response) = server.expect_response().await;
    assert_eq!(reply_to, serial);
    assert_eq!(
        response,
        Response::Error {
            message: "no interaction available".into()
        }
    );
}

#[tokio::test]
async fn interaction_answers_until_execution_ends() {
    let (client, server) = connected().await;

    let pending = client.request_execution("console", Some(Arc::new(Scripted)));
    let (serial, _) = server.expect_request().await;
    server
        .reply(serial, Response::ExecutionRequestReceived { id: exec(2) })
        .await;
    assert_eq!(pending.await, Ok(exec(2)));

    let ask = server
        .ask(Request::ReadLine {
            execution_id: exec(2),
            prompt: "scala> ".into(),
            mask: false,
        })
        .await;
    assert_eq!(
        server.expect_response().await,
        (
            ask,
            Response::ReadLine {
                line: Some("answer to scala> ".into())
            }
        )
    );

    let ask = server
        .ask(Request::Confirm {
            execution_id: exec(2),
            message: "Overwrite?".into(),
        })
        .await;
    assert_eq!(
        server.expect_response().await,
        (ask, Response::Confirm { confirmed: true })
    );

    server.event(Event::ExecutionSuccess { id: exec(2) }).await;
    let ask = server
        .ask(Request::Confirm {
            execution_id: exec(2),
            message: "Again?".into(),
        })
        .await;
    assert_eq!(
        server.expect_response().await,
        (
            ask,
            Response::Error {
                message: "no interaction available".into()
            }
        )
    );
}

#[tokio::test]
async fn failed_execution_request_drops_its_interaction() {
    let (client, server) = connected().await;

    let pending = client.request_key_execution(ScopedKey::named("run"), Some(Arc::new(Scripted)));
    let (serial, _) = server.expect_request().await;
    server
        .reply(
            serial,
            Response::Error {
                message: "no such key".into(),
            },
        )
        .await;
    assert_matches!(pending.await, Err(ClientError::Server { .. }));

    // A stray id assignment for the failed serial binds nothing.
    server
        .reply(serial, Response::ExecutionRequestReceived { id: exec(1) })
        .await;
    let ask = server
        .ask(Request::Confirm {
            execution_id: exec(1),
            message: "?".into(),
        })
        .await;
    assert_eq!(
        server.expect_response().await,
        (
            ask,
            Response::Error {
                message: "no interaction available".into()
            }
        )
    );
}

#[tokio::test]
async fn timed_out_execution_request_drops_its_interaction() {
    let mut options = ClientOptions::new(ClientInfo::new("test", "test client"));
    options.request_timeout = Some(Duration::from_millis(100));
    let (client, server) = connected_with(options).await;

    let pending = client.request_execution("console", Some(Arc::new(Scripted)));
    let (serial, _) = server.expect_request().await;
    assert_eq!(pending.await, Err(ClientError::Timeout { timeout_ms: 100 }));

    // The id arrives too late to bind the handler.
    server
        .reply(serial, Response::ExecutionRequestReceived { id: exec(3) })
        .await;
    let ask = server
        .ask(Request::ReadLine {
            execution_id: exec(3),
            prompt: "> ".into(),
            mask: false,
        })
        .await;
    assert_eq!(
        server.expect_response().await,
        (
            ask,
            Response::Error {
                message: "no interaction available".into()
            }
        )
    );
}

#[tokio::test]
async fn unsupported_server_request_is_answered_with_error() {
    let (_client, server) = connected().await;

    let serial = server.ask(Request::KillServer).await;
    assert_eq!(
        server.expect_response().await,
        (
            serial,
            Response::Error {
                message: "unsupported request: kill_server".into()
            }
        )
    );
}

// ── Logging ─────────────────────────────────────────────────────────

#[tokio::test]
async fn reply_to_unknown_serial_is_logged_and_ignored() {
    let (logs, _guard) = buildlink_logging::capture_logs();
    let (client, server) = connected().await;

    server
        .reply(9_999, Response::CancelExecution { attempted: true })
        .await;

    // Round trip so the stray reply has been routed.
    let cancel = client.cancel_execution(exec(1));
    let (serial, _) = server.expect_request().await;
    server
        .reply(serial, Response::CancelExecution { attempted: true })
        .await;
    assert_eq!(cancel.await, Ok(true));

    assert!(logs.has_event(tracing::Level::WARN, "response for unknown request"));
}
