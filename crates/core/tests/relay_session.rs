use std::{
    sync::{Arc, atomic::Ordering},
    time::Duration,
};

use futures_util::SinkExt;
use netscope_core::{
    AgentSettings, Agent, Relay, SessionIngestWorker, SharedSession, Worker,
    agent::{SilentConsole, TransportState},
    events::{Event, EventId, LogEmitted, LogLevel},
    relay::RelayCounters,
};
use tokio::{sync::broadcast, time::timeout};
use tokio_tungstenite::{connect_async, tungstenite::Message};

async fn start_relay() -> (Relay, String) {
    let relay = Relay::bind("127.0.0.1:0").await.unwrap();
    let url = format!("ws://{}", relay.local_addr().unwrap());
    (relay, url)
}

fn text(frame: impl Into<String>) -> Message {
    let frame: String = frame.into();
    Message::Text(frame.into())
}

fn log_frame(id: &str) -> String {
    Event::from(LogEmitted {
        id: EventId::from(id),
        level: LogLevel::Info,
        args: vec![serde_json::json!("hello")],
        timestamp: "2024-01-01T00:00:00.000Z".into(),
        stack: None,
    })
    .encode()
    .unwrap()
}

#[tokio::test]
async fn malformed_frames_do_not_break_the_connection() {
    let (relay, url) = start_relay().await;
    let endpoint = relay.endpoint().clone();
    let mut events = endpoint.subscribe();
    let (shutdown_tx, shutdown_rx) = broadcast::channel(1);
    let server = tokio::spawn(relay.serve(shutdown_rx));

    let (mut first, _) = connect_async(url.as_str()).await.unwrap();
    first.send(text("{not json")).await.unwrap();
    first.send(text(r#"{"type":"mystery"}"#)).await.unwrap();
    first.send(text(log_frame("a"))).await.unwrap();

    let (mut second, _) = connect_async(url.as_str()).await.unwrap();
    second.send(text(log_frame("b"))).await.unwrap();

    let a = timeout(Duration::from_secs(5), events.recv()).await.unwrap().unwrap();
    let b = timeout(Duration::from_secs(5), events.recv()).await.unwrap().unwrap();
    let mut ids = vec![a.event.id().to_string(), b.event.id().to_string()];
    ids.sort();
    assert_eq!(ids, vec!["a", "b"]);
    assert_ne!(a.connection_id, b.connection_id);

    let RelayCounters {
        connections,
        forwarded,
        malformed,
        ..
    } = endpoint.metrics().snapshot();
    assert_eq!(connections, 2);
    assert_eq!(forwarded, 2);
    assert_eq!(malformed, 2);

    shutdown_tx.send(()).unwrap();
    server.await.unwrap().unwrap();
}

#[tokio::test]
async fn per_connection_order_is_preserved() {
    let (relay, url) = start_relay().await;
    let mut events = relay.endpoint().subscribe();
    let (shutdown_tx, shutdown_rx) = broadcast::channel(1);
    let server = tokio::spawn(relay.serve(shutdown_rx));

    let (mut socket, _) = connect_async(url.as_str()).await.unwrap();
    for i in 0..20 {
        socket
            .send(text(log_frame(&i.to_string())))
            .await
            .unwrap();
    }

    for i in 0..20 {
        let event = timeout(Duration::from_secs(5), events.recv())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(event.event.id().as_str(), i.to_string());
    }

    shutdown_tx.send(()).unwrap();
    server.await.unwrap().unwrap();
}

#[tokio::test]
async fn agent_console_reaches_the_session() {
    let (relay, url) = start_relay().await;
    let subscription = relay.endpoint().subscribe();
    let (shutdown_tx, shutdown_rx) = broadcast::channel(1);
    let session = SharedSession::new();
    let server = tokio::spawn(relay.serve(shutdown_tx.subscribe()));
    let worker = tokio::spawn(SessionIngestWorker::new(session.clone()).run(subscription, shutdown_rx));

    let mut agent = Agent::start(AgentSettings {
        relay_url: url,
        ..Default::default()
    });

    timeout(Duration::from_secs(5), async {
        while agent.transport_state() != Some(TransportState::Open) {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .unwrap();

    let console = agent.console_over(Arc::new(SilentConsole));
    console.warn(&["low disk".into()]);

    timeout(Duration::from_secs(5), async {
        while session.read(|store| store.log_count()) == 0 {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .unwrap();

    let (level, has_stack) = session.read(|store| {
        let log = store.logs_newest_first().next().unwrap();
        (log.level, log.stack.is_some())
    });
    assert_eq!(level, LogLevel::Warn);
    assert!(has_stack);

    agent.shutdown();
    assert_eq!(agent.transport_state(), Some(TransportState::Closed));
    let dropped_before = agent
        .emitter()
        .unwrap()
        .metrics()
        .dropped_total
        .load(Ordering::Relaxed);
    console.log(&["after shutdown".into()]);
    let dropped_after = agent
        .emitter()
        .unwrap()
        .metrics()
        .dropped_total
        .load(Ordering::Relaxed);
    assert_eq!(dropped_after, dropped_before + 1);

    shutdown_tx.send(()).unwrap();
    server.await.unwrap().unwrap();
    worker.await.unwrap().unwrap();
}

#[tokio::test]
async fn minimal_finish_frame_is_forwarded_verbatim() {
    let (relay, url) = start_relay().await;
    let endpoint = relay.endpoint().clone();
    let mut events = endpoint.subscribe();
    let (shutdown_tx, shutdown_rx) = broadcast::channel(1);
    let server = tokio::spawn(relay.serve(shutdown_rx));

    let frame = r#"{"type":"response","id":"2","url":"https://x/z","status":500,"isError":false,"sdk":"rn-0.74"}"#;
    let (mut socket, _) = connect_async(url.as_str()).await.unwrap();
    socket.send(text(frame)).await.unwrap();

    let relayed = timeout(Duration::from_secs(5), events.recv())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(&*relayed.frame, frame);
    let Event::RequestFinished(finished) = &relayed.event else {
        panic!("expected response event");
    };
    assert_eq!(finished.status, 500);

    let counters = endpoint.metrics().snapshot();
    assert_eq!(counters.forwarded, 1);
    assert_eq!(counters.malformed, 0);

    shutdown_tx.send(()).unwrap();
    server.await.unwrap().unwrap();
}
