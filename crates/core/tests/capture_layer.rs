use std::{sync::atomic::Ordering, time::Duration};

use netscope_core::{
    Agent, AgentSettings, Relay,
    agent::TransportState,
    events::Event,
};
use tokio::{sync::broadcast, time::timeout};
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

// Installs a global subscriber, so this file holds a single test.
#[tokio::test]
async fn trace_level_capture_does_not_feed_on_its_own_frames() {
    let relay = Relay::bind("127.0.0.1:0").await.unwrap();
    let url = format!("ws://{}", relay.local_addr().unwrap());
    let mut events = relay.endpoint().subscribe();
    let (shutdown_tx, shutdown_rx) = broadcast::channel(1);
    let server = tokio::spawn(relay.serve(shutdown_rx));

    let agent = Agent::start(AgentSettings {
        relay_url: url,
        capture_stack_trace: false,
        ..Default::default()
    });
    tracing_subscriber::registry()
        .with(EnvFilter::new("trace"))
        .with(agent.capture_layer())
        .init();

    timeout(Duration::from_secs(5), async {
        while agent.transport_state() != Some(TransportState::Open) {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .unwrap();

    tracing::info!(target: "host_app", "single host message");

    timeout(Duration::from_secs(5), async {
        loop {
            let relayed = events.recv().await.unwrap();
            if let Event::LogEmitted(log) = &relayed.event {
                if log.args.first() == Some(&serde_json::json!("single host message")) {
                    break;
                }
            }
        }
    })
    .await
    .unwrap();

    let sent = || {
        agent
            .emitter()
            .unwrap()
            .metrics()
            .sent_total
            .load(Ordering::Relaxed)
    };
    tokio::time::sleep(Duration::from_millis(300)).await;
    let settled = sent();
    tokio::time::sleep(Duration::from_millis(700)).await;
    assert_eq!(sent(), settled);
    assert!(settled < 10, "sent {settled} frames for one host event");

    shutdown_tx.send(()).unwrap();
    server.await.unwrap().unwrap();
}
