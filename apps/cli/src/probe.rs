use std::time::{Duration, Instant};

use anyhow::Result;
use console::style;
use netscope_core::{Agent, Settings, agent::TransportState, format::format_duration_ms};
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

use crate::{ProbeArgs, create_spinner};

const CONNECT_TIMEOUT: Duration = Duration::from_secs(3);
const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

/// Time for the emitter to write out the last frames before the process exits.
const FLUSH_GRACE: Duration = Duration::from_millis(200);

pub async fn run(mut settings: Settings, args: ProbeArgs) -> Result<()> {
    if let Some(relay) = args.relay {
        settings.agent.relay_url = relay;
    }
    let agent = Agent::start(settings.agent.clone());

    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .with(agent.capture_layer())
        .init();

    if settings.agent.enabled {
        let spinner = create_spinner(&format!("Connecting to {} ...", settings.agent.relay_url));
        let started = Instant::now();
        while agent.transport_state() == Some(TransportState::Connecting)
            && started.elapsed() < CONNECT_TIMEOUT
        {
            tokio::time::sleep(Duration::from_millis(20)).await;
        }

        if agent.transport_state() == Some(TransportState::Open) {
            spinner.finish_with_message(format!(
                "{} Connected to {}",
                style("✓").green().bold(),
                settings.agent.relay_url
            ));
        } else {
            spinner.finish_with_message(format!(
                "{} No inspector at {}, requests run uncaptured",
                style("!").yellow().bold(),
                settings.agent.relay_url
            ));
        }
    }

    let client = agent.wrap_client(
        reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .user_agent(concat!("netscope-probe/", env!("CARGO_PKG_VERSION")))
            .build()?,
    );
    let mut failures = 0;

    for _ in 0..args.repeat.max(1) {
        for url in &args.urls {
            let started = Instant::now();
            match client.send(client.get(url.as_str())).await {
                Ok(response) => {
                    let status = response.status();
                    let bytes = response.bytes().await.map(|b| b.len()).unwrap_or(0);
                    tracing::info!(target: "netscope_probe", %url, status = status.as_u16(), bytes, "fetched");
                    println!(
                        "{} {} {} {}",
                        style(status.as_u16()).green(),
                        url,
                        style(format!("{bytes}B")).dim(),
                        style(format_duration_ms(started.elapsed().as_millis() as u64)).dim()
                    );
                }
                Err(e) => {
                    failures += 1;
                    tracing::error!(target: "netscope_probe", %url, error = %e, "request failed");
                    println!("{} {} {}", style("ERR").red().bold(), url, style(e).dim());
                }
            }
        }
    }

    tokio::time::sleep(FLUSH_GRACE).await;

    if let Some(emitter) = agent.emitter() {
        let metrics = emitter.metrics();
        tracing::debug!(
            target: "netscope_probe",
            sent = metrics.sent_total.load(std::sync::atomic::Ordering::Relaxed),
            dropped = metrics.dropped_total.load(std::sync::atomic::Ordering::Relaxed),
            "emitter totals"
        );
    }

    if failures > 0 {
        anyhow::bail!("{failures} request(s) failed");
    }
    Ok(())
}
