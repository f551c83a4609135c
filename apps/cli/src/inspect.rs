use anyhow::{Context, Result};
use console::style;
use netscope_core::{
    Relay, Settings,
    events::{Event, EventId},
    query::SessionSummary,
    store::{IngestOutcome, SharedSession},
    workers::{Ingested, SessionIngestWorker, Worker},
};
use tokio::{
    io::{AsyncBufReadExt, BufReader},
    sync::{broadcast, mpsc},
};
use tracing_subscriber::EnvFilter;

use crate::{InspectArgs, create_spinner, render};

enum Command {
    TogglePause,
    Clear,
    Select(EventId),
    List,
    Help,
    Quit,
    Unknown(String),
}

fn parse_command(line: &str) -> Option<Command> {
    let line = line.trim();
    let (head, rest) = line.split_once(' ').unwrap_or((line, ""));
    Some(match head {
        "" => return None,
        "p" => Command::TogglePause,
        "c" => Command::Clear,
        "s" if !rest.trim().is_empty() => Command::Select(EventId::from(rest.trim())),
        "l" => Command::List,
        "h" | "?" => Command::Help,
        "q" => Command::Quit,
        _ => Command::Unknown(line.to_string()),
    })
}

fn print_help() {
    println!(
        "{}",
        style("p pause/resume · c clear · s <id> details · l list · q quit").dim()
    );
}

pub async fn run(mut settings: Settings, args: InspectArgs) -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    if let Some(host) = &args.host {
        settings.relay.host = host.clone();
    }
    if let Some(port) = args.port {
        settings.relay.port = port;
    }

    let bind_addr = settings.relay.bind_addr();
    let relay = Relay::bind(&bind_addr)
        .await
        .with_context(|| format!("could not start relay on {bind_addr}"))?;
    let local_addr = relay.local_addr()?;

    let session = SharedSession::new();
    let (shutdown_tx, _) = broadcast::channel::<()>(1);
    let (ingested_tx, mut ingested_rx) = mpsc::unbounded_channel::<Ingested>();

    let subscription = relay.endpoint().subscribe();
    let endpoint = relay.endpoint().clone();
    let relay_task = tokio::spawn(relay.serve(shutdown_tx.subscribe()));
    let worker_task = tokio::spawn(
        SessionIngestWorker::new(session.clone())
            .with_observer(ingested_tx)
            .run(subscription, shutdown_tx.subscribe()),
    );

    println!(
        "\n{}  {}\n",
        style("netscope").cyan().bold(),
        style("Network Inspector").dim()
    );
    print_help();
    println!("{}", style("─".repeat(60)).dim());

    let request_filter = args.request_filter();
    let log_filter = args.log_filter();

    let mut spinner = Some(create_spinner(&format!(
        "Waiting for agents on ws://{local_addr} ..."
    )));
    let mut stdin = BufReader::new(tokio::io::stdin()).lines();
    let mut stdin_open = true;

    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => break,
            line = stdin.next_line(), if stdin_open => match line {
                Ok(Some(line)) => {
                    let Some(command) = parse_command(&line) else { continue };
                    match command {
                        Command::TogglePause => {
                            let paused = session.toggle_paused();
                            let state = if paused { "paused" } else { "resumed" };
                            println!("{} {}", style("●").yellow(), style(state).bold());
                        }
                        Command::Clear => {
                            session.write(|store| store.clear_all());
                            println!("{} cleared", style("●").yellow());
                        }
                        Command::Select(id) => {
                            let details = session.write(|store| {
                                if let Some(record) = store.select_request(&id) {
                                    return Some(render::request_details(record));
                                }
                                store.select_log(&id).map(render::log_details)
                            });
                            match details {
                                Some(details) => println!("{details}"),
                                None => println!("{} no record with id {id}", style("!").red()),
                            }
                        }
                        Command::List => session.read(|store| {
                            for record in request_filter.apply(store) {
                                println!("{} {}", render::request_line(record), render::id_hint(record.id.as_str()));
                            }
                            for log in log_filter.apply(store) {
                                println!("{} {}", render::log_line(log), render::id_hint(log.id.as_str()));
                            }
                        }),
                        Command::Help => print_help(),
                        Command::Quit => break,
                        Command::Unknown(line) => {
                            println!("{} unknown command: {line}", style("!").red());
                            print_help();
                        }
                    }
                }
                Ok(None) => stdin_open = false,
                Err(e) => {
                    tracing::warn!(error = %e, "stdin closed");
                    stdin_open = false;
                }
            },
            notice = ingested_rx.recv() => {
                let Some(Ingested { event, outcome }) = notice else { break };
                if let Some(spinner) = spinner.take() {
                    spinner.finish_with_message(format!(
                        "{} Agent connected",
                        style("✓").green().bold()
                    ));
                }
                if outcome == IngestOutcome::Dropped {
                    continue;
                }
                let line = session.read(|store| match &event.event {
                    Event::LogEmitted(log) => store
                        .log(&log.id)
                        .filter(|l| log_filter.matches(l))
                        .map(|l| format!("{} {}", render::log_line(l), render::id_hint(l.id.as_str()))),
                    other => store
                        .request(other.id())
                        .filter(|r| request_filter.matches(r))
                        .map(|r| format!("{} {}", render::request_line(r), render::id_hint(r.id.as_str()))),
                });
                if let Some(line) = line {
                    println!("{line}");
                }
            }
        }
    }

    if let Some(spinner) = spinner.take() {
        spinner.finish_and_clear();
    }

    let _ = shutdown_tx.send(());
    endpoint.unsubscribe();
    relay_task.await??;
    worker_task.await??;

    let counters = endpoint.metrics().snapshot();
    let summary = session.read(SessionSummary::of);
    println!("\n{}", style("─".repeat(60)).dim());
    print!("{}", render::summary(&summary));
    println!(
        "  {} {} connections, {} forwarded, {} dropped, {} malformed",
        style("relay:").dim(),
        counters.connections,
        counters.forwarded,
        counters.dropped,
        counters.malformed
    );

    Ok(())
}
