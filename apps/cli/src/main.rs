use std::{path::PathBuf, time::Duration};

use anyhow::Result;
use clap::{Args, Parser, Subcommand};
use console::style;
use indicatif::{ProgressBar, ProgressStyle};
use netscope_core::query::{LevelFilter, LogFilter, MethodFilter, RequestFilter, StatusFilter};

mod inspect;
mod probe;
mod render;

#[derive(Parser)]
#[command(name = "netscope")]
#[command(about = "Inspect the network traffic and console output of an instrumented process")]
struct Cli {
    /// Settings file (defaults to the platform config directory)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run the relay and print a live tail of everything agents send
    Inspect(InspectArgs),
    /// Send requests through an instrumented client and log through the capture layer
    Probe(ProbeArgs),
}

#[derive(Args)]
pub struct InspectArgs {
    /// Interface to listen on
    #[arg(long)]
    host: Option<String>,

    /// Port to listen on
    #[arg(short, long)]
    port: Option<u16>,

    /// Case-insensitive text filter over urls and log arguments
    #[arg(short, long, default_value = "")]
    search: String,

    /// Request method filter (ALL, GET, POST, ...)
    #[arg(short, long, default_value = "ALL")]
    method: MethodFilter,

    /// Status filter (ALL, 2xx, 3xx, 4xx, 5xx, ERR)
    #[arg(long, default_value = "ALL")]
    status: StatusFilter,

    /// Log level filter (ALL, log, warn, error, info, debug)
    #[arg(short, long, default_value = "ALL")]
    level: LevelFilter,
}

impl InspectArgs {
    fn request_filter(&self) -> RequestFilter {
        RequestFilter {
            search: self.search.clone(),
            method: self.method.clone(),
            status: self.status,
        }
    }

    fn log_filter(&self) -> LogFilter {
        LogFilter {
            search: self.search.clone(),
            level: self.level,
        }
    }
}

#[derive(Args)]
pub struct ProbeArgs {
    /// URLs to request
    #[arg(required = true)]
    urls: Vec<String>,

    /// Relay WebSocket URL, e.g. ws://192.168.1.100:5051
    #[arg(short, long)]
    relay: Option<String>,

    /// Times to request each URL
    #[arg(short = 'n', long, default_value_t = 1)]
    repeat: usize,
}

fn create_spinner(msg: &str) -> ProgressBar {
    let pb = ProgressBar::new_spinner();
    pb.set_style(
        ProgressStyle::default_spinner()
            .tick_chars("⠁⠂⠄⡀⢀⠠⠐⠈ ")
            .template("{spinner:.cyan} {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner()),
    );
    pb.set_message(msg.to_string());
    pb.enable_steady_tick(Duration::from_millis(80));
    pb
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let settings = match netscope_core::load_settings(cli.config.as_deref()) {
        Ok(settings) => settings,
        Err(e) => {
            eprintln!("{} {}", style("Error:").red().bold(), e);
            std::process::exit(1);
        }
    };

    match cli.command {
        Command::Inspect(args) => inspect::run(settings, args).await,
        Command::Probe(args) => probe::run(settings, args).await,
    }
}
