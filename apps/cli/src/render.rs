use console::{StyledObject, style};
use netscope_core::{
    events::LogLevel,
    format::{format_clock_time, format_duration_ms, format_log_args, format_status, to_curl},
    query::{SessionSummary, StatusClass},
    store::{LogRecord, RequestRecord},
};

fn styled_status(record: &RequestRecord) -> StyledObject<String> {
    let text = format!("{:>7}", format_status(record));
    if record.finished_at.is_none() {
        return style(text).dim();
    }
    match StatusClass::of(record) {
        StatusClass::Success => style(text).green(),
        StatusClass::Redirect => style(text).cyan(),
        StatusClass::ClientError => style(text).yellow(),
        StatusClass::ServerError | StatusClass::Error => style(text).red().bold(),
    }
}

fn styled_level(level: LogLevel) -> StyledObject<String> {
    let text = format!("{:<5}", level.as_str());
    match level {
        LogLevel::Error => style(text).red().bold(),
        LogLevel::Warn => style(text).yellow(),
        LogLevel::Info => style(text).cyan(),
        LogLevel::Debug => style(text).dim(),
        LogLevel::Log => style(text),
    }
}

pub fn request_line(record: &RequestRecord) -> String {
    let duration = record
        .duration_ms
        .map(format_duration_ms)
        .unwrap_or_default();
    format!(
        "{} {} {:<7} {} {:>8}  {}",
        style(format_clock_time(&record.started_at)).dim(),
        style("NET").magenta(),
        style(&record.method).bold(),
        styled_status(record),
        style(duration).dim(),
        record.url
    )
}

pub fn log_line(log: &LogRecord) -> String {
    format!(
        "{} {} {} {}",
        style(format_clock_time(&log.timestamp)).dim(),
        style("LOG").blue(),
        styled_level(log.level),
        format_log_args(&log.args)
    )
}

pub fn id_hint(id: &str) -> String {
    style(format!("[{id}]")).dim().to_string()
}

pub fn request_details(record: &RequestRecord) -> String {
    let mut out = String::new();
    out.push_str(&format!(
        "{} {} {}\n",
        style(&record.method).bold(),
        record.url,
        styled_status(record)
    ));
    out.push_str(&format!("{} {}\n", style("id:").dim(), record.id));
    out.push_str(&format!("{} {}\n", style("started:").dim(), record.started_at));
    if let Some(finished) = &record.finished_at {
        out.push_str(&format!("{} {}\n", style("finished:").dim(), finished));
    }
    if let Some(ms) = record.duration_ms {
        out.push_str(&format!("{} {}\n", style("duration:").dim(), format_duration_ms(ms)));
    }
    if let Some(message) = &record.error_message {
        out.push_str(&format!("{} {}\n", style("error:").red(), message));
    }

    let sections = [
        ("Request headers", record.request_headers.as_ref()),
        ("Response headers", record.response_headers.as_ref()),
    ];
    for (title, headers) in sections {
        let Some(headers) = headers else { continue };
        out.push_str(&format!("\n{}\n", style(title).cyan()));
        for (name, value) in headers {
            out.push_str(&format!("  {}: {}\n", style(name).dim(), value));
        }
    }

    let bodies = [
        ("Request body", record.request_body_snippet.as_deref()),
        ("Response body", record.response_body_snippet.as_deref()),
    ];
    for (title, body) in bodies {
        let Some(body) = body else { continue };
        out.push_str(&format!("\n{}\n{}\n", style(title).cyan(), pretty_body(body)));
    }

    out.push_str(&format!("\n{}\n{}\n", style("curl").cyan(), to_curl(record)));
    out
}

pub fn log_details(log: &LogRecord) -> String {
    let mut out = format!(
        "{} {}\n{} {}\n",
        styled_level(log.level),
        log.timestamp,
        style("id:").dim(),
        log.id
    );
    for (index, arg) in log.args.iter().enumerate() {
        let rendered = serde_json::to_string_pretty(arg).unwrap_or_else(|_| arg.to_string());
        out.push_str(&format!("{} {}\n", style(format!("[{index}]")).dim(), rendered));
    }
    if let Some(stack) = &log.stack {
        out.push_str(&format!("\n{}\n{}\n", style("Stack").cyan(), stack));
    }
    out
}

fn pretty_body(body: &str) -> String {
    serde_json::from_str::<serde_json::Value>(body)
        .ok()
        .and_then(|json| serde_json::to_string_pretty(&json).ok())
        .unwrap_or_else(|| body.to_string())
}

pub fn summary(summary: &SessionSummary) -> String {
    let mut out = format!(
        "{} {} requests, {} logs\n",
        style("Session:").dim(),
        style(summary.requests).cyan().bold(),
        style(summary.logs).cyan().bold()
    );
    for class in StatusClass::ALL {
        out.push_str(&format!("  {:<4} {}\n", class.label(), summary.status_count(class)));
    }
    out.push_str(&format!("  {:<4} {}\n", "...", summary.pending));
    out.push_str(&format!("  {} {}\n", style("orphaned:").dim(), summary.orphans));
    for level in LogLevel::ALL {
        let count = summary.level_count(level);
        if count > 0 {
            out.push_str(&format!("  {:<5} {}\n", level.as_str(), count));
        }
    }
    out
}
