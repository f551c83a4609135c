pub mod agent;
pub mod config;
pub mod error;
pub mod events;
pub mod format;
pub mod query;
pub mod relay;
pub mod store;
pub mod workers;

pub use agent::{Agent, InstrumentedClient};
pub use config::{AgentSettings, RelaySettings, Settings, get_config_path, load_settings};
pub use error::{NetscopeError, Result};
pub use events::{Event, EventId, LogLevel};
pub use format::{format_clock_time, format_duration_ms, format_log_args, format_status, to_curl};
pub use query::{LogFilter, RequestFilter, SessionSummary};
pub use relay::{InspectorEndpoint, Relay};
pub use store::{IngestOutcome, RequestRecord, SessionStore, SharedSession};
pub use workers::{SessionIngestWorker, Worker};
