use std::collections::HashMap;

use crate::{
    events::{Event, EventId},
    store::{LogRecord, RequestRecord},
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IngestOutcome {
    /// Ingestion is paused; the event is gone.
    Dropped,
    /// A new request record was created.
    Inserted,
    /// An existing request record absorbed the event.
    Merged,
    Logged,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Selection {
    Request(EventId),
    Log(EventId),
}

/// Inspector-side session: request records keyed by id, console records, pause flag, selection.
///
/// Records are stored in arrival order; the `*_newest_first` views present them the way the
/// inspector lists them.
#[derive(Debug, Default)]
pub struct SessionStore {
    requests: Vec<RequestRecord>,
    request_index: HashMap<EventId, usize>,
    logs: Vec<LogRecord>,
    log_index: HashMap<EventId, usize>,
    paused: bool,
    selection: Option<Selection>,
}

impl SessionStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn ingest(&mut self, event: Event) -> IngestOutcome {
        if self.paused {
            return IngestOutcome::Dropped;
        }

        match event {
            Event::LogEmitted(log) => {
                self.log_index.insert(log.id.clone(), self.logs.len());
                self.logs.push(log);
                IngestOutcome::Logged
            }
            Event::RequestStarted(started) => match self.request_index.get(&started.id) {
                Some(&index) => {
                    self.requests[index].apply_request(started);
                    IngestOutcome::Merged
                }
                None => {
                    self.insert_request(RequestRecord::pending(started));
                    IngestOutcome::Inserted
                }
            },
            Event::RequestFinished(finished) => match self.request_index.get(&finished.id) {
                Some(&index) => {
                    self.requests[index].apply_response(finished);
                    IngestOutcome::Merged
                }
                None => {
                    self.insert_request(RequestRecord::orphan(finished));
                    IngestOutcome::Inserted
                }
            },
        }
    }

    fn insert_request(&mut self, record: RequestRecord) {
        self.request_index
            .insert(record.id.clone(), self.requests.len());
        self.requests.push(record);
    }

    pub fn clear_all(&mut self) {
        self.requests.clear();
        self.request_index.clear();
        self.logs.clear();
        self.log_index.clear();
        self.selection = None;
    }

    pub fn set_paused(&mut self, paused: bool) {
        self.paused = paused;
    }

    pub fn is_paused(&self) -> bool {
        self.paused
    }

    pub fn request(&self, id: &EventId) -> Option<&RequestRecord> {
        self.request_index.get(id).map(|&i| &self.requests[i])
    }

    pub fn log(&self, id: &EventId) -> Option<&LogRecord> {
        self.log_index.get(id).map(|&i| &self.logs[i])
    }

    pub fn request_count(&self) -> usize {
        self.requests.len()
    }

    pub fn log_count(&self) -> usize {
        self.logs.len()
    }

    pub fn requests_newest_first(&self) -> impl Iterator<Item = &RequestRecord> {
        self.requests.iter().rev()
    }

    pub fn logs_newest_first(&self) -> impl Iterator<Item = &LogRecord> {
        self.logs.iter().rev()
    }

    /// Select a request by id. An unknown id clears the selection.
    pub fn select_request(&mut self, id: &EventId) -> Option<&RequestRecord> {
        self.selection = self
            .request_index
            .contains_key(id)
            .then(|| Selection::Request(id.clone()));
        self.request(id)
    }

    /// Select a console record by id. An unknown id clears the selection.
    pub fn select_log(&mut self, id: &EventId) -> Option<&LogRecord> {
        self.selection = self
            .log_index
            .contains_key(id)
            .then(|| Selection::Log(id.clone()));
        self.log(id)
    }

    pub fn clear_selection(&mut self) {
        self.selection = None;
    }

    pub fn selection(&self) -> Option<&Selection> {
        self.selection.as_ref()
    }
}
