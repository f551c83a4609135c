use std::{
    collections::HashMap,
    sync::{
        Mutex, MutexGuard, PoisonError,
        atomic::{AtomicU64, Ordering},
    },
};

use tokio::time::Instant;

use crate::events::{EventId, Headers};

use super::headers::header_lookup;

/// Opaque handle for one in-flight call, issued in strictly increasing order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CallToken(u64);

#[derive(Debug, Clone, PartialEq)]
pub struct CallMetadata {
    pub id: EventId,
    pub url: String,
    pub started_at: String,
    pub start_time: Instant,
}

/// Where a completion found its identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecoveredVia {
    Token,
    Stashed,
    RequestHeader,
    ResponseHeader,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Recovered {
    pub id: EventId,
    pub via: RecoveredVia,
    /// Present unless the id came from a header and the table had no matching entry.
    pub metadata: Option<CallMetadata>,
}

/// Everything a completion path can offer for finding its identifier, in fallback order.
#[derive(Debug, Default, Clone, Copy)]
pub struct CompletionHints<'a> {
    pub token: Option<CallToken>,
    pub stashed: Option<&'a CallMetadata>,
    pub request_headers: Option<&'a Headers>,
    pub response_headers: Option<&'a Headers>,
}

impl<'a> CompletionHints<'a> {
    pub fn token(token: CallToken) -> Self {
        Self {
            token: Some(token),
            ..Self::default()
        }
    }
}

/// In-flight call metadata keyed by [`CallToken`]. Entries leave the table when their call settles
/// or is abandoned.
#[derive(Debug, Default)]
pub struct CorrelationTable {
    next_token: AtomicU64,
    entries: Mutex<Entries>,
}

#[derive(Debug, Default)]
struct Entries {
    by_token: HashMap<CallToken, CallMetadata>,
    by_id: HashMap<EventId, CallToken>,
}

impl Entries {
    fn remove(&mut self, token: CallToken) -> Option<CallMetadata> {
        let metadata = self.by_token.remove(&token)?;
        self.by_id.remove(&metadata.id);
        Some(metadata)
    }
}

impl CorrelationTable {
    pub fn new() -> Self {
        Self::default()
    }

    fn entries(&self) -> MutexGuard<'_, Entries> {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn register(&self, metadata: CallMetadata) -> CallToken {
        let token = CallToken(self.next_token.fetch_add(1, Ordering::Relaxed));
        let mut entries = self.entries();
        entries.by_id.insert(metadata.id.clone(), token);
        entries.by_token.insert(token, metadata);
        token
    }

    pub fn get(&self, token: CallToken) -> Option<CallMetadata> {
        self.entries().by_token.get(&token).cloned()
    }

    pub fn len(&self) -> usize {
        self.entries().by_token.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Forget `token`. Returns the metadata if the call had not settled yet.
    pub fn release(&self, token: CallToken) -> Option<CallMetadata> {
        self.entries().remove(token)
    }

    fn take_by_id(&self, id: &EventId) -> Option<CallMetadata> {
        let mut entries = self.entries();
        let token = entries.by_id.get(id).copied()?;
        entries.remove(token)
    }

    /// Walk the fallback chain: own token, stashed copy, request-side header, response-side header.
    ///
    /// The matching entry is released from the table. `None` means the completion cannot be
    /// attributed to any call.
    pub fn recover(&self, hints: CompletionHints<'_>, id_header: &str) -> Option<Recovered> {
        if let Some(metadata) = hints.token.and_then(|token| self.release(token)) {
            return Some(Recovered {
                id: metadata.id.clone(),
                via: RecoveredVia::Token,
                metadata: Some(metadata),
            });
        }

        if let Some(stashed) = hints.stashed {
            let _ = self.take_by_id(&stashed.id);
            return Some(Recovered {
                id: stashed.id.clone(),
                via: RecoveredVia::Stashed,
                metadata: Some(stashed.clone()),
            });
        }

        let echoed = [
            (hints.request_headers, RecoveredVia::RequestHeader),
            (hints.response_headers, RecoveredVia::ResponseHeader),
        ];
        for (headers, via) in echoed {
            let Some(value) = headers.and_then(|h| header_lookup(h, id_header)) else {
                continue;
            };
            if value.is_empty() {
                continue;
            }
            let id = EventId::from(value);
            tracing::debug!(%id, ?via, "recovered call id from echoed header");
            return Some(Recovered {
                metadata: self.take_by_id(&id),
                id,
                via,
            });
        }

        None
    }
}
