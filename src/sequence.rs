//! Request sequencing for superseded async fetches.
//!
//! Every fetch whose answer feeds a form field takes a token first. When the
//! answer arrives it is applied only if its token is still the newest one
//! issued for that field, so a slow response can never overwrite the result
//! of a newer request.

use std::collections::HashMap;
use std::sync::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};

use tracing::debug;

/// Token identifying one issued request for one field.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Ticket {
    field: String,
    seq: u64,
}

impl Ticket {
    pub fn field(&self) -> &str {
        &self.field
    }

    pub fn seq(&self) -> u64 {
        self.seq
    }
}

/// Issues strictly increasing tokens and remembers the newest per field.
#[derive(Debug, Default)]
pub struct RequestSequencer {
    next: AtomicU64,
    latest: Mutex<HashMap<String, u64>>,
}

impl RequestSequencer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Issues a token for `field`, superseding any earlier one.
    pub fn issue(&self, field: &str) -> Ticket {
        let seq = self.next.fetch_add(1, Ordering::Relaxed) + 1;
        let mut latest = self.latest.lock().unwrap_or_else(|e| e.into_inner());
        latest.insert(field.to_string(), seq);
        Ticket {
            field: field.to_string(),
            seq,
        }
    }

    /// Returns `true` if `ticket` is the newest issued for its field.
    pub fn is_current(&self, ticket: &Ticket) -> bool {
        let latest = self.latest.lock().unwrap_or_else(|e| e.into_inner());
        let current = latest.get(&ticket.field) == Some(&ticket.seq);
        if !current {
            debug!(field = %ticket.field, seq = ticket.seq, "discarding superseded response");
        }
        current
    }

    /// Forgets `field`; every outstanding ticket for it becomes stale.
    pub fn cancel(&self, field: &str) {
        let mut latest = self.latest.lock().unwrap_or_else(|e| e.into_inner());
        latest.remove(field);
    }
}

/// A value slot that only accepts the newest response.
#[derive(Debug, Clone)]
pub struct Latest<T> {
    issued: u64,
    applied: u64,
    value: Option<T>,
}

impl<T> Default for Latest<T> {
    fn default() -> Self {
        Self {
            issued: 0,
            applied: 0,
            value: None,
        }
    }
}

impl<T> Latest<T> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Starts a new request and returns its token.
    pub fn begin(&mut self) -> u64 {
        self.issued += 1;
        self.issued
    }

    /// Stores `value` if `token` is the newest issued. Returns whether it was stored.
    pub fn apply(&mut self, token: u64, value: T) -> bool {
        if token != self.issued || token <= self.applied {
            debug!(token, issued = self.issued, "discarding superseded value");
            return false;
        }
        self.applied = token;
        self.value = Some(value);
        true
    }

    /// Returns `true` while the newest request has not been answered.
    pub fn is_pending(&self) -> bool {
        self.issued > self.applied
    }

    pub fn get(&self) -> Option<&T> {
        self.value.as_ref()
    }

    /// Drops the stored value and invalidates outstanding tokens.
    pub fn clear(&mut self) {
        self.issued += 1;
        self.applied = self.issued;
        self.value = None;
    }
}
