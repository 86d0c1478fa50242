//! Pending-request table: correlation of outbound requests with their
//! eventual responses.
//!
//! The table is deliberately bounded at
//! [`SENDQUEUE_SIZE`](crate::cloud::SENDQUEUE_SIZE) outstanding entries.
//! A reserve attempt against a full table fails with [`Error::Capacity`]
//! instead of evicting or blocking; the caller treats that as
//! backpressure. Entries leave the table exactly one way each: resolved by
//! a response, expired by timeout, or failed en masse on session loss.

use heapless::{String, Vec};

use super::envelope::Value;
use super::error::Error;
use super::{Event, Handler, PACKET_SIZE, SENDQUEUE_SIZE, TASK_SIZE};

/// The range reserved for request correlation keys.
///
/// Keys `1..=0x7FFF_FFFF` belong to the pending-request table; the range
/// above it is reserved for engine-internal exchanges (the handshake).
/// `0` marks unsolicited push frames and is never allocated. This split is
/// an implementation detail and should not be relied upon.
pub const CORRELATION_RANGE: u32 = 0x7FFF_FFFF;

/// One outstanding request awaiting its response.
pub struct PendingRequest<H> {
    /// Correlation key, unique among currently outstanding entries.
    pub key: u32,
    /// The task the request was sent under.
    pub task: String<TASK_SIZE>,
    /// The serialized envelope that was sent.
    pub payload: String<PACKET_SIZE>,
    /// Handler to invoke with the response or failure.
    pub handler: H,
    /// Timestamp (host milliseconds) the request was submitted at.
    pub submitted_at: u64,
}

/// Bounded table of outstanding requests.
pub struct SendQueue<H> {
    entries: Vec<PendingRequest<H>, SENDQUEUE_SIZE>,
    next_key: u32,
}

impl<H: Handler> SendQueue<H> {
    /// Create an empty queue.
    pub fn new() -> Self {
        Self {
            entries: Vec::new(),
            next_key: 1,
        }
    }

    /// Number of outstanding requests.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether no requests are outstanding.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Whether the table is at capacity.
    pub fn is_full(&self) -> bool {
        self.entries.is_full()
    }

    /// Whether a key is currently outstanding.
    pub fn contains(&self, key: u32) -> bool {
        self.entries.iter().any(|e| e.key == key)
    }

    /// Reserve a correlation slot for an outbound request.
    ///
    /// Fails with [`Error::Capacity`] when
    /// [`SENDQUEUE_SIZE`](crate::cloud::SENDQUEUE_SIZE) entries are already
    /// outstanding, and with [`Error::Serialization`] when the task name
    /// does not fit its fixed buffer.
    pub fn reserve(
        &mut self,
        task: &str,
        payload: &str,
        handler: H,
        now: u64,
    ) -> Result<u32, Error> {
        if self.entries.is_full() {
            return Err(Error::Capacity);
        }
        let key = self.allocate_key();
        let entry = PendingRequest {
            key,
            task: String::try_from(task).map_err(|_| Error::Serialization)?,
            payload: String::try_from(payload).map_err(|_| Error::Serialization)?,
            handler,
            submitted_at: now,
        };
        self.entries.push(entry).map_err(|_| Error::Capacity)?;
        Ok(key)
    }

    /// Resolve an outstanding request with its outcome.
    ///
    /// Removes the entry and invokes its handler. A lookup miss (late
    /// response after a timeout-driven removal, or a key this table never
    /// issued) is a silent no-op; returns whether an entry was resolved.
    pub fn resolve(&mut self, key: u32, outcome: Result<Value<'_>, Error>) -> bool {
        match self.entries.iter().position(|e| e.key == key) {
            Some(idx) => {
                let mut entry = self.entries.swap_remove(idx);
                entry.handler.call(Event::Response(outcome));
                true
            }
            None => false,
        }
    }

    /// Remove an entry without invoking its handler.
    ///
    /// Used to release a slot when the send itself failed and the error is
    /// surfaced synchronously to the caller instead.
    pub fn take(&mut self, key: u32) -> Option<PendingRequest<H>> {
        let idx = self.entries.iter().position(|e| e.key == key)?;
        Some(self.entries.swap_remove(idx))
    }

    /// Fail every request older than `timeout_ms` with [`Error::Timeout`].
    pub fn expire(&mut self, now: u64, timeout_ms: u64) {
        let mut idx = 0;
        while idx < self.entries.len() {
            if now.saturating_sub(self.entries[idx].submitted_at) >= timeout_ms {
                let mut entry = self.entries.swap_remove(idx);
                entry.handler.call(Event::Response(Err(Error::Timeout)));
            } else {
                idx += 1;
            }
        }
    }

    /// Fail every outstanding request with `error` and clear the table.
    ///
    /// Each handler is invoked exactly once. Used on session loss so no
    /// caller is left waiting for a response that can never arrive.
    pub fn fail_all(&mut self, error: Error) {
        while let Some(mut entry) = self.entries.pop() {
            entry.handler.call(Event::Response(Err(error)));
        }
    }

    fn allocate_key(&mut self) -> u32 {
        // Monotonic within the request range; on wrap, keys still
        // outstanding are skipped to keep live keys unique.
        loop {
            let key = self.next_key;
            self.next_key = if self.next_key >= CORRELATION_RANGE {
                1
            } else {
                self.next_key + 1
            };
            if !self.contains(key) {
                return key;
            }
        }
    }
}

impl<H: Handler> Default for SendQueue<H> {
    fn default() -> Self {
        Self::new()
    }
}

impl<H> core::fmt::Debug for PendingRequest<H> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("PendingRequest")
            .field("key", &self.key)
            .field("task", &self.task.as_str())
            .field("submitted_at", &self.submitted_at)
            .finish_non_exhaustive()
    }
}

impl<H> core::fmt::Debug for SendQueue<H> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("SendQueue")
            .field("outstanding", &self.entries.len())
            .field("next_key", &self.next_key)
            .finish_non_exhaustive()
    }
}
