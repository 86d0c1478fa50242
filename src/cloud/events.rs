//! Event and subscription dispatch tables.
//!
//! Two storage tiers back the publish/subscribe side of the engine: a
//! small fixed array for the well-known connection- and config-level
//! handlers, and a bounded map keyed by arbitrary topic strings for
//! per-path data subscriptions. Entries live as long as the device object;
//! registering a topic twice replaces the earlier handler.

use heapless::{FnvIndexMap, String};

use super::envelope::Value;
use super::error::Error;
use super::{Event, Handler, MAX_SUBSCRIPTIONS, TOPIC_SIZE};

/// The well-known handler slots.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Slot {
    /// Cloud session established or lost.
    Connection = 0,
    /// Link layer came up or went down.
    Link = 1,
    /// The device summary changed on the cloud side.
    SummaryUpdated = 2,
    /// The device parms changed on the cloud side.
    ParmsUpdated = 3,
}

const SLOT_COUNT: usize = 4;

/// Derive the subscription topic for a data path.
///
/// Both the registration side ([`EventTable::subscribe`]) and the dispatch
/// side go through this one function, so the two can never disagree on the
/// key. A path too long for the topic buffer is rejected up front.
pub fn data_topic(path: &str) -> Result<String<TOPIC_SIZE>, Error> {
    let mut topic: String<TOPIC_SIZE> = String::new();
    topic.push_str("data/").map_err(|_| Error::Serialization)?;
    topic.push_str(path).map_err(|_| Error::Serialization)?;
    Ok(topic)
}

/// Fixed-capacity table mapping topics to handlers.
pub struct EventTable<H> {
    slots: [Option<H>; SLOT_COUNT],
    topics: FnvIndexMap<String<TOPIC_SIZE>, H, MAX_SUBSCRIPTIONS>,
}

impl<H: Handler> EventTable<H> {
    /// Create an empty table.
    pub fn new() -> Self {
        Self {
            slots: [None, None, None, None],
            topics: FnvIndexMap::new(),
        }
    }

    /// Register or replace the handler for a well-known slot.
    pub fn set_slot(&mut self, slot: Slot, handler: H) {
        self.slots[slot as usize] = Some(handler);
    }

    /// Invoke the handler for a well-known slot, if one is registered.
    ///
    /// Returns whether a handler ran.
    pub fn dispatch_slot(&mut self, slot: Slot, event: Event<'_>) -> bool {
        match self.slots[slot as usize].as_mut() {
            Some(handler) => {
                handler.call(event);
                true
            }
            None => false,
        }
    }

    /// Register or replace the handler for a topic.
    ///
    /// Fails with [`Error::Capacity`] when the table is full and the topic
    /// is new; existing registrations are never evicted.
    pub fn subscribe(&mut self, topic: &str, handler: H) -> Result<(), Error> {
        let key = String::try_from(topic).map_err(|_| Error::Serialization)?;
        self.topics.insert(key, handler).map_err(|_| Error::Capacity)?;
        Ok(())
    }

    /// Dispatch a push event to the handler registered for `topic`.
    ///
    /// An event with no matching subscription is dropped; returns whether
    /// a handler ran.
    pub fn dispatch(&mut self, topic: &str, value: Value<'_>) -> bool {
        // Find the handler by comparing string contents; the bounded map
        // key type cannot be looked up by a plain &str.
        let handler = self
            .topics
            .iter_mut()
            .find(|(key, _)| key.as_str() == topic)
            .map(|(_, handler)| handler);
        match handler {
            Some(handler) => {
                handler.call(Event::Update(value));
                true
            }
            None => false,
        }
    }

    /// Iterate over the registered topic keys.
    pub fn topics(&self) -> impl Iterator<Item = &str> {
        self.topics.keys().map(|k| k.as_str())
    }

    /// Number of registered topic subscriptions.
    pub fn len(&self) -> usize {
        self.topics.len()
    }

    /// Whether no topic subscriptions are registered.
    pub fn is_empty(&self) -> bool {
        self.topics.is_empty()
    }
}

impl<H: Handler> Default for EventTable<H> {
    fn default() -> Self {
        Self::new()
    }
}

// Manual impl: handlers are opaque, so only the registration shape shows.
impl<H> core::fmt::Debug for EventTable<H> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        let slots = self.slots.iter().filter(|s| s.is_some()).count();
        f.debug_struct("EventTable")
            .field("slots", &slots)
            .field("topics", &self.topics.len())
            .finish_non_exhaustive()
    }
}
