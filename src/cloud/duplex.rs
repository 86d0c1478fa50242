//! The connection and messaging engine.
//!
//! This is the stateful heart of the crate: it tracks the three-level
//! connectivity state, runs the authentication handshake and the periodic
//! heartbeat, demultiplexes inbound frames into responses and push events,
//! and gates outbound sends on session availability.
//!
//! Everything here runs synchronously inside [`DuplexHandler::update`],
//! driven by the host main loop. There are no threads and no timers; the
//! host supplies a monotonic millisecond clock on every call.

use heapless::{String, Vec};

use crate::transport::Channel;

use super::envelope::{self, AuthPayload, Envelope, Value};
use super::error::Error;
use super::events::{EventTable, Slot, data_topic};
use super::queue::SendQueue;
use super::{
    Config, ConnectionState, Event, FRAME_SIZE, Handler, MAX_MISSED_PINGS, MAX_SUBSCRIPTIONS,
    PING_INTERVAL_MS, TOPIC_SIZE,
};

/// The correlation id used by the authentication handshake.
///
/// It sits above [`CORRELATION_RANGE`](super::queue::CORRELATION_RANGE),
/// outside the pending-request table, so the handshake is exempt from both
/// the capacity bound and the session gate. This is an implementation
/// detail and should not be relied upon.
pub const HANDSHAKE_KEY: u32 = 0x8000_0000;

/// Task name of the authentication handshake request.
pub const TASK_HANDSHAKE: &str = "/handshake";
/// Task name of the heartbeat probe and its acknowledgement.
pub const TASK_PING: &str = "/ping";
/// Task name of the subscription registration request.
pub const TASK_SUBSCRIBE: &str = "/event/subscribe";

/// Push event class for data-path updates.
pub const EVENT_DATA: &str = "data";
/// Push event class for summary changes.
pub const EVENT_SUMMARY_UPDATED: &str = "summaryUpdated";
/// Push event class for parms changes.
pub const EVENT_PARMS_UPDATED: &str = "parmsUpdated";

/// The connection lifecycle and messaging correlation engine.
///
/// Owns the channel, the pending-request table, the subscription tables,
/// and the connection state. One instance per device, per connection.
pub struct DuplexHandler<C: Channel, H: Handler> {
    channel: C,
    state: ConnectionState,
    queue: SendQueue<H>,
    events: EventTable<H>,
    handshake_key: Option<u32>,
    handshake_sent_at: u64,
    last_ping_at: u64,
    pings_unanswered: u8,
    request_timeout_ms: u64,
}

impl<C: Channel, H: Handler> DuplexHandler<C, H> {
    /// Create an engine over a channel. Starts in
    /// [`ConnectionState::LinkDown`]; no network action is taken.
    pub fn new(channel: C) -> Self {
        Self {
            channel,
            state: ConnectionState::LinkDown,
            queue: SendQueue::new(),
            events: EventTable::new(),
            handshake_key: None,
            handshake_sent_at: 0,
            last_ping_at: 0,
            pings_unanswered: 0,
            request_timeout_ms: super::DEFAULT_REQUEST_TIMEOUT_MS,
        }
    }

    /// Current connection state.
    pub fn state(&self) -> ConnectionState {
        self.state
    }

    /// Number of requests currently awaiting a response.
    pub fn outstanding(&self) -> usize {
        self.queue.len()
    }

    /// Set how long a request may wait for its response before it is
    /// failed with [`Error::Timeout`]. Also bounds handshake retries.
    pub fn set_request_timeout(&mut self, timeout_ms: u64) {
        self.request_timeout_ms = timeout_ms;
    }

    /// Register or replace the handler for a well-known slot.
    pub fn set_handler(&mut self, slot: Slot, handler: H) {
        self.events.set_slot(slot, handler);
    }

    /// Link layer came up.
    ///
    /// Idempotent. Moves to [`ConnectionState::LinkUp`] and starts the
    /// authentication handshake; the session becomes active once the cloud
    /// acknowledges it.
    pub fn link_up(&mut self, config: &Config, now: u64) {
        if self.state != ConnectionState::LinkDown {
            return;
        }
        self.state = ConnectionState::LinkUp;
        #[cfg(feature = "defmt")]
        defmt::info!("Link up, starting handshake");
        self.events
            .dispatch_slot(Slot::Link, Event::Connection(ConnectionState::LinkUp));
        self.send_handshake(config, now);
    }

    /// Link layer went down.
    ///
    /// Idempotent. Every outstanding request fails once with
    /// [`Error::ConnectionLost`]; the heartbeat and any pending handshake
    /// are disarmed so no orphaned timing survives the outage.
    pub fn link_down(&mut self) {
        if self.state == ConnectionState::LinkDown {
            return;
        }
        let was_active = self.state == ConnectionState::SessionActive;
        self.state = ConnectionState::LinkDown;
        self.handshake_key = None;
        self.pings_unanswered = 0;
        #[cfg(feature = "defmt")]
        defmt::info!("Link down");
        if was_active {
            self.queue.fail_all(Error::ConnectionLost);
            self.events.dispatch_slot(
                Slot::Connection,
                Event::Connection(ConnectionState::LinkDown),
            );
        }
        self.events
            .dispatch_slot(Slot::Link, Event::Connection(ConnectionState::LinkDown));
    }

    /// Cloud handshake completed.
    ///
    /// Idempotent; only meaningful from [`ConnectionState::LinkUp`]. Arms
    /// the heartbeat, notifies the connection handler, and re-registers
    /// every stored subscription with the cloud.
    pub fn session_established(&mut self, config: &Config, now: u64) {
        if self.state != ConnectionState::LinkUp {
            return;
        }
        self.state = ConnectionState::SessionActive;
        self.handshake_key = None;
        self.last_ping_at = now;
        self.pings_unanswered = 0;
        #[cfg(feature = "defmt")]
        defmt::info!("Session established");
        self.events.dispatch_slot(
            Slot::Connection,
            Event::Connection(ConnectionState::SessionActive),
        );
        self.resend_subscriptions(config);
    }

    /// Cloud session dropped without losing the link.
    ///
    /// Idempotent; only fires from [`ConnectionState::SessionActive`], so
    /// repeated failure signals collapse into one transition. Outstanding
    /// requests fail once with [`Error::ConnectionLost`] and are not
    /// replayed when the session comes back.
    pub fn session_lost(&mut self) {
        if self.state != ConnectionState::SessionActive {
            return;
        }
        self.state = ConnectionState::LinkUp;
        self.handshake_key = None;
        self.pings_unanswered = 0;
        #[cfg(feature = "defmt")]
        defmt::warn!("Session lost");
        self.queue.fail_all(Error::ConnectionLost);
        self.events
            .dispatch_slot(Slot::Connection, Event::Connection(ConnectionState::LinkUp));
    }

    /// Reserve a correlation slot and send a request frame.
    ///
    /// Returns the correlation key on success. Fails synchronously with
    /// [`Error::NotConnected`] outside an active session,
    /// [`Error::Capacity`] when 16 requests are already outstanding, and
    /// [`Error::Transport`] when the channel refuses the frame (in which
    /// case the slot just reserved is released again).
    pub fn send_request(
        &mut self,
        task: &str,
        payload: &str,
        handler: H,
        now: u64,
    ) -> Result<u32, Error> {
        if self.state != ConnectionState::SessionActive {
            return Err(Error::NotConnected);
        }
        let key = self.queue.reserve(task, payload, handler, now)?;
        let frame = envelope::compose_frame(key, task, payload)?;
        match self.channel.send(frame.as_bytes()) {
            Ok(()) => Ok(key),
            Err(_) => {
                let _ = self.queue.take(key);
                Err(Error::Transport)
            }
        }
    }

    /// Register a handler for updates on a data path and tell the cloud
    /// about the subscription.
    ///
    /// The handler is stored under the topic `"data/" + path` and persists
    /// for the life of the engine; subscribing the same path again
    /// replaces the handler. The cloud-side registration is sent
    /// immediately when a session is active and replayed on every session
    /// establishment otherwise.
    pub fn subscribe(&mut self, config: &Config, path: &str, handler: H) -> Result<(), Error> {
        let topic = data_topic(path)?;
        self.events.subscribe(&topic, handler)?;
        if self.state == ConnectionState::SessionActive {
            self.send_subscribe_frame(config, path)?;
        }
        Ok(())
    }

    /// Pump the engine: drain inbound frames, expire stale requests, and
    /// drive the heartbeat or handshake for the current state.
    ///
    /// Must be called regularly from the host main loop with a monotonic
    /// millisecond timestamp. A host that stops calling this will see its
    /// requests stall and eventually time out; that is a caller
    /// obligation, not an engine fault.
    pub fn update(&mut self, config: &Config, now: u64) {
        let mut buf = [0u8; FRAME_SIZE];
        loop {
            match self.channel.receive(&mut buf) {
                Ok(0) => break,
                Ok(n) => {
                    let end = n.min(FRAME_SIZE);
                    self.demux(&buf[..end], config, now);
                }
                Err(_) => {
                    // A channel that cannot deliver is a dead session.
                    self.session_lost();
                    break;
                }
            }
        }
        self.queue.expire(now, self.request_timeout_ms);
        match self.state {
            ConnectionState::SessionActive => self.drive_heartbeat(now),
            ConnectionState::LinkUp => self.drive_handshake(config, now),
            ConnectionState::LinkDown => {}
        }
    }

    /// Classify one inbound frame and route it.
    fn demux(&mut self, raw: &[u8], config: &Config, now: u64) {
        let frame = match envelope::parse_frame(raw) {
            Ok(frame) => frame,
            Err(_) => {
                #[cfg(feature = "defmt")]
                defmt::warn!("Dropping unparsable inbound frame");
                return;
            }
        };

        // Heartbeat acknowledgement: any pong clears the miss counter.
        if frame.header.task == TASK_PING {
            self.pings_unanswered = 0;
            return;
        }

        if self.handshake_key == Some(frame.header.id) {
            self.session_established(config, now);
            return;
        }

        if frame.header.id != 0 {
            let outcome = Ok(frame.payload.data.unwrap_or(Value::Null));
            if !self.queue.resolve(frame.header.id, outcome) {
                // Late response after a timeout-driven removal. Not an error.
                #[cfg(feature = "defmt")]
                defmt::debug!("Response for unknown correlation key {}", frame.header.id);
            }
            return;
        }

        let value = frame.payload.data.unwrap_or(Value::Null);
        match frame.payload.event {
            Some(EVENT_DATA) => {
                let Some(path) = frame.payload.path else {
                    #[cfg(feature = "defmt")]
                    defmt::warn!("Dropping data event without a path");
                    return;
                };
                let Ok(topic) = data_topic(path) else {
                    return;
                };
                if !self.events.dispatch(&topic, value) {
                    #[cfg(feature = "defmt")]
                    defmt::debug!("No subscription for topic, dropping update");
                }
            }
            Some(EVENT_SUMMARY_UPDATED) => {
                self.events
                    .dispatch_slot(Slot::SummaryUpdated, Event::Update(value));
            }
            Some(EVENT_PARMS_UPDATED) => {
                self.events
                    .dispatch_slot(Slot::ParmsUpdated, Event::Update(value));
            }
            _ => {
                #[cfg(feature = "defmt")]
                defmt::warn!("Dropping unclassifiable inbound frame");
            }
        }
    }

    fn drive_heartbeat(&mut self, now: u64) {
        if now.saturating_sub(self.last_ping_at) < PING_INTERVAL_MS {
            return;
        }
        if self.pings_unanswered >= MAX_MISSED_PINGS {
            self.session_lost();
            return;
        }
        match envelope::compose_frame(0, TASK_PING, "{}") {
            Ok(frame) => match self.channel.send(frame.as_bytes()) {
                Ok(()) => {
                    self.pings_unanswered += 1;
                    self.last_ping_at = now;
                }
                Err(_) => self.session_lost(),
            },
            Err(_) => {
                #[cfg(feature = "defmt")]
                defmt::warn!("Could not compose ping frame");
            }
        }
    }

    fn drive_handshake(&mut self, config: &Config, now: u64) {
        match self.handshake_key {
            None => self.send_handshake(config, now),
            Some(_) if now.saturating_sub(self.handshake_sent_at) >= self.request_timeout_ms => {
                #[cfg(feature = "defmt")]
                defmt::debug!("Handshake unanswered, retrying");
                self.send_handshake(config, now);
            }
            Some(_) => {}
        }
    }

    fn send_handshake(&mut self, config: &Config, now: u64) {
        let auth = AuthPayload {
            api_key: config.api_key(),
            token: config.token(),
        };
        let Ok(payload) = envelope::to_packet(&auth) else {
            return;
        };
        let Ok(frame) = envelope::compose_frame(HANDSHAKE_KEY, TASK_HANDSHAKE, &payload) else {
            return;
        };
        if self.channel.send(frame.as_bytes()).is_ok() {
            self.handshake_key = Some(HANDSHAKE_KEY);
            self.handshake_sent_at = now;
        }
    }

    fn send_subscribe_frame(&mut self, config: &Config, path: &str) -> Result<(), Error> {
        let body = Envelope {
            device_id: config.device_id(),
            path: Some(path),
            data: None,
            event: Some(EVENT_DATA),
        };
        let payload = envelope::to_packet(&body)?;
        let frame = envelope::compose_frame(0, TASK_SUBSCRIBE, &payload)?;
        self.channel
            .send(frame.as_bytes())
            .map_err(|_| Error::Transport)
    }

    fn resend_subscriptions(&mut self, config: &Config) {
        let mut topics: Vec<String<TOPIC_SIZE>, MAX_SUBSCRIPTIONS> = Vec::new();
        for topic in self.events.topics() {
            if let Ok(copy) = String::try_from(topic) {
                let _ = topics.push(copy);
            }
        }
        for topic in &topics {
            if let Some(path) = topic.strip_prefix("data/") {
                let _ = self.send_subscribe_frame(config, path);
            }
        }
    }
}

// Manual impl: neither the channel nor the handlers are Debug.
impl<C: Channel, H: Handler> core::fmt::Debug for DuplexHandler<C, H> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("DuplexHandler")
            .field("state", &self.state)
            .field("outstanding", &self.queue.len())
            .field("pings_unanswered", &self.pings_unanswered)
            .field("handshake_pending", &self.handshake_key.is_some())
            .finish_non_exhaustive()
    }
}
