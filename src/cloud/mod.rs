//! Device-to-cloud connectivity for embedded systems.
//!
//! This module keeps one persistent, authenticated connection from a
//! device to a cloud endpoint and layers two messaging models on top of
//! it: request/response with correlation keys, and topic-based
//! publish/subscribe for server-pushed updates.
//!
//! # Architecture
//!
//! - [`device::Device`] is the public facade: `init`, config getters,
//!   `get`/`set`/`on` on data paths, summary/parms operations, `update`.
//! - [`duplex::DuplexHandler`] is the engine underneath: connection state
//!   machine, handshake, heartbeat, and the inbound demultiplexer.
//! - [`queue::SendQueue`] correlates outbound requests with responses;
//!   [`events::EventTable`] dispatches push events to subscriptions;
//!   [`envelope`] is the JSON codec between them and the wire.
//!
//! Everything is bounded: fixed packet buffers, a 16-entry pending-request
//! table, a 16-entry subscription map. Overflow is a typed error, never a
//! reallocation or a panic.

#![deny(unsafe_code)]

use heapless::String;

pub mod device;
pub mod duplex;
pub mod envelope;
pub mod error;
pub mod events;
pub mod queue;


pub use envelope::Value;
pub use error::Error;

/// Maximum length of a device identifier.
pub const DEVICE_ID_SIZE: usize = 32;
/// Maximum length of an API key.
pub const API_KEY_SIZE: usize = 32;
/// Maximum length of a device access token.
pub const TOKEN_SIZE: usize = 512;
/// Maximum length of a network SSID.
pub const SSID_SIZE: usize = 32;
/// Maximum length of a network passphrase.
pub const PASSPHRASE_SIZE: usize = 32;
/// Maximum length of a task name.
pub const TASK_SIZE: usize = 32;
/// Maximum length of a serialized payload.
pub const PACKET_SIZE: usize = 512;
/// Maximum length of a complete wire frame (payload plus header).
pub const FRAME_SIZE: usize = PACKET_SIZE + 96;
/// Maximum length of a subscription topic, including the `"data/"` prefix.
pub const TOPIC_SIZE: usize = 96;
/// Maximum number of simultaneously outstanding requests.
pub const SENDQUEUE_SIZE: usize = 16;
/// Maximum number of per-path subscriptions.
pub const MAX_SUBSCRIPTIONS: usize = 16;
/// Interval between heartbeat probes while a session is active.
pub const PING_INTERVAL_MS: u64 = 25_000;
/// Consecutive unanswered heartbeats that drop the session.
pub const MAX_MISSED_PINGS: u8 = 3;
/// Default bound on how long a request waits for its response.
pub const DEFAULT_REQUEST_TIMEOUT_MS: u64 = 20_000;

/// The three-level connectivity state.
///
/// Exactly one value is active at a time per device. The engine starts in
/// [`ConnectionState::LinkDown`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    /// No network link.
    LinkDown,
    /// Network link is up; no cloud session yet.
    LinkUp,
    /// Authenticated cloud session is active.
    SessionActive,
}

impl ConnectionState {
    /// Display string for the state.
    pub fn as_str(&self) -> &'static str {
        match self {
            ConnectionState::LinkDown => "LINK_DOWN",
            ConnectionState::LinkUp => "LINK_UP",
            ConnectionState::SessionActive => "SESSION_ACTIVE",
        }
    }
}

#[cfg(feature = "defmt")]
impl defmt::Format for ConnectionState {
    fn format(&self, f: defmt::Formatter) {
        defmt::write!(f, "{}", self.as_str());
    }
}

/// The immutable device identity and credentials.
///
/// Set once at initialization, read-only afterward. Field sizes are fixed;
/// an input exceeding its buffer is rejected with [`Error::Serialization`]
/// at construction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    device_id: String<DEVICE_ID_SIZE>,
    api_key: String<API_KEY_SIZE>,
    token: String<TOKEN_SIZE>,
    ssid: String<SSID_SIZE>,
    passphrase: String<PASSPHRASE_SIZE>,
}

impl Config {
    /// Construct a full identity: credentials plus network parameters.
    pub fn new(
        device_id: &str,
        api_key: &str,
        token: &str,
        ssid: &str,
        passphrase: &str,
    ) -> Result<Self, Error> {
        Ok(Self {
            device_id: String::try_from(device_id).map_err(|_| Error::Serialization)?,
            api_key: String::try_from(api_key).map_err(|_| Error::Serialization)?,
            token: String::try_from(token).map_err(|_| Error::Serialization)?,
            ssid: String::try_from(ssid).map_err(|_| Error::Serialization)?,
            passphrase: String::try_from(passphrase).map_err(|_| Error::Serialization)?,
        })
    }

    /// Construct a credentials-only identity, for hosts that manage the
    /// network link themselves. SSID and passphrase are left empty.
    pub fn with_credentials(device_id: &str, api_key: &str, token: &str) -> Result<Self, Error> {
        Self::new(device_id, api_key, token, "", "")
    }

    /// The device identifier.
    pub fn device_id(&self) -> &str {
        &self.device_id
    }

    /// The project API key.
    pub fn api_key(&self) -> &str {
        &self.api_key
    }

    /// The device access token.
    pub fn token(&self) -> &str {
        &self.token
    }

    /// The network SSID.
    pub fn ssid(&self) -> &str {
        &self.ssid
    }

    /// The network passphrase.
    pub fn passphrase(&self) -> &str {
        &self.passphrase
    }
}

/// What a handler is invoked with.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Event<'a> {
    /// A connectivity transition, carrying the new state.
    Connection(ConnectionState),
    /// The outcome of a request: the response value, or why it failed.
    Response(Result<Value<'a>, Error>),
    /// A server-pushed update for a subscribed topic.
    Update(Value<'a>),
}

/// A stored callback invoked by the engine.
///
/// Handlers run synchronously inside
/// [`device::Device::update`]; they must not block, since blocking stalls
/// all connection processing including the heartbeat.
pub trait Handler {
    /// Invoke the handler.
    fn call(&mut self, event: Event<'_>);
}

/// Plain function pointers are handlers, for callers that do not need to
/// capture state.
impl Handler for fn(Event<'_>) {
    fn call(&mut self, event: Event<'_>) {
        (self)(event)
    }
}
