//! The device facade: the public surface applications talk to.
//!
//! The facade owns the device identity and the engine, and routes every
//! operation through the same funnel: build an envelope, serialize it,
//! reserve a correlation slot (or register a subscription), and hand the
//! frame to the channel. It has no logic of its own beyond that routing.

use crate::transport::Channel;

use super::duplex::DuplexHandler;
use super::envelope::{self, Envelope, Value};
use super::error::Error;
use super::events::Slot;
use super::{Config, ConnectionState, Handler};

/// Task name for reading a data path.
pub const TASK_DATA_GET: &str = "/device/data/get";
/// Task name for writing a data path.
pub const TASK_DATA_SET: &str = "/device/data/set";
/// Task name for reading the device summary.
pub const TASK_SUMMARY_GET: &str = "/device/summary/get";
/// Task name for writing the device summary.
pub const TASK_SUMMARY_SET: &str = "/device/summary/set";
/// Task name for reading the device parms.
pub const TASK_PARMS_GET: &str = "/device/parms/get";
/// Task name for writing the device parms.
pub const TASK_PARMS_SET: &str = "/device/parms/set";

/// A device connected to the cloud.
///
/// One instance per physical device. Construction performs no network
/// action: connectivity is driven by the host's link layer through
/// [`Device::link_up`] / [`Device::link_down`], and all processing happens
/// inside [`Device::update`].
///
/// # Handlers
///
/// Every asynchronous outcome is delivered through the [`Handler`] the
/// caller supplied. Handlers run inside [`Device::update`] on the host's
/// thread; they must not block, and they cannot reach back into the
/// device while it is borrowed. The supported pattern for follow-up
/// requests is to record intent in the handler and issue the request
/// after `update` returns.
pub struct Device<C: Channel, H: Handler> {
    config: Config,
    duplex: DuplexHandler<C, H>,
}

impl<C: Channel, H: Handler> Device<C, H> {
    /// Construct a device from its identity and a channel to the cloud.
    ///
    /// Performs no network action.
    pub fn init(channel: C, config: Config) -> Self {
        Self {
            config,
            duplex: DuplexHandler::new(channel),
        }
    }

    /// Current connection state.
    pub fn state(&self) -> ConnectionState {
        self.duplex.state()
    }

    /// Current connection state as a display string.
    pub fn stringified_state(&self) -> &'static str {
        self.duplex.state().as_str()
    }

    /// The device identity supplied at construction.
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// The device identifier.
    pub fn device_id(&self) -> &str {
        self.config.device_id()
    }

    /// The project API key.
    pub fn api_key(&self) -> &str {
        self.config.api_key()
    }

    /// The device access token.
    pub fn token(&self) -> &str {
        self.config.token()
    }

    /// The network SSID, when the host supplied one.
    pub fn ssid(&self) -> &str {
        self.config.ssid()
    }

    /// The network passphrase, when the host supplied one.
    pub fn passphrase(&self) -> &str {
        self.config.passphrase()
    }

    /// Set how long a request may wait for its response before it is
    /// failed with [`Error::Timeout`]. Default is
    /// [`DEFAULT_REQUEST_TIMEOUT_MS`](super::DEFAULT_REQUEST_TIMEOUT_MS).
    pub fn set_request_timeout(&mut self, timeout_ms: u64) {
        self.duplex.set_request_timeout(timeout_ms);
    }

    /// Notify the engine that the network link came up.
    ///
    /// Called by the host's link-layer glue. Starts the cloud handshake.
    pub fn link_up(&mut self, now: u64) {
        self.duplex.link_up(&self.config, now);
    }

    /// Notify the engine that the network link went down.
    pub fn link_down(&mut self) {
        self.duplex.link_down();
    }

    /// Register the handler invoked when the cloud session is established
    /// or lost. Single slot; registering again replaces the handler.
    ///
    /// The handler receives [`Event::Connection`](super::Event::Connection)
    /// with the new state on every transition into or out of
    /// [`ConnectionState::SessionActive`].
    pub fn on_connection(&mut self, handler: H) {
        self.duplex.set_handler(Slot::Connection, handler);
    }

    /// Register the handler invoked when the network link comes up or
    /// goes down. Single slot; registering again replaces the handler.
    pub fn on_link_connection(&mut self, handler: H) {
        self.duplex.set_handler(Slot::Link, handler);
    }

    /// Register the handler invoked when the cloud pushes a summary change.
    pub fn on_summary_updated(&mut self, handler: H) {
        self.duplex.set_handler(Slot::SummaryUpdated, handler);
    }

    /// Register the handler invoked when the cloud pushes a parms change.
    pub fn on_parms_updated(&mut self, handler: H) {
        self.duplex.set_handler(Slot::ParmsUpdated, handler);
    }

    /// Fetch the device summary. The response arrives through `handler`.
    pub fn get_summary(&mut self, handler: H, now: u64) -> Result<u32, Error> {
        self.request(TASK_SUMMARY_GET, None, None, handler, now)
    }

    /// Fetch the device parms. The response arrives through `handler`.
    pub fn get_parms(&mut self, handler: H, now: u64) -> Result<u32, Error> {
        self.request(TASK_PARMS_GET, None, None, handler, now)
    }

    /// Replace the device summary with `summary`.
    pub fn set_summary(&mut self, summary: Value<'_>, handler: H, now: u64) -> Result<u32, Error> {
        self.request(TASK_SUMMARY_SET, None, Some(summary), handler, now)
    }

    /// Replace the device parms with `parms`.
    pub fn set_parms(&mut self, parms: Value<'_>, handler: H, now: u64) -> Result<u32, Error> {
        self.request(TASK_PARMS_SET, None, Some(parms), handler, now)
    }

    /// Read the value at a data path. The response arrives through
    /// `handler`; the returned correlation key identifies the request.
    pub fn get(&mut self, path: &str, handler: H, now: u64) -> Result<u32, Error> {
        self.request(TASK_DATA_GET, Some(path), None, handler, now)
    }

    /// Write `data` to a data path. The acknowledgement arrives through
    /// `handler`; the returned correlation key identifies the request.
    pub fn set(
        &mut self,
        path: &str,
        data: Value<'_>,
        handler: H,
        now: u64,
    ) -> Result<u32, Error> {
        self.request(TASK_DATA_SET, Some(path), Some(data), handler, now)
    }

    /// Subscribe to updates pushed for a data path.
    ///
    /// The handler is registered under the topic `"data/" + path` and
    /// persists for the life of the device; subscribing the same path
    /// again replaces it. Updates arrive as
    /// [`Event::Update`](super::Event::Update).
    pub fn on(&mut self, path: &str, handler: H) -> Result<(), Error> {
        self.duplex.subscribe(&self.config, path, handler)
    }

    /// Pump the engine. Must be called regularly from the host main loop
    /// with a monotonic millisecond timestamp.
    ///
    /// Drains inbound frames from the channel, resolves responses against
    /// their pending requests, dispatches push events to subscriptions,
    /// expires stale requests, and drives the heartbeat. All registered
    /// handlers run inside this call.
    pub fn update(&mut self, now: u64) {
        self.duplex.update(&self.config, now);
    }

    fn request(
        &mut self,
        task: &str,
        path: Option<&str>,
        data: Option<Value<'_>>,
        handler: H,
        now: u64,
    ) -> Result<u32, Error> {
        let body = Envelope {
            device_id: self.config.device_id(),
            path,
            data,
            event: None,
        };
        let payload = envelope::to_packet(&body)?;
        self.duplex.send_request(task, &payload, handler, now)
    }
}

impl<C: Channel, H: Handler> core::fmt::Debug for Device<C, H> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("Device")
            .field("device_id", &self.config.device_id())
            .field("state", &self.duplex.state())
            .finish_non_exhaustive()
    }
}
