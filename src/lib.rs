//! # cloudlink - Rust device-to-cloud SDK
//!
//! A Rust library that keeps an embedded device connected to a remote cloud
//! endpoint and layers a request/response and publish/subscribe messaging
//! model on top of that connection. This library is designed for embedded
//! systems and supports `no_std` environments.
//!
//! ## Features
//!
//! ### Connection lifecycle
//! - Three-level connectivity tracking: link down, link up, cloud session active
//! - Authentication handshake driven automatically when the link comes up
//! - Periodic heartbeat with failure detection and session-loss notification
//!
//! ### Messaging
//! - Correlation of asynchronous outbound requests with their responses
//! - Bounded pending-request table with explicit backpressure
//! - Topic-based dispatch of server-pushed updates to registered handlers
//!
//! ## Design
//!
//! The engine is single-threaded and cooperative. The host owns the main
//! loop and pumps the engine by calling [`cloud::device::Device::update`]
//! with a monotonic millisecond timestamp; all heartbeat timing, request
//! expiry, and inbound dispatch happen inside that call. The transport is
//! consumed as a black-box framed duplex channel through the
//! [`transport::Channel`] trait, so the library works over WebSockets, raw
//! TCP framing, or anything else that can move whole frames.
//!
//! ## Usage
//!
//! Add this to your `Cargo.toml`:
//!
//! ```toml
//! [dependencies]
//! cloudlink = "0.1.0"
//! ```
//!
//! ### Connecting a device
//!
//! ```rust,no_run
//! use cloudlink::cloud::{Config, Event};
//! use cloudlink::cloud::device::Device;
//! # use cloudlink::transport::Channel;
//! # struct MockChannel;
//! # impl Channel for MockChannel {
//! #     type Error = ();
//! #     fn send(&mut self, _frame: &[u8]) -> Result<(), Self::Error> { Ok(()) }
//! #     fn receive(&mut self, _buf: &mut [u8]) -> Result<usize, Self::Error> { Ok(0) }
//! # }
//!
//! fn on_event(event: Event<'_>) {
//!     // react to responses and pushed updates
//!     let _ = event;
//! }
//!
//! let channel = MockChannel;
//! let config = Config::new("dev1", "key1", "tok1", "ssid", "pass").unwrap();
//! let mut device: Device<MockChannel, fn(Event<'_>)> = Device::init(channel, config);
//!
//! device.on_connection(on_event as fn(Event<'_>));
//! device.link_up(0);
//!
//! // Host main loop: pump the engine with a monotonic clock.
//! // loop {
//! //     device.update(now_ms());
//! // }
//! ```
//!
//! ## Platform Support
//!
//! This library is designed to work on:
//! - Embedded microcontrollers (ARM Cortex-M, RISC-V, etc.)
//! - Linux-based IoT devices (Raspberry Pi, etc.)
//! - Any platform supporting Rust's `core` library
//!
//! ## Optional Features
//!
//! - `std`: Enable standard library support (default: disabled)
//! - `defmt`: Enable defmt logging support for embedded debugging

#![cfg_attr(not(feature = "std"), no_std)]
#![deny(missing_docs)]
#![warn(missing_debug_implementations)]

/// Transport abstraction consumed by the connection engine.
///
/// The engine never opens sockets itself; it sends and receives whole
/// frames through a host-provided channel implementing these traits.
pub mod transport;

/// Cloud connectivity layer: connection lifecycle, request/response
/// correlation, and topic subscription dispatch.
pub mod cloud;
