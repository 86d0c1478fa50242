//! Shared test support: an in-memory framed channel and a recording handler.

#![allow(dead_code)]

use std::cell::RefCell;
use std::collections::VecDeque;
use std::rc::Rc;

use cloudlink::cloud::{ConnectionState, Error, Event, Handler, Value};
use cloudlink::transport::Channel;

/// Handles into a [`MockChannel`] kept by the test while the device owns
/// the channel itself.
#[derive(Clone, Default)]
pub struct ChannelHooks {
    pub sent: Rc<RefCell<Vec<String>>>,
    pub inbound: Rc<RefCell<VecDeque<String>>>,
    pub fail_sends: Rc<RefCell<bool>>,
}

impl ChannelHooks {
    pub fn channel(&self) -> MockChannel {
        MockChannel {
            hooks: self.clone(),
        }
    }

    pub fn push_inbound(&self, frame: impl Into<String>) {
        self.inbound.borrow_mut().push_back(frame.into());
    }

    pub fn sent_frames(&self) -> Vec<String> {
        self.sent.borrow().clone()
    }

    pub fn sent_count_containing(&self, needle: &str) -> usize {
        self.sent
            .borrow()
            .iter()
            .filter(|f| f.contains(needle))
            .count()
    }

    pub fn set_fail_sends(&self, fail: bool) {
        *self.fail_sends.borrow_mut() = fail;
    }
}

/// An in-memory duplex channel moving whole frames as strings.
pub struct MockChannel {
    hooks: ChannelHooks,
}

impl Channel for MockChannel {
    type Error = ();

    fn send(&mut self, frame: &[u8]) -> Result<(), Self::Error> {
        if *self.hooks.fail_sends.borrow() {
            return Err(());
        }
        let text = String::from_utf8(frame.to_vec()).map_err(|_| ())?;
        self.hooks.sent.borrow_mut().push(text);
        Ok(())
    }

    fn receive(&mut self, buf: &mut [u8]) -> Result<usize, Self::Error> {
        match self.hooks.inbound.borrow_mut().pop_front() {
            Some(frame) => {
                let bytes = frame.as_bytes();
                if bytes.len() > buf.len() {
                    return Err(());
                }
                buf[..bytes.len()].copy_from_slice(bytes);
                Ok(bytes.len())
            }
            None => Ok(0),
        }
    }
}

/// Owned copy of a [`Value`] so events can be inspected after dispatch.
#[derive(Debug, Clone, PartialEq)]
pub enum Owned {
    Null,
    Bool(bool),
    Integer(i64),
    Float(f64),
    Str(String),
}

fn own(value: Value<'_>) -> Owned {
    match value {
        Value::Null => Owned::Null,
        Value::Bool(b) => Owned::Bool(b),
        Value::Integer(i) => Owned::Integer(i),
        Value::Float(f) => Owned::Float(f),
        Value::Str(s) => Owned::Str(s.to_string()),
    }
}

/// Owned copy of an [`Event`].
#[derive(Debug, Clone, PartialEq)]
pub enum Recorded {
    Connection(ConnectionState),
    Response(Result<Owned, Error>),
    Update(Owned),
}

/// A handler that appends everything it sees to a shared log.
#[derive(Clone, Default)]
pub struct Recorder {
    pub log: Rc<RefCell<Vec<Recorded>>>,
}

impl Recorder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<Recorded> {
        self.log.borrow().clone()
    }

    pub fn count(&self, wanted: &Recorded) -> usize {
        self.log.borrow().iter().filter(|e| *e == wanted).count()
    }
}

impl Handler for Recorder {
    fn call(&mut self, event: Event<'_>) {
        let recorded = match event {
            Event::Connection(state) => Recorded::Connection(state),
            Event::Response(Ok(value)) => Recorded::Response(Ok(own(value))),
            Event::Response(Err(e)) => Recorded::Response(Err(e)),
            Event::Update(value) => Recorded::Update(own(value)),
        };
        self.log.borrow_mut().push(recorded);
    }
}
