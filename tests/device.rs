mod common;

use common::{ChannelHooks, MockChannel, Owned, Recorded, Recorder};

use cloudlink::cloud::device::Device;
use cloudlink::cloud::duplex::HANDSHAKE_KEY;
use cloudlink::cloud::{Config, ConnectionState, Error, SENDQUEUE_SIZE, Value};

fn test_config() -> Config {
    Config::new("dev1", "key1", "tok1", "ssid", "pass").unwrap()
}

fn test_device(hooks: &ChannelHooks) -> Device<MockChannel, Recorder> {
    Device::init(hooks.channel(), test_config())
}

fn handshake_response() -> String {
    format!(
        r#"{{"header":{{"id":{},"task":"/handshake"}},"payload":{{}}}}"#,
        HANDSHAKE_KEY
    )
}

fn response_frame(id: u32, task: &str, data: &str) -> String {
    format!(r#"{{"header":{{"id":{id},"task":"{task}"}},"payload":{{"data":{data}}}}}"#)
}

fn push_event(path: &str, data: &str) -> String {
    format!(
        r#"{{"header":{{"id":0,"task":"update"}},"payload":{{"event":"data","path":"{path}","data":{data}}}}}"#
    )
}

fn establish(device: &mut Device<MockChannel, Recorder>, hooks: &ChannelHooks, now: u64) {
    device.link_up(now);
    hooks.push_inbound(handshake_response());
    device.update(now);
    assert_eq!(device.state(), ConnectionState::SessionActive);
}

#[test]
fn init_performs_no_network_action() {
    let hooks = ChannelHooks::default();
    let device = test_device(&hooks);
    assert_eq!(device.state(), ConnectionState::LinkDown);
    assert_eq!(device.stringified_state(), "LINK_DOWN");
    assert!(hooks.sent_frames().is_empty());
}

#[test]
fn config_getters_echo_init_inputs() {
    let hooks = ChannelHooks::default();
    let device = test_device(&hooks);
    assert_eq!(device.device_id(), "dev1");
    assert_eq!(device.api_key(), "key1");
    assert_eq!(device.token(), "tok1");
    assert_eq!(device.ssid(), "ssid");
    assert_eq!(device.passphrase(), "pass");
}

#[test]
fn credentials_only_config_leaves_network_fields_empty() {
    let config = Config::with_credentials("dev1", "key1", "tok1").unwrap();
    assert_eq!(config.device_id(), "dev1");
    assert_eq!(config.ssid(), "");
    assert_eq!(config.passphrase(), "");
}

#[test]
fn oversized_identity_field_is_rejected() {
    let long = "x".repeat(64);
    assert_eq!(
        Config::new(&long, "key1", "tok1", "ssid", "pass"),
        Err(Error::Serialization)
    );
}

#[test]
fn link_up_sends_the_handshake_with_credentials() {
    let hooks = ChannelHooks::default();
    let mut device = test_device(&hooks);
    device.link_up(0);
    assert_eq!(device.state(), ConnectionState::LinkUp);
    let frames = hooks.sent_frames();
    assert_eq!(frames.len(), 1);
    assert!(frames[0].contains(r#""task":"/handshake""#));
    assert!(frames[0].contains(r#""apiKey":"key1""#));
    assert!(frames[0].contains(r#""token":"tok1""#));
}

#[test]
fn handshake_response_establishes_the_session() {
    let hooks = ChannelHooks::default();
    let mut device = test_device(&hooks);
    let connection = Recorder::new();
    device.on_connection(connection.clone());
    establish(&mut device, &hooks, 0);
    assert_eq!(device.stringified_state(), "SESSION_ACTIVE");
    assert_eq!(
        connection.events(),
        vec![Recorded::Connection(ConnectionState::SessionActive)]
    );
}

#[test]
fn link_handler_sees_both_directions() {
    let hooks = ChannelHooks::default();
    let mut device = test_device(&hooks);
    let link = Recorder::new();
    device.on_link_connection(link.clone());
    device.link_up(0);
    device.link_down();
    assert_eq!(
        link.events(),
        vec![
            Recorded::Connection(ConnectionState::LinkUp),
            Recorded::Connection(ConnectionState::LinkDown),
        ]
    );
}

#[test]
fn set_builds_the_documented_envelope_and_resolves() {
    let hooks = ChannelHooks::default();
    let mut device = test_device(&hooks);
    establish(&mut device, &hooks, 0);

    let callback = Recorder::new();
    let key = device
        .set("room/fan", Value::Bool(true), callback.clone(), 0)
        .unwrap();

    let frames = hooks.sent_frames();
    assert_eq!(
        frames.last().unwrap(),
        &format!(
            r#"{{"header":{{"id":{key},"task":"/device/data/set"}},"payload":{{"deviceID":"dev1","path":"room/fan","data":true}}}}"#
        )
    );

    hooks.push_inbound(response_frame(key, "/device/data/set", "true"));
    device.update(1);
    assert_eq!(
        callback.events(),
        vec![Recorded::Response(Ok(Owned::Bool(true)))]
    );

    // The slot was removed: a duplicate response is ignored.
    hooks.push_inbound(response_frame(key, "/device/data/set", "true"));
    device.update(2);
    assert_eq!(callback.events().len(), 1);
}

#[test]
fn get_round_trips_through_its_handler() {
    let hooks = ChannelHooks::default();
    let mut device = test_device(&hooks);
    establish(&mut device, &hooks, 0);

    let callback = Recorder::new();
    let key = device.get("room/temp", callback.clone(), 0).unwrap();
    assert!(
        hooks
            .sent_frames()
            .last()
            .unwrap()
            .contains(r#""task":"/device/data/get""#)
    );

    hooks.push_inbound(response_frame(key, "/device/data/get", "21.5"));
    device.update(1);
    assert_eq!(
        callback.events(),
        vec![Recorded::Response(Ok(Owned::Float(21.5)))]
    );
}

#[test]
fn data_requests_require_an_active_session() {
    let hooks = ChannelHooks::default();
    let mut device = test_device(&hooks);
    let callback = Recorder::new();
    assert_eq!(
        device.set("room/fan", Value::Bool(true), callback.clone(), 0),
        Err(Error::NotConnected)
    );
    device.link_up(0);
    // Link up alone is not enough; the handshake has not completed.
    assert_eq!(
        device.get("room/fan", callback.clone(), 0),
        Err(Error::NotConnected)
    );
    assert!(callback.events().is_empty());
}

#[test]
fn seventeenth_outstanding_request_hits_backpressure() {
    let hooks = ChannelHooks::default();
    let mut device = test_device(&hooks);
    establish(&mut device, &hooks, 0);

    let callback = Recorder::new();
    for _ in 0..SENDQUEUE_SIZE {
        device
            .set("room/fan", Value::Bool(true), callback.clone(), 0)
            .unwrap();
    }
    assert_eq!(
        device.set("room/fan", Value::Bool(true), callback.clone(), 0),
        Err(Error::Capacity)
    );
    // Nothing was evicted and nothing failed.
    assert!(callback.events().is_empty());
}

#[test]
fn unanswered_request_times_out_through_its_handler() {
    let hooks = ChannelHooks::default();
    let mut device = test_device(&hooks);
    establish(&mut device, &hooks, 0);

    let callback = Recorder::new();
    device
        .set("room/fan", Value::Bool(true), callback.clone(), 0)
        .unwrap();
    device.update(19_999);
    assert!(callback.events().is_empty());
    device.update(20_000);
    assert_eq!(
        callback.events(),
        vec![Recorded::Response(Err(Error::Timeout))]
    );
}

#[test]
fn configured_timeout_is_honored() {
    let hooks = ChannelHooks::default();
    let mut device = test_device(&hooks);
    device.set_request_timeout(10_000);
    establish(&mut device, &hooks, 0);

    let callback = Recorder::new();
    device
        .set("room/fan", Value::Bool(true), callback.clone(), 0)
        .unwrap();
    device.update(10_000);
    assert_eq!(
        callback.events(),
        vec![Recorded::Response(Err(Error::Timeout))]
    );
}

#[test]
fn link_loss_fails_every_outstanding_request_exactly_once() {
    let hooks = ChannelHooks::default();
    let mut device = test_device(&hooks);
    let connection = Recorder::new();
    device.on_connection(connection.clone());
    establish(&mut device, &hooks, 0);

    let callback = Recorder::new();
    for _ in 0..3 {
        device
            .set("room/fan", Value::Bool(true), callback.clone(), 0)
            .unwrap();
    }
    device.link_down();
    device.link_down(); // idempotent

    let lost = Recorded::Response(Err(Error::ConnectionLost));
    assert_eq!(callback.count(&lost), 3);
    assert_eq!(callback.events().len(), 3);
    assert_eq!(device.state(), ConnectionState::LinkDown);
    assert_eq!(
        connection.events(),
        vec![
            Recorded::Connection(ConnectionState::SessionActive),
            Recorded::Connection(ConnectionState::LinkDown),
        ]
    );

    // Failed requests are not replayed when the session comes back.
    let sets_before = hooks.sent_count_containing("/device/data/set");
    device.link_up(1_000);
    hooks.push_inbound(handshake_response());
    device.update(1_000);
    assert_eq!(device.state(), ConnectionState::SessionActive);
    assert_eq!(hooks.sent_count_containing("/device/data/set"), sets_before);
}

#[test]
fn on_registers_the_topic_and_receives_pushes() {
    let hooks = ChannelHooks::default();
    let mut device = test_device(&hooks);
    establish(&mut device, &hooks, 0);

    let callback = Recorder::new();
    device.on("room/fan", callback.clone()).unwrap();
    let frames = hooks.sent_frames();
    let subscribe = frames.last().unwrap();
    assert!(subscribe.contains(r#""task":"/event/subscribe""#));
    assert!(subscribe.contains(r#""path":"room/fan""#));
    assert!(subscribe.contains(r#""event":"data""#));

    hooks.push_inbound(push_event("room/fan", "false"));
    device.update(1);
    assert_eq!(callback.events(), vec![Recorded::Update(Owned::Bool(false))]);
}

#[test]
fn pushes_reach_exactly_the_matching_subscription() {
    let hooks = ChannelHooks::default();
    let mut device = test_device(&hooks);
    establish(&mut device, &hooks, 0);

    let temperature = Recorder::new();
    let humidity = Recorder::new();
    device.on("temperature", temperature.clone()).unwrap();
    device.on("humidity", humidity.clone()).unwrap();

    hooks.push_inbound(push_event("temperature", "23"));
    device.update(1);
    assert_eq!(
        temperature.events(),
        vec![Recorded::Update(Owned::Integer(23))]
    );
    assert!(humidity.events().is_empty());
}

#[test]
fn subscriptions_made_offline_are_replayed_on_session_establishment() {
    let hooks = ChannelHooks::default();
    let mut device = test_device(&hooks);

    let callback = Recorder::new();
    device.on("room/fan", callback.clone()).unwrap();
    assert_eq!(hooks.sent_count_containing("/event/subscribe"), 0);

    establish(&mut device, &hooks, 0);
    assert_eq!(hooks.sent_count_containing("/event/subscribe"), 1);

    hooks.push_inbound(push_event("room/fan", "true"));
    device.update(1);
    assert_eq!(callback.events(), vec![Recorded::Update(Owned::Bool(true))]);
}

#[test]
fn summary_and_parms_operations_use_their_tasks() {
    let hooks = ChannelHooks::default();
    let mut device = test_device(&hooks);
    establish(&mut device, &hooks, 0);

    let callback = Recorder::new();
    let key = device.get_summary(callback.clone(), 0).unwrap();
    assert_eq!(
        hooks.sent_frames().last().unwrap(),
        &format!(
            r#"{{"header":{{"id":{key},"task":"/device/summary/get"}},"payload":{{"deviceID":"dev1"}}}}"#
        )
    );
    hooks.push_inbound(response_frame(key, "/device/summary/get", "\"ok\""));
    device.update(1);
    assert_eq!(
        callback.events(),
        vec![Recorded::Response(Ok(Owned::Str("ok".into())))]
    );

    device.get_parms(callback.clone(), 1).unwrap();
    assert!(
        hooks
            .sent_frames()
            .last()
            .unwrap()
            .contains(r#""task":"/device/parms/get""#)
    );
    device
        .set_summary(Value::Integer(7), callback.clone(), 1)
        .unwrap();
    assert!(
        hooks
            .sent_frames()
            .last()
            .unwrap()
            .contains(r#""task":"/device/summary/set""#)
    );
    device
        .set_parms(Value::Integer(8), callback.clone(), 1)
        .unwrap();
    assert!(
        hooks
            .sent_frames()
            .last()
            .unwrap()
            .contains(r#""task":"/device/parms/set""#)
    );
}

#[test]
fn summary_and_parms_push_updates_reach_their_slots() {
    let hooks = ChannelHooks::default();
    let mut device = test_device(&hooks);
    let summary = Recorder::new();
    let parms = Recorder::new();
    device.on_summary_updated(summary.clone());
    device.on_parms_updated(parms.clone());
    establish(&mut device, &hooks, 0);

    hooks.push_inbound(
        r#"{"header":{"id":0,"task":"update"},"payload":{"event":"summaryUpdated","data":7}}"#
            .to_string(),
    );
    hooks.push_inbound(
        r#"{"header":{"id":0,"task":"update"},"payload":{"event":"parmsUpdated","data":8}}"#
            .to_string(),
    );
    device.update(1);
    assert_eq!(summary.events(), vec![Recorded::Update(Owned::Integer(7))]);
    assert_eq!(parms.events(), vec![Recorded::Update(Owned::Integer(8))]);
}

#[test]
fn transport_failure_surfaces_synchronously_and_releases_the_slot() {
    let hooks = ChannelHooks::default();
    let mut device = test_device(&hooks);
    establish(&mut device, &hooks, 0);

    hooks.set_fail_sends(true);
    let callback = Recorder::new();
    assert_eq!(
        device.set("room/fan", Value::Bool(true), callback.clone(), 0),
        Err(Error::Transport)
    );
    hooks.set_fail_sends(false);

    // The reserved slot was released: a full table's worth still fits.
    for _ in 0..SENDQUEUE_SIZE {
        device
            .set("room/fan", Value::Bool(true), callback.clone(), 0)
            .unwrap();
    }
}
