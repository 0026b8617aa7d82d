//! End-to-end `DeviceClient` round trips over a real `vcan0` interface.
//!
//! These need a loopback CAN interface that doesn't exist in a plain
//! sandbox, so they're `#[ignore]`d by default. To run them:
//!
//! ```sh
//! sudo ip link add dev vcan0 type vcan
//! sudo ip link set up vcan0
//! cargo test -p canto-transport --test device_client_vcan -- --ignored
//! ```

use std::sync::{Arc, Mutex};
use std::thread;
use std::time::Duration;

use canto_proto::{CommandOpcode, DeviceId, Frame, StatusCode, StatusReply, TypedFrame};
use canto_transport::{CanBus, DeviceClient};

const DEVICE_ID: u8 = 7;

/// Answer one command on `fake` as a device would: a status reply tagged
/// with the command's opcode, then (for `WsClear`) the typed `WsState`
/// frame the real firmware sends after clearing.
fn run_fake_device(mut fake: CanBus) {
    let id = DeviceId::new(DEVICE_ID).unwrap();
    let frame = fake
        .wait_for(Duration::from_secs(2), |f| f.arbitration_id == id.command_id())
        .expect("fake device never saw the command");
    let opcode = frame.payload[0];

    let status = Frame::new(id.status_id(), StatusReply { code: StatusCode::Ok, tag: opcode }.encode());
    fake.send(status).unwrap();

    if opcode == CommandOpcode::WsClear as u8 {
        let typed = Frame::new(id.status_id(), TypedFrame::WsState { on: 0, mode: 0 }.encode());
        fake.send(typed).unwrap();
    }
}

#[test]
#[ignore = "needs a vcan0 interface"]
fn ws_clear_round_trips_over_vcan() {
    let fake = CanBus::open("vcan0").expect("vcan0 not available, see module docs");
    let handle = thread::spawn(move || run_fake_device(fake));

    let bus = Arc::new(Mutex::new(CanBus::open("vcan0").expect("vcan0 not available")));
    let client = DeviceClient::new(bus, DeviceId::new(DEVICE_ID).unwrap());

    let reply = client.ws_clear().expect("ws_clear should succeed against the fake device");
    assert!(matches!(reply, TypedFrame::WsState { on: 0, mode: 0 }));

    handle.join().unwrap();
}

#[test]
#[ignore = "needs a vcan0 interface"]
fn unanswered_command_times_out_and_is_remembered() {
    let bus = Arc::new(Mutex::new(CanBus::open("vcan0").expect("vcan0 not available")));
    let client = DeviceClient::new(bus, DeviceId::new(DEVICE_ID).unwrap()).with_retries(1);

    assert!(client.ws_clear().is_err());
    assert!(client.last_error().is_some());
}
