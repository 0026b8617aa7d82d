//! Wire frame codec for the canto magnet-sensor CAN protocol.
//!
//! Pure encode/decode functions over 8-byte CAN payloads. No I/O: the
//! transport crate owns sockets and timing, this crate only knows how to
//! turn bytes into typed values and back.
//!
//! Two encodings share the same 8-byte payload shape:
//! - a *status reply* (`byte0` is a [`StatusCode`], `byte1` is the echoed
//!   command/subject tag, bytes 2..7 zero)
//! - a *typed frame* (`byte0` is always `0`, `byte1` is a [`FrameSubtype`],
//!   bytes 2..7 hold subtype-specific fields)
//!
//! `byte0 == 0` is ambiguous between `StatusCode::Ok` and a typed frame by
//! design: the device always replies status-then-typed-frame to a given
//! request, so the caller (the device client in `canto-transport`) knows
//! from context which decode to attempt. [`decode_pong`] is the one
//! exception that can always be recognized on sight, since it carries an
//! ASCII marker in place of the `byte0`/`byte1` discriminant.

mod command;
mod device;
mod frame;
mod status;
mod typed;

pub use command::{CommandOpcode, HostCommand};
pub use device::{DeviceId, COMMAND_ID_BASE, STATUS_ID_BASE, STATUS_ID_MASK, STATUS_ID_RANGE};
pub use frame::{CodecError, Frame};
pub use status::{StatusCode, StatusReply};
pub use typed::{decode_pong, FrameSubtype, PongInfo, TypedFrame};

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_round_trip() {
        for code in [
            StatusCode::Ok,
            StatusCode::ErrGeneric,
            StatusCode::ErrRange,
            StatusCode::ErrState,
            StatusCode::ErrSensor,
            StatusCode::ErrCrc,
        ] {
            let reply = StatusReply { code, tag: 0x42 };
            let payload = reply.encode();
            let decoded = StatusReply::decode(&payload).unwrap();
            assert_eq!(reply, decoded);
        }
    }

    #[test]
    fn typed_round_trip_mag() {
        let frame = TypedFrame::Mag { x: -120, y: 300, z: 4 };
        let payload = frame.encode();
        assert_eq!(payload[0], 0);
        assert_eq!(payload[1], FrameSubtype::Mag as u8);
        let decoded = TypedFrame::decode(&payload).unwrap();
        assert_eq!(frame, decoded);
    }

    #[test]
    fn pong_is_recognized_before_typed_decode() {
        let mut payload = [0u8; 8];
        payload[0..4].copy_from_slice(b"PONG");
        payload[4] = 7; // device id
        payload[5] = 3; // proto
        payload[6] = 0b0001; // flags
        let pong = decode_pong(&payload).expect("pong");
        assert_eq!(pong.device_id, 7);
        assert_eq!(pong.proto, 3);
        assert_eq!(pong.flags, 0b0001);
    }
}
