#![no_main]

use gravity_codec::ack::decode_ack_cbor;
use gravity_codec::frame::decode_frame_cbor;
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    let _ = decode_ack_cbor(data);
    let _ = decode_frame_cbor(data);
});
