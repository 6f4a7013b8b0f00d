#![no_main]

use bytes::Bytes;
use gravity_codec::ack::encode_ack_cbor;
use gravity_codec::envelope::OperationEnvelope;
use gravity_core::{BusMessage, NodeId, OP_HEADER};
use gravity_node::{handle_envelope, LruStore, LruStoreConfig};
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    let Some((&selector, payload)) = data.split_first() else {
        return;
    };
    let op = match selector % 5 {
        0 => "get",
        1 => "set",
        2 => "del",
        3 => "incr",
        _ => "",
    };
    let mut message = BusMessage::new("fuzz-key", Bytes::copy_from_slice(payload))
        .with_reply_to("_INBOX.00");
    if !op.is_empty() {
        message = message.with_header(OP_HEADER, op);
    }

    let store = LruStore::new(LruStoreConfig {
        max_entries: 8,
        max_cost: 1024,
    });
    let envelope = OperationEnvelope::from_message(message);
    let ack = handle_envelope(&store, NodeId([0x11; 32]), &envelope);
    encode_ack_cbor(&ack).expect("handler acks always encode");
});
