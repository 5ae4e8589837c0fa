//! Tests for the consumer control protocol layout.

use super::*;

#[test]
fn test_encoded_length_is_fixed() {
    let msg = ConsumerMessage::channel(7, "chan", "/tmp/out", OutputKind::Mmap, 4096, 65536, 0, 0);
    assert_eq!(msg.encode().len(), MESSAGE_LEN);

    let msg = ConsumerMessage::relay_socket(3, RelayStreamKind::Data);
    assert_eq!(msg.encode().len(), MESSAGE_LEN);
}

#[test]
fn test_stream_message_survives_the_wire() {
    let msg = ConsumerMessage::stream(
        42,
        1042,
        true,
        OutputKind::Mmap,
        1 << 20,
        1000,
        1000,
        Some(5),
        false,
        "chan0_0",
        "/traces/s1/kernel",
    );
    let decoded = ConsumerMessage::decode(&msg.encode()).unwrap();
    assert_eq!(decoded, msg);
    assert_eq!(decoded.command, ConsumerCommand::AddStream);
    assert_eq!(decoded.net_index, 5);
    assert_eq!(decoded.state, 1);
}

#[test]
fn test_unset_net_index_uses_sentinel() {
    let msg = ConsumerMessage::stream(
        1,
        2,
        false,
        OutputKind::Splice,
        0,
        0,
        0,
        None,
        true,
        "metadata",
        "",
    );
    let decoded = ConsumerMessage::decode(&msg.encode()).unwrap();
    assert_eq!(decoded.net_index, NET_INDEX_UNSET);
    assert_eq!(decoded.metadata_flag, 1);
}

#[test]
fn test_overlong_name_is_truncated_not_rejected() {
    let long = "x".repeat(NAME_LEN * 2);
    let msg = ConsumerMessage::channel(1, &long, "", OutputKind::Mmap, 0, 0, 0, 0);
    let decoded = ConsumerMessage::decode(&msg.encode()).unwrap();
    assert_eq!(decoded.name.len(), NAME_LEN - 1);
}

#[test]
fn test_unknown_command_id_is_an_error() {
    let msg = ConsumerMessage::data_pending(9);
    let mut encoded = msg.encode();
    encoded[0] = 0xff;
    assert!(ConsumerMessage::decode(&encoded).is_err());
}

#[test]
fn test_short_buffer_is_an_error() {
    let msg = ConsumerMessage::data_pending(9);
    let encoded = msg.encode();
    assert!(ConsumerMessage::decode(&encoded[..MESSAGE_LEN - 1]).is_err());
}

#[test]
fn test_status_codes_round_trip() {
    for status in [
        ConsumerStatus::Ok,
        ConsumerStatus::Error,
        ConsumerStatus::InvalidArgument,
        ConsumerStatus::OutOfMemory,
        ConsumerStatus::Fatal,
    ] {
        assert_eq!(ConsumerStatus::from_code(status as i32).unwrap(), status);
    }
    assert!(ConsumerStatus::from_code(99).is_err());
}
