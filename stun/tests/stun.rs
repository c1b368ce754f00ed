use bytes::BytesMut;
use stun::attribute::*;
use stun::util::{fingerprint, long_term_credential_digest};
use stun::{Attributes, Decoder, Kind, MessageReader, MessageWriter, StunError};

const TOKEN: [u8; 12] = [
    0x6c, 0x46, 0x62, 0x54, 0x75, 0x4b, 0x44, 0x51, 0x46, 0x48, 0x4c, 0x71,
];

#[test]
fn short_datagram_is_not_a_message() {
    let mut attributes = Attributes::default();
    let ret = MessageReader::decode(&[0u8; 8], &mut attributes);
    assert!(matches!(ret, Err(StunError::NotMessage)));
}

#[test]
fn missing_cookie_is_not_a_message() {
    let mut buf = BytesMut::new();
    MessageWriter::new(Kind::BindingRequest, &TOKEN, &mut buf);
    buf[4] = 0xff;

    let mut attributes = Attributes::default();
    let ret = MessageReader::decode(&buf, &mut attributes);
    assert!(matches!(ret, Err(StunError::NotMessage)));
}

#[test]
fn truncated_attribute_is_rejected() {
    // header claims 8 bytes of attributes, the single attribute claims a
    // 20 byte value.
    let mut bytes = vec![0x00, 0x01, 0x00, 0x08, 0x21, 0x12, 0xa4, 0x42];
    bytes.extend_from_slice(&TOKEN);
    bytes.extend_from_slice(&[0x00, 0x06, 0x00, 0x14, 0x70, 0x61, 0x6e, 0x64]);

    let mut attributes = Attributes::default();
    let ret = MessageReader::decode(&bytes, &mut attributes);
    assert!(matches!(ret, Err(StunError::MalformedAttribute)));
}

#[test]
fn unknown_comprehension_required_attribute_is_rejected() {
    let mut bytes = vec![0x00, 0x01, 0x00, 0x08, 0x21, 0x12, 0xa4, 0x42];
    bytes.extend_from_slice(&TOKEN);
    bytes.extend_from_slice(&[0x00, 0x24, 0x00, 0x04, 0x6e, 0x00, 0x01, 0xff]);

    let mut attributes = Attributes::default();
    match MessageReader::decode(&bytes, &mut attributes) {
        Err(StunError::UnknownComprehensionRequired(list)) => assert_eq!(list, vec![0x0024]),
        ret => panic!("unexpected: {:?}", ret.map(|_| ())),
    }
}

#[test]
fn unknown_comprehension_optional_attribute_is_skipped() {
    let mut bytes = vec![0x00, 0x01, 0x00, 0x08, 0x21, 0x12, 0xa4, 0x42];
    bytes.extend_from_slice(&TOKEN);
    bytes.extend_from_slice(&[0xc0, 0x57, 0x00, 0x04, 0x00, 0x00, 0x03, 0xe7]);

    let mut attributes = Attributes::default();
    let message = MessageReader::decode(&bytes, &mut attributes).unwrap();
    assert_eq!(message.kind, Kind::BindingRequest);
}

#[test]
fn build_then_parse_round_trip() {
    let peer = "10.0.0.3:5000".parse().unwrap();
    let key = long_term_credential_digest("panda", "panda", "raspberry");

    let mut buf = BytesMut::with_capacity(1280);
    let mut message = MessageWriter::new(Kind::CreatePermissionRequest, &TOKEN, &mut buf);
    message.append::<UserName>("panda");
    message.append::<Realm>("raspberry");
    message.append::<XorPeerAddress>(peer);
    message.append::<Lifetime>(600);
    message.flush(Some(&key)).unwrap();

    let mut decoder = Decoder::default();
    let message = decoder.decode(&buf).unwrap();
    assert_eq!(message.kind, Kind::CreatePermissionRequest);
    assert_eq!(message.token, &TOKEN);
    assert_eq!(message.get::<UserName>(), Some("panda"));
    assert_eq!(message.get::<Realm>(), Some("raspberry"));
    assert_eq!(message.get::<XorPeerAddress>(), Some(peer));
    assert_eq!(message.get::<Lifetime>(), Some(600));
    assert!(message.integrity(&key).is_ok());
    assert!(message.integrity(&[0u8; 16]).is_err());
}

#[test]
fn fingerprint_is_the_final_attribute() {
    let key = long_term_credential_digest("panda", "panda", "raspberry");

    let mut buf = BytesMut::with_capacity(1280);
    let mut message = MessageWriter::new(Kind::AllocateRequest, &TOKEN, &mut buf);
    message.append::<RequestedTransport>(0x11);
    message.flush(Some(&key)).unwrap();

    // the last 8 bytes are the fingerprint attribute, whose value is the
    // crc of everything before it.
    let tail = buf.len() - 8;
    assert_eq!(&buf[tail..tail + 4], &[0x80, 0x28, 0x00, 0x04]);
    let crc = u32::from_be_bytes([buf[tail + 4], buf[tail + 5], buf[tail + 6], buf[tail + 7]]);
    assert_eq!(crc, fingerprint(&buf[..tail]));

    let mut decoder = Decoder::default();
    let message = decoder.decode(&buf).unwrap();
    assert_eq!(message.get::<Fingerprint>(), Some(crc));
}

#[test]
fn derived_response_copies_the_transaction_id() {
    let mut buf = BytesMut::with_capacity(1280);
    MessageWriter::new(Kind::BindingRequest, &TOKEN, &mut buf);
    let request = buf.to_vec();

    let mut attributes = Attributes::default();
    let request = MessageReader::decode(&request, &mut attributes).unwrap();

    let mut res_buf = BytesMut::with_capacity(1280);
    let mut response = MessageWriter::derive(Kind::BindingResponse, &request, &mut res_buf);
    response.append::<XorMappedAddress>("10.0.0.1:4000".parse().unwrap());
    response.flush(None).unwrap();

    let mut decoder = Decoder::default();
    let response = decoder.decode(&res_buf).unwrap();
    assert_eq!(response.kind, Kind::BindingResponse);
    assert_eq!(response.token, &TOKEN);
}
