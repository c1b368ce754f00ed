mod address;
mod error;

use std::convert::TryFrom;
use std::net::SocketAddr;

use bytes::{BufMut, BytesMut};
use num_enum::TryFromPrimitive;

pub use address::Addr;
pub use error::{Error, Kind as ErrKind};

use crate::{util, StunError};

/// attribute type.
#[repr(u16)]
#[derive(TryFromPrimitive)]
#[derive(PartialEq, Eq, Hash, Clone, Copy, Debug)]
pub enum AttrKind {
    UserName = 0x0006,
    MessageIntegrity = 0x0008,
    ErrorCode = 0x0009,
    Lifetime = 0x000D,
    XorPeerAddress = 0x0012,
    Data = 0x0013,
    Realm = 0x0014,
    Nonce = 0x0015,
    XorRelayedAddress = 0x0016,
    RequestedTransport = 0x0019,
    XorMappedAddress = 0x0020,
    Software = 0x8022,
    Fingerprint = 0x8028,
}

/// dyn stun/turn message attribute.
pub trait Property<'a> {
    type Error;
    /// current attribute inner type.
    type Inner;
    /// get current attribute type.
    fn kind() -> AttrKind;
    /// write the current attribute to the buffer.
    fn into(value: Self::Inner, buf: &mut BytesMut, token: &'a [u8]);
    /// convert buffer to current attribute.
    fn try_from(buf: &'a [u8], token: &'a [u8]) -> Result<Self::Inner, Self::Error>;
}

/// The USERNAME attribute is used for message integrity.  It identifies
/// the username and password combination used in the message-integrity
/// check.
pub struct UserName;

impl<'a> Property<'a> for UserName {
    type Error = StunError;
    type Inner = &'a str;

    fn kind() -> AttrKind {
        AttrKind::UserName
    }

    fn into(value: Self::Inner, buf: &mut BytesMut, _: &[u8]) {
        buf.put(value.as_bytes());
    }

    fn try_from(buf: &'a [u8], _: &'a [u8]) -> Result<Self::Inner, Self::Error> {
        Ok(std::str::from_utf8(buf)?)
    }
}

/// The DATA attribute is present in all Send and Data indications.  The
/// value portion of this attribute is variable length and consists of
/// the application data.
pub struct Data;

impl<'a> Property<'a> for Data {
    type Error = StunError;
    type Inner = &'a [u8];

    fn kind() -> AttrKind {
        AttrKind::Data
    }

    fn into(value: Self::Inner, buf: &mut BytesMut, _: &[u8]) {
        buf.put(value);
    }

    fn try_from(buf: &'a [u8], _: &'a [u8]) -> Result<Self::Inner, Self::Error> {
        Ok(buf)
    }
}

/// The REALM attribute may be present in requests and responses.
///
/// Presence of the REALM attribute in a request indicates that long-term
/// credentials are being used for authentication.  Presence in certain
/// error responses indicates that the server wishes the client to use a
/// long-term credential in that realm for authentication.
pub struct Realm;

impl<'a> Property<'a> for Realm {
    type Error = StunError;
    type Inner = &'a str;

    fn kind() -> AttrKind {
        AttrKind::Realm
    }

    fn into(value: Self::Inner, buf: &mut BytesMut, _: &[u8]) {
        buf.put(value.as_bytes());
    }

    fn try_from(buf: &'a [u8], _: &'a [u8]) -> Result<Self::Inner, Self::Error> {
        Ok(std::str::from_utf8(buf)?)
    }
}

/// The NONCE attribute may be present in requests and responses.  It
/// contains a sequence of qdtext or quoted-pair without the surrounding
/// quote characters.
pub struct Nonce;

impl<'a> Property<'a> for Nonce {
    type Error = StunError;
    type Inner = &'a str;

    fn kind() -> AttrKind {
        AttrKind::Nonce
    }

    fn into(value: Self::Inner, buf: &mut BytesMut, _: &[u8]) {
        buf.put(value.as_bytes());
    }

    fn try_from(buf: &'a [u8], _: &'a [u8]) -> Result<Self::Inner, Self::Error> {
        Ok(std::str::from_utf8(buf)?)
    }
}

/// The SOFTWARE attribute contains a textual description of the software
/// being used by the agent sending the message.  The attribute has no
/// impact on operation of the protocol and serves only as a tool for
/// diagnostic and debugging purposes.
pub struct Software;

impl<'a> Property<'a> for Software {
    type Error = StunError;
    type Inner = &'a str;

    fn kind() -> AttrKind {
        AttrKind::Software
    }

    fn into(value: Self::Inner, buf: &mut BytesMut, _: &[u8]) {
        buf.put(value.as_bytes());
    }

    fn try_from(buf: &'a [u8], _: &'a [u8]) -> Result<Self::Inner, Self::Error> {
        Ok(std::str::from_utf8(buf)?)
    }
}

/// The MESSAGE-INTEGRITY attribute contains an HMAC-SHA1 of the STUN
/// message up to and including the attribute preceding it, with the
/// header length field adjusted to point past it.  Since it uses the
/// SHA-1 hash, the HMAC will be 20 bytes.
pub struct MessageIntegrity;

impl<'a> Property<'a> for MessageIntegrity {
    type Error = StunError;
    type Inner = &'a [u8];

    fn kind() -> AttrKind {
        AttrKind::MessageIntegrity
    }

    fn into(value: Self::Inner, buf: &mut BytesMut, _: &[u8]) {
        buf.put(value);
    }

    fn try_from(buf: &'a [u8], _: &'a [u8]) -> Result<Self::Inner, Self::Error> {
        Ok(buf)
    }
}

/// The XOR-PEER-ADDRESS specifies the address and port of the peer as
/// seen from the TURN server.  It is encoded in the same way as
/// XOR-MAPPED-ADDRESS.
pub struct XorPeerAddress;

impl<'a> Property<'a> for XorPeerAddress {
    type Error = StunError;
    type Inner = SocketAddr;

    fn kind() -> AttrKind {
        AttrKind::XorPeerAddress
    }

    fn into(value: Self::Inner, buf: &mut BytesMut, token: &[u8]) {
        Addr::into(&value, token, buf, true)
    }

    fn try_from(buf: &'a [u8], token: &'a [u8]) -> Result<Self::Inner, Self::Error> {
        Addr::try_from(buf, token, true)
    }
}

/// The XOR-RELAYED-ADDRESS is present in Allocate responses.  It
/// specifies the address and port that the server allocated to the
/// client.  It is encoded in the same way as XOR-MAPPED-ADDRESS.
pub struct XorRelayedAddress;

impl<'a> Property<'a> for XorRelayedAddress {
    type Error = StunError;
    type Inner = SocketAddr;

    fn kind() -> AttrKind {
        AttrKind::XorRelayedAddress
    }

    fn into(value: Self::Inner, buf: &mut BytesMut, token: &[u8]) {
        Addr::into(&value, token, buf, true)
    }

    fn try_from(buf: &'a [u8], token: &'a [u8]) -> Result<Self::Inner, Self::Error> {
        Addr::try_from(buf, token, true)
    }
}

/// The XOR-MAPPED-ADDRESS attribute carries the reflexive transport
/// address of the client, obfuscated through the XOR function with the
/// magic cookie (and, for IPv6, the transaction id).
pub struct XorMappedAddress;

impl<'a> Property<'a> for XorMappedAddress {
    type Error = StunError;
    type Inner = SocketAddr;

    fn kind() -> AttrKind {
        AttrKind::XorMappedAddress
    }

    fn into(value: Self::Inner, buf: &mut BytesMut, token: &[u8]) {
        Addr::into(&value, token, buf, true)
    }

    fn try_from(buf: &'a [u8], token: &'a [u8]) -> Result<Self::Inner, Self::Error> {
        Addr::try_from(buf, token, true)
    }
}

/// The ERROR-CODE attribute is used in error response messages.  It
/// contains a numeric error code value in the range of 300 to 699 plus a
/// textual reason phrase encoded in UTF-8.
pub struct ErrorCode;

impl<'a> Property<'a> for ErrorCode {
    type Error = StunError;
    type Inner = Error<'a>;

    fn kind() -> AttrKind {
        AttrKind::ErrorCode
    }

    fn into(value: Self::Inner, buf: &mut BytesMut, _: &[u8]) {
        value.into(buf)
    }

    fn try_from(buf: &'a [u8], _: &'a [u8]) -> Result<Self::Inner, Self::Error> {
        Error::try_from(buf)
    }
}

/// The LIFETIME attribute represents the duration for which the server
/// will maintain an allocation in the absence of a refresh.  The value
/// is a 32-bit unsigned integral number of seconds remaining until
/// expiration.
pub struct Lifetime;

impl<'a> Property<'a> for Lifetime {
    type Error = StunError;
    type Inner = u32;

    fn kind() -> AttrKind {
        AttrKind::Lifetime
    }

    fn into(value: Self::Inner, buf: &mut BytesMut, _: &[u8]) {
        buf.put_u32(value)
    }

    fn try_from(buf: &'a [u8], _: &'a [u8]) -> Result<Self::Inner, Self::Error> {
        if buf.len() != 4 {
            return Err(StunError::MalformedAttribute);
        }

        Ok(util::as_u32(buf))
    }
}

/// This attribute is used by the client to request a specific transport
/// protocol for the allocated transport address.  The value is 4 bytes:
/// the protocol number followed by three RFFU bytes that are set to zero
/// on transmission and ignored on reception.
pub struct RequestedTransport;

impl<'a> Property<'a> for RequestedTransport {
    type Error = StunError;
    type Inner = u8;

    fn kind() -> AttrKind {
        AttrKind::RequestedTransport
    }

    fn into(value: Self::Inner, buf: &mut BytesMut, _: &[u8]) {
        buf.put_u8(value);
        buf.put(&[0u8; 3][..]);
    }

    fn try_from(buf: &'a [u8], _: &'a [u8]) -> Result<Self::Inner, Self::Error> {
        if buf.is_empty() {
            return Err(StunError::MalformedAttribute);
        }

        Ok(buf[0])
    }
}

/// The FINGERPRINT attribute MAY be present in all STUN messages.  The
/// value of the attribute is the CRC-32 of the STUN message up to (but
/// excluding) the FINGERPRINT attribute itself, XOR'ed with the 32-bit
/// value 0x5354554e.  When present it MUST be the last attribute in the
/// message.
pub struct Fingerprint;

impl<'a> Property<'a> for Fingerprint {
    type Error = StunError;
    type Inner = u32;

    fn kind() -> AttrKind {
        AttrKind::Fingerprint
    }

    fn into(value: Self::Inner, buf: &mut BytesMut, _: &[u8]) {
        buf.put_u32(value)
    }

    fn try_from(buf: &'a [u8], _: &'a [u8]) -> Result<Self::Inner, Self::Error> {
        if buf.len() != 4 {
            return Err(StunError::MalformedAttribute);
        }

        Ok(util::as_u32(buf))
    }
}
