//! ## Session Traversal Utilities for NAT (STUN)
//!
//! STUN is a short binary request/response protocol used in the context of
//! one or more NAT traversal solutions. TURN is the STUN extension that
//! provisions a relayed transport address on behalf of a client; all TURN
//! control messages are STUN-formatted messages.
//!
//! ### STUN Message Structure
//!
//! ```text
//! 0                   1                   2                   3
//! 0 1 2 3 4 5 6 7 8 9 0 1 2 3 4 5 6 7 8 9 0 1 2 3 4 5 6 7 8 9 0 1
//! +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
//! |0 0|     STUN Message Type     |         Message Length        |
//! +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
//! |                         Magic Cookie                          |
//! +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
//! |                                                               |
//! |                     Transaction ID (96 bits)                  |
//! |                                                               |
//! +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
//! ```
//!
//! ### STUN Attributes
//!
//! ```text
//! 0                   1                   2                   3
//! 0 1 2 3 4 5 6 7 8 9 0 1 2 3 4 5 6 7 8 9 0 1 2 3 4 5 6 7 8 9 0 1
//! +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
//! |         Type                  |            Length             |
//! +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
//! |                         Value (variable)                ....
//! +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
//! ```

pub mod attribute;
pub mod util;
mod message;

pub use message::{MessageReader, MessageWriter};

use std::ops::Range;

use attribute::AttrKind;
use num_enum::TryFromPrimitive;
use thiserror::Error;

/// fixed magic cookie of all stun messages.
pub const COOKIE: [u8; 4] = 0x2112A442u32.to_be_bytes();

/// long-term credential key, `MD5(username ":" realm ":" password)`.
pub type Auth = [u8; 16];

#[derive(Error, Debug)]
pub enum StunError {
    #[error("the datagram is not a stun message")]
    NotMessage,
    #[error("unknown message type: {0:#06x}")]
    UnknownMethod(u16),
    #[error("malformed attribute")]
    MalformedAttribute,
    #[error("unknown comprehension required attributes: {0:?}")]
    UnknownComprehensionRequired(Vec<u16>),
    #[error("message integrity cannot be computed")]
    SummaryFailed,
    #[error("message integrity not found")]
    NotFoundIntegrity,
    #[error("message integrity check failed")]
    IntegrityFailed,
    #[error(transparent)]
    Utf8Error(#[from] std::str::Utf8Error),
}

/// message type, `class` x `method`.
#[repr(u16)]
#[derive(TryFromPrimitive)]
#[derive(PartialEq, Eq, Hash, Clone, Copy, Debug)]
pub enum Kind {
    BindingRequest = 0x0001,
    BindingResponse = 0x0101,
    BindingError = 0x0111,
    AllocateRequest = 0x0003,
    AllocateResponse = 0x0103,
    AllocateError = 0x0113,
    RefreshRequest = 0x0004,
    RefreshResponse = 0x0104,
    RefreshError = 0x0114,
    CreatePermissionRequest = 0x0008,
    CreatePermissionResponse = 0x0108,
    CreatePermissionError = 0x0118,
    ChannelBindRequest = 0x0009,
    ChannelBindError = 0x0119,
    SendIndication = 0x0016,
    DataIndication = 0x0017,
}

impl Kind {
    /// whether the class bits mark a request.
    ///
    /// # Unit Test
    ///
    /// ```
    /// use stun::Kind;
    ///
    /// assert!(Kind::AllocateRequest.is_request());
    /// assert!(!Kind::SendIndication.is_request());
    /// assert!(!Kind::AllocateResponse.is_request());
    /// ```
    pub fn is_request(self) -> bool {
        (self as u16) & 0x0110 == 0x0000
    }

    /// whether the class bits mark an indication.
    ///
    /// # Unit Test
    ///
    /// ```
    /// use stun::Kind;
    ///
    /// assert!(Kind::SendIndication.is_indication());
    /// assert!(!Kind::BindingRequest.is_indication());
    /// ```
    pub fn is_indication(self) -> bool {
        (self as u16) & 0x0110 == 0x0010
    }

    /// the error-response type for a request type.
    ///
    /// # Unit Test
    ///
    /// ```
    /// use stun::Kind;
    ///
    /// assert_eq!(Kind::AllocateRequest.to_error(), Some(Kind::AllocateError));
    /// assert_eq!(Kind::SendIndication.to_error(), None);
    /// ```
    pub fn to_error(self) -> Option<Kind> {
        match self {
            Self::BindingRequest => Some(Self::BindingError),
            Self::AllocateRequest => Some(Self::AllocateError),
            Self::RefreshRequest => Some(Self::RefreshError),
            Self::CreatePermissionRequest => Some(Self::CreatePermissionError),
            Self::ChannelBindRequest => Some(Self::ChannelBindError),
            _ => None,
        }
    }
}

/// whether the datagram looks like a stun message.
///
/// checks the two leading zero bits and the fixed magic cookie; anything
/// else on the socket is not for us.
///
/// # Unit Test
///
/// ```
/// let buffer = [
///     0x00u8, 0x01, 0x00, 0x00, 0x21, 0x12, 0xa4, 0x42, 0x72, 0x6d, 0x49, 0x42,
///     0x72, 0x52, 0x64, 0x48, 0x57, 0x62, 0x4b, 0x2b,
/// ];
///
/// assert!(stun::is_message(&buffer));
/// assert!(!stun::is_message(&buffer[..8]));
/// assert!(!stun::is_message(&[0xffu8; 20]));
/// ```
pub fn is_message(bytes: &[u8]) -> bool {
    bytes.len() >= 20 && bytes[0] >> 6 == 0 && bytes[4..8] == COOKIE
}

/// A reusable cache of the decoded attribute list.
#[derive(Debug, Default)]
pub struct Attributes(Vec<(AttrKind, Range<usize>)>);

impl Attributes {
    pub(crate) fn append(&mut self, kind: AttrKind, range: Range<usize>) {
        self.0.push((kind, range));
    }

    pub(crate) fn get(&self, kind: AttrKind) -> Option<Range<usize>> {
        self.0
            .iter()
            .find(|(k, _)| k == &kind)
            .map(|(_, v)| v.clone())
    }

    pub(crate) fn clear(&mut self) {
        if !self.0.is_empty() {
            self.0.clear();
        }
    }
}

/// stun message decoder.
///
/// owns the attribute cache so that steady-state decoding does not
/// allocate.
///
/// # Unit Test
///
/// ```
/// use stun::attribute::UserName;
/// use stun::{Decoder, Kind};
///
/// let buffer = [
///     0x00u8, 0x01, 0x00, 0x14, 0x21, 0x12, 0xa4, 0x42, 0x72, 0x6d, 0x49, 0x42,
///     0x72, 0x52, 0x64, 0x48, 0x57, 0x62, 0x4b, 0x2b, 0x00, 0x06, 0x00, 0x05,
///     0x70, 0x61, 0x6e, 0x64, 0x61, 0x00, 0x00, 0x00, 0xc0, 0x57, 0x00, 0x04,
///     0x00, 0x00, 0x03, 0xe7,
/// ];
///
/// let mut decoder = Decoder::default();
/// let message = decoder.decode(&buffer).unwrap();
/// assert_eq!(message.kind, Kind::BindingRequest);
/// assert_eq!(message.get::<UserName>(), Some("panda"));
/// ```
#[derive(Default)]
pub struct Decoder(Attributes);

impl Decoder {
    pub fn decode<'a>(&'a mut self, bytes: &'a [u8]) -> Result<MessageReader<'a>, StunError> {
        MessageReader::decode(bytes, &mut self.0)
    }
}
