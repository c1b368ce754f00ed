use std::cmp::{Eq, PartialEq};
use std::convert::TryFrom;

use bytes::{BufMut, BytesMut};

use crate::{util, StunError};

/// Error codes emitted by the server:
///
/// 400  Bad Request: The request was malformed.  The client SHOULD NOT
///      retry the request without modification from the previous
///      attempt.
///
/// 401  Unauthenticated: The request did not contain the correct
///      credentials to proceed.  The client should retry the request
///      with proper credentials.
///
/// 500  Server Error: The server has suffered a temporary error.  The
///      client should try again.
#[repr(u16)]
#[derive(PartialEq, Eq, Copy, Clone, Debug)]
pub enum Kind {
    BadRequest = 0x0400,
    Unauthorized = 0x0401,
    ServerError = 0x0500,
}

/// The ERROR-CODE attribute payload: the class of the error code (the
/// hundreds digit) is encoded separately from the rest of the code.
///
/// ```text
/// 0                   1                   2                   3
/// 0 1 2 3 4 5 6 7 8 9 0 1 2 3 4 5 6 7 8 9 0 1 2 3 4 5 6 7 8 9 0 1
/// +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
/// |           Reserved, should be 0         |Class|     Number    |
/// +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
/// |      Reason Phrase (variable)                                ..
/// +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
/// ```
#[derive(Clone, Debug)]
pub struct Error<'a> {
    pub code: u16,
    pub message: &'a str,
}

impl Error<'_> {
    /// create an error from an error kind.
    ///
    /// # Unit Test
    ///
    /// ```
    /// use stun::attribute::*;
    ///
    /// let error = Error::from(ErrKind::BadRequest);
    /// assert_eq!(error.code, ErrKind::BadRequest as u16);
    /// assert_eq!(error.message, "Bad Request");
    /// ```
    pub fn from(code: Kind) -> Self {
        Self {
            code: code as u16,
            message: code.into(),
        }
    }

    /// encode the error as bytes.
    ///
    /// # Unit Test
    ///
    /// ```
    /// use bytes::BytesMut;
    /// use stun::attribute::*;
    ///
    /// let buffer = [
    ///     0x00u8, 0x00, 0x04, 0x01, 0x55, 0x6e, 0x61, 0x75, 0x74, 0x68, 0x6f,
    ///     0x72, 0x69, 0x7a, 0x65, 0x64,
    /// ];
    ///
    /// let mut buf = BytesMut::with_capacity(1280);
    /// let error = Error::from(ErrKind::Unauthorized);
    /// error.into(&mut buf);
    /// assert_eq!(&buf[..], &buffer);
    /// ```
    pub fn into(self, buf: &mut BytesMut) {
        buf.put_u16(0x0000);
        buf.put_u16(self.code);
        buf.put(self.message.as_bytes());
    }
}

impl<'a> TryFrom<&'a [u8]> for Error<'a> {
    type Error = StunError;

    /// # Unit Test
    ///
    /// ```
    /// use std::convert::TryFrom;
    /// use stun::attribute::*;
    ///
    /// let buffer = [
    ///     0x00u8, 0x00, 0x04, 0x01, 0x55, 0x6e, 0x61, 0x75, 0x74, 0x68, 0x6f,
    ///     0x72, 0x69, 0x7a, 0x65, 0x64,
    /// ];
    ///
    /// let error = Error::try_from(&buffer[..]).unwrap();
    /// assert_eq!(error.code, ErrKind::Unauthorized as u16);
    /// assert_eq!(error.message, "Unauthorized");
    /// ```
    fn try_from(packet: &'a [u8]) -> Result<Self, Self::Error> {
        if packet.len() < 4 || util::as_u16(&packet[..2]) != 0x0000 {
            return Err(StunError::MalformedAttribute);
        }

        Ok(Self {
            code: util::as_u16(&packet[2..4]),
            message: std::str::from_utf8(&packet[4..])?,
        })
    }
}

impl From<Kind> for &'static str {
    fn from(val: Kind) -> Self {
        match val {
            Kind::BadRequest => "Bad Request",
            Kind::Unauthorized => "Unauthorized",
            Kind::ServerError => "Server Error",
        }
    }
}

impl Eq for Error<'_> {}
impl PartialEq for Error<'_> {
    fn eq(&self, other: &Self) -> bool {
        self.code == other.code
    }
}
