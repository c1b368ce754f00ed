use std::convert::TryFrom;

use bytes::{BufMut, BytesMut};

use super::attribute::{AttrKind, MessageIntegrity, Property};
use super::{util, Attributes, Auth, Kind, StunError, COOKIE};

const ZERO_BUF: [u8; 10] = [0u8; 10];

/// stun message writer.
///
/// writes the header up front, then attributes in call order; integrity and
/// fingerprint are terminal and only reachable through [`MessageWriter::flush`],
/// so a finished message always ends `... MESSAGE-INTEGRITY? FINGERPRINT`.
pub struct MessageWriter<'a> {
    token: &'a [u8],
    raw: &'a mut BytesMut,
}

impl<'a> MessageWriter<'a> {
    /// create a message with a caller-provided transaction id.
    ///
    /// # Unit Test
    ///
    /// ```
    /// use bytes::BytesMut;
    /// use stun::{Kind, MessageWriter};
    ///
    /// let buffer = [
    ///     0x00u8, 0x01, 0x00, 0x00, 0x21, 0x12, 0xa4, 0x42, 0x72, 0x6d, 0x49, 0x42,
    ///     0x72, 0x52, 0x64, 0x48, 0x57, 0x62, 0x4b, 0x2b,
    /// ];
    ///
    /// let token = [
    ///     0x72u8, 0x6d, 0x49, 0x42, 0x72, 0x52, 0x64, 0x48, 0x57, 0x62, 0x4b, 0x2b,
    /// ];
    ///
    /// let mut buf = BytesMut::with_capacity(1280);
    /// MessageWriter::new(Kind::BindingRequest, &token, &mut buf);
    /// assert_eq!(&buf[..], &buffer);
    /// ```
    pub fn new(kind: Kind, token: &'a [u8; 12], raw: &'a mut BytesMut) -> Self {
        raw.clear();
        raw.put_u16(kind as u16);
        raw.put_u16(0);
        raw.put(&COOKIE[..]);
        raw.put(token.as_slice());
        Self { raw, token }
    }

    /// rely on an old message to create a new message, reusing its
    /// transaction id.
    ///
    /// # Unit Test
    ///
    /// ```
    /// use bytes::BytesMut;
    /// use stun::{Attributes, Kind, MessageReader, MessageWriter};
    ///
    /// let buffer = [
    ///     0x00u8, 0x01, 0x00, 0x00, 0x21, 0x12, 0xa4, 0x42, 0x72, 0x6d, 0x49, 0x42,
    ///     0x72, 0x52, 0x64, 0x48, 0x57, 0x62, 0x4b, 0x2b,
    /// ];
    ///
    /// let mut attributes = Attributes::default();
    /// let old = MessageReader::decode(&buffer[..], &mut attributes).unwrap();
    ///
    /// let mut buf = BytesMut::with_capacity(1280);
    /// MessageWriter::derive(Kind::BindingRequest, &old, &mut buf);
    /// assert_eq!(&buf[..], &buffer[..]);
    /// ```
    pub fn derive(kind: Kind, reader: &MessageReader<'a>, raw: &'a mut BytesMut) -> Self {
        raw.clear();
        raw.put_u16(kind as u16);
        raw.put_u16(0);
        raw.put(&COOKIE[..]);
        raw.put(reader.token);
        Self {
            raw,
            token: reader.token,
        }
    }

    /// append an attribute to the message attribute list.
    ///
    /// # Unit Test
    ///
    /// ```
    /// use bytes::BytesMut;
    /// use stun::attribute::UserName;
    /// use stun::{Kind, MessageWriter};
    ///
    /// let result = [
    ///     0x00u8, 0x01, 0x00, 0x00, 0x21, 0x12, 0xa4, 0x42, 0x72, 0x6d, 0x49, 0x42,
    ///     0x72, 0x52, 0x64, 0x48, 0x57, 0x62, 0x4b, 0x2b, 0x00, 0x06, 0x00, 0x05,
    ///     0x70, 0x61, 0x6e, 0x64, 0x61, 0x00, 0x00, 0x00,
    /// ];
    ///
    /// let token = [
    ///     0x72u8, 0x6d, 0x49, 0x42, 0x72, 0x52, 0x64, 0x48, 0x57, 0x62, 0x4b, 0x2b,
    /// ];
    ///
    /// let mut buf = BytesMut::with_capacity(1280);
    /// let mut message = MessageWriter::new(Kind::BindingRequest, &token, &mut buf);
    /// message.append::<UserName>("panda");
    /// assert_eq!(&buf[..], &result);
    /// ```
    pub fn append<T: Property<'a>>(&mut self, value: T::Inner) {
        self.raw.put_u16(T::kind() as u16);

        // reserve the two length bytes, write the value, then go back and
        // fill the real size in.
        let os = self.raw.len();
        self.raw.put_u16(0);
        T::into(value, self.raw, self.token);

        let size = self.raw.len() - os - 2;
        self.raw[os..os + 2].copy_from_slice(&(size as u16).to_be_bytes());

        // attribute content is aligned to 4 bytes with zero padding.
        let psize = util::pad_size(size);
        if psize > 0 {
            self.raw.put(&ZERO_BUF[..psize]);
        }
    }

    /// finish the message: fix up the length field, then append
    /// `MESSAGE-INTEGRITY` (when a long-term key is given) and the
    /// terminal `FINGERPRINT`.
    ///
    /// # Unit Test
    ///
    /// ```
    /// use bytes::BytesMut;
    /// use stun::util::long_term_credential_digest;
    /// use stun::{Kind, MessageWriter};
    ///
    /// let plain = [
    ///     0x01u8, 0x01, 0x00, 0x08, 0x21, 0x12, 0xa4, 0x42, 0x72, 0x6d, 0x49, 0x42,
    ///     0x72, 0x52, 0x64, 0x48, 0x57, 0x62, 0x4b, 0x2b, 0x80, 0x28, 0x00, 0x04,
    ///     0x15, 0x56, 0x76, 0x63,
    /// ];
    ///
    /// let signed = [
    ///     0x00u8, 0x01, 0x00, 0x20, 0x21, 0x12, 0xa4, 0x42, 0x72, 0x6d, 0x49, 0x42,
    ///     0x72, 0x52, 0x64, 0x48, 0x57, 0x62, 0x4b, 0x2b, 0x00, 0x08, 0x00, 0x14,
    ///     0x45, 0x0e, 0x6e, 0x44, 0x52, 0x1e, 0xe8, 0xde, 0x2c, 0xf0, 0xfa, 0xb6,
    ///     0x9c, 0x5c, 0x19, 0x17, 0x98, 0xc6, 0xd9, 0xde, 0x80, 0x28, 0x00, 0x04,
    ///     0x4a, 0xa5, 0xab, 0x56,
    /// ];
    ///
    /// let token = [
    ///     0x72u8, 0x6d, 0x49, 0x42, 0x72, 0x52, 0x64, 0x48, 0x57, 0x62, 0x4b, 0x2b,
    /// ];
    ///
    /// let mut buf = BytesMut::with_capacity(1280);
    /// let mut message = MessageWriter::new(Kind::BindingResponse, &token, &mut buf);
    /// message.flush(None).unwrap();
    /// assert_eq!(&buf[..], &plain);
    ///
    /// let key = long_term_credential_digest("panda", "panda", "raspberry");
    /// let mut message = MessageWriter::new(Kind::BindingRequest, &token, &mut buf);
    /// message.flush(Some(&key)).unwrap();
    /// assert_eq!(&buf[..], &signed);
    /// ```
    pub fn flush(&mut self, auth: Option<&Auth>) -> Result<(), StunError> {
        self.set_len(self.raw.len() - 20);

        if let Some(auth) = auth {
            self.integrity(auth)?;
        }

        self.fingerprint();
        Ok(())
    }

    fn set_len(&mut self, len: usize) {
        self.raw[2..4].copy_from_slice(&(len as u16).to_be_bytes());
    }

    /// append the MessageIntegrity attribute.
    ///
    /// the digest covers the message up to this attribute, with the length
    /// field already adjusted to include it.
    fn integrity(&mut self, auth: &Auth) -> Result<(), StunError> {
        assert!(self.raw.len() >= 20);

        self.set_len(self.raw.len() + 4);
        let digest = util::hmac_sha1(auth, &[self.raw])?.into_bytes();

        self.raw.put_u16(AttrKind::MessageIntegrity as u16);
        self.raw.put_u16(20);
        self.raw.put(digest.as_slice());
        Ok(())
    }

    /// append the terminal Fingerprint attribute.
    ///
    /// the crc covers everything before the attribute itself, with the
    /// length field already adjusted to include it.
    fn fingerprint(&mut self) {
        self.set_len(self.raw.len() - 12);
        let crc = util::fingerprint(self.raw);

        self.raw.put_u16(AttrKind::Fingerprint as u16);
        self.raw.put_u16(4);
        self.raw.put_u32(crc);
    }
}

/// stun message reader.
#[derive(Debug)]
pub struct MessageReader<'a> {
    /// message type.
    pub kind: Kind,
    /// message transaction id.
    pub token: &'a [u8],
    /// message source bytes.
    bytes: &'a [u8],
    /// offset of the MessageIntegrity attribute, when present.
    valid_offset: u16,
    // message attribute list.
    attributes: &'a Attributes,
}

impl<'a> MessageReader<'a> {
    /// get an attribute from the message attribute list.
    ///
    /// # Unit Test
    ///
    /// ```
    /// use stun::attribute::UserName;
    /// use stun::{Attributes, MessageReader};
    ///
    /// let buffer = [
    ///     0x00u8, 0x01, 0x00, 0x00, 0x21, 0x12, 0xa4, 0x42, 0x72, 0x6d, 0x49, 0x42,
    ///     0x72, 0x52, 0x64, 0x48, 0x57, 0x62, 0x4b, 0x2b,
    /// ];
    ///
    /// let mut attributes = Attributes::default();
    /// let message = MessageReader::decode(&buffer[..], &mut attributes).unwrap();
    /// assert!(message.get::<UserName>().is_none());
    /// ```
    pub fn get<T: Property<'a>>(&self) -> Option<T::Inner> {
        let range = self.attributes.get(T::kind())?;
        let bytes = self.bytes;
        T::try_from(&bytes[range], self.token).ok()
    }

    /// check the MessageIntegrity attribute against a long-term key.
    ///
    /// the digest input is the message up to the integrity attribute, with
    /// the length field adjusted to end just past it; the comparison runs in
    /// constant time.
    ///
    /// # Unit Test
    ///
    /// ```
    /// use stun::util::long_term_credential_digest;
    /// use stun::{Attributes, MessageReader};
    ///
    /// let buffer = [
    ///     0x00u8, 0x03, 0x00, 0x50, 0x21, 0x12, 0xa4, 0x42, 0x64, 0x4f, 0x5a, 0x78,
    ///     0x6a, 0x56, 0x33, 0x62, 0x4b, 0x52, 0x33, 0x31, 0x00, 0x19, 0x00, 0x04,
    ///     0x11, 0x00, 0x00, 0x00, 0x00, 0x06, 0x00, 0x05, 0x70, 0x61, 0x6e, 0x64,
    ///     0x61, 0x00, 0x00, 0x00, 0x00, 0x14, 0x00, 0x09, 0x72, 0x61, 0x73, 0x70,
    ///     0x62, 0x65, 0x72, 0x72, 0x79, 0x00, 0x00, 0x00, 0x00, 0x15, 0x00, 0x10,
    ///     0x31, 0x63, 0x31, 0x33, 0x64, 0x32, 0x62, 0x32, 0x34, 0x35, 0x62, 0x33,
    ///     0x61, 0x37, 0x33, 0x34, 0x00, 0x08, 0x00, 0x14, 0xd6, 0x78, 0x26, 0x99,
    ///     0x0e, 0x15, 0x56, 0x15, 0xe5, 0xf4, 0x24, 0x74, 0xe2, 0x3c, 0x26, 0xc5,
    ///     0xb1, 0x03, 0xb2, 0x6d,
    /// ];
    ///
    /// let key = long_term_credential_digest("panda", "panda", "raspberry");
    ///
    /// let mut attributes = Attributes::default();
    /// let message = MessageReader::decode(&buffer[..], &mut attributes).unwrap();
    /// assert!(message.integrity(&key).is_ok());
    /// ```
    pub fn integrity(&self, auth: &Auth) -> Result<(), StunError> {
        if self.valid_offset < 20 {
            return Err(StunError::NotFoundIntegrity);
        }

        let integrity = self
            .get::<MessageIntegrity>()
            .ok_or(StunError::NotFoundIntegrity)?;

        // the length field is rewritten as if the integrity attribute were
        // the last one in the message.
        let size_buf = (self.valid_offset + 4).to_be_bytes();
        let body = [
            &self.bytes[0..2],
            &size_buf[..],
            &self.bytes[4..self.valid_offset as usize],
        ];

        util::hmac_sha1_verify(auth, &body, integrity)
    }

    /// decode the datagram as a stun message.
    ///
    /// # Unit Test
    ///
    /// ```
    /// use stun::{Attributes, Kind, MessageReader, StunError};
    ///
    /// let buffer = [
    ///     0x00u8, 0x01, 0x00, 0x00, 0x21, 0x12, 0xa4, 0x42, 0x72, 0x6d, 0x49, 0x42,
    ///     0x72, 0x52, 0x64, 0x48, 0x57, 0x62, 0x4b, 0x2b,
    /// ];
    ///
    /// let mut attributes = Attributes::default();
    /// let message = MessageReader::decode(&buffer[..], &mut attributes).unwrap();
    /// assert_eq!(message.kind, Kind::BindingRequest);
    /// assert_eq!(message.token, &buffer[8..20]);
    /// ```
    pub fn decode(
        bytes: &'a [u8],
        attributes: &'a mut Attributes,
    ) -> Result<MessageReader<'a>, StunError> {
        if !super::is_message(bytes) {
            return Err(StunError::NotMessage);
        }

        let kind_raw = util::as_u16(&bytes[..2]);
        let kind = Kind::try_from(kind_raw).map_err(|_| StunError::UnknownMethod(kind_raw))?;

        let size = util::as_u16(&bytes[2..4]) as usize + 20;
        if bytes.len() < size {
            return Err(StunError::MalformedAttribute);
        }

        let token = &bytes[8..20];

        attributes.clear();
        let mut unknown = Vec::new();
        let mut find_integrity = false;
        let mut valid_offset = 0;
        let mut offset = 20;

        while offset + 4 <= size {
            let key = u16::from_be_bytes([bytes[offset], bytes[offset + 1]]);

            // record the offset of the MessageIntegrity attribute; attributes
            // after it do not take part in the digest.
            if !find_integrity {
                valid_offset = offset as u16;
            }

            if key == AttrKind::MessageIntegrity as u16 {
                find_integrity = true;
            }

            let len = u16::from_be_bytes([bytes[offset + 2], bytes[offset + 3]]) as usize;
            offset += 4;
            if offset + len > size {
                return Err(StunError::MalformedAttribute);
            }

            let range = offset..offset + len;
            offset += len + util::pad_size(len);

            match AttrKind::try_from(key) {
                Ok(kind) => attributes.append(kind, range),
                // comprehension-required attributes we do not know force a
                // rejection; comprehension-optional ones are skipped.
                Err(_) if key < 0x8000 => unknown.push(key),
                Err(_) => (),
            }
        }

        if !unknown.is_empty() {
            return Err(StunError::UnknownComprehensionRequired(unknown));
        }

        Ok(Self {
            kind,
            token,
            bytes,
            valid_offset,
            attributes,
        })
    }
}

impl AsRef<[u8]> for MessageReader<'_> {
    fn as_ref(&self) -> &[u8] {
        self.bytes
    }
}
