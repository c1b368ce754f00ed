use bytes::BytesMut;

use stun::attribute::{Software, XorMappedAddress};
use stun::{Kind, MessageReader, MessageWriter, StunError};

use super::Context;

/// process binding request
///
/// the server copies the source transport address of the request into an
/// XOR-MAPPED-ADDRESS attribute of the response, so the client can learn
/// its reflexive transport address. binding is the one request that is
/// not authenticated.
pub fn process<'a>(
    ctx: Context,
    reader: MessageReader<'_>,
    bytes: &'a mut BytesMut,
) -> Result<Option<&'a [u8]>, StunError> {
    let mut pack = MessageWriter::derive(Kind::BindingResponse, &reader, bytes);
    pack.append::<XorMappedAddress>(ctx.addr);
    pack.append::<Software>(ctx.env.software);
    pack.flush(None)?;

    log::debug!("binding request: addr={}", ctx.addr);
    Ok(Some(&bytes[..]))
}
