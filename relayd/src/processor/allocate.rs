use bytes::BytesMut;

use stun::attribute::{ErrKind, Lifetime, RequestedTransport, Software, XorMappedAddress, XorRelayedAddress};
use stun::{Kind, MessageReader, MessageWriter, StunError};

use super::{reject, verify, Context};
use crate::allocator::{AllocError, FiveTuple, Transport, DEFAULT_LIFETIME};

/// process allocate request
///
/// an allocation is the server-side reservation of a relay transport
/// address on behalf of the client's five-tuple. the request must name
/// UDP in REQUESTED-TRANSPORT and pass the long-term credential check;
/// the response carries the relayed address, the reflexive address of
/// the client and the granted lifetime.
pub async fn process<'a>(
    ctx: Context,
    reader: MessageReader<'_>,
    bytes: &'a mut BytesMut,
) -> Result<Option<&'a [u8]>, StunError> {
    let key = match verify(&ctx, &reader).await {
        Some(key) => key,
        None => return reject(&ctx, &reader, bytes, ErrKind::Unauthorized),
    };

    let proto = match reader.get::<RequestedTransport>() {
        Some(proto) => proto,
        None => return reject(&ctx, &reader, bytes, ErrKind::BadRequest),
    };

    let transport = match Transport::from_protocol(proto) {
        Ok(transport) => transport,
        Err(_) => return reject(&ctx, &reader, bytes, ErrKind::BadRequest),
    };

    let tuple = FiveTuple {
        client: ctx.addr,
        server: ctx.env.external,
        transport,
    };

    let relay = match ctx.env.allocator.create(tuple, ctx.now).await {
        Ok(relay) => relay,
        Err(AllocError::AllocationExists) => {
            return reject(&ctx, &reader, bytes, ErrKind::BadRequest);
        }
        Err(e) => {
            log::error!("failed to allocate: addr={}, err={}", ctx.addr, e);
            return reject(&ctx, &reader, bytes, ErrKind::ServerError);
        }
    };

    log::info!("allocated: addr={}, relay={}", ctx.addr, relay);

    let mut pack = MessageWriter::derive(Kind::AllocateResponse, &reader, bytes);
    pack.append::<XorRelayedAddress>(relay);
    pack.append::<XorMappedAddress>(ctx.addr);
    pack.append::<Lifetime>(DEFAULT_LIFETIME as u32);
    pack.append::<Software>(ctx.env.software);
    pack.flush(Some(&key))?;
    Ok(Some(&bytes[..]))
}
