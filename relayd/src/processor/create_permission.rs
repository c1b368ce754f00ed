use bytes::BytesMut;

use stun::attribute::{ErrKind, Lifetime, Software, XorPeerAddress};
use stun::{Kind, MessageReader, MessageWriter, StunError};

use super::{reject, verify, Context};

/// process create permission request
///
/// installs or refreshes the permission for the peer named by
/// XOR-PEER-ADDRESS under the client's allocation. retransmitted
/// requests simply refresh the permission; a request without a matching
/// allocation is rejected rather than allocating implicitly.
pub async fn process<'a>(
    ctx: Context,
    reader: MessageReader<'_>,
    bytes: &'a mut BytesMut,
) -> Result<Option<&'a [u8]>, StunError> {
    let key = match verify(&ctx, &reader).await {
        Some(key) => key,
        None => return reject(&ctx, &reader, bytes, ErrKind::Unauthorized),
    };

    let peer = match reader.get::<XorPeerAddress>() {
        Some(peer) => peer,
        None => return reject(&ctx, &reader, bytes, ErrKind::BadRequest),
    };

    let lifetime = match reader.get::<Lifetime>() {
        Some(lifetime) if u64::from(lifetime) > ctx.env.max_permission_lifetime => {
            return reject(&ctx, &reader, bytes, ErrKind::BadRequest);
        }
        Some(lifetime) => u64::from(lifetime),
        None => ctx.env.default_permission_lifetime,
    };

    let tuple = ctx.tuple();
    if let Err(e) = ctx
        .env
        .allocator
        .create_permission(&tuple, peer, ctx.now + lifetime)
    {
        log::warn!("failed to create permission: addr={}, peer={}, err={}", ctx.addr, peer, e);
        return reject(&ctx, &reader, bytes, ErrKind::BadRequest);
    }

    log::info!("permission created: addr={}, peer={}, lifetime={}", ctx.addr, peer, lifetime);

    let mut pack = MessageWriter::derive(Kind::CreatePermissionResponse, &reader, bytes);
    pack.append::<Software>(ctx.env.software);
    pack.flush(Some(&key))?;
    Ok(Some(&bytes[..]))
}
