use bytes::BytesMut;

use stun::attribute::{ErrKind, Lifetime, Software};
use stun::{Kind, MessageReader, MessageWriter, StunError};

use super::{reject, verify, Context};

/// process refresh request
///
/// the request carries only LIFETIME: a zero (or absent) lifetime
/// deletes the allocation, a non-zero one moves its expiry forward.
/// either way a successful refresh is an empty success response.
pub async fn process<'a>(
    ctx: Context,
    reader: MessageReader<'_>,
    bytes: &'a mut BytesMut,
) -> Result<Option<&'a [u8]>, StunError> {
    let key = match verify(&ctx, &reader).await {
        Some(key) => key,
        None => return reject(&ctx, &reader, bytes, ErrKind::Unauthorized),
    };

    let lifetime = reader.get::<Lifetime>().unwrap_or(0);
    let tuple = ctx.tuple();

    let ret = if lifetime > 0 {
        ctx.env.allocator.refresh(&tuple, ctx.now + lifetime as u64)
    } else {
        ctx.env.allocator.remove(&tuple)
    };

    if let Err(e) = ret {
        log::warn!("failed to refresh: addr={}, lifetime={}, err={}", ctx.addr, lifetime, e);
        return reject(&ctx, &reader, bytes, ErrKind::BadRequest);
    }

    log::info!("refresh: addr={}, lifetime={}", ctx.addr, lifetime);

    let mut pack = MessageWriter::derive(Kind::RefreshResponse, &reader, bytes);
    pack.append::<Lifetime>(lifetime);
    pack.append::<Software>(ctx.env.software);
    pack.flush(Some(&key))?;
    Ok(Some(&bytes[..]))
}
