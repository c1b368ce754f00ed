use stun::attribute::{Data, XorPeerAddress};
use stun::{MessageReader, StunError};

use super::Context;
use crate::statistics::Stats;

/// process send indication
///
/// the message must contain both XOR-PEER-ADDRESS and DATA; if either is
/// missing or the permission check fails the datagram is discarded. an
/// indication never elicits a response.
pub async fn process<'a>(
    ctx: Context,
    reader: MessageReader<'_>,
) -> Result<Option<&'a [u8]>, StunError> {
    let (peer, data) = match (reader.get::<XorPeerAddress>(), reader.get::<Data>()) {
        (Some(peer), Some(data)) => (peer, data),
        _ => {
            log::debug!("send indication missing peer or data: addr={}", ctx.addr);
            return Ok(None);
        }
    };

    let tuple = ctx.tuple();
    match ctx.env.allocator.send(&tuple, peer, data).await {
        Ok(size) => {
            ctx.env.stats.send(&[Stats::RelayedPkts(1)]);
            log::debug!("relayed to peer: addr={}, peer={}, len={}", ctx.addr, peer, size);
        }
        Err(e) => {
            ctx.env.stats.send(&[Stats::DroppedPkts(1)]);
            log::warn!("send indication dropped: addr={}, peer={}, err={}", ctx.addr, peer, e);
        }
    }

    Ok(None)
}
