mod allocate;
mod binding;
mod create_permission;
mod indication;
mod refresh;

use std::convert::{TryFrom, TryInto};
use std::net::SocketAddr;
use std::sync::Arc;

use bytes::BytesMut;

use stun::attribute::{ErrKind, Error, ErrorCode, Nonce, Realm, Software};
use stun::{util, Auth, Decoder, Kind, MessageReader, MessageWriter, StunError};

use crate::allocator::{Allocator, FiveTuple, Transport};
use crate::auth::Authenticator;
use crate::statistics::Statistics;

/// Shared surroundings of all request processing.
pub struct Env {
    pub realm: String,
    pub nonce: String,
    pub software: &'static str,
    /// the client-facing address of the server, the `server` half of
    /// every five-tuple.
    pub external: SocketAddr,
    pub auth: Arc<dyn Authenticator>,
    pub allocator: Arc<Allocator>,
    pub stats: Statistics,
    pub default_permission_lifetime: u64,
    pub max_permission_lifetime: u64,
}

/// Per-request context: created when a datagram arrives, dropped when
/// the response is written or the message is discarded.
pub struct Context {
    pub env: Arc<Env>,
    pub addr: SocketAddr,
    pub now: u64,
}

impl Context {
    pub fn tuple(&self) -> FiveTuple {
        FiveTuple {
            client: self.addr,
            server: self.env.external,
            transport: Transport::Udp,
        }
    }
}

/// Classifies decoded messages and runs the per-method state
/// transitions; owns the reusable decode cache and response buffer.
pub struct Processor {
    env: Arc<Env>,
    decoder: Decoder,
    writer: BytesMut,
}

impl Processor {
    pub fn new(env: Env) -> Self {
        Self {
            env: Arc::new(env),
            decoder: Decoder::default(),
            writer: BytesMut::with_capacity(1280),
        }
    }

    /// process one datagram and return the response bytes, when the
    /// message calls for a response.
    pub async fn process<'c, 'a: 'c>(
        &'a mut self,
        bytes: &'a [u8],
        addr: SocketAddr,
        now: u64,
    ) -> Result<Option<&'c [u8]>, StunError> {
        let reader = match self.decoder.decode(bytes) {
            Ok(reader) => reader,
            // a request whose header survived still gets a 400 so the
            // client stops retransmitting; indications are just dropped.
            Err(StunError::MalformedAttribute) | Err(StunError::UnknownComprehensionRequired(_)) => {
                return Ok(reject_malformed(&self.env, bytes, &mut self.writer));
            }
            Err(e) => return Err(e),
        };

        let ctx = Context {
            env: self.env.clone(),
            addr,
            now,
        };

        match reader.kind {
            Kind::BindingRequest => binding::process(ctx, reader, &mut self.writer),
            Kind::AllocateRequest => allocate::process(ctx, reader, &mut self.writer).await,
            Kind::RefreshRequest => refresh::process(ctx, reader, &mut self.writer).await,
            Kind::CreatePermissionRequest => {
                create_permission::process(ctx, reader, &mut self.writer).await
            }
            Kind::SendIndication => indication::process(ctx, reader).await,
            kind if kind.is_request() => {
                log::warn!("unsupported request type: addr={}, kind={:?}", addr, kind);
                reject(&ctx, &reader, &mut self.writer, ErrKind::BadRequest)
            }
            _ => Ok(None),
        }
    }
}

/// build an error response for a request, echoing its transaction id.
pub(crate) fn reject<'a>(
    ctx: &Context,
    reader: &MessageReader<'_>,
    bytes: &'a mut BytesMut,
    err: ErrKind,
) -> Result<Option<&'a [u8]>, StunError> {
    let method = match reader.kind.to_error() {
        Some(method) => method,
        None => return Ok(None),
    };

    let mut pack = MessageWriter::derive(method, reader, bytes);
    pack.append::<ErrorCode>(Error::from(err));
    pack.append::<Realm>(&ctx.env.realm);
    pack.append::<Nonce>(&ctx.env.nonce);
    pack.append::<Software>(ctx.env.software);
    pack.flush(None)?;
    Ok(Some(&bytes[..]))
}

/// build a 400 from nothing but the raw header, for messages whose
/// attribute list failed to decode.
fn reject_malformed<'a>(env: &Env, bytes: &[u8], writer: &'a mut BytesMut) -> Option<&'a [u8]> {
    let kind = Kind::try_from(util::as_u16(&bytes[..2])).ok()?;
    let method = kind.to_error()?;
    let token: [u8; 12] = bytes[8..20].try_into().ok()?;

    let mut pack = MessageWriter::new(method, &token, writer);
    pack.append::<ErrorCode>(Error::from(ErrKind::BadRequest));
    pack.append::<Realm>(&env.realm);
    pack.append::<Nonce>(&env.nonce);
    pack.append::<Software>(env.software);
    pack.flush(None).ok()?;
    Some(&writer[..])
}

/// authenticate a request through the environment's authenticator.
///
/// every request except Binding must carry a valid MESSAGE-INTEGRITY;
/// the returned key also signs the response.
pub(crate) async fn verify(ctx: &Context, reader: &MessageReader<'_>) -> Option<Auth> {
    match ctx.env.auth.auth(ctx.addr, reader).await {
        Ok(key) => Some(key),
        Err(e) => {
            log::info!("message authentication failed: addr={}, err={}", ctx.addr, e);
            None
        }
    }
}
