use std::io::ErrorKind;
use std::net::{IpAddr, SocketAddr};
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use bytes::BytesMut;
use futures::FutureExt;
use rand::distributions::Alphanumeric;
use rand::{thread_rng, Rng};
use tokio::net::UdpSocket;
use tokio::time::{interval, timeout};

use stun::attribute::{Data, Software, XorPeerAddress};
use stun::{Kind, MessageWriter};

use crate::allocator::ports::PortAllocator;
use crate::allocator::{Allocator, FiveTuple, PeerDataSink};
use crate::auth::Authenticator;
use crate::processor::{Env, Processor};
use crate::statistics::{Statistics, Stats};
use crate::SOFTWARE;

/// Server options.
pub struct Options {
    /// validates long-term credentials on every request except Binding.
    pub auth: Arc<dyn Authenticator>,
    /// the client-facing socket; the server is its only reader.
    pub conn: UdpSocket,
    /// realm announced in 401 responses and used for credential keys.
    pub realm: String,
    /// interface the relay sockets are bound on.
    pub relay_interface: IpAddr,
    /// cadence of the expiry sweep.
    pub collect_interval: Duration,
    /// permission lifetime when the request names none, in seconds.
    pub default_permission_lifetime: u64,
    /// upper bound a request may ask for, in seconds.
    pub max_permission_lifetime: u64,
    /// client datagrams larger than this are dropped as malformed.
    pub read_buffer: usize,
    /// deadline for writes toward the client.
    pub write_deadline: Duration,
}

impl Options {
    pub fn new(
        auth: Arc<dyn Authenticator>,
        conn: UdpSocket,
        realm: impl Into<String>,
        relay_interface: IpAddr,
    ) -> Self {
        Self {
            auth,
            conn,
            realm: realm.into(),
            relay_interface,
            collect_interval: Duration::from_secs(1),
            default_permission_lifetime: 60,
            max_permission_lifetime: 3600,
            read_buffer: 1024,
            write_deadline: Duration::from_secs(1),
        }
    }
}

/// The reactor: owns the client-facing socket, shuttles datagrams
/// between it and the protocol engine, and drives the periodic expiry
/// sweep.
pub struct Server {
    conn: Arc<UdpSocket>,
    local: SocketAddr,
    allocator: Arc<Allocator>,
    processor: Processor,
    stats: Statistics,
    start: Instant,
    collect_interval: Duration,
    read_buffer: usize,
    write_deadline: Duration,
}

impl Server {
    pub fn new(options: Options) -> anyhow::Result<Self> {
        let local = options.conn.local_addr()?;
        let conn = Arc::new(options.conn);
        let stats = Statistics::default();

        let sink = IndicationSink {
            conn: conn.clone(),
            write_deadline: options.write_deadline,
            stats: stats.clone(),
        };

        let allocator = Arc::new(Allocator::new(
            PortAllocator::new(options.relay_interface),
            Arc::new(sink),
            stats.clone(),
        ));

        let nonce: String = thread_rng()
            .sample_iter(&Alphanumeric)
            .take(16)
            .map(char::from)
            .collect();

        let processor = Processor::new(Env {
            realm: options.realm,
            nonce,
            software: SOFTWARE,
            external: local,
            auth: options.auth,
            allocator: allocator.clone(),
            stats: stats.clone(),
            default_permission_lifetime: options.default_permission_lifetime,
            max_permission_lifetime: options.max_permission_lifetime,
        });

        Ok(Self {
            conn,
            local,
            allocator,
            processor,
            stats,
            start: Instant::now(),
            collect_interval: options.collect_interval,
            read_buffer: options.read_buffer,
            write_deadline: options.write_deadline,
        })
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.local
    }

    pub fn stats(&self) -> Statistics {
        self.stats.clone()
    }

    /// serve the client socket until an unrecoverable socket error.
    ///
    /// one request and one response buffer are reused across iterations;
    /// responses go out in processing order with a bounded write
    /// deadline.
    pub async fn serve(mut self) -> anyhow::Result<()> {
        log::info!("relay server listening: addr={}", self.local);

        let allocator = self.allocator.clone();
        let collect_interval = self.collect_interval;
        let start = self.start;
        tokio::spawn(async move {
            let mut ticker = interval(collect_interval);
            loop {
                ticker.tick().await;
                allocator.collect(start.elapsed().as_secs());
            }
        });

        let mut buf = vec![0u8; self.read_buffer];
        loop {
            let (size, addr) = match self.conn.recv_from(&mut buf).await {
                Ok(ret) => ret,
                // a peer that went away between our write and its read is
                // reported here on some platforms; it is not our error.
                Err(e) if e.kind() == ErrorKind::ConnectionReset => continue,
                Err(e) => {
                    log::error!("client socket read failed: err={}", e);
                    return Err(e.into());
                }
            };

            // a datagram that fills the whole buffer was truncated by the
            // read and cannot be checked for integrity.
            if size >= buf.len() {
                self.stats.send(&[Stats::ErrorPkts(1)]);
                continue;
            }

            if !stun::is_message(&buf[..size]) {
                log::debug!("skipped non-stun datagram: addr={}, len={}", addr, size);
                continue;
            }

            self.stats.send(&[Stats::ReceivedPkts(1)]);
            let now = self.start.elapsed().as_secs();

            // a panic in message handling must not take the reactor down.
            let ret = AssertUnwindSafe(self.processor.process(&buf[..size], addr, now))
                .catch_unwind()
                .await;

            match ret {
                Err(_) => {
                    log::error!("panic while processing message: addr={}", addr);
                    self.stats.send(&[Stats::ErrorPkts(1)]);
                }
                Ok(Err(e)) => {
                    log::warn!("failed to process message: addr={}, err={}", addr, e);
                    self.stats.send(&[Stats::ErrorPkts(1)]);
                }
                Ok(Ok(None)) => (),
                Ok(Ok(Some(bytes))) => {
                    match timeout(self.write_deadline, self.conn.send_to(bytes, addr)).await {
                        Err(_) => log::warn!("response write timed out: addr={}", addr),
                        Ok(Err(e)) => log::warn!("response write failed: addr={}, err={}", addr, e),
                        Ok(Ok(_)) => self.stats.send(&[Stats::ResponsePkts(1)]),
                    }
                }
            }
        }
    }
}

/// Wraps datagrams from peers into Data indications toward the client
/// side of the five-tuple.
///
/// this is the reactor's half of the peer datapath; holding only the
/// client socket keeps the allocator free of any back-reference to the
/// server.
struct IndicationSink {
    conn: Arc<UdpSocket>,
    write_deadline: Duration,
    stats: Statistics,
}

#[async_trait]
impl PeerDataSink for IndicationSink {
    async fn peer_data(&self, bytes: &[u8], tuple: FiveTuple, peer: SocketAddr) {
        // indications are unsolicited, so each one gets a fresh random
        // transaction id.
        let token: [u8; 12] = rand::random();

        let mut buf = BytesMut::with_capacity(bytes.len() + 64);
        let mut pack = MessageWriter::new(Kind::DataIndication, &token, &mut buf);
        pack.append::<XorPeerAddress>(peer);
        pack.append::<Data>(bytes);
        pack.append::<Software>(SOFTWARE);
        if let Err(e) = pack.flush(None) {
            log::error!("failed to build data indication: err={}", e);
            return;
        }

        match timeout(self.write_deadline, self.conn.send_to(&buf, tuple.client)).await {
            Err(_) => log::warn!("data indication write timed out: client={}", tuple.client),
            Ok(Err(e)) => {
                log::error!("data indication write failed: client={}, err={}", tuple.client, e)
            }
            Ok(Ok(_)) => {
                self.stats.send(&[Stats::RelayedPkts(1)]);
                log::debug!(
                    "relayed peer data: peer={}, client={}, len={}",
                    peer,
                    tuple.client,
                    bytes.len()
                );
            }
        }
    }
}
