pub mod ports;

use std::fmt;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};

use ahash::AHashMap;
use async_trait::async_trait;
use parking_lot::Mutex;
use thiserror::Error;
use tokio::net::UdpSocket;
use tokio::task::JoinHandle;

use self::ports::PortAllocator;
use crate::statistics::{Statistics, Stats};

/// allocation lifetime granted by a successful Allocate, in seconds.
pub const DEFAULT_LIFETIME: u64 = 600;

#[derive(Error, Debug)]
pub enum AllocError {
    #[error("an allocation already exists for this five-tuple")]
    AllocationExists,
    #[error("no allocation for this five-tuple")]
    NoAllocation,
    #[error("no permission installed for this peer")]
    NoPermission,
    #[error("unsupported transport protocol")]
    UnsupportedTransport,
    #[error("relay port range exhausted")]
    Exhausted,
    #[error(transparent)]
    Transport(#[from] std::io::Error),
}

/// Transport protocol of an allocation five-tuple.
///
/// only protocol number 17 (UDP) is relayed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Transport {
    Udp,
}

impl Transport {
    pub fn from_protocol(proto: u8) -> Result<Self, AllocError> {
        match proto {
            17 => Ok(Self::Udp),
            _ => Err(AllocError::UnsupportedTransport),
        }
    }
}

/// The stable key identifying an allocation from the server's
/// perspective.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct FiveTuple {
    pub client: SocketAddr,
    pub server: SocketAddr,
    pub transport: Transport,
}

impl fmt::Display for FiveTuple {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}->{}/udp", self.client, self.server)
    }
}

/// Sink for datagrams arriving on a relay socket from a peer holding a
/// valid permission.
///
/// the reactor implements this by wrapping the payload in a Data
/// indication toward the client of the five-tuple.
#[async_trait]
pub trait PeerDataSink: Send + Sync {
    async fn peer_data(&self, bytes: &[u8], tuple: FiveTuple, peer: SocketAddr);
}

/// A manually advanced timeline, in seconds.
///
/// the collector tick publishes the current time here so that the relay
/// reader tasks can check permission expiry without their own clock.
#[derive(Debug, Default)]
pub struct Timer(AtomicU64);

impl Timer {
    pub fn get(&self) -> u64 {
        self.0.load(Ordering::Relaxed)
    }

    pub fn set(&self, now: u64) {
        self.0.store(now, Ordering::Relaxed)
    }
}

struct Allocation {
    relay: SocketAddr,
    socket: Arc<UdpSocket>,
    permissions: AHashMap<SocketAddr, u64>,
    expires: u64,
    reader: JoinHandle<()>,
}

#[derive(Default)]
struct Table {
    allocations: AHashMap<FiveTuple, Allocation>,
    // maps relay socket identity back to its five-tuple so inbound peer
    // datagrams can be routed.
    relays: AHashMap<SocketAddr, FiveTuple>,
}

// shared with the relay reader tasks, which hold it weakly so that
// dropping the allocator lets them wind down.
struct Inner {
    sink: Arc<dyn PeerDataSink>,
    table: Mutex<Table>,
    timer: Timer,
    stats: Statistics,
}

impl Inner {
    /// route a datagram that arrived on a relay socket: map the socket
    /// identity back to its five-tuple and check the sender against the
    /// allocation's permission set.
    fn route(&self, relay: &SocketAddr, peer: &SocketAddr) -> Option<FiveTuple> {
        let table = self.table.lock();
        let tuple = table.relays.get(relay)?;
        let allocation = table.allocations.get(tuple)?;

        match allocation.permissions.get(peer) {
            Some(expires) if *expires > self.timer.get() => Some(*tuple),
            _ => None,
        }
    }

    /// flag an allocation for removal at the next collect.
    fn mark_expired(&self, tuple: &FiveTuple) {
        if let Some(allocation) = self.table.lock().allocations.get_mut(tuple) {
            allocation.expires = 0;
        }
    }
}

/// The authoritative store for `FiveTuple -> Allocation`.
///
/// it owns the port allocator and the peer-side sockets; every operation
/// is atomic relative to the others.
pub struct Allocator {
    ports: PortAllocator,
    inner: Arc<Inner>,
}

impl Allocator {
    pub fn new(ports: PortAllocator, sink: Arc<dyn PeerDataSink>, stats: Statistics) -> Self {
        Self {
            ports,
            inner: Arc::new(Inner {
                sink,
                table: Mutex::default(),
                timer: Timer::default(),
                stats,
            }),
        }
    }

    /// create an allocation for a five-tuple.
    ///
    /// binds a relay socket and spawns its reader task; the reader hands
    /// permitted peer datagrams to the sink. at most one allocation may
    /// exist per five-tuple.
    pub async fn create(&self, tuple: FiveTuple, now: u64) -> Result<SocketAddr, AllocError> {
        if self.inner.table.lock().allocations.contains_key(&tuple) {
            return Err(AllocError::AllocationExists);
        }

        let (relay, socket) = self.ports.allocate().await?;
        let socket = Arc::new(socket);
        let reader = tokio::spawn(relay_reader(
            Arc::downgrade(&self.inner),
            socket.clone(),
            tuple,
            relay,
        ));

        let mut table = self.inner.table.lock();
        if table.allocations.contains_key(&tuple) {
            // lost a race against a retransmit; give the socket back.
            reader.abort();
            return Err(AllocError::AllocationExists);
        }

        table.relays.insert(relay, tuple);
        table.allocations.insert(
            tuple,
            Allocation {
                relay,
                socket,
                permissions: AHashMap::new(),
                expires: now + DEFAULT_LIFETIME,
                reader,
            },
        );

        Ok(relay)
    }

    /// extend the allocation's lifetime.
    pub fn refresh(&self, tuple: &FiveTuple, until: u64) -> Result<(), AllocError> {
        let mut table = self.inner.table.lock();
        let allocation = table
            .allocations
            .get_mut(tuple)
            .ok_or(AllocError::NoAllocation)?;

        allocation.expires = until;
        Ok(())
    }

    /// destroy an allocation: stop its reader, release the relay socket,
    /// drop all permissions.
    pub fn remove(&self, tuple: &FiveTuple) -> Result<(), AllocError> {
        let allocation = {
            let mut table = self.inner.table.lock();
            let allocation = table
                .allocations
                .remove(tuple)
                .ok_or(AllocError::NoAllocation)?;

            table.relays.remove(&allocation.relay);
            allocation
        };

        // cancelling the reader drops the last long-lived user of the
        // socket, which closes it.
        allocation.reader.abort();
        Ok(())
    }

    /// install or refresh a permission; idempotent.
    pub fn create_permission(
        &self,
        tuple: &FiveTuple,
        peer: SocketAddr,
        until: u64,
    ) -> Result<(), AllocError> {
        let mut table = self.inner.table.lock();
        let allocation = table
            .allocations
            .get_mut(tuple)
            .ok_or(AllocError::NoAllocation)?;

        allocation.permissions.insert(peer, until);
        Ok(())
    }

    /// relay a client datagram out the allocation's relay socket.
    ///
    /// the permission for the destination peer must be present and
    /// unexpired.
    pub async fn send(
        &self,
        tuple: &FiveTuple,
        peer: SocketAddr,
        bytes: &[u8],
    ) -> Result<usize, AllocError> {
        let socket = {
            let table = self.inner.table.lock();
            let allocation = table.allocations.get(tuple).ok_or(AllocError::NoAllocation)?;

            match allocation.permissions.get(&peer) {
                Some(expires) if *expires > self.inner.timer.get() => allocation.socket.clone(),
                _ => return Err(AllocError::NoPermission),
            }
        };

        Ok(socket.send_to(bytes, peer).await?)
    }

    /// sweep the table: prune expired permissions and remove expired
    /// allocations.
    pub fn collect(&self, now: u64) {
        self.inner.timer.set(now);

        let dead = {
            let mut table = self.inner.table.lock();
            for allocation in table.allocations.values_mut() {
                allocation.permissions.retain(|_, expires| *expires > now);
            }

            let expired: Vec<FiveTuple> = table
                .allocations
                .iter()
                .filter(|(_, allocation)| allocation.expires <= now)
                .map(|(tuple, _)| *tuple)
                .collect();

            let mut dead = Vec::with_capacity(expired.len());
            for tuple in expired {
                if let Some(allocation) = table.allocations.remove(&tuple) {
                    table.relays.remove(&allocation.relay);
                    dead.push((tuple, allocation));
                }
            }

            dead
        };

        for (tuple, allocation) in dead {
            log::info!("allocation expired: tuple={}, relay={}", tuple, allocation.relay);
            allocation.reader.abort();
        }
    }

    /// number of live allocations.
    pub fn len(&self) -> usize {
        self.inner.table.lock().allocations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// reader task of one relay socket.
///
/// exits when the socket read fails or the task is cancelled during
/// allocation teardown.
async fn relay_reader(
    inner: Weak<Inner>,
    socket: Arc<UdpSocket>,
    tuple: FiveTuple,
    relay: SocketAddr,
) {
    let mut buf = vec![0u8; 2048];

    loop {
        let (size, peer) = match socket.recv_from(&mut buf).await {
            Ok(ret) => ret,
            Err(e) => {
                log::error!("relay socket read failed: relay={}, err={}", relay, e);
                if let Some(inner) = inner.upgrade() {
                    inner.mark_expired(&tuple);
                }

                break;
            }
        };

        let inner = match inner.upgrade() {
            Some(inner) => inner,
            None => break,
        };

        match inner.route(&relay, &peer) {
            Some(tuple) => inner.sink.peer_data(&buf[..size], tuple, peer).await,
            None => {
                log::warn!(
                    "dropped peer datagram without permission: relay={}, peer={}",
                    relay,
                    peer
                );
                inner.stats.send(&[Stats::DroppedPkts(1)]);
            }
        }
    }
}
