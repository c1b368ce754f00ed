use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{anyhow, ensure, Result};
use bytes::BytesMut;
use tokio::net::UdpSocket;
use tokio::time::{sleep, timeout};

use stun::attribute::{
    Data, ErrKind, ErrorCode, Fingerprint, Lifetime, MessageIntegrity, Nonce, Realm,
    RequestedTransport, Software, UserName, XorMappedAddress, XorPeerAddress, XorRelayedAddress,
};
use stun::util::{fingerprint, long_term_credential_digest};
use stun::{Attributes, Kind, MessageReader, MessageWriter};

use relayd::auth::{StaticAuth, StaticCredential};
use relayd::server::{Options, Server};
use relayd::statistics::Statistics;
use relayd::SOFTWARE;

const TOKEN: [u8; 12] = [
    0x01, 0x02, 0x03, 0x04, 0x05, 0x06, 0x07, 0x08, 0x09, 0x0a, 0x0b, 0x0c,
];

async fn create_server() -> Result<(SocketAddr, Statistics)> {
    let conn = UdpSocket::bind("127.0.0.1:0").await?;
    let auth = Arc::new(StaticAuth::new(&[StaticCredential {
        username: "panda".to_string(),
        realm: "raspberry".to_string(),
        password: "panda".to_string(),
    }]));

    let server = Server::new(Options::new(auth, conn, "raspberry", "127.0.0.1".parse()?))?;
    let addr = server.local_addr();
    let stats = server.stats();
    tokio::spawn(server.serve());
    Ok((addr, stats))
}

struct Client {
    socket: UdpSocket,
    send: BytesMut,
    recv: [u8; 1500],
    key: [u8; 16],
}

impl Client {
    async fn new(server: SocketAddr) -> Result<Self> {
        let socket = UdpSocket::bind("127.0.0.1:0").await?;
        socket.connect(server).await?;

        Ok(Self {
            socket,
            send: BytesMut::with_capacity(1500),
            recv: [0u8; 1500],
            key: long_term_credential_digest("panda", "panda", "raspberry"),
        })
    }

    fn addr(&self) -> Result<SocketAddr> {
        Ok(self.socket.local_addr()?)
    }

    /// send a request and wait for its response.
    async fn request<F>(&mut self, kind: Kind, auth: bool, build: F) -> Result<usize>
    where
        F: FnOnce(&mut MessageWriter),
    {
        let mut message = MessageWriter::new(kind, &TOKEN, &mut self.send);
        build(&mut message);

        if auth {
            message.append::<UserName>("panda");
            message.append::<Realm>("raspberry");
            message.flush(Some(&self.key))?;
        } else {
            message.flush(None)?;
        }

        self.socket.send(&self.send).await?;
        Ok(timeout(Duration::from_secs(2), self.socket.recv(&mut self.recv)).await??)
    }

    async fn send_indication(&mut self, peer: SocketAddr, data: &[u8]) -> Result<()> {
        let mut message = MessageWriter::new(Kind::SendIndication, &TOKEN, &mut self.send);
        message.append::<XorPeerAddress>(peer);
        message.append::<Data>(data);
        message.flush(None)?;

        self.socket.send(&self.send).await?;
        Ok(())
    }

    async fn read(&mut self) -> Result<usize> {
        Ok(timeout(Duration::from_secs(2), self.socket.recv(&mut self.recv)).await??)
    }

    async fn expect_silence(&mut self) -> Result<()> {
        ensure!(
            timeout(Duration::from_millis(300), self.socket.recv(&mut self.recv))
                .await
                .is_err(),
            "expected no datagram from the server"
        );
        Ok(())
    }

    async fn allocate(&mut self) -> Result<SocketAddr> {
        let size = self
            .request(Kind::AllocateRequest, true, |m| {
                m.append::<RequestedTransport>(0x11);
            })
            .await?;

        let mut attributes = Attributes::default();
        let message = MessageReader::decode(&self.recv[..size], &mut attributes)?;
        ensure!(message.kind == Kind::AllocateResponse, "allocate failed");
        message.integrity(&self.key)?;
        message
            .get::<XorRelayedAddress>()
            .ok_or_else(|| anyhow!("missing relayed address"))
    }

    async fn create_permission(&mut self, peer: SocketAddr, lifetime: Option<u32>) -> Result<Kind> {
        let size = self
            .request(Kind::CreatePermissionRequest, true, |m| {
                m.append::<XorPeerAddress>(peer);
                if let Some(lifetime) = lifetime {
                    m.append::<Lifetime>(lifetime);
                }
            })
            .await?;

        let mut attributes = Attributes::default();
        let message = MessageReader::decode(&self.recv[..size], &mut attributes)?;
        Ok(message.kind)
    }

    async fn refresh(&mut self, lifetime: u32) -> Result<Kind> {
        let size = self
            .request(Kind::RefreshRequest, true, |m| {
                m.append::<Lifetime>(lifetime);
            })
            .await?;

        let mut attributes = Attributes::default();
        let message = MessageReader::decode(&self.recv[..size], &mut attributes)?;
        Ok(message.kind)
    }
}

#[tokio::test]
async fn binding_reflects_the_client_address() -> Result<()> {
    let (server, _) = create_server().await?;
    let mut client = Client::new(server).await?;

    let size = client.request(Kind::BindingRequest, false, |_| ()).await?;

    let mut attributes = Attributes::default();
    let message = MessageReader::decode(&client.recv[..size], &mut attributes)?;
    assert_eq!(message.kind, Kind::BindingResponse);
    assert_eq!(message.token, &TOKEN);
    assert_eq!(message.get::<XorMappedAddress>(), Some(client.addr()?));
    assert_eq!(message.get::<Software>(), Some(SOFTWARE));
    assert!(message.get::<MessageIntegrity>().is_none());

    // the fingerprint is the final attribute and covers everything
    // before it.
    let crc = message
        .get::<Fingerprint>()
        .ok_or_else(|| anyhow!("missing fingerprint"))?;
    assert_eq!(crc, fingerprint(&client.recv[..size - 8]));
    Ok(())
}

#[tokio::test]
async fn allocate_requires_credentials() -> Result<()> {
    let (server, _) = create_server().await?;
    let mut client = Client::new(server).await?;

    let size = client
        .request(Kind::AllocateRequest, false, |m| {
            m.append::<RequestedTransport>(0x11);
        })
        .await?;

    let mut attributes = Attributes::default();
    let message = MessageReader::decode(&client.recv[..size], &mut attributes)?;
    assert_eq!(message.kind, Kind::AllocateError);
    assert_eq!(message.token, &TOKEN);

    let error = message
        .get::<ErrorCode>()
        .ok_or_else(|| anyhow!("missing error code"))?;
    assert_eq!(error.code, ErrKind::Unauthorized as u16);
    assert_eq!(message.get::<Realm>(), Some("raspberry"));
    assert!(message.get::<Nonce>().is_some());
    Ok(())
}

#[tokio::test]
async fn allocate_then_send_reaches_the_peer() -> Result<()> {
    let (server, _) = create_server().await?;
    let mut client = Client::new(server).await?;

    let relay = client.allocate().await?;
    assert_eq!(relay.ip(), "127.0.0.1".parse::<std::net::IpAddr>()?);

    let peer = UdpSocket::bind("127.0.0.1:0").await?;
    let peer_addr = peer.local_addr()?;

    let kind = client.create_permission(peer_addr, None).await?;
    assert_eq!(kind, Kind::CreatePermissionResponse);

    client.send_indication(peer_addr, b"hello").await?;

    let mut buf = [0u8; 64];
    let (size, from) = timeout(Duration::from_secs(2), peer.recv_from(&mut buf)).await??;
    assert_eq!(&buf[..size], b"hello");
    assert_eq!(from, relay);

    // exactly one datagram leaves the relay, and an indication never
    // produces a response.
    assert!(timeout(Duration::from_millis(300), peer.recv_from(&mut buf))
        .await
        .is_err());
    client.expect_silence().await?;
    Ok(())
}

#[tokio::test]
async fn second_allocate_is_rejected() -> Result<()> {
    let (server, _) = create_server().await?;
    let mut client = Client::new(server).await?;
    client.allocate().await?;

    let size = client
        .request(Kind::AllocateRequest, true, |m| {
            m.append::<RequestedTransport>(0x11);
        })
        .await?;

    let mut attributes = Attributes::default();
    let message = MessageReader::decode(&client.recv[..size], &mut attributes)?;
    assert_eq!(message.kind, Kind::AllocateError);

    let error = message
        .get::<ErrorCode>()
        .ok_or_else(|| anyhow!("missing error code"))?;
    assert_eq!(error.code, ErrKind::BadRequest as u16);
    Ok(())
}

#[tokio::test]
async fn peer_data_becomes_a_data_indication() -> Result<()> {
    let (server, _) = create_server().await?;
    let mut client = Client::new(server).await?;

    let relay = client.allocate().await?;
    let peer = UdpSocket::bind("127.0.0.1:0").await?;
    let peer_addr = peer.local_addr()?;
    client.create_permission(peer_addr, None).await?;

    peer.send_to(b"world", relay).await?;

    let size = client.read().await?;
    let mut attributes = Attributes::default();
    let message = MessageReader::decode(&client.recv[..size], &mut attributes)?;
    assert_eq!(message.kind, Kind::DataIndication);
    assert_eq!(message.get::<Data>(), Some(&b"world"[..]));
    assert_eq!(message.get::<XorPeerAddress>(), Some(peer_addr));
    assert!(message.get::<Fingerprint>().is_some());

    // indications are unsolicited; the transaction id is fresh, not an
    // echo of anything the client sent.
    assert_ne!(message.token, &TOKEN);
    Ok(())
}

#[tokio::test]
async fn peer_without_permission_is_dropped() -> Result<()> {
    let (server, stats) = create_server().await?;
    let mut client = Client::new(server).await?;

    let relay = client.allocate().await?;
    let peer = UdpSocket::bind("127.0.0.1:0").await?;
    client.create_permission(peer.local_addr()?, None).await?;

    let stranger = UdpSocket::bind("127.0.0.1:0").await?;
    stranger.send_to(b"intruder", relay).await?;

    client.expect_silence().await?;
    sleep(Duration::from_millis(100)).await;
    assert!(stats.dropped_pkts() >= 1);
    Ok(())
}

#[tokio::test]
async fn refresh_zero_destroys_the_allocation() -> Result<()> {
    let (server, _) = create_server().await?;
    let mut client = Client::new(server).await?;

    client.allocate().await?;
    let peer = UdpSocket::bind("127.0.0.1:0").await?;
    let peer_addr = peer.local_addr()?;
    client.create_permission(peer_addr, None).await?;

    assert_eq!(client.refresh(0).await?, Kind::RefreshResponse);

    // the allocation is gone; a subsequent send is dropped on the floor.
    client.send_indication(peer_addr, b"late").await?;
    let mut buf = [0u8; 64];
    assert!(timeout(Duration::from_millis(300), peer.recv_from(&mut buf))
        .await
        .is_err());
    Ok(())
}

#[tokio::test]
async fn permission_lifetime_is_capped() -> Result<()> {
    let (server, _) = create_server().await?;
    let mut client = Client::new(server).await?;
    client.allocate().await?;

    let peer: SocketAddr = "10.0.0.3:5000".parse()?;
    assert_eq!(
        client.create_permission(peer, Some(3600)).await?,
        Kind::CreatePermissionResponse
    );
    assert_eq!(
        client.create_permission(peer, Some(3601)).await?,
        Kind::CreatePermissionError
    );
    Ok(())
}

#[tokio::test]
async fn refresh_without_allocation_is_an_error() -> Result<()> {
    let (server, _) = create_server().await?;
    let mut client = Client::new(server).await?;

    let size = client
        .request(Kind::RefreshRequest, true, |m| {
            m.append::<Lifetime>(0);
        })
        .await?;

    let mut attributes = Attributes::default();
    let message = MessageReader::decode(&client.recv[..size], &mut attributes)?;
    assert_eq!(message.kind, Kind::RefreshError);

    let error = message
        .get::<ErrorCode>()
        .ok_or_else(|| anyhow!("missing error code"))?;
    assert_eq!(error.code, ErrKind::BadRequest as u16);
    Ok(())
}
