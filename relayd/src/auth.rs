use std::net::SocketAddr;

use ahash::AHashMap;
use async_trait::async_trait;
use thiserror::Error;

use stun::attribute::{Realm, UserName};
use stun::util::long_term_credential_digest;
use stun::{Auth, MessageReader};

use crate::config::Config;

#[derive(Error, Debug, PartialEq, Eq)]
pub enum AuthError {
    #[error("long-term credentials missing or unknown")]
    Unauthorized,
    #[error("message integrity check failed")]
    IntegrityFailed,
}

/// Validates the long-term credentials carried by a request and hands
/// back the key the response must be signed with.
///
/// indications are never authenticated; the protocol engine only consults
/// the authenticator for requests.
#[async_trait]
pub trait Authenticator: Send + Sync {
    async fn auth(&self, addr: SocketAddr, message: &MessageReader<'_>) -> Result<Auth, AuthError>;
}

/// A static credential, `(username, realm, password)`.
///
/// mutable only at configuration time, read-only at request time.
#[derive(Debug, Clone)]
pub struct StaticCredential {
    pub username: String,
    pub realm: String,
    pub password: String,
}

/// Credential store backed by a fixed credential list.
///
/// the 16-byte long-term key digest is precomputed per credential at
/// construction, so the request path does a single map lookup and an
/// hmac check without allocating.
pub struct StaticAuth {
    keys: AHashMap<String, (String, Auth)>,
}

impl StaticAuth {
    pub fn new(credentials: &[StaticCredential]) -> Self {
        Self {
            keys: credentials
                .iter()
                .map(|it| {
                    (
                        it.username.clone(),
                        (
                            it.realm.clone(),
                            long_term_credential_digest(&it.username, &it.password, &it.realm),
                        ),
                    )
                })
                .collect(),
        }
    }

    pub fn from_config(config: &Config) -> Self {
        let credentials: Vec<StaticCredential> = config
            .auth
            .static_credentials
            .iter()
            .map(|(username, password)| StaticCredential {
                username: username.clone(),
                realm: config.turn.realm.clone(),
                password: password.clone(),
            })
            .collect();

        Self::new(&credentials)
    }
}

#[async_trait]
impl Authenticator for StaticAuth {
    async fn auth(&self, _: SocketAddr, message: &MessageReader<'_>) -> Result<Auth, AuthError> {
        let username = message.get::<UserName>().ok_or(AuthError::Unauthorized)?;
        let realm = message.get::<Realm>().ok_or(AuthError::Unauthorized)?;

        let (expected_realm, key) = self.keys.get(username).ok_or(AuthError::Unauthorized)?;
        if expected_realm != realm {
            return Err(AuthError::Unauthorized);
        }

        message
            .integrity(key)
            .map_err(|_| AuthError::IntegrityFailed)?;
        Ok(*key)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use bytes::BytesMut;
    use stun::{Attributes, Kind, MessageWriter};

    const TOKEN: [u8; 12] = [
        0x6c, 0x46, 0x62, 0x54, 0x75, 0x4b, 0x44, 0x51, 0x46, 0x48, 0x4c, 0x71,
    ];

    fn store() -> StaticAuth {
        StaticAuth::new(&[StaticCredential {
            username: "panda".to_string(),
            realm: "raspberry".to_string(),
            password: "panda".to_string(),
        }])
    }

    fn build(username: Option<&str>, password: &str) -> BytesMut {
        let mut buf = BytesMut::with_capacity(1280);
        let mut message = MessageWriter::new(Kind::AllocateRequest, &TOKEN, &mut buf);
        if let Some(username) = username {
            message.append::<UserName>(username);
        }

        message.append::<Realm>("raspberry");
        let key = long_term_credential_digest(username.unwrap_or("panda"), password, "raspberry");
        message.flush(Some(&key)).unwrap();
        buf
    }

    #[tokio::test]
    async fn positive() {
        let addr = "127.0.0.1:4000".parse().unwrap();
        let bytes = build(Some("panda"), "panda");

        let mut attributes = Attributes::default();
        let message = MessageReader::decode(&bytes, &mut attributes).unwrap();
        let key = store().auth(addr, &message).await.unwrap();

        // the returned key signs a response the same store accepts.
        let mut buf = BytesMut::with_capacity(1280);
        let mut response = MessageWriter::new(Kind::AllocateResponse, &TOKEN, &mut buf);
        response.append::<UserName>("panda");
        response.append::<Realm>("raspberry");
        response.flush(Some(&key)).unwrap();

        let mut attributes = Attributes::default();
        let response = MessageReader::decode(&buf, &mut attributes).unwrap();
        assert!(store().auth(addr, &response).await.is_ok());
    }

    #[tokio::test]
    async fn wrong_password() {
        let addr = "127.0.0.1:4000".parse().unwrap();
        let bytes = build(Some("panda"), "raspberry");

        let mut attributes = Attributes::default();
        let message = MessageReader::decode(&bytes, &mut attributes).unwrap();
        assert_eq!(
            store().auth(addr, &message).await,
            Err(AuthError::IntegrityFailed)
        );
    }

    #[tokio::test]
    async fn unknown_username() {
        let addr = "127.0.0.1:4000".parse().unwrap();
        let bytes = build(Some("bear"), "panda");

        let mut attributes = Attributes::default();
        let message = MessageReader::decode(&bytes, &mut attributes).unwrap();
        assert_eq!(
            store().auth(addr, &message).await,
            Err(AuthError::Unauthorized)
        );
    }

    #[tokio::test]
    async fn missing_username() {
        let addr = "127.0.0.1:4000".parse().unwrap();
        let bytes = build(None, "panda");

        let mut attributes = Attributes::default();
        let message = MessageReader::decode(&bytes, &mut attributes).unwrap();
        assert_eq!(
            store().auth(addr, &message).await,
            Err(AuthError::Unauthorized)
        );
    }
}
