pub mod allocator;
pub mod auth;
pub mod config;
pub mod processor;
pub mod server;
pub mod statistics;

use std::sync::Arc;

use tokio::net::UdpSocket;

use self::auth::StaticAuth;
use self::config::Config;
use self::server::{Options, Server};

/// software tag attached to every response.
pub const SOFTWARE: &str = concat!("relayd/", env!("CARGO_PKG_VERSION"));

/// Start the server from a parsed configuration.
///
/// split out of the main function so integration tests can run an
/// in-process server.
pub async fn startup(config: Arc<Config>) -> anyhow::Result<()> {
    let conn = UdpSocket::bind(config.turn.bind).await?;
    let auth = Arc::new(StaticAuth::from_config(&config));
    let options = Options::new(auth, conn, config.turn.realm.clone(), config.turn.bind.ip());

    Server::new(options)?.serve().await
}
