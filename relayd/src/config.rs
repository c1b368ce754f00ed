use std::{collections::HashMap, fs::read_to_string, net::SocketAddr};

use clap::Parser;
use serde::Deserialize;

#[derive(Deserialize, Debug)]
pub struct Turn {
    /// turn server listen address
    ///
    /// The UDP address and port the server is bound to. The relay sockets
    /// created for allocations are bound on the same interface with
    /// OS-picked ephemeral ports.
    #[serde(default = "Turn::bind")]
    pub bind: SocketAddr,

    /// turn server realm
    ///
    /// specify the domain where the server is located. together with the
    /// username and password it selects the long-term credential key.
    #[serde(default = "Turn::realm")]
    pub realm: String,
}

impl Turn {
    fn bind() -> SocketAddr {
        "127.0.0.1:3478".parse().unwrap()
    }

    fn realm() -> String {
        "localhost".to_string()
    }
}

impl Default for Turn {
    fn default() -> Self {
        Self {
            bind: Self::bind(),
            realm: Self::realm(),
        }
    }
}

#[derive(Deserialize, Debug, Default)]
pub struct Auth {
    /// static user password
    ///
    /// This option can be used to specify the static identity
    /// authentication information used by the turn server for
    /// verification. The username is the key, the password the value; the
    /// realm comes from the turn section.
    #[serde(default)]
    pub static_credentials: HashMap<String, String>,
}

#[derive(Deserialize, Debug)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

impl Default for LogLevel {
    fn default() -> Self {
        Self::Info
    }
}

impl LogLevel {
    pub fn as_level(&self) -> log::Level {
        match *self {
            Self::Error => log::Level::Error,
            Self::Warn => log::Level::Warn,
            Self::Info => log::Level::Info,
            Self::Debug => log::Level::Debug,
            Self::Trace => log::Level::Trace,
        }
    }
}

#[derive(Deserialize, Debug, Default)]
pub struct Log {
    /// log level
    ///
    /// An enum representing the available verbosity levels of the logger.
    #[serde(default)]
    pub level: LogLevel,
}

#[derive(Deserialize, Debug, Default)]
pub struct Config {
    #[serde(default)]
    pub turn: Turn,
    #[serde(default)]
    pub auth: Auth,
    #[serde(default)]
    pub log: Log,
}

#[derive(Parser)]
#[command(
    about = env!("CARGO_PKG_DESCRIPTION"),
    version = env!("CARGO_PKG_VERSION"),
)]
struct Cli {
    /// specify the configuration file path.
    #[arg(long)]
    config: Option<String>,
}

impl Config {
    /// Load command line parameters, if the configuration file path is
    /// specified, the configuration is read from the configuration file,
    /// otherwise the default configuration is used.
    pub fn load() -> anyhow::Result<Self> {
        Ok(toml::from_str(
            &Cli::parse()
                .config
                .and_then(|path| read_to_string(path).ok())
                .unwrap_or_default(),
        )?)
    }
}
