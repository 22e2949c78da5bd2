use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::path::{Path, PathBuf};
use std::time::Duration;
use clap::Parser;

/// Room relay server
#[derive(Parser, Debug, Clone, PartialEq, Eq)]
#[command(name = "room_relay")]
#[command(about = "Ephemeral multi-user chat rooms over WebSockets")]
#[command(version)]
pub struct Config {
    /// Address to bind to
    #[arg(long, env = "HOST", default_value = "0.0.0.0")]
    pub host: IpAddr,

    /// Port to listen on
    #[arg(short, long, env = "PORT", default_value_t = 3001)]
    pub port: u16,

    /// Directory served for every non-WebSocket path
    #[arg(long, env = "STATIC_DIR", default_value = "public")]
    pub static_dir: PathBuf,

    /// How long a typing marker lives after its last signal
    #[arg(long, env = "TYPING_TTL_MS", default_value_t = 3000)]
    pub typing_ttl_ms: u64,

    /// Interval of the typing expiry sweep
    #[arg(long, env = "TYPING_SWEEP_MS", default_value_t = 500)]
    pub sweep_interval_ms: u64,

    /// TLS certificate (PEM)
    #[arg(long, env = "TLS_CERT")]
    pub tls_cert: Option<PathBuf>,

    /// TLS private key (PEM)
    #[arg(long, env = "TLS_KEY")]
    pub tls_key: Option<PathBuf>,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            host: IpAddr::V4(Ipv4Addr::UNSPECIFIED),
            port: 3001,
            static_dir: PathBuf::from("public"),
            typing_ttl_ms: 3000,
            sweep_interval_ms: 500,
            tls_cert: None,
            tls_key: None,
        }
    }
}

impl Config {
    pub fn addr(&self) -> SocketAddr {
        SocketAddr::new(self.host, self.port)
    }

    pub fn typing_ttl(&self) -> Duration {
        Duration::from_millis(self.typing_ttl_ms)
    }

    pub fn sweep_interval(&self) -> Duration {
        Duration::from_millis(self.sweep_interval_ms.max(1))
    }

    /// Certificate and key paths, only when both were given.
    pub fn tls_paths(&self) -> Option<(&Path, &Path)> {
        match (&self.tls_cert, &self.tls_key) {
            (Some(cert), Some(key)) => Some((cert.as_path(), key.as_path())),
            _ => None,
        }
    }
}
