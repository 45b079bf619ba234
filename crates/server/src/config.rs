//! Server configuration from command-line flags and environment.

use clap::Parser;
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::path::PathBuf;

const DEFAULT_PORT: u16 = 8000;

#[derive(Debug, Clone, Parser)]
#[command(name = "tinyledger")]
#[command(about = "Append-only hash-chained ledger over HTTP", long_about = None, version)]
pub struct ServerConfig {
    /// Port to listen on
    #[arg(short, long, env = "PORT", default_value_t = DEFAULT_PORT)]
    pub port: u16,

    /// Interface to bind
    #[arg(long, env = "HOST", default_value_t = IpAddr::V4(Ipv4Addr::UNSPECIFIED))]
    pub host: IpAddr,

    /// Directory holding the ledger database
    #[arg(short, long, env = "DATABASE_PATH", default_value = "./data")]
    pub data_dir: PathBuf,

    /// Log filter, e.g. `info` or `tinyledger_chain=debug`
    #[arg(long, env = "RUST_LOG", default_value = "info")]
    pub log: String,
}

impl ServerConfig {
    /// Address the HTTP listener binds to.
    pub fn socket_addr(&self) -> SocketAddr {
        SocketAddr::new(self.host, self.port)
    }
}
