use clap::Parser;
use std::net::SocketAddr;
use std::path::PathBuf;

#[derive(Parser, Debug, Clone)]
#[command(author, version, about, long_about = None)]
pub struct Args {
    /// Directory holding the persisted update records.
    #[arg(long, default_value = "artifacts")]
    pub storage: PathBuf,
    #[arg(long, default_value = "0.0.0.0:8090")]
    pub bind: SocketAddr,
    /// Root CA used to verify device and publisher client certificates.
    #[arg(long)]
    pub ca_cert: PathBuf,
    /// Server certificate presented to clients (PEM).
    #[arg(long)]
    pub tls_cert: PathBuf,
    /// Private key matching the server certificate (PEM).
    #[arg(long)]
    pub tls_key: PathBuf,
    #[arg(long, default_value = "info")]
    pub log_level: tracing_core::Level,
}
