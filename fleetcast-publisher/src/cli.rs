use clap::{Parser, Subcommand};
use std::path::PathBuf;
use uuid::Uuid;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Args {
    #[command(subcommand)]
    pub command: Command,
    #[arg(long, default_value = "info")]
    pub log_level: tracing_core::Level,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Build, sign, and encrypt an update artifact.
    Create {
        /// Publisher-managed sequence number.
        #[arg(long)]
        seq: u64,
        /// Hardware UUID of the target platform.
        #[arg(long)]
        uuid: Uuid,
        /// Firmware image to embed or hash.
        #[arg(long)]
        image: PathBuf,
        /// Firmware URI; leave empty to embed the image in the artifact.
        #[arg(long, default_value = "")]
        uri: String,
        /// PEM encoded RSA signing key.
        #[arg(long)]
        sign_key: PathBuf,
        /// Output directory for ciphertext, nonce, and key.
        #[arg(long)]
        out: PathBuf,
    },
    /// Wrap the symmetric key for a device fleet and publish the artifact.
    Publish {
        /// Directory of device certificates (PEM).
        #[arg(long)]
        certs: PathBuf,
        /// The symmetric key emitted by `create`.
        #[arg(long)]
        key: PathBuf,
        /// The nonce emitted by `create`.
        #[arg(long)]
        iv: PathBuf,
        /// The artifact ciphertext emitted by `create`.
        #[arg(long)]
        artifact: PathBuf,
        /// Epoch seconds from which the update becomes visible.
        #[arg(long)]
        available: i64,
        /// Base URL of the distribution server.
        #[arg(long, default_value = "https://localhost:8090")]
        server: String,
        /// Root CA the server certificate chains to.
        #[arg(long)]
        ca_cert: PathBuf,
        /// Publisher client certificate (PEM).
        #[arg(long)]
        client_cert: PathBuf,
        /// Private key matching the client certificate (PEM).
        #[arg(long)]
        client_key: PathBuf,
        /// Optionally keep a local copy of the wrapped keys.
        #[arg(long)]
        save_keys: Option<PathBuf>,
    },
}
