use std::fs;

use anyhow::Context;
use clap::Parser;
use tracing::info;
use tracing_subscriber::filter::Targets;
use tracing_subscriber::prelude::*;

mod builder;
mod cli;
mod distribute;
mod encryptor;
#[cfg(test)]
mod testutil;

use cli::{Args, Command};

fn configure_logging(args: &Args) {
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer())
        .with(
            Targets::new()
                .with_target(env!("CARGO_PKG_NAME").replace('-', "_"), args.log_level)
                .with_target("fleetcast_common", args.log_level)
                .with_target("reqwest", tracing_core::Level::INFO),
        )
        .init();
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    configure_logging(&args);

    match args.command {
        Command::Create {
            seq,
            uuid,
            image,
            uri,
            sign_key,
            out,
        } => {
            let artifact = builder::create_artifact(seq, *uuid.as_bytes(), &image, &uri, &sign_key)
                .context("failed to build the artifact")?;
            encryptor::encrypt_and_serialize(&artifact, &out)
                .context("failed to encrypt the artifact")?;
            info!("artifact for sequence number {seq} written to {}", out.display());
        }
        Command::Publish {
            certs,
            key,
            iv,
            artifact,
            available,
            server,
            ca_cert,
            client_cert,
            client_key,
            save_keys,
        } => {
            let keys = distribute::wrap_for_directory(&certs, &key, &iv)
                .context("failed to wrap the decryption key")?;
            anyhow::ensure!(!keys.is_empty(), "no device certificates found in {certs:?}");
            info!("wrapped the decryption key for {} devices", keys.len());

            if let Some(dir) = &save_keys {
                distribute::save_ciphertexts(dir, &keys)
                    .context("failed to save the wrapped keys")?;
            }

            let ciphertext = fs::read(&artifact)
                .with_context(|| format!("failed to read the artifact at {artifact:?}"))?;
            let client =
                distribute::PublisherClient::new(server, &ca_cert, &client_cert, &client_key)?;
            let update_id = client.prepare_update(keys, available).await?;
            client.upload_artifact(update_id, ciphertext).await?;
            info!("update {update_id} published, available from epoch second {available}");
        }
    }
    Ok(())
}
